//! Property-based tests for protocol invariants (spec.md §8).
//!
//! These exercise the determinism and conservation properties the wire
//! format depends on: any two independently-signing implementations must
//! agree byte-for-byte, so netting order and canonical encoding cannot
//! depend on input order or host-language string ordering.

use primordia_protocol::canonical::{canonicalize, Value};
use primordia_protocol::crypto;
use primordia_protocol::msr::{make_msr, Msr, MsrContent};
use primordia_protocol::netting::net_receipts;
use proptest::prelude::*;

fn msr_strategy() -> impl Strategy<Value = (String, String, i64, i64)> {
    (
        "[a-f0-9]{8}",
        "[a-f0-9]{8}",
        1i64..1_000_000i64,
        1_700_000_000_000i64..1_800_000_000_000i64,
    )
}

fn make_receipt(payer_sk: &str, payer: &str, payee: &str, price: i64, ts: i64) -> Msr {
    make_msr(
        MsrContent {
            payer_agent_id: payer.to_string(),
            payee_agent_id: payee.to_string(),
            resource_type: "compute".to_string(),
            units: 1,
            unit_type: "unit".to_string(),
            price_usd_micros: price,
            scope_hash: crypto::hash(b"scope"),
            request_hash: crypto::hash(b"request"),
            response_hash: crypto::hash(b"response"),
            timestamp_ms: ts,
            nonce: None,
            prev_receipt_hash: None,
        },
        payer_sk,
    )
    .unwrap()
}

proptest! {
    /// Canonicalizing an integer within the 53-bit-safe range never panics
    /// and always round-trips through the decimal string it produces.
    #[test]
    fn canonical_integers_round_trip(n in -9_007_199_254_740_991i64..=9_007_199_254_740_991i64) {
        let encoded = canonicalize(&Value::Int(n)).unwrap();
        prop_assert_eq!(encoded.parse::<i64>().unwrap(), n);
        prop_assert!(!encoded.contains(' '));
    }

    /// Building the same map in any key order yields byte-identical output.
    #[test]
    fn canonical_map_ignores_construction_order(a in 0i64..1000, b in 0i64..1000, c in 0i64..1000) {
        let forward = Value::map([("a", Value::Int(a)), ("b", Value::Int(b)), ("c", Value::Int(c))]);
        let backward = Value::map([("c", Value::Int(c)), ("b", Value::Int(b)), ("a", Value::Int(a))]);
        prop_assert_eq!(canonicalize(&forward).unwrap(), canonicalize(&backward).unwrap());
    }

    /// Arbitrary Unicode strings encode to valid UTF-8 with no embedded
    /// literal whitespace outside of explicit escapes, and never panic.
    #[test]
    fn canonical_strings_never_panic(s in "\\PC*") {
        let encoded = canonicalize(&Value::Str(s)).unwrap();
        prop_assert!(encoded.starts_with('"') && encoded.ends_with('"'));
    }

    /// Netting two opposing receipts between the same pair always nets to
    /// at most one obligation, equal to the absolute difference of the two
    /// flows, regardless of which order they are fed in.
    #[test]
    fn netting_nets_opposing_flows_to_abs_difference(
        price_ab in 1i64..100_000,
        price_ba in 1i64..100_000,
    ) {
        let (sk_a, a) = crypto::generate_keypair();
        let (sk_b, b) = crypto::generate_keypair();
        let r1 = make_receipt(&sk_a, &a, &b, price_ab, 1_700_000_000_000);
        let r2 = make_receipt(&sk_b, &b, &a, price_ba, 1_700_000_000_001);

        let forward = net_receipts(&[r1.clone(), r2.clone()]).unwrap();
        let backward = net_receipts(&[r2, r1]).unwrap();
        prop_assert_eq!(&forward, &backward);

        if price_ab == price_ba {
            prop_assert!(forward.obligations.is_empty());
        } else {
            prop_assert_eq!(forward.obligations.len(), 1);
            prop_assert_eq!(forward.obligations[0].amount_usd_micros, (price_ab - price_ba).abs());
        }
        prop_assert_eq!(forward.total_volume, price_ab + price_ba);
    }

    /// Conservation: for every participant, net outflow minus net inflow
    /// over the reduced obligation set equals the same quantity over the
    /// gross receipts that produced it.
    #[test]
    fn netting_conserves_per_agent_balance(
        prices in prop::collection::vec(1i64..10_000, 1..8),
    ) {
        let (sk_a, a) = crypto::generate_keypair();
        let (sk_b, b) = crypto::generate_keypair();
        let (sk_c, c) = crypto::generate_keypair();
        let agents = [(&sk_a, a.as_str()), (&sk_b, b.as_str()), (&sk_c, c.as_str())];

        let mut receipts = Vec::new();
        for (i, price) in prices.iter().enumerate() {
            let (payer_sk, payer) = agents[i % 3];
            let (_, payee) = agents[(i + 1) % 3];
            receipts.push(make_receipt(payer_sk, payer, payee, *price, 1_700_000_000_000 + i as i64));
        }

        let result = net_receipts(&receipts).unwrap();

        for (_, agent) in agents {
            let gross_out: i64 = receipts.iter().filter(|r| r.payer_agent_id == agent).map(|r| r.price_usd_micros).sum();
            let gross_in: i64 = receipts.iter().filter(|r| r.payee_agent_id == agent).map(|r| r.price_usd_micros).sum();
            let gross_net = gross_out - gross_in;

            let net_out: i64 = result.obligations.iter().filter(|o| o.from_agent == agent).map(|o| o.amount_usd_micros).sum();
            let net_in: i64 = result.obligations.iter().filter(|o| o.to_agent == agent).map(|o| o.amount_usd_micros).sum();
            prop_assert_eq!(net_out - net_in, gross_net);
        }
    }

    /// At most one obligation exists per unordered pair of agents, no
    /// matter how many receipts flow between them in either direction.
    #[test]
    fn netting_yields_at_most_one_edge_per_pair(
        prices_ab in prop::collection::vec(1i64..1000, 0..5),
        prices_ba in prop::collection::vec(1i64..1000, 0..5),
    ) {
        let (sk_a, a) = crypto::generate_keypair();
        let (sk_b, b) = crypto::generate_keypair();
        let mut receipts = Vec::new();
        for (i, price) in prices_ab.iter().enumerate() {
            receipts.push(make_receipt(&sk_a, &a, &b, *price, 1_700_000_000_000 + i as i64));
        }
        for (i, price) in prices_ba.iter().enumerate() {
            receipts.push(make_receipt(&sk_b, &b, &a, *price, 1_700_000_100_000 + i as i64));
        }
        if receipts.is_empty() {
            return Ok(());
        }

        let result = net_receipts(&receipts).unwrap();
        prop_assert!(result.obligations.len() <= 1);
    }

    /// Tampering with any content field of a signed MSR invalidates its
    /// signature, regardless of which field or by how much it changed.
    #[test]
    fn msr_tamper_always_breaks_signature((payer, payee, price, ts) in msr_strategy(), delta in 1i64..1000) {
        prop_assume!(payer != payee);
        let (sk, pk) = crypto::generate_keypair();
        let msr = make_receipt(&sk, &pk, &payee, price, ts);
        let mut tampered = msr.clone();
        tampered.price_usd_micros += delta;

        let original_hash = primordia_protocol::msr::msr_hash(&msr).unwrap();
        let tampered_hash = primordia_protocol::msr::msr_hash(&tampered).unwrap();
        prop_assert_ne!(original_hash, tampered_hash);

        let outcome = primordia_protocol::msr::verify_msr(&tampered, &pk);
        prop_assert!(!outcome.valid);
    }
}
