//! End-to-end integration tests exercising the full record lifecycle:
//! agents meter consumption, settle it, net a batch of receipts, rate an
//! agent's history, and carry a defaulting agent through liquidation.

use primordia_protocol::acr::{compute_acr, AcrPolicy};
use primordia_protocol::amr::{self, AmrContent, AttestationMethod, ResourceClass};
use primordia_protocol::canonical::{canonicalize, Value};
use primordia_protocol::crypto;
use primordia_protocol::dbp::{self, Creditor, DbpContent, DeclarationType, LiquidationMethod, TriggerType};
use primordia_protocol::mbs::{self, Asset as MbsAsset, Liability, MbsContent};
use primordia_protocol::meter::{make_compute_meter, MeterInputs};
use primordia_protocol::msr::{make_msr, verify_msr, Msr, MsrContent};
use primordia_protocol::netting::{self, net_receipts};

fn keypair() -> (String, String) {
    crypto::generate_keypair()
}

fn receipt(payer_sk: &str, payer: &str, payee: &str, price: i64, ts: i64) -> Msr {
    make_msr(
        MsrContent {
            payer_agent_id: payer.to_string(),
            payee_agent_id: payee.to_string(),
            resource_type: "compute".to_string(),
            units: 1,
            unit_type: "unit".to_string(),
            price_usd_micros: price,
            scope_hash: crypto::hash(b"scope"),
            request_hash: crypto::hash(b"req"),
            response_hash: crypto::hash(b"resp"),
            timestamp_ms: ts,
            nonce: None,
            prev_receipt_hash: None,
        },
        payer_sk,
    )
    .unwrap()
}

#[test]
fn spec_scenario_1_canonical_nested_example() {
    let v = Value::map([
        ("b", Value::Int(2)),
        ("a", Value::array([Value::Int(1), Value::Int(2), Value::Int(3)])),
    ]);
    assert_eq!(canonicalize(&v).unwrap(), r#"{"a":[1,2,3],"b":2}"#);
}

#[test]
fn spec_scenario_6_tampered_msr_fails_verification_with_specific_reason() {
    let (sk, pk) = keypair();
    let msr = receipt(&sk, &pk, "payee-agent", 1000, 1_700_000_000_000);
    let mut tampered = msr;
    tampered.price_usd_micros = 1001;
    let outcome = verify_msr(&tampered, &pk);
    assert!(!outcome.valid);
    assert_eq!(outcome.error.as_deref(), Some("Invalid signature"));
}

#[test]
fn meter_then_settle_then_net_a_batch_of_agents() {
    let (provider_sk, provider) = keypair();
    let (consumer_sk, consumer) = keypair();
    let (third_party_sk, third_party) = keypair();

    // The provider meters compute consumption for the consumer...
    let amr = make_compute_meter(
        MeterInputs {
            consumer_agent_id: consumer.clone(),
            provider_agent_id: provider.clone(),
            resource_subtype: "gpu_h100".to_string(),
            quantity: 20,
            unit: "gpu_seconds".to_string(),
            start_ms: 1_700_000_000_000,
            end_ms: 1_700_000_020_000,
            rate_micros_per_unit: 1000,
            request_hash: crypto::hash(b"req"),
            response_hash: crypto::hash(b"resp"),
            timestamp_ms: 1_700_000_020_000,
            meter_id: Some("meter-7".to_string()),
            session_id: None,
            parent_amr_id: None,
        },
        AttestationMethod::SignedMeter,
        &provider_sk,
    )
    .unwrap();
    assert!(amr::verify_amr(&amr).valid);
    assert_eq!(amr.pricing.total_micros, 20_000);

    // ...then the consumer settles what the AMR priced, plus trades an
    // equal-and-opposite payment with a third party that nets away entirely.
    let receipts = vec![
        receipt(&consumer_sk, &consumer, &provider, amr.pricing.total_micros, 1_700_000_030_000),
        receipt(&consumer_sk, &consumer, &third_party, 500, 1_700_000_031_000),
        receipt(&third_party_sk, &third_party, &consumer, 500, 1_700_000_032_000),
    ];

    let result = net_receipts(&receipts).unwrap();
    // consumer<->third_party cancels completely (equal flows both ways);
    // consumer->provider has no reverse flow and stands as the sole edge.
    assert_eq!(result.obligations.len(), 1);
    assert_eq!(result.obligations[0].from_agent, consumer);
    assert_eq!(result.obligations[0].to_agent, provider);
    assert_eq!(result.obligations[0].amount_usd_micros, 20_000);
    assert_eq!(result.total_volume, 20_000 + 500 + 500);

    let (kernel_sk, kernel_pk) = keypair();
    let ian = netting::make_ian("epoch-42", &receipts, &kernel_sk).unwrap();
    assert!(netting::verify_ian(&ian, &kernel_pk).valid);
    assert_eq!(ian.participants.len(), 3);
}

#[test]
fn insolvent_agent_defaults_and_liquidates_pro_rata() {
    let (agent_sk, agent_pk) = keypair();
    let mbs = mbs::compute_mbs(
        MbsContent {
            agent_id: agent_pk.clone(),
            assets: vec![MbsAsset { asset_type: "usdc".into(), amount: 100_000 }],
            liabilities: vec![Liability { liability_type: "owed".into(), amount: 900_000 }],
            burn_rate_usd_micros_per_s: 1_000,
            timestamp_ms: 1_700_000_000_000,
        },
        &agent_sk,
    )
    .unwrap();
    assert!(mbs::verify_mbs(&mbs, &agent_pk).valid);
    // Runway is clamped at zero per spec.md §4.7's max(0, ...); a
    // liability-heavy sheet still floors out at 0, not a negative number.
    let runway = mbs::compute_runway_seconds(&mbs);
    assert_eq!(runway, 0.0);
    let generous_threshold = dbp::AutoDefaultConfig { threshold_seconds: 60.0 };
    assert!(dbp::should_auto_default(runway, &generous_threshold));
    assert!(!dbp::should_auto_default(runway, &dbp::AutoDefaultConfig::default()));

    let (arbiter_sk, arbiter_pk) = keypair();
    let (_, creditor_x) = keypair();
    let (_, creditor_y) = keypair();

    let dbp_record = dbp::make_dbp(
        DbpContent {
            defaulting_agent_id: agent_pk.clone(),
            declaration_type: DeclarationType::Automatic,
            trigger_type: TriggerType::NegativeMbs,
            trigger_reference_id: crypto::hash(b"mbs-snapshot"),
            creditors: vec![
                Creditor { agent_id: creditor_x, amount_micros: 400_000, priority: 1, collateralized: false },
                Creditor { agent_id: creditor_y, amount_micros: 500_000, priority: 2, collateralized: false },
            ],
            assets: vec![mbs::Asset {
                asset_type: "usdc".into(),
                amount: 100_000,
            }]
            .into_iter()
            .map(|a| dbp::Asset { asset_type: a.asset_type, value_micros: a.amount, liquid: true })
            .collect(),
            liquidation_method: LiquidationMethod::ProRata,
            arbiter_agent_id: arbiter_pk.clone(),
            timestamp_ms: 1_700_000_100_000,
        },
        &arbiter_sk,
    )
    .unwrap();

    let resolved = dbp::resolve_default(&dbp_record, &arbiter_pk);
    assert!(resolved.valid);
    let total_received: i64 = resolved.distributions.iter().map(|d| d.receives_micros).sum();
    assert_eq!(total_received, 100_000);
    assert!(resolved.recovery_rate_bps < 10_000, "creditors should not be made whole");
}

#[test]
fn credit_rating_reflects_settlement_history_and_policy() {
    let (agent_sk, agent) = keypair();
    let receipts = vec![
        receipt(&agent_sk, &agent, "peer-1", 1_000, 1_700_000_000_000),
        receipt(&agent_sk, &agent, "peer-2", 2_000, 1_700_086_400_000),
        receipt(&agent_sk, &agent, "peer-1", 500, 1_700_172_800_000),
    ];

    let acr = compute_acr(&agent, &receipts, &crypto::hash(b"window"), 1_700_200_000_000);
    assert_eq!(acr.dimensions.volume_usd_micros, 3_500);
    assert_eq!(acr.msr_count, 3);
    assert!(acr.dimensions.counterparty_entropy > 0.0, "two distinct counterparties should yield positive entropy");

    let generous_policy = AcrPolicy { min_volume_usd_micros: Some(1), ..Default::default() };
    assert!(primordia_protocol::acr::evaluate_acr(&acr, &generous_policy));

    let strict_policy = AcrPolicy { min_volume_usd_micros: Some(1_000_000), ..Default::default() };
    assert!(!primordia_protocol::acr::evaluate_acr(&acr, &strict_policy));
}

#[test]
fn amr_aggregate_spans_resource_classes() {
    let (provider_sk, provider) = keypair();
    let (_, consumer) = keypair();

    let compute_amr = amr::make_amr(
        AmrContent {
            consumer_agent_id: consumer.clone(),
            provider_agent_id: provider.clone(),
            resource_class: ResourceClass::Compute,
            resource_subtype: "gpu_a100".to_string(),
            quantity: 10,
            unit: "gpu_seconds".to_string(),
            start_ms: 0,
            end_ms: 10_000,
            attestation_method: AttestationMethod::Tee,
            rate_micros_per_unit: 500,
            request_hash: crypto::hash(b"r1"),
            response_hash: crypto::hash(b"s1"),
            timestamp_ms: 10_000,
            tee_quote: Some("quote".to_string()),
            tee_type: Some("sgx".to_string()),
            meter_id: None,
            oracle_id: None,
            session_id: None,
            parent_amr_id: None,
        },
        &provider_sk,
    )
    .unwrap();

    let energy_amr = amr::make_amr(
        AmrContent {
            consumer_agent_id: consumer,
            provider_agent_id: provider,
            resource_class: ResourceClass::Energy,
            resource_subtype: "grid_power".to_string(),
            quantity: 3,
            unit: "kwh".to_string(),
            start_ms: 0,
            end_ms: 10_000,
            attestation_method: AttestationMethod::Oracle,
            rate_micros_per_unit: 100_000,
            request_hash: crypto::hash(b"r2"),
            response_hash: crypto::hash(b"s2"),
            timestamp_ms: 10_000,
            tee_quote: None,
            tee_type: None,
            meter_id: None,
            oracle_id: Some("utility-1".to_string()),
            session_id: None,
            parent_amr_id: None,
        },
        &provider_sk,
    )
    .unwrap();

    let agg = amr::aggregate_amrs(&[compute_amr, energy_amr]);
    assert_eq!(agg.total_quantity, 13);
    assert_eq!(agg.total_micros, 10 * 500 + 3 * 100_000);
    assert_eq!(agg.by_resource_class.len(), 2);
    assert_eq!(agg.avg_confidence_bps, (9999 + 9000) / 2);
}
