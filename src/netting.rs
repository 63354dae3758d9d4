//! Netting engine and IAN — Inter-Agent Netting (spec §4.8, §4.9 is DBP).
//!
//! Reduces a set of [`Msr`] settlement receipts to the minimal set of
//! bilateral obligations that preserve each agent's net position, then
//! wraps that reduction in a record the kernel signs.

use std::collections::{BTreeMap, BTreeSet};

use crate::canonical::{canonicalize_bytes, Value};
use crate::crypto;
use crate::error::Error;
use crate::msr::{msr_hash, Msr, VerifyOutcome};

/// The only IAN version this crate accepts.
pub const IAN_VERSION: &str = "0.1";

/// A single net obligation: `from` owes `to` `amount_usd_micros`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct NetObligation {
    /// Agent that owes.
    #[serde(rename = "from")]
    pub from_agent: String,
    /// Agent that is owed.
    #[serde(rename = "to")]
    pub to_agent: String,
    /// Net amount owed, USD micros. Always positive.
    pub amount_usd_micros: i64,
}

impl NetObligation {
    fn value(&self) -> Value {
        Value::map([
            ("from", Value::from(self.from_agent.as_str())),
            ("to", Value::from(self.to_agent.as_str())),
            ("amount_usd_micros", Value::Int(self.amount_usd_micros)),
        ])
    }
}

/// Output of [`net_receipts`]: the reduced obligation set plus the
/// bookkeeping the IAN record needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NettingResult {
    /// Minimal bilateral obligations, sorted by `(from, to)`.
    pub obligations: Vec<NetObligation>,
    /// Sorted set of every agent that appears as payer or payee.
    pub participants: Vec<String>,
    /// Sorted set of every input receipt's content hash.
    pub receipt_hashes: Vec<String>,
    /// Sum of `price_usd_micros` across every input receipt.
    pub total_volume: i64,
}

/// Net a set of MSRs into the minimal set of bilateral obligations.
/// Deterministic: any permutation of `receipts` produces a
/// field-for-field identical result.
pub fn net_receipts(receipts: &[Msr]) -> crate::error::Result<NettingResult> {
    let mut receipt_hashes = Vec::with_capacity(receipts.len());
    for r in receipts {
        receipt_hashes.push(msr_hash(r)?);
    }
    receipt_hashes.sort();

    let mut gross: BTreeMap<(String, String), i64> = BTreeMap::new();
    let mut participants: BTreeSet<String> = BTreeSet::new();
    let mut total_volume: i64 = 0;

    for r in receipts {
        *gross
            .entry((r.payer_agent_id.clone(), r.payee_agent_id.clone()))
            .or_insert(0) += r.price_usd_micros;
        total_volume += r.price_usd_micros;
        participants.insert(r.payer_agent_id.clone());
        participants.insert(r.payee_agent_id.clone());
    }

    let mut processed: BTreeSet<(String, String)> = BTreeSet::new();
    let mut obligations = Vec::new();

    for (a, b) in gross.keys().cloned() {
        let pair = if a <= b { (a.clone(), b.clone()) } else { (b.clone(), a.clone()) };
        if !processed.insert(pair) {
            continue;
        }

        let a_to_b = *gross.get(&(a.clone(), b.clone())).unwrap_or(&0);
        let b_to_a = *gross.get(&(b.clone(), a.clone())).unwrap_or(&0);

        match a_to_b.cmp(&b_to_a) {
            std::cmp::Ordering::Greater => obligations.push(NetObligation {
                from_agent: a,
                to_agent: b,
                amount_usd_micros: a_to_b - b_to_a,
            }),
            std::cmp::Ordering::Less => obligations.push(NetObligation {
                from_agent: b,
                to_agent: a,
                amount_usd_micros: b_to_a - a_to_b,
            }),
            std::cmp::Ordering::Equal => {}
        }
    }

    obligations.sort_by(|x, y| (x.from_agent.as_str(), x.to_agent.as_str()).cmp(&(y.from_agent.as_str(), y.to_agent.as_str())));

    Ok(NettingResult {
        obligations,
        participants: participants.into_iter().collect(),
        receipt_hashes,
        total_volume,
    })
}

/// A signed inter-agent netting record.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Ian {
    /// Protocol version, currently `"0.1"`.
    pub ian_version: String,
    /// Identifier for the settlement epoch this netting covers.
    pub epoch_id: String,
    /// Sorted set of every participating agent.
    pub participants: Vec<String>,
    /// Sorted set of every included receipt's content hash.
    pub included_receipt_hashes: Vec<String>,
    /// Minimal bilateral obligations, sorted by `(from, to)`.
    pub net_obligations: Vec<NetObligation>,
    /// `hash(canonical({epoch, receipts, obligations}))`.
    pub netting_hash: String,
    /// Kernel's signature over the full record hash.
    pub signature_ed25519: String,
}

/// Compute the `netting_hash` binding an epoch, receipt set, and
/// obligation set together.
pub fn compute_netting_hash(
    epoch_id: &str,
    receipt_hashes: &[String],
    obligations: &[NetObligation],
) -> crate::error::Result<String> {
    let mut sorted_hashes = receipt_hashes.to_vec();
    sorted_hashes.sort();
    let value = Value::map([
        ("epoch", Value::from(epoch_id)),
        ("receipts", Value::array(sorted_hashes.iter().map(|h| Value::from(h.as_str())))),
        ("obligations", Value::array(obligations.iter().map(|o| o.value()))),
    ]);
    Ok(crypto::hash(&canonicalize_bytes(&value)?))
}

fn content_value(epoch_id: &str, result: &NettingResult, netting_hash: &str) -> Value {
    Value::map([
        ("ian_version", Value::from(IAN_VERSION)),
        ("epoch_id", Value::from(epoch_id)),
        ("participants", Value::array(result.participants.iter().map(|p| Value::from(p.as_str())))),
        (
            "included_receipt_hashes",
            Value::array(result.receipt_hashes.iter().map(|h| Value::from(h.as_str()))),
        ),
        (
            "net_obligations",
            Value::array(result.obligations.iter().map(|o| o.value())),
        ),
        ("netting_hash", Value::from(netting_hash)),
    ])
}

/// Net `receipts` and produce a signed IAN for `epoch_id`.
pub fn make_ian(epoch_id: &str, receipts: &[Msr], kernel_private_key: &str) -> crate::error::Result<Ian> {
    let result = net_receipts(receipts)?;
    let netting_hash = compute_netting_hash(epoch_id, &result.receipt_hashes, &result.obligations)?;
    let value = content_value(epoch_id, &result, &netting_hash);
    let ian_hash = crypto::hash(&canonicalize_bytes(&value)?);
    let signature =
        crypto::sign(&ian_hash, kernel_private_key).map_err(|e| Error::Signature(e.to_string()))?;

    tracing::debug!(
        epoch = %epoch_id,
        receipts = receipts.len(),
        obligations = result.obligations.len(),
        "netted receipts into IAN"
    );

    Ok(Ian {
        ian_version: IAN_VERSION.to_string(),
        epoch_id: epoch_id.to_string(),
        participants: result.participants,
        included_receipt_hashes: result.receipt_hashes,
        net_obligations: result.obligations,
        netting_hash,
        signature_ed25519: signature,
    })
}

fn ian_hash(ian: &Ian) -> crate::error::Result<String> {
    let value = Value::map([
        ("ian_version", Value::from(ian.ian_version.as_str())),
        ("epoch_id", Value::from(ian.epoch_id.as_str())),
        ("participants", Value::array(ian.participants.iter().map(|p| Value::from(p.as_str())))),
        (
            "included_receipt_hashes",
            Value::array(ian.included_receipt_hashes.iter().map(|h| Value::from(h.as_str()))),
        ),
        (
            "net_obligations",
            Value::array(ian.net_obligations.iter().map(|o| o.value())),
        ),
        ("netting_hash", Value::from(ian.netting_hash.as_str())),
    ]);
    Ok(crypto::hash(&canonicalize_bytes(&value)?))
}

/// Verify a signed IAN against the kernel's public key.
pub fn verify_ian(ian: &Ian, kernel_public_key: &str) -> VerifyOutcome {
    if ian.ian_version != IAN_VERSION {
        return VerifyOutcome { valid: false, hash: None, error: Some("Invalid ian_version".into()) };
    }

    for obl in &ian.net_obligations {
        if !ian.participants.contains(&obl.from_agent) {
            return VerifyOutcome {
                valid: false,
                hash: None,
                error: Some(format!("Unknown participant: {}", obl.from_agent)),
            };
        }
        if !ian.participants.contains(&obl.to_agent) {
            return VerifyOutcome {
                valid: false,
                hash: None,
                error: Some(format!("Unknown participant: {}", obl.to_agent)),
            };
        }
        if obl.from_agent == obl.to_agent {
            return VerifyOutcome {
                valid: false,
                hash: None,
                error: Some("Self-obligation not allowed".into()),
            };
        }
        if obl.amount_usd_micros <= 0 {
            return VerifyOutcome {
                valid: false,
                hash: None,
                error: Some("Obligation amount must be positive".into()),
            };
        }
    }

    let expected_netting_hash = match compute_netting_hash(
        &ian.epoch_id,
        &ian.included_receipt_hashes,
        &ian.net_obligations,
    ) {
        Ok(h) => h,
        Err(e) => return VerifyOutcome { valid: false, hash: None, error: Some(e.to_string()) },
    };
    if expected_netting_hash != ian.netting_hash {
        return VerifyOutcome { valid: false, hash: None, error: Some("Invalid netting hash".into()) };
    }

    let hash = match ian_hash(ian) {
        Ok(h) => h,
        Err(e) => return VerifyOutcome { valid: false, hash: None, error: Some(e.to_string()) },
    };

    if !crypto::verify(&hash, &ian.signature_ed25519, kernel_public_key) {
        tracing::warn!(epoch = %ian.epoch_id, "IAN kernel signature verification failed");
        return VerifyOutcome {
            valid: false,
            hash: Some(hash),
            error: Some("Invalid kernel signature".into()),
        };
    }

    VerifyOutcome { valid: true, hash: Some(hash), error: None }
}
