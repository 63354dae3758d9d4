//! FC — Future Commitment.
//!
//! A signed promise to deliver units of a resource within a future window,
//! with a penalty for non-delivery. Carries two levels of identity: a
//! `commitment_hash` over the economic terms alone, and the outer record
//! hash over those terms plus penalty, collateral, and version.

use crate::canonical::{canonicalize_bytes, Value};
use crate::crypto;
use crate::error::{Error, Result};
use crate::msr::VerifyOutcome;

/// The only FC version this crate accepts.
pub const FC_VERSION: &str = "0.1";

/// The delivery window within which the issuer must deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DeliveryWindow {
    /// Window start, ms since epoch.
    pub start_ms: i64,
    /// Window end, ms since epoch. Must be strictly after `start_ms`.
    pub end_ms: i64,
}

impl DeliveryWindow {
    fn value(&self) -> Value {
        Value::map([
            ("start_ms", Value::Int(self.start_ms)),
            ("end_ms", Value::Int(self.end_ms)),
        ])
    }
}

/// The penalty owed if the issuer fails to deliver.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Penalty {
    /// Penalty amount, USD micros. Must be positive.
    pub penalty_usd_micros: i64,
    /// Hash of the rule text defining when the penalty applies.
    pub rule_hash: String,
}

impl Penalty {
    fn value(&self) -> Value {
        Value::map([
            ("penalty_usd_micros", Value::Int(self.penalty_usd_micros)),
            ("rule_hash", Value::from(self.rule_hash.as_str())),
        ])
    }
}

/// A future commitment, signed by the issuer.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Fc {
    /// Protocol version, currently `"0.1"`.
    pub fc_version: String,
    /// Agent making the commitment.
    pub issuer_agent_id: String,
    /// Agent the commitment is owed to.
    pub counterparty_agent_id: String,
    /// Resource type to be delivered.
    pub resource_type: String,
    /// Units to be delivered. Must be positive.
    pub units: i64,
    /// Unit of measurement.
    pub unit_type: String,
    /// Window within which delivery must occur.
    pub delivery_window: DeliveryWindow,
    /// Penalty for non-delivery.
    pub penalty: Penalty,
    /// Optional collateral amount backing the commitment, USD micros.
    pub collateral: Option<i64>,
    /// Hash over `{issuer, counterparty, resource, units, window}` alone.
    pub commitment_hash: String,
    /// Issuer's signature over the full record hash.
    pub signature_ed25519: String,
}

/// Inputs required to construct a new FC.
#[derive(Debug, Clone)]
pub struct FcContent {
    /// See [`Fc::issuer_agent_id`].
    pub issuer_agent_id: String,
    /// See [`Fc::counterparty_agent_id`].
    pub counterparty_agent_id: String,
    /// See [`Fc::resource_type`].
    pub resource_type: String,
    /// See [`Fc::units`].
    pub units: i64,
    /// See [`Fc::unit_type`].
    pub unit_type: String,
    /// See [`Fc::delivery_window`].
    pub delivery_window: DeliveryWindow,
    /// See [`Fc::penalty`].
    pub penalty: Penalty,
    /// See [`Fc::collateral`].
    pub collateral: Option<i64>,
}

/// Compute the commitment hash over the economic terms only: issuer,
/// counterparty, resource, units, and window — excluding penalty,
/// collateral, and version.
pub fn compute_commitment_hash(
    issuer_agent_id: &str,
    counterparty_agent_id: &str,
    resource_type: &str,
    units: i64,
    window: &DeliveryWindow,
) -> Result<String> {
    let value = Value::map([
        ("issuer", Value::from(issuer_agent_id)),
        ("counterparty", Value::from(counterparty_agent_id)),
        ("resource", Value::from(resource_type)),
        ("units", Value::Int(units)),
        ("window", window.value()),
    ]);
    Ok(crypto::hash(&canonicalize_bytes(&value)?))
}

fn content_value(content: &FcContent, commitment_hash: &str) -> Value {
    Value::map([
        ("fc_version", Value::from(FC_VERSION)),
        ("issuer_agent_id", Value::from(content.issuer_agent_id.as_str())),
        ("counterparty_agent_id", Value::from(content.counterparty_agent_id.as_str())),
        ("resource_type", Value::from(content.resource_type.as_str())),
        ("units", Value::Int(content.units)),
        ("unit_type", Value::from(content.unit_type.as_str())),
        ("delivery_window", content.delivery_window.value()),
        ("penalty", content.penalty.value()),
        ("collateral", content.collateral.map(Value::Int).unwrap_or(Value::Null)),
        ("commitment_hash", Value::from(commitment_hash)),
    ])
}

/// Build and sign a new FC as the issuer.
pub fn make_fc(content: FcContent, issuer_private_key: &str) -> Result<Fc> {
    let commitment_hash = compute_commitment_hash(
        &content.issuer_agent_id,
        &content.counterparty_agent_id,
        &content.resource_type,
        content.units,
        &content.delivery_window,
    )?;

    let value = content_value(&content, &commitment_hash);
    let fc_hash = crypto::hash(&canonicalize_bytes(&value)?);
    let signature =
        crypto::sign(&fc_hash, issuer_private_key).map_err(|e| Error::Signature(e.to_string()))?;

    Ok(Fc {
        fc_version: FC_VERSION.to_string(),
        issuer_agent_id: content.issuer_agent_id,
        counterparty_agent_id: content.counterparty_agent_id,
        resource_type: content.resource_type,
        units: content.units,
        unit_type: content.unit_type,
        delivery_window: content.delivery_window,
        penalty: content.penalty,
        collateral: content.collateral,
        commitment_hash,
        signature_ed25519: signature,
    })
}

fn fc_hash(fc: &Fc) -> Result<String> {
    let value = Value::map([
        ("fc_version", Value::from(fc.fc_version.as_str())),
        ("issuer_agent_id", Value::from(fc.issuer_agent_id.as_str())),
        ("counterparty_agent_id", Value::from(fc.counterparty_agent_id.as_str())),
        ("resource_type", Value::from(fc.resource_type.as_str())),
        ("units", Value::Int(fc.units)),
        ("unit_type", Value::from(fc.unit_type.as_str())),
        ("delivery_window", fc.delivery_window.value()),
        ("penalty", fc.penalty.value()),
        ("collateral", fc.collateral.map(Value::Int).unwrap_or(Value::Null)),
        ("commitment_hash", Value::from(fc.commitment_hash.as_str())),
    ]);
    Ok(crypto::hash(&canonicalize_bytes(&value)?))
}

/// Verify an FC against the issuer's public key.
///
/// Checks the commitment hash before the outer signature, since a mismatch
/// there is cheaper to detect and more specific to report.
pub fn verify_fc(fc: &Fc, issuer_public_key: &str) -> VerifyOutcome {
    if fc.fc_version != FC_VERSION {
        return VerifyOutcome { valid: false, hash: None, error: Some("Invalid fc_version".into()) };
    }
    if fc.issuer_agent_id == fc.counterparty_agent_id {
        return VerifyOutcome {
            valid: false,
            hash: None,
            error: Some("Issuer and counterparty cannot be same".into()),
        };
    }
    if fc.units <= 0 {
        return VerifyOutcome { valid: false, hash: None, error: Some("Units must be positive".into()) };
    }
    if fc.delivery_window.start_ms >= fc.delivery_window.end_ms {
        return VerifyOutcome { valid: false, hash: None, error: Some("Invalid delivery window".into()) };
    }
    if fc.penalty.penalty_usd_micros <= 0 {
        return VerifyOutcome { valid: false, hash: None, error: Some("Penalty must be positive".into()) };
    }

    let expected_commitment = match compute_commitment_hash(
        &fc.issuer_agent_id,
        &fc.counterparty_agent_id,
        &fc.resource_type,
        fc.units,
        &fc.delivery_window,
    ) {
        Ok(h) => h,
        Err(e) => return VerifyOutcome { valid: false, hash: None, error: Some(e.to_string()) },
    };
    if expected_commitment != fc.commitment_hash {
        return VerifyOutcome {
            valid: false,
            hash: None,
            error: Some("Invalid commitment hash".into()),
        };
    }

    let hash = match fc_hash(fc) {
        Ok(h) => h,
        Err(e) => return VerifyOutcome { valid: false, hash: None, error: Some(e.to_string()) },
    };

    if !crypto::verify(&hash, &fc.signature_ed25519, issuer_public_key) {
        return VerifyOutcome { valid: false, hash: Some(hash), error: Some("Invalid signature".into()) };
    }

    VerifyOutcome { valid: true, hash: Some(hash), error: None }
}
