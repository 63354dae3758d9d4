//! MSR — Machine Settlement Receipt.
//!
//! A signed record of a single payer -> payee resource transfer. Immutable
//! once signed; consumed in bulk by the netting engine ([`crate::netting`]).

use crate::canonical::{canonicalize_bytes, Value};
use crate::crypto;
use crate::error::{Error, Result};

/// The only MSR version this crate accepts.
pub const MSR_VERSION: &str = "0.1";

/// A settlement receipt, signed by the payer.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Msr {
    /// Protocol version, currently always `"0.1"`.
    pub msr_version: String,
    /// Agent paying.
    pub payer_agent_id: String,
    /// Agent being paid.
    pub payee_agent_id: String,
    /// Resource type transferred (e.g. `"compute"`).
    pub resource_type: String,
    /// Number of units transferred. Must be positive.
    pub units: i64,
    /// Unit of measurement (e.g. `"tokens_1k"`).
    pub unit_type: String,
    /// Price paid, in USD micros. Must be non-negative.
    pub price_usd_micros: i64,
    /// Milliseconds since Unix epoch. Must be positive.
    pub timestamp_ms: i64,
    /// 32 hex-char (128-bit) nonce.
    pub nonce: String,
    /// Hash of the scope under which this transfer occurred.
    pub scope_hash: String,
    /// Hash of the originating request.
    pub request_hash: String,
    /// Hash of the resulting response.
    pub response_hash: String,
    /// Hash of the previous receipt in this payer's chain, if any.
    pub prev_receipt_hash: Option<String>,
    /// Ed25519 signature over the content hash, by the payer.
    pub signature_ed25519: String,
}

/// Fields required to construct a new MSR. Grouped to keep `make_msr`'s
/// argument list from sprawling as the schema grows.
#[derive(Debug, Clone)]
pub struct MsrContent {
    /// See [`Msr::payer_agent_id`].
    pub payer_agent_id: String,
    /// See [`Msr::payee_agent_id`].
    pub payee_agent_id: String,
    /// See [`Msr::resource_type`].
    pub resource_type: String,
    /// See [`Msr::units`].
    pub units: i64,
    /// See [`Msr::unit_type`].
    pub unit_type: String,
    /// See [`Msr::price_usd_micros`].
    pub price_usd_micros: i64,
    /// See [`Msr::scope_hash`].
    pub scope_hash: String,
    /// See [`Msr::request_hash`].
    pub request_hash: String,
    /// See [`Msr::response_hash`].
    pub response_hash: String,
    /// See [`Msr::timestamp_ms`]; `None` is rejected at construction — the
    /// caller must supply wall-clock time, since this crate has no clock.
    pub timestamp_ms: i64,
    /// See [`Msr::nonce`]; generated via [`crypto::generate_nonce`] when `None`.
    pub nonce: Option<String>,
    /// See [`Msr::prev_receipt_hash`].
    pub prev_receipt_hash: Option<String>,
}

fn content_value(content: &MsrContent, nonce: &str) -> Value {
    Value::map([
        ("msr_version", Value::from(MSR_VERSION)),
        ("payer_agent_id", Value::from(content.payer_agent_id.as_str())),
        ("payee_agent_id", Value::from(content.payee_agent_id.as_str())),
        ("resource_type", Value::from(content.resource_type.as_str())),
        ("units", Value::Int(content.units)),
        ("unit_type", Value::from(content.unit_type.as_str())),
        ("price_usd_micros", Value::Int(content.price_usd_micros)),
        ("timestamp_ms", Value::Int(content.timestamp_ms)),
        ("nonce", Value::from(nonce)),
        ("scope_hash", Value::from(content.scope_hash.as_str())),
        ("request_hash", Value::from(content.request_hash.as_str())),
        ("response_hash", Value::from(content.response_hash.as_str())),
        (
            "prev_receipt_hash",
            Value::opt_str(content.prev_receipt_hash.clone()),
        ),
    ])
}

/// Build and sign a new MSR as the payer (spec §4.3's shared construction
/// idiom, specialized to the MSR schema).
pub fn make_msr(content: MsrContent, payer_private_key: &str) -> Result<Msr> {
    let nonce = content.nonce.clone().unwrap_or_else(crypto::generate_nonce);
    let value = content_value(&content, &nonce);
    let digest = crypto::hash(&canonicalize_bytes(&value)?);
    let signature = crypto::sign(&digest, payer_private_key)
        .map_err(|e| Error::Signature(e.to_string()))?;

    Ok(Msr {
        msr_version: MSR_VERSION.to_string(),
        payer_agent_id: content.payer_agent_id,
        payee_agent_id: content.payee_agent_id,
        resource_type: content.resource_type,
        units: content.units,
        unit_type: content.unit_type,
        price_usd_micros: content.price_usd_micros,
        timestamp_ms: content.timestamp_ms,
        nonce,
        scope_hash: content.scope_hash,
        request_hash: content.request_hash,
        response_hash: content.response_hash,
        prev_receipt_hash: content.prev_receipt_hash,
        signature_ed25519: signature,
    })
}

/// Recompute an MSR's content hash — its identity — without checking the
/// signature.
pub fn msr_hash(msr: &Msr) -> Result<String> {
    let value = Value::map([
        ("msr_version", Value::from(msr.msr_version.as_str())),
        ("payer_agent_id", Value::from(msr.payer_agent_id.as_str())),
        ("payee_agent_id", Value::from(msr.payee_agent_id.as_str())),
        ("resource_type", Value::from(msr.resource_type.as_str())),
        ("units", Value::Int(msr.units)),
        ("unit_type", Value::from(msr.unit_type.as_str())),
        ("price_usd_micros", Value::Int(msr.price_usd_micros)),
        ("timestamp_ms", Value::Int(msr.timestamp_ms)),
        ("nonce", Value::from(msr.nonce.as_str())),
        ("scope_hash", Value::from(msr.scope_hash.as_str())),
        ("request_hash", Value::from(msr.request_hash.as_str())),
        ("response_hash", Value::from(msr.response_hash.as_str())),
        (
            "prev_receipt_hash",
            Value::opt_str(msr.prev_receipt_hash.clone()),
        ),
    ]);
    Ok(crypto::hash(&canonicalize_bytes(&value)?))
}

/// Outcome of verifying a signed record: whether it holds, its recomputed
/// identity hash (useful for callers even on success), and — on failure —
/// the first-failure reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyOutcome {
    /// Whether every invariant held and the signature verified.
    pub valid: bool,
    /// The recomputed content hash, when it could be computed.
    pub hash: Option<String>,
    /// First-failure reason, present iff `!valid`.
    pub error: Option<String>,
}

impl VerifyOutcome {
    fn ok(hash: String) -> Self {
        Self { valid: true, hash: Some(hash), error: None }
    }

    fn fail(reason: impl Into<String>) -> Self {
        Self { valid: false, hash: None, error: Some(reason.into()) }
    }

    fn fail_with_hash(hash: String, reason: impl Into<String>) -> Self {
        Self { valid: false, hash: Some(hash), error: Some(reason.into()) }
    }
}

/// Verify an MSR against the declared payer's public key.
pub fn verify_msr(msr: &Msr, payer_public_key: &str) -> VerifyOutcome {
    if msr.msr_version != MSR_VERSION {
        return VerifyOutcome::fail("Invalid msr_version");
    }
    if msr.payer_agent_id == msr.payee_agent_id {
        return VerifyOutcome::fail("Payer and payee cannot be same");
    }
    if msr.units <= 0 {
        return VerifyOutcome::fail("Units must be positive");
    }
    if msr.price_usd_micros < 0 {
        return VerifyOutcome::fail("Price cannot be negative");
    }
    if msr.timestamp_ms <= 0 {
        return VerifyOutcome::fail("Invalid timestamp");
    }

    let hash = match msr_hash(msr) {
        Ok(h) => h,
        Err(e) => return VerifyOutcome::fail(e.to_string()),
    };

    if !crypto::verify(&hash, &msr.signature_ed25519, payer_public_key) {
        tracing::warn!(agent = %msr.payer_agent_id, %hash, "MSR signature verification failed");
        return VerifyOutcome::fail_with_hash(hash, "Invalid signature");
    }

    VerifyOutcome::ok(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(payer_private_key: &str, payer: &str, payee: &str, price: i64) -> Msr {
        make_msr(
            MsrContent {
                payer_agent_id: payer.to_string(),
                payee_agent_id: payee.to_string(),
                resource_type: "compute".to_string(),
                units: 100,
                unit_type: "tokens_1k".to_string(),
                price_usd_micros: price,
                scope_hash: crypto::hash(b"scope"),
                request_hash: crypto::hash(b"request"),
                response_hash: crypto::hash(b"response"),
                timestamp_ms: 1_700_000_000_000,
                nonce: None,
                prev_receipt_hash: None,
            },
            payer_private_key,
        )
        .unwrap()
    }

    #[test]
    fn sign_then_verify_succeeds() {
        let (sk, pk) = crypto::generate_keypair();
        let msr = sample(&sk, &pk, "payee-1", 1000);
        let outcome = verify_msr(&msr, &pk);
        assert!(outcome.valid);
        assert!(outcome.error.is_none());
    }

    #[test]
    fn tampering_with_price_breaks_signature() {
        let (sk, pk) = crypto::generate_keypair();
        let mut msr = sample(&sk, &pk, "payee-1", 1000);
        msr.price_usd_micros = 1001;
        let outcome = verify_msr(&msr, &pk);
        assert!(!outcome.valid);
        assert_eq!(outcome.error.as_deref(), Some("Invalid signature"));
    }

    #[test]
    fn rejects_self_payment() {
        let (sk, pk) = crypto::generate_keypair();
        let msr = sample(&sk, &pk, "same-agent", 1000);
        let mut msr = msr;
        msr.payee_agent_id = msr.payer_agent_id.clone();
        let outcome = verify_msr(&msr, &pk);
        assert!(!outcome.valid);
    }

    #[test]
    fn nonce_defaults_to_32_hex_chars() {
        let (sk, pk) = crypto::generate_keypair();
        let msr = sample(&sk, &pk, "payee-1", 1000);
        assert_eq!(msr.nonce.len(), 32);
    }
}
