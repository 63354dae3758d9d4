//! AMR — Attested Metering Record.
//!
//! A signed record of measured resource consumption, with a declared
//! attestation method and a derived confidence score. The provider signs
//! first; the consumer may later co-sign the same hash without any of the
//! content being rebuilt.

use std::collections::BTreeMap;

use crate::canonical::{canonicalize_bytes, Value};
use crate::crypto;
use crate::error::{Error, Result};
use crate::msr::VerifyOutcome;

/// The only AMR version this crate accepts.
pub const AMR_VERSION: &str = "0.1";

/// Resource class an AMR meters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceClass {
    /// CPU/GPU compute, inference tokens.
    Compute,
    /// LLM inference specifically.
    Inference,
    /// Electrical energy.
    Energy,
    /// Durable storage.
    Storage,
    /// Network egress/ingress.
    Bandwidth,
}

impl ResourceClass {
    /// Wire representation, matching the Python reference's string enum.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceClass::Compute => "COMPUTE",
            ResourceClass::Inference => "INFERENCE",
            ResourceClass::Energy => "ENERGY",
            ResourceClass::Storage => "STORAGE",
            ResourceClass::Bandwidth => "BANDWIDTH",
        }
    }
}

/// How a metering claim was attested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttestationMethod {
    /// Trusted execution environment quote.
    Tee,
    /// Signed by a known metering device.
    SignedMeter,
    /// Attested by a third-party oracle.
    Oracle,
    /// Self-reported by the provider, no external attestation.
    SelfReport,
}

impl AttestationMethod {
    fn as_str(&self) -> &'static str {
        match self {
            AttestationMethod::Tee => "TEE",
            AttestationMethod::SignedMeter => "SIGNED_METER",
            AttestationMethod::Oracle => "ORACLE",
            AttestationMethod::SelfReport => "SELF_REPORT",
        }
    }

    /// Confidence score implied purely by the attestation method.
    pub fn confidence_bps(&self) -> i64 {
        match self {
            AttestationMethod::Tee => 9999,
            AttestationMethod::SignedMeter => 9500,
            AttestationMethod::Oracle => 9000,
            AttestationMethod::SelfReport => 5000,
        }
    }
}

/// The measurement window and quantity consumed.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Metering {
    /// Quantity consumed, in `unit`.
    pub quantity: i64,
    /// Unit of measurement (e.g. `"tokens_1k"`, `"gpu_seconds"`).
    pub unit: String,
    /// Window start, ms since epoch.
    pub start_ms: i64,
    /// Window end, ms since epoch.
    pub end_ms: i64,
    /// `end_ms - start_ms`, stored rather than recomputed so it survives
    /// independently in the canonical hash.
    pub duration_ms: i64,
    /// Optional sub-breakdown of quantity by component.
    pub breakdown: Option<BTreeMap<String, i64>>,
}

/// Attestation block (spec §4.5 / §6.2).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Attestation {
    /// How consumption was attested.
    pub method: AttestationMethod,
    /// Confidence score implied by `method`.
    pub confidence_bps: i64,
    /// TEE quote, when `method == Tee`.
    pub tee_quote: Option<String>,
    /// TEE type identifier, when `method == Tee`.
    pub tee_type: Option<String>,
    /// Metering device identifier, when `method == SignedMeter`.
    pub meter_id: Option<String>,
    /// Oracle identifier, when `method == Oracle`.
    pub oracle_id: Option<String>,
}

/// Pricing block.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Pricing {
    /// Price per unit, in USD micros.
    pub rate_micros_per_unit: i64,
    /// `quantity * rate_micros_per_unit`.
    pub total_micros: i64,
    /// ISO currency code; always `"USD"` in this protocol.
    pub currency: String,
}

/// Context block tying the AMR to the request/response it metered.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Context {
    /// Hash of the request.
    pub request_hash: String,
    /// Hash of the response.
    pub response_hash: String,
    /// Optional session grouping identifier.
    pub session_id: Option<String>,
    /// Optional parent AMR, for hierarchical metering.
    pub parent_amr_id: Option<String>,
}

/// An attested metering record.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Amr {
    /// Protocol version, currently `"0.1"`.
    pub amr_version: String,
    /// Equal to `amr_hash` — kept as a separate field so external indexes
    /// can key on either name.
    pub record_id: String,
    /// Agent that consumed the resource.
    pub consumer_agent_id: String,
    /// Agent that provided the resource.
    pub provider_agent_id: String,
    /// Coarse resource category.
    pub resource_class: ResourceClass,
    /// Fine-grained resource identifier (e.g. `"gpt-4o"`, `"gpu_h100"`).
    pub resource_subtype: String,
    /// Metering block.
    pub metering: Metering,
    /// Attestation block.
    pub attestation: Attestation,
    /// Pricing block.
    pub pricing: Pricing,
    /// Context block.
    pub context: Context,
    /// Record creation timestamp, ms since epoch.
    pub timestamp_ms: i64,
    /// Content hash; identical to `record_id`.
    pub amr_hash: String,
    /// Provider's signature over `amr_hash`.
    pub provider_signature: String,
    /// Consumer's co-signature over `amr_hash`, appended after the fact.
    pub consumer_signature: Option<String>,
}

/// Inputs required to construct a new AMR.
#[derive(Debug, Clone)]
pub struct AmrContent {
    /// See [`Amr::consumer_agent_id`].
    pub consumer_agent_id: String,
    /// See [`Amr::provider_agent_id`].
    pub provider_agent_id: String,
    /// See [`Amr::resource_class`].
    pub resource_class: ResourceClass,
    /// See [`Amr::resource_subtype`].
    pub resource_subtype: String,
    /// See [`Metering::quantity`].
    pub quantity: i64,
    /// See [`Metering::unit`].
    pub unit: String,
    /// See [`Metering::start_ms`].
    pub start_ms: i64,
    /// See [`Metering::end_ms`].
    pub end_ms: i64,
    /// How the provider attests this measurement.
    pub attestation_method: AttestationMethod,
    /// See [`Pricing::rate_micros_per_unit`].
    pub rate_micros_per_unit: i64,
    /// See [`Context::request_hash`].
    pub request_hash: String,
    /// See [`Context::response_hash`].
    pub response_hash: String,
    /// Record creation timestamp, ms since epoch. Caller-supplied: this
    /// crate has no clock of its own.
    pub timestamp_ms: i64,
    /// See [`Attestation::tee_quote`].
    pub tee_quote: Option<String>,
    /// See [`Attestation::tee_type`].
    pub tee_type: Option<String>,
    /// See [`Attestation::meter_id`].
    pub meter_id: Option<String>,
    /// See [`Attestation::oracle_id`].
    pub oracle_id: Option<String>,
    /// See [`Context::session_id`].
    pub session_id: Option<String>,
    /// See [`Context::parent_amr_id`].
    pub parent_amr_id: Option<String>,
}

fn metering_value(m: &Metering) -> Value {
    let mut fields = vec![
        ("quantity", Value::Int(m.quantity)),
        ("unit", Value::from(m.unit.as_str())),
        ("start_ms", Value::Int(m.start_ms)),
        ("end_ms", Value::Int(m.end_ms)),
        ("duration_ms", Value::Int(m.duration_ms)),
    ];
    if let Some(breakdown) = &m.breakdown {
        fields.push((
            "breakdown",
            Value::map(breakdown.iter().map(|(k, v)| (k.clone(), Value::Int(*v)))),
        ));
    }
    Value::map(fields)
}

fn attestation_value(a: &Attestation) -> Value {
    let mut fields = vec![
        ("method", Value::from(a.method.as_str())),
        ("confidence_bps", Value::Int(a.confidence_bps)),
    ];
    if let Some(v) = &a.tee_quote {
        fields.push(("tee_quote", Value::from(v.as_str())));
    }
    if let Some(v) = &a.tee_type {
        fields.push(("tee_type", Value::from(v.as_str())));
    }
    if let Some(v) = &a.meter_id {
        fields.push(("meter_id", Value::from(v.as_str())));
    }
    if let Some(v) = &a.oracle_id {
        fields.push(("oracle_id", Value::from(v.as_str())));
    }
    Value::map(fields)
}

fn pricing_value(p: &Pricing) -> Value {
    Value::map([
        ("rate_micros_per_unit", Value::Int(p.rate_micros_per_unit)),
        ("total_micros", Value::Int(p.total_micros)),
        ("currency", Value::from(p.currency.as_str())),
    ])
}

fn context_value(c: &Context) -> Value {
    let mut fields = vec![
        ("request_hash", Value::from(c.request_hash.as_str())),
        ("response_hash", Value::from(c.response_hash.as_str())),
    ];
    if let Some(v) = &c.session_id {
        fields.push(("session_id", Value::from(v.as_str())));
    }
    if let Some(v) = &c.parent_amr_id {
        fields.push(("parent_amr_id", Value::from(v.as_str())));
    }
    Value::map(fields)
}

/// Fields hashed for an AMR's identity: everything except `record_id`,
/// `amr_hash`, `provider_signature`, `consumer_signature` (spec §4.3, §4.5 —
/// the hash-embedded-in-hashed-object exception documents `record_id` as a
/// second name for the same value, both excluded from rehashing).
fn content_value(
    content: &AmrContent,
    metering: &Metering,
    attestation: &Attestation,
    pricing: &Pricing,
    context: &Context,
) -> Value {
    Value::map([
        ("amr_version", Value::from(AMR_VERSION)),
        ("consumer_agent_id", Value::from(content.consumer_agent_id.as_str())),
        ("provider_agent_id", Value::from(content.provider_agent_id.as_str())),
        ("resource_class", Value::from(content.resource_class.as_str())),
        ("resource_subtype", Value::from(content.resource_subtype.as_str())),
        ("metering", metering_value(metering)),
        ("attestation", attestation_value(attestation)),
        ("pricing", pricing_value(pricing)),
        ("context", context_value(context)),
        ("timestamp_ms", Value::Int(content.timestamp_ms)),
    ])
}

/// Build and sign a new AMR as the provider.
pub fn make_amr(content: AmrContent, provider_private_key: &str) -> Result<Amr> {
    let metering = Metering {
        quantity: content.quantity,
        unit: content.unit.clone(),
        start_ms: content.start_ms,
        end_ms: content.end_ms,
        duration_ms: content.end_ms - content.start_ms,
        breakdown: None,
    };
    let attestation = Attestation {
        method: content.attestation_method,
        confidence_bps: content.attestation_method.confidence_bps(),
        tee_quote: content.tee_quote.clone(),
        tee_type: content.tee_type.clone(),
        meter_id: content.meter_id.clone(),
        oracle_id: content.oracle_id.clone(),
    };
    let pricing = Pricing {
        rate_micros_per_unit: content.rate_micros_per_unit,
        total_micros: content.quantity * content.rate_micros_per_unit,
        currency: "USD".to_string(),
    };
    let context = Context {
        request_hash: content.request_hash.clone(),
        response_hash: content.response_hash.clone(),
        session_id: content.session_id.clone(),
        parent_amr_id: content.parent_amr_id.clone(),
    };

    let value = content_value(&content, &metering, &attestation, &pricing, &context);
    let content_hash = crypto::hash(&canonicalize_bytes(&value)?);
    let signature = crypto::sign(&content_hash, provider_private_key)
        .map_err(|e| Error::Signature(e.to_string()))?;

    Ok(Amr {
        amr_version: AMR_VERSION.to_string(),
        record_id: content_hash.clone(),
        consumer_agent_id: content.consumer_agent_id,
        provider_agent_id: content.provider_agent_id,
        resource_class: content.resource_class,
        resource_subtype: content.resource_subtype,
        metering,
        attestation,
        pricing,
        context,
        timestamp_ms: content.timestamp_ms,
        amr_hash: content_hash,
        provider_signature: signature,
        consumer_signature: None,
    })
}

/// Recompute an AMR's content hash — its identity.
pub fn amr_hash(amr: &Amr) -> Result<String> {
    let value = Value::map([
        ("amr_version", Value::from(amr.amr_version.as_str())),
        ("consumer_agent_id", Value::from(amr.consumer_agent_id.as_str())),
        ("provider_agent_id", Value::from(amr.provider_agent_id.as_str())),
        ("resource_class", Value::from(amr.resource_class.as_str())),
        ("resource_subtype", Value::from(amr.resource_subtype.as_str())),
        ("metering", metering_value(&amr.metering)),
        ("attestation", attestation_value(&amr.attestation)),
        ("pricing", pricing_value(&amr.pricing)),
        ("context", context_value(&amr.context)),
        ("timestamp_ms", Value::Int(amr.timestamp_ms)),
    ]);
    Ok(crypto::hash(&canonicalize_bytes(&value)?))
}

/// Append the consumer's co-signature over the existing `amr_hash`. Does
/// not rebuild or rehash any content.
pub fn cosign_amr(amr: &mut Amr, consumer_private_key: &str) -> Result<()> {
    let signature = crypto::sign(&amr.amr_hash, consumer_private_key)
        .map_err(|e| Error::Signature(e.to_string()))?;
    amr.consumer_signature = Some(signature);
    Ok(())
}

/// Verify an AMR's provider signature (and consumer co-signature, if
/// present) against the two agents' public keys — which, per spec §3, are
/// the agent IDs themselves.
pub fn verify_amr(amr: &Amr) -> VerifyOutcome {
    let hash = match amr_hash(amr) {
        Ok(h) => h,
        Err(e) => {
            return VerifyOutcome { valid: false, hash: None, error: Some(e.to_string()) }
        }
    };
    if hash != amr.amr_hash {
        return VerifyOutcome {
            valid: false,
            hash: Some(hash),
            error: Some("amr_hash does not match recomputed content hash".to_string()),
        };
    }

    let provider_valid = crypto::verify(&hash, &amr.provider_signature, &amr.provider_agent_id);
    if !provider_valid {
        return VerifyOutcome {
            valid: false,
            hash: Some(hash),
            error: Some("Invalid provider signature".to_string()),
        };
    }

    if let Some(consumer_sig) = &amr.consumer_signature {
        if !crypto::verify(&hash, consumer_sig, &amr.consumer_agent_id) {
            return VerifyOutcome {
                valid: false,
                hash: Some(hash),
                error: Some("Invalid consumer signature".to_string()),
            };
        }
    }

    VerifyOutcome { valid: true, hash: Some(hash), error: None }
}

/// Does this AMR's attestation meet or exceed a minimum confidence?
pub fn meets_confidence_threshold(amr: &Amr, min_confidence_bps: i64) -> bool {
    amr.attestation.confidence_bps >= min_confidence_bps
}

/// Summary produced by [`aggregate_amrs`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AmrAggregate {
    /// Sum of `metering.quantity` across all AMRs.
    pub total_quantity: i64,
    /// Sum of `pricing.total_micros` across all AMRs.
    pub total_micros: i64,
    /// Per-resource-class `(quantity, micros)` totals.
    pub by_resource_class: BTreeMap<&'static str, (i64, i64)>,
    /// Mean confidence, truncated to an integer.
    pub avg_confidence_bps: i64,
}

/// Aggregate a list of AMRs into totals, a per-resource-class breakdown,
/// and mean confidence.
pub fn aggregate_amrs(amrs: &[Amr]) -> AmrAggregate {
    let mut agg = AmrAggregate::default();
    let mut total_confidence: i64 = 0;

    for amr in amrs {
        agg.total_quantity += amr.metering.quantity;
        agg.total_micros += amr.pricing.total_micros;
        total_confidence += amr.attestation.confidence_bps;

        let entry = agg.by_resource_class.entry(amr.resource_class.as_str()).or_insert((0, 0));
        entry.0 += amr.metering.quantity;
        entry.1 += amr.pricing.total_micros;
    }

    agg.avg_confidence_bps = if amrs.is_empty() { 0 } else { total_confidence / amrs.len() as i64 };
    agg
}
