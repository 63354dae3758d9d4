//! Meter helpers (spec §2, C10) — thin resource-class specializations
//! over [`crate::amr::make_amr`].
//!
//! Each function fixes `resource_class` and picks a sensible default
//! [`AttestationMethod`], leaving everything else to the caller. Grounded in
//! the original reference's `meter.py`, extended to all five
//! [`ResourceClass`] variants for symmetry (`make_amr` already supports all
//! five; the original only wrapped two).

use crate::amr::{Amr, AmrContent, AttestationMethod, ResourceClass};
use crate::error::Result;

/// Fields common to every meter helper, independent of resource class.
#[derive(Debug, Clone)]
pub struct MeterInputs {
    /// Agent consuming the resource.
    pub consumer_agent_id: String,
    /// Agent providing the resource.
    pub provider_agent_id: String,
    /// Fine-grained resource identifier.
    pub resource_subtype: String,
    /// Quantity consumed.
    pub quantity: i64,
    /// Unit of measurement.
    pub unit: String,
    /// Measurement window start, ms since epoch.
    pub start_ms: i64,
    /// Measurement window end, ms since epoch.
    pub end_ms: i64,
    /// Price per unit, USD micros.
    pub rate_micros_per_unit: i64,
    /// Hash of the request that triggered consumption.
    pub request_hash: String,
    /// Hash of the resulting response.
    pub response_hash: String,
    /// Record creation timestamp, ms since epoch.
    pub timestamp_ms: i64,
    /// Optional metering device identifier.
    pub meter_id: Option<String>,
    /// Optional session grouping identifier.
    pub session_id: Option<String>,
    /// Optional parent AMR, for hierarchical metering.
    pub parent_amr_id: Option<String>,
}

fn build(
    inputs: MeterInputs,
    resource_class: ResourceClass,
    attestation_method: AttestationMethod,
    oracle_id: Option<String>,
) -> AmrContent {
    AmrContent {
        consumer_agent_id: inputs.consumer_agent_id,
        provider_agent_id: inputs.provider_agent_id,
        resource_class,
        resource_subtype: inputs.resource_subtype,
        quantity: inputs.quantity,
        unit: inputs.unit,
        start_ms: inputs.start_ms,
        end_ms: inputs.end_ms,
        attestation_method,
        rate_micros_per_unit: inputs.rate_micros_per_unit,
        request_hash: inputs.request_hash,
        response_hash: inputs.response_hash,
        timestamp_ms: inputs.timestamp_ms,
        tee_quote: None,
        tee_type: None,
        meter_id: inputs.meter_id,
        oracle_id,
        session_id: inputs.session_id,
        parent_amr_id: inputs.parent_amr_id,
    }
}

/// Meter compute resources (CPU/GPU, vCPU-hours, etc.), attested by a
/// signed metering device by default.
pub fn make_compute_meter(
    inputs: MeterInputs,
    attestation_method: AttestationMethod,
    provider_private_key: &str,
) -> Result<Amr> {
    crate::amr::make_amr(
        build(inputs, ResourceClass::Compute, attestation_method, None),
        provider_private_key,
    )
}

/// Meter LLM inference token consumption. `tokens` is converted to
/// thousands for pricing (rounding up for any remainder under 1000),
/// matching the original's `tokens_1k` convention.
pub fn make_inference_meter(
    mut inputs: MeterInputs,
    tokens: i64,
    attestation_method: AttestationMethod,
    provider_private_key: &str,
) -> Result<Amr> {
    inputs.quantity = if tokens >= 1000 { tokens / 1000 } else { 1 };
    inputs.unit = "tokens_1k".to_string();
    crate::amr::make_amr(
        build(inputs, ResourceClass::Inference, attestation_method, None),
        provider_private_key,
    )
}

/// Meter energy consumption (grid power, renewables), attested by an
/// oracle by default.
pub fn make_energy_meter(
    inputs: MeterInputs,
    attestation_method: AttestationMethod,
    oracle_id: Option<String>,
    provider_private_key: &str,
) -> Result<Amr> {
    crate::amr::make_amr(
        build(inputs, ResourceClass::Energy, attestation_method, oracle_id),
        provider_private_key,
    )
}

/// Meter durable storage consumption (object storage, databases, file systems).
pub fn make_storage_meter(
    inputs: MeterInputs,
    attestation_method: AttestationMethod,
    provider_private_key: &str,
) -> Result<Amr> {
    crate::amr::make_amr(
        build(inputs, ResourceClass::Storage, attestation_method, None),
        provider_private_key,
    )
}

/// Meter network bandwidth consumption (egress, ingress, CDN).
pub fn make_bandwidth_meter(
    inputs: MeterInputs,
    attestation_method: AttestationMethod,
    provider_private_key: &str,
) -> Result<Amr> {
    crate::amr::make_amr(
        build(inputs, ResourceClass::Bandwidth, attestation_method, None),
        provider_private_key,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto;

    fn sample_inputs(consumer: &str, provider: &str) -> MeterInputs {
        MeterInputs {
            consumer_agent_id: consumer.to_string(),
            provider_agent_id: provider.to_string(),
            resource_subtype: "gpu_h100".to_string(),
            quantity: 10,
            unit: "gpu_seconds".to_string(),
            start_ms: 1_700_000_000_000,
            end_ms: 1_700_000_010_000,
            rate_micros_per_unit: 1000,
            request_hash: crypto::hash(b"req"),
            response_hash: crypto::hash(b"resp"),
            timestamp_ms: 1_700_000_010_000,
            meter_id: Some("meter-1".to_string()),
            session_id: None,
            parent_amr_id: None,
        }
    }

    #[test]
    fn compute_meter_sets_resource_class() {
        let (sk, pk) = crypto::generate_keypair();
        let amr =
            make_compute_meter(sample_inputs("consumer-1", &pk), AttestationMethod::SignedMeter, &sk).unwrap();
        assert_eq!(amr.resource_class, ResourceClass::Compute);
    }

    #[test]
    fn inference_meter_converts_tokens_to_thousands() {
        let (sk, pk) = crypto::generate_keypair();
        let mut inputs = sample_inputs("consumer-1", &pk);
        inputs.resource_subtype = "gpt-4o".to_string();
        let amr = make_inference_meter(inputs, 4500, AttestationMethod::SignedMeter, &sk).unwrap();
        assert_eq!(amr.resource_class, ResourceClass::Inference);
        assert_eq!(amr.metering.quantity, 4);
        assert_eq!(amr.metering.unit, "tokens_1k");
    }

    #[test]
    fn inference_meter_rounds_small_counts_up_to_one() {
        let (sk, pk) = crypto::generate_keypair();
        let inputs = sample_inputs("consumer-1", &pk);
        let amr = make_inference_meter(inputs, 500, AttestationMethod::SignedMeter, &sk).unwrap();
        assert_eq!(amr.metering.quantity, 1);
    }

    #[test]
    fn energy_meter_attaches_oracle_id() {
        let (sk, pk) = crypto::generate_keypair();
        let amr = make_energy_meter(
            sample_inputs("consumer-1", &pk),
            AttestationMethod::Oracle,
            Some("utility-co".to_string()),
            &sk,
        )
        .unwrap();
        assert_eq!(amr.resource_class, ResourceClass::Energy);
        assert_eq!(amr.attestation.oracle_id.as_deref(), Some("utility-co"));
    }

    #[test]
    fn storage_and_bandwidth_meters_set_resource_class() {
        let (sk, pk) = crypto::generate_keypair();
        let storage =
            make_storage_meter(sample_inputs("consumer-1", &pk), AttestationMethod::SignedMeter, &sk).unwrap();
        assert_eq!(storage.resource_class, ResourceClass::Storage);

        let bandwidth =
            make_bandwidth_meter(sample_inputs("consumer-1", &pk), AttestationMethod::SignedMeter, &sk).unwrap();
        assert_eq!(bandwidth.resource_class, ResourceClass::Bandwidth);
    }
}
