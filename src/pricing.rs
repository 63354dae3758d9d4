//! Named resource pricing table (spec §2, C11).
//!
//! A static set of tariff defaults callers may consult when constructing
//! AMRs via [`crate::meter`], keyed by `resource_subtype`. Not authoritative
//! pricing — agents are free to negotiate their own rates; this is a
//! starting point for demos and tests.

use std::collections::BTreeMap;

/// One tariff entry: rate per unit (USD micros) and the unit it prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tariff {
    /// Price per unit, USD micros.
    pub rate_micros_per_unit: i64,
    /// Unit of measurement this rate applies to.
    pub unit: &'static str,
}

/// Lookup table from `resource_subtype` to its default [`Tariff`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricingTable {
    entries: BTreeMap<&'static str, Tariff>,
}

impl Default for PricingTable {
    fn default() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert("gpt-4o", Tariff { rate_micros_per_unit: 5, unit: "tokens_1k" });
        entries.insert("gpt-4-turbo", Tariff { rate_micros_per_unit: 10, unit: "tokens_1k" });
        entries.insert("llama-3-70b", Tariff { rate_micros_per_unit: 4, unit: "tokens_1k" });
        entries.insert("mistral-large", Tariff { rate_micros_per_unit: 8, unit: "tokens_1k" });
        entries.insert("gpu_h100", Tariff { rate_micros_per_unit: 1000, unit: "gpu_seconds" });
        entries.insert("gpu_a100", Tariff { rate_micros_per_unit: 500, unit: "gpu_seconds" });
        entries.insert("s3_standard", Tariff { rate_micros_per_unit: 23_000, unit: "gb_month" });
        entries.insert("egress", Tariff { rate_micros_per_unit: 90_000, unit: "gb" });
        entries.insert("grid_power", Tariff { rate_micros_per_unit: 100_000, unit: "kwh" });
        Self { entries }
    }
}

impl PricingTable {
    /// Look up the default tariff for a resource subtype, if one is known.
    pub fn get(&self, resource_subtype: &str) -> Option<Tariff> {
        self.entries.get(resource_subtype).copied()
    }

    /// Insert or overwrite a tariff, e.g. to apply a negotiated rate.
    pub fn set(&mut self, resource_subtype: &'static str, tariff: Tariff) {
        self.entries.insert(resource_subtype, tariff);
    }
}
