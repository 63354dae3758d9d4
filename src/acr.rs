//! ACR — Agent Credit Rating.
//!
//! A streaming, single-pass, O(1)-amortized-per-MSR reduction of an
//! agent's settlement history into a six-dimensional summary. Unsigned:
//! it is an aggregation output, not a record a counterparty verifies.

use std::collections::BTreeMap;

use crate::msr::Msr;

/// The only ACR version this crate produces.
pub const ACR_VERSION: &str = "0.1";

const MS_PER_DAY: f64 = 86_400_000.0;

/// The six dimensions of an agent credit rating.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcrDimensions {
    /// V: total settlement volume, USD micros.
    pub volume_usd_micros: i64,
    /// Ω: transactions per day over the observed window.
    pub velocity_per_day: f64,
    /// σ: settled / total, in `[0,1]`.
    pub settlement_ratio: f64,
    /// H: Shannon entropy of the counterparty distribution, bits.
    pub counterparty_entropy: f64,
    /// η: reserved; requires an external netting outcome. Always `0.0`.
    pub netting_efficiency: f64,
    /// τ: `1 - coefficient_of_variation(daily_volumes)`.
    pub temporal_consistency: f64,
}

impl Default for AcrDimensions {
    fn default() -> Self {
        Self {
            volume_usd_micros: 0,
            velocity_per_day: 0.0,
            settlement_ratio: 1.0,
            counterparty_entropy: 0.0,
            netting_efficiency: 0.0,
            temporal_consistency: 1.0,
        }
    }
}

/// An agent credit rating summary over a window of MSRs.
#[derive(Debug, Clone, PartialEq)]
pub struct Acr {
    /// The agent this rating describes.
    pub agent_id: String,
    /// Protocol version, currently `"0.1"`.
    pub acr_version: String,
    /// When this rating was computed, ms since epoch.
    pub computed_at_ms: i64,
    /// Earliest MSR timestamp in the window.
    pub window_start_ms: i64,
    /// Latest MSR timestamp in the window.
    pub window_end_ms: i64,
    /// Number of MSRs observed.
    pub msr_count: i64,
    /// The six computed dimensions.
    pub dimensions: AcrDimensions,
    /// Hash of the underlying MSR set, or `"merged"` for a multi-input merge.
    pub raw_data_hash: String,
}

/// Streaming ACR computer: feed MSRs one at a time with [`Self::add_msr`],
/// then call [`Self::compute`]. O(1) amortized per call; O(counterparties +
/// days) at finalization.
pub struct AcrComputer {
    agent_id: String,
    msr_count: i64,
    total_volume: i64,
    counterparty_counts: BTreeMap<String, i64>,
    daily_volumes: BTreeMap<i64, i64>,
    settled_count: i64,
    min_ts: Option<i64>,
    max_ts: Option<i64>,
}

impl AcrComputer {
    /// Start a new, empty computer tracking `agent_id`.
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            msr_count: 0,
            total_volume: 0,
            counterparty_counts: BTreeMap::new(),
            daily_volumes: BTreeMap::new(),
            settled_count: 0,
            min_ts: None,
            max_ts: None,
        }
    }

    /// Add one MSR to the running computation. `settled`
    /// records whether this receipt has cleared; defaults to `true` at the
    /// call sites that don't track settlement separately.
    pub fn add_msr(&mut self, msr: &Msr, settled: bool) {
        self.msr_count += 1;
        self.total_volume += msr.price_usd_micros;

        let counterparty = if msr.payer_agent_id == self.agent_id {
            msr.payee_agent_id.clone()
        } else {
            msr.payer_agent_id.clone()
        };
        *self.counterparty_counts.entry(counterparty).or_insert(0) += 1;

        let day = msr.timestamp_ms.div_euclid(86_400_000);
        *self.daily_volumes.entry(day).or_insert(0) += msr.price_usd_micros;

        if settled {
            self.settled_count += 1;
        }

        self.min_ts = Some(self.min_ts.map_or(msr.timestamp_ms, |t| t.min(msr.timestamp_ms)));
        self.max_ts = Some(self.max_ts.map_or(msr.timestamp_ms, |t| t.max(msr.timestamp_ms)));
    }

    fn entropy(&self) -> f64 {
        if self.msr_count == 0 {
            return 0.0;
        }
        let total = self.msr_count as f64;
        self.counterparty_counts
            .values()
            .map(|&count| {
                let p = count as f64 / total;
                if p > 0.0 {
                    -p * p.log2()
                } else {
                    0.0
                }
            })
            .sum()
    }

    fn temporal_consistency(&self) -> f64 {
        let volumes: Vec<f64> = self.daily_volumes.values().map(|&v| v as f64).collect();
        if volumes.len() < 2 {
            return 1.0;
        }
        let mean = volumes.iter().sum::<f64>() / volumes.len() as f64;
        if mean == 0.0 {
            return 1.0;
        }
        let variance = volumes.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / volumes.len() as f64;
        1.0 - (variance.sqrt() / mean)
    }

    /// Finalize the current window into an [`Acr`]. `computed_at_ms` and
    /// `raw_data_hash` are caller-supplied: this crate has no clock and does
    /// not hash MSR sets on the aggregator's behalf.
    pub fn compute(&self, raw_data_hash: impl Into<String>, computed_at_ms: i64) -> Acr {
        if self.msr_count == 0 {
            return Acr {
                agent_id: self.agent_id.clone(),
                acr_version: ACR_VERSION.to_string(),
                computed_at_ms,
                window_start_ms: computed_at_ms,
                window_end_ms: computed_at_ms,
                msr_count: 0,
                dimensions: AcrDimensions::default(),
                raw_data_hash: raw_data_hash.into(),
            };
        }

        let min_ts = self.min_ts.unwrap();
        let max_ts = self.max_ts.unwrap();
        let time_span_days = ((max_ts - min_ts) as f64 / MS_PER_DAY).max(1.0);

        Acr {
            agent_id: self.agent_id.clone(),
            acr_version: ACR_VERSION.to_string(),
            computed_at_ms,
            window_start_ms: min_ts,
            window_end_ms: max_ts,
            msr_count: self.msr_count,
            dimensions: AcrDimensions {
                volume_usd_micros: self.total_volume,
                velocity_per_day: self.msr_count as f64 / time_span_days,
                settlement_ratio: self.settled_count as f64 / self.msr_count as f64,
                counterparty_entropy: self.entropy(),
                netting_efficiency: 0.0,
                temporal_consistency: self.temporal_consistency(),
            },
            raw_data_hash: raw_data_hash.into(),
        }
    }

    /// Clear all accumulated state, ready for a new computation window.
    pub fn reset(&mut self) {
        self.msr_count = 0;
        self.total_volume = 0;
        self.counterparty_counts.clear();
        self.daily_volumes.clear();
        self.settled_count = 0;
        self.min_ts = None;
        self.max_ts = None;
    }
}

/// Convenience wrapper: compute an ACR from a complete MSR slice in one
/// call, treating every MSR as settled.
pub fn compute_acr(agent_id: &str, msrs: &[Msr], raw_data_hash: &str, computed_at_ms: i64) -> Acr {
    let mut computer = AcrComputer::new(agent_id);
    for msr in msrs {
        computer.add_msr(msr, true);
    }
    computer.compute(raw_data_hash, computed_at_ms)
}

/// Optional per-dimension minimum thresholds an agent can be evaluated
/// against.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AcrPolicy {
    /// Minimum acceptable `volume_usd_micros`.
    pub min_volume_usd_micros: Option<i64>,
    /// Minimum acceptable `velocity_per_day`.
    pub min_velocity_per_day: Option<f64>,
    /// Minimum acceptable `settlement_ratio`.
    pub min_settlement_ratio: Option<f64>,
    /// Minimum acceptable `counterparty_entropy`.
    pub min_counterparty_entropy: Option<f64>,
    /// Minimum acceptable `netting_efficiency`.
    pub min_netting_efficiency: Option<f64>,
    /// Minimum acceptable `temporal_consistency`.
    pub min_temporal_consistency: Option<f64>,
}

/// Does `acr` meet every threshold `policy` names? Returns `false` on the
/// first violation.
pub fn evaluate_acr(acr: &Acr, policy: &AcrPolicy) -> bool {
    let d = &acr.dimensions;

    if let Some(min) = policy.min_volume_usd_micros {
        if d.volume_usd_micros < min {
            return false;
        }
    }
    if let Some(min) = policy.min_velocity_per_day {
        if d.velocity_per_day < min {
            return false;
        }
    }
    if let Some(min) = policy.min_settlement_ratio {
        if d.settlement_ratio < min {
            return false;
        }
    }
    if let Some(min) = policy.min_counterparty_entropy {
        if d.counterparty_entropy < min {
            return false;
        }
    }
    if let Some(min) = policy.min_netting_efficiency {
        if d.netting_efficiency < min {
            return false;
        }
    }
    if let Some(min) = policy.min_temporal_consistency {
        if d.temporal_consistency < min {
            return false;
        }
    }
    true
}

/// Merge several ACRs, e.g. from sharded computation. A
/// single-element list is returned unchanged — not recomputed. Merging
/// two or more produces `raw_data_hash = "merged"`.
pub fn merge_acrs(acrs: &[Acr], computed_at_ms: i64) -> crate::error::Result<Acr> {
    if acrs.is_empty() {
        return Err(crate::error::Error::Input("cannot merge an empty ACR list".into()));
    }
    if acrs.len() == 1 {
        return Ok(acrs[0].clone());
    }

    let agent_id = acrs[0].agent_id.clone();
    let mut total_volume: i64 = 0;
    let mut total_count: i64 = 0;
    let mut total_settled: f64 = 0.0;
    let mut min_ts: Option<i64> = None;
    let mut max_ts: Option<i64> = None;

    for acr in acrs {
        total_volume += acr.dimensions.volume_usd_micros;
        total_count += acr.msr_count;
        total_settled += acr.dimensions.settlement_ratio * acr.msr_count as f64;
        min_ts = Some(min_ts.map_or(acr.window_start_ms, |t| t.min(acr.window_start_ms)));
        max_ts = Some(max_ts.map_or(acr.window_end_ms, |t| t.max(acr.window_end_ms)));
    }

    let min_ts = min_ts.unwrap();
    let max_ts = max_ts.unwrap();
    let time_span_days = ((max_ts - min_ts) as f64 / MS_PER_DAY).max(1.0);

    let mut weighted_entropy = 0.0;
    let mut weighted_consistency = 0.0;
    for acr in acrs {
        let weight = if total_count > 0 { acr.msr_count as f64 / total_count as f64 } else { 0.0 };
        weighted_entropy += acr.dimensions.counterparty_entropy * weight;
        weighted_consistency += acr.dimensions.temporal_consistency * weight;
    }

    Ok(Acr {
        agent_id,
        acr_version: ACR_VERSION.to_string(),
        computed_at_ms,
        window_start_ms: min_ts,
        window_end_ms: max_ts,
        msr_count: total_count,
        dimensions: AcrDimensions {
            volume_usd_micros: total_volume,
            velocity_per_day: total_count as f64 / time_span_days,
            settlement_ratio: if total_count > 0 { total_settled / total_count as f64 } else { 1.0 },
            counterparty_entropy: weighted_entropy,
            netting_efficiency: 0.0,
            temporal_consistency: weighted_consistency,
        },
        raw_data_hash: "merged".to_string(),
    })
}
