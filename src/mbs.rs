//! MBS — Machine Balance Sheet.
//!
//! A signed snapshot of one agent's assets, liabilities, and burn rate,
//! with a derived solvency ratio the verifier recomputes and compares.

use crate::canonical::{canonicalize_bytes, Value};
use crate::crypto;
use crate::error::Error;
use crate::msr::VerifyOutcome;

/// The only MBS version this crate accepts.
pub const MBS_VERSION: &str = "0.1";

/// Sentinel solvency ratio used when there are no liabilities at all.
pub const MAX_SOLVENCY: i64 = 999_999;

/// A single asset line.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Asset {
    /// Asset category (e.g. `"usdc"`).
    pub asset_type: String,
    /// Amount, USD micros. Must be non-negative.
    pub amount: i64,
}

/// A single liability line.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Liability {
    /// Liability category (e.g. `"owed"`).
    pub liability_type: String,
    /// Amount, USD micros. Must be non-negative.
    pub amount: i64,
}

/// A balance sheet snapshot, signed by the agent it describes.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Mbs {
    /// Protocol version, currently `"0.1"`.
    pub mbs_version: String,
    /// The agent this snapshot describes.
    pub agent_id: String,
    /// Ordered asset list.
    pub assets: Vec<Asset>,
    /// Ordered liability list.
    pub liabilities: Vec<Liability>,
    /// Burn rate, USD micros per second.
    pub burn_rate_usd_micros_per_s: i64,
    /// `floor(assets * 10000 / liabilities)`, or [`MAX_SOLVENCY`] when
    /// liabilities are zero.
    pub solvency_ratio: i64,
    /// Snapshot timestamp, ms since epoch.
    pub timestamp_ms: i64,
    /// Agent's signature over the content hash.
    pub signature_ed25519: String,
}

fn assets_value(assets: &[Asset]) -> Value {
    Value::array(assets.iter().map(|a| {
        Value::map([("asset_type", Value::from(a.asset_type.as_str())), ("amount", Value::Int(a.amount))])
    }))
}

fn liabilities_value(liabilities: &[Liability]) -> Value {
    Value::array(liabilities.iter().map(|l| {
        Value::map([
            ("liability_type", Value::from(l.liability_type.as_str())),
            ("amount", Value::Int(l.amount)),
        ])
    }))
}

/// Compute the solvency ratio (basis points) from raw asset/liability
/// lists, without constructing an [`Mbs`].
pub fn compute_solvency_ratio(assets: &[Asset], liabilities: &[Liability]) -> i64 {
    let total_assets: i64 = assets.iter().map(|a| a.amount).sum();
    let total_liabilities: i64 = liabilities.iter().map(|l| l.amount).sum();
    if total_liabilities == 0 {
        return MAX_SOLVENCY;
    }
    (total_assets * 10_000) / total_liabilities
}

/// Runway until insolvency, in seconds. `+inf` when `burn_rate == 0` and
/// assets exceed liabilities; `0` when `burn_rate == 0` and they do not.
pub fn compute_runway_seconds(mbs: &Mbs) -> f64 {
    let total_assets: i64 = mbs.assets.iter().map(|a| a.amount).sum();
    let total_liabilities: i64 = mbs.liabilities.iter().map(|l| l.amount).sum();
    let net = total_assets - total_liabilities;

    if mbs.burn_rate_usd_micros_per_s == 0 {
        return if net > 0 { f64::INFINITY } else { 0.0 };
    }
    (net as f64 / mbs.burn_rate_usd_micros_per_s as f64).max(0.0)
}

/// Inputs required to construct a new MBS.
#[derive(Debug, Clone)]
pub struct MbsContent {
    /// See [`Mbs::agent_id`].
    pub agent_id: String,
    /// See [`Mbs::assets`].
    pub assets: Vec<Asset>,
    /// See [`Mbs::liabilities`].
    pub liabilities: Vec<Liability>,
    /// See [`Mbs::burn_rate_usd_micros_per_s`].
    pub burn_rate_usd_micros_per_s: i64,
    /// See [`Mbs::timestamp_ms`]. Caller-supplied: this crate has no clock.
    pub timestamp_ms: i64,
}

fn content_value(content: &MbsContent, solvency_ratio: i64) -> Value {
    Value::map([
        ("mbs_version", Value::from(MBS_VERSION)),
        ("agent_id", Value::from(content.agent_id.as_str())),
        ("assets", assets_value(&content.assets)),
        ("liabilities", liabilities_value(&content.liabilities)),
        ("burn_rate_usd_micros_per_s", Value::Int(content.burn_rate_usd_micros_per_s)),
        ("solvency_ratio", Value::Int(solvency_ratio)),
        ("timestamp_ms", Value::Int(content.timestamp_ms)),
    ])
}

/// Build and sign a new MBS as the agent it describes.
pub fn compute_mbs(content: MbsContent, private_key: &str) -> crate::error::Result<Mbs> {
    let solvency_ratio = compute_solvency_ratio(&content.assets, &content.liabilities);
    let value = content_value(&content, solvency_ratio);
    let hash = crypto::hash(&canonicalize_bytes(&value)?);
    let signature = crypto::sign(&hash, private_key).map_err(|e| Error::Signature(e.to_string()))?;

    Ok(Mbs {
        mbs_version: MBS_VERSION.to_string(),
        agent_id: content.agent_id,
        assets: content.assets,
        liabilities: content.liabilities,
        burn_rate_usd_micros_per_s: content.burn_rate_usd_micros_per_s,
        solvency_ratio,
        timestamp_ms: content.timestamp_ms,
        signature_ed25519: signature,
    })
}

fn mbs_hash(mbs: &Mbs) -> crate::error::Result<String> {
    let value = Value::map([
        ("mbs_version", Value::from(mbs.mbs_version.as_str())),
        ("agent_id", Value::from(mbs.agent_id.as_str())),
        ("assets", assets_value(&mbs.assets)),
        ("liabilities", liabilities_value(&mbs.liabilities)),
        ("burn_rate_usd_micros_per_s", Value::Int(mbs.burn_rate_usd_micros_per_s)),
        ("solvency_ratio", Value::Int(mbs.solvency_ratio)),
        ("timestamp_ms", Value::Int(mbs.timestamp_ms)),
    ]);
    Ok(crypto::hash(&canonicalize_bytes(&value)?))
}

/// Verify an MBS. Checks are ordered cheapest-first: version,
/// non-negative amounts, non-negative burn rate, solvency ratio, then the
/// signature.
pub fn verify_mbs(mbs: &Mbs, agent_public_key: &str) -> VerifyOutcome {
    if mbs.mbs_version != MBS_VERSION {
        return VerifyOutcome { valid: false, hash: None, error: Some("Invalid mbs_version".into()) };
    }
    if mbs.assets.iter().any(|a| a.amount < 0) {
        return VerifyOutcome {
            valid: false,
            hash: None,
            error: Some("Asset amount cannot be negative".into()),
        };
    }
    if mbs.liabilities.iter().any(|l| l.amount < 0) {
        return VerifyOutcome {
            valid: false,
            hash: None,
            error: Some("Liability amount cannot be negative".into()),
        };
    }
    if mbs.burn_rate_usd_micros_per_s < 0 {
        return VerifyOutcome {
            valid: false,
            hash: None,
            error: Some("Burn rate cannot be negative".into()),
        };
    }

    let expected_ratio = compute_solvency_ratio(&mbs.assets, &mbs.liabilities);
    if mbs.solvency_ratio != expected_ratio {
        return VerifyOutcome {
            valid: false,
            hash: None,
            error: Some("Invalid solvency ratio".into()),
        };
    }

    let hash = match mbs_hash(mbs) {
        Ok(h) => h,
        Err(e) => return VerifyOutcome { valid: false, hash: None, error: Some(e.to_string()) },
    };

    if !crypto::verify(&hash, &mbs.signature_ed25519, agent_public_key) {
        return VerifyOutcome { valid: false, hash: Some(hash), error: Some("Invalid signature".into()) };
    }

    VerifyOutcome { valid: true, hash: Some(hash), error: None }
}
