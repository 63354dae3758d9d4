//! DBP — Default/Bankruptcy Primitive (spec §4.9, §4.11).
//!
//! A signed declaration that an agent has defaulted, together with a
//! liquidation plan distributing its liquid assets across creditors.
//! The only record type in the protocol with explicit states:
//! `PROPOSED -> SIGNED -> RESOLVED`. [`make_dbp`] produces a record already
//! in the `SIGNED` state (construction and arbiter signing are one step
//! in this crate, mirroring the reference implementation); [`resolve_default`]
//! performs the `SIGNED -> RESOLVED` transition.

use crate::canonical::{canonicalize_bytes, Value};
use crate::crypto;
use crate::error::Error;
use crate::msr::VerifyOutcome;

/// The only DBP version this crate accepts.
pub const DBP_VERSION: &str = "0.1";

/// Why the defaulting agent was declared in default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeclarationType {
    /// The defaulting agent initiated the declaration itself.
    Voluntary,
    /// An arbiter declared on behalf of creditors.
    Involuntary,
    /// Triggered automatically by a runway threshold breach.
    Automatic,
}

impl DeclarationType {
    fn as_str(&self) -> &'static str {
        match self {
            DeclarationType::Voluntary => "VOLUNTARY",
            DeclarationType::Involuntary => "INVOLUNTARY",
            DeclarationType::Automatic => "AUTOMATIC",
        }
    }
}

/// What event triggered the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerType {
    /// A future commitment's delivery window elapsed undelivered.
    MissedFc,
    /// The agent's MBS solvency ratio went negative.
    NegativeMbs,
    /// A margin call went unmet.
    MarginCall,
    /// A process-level timeout elapsed.
    Timeout,
}

impl TriggerType {
    fn as_str(&self) -> &'static str {
        match self {
            TriggerType::MissedFc => "MISSED_FC",
            TriggerType::NegativeMbs => "NEGATIVE_MBS",
            TriggerType::MarginCall => "MARGIN_CALL",
            TriggerType::Timeout => "TIMEOUT",
        }
    }
}

/// How liquid assets are divided among creditors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LiquidationMethod {
    /// Proportional to each creditor's claim.
    ProRata,
    /// Highest-priority creditors paid in full first.
    Priority,
    /// Reserved for future differentiation; degrades to [`LiquidationMethod::ProRata`].
    Auction,
}

impl LiquidationMethod {
    fn as_str(&self) -> &'static str {
        match self {
            LiquidationMethod::ProRata => "PRO_RATA",
            LiquidationMethod::Priority => "PRIORITY",
            LiquidationMethod::Auction => "AUCTION",
        }
    }
}

/// One creditor's claim against the defaulting agent.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Creditor {
    /// Creditor's agent ID.
    pub agent_id: String,
    /// Amount owed, USD micros.
    pub amount_micros: i64,
    /// Lower number = higher priority, used by [`LiquidationMethod::Priority`].
    pub priority: i64,
    /// Whether this claim is backed by collateral.
    pub collateralized: bool,
}

/// One liquid asset available for distribution.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Asset {
    /// Asset category.
    pub asset_type: String,
    /// Value, USD micros.
    pub value_micros: i64,
    /// Whether this asset can be distributed immediately.
    pub liquid: bool,
}

/// What the defaulting agent is declared to owe, as of the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ObligationsSnapshot {
    /// Sum of every creditor's `amount_micros`.
    pub total_owed_micros: i64,
    /// Creditors, sorted by `agent_id` ascending.
    pub creditors: Vec<Creditor>,
}

/// What the defaulting agent holds, as of the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AssetsSnapshot {
    /// Sum of every asset's `value_micros`.
    pub total_value_micros: i64,
    /// Assets, sorted by `asset_type` ascending.
    pub assets: Vec<Asset>,
}

/// What triggered the default.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Trigger {
    /// Trigger category.
    #[serde(rename = "type")]
    pub trigger_type: TriggerType,
    /// Identifier of the event that triggered default (e.g. an FC hash).
    pub reference_id: String,
    /// When the trigger fired, ms since epoch.
    pub trigger_timestamp_ms: i64,
}

/// One creditor's share of the liquidation.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Distribution {
    /// Which creditor this distribution pays.
    pub creditor_id: String,
    /// Amount actually distributed, USD micros.
    pub receives_micros: i64,
    /// `receives / amount_owed`, basis points.
    pub recovery_bps: i64,
}

/// The computed plan dividing liquid assets among creditors.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LiquidationPlan {
    /// Algorithm used to compute `distributions`.
    pub method: LiquidationMethod,
    /// Distributions, sorted by `creditor_id` ascending.
    pub distributions: Vec<Distribution>,
}

/// A signed default declaration with its liquidation plan.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Dbp {
    /// Protocol version, currently `"0.1"`.
    pub dbp_version: String,
    /// Equal to `dbp_hash` — carried under both names, mirroring AMR's
    /// `record_id`/`amr_hash` twinning (spec §4.5, extended here per
    /// the original reference).
    pub default_id: String,
    /// The agent being declared in default.
    pub defaulting_agent_id: String,
    /// How the declaration arose.
    pub declaration_type: DeclarationType,
    /// What triggered it.
    pub trigger: Trigger,
    /// Snapshot of what is owed.
    pub obligations_snapshot: ObligationsSnapshot,
    /// Snapshot of what is available to liquidate.
    pub assets_snapshot: AssetsSnapshot,
    /// `floor(total_distributed * 10000 / total_owed)`, 0 if nothing was owed.
    pub recovery_rate_bps: i64,
    /// The computed liquidation plan.
    pub liquidation_plan: LiquidationPlan,
    /// Declaration timestamp, ms since epoch.
    pub timestamp_ms: i64,
    /// Agent overseeing the default process; signs the record.
    pub arbiter_agent_id: String,
    /// Content hash; identical to `default_id`.
    pub dbp_hash: String,
    /// Arbiter's signature over `dbp_hash`.
    pub signature_ed25519: String,
}

/// Compute liquidation distributions for `creditors` given `total_assets`
/// liquid micros, by `method`.
///
/// Uses exact integer arithmetic throughout — `floor(c.amount * total /
/// sum)`, never float division then truncation — so results are
/// reproducible bit-for-bit regardless of platform.
pub fn compute_distributions(
    creditors: &[Creditor],
    total_assets: i64,
    method: LiquidationMethod,
) -> Vec<Distribution> {
    if creditors.is_empty() {
        return Vec::new();
    }

    let total_owed: i64 = creditors.iter().map(|c| c.amount_micros).sum();
    if total_owed == 0 {
        return creditors
            .iter()
            .map(|c| Distribution { creditor_id: c.agent_id.clone(), receives_micros: 0, recovery_bps: 0 })
            .collect();
    }

    match method {
        LiquidationMethod::ProRata => creditors
            .iter()
            .map(|c| {
                let receives = (c.amount_micros * total_assets) / total_owed;
                let recovery = if c.amount_micros > 0 { (receives * 10_000) / c.amount_micros } else { 0 };
                Distribution { creditor_id: c.agent_id.clone(), receives_micros: receives, recovery_bps: recovery }
            })
            .collect(),
        LiquidationMethod::Priority => {
            let mut sorted: Vec<&Creditor> = creditors.iter().collect();
            sorted.sort_by_key(|c| c.priority);
            let mut remaining = total_assets;
            sorted
                .into_iter()
                .map(|c| {
                    let receives = c.amount_micros.min(remaining);
                    remaining -= receives;
                    let recovery = if c.amount_micros > 0 { (receives * 10_000) / c.amount_micros } else { 0 };
                    Distribution { creditor_id: c.agent_id.clone(), receives_micros: receives, recovery_bps: recovery }
                })
                .collect()
        }
        LiquidationMethod::Auction => compute_distributions(creditors, total_assets, LiquidationMethod::ProRata),
    }
}

/// Inputs required to construct a new DBP.
#[derive(Debug, Clone)]
pub struct DbpContent {
    /// See [`Dbp::defaulting_agent_id`].
    pub defaulting_agent_id: String,
    /// See [`Dbp::declaration_type`].
    pub declaration_type: DeclarationType,
    /// See [`Trigger::trigger_type`].
    pub trigger_type: TriggerType,
    /// See [`Trigger::reference_id`].
    pub trigger_reference_id: String,
    /// Creditors as known at declaration time; order does not matter.
    pub creditors: Vec<Creditor>,
    /// Assets as known at declaration time; order does not matter.
    pub assets: Vec<Asset>,
    /// Algorithm used to compute distributions.
    pub liquidation_method: LiquidationMethod,
    /// See [`Dbp::arbiter_agent_id`].
    pub arbiter_agent_id: String,
    /// See [`Dbp::timestamp_ms`]. Caller-supplied: this crate has no clock.
    pub timestamp_ms: i64,
}

fn trigger_value(t: &Trigger) -> Value {
    Value::map([
        ("type", Value::from(t.trigger_type.as_str())),
        ("reference_id", Value::from(t.reference_id.as_str())),
        ("trigger_timestamp_ms", Value::Int(t.trigger_timestamp_ms)),
    ])
}

fn creditors_value(creditors: &[Creditor]) -> Value {
    Value::array(creditors.iter().map(|c| {
        Value::map([
            ("agent_id", Value::from(c.agent_id.as_str())),
            ("amount_micros", Value::Int(c.amount_micros)),
            ("priority", Value::Int(c.priority)),
            ("collateralized", Value::Bool(c.collateralized)),
        ])
    }))
}

fn assets_value(assets: &[Asset]) -> Value {
    Value::array(assets.iter().map(|a| {
        Value::map([
            ("asset_type", Value::from(a.asset_type.as_str())),
            ("value_micros", Value::Int(a.value_micros)),
            ("liquid", Value::Bool(a.liquid)),
        ])
    }))
}

fn distributions_value(distributions: &[Distribution]) -> Value {
    Value::array(distributions.iter().map(|d| {
        Value::map([
            ("creditor_id", Value::from(d.creditor_id.as_str())),
            ("receives_micros", Value::Int(d.receives_micros)),
            ("recovery_bps", Value::Int(d.recovery_bps)),
        ])
    }))
}

#[allow(clippy::too_many_arguments)]
fn content_value(
    defaulting_agent_id: &str,
    declaration_type: DeclarationType,
    trigger: &Trigger,
    obligations: &ObligationsSnapshot,
    assets: &AssetsSnapshot,
    recovery_rate_bps: i64,
    plan: &LiquidationPlan,
    timestamp_ms: i64,
    arbiter_agent_id: &str,
) -> Value {
    Value::map([
        ("dbp_version", Value::from(DBP_VERSION)),
        ("defaulting_agent_id", Value::from(defaulting_agent_id)),
        ("declaration_type", Value::from(declaration_type.as_str())),
        ("trigger", trigger_value(trigger)),
        (
            "obligations_snapshot",
            Value::map([
                ("total_owed_micros", Value::Int(obligations.total_owed_micros)),
                ("creditors", creditors_value(&obligations.creditors)),
            ]),
        ),
        (
            "assets_snapshot",
            Value::map([
                ("total_value_micros", Value::Int(assets.total_value_micros)),
                ("assets", assets_value(&assets.assets)),
            ]),
        ),
        ("recovery_rate_bps", Value::Int(recovery_rate_bps)),
        (
            "liquidation_plan",
            Value::map([
                ("method", Value::from(plan.method.as_str())),
                ("distributions", distributions_value(&plan.distributions)),
            ]),
        ),
        ("timestamp_ms", Value::Int(timestamp_ms)),
        ("arbiter_agent_id", Value::from(arbiter_agent_id)),
    ])
}

/// Build and sign a new DBP as the arbiter.
pub fn make_dbp(content: DbpContent, arbiter_private_key: &str) -> crate::error::Result<Dbp> {
    let mut creditors = content.creditors;
    creditors.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
    let mut assets = content.assets;
    assets.sort_by(|a, b| a.asset_type.cmp(&b.asset_type));

    let total_owed: i64 = creditors.iter().map(|c| c.amount_micros).sum();
    let total_value: i64 = assets.iter().map(|a| a.value_micros).sum();

    let mut distributions = compute_distributions(&creditors, total_value, content.liquidation_method);
    distributions.sort_by(|a, b| a.creditor_id.cmp(&b.creditor_id));
    let total_distributed: i64 = distributions.iter().map(|d| d.receives_micros).sum();
    let recovery_rate_bps = if total_owed > 0 { (total_distributed * 10_000) / total_owed } else { 0 };

    let trigger = Trigger {
        trigger_type: content.trigger_type,
        reference_id: content.trigger_reference_id,
        trigger_timestamp_ms: content.timestamp_ms,
    };
    let obligations = ObligationsSnapshot { total_owed_micros: total_owed, creditors };
    let assets_snapshot = AssetsSnapshot { total_value_micros: total_value, assets };
    let plan = LiquidationPlan { method: content.liquidation_method, distributions };

    let value = content_value(
        &content.defaulting_agent_id,
        content.declaration_type,
        &trigger,
        &obligations,
        &assets_snapshot,
        recovery_rate_bps,
        &plan,
        content.timestamp_ms,
        &content.arbiter_agent_id,
    );
    let content_hash = crypto::hash(&canonicalize_bytes(&value)?);
    let signature =
        crypto::sign(&content_hash, arbiter_private_key).map_err(|e| Error::Signature(e.to_string()))?;

    tracing::debug!(
        agent = %content.defaulting_agent_id,
        method = plan.method.as_str(),
        recovery_rate_bps,
        "declared agent default"
    );

    Ok(Dbp {
        dbp_version: DBP_VERSION.to_string(),
        default_id: content_hash.clone(),
        defaulting_agent_id: content.defaulting_agent_id,
        declaration_type: content.declaration_type,
        trigger,
        obligations_snapshot: obligations,
        assets_snapshot,
        recovery_rate_bps,
        liquidation_plan: plan,
        timestamp_ms: content.timestamp_ms,
        arbiter_agent_id: content.arbiter_agent_id,
        dbp_hash: content_hash,
        signature_ed25519: signature,
    })
}

/// Convenience wrapper around [`make_dbp`] with clearer call-site naming
/// for the `PROPOSED -> SIGNED` transition.
pub fn trigger_default(content: DbpContent, arbiter_private_key: &str) -> crate::error::Result<Dbp> {
    make_dbp(content, arbiter_private_key)
}

fn dbp_hash(dbp: &Dbp) -> crate::error::Result<String> {
    let value = content_value(
        &dbp.defaulting_agent_id,
        dbp.declaration_type,
        &dbp.trigger,
        &dbp.obligations_snapshot,
        &dbp.assets_snapshot,
        dbp.recovery_rate_bps,
        &dbp.liquidation_plan,
        dbp.timestamp_ms,
        &dbp.arbiter_agent_id,
    );
    Ok(crypto::hash(&canonicalize_bytes(&value)?))
}

/// Verify a DBP's signature and hash identity only (spec §4.3's shared
/// pattern). Does not check the liquidation invariants — see
/// [`resolve_default`] for the `SIGNED -> RESOLVED` transition, which does.
pub fn verify_dbp(dbp: &Dbp, arbiter_public_key: &str) -> VerifyOutcome {
    if dbp.dbp_version != DBP_VERSION {
        return VerifyOutcome { valid: false, hash: None, error: Some("Invalid dbp_version".into()) };
    }

    let hash = match dbp_hash(dbp) {
        Ok(h) => h,
        Err(e) => return VerifyOutcome { valid: false, hash: None, error: Some(e.to_string()) },
    };
    if hash != dbp.dbp_hash {
        return VerifyOutcome { valid: false, hash: Some(hash), error: Some("Invalid dbp_hash".into()) };
    }

    if !crypto::verify(&hash, &dbp.signature_ed25519, arbiter_public_key) {
        tracing::warn!(agent = %dbp.defaulting_agent_id, "DBP arbiter signature verification failed");
        return VerifyOutcome { valid: false, hash: Some(hash), error: Some("Invalid arbiter signature".into()) };
    }

    VerifyOutcome { valid: true, hash: Some(hash), error: None }
}

/// Outcome of resolving a DBP's liquidation plan: the `SIGNED -> RESOLVED`
/// transition (spec §4.9, §4.11). Carries the recovered distributions on
/// success since a caller resolving a default needs them, not just a bool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveOutcome {
    /// Whether the signature and both liquidation invariants held.
    pub valid: bool,
    /// The liquidation plan's distributions, present iff `valid`.
    pub distributions: Vec<Distribution>,
    /// The DBP's recovery rate, 0 if `!valid`.
    pub recovery_rate_bps: i64,
    /// First-failure reason, present iff `!valid`.
    pub error: Option<String>,
}

fn resolve_fail(reason: impl Into<String>) -> ResolveOutcome {
    ResolveOutcome { valid: false, distributions: Vec::new(), recovery_rate_bps: 0, error: Some(reason.into()) }
}

/// Resolve a default: verify the arbiter signature, then check that
/// distributions do not exceed assets and that the embedded recovery rate
/// matches the recomputed one. Performs the
/// `SIGNED -> RESOLVED` transition on success; a DBP that fails resolution
/// remains `SIGNED` and may be re-resolved with a fresh arbiter signature.
pub fn resolve_default(dbp: &Dbp, arbiter_public_key: &str) -> ResolveOutcome {
    let verified = verify_dbp(dbp, arbiter_public_key);
    if !verified.valid {
        return resolve_fail("Invalid arbiter signature");
    }

    let total_owed = dbp.obligations_snapshot.total_owed_micros;
    let total_assets = dbp.assets_snapshot.total_value_micros;
    let total_distributed: i64 = dbp.liquidation_plan.distributions.iter().map(|d| d.receives_micros).sum();

    if total_distributed > total_assets {
        return resolve_fail("Distributions exceed available assets");
    }

    let expected_recovery = if total_owed > 0 { (total_distributed * 10_000) / total_owed } else { 0 };
    if dbp.recovery_rate_bps != expected_recovery {
        return resolve_fail(format!(
            "Recovery rate mismatch: expected {expected_recovery}, got {}",
            dbp.recovery_rate_bps
        ));
    }

    ResolveOutcome {
        valid: true,
        distributions: dbp.liquidation_plan.distributions.clone(),
        recovery_rate_bps: dbp.recovery_rate_bps,
        error: None,
    }
}

/// Should an agent with the given runway trigger an [`DeclarationType::Automatic`]
/// default? Policy knob mirroring `AUTOMATIC`'s runway threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutoDefaultConfig {
    /// Runway, in seconds, below which automatic default triggers. Default `0.0`.
    pub threshold_seconds: f64,
}

impl Default for AutoDefaultConfig {
    fn default() -> Self {
        Self { threshold_seconds: 0.0 }
    }
}

/// Whether `runway_seconds` breaches `config`'s threshold.
pub fn should_auto_default(runway_seconds: f64, config: &AutoDefaultConfig) -> bool {
    runway_seconds < config.threshold_seconds
}
