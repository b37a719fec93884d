//! SLO Gate - post-hoc compliance scoring
//!
//! Once a swarm's workflow terminates (success or exhausted retries), the
//! gate scores the run's cost, latency, coverage and confidence against
//! fixed thresholds. Evaluation is a pure function over the measurements;
//! the gate never mutates task or agent state and only ever appends its
//! report. An SLO breach is a structured compliance signal, not an error.

use crate::swarm::SwarmId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default cost ceiling in USD
pub const DEFAULT_MAX_COST_USD: f64 = 5.0;

/// Default end-to-end latency ceiling (p95 target)
pub const DEFAULT_MAX_DURATION: Duration = Duration::from_secs(720);

/// Default coverage floor, percent
pub const DEFAULT_MIN_COVERAGE_PCT: f64 = 95.0;

/// Default stack-inference confidence floor
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.8;

/// Fixed thresholds a completed run is scored against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SloThresholds {
    /// Maximum estimated cost in USD
    pub max_cost_usd: f64,

    /// Maximum end-to-end duration
    #[serde(with = "crate::swarm::duration_seconds")]
    pub max_duration: Duration,

    /// Minimum test/coverage percentage
    pub min_coverage_pct: f64,

    /// Minimum stack/plan inference confidence
    pub min_confidence: f64,
}

impl Default for SloThresholds {
    fn default() -> Self {
        Self {
            max_cost_usd: DEFAULT_MAX_COST_USD,
            max_duration: DEFAULT_MAX_DURATION,
            min_coverage_pct: DEFAULT_MIN_COVERAGE_PCT,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
        }
    }
}

impl SloThresholds {
    /// Set the cost ceiling
    pub fn with_max_cost_usd(mut self, max: f64) -> Self {
        self.max_cost_usd = max;
        self
    }

    /// Set the latency ceiling
    pub fn with_max_duration(mut self, max: Duration) -> Self {
        self.max_duration = max;
        self
    }

    /// Set the coverage floor
    pub fn with_min_coverage_pct(mut self, min: f64) -> Self {
        self.min_coverage_pct = min;
        self
    }

    /// Set the confidence floor
    pub fn with_min_confidence(mut self, min: f64) -> Self {
        self.min_confidence = min;
        self
    }
}

/// Per-run measurements collected while the swarm executed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMeasurements {
    /// Total tokens consumed
    pub tokens: u64,

    /// Estimated cost in USD (tokens times unit price)
    pub estimated_cost_usd: f64,

    /// End-to-end wall-clock duration
    #[serde(with = "crate::swarm::duration_seconds")]
    pub duration: Duration,

    /// Test/coverage percentage achieved
    pub coverage_pct: f64,

    /// Stack/plan inference confidence
    pub confidence: f64,
}

impl RunMeasurements {
    /// Build measurements, deriving cost from a per-1k-token unit price
    pub fn from_tokens(
        tokens: u64,
        price_per_1k_usd: f64,
        duration: Duration,
        coverage_pct: f64,
        confidence: f64,
    ) -> Self {
        Self {
            tokens,
            estimated_cost_usd: tokens as f64 / 1000.0 * price_per_1k_usd,
            duration,
            coverage_pct,
            confidence,
        }
    }
}

/// Scored dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SloDimension {
    Cost,
    Latency,
    Coverage,
    Confidence,
}

impl std::fmt::Display for SloDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cost => write!(f, "cost"),
            Self::Latency => write!(f, "latency"),
            Self::Coverage => write!(f, "coverage"),
            Self::Confidence => write!(f, "confidence"),
        }
    }
}

/// One dimension's measurement against its threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionCheck {
    /// Which dimension was scored
    pub dimension: SloDimension,

    /// Measured value
    pub measured: f64,

    /// Fixed threshold it was compared against
    pub threshold: f64,

    /// Whether the threshold was breached
    pub breached: bool,
}

/// Compliance report for a completed run
///
/// Serializable to any reporting surface (dashboard, log, alert).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SloReport {
    /// Swarm the run belonged to
    pub swarm_id: SwarmId,

    /// Raw measurements that were scored
    pub measurements: RunMeasurements,

    /// Per-dimension results, in fixed order (cost, latency, coverage,
    /// confidence)
    pub checks: Vec<DimensionCheck>,

    /// True iff no dimension breached
    pub compliant: bool,

    /// When the evaluation ran
    pub evaluated_at: DateTime<Utc>,
}

impl SloReport {
    /// Look up one dimension's check
    pub fn check(&self, dimension: SloDimension) -> Option<&DimensionCheck> {
        self.checks.iter().find(|c| c.dimension == dimension)
    }

    /// Dimensions that breached their thresholds
    pub fn breached_dimensions(&self) -> Vec<SloDimension> {
        self.checks
            .iter()
            .filter(|c| c.breached)
            .map(|c| c.dimension)
            .collect()
    }
}

/// Gate evaluation state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    /// No run has been scored yet
    PendingEvaluation,

    /// A run has been scored
    Evaluated,
}

/// The SLO gate
///
/// Holds the fixed thresholds and a `pending evaluation -> evaluated`
/// state. Scoring itself is pure; persisting the report is the caller's
/// choice via [`crate::store::SwarmStore::record_slo`].
#[derive(Debug, Clone)]
pub struct SloGate {
    thresholds: SloThresholds,
    state: GateState,
}

impl Default for SloGate {
    fn default() -> Self {
        Self::new(SloThresholds::default())
    }
}

impl SloGate {
    /// Create a gate with the given thresholds
    pub fn new(thresholds: SloThresholds) -> Self {
        Self {
            thresholds,
            state: GateState::PendingEvaluation,
        }
    }

    /// The gate's thresholds
    pub fn thresholds(&self) -> &SloThresholds {
        &self.thresholds
    }

    /// Current evaluation state
    pub fn state(&self) -> GateState {
        self.state
    }

    /// Score a completed run against the thresholds
    pub fn evaluate(&mut self, swarm_id: SwarmId, measurements: &RunMeasurements) -> SloReport {
        let checks = vec![
            DimensionCheck {
                dimension: SloDimension::Cost,
                measured: measurements.estimated_cost_usd,
                threshold: self.thresholds.max_cost_usd,
                breached: measurements.estimated_cost_usd > self.thresholds.max_cost_usd,
            },
            DimensionCheck {
                dimension: SloDimension::Latency,
                measured: measurements.duration.as_secs_f64(),
                threshold: self.thresholds.max_duration.as_secs_f64(),
                breached: measurements.duration > self.thresholds.max_duration,
            },
            DimensionCheck {
                dimension: SloDimension::Coverage,
                measured: measurements.coverage_pct,
                threshold: self.thresholds.min_coverage_pct,
                breached: measurements.coverage_pct < self.thresholds.min_coverage_pct,
            },
            DimensionCheck {
                dimension: SloDimension::Confidence,
                measured: measurements.confidence,
                threshold: self.thresholds.min_confidence,
                breached: measurements.confidence < self.thresholds.min_confidence,
            },
        ];

        let compliant = checks.iter().all(|c| !c.breached);
        if !compliant {
            let breached: Vec<String> = checks
                .iter()
                .filter(|c| c.breached)
                .map(|c| c.dimension.to_string())
                .collect();
            tracing::warn!(
                swarm = %swarm_id,
                breached = breached.join(","),
                "SLO breach"
            );
        } else {
            tracing::info!(swarm = %swarm_id, "Run is SLO compliant");
        }

        self.state = GateState::Evaluated;
        SloReport {
            swarm_id,
            measurements: measurements.clone(),
            checks,
            compliant,
            evaluated_at: Utc::now(),
        }
    }
}
