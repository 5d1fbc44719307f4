use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Fatal configuration errors, surfaced before any planning work starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("weight `{name}` must be non-negative, got {value}")]
    NegativeWeight { name: &'static str, value: f64 },
    #[error("`{name}` must be positive, got {value}")]
    NonPositive { name: &'static str, value: i64 },
    #[error("`{name}` must lie in [0, 1], got {value}")]
    OutOfUnitRange { name: &'static str, value: f64 },
}

// ---------------------------------------------------------------------------
// RoutingConfig
// ---------------------------------------------------------------------------

/// Every externally tunable knob for planning and execution.
///
/// Defaults mirror the common deployment configuration; callers override
/// individual fields with struct-update syntax and then `validate()` before
/// handing the config to the planner or executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Penalty weight for assigning an agent whose quality exceeds the
    /// intent's floor (surplus × token cost × this weight).
    pub overkill_weight: f64,
    /// Weight on agent latency; small, tie-breaking.
    pub latency_weight: f64,
    /// Weight on wave-timestep overrun past an intent's deadline.
    pub deadline_weight: f64,
    /// Cost subtracted when a dependent intent lands on the same agent as
    /// its predecessor.
    pub context_bonus: f64,
    /// Soft dollar ceiling; overruns incur a quadratic penalty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_cap: Option<f64>,
    /// Raises the effective quality floor of every intent to at least this.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_floor_override: Option<f64>,
    /// Wall-clock budget for the assignment solver.
    pub solver_time_limit_secs: f64,
    /// Maximum concurrent dispatches in the executor.
    pub max_workers: usize,
    /// Maximum attempts per intent before forced human review.
    pub max_retries: u32,
    /// Gate 2 minimum quality score, in `[0, 1]`.
    pub min_wave_quality: f64,
    /// Optional wall-clock timeout for a whole execution session; expiry
    /// triggers cancellation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_timeout_secs: Option<f64>,
    /// Seed for any stochastic component (simulated backend, solver
    /// tie-shuffling). Fixed seed + fixed inputs = identical output.
    pub random_seed: u64,
    /// When true, a Gate 2 failure aborts the session with partial results;
    /// when false it is recorded and execution continues.
    pub strict_wave_gate: bool,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            overkill_weight: 2.0,
            latency_weight: 0.001,
            deadline_weight: 1.5,
            context_bonus: 0.5,
            budget_cap: None,
            quality_floor_override: None,
            solver_time_limit_secs: 10.0,
            max_workers: 8,
            max_retries: 4,
            min_wave_quality: 0.70,
            session_timeout_secs: None,
            random_seed: 42,
            strict_wave_gate: false,
        }
    }
}

impl RoutingConfig {
    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let weights = [
            ("overkill_weight", self.overkill_weight),
            ("latency_weight", self.latency_weight),
            ("deadline_weight", self.deadline_weight),
            ("context_bonus", self.context_bonus),
        ];
        for (name, value) in weights {
            if value < 0.0 {
                return Err(ConfigError::NegativeWeight { name, value });
            }
        }
        if self.max_workers == 0 {
            return Err(ConfigError::NonPositive {
                name: "max_workers",
                value: 0,
            });
        }
        if self.max_retries == 0 {
            return Err(ConfigError::NonPositive {
                name: "max_retries",
                value: 0,
            });
        }
        if self.solver_time_limit_secs <= 0.0 {
            return Err(ConfigError::NonPositive {
                name: "solver_time_limit_secs",
                value: self.solver_time_limit_secs as i64,
            });
        }
        if !(0.0..=1.0).contains(&self.min_wave_quality) {
            return Err(ConfigError::OutOfUnitRange {
                name: "min_wave_quality",
                value: self.min_wave_quality,
            });
        }
        if let Some(floor) = self.quality_floor_override {
            if !(0.0..=1.0).contains(&floor) {
                return Err(ConfigError::OutOfUnitRange {
                    name: "quality_floor_override",
                    value: floor,
                });
            }
        }
        Ok(())
    }

    /// The quality floor actually enforced for `declared`, after the
    /// session-wide override is applied.
    pub fn effective_floor(&self, declared: f64) -> f64 {
        match self.quality_floor_override {
            Some(floor) => declared.max(floor),
            None => declared,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployment_configuration() {
        let config = RoutingConfig::default();
        assert_eq!(config.overkill_weight, 2.0);
        assert_eq!(config.context_bonus, 0.5);
        assert_eq!(config.max_workers, 8);
        assert_eq!(config.max_retries, 4);
        assert_eq!(config.min_wave_quality, 0.70);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn negative_weight_rejected() {
        let config = RoutingConfig {
            overkill_weight: -1.0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::NegativeWeight {
                name: "overkill_weight",
                ..
            }
        ));
    }

    #[test]
    fn zero_workers_rejected() {
        let config = RoutingConfig {
            max_workers: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_retries_rejected() {
        let config = RoutingConfig {
            max_retries: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn wave_quality_must_be_unit_range() {
        let config = RoutingConfig {
            min_wave_quality: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn effective_floor_applies_override() {
        let config = RoutingConfig {
            quality_floor_override: Some(0.8),
            ..Default::default()
        };
        assert_eq!(config.effective_floor(0.5), 0.8);
        assert_eq!(config.effective_floor(0.9), 0.9);

        let plain = RoutingConfig::default();
        assert_eq!(plain.effective_floor(0.5), 0.5);
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = RoutingConfig {
            budget_cap: Some(25.0),
            session_timeout_secs: Some(300.0),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: RoutingConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
