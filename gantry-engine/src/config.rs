//! Engine configuration
//!
//! Defines every tunable of a pipeline engine: recovery timing, stage
//! timeouts, simulated duration jitter, success-rate tuning, and channel
//! capacities.

use std::time::Duration;

/// Success-rate tuning parameters
///
/// Every successful run lowers the effective failure probability by
/// `success_step`, every failed run raises it by `failure_step`, and the
/// result is clamped into `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiasConfig {
    pub success_step: f64,
    pub failure_step: f64,
    pub min: f64,
    pub max: f64,
}

impl Default for BiasConfig {
    fn default() -> Self {
        Self {
            success_step: 0.01,
            failure_step: 0.05,
            min: 0.01,
            max: 0.5,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Delay between a stage failure and its single recovery attempt
    pub recovery_delay: Duration,

    /// Whether failed stages get a recovery attempt at all
    pub recovery_enabled: bool,

    /// Stage timeout as a multiple of its nominal duration
    pub timeout_multiplier: f64,

    /// Upper bound of the random extra duration added to simulated stages,
    /// as a fraction of the stage's nominal duration
    ///
    /// `1.0 + duration_jitter` must not exceed `timeout_multiplier` so a
    /// simulated stage never runs into its own timeout.
    pub duration_jitter: f64,

    /// Success-rate tuning
    pub bias: BiasConfig,

    /// Capacity of the async event mirror and the diagnostic channel
    pub event_capacity: usize,

    /// Capacity of the driver's command queue
    pub command_capacity: usize,
}

impl EngineConfig {
    /// Creates a configuration with defaults
    pub fn new() -> Self {
        Self {
            recovery_delay: Duration::from_millis(2000),
            recovery_enabled: true,
            timeout_multiplier: 3.0,
            duration_jitter: 0.25,
            bias: BiasConfig::default(),
            event_capacity: 256,
            command_capacity: 32,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Every variable is optional and falls back to the default:
    /// - GANTRY_RECOVERY_DELAY_MS (default: 2000)
    /// - GANTRY_RECOVERY_ENABLED (default: true)
    /// - GANTRY_TIMEOUT_MULTIPLIER (default: 3.0)
    /// - GANTRY_DURATION_JITTER (default: 0.25)
    /// - GANTRY_BIAS_SUCCESS_STEP (default: 0.01)
    /// - GANTRY_BIAS_FAILURE_STEP (default: 0.05)
    /// - GANTRY_BIAS_MIN (default: 0.01)
    /// - GANTRY_BIAS_MAX (default: 0.5)
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::new();

        let recovery_delay = env_parse::<u64>("GANTRY_RECOVERY_DELAY_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.recovery_delay);

        let recovery_enabled =
            env_parse::<bool>("GANTRY_RECOVERY_ENABLED").unwrap_or(defaults.recovery_enabled);

        let timeout_multiplier =
            env_parse::<f64>("GANTRY_TIMEOUT_MULTIPLIER").unwrap_or(defaults.timeout_multiplier);

        let duration_jitter =
            env_parse::<f64>("GANTRY_DURATION_JITTER").unwrap_or(defaults.duration_jitter);

        let bias = BiasConfig {
            success_step: env_parse("GANTRY_BIAS_SUCCESS_STEP").unwrap_or(defaults.bias.success_step),
            failure_step: env_parse("GANTRY_BIAS_FAILURE_STEP").unwrap_or(defaults.bias.failure_step),
            min: env_parse("GANTRY_BIAS_MIN").unwrap_or(defaults.bias.min),
            max: env_parse("GANTRY_BIAS_MAX").unwrap_or(defaults.bias.max),
        };

        let config = Self {
            recovery_delay,
            recovery_enabled,
            timeout_multiplier,
            duration_jitter,
            bias,
            ..defaults
        };
        config.validate()?;
        Ok(config)
    }

    /// Sets the recovery delay
    pub fn with_recovery_delay(mut self, delay: Duration) -> Self {
        self.recovery_delay = delay;
        self
    }

    /// Enables or disables automatic recovery
    pub fn with_recovery_enabled(mut self, enabled: bool) -> Self {
        self.recovery_enabled = enabled;
        self
    }

    /// Sets the stage timeout multiplier
    pub fn with_timeout_multiplier(mut self, multiplier: f64) -> Self {
        self.timeout_multiplier = multiplier;
        self
    }

    /// Sets the simulated duration jitter
    pub fn with_duration_jitter(mut self, jitter: f64) -> Self {
        self.duration_jitter = jitter;
        self
    }

    /// Sets the success-rate tuning parameters
    pub fn with_bias(mut self, bias: BiasConfig) -> Self {
        self.bias = bias;
        self
    }

    /// Implicit timeout of a stage with the given nominal duration
    pub fn stage_timeout(&self, nominal: Duration) -> Duration {
        nominal.mul_f64(self.timeout_multiplier)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        let bias = &self.bias;

        if !(0.0..=1.0).contains(&bias.min) || !(0.0..=1.0).contains(&bias.max) {
            anyhow::bail!("bias bounds must lie within [0, 1]");
        }

        if bias.min > bias.max {
            anyhow::bail!("bias min ({}) must not exceed max ({})", bias.min, bias.max);
        }

        if bias.success_step <= 0.0 || bias.failure_step <= 0.0 {
            anyhow::bail!("bias steps must be greater than 0");
        }

        if !self.timeout_multiplier.is_finite() || self.timeout_multiplier < 1.0 {
            anyhow::bail!("timeout_multiplier must be at least 1.0");
        }

        if !self.duration_jitter.is_finite() || self.duration_jitter < 0.0 {
            anyhow::bail!("duration_jitter must be a non-negative fraction");
        }

        if 1.0 + self.duration_jitter > self.timeout_multiplier {
            anyhow::bail!(
                "duration_jitter ({}) leaves no headroom below timeout_multiplier ({})",
                self.duration_jitter,
                self.timeout_multiplier
            );
        }

        if self.event_capacity == 0 {
            anyhow::bail!("event_capacity must be greater than 0");
        }

        if self.command_capacity == 0 {
            anyhow::bail!("command_capacity must be greater than 0");
        }

        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse::<T>().ok())
}
