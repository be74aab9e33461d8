use std::fs;
use std::path::{Path, PathBuf};

use rex_core::{ErrorInfo, RexError};
use serde::{Deserialize, Serialize};

use crate::replica::TemperatureBinding;

/// YAML-configurable parameters governing a replica-exchange run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Propagation effort (sweeps) per propagate call.
    #[serde(default = "default_num_sweeps")]
    pub num_sweeps: usize,
    /// Number of replicas, i.e. ladder size.
    #[serde(default = "default_num_replicas")]
    pub num_replicas: usize,
    /// Number of propagate-then-swap rounds.
    #[serde(default = "default_num_iterations")]
    pub num_iterations: usize,
    /// Explicit ladder bounds. Derived from the problem when absent.
    #[serde(default)]
    pub beta_range: Option<BetaRange>,
    /// Swap scheduling policy; also fixes the temperature binding.
    #[serde(default)]
    pub swap_policy: SwapPolicy,
    /// How replica sample sets are initialised.
    #[serde(default)]
    pub initial_state: InitialState,
    /// Master seed and label.
    #[serde(default)]
    pub seed_policy: SeedPolicy,
    /// Worker threads for the propagation phase. `None` uses the global pool.
    #[serde(default)]
    pub threads: Option<usize>,
    /// Wall-clock budget in seconds, checked at round boundaries.
    #[serde(default)]
    pub time_limit_secs: Option<f64>,
    /// Artefact layout.
    #[serde(default)]
    pub output: OutputConfig,
}

fn default_num_sweeps() -> usize {
    1000
}

fn default_num_replicas() -> usize {
    10
}

fn default_num_iterations() -> usize {
    10
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            num_sweeps: default_num_sweeps(),
            num_replicas: default_num_replicas(),
            num_iterations: default_num_iterations(),
            beta_range: None,
            swap_policy: SwapPolicy::default(),
            initial_state: InitialState::default(),
            seed_policy: SeedPolicy::default(),
            threads: None,
            time_limit_secs: None,
            output: OutputConfig::default(),
        }
    }
}

impl WorkflowConfig {
    /// Parses a YAML document.
    pub fn from_yaml_str(text: &str) -> Result<Self, RexError> {
        serde_yaml::from_str(text)
            .map_err(|err| RexError::Config(ErrorInfo::new("config-parse", err.to_string())))
    }

    /// Reads and parses a YAML file.
    pub fn from_yaml_path(path: &Path) -> Result<Self, RexError> {
        let text = fs::read_to_string(path).map_err(|err| {
            RexError::Config(
                ErrorInfo::new("config-read", err.to_string()).with_context("path", path.display()),
            )
        })?;
        Self::from_yaml_str(&text).map_err(|err| match err {
            RexError::Config(info) => RexError::Config(info.with_context("path", path.display())),
            other => other,
        })
    }

    /// Serializes the configuration as YAML.
    pub fn to_yaml_string(&self) -> Result<String, RexError> {
        serde_yaml::to_string(self).map_err(|err| RexError::serde("config-serialize", err))
    }

    /// Sets the sweeps per propagate call.
    pub fn with_num_sweeps(mut self, n: usize) -> Self {
        self.num_sweeps = n;
        self
    }

    /// Sets the ladder size.
    pub fn with_num_replicas(mut self, n: usize) -> Self {
        self.num_replicas = n;
        self
    }

    /// Sets the number of rounds.
    pub fn with_num_iterations(mut self, n: usize) -> Self {
        self.num_iterations = n;
        self
    }

    /// Sets explicit ladder bounds.
    pub fn with_beta_range(mut self, hot: f64, cold: f64) -> Self {
        self.beta_range = Some(BetaRange { hot, cold });
        self
    }

    /// Sets the swap policy.
    pub fn with_swap_policy(mut self, policy: SwapPolicy) -> Self {
        self.swap_policy = policy;
        self
    }

    /// Sets how initial samples are drawn.
    pub fn with_initial_state(mut self, initial: InitialState) -> Self {
        self.initial_state = initial;
        self
    }

    /// Sets the master seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed_policy.master_seed = seed;
        self
    }

    /// Sets the propagation worker count.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Sets the round-boundary time limit in seconds.
    pub fn with_time_limit(mut self, secs: f64) -> Self {
        self.time_limit_secs = Some(secs);
        self
    }

    /// Enables artefact output under `dir`.
    pub fn with_run_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output.run_directory = Some(dir.into());
        self
    }

    /// Validates the configuration.
    ///
    /// Ladder problems (`num_replicas < 1`, bad beta bounds) are reported as
    /// [`RexError::InvalidRange`]; everything else as [`RexError::Config`].
    pub fn validate(&self) -> Result<(), RexError> {
        if self.num_replicas < 1 {
            return Err(RexError::InvalidRange(
                ErrorInfo::new("ladder-size", "num_replicas must be at least 1")
                    .with_context("num_replicas", self.num_replicas),
            ));
        }
        if let Some(range) = &self.beta_range {
            if !(range.hot.is_finite() && range.hot > 0.0) {
                return Err(RexError::InvalidRange(
                    ErrorInfo::new("ladder-hot-bound", "beta_hot must be positive")
                        .with_context("beta_hot", range.hot),
                ));
            }
            if !(range.cold.is_finite() && range.hot < range.cold) {
                return Err(RexError::InvalidRange(
                    ErrorInfo::new("ladder-inverted", "beta_hot must be below beta_cold")
                        .with_context("beta_hot", range.hot)
                        .with_context("beta_cold", range.cold),
                ));
            }
        }
        if let SwapPolicy::RandomizedSinglePair {
            swaps_per_round: Some(0),
        } = self.swap_policy
        {
            return Err(RexError::Config(
                ErrorInfo::new("swaps-per-round", "swaps_per_round must be positive")
                    .with_hint("omit the field to use num_replicas - 1"),
            ));
        }
        if self.threads == Some(0) {
            return Err(RexError::Config(ErrorInfo::new(
                "threads",
                "threads must be positive when set",
            )));
        }
        if let Some(limit) = self.time_limit_secs {
            if !(limit.is_finite() && limit >= 0.0) {
                return Err(RexError::Config(
                    ErrorInfo::new("time-limit", "time_limit_secs must be a non-negative number")
                        .with_context("time_limit_secs", limit),
                ));
            }
        }
        Ok(())
    }
}

/// Inverse-temperature bounds of the ladder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BetaRange {
    /// Hot (small) bound.
    pub hot: f64,
    /// Cold (large) bound.
    pub cold: f64,
}

/// Swap scheduling policy.
///
/// Each policy comes with exactly one temperature binding; the two are never
/// mixed within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SwapPolicy {
    /// Every adjacent pair `(0,1) .. (N-2,N-1)` once per round, in order.
    /// Slot-bound temperatures.
    #[default]
    DeterministicSweep,
    /// One uniformly chosen adjacent pair per inner iteration.
    /// Replica-bound temperatures.
    RandomizedSinglePair {
        /// Inner iterations per round; `None` means `N - 1`.
        #[serde(default)]
        swaps_per_round: Option<usize>,
    },
}

impl SwapPolicy {
    /// Temperature binding implied by the policy.
    pub fn binding(&self) -> TemperatureBinding {
        match self {
            SwapPolicy::DeterministicSweep => TemperatureBinding::Slot,
            SwapPolicy::RandomizedSinglePair { .. } => TemperatureBinding::Replica,
        }
    }

    /// Swap evaluations per round for a ladder of `num_replicas`.
    pub fn swaps_per_round(&self, num_replicas: usize) -> usize {
        let pairs = num_replicas.saturating_sub(1);
        match self {
            SwapPolicy::DeterministicSweep => pairs,
            SwapPolicy::RandomizedSinglePair { swaps_per_round } => {
                if pairs == 0 {
                    0
                } else {
                    swaps_per_round.unwrap_or(pairs)
                }
            }
        }
    }

    /// Kebab-case name used in logs and the CLI.
    pub fn as_str(&self) -> &'static str {
        match self {
            SwapPolicy::DeterministicSweep => "deterministic-sweep",
            SwapPolicy::RandomizedSinglePair { .. } => "randomized-single-pair",
        }
    }
}

/// How the initial sample set of each replica is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum InitialState {
    /// Uniformly random assignment from the replica's init substream.
    #[default]
    Random,
    /// Every variable at the lowest domain value.
    Lowest,
}

/// Deterministic seeding configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedPolicy {
    /// Master seed used for the run.
    #[serde(default = "default_master_seed")]
    pub master_seed: u64,
    /// Optional label recorded in manifests.
    #[serde(default)]
    pub label: Option<String>,
}

fn default_master_seed() -> u64 {
    0x05EE_D5EE_DD15_5EED_u64
}

impl Default for SeedPolicy {
    fn default() -> Self {
        Self {
            master_seed: default_master_seed(),
            label: None,
        }
    }
}

/// Output directory layout configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Root directory for run artefacts. Nothing is written when absent.
    #[serde(default)]
    pub run_directory: Option<PathBuf>,
    /// Summary filename relative to `run_directory`.
    #[serde(default = "default_summary_filename")]
    pub summary_file: PathBuf,
    /// Manifest filename relative to `run_directory`.
    #[serde(default = "default_manifest_filename")]
    pub manifest_file: PathBuf,
    /// Round trace filename relative to `run_directory`.
    #[serde(default = "default_trace_filename")]
    pub trace_file: PathBuf,
}

fn default_summary_filename() -> PathBuf {
    PathBuf::from("summary.json")
}

fn default_manifest_filename() -> PathBuf {
    PathBuf::from("manifest.json")
}

fn default_trace_filename() -> PathBuf {
    PathBuf::from("trace.csv")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            run_directory: None,
            summary_file: default_summary_filename(),
            manifest_file: default_manifest_filename(),
            trace_file: default_trace_filename(),
        }
    }
}
