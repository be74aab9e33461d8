use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, ValueEnum};
use log::info;
use rex_core::{format_assignment, BinaryQuadraticModel};
use rex_workflow::{run as run_workflow, SwapPolicy, WorkflowConfig};

use super::stats_line;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    /// Every adjacent pair once per round, betas bound to slots.
    DeterministicSweep,
    /// One random adjacent pair per inner iteration, betas bound to replicas.
    RandomizedSinglePair,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// COO problem file (`i j value` rows).
    #[arg(long)]
    pub problem: PathBuf,
    /// YAML workflow configuration; flags below override its values.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Sweeps per propagation call.
    #[arg(long)]
    pub num_sweeps: Option<usize>,
    /// Ladder size.
    #[arg(long)]
    pub num_replicas: Option<usize>,
    /// Propagate-then-swap rounds.
    #[arg(long)]
    pub num_iterations: Option<usize>,
    /// Hot (small) ladder bound; requires `--beta-cold`.
    #[arg(long, requires = "beta_cold")]
    pub beta_hot: Option<f64>,
    /// Cold (large) ladder bound; requires `--beta-hot`.
    #[arg(long, requires = "beta_hot")]
    pub beta_cold: Option<f64>,
    /// Swap scheduling policy.
    #[arg(long, value_enum)]
    pub swap_policy: Option<PolicyArg>,
    /// Master seed.
    #[arg(long)]
    pub seed: Option<u64>,
    /// Propagation worker threads.
    #[arg(long)]
    pub threads: Option<usize>,
    /// Wall-clock limit in seconds, checked between rounds.
    #[arg(long)]
    pub time_limit: Option<f64>,
    /// Directory for summary, manifest and trace artefacts.
    #[arg(long)]
    pub out: Option<PathBuf>,
}

impl RunArgs {
    /// Loads the YAML config (or defaults) and applies flag overrides.
    pub fn resolve_config(&self) -> Result<WorkflowConfig, Box<dyn Error>> {
        let mut config = match &self.config {
            Some(path) => WorkflowConfig::from_yaml_path(path)?,
            None => WorkflowConfig::default(),
        };
        if let Some(n) = self.num_sweeps {
            config = config.with_num_sweeps(n);
        }
        if let Some(n) = self.num_replicas {
            config = config.with_num_replicas(n);
        }
        if let Some(n) = self.num_iterations {
            config = config.with_num_iterations(n);
        }
        if let (Some(hot), Some(cold)) = (self.beta_hot, self.beta_cold) {
            config = config.with_beta_range(hot, cold);
        }
        match self.swap_policy {
            Some(PolicyArg::DeterministicSweep) => {
                config = config.with_swap_policy(SwapPolicy::DeterministicSweep);
            }
            Some(PolicyArg::RandomizedSinglePair) => {
                if !matches!(config.swap_policy, SwapPolicy::RandomizedSinglePair { .. }) {
                    config = config.with_swap_policy(SwapPolicy::RandomizedSinglePair {
                        swaps_per_round: None,
                    });
                }
            }
            None => {}
        }
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        if let Some(threads) = self.threads {
            config = config.with_threads(threads);
        }
        if let Some(limit) = self.time_limit {
            config = config.with_time_limit(limit);
        }
        if let Some(out) = &self.out {
            config = config.with_run_directory(out);
        }
        Ok(config)
    }
}

pub fn run(args: &RunArgs) -> Result<(), Box<dyn Error>> {
    let problem = Arc::new(BinaryQuadraticModel::from_coo_path(&args.problem)?);
    let config = args.resolve_config()?;
    println!("{}", stats_line(&problem.stats()));

    let summary = run_workflow(&config, problem)?;

    for (name, value) in &summary.counters {
        println!("{name}: {value}");
    }
    println!(
        "Solution: sample={}, energy={}",
        format_assignment(&summary.best.assignment),
        summary.best.energy
    );
    if let Some(path) = &summary.summary_path {
        info!("summary written to {}", path.display());
    }
    Ok(())
}
