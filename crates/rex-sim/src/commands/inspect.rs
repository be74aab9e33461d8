use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use rex_core::BinaryQuadraticModel;
use rex_workflow::default_beta_range;

use super::stats_line;

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// COO problem file (`i j value` rows).
    #[arg(long)]
    pub problem: PathBuf,
    /// Emit JSON instead of text.
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: &InspectArgs) -> Result<(), Box<dyn Error>> {
    let problem = BinaryQuadraticModel::from_coo_path(&args.problem)?;
    let stats = problem.stats();
    let range = default_beta_range(&problem);
    if args.json {
        let report = serde_json::json!({
            "vartype": problem.vartype().to_string(),
            "stats": stats,
            "beta_range": range,
            "fingerprint": problem.fingerprint()?,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    println!("{}", stats_line(&stats));
    println!("vartype: {}", problem.vartype());
    println!("default beta range: {:.6} .. {:.6}", range.hot, range.cold);
    Ok(())
}
