pub mod inspect;
pub mod run;

use rex_core::ProblemStats;

/// One-line problem description, e.g. `BQM: 4 nodes, 5 edges, 83.33% density`.
pub fn stats_line(stats: &ProblemStats) -> String {
    format!(
        "BQM: {} nodes, {} edges, {:.2}% density",
        stats.nodes, stats.edges, stats.density
    )
}
