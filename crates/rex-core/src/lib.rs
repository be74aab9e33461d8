#![deny(missing_docs)]
#![doc = "Core problem, sample, randomness and error types for the replica-exchange engine."]

pub mod errors;
pub mod problem;
pub mod rng;
pub mod sample;

pub use errors::{ErrorInfo, RexError};
pub use problem::{BinaryQuadraticModel, ProblemStats, Vartype, MAX_VARIABLES};
pub use rng::{derive_substream_seed, RngHandle};
pub use sample::{format_assignment, Sample, SampleSet};
