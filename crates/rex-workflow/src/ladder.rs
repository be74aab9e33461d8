use rex_core::{ErrorInfo, RexError};
use serde::{Deserialize, Serialize};

/// Immutable, strictly increasing sequence of inverse temperatures.
///
/// Index 0 is the hottest (smallest beta) rung, the last index the coldest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct TemperatureLadder {
    betas: Vec<f64>,
}

impl TemperatureLadder {
    /// Builds `n` log-uniformly spaced betas from `beta_hot` to `beta_cold`,
    /// both endpoints included.
    pub fn geometric(beta_hot: f64, beta_cold: f64, n: usize) -> Result<Self, RexError> {
        if n < 1 {
            return Err(RexError::InvalidRange(
                ErrorInfo::new("ladder-size", "ladder needs at least one replica")
                    .with_context("num_replicas", n),
            ));
        }
        if !beta_hot.is_finite() || !beta_cold.is_finite() {
            return Err(RexError::InvalidRange(
                ErrorInfo::new("ladder-non-finite", "beta bounds must be finite")
                    .with_context("beta_hot", beta_hot)
                    .with_context("beta_cold", beta_cold),
            ));
        }
        if beta_hot <= 0.0 {
            return Err(RexError::InvalidRange(
                ErrorInfo::new("ladder-hot-bound", "beta_hot must be positive")
                    .with_context("beta_hot", beta_hot),
            ));
        }
        if beta_hot >= beta_cold {
            return Err(RexError::InvalidRange(
                ErrorInfo::new("ladder-inverted", "beta_hot must be below beta_cold")
                    .with_context("beta_hot", beta_hot)
                    .with_context("beta_cold", beta_cold)
                    .with_hint("hot replicas have the smaller inverse temperature"),
            ));
        }

        if n == 1 {
            return Ok(Self {
                betas: vec![beta_hot],
            });
        }

        let (log_hot, log_cold) = (beta_hot.ln(), beta_cold.ln());
        let step = (log_cold - log_hot) / (n - 1) as f64;
        let mut betas: Vec<f64> = (0..n)
            .map(|k| (log_hot + step * k as f64).exp())
            .collect();
        betas[0] = beta_hot;
        betas[n - 1] = beta_cold;
        Self::from_betas(betas)
    }

    /// Wraps an explicit list of betas after validating it.
    pub fn from_betas(betas: Vec<f64>) -> Result<Self, RexError> {
        if betas.is_empty() {
            return Err(RexError::InvalidRange(ErrorInfo::new(
                "ladder-size",
                "ladder needs at least one replica",
            )));
        }
        if let Some(index) = betas.iter().position(|b| !b.is_finite() || *b <= 0.0) {
            return Err(RexError::InvalidRange(
                ErrorInfo::new("ladder-non-positive", "betas must be finite and positive")
                    .with_context("index", index),
            ));
        }
        if let Some(index) = betas.windows(2).position(|pair| pair[0] >= pair[1]) {
            return Err(RexError::InvalidRange(
                ErrorInfo::new("ladder-not-increasing", "betas must be strictly increasing")
                    .with_context("index", index + 1)
                    .with_hint("use fewer replicas or a wider beta range"),
            ));
        }
        Ok(Self { betas })
    }

    /// All betas, hottest first.
    pub fn betas(&self) -> &[f64] {
        &self.betas
    }

    /// Beta of rung `slot`. Panics when `slot` is out of range.
    pub fn beta(&self, slot: usize) -> f64 {
        self.betas[slot]
    }

    /// Number of rungs.
    pub fn len(&self) -> usize {
        self.betas.len()
    }

    /// Never true for a constructed ladder.
    pub fn is_empty(&self) -> bool {
        self.betas.is_empty()
    }

    /// Hottest beta.
    pub fn hot(&self) -> f64 {
        self.betas[0]
    }

    /// Coldest beta.
    pub fn cold(&self) -> f64 {
        self.betas[self.betas.len() - 1]
    }
}

impl TryFrom<Vec<f64>> for TemperatureLadder {
    type Error = RexError;

    fn try_from(betas: Vec<f64>) -> Result<Self, Self::Error> {
        TemperatureLadder::from_betas(betas)
    }
}

impl From<TemperatureLadder> for Vec<f64> {
    fn from(ladder: TemperatureLadder) -> Self {
        ladder.betas
    }
}
