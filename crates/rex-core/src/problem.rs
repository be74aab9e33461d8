//! Binary quadratic model and the coordinate-list (COO) problem format.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::{ErrorInfo, RexError};

/// Largest number of variables a model may hold. Indices at or above this
/// bound are rejected before any storage is allocated.
pub const MAX_VARIABLES: usize = 1 << 20;

/// Domain of every variable in a problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Vartype {
    /// Variables take values in `{0, 1}`.
    #[default]
    Binary,
    /// Variables take values in `{-1, +1}`.
    Spin,
}

impl Vartype {
    /// Lowest value of the domain.
    pub fn lowest(self) -> i8 {
        match self {
            Vartype::Binary => 0,
            Vartype::Spin => -1,
        }
    }

    /// Highest value of the domain.
    pub fn highest(self) -> i8 {
        match self {
            Vartype::Binary => 1,
            Vartype::Spin => 1,
        }
    }

    /// Returns the other value of the two-element domain.
    pub fn flip(self, value: i8) -> i8 {
        match self {
            Vartype::Binary => 1 - value,
            Vartype::Spin => -value,
        }
    }

    /// Whether `value` belongs to the domain.
    pub fn contains(self, value: i8) -> bool {
        value == self.lowest() || value == self.highest()
    }
}

impl fmt::Display for Vartype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Vartype::Binary => write!(f, "BINARY"),
            Vartype::Spin => write!(f, "SPIN"),
        }
    }
}

impl FromStr for Vartype {
    type Err = RexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BINARY" => Ok(Vartype::Binary),
            "SPIN" => Ok(Vartype::Spin),
            other => Err(RexError::Input(
                ErrorInfo::new("unknown-vartype", "unrecognised vartype")
                    .with_context("value", other)
                    .with_hint("use BINARY or SPIN"),
            )),
        }
    }
}

/// Summary statistics reported for a loaded problem.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProblemStats {
    /// Number of variables (highest index + 1).
    pub nodes: usize,
    /// Number of distinct coupled variable pairs.
    pub edges: usize,
    /// Edge density in percent, `200 * edges / (nodes * (nodes - 1))`.
    pub density: f64,
}

/// Immutable binary quadratic model shared read-only by every replica.
///
/// `E(x) = sum_i h_i x_i + sum_{i<j} J_ij x_i x_j`
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryQuadraticModel {
    vartype: Vartype,
    linear: Vec<f64>,
    quadratic: IndexMap<(usize, usize), f64>,
    adjacency: Vec<Vec<(usize, f64)>>,
}

#[derive(Serialize)]
struct CanonicalProblem<'a> {
    vartype: Vartype,
    linear: &'a [f64],
    quadratic: Vec<(usize, usize, f64)>,
}

impl BinaryQuadraticModel {
    /// Builds a model from linear biases and coupling triples.
    ///
    /// Couplings are keyed by the unordered variable pair; repeated pairs
    /// accumulate. Indices beyond `linear.len()` extend the variable set, up
    /// to [`MAX_VARIABLES`].
    pub fn from_terms(
        vartype: Vartype,
        mut linear: Vec<f64>,
        couplings: impl IntoIterator<Item = (usize, usize, f64)>,
    ) -> Result<Self, RexError> {
        if linear.len() > MAX_VARIABLES {
            return Err(RexError::Input(index_error(linear.len() - 1)));
        }
        let mut quadratic = IndexMap::<(usize, usize), f64>::new();
        for (u, v, bias) in couplings {
            if u.max(v) >= MAX_VARIABLES {
                return Err(RexError::Input(index_error(u.max(v))));
            }
            if u == v {
                return Err(RexError::Input(
                    ErrorInfo::new("self-coupling", "coupling endpoints must differ")
                        .with_context("variable", u),
                ));
            }
            if !bias.is_finite() {
                return Err(RexError::Input(
                    ErrorInfo::new("non-finite-bias", "coupling bias is not finite")
                        .with_context("u", u)
                        .with_context("v", v),
                ));
            }
            let key = (u.min(v), u.max(v));
            *quadratic.entry(key).or_insert(0.0) += bias;
            if linear.len() <= key.1 {
                linear.resize(key.1 + 1, 0.0);
            }
        }
        if let Some(index) = linear.iter().position(|bias| !bias.is_finite()) {
            return Err(RexError::Input(
                ErrorInfo::new("non-finite-bias", "linear bias is not finite")
                    .with_context("variable", index),
            ));
        }
        if linear.is_empty() {
            return Err(RexError::Input(ErrorInfo::new(
                "empty-problem",
                "problem defines no variables",
            )));
        }

        let mut adjacency = vec![Vec::new(); linear.len()];
        for (&(u, v), &bias) in &quadratic {
            adjacency[u].push((v, bias));
            adjacency[v].push((u, bias));
        }

        Ok(Self {
            vartype,
            linear,
            quadratic,
            adjacency,
        })
    }

    /// Parses the whitespace-delimited `i j value` coordinate format.
    ///
    /// Blank lines and `#` comments are skipped; a `# vartype=SPIN` header
    /// switches the domain (binary otherwise).
    pub fn from_coo_str(text: &str) -> Result<Self, RexError> {
        let mut vartype = Vartype::Binary;
        let mut linear = Vec::<f64>::new();
        let mut couplings = Vec::new();

        for (line_index, raw) in text.lines().enumerate() {
            let line_no = line_index + 1;
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(comment) = line.strip_prefix('#') {
                if let Some((key, value)) = comment.split_once('=') {
                    if key.trim().eq_ignore_ascii_case("vartype") {
                        vartype = value.parse().map_err(|err: RexError| {
                            RexError::Input(err.info().clone().with_context("line", line_no))
                        })?;
                    }
                }
                continue;
            }

            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() != 3 {
                return Err(RexError::Input(
                    ErrorInfo::new("coo-columns", "expected three columns `i j value`")
                        .with_context("line", line_no)
                        .with_context("found", fields.len()),
                ));
            }
            let i = parse_index(fields[0], line_no)?;
            let j = parse_index(fields[1], line_no)?;
            let value: f64 = fields[2].parse().map_err(|_| {
                RexError::Input(
                    ErrorInfo::new("coo-value", "bias is not a number")
                        .with_context("line", line_no)
                        .with_context("token", fields[2]),
                )
            })?;
            if !value.is_finite() {
                return Err(RexError::Input(
                    ErrorInfo::new("non-finite-bias", "bias is not finite")
                        .with_context("line", line_no),
                ));
            }

            if i == j {
                if linear.len() <= i {
                    linear.resize(i + 1, 0.0);
                }
                linear[i] += value;
            } else {
                couplings.push((i, j, value));
            }
        }

        Self::from_terms(vartype, linear, couplings)
    }

    /// Reads and parses a COO problem file.
    pub fn from_coo_path(path: &Path) -> Result<Self, RexError> {
        let text = fs::read_to_string(path).map_err(|err| {
            RexError::Input(
                ErrorInfo::new("problem-read", err.to_string())
                    .with_context("path", path.display()),
            )
        })?;
        Self::from_coo_str(&text).map_err(|err| match err {
            RexError::Input(info) => RexError::Input(info.with_context("path", path.display())),
            other => other,
        })
    }

    /// Variable domain.
    pub fn vartype(&self) -> Vartype {
        self.vartype
    }

    /// Number of variables.
    pub fn num_variables(&self) -> usize {
        self.linear.len()
    }

    /// Number of distinct coupled pairs.
    pub fn num_interactions(&self) -> usize {
        self.quadratic.len()
    }

    /// Linear bias of variable `v`.
    pub fn linear(&self, v: usize) -> f64 {
        self.linear.get(v).copied().unwrap_or(0.0)
    }

    /// Coupling between `u` and `v`, zero when absent.
    pub fn quadratic(&self, u: usize, v: usize) -> f64 {
        self.quadratic
            .get(&(u.min(v), u.max(v)))
            .copied()
            .unwrap_or(0.0)
    }

    /// Iterates the couplings in first-seen order.
    pub fn interactions(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.quadratic.iter().map(|(&(u, v), &bias)| (u, v, bias))
    }

    /// Edge density in percent, zero for fewer than two variables.
    pub fn density(&self) -> f64 {
        let n = self.num_variables();
        if n < 2 {
            return 0.0;
        }
        200.0 * self.num_interactions() as f64 / (n as f64 * (n - 1) as f64)
    }

    /// Node count, edge count and density.
    pub fn stats(&self) -> ProblemStats {
        ProblemStats {
            nodes: self.num_variables(),
            edges: self.num_interactions(),
            density: self.density(),
        }
    }

    /// Checks that `assignment` covers every variable with in-domain values.
    pub fn check_assignment(&self, assignment: &[i8]) -> Result<(), RexError> {
        if assignment.len() != self.num_variables() {
            return Err(RexError::Input(
                ErrorInfo::new("assignment-length", "assignment does not cover the problem")
                    .with_context("expected", self.num_variables())
                    .with_context("found", assignment.len()),
            ));
        }
        if let Some(index) = assignment.iter().position(|&x| !self.vartype.contains(x)) {
            return Err(RexError::Input(
                ErrorInfo::new("assignment-domain", "value outside the variable domain")
                    .with_context("variable", index)
                    .with_context("vartype", self.vartype),
            ));
        }
        Ok(())
    }

    /// Energy of a full assignment.
    pub fn energy(&self, assignment: &[i8]) -> Result<f64, RexError> {
        self.check_assignment(assignment)?;
        Ok(self.energy_unchecked(assignment))
    }

    /// Energy of an assignment already known to be valid.
    pub fn energy_unchecked(&self, assignment: &[i8]) -> f64 {
        let linear: f64 = self
            .linear
            .iter()
            .zip(assignment)
            .map(|(h, &x)| h * f64::from(x))
            .sum();
        let quadratic: f64 = self
            .quadratic
            .iter()
            .map(|(&(u, v), j)| j * f64::from(assignment[u]) * f64::from(assignment[v]))
            .sum();
        linear + quadratic
    }

    /// Energy change caused by flipping variable `v`.
    pub fn flip_delta(&self, assignment: &[i8], v: usize) -> f64 {
        let field = self.linear[v]
            + self.adjacency[v]
                .iter()
                .map(|&(u, j)| j * f64::from(assignment[u]))
                .sum::<f64>();
        let current = f64::from(assignment[v]);
        let flipped = f64::from(self.vartype.flip(assignment[v]));
        (flipped - current) * field
    }

    /// Linear and quadratic biases of the equivalent spin-valued model.
    pub fn spin_biases(&self) -> (Vec<f64>, Vec<(usize, usize, f64)>) {
        match self.vartype {
            Vartype::Spin => (self.linear.clone(), self.interactions().collect()),
            Vartype::Binary => {
                let mut h: Vec<f64> = self.linear.iter().map(|bias| bias / 2.0).collect();
                let mut j = Vec::with_capacity(self.quadratic.len());
                for (u, v, bias) in self.interactions() {
                    h[u] += bias / 4.0;
                    h[v] += bias / 4.0;
                    j.push((u, v, bias / 4.0));
                }
                (h, j)
            }
        }
    }

    /// Stable SHA-256 fingerprint of the model contents.
    pub fn fingerprint(&self) -> Result<String, RexError> {
        let mut quadratic: Vec<_> = self.interactions().collect();
        quadratic.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        let canonical = CanonicalProblem {
            vartype: self.vartype,
            linear: &self.linear,
            quadratic,
        };
        let bytes =
            serde_json::to_vec(&canonical).map_err(|err| RexError::serde("problem-hash", err))?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }
}

fn parse_index(token: &str, line_no: usize) -> Result<usize, RexError> {
    let index = token.parse::<usize>().map_err(|_| {
        RexError::Input(
            ErrorInfo::new("coo-index", "variable index is not a non-negative integer")
                .with_context("line", line_no)
                .with_context("token", token),
        )
    })?;
    if index >= MAX_VARIABLES {
        return Err(RexError::Input(index_error(index).with_context("line", line_no)));
    }
    Ok(index)
}

fn index_error(index: usize) -> ErrorInfo {
    ErrorInfo::new("coo-index", "variable index exceeds the supported range")
        .with_context("index", index)
        .with_context("limit", MAX_VARIABLES)
        .with_hint("variables must be numbered densely from 0")
}
