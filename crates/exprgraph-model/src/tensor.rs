//! The scoring-model boundary.
//!
//! The trained model is an external collaborator: a pure function from a
//! dictionary of named placeholder tensors to a set of fetched tensors.
//! Everything this library knows about it is the [`ScoringModel`] trait
//! and the small set of tensor shapes the feeds lower to.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A tensor exchanged with the scoring model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TensorValue {
    /// Rank-1 integer tensor: vocabulary indices, node ids, sample ids.
    Ints(Vec<i64>),
    /// Rank-2 integer tensor of shape `[n, 2]`: edge endpoint lists.
    IntPairs(Vec<[i64; 2]>),
    /// Rank-1 float tensor: per-candidate scores.
    Floats(Vec<f32>),
    /// Rank-2 float tensor: per-node embedding rows.
    FloatMatrix(Vec<Vec<f32>>),
}

impl TensorValue {
    fn shape_name(&self) -> &'static str {
        match self {
            TensorValue::Ints(_) => "ints",
            TensorValue::IntPairs(_) => "int pairs",
            TensorValue::Floats(_) => "floats",
            TensorValue::FloatMatrix(_) => "float matrix",
        }
    }

    pub fn as_ints(&self) -> Result<&[i64], ModelError> {
        match self {
            TensorValue::Ints(vals) => Ok(vals),
            other => Err(ModelError::Shape {
                wanted: "ints",
                got: other.shape_name(),
            }),
        }
    }

    pub fn as_floats(&self) -> Result<&[f32], ModelError> {
        match self {
            TensorValue::Floats(vals) => Ok(vals),
            other => Err(ModelError::Shape {
                wanted: "floats",
                got: other.shape_name(),
            }),
        }
    }

    pub fn as_float_matrix(&self) -> Result<&[Vec<f32>], ModelError> {
        match self {
            TensorValue::FloatMatrix(rows) => Ok(rows),
            other => Err(ModelError::Shape {
                wanted: "float matrix",
                got: other.shape_name(),
            }),
        }
    }
}

/// Placeholder tensors keyed by path, e.g.
/// `test/expansion_graph/placeholders/edges/ast_child_forward`.
pub type FeedDict = BTreeMap<String, TensorValue>;

/// Tensors returned from one model invocation, keyed by fetch op.
pub type FetchResults = BTreeMap<String, TensorValue>;

/// Looks up a fetched tensor, failing with [`ModelError::MissingFetch`].
pub fn fetch<'a>(results: &'a FetchResults, op: &str) -> Result<&'a TensorValue, ModelError> {
    results.get(op).ok_or_else(|| ModelError::MissingFetch {
        op: op.to_owned(),
    })
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model invocation failed: {message}")]
    Invocation { message: String },
    #[error("fetch op {op:?} missing from model results")]
    MissingFetch { op: String },
    #[error("tensor has wrong shape: wanted {wanted}, got {got}")]
    Shape {
        wanted: &'static str,
        got: &'static str,
    },
    #[error("invalid feed: {detail}")]
    InvalidFeed { detail: String },
    #[error("unknown production {label:?}")]
    UnknownProduction { label: String },
    #[error("model returned no nodes")]
    NoNodes,
}

/// One propagation pass through the trained model.
///
/// Implementations are expected to be pure in `feed` and possibly
/// expensive; callers check their abort token before invoking.
pub trait ScoringModel {
    fn run(&self, feed: &FeedDict, fetches: &[&str]) -> Result<FetchResults, ModelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_enforce_shape() {
        let t = TensorValue::Floats(vec![0.5, 0.25]);
        assert_eq!(t.as_floats().unwrap(), &[0.5, 0.25]);
        assert!(matches!(
            t.as_ints(),
            Err(ModelError::Shape { wanted: "ints", .. })
        ));
    }

    #[test]
    fn fetch_reports_missing_ops() {
        let mut results = FetchResults::new();
        results.insert("pred".to_owned(), TensorValue::Floats(vec![1.0]));
        assert!(fetch(&results, "pred").is_ok());
        let err = fetch(&results, "logits").unwrap_err();
        assert!(matches!(err, ModelError::MissingFetch { op } if op == "logits"));
    }

    #[test]
    fn tensors_round_trip_through_json() {
        let t = TensorValue::IntPairs(vec![[0, 1], [2, 3]]);
        let json = serde_json::to_string(&t).unwrap();
        let back: TensorValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);
    }
}
