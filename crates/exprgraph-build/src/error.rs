//! Failures of graph and sample construction.

use thiserror::Error;

use exprgraph_core::{Aborted, AstId};
use exprgraph_model::ModelError;

/// Why a graph or training sample could not be built.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The requested syntax node has no graph node, usually because it
    /// was pruned away or never materialized.
    #[error("no graph node for syntax node {ast:?}")]
    SiteNotFound { ast: AstId },

    /// Not enough variables are visible at the site.
    #[error("{found} variables in scope, need at least {needed}")]
    EmptyScope { found: usize, needed: usize },

    /// The pruned graph still exceeds the node budget.
    #[error("graph has {nodes} nodes, limit is {max}")]
    GraphTooLarge { nodes: usize, max: usize },

    /// The site's surroundings do not have the shape the caller assumed.
    #[error("unexpected site shape: {detail}")]
    SiteMismatch { detail: String },

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Aborted(#[from] Aborted),
}
