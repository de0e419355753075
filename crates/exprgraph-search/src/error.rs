use exprgraph_build::BuildError;
use exprgraph_core::{Aborted, AstId};
use exprgraph_model::ModelError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("site {ast:?} is not expandable: {detail}")]
    UnsupportedSite { ast: AstId, detail: String },
    #[error("decoder lost its place: {detail}")]
    Decode { detail: String },
    #[error("no function info for {path:?}")]
    MissingFuncInfo { path: String },
    #[error("no candidates at the site: {detail}")]
    NoCandidates { detail: String },
    #[error("unresolved function at the call site")]
    UnresolvedFunction,
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    Aborted(#[from] Aborted),
}
