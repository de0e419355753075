//! Completion search over encoded context graphs.
//!
//! An encoded [`exprgraph_build::ContextGraph`] is frozen behind a
//! [`SharedContext`]; each search branch layers a copy-on-write
//! [`ExpansionState`] on top and carries a stack of decoder tasks. The
//! [`LexicalDecoder`] turns completed tasks into follow-up tasks per the
//! expression grammar, [`EgUpdate`] runs one inference per head task and
//! forks a branch per ranked candidate, and [`Predictor`] drives the
//! beam search and renders the surviving branches into completions.

pub mod decoder;
pub mod error;
pub mod feed;
pub mod info;
pub mod predictor;
pub mod state;
pub mod task;
pub mod update;

#[cfg(test)]
pub(crate) mod fixtures;

pub use decoder::{LexicalDecoder, PLACEHOLDER_LITERAL};
pub use error::SearchError;
pub use feed::{
    build_subgraph, Subgraph, EXPANSION_FEED_PREFIX, EXPANSION_NODE_STATES_OP,
    INFER_NAME_FEED_PREFIX, INFER_NAME_PRED_OP, INFER_PRODUCTION_FEED_PREFIX,
    INFER_PRODUCTION_PRED_OP,
};
pub use info::{ArgClass, ArgPattern, CallPatterns, FuncInfo, SymbolInfoSource};
pub use predictor::{
    CompToken, PredictedCall, PredictedCallArg, Prediction, Predictor, BEAM_SIZE,
    DEFAULT_SEARCH_STEPS,
};
pub use state::{EgVariable, ExpansionState, SharedContext};
pub use task::{DecoderStep, EgTask, EgTaskStack, ProdChoice, TaskKind};
pub use update::{EgUpdate, SearchEnv};
