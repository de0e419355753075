//! Relation-graph construction over analyzed buffers.
//!
//! This crate turns an [`exprgraph_analysis::Analysis`] into the graph
//! the model consumes: nodes for syntax, tokens, usages, and scopes,
//! edge families from the flow approximation, plus the context graph
//! and training-sample plumbing layered on top.

pub mod builder;
pub mod context;
pub mod error;
pub mod train;

#[cfg(test)]
pub(crate) mod fixtures;

pub use builder::GraphBuilder;
pub use context::{
    ContextGraph, ContextGraphConfig, ContextVariable, CONTEXT_GRAPH_FEED_PREFIX,
    CONTEXT_GRAPH_NODE_STATES_OP,
};
pub use error::BuildError;
pub use train::{
    build_infer_name_batch, build_infer_name_sample, split_expansion_slice, ExpansionSlice,
    InferNameSample, SampleCounters, TrainConfig, TrainSampleErr, TrainSampleErrs,
    MAX_TRAIN_GRAPH_NODES,
};
