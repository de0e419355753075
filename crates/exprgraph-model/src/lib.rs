pub mod feed;
pub mod marker;
pub mod tensor;
pub mod vocab;

// Re-export commonly used types
pub use feed::{
    EdgeFeed, ExpansionGraphBaseFeed, ExpansionGraphTestFeed, ExpansionGraphTrainFeed, GraphFeed,
    NameEncoderFeed, NameModelFeed, NodeFeed, ProductionModelFeed, SegmentedIndicesFeed,
    MAX_CONTEXT_TOKENS, MAX_SUBTOKENS_PER_NODE, MAX_TYPES_PER_NODE,
};
pub use tensor::{fetch, FeedDict, FetchResults, ModelError, ScoringModel, TensorValue};
pub use vocab::{split_name_literal, type_to_subtokens, ModelMeta, ProductionIndex, SubtokenIndex};
