//! Batch-concatenable feed structures.
//!
//! Everything the model consumes lowers to a [`FeedDict`] keyed by
//! placeholder path. Training batches are assembled by appending feeds
//! with explicit node and sample offsets, so every structure here knows
//! how to shift itself into a larger batch without index collisions.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use exprgraph_core::{Edge, Graph, Node};

use crate::marker::is_special_token;
use crate::tensor::{FeedDict, ModelError, TensorValue};
use crate::vocab::{split_name_literal, type_to_subtokens, ModelMeta};

/// Per-node cap on literal subtokens fed to the model.
pub const MAX_SUBTOKENS_PER_NODE: usize = 9;

/// Per-node cap on type subtokens fed to the model.
pub const MAX_TYPES_PER_NODE: usize = 9;

/// Cap on terminal tokens gathered around a prediction site.
pub const MAX_CONTEXT_TOKENS: usize = 10;

fn join(prefix: &str, part: &str) -> String {
    if prefix.is_empty() {
        part.to_owned()
    } else {
        format!("{prefix}/{part}")
    }
}

// ---- segmented indices ----

/// A ragged list of vocabulary indices, segmented by sample id.
///
/// `indices[i]` belongs to the sample (usually a node) `sample_ids[i]`;
/// both vectors always have the same length.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentedIndicesFeed {
    pub indices: Vec<i64>,
    pub sample_ids: Vec<i64>,
}

impl SegmentedIndicesFeed {
    pub fn new() -> Self {
        SegmentedIndicesFeed::default()
    }

    /// One entry per id, all assigned to sample 0.
    pub fn from_ids(ids: impl IntoIterator<Item = i64>) -> Self {
        let indices: Vec<i64> = ids.into_iter().collect();
        let sample_ids = vec![0; indices.len()];
        SegmentedIndicesFeed { indices, sample_ids }
    }

    pub fn push(&mut self, index: i64, sample: i64) {
        self.indices.push(index);
        self.sample_ids.push(sample);
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn max_sample_id(&self) -> Option<i64> {
        self.sample_ids.iter().copied().max()
    }

    /// Appends `other`, shifting its sample ids and indices into the
    /// batch's coordinate space.
    pub fn append(&mut self, other: &SegmentedIndicesFeed, sample_offset: i64, index_offset: i64) {
        self.indices
            .extend(other.indices.iter().map(|i| i + index_offset));
        self.sample_ids
            .extend(other.sample_ids.iter().map(|s| s + sample_offset));
    }

    pub fn feed_dict(&self, prefix: &str) -> FeedDict {
        let mut fd = FeedDict::new();
        fd.insert(
            join(prefix, "indices"),
            TensorValue::Ints(self.indices.clone()),
        );
        fd.insert(
            join(prefix, "sample_ids"),
            TensorValue::Ints(self.sample_ids.clone()),
        );
        fd
    }
}

// ---- edges ----

/// Edge endpoint lists bucketed by `<kind>_<direction>` key.
///
/// Each bucket is sorted by `(from, to)` at construction so the feed is
/// deterministic for a given graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeFeed {
    buckets: BTreeMap<String, Vec<[i64; 2]>>,
}

impl EdgeFeed {
    pub fn new() -> Self {
        EdgeFeed::default()
    }

    pub fn from_edges<'a>(edges: impl IntoIterator<Item = &'a Edge>) -> Self {
        let mut buckets: BTreeMap<String, Vec<[i64; 2]>> = BTreeMap::new();
        for edge in edges {
            buckets
                .entry(edge.feed_key())
                .or_default()
                .push([edge.from.index() as i64, edge.to.index() as i64]);
        }
        for bucket in buckets.values_mut() {
            bucket.sort_unstable();
        }
        EdgeFeed { buckets }
    }

    pub fn insert(&mut self, key: String, from: i64, to: i64) {
        self.buckets.entry(key).or_default().push([from, to]);
    }

    pub fn bucket(&self, key: &str) -> &[[i64; 2]] {
        self.buckets.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[[i64; 2]])> {
        self.buckets.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn edge_count(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn append(&mut self, other: &EdgeFeed, node_offset: i64) {
        for (key, edges) in &other.buckets {
            let bucket = self.buckets.entry(key.clone()).or_default();
            bucket.extend(
                edges
                    .iter()
                    .map(|[from, to]| [from + node_offset, to + node_offset]),
            );
        }
    }

    pub fn feed_dict(&self, prefix: &str) -> FeedDict {
        self.buckets
            .iter()
            .map(|(key, edges)| (join(prefix, key), TensorValue::IntPairs(edges.clone())))
            .collect()
    }
}

// ---- nodes ----

/// Subtokens representing a node's literal, capped at `cap`.
fn node_subtokens(node: &Node, cap: usize) -> Vec<String> {
    let attrs = &node.attrs;
    let mut sts = if !attrs.literal.is_empty() {
        if is_special_token(&attrs.literal) {
            vec![attrs.literal.clone()]
        } else if attrs.label == "NameExpr" || attrs.label == "Usage" {
            split_name_literal(&attrs.literal)
        } else {
            vec![attrs.literal.clone()]
        }
    } else if !attrs.label.is_empty() {
        vec![attrs.label.clone()]
    } else {
        panic!("node has neither literal nor label: {attrs:?}");
    };
    sts.truncate(cap);
    sts
}

/// Deduplicated, sorted type subtokens for a node, capped at `cap`.
fn node_types(node: &Node, cap: usize) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for label in &node.attrs.types {
        for sub in type_to_subtokens(label) {
            if seen.insert(sub.clone()) {
                out.push(sub);
            }
        }
    }
    out.sort_unstable();
    out.truncate(cap);
    if out.is_empty() {
        panic!("node has no type subtokens: {:?}", node.attrs);
    }
    out
}

/// Type and subtoken indices for a list of nodes, segmented by the
/// node's position in the list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeFeed {
    pub types: SegmentedIndicesFeed,
    pub subtokens: SegmentedIndicesFeed,
    num_nodes: usize,
}

impl NodeFeed {
    pub fn from_nodes<'a>(meta: &ModelMeta, nodes: impl IntoIterator<Item = &'a Node>) -> Self {
        let mut types = SegmentedIndicesFeed::new();
        let mut subtokens = SegmentedIndicesFeed::new();
        let mut num_nodes = 0;
        for (i, node) in nodes.into_iter().enumerate() {
            for sub in node_subtokens(node, MAX_SUBTOKENS_PER_NODE) {
                subtokens.push(meta.name_subtokens.index(&sub), i as i64);
            }
            for sub in node_types(node, MAX_TYPES_PER_NODE) {
                types.push(meta.type_subtokens.index(&sub), i as i64);
            }
            num_nodes += 1;
        }
        NodeFeed {
            types,
            subtokens,
            num_nodes,
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn append(&mut self, other: &NodeFeed, node_offset: i64) {
        self.types.append(&other.types, node_offset, 0);
        self.subtokens.append(&other.subtokens, node_offset, 0);
        self.num_nodes += other.num_nodes;
    }

    pub fn feed_dict(&self, prefix: &str) -> FeedDict {
        let mut fd = self.types.feed_dict(&join(prefix, "types"));
        fd.extend(self.subtokens.feed_dict(&join(prefix, "subtokens")));
        fd
    }
}

// ---- whole-graph feed ----

/// A graph in the form the encoder half of the model consumes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphFeed {
    pub node_types: SegmentedIndicesFeed,
    pub node_subtokens: SegmentedIndicesFeed,
    pub edges: EdgeFeed,
    num_nodes: usize,
}

impl GraphFeed {
    pub fn from_graph(meta: &ModelMeta, graph: &Graph) -> Self {
        let nf = NodeFeed::from_nodes(meta, graph.nodes().map(|(_, n)| n));
        GraphFeed {
            node_types: nf.types,
            node_subtokens: nf.subtokens,
            edges: EdgeFeed::from_edges(graph.edges()),
            num_nodes: graph.node_count(),
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn append(&mut self, other: &GraphFeed, node_offset: i64) {
        self.node_types.append(&other.node_types, node_offset, 0);
        self.node_subtokens
            .append(&other.node_subtokens, node_offset, 0);
        self.edges.append(&other.edges, node_offset);
        self.num_nodes += other.num_nodes;
    }

    pub fn feed_dict(&self, prefix: &str) -> FeedDict {
        let placeholders = join(prefix, "placeholders");
        let mut fd = self
            .node_types
            .feed_dict(&join(&placeholders, "nodes/types"));
        fd.extend(
            self.node_subtokens
                .feed_dict(&join(&placeholders, "nodes/subtokens")),
        );
        fd.extend(self.edges.feed_dict(&join(&placeholders, "edges")));
        fd
    }

    /// Checks that every node carries at least one type and subtoken and
    /// that every edge endpoint is in range.
    pub fn validate(&self) -> Result<(), ModelError> {
        let n = self.num_nodes as i64;
        let typed: BTreeSet<i64> = self.node_types.sample_ids.iter().copied().collect();
        let subtoked: BTreeSet<i64> = self.node_subtokens.sample_ids.iter().copied().collect();
        for id in 0..n {
            if !typed.contains(&id) {
                return Err(ModelError::InvalidFeed {
                    detail: format!("no type for node {id}"),
                });
            }
            if !subtoked.contains(&id) {
                return Err(ModelError::InvalidFeed {
                    detail: format!("no subtoken for node {id}"),
                });
            }
        }
        for (key, edges) in self.edges.iter() {
            for [from, to] in edges {
                if *from >= n || *to >= n || *from < 0 || *to < 0 {
                    return Err(ModelError::InvalidFeed {
                        detail: format!("edge {key} [{from}, {to}] out of range for {n} nodes"),
                    });
                }
            }
        }
        Ok(())
    }
}

// ---- decoder feeds ----

/// Usage nodes feeding the name encoder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameEncoderFeed {
    pub usages: SegmentedIndicesFeed,
}

impl NameEncoderFeed {
    pub fn feed_dict(&self, prefix: &str) -> FeedDict {
        self.usages.feed_dict(&join(prefix, "usages"))
    }
}

/// Inputs for one name prediction: the site, the candidate usages, and
/// the decoder's type/subtoken context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameModelFeed {
    pub prediction_nodes: Vec<i64>,
    /// Index of the correct candidate per sample; training only.
    pub labels: Vec<i64>,
    /// Incorrect candidate indices per sample; training only.
    pub corrupted: SegmentedIndicesFeed,
    pub types: SegmentedIndicesFeed,
    pub subtokens: SegmentedIndicesFeed,
    pub names: NameEncoderFeed,
}

impl NameModelFeed {
    pub fn num_samples(&self) -> usize {
        self.prediction_nodes.len()
    }

    /// Appends `other` with its node ids shifted by `node_offset` and
    /// its candidate (label) indices shifted by `label_offset`.
    pub fn append(&mut self, other: &NameModelFeed, node_offset: i64, label_offset: i64) {
        let sample_offset = self.prediction_nodes.len() as i64;
        self.prediction_nodes
            .extend(other.prediction_nodes.iter().map(|n| n + node_offset));
        self.labels
            .extend(other.labels.iter().map(|l| l + label_offset));
        self.corrupted
            .append(&other.corrupted, sample_offset, label_offset);
        self.types.append(&other.types, sample_offset, 0);
        self.subtokens.append(&other.subtokens, sample_offset, 0);
        self.names
            .usages
            .append(&other.names.usages, sample_offset, node_offset);
    }

    pub fn feed_dict(&self, prefix: &str) -> FeedDict {
        let mut fd = FeedDict::new();
        fd.insert(
            join(prefix, "prediction_nodes"),
            TensorValue::Ints(self.prediction_nodes.clone()),
        );
        fd.insert(
            join(prefix, "labels"),
            TensorValue::Ints(self.labels.clone()),
        );
        fd.extend(self.corrupted.feed_dict(&join(prefix, "corrupted")));
        fd.extend(self.types.feed_dict(&join(prefix, "types")));
        fd.extend(self.subtokens.feed_dict(&join(prefix, "subtokens")));
        fd.extend(self.names.feed_dict(&join(prefix, "name_encoder")));
        fd
    }
}

/// Inputs for one production prediction: the site, the target list, and
/// the scope/context encoders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionModelFeed {
    pub prediction_nodes: Vec<i64>,
    /// Production ids the model scores against each other.
    pub decoder_targets: SegmentedIndicesFeed,
    /// Index of the correct target per sample; training only.
    pub labels: Vec<i64>,
    /// Incorrect target indices per sample; training only.
    pub corrupted: SegmentedIndicesFeed,
    pub scope_encoder: SegmentedIndicesFeed,
    pub context_tokens: SegmentedIndicesFeed,
}

impl ProductionModelFeed {
    pub fn num_samples(&self) -> usize {
        self.prediction_nodes.len()
    }

    pub fn append(&mut self, other: &ProductionModelFeed, node_offset: i64) {
        let sample_offset = self.prediction_nodes.len() as i64;
        self.prediction_nodes
            .extend(other.prediction_nodes.iter().map(|n| n + node_offset));
        self.labels.extend(other.labels.iter().copied());
        self.corrupted.append(&other.corrupted, sample_offset, 0);
        self.decoder_targets
            .append(&other.decoder_targets, sample_offset, 0);
        self.scope_encoder
            .append(&other.scope_encoder, sample_offset, node_offset);
        self.context_tokens
            .append(&other.context_tokens, sample_offset, node_offset);
    }

    pub fn feed_dict(&self, prefix: &str) -> FeedDict {
        let mut fd = FeedDict::new();
        fd.insert(
            join(prefix, "prediction_nodes"),
            TensorValue::Ints(self.prediction_nodes.clone()),
        );
        fd.insert(
            join(prefix, "labels"),
            TensorValue::Ints(self.labels.clone()),
        );
        fd.extend(self.corrupted.feed_dict(&join(prefix, "corrupted")));
        fd.extend(
            self.decoder_targets
                .feed_dict(&join(prefix, "decoder_targets")),
        );
        fd.extend(self.scope_encoder.feed_dict(&join(prefix, "scope_encoder")));
        fd.extend(
            self.context_tokens
                .feed_dict(&join(prefix, "context_tokens")),
        );
        fd
    }
}

// ---- expansion feeds ----

/// The subgraph sent to the expansion half of the model: edges into the
/// lookup nodes, plus id maps relating context-graph, lookup, and
/// subgraph coordinates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpansionGraphBaseFeed {
    pub edges: EdgeFeed,
    /// Subgraph ids of the context nodes, in embedding order.
    pub context_to_expansion: Vec<i64>,
    /// Types and subtokens of the lookup nodes (the nodes whose
    /// embeddings the model computes fresh).
    pub lookup_nodes: NodeFeed,
    /// Subgraph ids of the lookup nodes.
    pub lookup_to_expansion: Vec<i64>,
}

impl ExpansionGraphBaseFeed {
    pub fn feed_dict(&self, prefix: &str) -> FeedDict {
        let placeholders = join(prefix, "placeholders");
        let mut fd = FeedDict::new();
        fd.insert(
            join(&placeholders, "context_to_expansion"),
            TensorValue::Ints(self.context_to_expansion.clone()),
        );
        fd.insert(
            join(&placeholders, "lookup_to_expansion"),
            TensorValue::Ints(self.lookup_to_expansion.clone()),
        );
        fd.extend(self.edges.feed_dict(&placeholders));
        fd.extend(self.lookup_nodes.feed_dict(&placeholders));
        fd
    }
}

/// Training form of the expansion feed: context nodes are referenced by
/// id into a separately batched context graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpansionGraphTrainFeed {
    pub base: ExpansionGraphBaseFeed,
    /// Context-graph ids of the context nodes, parallel to
    /// `base.context_to_expansion`.
    pub context_graph_nodes: Vec<i64>,
    num_nodes: usize,
}

impl ExpansionGraphTrainFeed {
    pub fn new(base: ExpansionGraphBaseFeed, context_graph_nodes: Vec<i64>, num_nodes: usize) -> Self {
        ExpansionGraphTrainFeed {
            base,
            context_graph_nodes,
            num_nodes,
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    /// Appends `other`. The context graph and the expansion subgraph are
    /// separate id spaces, so each gets its own offset; lookup nodes get
    /// a third offset derived from the sample ids already present so the
    /// batched lookup embeddings stay densely indexed.
    pub fn append(
        &mut self,
        other: &ExpansionGraphTrainFeed,
        context_offset: i64,
        expansion_offset: i64,
    ) {
        self.base.edges.append(&other.base.edges, expansion_offset);

        for (cg, eg) in other
            .context_graph_nodes
            .iter()
            .zip(&other.base.context_to_expansion)
        {
            self.context_graph_nodes.push(cg + context_offset);
            self.base.context_to_expansion.push(eg + expansion_offset);
        }

        self.base.lookup_to_expansion.extend(
            other
                .base
                .lookup_to_expansion
                .iter()
                .map(|id| id + expansion_offset),
        );

        let lookup_offset = self
            .base
            .lookup_nodes
            .subtokens
            .max_sample_id()
            .map_or(0, |m| m + 1);
        self.base
            .lookup_nodes
            .append(&other.base.lookup_nodes, lookup_offset);

        self.num_nodes += other.num_nodes;
    }

    pub fn feed_dict(&self, prefix: &str) -> FeedDict {
        let mut fd = self.base.feed_dict(prefix);
        fd.insert(
            join(&join(prefix, "placeholders"), "context_graph_nodes"),
            TensorValue::Ints(self.context_graph_nodes.clone()),
        );
        fd
    }
}

/// Serving form of the expansion feed: context embeddings are sent
/// along instead of referenced by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpansionGraphTestFeed {
    pub base: ExpansionGraphBaseFeed,
    /// One embedding row per context node, in
    /// `base.context_to_expansion` order.
    pub context_node_embeddings: Vec<Vec<f32>>,
}

impl ExpansionGraphTestFeed {
    pub fn feed_dict(&self, prefix: &str) -> FeedDict {
        let mut fd = self.base.feed_dict(prefix);
        fd.insert(
            join(&join(prefix, "test_placeholders"), "context_node_embeddings"),
            TensorValue::FloatMatrix(self.context_node_embeddings.clone()),
        );
        fd
    }
}
