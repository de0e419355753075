//! Training-sample assembly.
//!
//! A name sample holds out one variable occurrence, replaces it with the
//! infer-name hole, and packages three feeds: the surrounding context
//! graph, the expansion slice covering the hole and its candidate
//! usages, and the name-model inputs naming the correct candidate.

use indexmap::IndexSet;
use rand::seq::SliceRandom;
use rand::Rng;
use thiserror::Error;
use tracing::debug;

use exprgraph_analysis::Analysis;
use exprgraph_core::{AstId, Edge, EdgeSet, Graph, Node, NodeId};
use exprgraph_model::feed::{NameEncoderFeed, NodeFeed};
use exprgraph_model::{
    EdgeFeed, ExpansionGraphBaseFeed, ExpansionGraphTrainFeed, FeedDict, GraphFeed, ModelMeta,
    NameModelFeed, SegmentedIndicesFeed,
};
use serde::{Deserialize, Serialize};

use crate::builder::GraphBuilder;
use crate::context::CONTEXT_GRAPH_FEED_PREFIX;
use crate::error::BuildError;

/// Node budget for one training graph after pruning.
pub const MAX_TRAIN_GRAPH_NODES: usize = 3000;

/// Feed-dict prefix for the training expansion slice.
pub const TRAIN_EXPANSION_GRAPH_PREFIX: &str = "train/expansion_graph";

/// Feed-dict prefix for the training name model.
pub const TRAIN_INFER_NAME_PREFIX: &str = "train/infer_name";

#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub edge_set: EdgeSet,
    /// Neighbor steps kept around the hole when pruning.
    pub max_hops: usize,
    /// Wrong candidates sampled per prediction.
    pub num_corrupted: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig {
            edge_set: EdgeSet::all(),
            max_hops: 3,
            num_corrupted: 3,
        }
    }
}

/// One failed sample build, tagged with the site it was attempted at.
#[derive(Debug, Error)]
#[error("sample at syntax node {site}: {err}")]
pub struct TrainSampleErr {
    pub site: AstId,
    #[source]
    pub err: BuildError,
}

/// Per-sample failures collected over one batch. Batch construction
/// keeps going past a failed sample; the aggregate reports every failure
/// so callers can invalidate the offending sites.
#[derive(Debug, Default, Error)]
#[error("{} of a batch's samples failed", .errs.len())]
pub struct TrainSampleErrs {
    pub errs: Vec<TrainSampleErr>,
}

impl TrainSampleErrs {
    pub fn push(&mut self, site: AstId, err: BuildError) {
        self.errs.push(TrainSampleErr { site, err });
    }

    pub fn is_empty(&self) -> bool {
        self.errs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errs.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrainSampleErr> {
        self.errs.iter()
    }
}

/// Outcome tallies for a batch of sample builds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleCounters {
    pub built: u64,
    pub site_not_found: u64,
    pub empty_scope: u64,
    pub graph_too_large: u64,
    pub model: u64,
    pub other: u64,
}

impl SampleCounters {
    pub fn record<T>(&mut self, result: &Result<T, BuildError>) {
        match result {
            Ok(_) => self.built += 1,
            Err(err) => {
                debug!(%err, "train sample skipped");
                match err {
                    BuildError::SiteNotFound { .. } => self.site_not_found += 1,
                    BuildError::EmptyScope { .. } => self.empty_scope += 1,
                    BuildError::GraphTooLarge { .. } => self.graph_too_large += 1,
                    BuildError::Model(_) => self.model += 1,
                    _ => self.other += 1,
                }
            }
        }
    }

    pub fn attempted(&self) -> u64 {
        self.built
            + self.site_not_found
            + self.empty_scope
            + self.graph_too_large
            + self.model
            + self.other
    }

    pub fn merge(&mut self, other: &SampleCounters) {
        self.built += other.built;
        self.site_not_found += other.site_not_found;
        self.empty_scope += other.empty_scope;
        self.graph_too_large += other.graph_too_large;
        self.model += other.model;
        self.other += other.other;
    }
}

// ---------------------------------------------------------------------------
// Expansion slice
// ---------------------------------------------------------------------------

/// Result of carving the expansion nodes out of a built graph: the graph
/// shrinks to the context half, and the feed describes the carved slice.
pub struct ExpansionSlice {
    pub feed: ExpansionGraphTrainFeed,
    /// Subgraph ids of the carved nodes, in input order.
    pub lookup_ids: Vec<i64>,
    /// Old-to-new mapping for the surviving context graph.
    pub remap: Vec<Option<NodeId>>,
}

/// Removes `eg_only` from `graph` and builds the expansion feed over
/// them: the slice keeps every forward edge touching a carved node, and
/// the subgraph spans those edges' context endpoints followed by the
/// carved nodes themselves.
///
/// Panics if an edge endpoint escapes both node sets; that would mean
/// the graph's edge list and node arena disagree.
pub fn split_expansion_slice(
    graph: &mut Graph,
    meta: &ModelMeta,
    eg_only: &[NodeId],
) -> Result<ExpansionSlice, BuildError> {
    let eg_set: IndexSet<NodeId> = eg_only.iter().copied().collect();
    if eg_set.len() != eg_only.len() {
        return Err(BuildError::SiteMismatch {
            detail: "expansion node listed twice".to_owned(),
        });
    }

    let lookup_snapshot: Vec<Node> = eg_only.iter().map(|&id| graph.node(id).clone()).collect();
    let eg_edges: Vec<Edge> = graph
        .edges()
        .iter()
        .filter(|e| e.forward && (eg_set.contains(&e.from) || eg_set.contains(&e.to)))
        .copied()
        .collect();

    let mut cg_members: IndexSet<NodeId> = IndexSet::new();
    for e in &eg_edges {
        for end in [e.from, e.to] {
            if !eg_set.contains(&end) {
                cg_members.insert(end);
            }
        }
    }

    let keep: IndexSet<NodeId> = graph
        .nodes()
        .map(|(id, _)| id)
        .filter(|id| !eg_set.contains(id))
        .collect();
    let remap = graph.restrict_to(&keep);

    let subgraph_id = |node: NodeId| -> i64 {
        match cg_members.get_index_of(&node) {
            Some(pos) => pos as i64,
            None => (cg_members.len() + eg_set.get_index_of(&node).unwrap()) as i64,
        }
    };
    let mut edges = EdgeFeed::new();
    for e in &eg_edges {
        edges.insert(e.feed_key(), subgraph_id(e.from), subgraph_id(e.to));
    }

    let context_graph_nodes: Vec<i64> = cg_members
        .iter()
        .map(|&id| {
            remap[id.index()]
                .map(|n| n.index() as i64)
                .ok_or(BuildError::SiteMismatch {
                    detail: "slice edge endpoint missing from context graph".to_owned(),
                })
        })
        .collect::<Result<_, _>>()?;
    let context_to_expansion: Vec<i64> = (0..cg_members.len() as i64).collect();
    let lookup_ids: Vec<i64> = (0..eg_only.len())
        .map(|i| (cg_members.len() + i) as i64)
        .collect();
    let lookup_nodes = NodeFeed::from_nodes(meta, lookup_snapshot.iter());
    let num_nodes = cg_members.len() + eg_only.len();

    let feed = ExpansionGraphTrainFeed::new(
        ExpansionGraphBaseFeed {
            edges,
            context_to_expansion,
            lookup_nodes,
            lookup_to_expansion: lookup_ids.clone(),
        },
        context_graph_nodes,
        num_nodes,
    );
    Ok(ExpansionSlice {
        feed,
        lookup_ids,
        remap,
    })
}

// ---------------------------------------------------------------------------
// Name samples
// ---------------------------------------------------------------------------

/// One batched-appendable name-prediction sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InferNameSample {
    pub context_graph: GraphFeed,
    pub expansion_graph: ExpansionGraphTrainFeed,
    pub name: NameModelFeed,
}

impl InferNameSample {
    pub fn num_samples(&self) -> usize {
        self.name.num_samples()
    }

    /// Appends `other` into this batch. The context graph, the expansion
    /// subgraph, and the flat candidate list each keep their own offset.
    pub fn append(&mut self, other: &InferNameSample) {
        let context_offset = self.context_graph.num_nodes() as i64;
        let expansion_offset = self.expansion_graph.num_nodes() as i64;
        let label_offset = self.name.names.usages.len() as i64;
        self.context_graph.append(&other.context_graph, context_offset);
        self.expansion_graph
            .append(&other.expansion_graph, context_offset, expansion_offset);
        self.name.append(&other.name, expansion_offset, label_offset);
    }

    pub fn feed_dict(&self) -> FeedDict {
        let mut fd = self.context_graph.feed_dict(CONTEXT_GRAPH_FEED_PREFIX);
        fd.extend(self.expansion_graph.feed_dict(TRAIN_EXPANSION_GRAPH_PREFIX));
        fd.extend(self.name.feed_dict(TRAIN_INFER_NAME_PREFIX));
        fd
    }
}

/// Builds a name sample holding out the occurrence at `site_ast`.
pub fn build_infer_name_sample(
    analysis: &Analysis,
    site_ast: AstId,
    config: &TrainConfig,
    meta: &ModelMeta,
    rng: &mut impl Rng,
) -> Result<InferNameSample, BuildError> {
    let mut builder = GraphBuilder::new(analysis, true);
    builder.build_edges(&config.edge_set);

    let site = builder.site_node(site_ast)?;
    let site_span = builder
        .name_span(site_ast)
        .ok_or(BuildError::SiteNotFound { ast: site_ast })?;
    let scope = builder.scope_at(site_span, true);
    if scope.len() < 2 {
        return Err(BuildError::EmptyScope {
            found: scope.len(),
            needed: 2,
        });
    }
    let target = builder
        .variables()
        .variable_for_name(site_ast)
        .filter(|v| scope.contains(v))
        .ok_or_else(|| BuildError::SiteMismatch {
            detail: "held-out occurrence is not a scoped variable".to_owned(),
        })?;

    builder.mark_infer_site(site);
    let mut candidates = Vec::new();
    for &var in &scope {
        if let Some(usage) = builder.add_usage_node(var, site_span) {
            candidates.push((var, usage));
        }
    }
    let label = candidates
        .iter()
        .position(|(v, _)| *v == target)
        .ok_or_else(|| BuildError::SiteMismatch {
            detail: "held-out variable has no occurrence before the site".to_owned(),
        })?;

    let mut graph = builder.finish();
    let mut seeds = vec![site];
    seeds.extend(candidates.iter().map(|(_, n)| *n));
    let remap = graph.prune(&seeds, config.max_hops);
    if graph.node_count() > MAX_TRAIN_GRAPH_NODES {
        return Err(BuildError::GraphTooLarge {
            nodes: graph.node_count(),
            max: MAX_TRAIN_GRAPH_NODES,
        });
    }

    // Seeds always survive pruning.
    let site = remap[site.index()].unwrap();
    let candidate_nodes: Vec<NodeId> = candidates
        .iter()
        .map(|(_, n)| remap[n.index()].unwrap())
        .collect();
    let candidate_snapshot: Vec<Node> = candidate_nodes
        .iter()
        .map(|&id| graph.node(id).clone())
        .collect();

    let mut eg_only = vec![site];
    eg_only.extend(&candidate_nodes);
    let slice = split_expansion_slice(&mut graph, meta, &eg_only)?;

    let context_graph = GraphFeed::from_graph(meta, &graph);
    context_graph.validate()?;

    // The decoder compares the hole against the candidates' types and
    // subtokens, all tagged with this single sample.
    let nf = NodeFeed::from_nodes(meta, candidate_snapshot.iter());
    let mut types = nf.types.clone();
    types.sample_ids.iter_mut().for_each(|s| *s = 0);
    let mut subtokens = nf.subtokens.clone();
    subtokens.sample_ids.iter_mut().for_each(|s| *s = 0);

    let name = NameModelFeed {
        prediction_nodes: vec![slice.lookup_ids[0]],
        labels: vec![label as i64],
        corrupted: corrupted_candidates(rng, label, candidates.len(), config.num_corrupted),
        types,
        subtokens,
        names: NameEncoderFeed {
            usages: SegmentedIndicesFeed {
                indices: slice.lookup_ids[1..].to_vec(),
                sample_ids: vec![0; candidates.len()],
            },
        },
    };
    debug!(
        context_nodes = context_graph.num_nodes(),
        candidates = candidates.len(),
        label,
        "name sample built"
    );
    Ok(InferNameSample {
        context_graph,
        expansion_graph: slice.feed,
        name,
    })
}

/// Builds one appended batch over `sites`. A failed site is tallied in
/// `counters` and collected into the returned [`TrainSampleErrs`]
/// without failing the rest of the batch.
pub fn build_infer_name_batch(
    analysis: &Analysis,
    sites: &[AstId],
    config: &TrainConfig,
    meta: &ModelMeta,
    rng: &mut impl Rng,
    counters: &mut SampleCounters,
) -> (InferNameSample, TrainSampleErrs) {
    let mut batch = InferNameSample::default();
    let mut errs = TrainSampleErrs::default();
    for &site in sites {
        let result = build_infer_name_sample(analysis, site, config, meta, rng);
        counters.record(&result);
        match result {
            Ok(sample) => batch.append(&sample),
            Err(err) => errs.push(site, err),
        }
    }
    (batch, errs)
}

/// Distinct wrong candidate indices for one sample, at most
/// `num_corrupted` of them, in ascending order.
fn corrupted_candidates(
    rng: &mut impl Rng,
    label: usize,
    num_candidates: usize,
    num_corrupted: usize,
) -> SegmentedIndicesFeed {
    let mut others: Vec<i64> = (0..num_candidates as i64)
        .filter(|&i| i != label as i64)
        .collect();
    others.shuffle(rng);
    others.truncate(num_corrupted);
    others.sort_unstable();
    let sample_ids = vec![0; others.len()];
    SegmentedIndicesFeed {
        indices: others,
        sample_ids,
    }
}
