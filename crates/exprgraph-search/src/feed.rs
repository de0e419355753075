//! Subgraph feeds for expansion-time model passes.
//!
//! Each round re-encodes only the lookup nodes: the nodes whose
//! embeddings are stale because the decoder just grew or rewired them.
//! The rest of the subgraph rides along as fixed embedding rows. The
//! subgraph id space puts those context members first and the lookups
//! after them, matching how the batched training slices are laid out.

use indexmap::IndexSet;

use exprgraph_core::{Graph, NodeId};
use exprgraph_model::{
    fetch, ExpansionGraphBaseFeed, ExpansionGraphTestFeed, ModelError, ModelMeta, NodeFeed,
    ScoringModel,
};

use crate::error::SearchError;
use crate::state::ExpansionState;

/// Feed-dict prefix for expansion-time passes.
pub const EXPANSION_FEED_PREFIX: &str = "test/expansion_graph";

/// Fetch op producing one refreshed state row per subgraph node.
pub const EXPANSION_NODE_STATES_OP: &str = "test/expansion_graph/graph/node_states";

/// Feed-dict prefix and fetch op for the name model.
pub const INFER_NAME_FEED_PREFIX: &str = "test/infer_name";
pub const INFER_NAME_PRED_OP: &str = "test/infer_name/prediction/pred";

/// Feed-dict prefix and fetch op for the production model.
pub const INFER_PRODUCTION_FEED_PREFIX: &str = "test/infer_production";
pub const INFER_PRODUCTION_PRED_OP: &str = "test/infer_production/prediction/pred";

/// One round's subgraph: the lowered feed plus the id assignment used
/// to write refreshed embeddings back.
pub struct Subgraph {
    pub feed: ExpansionGraphTestFeed,
    /// Subgraph members in id order: context members, then lookups.
    pub order: IndexSet<NodeId>,
}

impl Subgraph {
    pub fn id_of(&self, node: NodeId) -> Option<i64> {
        self.order.get_index_of(&node).map(|i| i as i64)
    }

    /// Copies refreshed rows back onto the overlay lookup nodes.
    pub fn apply_states(
        &self,
        state: &mut ExpansionState,
        lookups: &[NodeId],
        rows: &[Vec<f32>],
    ) -> Result<(), SearchError> {
        if rows.len() < self.order.len() {
            return Err(ModelError::Invocation {
                message: format!(
                    "model returned {} state rows for {} subgraph nodes",
                    rows.len(),
                    self.order.len()
                ),
            }
            .into());
        }
        for &lookup in lookups {
            let id = self.id_of(lookup).expect("lookup outside its own subgraph");
            state.set_state(lookup, rows[id as usize].clone());
        }
        Ok(())
    }
}

/// Assembles the subgraph around `lookups`.
///
/// Lookups must be overlay nodes and must not be wired to each other by
/// a fed edge; either would mean the decoder lost track of what it has
/// already encoded, so both panic. `extra_context` nodes join the
/// subgraph as fixed rows even without an edge into a lookup.
pub fn build_subgraph(
    state: &ExpansionState,
    meta: &ModelMeta,
    lookups: &[NodeId],
    extra_context: &[NodeId],
) -> Subgraph {
    let lookup_set: IndexSet<NodeId> = lookups.iter().copied().collect();
    for &l in lookups {
        assert!(state.is_eg(l), "lookup {l} is a context node");
    }
    for edge in state.fed_edges() {
        assert!(
            !(lookup_set.contains(&edge.from) && lookup_set.contains(&edge.to)),
            "lookups {} and {} are neighbors",
            edge.from,
            edge.to
        );
    }

    let mut members: IndexSet<NodeId> = IndexSet::new();
    for &lookup in lookups {
        for (src, _) in state.incoming(lookup) {
            if !lookup_set.contains(&src) {
                members.insert(src);
            }
        }
    }
    for &extra in extra_context {
        if !lookup_set.contains(&extra) {
            members.insert(extra);
        }
    }

    let mut order = members.clone();
    for &lookup in lookups {
        order.insert(lookup);
    }

    let mut base = ExpansionGraphBaseFeed::default();
    for edge in state.fed_edges() {
        if !lookup_set.contains(&edge.to) {
            continue;
        }
        let (Some(from), Some(to)) = (
            order.get_index_of(&edge.from),
            order.get_index_of(&edge.to),
        ) else {
            continue;
        };
        base.edges
            .insert(format!("{}_forward", edge.kind.name()), from as i64, to as i64);
    }

    let mut embeddings = Vec::with_capacity(members.len());
    for &member in &members {
        base.context_to_expansion
            .push(order.get_index_of(&member).unwrap() as i64);
        embeddings.push(state.state_row(member).to_vec());
    }

    // feed lowering works over arena nodes, so stage the lookups in one
    let mut staging = Graph::new();
    for &lookup in lookups {
        staging.add_node(state.kind(lookup), state.attrs(lookup).clone());
        base.lookup_to_expansion
            .push(order.get_index_of(&lookup).unwrap() as i64);
    }
    base.lookup_nodes = NodeFeed::from_nodes(meta, staging.nodes().map(|(_, n)| n));

    Subgraph {
        feed: ExpansionGraphTestFeed {
            base,
            context_node_embeddings: embeddings,
        },
        order,
    }
}

/// One embedding-refresh pass over `lookups`.
pub fn propagate(
    state: &mut ExpansionState,
    meta: &ModelMeta,
    model: &dyn ScoringModel,
    lookups: &[NodeId],
    extra_context: &[NodeId],
) -> Result<(), SearchError> {
    let sub = build_subgraph(state, meta, lookups, extra_context);
    let fd = sub.feed.feed_dict(EXPANSION_FEED_PREFIX);
    let results = model.run(&fd, &[EXPANSION_NODE_STATES_OP])?;
    let rows = fetch(&results, EXPANSION_NODE_STATES_OP)?
        .as_float_matrix()?
        .to_vec();
    sub.apply_states(state, lookups, &rows)
}
