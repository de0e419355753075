//! The encoded neighborhood of a prediction site.
//!
//! A context graph is the pruned relation graph around a site together
//! with the per-node states the encoder computed for it. Expansion keeps
//! reading those states while it grows new structure next to the site,
//! so the context graph also precomputes forward-edge adjacency and the
//! visible variables with their occurrence nodes.

use tracing::debug;

use exprgraph_analysis::walk::{walk, NodeRef};
use exprgraph_analysis::{Analysis, Span};
use exprgraph_core::{AbortToken, AstId, EdgeSet, Graph, NodeId, VarId};
use exprgraph_model::{fetch, GraphFeed, ModelError, ModelMeta, ScoringModel};

use crate::builder::GraphBuilder;
use crate::error::BuildError;

/// Feed-dict prefix for the context-graph encoder.
pub const CONTEXT_GRAPH_FEED_PREFIX: &str = "context_graph";

/// Fetch op producing one state row per context-graph node.
pub const CONTEXT_GRAPH_NODE_STATES_OP: &str = "context_graph/graph/node_states";

#[derive(Debug, Clone)]
pub struct ContextGraphConfig {
    pub edge_set: EdgeSet,
    /// Neighbor steps kept around the site when pruning.
    pub max_hops: usize,
}

impl Default for ContextGraphConfig {
    fn default() -> Self {
        ContextGraphConfig {
            edge_set: EdgeSet::all(),
            max_hops: 3,
        }
    }
}

/// One variable visible at the site.
#[derive(Debug, Clone)]
pub struct ContextVariable {
    pub var: VarId,
    /// Occurrence nodes in source order, paired with their spans.
    pub refs: Vec<(NodeId, Span)>,
    /// Last occurrence ending before the site.
    pub latest: NodeId,
}

/// The pruned, encoded graph around a prediction site.
#[derive(Debug, Clone)]
pub struct ContextGraph {
    pub graph: Graph,
    pub site: NodeId,
    /// One embedding row per node, from the encoder.
    pub node_states: Vec<Vec<f32>>,
    /// Sources of forward edges into each node.
    pub incoming: Vec<Vec<NodeId>>,
    /// Destinations of forward edges out of each node.
    pub outgoing: Vec<Vec<NodeId>>,
    pub variables: Vec<ContextVariable>,
    pub scope_nodes: Vec<NodeId>,
    pub context_tokens: Vec<String>,
}

impl ContextGraph {
    /// Builds, prunes, and encodes the neighborhood of `site_ast`.
    pub fn build(
        analysis: &Analysis,
        site_ast: AstId,
        config: &ContextGraphConfig,
        meta: &ModelMeta,
        model: &dyn ScoringModel,
        abort: &AbortToken,
    ) -> Result<ContextGraph, BuildError> {
        let mut builder = GraphBuilder::new(analysis, true);
        builder.build_edges(&config.edge_set);
        abort.check()?;

        let site = builder.site_node(site_ast)?;
        let site_span = builder
            .name_span(site_ast)
            .or_else(|| ast_span(analysis, site_ast))
            .ok_or(BuildError::SiteNotFound { ast: site_ast })?;

        let scope = builder.scope_at(site_span, true);
        if scope.is_empty() {
            return Err(BuildError::EmptyScope {
                found: 0,
                needed: 1,
            });
        }

        let context_tokens = builder.context_tokens(site);
        let scope_nodes = builder.add_scope_nodes(&scope);
        let var_refs: Vec<(VarId, Vec<(NodeId, Span)>)> = scope
            .iter()
            .map(|&v| (v, builder.ref_nodes(v)))
            .collect();

        let mut graph = builder.finish();
        let mut seeds = vec![site];
        seeds.extend(&scope_nodes);
        for (_, refs) in &var_refs {
            seeds.extend(refs.iter().map(|(node, _)| *node));
        }
        let remap = graph.prune(&seeds, config.max_hops);
        abort.check()?;

        // Seeds always survive pruning.
        let site = remap[site.index()].unwrap();
        let scope_nodes: Vec<NodeId> = scope_nodes
            .iter()
            .map(|n| remap[n.index()].unwrap())
            .collect();
        let variables: Vec<ContextVariable> = var_refs
            .into_iter()
            .filter_map(|(var, refs)| {
                let refs: Vec<(NodeId, Span)> = refs
                    .into_iter()
                    .map(|(node, span)| (remap[node.index()].unwrap(), span))
                    .collect();
                let latest = refs
                    .iter()
                    .filter(|(_, span)| span.end <= site_span.begin)
                    .map(|(node, _)| *node)
                    .last();
                match latest {
                    Some(latest) => Some(ContextVariable { var, refs, latest }),
                    None => {
                        debug!(?var, "no occurrence before the site, dropping");
                        None
                    }
                }
            })
            .collect();

        let feed = GraphFeed::from_graph(meta, &graph);
        feed.validate()?;
        let fd = feed.feed_dict(CONTEXT_GRAPH_FEED_PREFIX);
        let results = model.run(&fd, &[CONTEXT_GRAPH_NODE_STATES_OP])?;
        let node_states = fetch(&results, CONTEXT_GRAPH_NODE_STATES_OP)?
            .as_float_matrix()?
            .to_vec();
        if node_states.len() != graph.node_count() {
            return Err(ModelError::Invocation {
                message: format!(
                    "model returned {} state rows for {} nodes",
                    node_states.len(),
                    graph.node_count()
                ),
            }
            .into());
        }

        let (incoming, outgoing) = forward_adjacency(&graph);
        debug!(
            nodes = graph.node_count(),
            variables = variables.len(),
            tokens = context_tokens.len(),
            "context graph encoded"
        );
        Ok(ContextGraph {
            graph,
            site,
            node_states,
            incoming,
            outgoing,
            variables,
            scope_nodes,
            context_tokens,
        })
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }
}

/// Span of an arbitrary syntax node. Non-name sites (calls, attributes)
/// have no recorded name span, so their span comes from the tree.
fn ast_span(analysis: &Analysis, ast: AstId) -> Option<Span> {
    let mut found = None;
    walk(NodeRef::Module(&analysis.module), &mut |node| {
        if node.id() == ast {
            found = Some(node.span());
            return false;
        }
        true
    });
    found
}

/// Per-node forward-edge sources and destinations.
fn forward_adjacency(graph: &Graph) -> (Vec<Vec<NodeId>>, Vec<Vec<NodeId>>) {
    let mut incoming = vec![Vec::new(); graph.node_count()];
    let mut outgoing = vec![Vec::new(); graph.node_count()];
    for edge in graph.edges() {
        if edge.forward {
            outgoing[edge.from.index()].push(edge.to);
            incoming[edge.to.index()].push(edge.from);
        }
    }
    (incoming, outgoing)
}
