//! Tasks driving the expansion.
//!
//! Each search branch carries a stack of tasks. The top task says what
//! happens on the next round: run the name model, run the production
//! model, propagate embeddings through freshly added structure, or make
//! a transition the grammar has already decided. Completing a task hands
//! control back to the decoder, which rewrites the stack for the next
//! round.

use exprgraph_core::{NodeId, Symbol};

/// Where the grammar is. This doubles as the label the search tree
/// reports for the step a branch took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecoderStep {
    Stop,
    Expr,
    ExprDone,
    ChooseExprType,
    ChooseTerminalType,
    Attr,
    AttrDone,
    Call,
    CallDone,
    ArgDone,
    Keyword,
    KeywordDone,
    Positional,
    ChooseArgType,
    InferKeywordArgName,
    InferAttr,
    InferName,
    NameDone,
    Placeholder,
    NoPlaceholder,
    GenericNoPlaceholder,
    Propagate,
}

impl DecoderStep {
    pub fn name(self) -> &'static str {
        match self {
            DecoderStep::Stop => "stop",
            DecoderStep::Expr => "expr",
            DecoderStep::ExprDone => "expr_done",
            DecoderStep::ChooseExprType => "choose_expr_type",
            DecoderStep::ChooseTerminalType => "choose_terminal_type",
            DecoderStep::Attr => "attr",
            DecoderStep::AttrDone => "attr_done",
            DecoderStep::Call => "call",
            DecoderStep::CallDone => "call_done",
            DecoderStep::ArgDone => "arg_done",
            DecoderStep::Keyword => "keyword",
            DecoderStep::KeywordDone => "keyword_done",
            DecoderStep::Positional => "positional",
            DecoderStep::ChooseArgType => "choose_arg_type",
            DecoderStep::InferKeywordArgName => "infer_keyword_arg_name",
            DecoderStep::InferAttr => "infer_attr",
            DecoderStep::InferName => "infer_name",
            DecoderStep::NameDone => "name_done",
            DecoderStep::Placeholder => "placeholder",
            DecoderStep::NoPlaceholder => "no_placeholder",
            DecoderStep::GenericNoPlaceholder => "generic_no_placeholder",
            DecoderStep::Propagate => "propagate",
        }
    }
}

/// What has to happen to finish a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Score a fixed target list with the production model.
    InferProduction,
    /// Score the variables in scope with the name model.
    InferName,
    /// No model involved, the grammar already decided.
    NoInfer,
    /// Refresh embeddings of freshly added nodes.
    Propagate,
}

/// Client payload attached to one production target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProdChoice {
    Step(DecoderStep),
    Attr(Symbol),
    Keyword(String),
}

impl ProdChoice {
    pub fn step(&self) -> Option<DecoderStep> {
        match self {
            ProdChoice::Step(step) => Some(*step),
            _ => None,
        }
    }
}

/// One entry on a branch's stack.
#[derive(Debug, Clone, PartialEq)]
pub struct EgTask {
    pub kind: TaskKind,
    /// Grammar position to resume from when the task completes.
    pub client: DecoderStep,
    /// Node the prediction lands on.
    pub site: NodeId,
    /// Production ids scored against each other (infer production only).
    pub targets: Vec<i64>,
    /// Client payloads parallel to `targets`.
    pub choices: Vec<ProdChoice>,
    /// Index into `targets`/`choices` once the model has chosen, or the
    /// chosen variable index for an infer name task.
    pub chosen: Option<usize>,
    pub completed: bool,
    /// Extra nodes the task needs in its model subgraph.
    pub client_nodes: Vec<NodeId>,
}

impl EgTask {
    /// A transition task with nothing to infer.
    pub fn no_infer(client: DecoderStep, site: NodeId) -> Self {
        EgTask {
            kind: TaskKind::NoInfer,
            client,
            site,
            targets: Vec::new(),
            choices: Vec::new(),
            chosen: None,
            completed: false,
            client_nodes: Vec::new(),
        }
    }

    /// An embedding-refresh task over `nodes`, which must be non-empty.
    pub fn propagate(nodes: Vec<NodeId>) -> Self {
        debug_assert!(!nodes.is_empty(), "propagation needs at least one node");
        EgTask {
            kind: TaskKind::Propagate,
            client: DecoderStep::Propagate,
            // propagation has no site; reuse the first refreshed node
            site: nodes[0],
            targets: Vec::new(),
            choices: Vec::new(),
            chosen: None,
            completed: false,
            client_nodes: nodes,
        }
    }

    pub fn infer_name(site: NodeId) -> Self {
        EgTask {
            kind: TaskKind::InferName,
            client: DecoderStep::InferName,
            site,
            targets: Vec::new(),
            choices: Vec::new(),
            chosen: None,
            completed: false,
            client_nodes: Vec::new(),
        }
    }

    pub fn infer_production(
        client: DecoderStep,
        site: NodeId,
        targets: Vec<i64>,
        choices: Vec<ProdChoice>,
        client_nodes: Vec<NodeId>,
    ) -> Self {
        debug_assert_eq!(targets.len(), choices.len());
        // a single target needs no model pass
        let kind = if targets.len() == 1 {
            TaskKind::NoInfer
        } else {
            TaskKind::InferProduction
        };
        EgTask {
            kind,
            client,
            site,
            targets,
            choices,
            chosen: None,
            completed: false,
            client_nodes,
        }
    }

    /// The payload of the chosen target, when one has been chosen.
    pub fn chosen_choice(&self) -> Option<&ProdChoice> {
        self.choices.get(self.chosen?)
    }
}

/// A branch's stack of pending tasks. The top is the last element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EgTaskStack(Vec<EgTask>);

impl EgTaskStack {
    pub fn new() -> Self {
        EgTaskStack::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn push(&mut self, task: EgTask) {
        self.0.push(task);
    }

    pub fn pop(&mut self) -> Option<EgTask> {
        self.0.pop()
    }

    pub fn peek(&self) -> Option<&EgTask> {
        self.0.last()
    }
}
