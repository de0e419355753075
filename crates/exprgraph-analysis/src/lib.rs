pub mod analysis;
pub mod ast;
pub mod flow;
pub mod nameset;
pub mod scope;
pub mod vars;
pub mod walk;
pub mod word;

// Re-export commonly used types
pub use analysis::{Analysis, BindingId, Resolutions};
pub use ast::{Module, NameUsage, Span, Stmt};
pub use flow::{forward_flow, NameFlowGraph};
pub use nameset::NameSet;
pub use scope::ScopeTree;
pub use vars::{Variable, VariableManager};
pub use walk::{names_in, walk, walk_edges, NodeRef};
pub use word::Word;
