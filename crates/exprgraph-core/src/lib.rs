pub mod abort;
pub mod edge;
pub mod graph;
pub mod id;
pub mod node;
pub mod symbol;
pub mod token;

// Re-export commonly used types
pub use abort::{AbortToken, Aborted};
pub use edge::{Edge, EdgeKind, EdgeSet};
pub use graph::{Graph, Node};
pub use id::{AstId, NodeId, VarId};
pub use node::{Attributes, NodeData, NodeKind, ParentField};
pub use symbol::{GlobalValue, Symbol, INSTANCE_TAIL, RETURN_VALUE_TAIL};
pub use token::TokenKind;
