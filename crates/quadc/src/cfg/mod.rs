//! Control-flow-graph construction
//!
//! Converts the flat quadruple stream of one function into an ordered
//! chain of basic blocks, resolves forward branch-target aliases, and
//! computes predecessor/successor edges.

mod backpatch;
mod block;
mod builder;

pub use backpatch::backpatch;
pub use block::{BasicBlock, BlockId, FlowGraph};
pub use builder::{FuncRead, compute_edges, read_function};
