//! Basic block and flow-graph types
//!
//! Blocks live in an arena addressed by stable ids; the up/down links
//! form the program-order chain, while predecessor/successor edge sets
//! may contain cycles and are kept mutually consistent.

use crate::frontend::Quad;
use crate::ir;

/// Handle of a basic block within one function's graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub u32);

/// A basic block: an ordered quadruple sequence with a single entry
/// and, once edges are computed, a fixed set of exits.
#[derive(Debug)]
pub struct BasicBlock {
    pub label: Option<String>,
    /// Ordinal in program order.
    pub num: u32,
    pub quads: Vec<Quad>,
    pub preds: Vec<BlockId>,
    pub succs: Vec<BlockId>,
    pub up: Option<BlockId>,
    pub down: Option<BlockId>,
    /// Lazily created IR-side block.
    pub ir_block: Option<ir::BlockRef>,
}

impl BasicBlock {
    fn new(num: u32, label: Option<String>) -> Self {
        Self {
            label,
            num,
            quads: Vec::new(),
            preds: Vec::new(),
            succs: Vec::new(),
            up: None,
            down: None,
            ir_block: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.quads.is_empty()
    }
}

/// The block chain of one function.
#[derive(Debug)]
pub struct FlowGraph {
    blocks: Vec<BasicBlock>,
    pub entry: BlockId,
    pub tail: BlockId,
}

impl FlowGraph {
    /// A graph with a single empty, unlabeled block.
    pub fn new() -> Self {
        Self {
            blocks: vec![BasicBlock::new(0, None)],
            entry: BlockId(0),
            tail: BlockId(0),
        }
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.0 as usize]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.0 as usize]
    }

    /// Append a quadruple to the tail block.
    pub fn push(&mut self, quad: Quad) {
        let tail = self.tail;
        self.block_mut(tail).quads.push(quad);
    }

    /// Start a new block after the tail and make it the tail.
    pub fn split(&mut self, label: Option<String>) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BasicBlock::new(id.0, label));

        let old_tail = self.tail;
        self.block_mut(old_tail).down = Some(id);
        self.block_mut(id).up = Some(old_tail);
        self.tail = id;
        id
    }

    pub fn set_label(&mut self, id: BlockId, label: String) {
        self.block_mut(id).label = Some(label);
    }

    /// Find the block carrying `label`, in program order.
    pub fn find_target(&self, label: &str) -> Option<BlockId> {
        self.order()
            .into_iter()
            .find(|&id| self.block(id).label.as_deref() == Some(label))
    }

    /// Record a control-flow edge, keeping the predecessor and
    /// successor sets mutually consistent. Duplicate edges are ignored.
    pub fn add_edge(&mut self, from: BlockId, to: BlockId) {
        let succs = &mut self.block_mut(from).succs;
        if !succs.contains(&to) {
            succs.push(to);
        }
        let preds = &mut self.block_mut(to).preds;
        if !preds.contains(&from) {
            preds.push(from);
        }
    }

    /// Block ids in program order, following the down links.
    pub fn order(&self) -> Vec<BlockId> {
        let mut ids = Vec::with_capacity(self.blocks.len());
        let mut cur = Some(self.entry);
        while let Some(id) = cur {
            ids.push(id);
            cur = self.block(id).down;
        }
        ids
    }
}

impl Default for FlowGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for FlowGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for id in self.order() {
            let blk = self.block(id);
            if let Some(label) = &blk.label {
                writeln!(f, "${label}:")?;
            }
            for quad in &blk.quads {
                writeln!(f, "\t{}\t;{}", quad.kind, quad.kind.tag())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Span;
    use crate::frontend::{Quad, QuadKind};

    fn jump(target: &str) -> Quad {
        Quad::new(
            QuadKind::Jump {
                target: target.into(),
            },
            Span::default(),
        )
    }

    #[test]
    fn test_split_links_program_order() {
        let mut graph = FlowGraph::new();
        let entry = graph.entry;
        graph.push(jump("L1"));
        let next = graph.split(Some("L1".into()));

        assert_eq!(graph.block(entry).down, Some(next));
        assert_eq!(graph.block(next).up, Some(entry));
        assert_eq!(graph.order(), vec![entry, next]);
        assert_eq!(graph.tail, next);
    }

    #[test]
    fn test_find_target() {
        let mut graph = FlowGraph::new();
        graph.split(Some("L1".into()));
        let l2 = graph.split(Some("L2".into()));
        assert_eq!(graph.find_target("L2"), Some(l2));
        assert_eq!(graph.find_target("L9"), None);
    }

    #[test]
    fn test_add_edge_dedups_and_stays_symmetric() {
        let mut graph = FlowGraph::new();
        let a = graph.entry;
        let b = graph.split(None);
        graph.add_edge(a, b);
        graph.add_edge(a, b);

        assert_eq!(graph.block(a).succs, vec![b]);
        assert_eq!(graph.block(b).preds, vec![a]);
    }
}
