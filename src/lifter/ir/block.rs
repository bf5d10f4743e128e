//! Basic blocks and the block graph arena.
//!
//! Blocks live in a [`BlockGraph`] and are addressed by their position in it. Edges are
//! index lists in both directions, so the graph has no ownership cycles and per-block
//! state can be cloned freely while walking it.

use std::{fmt, ops::Range};

use crate::{
    lifter::ir::{Expr, IfBody},
    Result,
};

/// Position of a block in its [`BlockGraph`].
pub type BlockId = usize;

/// Control flow shape of a block, derived from its terminating instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    /// Falls through to the next block
    Continue,
    /// Ends with an unconditional jump
    Jump,
    /// Ends with a conditional jump; successors are `[taken, fallthrough]`
    If,
    /// Ends the method: return, trap, non-returning call or indexed jump
    Interrupt,
}

/// Structuring state of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StructureState {
    /// Not yet examined
    Unvisited,
    /// Target of a two-way branch, under consideration for absorption
    Candidate,
    /// Moved into the body of its owner's conditional
    Absorbed,
    /// Kept in the top-level block list
    Retained,
}

/// One IR statement and its bookkeeping flags.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// Statement expression
    pub expr: Expr,
    /// Set by the inliner; eliminated statements are skipped by later passes and emission
    pub eliminated: bool,
    /// Index of the instruction the statement was lifted from
    pub source: Option<usize>,
}

impl Statement {
    /// Creates a live statement lifted from instruction `source`.
    #[must_use]
    pub fn new(expr: Expr, source: Option<usize>) -> Self {
        Statement {
            expr,
            eliminated: false,
            source,
        }
    }
}

/// A basic block of lifted statements.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    /// Position in the owning graph
    pub id: BlockId,
    /// Control flow shape
    pub kind: BlockKind,
    /// Index of the first instruction, used for labels
    pub start: usize,
    /// Positions of the block's instructions in the method's instruction list
    pub instructions: Range<usize>,
    /// Lifted statements in order
    pub statements: Vec<Statement>,
    /// Successor blocks; for [`BlockKind::If`] the taken target comes first
    pub successors: Vec<BlockId>,
    /// Distinct predecessor blocks
    pub predecessors: Vec<BlockId>,
    /// Synthetic empty block that emission skips
    pub ignore: bool,
    /// Number of jumps naming this block; a label is emitted when non-zero
    pub references: usize,
    /// Structuring state
    pub state: StructureState,
}

impl Block {
    /// Creates a block with no statements and no edges.
    #[must_use]
    pub fn new(id: BlockId, kind: BlockKind, start: usize, instructions: Range<usize>) -> Self {
        Block {
            id,
            kind,
            start,
            instructions,
            statements: Vec::new(),
            successors: Vec::new(),
            predecessors: Vec::new(),
            ignore: false,
            references: 0,
            state: StructureState::Unvisited,
        }
    }

    /// Returns the live statements.
    pub fn live_statements(&self) -> impl Iterator<Item = &Statement> {
        self.statements.iter().filter(|s| !s.eliminated)
    }

    /// Returns the taken target of a two-way branch.
    #[must_use]
    pub fn taken(&self) -> Option<BlockId> {
        if self.kind != BlockKind::If {
            return None;
        }
        self.successors.first().copied()
    }

    /// Returns the fallthrough alternative of a two-way branch.
    #[must_use]
    pub fn fallthrough(&self) -> Option<BlockId> {
        if self.kind != BlockKind::If {
            return None;
        }
        self.successors.get(1).copied()
    }

    /// Returns the terminating conditional of an [`BlockKind::If`] block.
    pub fn branch_mut(&mut self) -> Option<&mut Expr> {
        self.statements
            .iter_mut()
            .rev()
            .find(|s| !s.eliminated)
            .map(|s| &mut s.expr)
            .filter(|expr| matches!(expr, Expr::If { body: IfBody::Goto(_), .. }))
    }

    /// Returns `true` if the last live statement never passes control to the next block.
    #[must_use]
    pub fn ends_in_jump(&self) -> bool {
        matches!(
            self.live_statements().last().map(|s| &s.expr),
            Some(Expr::Goto(_) | Expr::Return(_))
        )
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}@{}:", self.id, self.start)
    }
}

/// Arena of blocks addressed by [`BlockId`]. Block 0 is the entry block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockGraph {
    blocks: Vec<Block>,
}

impl BlockGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        BlockGraph { blocks: Vec::new() }
    }

    /// Appends a block, assigning it the next id.
    pub fn push(&mut self, mut block: Block) -> BlockId {
        let id = self.blocks.len();
        block.id = id;
        self.blocks.push(block);
        id
    }

    /// Number of blocks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Returns `true` if the graph has no blocks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Returns a block by id.
    #[must_use]
    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id)
    }

    /// Returns a block by id for mutation.
    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut Block> {
        self.blocks.get_mut(id)
    }

    /// Returns all blocks in id order.
    #[must_use]
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Returns all blocks in id order for mutation.
    pub fn blocks_mut(&mut self) -> &mut [Block] {
        &mut self.blocks
    }

    /// Consumes the graph, returning its blocks.
    #[must_use]
    pub fn into_blocks(self) -> Vec<Block> {
        self.blocks
    }

    /// Returns the id of the block starting at instruction index `start`.
    #[must_use]
    pub fn block_starting_at(&self, start: usize) -> Option<BlockId> {
        self.blocks.iter().position(|b| b.start == start)
    }

    /// Adds an edge `from -> to`. Duplicate edges are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::GraphError`] if either block does not exist.
    pub fn add_edge(&mut self, from: BlockId, to: BlockId) -> Result<()> {
        if from >= self.blocks.len() || to >= self.blocks.len() {
            return Err(crate::Error::GraphError(format!(
                "edge B{from} -> B{to} references a missing block"
            )));
        }

        let source = &mut self.blocks[from];
        if !source.successors.contains(&to) {
            source.successors.push(to);
        }
        let target = &mut self.blocks[to];
        if !target.predecessors.contains(&from) {
            target.predecessors.push(from);
        }
        Ok(())
    }

    /// Returns the blocks reachable from the entry block, in depth-first preorder
    /// following successor order.
    #[must_use]
    pub fn reachable(&self) -> Vec<BlockId> {
        let mut order = Vec::with_capacity(self.blocks.len());
        let mut visited = vec![false; self.blocks.len()];
        let mut stack = Vec::new();
        if !self.blocks.is_empty() {
            stack.push(0);
        }

        while let Some(id) = stack.pop() {
            if visited[id] {
                continue;
            }
            visited[id] = true;
            order.push(id);
            for &succ in self.blocks[id].successors.iter().rev() {
                if !visited[succ] {
                    stack.push(succ);
                }
            }
        }

        order
    }

    /// Total number of instructions covered by all blocks.
    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.blocks.iter().map(|b| b.instructions.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> BlockGraph {
        let mut graph = BlockGraph::new();
        graph.push(Block::new(0, BlockKind::If, 0, 0..2));
        graph.push(Block::new(0, BlockKind::Jump, 2, 2..4));
        graph.push(Block::new(0, BlockKind::Continue, 4, 4..5));
        graph.push(Block::new(0, BlockKind::Interrupt, 5, 5..6));
        graph.add_edge(0, 2).unwrap();
        graph.add_edge(0, 1).unwrap();
        graph.add_edge(1, 3).unwrap();
        graph.add_edge(2, 3).unwrap();
        graph
    }

    #[test]
    fn test_edges_are_deduplicated() {
        let mut graph = diamond();
        graph.add_edge(0, 2).unwrap();
        assert_eq!(graph.block(0).unwrap().successors, vec![2, 1]);
        assert_eq!(graph.block(3).unwrap().predecessors, vec![1, 2]);
        assert!(graph.add_edge(0, 9).is_err());
    }

    #[test]
    fn test_taken_and_fallthrough() {
        let graph = diamond();
        let entry = graph.block(0).unwrap();
        assert_eq!(entry.taken(), Some(2));
        assert_eq!(entry.fallthrough(), Some(1));
        assert_eq!(graph.block(1).unwrap().taken(), None);
    }

    #[test]
    fn test_reachable_preorder() {
        let mut graph = diamond();
        graph.push(Block::new(0, BlockKind::Interrupt, 6, 6..7));
        assert_eq!(graph.reachable(), vec![0, 2, 3, 1]);
        assert_eq!(graph.instruction_count(), 7);
        assert_eq!(graph.block_starting_at(4), Some(2));
    }
}
