//! Control-flow graph construction.
//!
//! Partitions a method's instruction list into basic blocks and links them with
//! successor and predecessor edges. An instruction starts a block if it is the first
//! instruction, a jump target, or follows an instruction that ends a block (branch,
//! return, trap, non-returning call). Alternatively a partition produced by an external
//! graph builder can be supplied; only its edges are computed here.
//!
//! # Edge Rules
//!
//! | Terminator | Kind | Successors |
//! |------------|------|------------|
//! | conditional jump | [`BlockKind::If`] | taken target, then fallthrough |
//! | unconditional jump | [`BlockKind::Jump`] | target |
//! | return, trap, indexed jump, non-returning call | [`BlockKind::Interrupt`] | none |
//! | anything else | [`BlockKind::Continue`] | fallthrough |
//!
//! A fallthrough past the last instruction (a call at the end of a method) is dropped.
//! A jump to an instruction index that does not exist is malformed input.

use std::{collections::HashMap, ops::Range};

use crate::{
    isil::{FlowControl, Instruction, Mnemonic},
    lifter::ir::{Block, BlockGraph, BlockId, BlockKind},
    Error, Result,
};

/// Builds [`BlockGraph`]s from an instruction list.
pub struct CfgBuilder<'a> {
    instructions: &'a [Instruction],
    positions: HashMap<usize, usize>,
}

impl<'a> CfgBuilder<'a> {
    /// Creates a builder over a method's instructions.
    #[must_use]
    pub fn new(instructions: &'a [Instruction]) -> Self {
        let positions = instructions
            .iter()
            .enumerate()
            .map(|(position, insn)| (insn.index, position))
            .collect();
        CfgBuilder {
            instructions,
            positions,
        }
    }

    /// Partitions the instructions into basic blocks and links them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Empty`] for an empty instruction list and [`Error::Malformed`]
    /// when a branch targets an instruction index that does not exist.
    pub fn build(&self) -> Result<BlockGraph> {
        let partition = self.partition()?;
        self.build_from_partition(&partition)
    }

    /// Links blocks from an existing partition of the instruction positions.
    ///
    /// The ranges must be non-empty, contiguous, in order and cover every instruction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Empty`] for an empty instruction list and [`Error::Malformed`]
    /// for an invalid partition or a branch whose target does not start a block.
    pub fn build_from_partition(&self, partition: &[Range<usize>]) -> Result<BlockGraph> {
        if self.instructions.is_empty() {
            return Err(Error::Empty);
        }
        self.validate_partition(partition)?;

        let mut graph = BlockGraph::new();
        let mut block_at_position = HashMap::with_capacity(partition.len());
        for range in partition {
            let last = &self.instructions[range.end - 1];
            let kind = block_kind(last);
            let start = self.instructions[range.start].index;
            let id = graph.push(Block::new(0, kind, start, range.clone()));
            block_at_position.insert(range.start, id);
        }

        for (id, range) in partition.iter().enumerate() {
            let last = &self.instructions[range.end - 1];
            let next_block = block_at_position.get(&range.end).copied();

            let successors: Vec<BlockId> = match block_kind(last) {
                BlockKind::If => {
                    let taken = self.target_block(last, &block_at_position)?;
                    std::iter::once(taken).chain(next_block).collect()
                }
                BlockKind::Jump => vec![self.target_block(last, &block_at_position)?],
                BlockKind::Continue => next_block.into_iter().collect(),
                BlockKind::Interrupt => Vec::new(),
            };

            for succ in successors {
                graph.add_edge(id, succ)?;
            }
        }

        Ok(graph)
    }

    fn partition(&self) -> Result<Vec<Range<usize>>> {
        if self.instructions.is_empty() {
            return Err(Error::Empty);
        }

        let count = self.instructions.len();
        let mut leader = vec![false; count];
        leader[0] = true;

        for (position, insn) in self.instructions.iter().enumerate() {
            if matches!(
                insn.flow,
                FlowControl::ConditionalJump | FlowControl::UnconditionalJump
            ) {
                let target = self.target_position(insn)?;
                leader[target] = true;
            }
            if insn.ends_block() && position + 1 < count {
                leader[position + 1] = true;
            }
        }

        let starts: Vec<usize> = (0..count).filter(|&p| leader[p]).collect();
        Ok(starts
            .iter()
            .enumerate()
            .map(|(i, &start)| start..starts.get(i + 1).copied().unwrap_or(count))
            .collect())
    }

    fn validate_partition(&self, partition: &[Range<usize>]) -> Result<()> {
        let mut expected = 0;
        for range in partition {
            if range.start != expected || range.end <= range.start {
                return Err(malformed_error!(
                    "Block partition is not contiguous at position {} ({:?})",
                    expected,
                    range
                ));
            }
            expected = range.end;
        }

        if expected != self.instructions.len() {
            return Err(malformed_error!(
                "Block partition covers {} of {} instructions",
                expected,
                self.instructions.len()
            ));
        }
        Ok(())
    }

    fn target_position(&self, insn: &Instruction) -> Result<usize> {
        let target = insn
            .jump_target()
            .ok_or_else(|| malformed_error!("Branch at {} has no target", insn.index))?;
        self.positions.get(&target).copied().ok_or_else(|| {
            malformed_error!(
                "Branch at {} targets missing instruction {}",
                insn.index,
                target
            )
        })
    }

    fn target_block(
        &self,
        insn: &Instruction,
        block_at_position: &HashMap<usize, BlockId>,
    ) -> Result<BlockId> {
        let position = self.target_position(insn)?;
        block_at_position.get(&position).copied().ok_or_else(|| {
            malformed_error!(
                "Branch at {} targets instruction {} inside a block",
                insn.index,
                self.instructions[position].index
            )
        })
    }
}

/// Derives a block's kind from its terminating instruction.
fn block_kind(last: &Instruction) -> BlockKind {
    if last.mnemonic == Mnemonic::CallNoReturn {
        return BlockKind::Interrupt;
    }

    match last.flow {
        FlowControl::ConditionalJump => BlockKind::If,
        FlowControl::UnconditionalJump => BlockKind::Jump,
        FlowControl::MethodReturn | FlowControl::Interrupt | FlowControl::IndexedJump => {
            BlockKind::Interrupt
        }
        FlowControl::Continue | FlowControl::MethodCall => BlockKind::Continue,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isil::Operand;

    fn insn(index: usize, mnemonic: Mnemonic, operands: Vec<Operand>) -> Instruction {
        Instruction::new(index, mnemonic, operands)
    }

    #[test]
    fn test_straight_line_is_one_block() {
        let code = vec![
            insn(0, Mnemonic::Move, vec![Operand::reg("eax"), Operand::imm(5)]),
            insn(1, Mnemonic::Call, vec![Operand::imm(0x1000)]),
            insn(2, Mnemonic::Return, vec![Operand::reg("eax")]),
        ];
        let graph = CfgBuilder::new(&code).build().unwrap();

        assert_eq!(graph.len(), 1);
        let block = graph.block(0).unwrap();
        assert_eq!(block.instructions, 0..3);
        assert_eq!(block.kind, BlockKind::Interrupt);
        assert!(block.successors.is_empty());
    }

    #[test]
    fn test_conditional_branch_edges() {
        // 0: cmp; 1: je 4; 2: mov; 3: goto 5; 4: mov; 5: ret
        let code = vec![
            insn(0, Mnemonic::Compare, vec![Operand::reg("ecx"), Operand::imm(0)]),
            insn(1, Mnemonic::JumpIfEqual, vec![Operand::target(4)]),
            insn(2, Mnemonic::Move, vec![Operand::reg("eax"), Operand::imm(1)]),
            insn(3, Mnemonic::Goto, vec![Operand::target(5)]),
            insn(4, Mnemonic::Move, vec![Operand::reg("eax"), Operand::imm(2)]),
            insn(5, Mnemonic::Return, vec![Operand::reg("eax")]),
        ];
        let graph = CfgBuilder::new(&code).build().unwrap();

        assert_eq!(graph.len(), 4);
        let entry = graph.block(0).unwrap();
        assert_eq!(entry.kind, BlockKind::If);
        assert_eq!(entry.successors, vec![2, 1]);

        let then_block = graph.block(1).unwrap();
        assert_eq!(then_block.kind, BlockKind::Jump);
        assert_eq!(then_block.successors, vec![3]);

        let else_block = graph.block(2).unwrap();
        assert_eq!(else_block.kind, BlockKind::Continue);
        assert_eq!(else_block.successors, vec![3]);

        assert_eq!(graph.block(3).unwrap().predecessors, vec![1, 2]);
        assert_eq!(graph.instruction_count(), code.len());
    }

    #[test]
    fn test_fallthrough_past_end_is_dropped() {
        let code = vec![
            insn(0, Mnemonic::Compare, vec![Operand::reg("ecx"), Operand::imm(0)]),
            insn(1, Mnemonic::JumpIfEqual, vec![Operand::target(0)]),
        ];
        let graph = CfgBuilder::new(&code).build().unwrap();

        assert_eq!(graph.len(), 1);
        assert_eq!(graph.block(0).unwrap().successors, vec![0]);
        assert_eq!(graph.block(0).unwrap().predecessors, vec![0]);
    }

    #[test]
    fn test_no_return_call_ends_block() {
        let code = vec![
            insn(0, Mnemonic::CallNoReturn, vec![Operand::imm(0x1000)]),
            insn(1, Mnemonic::Return, vec![]),
        ];
        let graph = CfgBuilder::new(&code).build().unwrap();

        assert_eq!(graph.len(), 2);
        assert_eq!(graph.block(0).unwrap().kind, BlockKind::Interrupt);
        assert!(graph.block(0).unwrap().successors.is_empty());
        assert!(graph.block(1).unwrap().predecessors.is_empty());
    }

    #[test]
    fn test_missing_target_is_malformed() {
        let code = vec![insn(0, Mnemonic::Goto, vec![Operand::target(42)])];
        let err = CfgBuilder::new(&code).build().unwrap_err();
        assert!(matches!(err, Error::Malformed { .. }));
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(CfgBuilder::new(&[]).build().unwrap_err(), Error::Empty);
    }

    #[test]
    fn test_external_partition() {
        let code = vec![
            insn(0, Mnemonic::Move, vec![Operand::reg("eax"), Operand::imm(1)]),
            insn(1, Mnemonic::Move, vec![Operand::reg("ecx"), Operand::imm(2)]),
            insn(2, Mnemonic::Return, vec![]),
        ];
        let builder = CfgBuilder::new(&code);

        let graph = builder.build_from_partition(&[0..1, 1..3]).unwrap();
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.block(0).unwrap().kind, BlockKind::Continue);
        assert_eq!(graph.block(0).unwrap().successors, vec![1]);
        assert_eq!(graph.block(1).unwrap().start, 1);

        assert!(builder.build_from_partition(&[0..1, 2..3]).is_err());
        assert!(builder.build_from_partition(&[0..2]).is_err());
    }
}
