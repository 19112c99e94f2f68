//! Compiled program blocks.
//!
//! A program block is a straight-line run of language instructions between two
//! conditional branches, compiled by the interpreter that drives the hang
//! executor. Blocks live in a single arena and reference their successors by
//! index, so the naturally cyclic block graph needs no shared ownership.

/// The finalized body of a program block.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Body {
    Step {
        /// A delta step modifies `*dp`; a shift step modifies `dp`.
        is_delta: bool,
        amount: i32,
        num_steps: usize,
        zero_block: usize,
        non_zero_block: usize,
    },
    Exit {
        num_steps: usize,
    },
    /// A trivial hang found when the block was compiled.
    Hang,
}

/// A node in the compiled program. Identified by a stable index; never
/// reallocated while analyzers are running.
#[derive(Debug, Clone, Copy)]
pub struct ProgramBlock {
    start_index: usize,
    body: Option<Body>,
}

impl ProgramBlock {
    /// Index that uniquely specifies the starting position of the block,
    /// including the turn direction.
    pub fn start_index(&self) -> usize {
        self.start_index
    }

    pub fn is_finalized(&self) -> bool {
        self.body.is_some()
    }

    pub fn is_exit(&self) -> bool {
        matches!(self.body, Some(Body::Exit { .. }))
    }

    pub fn is_hang(&self) -> bool {
        matches!(self.body, Some(Body::Hang))
    }

    pub fn is_delta(&self) -> bool {
        matches!(self.body, Some(Body::Step { is_delta: true, .. }))
    }

    pub fn is_shift(&self) -> bool {
        matches!(self.body, Some(Body::Step { is_delta: false, .. }))
    }

    pub fn amount(&self) -> i32 {
        match self.body {
            Some(Body::Step { amount, .. }) => amount,
            _ => 0,
        }
    }

    /// The number of language-level instructions this block represents.
    pub fn num_steps(&self) -> usize {
        match self.body {
            Some(Body::Step { num_steps, .. }) | Some(Body::Exit { num_steps }) => num_steps,
            _ => 0,
        }
    }

    pub fn zero_block(&self) -> Option<usize> {
        match self.body {
            Some(Body::Step { zero_block, .. }) => Some(zero_block),
            _ => None,
        }
    }

    pub fn non_zero_block(&self) -> Option<usize> {
        match self.body {
            Some(Body::Step { non_zero_block, .. }) => Some(non_zero_block),
            _ => None,
        }
    }
}

/// Arena of program blocks. Block zero is the entry block.
#[derive(Debug, Clone, Default)]
pub struct InterpretedProgram {
    blocks: Vec<ProgramBlock>,
}

impl InterpretedProgram {
    /// Creates a program with `num_blocks` unfinalized blocks.
    pub fn new(num_blocks: usize) -> Self {
        InterpretedProgram {
            blocks: (0..num_blocks)
                .map(|i| ProgramBlock {
                    start_index: i,
                    body: None,
                })
                .collect(),
        }
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn block(&self, index: usize) -> &ProgramBlock {
        &self.blocks[index]
    }

    pub fn entry(&self) -> usize {
        0
    }

    pub fn finalize(
        &mut self,
        index: usize,
        is_delta: bool,
        amount: i32,
        num_steps: usize,
        zero_block: usize,
        non_zero_block: usize,
    ) {
        let block = &mut self.blocks[index];
        assert!(!block.is_finalized());
        block.body = Some(Body::Step {
            is_delta,
            amount,
            num_steps,
            zero_block,
            non_zero_block,
        });
    }

    pub fn finalize_exit(&mut self, index: usize, num_steps: usize) {
        let block = &mut self.blocks[index];
        assert!(!block.is_finalized());
        block.body = Some(Body::Exit { num_steps });
    }

    pub fn finalize_hang(&mut self, index: usize) {
        let block = &mut self.blocks[index];
        assert!(!block.is_finalized());
        block.body = Some(Body::Hang);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finalize_kinds() {
        let mut p = InterpretedProgram::new(3);
        assert!(!p.block(0).is_finalized());

        p.finalize(0, true, -2, 3, 1, 2);
        p.finalize_exit(1, 1);
        p.finalize_hang(2);

        assert!(p.block(0).is_delta());
        assert!(!p.block(0).is_shift());
        assert_eq!(p.block(0).amount(), -2);
        assert_eq!(p.block(0).num_steps(), 3);
        assert_eq!(p.block(0).zero_block(), Some(1));
        assert_eq!(p.block(0).non_zero_block(), Some(2));

        assert!(p.block(1).is_exit());
        assert!(!p.block(1).is_hang());
        assert!(p.block(2).is_hang());
        assert_eq!(p.block(2).zero_block(), None);
    }
}
