//! No-exit hang detection on the program grid.
//!
//! Treats the grid as a directed graph over (cell, heading, data-is-zero)
//! states and explores everything reachable from the current program
//! pointer. Data values at turns are treated as unknown once a path passed a
//! DATA instruction, so reachability is overestimated; when even the
//! overestimate cannot reach an unset or terminal cell, the program can
//! never escape.

use crate::program::{Dir, Grid, Ins, InstructionPointer, ProgramPointer};
use crate::types::Trilian;

// Flags tracking which path starts were followed, one bit per heading,
// shifted up for the data-is-zero variants.
fn dir_flag(dir: Dir, data_is_zero: bool) -> u8 {
    let flag = match dir {
        Dir::Up => 0x01,
        Dir::Right => 0x02,
        Dir::Down => 0x04,
        Dir::Left => 0x08,
    };
    if data_is_zero {
        flag << 4
    } else {
        flag
    }
}

#[derive(Debug, Clone, Copy)]
struct PathStart {
    pp: ProgramPointer,
    data_is_zero: bool,
}

/// Reusable scratch state for the reachability search.
#[derive(Debug, Default)]
pub struct NoExitChecker {
    followed: Vec<u8>,
    stack: Vec<PathStart>,
}

impl NoExitChecker {
    pub fn new() -> Self {
        NoExitChecker::default()
    }

    /// Proves that execution can never reach an unset or terminal cell from
    /// the given state. `Yes` is sound; `No` means escape may be possible.
    pub fn proof_no_exit<const W: usize, const H: usize>(
        &mut self,
        program: &Grid<W, H>,
        pp: ProgramPointer,
        data_is_zero: bool,
    ) -> Trilian {
        if self.can_escape_from(program, pp, data_is_zero) {
            Trilian::No
        } else {
            Trilian::Yes
        }
    }

    fn can_escape_from<const W: usize, const H: usize>(
        &mut self,
        program: &Grid<W, H>,
        pp: ProgramPointer,
        data_is_zero: bool,
    ) -> bool {
        self.followed.clear();
        self.followed.resize(W * H, 0);
        self.stack.clear();

        let mut escaped = self.follow_path(program, PathStart { pp, data_is_zero });

        let mut next = 0;
        while !escaped && next < self.stack.len() {
            let start = self.stack[next];
            next += 1;
            escaped = self.follow_path(program, start);
        }

        escaped
    }

    // Walks straight ahead from the path start until the path escapes,
    // blocks, or hits a TURN. A turn branches into the rotated headings,
    // which are queued as new path starts at the cell before the turn.
    fn follow_path<const W: usize, const H: usize>(
        &mut self,
        program: &Grid<W, H>,
        start: PathStart,
    ) -> bool {
        let mut encountered_data = false;
        let mut p = start.pp.p;
        let dir = start.pp.dir;

        loop {
            let ins_p = p.step(dir);
            match program.instruction_at(ins_p) {
                Ins::Data => {
                    encountered_data = true;
                }
                Ins::Noop => {}
                Ins::Done | Ins::Unset => {
                    // Escaped; cannot conclude that the program hangs.
                    return true;
                }
                Ins::Turn => {
                    if start.data_is_zero || encountered_data {
                        self.push_path_start(program, p, dir.counter_clockwise(), true);
                    }
                    if !start.data_is_zero || encountered_data {
                        self.push_path_start(program, p, dir.clockwise(), false);
                    }
                    return false;
                }
            }
            p = ins_p;
        }
    }

    fn push_path_start<const W: usize, const H: usize>(
        &mut self,
        program: &Grid<W, H>,
        p: InstructionPointer,
        dir: Dir,
        data_is_zero: bool,
    ) {
        let Some(index) = program.cell_index(p) else {
            return;
        };
        let flag = dir_flag(dir, data_is_zero);
        if self.followed[index] & flag != 0 {
            return;
        }
        self.followed[index] |= flag;
        self.stack.push(PathStart {
            pp: ProgramPointer { p, dir },
            data_is_zero,
        });
    }
}
