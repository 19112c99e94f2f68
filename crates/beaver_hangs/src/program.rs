//! Type safe 2L program grid.

use serde::{Deserialize, Serialize};
use serde_with::serde_as;

/// A grid instruction.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Ins {
    /// Not yet filled in by the enumerator.
    #[default]
    Unset,
    Noop,
    Data,
    Turn,
    /// Terminal cell. Cells outside the grid read as `Done`.
    Done,
}

/// Heading of the program pointer.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum Dir {
    Up,
    Right,
    Down,
    Left,
}

impl Dir {
    /// The heading after a turn on a non-zero data value.
    pub fn clockwise(self) -> Dir {
        match self {
            Dir::Up => Dir::Right,
            Dir::Right => Dir::Down,
            Dir::Down => Dir::Left,
            Dir::Left => Dir::Up,
        }
    }

    /// The heading after a turn on a zero data value.
    pub fn counter_clockwise(self) -> Dir {
        match self {
            Dir::Up => Dir::Left,
            Dir::Left => Dir::Down,
            Dir::Down => Dir::Right,
            Dir::Right => Dir::Up,
        }
    }

    fn offset(self) -> (i32, i32) {
        match self {
            Dir::Up => (0, -1),
            Dir::Right => (1, 0),
            Dir::Down => (0, 1),
            Dir::Left => (-1, 0),
        }
    }
}

/// Position of a grid cell. May point outside the grid, where every cell
/// reads as [`Ins::Done`].
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct InstructionPointer {
    pub col: i32,
    pub row: i32,
}

impl InstructionPointer {
    pub fn new(col: i32, row: i32) -> Self {
        InstructionPointer { col, row }
    }

    /// The cell one step ahead in the given heading.
    pub fn step(self, dir: Dir) -> InstructionPointer {
        let (dc, dr) = dir.offset();
        InstructionPointer {
            col: self.col + dc,
            row: self.row + dr,
        }
    }
}

/// A grid position combined with a heading.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ProgramPointer {
    pub p: InstructionPointer,
    pub dir: Dir,
}

/// A fixed-size 2L program grid.
#[serde_as]
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub struct Grid<const W: usize, const H: usize>(
    // `serde_as` is needed for the serialization derives because serde cannot handle generic arrays.
    #[serde_as(as = "[[_; W]; H]")] pub [[Ins; W]; H],
);

impl<const W: usize, const H: usize> Default for Grid<W, H> {
    fn default() -> Self {
        Grid([[Ins::Unset; W]; H])
    }
}

impl<const W: usize, const H: usize> Grid<W, H> {
    pub fn width(&self) -> usize {
        W
    }

    pub fn height(&self) -> usize {
        H
    }

    /// The instruction at the given cell; `Done` outside the grid.
    pub fn instruction_at(&self, ip: InstructionPointer) -> Ins {
        if ip.col < 0 || ip.row < 0 || ip.col as usize >= W || ip.row as usize >= H {
            return Ins::Done;
        }
        self.0[ip.row as usize][ip.col as usize]
    }

    pub fn set(&mut self, col: usize, row: usize, ins: Ins) {
        self.0[row][col] = ins;
    }

    /// Dense index of an in-grid cell, for visited bookkeeping.
    pub fn cell_index(&self, ip: InstructionPointer) -> Option<usize> {
        if ip.col < 0 || ip.row < 0 || ip.col as usize >= W || ip.row as usize >= H {
            return None;
        }
        Some(ip.row as usize * W + ip.col as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_grid_reads_done() {
        let grid: Grid<3, 3> = Grid::default();
        assert_eq!(grid.instruction_at(InstructionPointer::new(-1, 0)), Ins::Done);
        assert_eq!(grid.instruction_at(InstructionPointer::new(0, 3)), Ins::Done);
        assert_eq!(grid.instruction_at(InstructionPointer::new(1, 1)), Ins::Unset);
    }

    #[test]
    fn turns_rotate_headings() {
        assert_eq!(Dir::Up.clockwise(), Dir::Right);
        assert_eq!(Dir::Up.counter_clockwise(), Dir::Left);
        for dir in [Dir::Up, Dir::Right, Dir::Down, Dir::Left] {
            assert_eq!(dir.clockwise().counter_clockwise(), dir);
        }
    }
}
