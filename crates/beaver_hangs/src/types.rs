//! Verdicts shared by the analyzers, the checkers and the executor.

use serde::{Deserialize, Serialize};

/// Three-valued verdict of a hang proof.
///
/// `Maybe` keeps a checker engaged: the executor will consult it again at a
/// later checkpoint. Collapsing this into a boolean loses that distinction.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Trilian {
    Yes,
    No,
    Maybe,
}

/// The kind of hang that was proven.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum HangType {
    /// A single loop that repeats forever.
    Periodic,
    /// A fixed cycle of loops and sequences that repeats forever.
    MetaPeriodic,
    /// A stationary loop whose iteration count grows via a companion counter.
    AperiodicGlider,
    /// Two travelling loops bouncing between the ends of a growing sequence.
    RegularSweep,
    /// A sweep with a binary-counter-like a-periodic appendix at one end.
    IrregularSweep,
    /// The program can never reach an unset or terminal grid cell.
    NoExit,
    /// A program block that was already flagged as hanging when it was compiled.
    NoDataLoop,
}

/// The outcome of executing a compiled program.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum RunResult {
    /// The program reached an exit block.
    Success,
    /// The data pointer moved outside the tape.
    DataError,
    /// Execution reached a block that was never finalized.
    ProgramError,
    /// A hang detector proved that the program never terminates.
    DetectedHang,
    /// The maximum number of steps was reached without a verdict.
    AssumedHang,
}
