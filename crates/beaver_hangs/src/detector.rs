//! The hang-detector interface and its checkpoint bookkeeping.

use crate::executor::ExecutionState;
use crate::types::{HangType, Trilian};

/// A detector that tries to prove non-termination. Consulted by the executor
/// whenever execution is inside a loop.
pub trait HangDetector {
    fn reset(&mut self);

    /// Returns true iff a hang was proven. `loop_continues` signals whether
    /// the current loop will also continue; simple periodic detectors want
    /// the loop to continue, whereas for nested loops the end of an inner
    /// loop is the natural synchronization point.
    fn detect_hang(&mut self, state: &ExecutionState, loop_continues: bool) -> bool;

    fn hang_type(&self) -> HangType;
}

/// Checkpoint state shared by detectors: once a check failed, it is only
/// retried after the checkpoint advances, as only then can the outcome
/// change.
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckPoints {
    last_failed: Option<usize>,
    analyzed: Option<usize>,
}

impl CheckPoints {
    pub fn reset(&mut self) {
        self.last_failed = None;
        self.analyzed = None;
    }
}

/// The shared shell of a checkpointed detector: analyze the run summaries
/// once per checkpoint, then ask for a proof. A `Maybe` proof keeps the
/// checkpoint open so the proof is retried while the situation is unchanged.
pub trait CheckpointedDetector {
    fn checkpoints(&mut self) -> &mut CheckPoints;

    fn should_check_now(&self, state: &ExecutionState, loop_continues: bool) -> bool;

    /// Checks whether the summaries exhibit the characteristic behavior of
    /// the hang this detector looks for, and analyzes the loops involved.
    fn analyze_hang_behaviour(&mut self, state: &ExecutionState) -> bool;

    /// Tries to prove the hang. `Maybe` means a later check at the same
    /// checkpoint may still succeed.
    fn proof_hang(&mut self, state: &ExecutionState) -> Trilian;

    fn run_detection(&mut self, state: &ExecutionState, loop_continues: bool) -> bool {
        if !self.should_check_now(state, loop_continues) {
            return false;
        }

        let now = state.run_summary.num_run_blocks() + usize::from(!loop_continues);
        if self.checkpoints().last_failed == Some(now) {
            // Already checked and failed at this checkpoint.
            return false;
        }

        if self.checkpoints().analyzed != Some(now) {
            if !self.analyze_hang_behaviour(state) {
                self.checkpoints().last_failed = Some(now);
                return false;
            }
            self.checkpoints().analyzed = Some(now);
        }

        match self.proof_hang(state) {
            Trilian::Maybe => false,
            Trilian::No => {
                self.checkpoints().last_failed = Some(now);
                false
            }
            Trilian::Yes => true,
        }
    }
}

/// Detector that "detects" a hang as soon as the meta-run summary has looped
/// the requested number of times. Drives executions to a stable meta-loop in
/// analyzer tests.
#[derive(Debug, Clone, Copy)]
pub struct RunUntilMetaLoop {
    num_iterations: usize,
}

impl RunUntilMetaLoop {
    pub fn new(num_iterations: usize) -> Self {
        RunUntilMetaLoop { num_iterations }
    }
}

impl HangDetector for RunUntilMetaLoop {
    fn reset(&mut self) {}

    fn detect_hang(&mut self, state: &ExecutionState, loop_continues: bool) -> bool {
        !loop_continues
            && state.meta_run_summary.is_inside_loop()
            && state.meta_run_summary.loop_iteration() >= self.num_iterations
    }

    fn hang_type(&self) -> HangType {
        HangType::MetaPeriodic
    }
}
