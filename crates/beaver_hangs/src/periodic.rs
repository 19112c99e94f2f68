//! Periodic hang detection: a single loop that repeats forever.

use crate::detector::{CheckPoints, CheckpointedDetector, HangDetector};
use crate::executor::ExecutionState;
use crate::loop_analysis::{ExitWindow, LoopAnalysis};
use crate::types::{HangType, Trilian};

/// Proves that a repeating loop never exits, by inspecting the live tape.
///
/// Phase 1 evaluates the loop's exit conditions against the tape. For a
/// travelling loop whose upcoming values are all zero, phase 2 lets the loop
/// run past its bootstrap window so that already-consumed non-zero values
/// get their chance to trigger a late exit.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeriodicHangChecker {
    loop_start: usize,
    phase2: bool,
    target_loop_len: usize,
    initialized_for: Option<usize>,
}

impl PeriodicHangChecker {
    pub fn new() -> Self {
        PeriodicHangChecker::default()
    }

    /// (Re)arms the checker for the loop starting at the given run-history
    /// index.
    pub fn init(&mut self, loop_start: usize) {
        self.loop_start = loop_start;
        self.initialized_for = None;
    }

    pub fn loop_start(&self) -> usize {
        self.loop_start
    }

    pub fn proof_hang(&mut self, loop_analysis: &LoopAnalysis, state: &ExecutionState) -> Trilian {
        if self.initialized_for != Some(self.loop_start) {
            self.phase2 = false;
            self.initialized_for = Some(self.loop_start);
        }

        if self.phase2 {
            self.proof_hang_phase2(state)
        } else {
            self.proof_hang_phase1(loop_analysis, state)
        }
    }

    fn proof_hang_phase1(
        &mut self,
        loop_analysis: &LoopAnalysis,
        state: &ExecutionState,
    ) -> Trilian {
        let loop_len = state.run_history.len() - self.loop_start;
        if loop_len <= loop_analysis.loop_size() * loop_analysis.num_bootstrap_cycles() {
            // Still bootstrapping. Too early to tell.
            return Trilian::Maybe;
        }

        // The check must run at the start of a loop iteration so that the
        // DP offsets of the exit conditions line up. When the meta-loop
        // contains several inner loops, checkpoints also fire mid-window.
        if loop_len % loop_analysis.loop_size() != 0 {
            return Trilian::Maybe;
        }

        if loop_analysis.dp_delta() == 0 {
            // Stationary loop: check if any non-bootstrap exit will be met.
            let data = state.data;
            for exit in loop_analysis.exits() {
                if exit.window != ExitWindow::Anytime {
                    continue;
                }
                let value = data.value_at(data.dp() + exit.condition.dp_offset() as isize);
                if exit.condition.holds_for_value(value) {
                    return Trilian::No;
                }
            }
            Trilian::Yes
        } else {
            // Travelling loop. A hang requires that all values the loop is
            // yet to consume are zero.
            if loop_analysis.all_values_to_be_consumed_are_zero(state.data) {
                // Values consumed earlier may still trigger a slow
                // non-bootstrap exit a few iterations from now. Let the loop
                // run for that many more cycles before concluding.
                self.phase2 = true;
                self.target_loop_len =
                    loop_len + loop_analysis.loop_size() * loop_analysis.num_bootstrap_cycles();
            }
            Trilian::Maybe
        }
    }

    fn proof_hang_phase2(&self, state: &ExecutionState) -> Trilian {
        let loop_len = state.run_history.len() - self.loop_start;
        if loop_len >= self.target_loop_len {
            // The loop ran the required extra iterations without exiting.
            Trilian::Yes
        } else {
            Trilian::Maybe
        }
    }
}

/// Detects hangs of a single loop at the first summary level. Fires at the
/// end of every loop iteration, while the loop continues.
#[derive(Debug, Default)]
pub struct PeriodicHangDetector {
    checkpoints: CheckPoints,
    loop_analysis: LoopAnalysis,
    checker: PeriodicHangChecker,
}

impl PeriodicHangDetector {
    pub fn new() -> Self {
        PeriodicHangDetector::default()
    }
}

impl CheckpointedDetector for PeriodicHangDetector {
    fn checkpoints(&mut self) -> &mut CheckPoints {
        &mut self.checkpoints
    }

    fn should_check_now(&self, state: &ExecutionState, loop_continues: bool) -> bool {
        loop_continues
            && state.run_summary.is_inside_loop()
            && state.run_summary.is_at_end_of_loop()
    }

    fn analyze_hang_behaviour(&mut self, state: &ExecutionState) -> bool {
        let summary = state.run_summary;
        let loop_block = summary.last_run_block();
        let loop_start = loop_block.start_index();

        if !self.loop_analysis.analyze_loop(
            state.program,
            &state.run_history[loop_start..loop_start + loop_block.loop_period()],
        ) {
            return false;
        }

        if self.loop_analysis.dp_delta() != 0 {
            // A travelling loop only hangs when none of its non-bootstrap
            // exits fires on zero; the tape is unbounded and zero-filled, so
            // such an exit is eventually reached.
            for exit in self.loop_analysis.exits() {
                if exit.window == ExitWindow::Anytime && exit.condition.holds_for_value(0) {
                    return false;
                }
            }
        }

        self.checker.init(loop_start);
        true
    }

    fn proof_hang(&mut self, state: &ExecutionState) -> Trilian {
        self.checker.proof_hang(&self.loop_analysis, state)
    }
}

impl HangDetector for PeriodicHangDetector {
    fn reset(&mut self) {
        self.checkpoints.reset();
        self.checker = PeriodicHangChecker::new();
    }

    fn detect_hang(&mut self, state: &ExecutionState, loop_continues: bool) -> bool {
        self.run_detection(state, loop_continues)
    }

    fn hang_type(&self) -> HangType {
        HangType::Periodic
    }
}
