//! The meta-loop hang detector.
//!
//! Waits for the meta-run summary to enter a loop, explains it with a
//! meta-loop analysis, and hands the proof obligation to the checker that
//! matches the observed behavior: meta-periodic, glider, regular sweep or
//! irregular sweep.

use crate::detector::{CheckPoints, CheckpointedDetector, HangDetector};
use crate::executor::ExecutionState;
use crate::glider::GliderHangChecker;
use crate::irregular_sweep::IrregularSweepHangChecker;
use crate::loop_analysis::LoopAnalysis;
use crate::meta_loop::MetaLoopAnalysis;
use crate::periodic::PeriodicHangChecker;
use crate::sweep::SweepHangChecker;
use crate::types::{HangType, Trilian};

enum ActiveChecker {
    None,
    Periodic(Box<PeriodicCheckerState>),
    Glider(GliderHangChecker),
    Sweep(SweepHangChecker),
    IrregularSweep(IrregularSweepHangChecker),
}

struct PeriodicCheckerState {
    loop_analysis: LoopAnalysis,
    checker: PeriodicHangChecker,
}

pub struct MetaLoopHangDetector {
    checkpoints: CheckPoints,
    analysis: MetaLoopAnalysis,
    active: ActiveChecker,
}

impl Default for MetaLoopHangDetector {
    fn default() -> Self {
        MetaLoopHangDetector::new()
    }
}

impl MetaLoopHangDetector {
    pub fn new() -> Self {
        MetaLoopHangDetector {
            checkpoints: CheckPoints::default(),
            analysis: MetaLoopAnalysis::new(),
            active: ActiveChecker::None,
        }
    }

    pub fn meta_loop_analysis(&self) -> &MetaLoopAnalysis {
        &self.analysis
    }

    // When the meta-loop is fully periodic, the whole window repeats as one
    // large loop of program blocks; analyze it as such and let the periodic
    // checker prove it.
    fn prepare_periodic_check(&mut self, state: &ExecutionState) -> bool {
        let rs = state.run_summary;
        let start_block = rs.num_run_blocks() - self.analysis.loop_size();
        let end_block = rs.num_run_blocks() - 1;

        let loop_start = rs.run_block(start_block).start_index();
        let loop_end =
            rs.run_block(end_block).start_index() + rs.run_block_length(end_block);

        let mut loop_analysis = LoopAnalysis::new();
        if !loop_analysis.analyze_loop(state.program, &state.run_history[loop_start..loop_end]) {
            return false;
        }

        let mut checker = PeriodicHangChecker::new();
        checker.init(loop_start);
        self.active = ActiveChecker::Periodic(Box::new(PeriodicCheckerState {
            loop_analysis,
            checker,
        }));
        true
    }

    fn prepare_glider_check(&mut self, state: &ExecutionState) -> bool {
        let mut checker = GliderHangChecker::new();
        if !checker.init(&self.analysis, state) {
            return false;
        }
        self.active = ActiveChecker::Glider(checker);
        true
    }

    fn prepare_sweep_check(&mut self, state: &ExecutionState) -> bool {
        let mut checker = SweepHangChecker::new();
        if !checker.init(&self.analysis, state) {
            return false;
        }
        self.active = ActiveChecker::Sweep(checker);
        true
    }

    fn prepare_irregular_sweep_check(&mut self, state: &ExecutionState) -> bool {
        let mut checker = IrregularSweepHangChecker::new();
        if !checker.init(&self.analysis, state) {
            return false;
        }
        self.active = ActiveChecker::IrregularSweep(checker);
        true
    }
}

impl CheckpointedDetector for MetaLoopHangDetector {
    fn checkpoints(&mut self) -> &mut CheckPoints {
        &mut self.checkpoints
    }

    fn should_check_now(&self, state: &ExecutionState, loop_continues: bool) -> bool {
        // Wait for the inner loop to finish.
        !loop_continues && state.meta_run_summary.is_inside_loop()
    }

    fn analyze_hang_behaviour(&mut self, state: &ExecutionState) -> bool {
        if self.analysis.is_analysis_still_valid(state) {
            if !matches!(self.active, ActiveChecker::None) {
                return true;
            }
            // The previous checker concluded NO; try to select afresh.
        } else {
            self.active = ActiveChecker::None;
            if !self.analysis.analyze_meta_loop(state) {
                return false;
            }
        }

        if self.analysis.is_periodic() {
            if self.prepare_periodic_check(state) {
                return true;
            }
        } else if self.prepare_glider_check(state)
            || self.prepare_sweep_check(state)
            || self.prepare_irregular_sweep_check(state)
        {
            return true;
        }

        self.analysis.reset();
        false
    }

    fn proof_hang(&mut self, state: &ExecutionState) -> Trilian {
        let result = match &mut self.active {
            ActiveChecker::None => Trilian::No,
            ActiveChecker::Periodic(periodic) => periodic
                .checker
                .proof_hang(&periodic.loop_analysis, state),
            ActiveChecker::Glider(checker) => checker.proof_hang(state),
            ActiveChecker::Sweep(checker) => checker.proof_hang(state),
            ActiveChecker::IrregularSweep(checker) => checker.proof_hang(state),
        };

        if result == Trilian::No {
            self.active = ActiveChecker::None;
        }
        result
    }
}

impl HangDetector for MetaLoopHangDetector {
    fn reset(&mut self) {
        self.checkpoints.reset();
        self.analysis.reset();
        self.active = ActiveChecker::None;
    }

    fn detect_hang(&mut self, state: &ExecutionState, loop_continues: bool) -> bool {
        self.run_detection(state, loop_continues)
    }

    fn hang_type(&self) -> HangType {
        match self.active {
            ActiveChecker::Periodic(_) => HangType::MetaPeriodic,
            ActiveChecker::Glider(_) => HangType::AperiodicGlider,
            ActiveChecker::Sweep(_) => HangType::RegularSweep,
            ActiveChecker::IrregularSweep(_) => HangType::IrregularSweep,
            ActiveChecker::None => HangType::MetaPeriodic,
        }
    }
}
