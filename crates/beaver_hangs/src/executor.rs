//! The hang-executor harness.
//!
//! Runs a compiled program block by block, feeds the three-level run
//! summaries, and consults the registered hang detectors at loop
//! checkpoints.

use crate::blocks::InterpretedProgram;
use crate::data::Data;
use crate::detector::HangDetector;
use crate::meta_detector::MetaLoopHangDetector;
use crate::periodic::PeriodicHangDetector;
use crate::run_summary::{RunSummary, RunUnitId};
use crate::transitions::RunBlockTransitions;
use crate::types::{HangType, RunResult};

/// Read-only view of the execution state, handed to analyzers and checkers.
/// All summaries are updated through the same run unit when a checker sees
/// this.
pub struct ExecutionState<'a> {
    pub program: &'a InterpretedProgram,
    pub data: &'a Data,
    pub run_history: &'a [RunUnitId],
    pub run_summary: &'a RunSummary,
    pub meta_run_summary: &'a RunSummary,
    pub meta_meta_run_summary: &'a RunSummary,
    pub transitions: &'a RunBlockTransitions,
}

pub struct HangExecutor {
    data: Data,
    run_history: Vec<RunUnitId>,
    run_summary: RunSummary,
    meta_run_summary: RunSummary,
    meta_meta_run_summary: RunSummary,
    // Unit histories of the higher summary levels: the sequence ids of the
    // run blocks one level down.
    meta_history: Vec<RunUnitId>,
    meta_meta_history: Vec<RunUnitId>,
    transitions: RunBlockTransitions,
    // Scratch buffer for the repeated-suffix detector, shared by all levels.
    helper: Vec<usize>,

    detectors: Vec<Box<dyn HangDetector>>,
    detected_hang: Option<HangType>,

    block: usize,
    num_steps: usize,
    max_steps: usize,
    hang_detection_start: usize,
    max_hang_detection_steps: usize,
}

impl HangExecutor {
    pub fn new(data_capacity: usize, max_hang_detection_steps: usize) -> Self {
        HangExecutor {
            data: Data::new(data_capacity),
            run_history: Vec::new(),
            run_summary: RunSummary::new(),
            meta_run_summary: RunSummary::new(),
            meta_meta_run_summary: RunSummary::new(),
            meta_history: Vec::new(),
            meta_meta_history: Vec::new(),
            transitions: RunBlockTransitions::new(),
            helper: Vec::new(),
            detectors: Vec::new(),
            detected_hang: None,
            block: 0,
            num_steps: 0,
            max_steps: max_hang_detection_steps,
            hang_detection_start: 0,
            max_hang_detection_steps,
        }
    }

    pub fn add_default_hang_detectors(&mut self) {
        self.add_hang_detector(Box::new(PeriodicHangDetector::new()));
        self.add_hang_detector(Box::new(MetaLoopHangDetector::new()));
    }

    pub fn add_hang_detector(&mut self, detector: Box<dyn HangDetector>) {
        self.detectors.push(detector);
    }

    /// Removes all registered detectors, so a caller can run with a custom
    /// subset.
    pub fn clear_hang_detectors(&mut self) {
        self.detectors.clear();
    }

    pub fn set_max_steps(&mut self, steps: usize) {
        self.max_steps = steps;
    }

    /// Number of steps to execute before hang detection starts.
    pub fn set_hang_detection_start(&mut self, steps: usize) {
        self.hang_detection_start = steps;
    }

    pub fn num_steps(&self) -> usize {
        self.num_steps
    }

    pub fn detected_hang_type(&self) -> Option<HangType> {
        self.detected_hang
    }

    pub fn data(&self) -> &Data {
        &self.data
    }

    /// The current execution state, for analyzer-level callers (tests and
    /// collaborators that drive analyses themselves).
    pub fn execution_state<'a>(&'a self, program: &'a InterpretedProgram) -> ExecutionState<'a> {
        ExecutionState {
            program,
            data: &self.data,
            run_history: &self.run_history,
            run_summary: &self.run_summary,
            meta_run_summary: &self.meta_run_summary,
            meta_meta_run_summary: &self.meta_meta_run_summary,
            transitions: &self.transitions,
        }
    }

    /// Executes the program from a fresh tape and returns the verdict.
    pub fn execute(&mut self, program: &InterpretedProgram) -> RunResult {
        self.num_steps = 0;
        self.data.reset();
        self.block = program.entry();
        self.reset_hang_detection();

        let result = self.run(program);
        log::debug!(
            "executed program: {:?} after {} steps (hang: {:?})",
            result,
            self.num_steps,
            self.detected_hang
        );
        result
    }

    fn reset_hang_detection(&mut self) {
        self.run_history.clear();
        self.run_summary.reset();
        self.meta_run_summary.reset();
        self.meta_meta_run_summary.reset();
        self.meta_history.clear();
        self.meta_meta_history.clear();
        self.transitions.reset();
        for detector in &mut self.detectors {
            detector.reset();
        }
        self.detected_hang = None;
    }

    fn run(&mut self, program: &InterpretedProgram) -> RunResult {
        if let Some(result) = self.execute_without_hang_detection(program, self.hang_detection_start)
        {
            return result;
        }

        let detection_limit = (self.num_steps + self.max_hang_detection_steps).min(self.max_steps);
        if let Some(result) = self.execute_with_hang_detection(program, detection_limit) {
            return result;
        }

        if let Some(result) = self.execute_without_hang_detection(program, self.max_steps) {
            return result;
        }

        RunResult::AssumedHang
    }

    // Executes one block. `None` means execution continues at the next block.
    fn execute_block(&mut self, program: &InterpretedProgram) -> Option<RunResult> {
        let block = program.block(self.block);

        if !block.is_finalized() {
            crate::cold();
            return Some(RunResult::ProgramError);
        }
        if block.is_hang() {
            crate::cold();
            self.detected_hang = Some(HangType::NoDataLoop);
            return Some(RunResult::DetectedHang);
        }

        self.num_steps += block.num_steps();

        if block.is_exit() {
            crate::cold();
            return Some(RunResult::Success);
        }

        if block.is_delta() {
            self.data.delta(block.amount());
        } else if !self.data.shift(block.amount()) {
            crate::cold();
            return Some(RunResult::DataError);
        }

        self.block = if self.data.val() == 0 {
            block.zero_block().unwrap()
        } else {
            block.non_zero_block().unwrap()
        };

        None
    }

    fn execute_without_hang_detection(
        &mut self,
        program: &InterpretedProgram,
        step_limit: usize,
    ) -> Option<RunResult> {
        while self.num_steps < step_limit {
            if let Some(result) = self.execute_block(program) {
                return Some(result);
            }
        }
        None
    }

    fn execute_with_hang_detection(
        &mut self,
        program: &InterpretedProgram,
        step_limit: usize,
    ) -> Option<RunResult> {
        while self.num_steps < step_limit {
            // Record the block before executing it, so that when a loop exit
            // is signalled the value that triggered it is still on the tape.
            self.run_history.push(self.block as RunUnitId);
            let new_run_blocks = self
                .run_summary
                .process_new_units(&self.run_history, &mut self.helper);
            if new_run_blocks {
                self.transitions.process_new_run_blocks(&self.run_summary);
                while self.meta_history.len() < self.run_summary.num_run_blocks() {
                    self.meta_history
                        .push(self.run_summary.run_block(self.meta_history.len()).sequence_id());
                }
                if self
                    .meta_run_summary
                    .process_new_units(&self.meta_history, &mut self.helper)
                {
                    while self.meta_meta_history.len() < self.meta_run_summary.num_run_blocks() {
                        self.meta_meta_history.push(
                            self.meta_run_summary
                                .run_block(self.meta_meta_history.len())
                                .sequence_id(),
                        );
                    }
                    self.meta_meta_run_summary
                        .process_new_units(&self.meta_meta_history, &mut self.helper);
                }
            }

            if let Some(result) = self.execute_block(program) {
                return Some(result);
            }

            if self.run_summary.is_inside_loop() {
                let loop_continues = self
                    .run_summary
                    .loop_continues(&self.run_history, self.block as RunUnitId);

                let HangExecutor {
                    ref data,
                    ref run_history,
                    ref run_summary,
                    ref meta_run_summary,
                    ref meta_meta_run_summary,
                    ref transitions,
                    ref mut detectors,
                    ..
                } = *self;
                let state = ExecutionState {
                    program,
                    data,
                    run_history,
                    run_summary,
                    meta_run_summary,
                    meta_meta_run_summary,
                    transitions,
                };

                for detector in detectors.iter_mut() {
                    if detector.detect_hang(&state, loop_continues) {
                        self.detected_hang = Some(detector.hang_type());
                        log::debug!("hang detected: {:?}", self.detected_hang);
                        return Some(RunResult::DetectedHang);
                    }
                }
            }
        }
        None
    }
}
