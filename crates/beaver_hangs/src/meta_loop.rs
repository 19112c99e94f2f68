//! Meta-loop analysis.
//!
//! Decides whether the meta-run history has settled into a pattern whose
//! loops evolve predictably, and classifies how each loop inside the pattern
//! behaves: how its iteration count changes per meta-iteration, and how the
//! data range it visits drifts.

use std::collections::HashMap;
use std::rc::Rc;

use crate::blocks::InterpretedProgram;
use crate::executor::ExecutionState;
use crate::loop_analysis::LoopAnalysis;
use crate::run_summary::RunUnitId;
use crate::sequence_analysis::SequenceAnalysis;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum LoopType {
    /// The loop occupies the same data cells on every execution.
    Stationary,
    /// A stationary loop whose position drifts between executions.
    Glider,
    /// A travelling loop with one fixed end-point.
    AnchoredSweep,
    /// A travelling loop whose both end-points move.
    DoubleSweep,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub enum MetaLoopType {
    /// Every loop's iteration count changes by a constant per meta-iteration.
    #[default]
    Regular,
    /// Some loop's iteration count varies non-linearly.
    Irregular,
}

/// Analysis of one run block inside the meta-loop window.
#[derive(Debug, Clone)]
pub enum BlockAnalysis {
    Sequence(Rc<SequenceAnalysis>),
    Loop(Rc<LoopAnalysis>),
}

impl BlockAnalysis {
    pub fn is_loop(&self) -> bool {
        matches!(self, BlockAnalysis::Loop(_))
    }

    pub fn as_loop(&self) -> Option<&Rc<LoopAnalysis>> {
        match self {
            BlockAnalysis::Loop(la) => Some(la),
            BlockAnalysis::Sequence(_) => None,
        }
    }

    pub fn dp_delta(&self) -> i32 {
        match self {
            BlockAnalysis::Sequence(sa) => sa.dp_delta(),
            BlockAnalysis::Loop(la) => la.dp_delta(),
        }
    }
}

/// How a loop inside the meta-loop behaves across meta-iterations.
#[derive(Debug, Clone)]
pub struct LoopBehavior {
    sequence_index: usize,
    loop_analysis: Rc<LoopAnalysis>,
    /// Drift of the lowest DP the loop touches; `None` when irregular.
    min_dp_delta: Option<i32>,
    /// Drift of the highest DP the loop touches; `None` when irregular.
    max_dp_delta: Option<i32>,
    iteration_delta: i32,
    is_linear: bool,
}

impl LoopBehavior {
    /// Position of the loop's run block inside the meta-loop window.
    pub fn sequence_index(&self) -> usize {
        self.sequence_index
    }

    pub fn loop_analysis(&self) -> &Rc<LoopAnalysis> {
        &self.loop_analysis
    }

    pub fn min_dp_delta(&self) -> Option<i32> {
        self.min_dp_delta
    }

    pub fn max_dp_delta(&self) -> Option<i32> {
        self.max_dp_delta
    }

    /// Change of the iteration count per meta-iteration. For non-linear
    /// growth this is the last observed delta.
    pub fn iteration_delta(&self) -> i32 {
        self.iteration_delta
    }

    /// True iff the iteration count changes by the same amount every
    /// meta-iteration.
    pub fn is_linear(&self) -> bool {
        self.is_linear
    }

    /// How much the end-point the loop arrives at grows the data sequence
    /// per meta-iteration; `None` for irregular growth.
    pub fn end_dp_growth(&self) -> Option<i32> {
        let d = self.loop_analysis.dp_delta();
        if d == 0 {
            self.min_dp_delta
        } else if d > 0 {
            self.max_dp_delta
        } else {
            Some(-(self.min_dp_delta?))
        }
    }

    pub fn loop_type(&self) -> LoopType {
        let moving = |side: Option<i32>| side != Some(0);
        if self.loop_analysis.dp_delta() == 0 {
            if moving(self.min_dp_delta) {
                LoopType::Glider
            } else {
                LoopType::Stationary
            }
        } else if !moving(self.min_dp_delta) && !moving(self.max_dp_delta) {
            LoopType::Stationary
        } else if !moving(self.min_dp_delta) || !moving(self.max_dp_delta) {
            LoopType::AnchoredSweep
        } else {
            LoopType::DoubleSweep
        }
    }

    pub fn is_sweep_loop(&self) -> bool {
        matches!(
            self.loop_type(),
            LoopType::AnchoredSweep | LoopType::DoubleSweep
        )
    }
}

#[derive(Debug, Clone, Default)]
struct MetaLoopData {
    sequence_index: usize,
    /// Instructions executed in the final, partial loop iteration.
    loop_remainder: usize,
    /// DP shift of the loop's entry per meta-iteration (last observed).
    data_pointer_delta: i32,
    last_iteration_delta: i32,
    is_linear: bool,
}

enum WindowCheck {
    Ok { any_nonlinear: bool },
    /// The pattern itself is broken: the window structure does not repeat,
    /// a loop shrank (when shrinking is not allowed), or a loop exited at a
    /// different instruction.
    Broken,
    /// The first window pair matches; the second disagrees on the deltas.
    DeltasDiverged,
}

/// Analysis of the meta-run loop. Built when the meta-loop stabilizes,
/// invalidated and rebuilt when the pattern breaks.
#[derive(Debug, Default)]
pub struct MetaLoopAnalysis {
    meta_loop_period: usize,
    loop_size: usize,
    first_run_block_index: usize,
    num_run_blocks: usize,
    num_meta_run_blocks: usize,
    analyses: Vec<BlockAnalysis>,
    loop_data: Vec<MetaLoopData>,
    behaviors: Vec<LoopBehavior>,
    loop_index_lookup: HashMap<usize, usize>,
    is_periodic: bool,
    meta_loop_type: MetaLoopType,
    valid: bool,
}

fn dp_delta_of_history_range(
    program: &InterpretedProgram,
    history: &[RunUnitId],
    start: usize,
    end: usize,
) -> i32 {
    history[start..end]
        .iter()
        .map(|&bi| {
            let b = program.block(bi as usize);
            if b.is_shift() {
                b.amount()
            } else {
                0
            }
        })
        .sum()
}

impl MetaLoopAnalysis {
    pub fn new() -> Self {
        MetaLoopAnalysis::default()
    }

    pub fn reset(&mut self) {
        *self = MetaLoopAnalysis::default();
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// The meta-loop period in run blocks, as found by the meta-run summary.
    pub fn meta_loop_period(&self) -> usize {
        self.meta_loop_period
    }

    /// The analyzed pattern size in run blocks. A multiple of the meta-loop
    /// period when a single period would make iteration counts appear to
    /// grow non-linearly.
    pub fn loop_size(&self) -> usize {
        self.loop_size
    }

    /// Index of the run block where the analyzed window starts (sequence
    /// index zero).
    pub fn first_run_block_index(&self) -> usize {
        self.first_run_block_index
    }

    /// True iff the program-block history is fully periodic: every loop runs
    /// a fixed number of iterations.
    pub fn is_periodic(&self) -> bool {
        self.is_periodic
    }

    pub fn meta_loop_type(&self) -> MetaLoopType {
        self.meta_loop_type
    }

    pub fn block_analysis(&self, sequence_index: usize) -> &BlockAnalysis {
        &self.analyses[sequence_index]
    }

    pub fn analyses(&self) -> &[BlockAnalysis] {
        &self.analyses
    }

    pub fn loop_behaviors(&self) -> &[LoopBehavior] {
        &self.behaviors
    }

    pub fn num_loops(&self) -> usize {
        self.loop_data.len()
    }

    pub fn loop_index_for_sequence(&self, sequence_index: usize) -> Option<usize> {
        self.loop_index_lookup.get(&sequence_index).copied()
    }

    pub fn sequence_index_for_loop(&self, loop_index: usize) -> usize {
        self.loop_data[loop_index].sequence_index
    }

    /// Instructions executed in the loop's final, partial iteration.
    pub fn loop_remainder(&self, loop_index: usize) -> usize {
        self.loop_data[loop_index].loop_remainder
    }

    /// Last observed change of the loop's iteration count per meta-iteration.
    pub fn loop_iteration_delta(&self, loop_index: usize) -> i32 {
        self.loop_data[loop_index].last_iteration_delta
    }

    /// Last observed DP shift of the run block's entry per meta-iteration.
    pub fn data_pointer_delta(&self, loop_index: usize) -> i32 {
        self.loop_data[loop_index].data_pointer_delta
    }

    /// Attempts to explain the current meta-run loop. Should be invoked when
    /// a loop in the run summary is about to finish. On failure no state is
    /// retained; the next checkpoint triggers a fresh attempt.
    pub fn analyze_meta_loop(&mut self, state: &ExecutionState) -> bool {
        self.reset();

        if !state.meta_run_summary.is_inside_loop() {
            return false;
        }
        let meta_loop_period = state.meta_run_summary.loop_period();
        let num_run_blocks = state.run_summary.num_run_blocks();

        let mut loop_size = meta_loop_period;
        let mut result = None;
        while loop_size <= 3 * meta_loop_period && 3 * loop_size <= num_run_blocks {
            match self.check_windows(state, loop_size, false) {
                WindowCheck::Ok { any_nonlinear } => {
                    result = Some((loop_size, any_nonlinear));
                    break;
                }
                WindowCheck::Broken => break,
                WindowCheck::DeltasDiverged => loop_size *= 2,
            }
        }

        let (loop_size, any_nonlinear) = match result {
            Some(r) => r,
            None => {
                // The iteration counts do not settle into linear growth. The
                // pattern may still be an irregular but structurally stable
                // meta-loop, which the sweep checkers can examine further.
                if 3 * meta_loop_period <= num_run_blocks
                    && matches!(
                        self.check_windows(state, meta_loop_period, true),
                        WindowCheck::Ok { .. }
                    )
                {
                    (meta_loop_period, true)
                } else {
                    return false;
                }
            }
        };

        self.meta_loop_period = meta_loop_period;
        self.loop_size = loop_size;
        self.first_run_block_index = num_run_blocks - loop_size;
        self.meta_loop_type = if any_nonlinear {
            MetaLoopType::Irregular
        } else {
            MetaLoopType::Regular
        };

        if !self.analyze_run_blocks(state) {
            self.reset();
            return false;
        }
        self.derive_loop_data(state);
        self.derive_behaviors(state);

        self.is_periodic = self.meta_loop_type == MetaLoopType::Regular
            && self.behaviors.iter().all(|b| b.iteration_delta == 0);
        self.num_run_blocks = num_run_blocks;
        self.num_meta_run_blocks = state.meta_run_summary.num_run_blocks();
        self.valid = true;

        log::debug!(
            "meta-loop analysis committed: loop_size={} type={:?} periodic={}",
            self.loop_size,
            self.meta_loop_type,
            self.is_periodic
        );

        true
    }

    // Compares the iteration counts of loop run blocks in three consecutive
    // windows of `loop_size` run blocks. With `allow_nonlinear` set, loops
    // may grow or shrink erratically as long as they keep exiting at the
    // same instruction.
    fn check_windows(
        &self,
        state: &ExecutionState,
        loop_size: usize,
        allow_nonlinear: bool,
    ) -> WindowCheck {
        let rs = state.run_summary;
        let n = rs.num_run_blocks();
        let s1 = n - 3 * loop_size;

        let mut any_nonlinear = false;
        for i in 0..loop_size {
            let b1 = rs.run_block(s1 + i);
            let b2 = rs.run_block(s1 + loop_size + i);
            let b3 = rs.run_block(s1 + 2 * loop_size + i);

            if b1.sequence_id() != b2.sequence_id()
                || b2.sequence_id() != b3.sequence_id()
                || b1.is_loop() != b2.is_loop()
                || b2.is_loop() != b3.is_loop()
            {
                return WindowCheck::Broken;
            }
            if !b1.is_loop() {
                continue;
            }

            let period = b1.loop_period() as i64;
            let len1 = rs.run_block_length(s1 + i) as i64;
            let len2 = rs.run_block_length(s1 + loop_size + i) as i64;
            let len3 = rs.run_block_length(s1 + 2 * loop_size + i) as i64;

            // Both loops must exit at the same instruction.
            if (len2 - len1) % period != 0 {
                return WindowCheck::Broken;
            }
            if !allow_nonlinear && len2 < len1 {
                return WindowCheck::Broken;
            }
            if (len3 - len2) % period != 0 {
                return if allow_nonlinear {
                    WindowCheck::Broken
                } else {
                    WindowCheck::DeltasDiverged
                };
            }
            if !allow_nonlinear && len3 < len2 {
                return WindowCheck::DeltasDiverged;
            }

            if (len2 - len1) / period != (len3 - len2) / period {
                if allow_nonlinear {
                    any_nonlinear = true;
                } else {
                    return WindowCheck::DeltasDiverged;
                }
            }
        }

        if allow_nonlinear && !any_nonlinear {
            // A fully linear pattern should be committed by the regular
            // check instead.
            return WindowCheck::Broken;
        }
        WindowCheck::Ok { any_nonlinear }
    }

    fn analyze_run_blocks(&mut self, state: &ExecutionState) -> bool {
        self.analyses.clear();
        let rs = state.run_summary;

        for i in 0..self.loop_size {
            let index = self.first_run_block_index + i;
            let rb = rs.run_block(index);
            let start = rb.start_index();

            if rb.is_loop() {
                let mut la = LoopAnalysis::new();
                let period = rb.loop_period();
                if !la.analyze_loop(state.program, &state.run_history[start..start + period]) {
                    return false;
                }
                self.analyses.push(BlockAnalysis::Loop(Rc::new(la)));
            } else {
                let mut sa = SequenceAnalysis::new();
                let len = rs.run_block_length(index);
                sa.analyze_sequence(state.program, &state.run_history[start..start + len]);
                self.analyses.push(BlockAnalysis::Sequence(Rc::new(sa)));
            }
        }

        true
    }

    fn derive_loop_data(&mut self, state: &ExecutionState) {
        self.loop_data.clear();
        self.loop_index_lookup.clear();
        let rs = state.run_summary;

        for i in 0..self.loop_size {
            if !self.analyses[i].is_loop() {
                continue;
            }
            let index = self.first_run_block_index + i;
            let rb = rs.run_block(index);
            let period = rb.loop_period() as i64;
            let len1 = rs.run_block_length(index - 2 * self.loop_size) as i64;
            let len2 = rs.run_block_length(index - self.loop_size) as i64;
            let len3 = rs.run_block_length(index) as i64;
            let d12 = (len2 - len1) / period;
            let d23 = (len3 - len2) / period;

            let loop_index = self.loop_data.len();
            self.loop_index_lookup.insert(i, loop_index);
            self.loop_data.push(MetaLoopData {
                sequence_index: i,
                loop_remainder: (len3 % period) as usize,
                data_pointer_delta: 0,
                last_iteration_delta: d23 as i32,
                is_linear: d12 == d23,
            });
        }
    }

    fn derive_behaviors(&mut self, state: &ExecutionState) {
        self.behaviors.clear();
        let rs = state.run_summary;
        let n = rs.num_run_blocks();
        let loop_size = self.loop_size;
        let s1 = n - 3 * loop_size;

        // DP at the entry of every run block in the three windows, measured
        // from the start of the first window.
        let mut entries = Vec::with_capacity(3 * loop_size + 1);
        let mut dp = 0i32;
        for index in s1..n {
            entries.push(dp);
            let start = rs.run_block(index).start_index();
            let end = start + rs.run_block_length(index);
            dp += dp_delta_of_history_range(state.program, state.run_history, start, end);
        }
        entries.push(dp);

        let entry_at = |window: usize, pos: usize| entries[window * loop_size + pos];
        let exit_at = |window: usize, pos: usize| entries[window * loop_size + pos + 1];

        for data in &mut self.loop_data {
            let pos = data.sequence_index;
            let analysis = self.analyses[pos].as_loop().unwrap().clone();

            let drift = |f: &dyn Fn(usize, usize) -> i32| {
                let d12 = f(1, pos) - f(0, pos);
                let d23 = f(2, pos) - f(1, pos);
                (d12 == d23).then_some(d23)
            };
            let entry_drift = drift(&entry_at);
            let exit_drift = drift(&exit_at);

            data.data_pointer_delta = entry_at(2, pos) - entry_at(1, pos);

            let d = analysis.dp_delta();
            let (min_dp_delta, max_dp_delta) = if d == 0 {
                (entry_drift, entry_drift)
            } else if d > 0 {
                (entry_drift, exit_drift)
            } else {
                (exit_drift, entry_drift)
            };

            self.behaviors.push(LoopBehavior {
                sequence_index: pos,
                loop_analysis: analysis,
                min_dp_delta,
                max_dp_delta,
                iteration_delta: data.last_iteration_delta,
                is_linear: data.is_linear,
            });
        }
    }

    /// Checks that execution still follows the analyzed pattern: no new run
    /// block broke it, and iteration deltas continue to hold. When this
    /// fails all analysis state is dropped in one step.
    pub fn is_analysis_still_valid(&mut self, state: &ExecutionState) -> bool {
        if !self.valid {
            return false;
        }
        if !state.meta_run_summary.is_inside_loop()
            || state.meta_run_summary.num_run_blocks() != self.num_meta_run_blocks
        {
            self.invalidate();
            return false;
        }

        let rs = state.run_summary;
        let n = rs.num_run_blocks();
        for index in self.num_run_blocks..n {
            let rb = rs.run_block(index);
            let prev = rs.run_block(index - self.loop_size);
            if rb.sequence_id() != prev.sequence_id() || rb.is_loop() != prev.is_loop() {
                self.invalidate();
                return false;
            }
        }
        // Check iteration growth of loops whose length is already final.
        for index in self.num_run_blocks..n.saturating_sub(1) {
            let rb = rs.run_block(index);
            if !rb.is_loop() {
                continue;
            }
            let period = rb.loop_period() as i64;
            let len = rs.run_block_length(index) as i64;
            let prev_len = rs.run_block_length(index - self.loop_size) as i64;
            if (len - prev_len) % period != 0 {
                self.invalidate();
                return false;
            }
            let delta = ((len - prev_len) / period) as i32;
            let pos = (index - self.first_run_block_index) % self.loop_size;
            if let Some(li) = self.loop_index_for_sequence(pos) {
                let data = &mut self.loop_data[li];
                if data.is_linear && delta != data.last_iteration_delta {
                    self.invalidate();
                    return false;
                }
                data.last_iteration_delta = delta;
            }
        }

        self.num_run_blocks = n;
        true
    }

    fn invalidate(&mut self) {
        log::trace!("meta-loop analysis invalidated");
        self.reset();
    }
}
