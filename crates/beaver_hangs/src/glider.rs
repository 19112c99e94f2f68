//! Glider hang detection.
//!
//! A glider is a stationary loop whose iteration count grows each
//! meta-iteration: the loop counts a "current" counter down to zero while
//! seeding a larger "next" counter one loop-shift further along; the
//! transition between loop executions moves DP onto the next counter.

use crate::executor::ExecutionState;
use crate::meta_loop::{LoopType, MetaLoopAnalysis};
use crate::sequence_analysis::SequenceAnalysis;
use crate::types::Trilian;

fn sign(v: i32) -> i32 {
    v.signum()
}

#[derive(Debug, Default)]
pub struct GliderHangChecker {
    glider_loop_index: usize,
    cur_counter_dp_offset: i32,
    cur_counter_delta: i32,
    next_counter_delta: i32,
    loop_shift: i32,
    num_bootstrap_cycles: usize,
    // Expected values ahead of the next loop counter, by distance from it.
    // These are the accumulated contributions of future transition
    // executions to cells the glider has not yet consumed.
    ahead_deltas: Vec<i32>,
    transition: SequenceAnalysis,
}

impl GliderHangChecker {
    pub fn new() -> Self {
        GliderHangChecker::default()
    }

    pub fn glider_loop_index(&self) -> usize {
        self.glider_loop_index
    }

    pub fn counter_dp_offset(&self) -> i32 {
        self.cur_counter_dp_offset
    }

    pub fn transition_sequence(&self) -> &SequenceAnalysis {
        &self.transition
    }

    /// Checks the glider contract against the meta-loop analysis and
    /// analyzes the transition between loop executions. Returns false when
    /// the behavior does not match a supported glider.
    pub fn init(&mut self, mla: &MetaLoopAnalysis, state: &ExecutionState) -> bool {
        // There must be exactly one loop with a growing iteration count; any
        // other loops must run a fixed number of iterations and drift along.
        let mut glider_loop = None;
        for (i, behavior) in mla.loop_behaviors().iter().enumerate() {
            if behavior.loop_type() != LoopType::Glider {
                return false;
            }
            if behavior.iteration_delta() != 0 {
                if glider_loop.is_some() {
                    return false;
                }
                glider_loop = Some(i);
            }
        }
        let Some(glider_loop) = glider_loop else {
            return false;
        };
        self.glider_loop_index = glider_loop;

        if !self.identify_loop_counters(mla) {
            return false;
        }
        if !self.analyze_transition(mla, state) {
            return false;
        }

        true
    }

    fn identify_loop_counters(&mut self, mla: &MetaLoopAnalysis) -> bool {
        let behavior = &mla.loop_behaviors()[self.glider_loop_index];
        let analysis = behavior.loop_analysis();
        let loop_size = analysis.loop_size();

        // The loop counter is the value consumed by the loop's exit
        // instruction.
        let remainder = mla.loop_remainder(self.glider_loop_index);
        let exit_instruction = (remainder + loop_size - 1) % loop_size;
        self.cur_counter_dp_offset = analysis.effective_result_at(exit_instruction).dp_offset();

        if analysis.dp_delta() != 0 {
            // The glider loop must be stationary.
            return false;
        }
        debug_assert_eq!(behavior.min_dp_delta(), behavior.max_dp_delta());
        let Some(loop_shift) = behavior.min_dp_delta() else {
            return false;
        };
        if loop_shift == 0 {
            return false;
        }
        self.loop_shift = loop_shift;

        let deltas = analysis.data_deltas();
        let cur_delta = deltas.delta_at(self.cur_counter_dp_offset);
        if cur_delta == 0 {
            return false;
        }

        let mut found_next_counter = false;
        for dd in deltas.iter() {
            let rel = dd.dp_offset() - self.cur_counter_dp_offset;
            if rel == 0 {
                continue;
            }
            if sign(rel) != sign(loop_shift) {
                // Wake of the glider; values behind it no longer matter.
                continue;
            }
            if rel % loop_shift != 0 {
                // Ahead of the counter but off-stride: the glider would keep
                // revisiting it. Not a supported glider.
                return false;
            }
            if rel == loop_shift {
                // The next loop counter. It must move away from zero at
                // least as fast as the current counter moves towards it.
                found_next_counter = true;
                if cur_delta.abs() > dd.delta().abs() || sign(cur_delta) == sign(dd.delta()) {
                    return false;
                }
                self.next_counter_delta = dd.delta();
            }
            // Deltas further along bump future counters, which is fine.
        }

        self.cur_counter_delta = cur_delta;
        found_next_counter
    }

    // Analyzes the blocks between two consecutive glider-loop executions as
    // one sequence, and derives the expected values ahead of the next
    // counter.
    fn analyze_transition(&mut self, mla: &MetaLoopAnalysis, state: &ExecutionState) -> bool {
        let rs = state.run_summary;
        let first = mla.first_run_block_index();
        let pos = mla.sequence_index_for_loop(self.glider_loop_index);

        // The transition runs from the previous glider-loop exit up to the
        // start of the current glider loop.
        let prev_loop = first + pos - mla.loop_size();
        let cur_loop = first + pos;
        let start = rs.run_block(prev_loop + 1).start_index();
        let end = rs.run_block(cur_loop).start_index();
        self.transition
            .analyze_sequence(state.program, &state.run_history[start..end]);

        self.check_transition_deltas()
    }

    fn check_transition_deltas(&mut self) -> bool {
        let shift = self.loop_shift;
        let behavior_deltas = &self.transition;

        let mut total_next_delta = 0;
        let mut total_next_next_delta = 0;
        let mut min_dp_offset = self.cur_counter_dp_offset;
        let mut max_dp_offset = self.cur_counter_dp_offset;

        let max_ahead = behavior_deltas
            .data_deltas()
            .iter()
            .map(|dd| (dd.dp_offset() - 2 * shift).abs() as usize + 1)
            .max()
            .unwrap_or(0);
        self.ahead_deltas.clear();
        self.ahead_deltas.resize(max_ahead, 0);

        for dd in behavior_deltas.data_deltas().iter() {
            let rel = dd.dp_offset();
            let is_ahead = rel * shift > 0;

            if is_ahead && rel % shift == 0 {
                // This modifies a future loop counter. Track by how much.
                total_next_delta += dd.delta();
                if rel / shift >= 2 {
                    total_next_next_delta = dd.delta();
                }
            } else {
                // Changing other values impacts how long the hang takes to
                // bootstrap: the loop must have passed them before it only
                // encounters values it changed itself.
                min_dp_offset = min_dp_offset.min(rel);
                max_dp_offset = max_dp_offset.max(rel);
            }

            if (rel - 2 * shift) * shift > 0 {
                // The value is ahead of the next loop counter. Update the
                // ahead values; repeat in case it is so far ahead that it
                // contributes more than once. The offset is shifted twice:
                // once to make it relative to the next counter, and once
                // because at check time the next transition has not yet
                // executed.
                let mut offset = (rel - 2 * shift).abs();
                while offset >= 0 {
                    self.ahead_deltas[offset as usize] += dd.delta();
                    offset -= shift.abs();
                }
            }
        }

        if self.cur_counter_delta.abs() == self.next_counter_delta.abs()
            && total_next_delta * self.next_counter_delta <= 0
        {
            // When the loop alone grows the next counter no faster than it
            // shrinks the current one, the transition must add the growth
            // that keeps the hang a-periodic.
            return false;
        }

        if total_next_next_delta == 0 {
            // The glider loop cannot handle a zero-valued next counter, so
            // the transition must seed the counter after the next one.
            return false;
        }

        self.num_bootstrap_cycles =
            (min_dp_offset.abs().max(max_dp_offset.abs()) / shift.abs()) as usize;

        // The transition must land DP exactly one loop-shift further, so the
        // next counter becomes the current one.
        self.cur_counter_dp_offset + self.transition.dp_delta() == shift
    }

    /// Verifies on the live tape that the glider keeps running: every cell
    /// it is about to consume, beyond the window written by the transition,
    /// must be zero, and the cells inside that window must hold exactly the
    /// transition's accumulated contributions.
    pub fn proof_hang(&self, state: &ExecutionState) -> Trilian {
        if state.run_summary.loop_iteration() < self.num_bootstrap_cycles {
            return Trilian::Maybe;
        }

        let data = state.data;
        let shift = self.loop_shift as isize;
        let dp_start = data.dp() + shift;
        let step = if self.loop_shift > 0 { 1 } else { -1 };
        let dp_end = if self.loop_shift > 0 {
            data.max_bound()
        } else {
            data.min_bound()
        };

        let mut dp = dp_start;
        loop {
            if dp != dp_start {
                let offset = (dp - dp_start).unsigned_abs();
                let expected = self.ahead_deltas.get(offset).copied().unwrap_or(0);
                if data.value_at(dp) != expected {
                    return Trilian::Maybe;
                }
            }
            if (step > 0 && dp >= dp_end) || (step < 0 && dp <= dp_end) {
                break;
            }
            dp += step;
        }

        Trilian::Yes
    }
}
