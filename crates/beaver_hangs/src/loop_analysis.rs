//! Loop analysis: exit-condition classification on top of sequence analysis.

use std::fmt;

use arrayvec::ArrayVec;

use crate::blocks::InterpretedProgram;
use crate::data::Data;
use crate::data_deltas::{DataDelta, DataDeltas};
use crate::run_summary::RunUnitId;
use crate::sequence_analysis::SequenceAnalysis;

/// Loops larger than this are not analyzed.
pub const MAX_LOOP_SIZE: usize = 128;

// Sentinel for an unconstrained entry value. It is set big enough so that the
// effective increment realized by a loop is always smaller.
const UNSET_FIXED_VALUE: i32 = 1024;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ExitOp {
    Equals,
    Unequal,
    LessThanOrEqual,
    GreaterThanOrEqual,
}

/// Classifies when a loop exit can be taken, assuming the loop starts running
/// from its first instruction.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub enum ExitWindow {
    /// This exit can happen in any iteration of the loop.
    #[default]
    Anytime,
    /// This exit can only happen while the loop is still bootstrapping.
    Bootstrap,
    /// This exit can never be taken.
    Never,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ExitCondition {
    op: ExitOp,
    value: i32,
    dp_offset: i32,
    modulus: u32,
}

impl Default for ExitCondition {
    fn default() -> Self {
        ExitCondition::new(ExitOp::Equals, 0, 0)
    }
}

impl ExitCondition {
    pub fn new(op: ExitOp, value: i32, dp_offset: i32) -> Self {
        ExitCondition {
            op,
            value,
            dp_offset,
            modulus: 1,
        }
    }

    pub fn op(&self) -> ExitOp {
        self.op
    }

    pub fn value(&self) -> i32 {
        self.value
    }

    /// Which data value the condition applies to. For a travelling loop this
    /// indexes the window of new values each iteration consumes; for a
    /// stationary loop it is relative to DP at the start of an iteration.
    pub fn dp_offset(&self) -> i32 {
        self.dp_offset
    }

    /// The modulus constraint. Required when DP is stationary and values
    /// change by more than one per iteration, as that may skip the zero.
    pub fn modulus(&self) -> u32 {
        self.modulus
    }

    pub fn set_modulus(&mut self, modulus: u32) {
        debug_assert!(modulus > 0);
        self.modulus = modulus;
    }

    fn set_op(&mut self, op: ExitOp) {
        self.op = op;
    }

    fn clear_modulus(&mut self) {
        self.modulus = 1;
    }

    /// Checks the condition for a value. The caller is responsible for
    /// passing the value that the exiting instruction actually consumes,
    /// which `dp_offset` locates.
    pub fn holds_for_value(&self, value: i32) -> bool {
        match self.op {
            ExitOp::Equals => value == self.value,
            ExitOp::Unequal => value != self.value,
            ExitOp::LessThanOrEqual => value <= self.value && self.congruent(value),
            ExitOp::GreaterThanOrEqual => value >= self.value && self.congruent(value),
        }
    }

    fn congruent(&self, value: i32) -> bool {
        (value - self.value).rem_euclid(self.modulus as i32) == 0
    }

    pub fn expression_equals(&self, op: ExitOp, value: i32) -> bool {
        self.op == op && self.value == value
    }
}

impl fmt::Display for ExitCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.op {
            ExitOp::Equals => "==",
            ExitOp::Unequal => "!=",
            ExitOp::LessThanOrEqual => "<=",
            ExitOp::GreaterThanOrEqual => ">=",
        };
        write!(f, "data[{}] {} {}", self.dp_offset, op, self.value)?;
        if self.modulus > 1 {
            write!(f, " (mod {})", self.modulus)?;
        }
        Ok(())
    }
}

/// The exit behavior of one instruction inside an analyzed loop.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoopExit {
    pub condition: ExitCondition,
    pub window: ExitWindow,
    /// This instruction is the first to see newly-consumed values once the
    /// loop is fully spun up.
    pub first_for_value: bool,
}

/// Analysis of a loop of program blocks: squashed data deltas, bootstrap
/// cycle count, and a classified exit per instruction.
#[derive(Debug, Clone, Default)]
pub struct LoopAnalysis {
    seq: SequenceAnalysis,
    num_bootstrap_cycles: usize,
    exits: Vec<LoopExit>,
    squashed: DataDeltas,
}

fn canonical_residue(offset: i32, dp_delta: i32) -> i32 {
    debug_assert!(dp_delta != 0);
    let mut m = offset % dp_delta;
    if m * dp_delta < 0 {
        // Ensure the sign of the residue matches that of the DP delta.
        m += dp_delta;
    }
    m
}

impl LoopAnalysis {
    pub fn new() -> Self {
        LoopAnalysis::default()
    }

    pub fn loop_size(&self) -> usize {
        self.seq.sequence_size()
    }

    pub fn dp_delta(&self) -> i32 {
        self.seq.dp_delta()
    }

    pub fn min_dp(&self) -> i32 {
        self.seq.min_dp()
    }

    pub fn max_dp(&self) -> i32 {
        self.seq.max_dp()
    }

    /// The net tape changes of a single iteration.
    pub fn data_deltas(&self) -> &DataDeltas {
        self.seq.data_deltas()
    }

    /// For travelling loops: the per-residue steady-state change, with
    /// offsets reduced modulo the DP delta.
    pub fn squashed_deltas(&self) -> &DataDeltas {
        &self.squashed
    }

    pub fn effective_result_at(&self, index: usize) -> DataDelta {
        self.seq.effective_result_at(index)
    }

    pub fn sequence(&self) -> &SequenceAnalysis {
        &self.seq
    }

    /// The number of iterations before the loop is fully spun up, i.e. until
    /// it is always the same instruction that first sees a data value.
    pub fn num_bootstrap_cycles(&self) -> usize {
        self.num_bootstrap_cycles
    }

    pub fn exit(&self, index: usize) -> &LoopExit {
        &self.exits[index]
    }

    pub fn exits(&self) -> &[LoopExit] {
        &self.exits
    }

    /// The delta realized at the given offset, assuming the loop runs
    /// endlessly.
    pub fn delta_at(&self, dp_offset: i32) -> i32 {
        let d = self.dp_delta();
        if d == 0 {
            self.seq.data_deltas().delta_at(dp_offset)
        } else {
            self.squashed.delta_at(canonical_residue(dp_offset, d))
        }
    }

    /// True iff the specified loop instruction exits the loop on a zero
    /// value, i.e. its non-zero successor continues the loop.
    pub fn exits_on_zero(&self, program: &InterpretedProgram, index: usize) -> bool {
        let indices = self.seq.block_indices();
        let cur = program.block(indices[index] as usize);
        let next = indices[(index + 1) % indices.len()] as usize;
        cur.non_zero_block() == Some(next)
    }

    /// Analyzes one period of a loop. Fails when the loop is too large.
    pub fn analyze_loop(
        &mut self,
        program: &InterpretedProgram,
        block_indices: &[RunUnitId],
    ) -> bool {
        if block_indices.len() > MAX_LOOP_SIZE {
            // This loop is too large to analyze.
            return false;
        }
        if !self.seq.analyze_sequence(program, block_indices) {
            return false;
        }

        self.exits = vec![LoopExit::default(); block_indices.len()];
        if self.seq.dp_delta() != 0 {
            self.squash_deltas();
            self.init_exits_for_travelling_loop(program);
            self.num_bootstrap_cycles =
                ((self.max_dp() - self.min_dp()) / self.dp_delta().abs()) as usize;
        } else {
            self.squashed.clear();
            self.init_exits_for_stationary_loop(program);
            self.num_bootstrap_cycles = 0;
        }

        true
    }

    // Determine the effective delta over multiple iterations, taking into
    // account the shifting DP.
    fn squash_deltas(&mut self) {
        self.squashed.clear();
        let d = self.seq.dp_delta();
        for dd in self.seq.data_deltas().iter() {
            self.squashed
                .update_delta(canonical_residue(dd.dp_offset(), d), dd.delta());
        }
    }

    fn init_exits_for_stationary_loop(&mut self, program: &InterpretedProgram) {
        self.set_exit_conditions_for_stationary_loop(program);
        self.identify_bootstrap_only_exits_for_stationary_loop();
        self.mark_unreachable_exits_for_stationary_loop(program);
    }

    fn set_exit_conditions_for_stationary_loop(&mut self, program: &InterpretedProgram) {
        for i in 0..self.loop_size() {
            let eff = self.seq.effective_result_at(i);
            let dp = eff.dp_offset();
            let current_delta = eff.delta();
            let final_delta = self.seq.data_deltas().delta_at(dp);
            let exits_on_zero = self.exits_on_zero(program, i);

            let exit = &mut self.exits[i];
            if final_delta == 0 {
                let op = if exits_on_zero {
                    ExitOp::Equals
                } else {
                    ExitOp::Unequal
                };
                exit.condition = ExitCondition::new(op, -current_delta, dp);
                exit.window = ExitWindow::Bootstrap;
            } else {
                // Otherwise the loop could not loop.
                debug_assert!(exits_on_zero);
                let op = if final_delta > 0 {
                    ExitOp::LessThanOrEqual
                } else {
                    ExitOp::GreaterThanOrEqual
                };
                exit.condition = ExitCondition::new(op, -current_delta, dp);
                exit.condition.set_modulus(final_delta.unsigned_abs());
                exit.window = ExitWindow::Anytime;
            }
            exit.first_for_value = false;
        }
    }

    fn identify_bootstrap_only_exits_for_stationary_loop(&mut self) {
        for i in (0..self.loop_size()).rev() {
            if self.exits[i].window != ExitWindow::Anytime {
                // This cannot cancel out other exits.
                continue;
            }

            let dp = self.seq.effective_result_at(i).dp_offset();
            let delta = self.seq.effective_result_at(i).delta();
            // The signed per-iteration change at this offset.
            let mc = self.seq.data_deltas().delta_at(dp);
            let delta_mod = delta.rem_euclid(mc.abs());

            for j in (0..i).rev() {
                if self.seq.effective_result_at(j).dp_offset() != dp {
                    continue;
                }
                let delta2 = self.seq.effective_result_at(j).delta();
                if delta2.rem_euclid(mc.abs()) != delta_mod {
                    continue;
                }

                // One of these instructions cancels the other out.
                let k = if delta2 == delta
                    || (mc > 0 && delta2 > delta)
                    || (mc < 0 && delta2 < delta)
                {
                    // In case of equal deltas, j cancels out i, as it
                    // executes first.
                    i
                } else {
                    j
                };
                self.exits[k].window = if k == j {
                    ExitWindow::Bootstrap
                } else {
                    ExitWindow::Never
                };
                self.exits[k].condition.set_op(ExitOp::Equals);
                self.exits[k].condition.clear_modulus();
            }
        }
    }

    fn mark_unreachable_exits_for_stationary_loop(&mut self, program: &InterpretedProgram) {
        for i in (0..self.loop_size()).rev() {
            if self.exits_on_zero(program, i) {
                continue;
            }
            // When this instruction executed and the loop continued, the
            // value is known to be zero. Instructions that follow it and
            // depend on the same data value can be checked against that.
            let dp = self.seq.effective_result_at(i).dp_offset();
            let delta_i = self.seq.effective_result_at(i).delta();

            for j in i + 1..self.loop_size() {
                if self.seq.effective_result_at(j).dp_offset() == dp
                    && !self.exits[j]
                        .condition
                        .holds_for_value(self.seq.effective_result_at(j).delta() - delta_i)
                {
                    self.exits[j].window = ExitWindow::Never;
                }
            }
        }
    }

    fn init_exits_for_travelling_loop(&mut self, program: &InterpretedProgram) {
        self.set_exit_conditions_for_travelling_loop(program);
        self.identify_bootstrap_only_exits_for_travelling_loop(program);
    }

    fn set_exit_conditions_for_travelling_loop(&mut self, program: &InterpretedProgram) {
        for i in 0..self.loop_size() {
            let eff = self.seq.effective_result_at(i);
            let op = if self.exits_on_zero(program, i) {
                ExitOp::Equals
            } else {
                ExitOp::Unequal
            };
            let exit = &mut self.exits[i];
            exit.condition = ExitCondition::new(op, -eff.delta(), eff.dp_offset());
            exit.window = ExitWindow::Anytime;
            exit.first_for_value = false;
        }
    }

    fn identify_bootstrap_only_exits_for_travelling_loop(&mut self, program: &InterpretedProgram) {
        let n = self.loop_size();
        let ad = self.seq.dp_delta().abs();
        let downwards = self.seq.dp_delta() < 0;

        // Instruction indices sorted by the order in which they consume new
        // data values.
        let mut indices: ArrayVec<usize, MAX_LOOP_SIZE> = (0..n).collect();
        indices.sort_by(|&a, &b| {
            let da = self.seq.effective_result_at(a).dp_offset();
            let db = self.seq.effective_result_at(b).dp_offset();
            let by_dp = if downwards { da.cmp(&db) } else { db.cmp(&da) };
            by_dp.then(a.cmp(&b))
        });

        // The change of a value after an instruction executed, relative to
        // when the value was first encountered by the loop.
        let mut cum_delta = [0i32; MAX_LOOP_SIZE];
        // Entry value fixed by a zero-based continuation condition.
        let mut fixed_exit_value = [UNSET_FIXED_VALUE; MAX_LOOP_SIZE];

        for ii in 0..n {
            let i = indices[ii];
            let residue = self.seq.effective_result_at(i).dp_offset().rem_euclid(ad);
            let mut found_prev = false;

            if !self.exits_on_zero(program, i) {
                fixed_exit_value[i] = 0;
            }

            for jj in (0..ii).rev() {
                let j = indices[jj];
                if self.seq.effective_result_at(j).dp_offset().rem_euclid(ad) != residue {
                    continue;
                }
                // Both instructions process the same data values.

                if !found_prev {
                    // Found the instruction directly preceding this one.
                    found_prev = true;

                    let own_amount = if program
                        .block(self.seq.block_indices()[i] as usize)
                        .is_delta()
                    {
                        program.block(self.seq.block_indices()[i] as usize).amount()
                    } else {
                        0
                    };
                    cum_delta[i] = cum_delta[j] + own_amount;
                    if fixed_exit_value[j] != UNSET_FIXED_VALUE {
                        fixed_exit_value[i] = fixed_exit_value[j] + own_amount;
                    }
                }

                let same_value_triggers_both = cum_delta[i] == cum_delta[j];
                let earlier_fixes_value = fixed_exit_value[j] != UNSET_FIXED_VALUE
                    && !self.exits_on_zero(program, j)
                    && !self.exits[i].condition.holds_for_value(fixed_exit_value[i]);

                if same_value_triggers_both || earlier_fixes_value {
                    if self.seq.effective_result_at(i).dp_offset()
                        == self.seq.effective_result_at(j).dp_offset()
                    {
                        // Both instructions see the same value in the same
                        // loop iteration, so the later one never exits.
                        self.exits[i].window = ExitWindow::Never;
                        break;
                    } else {
                        // The later instruction can still exit the loop
                        // during bootstrap.
                        self.exits[i].window = ExitWindow::Bootstrap;
                    }
                }
            }

            if !found_prev {
                // This instruction freshly consumes values.
                self.exits[i].first_for_value = true;
            }
        }
    }

    /// For a travelling loop that is about to start an iteration: true iff
    /// every tape cell it will consume in the future is zero.
    pub fn all_values_to_be_consumed_are_zero(&self, data: &Data) -> bool {
        debug_assert!(self.dp_delta() != 0);
        if self.dp_delta() > 0 {
            data.only_zeros_ahead(data.dp() + self.max_dp() as isize, true)
        } else {
            data.only_zeros_ahead(data.dp() + self.min_dp() as isize, false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INC: bool = true;
    const MOV: bool = false;
    const STEPS: usize = 1;

    fn exit_block(p: &mut InterpretedProgram, index: usize) {
        p.finalize_exit(index, STEPS);
    }

    #[test]
    fn stationary_counter_has_anytime_exit_with_modulus() {
        // INC 2, exiting on zero. Values at the counter move in steps of two,
        // so the exit needs a modulus to not miss odd values skipping zero.
        let mut p = InterpretedProgram::new(2);
        p.finalize(0, INC, 2, STEPS, 1, 0);
        exit_block(&mut p, 1);

        let mut la = LoopAnalysis::new();
        assert!(la.analyze_loop(&p, &[0]));

        assert_eq!(la.dp_delta(), 0);
        assert_eq!(la.num_bootstrap_cycles(), 0);
        let exit = la.exit(0);
        assert_eq!(exit.window, ExitWindow::Anytime);
        assert!(exit.condition.expression_equals(ExitOp::LessThanOrEqual, -2));
        assert_eq!(exit.condition.modulus(), 2);

        // -2 and -4 reach zero; -3 skips it.
        assert!(exit.condition.holds_for_value(-2));
        assert!(exit.condition.holds_for_value(-4));
        assert!(!exit.condition.holds_for_value(-3));
        assert!(!exit.condition.holds_for_value(2));
    }

    #[test]
    fn stationary_net_zero_exit_is_bootstrap_only() {
        // INC 1 (exit on zero); INC -1 (exit on zero). Net change zero.
        let mut p = InterpretedProgram::new(3);
        p.finalize(0, INC, 1, STEPS, 2, 1);
        p.finalize(1, INC, -1, STEPS, 2, 0);
        exit_block(&mut p, 2);

        let mut la = LoopAnalysis::new();
        assert!(la.analyze_loop(&p, &[0, 1]));

        assert_eq!(la.dp_delta(), 0);
        for i in 0..2 {
            assert_eq!(la.exit(i).window, ExitWindow::Bootstrap, "exit {i}");
        }
        assert!(la.exit(0).condition.expression_equals(ExitOp::Equals, -1));
        assert!(la.exit(1).condition.expression_equals(ExitOp::Equals, 0));
    }

    #[test]
    fn travelling_loop_classifies_shadowed_exit_as_bootstrap() {
        // INC -1 (exit on zero); MOV 1 (exit on non-zero). Once spun up, the
        // shift instruction fixes every consumed value to zero, and the
        // decrement then sees -1, which can never equal its exit value 1.
        let mut p = InterpretedProgram::new(3);
        p.finalize(0, INC, -1, STEPS, 2, 1);
        p.finalize(1, MOV, 1, STEPS, 0, 2);
        exit_block(&mut p, 2);

        let mut la = LoopAnalysis::new();
        assert!(la.analyze_loop(&p, &[0, 1]));

        assert_eq!(la.dp_delta(), 1);
        assert_eq!(la.num_bootstrap_cycles(), 1);

        // The shift freshly consumes values.
        assert!(la.exit(1).first_for_value);
        assert_eq!(la.exit(1).window, ExitWindow::Anytime);
        assert!(la.exit(1).condition.expression_equals(ExitOp::Unequal, 0));

        assert!(!la.exit(0).first_for_value);
        assert_eq!(la.exit(0).window, ExitWindow::Bootstrap);
        assert!(la.exit(0).condition.expression_equals(ExitOp::Equals, 1));
    }

    #[test]
    fn travelling_loop_squashes_deltas_per_residue() {
        // INC 1; MOV 2; INC 3; MOV -1; INC -1; MOV 1. DP moves +2 per
        // iteration; offsets 0 and 2 fold into residue 0, offsets 1 into 1.
        let mut p = InterpretedProgram::new(7);
        p.finalize(0, INC, 1, STEPS, 6, 1);
        p.finalize(1, MOV, 2, STEPS, 6, 2);
        p.finalize(2, INC, 3, STEPS, 6, 3);
        p.finalize(3, MOV, -1, STEPS, 6, 4);
        p.finalize(4, INC, -1, STEPS, 6, 5);
        p.finalize(5, MOV, 1, STEPS, 6, 0);
        exit_block(&mut p, 6);

        let mut la = LoopAnalysis::new();
        assert!(la.analyze_loop(&p, &[0, 1, 2, 3, 4, 5]));

        assert_eq!(la.dp_delta(), 2);
        // Raw deltas: +1 at 0, +3 at 2, -1 at 1.
        assert_eq!(la.data_deltas().delta_at(0), 1);
        assert_eq!(la.data_deltas().delta_at(2), 3);
        assert_eq!(la.data_deltas().delta_at(1), -1);
        // Squashed: residue 0 collects +1 and +3; residue 1 collects -1.
        assert_eq!(la.squashed_deltas().delta_at(0), 4);
        assert_eq!(la.squashed_deltas().delta_at(1), -1);
        assert_eq!(la.delta_at(4), 4);
        assert_eq!(la.delta_at(-3), -1);
    }

    #[test]
    fn travelling_loop_marks_impossible_exit_never() {
        // MOV 1 (continues on zero); INC 1 (exit on zero). The shift fixes
        // every consumed value to zero, and both instructions read the same
        // cell in the same iteration, so the increment can never trigger its
        // exit (which would need a -1 entry value).
        let mut p = InterpretedProgram::new(3);
        p.finalize(0, MOV, 1, STEPS, 1, 2);
        p.finalize(1, INC, 1, STEPS, 2, 0);
        exit_block(&mut p, 2);

        let mut la = LoopAnalysis::new();
        assert!(la.analyze_loop(&p, &[0, 1]));

        assert!(la.exit(0).first_for_value);
        assert_eq!(la.exit(0).window, ExitWindow::Anytime);
        assert!(la.exit(0).condition.expression_equals(ExitOp::Unequal, 0));
        assert_eq!(la.exit(1).window, ExitWindow::Never);
    }

    #[test]
    fn values_to_be_consumed_looks_beyond_the_touched_window() {
        // INC -1; MOV 1: consumes one new cell per iteration.
        let mut p = InterpretedProgram::new(3);
        p.finalize(0, INC, -1, STEPS, 2, 1);
        p.finalize(1, MOV, 1, STEPS, 0, 2);
        exit_block(&mut p, 2);

        let mut la = LoopAnalysis::new();
        assert!(la.analyze_loop(&p, &[0, 1]));

        let mut data = crate::data::Data::new(32);
        assert!(la.all_values_to_be_consumed_are_zero(&data));

        // A value two cells ahead will be consumed eventually.
        assert!(data.shift(2));
        data.delta(5);
        assert!(data.shift(-2));
        assert!(!la.all_values_to_be_consumed_are_zero(&data));
    }

    #[test]
    fn canonical_residue_sign_follows_dp_delta() {
        assert_eq!(canonical_residue(5, 3), 2);
        assert_eq!(canonical_residue(-1, 3), 2);
        assert_eq!(canonical_residue(-4, -3), -1);
        assert_eq!(canonical_residue(2, -3), -1);
        assert_eq!(canonical_residue(6, 3), 0);
    }
}
