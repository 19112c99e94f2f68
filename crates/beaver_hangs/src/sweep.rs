//! Regular sweep hang detection.
//!
//! A sweep consists of two travelling loops that bounce between the two ends
//! of a growing data sequence. Proving the hang requires classifying what
//! happens at each end when the incoming loop exits, and checking on the
//! live tape that nothing will ever push an end-cell towards an exit the
//! pattern cannot absorb.

use std::rc::Rc;

use crate::blocks::InterpretedProgram;
use crate::data::Data;
use crate::data_deltas::DataDeltas;
use crate::executor::ExecutionState;
use crate::loop_analysis::{ExitOp, ExitWindow, LoopAnalysis};
use crate::meta_loop::{LoopType, MetaLoopAnalysis, MetaLoopType};
use crate::sequence_analysis::SequenceAnalysis;
use crate::types::Trilian;

fn sign(v: i32) -> i32 {
    v.signum()
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SweepValueChangeType {
    /// The sweep loops do not change passed values.
    NoChange,
    /// Every passed value changes by the same amount.
    UniformChange,
    /// Multiple changes of different amounts, all with the same sign.
    MultipleAlignedChanges,
    /// Changes with different signs.
    MultipleOpposingChanges,
}

/// Behavior at one end of the sweep.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SweepEndType {
    /// Every in-sweep exit converts to a non-exit; the sequence grows every
    /// sweep.
    SteadyGrowth,
    /// Some exits convert to exits, some to non-exits; growth is not
    /// guaranteed every sweep.
    IrregularGrowth,
    /// The sweep ends at a fixed position with a constant value.
    FixedPointConstantValue,
    /// The sweep ends at a fixed position oscillating among a finite set of
    /// values.
    FixedPointMultipleValues,
    /// The end cell's value drifts monotonically upward.
    FixedPointIncreasingValue,
    /// The end cell's value drifts monotonically downward.
    FixedPointDecreasingValue,
    /// An a-periodically growing, binary-counter-like appendix.
    FixedAperiodicAppendix,
}

/// A sweep loop with the derived data the end analysis needs.
#[derive(Debug)]
pub(crate) struct SweepLoop {
    pub analysis: Rc<LoopAnalysis>,
    pub sequence_index: usize,
    pub run_block_sequence_id: u32,
    pub value_change_type: SweepValueChangeType,
    /// Representative change; meaningless for opposing changes.
    pub value_change: i32,
    // Distinct per-cell changes, including 0 when some cells pass unchanged.
    value_changes: Vec<i32>,
    // Exit value -> exiting instruction, for anytime exits on zero.
    exit_map: Vec<(i32, usize)>,
    // Set when the loop only continues on one specific input value.
    requires_fixed_input: bool,
    required_input: i32,
}

impl SweepLoop {
    fn analyze(
        analysis: Rc<LoopAnalysis>,
        sequence_index: usize,
        run_block_sequence_id: u32,
        program: &InterpretedProgram,
    ) -> Option<SweepLoop> {
        if analysis.dp_delta() == 0 {
            // A sweep loop cannot be stationary.
            return None;
        }

        let mut value_changes: Vec<i32> = Vec::new();
        let mut value_change = 0;
        for dd in analysis.squashed_deltas().iter() {
            if !value_changes.contains(&dd.delta()) {
                value_changes.push(dd.delta());
            }
            value_change = dd.delta();
        }
        if (analysis.squashed_deltas().num_deltas() as i32) < analysis.dp_delta().abs()
            && !value_changes.contains(&0)
        {
            value_changes.push(0);
        }

        let value_change_type = if value_changes.len() <= 1 {
            if value_changes.is_empty() || value_changes[0] == 0 {
                SweepValueChangeType::NoChange
            } else {
                SweepValueChangeType::UniformChange
            }
        } else {
            let mut change_type = SweepValueChangeType::MultipleAlignedChanges;
            let mut first_sign = 0;
            for &v in &value_changes {
                if first_sign != 0 {
                    if first_sign == -sign(v) {
                        change_type = SweepValueChangeType::MultipleOpposingChanges;
                        break;
                    }
                } else {
                    first_sign = sign(v);
                }
            }
            change_type
        };

        let mut exit_map = Vec::new();
        let mut requires_fixed_input = false;
        let mut required_input = 0;
        for i in 0..analysis.loop_size() {
            let exit = analysis.exit(i);
            if exit.window != ExitWindow::Anytime {
                continue;
            }
            if analysis.exits_on_zero(program, i) {
                exit_map.push((exit.condition.value(), i));
            } else {
                // The loop only loops when it consumes a specific value.
                requires_fixed_input = true;
                required_input = exit.condition.value();
            }
        }

        Some(SweepLoop {
            analysis,
            sequence_index,
            run_block_sequence_id,
            value_change_type,
            value_change,
            value_changes,
            exit_map,
            requires_fixed_input,
            required_input,
        })
    }

    pub fn is_exit_value(&self, value: i32) -> bool {
        if self.requires_fixed_input {
            value != self.required_input
        } else {
            self.exit_map.iter().any(|&(v, _)| v == value)
        }
    }

    pub fn requires_fixed_input(&self) -> bool {
        self.requires_fixed_input
    }

    /// The (value, instruction) pairs of the anytime exits that fire on a
    /// zero branch.
    pub fn exit_values(&self) -> impl Iterator<Item = (i32, usize)> + '_ {
        self.exit_map.iter().copied()
    }

    pub fn num_exits_for_value(&self, value: i32) -> usize {
        self.exit_map.iter().filter(|&&(v, _)| v == value).count()
    }

    pub fn anytime_exits(&self) -> impl Iterator<Item = usize> + '_ {
        self.exit_map.iter().map(|&(_, i)| i)
    }

    /// Whether a single pass of this loop can move the given value towards
    /// zero.
    pub fn can_change_value_towards_zero(&self, value: i32) -> bool {
        self.value_changes.iter().any(|&delta| {
            delta != 0 && sign(delta) == -sign(value) && delta.abs() <= value.abs()
        })
    }

    /// Collects the changes this loop leaves behind inside the sweep body
    /// when it exits at the given instruction, relative to the exit cell.
    /// Replays a fully bootstrapped execution ending at that exit.
    pub fn collect_insweep_deltas_after_exit(
        &self,
        program: &InterpretedProgram,
        exit_instruction: usize,
        out: &mut DataDeltas,
    ) {
        out.clear();
        let analysis = &self.analysis;
        let dp_delta = analysis.dp_delta();
        let max_iteration = analysis.num_bootstrap_cycles() as i32 + 1;
        let exit_dp = analysis.effective_result_at(exit_instruction).dp_offset();

        // Chosen so that DP is zero at the exit instruction of the final
        // iteration.
        let mut dp = -(max_iteration * dp_delta + exit_dp);
        let indices = analysis.sequence().block_indices();

        for iteration in 0..=max_iteration {
            for (instruction, &bi) in indices.iter().enumerate() {
                let pb = program.block(bi as usize);
                if pb.is_delta() {
                    out.update_delta(dp, pb.amount());
                } else {
                    dp += pb.amount();
                }

                if instruction == exit_instruction && iteration == max_iteration {
                    debug_assert_eq!(dp, 0);
                    let dp_start_iteration = dp - exit_dp;
                    let dp_min = dp_start_iteration + analysis.min_dp();
                    let dp_max = dp_start_iteration + analysis.max_dp();

                    let keep: Vec<_> = out
                        .iter()
                        .filter(|dd| {
                            let inside_sweep = sign(dp - dd.dp_offset()) == sign(dp_delta);
                            let bootstrap_residue =
                                dd.dp_offset() < dp_min || dd.dp_offset() > dp_max;
                            inside_sweep && !bootstrap_residue
                        })
                        .copied()
                        .collect();
                    out.clear();
                    for dd in keep {
                        out.add_delta(dd.dp_offset(), dd.delta());
                    }
                    return;
                }
            }
        }
    }
}

/// The loops and the transition meeting at one end of the sweep.
#[derive(Debug)]
pub(crate) struct TransitionGroup {
    pub at_right: bool,
    /// Index into the checker's sweep loops.
    pub incoming: usize,
    pub outgoing: usize,
    pub transition: SequenceAnalysis,
    /// Instruction of the incoming loop that exits at this end.
    pub observed_exit: usize,
    pub end_type: SweepEndType,
    pub change_type: SweepValueChangeType,
    pub change: i32,
    // Deltas the transition applies beyond the sweep end, with only their
    // signs retained.
    pub outside_deltas: DataDeltas,
    pub inside_transition_delta_sign: i32,
}

/// Checker for regular sweep hangs.
#[derive(Debug, Default)]
pub struct SweepHangChecker {
    pub(crate) loops: Vec<SweepLoop>,
    pub(crate) groups: Vec<TransitionGroup>,
}

impl SweepHangChecker {
    pub fn new() -> Self {
        SweepHangChecker::default()
    }

    pub fn end_type(&self, at_right: bool) -> Option<SweepEndType> {
        self.groups
            .iter()
            .find(|g| g.at_right == at_right)
            .map(|g| g.end_type)
    }

    /// Initializes the checker from the meta-loop analysis. With
    /// `irregular_end` set, that end is typed as an a-periodic appendix and
    /// exempted from the regular end classification; the irregular checker
    /// validates it separately.
    pub(crate) fn init_with_irregular_end(
        &mut self,
        mla: &MetaLoopAnalysis,
        state: &ExecutionState,
        irregular_end: Option<bool>,
    ) -> bool {
        self.loops.clear();
        self.groups.clear();

        if !self.extract_sweep_loops(mla, state) {
            return false;
        }
        if !self.init_groups(mla, state) {
            return false;
        }

        for gi in 0..self.groups.len() {
            let at_right = self.groups[gi].at_right;
            if irregular_end == Some(at_right) {
                self.groups[gi].end_type = SweepEndType::FixedAperiodicAppendix;
                continue;
            }
            let Some(end_type) = self.classify_end(gi, state.program) else {
                return false;
            };
            self.groups[gi].end_type = end_type;
        }

        for gi in 0..self.groups.len() {
            if !self.check_transition_deltas(gi) {
                return false;
            }
        }

        true
    }

    pub fn init(&mut self, mla: &MetaLoopAnalysis, state: &ExecutionState) -> bool {
        // The end classification assumes every sweep advances its ends at a
        // constant rate; irregular growth is left to the irregular checker.
        if mla.meta_loop_type() != MetaLoopType::Regular {
            return false;
        }
        self.init_with_irregular_end(mla, state, None)
    }

    // There must be exactly two sweep loops, moving in opposite directions.
    // Any stationary loops must run a fixed number of iterations; they are
    // absorbed into the transitions at the ends.
    fn extract_sweep_loops(&mut self, mla: &MetaLoopAnalysis, state: &ExecutionState) -> bool {
        let rs = state.run_summary;

        for behavior in mla.loop_behaviors() {
            match behavior.loop_type() {
                LoopType::Stationary | LoopType::Glider => {
                    if behavior.iteration_delta() != 0 {
                        return false;
                    }
                }
                LoopType::AnchoredSweep | LoopType::DoubleSweep => {
                    let pos = behavior.sequence_index();
                    let seq_id = rs
                        .run_block(mla.first_run_block_index() + pos)
                        .sequence_id();
                    let Some(sweep_loop) = SweepLoop::analyze(
                        behavior.loop_analysis().clone(),
                        pos,
                        seq_id,
                        state.program,
                    ) else {
                        return false;
                    };
                    if sweep_loop.value_change_type == SweepValueChangeType::MultipleOpposingChanges
                    {
                        return false;
                    }
                    self.loops.push(sweep_loop);
                }
            }
        }

        if self.loops.len() != 2 {
            return false;
        }
        // One loop per direction; each arrives at one end and departs from
        // the other.
        if (self.loops[0].analysis.dp_delta() > 0) == (self.loops[1].analysis.dp_delta() > 0) {
            return false;
        }

        true
    }

    fn init_groups(&mut self, mla: &MetaLoopAnalysis, state: &ExecutionState) -> bool {
        for at_right in [false, true] {
            let incoming = self
                .loops
                .iter()
                .position(|l| (l.analysis.dp_delta() > 0) == at_right)
                .unwrap();
            let outgoing = 1 - incoming;

            let Some((change_type, change)) =
                combine_sweep_value_change(&self.loops[incoming], &self.loops[outgoing])
            else {
                return false;
            };

            let loop_index = mla
                .loop_index_for_sequence(self.loops[incoming].sequence_index)
                .unwrap();
            let loop_size = self.loops[incoming].analysis.loop_size();
            let remainder = mla.loop_remainder(loop_index);
            let observed_exit = (remainder + loop_size - 1) % loop_size;
            if self.loops[incoming].analysis.exit(observed_exit).window != ExitWindow::Anytime {
                return false;
            }

            let Some(transition) = self.transition_at_end(mla, state, incoming, outgoing) else {
                return false;
            };

            self.groups.push(TransitionGroup {
                at_right,
                incoming,
                outgoing,
                transition,
                observed_exit,
                end_type: SweepEndType::SteadyGrowth,
                change_type,
                change,
                outside_deltas: DataDeltas::new(),
                inside_transition_delta_sign: 0,
            });
        }
        true
    }

    // Analyzes the program blocks between the incoming loop's exit and the
    // outgoing loop's start as one plain sequence. Fixed loops inside the
    // transition unroll naturally because the blocks come from the history.
    fn transition_at_end(
        &self,
        mla: &MetaLoopAnalysis,
        state: &ExecutionState,
        incoming: usize,
        outgoing: usize,
    ) -> Option<SequenceAnalysis> {
        let rs = state.run_summary;
        let first = mla.first_run_block_index();
        let pi = self.loops[incoming].sequence_index;
        let po = self.loops[outgoing].sequence_index;

        let mut a = first + pi;
        let mut b = if po > pi {
            first + po
        } else {
            first + po + mla.loop_size()
        };
        if b >= rs.num_run_blocks() {
            a -= mla.loop_size();
            b -= mla.loop_size();
        }

        let start = rs.run_block(a + 1).start_index();
        let end = rs.run_block(b).start_index();
        let mut analysis = SequenceAnalysis::new();
        analysis.analyze_sequence(state.program, &state.run_history[start..end]);
        Some(analysis)
    }

    // Maps what happens to the end cell after exit + transition + the
    // returning sweep onto a sweep end type.
    fn classify_end(&self, group_index: usize, program: &InterpretedProgram) -> Option<SweepEndType> {
        let group = &self.groups[group_index];
        let incoming = &self.loops[group.incoming];
        let outgoing = &self.loops[group.outgoing];
        let loop_exit = incoming.analysis.exit(group.observed_exit);

        // The value of the end cell after the transition and the outgoing
        // loop's pass over it.
        let delta_after_exit = group.transition.data_deltas().delta_at(0);
        let outgoing_dp_offset = -group.transition.dp_delta();
        let final_delta = delta_after_exit + outgoing.analysis.delta_at(outgoing_dp_offset);
        let total_delta = final_delta - loop_exit.condition.value();

        let exits_on_zero = incoming
            .exit_map
            .iter()
            .any(|&(_, i)| i == group.observed_exit);

        if !exits_on_zero {
            // The loop exits on a non-zero value: a fixed point whose value
            // may drift.
            return Some(match total_delta.signum() {
                1 => SweepEndType::FixedPointIncreasingValue,
                -1 => SweepEndType::FixedPointDecreasingValue,
                _ => SweepEndType::FixedPointConstantValue,
            });
        }
        debug_assert_eq!(loop_exit.condition.op(), ExitOp::Equals);

        // Zero exit: the end cell is zero when the loop exits, and holds
        // `final_delta` when the sweep comes back.
        let exit_count = incoming.num_exits_for_value(final_delta);
        if exit_count > 0 {
            // Exit-to-exit: the end cell keeps ending the sweep. All exits
            // for that value must be covered by the observed transition.
            if !loop_exit.condition.holds_for_value(final_delta) {
                return None;
            }
            return Some(if total_delta != 0 {
                SweepEndType::FixedPointMultipleValues
            } else {
                SweepEndType::FixedPointConstantValue
            });
        }

        // Exit-to-non-exit: the sequence grew by at least this cell.
        let to_exit_by_sweep = self.can_sweep_change_value_towards_zero(group_index, final_delta);
        let to_exit_by_loop_exit =
            self.can_loop_exit_change_value_to_exit(group_index, final_delta, program);

        if !to_exit_by_sweep && !to_exit_by_loop_exit {
            return Some(SweepEndType::SteadyGrowth);
        }
        if group.change_type == SweepValueChangeType::UniformChange {
            return Some(SweepEndType::IrregularGrowth);
        }
        if to_exit_by_sweep || !loop_exit.condition.holds_for_value(0) {
            return None;
        }
        // The loop exit could create exit values, but it always fires at the
        // leading zero first, so growth stays steady.
        Some(SweepEndType::SteadyGrowth)
    }

    // Checks whether changes left behind by some loop exit (plus the
    // transition) can turn the value into one that exits the sweep later.
    fn can_loop_exit_change_value_to_exit(
        &self,
        group_index: usize,
        value: i32,
        program: &InterpretedProgram,
    ) -> bool {
        let group = &self.groups[group_index];
        let incoming = &self.loops[group.incoming];
        let mut deltas = DataDeltas::new();

        for exit_instruction in incoming.anytime_exits() {
            incoming.collect_insweep_deltas_after_exit(program, exit_instruction, &mut deltas);
            for dd in group.transition.data_deltas().iter() {
                if dd.dp_offset() != 0 && (dd.dp_offset() < 0) == group.at_right {
                    deltas.update_delta(dd.dp_offset(), dd.delta());
                }
            }
            let can = deltas.iter().any(|dd| {
                incoming.value_change != dd.delta() && incoming.is_exit_value(value + dd.delta())
            });
            if can {
                return true;
            }
        }
        false
    }

    pub(crate) fn can_sweep_change_value_towards_zero(&self, group_index: usize, value: i32) -> bool {
        let group = &self.groups[group_index];
        if value == 0 || group.change_type == SweepValueChangeType::NoChange {
            return false;
        }
        self.loops[group.incoming].can_change_value_towards_zero(value)
            || self.loops[group.outgoing].can_change_value_towards_zero(value)
    }

    // Validates the transition's tape changes against the end type and the
    // sweep's own changes, and collects the outside-sweep delta signs.
    fn check_transition_deltas(&mut self, group_index: usize) -> bool {
        let group = &self.groups[group_index];
        let mut outside = DataDeltas::new();
        let mut inside_sign = group.inside_transition_delta_sign;

        for dd in group.transition.data_deltas().iter() {
            if dd.dp_offset() == 0 {
                continue;
            }
            let inside_sweep = (dd.dp_offset() < 0) == group.at_right;
            let sgn = sign(dd.delta());

            if inside_sweep {
                if group.change == 0 || group.change_type == SweepValueChangeType::NoChange {
                    // The sweep itself changes nothing; transition changes
                    // must at least agree among themselves.
                    if inside_sign != 0 && sgn != inside_sign {
                        return false;
                    }
                    inside_sign = sgn;
                } else if sgn == sign(group.change) {
                    // Amplifies the sweep's change.
                } else if group.change_type == SweepValueChangeType::UniformChange
                    && dd.delta().abs() <= group.change.abs()
                {
                    // Dampens the change without flipping its sign.
                } else {
                    return false;
                }
            } else {
                match group.end_type {
                    SweepEndType::FixedPointConstantValue
                    | SweepEndType::FixedPointMultipleValues
                    | SweepEndType::FixedPointIncreasingValue
                    | SweepEndType::FixedPointDecreasingValue => {
                        // All deltas at one offset must share a sign.
                        let existing = outside.delta_at(dd.dp_offset());
                        if existing == 0 {
                            outside.add_delta(dd.dp_offset(), sgn);
                        } else if existing != sgn {
                            return false;
                        }
                    }
                    SweepEndType::SteadyGrowth | SweepEndType::IrregularGrowth => {
                        // A growing end must leave the cells beyond it
                        // untouched, or the zeros-ahead argument breaks.
                        return false;
                    }
                    SweepEndType::FixedAperiodicAppendix => {
                        // Appendix cells are validated by the appendix scan.
                    }
                }
            }
        }

        let group = &mut self.groups[group_index];
        group.outside_deltas = outside;
        group.inside_transition_delta_sign = inside_sign;
        true
    }

    /// Locates the sweep end opposite to the current DP by scanning the
    /// tape. Returns the position of the other end, or `None` when a value
    /// on the way could move towards zero and end the sweep.
    pub(crate) fn scan_to_other_end(
        &self,
        cur_group_index: usize,
        data: &Data,
    ) -> Option<isize> {
        let cur_group = &self.groups[cur_group_index];
        let other_group = &self.groups[1 - cur_group_index];
        let other_incoming = &self.loops[other_group.incoming];
        let step: isize = if cur_group.at_right { -1 } else { 1 };

        let mut dp = data.dp() + step;
        loop {
            let v = data.value_at(dp);
            if v == 0 || other_incoming.is_exit_value(v) {
                return Some(dp);
            }
            if cur_group.change_type != SweepValueChangeType::NoChange
                && self.can_sweep_change_value_towards_zero(cur_group_index, v)
            {
                return None;
            }
            dp += step;
        }
    }

    /// The proof obligations of one end, given the end's tape position.
    pub(crate) fn group_proof(&self, group_index: usize, dp: isize, data: &Data) -> Trilian {
        let group = &self.groups[group_index];
        match group.end_type {
            SweepEndType::FixedPointIncreasingValue => {
                if data.value_at(dp) < 0 || !self.outside_deltas_move_away_from_zero(group, dp, data)
                {
                    return Trilian::Maybe;
                }
            }
            SweepEndType::FixedPointDecreasingValue => {
                if data.value_at(dp) > 0 || !self.outside_deltas_move_away_from_zero(group, dp, data)
                {
                    return Trilian::Maybe;
                }
            }
            SweepEndType::FixedPointConstantValue | SweepEndType::FixedPointMultipleValues => {
                if !self.outside_deltas_move_away_from_zero(group, dp, data) {
                    return Trilian::Maybe;
                }
            }
            SweepEndType::SteadyGrowth | SweepEndType::IrregularGrowth => {
                if !data.only_zeros_ahead(dp, group.at_right) {
                    return Trilian::Maybe;
                }
            }
            SweepEndType::FixedAperiodicAppendix => {
                // Proven by the irregular checker's appendix scan instead.
                return Trilian::Maybe;
            }
        }
        Trilian::Yes
    }

    fn outside_deltas_move_away_from_zero(
        &self,
        group: &TransitionGroup,
        dp: isize,
        data: &Data,
    ) -> bool {
        group.outside_deltas.iter().all(|dd| {
            let value = data.value_at(dp + dd.dp_offset() as isize);
            value == 0 || sign(dd.delta()) == sign(value)
        })
    }

    /// Index of the group whose end the data pointer is currently at, based
    /// on the loop that just finished.
    pub(crate) fn current_group(&self, state: &ExecutionState) -> Option<usize> {
        let last_id = state.run_summary.last_run_block().sequence_id();
        let cur = self
            .loops
            .iter()
            .position(|l| l.run_block_sequence_id == last_id)?;
        let at_right = self.loops[cur].analysis.dp_delta() > 0;
        self.groups.iter().position(|g| g.at_right == at_right)
    }

    /// Proves the sweep hang from the live tape: scan the full sweep body,
    /// then discharge both ends' obligations.
    pub fn proof_hang(&self, state: &ExecutionState) -> Trilian {
        let data = state.data;
        let Some(cur_group) = self.current_group(state) else {
            return Trilian::Maybe;
        };

        let dp0 = data.dp();
        let Some(dp1) = self.scan_to_other_end(cur_group, data) else {
            return Trilian::Maybe;
        };

        let r0 = self.group_proof(cur_group, dp0, data);
        let r1 = self.group_proof(1 - cur_group, dp1, data);
        if r0 == Trilian::Yes && r1 == Trilian::Yes {
            Trilian::Yes
        } else {
            Trilian::Maybe
        }
    }
}

// The combined change a full sweep applies to body cells. Fails when the
// loops make opposing changes that do not cancel out.
fn combine_sweep_value_change(
    incoming: &SweepLoop,
    outgoing: &SweepLoop,
) -> Option<(SweepValueChangeType, i32)> {
    use SweepValueChangeType::*;

    let (result_type, change) = if incoming.value_change_type == NoChange {
        (outgoing.value_change_type, outgoing.value_change)
    } else if outgoing.value_change_type == NoChange {
        (incoming.value_change_type, incoming.value_change)
    } else if incoming.value_change_type == UniformChange
        && outgoing.value_change_type == UniformChange
    {
        let change = incoming.value_change + outgoing.value_change;
        if change != 0 {
            (UniformChange, change)
        } else {
            (NoChange, 0)
        }
    } else if incoming.value_change_type != MultipleOpposingChanges
        && outgoing.value_change_type != MultipleOpposingChanges
        && sign(incoming.value_change) == sign(outgoing.value_change)
    {
        (
            MultipleAlignedChanges,
            incoming.value_change + outgoing.value_change,
        )
    } else {
        return None;
    };

    if (incoming.requires_fixed_input || outgoing.requires_fixed_input) && result_type != NoChange {
        // Changes by the loops must cancel out when either loop requires a
        // specific input value.
        return None;
    }

    Some((result_type, change))
}
