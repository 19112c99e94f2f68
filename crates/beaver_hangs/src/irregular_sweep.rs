//! Irregular sweep hang detection.
//!
//! A sweep whose one end grows a-periodically: the end region acts as a
//! binary counter ("appendix") of in-sweep exit and toggle values. The sweep
//! alternates between flipping appendix cells (a meta-loop) and extending the
//! appendix (a plain transition), which shows up as a period-2 loop in the
//! meta-meta-run summary.

use crate::executor::ExecutionState;
use crate::meta_loop::{MetaLoopAnalysis, MetaLoopType};
use crate::sweep::{SweepHangChecker, SweepValueChangeType};
use crate::types::Trilian;

fn sign(v: i32) -> i32 {
    v.signum()
}

#[derive(Debug, Default)]
pub struct IrregularSweepHangChecker {
    base: SweepHangChecker,
    irregular_at_right: bool,
    /// The appendix value that ends the sweep inside the appendix.
    insweep_exit: i32,
    /// The appendix value the sweep passes without exiting, and converts
    /// into an exit value for a later sweep.
    insweep_toggle: i32,
    /// Tape position where the appendix attaches to the sweep body.
    appendix_start: isize,
}

// The meta-meta-run summary must show a period-2 loop: the in-appendix
// meta-loop alternating with a plain appendix-extending transition.
fn check_meta_meta_loop(state: &ExecutionState) -> bool {
    let meta_meta = state.meta_meta_run_summary;
    if !meta_meta.is_inside_loop() {
        return false;
    }
    let meta_meta_block = meta_meta.last_run_block();
    if meta_meta_block.loop_period() != 2 {
        return false;
    }

    let mut num_meta_loops = 0;
    for i in 0..2 {
        let index = meta_meta_block.start_index() + i;
        let meta_block = state.meta_run_summary.run_block(index);
        if meta_block.is_loop() {
            num_meta_loops += 1;
        } else if state.meta_run_summary.run_block_length(index) > 2 {
            // The extending transition should be plain; it may contain at
            // most one loop, e.g. a differently-phased return sweep.
            return false;
        }
    }
    num_meta_loops == 1
}

impl IrregularSweepHangChecker {
    pub fn new() -> Self {
        IrregularSweepHangChecker::default()
    }

    pub fn irregular_at_right(&self) -> bool {
        self.irregular_at_right
    }

    pub fn insweep_exit(&self) -> i32 {
        self.insweep_exit
    }

    pub fn insweep_toggle(&self) -> i32 {
        self.insweep_toggle
    }

    pub fn appendix_start(&self) -> isize {
        self.appendix_start
    }

    pub fn init(&mut self, mla: &MetaLoopAnalysis, state: &ExecutionState) -> bool {
        if mla.meta_loop_type() != MetaLoopType::Irregular {
            return false;
        }
        if !check_meta_meta_loop(state) {
            return false;
        }
        if !self.find_irregular_end(mla) {
            return false;
        }
        if !self
            .base
            .init_with_irregular_end(mla, state, Some(self.irregular_at_right))
        {
            return false;
        }
        if !self.determine_insweep_exit() {
            return false;
        }
        if !self.determine_insweep_toggle() {
            return false;
        }
        if !self.determine_appendix_start(mla, state) {
            return false;
        }

        true
    }

    // Exactly one end may grow irregularly, and every sweep arriving there
    // must do so irregularly.
    fn find_irregular_end(&mut self, mla: &MetaLoopAnalysis) -> bool {
        let mut irregular_end = None;
        for behavior in mla.loop_behaviors() {
            if !behavior.is_sweep_loop() {
                continue;
            }
            let arrives_right = behavior.loop_analysis().dp_delta() > 0;
            if behavior.end_dp_growth().is_some() {
                continue;
            }
            match irregular_end {
                None => irregular_end = Some(arrives_right),
                Some(end) if end != arrives_right => return false,
                _ => {}
            }
        }
        match irregular_end {
            Some(at_right) => {
                self.irregular_at_right = at_right;
                true
            }
            None => false,
        }
    }

    // The incoming loop of the irregular end must have exactly two anytime
    // exits: one on zero (which extends the appendix) and one on a single
    // non-zero value (which ends the sweep inside the appendix).
    fn determine_insweep_exit(&mut self) -> bool {
        let group_index = self.irregular_group();
        let incoming = &self.base.loops[self.base.groups[group_index].incoming];
        if incoming.requires_fixed_input() {
            return false;
        }

        let mut exits_on_zero = false;
        let mut insweep_exit = None;
        for (value, _) in incoming.exit_values() {
            if value == 0 {
                exits_on_zero = true;
            } else if insweep_exit.is_some() && insweep_exit != Some(value) {
                return false;
            } else {
                insweep_exit = Some(value);
            }
        }

        match (exits_on_zero, insweep_exit) {
            (true, Some(value)) => {
                self.insweep_exit = value;
                true
            }
            _ => false,
        }
    }

    // A toggle value becomes an in-sweep exit after one sweep pass. It is
    // derived from the sweep's own combined change, which must be uniform;
    // transition deltas are not reliable under irregular sweeping.
    fn determine_insweep_toggle(&mut self) -> bool {
        let group = &self.base.groups[self.irregular_group()];
        if group.change_type != SweepValueChangeType::UniformChange {
            return false;
        }
        let toggle = self.insweep_exit - group.change;
        if toggle == 0 || toggle == self.insweep_exit {
            return false;
        }
        self.insweep_toggle = toggle;
        true
    }

    // The appendix start is the shallowest point from which the outgoing
    // loop departed the irregular end, over the last two analysis windows.
    fn determine_appendix_start(
        &mut self,
        mla: &MetaLoopAnalysis,
        state: &ExecutionState,
    ) -> bool {
        let rs = state.run_summary;
        let n = rs.num_run_blocks();
        let count = (2 * mla.loop_size()).min(n);
        let outgoing_id =
            self.base.loops[self.base.groups[self.irregular_group()].outgoing].run_block_sequence_id;

        let mut dp = state.data.dp();
        let mut extreme: Option<isize> = None;
        for index in (n - count..n).rev() {
            let rb = rs.run_block(index);
            let start = rb.start_index();
            let end = start + rs.run_block_length(index);
            let dp_delta: i32 = state.run_history[start..end]
                .iter()
                .map(|&bi| {
                    let b = state.program.block(bi as usize);
                    if b.is_shift() {
                        b.amount()
                    } else {
                        0
                    }
                })
                .sum();
            dp -= dp_delta as isize;

            if rb.sequence_id() == outgoing_id {
                extreme = Some(match extreme {
                    None => dp,
                    Some(e) => {
                        if self.irregular_at_right {
                            e.min(dp)
                        } else {
                            e.max(dp)
                        }
                    }
                });
            }
        }

        match extreme {
            Some(dp) => {
                self.appendix_start = dp;
                true
            }
            None => false,
        }
    }

    fn irregular_group(&self) -> usize {
        self.base
            .groups
            .iter()
            .position(|g| g.at_right == self.irregular_at_right)
            .unwrap()
    }

    /// Proves the irregular sweep hang from the live tape. The appendix must
    /// consist only of in-sweep exits, toggles and pollution that stays away
    /// from zero (plus one zero at the current DP); the body and the regular
    /// end are checked like a regular sweep.
    pub fn proof_hang(&self, state: &ExecutionState) -> Trilian {
        if !check_meta_meta_loop(state) {
            return Trilian::Maybe;
        }

        let data = state.data;
        let at_right = self.irregular_at_right;
        let step: isize = if at_right { 1 } else { -1 };

        // The check only concludes when DP is inside the appendix.
        if (at_right && data.dp() < self.appendix_start)
            || (!at_right && data.dp() > self.appendix_start)
        {
            return Trilian::Maybe;
        }

        // Scan the appendix.
        let bound = if at_right {
            data.max_bound()
        } else {
            data.min_bound()
        };
        let mut p = self.appendix_start;
        while (at_right && p <= bound) || (!at_right && p >= bound) {
            let v = data.value_at(p);
            if v != self.insweep_exit && v != self.insweep_toggle {
                if v == 0 {
                    // Only the just-zeroed in-sweep exit under DP may be
                    // zero inside the appendix.
                    if p != data.dp() {
                        return Trilian::Maybe;
                    }
                } else if sign(v) != sign(self.insweep_exit) {
                    return Trilian::Maybe;
                }
            }
            p += step;
        }

        // Scan the body towards the regular end.
        let irregular_group = self.irregular_group();
        let body_group = 1 - irregular_group;
        let body_incoming = &self.base.loops[self.base.groups[body_group].incoming];
        let mut dp_body = self.appendix_start - step;
        loop {
            let v = data.value_at(dp_body);
            if v == 0 || body_incoming.is_exit_value(v) {
                break;
            }
            if self.base.groups[body_group].change_type != SweepValueChangeType::NoChange
                && self.base.can_sweep_change_value_towards_zero(body_group, v)
            {
                return Trilian::Maybe;
            }
            dp_body -= step;
        }

        match self.base.group_proof(body_group, dp_body, data) {
            Trilian::Yes => Trilian::Yes,
            _ => Trilian::Maybe,
        }
    }
}
