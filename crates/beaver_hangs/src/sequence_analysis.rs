//! Analysis of a fixed sequence of program blocks.
//!
//! A single forward pass derives the net data-pointer shift, the net tape
//! changes, the per-step effective result, and the pre-conditions the tape
//! must satisfy for the sequence to run to completion.

use std::collections::BTreeMap;

use crate::blocks::InterpretedProgram;
use crate::data_deltas::{DataDelta, DataDeltas};
use crate::run_summary::RunUnitId;

/// A constraint on the tape value at some offset, relative to the data
/// pointer at the start of the sequence.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct PreCondition {
    value: i32,
    should_equal: bool,
}

impl PreCondition {
    pub fn new(value: i32, should_equal: bool) -> Self {
        PreCondition {
            value,
            should_equal,
        }
    }

    pub fn value(&self) -> i32 {
        self.value
    }

    pub fn should_equal(&self) -> bool {
        self.should_equal
    }

    pub fn holds_for_value(&self, value: i32) -> bool {
        self.should_equal == (value == self.value)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SequenceAnalysis {
    dp_delta: i32,
    min_dp: i32,
    max_dp: i32,

    // The net effect of executing the sequence once.
    data_deltas: DataDeltas,

    // The result after each instruction: how much DP has shifted from the
    // start, and the cumulative change of the value DP now points at.
    effective_result: Vec<DataDelta>,

    // Conditions that must hold for the sequence to be fully executed,
    // keyed by DP offset. An `== v` entry subsumes any other constraint at
    // the same offset; multiple `!= v` entries are kept as a set.
    pre_conditions: BTreeMap<i32, Vec<PreCondition>>,

    block_indices: Vec<RunUnitId>,
}

impl SequenceAnalysis {
    pub fn new() -> Self {
        SequenceAnalysis::default()
    }

    pub fn sequence_size(&self) -> usize {
        self.block_indices.len()
    }

    pub fn dp_delta(&self) -> i32 {
        self.dp_delta
    }

    /// Lowest DP position read during execution, relative to the initial DP.
    pub fn min_dp(&self) -> i32 {
        self.min_dp
    }

    /// Highest DP position read during execution, relative to the initial DP.
    pub fn max_dp(&self) -> i32 {
        self.max_dp
    }

    pub fn data_deltas(&self) -> &DataDeltas {
        &self.data_deltas
    }

    pub fn effective_result_at(&self, index: usize) -> DataDelta {
        self.effective_result[index]
    }

    pub fn pre_conditions(&self) -> &BTreeMap<i32, Vec<PreCondition>> {
        &self.pre_conditions
    }

    pub fn has_pre_condition(&self, dp_offset: i32, pc: PreCondition) -> bool {
        self.pre_conditions
            .get(&dp_offset)
            .is_some_and(|v| v.contains(&pc))
    }

    pub fn block_indices(&self) -> &[RunUnitId] {
        &self.block_indices
    }

    fn add_pre_condition(&mut self, dp_offset: i32, pc: PreCondition) {
        let entry = self.pre_conditions.entry(dp_offset).or_default();
        if let Some(first) = entry.first() {
            if pc.should_equal {
                if first.should_equal {
                    // Already constrained to a single value.
                    debug_assert_eq!(first.value, pc.value);
                    return;
                }
                // The equality constraint replaces all inequality constraints.
                entry.clear();
            } else {
                if first.should_equal {
                    // A stricter constraint already exists.
                    debug_assert_ne!(first.value, pc.value);
                    return;
                }
                if entry.iter().any(|c| c.value == pc.value) {
                    return;
                }
            }
        }
        entry.push(pc);
    }

    /// Analyzes the given blocks. The analysis always completes.
    pub fn analyze_sequence(
        &mut self,
        program: &InterpretedProgram,
        block_indices: &[RunUnitId],
    ) -> bool {
        self.dp_delta = 0;
        self.data_deltas.clear();
        self.effective_result.clear();
        self.pre_conditions.clear();
        self.block_indices = block_indices.to_vec();

        // DP position zero only counts towards the range when the first
        // instruction reads it.
        self.min_dp = match block_indices.first() {
            Some(&bi) if program.block(bi as usize).is_shift() => {
                program.block(bi as usize).amount()
            }
            _ => 0,
        };
        self.max_dp = self.min_dp;

        let mut prev: Option<usize> = None;
        for &bi in block_indices {
            let bi = bi as usize;
            let pb = program.block(bi);

            if let Some(prev_index) = prev {
                let should_equal = program.block(prev_index).zero_block() == Some(bi);
                let pc = PreCondition::new(-self.data_deltas.delta_at(self.dp_delta), should_equal);
                self.add_pre_condition(self.dp_delta, pc);
            }
            prev = Some(bi);

            let amount = pb.amount();
            if pb.is_delta() {
                let effective = self.data_deltas.update_delta(self.dp_delta, amount);
                self.effective_result
                    .push(DataDelta::new(self.dp_delta, effective));
            } else {
                self.dp_delta += amount;
                self.min_dp = self.min_dp.min(self.dp_delta);
                self.max_dp = self.max_dp.max(self.dp_delta);
                self.effective_result.push(DataDelta::new(
                    self.dp_delta,
                    self.data_deltas.delta_at(self.dp_delta),
                ));
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INC: bool = true;
    const MOV: bool = false;
    const STEPS: usize = 1;

    #[test]
    fn net_effect_of_plain_sequence() {
        // INC 2; MOV 1; INC -3; MOV 1
        let mut p = InterpretedProgram::new(5);
        p.finalize(0, INC, 2, STEPS, 4, 1);
        p.finalize(1, MOV, 1, STEPS, 2, 4);
        p.finalize(2, INC, -3, STEPS, 3, 4);
        p.finalize(3, MOV, 1, STEPS, 4, 4);
        p.finalize_exit(4, STEPS);

        let mut sa = SequenceAnalysis::new();
        assert!(sa.analyze_sequence(&p, &[0, 1, 2, 3]));

        assert_eq!(sa.dp_delta(), 2);
        assert_eq!((sa.min_dp(), sa.max_dp()), (0, 2));
        assert_eq!(sa.data_deltas().delta_at(0), 2);
        assert_eq!(sa.data_deltas().delta_at(1), -3);
        assert_eq!(sa.data_deltas().delta_at(2), 0);
        assert_eq!(sa.effective_result_at(0), DataDelta::new(0, 2));
        assert_eq!(sa.effective_result_at(2), DataDelta::new(1, -3));
        assert_eq!(sa.effective_result_at(3), DataDelta::new(2, 0));
    }

    #[test]
    fn pre_conditions_follow_taken_branches() {
        // INC 1 --nz--> MOV 1 --z--> INC 1
        let mut p = InterpretedProgram::new(4);
        p.finalize(0, INC, 1, STEPS, 3, 1);
        p.finalize(1, MOV, 1, STEPS, 2, 3);
        p.finalize(2, INC, 1, STEPS, 3, 3);
        p.finalize_exit(3, STEPS);

        let mut sa = SequenceAnalysis::new();
        assert!(sa.analyze_sequence(&p, &[0, 1, 2]));

        // Block 1 executed via block 0's non-zero branch: value at offset 0
        // must differ from -1 (it reads 0 after one increment means -1 start).
        assert!(sa.has_pre_condition(0, PreCondition::new(-1, false)));
        // Block 2 executed via block 1's zero branch: value at offset 1 must
        // equal 0.
        assert!(sa.has_pre_condition(1, PreCondition::new(0, true)));
    }

    #[test]
    fn equality_condition_subsumes_inequalities() {
        let mut sa = SequenceAnalysis::new();
        sa.add_pre_condition(0, PreCondition::new(1, false));
        sa.add_pre_condition(0, PreCondition::new(2, false));
        sa.add_pre_condition(0, PreCondition::new(2, false));
        assert_eq!(sa.pre_conditions()[&0].len(), 2);

        sa.add_pre_condition(0, PreCondition::new(0, true));
        assert_eq!(sa.pre_conditions()[&0], vec![PreCondition::new(0, true)]);

        // Further inequalities are subsumed by the equality.
        sa.add_pre_condition(0, PreCondition::new(5, false));
        assert_eq!(sa.pre_conditions()[&0].len(), 1);
    }

    #[test]
    fn replay_matches_analysis() {
        // A short travelling snippet: INC -1; MOV 1; INC 2; MOV 1
        let mut p = InterpretedProgram::new(5);
        p.finalize(0, INC, -1, STEPS, 4, 1);
        p.finalize(1, MOV, 1, STEPS, 2, 4);
        p.finalize(2, INC, 2, STEPS, 4, 3);
        p.finalize(3, MOV, 1, STEPS, 4, 4);
        p.finalize_exit(4, STEPS);

        let mut sa = SequenceAnalysis::new();
        assert!(sa.analyze_sequence(&p, &[0, 1, 2, 3]));

        // Replay on a zeroed tape from dp = 0.
        let mut tape = std::collections::HashMap::new();
        let mut dp = 0i32;
        for &bi in &[0usize, 1, 2, 3] {
            let b = p.block(bi);
            if b.is_delta() {
                *tape.entry(dp).or_insert(0) += b.amount();
            } else {
                dp += b.amount();
            }
        }

        assert_eq!(dp, sa.dp_delta());
        for offset in -2..4 {
            assert_eq!(
                tape.get(&offset).copied().unwrap_or(0),
                sa.data_deltas().delta_at(offset),
                "offset {offset}"
            );
        }
    }
}
