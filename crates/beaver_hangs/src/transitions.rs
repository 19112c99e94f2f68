//! Observed transitions between run blocks.
//!
//! Tracks which run block (by sequence id) followed which, with a bounded
//! number of destinations per source. Used by sweep and glider diagnostics;
//! never for soundness.

use std::collections::HashMap;

use crate::run_summary::RunSummary;

#[derive(Debug, Clone, Copy)]
pub struct Transition {
    pub count: u32,
    pub last_occurrence: usize,
}

#[derive(Debug, Clone, Default)]
struct Destinations {
    dest_nodes: Vec<(u32, Transition)>,
}

/// Records (source sequence id → destination sequence id) transitions.
#[derive(Debug)]
pub struct RunBlockTransitions {
    transitions: HashMap<u32, Destinations>,
    // The maximum number of destinations maintained per source. On overflow
    // the least recently observed destination is dropped.
    max_destinations_per_node: usize,
    num_transitions: usize,
}

impl Default for RunBlockTransitions {
    fn default() -> Self {
        RunBlockTransitions::new()
    }
}

impl RunBlockTransitions {
    pub fn new() -> Self {
        RunBlockTransitions {
            transitions: HashMap::new(),
            max_destinations_per_node: 4,
            num_transitions: 0,
        }
    }

    pub fn set_max_destinations_per_node(&mut self, value: usize) {
        assert!(value > 0);
        self.max_destinations_per_node = value;
    }

    pub fn reset(&mut self) {
        self.transitions.clear();
        self.num_transitions = 0;
    }

    pub fn num_transitions(&self) -> usize {
        self.num_transitions
    }

    /// The recorded transition from `src` to `dst`, if still tracked.
    pub fn transition(&self, src: u32, dst: u32) -> Option<Transition> {
        self.transitions
            .get(&src)?
            .dest_nodes
            .iter()
            .find(|(id, _)| *id == dst)
            .map(|&(_, t)| t)
    }

    /// Number of distinct destinations currently tracked for `src`.
    pub fn num_destinations(&self, src: u32) -> usize {
        self.transitions.get(&src).map_or(0, |d| d.dest_nodes.len())
    }

    /// Records the transitions between all newly finalized adjacent run-block
    /// pairs. The last run block is still open and not yet a source.
    pub fn process_new_run_blocks(&mut self, summary: &RunSummary) {
        let target = summary.num_run_blocks().saturating_sub(1);
        while self.num_transitions < target {
            let src = summary.run_block(self.num_transitions).sequence_id();
            let dst = summary.run_block(self.num_transitions + 1).sequence_id();
            self.add_transition(src, dst);
        }
    }

    fn add_transition(&mut self, src: u32, dst: u32) {
        self.num_transitions += 1;
        let dests = self.transitions.entry(src).or_default();

        if let Some((_, t)) = dests.dest_nodes.iter_mut().find(|(id, _)| *id == dst) {
            // A known transition. Update its occurrence trace.
            t.count += 1;
            t.last_occurrence = self.num_transitions;
            return;
        }

        dests.dest_nodes.push((
            dst,
            Transition {
                count: 1,
                last_occurrence: self.num_transitions,
            },
        ));

        if dests.dest_nodes.len() > self.max_destinations_per_node {
            // Drop the least recently observed destination.
            let evict = dests
                .dest_nodes
                .iter()
                .enumerate()
                .min_by_key(|(_, (_, t))| t.last_occurrence)
                .map(|(i, _)| i)
                .unwrap();
            dests.dest_nodes.swap_remove(evict);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run_summary::RunUnitId;

    fn summary_for(units: &[RunUnitId]) -> RunSummary {
        let mut summary = RunSummary::new();
        let mut helper = Vec::new();
        summary.process_new_units(&units.to_vec(), &mut helper);
        summary
    }

    #[test]
    fn records_adjacent_pairs() {
        // Blocks: [1 3] [5]* [4] [5]* ...
        let summary = summary_for(&[1, 3, 5, 5, 5, 4, 5, 5, 5, 4, 5, 5]);
        let mut transitions = RunBlockTransitions::new();
        transitions.process_new_run_blocks(&summary);

        let seq = summary.run_block(0).sequence_id();
        let lp = summary.run_block(1).sequence_id();
        let mid = summary.run_block(2).sequence_id();

        assert_eq!(transitions.transition(seq, lp).unwrap().count, 1);
        assert_eq!(transitions.transition(lp, mid).unwrap().count, 2);
        assert_eq!(transitions.transition(mid, lp).unwrap().count, 2);
        assert!(transitions.transition(seq, mid).is_none());
    }

    #[test]
    fn processing_is_incremental() {
        let units: Vec<RunUnitId> = vec![1, 3, 5, 5, 5, 4, 5, 5, 5, 4, 5, 5];
        let mut summary = RunSummary::new();
        let mut helper = Vec::new();
        let mut transitions = RunBlockTransitions::new();

        let mut history = Vec::new();
        for &u in &units {
            history.push(u);
            if summary.process_new_units(&history, &mut helper) {
                transitions.process_new_run_blocks(&summary);
            }
        }

        let mut bulk = RunBlockTransitions::new();
        bulk.process_new_run_blocks(&summary);
        assert_eq!(transitions.num_transitions(), bulk.num_transitions());
    }

    #[test]
    fn evicts_least_recently_observed_destination() {
        let mut transitions = RunBlockTransitions::new();
        transitions.set_max_destinations_per_node(2);

        transitions.add_transition(1, 10);
        transitions.add_transition(1, 11);
        transitions.add_transition(1, 10);
        transitions.add_transition(1, 12);

        assert_eq!(transitions.num_destinations(1), 2);
        // 11 was observed least recently and got evicted.
        assert!(transitions.transition(1, 11).is_none());
        assert_eq!(transitions.transition(1, 10).unwrap().count, 2);
        assert_eq!(transitions.transition(1, 12).unwrap().count, 1);
    }
}
