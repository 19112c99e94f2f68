//! Incremental summarization of a run history into run blocks.
//!
//! The summarizer watches a growing sequence of unit ids and groups it into
//! run blocks: plain sequences and loops, the latter found by
//! shortest-repeated-suffix matching. One summarizer type serves all levels;
//! the first level consumes program-block indices, the next level consumes
//! the sequence ids the first level emits, and so on.

use std::cell::RefCell;
use std::collections::HashMap;

/// Identifier of a run unit. First-level units are program-block indices;
/// higher-level units are run-block sequence ids.
pub type RunUnitId = u32;

/// Returns the smallest period `p > 0` such that the last `p` units repeat
/// the `p` units before them, or 0 when no such period exists.
///
/// Linear in the length of `units`, via a Z-array over the reversed sequence
/// kept in the caller-supplied helper buffer.
pub fn shortest_repeated_suffix(units: &[RunUnitId], helper: &mut Vec<usize>) -> usize {
    let n = units.len();
    if n < 2 {
        return 0;
    }

    let at = |i: usize| units[n - 1 - i];

    helper.clear();
    helper.resize(n, 0);
    helper[0] = n;

    let (mut l, mut r) = (0usize, 0usize);
    for i in 1..n {
        let mut k = if i < r { (r - i).min(helper[i - l]) } else { 0 };
        while i + k < n && at(k) == at(i + k) {
            k += 1;
        }
        helper[i] = k;
        if i + k > r {
            l = i;
            r = i + k;
        }
    }

    (1..=n / 2).find(|&p| helper[p] >= p).unwrap_or(0)
}

/// Computes the start index of the lexicographically least rotation of `s`
/// (Booth's algorithm).
fn least_rotation(s: &[RunUnitId]) -> usize {
    let n = s.len();
    if n <= 1 {
        return 0;
    }

    let mut f = vec![usize::MAX; 2 * n];
    let mut k = 0usize;
    for j in 1..2 * n {
        let sj = s[j % n];
        let mut i = f[j - k - 1];
        while i != usize::MAX && sj != s[(k + i + 1) % n] {
            if sj < s[(k + i + 1) % n] {
                k = j - i - 1;
            }
            i = f[i];
        }
        if i == usize::MAX && sj != s[k % n] {
            if sj < s[k % n] {
                k = j;
            }
            f[j - k] = usize::MAX;
        } else {
            f[j - k] = if i == usize::MAX { 0 } else { i + 1 };
        }
    }
    k % n
}

/// A contiguous range of run units, classified as a plain sequence or a loop.
#[derive(Debug, Clone, Copy, Eq)]
pub struct RunBlock {
    start_index: usize,
    sequence_id: u32,
    loop_period: usize,
}

impl RunBlock {
    /// Index into the unit history where this run block started.
    pub fn start_index(&self) -> usize {
        self.start_index
    }

    /// Canonical identifier of this run block. Two run blocks share an id
    /// iff their unit sequences are identical: the full sequence for plain
    /// blocks, one period for loops.
    pub fn sequence_id(&self) -> u32 {
        self.sequence_id
    }

    pub fn is_loop(&self) -> bool {
        self.loop_period != 0
    }

    /// Loop period in run units; zero for plain sequences.
    pub fn loop_period(&self) -> usize {
        self.loop_period
    }
}

impl PartialEq for RunBlock {
    fn eq(&self, other: &Self) -> bool {
        self.sequence_id == other.sequence_id
    }
}

// Node of the shared sequence trie. Child and sibling are indices into the
// node arena; zero means none (the root occupies index zero).
#[derive(Debug, Clone, Copy)]
struct SequenceNode {
    unit_id: RunUnitId,
    child: u32,
    sibling: u32,
}

#[derive(Debug, Clone, Copy)]
enum DetectorState {
    /// Scanning for a new loop; `pending` is the start of the tail that is
    /// not yet part of any run block.
    Scanning { pending: usize },
    /// Inside a recognized loop; `next` is the history index the next unit
    /// must match for the loop to continue.
    InLoop { next: usize },
}

/// Summarizes a unit history into run blocks.
#[derive(Debug)]
pub struct RunSummary {
    state: DetectorState,
    processed: usize,
    run_blocks: Vec<RunBlock>,
    nodes: Vec<SequenceNode>,
    // Memoized rotation-equivalence results, keyed by ordered sequence-id
    // pairs.
    rotation_cache: RefCell<HashMap<(u32, u32), (bool, usize)>>,
}

impl Default for RunSummary {
    fn default() -> Self {
        RunSummary::new()
    }
}

impl RunSummary {
    pub fn new() -> Self {
        RunSummary {
            state: DetectorState::Scanning { pending: 0 },
            processed: 0,
            run_blocks: Vec::new(),
            nodes: vec![SequenceNode {
                unit_id: 0,
                child: 0,
                sibling: 0,
            }],
            rotation_cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn reset(&mut self) {
        self.state = DetectorState::Scanning { pending: 0 };
        self.processed = 0;
        self.run_blocks.clear();
        self.nodes.truncate(1);
        self.nodes[0].child = 0;
        self.rotation_cache.borrow_mut().clear();
    }

    pub fn num_processed_units(&self) -> usize {
        self.processed
    }

    pub fn num_run_blocks(&self) -> usize {
        self.run_blocks.len()
    }

    pub fn run_block(&self, index: usize) -> &RunBlock {
        &self.run_blocks[index]
    }

    pub fn last_run_block(&self) -> &RunBlock {
        self.run_blocks.last().expect("no run blocks")
    }

    pub fn run_blocks(&self) -> &[RunBlock] {
        &self.run_blocks
    }

    pub fn is_inside_loop(&self) -> bool {
        matches!(self.state, DetectorState::InLoop { .. })
    }

    /// Loop period of the last run block, in run units.
    pub fn loop_period(&self) -> usize {
        self.last_run_block().loop_period()
    }

    /// Number of completed and partial iterations of the current loop.
    pub fn loop_iteration(&self) -> usize {
        debug_assert!(self.is_inside_loop());
        let last = self.last_run_block();
        (self.processed - last.start_index()) / last.loop_period()
    }

    /// True when the current loop just completed an iteration.
    pub fn is_at_end_of_loop(&self) -> bool {
        debug_assert!(self.is_inside_loop());
        let last = self.last_run_block();
        (self.processed - last.start_index()) % last.loop_period() == 0
    }

    /// True iff appending `unit` would continue the current loop.
    pub fn loop_continues(&self, history: &[RunUnitId], unit: RunUnitId) -> bool {
        match self.state {
            DetectorState::InLoop { next } => history[next] == unit,
            DetectorState::Scanning { .. } => false,
        }
    }

    /// The length in run units of the given run block. For the last block
    /// the not-yet-classified tail acts as its end.
    ///
    /// For loops this counts the repeated executions; the total does not
    /// have to be a multiple of the period, as a loop may break anywhere.
    pub fn run_block_length(&self, index: usize) -> usize {
        self.run_block_range_length(index, index + 1)
    }

    /// Total length in run units of the blocks `[start_index, end_index)`.
    pub fn run_block_range_length(&self, start_index: usize, end_index: usize) -> usize {
        let start = self.run_blocks[start_index].start_index();
        let end = if end_index == self.run_blocks.len() {
            match self.state {
                DetectorState::Scanning { pending } => pending,
                DetectorState::InLoop { .. } => self.processed,
            }
        } else {
            self.run_blocks[end_index].start_index()
        };
        end - start
    }

    /// Processes all units appended to the history since the previous call.
    /// Returns true when this created one or more run blocks.
    pub fn process_new_units(&mut self, history: &[RunUnitId], helper: &mut Vec<usize>) -> bool {
        let mut new_run_blocks = false;

        while self.processed < history.len() {
            let k = self.processed;
            match self.state {
                DetectorState::Scanning { pending } => {
                    let period = shortest_repeated_suffix(&history[pending..=k], helper);
                    if period > 0 {
                        let loop_start = k + 1 - 2 * period;
                        if loop_start != pending {
                            self.create_run_block(history, pending, loop_start, 0);
                        }
                        self.create_run_block(history, loop_start, loop_start + period, period);
                        self.state = DetectorState::InLoop { next: k + 1 - period };
                        new_run_blocks = true;
                    }
                }
                DetectorState::InLoop { next } => {
                    if history[next] == history[k] {
                        self.state = DetectorState::InLoop { next: next + 1 };
                    } else {
                        // The loop is broken.
                        self.state = DetectorState::Scanning { pending: k };
                    }
                }
            }
            self.processed += 1;
        }

        new_run_blocks
    }

    // Walks (and extends) the trie for `history[start..end]`; the terminal
    // node index becomes the sequence id. For loops the range covers exactly
    // one period.
    fn create_run_block(
        &mut self,
        history: &[RunUnitId],
        start: usize,
        end: usize,
        loop_period: usize,
    ) {
        let mut node = 0usize;
        for &unit in &history[start..end] {
            node = self.child_node(node, unit);
        }
        self.run_blocks.push(RunBlock {
            start_index: start,
            sequence_id: node as u32,
            loop_period,
        });
    }

    fn child_node(&mut self, parent: usize, unit_id: RunUnitId) -> usize {
        let new_node = SequenceNode {
            unit_id,
            child: 0,
            sibling: 0,
        };

        if self.nodes[parent].child == 0 {
            // This node does not yet have any children. Add the first.
            let index = self.nodes.len();
            self.nodes.push(new_node);
            self.nodes[parent].child = index as u32;
            return index;
        }

        let mut cur = self.nodes[parent].child as usize;
        loop {
            if self.nodes[cur].unit_id == unit_id {
                return cur;
            }
            if self.nodes[cur].sibling == 0 {
                let index = self.nodes.len();
                self.nodes.push(new_node);
                self.nodes[cur].sibling = index as u32;
                return index;
            }
            cur = self.nodes[cur].sibling as usize;
        }
    }

    /// Checks whether two loop run blocks execute the same cycle under some
    /// rotation. On success the offset satisfies
    /// `index1 = (index2 + offset) % period`.
    pub fn are_loops_rotation_equal(
        &self,
        history: &[RunUnitId],
        block1: usize,
        block2: usize,
    ) -> Option<usize> {
        let b1 = &self.run_blocks[block1];
        let b2 = &self.run_blocks[block2];
        if b1.sequence_id() == b2.sequence_id() {
            // Equal even without rotating.
            return Some(0);
        }
        debug_assert!(b1.is_loop() && b2.is_loop());
        let period = b1.loop_period();
        if period != b2.loop_period() {
            return None;
        }

        let key = (
            b1.sequence_id().min(b2.sequence_id()),
            b1.sequence_id().max(b2.sequence_id()),
        );
        if let Some(&(equal, offset)) = self.rotation_cache.borrow().get(&key) {
            return equal.then_some(offset);
        }

        let w1 = &history[b1.start_index()..b1.start_index() + period];
        let w2 = &history[b2.start_index()..b2.start_index() + period];
        let r1 = least_rotation(w1);
        let r2 = least_rotation(w2);
        let equal = (0..period).all(|i| w1[(r1 + i) % period] == w2[(r2 + i) % period]);
        let offset = (r1 + period - r2) % period;

        self.rotation_cache.borrow_mut().insert(key, (equal, offset));
        equal.then_some(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summarize(units: &[RunUnitId]) -> (RunSummary, Vec<RunUnitId>) {
        let mut summary = RunSummary::new();
        let mut helper = Vec::new();
        let history: Vec<RunUnitId> = units.to_vec();
        summary.process_new_units(&history, &mut helper);
        (summary, history)
    }

    // Checks the run blocks against (normalized sequence index, length)
    // pairs, mirroring how ids canonically identify repeated sequences.
    fn check_run_blocks(summary: &RunSummary, expected: &[(usize, usize)]) {
        assert!(summary.num_run_blocks() >= expected.len(), "summary too short");
        let mut id_map: HashMap<u32, usize> = HashMap::new();
        for (i, &(expected_id, expected_len)) in expected.iter().enumerate() {
            let block = summary.run_block(i);
            let next = id_map.len();
            let normalized = *id_map.entry(block.sequence_id()).or_insert(next);
            assert_eq!(normalized, expected_id, "sequence id of run block {i}");
            assert_eq!(summary.run_block_length(i), expected_len, "length of run block {i}");
        }
    }

    #[test]
    fn repeated_suffix_finds_smallest_period() {
        let mut helper = Vec::new();
        assert_eq!(shortest_repeated_suffix(&[1], &mut helper), 0);
        assert_eq!(shortest_repeated_suffix(&[1, 1], &mut helper), 1);
        assert_eq!(shortest_repeated_suffix(&[2, 1, 1], &mut helper), 1);
        assert_eq!(shortest_repeated_suffix(&[1, 2, 1, 2], &mut helper), 2);
        assert_eq!(shortest_repeated_suffix(&[1, 2, 1, 3], &mut helper), 0);
        assert_eq!(shortest_repeated_suffix(&[3, 1, 2, 1, 2], &mut helper), 2);
        // The suffix must end at the last element.
        assert_eq!(shortest_repeated_suffix(&[1, 1, 2], &mut helper), 0);
        // Smallest period wins even when larger ones also match.
        assert_eq!(shortest_repeated_suffix(&[1, 1, 1, 1], &mut helper), 1);
    }

    #[test]
    fn exhaustive_repeated_suffix_against_reference() {
        // All length-8 strings over a 2-symbol alphabet.
        let mut helper = Vec::new();
        for bits in 0u32..256 {
            let units: Vec<RunUnitId> = (0..8).map(|i| (bits >> i) & 1).collect();
            let expected = (1..=4)
                .find(|&p| units[8 - 2 * p..8 - p] == units[8 - p..8])
                .unwrap_or(0);
            assert_eq!(
                shortest_repeated_suffix(&units, &mut helper),
                expected,
                "units {units:?}"
            );
        }
    }

    #[test]
    fn single_unit_run_blocks() {
        // Each run block consists of a single unit kind.
        let (summary, _) = summarize(&[1, 3, 3, 3, 2, 5, 5, 5, 4, 3, 3, 3, 2, 5, 5, 5, 4, 3, 3, 3]);
        check_run_blocks(
            &summary,
            &[(0, 1), (1, 3), (2, 1), (3, 3), (4, 1), (1, 3), (2, 1), (3, 3), (4, 1), (1, 3)],
        );
    }

    #[test]
    fn starts_with_loop() {
        let (summary, _) = summarize(&[1, 1, 1, 0, 3, 3, 3, 2, 1, 1, 1, 0, 3, 3, 3, 2, 1, 1, 1]);
        check_run_blocks(
            &summary,
            &[(0, 3), (1, 1), (2, 3), (3, 1), (0, 3), (1, 1), (2, 3), (3, 1), (0, 3)],
        );
    }

    #[test]
    fn multi_unit_loop() {
        let (summary, _) = summarize(&[1, 3, 5, 7, 5, 7, 4, 5, 7, 5, 7, 4]);
        check_run_blocks(&summary, &[(0, 2), (1, 4), (2, 1), (1, 4)]);
    }

    #[test]
    fn loop_with_premature_exit() {
        // The loop breaks mid-iteration; its length is not a multiple of the
        // period.
        let (summary, _) = summarize(&[1, 3, 5, 7, 5, 7, 5, 6, 5, 7, 5, 7, 5, 6]);
        check_run_blocks(&summary, &[(0, 2), (1, 5), (2, 1), (1, 5)]);
    }

    #[test]
    fn switch_between_multi_unit_blocks() {
        let (summary, _) = summarize(&[1, 3, 5, 5, 5, 4, 7, 9, 3, 5, 5, 5, 4, 7, 9, 3, 5, 5, 5]);
        check_run_blocks(&summary, &[(0, 2), (1, 3), (2, 4), (1, 3), (2, 4), (1, 3)]);
    }

    #[test]
    fn incremental_processing_matches_bulk() {
        let units: Vec<RunUnitId> = vec![1, 3, 5, 7, 5, 7, 4, 5, 7, 5, 7, 4, 1, 1, 1, 2, 5, 7, 5, 7];

        let (bulk, _) = summarize(&units);

        let mut incremental = RunSummary::new();
        let mut helper = Vec::new();
        let mut history = Vec::new();
        for &u in &units {
            history.push(u);
            incremental.process_new_units(&history, &mut helper);
        }

        assert_eq!(bulk.num_run_blocks(), incremental.num_run_blocks());
        for i in 0..bulk.num_run_blocks() {
            assert_eq!(bulk.run_block(i).sequence_id(), incremental.run_block(i).sequence_id());
            assert_eq!(bulk.run_block(i).start_index(), incremental.run_block(i).start_index());
            assert_eq!(bulk.run_block(i).loop_period(), incremental.run_block(i).loop_period());
            assert_eq!(bulk.run_block_length(i), incremental.run_block_length(i));
        }
    }

    #[test]
    fn loop_iteration_and_end_of_loop() {
        let mut summary = RunSummary::new();
        let mut helper = Vec::new();
        let mut history: Vec<RunUnitId> = vec![9, 5, 7, 5, 7];
        summary.process_new_units(&history, &mut helper);

        assert!(summary.is_inside_loop());
        assert_eq!(summary.loop_period(), 2);
        assert_eq!(summary.loop_iteration(), 2);
        assert!(summary.is_at_end_of_loop());
        assert!(summary.loop_continues(&history, 5));
        assert!(!summary.loop_continues(&history, 7));

        history.push(5);
        summary.process_new_units(&history, &mut helper);
        assert!(!summary.is_at_end_of_loop());
        assert_eq!(summary.loop_iteration(), 2);
    }

    #[test]
    fn rotation_equivalence_of_loops() {
        // Two loops over the same cycle, entered at different phases.
        let (summary, history) = summarize(&[5, 7, 9, 5, 7, 9, 2, 7, 9, 5, 7, 9, 5, 8]);
        // Blocks: loop [5 7 9]*2, seq [2], loop [7 9 5]*2, seq-pending.
        assert!(summary.num_run_blocks() >= 3);
        let b0 = summary.run_block(0);
        let b2 = summary.run_block(2);
        assert!(b0.is_loop() && b2.is_loop());
        assert_ne!(b0.sequence_id(), b2.sequence_id());

        let offset = summary.are_loops_rotation_equal(&history, 0, 2);
        assert!(offset.is_some());
        // index1 = (index2 + offset) % period: unit at index 0 of loop 1 (5)
        // appears at index 2 of loop 2.
        assert_eq!(offset, Some(1));

        // Cached result is identical.
        assert_eq!(summary.are_loops_rotation_equal(&history, 0, 2), Some(1));
    }

    #[test]
    fn rotation_inequivalence() {
        let (summary, history) = summarize(&[5, 7, 5, 7, 2, 5, 8, 5, 8, 5, 9]);
        let b0 = summary.run_block(0);
        let b2 = summary.run_block(2);
        assert!(b0.is_loop() && b2.is_loop());
        assert_eq!(summary.are_loops_rotation_equal(&history, 0, 2), None);
    }
}
