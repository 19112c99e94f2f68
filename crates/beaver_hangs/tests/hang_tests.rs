//! End-to-end hang detection scenarios, driven through the executor with
//! block-level programs.

use beaver_hangs::blocks::InterpretedProgram;
use beaver_hangs::executor::HangExecutor;
use beaver_hangs::types::{HangType, RunResult};

const INC: bool = true;
const MOV: bool = false;
const STEPS: usize = 1;
const MAX_BLOCKS: usize = 16;
const EXIT: usize = MAX_BLOCKS - 1;

fn program() -> InterpretedProgram {
    let mut p = InterpretedProgram::new(MAX_BLOCKS);
    p.finalize_exit(EXIT, STEPS);
    p
}

fn executor() -> HangExecutor {
    let mut executor = HangExecutor::new(1000, 20000);
    executor.set_max_steps(20000);
    executor.add_default_hang_detectors();
    executor
}

#[test]
fn travelling_loop_hangs_periodically() {
    // A single decrement travelling right over a zeroed tape never exits.
    let mut p = program();
    p.finalize(0, INC, -1, STEPS, EXIT, 1);
    p.finalize(1, MOV, 1, STEPS, 0, EXIT);

    let mut executor = executor();
    assert_eq!(executor.execute(&p), RunResult::DetectedHang);
    assert_eq!(executor.detected_hang_type(), Some(HangType::Periodic));
}

#[test]
fn stationary_counter_reaches_zero() {
    // Counter starts at -3 and is incremented towards zero: terminates.
    let mut p = program();
    p.finalize(0, INC, -3, STEPS, EXIT, 1);
    p.finalize(1, INC, 1, STEPS, EXIT, 1);

    let mut executor = executor();
    assert_eq!(executor.execute(&p), RunResult::Success);
    assert_eq!(executor.num_steps(), 5);
    assert_eq!(executor.detected_hang_type(), None);
}

#[test]
fn stationary_counter_runs_away() {
    // Counter starts at zero and moves away from its exit value.
    let mut p = program();
    p.finalize(0, INC, 1, STEPS, EXIT, 0);

    let mut executor = executor();
    assert_eq!(executor.execute(&p), RunResult::DetectedHang);
    assert_eq!(executor.detected_hang_type(), Some(HangType::Periodic));
}

#[test]
fn fixed_loops_hang_meta_periodically() {
    // A two-iteration countdown refilled by a constant bump: the meta-run
    // pattern repeats with fixed loop lengths.
    let mut p = program();
    p.finalize(0, INC, 2, STEPS, EXIT, 1);
    p.finalize(1, INC, -1, STEPS, 0, 1);

    let mut executor = executor();
    assert_eq!(executor.execute(&p), RunResult::DetectedHang);
    assert_eq!(executor.detected_hang_type(), Some(HangType::MetaPeriodic));
}

#[test]
fn simple_glider_hangs() {
    // Bootstrap seeds the first counter; the loop drains the current
    // counter while growing the next one; the transition hops onto it.
    let mut p = program();
    p.finalize(0, INC, 1, STEPS, EXIT, 1);
    p.finalize(1, MOV, 1, STEPS, 2, EXIT);
    // Main loop
    p.finalize(2, INC, 1, STEPS, EXIT, 3);
    p.finalize(3, MOV, -1, STEPS, EXIT, 4);
    p.finalize(4, INC, -1, STEPS, 6, 5);
    p.finalize(5, MOV, 1, STEPS, EXIT, 2);
    // Transition
    p.finalize(6, MOV, 2, STEPS, 7, EXIT);
    p.finalize(7, INC, 1, STEPS, EXIT, 2);

    let mut executor = executor();
    assert_eq!(executor.execute(&p), RunResult::DetectedHang);
    assert_eq!(
        executor.detected_hang_type(),
        Some(HangType::AperiodicGlider)
    );
}

#[test]
fn terminating_glider_eventually_exits() {
    // Same glider shape, but the transition under-seeds the next counter,
    // so the iteration counts shrink until the loop exits at its shift.
    let mut p = program();
    p.finalize(0, INC, 6, STEPS, EXIT, 1);
    p.finalize(1, MOV, 1, STEPS, 2, EXIT);
    // Main loop
    p.finalize(2, INC, 1, STEPS, EXIT, 3);
    p.finalize(3, MOV, -1, STEPS, EXIT, 4);
    p.finalize(4, INC, -1, STEPS, 6, 5);
    p.finalize(5, MOV, 1, STEPS, EXIT, 2);
    // Transition
    p.finalize(6, MOV, 2, STEPS, 7, EXIT);
    p.finalize(7, INC, -2, STEPS, EXIT, 2);

    let mut executor = executor();
    assert_eq!(executor.execute(&p), RunResult::Success);
    assert_eq!(executor.detected_hang_type(), None);
}

#[test]
fn anchored_sweep_hangs() {
    // A leftward move loop, a bump extending the body at the left, and a
    // rightward move loop returning to the anchored right end.
    let mut p = program();
    p.finalize(0, MOV, -1, STEPS, 1, 0);
    p.finalize(1, INC, 1, STEPS, EXIT, 2);
    p.finalize(2, MOV, 1, STEPS, 0, 2);

    let mut executor = executor();
    assert_eq!(executor.execute(&p), RunResult::DetectedHang);
    assert_eq!(executor.detected_hang_type(), Some(HangType::RegularSweep));
}

#[test]
fn binary_counter_sweep_hangs_irregularly() {
    // Rightward sweep over a growing appendix of ones and twos: it extends
    // the appendix on a zero exit, or flips a one to a two and bounces. The
    // leftward sweep decrements everything it passes, turning twos back
    // into ones, and the left transition grows the body.
    let mut p = program();
    // Rightward sweep loop (exits on zero or one)
    p.finalize(0, MOV, 1, STEPS, 4, 1);
    p.finalize(1, INC, -1, STEPS, 3, 2);
    p.finalize(2, INC, 1, STEPS, EXIT, 0);
    // Exit on one
    p.finalize(3, INC, 2, STEPS, EXIT, 5);
    // Exit on zero (extends the appendix)
    p.finalize(4, INC, 1, STEPS, EXIT, 5);
    // Leftward sweep loop
    p.finalize(5, MOV, -1, STEPS, 7, 6);
    p.finalize(6, INC, -1, STEPS, EXIT, 5);
    // Transition at the left (extends the body)
    p.finalize(7, INC, -1, STEPS, EXIT, 0);

    let mut executor = executor();
    assert_eq!(executor.execute(&p), RunResult::DetectedHang);
    assert_eq!(
        executor.detected_hang_type(),
        Some(HangType::IrregularSweep)
    );
}

#[test]
fn unfinalized_block_is_a_program_error() {
    let p = program();
    let mut executor = executor();
    assert_eq!(executor.execute(&p), RunResult::ProgramError);
}

#[test]
fn hang_marked_block_is_reported_directly() {
    let mut p = program();
    p.finalize_hang(0);

    let mut executor = executor();
    assert_eq!(executor.execute(&p), RunResult::DetectedHang);
    assert_eq!(executor.detected_hang_type(), Some(HangType::NoDataLoop));
}

#[test]
fn running_off_the_tape_is_a_data_error() {
    // Shift right unconditionally; no detector claims this, and the tape
    // eventually ends.
    let mut p = program();
    p.finalize(0, MOV, 1, STEPS, 0, 0);

    let mut executor = executor();
    assert_eq!(executor.execute(&p), RunResult::DataError);
}

#[test]
fn step_budget_exhaustion_is_an_assumed_hang() {
    // The same run-away, but the step budget ends before the tape does.
    let mut p = program();
    p.finalize(0, MOV, 1, STEPS, 0, 0);

    let mut executor = HangExecutor::new(1000, 20000);
    executor.set_max_steps(100);
    executor.add_default_hang_detectors();
    assert_eq!(executor.execute(&p), RunResult::AssumedHang);
}

#[test]
fn steps_count_language_instructions() {
    // Blocks can represent several language-level steps.
    let mut p = InterpretedProgram::new(3);
    p.finalize(0, INC, -2, 3, 2, 1);
    p.finalize(1, INC, 1, 2, 2, 1);
    p.finalize_exit(2, 4);

    let mut executor = executor();
    assert_eq!(executor.execute(&p), RunResult::Success);
    // 3 + 2 + 2 + 4
    assert_eq!(executor.num_steps(), 11);
}
