//! Analyzer-level tests: run a program until its meta-loop stabilizes, then
//! inspect the meta-loop analysis directly.

use beaver_hangs::blocks::InterpretedProgram;
use beaver_hangs::detector::RunUntilMetaLoop;
use beaver_hangs::executor::HangExecutor;
use beaver_hangs::meta_loop::{LoopType, MetaLoopAnalysis, MetaLoopType};
use beaver_hangs::types::RunResult;

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

fn run_until_meta_loop(p: &InterpretedProgram, iterations: usize) -> HangExecutor {
    let mut executor = HangExecutor::new(1000, 20000);
    executor.set_max_steps(20000);
    executor.add_hang_detector(Box::new(RunUntilMetaLoop::new(iterations)));
    assert_eq!(executor.execute(p), RunResult::DetectedHang);
    executor
}

#[test]
fn glider_with_delta_two_counter() {
    // Glider whose counter increases by two each meta-iteration.
    let mut p = program();
    // Bootstrap
    p.finalize(0, INC, 1, STEPS, EXIT, 1);
    p.finalize(1, MOV, 1, STEPS, 2, EXIT);
    // Main loop
    p.finalize(2, INC, 1, STEPS, EXIT, 3);
    p.finalize(3, MOV, -1, STEPS, EXIT, 4);
    p.finalize(4, INC, -1, STEPS, 6, 5);
    p.finalize(5, MOV, 1, STEPS, EXIT, 2);
    // Transition
    p.finalize(6, MOV, 2, STEPS, 7, EXIT);
    p.finalize(7, INC, 2, STEPS, EXIT, 2);

    let executor = run_until_meta_loop(&p, 6);
    let state = executor.execution_state(&p);

    let mut mla = MetaLoopAnalysis::new();
    assert!(mla.analyze_meta_loop(&state));

    assert_eq!(mla.loop_size(), 2);
    assert_eq!(mla.meta_loop_type(), MetaLoopType::Regular);
    assert!(!mla.is_periodic());

    let behaviors = mla.loop_behaviors();
    assert_eq!(behaviors.len(), 1);
    let glider = &behaviors[0];
    assert_eq!(glider.loop_type(), LoopType::Glider);
    assert_eq!(glider.iteration_delta(), 2);
    assert_eq!(glider.min_dp_delta(), Some(1));
    assert_eq!(glider.max_dp_delta(), Some(1));
}

#[test]
fn anchored_sweep_behaviors() {
    let mut p = program();
    p.finalize(0, MOV, -1, STEPS, 1, 0);
    p.finalize(1, INC, 1, STEPS, EXIT, 2);
    p.finalize(2, MOV, 1, STEPS, 0, 2);

    let executor = run_until_meta_loop(&p, 6);
    let state = executor.execution_state(&p);

    let mut mla = MetaLoopAnalysis::new();
    assert!(mla.analyze_meta_loop(&state));

    assert_eq!(mla.meta_loop_type(), MetaLoopType::Regular);
    assert_eq!(mla.loop_size(), 3);

    let behaviors = mla.loop_behaviors();
    assert_eq!(behaviors.len(), 2);

    // Both sweep loops are anchored: the left end grows, the right end is
    // pinned where the rightward loop exits.
    let left_sweep = behaviors
        .iter()
        .find(|b| b.loop_analysis().dp_delta() < 0)
        .unwrap();
    assert_eq!(left_sweep.loop_type(), LoopType::AnchoredSweep);
    assert_eq!(left_sweep.iteration_delta(), 1);
    assert_eq!(left_sweep.min_dp_delta(), Some(-1));
    assert_eq!(left_sweep.max_dp_delta(), Some(0));
    assert_eq!(left_sweep.end_dp_growth(), Some(1));

    let right_sweep = behaviors
        .iter()
        .find(|b| b.loop_analysis().dp_delta() > 0)
        .unwrap();
    assert_eq!(right_sweep.loop_type(), LoopType::AnchoredSweep);
    assert_eq!(right_sweep.min_dp_delta(), Some(-1));
    assert_eq!(right_sweep.max_dp_delta(), Some(0));
    assert_eq!(right_sweep.end_dp_growth(), Some(0));
}

#[test]
fn irregular_sweep_is_classified_as_irregular() {
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

    let mut executor = HangExecutor::new(1000, 20000);
    executor.set_max_steps(20000);
    executor.add_hang_detector(Box::new(RunUntilMetaLoop::new(8)));
    assert_eq!(executor.execute(&p), RunResult::DetectedHang);
    let state = executor.execution_state(&p);

    let mut mla = MetaLoopAnalysis::new();
    assert!(mla.analyze_meta_loop(&state));

    assert_eq!(mla.meta_loop_type(), MetaLoopType::Irregular);
    assert_eq!(mla.loop_size(), 4);

    let behaviors = mla.loop_behaviors();
    assert_eq!(behaviors.len(), 2);

    // The rightward sweep enters steadily from the left but exits at
    // varying depths inside the appendix.
    let rightward = behaviors
        .iter()
        .find(|b| b.loop_analysis().dp_delta() > 0)
        .unwrap();
    assert_eq!(rightward.loop_type(), LoopType::DoubleSweep);
    assert!(!rightward.is_linear());
    assert_eq!(rightward.min_dp_delta(), Some(-1));
    assert_eq!(rightward.max_dp_delta(), None);
    assert_eq!(rightward.end_dp_growth(), None);

    // The leftward sweep starts at varying depths but always exits one cell
    // further left than the previous round.
    let leftward = behaviors
        .iter()
        .find(|b| b.loop_analysis().dp_delta() < 0)
        .unwrap();
    assert_eq!(leftward.loop_type(), LoopType::DoubleSweep);
    assert_eq!(leftward.min_dp_delta(), Some(-1));
    assert_eq!(leftward.max_dp_delta(), None);
    assert_eq!(leftward.end_dp_growth(), Some(1));
}

#[test]
fn shrinking_loops_defeat_the_analysis() {
    // A glider whose iteration counts shrink: the three-window comparison
    // sees a decreasing loop and gives up.
    let mut p = program();
    p.finalize(0, INC, 6, STEPS, EXIT, 1);
    p.finalize(1, MOV, 1, STEPS, 2, EXIT);
    p.finalize(2, INC, 1, STEPS, EXIT, 3);
    p.finalize(3, MOV, -1, STEPS, EXIT, 4);
    p.finalize(4, INC, -1, STEPS, 6, 5);
    p.finalize(5, MOV, 1, STEPS, EXIT, 2);
    p.finalize(6, MOV, 2, STEPS, 7, EXIT);
    p.finalize(7, INC, -2, STEPS, EXIT, 2);

    let mut executor = HangExecutor::new(1000, 20000);
    executor.set_max_steps(20000);
    executor.add_hang_detector(Box::new(RunUntilMetaLoop::new(3)));

    if executor.execute(&p) == RunResult::DetectedHang {
        let state = executor.execution_state(&p);
        let mut mla = MetaLoopAnalysis::new();
        assert!(!mla.analyze_meta_loop(&state));
    }
}
