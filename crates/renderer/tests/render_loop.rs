mod support;

use std::time::Duration;

use renderer::{
    EngineError, EngineOptions, FrameRequest, FrameTask, LoopState, ResumeMode, SurfaceSize,
    UniformValue,
};
use support::{Harness, GRADIENT, TEXTURED};

fn time_of_last_draw(harness: &Harness) -> f32 {
    match harness.backend().last_draw().and_then(|draw| draw.uniform("u_time")) {
        Some(UniformValue::Float(time)) => time,
        other => panic!("expected a u_time float, got {other:?}"),
    }
}

fn assert_close(actual: f32, expected: f32) {
    assert!(
        (actual - expected).abs() < 1e-3,
        "expected {expected}, got {actual}"
    );
}

#[test]
fn frame_uniforms_follow_clock_surface_and_pointer() {
    let mut harness = Harness::new();
    harness.engine.compile(TEXTURED).unwrap();
    harness.engine.pointer_moved([10.0, 20.0]);
    harness.paint();

    let draw = harness.backend().last_draw().expect("one frame drawn").clone();
    assert_eq!(draw.surface, Some(SurfaceSize::new(800, 600)));
    assert_eq!(draw.uniform("u_resolution"), Some(UniformValue::Vec2([800.0, 600.0])));
    assert_eq!(draw.uniform("u_mouse"), Some(UniformValue::Vec2([10.0, 20.0])));
    assert_eq!(draw.uniform("u_texture"), Some(UniformValue::Int(0)));
    assert_eq!(draw.texture, None);
    assert_close(time_of_last_draw(&harness), 0.016);

    harness.paint();
    assert_close(time_of_last_draw(&harness), 0.032);
}

#[test]
fn undeclared_uniforms_are_not_set() {
    let mut harness = Harness::new();
    harness.engine.compile(GRADIENT).unwrap();
    harness.paint();

    let draw = harness.backend().last_draw().unwrap();
    assert!(draw.uniform("u_mouse").is_none());
    assert!(draw.uniform("u_texture").is_none());
    assert!(draw.uniform("u_time").is_some());
}

#[test]
fn loop_keeps_exactly_one_pending_step() {
    let mut harness = Harness::new();
    harness.engine.compile(GRADIENT).unwrap();
    harness.engine.compile(TEXTURED).unwrap();
    harness.engine.start();
    assert_eq!(harness.engine.host().pending_count(FrameTask::Draw), 1);

    harness.paint_n(5);
    assert_eq!(harness.engine.host().pending_count(FrameTask::Draw), 1);
    assert_eq!(harness.engine.frames_drawn(), 5);
}

#[test]
fn pause_and_resume_are_idempotent() {
    let mut harness = Harness::new();
    harness.engine.compile(GRADIENT).unwrap();
    harness.paint_n(2);
    let before_pause = time_of_last_draw(&harness);

    harness.engine.pause();
    harness.engine.pause();
    assert_eq!(harness.engine.loop_state(), LoopState::Stopped);
    assert_eq!(harness.engine.host().pending_count(FrameTask::Draw), 0);

    harness.clock.advance(Duration::from_secs(5));
    harness.paint_n(3);
    assert_eq!(harness.engine.frames_drawn(), 2);

    harness.engine.resume();
    harness.engine.resume();
    assert_eq!(harness.engine.loop_state(), LoopState::Running);
    assert_eq!(harness.engine.host().pending_count(FrameTask::Draw), 1);

    harness.paint();
    assert_eq!(harness.engine.frames_drawn(), 3);
    assert_close(time_of_last_draw(&harness), before_pause + 0.016);
}

#[test]
fn restart_mode_rewinds_time_on_resume() {
    let mut harness = Harness::with_options(EngineOptions {
        autoplay: true,
        resume_mode: ResumeMode::Restart,
    });
    harness.engine.compile(GRADIENT).unwrap();
    harness.paint_n(10);
    assert!(time_of_last_draw(&harness) > 0.1);

    harness.engine.pause();
    harness.clock.advance(Duration::from_secs(2));
    harness.engine.resume();
    harness.paint();
    assert_close(time_of_last_draw(&harness), 0.016);
}

#[test]
fn toggle_flips_playback() {
    let mut harness = Harness::new();
    harness.engine.compile(GRADIENT).unwrap();
    assert!(!harness.engine.toggle_playback());
    assert!(!harness.engine.is_playing());
    assert!(harness.engine.toggle_playback());
    assert_eq!(harness.engine.loop_state(), LoopState::Running);
}

#[test]
fn compiling_while_paused_waits_for_resume() {
    let mut harness = Harness::with_options(EngineOptions {
        autoplay: false,
        resume_mode: ResumeMode::Continue,
    });
    harness.engine.compile(GRADIENT).unwrap();
    harness.paint_n(2);
    assert_eq!(harness.engine.loop_state(), LoopState::Stopped);
    assert!(harness.backend().draws.is_empty());

    harness.engine.resume();
    harness.paint();
    assert_eq!(harness.engine.frames_drawn(), 1);
    assert_close(time_of_last_draw(&harness), 0.016);
}

#[test]
fn start_without_program_does_not_schedule() {
    let mut harness = Harness::new();
    harness.engine.start();
    assert_eq!(harness.engine.loop_state(), LoopState::Stopped);
    assert!(harness.engine.host().pending_tasks().is_empty());
}

#[test]
fn lost_surface_skips_a_single_frame() {
    let mut harness = Harness::new();
    harness.engine.compile(GRADIENT).unwrap();
    harness.engine.backend_mut().lose_surface_frames = 1;

    harness.paint();
    assert!(harness.backend().draws.is_empty());
    assert_eq!(harness.engine.loop_state(), LoopState::Running);

    harness.paint();
    assert_eq!(harness.backend().draws.len(), 1);
}

#[test]
fn lost_context_stops_the_loop() {
    let mut harness = Harness::new();
    harness.engine.compile(GRADIENT).unwrap();
    harness.engine.backend_mut().lose_context = true;

    let err = harness.engine.on_paint().unwrap_err();
    assert!(matches!(err, EngineError::ContextUnavailable(_)), "{err}");
    assert_eq!(harness.engine.loop_state(), LoopState::Stopped);
    assert!(harness.engine.host().pending_tasks().is_empty());
}

#[test]
fn container_resize_resizes_surface_on_next_frame() {
    let mut harness = Harness::new();
    harness.engine.compile(GRADIENT).unwrap();
    harness.paint_n(2);
    assert_eq!(harness.backend().resizes, vec![SurfaceSize::new(800, 600)]);

    harness.engine.host_mut().container = SurfaceSize::new(1024, 768);
    harness.engine.container_resized();
    harness.paint();

    assert_eq!(harness.backend().resizes.last(), Some(&SurfaceSize::new(1024, 768)));
    let draw = harness.backend().last_draw().unwrap();
    assert_eq!(draw.uniform("u_resolution"), Some(UniformValue::Vec2([1024.0, 768.0])));
}

#[test]
fn minimised_container_draws_nothing() {
    let mut harness = Harness::new();
    harness.engine.compile(GRADIENT).unwrap();
    harness.engine.host_mut().container = SurfaceSize::new(0, 0);
    harness.paint_n(2);

    assert!(harness.backend().draws.is_empty());
    assert_eq!(harness.engine.loop_state(), LoopState::Running);
}

#[test]
fn stale_requests_are_ignored() {
    let mut harness = Harness::new();
    harness.engine.compile(GRADIENT).unwrap();
    harness.engine.run_frame(FrameRequest(999)).unwrap();
    assert!(harness.backend().draws.is_empty());
    assert_eq!(harness.engine.host().pending_count(FrameTask::Draw), 1);
}
