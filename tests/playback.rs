//! Playback clock and update gate driven through a full stream.

mod common;

use alembic_stream::clock::CycleMode;
use alembic_stream::config::StreamSettings;
use alembic_stream::reader::memory::SceneDesc;

use common::{bound_stream, bound_stream_with, ramp, SCENE};

fn x_of(host: &alembic_stream::host::MemoryHost, stream: &alembic_stream::Stream, path: &str) -> f32 {
    let obj = host.find_path(stream.root(), path).unwrap();
    host.local_transform(obj).unwrap().translation.x
}

fn cycled(cycle: CycleMode) -> StreamSettings {
    let mut settings = StreamSettings::with_source(SCENE);
    settings.playback.cycle = cycle;
    settings
}

#[test]
fn test_hold_clamps_past_end() {
    let desc = SceneDesc::new(vec![ramp("a")]);
    let (mut stream, mut host, _) = bound_stream(&desc);

    stream.update(&mut host, 0.6);
    assert_eq!(x_of(&host, &stream, "a"), 0.5);
    stream.update(&mut host, 7.0);
    assert_eq!(stream.sample_time(), 1.0);
    assert_eq!(x_of(&host, &stream, "a"), 1.0);
}

#[test]
fn test_loop_wraps() {
    let desc = SceneDesc::new(vec![ramp("a")]);
    let (mut stream, mut host, _) = bound_stream_with(&desc, cycled(CycleMode::Loop));

    stream.update(&mut host, 1.75);
    assert!((stream.sample_time() - 0.75).abs() < 1e-9);
    assert_eq!(x_of(&host, &stream, "a"), 0.5);

    stream.update(&mut host, 2.25);
    assert_eq!(x_of(&host, &stream, "a"), 0.0);
}

#[test]
fn test_bounce_reflects_odd_repeats() {
    let desc = SceneDesc::new(vec![ramp("a")]);
    let (mut stream, mut host, _) = bound_stream_with(&desc, cycled(CycleMode::Bounce));

    stream.update(&mut host, 1.25);
    assert!((stream.sample_time() - 0.75).abs() < 1e-9);
    assert_eq!(x_of(&host, &stream, "a"), 0.5);

    stream.update(&mut host, 2.25);
    assert!((stream.sample_time() - 0.25).abs() < 1e-9);
    assert_eq!(x_of(&host, &stream, "a"), 0.0);
}

#[test]
fn test_offset_and_scale() {
    let desc = SceneDesc::new(vec![ramp("a")]);
    let (mut stream, mut host, _) = bound_stream(&desc);
    stream.settings_mut().playback.time_offset = 1.0;
    stream.settings_mut().playback.time_scale = 2.0;

    // 2 * (1.3 - 1) = 0.6
    stream.update(&mut host, 1.3);
    assert!((stream.sample_time() - 0.6).abs() < 1e-9);
    assert_eq!(x_of(&host, &stream, "a"), 0.5);
}

#[test]
fn test_gate_idempotent_ticks() {
    let desc = SceneDesc::new(vec![ramp("a"), ramp("b")]);
    let (mut stream, mut host, _) = bound_stream(&desc);

    stream.update(&mut host, 0.5);
    let first = stream.stats();
    let uploads = host.stats().clone();
    for _ in 0..5 {
        stream.update(&mut host, 0.5);
    }
    let after = stream.stats();
    assert_eq!(after.ticks, first.ticks + 5);
    assert_eq!(after.resamples, first.resamples);
    assert_eq!(after.requests, first.requests);
    assert_eq!(*host.stats(), uploads);

    // Below the time tolerance is still the same tick.
    stream.update(&mut host, 0.5004);
    assert_eq!(stream.stats().resamples, first.resamples);

    stream.update(&mut host, 0.6);
    assert_eq!(stream.stats().resamples, first.resamples + 1);
}

#[test]
fn test_settings_change_resamples() {
    let desc = SceneDesc::new(vec![ramp("a")]);
    let (mut stream, mut host, _) = bound_stream(&desc);
    stream.update(&mut host, 0.5);
    let before = stream.stats().resamples;

    stream.settings_mut().data.swap_handedness = true;
    stream.update(&mut host, 0.5);
    assert_eq!(stream.stats().resamples, before + 1);
    assert_eq!(x_of(&host, &stream, "a"), -0.5);
}

#[test]
fn test_advance_by_accumulates() {
    let desc = SceneDesc::new(vec![ramp("a")]);
    let (mut stream, mut host, _) = bound_stream(&desc);

    stream.update(&mut host, 0.0);
    stream.advance_by(&mut host, 0.25);
    stream.advance_by(&mut host, 0.25);
    assert_eq!(stream.settings().time, 0.5);
    assert_eq!(x_of(&host, &stream, "a"), 0.5);

    stream.advance_to(&mut host, 0.0);
    assert_eq!(x_of(&host, &stream, "a"), 0.0);
}

#[test]
fn test_clip_excludes_whole_stream() {
    let desc = SceneDesc::new(vec![ramp("a")]);
    let (mut stream, mut host, _) = bound_stream_with(&desc, cycled(CycleMode::Clip));

    stream.update(&mut host, 0.5);
    let requests = stream.stats().requests;
    assert!(!stream.is_clipped());

    stream.update(&mut host, -3.0);
    assert!(stream.is_clipped());
    assert_eq!(stream.stats().requests, requests);
    // The host keeps the last applied state.
    assert_eq!(x_of(&host, &stream, "a"), 0.5);
}

#[test]
fn test_threaded_decode_flush() {
    let desc = SceneDesc::new(vec![ramp("a"), ramp("b")]);
    let mut settings = StreamSettings::with_source(SCENE);
    settings.advanced.use_threads = true;
    let (mut stream, mut host, _) = bound_stream_with(&desc, settings);

    for i in 0..10 {
        stream.update(&mut host, i as f64 * 0.1);
    }
    stream.update(&mut host, 1.0);
    stream.flush(&mut host);

    assert_eq!(x_of(&host, &stream, "a"), 1.0);
    assert_eq!(x_of(&host, &stream, "b"), 1.0);
    // Nothing outstanding: a second flush returns at once.
    stream.flush(&mut host);
    assert_eq!(stream.stats().decode_errors, 0);
}
