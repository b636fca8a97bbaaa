mod support;

use std::thread;
use std::time::Duration;

use renderer::media::{DecoderLoader, DecoderOptions};
use renderer::{
    EngineError, EngineOptions, FrameTask, LiveRenderer, LoopState, MediaReference, MediaState,
    SurfaceGeometry, SurfaceSize, UniformValue,
};
use support::{Harness, ManualHost, RecordingBackend, Script, Step, GRADIENT, TEXTURED};

#[test]
fn image_is_uploaded_once_and_sizes_the_surface() {
    let mut harness = Harness::new();
    harness.engine.compile(TEXTURED).unwrap();
    let poster = harness.loader.script("poster.png", Script::still(1600, 900));
    harness.engine.set_media(Some(poster)).unwrap();
    assert_eq!(harness.engine.media_state(), &MediaState::Decoding);

    harness.paint_n(4);

    assert_eq!(
        harness.engine.media_state(),
        &MediaState::Ready {
            width: 1600,
            height: 900
        }
    );
    assert_eq!(
        harness.engine.surface_geometry(),
        Some(SurfaceGeometry {
            width: 800,
            height: 450
        })
    );
    assert_eq!(harness.engine.host().pending_count(FrameTask::MediaRefresh), 0);

    let backend = harness.backend();
    assert_eq!(backend.uploads.len(), 1);
    assert!(backend.uploads[0].flip_y);
    assert_eq!(backend.uploads[0].size, (1600, 900));

    let draw = backend.last_draw().unwrap();
    assert_eq!(draw.texture, Some(backend.uploads[0].texture));
    assert_eq!(draw.surface, Some(SurfaceSize::new(800, 450)));
    assert_eq!(draw.uniform("u_resolution"), Some(UniformValue::Vec2([800.0, 450.0])));
}

#[test]
fn video_refreshes_into_the_same_texture() {
    let mut harness = Harness::new();
    harness.engine.compile(TEXTURED).unwrap();
    let clip = harness.loader.script("clip.mp4", Script::clip(640, 360));
    harness.engine.set_media(Some(clip)).unwrap();

    harness.paint_n(5);

    let backend = harness.backend();
    assert_eq!(backend.uploads.len(), 5);
    let texture = backend.uploads[0].texture;
    assert!(backend.uploads.iter().all(|upload| upload.texture == texture));
    assert_eq!(backend.live_textures(), 1);
    assert_eq!(harness.engine.host().pending_count(FrameTask::MediaRefresh), 1);
}

#[test]
fn media_refresh_runs_while_playback_is_paused() {
    let mut harness = Harness::new();
    harness.engine.compile(TEXTURED).unwrap();
    harness.engine.pause();
    let clip = harness.loader.script("clip.webm", Script::clip(320, 240));
    harness.engine.set_media(Some(clip)).unwrap();

    harness.paint_n(3);

    assert_eq!(harness.backend().uploads.len(), 3);
    assert!(harness.backend().draws.is_empty());
}

#[test]
fn replacing_then_removing_media_releases_every_texture() {
    let mut harness = Harness::new();
    harness.engine.compile(TEXTURED).unwrap();

    let first = harness.loader.script("first.mp4", Script::clip(320, 240));
    harness.engine.set_media(Some(first)).unwrap();
    harness.paint_n(3);
    assert_eq!(harness.backend().live_textures(), 1);

    let second = harness.loader.script("second.jpg", Script::still(200, 200));
    harness.engine.set_media(Some(second)).unwrap();
    harness.paint_n(3);
    assert_eq!(harness.backend().live_textures(), 1);
    assert_eq!(harness.loader.live_sources.get(), 1);

    harness.engine.remove_media().unwrap();
    assert_eq!(harness.engine.media_state(), &MediaState::Empty);
    assert_eq!(harness.backend().live_textures(), 0);
    assert_eq!(harness.loader.live_sources.get(), 0);
    assert_eq!(harness.engine.host().pending_count(FrameTask::MediaRefresh), 0);

    let drawn = harness.engine.frames_drawn();
    harness.paint_n(2);
    assert_eq!(harness.engine.frames_drawn(), drawn + 2);
    assert_eq!(harness.backend().last_draw().unwrap().texture, None);
    assert!(harness.backend().double_frees.is_empty());
    assert_eq!(harness.loader.opened.borrow().len(), 2);
}

#[test]
fn replacement_cancels_the_pending_refresh() {
    let mut harness = Harness::new();
    let slow = harness.loader.script(
        "slow.png",
        Script {
            steps: vec![Step::Pending, Step::Pending, Step::Frame(10, 10)],
            continuous: false,
        },
    );
    harness.engine.set_media(Some(slow)).unwrap();
    harness.paint();
    let cancelled_before = harness.engine.host().cancelled.len();

    let fast = harness.loader.script("fast.png", Script::still(4, 4));
    harness.engine.set_media(Some(fast)).unwrap();

    assert_eq!(harness.engine.host().cancelled.len(), cancelled_before + 1);
    assert_eq!(harness.engine.host().pending_count(FrameTask::MediaRefresh), 1);
}

#[test]
fn decode_failure_is_reported_without_a_texture() {
    let mut harness = Harness::new();
    harness.engine.compile(TEXTURED).unwrap();
    let broken = harness.loader.script("broken.png", Script::failing("unsupported format"));
    harness.engine.set_media(Some(broken)).unwrap();
    harness.paint_n(2);

    assert_eq!(
        harness.engine.media_state(),
        &MediaState::Failed("unsupported format".into())
    );
    assert_eq!(harness.engine.surface_geometry(), None);
    assert_eq!(harness.backend().live_textures(), 0);
    assert_eq!(harness.engine.host().pending_count(FrameTask::MediaRefresh), 0);
    assert_eq!(harness.engine.loop_state(), LoopState::Running);
}

#[test]
fn missing_texture_memory_stops_rendering() {
    let mut harness = Harness::new();
    harness.engine.compile(TEXTURED).unwrap();
    harness.engine.backend_mut().fail_texture_allocation = true;
    let clip = harness.loader.script("huge.mov", Script::clip(8192, 8192));
    harness.engine.set_media(Some(clip)).unwrap();

    let err = harness.engine.on_paint().unwrap_err();
    assert!(matches!(err, EngineError::ResourceExhaustion(_)), "{err}");
    assert_eq!(harness.engine.loop_state(), LoopState::Stopped);
    assert_eq!(harness.backend().live_textures(), 0);
}

#[test]
fn container_resize_refits_media_geometry() {
    let mut harness = Harness::new();
    harness.engine.compile(TEXTURED).unwrap();
    let poster = harness.loader.script("wide.png", Script::still(1600, 900));
    harness.engine.set_media(Some(poster)).unwrap();
    harness.paint_n(3);

    harness.engine.host_mut().container = SurfaceSize::new(400, 800);
    harness.engine.container_resized();
    assert_eq!(
        harness.engine.surface_geometry(),
        Some(SurfaceGeometry {
            width: 400,
            height: 225
        })
    );

    harness.paint();
    assert_eq!(harness.backend().resizes.last(), Some(&SurfaceSize::new(400, 225)));
}

#[test]
fn original_media_is_available_once_ready() {
    let mut harness = Harness::new();
    let poster = harness
        .loader
        .script("poster.png", Script::still(64, 64))
        .with_display_name("Poster");
    harness.engine.set_media(Some(poster.clone())).unwrap();
    assert!(harness.engine.original_media().is_none());

    harness.paint_n(2);
    assert_eq!(harness.engine.original_media(), Some(&poster));
}

#[test]
fn holding_show_original_draws_the_media_unprocessed() {
    let mut harness = Harness::new();
    let shader = harness.engine.compile(GRADIENT).unwrap().program().unwrap();
    let poster = harness.loader.script("poster.png", Script::still(800, 600));
    harness.engine.set_media(Some(poster)).unwrap();
    harness.paint_n(3);
    assert_eq!(harness.backend().last_draw().unwrap().program, shader);

    harness.engine.show_original(true).unwrap();
    assert!(harness.engine.is_showing_original());
    harness.paint();
    let backend = harness.backend();
    let draw = backend.last_draw().unwrap();
    assert_ne!(draw.program, shader);
    assert_eq!(draw.texture, Some(backend.uploads[0].texture));
    assert_eq!(draw.uniform("u_texture"), Some(UniformValue::Int(0)));
    assert_eq!(draw.uniform("u_resolution"), Some(UniformValue::Vec2([800.0, 600.0])));
    let passthrough = draw.program;
    assert_eq!(harness.engine.resource_counts().programs, 2);

    harness.engine.show_original(false).unwrap();
    harness.paint();
    assert_eq!(harness.backend().last_draw().unwrap().program, shader);

    harness.engine.show_original(true).unwrap();
    harness.paint();
    assert_eq!(harness.backend().last_draw().unwrap().program, passthrough);
    assert_eq!(harness.backend().live_programs(), 2);

    harness.engine.shutdown();
    assert_eq!(harness.backend().live_total(), 0);
}

#[test]
fn show_original_without_media_keeps_the_shader() {
    let mut harness = Harness::new();
    let shader = harness.engine.compile(GRADIENT).unwrap().program().unwrap();

    harness.engine.show_original(true).unwrap();
    assert!(!harness.engine.is_showing_original());
    harness.paint();
    assert_eq!(harness.backend().last_draw().unwrap().program, shader);
}

#[test]
fn show_original_redraws_once_while_paused() {
    let mut harness = Harness::with_options(EngineOptions {
        autoplay: false,
        ..EngineOptions::default()
    });
    let shader = harness.engine.compile(GRADIENT).unwrap().program().unwrap();
    let poster = harness.loader.script("poster.png", Script::still(320, 240));
    harness.engine.set_media(Some(poster)).unwrap();
    harness.paint_n(3);
    assert!(harness.backend().draws.is_empty());

    harness.engine.show_original(true).unwrap();
    assert_eq!(harness.engine.host().pending_count(FrameTask::Draw), 1);
    harness.paint_n(3);
    assert_eq!(harness.backend().draws.len(), 1);
    assert_ne!(harness.backend().draws[0].program, shader);

    harness.engine.show_original(false).unwrap();
    harness.paint_n(3);
    assert_eq!(harness.backend().draws.len(), 2);
    assert_eq!(harness.backend().draws[1].program, shader);
    assert_eq!(harness.engine.loop_state(), LoopState::Stopped);
}

#[test]
fn decoder_loader_reads_images_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("checker.png");
    image::RgbaImage::from_pixel(6, 3, image::Rgba([0, 128, 255, 255]))
        .save(&path)
        .unwrap();

    let mut engine = LiveRenderer::new(
        RecordingBackend::new(),
        ManualHost::new(SurfaceSize::new(600, 600)),
        Box::new(DecoderLoader::new(DecoderOptions::default())),
        EngineOptions::default(),
    );
    engine.set_media(Some(MediaReference::image(&path))).unwrap();

    for _ in 0..400 {
        engine.on_paint().unwrap();
        if engine.media_state().is_ready() {
            break;
        }
        thread::sleep(Duration::from_millis(5));
    }

    assert_eq!(
        engine.media_state(),
        &MediaState::Ready {
            width: 6,
            height: 3
        }
    );
    assert_eq!(
        engine.surface_geometry(),
        Some(SurfaceGeometry {
            width: 600,
            height: 300
        })
    );
    assert_eq!(engine.backend().uploads.len(), 1);
}
