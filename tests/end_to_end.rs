mod common;

use common::{Scene, payload, render, render_transfer};
use dotbeam::core_modules::consensus::{DecoderPhase, SubmitOutcome};
use dotbeam::core_modules::transform::TransformSource;
use dotbeam::{Config, DecoderConfig, DecoderSession, Encoder, TickOutcome};
use image::RgbaImage;

const SIZE: u32 = 480;

fn quick_tuning() -> DecoderConfig {
    DecoderConfig::builder()
        .lock_rule(3, 0.30)
        .vote_cap(3)
        .debug_snapshots(true)
        .build()
        .unwrap()
}

fn feed(session: &mut DecoderSession, image: &RgbaImage) -> dotbeam::TickResult {
    session
        .decode_tick(image.as_raw(), image.width(), image.height())
        .unwrap()
}

#[test]
fn anchors_recover_the_render_transform() {
    let scene = Scene::centered(SIZE, SIZE);
    let images = render_transfer(b"hi", &scene);
    let mut session = DecoderSession::new(Config::default(), quick_tuning()).unwrap();

    let result = feed(&mut session, &images[0]);
    let debug = result.debug.unwrap();
    assert_eq!(debug.blobs.len(), 3);
    assert_eq!(debug.transform_source, TransformSource::Fresh);
    let found = debug.transform.unwrap();
    let truth = scene.transform;
    assert!((found.center_x - truth.center_x).abs() < 3.0, "{found:?}");
    assert!((found.center_y - truth.center_y).abs() < 3.0, "{found:?}");
    assert!((found.scale / truth.scale - 1.0).abs() < 0.03, "{found:?}");
    assert!(found.rotation.abs() < 3f64.to_radians(), "{found:?}");

    let wb = debug.white_balance.unwrap();
    assert!(wb.calibrated);
    assert!(wb.gain.iter().all(|&g| (g - 1.0).abs() < 1e-3));
    assert_eq!(debug.samples.len(), 60);
}

#[test]
fn rendered_dots_read_back_exactly() {
    let config = Config::default();
    let encoder = Encoder::new(config);
    let frames = encoder.encode(&payload(20));
    let scene = Scene::centered(SIZE, SIZE);
    let image = render(encoder.layout(), &frames[0].dot_values(), &scene);

    let mut session = DecoderSession::new(config, quick_tuning()).unwrap();
    let debug = feed(&mut session, &image).debug.unwrap();
    let read: Vec<u8> = debug.samples.iter().map(|s| s.value).collect();
    assert_eq!(read, frames[0].dot_values());
}

#[test]
fn multi_frame_transfer_completes() {
    let data = payload(45);
    let images = render_transfer(&data, &Scene::centered(SIZE, SIZE));
    assert_eq!(images.len(), 3);
    let mut session = DecoderSession::new(Config::default(), quick_tuning()).unwrap();

    let mut ticks = 0;
    let mut last_progress = 0.0;
    for image in images.iter().cycle().take(30) {
        let result = feed(&mut session, image);
        ticks += 1;
        assert!(result.progress >= last_progress);
        last_progress = result.progress;
        if result.complete {
            break;
        }
    }
    // Three ticks to lock the total, then three votes per frame.
    assert_eq!(ticks, 12);
    assert_eq!(session.phase(), DecoderPhase::Complete { total: 3 });
    let bytes = session.final_bytes().unwrap();
    assert_eq!(bytes.len(), 60);
    assert_eq!(&bytes[..45], &data[..]);

    session.reset();
    assert_eq!(session.phase(), DecoderPhase::Idle);
    assert!(session.cached_transform().is_none());
    assert!(session.final_bytes().is_err());
}

#[test]
fn shifted_rotated_pattern_decodes() {
    let data = payload(30);
    let scene = Scene::centered(SIZE, SIZE).moved(25.0, -15.0, 0.9, 0.3);
    let images = render_transfer(&data, &scene);
    let mut session = DecoderSession::new(Config::default(), quick_tuning()).unwrap();

    let complete = images
        .iter()
        .cycle()
        .take(20)
        .any(|image| feed(&mut session, image).complete);
    assert!(complete);
    let rotation = session.cached_transform().unwrap().rotation;
    assert!((rotation - 0.3).abs() < 3f64.to_radians());
    assert_eq!(&session.final_bytes().unwrap()[..30], &data[..]);
}

#[test]
fn half_size_pattern_decodes_on_common_frame_sizes() {
    let data = payload(45);
    for (width, height) in [(480, 480), (640, 480)] {
        let scene = Scene::centered(width, height).moved(7.0, -4.0, 0.5, 0.1);
        let images = render_transfer(&data, &scene);
        let mut session = DecoderSession::new(Config::default(), quick_tuning()).unwrap();

        let debug = feed(&mut session, &images[0]).debug.unwrap();
        assert_eq!(debug.blobs.len(), 3, "{width}x{height}");
        let found = debug.transform.unwrap();
        let truth = scene.transform;
        assert!((found.center_x - truth.center_x).abs() < 1.5, "{found:?}");
        assert!((found.center_y - truth.center_y).abs() < 1.5, "{found:?}");
        assert!((found.scale / truth.scale - 1.0).abs() < 0.03, "{found:?}");

        let complete = images
            .iter()
            .cycle()
            .take(30)
            .any(|image| feed(&mut session, image).complete);
        assert!(complete, "{width}x{height}");
        assert_eq!(&session.final_bytes().unwrap()[..45], &data[..]);
    }
}

#[test]
fn minority_misreads_are_outvoted() {
    let config = Config::default();
    let encoder = Encoder::new(config);
    let data = payload(45);
    let frames = encoder.encode(&data);
    let scene = Scene::centered(SIZE, SIZE);
    let clean: Vec<RgbaImage> = frames
        .iter()
        .map(|f| render(encoder.layout(), &f.dot_values(), &scene))
        .collect();
    let noisy: Vec<RgbaImage> = frames
        .iter()
        .map(|f| {
            let mut values = f.dot_values();
            for v in &mut values[20..26] {
                *v = (*v + 1) % 8;
            }
            render(encoder.layout(), &values, &scene)
        })
        .collect();

    let mut session = DecoderSession::new(config, quick_tuning()).unwrap();
    'rounds: for round in 0..6 {
        let images = if round % 3 == 1 { &noisy } else { &clean };
        for image in images {
            if feed(&mut session, image).complete {
                break 'rounds;
            }
        }
    }
    assert!(session.final_bytes().is_ok());
    assert_eq!(&session.final_bytes().unwrap()[..45], &data[..]);
}

#[test]
fn jumps_and_dropouts_keep_the_cached_transform() {
    let scene = Scene::centered(SIZE, SIZE);
    let images = render_transfer(b"hi", &scene);
    let jumped = render_transfer(b"hi", &scene.moved(60.0, 0.0, 1.0, 0.0));
    let mut session = DecoderSession::new(Config::default(), quick_tuning()).unwrap();

    feed(&mut session, &images[0]);
    let cached = *session.cached_transform().unwrap();

    let result = feed(&mut session, &jumped[0]);
    assert!(matches!(
        result.outcome,
        TickOutcome::Sampled {
            source: TransformSource::CachedAfterDrift,
            ..
        }
    ));
    assert_eq!(session.cached_transform(), Some(&cached));

    let dark = RgbaImage::from_pixel(SIZE, SIZE, common::BACKGROUND);
    let result = feed(&mut session, &dark);
    assert!(matches!(
        result.outcome,
        TickOutcome::Sampled {
            source: TransformSource::CachedNoDetection,
            ..
        }
    ));
}

#[test]
fn frames_before_the_lock_are_only_tallied() {
    let images = render_transfer(&payload(45), &Scene::centered(SIZE, SIZE));
    let mut session = DecoderSession::new(Config::default(), quick_tuning()).unwrap();
    let outcomes: Vec<TickOutcome> = images.iter().map(|i| feed(&mut session, i).outcome).collect();
    let submits: Vec<SubmitOutcome> = outcomes
        .iter()
        .map(|o| match o {
            TickOutcome::Sampled { submit, .. } => *submit,
            TickOutcome::NotDetected => panic!("pattern not detected"),
        })
        .collect();
    assert_eq!(
        submits,
        vec![
            SubmitOutcome::Tallied { tallied: 1 },
            SubmitOutcome::Tallied { tallied: 2 },
            SubmitOutcome::Locked { total: 3 },
        ]
    );
    assert_eq!(session.progress(), 0.0);
}
