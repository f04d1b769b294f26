#![cfg(feature = "vision")]

use opencv::core::{self, Mat, Scalar};
use opencv::imgproc;
use opencv::prelude::*;

use pitwatch::analytics::{mask_view, VehicleLocalizer};
use pitwatch::config::Config;
use pitwatch::engine::{ActivityEngine, EngineConfig, MotionRatio};

const FPS: f64 = 30.0;

fn car_frame() -> Mat {
    let mut frame =
        Mat::new_rows_cols_with_default(480, 640, core::CV_8UC3, Scalar::all(40.0)).unwrap();
    imgproc::rectangle(
        &mut frame,
        core::Rect::new(220, 190, 200, 100),
        Scalar::new(0.0, 255.0, 180.0, 0.0),
        imgproc::FILLED,
        imgproc::LINE_8,
        0,
    )
    .unwrap();
    frame
}

fn mask(burst: bool) -> Mat {
    let mut mask =
        Mat::new_rows_cols_with_default(480, 640, core::CV_8UC1, Scalar::all(0.0)).unwrap();
    if burst {
        imgproc::rectangle(
            &mut mask,
            core::Rect::new(315, 175, 50, 50),
            Scalar::all(255.0),
            imgproc::FILLED,
            imgproc::LINE_8,
            0,
        )
        .unwrap();
    }
    mask
}

#[test]
fn fuel_rig_burst_from_painted_frames() {
    let config = Config::default();
    let mut localizer = VehicleLocalizer::new(&config.vehicle).unwrap();
    let mut engine = ActivityEngine::new(EngineConfig::from(&config), FPS).unwrap();

    let frame = car_frame();
    let idle = mask(false);
    let burst = mask(true);

    for i in 0..300u64 {
        if !engine.is_locked() {
            let candidate = localizer.locate(&frame).unwrap();
            assert!(candidate.is_some(), "car not found at frame {i}");
            engine.observe_candidate(candidate.map(|c| c.pose));
            continue;
        }
        let t = engine.clock().time_of(i);
        let m = if (3.0..5.0).contains(&t) { &burst } else { &idle };
        let signal = MotionRatio::new(mask_view(m).unwrap(), config.occupancy.motion_threshold);
        engine.observe_signal(&signal);
    }

    let report = engine.finish();
    let lock = report.lock.expect("vehicle should lock");
    assert!(lock.time <= 0.6);
    assert!((lock.pose.center.x - 320.0).abs() < 2.0);

    assert_eq!(report.events.len(), 1, "{:?}", report.events);
    let event = &report.events[0];
    assert_eq!(event.zone, "Fuel_Rig");
    assert!((event.start - 3.0).abs() < 0.05);
    assert!((event.finish - 5.0).abs() < 0.05);
    assert_eq!(report.summary["Fuel_Rig"].event_count, 1);
    assert_eq!(report.summary["Jack"].event_count, 0);
}
