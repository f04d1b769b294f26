use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use opencv::core::Mat;

use crate::config::{Config, SignalKind};
use crate::engine::{ActivityEngine, EngineConfig, MotionRatio};
use crate::error::EngineError;
use crate::storage::ActivityReport;

use super::decoder::{open_writer, FrameSource, VideoSource};
use super::localizer::VehicleLocalizer;
use super::motion::{mask_view, ForegroundExtractor};
use super::overlay::OverlayWriter;

#[cfg(feature = "person-detector")]
use super::object::PersonDetector;
#[cfg(feature = "person-detector")]
use crate::engine::BoxOverlap;

enum OccupancySource {
    Motion(ForegroundExtractor),
    #[cfg(feature = "person-detector")]
    Person {
        detector: PersonDetector,
        class_name: String,
    },
}

impl OccupancySource {
    fn new(config: &Config) -> Result<Self, EngineError> {
        match config.occupancy.signal {
            SignalKind::MotionRatio => {
                Ok(Self::Motion(ForegroundExtractor::new(&config.occupancy)?))
            }
            #[cfg(feature = "person-detector")]
            SignalKind::PersonOverlap => {
                let occupancy = &config.occupancy;
                let model_path = occupancy
                    .model_path
                    .as_deref()
                    .ok_or(EngineError::Unsupported("person_overlap needs a model_path"))?;
                Ok(Self::Person {
                    detector: PersonDetector::new(
                        model_path,
                        occupancy.confidence_threshold,
                        &occupancy.person_class,
                    )?,
                    class_name: occupancy.person_class.clone(),
                })
            }
            #[cfg(not(feature = "person-detector"))]
            SignalKind::PersonOverlap => Err(EngineError::Unsupported(
                "person_overlap requires the person-detector feature",
            )),
        }
    }
}

/// Input and output locations for one analysis run.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub input: PathBuf,
    pub overlay: Option<PathBuf>,
}

/// Drives one video through the engine, strictly frame by frame.
pub struct Analyzer<S = VideoSource> {
    source: S,
    localizer: VehicleLocalizer,
    occupancy: OccupancySource,
    engine: ActivityEngine,
    overlay: Option<OverlayWriter>,
    motion_threshold: f64,
    progress_every: u64,
}

impl Analyzer<VideoSource> {
    pub fn open(
        config: &Config,
        paths: &RunPaths,
        fps_override: Option<f64>,
    ) -> Result<Self, EngineError> {
        config.validate()?;

        let source = VideoSource::open(&paths.input, fps_override)?;
        let overlay = match &paths.overlay {
            Some(path) => Some(OverlayWriter::new(open_writer(
                path,
                source.fps(),
                source.size(),
            )?)),
            None => None,
        };

        Self::with_source(config, source, overlay)
    }
}

impl<S: FrameSource> Analyzer<S> {
    pub fn with_source(
        config: &Config,
        source: S,
        overlay: Option<OverlayWriter>,
    ) -> Result<Self, EngineError> {
        config.validate()?;

        let engine = ActivityEngine::new(EngineConfig::from(config), source.fps())?;
        let localizer = VehicleLocalizer::new(&config.vehicle)?;
        let occupancy = OccupancySource::new(config)?;

        Ok(Self {
            source,
            localizer,
            occupancy,
            engine,
            overlay,
            motion_threshold: config.occupancy.motion_threshold,
            progress_every: config.output.progress_every_frames.max(1),
        })
    }

    /// Runs to end of input or until `shutdown` is set. `progress` receives
    /// the processed fraction of the source's frame count, and 1.0 once the
    /// input is exhausted. An interrupted run still yields the partial report.
    pub fn run<F>(
        mut self,
        shutdown: &AtomicBool,
        mut progress: F,
    ) -> Result<ActivityReport, EngineError>
    where
        F: FnMut(f32),
    {
        let total = self.source.frame_count().max(1);
        let mut processed = 0u64;
        let mut interrupted = false;

        loop {
            if shutdown.load(Ordering::Relaxed) {
                interrupted = true;
                break;
            }
            let Some(frame) = self.source.next_frame()? else {
                break;
            };
            let frame_index = processed;

            if self.engine.is_locked() {
                observe_occupancy(
                    &mut self.engine,
                    &mut self.occupancy,
                    frame,
                    frame_index,
                    self.motion_threshold,
                )?;
                if let Some(overlay) = &self.overlay {
                    overlay.draw_zones(frame, &self.engine.zone_status())?;
                }
            } else {
                let candidate = match self.localizer.locate(frame) {
                    Ok(c) => c,
                    Err(e) => {
                        tracing::warn!(
                            frame = frame_index,
                            error = %e,
                            "vehicle localization failed"
                        );
                        None
                    }
                };
                if let (Some(overlay), Some(c)) = (&self.overlay, &candidate) {
                    overlay.draw_candidate(frame, c)?;
                }
                self.engine.observe_candidate(candidate.map(|c| c.pose));
            }

            if let Some(overlay) = &mut self.overlay {
                overlay.write(frame)?;
            }

            processed += 1;
            if processed % self.progress_every == 0 {
                progress((processed as f32 / total as f32).min(1.0));
            }
        }

        if interrupted {
            tracing::warn!(frames = processed, "analysis interrupted, reporting partial results");
        } else if processed == 0 {
            return Err(EngineError::EmptyVideo(
                "no frames could be decoded".to_string(),
            ));
        } else {
            progress(1.0);
        }

        Ok(self.engine.finish())
    }
}

fn observe_occupancy(
    engine: &mut ActivityEngine,
    occupancy: &mut OccupancySource,
    frame: &Mat,
    frame_index: u64,
    motion_threshold: f64,
) -> Result<(), EngineError> {
    match occupancy {
        OccupancySource::Motion(extractor) => {
            let mask = extractor.apply(frame)?;
            let signal = MotionRatio::new(mask_view(mask)?, motion_threshold);
            engine.observe_signal(&signal);
        }
        #[cfg(feature = "person-detector")]
        OccupancySource::Person {
            detector,
            class_name,
        } => {
            let detections = match detector.detect(frame) {
                Ok(d) => d,
                Err(e) => {
                    tracing::warn!(
                        frame = frame_index,
                        error = %e,
                        "person detection failed"
                    );
                    Vec::new()
                }
            };
            engine.observe_signal(&BoxOverlap::from_detections(&detections, class_name));
        }
    }
    #[cfg(not(feature = "person-detector"))]
    let _ = frame_index;
    Ok(())
}

pub fn spawn_analyzer(
    config: Config,
    paths: RunPaths,
    fps_override: Option<f64>,
    shutdown: Arc<AtomicBool>,
) -> tokio::task::JoinHandle<Result<ActivityReport, EngineError>> {
    tokio::task::spawn_blocking(move || {
        let analyzer = Analyzer::open(&config, &paths, fps_override)?;
        let input = paths.input.display().to_string();
        let mut last_decile = None;
        analyzer.run(&shutdown, |fraction| {
            let percent = (fraction * 100.0) as u32;
            if last_decile != Some(percent / 10) {
                last_decile = Some(percent / 10);
                tracing::info!(input = %input, progress = percent, "analyzing");
            }
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{self, Rect, Scalar, Size};
    use opencv::imgproc;
    use opencv::prelude::*;

    const FPS: f64 = 30.0;
    const CAR: (i32, i32, i32, i32) = (220, 190, 200, 100);
    // Inside the Fuel_Rig zone of the default layout for the car above.
    const CREW: (i32, i32, i32, i32) = (325, 185, 30, 30);

    fn fill(frame: &mut Mat, (x, y, w, h): (i32, i32, i32, i32), color: Scalar) {
        imgproc::rectangle(
            frame,
            Rect::new(x, y, w, h),
            color,
            imgproc::FILLED,
            imgproc::LINE_8,
            0,
        )
        .unwrap();
    }

    fn paint(crew: bool) -> Mat {
        let mut frame =
            Mat::new_rows_cols_with_default(480, 640, core::CV_8UC3, Scalar::all(40.0)).unwrap();
        fill(&mut frame, CAR, Scalar::new(0.0, 255.0, 180.0, 0.0));
        if crew {
            fill(&mut frame, CREW, Scalar::all(255.0));
        }
        frame
    }

    /// Parked car with a crew member standing in the fuel zone over `crew`.
    struct PaintedClip {
        frames: u64,
        crew: std::ops::Range<f64>,
        index: u64,
        frame: Mat,
    }

    impl PaintedClip {
        fn new(seconds: f64, crew: std::ops::Range<f64>) -> Self {
            Self {
                frames: (seconds * FPS) as u64,
                crew,
                index: 0,
                frame: Mat::default(),
            }
        }
    }

    impl FrameSource for PaintedClip {
        fn fps(&self) -> f64 {
            FPS
        }

        fn frame_count(&self) -> u64 {
            self.frames
        }

        fn next_frame(&mut self) -> Result<Option<&mut Mat>, EngineError> {
            if self.index >= self.frames {
                return Ok(None);
            }
            let t = self.index as f64 / FPS;
            self.frame = paint(self.crew.contains(&t));
            self.index += 1;
            Ok(Some(&mut self.frame))
        }
    }

    fn quick_config() -> Config {
        let mut config = Config::default();
        config.activity.patience_seconds = 0.1;
        config.activity.min_duration_seconds = 0.05;
        config
    }

    #[test]
    fn test_localizer_then_motion_drive_engine() {
        let analyzer =
            Analyzer::with_source(&quick_config(), PaintedClip::new(6.0, 3.0..5.0), None).unwrap();
        let shutdown = AtomicBool::new(false);
        let mut fractions = Vec::new();
        let report = analyzer.run(&shutdown, |f| fractions.push(f)).unwrap();

        assert_eq!(report.frames_processed, 180);
        let lock = report.lock.unwrap();
        assert_eq!(lock.frame_index, 16);
        assert!((lock.pose.center.x - 320.0).abs() < 2.0);
        assert_eq!(report.zones.len(), 6);

        assert!(!report.events.is_empty());
        assert!(report.events.iter().all(|e| e.zone == "Fuel_Rig"), "{:?}", report.events);
        assert!((report.events[0].start - 3.0).abs() < 0.05);

        // Every 10 frames, then the final 1.0.
        assert_eq!(fractions.len(), 19);
        assert!(fractions.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(fractions.last().copied(), Some(1.0));
    }

    #[test]
    fn test_shutdown_before_first_frame_is_partial() {
        let analyzer =
            Analyzer::with_source(&Config::default(), PaintedClip::new(2.0, 0.0..0.0), None)
                .unwrap();
        let shutdown = AtomicBool::new(true);
        let mut calls = 0;
        let report = analyzer.run(&shutdown, |_| calls += 1).unwrap();

        assert_eq!(report.frames_processed, 0);
        assert!(report.lock.is_none());
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_shutdown_mid_run_keeps_progress_so_far() {
        let analyzer =
            Analyzer::with_source(&Config::default(), PaintedClip::new(6.0, 0.0..0.0), None)
                .unwrap();
        let shutdown = AtomicBool::new(false);
        let report = analyzer
            .run(&shutdown, |f| {
                if f >= 0.25 {
                    shutdown.store(true, Ordering::Relaxed);
                }
            })
            .unwrap();

        assert_eq!(report.frames_processed, 50);
        assert!(report.lock.is_some());
    }

    #[test]
    fn test_empty_source_is_an_error() {
        let analyzer =
            Analyzer::with_source(&Config::default(), PaintedClip::new(0.0, 0.0..0.0), None)
                .unwrap();
        let result = analyzer.run(&AtomicBool::new(false), |_| {});
        assert!(matches!(result, Err(EngineError::EmptyVideo(_))));
    }

    #[test]
    fn test_runs_written_clip_with_overlay() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("clip.avi");
        let overlay = dir.path().join("overlay.avi");

        let mut writer = open_writer(&input, FPS, Size::new(640, 480)).unwrap();
        let frame = paint(false);
        for _ in 0..40 {
            writer.write(&frame).unwrap();
        }
        writer.release().unwrap();

        let paths = RunPaths {
            input,
            overlay: Some(overlay.clone()),
        };
        let analyzer = Analyzer::open(&Config::default(), &paths, None).unwrap();
        let report = analyzer.run(&AtomicBool::new(false), |_| {}).unwrap();

        assert_eq!(report.frames_processed, 40);
        assert!(report.lock.is_some());
        assert!(report.events.is_empty());
        assert!(std::fs::metadata(&overlay).unwrap().len() > 0);
    }

    #[test]
    fn test_missing_file_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let paths = RunPaths {
            input: dir.path().join("missing.avi"),
            overlay: None,
        };
        assert!(Analyzer::open(&Config::default(), &paths, None).is_err());
    }
}
