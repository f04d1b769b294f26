mod activity;
mod occupancy;
mod pose;
mod stability;
mod zones;

pub use activity::{Debounce, Phase, ZoneMachine, ZoneState, ZoneTracker};
pub use occupancy::{class_id, BoxOverlap, Detection, MotionRatio, OccupancySignal, COCO_CLASSES};
pub use pose::Pose;
pub use stability::{GateState, LockedPose, StabilityGate};
pub use zones::{generate, Zone, ZoneSet, ZoneShape};

use crate::config::{ActivityConfig, Config, StabilityConfig, ZoneLayout};
use crate::error::EngineError;
use crate::storage::{summarize, ActivityLog, ActivityReport};

/// Converts frame indices to elapsed seconds at a constant frame rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameClock {
    fps: f64,
}

impl FrameClock {
    pub fn new(fps: f64) -> Result<Self, EngineError> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(EngineError::InvalidFrameRate(fps));
        }
        Ok(Self { fps })
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn time_of(&self, frame_index: u64) -> f64 {
        frame_index as f64 / self.fps
    }

    /// Whole frames spanned by `seconds`, absorbing the rounding error of
    /// products like `0.29 * 100.0`.
    pub fn whole_frames(&self, seconds: f64) -> u64 {
        (seconds * self.fps + 1e-6).floor().max(0.0) as u64
    }
}

/// The tuning the engine itself needs; vision adapters take the rest of [`Config`].
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub stability: StabilityConfig,
    pub zones: ZoneLayout,
    pub activity: ActivityConfig,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        self.stability.validate()?;
        self.zones.validate()?;
        self.activity.validate()?;
        Ok(())
    }
}

impl From<&Config> for EngineConfig {
    fn from(config: &Config) -> Self {
        Self {
            stability: config.stability.clone(),
            zones: config.zones.clone(),
            activity: config.activity.clone(),
        }
    }
}

/// Zone outline plus current phase, for overlay rendering.
pub struct ZoneStatus<'a> {
    pub zone: &'a Zone,
    pub active: bool,
}

struct LockedRun {
    zones: ZoneSet,
    tracker: ZoneTracker,
}

/// Frame-sequential activity detection: searches for the vehicle until the
/// stability gate locks, generates zones once, then runs the per-zone
/// state machines on every later frame.
pub struct ActivityEngine {
    clock: FrameClock,
    config: EngineConfig,
    gate: StabilityGate,
    run: Option<LockedRun>,
    log: ActivityLog,
    frame_index: u64,
}

impl ActivityEngine {
    pub fn new(config: EngineConfig, fps: f64) -> Result<Self, EngineError> {
        let clock = FrameClock::new(fps)?;
        config.validate()?;
        let gate = StabilityGate::new(&config.stability, fps);

        Ok(Self {
            clock,
            config,
            gate,
            run: None,
            log: ActivityLog::new(),
            frame_index: 0,
        })
    }

    pub fn clock(&self) -> FrameClock {
        self.clock
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn is_locked(&self) -> bool {
        self.run.is_some()
    }

    pub fn zones(&self) -> Option<&ZoneSet> {
        self.run.as_ref().map(|r| &r.zones)
    }

    pub fn log(&self) -> &ActivityLog {
        &self.log
    }

    /// Consumes the current frame as a pre-lock frame. Returns the zone set
    /// on the frame that locks the vehicle; after lock the candidate is ignored.
    pub fn observe_candidate(&mut self, candidate: Option<Pose>) -> Option<&ZoneSet> {
        let frame_index = self.frame_index;
        let t = self.clock.time_of(frame_index);
        self.frame_index += 1;

        if self.run.is_some() {
            return None;
        }

        if let Some(pose) = &candidate {
            tracing::trace!(
                frame = frame_index,
                x = format!("{:.1}", pose.center.x),
                y = format!("{:.1}", pose.center.y),
                "vehicle candidate"
            );
        }

        match self.gate.observe(candidate, frame_index, t) {
            GateState::Locked(locked) => {
                let zones = generate(&self.config.zones, &locked.pose);
                tracing::info!(zones = zones.len(), "zones generated");
                let tracker = ZoneTracker::new(&zones, &self.config.activity, self.clock);
                let run = self.run.insert(LockedRun { zones, tracker });
                Some(&run.zones)
            }
            GateState::Searching { .. } => None,
        }
    }

    /// Consumes the current frame as a post-lock frame, sampling every zone
    /// against `signal`. Before lock the frame only advances the clock.
    pub fn observe_signal(&mut self, signal: &dyn OccupancySignal) {
        let frame_index = self.frame_index;
        self.frame_index += 1;

        if let Some(run) = &mut self.run {
            run.tracker.update(&run.zones, signal, frame_index, &mut self.log);
        }
    }

    pub fn zone_status(&self) -> Vec<ZoneStatus<'_>> {
        match &self.run {
            Some(run) => run
                .zones
                .iter()
                .map(|zone| ZoneStatus {
                    zone,
                    active: run.tracker.is_active(&zone.name),
                })
                .collect(),
            None => Vec::new(),
        }
    }

    /// Ends the run and reduces the log into the final report.
    pub fn finish(mut self) -> ActivityReport {
        if self.config.activity.close_open_intervals {
            if let Some(run) = &mut self.run {
                run.tracker.flush(&mut self.log);
            }
        }

        let zones: Vec<Zone> = self
            .run
            .map(|r| r.zones.iter().cloned().collect())
            .unwrap_or_default();
        let summary = summarize(self.log.events(), zones.iter().map(|z| z.name.as_str()));

        tracing::info!(
            frames = self.frame_index,
            locked = self.gate.locked().is_some(),
            events = self.log.len(),
            "analysis finished"
        );

        ActivityReport {
            fps: self.clock.fps(),
            frames_processed: self.frame_index,
            lock: self.gate.locked(),
            zones,
            events: self.log.into_events(),
            summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Point, Rect};
    use ndarray::{s, Array2};

    const FPS: f64 = 30.0;
    const WIDTH: usize = 640;
    const HEIGHT: usize = 480;

    fn centered_car() -> Pose {
        Pose::from_sides(Point::new(320.0, 240.0), 200.0, 100.0, 0.0)
    }

    struct Fixed(bool);

    impl OccupancySignal for Fixed {
        fn is_busy(&self, _zone: &Zone) -> bool {
            self.0
        }
    }

    struct OnlyZone<'a> {
        name: &'a str,
        busy: bool,
    }

    impl OccupancySignal for OnlyZone<'_> {
        fn is_busy(&self, zone: &Zone) -> bool {
            self.busy && zone.name == self.name
        }
    }

    fn locked_engine(config: EngineConfig) -> ActivityEngine {
        let mut engine = ActivityEngine::new(config, FPS).unwrap();
        while !engine.is_locked() {
            engine.observe_candidate(Some(centered_car()));
        }
        engine
    }

    #[test]
    fn test_whole_frames() {
        let clock = FrameClock::new(FPS).unwrap();
        assert_eq!(clock.whole_frames(0.5), 15);
        assert_eq!(clock.whole_frames(1.5), 45);
        assert_eq!(clock.whole_frames(0.0), 0);
        assert_eq!(FrameClock::new(100.0).unwrap().whole_frames(0.29), 29);
        assert_eq!(FrameClock::new(25.0).unwrap().whole_frames(0.5), 12);
    }

    #[test]
    fn test_patience_gap_at_any_lock_frame() {
        let pattern = [(true, 30), (false, 15), (true, 30), (false, 40)];
        for lead in 0..120 {
            let mut engine = locked_engine(EngineConfig::default());
            for _ in 0..lead {
                engine.observe_signal(&Fixed(false));
            }
            for (busy, n) in pattern {
                for _ in 0..n {
                    engine.observe_signal(&OnlyZone {
                        name: "Fuel_Rig",
                        busy,
                    });
                }
            }
            let report = engine.finish();
            assert_eq!(report.events.len(), 1, "lead {lead}: {:?}", report.events);
        }
    }

    #[test]
    fn test_rejects_bad_frame_rate_and_config() {
        assert!(matches!(
            ActivityEngine::new(EngineConfig::default(), 0.0),
            Err(EngineError::InvalidFrameRate(_))
        ));
        assert!(ActivityEngine::new(EngineConfig::default(), f64::NAN).is_err());

        let mut config = EngineConfig::default();
        config.activity.patience_seconds = -1.0;
        assert!(matches!(
            ActivityEngine::new(config, FPS),
            Err(EngineError::Config(_))
        ));
    }

    #[test]
    fn test_never_locked_run_is_empty() {
        let mut engine = ActivityEngine::new(EngineConfig::default(), FPS).unwrap();
        for _ in 0..300 {
            engine.observe_candidate(None);
        }
        let report = engine.finish();
        assert!(report.lock.is_none());
        assert!(report.zones.is_empty());
        assert!(report.events.is_empty());
        assert!(report.summary.is_empty());
        assert_eq!(report.frames_processed, 300);
    }

    #[test]
    fn test_zones_generated_once() {
        let mut engine = ActivityEngine::new(EngineConfig::default(), FPS).unwrap();
        let mut generated = 0;
        for _ in 0..40 {
            if engine.observe_candidate(Some(centered_car())).is_some() {
                generated += 1;
            }
        }
        assert_eq!(generated, 1);

        let before = engine.zones().unwrap().clone();
        let moved = Pose::from_sides(Point::new(100.0, 100.0), 300.0, 90.0, 45.0);
        for _ in 0..40 {
            assert!(engine.observe_candidate(Some(moved)).is_none());
        }
        assert_eq!(engine.zones().unwrap(), &before);
    }

    #[test]
    fn test_debounce_scenario() {
        let mut engine = locked_engine(EngineConfig::default());
        let pattern = [(true, 60), (false, 10), (true, 5), (false, 20)];
        let first_busy = engine.clock().time_of(engine.frame_index());
        for (busy, n) in pattern {
            for _ in 0..n {
                engine.observe_signal(&OnlyZone {
                    name: "FL_Tire",
                    busy,
                });
            }
        }
        let report = engine.finish();

        assert_eq!(report.events.len(), 1);
        let event = &report.events[0];
        assert_eq!(event.zone, "FL_Tire");
        assert!((event.start - first_busy).abs() < 1e-9);
        assert!((event.finish - (first_busy + 74.0 / FPS)).abs() < 1e-9);
        assert!(event.duration >= 1.5);
        assert_eq!(report.summary["FL_Tire"].event_count, 1);
        assert_eq!(report.summary["Jack"].event_count, 0);
    }

    #[test]
    fn test_short_activity_logs_nothing() {
        let mut engine = locked_engine(EngineConfig::default());
        for i in 0..80 {
            engine.observe_signal(&Fixed(i < 20));
        }
        assert!(engine.finish().events.is_empty());
    }

    #[test]
    fn test_close_open_intervals_at_end() {
        let mut config = EngineConfig::default();
        config.activity.close_open_intervals = true;
        let mut engine = locked_engine(config);
        for _ in 0..90 {
            engine.observe_signal(&OnlyZone {
                name: "Jack",
                busy: true,
            });
        }
        let report = engine.finish();
        assert_eq!(report.events.len(), 1);
        assert_eq!(report.events[0].zone, "Jack");

        let mut engine = locked_engine(EngineConfig::default());
        for _ in 0..90 {
            engine.observe_signal(&Fixed(true));
        }
        assert!(engine.finish().events.is_empty());
    }

    #[test]
    fn test_out_of_bounds_zone_logs_nothing() {
        let config = EngineConfig {
            zones: ZoneLayout::Offset(crate::config::OffsetLayout {
                extent_fraction: 0.4,
                oriented: false,
                zones: vec![crate::config::OffsetZone::new("Far_Away", 50.0, 50.0)],
            }),
            ..EngineConfig::default()
        };
        let mut engine = locked_engine(config);
        let mask = Array2::<u8>::from_elem((HEIGHT, WIDTH), 255);
        for _ in 0..120 {
            let signal = MotionRatio::new(mask.view(), 0.15);
            assert!(!signal.is_busy(engine.zones().unwrap().get("Far_Away").unwrap()));
            engine.observe_signal(&signal);
        }
        assert!(engine.finish().events.is_empty());
    }

    fn replay() -> String {
        let mut engine = ActivityEngine::new(EngineConfig::default(), FPS).unwrap();
        let mut state = 7u32;
        for _ in 0..20 {
            engine.observe_candidate(Some(centered_car()));
        }
        for i in 0..600u32 {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            let phase = (i / 45) % 2 == 0;
            engine.observe_signal(&OnlyZone {
                name: if (state >> 16) % 3 == 0 { "Jack" } else { "RR_Tire" },
                busy: phase,
            });
        }
        engine.finish().to_json().unwrap()
    }

    #[test]
    fn test_replay_is_identical() {
        assert_eq!(replay(), replay());
    }

    #[test]
    fn test_end_to_end_fuel_rig_burst() {
        let mut engine = ActivityEngine::new(EngineConfig::default(), FPS).unwrap();

        let idle = Array2::<u8>::zeros((HEIGHT, WIDTH));
        let mut burst = Array2::<u8>::zeros((HEIGHT, WIDTH));
        let fuel = Rect::new(320.0, 180.0, 40.0, 40.0);
        burst
            .slice_mut(s![
                fuel.y as usize..fuel.bottom() as usize,
                fuel.x as usize..fuel.right() as usize
            ])
            .fill(255);

        let frames = (10.0 * FPS) as u64;
        for i in 0..frames {
            if !engine.is_locked() {
                engine.observe_candidate(Some(centered_car()));
                continue;
            }
            let t = engine.clock().time_of(i);
            let mask = if (3.0..5.0).contains(&t) { &burst } else { &idle };
            engine.observe_signal(&MotionRatio::new(mask.view(), 0.15));
        }

        let report = engine.finish();
        let lock = report.lock.unwrap();
        assert!(lock.time <= 0.6, "locked at {}", lock.time);
        assert_eq!(report.frames_processed, frames);

        assert_eq!(report.events.len(), 1, "{:?}", report.events);
        let event = &report.events[0];
        assert_eq!(event.zone, "Fuel_Rig");
        assert!((event.start - 3.0).abs() < 0.05);
        assert!((event.finish - 5.0).abs() < 0.05);
        assert!((event.duration - 2.0).abs() < 0.05);

        for (name, summary) in &report.summary {
            if name != "Fuel_Rig" {
                assert_eq!(summary.event_count, 0, "{name}");
            }
        }
    }
}
