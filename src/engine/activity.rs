use serde::Serialize;

use crate::config::ActivityConfig;
use crate::storage::{ActivityEvent, ActivityLog};

use super::{FrameClock, OccupancySignal, ZoneSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Active,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneState {
    pub phase: Phase,
    pub start_frame: u64,
    pub last_active_frame: u64,
}

impl Default for ZoneState {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            start_frame: 0,
            last_active_frame: 0,
        }
    }
}

/// Patience and minimum duration counted in whole frames. Interval edges are
/// compared as frame counts so the outcome for a given busy/idle pattern does
/// not depend on where in the video it falls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Debounce {
    clock: FrameClock,
    patience_frames: u64,
    min_duration_frames: u64,
}

impl Debounce {
    pub fn new(config: &ActivityConfig, clock: FrameClock) -> Self {
        Self {
            clock,
            patience_frames: clock.whole_frames(config.patience_seconds),
            min_duration_frames: clock.whole_frames(config.min_duration_seconds),
        }
    }

    pub fn patience_frames(&self) -> u64 {
        self.patience_frames
    }

    pub fn min_duration_frames(&self) -> u64 {
        self.min_duration_frames
    }
}

/// Debounced Idle/Active machine for one zone.
#[derive(Debug, Clone)]
pub struct ZoneMachine {
    name: String,
    state: ZoneState,
}

impl ZoneMachine {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: ZoneState::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> &ZoneState {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.phase == Phase::Active
    }

    /// Applies the sample taken at `frame`. Returns the finished interval
    /// when the zone falls idle and the interval outlasted the minimum.
    pub fn update(&mut self, busy: bool, frame: u64, debounce: &Debounce) -> Option<ActivityEvent> {
        if busy {
            self.state.last_active_frame = frame;
            if self.state.phase == Phase::Idle {
                self.state.phase = Phase::Active;
                self.state.start_frame = frame;
                tracing::debug!(
                    zone = %self.name,
                    frame,
                    time = format!("{:.2}", debounce.clock.time_of(frame)),
                    "activity started"
                );
            }
        }

        if self.state.phase == Phase::Active
            && frame.saturating_sub(self.state.last_active_frame) > debounce.patience_frames
        {
            return self.close(debounce);
        }

        None
    }

    /// Closes an open interval at its last active frame.
    pub fn flush(&mut self, debounce: &Debounce) -> Option<ActivityEvent> {
        if self.state.phase == Phase::Active {
            return self.close(debounce);
        }
        None
    }

    fn close(&mut self, debounce: &Debounce) -> Option<ActivityEvent> {
        self.state.phase = Phase::Idle;
        let span = self.state.last_active_frame - self.state.start_frame;
        let start = debounce.clock.time_of(self.state.start_frame);
        let finish = debounce.clock.time_of(self.state.last_active_frame);
        let duration = span as f64 / debounce.clock.fps();

        if span > debounce.min_duration_frames {
            tracing::debug!(
                zone = %self.name,
                start = format!("{:.2}", start),
                duration = format!("{:.2}", duration),
                "activity logged"
            );
            Some(ActivityEvent {
                zone: self.name.clone(),
                start,
                finish,
                duration,
            })
        } else {
            tracing::debug!(
                zone = %self.name,
                duration = format!("{:.2}", duration),
                "activity too short, discarded"
            );
            None
        }
    }
}

/// One machine per generated zone, created at lock time.
pub struct ZoneTracker {
    debounce: Debounce,
    machines: Vec<ZoneMachine>,
}

impl ZoneTracker {
    pub fn new(zones: &ZoneSet, config: &ActivityConfig, clock: FrameClock) -> Self {
        Self {
            debounce: Debounce::new(config, clock),
            machines: zones.names().map(ZoneMachine::new).collect(),
        }
    }

    pub fn is_active(&self, zone: &str) -> bool {
        self.machines
            .iter()
            .any(|m| m.name() == zone && m.is_active())
    }

    /// Samples every zone against the frame's signal and advances its machine.
    pub fn update(
        &mut self,
        zones: &ZoneSet,
        signal: &dyn OccupancySignal,
        frame: u64,
        log: &mut ActivityLog,
    ) {
        for (zone, machine) in zones.iter().zip(self.machines.iter_mut()) {
            let busy = signal.is_busy(zone);
            if let Some(event) = machine.update(busy, frame, &self.debounce) {
                log.push(event);
            }
        }
    }

    pub fn flush(&mut self, log: &mut ActivityLog) {
        for machine in &mut self.machines {
            if let Some(event) = machine.flush(&self.debounce) {
                log.push(event);
            }
        }
    }
}
