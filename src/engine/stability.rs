use serde::Serialize;

use crate::config::{MissPolicy, StabilityConfig};

use super::Pose;

/// The reference pose adopted once the vehicle came to rest.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LockedPose {
    pub pose: Pose,
    pub frame_index: u64,
    pub time: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateState {
    Searching { stable_frames: u32 },
    Locked(LockedPose),
}

/// Watches candidate poses until the vehicle stops moving, then locks one
/// pose for the rest of the run.
pub struct StabilityGate {
    required_frames: f64,
    tolerance_px: f64,
    miss_policy: MissPolicy,
    stable_frames: u32,
    last_pose: Option<Pose>,
    locked: Option<LockedPose>,
}

impl StabilityGate {
    pub fn new(config: &StabilityConfig, fps: f64) -> Self {
        Self {
            required_frames: fps * config.stable_seconds,
            tolerance_px: config.movement_tolerance_px,
            miss_policy: config.miss_policy,
            stable_frames: 0,
            last_pose: None,
            locked: None,
        }
    }

    pub fn locked(&self) -> Option<LockedPose> {
        self.locked
    }

    pub fn state(&self) -> GateState {
        match self.locked {
            Some(locked) => GateState::Locked(locked),
            None => GateState::Searching {
                stable_frames: self.stable_frames,
            },
        }
    }

    /// Feeds one frame's candidate. Once locked, candidates are ignored.
    pub fn observe(&mut self, candidate: Option<Pose>, frame_index: u64, time: f64) -> GateState {
        if self.locked.is_some() {
            return self.state();
        }

        let Some(pose) = candidate else {
            if self.miss_policy == MissPolicy::Reset {
                self.stable_frames = 0;
                self.last_pose = None;
            }
            return self.state();
        };

        if let Some(last) = self.last_pose {
            let movement = pose.center.distance(&last.center);
            if movement < self.tolerance_px {
                self.stable_frames += 1;
            } else {
                tracing::trace!(frame = frame_index, movement, "vehicle still moving");
                self.stable_frames = 0;
            }
        }
        self.last_pose = Some(pose);

        if self.stable_frames as f64 > self.required_frames {
            let locked = LockedPose {
                pose,
                frame_index,
                time,
            };
            tracing::info!(
                frame = frame_index,
                time = format!("{:.2}", time),
                x = format!("{:.1}", pose.center.x),
                y = format!("{:.1}", pose.center.y),
                angle = format!("{:.1}", pose.angle),
                "vehicle locked"
            );
            self.locked = Some(locked);
        }

        self.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;

    const FPS: f64 = 30.0;

    fn pose_at(x: f64) -> Pose {
        Pose::from_sides(Point::new(x, 100.0), 200.0, 100.0, 0.0)
    }

    fn gate(policy: MissPolicy) -> StabilityGate {
        StabilityGate::new(
            &StabilityConfig {
                stable_seconds: 0.5,
                movement_tolerance_px: 2.0,
                miss_policy: policy,
            },
            FPS,
        )
    }

    fn feed(gate: &mut StabilityGate, frames: &[Option<Pose>]) -> Option<LockedPose> {
        for (i, candidate) in frames.iter().enumerate() {
            gate.observe(*candidate, i as u64, i as f64 / FPS);
        }
        gate.locked()
    }

    #[test]
    fn test_locks_after_dwell() {
        let mut g = gate(MissPolicy::Hold);
        let frames: Vec<_> = (0..17).map(|_| Some(pose_at(100.0))).collect();
        let locked = feed(&mut g, &frames).unwrap();
        // First sighting only seeds the reference; 16 stable frames exceed 15.
        assert_eq!(locked.frame_index, 16);
        assert!(locked.time < 0.6);
    }

    #[test]
    fn test_no_premature_lock() {
        let mut g = gate(MissPolicy::Hold);
        let mut frames = Vec::new();
        for _ in 0..4 {
            // Seed plus 14 stable frames, then a jump.
            frames.extend((0..15).map(|_| Some(pose_at(100.0))));
            frames.push(Some(pose_at(150.0)));
            frames.extend((0..14).map(|_| Some(pose_at(150.0))));
            frames.push(Some(pose_at(100.0)));
        }
        assert!(feed(&mut g, &frames).is_none());
        assert!(matches!(g.state(), GateState::Searching { .. }));
    }

    #[test]
    fn test_small_drift_counts_as_stable() {
        let mut g = gate(MissPolicy::Hold);
        let frames: Vec<_> = (0..17).map(|i| Some(pose_at(100.0 + i as f64 * 1.5))).collect();
        assert!(feed(&mut g, &frames).is_some());
    }

    #[test]
    fn test_hold_policy_tolerates_dropouts() {
        let mut g = gate(MissPolicy::Hold);
        let mut frames = Vec::new();
        frames.push(Some(pose_at(100.0)));
        for _ in 0..16 {
            frames.push(Some(pose_at(100.0)));
            frames.push(None);
        }
        let locked = feed(&mut g, &frames).unwrap();
        assert_eq!(locked.frame_index, 31);
    }

    #[test]
    fn test_reset_policy_restarts_on_dropout() {
        let mut g = gate(MissPolicy::Reset);
        let mut frames = Vec::new();
        frames.push(Some(pose_at(100.0)));
        for _ in 0..16 {
            frames.push(Some(pose_at(100.0)));
            frames.push(None);
        }
        assert!(feed(&mut g, &frames).is_none());

        // An unbroken run still locks under the reset policy.
        let frames: Vec<_> = (0..17).map(|_| Some(pose_at(100.0))).collect();
        let mut g = gate(MissPolicy::Reset);
        assert!(feed(&mut g, &frames).is_some());
    }

    #[test]
    fn test_lock_is_permanent() {
        let mut g = gate(MissPolicy::Hold);
        let frames: Vec<_> = (0..17).map(|_| Some(pose_at(100.0))).collect();
        let locked = feed(&mut g, &frames).unwrap();

        g.observe(Some(pose_at(400.0)), 17, 17.0 / FPS);
        g.observe(None, 18, 18.0 / FPS);
        assert_eq!(g.state(), GateState::Locked(locked));
    }
}
