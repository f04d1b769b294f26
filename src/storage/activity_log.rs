use serde::Serialize;

/// A finished, filtered interval of crew activity in one zone. Times are
/// seconds from the start of the video.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityEvent {
    pub zone: String,
    pub start: f64,
    pub finish: f64,
    pub duration: f64,
}

/// Append-only, in completion order.
#[derive(Debug, Clone, Default)]
pub struct ActivityLog {
    events: Vec<ActivityEvent>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: ActivityEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[ActivityEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn into_events(self) -> Vec<ActivityEvent> {
        self.events
    }
}
