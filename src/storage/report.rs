use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;

use crate::engine::{LockedPose, Zone};
use crate::error::EngineError;

use super::ActivityEvent;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneSummary {
    pub total_duration: f64,
    pub first_activity: Option<f64>,
    pub event_count: usize,
}

/// Per-zone totals. Every name in `zone_names` gets an entry, active or not.
pub fn summarize<'a>(
    events: &[ActivityEvent],
    zone_names: impl IntoIterator<Item = &'a str>,
) -> BTreeMap<String, ZoneSummary> {
    let mut summary: BTreeMap<String, ZoneSummary> = zone_names
        .into_iter()
        .map(|name| {
            (
                name.to_string(),
                ZoneSummary {
                    total_duration: 0.0,
                    first_activity: None,
                    event_count: 0,
                },
            )
        })
        .collect();

    for event in events {
        let entry = summary
            .entry(event.zone.clone())
            .or_insert_with(|| ZoneSummary {
                total_duration: 0.0,
                first_activity: None,
                event_count: 0,
            });
        entry.total_duration += event.duration;
        entry.event_count += 1;
        entry.first_activity = Some(match entry.first_activity {
            Some(first) => first.min(event.start),
            None => event.start,
        });
    }

    summary
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityReport {
    pub fps: f64,
    pub frames_processed: u64,
    pub lock: Option<LockedPose>,
    pub zones: Vec<Zone>,
    pub events: Vec<ActivityEvent>,
    pub summary: BTreeMap<String, ZoneSummary>,
}

impl ActivityReport {
    /// Events ordered by start time, for timeline display.
    pub fn timeline(&self) -> Vec<&ActivityEvent> {
        let mut events: Vec<&ActivityEvent> = self.events.iter().collect();
        events.sort_by(|a, b| a.start.total_cmp(&b.start).then_with(|| a.zone.cmp(&b.zone)));
        events
    }

    pub fn to_json(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<(), EngineError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
