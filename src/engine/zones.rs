use serde::Serialize;

use crate::config::{BoxLayout, OffsetLayout, ZoneLayout};
use crate::geometry::{rotate_offset, Point, Rect, RotatedRect};

use super::Pose;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ZoneShape {
    Aligned(Rect),
    Rotated(RotatedRect),
}

impl ZoneShape {
    pub fn bounding_rect(&self) -> Rect {
        match self {
            ZoneShape::Aligned(rect) => *rect,
            ZoneShape::Rotated(rotated) => rotated.bounding_rect(),
        }
    }

    pub fn center(&self) -> Point {
        match self {
            ZoneShape::Aligned(rect) => rect.center(),
            ZoneShape::Rotated(rotated) => rotated.center,
        }
    }

    pub fn contains(&self, p: Point) -> bool {
        match self {
            ZoneShape::Aligned(rect) => {
                p.x >= rect.x && p.x < rect.right() && p.y >= rect.y && p.y < rect.bottom()
            }
            ZoneShape::Rotated(rotated) => rotated.contains(p),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Zone {
    pub name: String,
    pub shape: ZoneShape,
}

/// The fixed set of zones for one run, in configured order.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct ZoneSet {
    zones: Vec<Zone>,
}

impl ZoneSet {
    pub fn iter(&self) -> std::slice::Iter<'_, Zone> {
        self.zones.iter()
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Zone> {
        self.zones.iter().find(|z| z.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.zones.iter().map(|z| z.name.as_str())
    }
}

impl<'a> IntoIterator for &'a ZoneSet {
    type Item = &'a Zone;
    type IntoIter = std::slice::Iter<'a, Zone>;

    fn into_iter(self) -> Self::IntoIter {
        self.zones.iter()
    }
}

/// Derives the zone set anchored to `pose`. Pure: same inputs, same zones.
pub fn generate(layout: &ZoneLayout, pose: &Pose) -> ZoneSet {
    let zones = match layout {
        ZoneLayout::Offset(offset) => offset_zones(offset, pose),
        ZoneLayout::BoundingBox(bbox) => bounding_box_zones(bbox, pose),
    };
    ZoneSet { zones }
}

fn offset_zones(layout: &OffsetLayout, pose: &Pose) -> Vec<Zone> {
    let side = pose.width * layout.extent_fraction;

    layout
        .zones
        .iter()
        .map(|template| {
            let dx = pose.length * template.along;
            let dy = pose.width * template.across;
            let (rx, ry) = rotate_offset(dx, dy, pose.angle);
            let center = pose.center.offset(rx, ry);

            let shape = if layout.oriented {
                ZoneShape::Rotated(RotatedRect {
                    center,
                    width: side,
                    height: side,
                    angle: pose.angle,
                })
            } else {
                ZoneShape::Aligned(Rect::centered(center, side, side))
            };

            Zone {
                name: template.name.clone(),
                shape,
            }
        })
        .collect()
}

// Assumes the vehicle faces left-to-right; no rotation term.
fn bounding_box_zones(layout: &BoxLayout, pose: &Pose) -> Vec<Zone> {
    let bounds = pose.bounding_rect();

    layout
        .zones
        .iter()
        .map(|template| {
            let rect = Rect::new(
                bounds.x + template.origin[0] * bounds.width + template.padding[0],
                bounds.y + template.origin[1] * bounds.height + template.padding[1],
                template.size[0] * bounds.width,
                template.size[1] * bounds.height,
            );
            Zone {
                name: template.name.clone(),
                shape: ZoneShape::Aligned(rect),
            }
        })
        .collect()
}
