use pcd_rs::{PcdDeserialize, PcdSerialize};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A point with the `x y z intensity` layout libpcl names `PointXYZI`.
#[derive(
    Debug, Clone, Copy, PartialEq, Default, PcdDeserialize, PcdSerialize, Serialize, Deserialize,
)]
pub struct PointXyzi {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub intensity: f32,
}

impl PointXyzi {
    pub fn new(x: f32, y: f32, z: f32, intensity: f32) -> Self {
        Self { x, y, z, intensity }
    }

    pub fn xyz(&self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }

    pub fn get(&self, field: PointField) -> f32 {
        match field {
            PointField::X => self.x,
            PointField::Y => self.y,
            PointField::Z => self.z,
            PointField::Intensity => self.intensity,
        }
    }
}

/// Scalar fields of [PointXyzi].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointField {
    X,
    Y,
    Z,
    Intensity,
}

impl PointField {
    pub fn name(&self) -> &'static str {
        match self {
            PointField::X => "x",
            PointField::Y => "y",
            PointField::Z => "z",
            PointField::Intensity => "intensity",
        }
    }
}

/// One sweep of the sensor.
///
/// Frames are immutable once built and are passed around as [FrameRef], so
/// handing a frame to another thread never copies the points.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Frame {
    pub seq: u64,
    pub points: Vec<PointXyzi>,
}

pub type FrameRef = Arc<Frame>;

impl Frame {
    pub fn new(seq: u64, points: Vec<PointXyzi>) -> Self {
        Self { seq, points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Minimum and maximum of `field` over all points, or `None` for an
    /// empty frame. NaN values are skipped.
    pub fn field_range(&self, field: PointField) -> Option<(f32, f32)> {
        self.points
            .iter()
            .map(|point| point.get(field))
            .filter(|value| !value.is_nan())
            .fold(None, |range, value| match range {
                None => Some((value, value)),
                Some((min, max)) => Some((min.min(value), max.max(value))),
            })
    }

    /// Axis-aligned bounds as `(min, max)` corners.
    pub fn bounds(&self) -> Option<([f32; 3], [f32; 3])> {
        let (min_x, max_x) = self.field_range(PointField::X)?;
        let (min_y, max_y) = self.field_range(PointField::Y)?;
        let (min_z, max_z) = self.field_range(PointField::Z)?;
        Some(([min_x, min_y, min_z], [max_x, max_y, max_z]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> Frame {
        Frame::new(
            7,
            vec![
                PointXyzi::new(1.0, -2.0, 0.5, 10.0),
                PointXyzi::new(-3.0, 4.0, 0.0, 200.0),
                PointXyzi::new(0.0, 0.0, f32::NAN, 55.0),
            ],
        )
    }

    #[test]
    fn field_range_skips_nan() {
        let frame = frame();
        assert_eq!(frame.field_range(PointField::Intensity), Some((10.0, 200.0)));
        assert_eq!(frame.field_range(PointField::Z), Some((0.0, 0.5)));
    }

    #[test]
    fn empty_frame_has_no_bounds() {
        let frame = Frame::default();
        assert!(frame.is_empty());
        assert_eq!(frame.bounds(), None);
    }

    #[test]
    fn bounds_cover_all_points() {
        let (min, max) = frame().bounds().unwrap();
        assert_eq!(min, [-3.0, -2.0, 0.0]);
        assert_eq!(max, [1.0, 4.0, 0.5]);
    }

    #[test]
    fn point_field_uses_lowercase_names() {
        let json = serde_json::to_string(&PointField::Intensity).unwrap();
        assert_eq!(json, "\"intensity\"");
        assert_eq!(PointField::Intensity.name(), "intensity");
    }
}
