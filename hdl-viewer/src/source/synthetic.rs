use super::{FrameStream, OpenStream, Playback, PlaybackSource};
use cloud_format::PointXyzi;
use eyre::Result;
use std::f32::consts::{PI, TAU};

/// A fake spinning LIDAR.
///
/// Every frame is a full revolution of `lasers` beams spread over the
/// HDL-32E vertical field of view, sampled at `columns` azimuths. The range
/// pattern rotates a little every frame so consecutive frames differ.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticScan {
    pub lasers: usize,
    pub columns: usize,
    /// Mean range in meters.
    pub range: f32,
    /// Number of frames per pass; `None` scans forever.
    pub frames: Option<usize>,
}

impl Default for SyntheticScan {
    fn default() -> Self {
        Self {
            lasers: 32,
            columns: 360,
            range: 12.0,
            frames: None,
        }
    }
}

const MIN_ELEVATION_DEG: f32 = -30.67;
const MAX_ELEVATION_DEG: f32 = 10.67;

impl SyntheticScan {
    /// Points of the frame at `index`.
    pub fn frame_points(&self, index: u64) -> Vec<PointXyzi> {
        let phase = (index % 360) as f32 * PI / 180.0;
        let elevation_step = if self.lasers > 1 {
            (MAX_ELEVATION_DEG - MIN_ELEVATION_DEG) / (self.lasers - 1) as f32
        } else {
            0.0
        };

        let mut points = Vec::with_capacity(self.lasers * self.columns);
        for laser in 0..self.lasers {
            let elevation = (MIN_ELEVATION_DEG + laser as f32 * elevation_step).to_radians();
            let intensity = if self.lasers > 1 {
                255.0 * laser as f32 / (self.lasers - 1) as f32
            } else {
                255.0
            };

            for column in 0..self.columns {
                let azimuth = TAU * column as f32 / self.columns as f32;
                let range = self.range * (1.0 + 0.25 * (3.0 * azimuth + phase).sin());
                let horizontal = range * elevation.cos();

                points.push(PointXyzi::new(
                    horizontal * azimuth.cos(),
                    horizontal * azimuth.sin(),
                    range * elevation.sin(),
                    intensity,
                ));
            }
        }
        points
    }

    pub fn stream(&self) -> FrameStream {
        let scan = self.clone();
        let indices = 0u64..;
        let stream = indices.map(move |index| -> Result<Vec<PointXyzi>> { Ok(scan.frame_points(index)) });

        match self.frames {
            Some(frames) => Box::new(stream.take(frames)),
            None => Box::new(stream),
        }
    }

    pub fn into_source(self, playback: Playback) -> PlaybackSource {
        let open: OpenStream = Box::new(move || -> Result<FrameStream> { Ok(self.stream()) });
        PlaybackSource::new("synthetic", open, playback)
    }
}
