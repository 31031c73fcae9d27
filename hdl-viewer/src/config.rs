use crate::types::{ColorField, ReturnMode, SensorModel};
use eyre::{Result, WrapErr};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};

/// Window, camera and polling settings. Every field is optional in the JSON
/// file; missing fields keep their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ViewerConfig {
    pub window_title: String,
    /// Name the cloud is displayed under.
    pub cloud_id: String,
    pub background: [f32; 3],
    /// Length of the coordinate axes in meters. Zero hides them.
    pub axes_length: f32,
    pub camera_eye: [f32; 3],
    pub camera_at: [f32; 3],
    pub camera_up: [f32; 3],
    pub clip_near: f32,
    pub clip_far: f32,
    pub point_size: f32,
    pub color_field: ColorField,
    /// Idle time of the render loop between two polls, in microseconds.
    pub poll_interval_us: u64,
    /// Redraw after this many milliseconds without a new frame so window
    /// events are still handled. Zero redraws only on new frames.
    pub idle_redraw_ms: u64,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            window_title: "HDL Cloud".to_string(),
            cloud_id: "HDL".to_string(),
            background: [0.0, 0.0, 0.0],
            axes_length: 3.0,
            camera_eye: [0.0, 0.0, 30.0],
            camera_at: [0.0, 0.0, 0.0],
            camera_up: [0.0, 1.0, 0.0],
            clip_near: 0.0,
            clip_far: 50.0,
            point_size: 2.0,
            color_field: ColorField::Intensity,
            poll_interval_us: 100,
            idle_redraw_ms: 50,
        }
    }
}

impl ViewerConfig {
    pub fn load<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        load_json(path)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_micros(self.poll_interval_us)
    }

    pub fn idle_redraw(&self) -> Option<Duration> {
        (self.idle_redraw_ms > 0).then(|| Duration::from_millis(self.idle_redraw_ms))
    }
}

/// Describes the Velodyne sensor behind a pcap capture or a live stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SensorProfile {
    pub model: SensorModel,
    #[serde(default)]
    pub return_mode: ReturnMode,
}

impl Default for SensorProfile {
    fn default() -> Self {
        Self {
            model: SensorModel::Vlp32c,
            return_mode: ReturnMode::Strongest,
        }
    }
}

impl SensorProfile {
    pub fn load<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        load_json(path)
    }
}

fn load_json<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .wrap_err_with(|| format!("unable to read '{}'", path.display()))?;
    let value = serde_json::from_str(&text)
        .wrap_err_with(|| format!("invalid JSON in '{}'", path.display()))?;
    Ok(value)
}
