use crate::types::ColorField;
use cloud_format::{FrameRef, PointField};
use rayon::prelude::*;

/// Per-point coloring of a cloud.
pub trait ColorHandler {
    fn name(&self) -> &str;

    fn set_input_cloud(&mut self, cloud: FrameRef);

    /// One RGB color in `[0, 1]` per point of the input cloud.
    fn colors(&self) -> Vec<[f32; 3]>;
}

pub fn build_color_handler(field: ColorField) -> Box<dyn ColorHandler> {
    match field.point_field() {
        Some(field) => Box::new(GenericFieldColor::new(field)),
        None => Box::new(UniformColor::new([1.0, 1.0, 1.0])),
    }
}

/// Colors points by one scalar field, mapped through [rainbow] over the
/// field's range within the cloud.
#[derive(Debug, Clone)]
pub struct GenericFieldColor {
    field: PointField,
    cloud: Option<FrameRef>,
}

impl GenericFieldColor {
    pub fn new(field: PointField) -> Self {
        Self { field, cloud: None }
    }
}

/// Color of points whose field is NaN.
const INVALID_COLOR: [f32; 3] = [0.5, 0.5, 0.5];

impl ColorHandler for GenericFieldColor {
    fn name(&self) -> &str {
        self.field.name()
    }

    fn set_input_cloud(&mut self, cloud: FrameRef) {
        self.cloud = Some(cloud);
    }

    fn colors(&self) -> Vec<[f32; 3]> {
        let Some(cloud) = &self.cloud else {
            return vec![];
        };
        let field = self.field;
        let range = cloud.field_range(field);

        cloud
            .points
            .par_iter()
            .map(|point| {
                let value = point.get(field);
                if value.is_nan() {
                    return INVALID_COLOR;
                }
                let ratio = match range {
                    Some((min, max)) if max > min => (value - min) / (max - min),
                    _ => 0.5,
                };
                rainbow(ratio)
            })
            .collect()
    }
}

/// Paints every point the same color.
#[derive(Debug, Clone)]
pub struct UniformColor {
    color: [f32; 3],
    cloud: Option<FrameRef>,
}

impl UniformColor {
    pub fn new(color: [f32; 3]) -> Self {
        Self { color, cloud: None }
    }
}

impl ColorHandler for UniformColor {
    fn name(&self) -> &str {
        "uniform"
    }

    fn set_input_cloud(&mut self, cloud: FrameRef) {
        self.cloud = Some(cloud);
    }

    fn colors(&self) -> Vec<[f32; 3]> {
        let len = self.cloud.as_ref().map(|cloud| cloud.len()).unwrap_or(0);
        vec![self.color; len]
    }
}

/// Maps `ratio` in `[0, 1]` to a hue ramp from blue (0) through green and
/// yellow to red (1). Values outside are clamped.
pub fn rainbow(ratio: f32) -> [f32; 3] {
    // hue in sixths of a turn: 4 is blue, 0 is red
    let hue = (1.0 - ratio.clamp(0.0, 1.0)) * 4.0;
    let rising = 1.0 - ((hue % 2.0) - 1.0).abs();

    match hue as u32 {
        0 => [1.0, rising, 0.0],
        1 => [rising, 1.0, 0.0],
        2 => [0.0, 1.0, rising],
        3 => [0.0, rising, 1.0],
        _ => [0.0, 0.0, 1.0],
    }
}
