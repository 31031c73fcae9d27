use crate::{color::ColorHandler, config::ViewerConfig, viewer::CloudSink};
use cloud_format::{Frame, FrameRef};
use kiss3d::{
    camera::ArcBall,
    event::{Action, Key, WindowEvent},
    light::Light,
    nalgebra as na,
    window::Window,
};
use rayon::prelude::*;
use std::{collections::HashMap, f32::consts::FRAC_PI_4};

/// Closest near plane kiss3d accepts without breaking the depth buffer.
const MIN_CLIP_NEAR: f32 = 0.01;

/// Draws clouds in a kiss3d window. Closing the window or pressing `Q`
/// stops the sink.
pub struct Kiss3dSink {
    window: Window,
    camera: ArcBall,
    axes_length: f32,
    clouds: HashMap<String, CloudBuffer>,
    stopped: bool,
}

struct CloudBuffer {
    points: Vec<na::Point3<f32>>,
    colors: Vec<na::Point3<f32>>,
}

impl CloudBuffer {
    fn new(cloud: &Frame, handler: &dyn ColorHandler) -> Self {
        let points = cloud
            .points
            .par_iter()
            .map(|point| na::Point3::from(point.xyz()))
            .collect();
        let colors = handler.colors().into_iter().map(na::Point3::from).collect();

        Self { points, colors }
    }
}

impl Kiss3dSink {
    pub fn new(config: &ViewerConfig) -> Self {
        let mut window = Window::new(&config.window_title);
        window.set_light(Light::StickToCamera);
        window.set_point_size(config.point_size);

        let [r, g, b] = config.background;
        window.set_background_color(r, g, b);

        let mut camera = ArcBall::new_with_frustrum(
            FRAC_PI_4,
            config.clip_near.max(MIN_CLIP_NEAR),
            config.clip_far,
            na::Point3::from(config.camera_eye),
            na::Point3::from(config.camera_at),
        );
        camera.set_up_axis(na::Vector3::from(config.camera_up));

        Self {
            window,
            camera,
            axes_length: config.axes_length,
            clouds: HashMap::new(),
            stopped: false,
        }
    }

    fn draw_axes(&mut self) {
        if self.axes_length <= 0.0 {
            return;
        }

        let origin = na::Point3::origin();
        let len = self.axes_length;
        let axes = [
            (na::Point3::new(len, 0.0, 0.0), na::Point3::new(1.0, 0.0, 0.0)),
            (na::Point3::new(0.0, len, 0.0), na::Point3::new(0.0, 1.0, 0.0)),
            (na::Point3::new(0.0, 0.0, len), na::Point3::new(0.0, 0.0, 1.0)),
        ];
        for (end, color) in &axes {
            self.window.draw_line(&origin, end, color);
        }
    }

    fn draw_clouds(&mut self) {
        for cloud in self.clouds.values() {
            for (point, color) in cloud.points.iter().zip(&cloud.colors) {
                self.window.draw_point(point, color);
            }
        }
    }

    fn process_events(&mut self) {
        for event in self.window.events().iter() {
            if let WindowEvent::Key(Key::Q, Action::Press, _) = event.value {
                self.stopped = true;
            }
        }
    }
}

impl CloudSink for Kiss3dSink {
    fn update_point_cloud(
        &mut self,
        cloud: &FrameRef,
        handler: &dyn ColorHandler,
        id: &str,
    ) -> bool {
        match self.clouds.get_mut(id) {
            Some(buffer) => {
                *buffer = CloudBuffer::new(cloud, handler);
                true
            }
            None => false,
        }
    }

    fn add_point_cloud(&mut self, cloud: &FrameRef, handler: &dyn ColorHandler, id: &str) {
        self.clouds
            .insert(id.to_string(), CloudBuffer::new(cloud, handler));
    }

    // Window events are only handled here, so an idle window is kept alive
    // by the viewer's idle redraw.
    fn spin_once(&mut self) {
        self.draw_axes();
        self.draw_clouds();

        if !self.window.render_with_camera(&mut self.camera) {
            self.stopped = true;
        }
        self.process_events();
    }

    fn spin(&mut self) {
        while !self.was_stopped() {
            self.spin_once();
        }
    }

    fn was_stopped(&self) -> bool {
        self.stopped || self.window.should_close()
    }
}
