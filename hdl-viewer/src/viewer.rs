use crate::{
    color::ColorHandler,
    config::ViewerConfig,
    slot::LatestSlot,
    source::FrameSource,
};
use cloud_format::FrameRef;
use eyre::Result;
use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};
use tracing::{debug, info};

/// Something that displays point clouds under string ids.
pub trait CloudSink {
    /// Replaces the cloud shown as `id`. Returns `false` if no cloud is
    /// shown under `id` yet, in which case nothing changes.
    fn update_point_cloud(
        &mut self,
        cloud: &FrameRef,
        handler: &dyn ColorHandler,
        id: &str,
    ) -> bool;

    fn add_point_cloud(&mut self, cloud: &FrameRef, handler: &dyn ColorHandler, id: &str);

    /// Draws once and processes pending window events.
    fn spin_once(&mut self);

    /// Draws until the window is closed.
    fn spin(&mut self);

    fn was_stopped(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ViewerStats {
    pub frames_shown: u64,
    pub frames_published: u64,
    pub frames_dropped: u64,
}

/// Shows the newest frame of a source until the sink is closed.
pub struct Viewer<S> {
    sink: S,
    handler: Box<dyn ColorHandler>,
    cloud_id: String,
    poll_interval: Duration,
    idle_redraw: Option<Duration>,
}

impl<S> Viewer<S>
where
    S: CloudSink,
{
    pub fn new(sink: S, handler: Box<dyn ColorHandler>, config: &ViewerConfig) -> Self {
        Self {
            sink,
            handler,
            cloud_id: config.cloud_id.clone(),
            poll_interval: config.poll_interval(),
            idle_redraw: config.idle_redraw(),
        }
    }

    #[cfg(test)]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Starts `source`, displays its frames and stops it again once the
    /// sink reports it was stopped.
    ///
    /// Frames arriving faster than they are drawn are skipped; only the
    /// newest one is shown. While no frame arrives the sink is still spun
    /// every `idle_redraw`, so its window stays responsive.
    pub fn run(&mut self, source: &mut dyn FrameSource) -> Result<ViewerStats> {
        let slot = Arc::new(LatestSlot::<FrameRef>::new());

        let subscription = {
            let slot = Arc::clone(&slot);
            source.subscribe(Box::new(move |cloud| {
                let seq = cloud.seq;
                if slot.publish(cloud) {
                    debug!(seq, "replaced a frame that was never shown");
                }
            }))
        };

        if let Err(err) = source.start() {
            subscription.disconnect();
            return Err(err);
        }
        info!(source = source.name(), color = self.handler.name(), "viewing");

        let mut frames_shown = 0;
        let mut last_spin = Instant::now();
        while !self.sink.was_stopped() {
            if let Some(cloud) = slot.try_take() {
                debug!(seq = cloud.seq, points = cloud.len(), "show frame");

                self.handler.set_input_cloud(Arc::clone(&cloud));
                let handler = self.handler.as_ref();
                if !self.sink.update_point_cloud(&cloud, handler, &self.cloud_id) {
                    self.sink.add_point_cloud(&cloud, handler, &self.cloud_id);
                }
                frames_shown += 1;

                self.sink.spin_once();
                last_spin = Instant::now();
            } else if self
                .idle_redraw
                .is_some_and(|idle_redraw| last_spin.elapsed() >= idle_redraw)
            {
                self.sink.spin_once();
                last_spin = Instant::now();
            }

            if !source.is_running() {
                self.sink.spin();
            }

            thread::sleep(self.poll_interval);
        }

        let stopped = source.stop();
        subscription.disconnect();
        stopped?;

        // A frame published after the last poll was never shown either.
        let unshown = u64::from(slot.try_take().is_some());

        Ok(ViewerStats {
            frames_shown,
            frames_published: slot.published(),
            frames_dropped: slot.dropped() + unshown,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        color::{build_color_handler, GenericFieldColor},
        source::{
            synthetic::SyntheticScan, CallbackRegistry, FrameCallback, Playback, PlaybackSource,
            Subscription,
        },
        types::ColorField,
    };
    use cloud_format::PointField;
    use eyre::bail;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Update(u64),
        Add(u64),
        SpinOnce,
        Spin,
    }

    /// Records every call. Closes after `max_frames` frames were shown,
    /// after `max_spins` calls to `spin_once` or when `spin` is called.
    #[derive(Debug, Default)]
    struct RecordingSink {
        calls: Vec<Call>,
        shown: Option<String>,
        colors_per_frame: Vec<usize>,
        max_frames: Option<usize>,
        max_spins: Option<usize>,
        stopped: bool,
    }

    impl RecordingSink {
        fn frames(&self) -> usize {
            self.colors_per_frame.len()
        }

        fn seqs(&self) -> Vec<u64> {
            self.calls
                .iter()
                .filter_map(|call| match call {
                    Call::Update(seq) | Call::Add(seq) => Some(*seq),
                    _ => None,
                })
                .collect()
        }
    }

    impl CloudSink for RecordingSink {
        fn update_point_cloud(
            &mut self,
            cloud: &FrameRef,
            handler: &dyn ColorHandler,
            id: &str,
        ) -> bool {
            if self.shown.as_deref() != Some(id) {
                return false;
            }
            self.calls.push(Call::Update(cloud.seq));
            self.colors_per_frame.push(handler.colors().len());
            true
        }

        fn add_point_cloud(&mut self, cloud: &FrameRef, handler: &dyn ColorHandler, id: &str) {
            self.shown = Some(id.to_string());
            self.calls.push(Call::Add(cloud.seq));
            self.colors_per_frame.push(handler.colors().len());
        }

        fn spin_once(&mut self) {
            self.calls.push(Call::SpinOnce);
            let spins = self.calls.iter().filter(|call| **call == Call::SpinOnce).count();
            if self.max_frames.is_some_and(|max| self.frames() >= max)
                || self.max_spins.is_some_and(|max| spins >= max)
            {
                self.stopped = true;
            }
        }

        fn spin(&mut self) {
            self.calls.push(Call::Spin);
            self.stopped = true;
        }

        fn was_stopped(&self) -> bool {
            self.stopped
        }
    }

    fn scan(frames: Option<usize>) -> SyntheticScan {
        SyntheticScan {
            lasers: 4,
            columns: 8,
            frames,
            ..SyntheticScan::default()
        }
    }

    fn fast_config() -> ViewerConfig {
        ViewerConfig {
            poll_interval_us: 10,
            idle_redraw_ms: 0,
            ..ViewerConfig::default()
        }
    }

    #[test]
    fn first_frame_is_added_then_updated() {
        let mut source = scan(Some(20)).into_source(Playback::from_fps(1000, false));
        let sink = RecordingSink {
            max_frames: Some(3),
            ..RecordingSink::default()
        };
        let mut viewer = Viewer::new(sink, build_color_handler(ColorField::Intensity), &fast_config());

        let stats = viewer.run(&mut source).unwrap();
        let sink = viewer.sink();

        assert_eq!(sink.calls[0], Call::Add(sink.seqs()[0]));
        assert!(sink.calls[1..]
            .iter()
            .all(|call| !matches!(call, Call::Add(_))));
        assert_eq!(sink.shown.as_deref(), Some("HDL"));
        assert_eq!(stats.frames_shown, sink.frames() as u64);
        assert!(sink.colors_per_frame.iter().all(|&len| len == 32));
    }

    #[test]
    fn shown_frames_are_strictly_newer() {
        let mut source = scan(Some(50)).into_source(Playback::from_fps(1000, false));
        let mut viewer = Viewer::new(
            RecordingSink::default(),
            Box::new(GenericFieldColor::new(PointField::Z)),
            &fast_config(),
        );

        let stats = viewer.run(&mut source).unwrap();
        let seqs = viewer.sink().seqs();

        assert!(!seqs.is_empty());
        assert!(seqs.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(stats.frames_published, 50);
        assert_eq!(stats.frames_shown + stats.frames_dropped, stats.frames_published);
    }

    #[test]
    fn finished_source_hands_control_to_spin() {
        let mut source = scan(Some(1)).into_source(Playback::from_fps(1000, false));
        let mut viewer = Viewer::new(
            RecordingSink::default(),
            build_color_handler(ColorField::None),
            &fast_config(),
        );

        let stats = viewer.run(&mut source).unwrap();

        assert_eq!(viewer.sink().calls.last(), Some(&Call::Spin));
        assert!(stats.frames_shown <= 1);
        assert!(!source.is_running());
    }

    #[test]
    fn source_is_stopped_and_callback_removed_on_exit() {
        let mut source = scan(None).into_source(Playback::from_fps(1000, false));
        let sink = RecordingSink {
            max_frames: Some(2),
            ..RecordingSink::default()
        };
        let mut viewer = Viewer::new(sink, build_color_handler(ColorField::X), &fast_config());

        let stats = viewer.run(&mut source).unwrap();

        assert!(!source.is_running());
        assert!(source.registry().is_empty());
        assert_eq!(viewer.sink().frames(), 2);
        assert_eq!(stats.frames_shown + stats.frames_dropped, stats.frames_published);
    }

    #[derive(Default)]
    struct BrokenSource {
        registry: CallbackRegistry,
    }

    impl FrameSource for BrokenSource {
        fn name(&self) -> &str {
            "broken"
        }

        fn subscribe(&mut self, callback: FrameCallback) -> Subscription {
            self.registry.register(callback)
        }

        fn start(&mut self) -> Result<()> {
            bail!("device not found")
        }

        fn stop(&mut self) -> Result<()> {
            Ok(())
        }

        fn is_running(&self) -> bool {
            false
        }
    }

    #[test]
    fn start_failure_is_returned_and_callback_removed() {
        let mut source = BrokenSource::default();
        let mut viewer = Viewer::new(
            RecordingSink::default(),
            build_color_handler(ColorField::Intensity),
            &fast_config(),
        );

        let err = viewer.run(&mut source).unwrap_err();
        assert!(format!("{err}").contains("device not found"));
        assert!(source.registry.is_empty());
        assert!(viewer.sink().calls.is_empty());
    }

    #[test]
    fn idle_sink_is_not_spun_while_source_runs() {
        let mut source: PlaybackSource = scan(Some(2)).into_source(Playback::from_fps(1, false));
        let sink = RecordingSink {
            max_frames: Some(1),
            ..RecordingSink::default()
        };
        let mut viewer = Viewer::new(sink, build_color_handler(ColorField::Intensity), &fast_config());

        viewer.run(&mut source).unwrap();

        assert_eq!(
            viewer.sink().calls,
            vec![Call::Add(0), Call::SpinOnce]
        );
    }

    #[test]
    fn idle_sink_is_redrawn_while_waiting_for_frames() {
        let mut source: PlaybackSource = scan(Some(2)).into_source(Playback::from_fps(1, false));
        let sink = RecordingSink {
            max_spins: Some(3),
            ..RecordingSink::default()
        };
        let config = ViewerConfig {
            idle_redraw_ms: 5,
            ..fast_config()
        };
        let mut viewer = Viewer::new(sink, build_color_handler(ColorField::Intensity), &config);

        let started = Instant::now();
        viewer.run(&mut source).unwrap();

        // The second frame is a second away; the sink closes before it.
        assert!(started.elapsed() < Duration::from_millis(900));
        let sink = viewer.sink();
        assert!(sink.seqs().len() <= 1);
        assert_eq!(sink.calls.iter().filter(|call| **call == Call::SpinOnce).count(), 3);
        assert!(!sink.calls.contains(&Call::Spin));
    }
}
