//! Frame producers.
//!
//! A [FrameSource] runs on its own thread once started and hands every
//! finished frame to the registered callbacks. Concrete sources are built on
//! [PlaybackSource], which replays a frame stream at a fixed rate.

pub mod pcd;
pub mod synthetic;
#[cfg(feature = "velodyne")]
pub mod velodyne;

use crate::{config::SensorProfile, types::SourceSpec};
use cloud_format::{Frame, FrameRef, PointXyzi};
use eyre::{bail, eyre, Result};
use std::{
    net::SocketAddr,
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError, Weak,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use tracing::{debug, error, info, trace, warn};

pub type FrameCallback = Box<dyn FnMut(FrameRef) + Send>;

/// Points of consecutive frames, in capture order.
pub type FrameStream = Box<dyn Iterator<Item = Result<Vec<PointXyzi>>> + Send>;

/// Opens the frame stream from the beginning. Called on every start and
/// again on every rewind when looping.
pub type OpenStream = Box<dyn FnMut() -> Result<FrameStream> + Send>;

pub trait FrameSource {
    fn name(&self) -> &str;

    /// Registers `callback` to receive every frame emitted from now on.
    ///
    /// The callback runs on the producer thread and must not call back into
    /// the source.
    fn subscribe(&mut self, callback: FrameCallback) -> Subscription;

    fn start(&mut self) -> Result<()>;

    /// Stops producing and waits for the producer thread to exit.
    fn stop(&mut self) -> Result<()>;

    /// Whether frames may still arrive.
    fn is_running(&self) -> bool;
}

/// Callbacks registered on a source.
#[derive(Clone, Default)]
pub struct CallbackRegistry {
    inner: Arc<Mutex<Callbacks>>,
}

#[derive(Default)]
struct Callbacks {
    next_id: u64,
    entries: Vec<(u64, FrameCallback)>,
}

impl CallbackRegistry {
    pub fn register(&self, callback: FrameCallback) -> Subscription {
        let mut callbacks = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let id = callbacks.next_id;
        callbacks.next_id += 1;
        callbacks.entries.push((id, callback));

        Subscription {
            id,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Invokes every callback with its own handle to `frame`.
    pub fn emit(&self, frame: &FrameRef) {
        let mut callbacks = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        for (_, callback) in callbacks.entries.iter_mut() {
            callback(Arc::clone(frame));
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle to a registered callback.
///
/// Dropping the handle keeps the callback registered; call
/// [disconnect](Subscription::disconnect) to remove it.
#[must_use = "the callback stays registered until disconnect() is called"]
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Callbacks>>,
}

impl Subscription {
    /// Removes the callback. Once this returns the callback is never
    /// invoked again, since emitting holds the same lock.
    pub fn disconnect(self) {
        if let Some(registry) = self.registry.upgrade() {
            let mut callbacks = registry.lock().unwrap_or_else(PoisonError::into_inner);
            callbacks.entries.retain(|(id, _)| *id != self.id);
        }
    }

    #[cfg(test)]
    pub fn is_connected(&self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let callbacks = registry.lock().unwrap_or_else(PoisonError::into_inner);
        callbacks.entries.iter().any(|(id, _)| *id == self.id)
    }
}

/// Pacing of a [PlaybackSource].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Playback {
    /// Time between two frames. Zero replays as fast as the stream decodes.
    pub interval: Duration,
    /// Rewind to the first frame when the stream ends.
    pub looping: bool,
}

impl Playback {
    pub fn from_fps(fps: u32, looping: bool) -> Self {
        let interval = match fps {
            0 => Duration::ZERO,
            fps => Duration::from_secs(1) / fps,
        };
        Self { interval, looping }
    }
}

/// Set by [FrameSource::stop]. Streams that block while waiting for data
/// check it to end early.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Replays a frame stream on a background thread.
pub struct PlaybackSource {
    name: String,
    open: Option<OpenStream>,
    playback: Playback,
    registry: CallbackRegistry,
    running: Arc<AtomicBool>,
    stop: StopSignal,
    worker: Option<JoinHandle<OpenStream>>,
}

impl PlaybackSource {
    pub fn new(name: impl Into<String>, open: OpenStream, playback: Playback) -> Self {
        Self {
            name: name.into(),
            open: Some(open),
            playback,
            registry: CallbackRegistry::default(),
            running: Arc::new(AtomicBool::new(false)),
            stop: StopSignal::default(),
            worker: None,
        }
    }

    /// Like [new](PlaybackSource::new), for streams that block and watch
    /// `stop` themselves.
    #[cfg(any(test, feature = "velodyne"))]
    pub fn with_stop_signal(
        name: impl Into<String>,
        open: OpenStream,
        playback: Playback,
        stop: StopSignal,
    ) -> Self {
        let mut source = Self::new(name, open, playback);
        source.stop = stop;
        source
    }

    #[cfg(test)]
    pub fn registry(&self) -> &CallbackRegistry {
        &self.registry
    }

    /// Collects a finished producer thread and takes the stream opener back.
    fn join_worker(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };

        worker.thread().unpark();
        let open = worker
            .join()
            .map_err(|_| eyre!("producer thread of '{}' panicked", self.name))?;
        self.open = Some(open);
        Ok(())
    }
}

impl FrameSource for PlaybackSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn subscribe(&mut self, callback: FrameCallback) -> Subscription {
        self.registry.register(callback)
    }

    fn start(&mut self) -> Result<()> {
        if self.is_running() {
            bail!("source '{}' is already running", self.name);
        }
        self.join_worker()?;

        let Some(mut open) = self.open.take() else {
            bail!("source '{}' cannot be restarted", self.name);
        };
        let stream = match open() {
            Ok(stream) => stream,
            Err(err) => {
                self.open = Some(open);
                return Err(err.wrap_err(format!("unable to start source '{}'", self.name)));
            }
        };

        self.stop.clear();
        self.running.store(true, Ordering::SeqCst);

        let producer = Producer {
            name: self.name.clone(),
            playback: self.playback,
            registry: self.registry.clone(),
            stop: self.stop.clone(),
        };
        let running = RunningFlag(Arc::clone(&self.running));

        let spawned = thread::Builder::new()
            .name(format!("{}-producer", self.name))
            .spawn(move || {
                let _running = running;
                producer.run(stream, &mut open);
                open
            });

        match spawned {
            Ok(worker) => {
                info!(source = %self.name, "started");
                self.worker = Some(worker);
                Ok(())
            }
            Err(err) => {
                self.running.store(false, Ordering::SeqCst);
                Err(eyre!(err).wrap_err(format!("unable to spawn producer of '{}'", self.name)))
            }
        }
    }

    fn stop(&mut self) -> Result<()> {
        if self.worker.is_none() {
            return Ok(());
        }

        self.stop.request();
        self.join_worker()?;
        info!(source = %self.name, "stopped");
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for PlaybackSource {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            warn!("{err:#}");
        }
    }
}

/// Clears the running flag when the producer thread exits, panics included.
struct RunningFlag(Arc<AtomicBool>);

impl Drop for RunningFlag {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct Producer {
    name: String,
    playback: Playback,
    registry: CallbackRegistry,
    stop: StopSignal,
}

impl Producer {
    fn run(&self, mut stream: FrameStream, open: &mut OpenStream) {
        let mut seq = 0u64;
        let mut emitted_this_pass = false;

        while !self.stop.is_requested() {
            let points = match stream.next() {
                Some(Ok(points)) => points,
                Some(Err(err)) => {
                    error!(source = %self.name, "failed to read frame {seq}: {err:#}");
                    break;
                }
                None if self.playback.looping && emitted_this_pass => {
                    debug!(source = %self.name, "rewinding");
                    match open() {
                        Ok(rewound) => {
                            stream = rewound;
                            emitted_this_pass = false;
                            continue;
                        }
                        Err(err) => {
                            error!(source = %self.name, "unable to rewind: {err:#}");
                            break;
                        }
                    }
                }
                None => {
                    info!(source = %self.name, frames = seq, "end of stream");
                    break;
                }
            };

            let frame: FrameRef = Arc::new(Frame::new(seq, points));
            trace!(source = %self.name, seq, points = frame.len(), "emit");
            self.registry.emit(&frame);

            seq += 1;
            emitted_this_pass = true;
            self.pause();
        }
    }

    /// Sleeps for one frame interval or until a stop is requested.
    fn pause(&self) {
        let deadline = Instant::now() + self.playback.interval;
        loop {
            if self.stop.is_requested() {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            thread::park_timeout(deadline - now);
        }
    }
}

/// Builds the source named on the command line.
pub fn open_source(spec: &SourceSpec, playback: Playback) -> Result<Box<dyn FrameSource>> {
    let source: Box<dyn FrameSource> = match spec {
        SourceSpec::Synthetic => Box::new(synthetic::SyntheticScan::default().into_source(playback)),
        SourceSpec::Pcd(path) => Box::new(pcd::pcd_source(path, playback)?),
        SourceSpec::VelodynePcap {
            pcap_file,
            calibration_file,
        } => {
            let profile = load_sensor_profile(calibration_file.as_deref())?;
            velodyne_pcap_source(pcap_file, profile, playback)?
        }
        SourceSpec::VelodyneUdp {
            addr,
            calibration_file,
        } => {
            let profile = load_sensor_profile(calibration_file.as_deref())?;
            velodyne_live_source(*addr, profile)?
        }
    };
    Ok(source)
}

fn load_sensor_profile(path: Option<&Path>) -> Result<SensorProfile> {
    match path {
        Some(path) => SensorProfile::load(path),
        None => Ok(SensorProfile::default()),
    }
}

#[cfg(feature = "velodyne")]
fn velodyne_pcap_source(
    pcap_file: &Path,
    profile: SensorProfile,
    playback: Playback,
) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(velodyne::velodyne_source(
        pcap_file, profile, playback,
    )?))
}

#[cfg(feature = "velodyne")]
fn velodyne_live_source(addr: SocketAddr, profile: SensorProfile) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(velodyne::velodyne_live_source(addr, profile)?))
}

#[cfg(not(feature = "velodyne"))]
fn velodyne_pcap_source(
    pcap_file: &Path,
    _profile: SensorProfile,
    _playback: Playback,
) -> Result<Box<dyn FrameSource>> {
    bail!(
        "cannot replay '{}': this build has no Velodyne support, rebuild with `--features velodyne`",
        pcap_file.display()
    )
}

#[cfg(not(feature = "velodyne"))]
fn velodyne_live_source(addr: SocketAddr, _profile: SensorProfile) -> Result<Box<dyn FrameSource>> {
    bail!(
        "cannot read the sensor on {addr}: this build has no Velodyne support, rebuild with `--features velodyne`"
    )
}
