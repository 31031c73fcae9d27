//! Velodyne sensors, replayed from pcap captures or read live over UDP.

use super::{FrameStream, OpenStream, Playback, PlaybackSource, StopSignal};
use crate::{
    config::SensorProfile,
    types::{ReturnMode, SensorModel},
};
use cloud_format::PointXyzi;
use eyre::{ensure, Result, WrapErr};
use std::{
    io::{self, ErrorKind},
    iter,
    net::{SocketAddr, UdpSocket},
    path::Path,
    time::Duration,
};
use tracing::{info, trace};
use velodyne_lidar::{
    iter::{frame_xyz_iter_from_file, try_packet_to_frame_xyz},
    types::{frame_xyz::FrameXyz, point::Point},
    Config, Packet,
};

/// Large enough for data and position packets.
const MAX_DATAGRAM_SIZE: usize = 2048;

/// How long a live stream waits for a datagram before checking for a stop.
const RECV_TIMEOUT: Duration = Duration::from_millis(100);

pub fn build_velodyne_config(profile: SensorProfile) -> Config {
    use ReturnMode as R;
    use SensorModel as M;

    match (profile.model, profile.return_mode) {
        (M::Vlp16, R::Strongest) => Config::new_vlp_16_strongest(),
        (M::Vlp16, R::Last) => Config::new_vlp_16_last(),
        (M::Vlp16, R::Dual) => Config::new_vlp_16_dual(),
        (M::PuckLite, R::Strongest) => Config::new_puck_lite_strongest(),
        (M::PuckLite, R::Last) => Config::new_puck_lite_last(),
        (M::PuckLite, R::Dual) => Config::new_puck_lite_dual(),
        (M::PuckHiRes, R::Strongest) => Config::new_puck_hires_strongest(),
        (M::PuckHiRes, R::Last) => Config::new_puck_hires_last(),
        (M::PuckHiRes, R::Dual) => Config::new_puck_hires_dual(),
        (M::Vlp32c, R::Strongest) => Config::new_vlp_32c_strongest(),
        (M::Vlp32c, R::Last) => Config::new_vlp_32c_last(),
        (M::Vlp32c, R::Dual) => Config::new_vlp_32c_dual(),
    }
}

fn source_name(profile: SensorProfile) -> String {
    format!("{:?}", profile.model).to_lowercase()
}

/// Replays a Velodyne capture, one frame per sensor revolution.
pub fn velodyne_source<P>(
    pcap_file: P,
    profile: SensorProfile,
    playback: Playback,
) -> Result<PlaybackSource>
where
    P: AsRef<Path>,
{
    let pcap_file = pcap_file.as_ref().to_path_buf();
    ensure!(pcap_file.is_file(), "'{}' does not exist", pcap_file.display());

    let open: OpenStream = Box::new(move || -> Result<FrameStream> {
        let config = build_velodyne_config(profile);
        let frames = frame_xyz_iter_from_file(config, &pcap_file)
            .wrap_err_with(|| format!("unable to open '{}'", pcap_file.display()))?;

        let stream = frames.map(|frame| -> Result<Vec<PointXyzi>> {
            let frame = frame.wrap_err("corrupted capture")?;
            Ok(frame_points(frame))
        });
        Ok(Box::new(stream))
    });

    Ok(PlaybackSource::new(source_name(profile), open, playback))
}

/// Listens for sensor packets on `addr`.
pub fn velodyne_live_source(addr: SocketAddr, profile: SensorProfile) -> Result<PlaybackSource> {
    let socket =
        UdpSocket::bind(addr).wrap_err_with(|| format!("unable to listen on {addr}"))?;
    velodyne_udp_source(socket, profile)
}

/// Builds frames from the packets arriving on `socket`. Frames are emitted
/// as soon as a revolution completes.
pub fn velodyne_udp_source(socket: UdpSocket, profile: SensorProfile) -> Result<PlaybackSource> {
    socket
        .set_read_timeout(Some(RECV_TIMEOUT))
        .wrap_err("unable to set the socket timeout")?;
    let local_addr = socket.local_addr()?;
    info!(%local_addr, model = ?profile.model, "listening for sensor packets");

    let stop = StopSignal::default();
    let open: OpenStream = {
        let stop = stop.clone();
        Box::new(move || -> Result<FrameStream> {
            let socket = socket
                .try_clone()
                .wrap_err_with(|| format!("unable to read from {local_addr}"))?;
            let packets = receive_packets(socket, stop.clone());
            let frames = try_packet_to_frame_xyz(build_velodyne_config(profile), packets)?;

            let stream = frames.map(move |frame| -> Result<Vec<PointXyzi>> {
                let frame = frame.wrap_err_with(|| format!("unable to read from {local_addr}"))?;
                Ok(frame_points(frame))
            });
            Ok(Box::new(stream))
        })
    };

    let playback = Playback {
        interval: Duration::ZERO,
        looping: false,
    };
    Ok(PlaybackSource::with_stop_signal(
        source_name(profile),
        open,
        playback,
        stop,
    ))
}

/// Yields every datagram that parses as a sensor packet. Ends once `stop`
/// is requested.
fn receive_packets(
    socket: UdpSocket,
    stop: StopSignal,
) -> impl Iterator<Item = io::Result<Packet>> + Send {
    let mut buf = [0u8; MAX_DATAGRAM_SIZE];

    iter::from_fn(move || loop {
        if stop.is_requested() {
            return None;
        }

        let len = match socket.recv(&mut buf) {
            Ok(len) => len,
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                continue
            }
            Err(err) => return Some(Err(err)),
        };

        match Packet::from_slice(&buf[..len]) {
            Ok(packet) => return Some(Ok(packet)),
            Err(err) => trace!("skipping datagram of {len} bytes: {err:#}"),
        }
    })
}

fn frame_points(frame: FrameXyz) -> Vec<PointXyzi> {
    frame.into_point_iter().filter_map(to_point_xyzi).collect()
}

/// Dual-return points keep the strongest return. Lasers that saw no
/// return report a zero distance and are skipped.
fn to_point_xyzi(point: Point) -> Option<PointXyzi> {
    let measurement = match point {
        Point::Single(point) => point.measurement,
        Point::Dual(point) => point.measurements.strongest,
    };
    if measurement.distance.as_meters() <= 0.0 {
        return None;
    }
    let [x, y, z] = measurement.xyz;

    Some(PointXyzi::new(
        x.as_meters() as f32,
        y.as_meters() as f32,
        z.as_meters() as f32,
        measurement.intensity as f32,
    ))
}
