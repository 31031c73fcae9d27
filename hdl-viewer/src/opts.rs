use crate::{
    types::{ColorField, LogLevel, SourceKind, SourceSpec},
    utils::guess_source_kind,
};
use clap::{ArgGroup, Parser};
use eyre::{bail, eyre, Result};
use std::{net::SocketAddr, path::PathBuf};

/// Where Velodyne sensors send their data packets by default.
const VELODYNE_DATA_ADDR: &str = "0.0.0.0:2368";

fn default_udp_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 2368))
}

/// Shows a live LIDAR point cloud, redrawn as new frames arrive.
#[derive(Debug, Clone, Parser)]
#[command(version)]
#[command(group(
    ArgGroup::new("source")
        .args(["input", "pcap_file", "udp", "pcd", "synthetic"]),
))]
pub struct Opts {
    /// A .pcap capture, a .pcd file or a directory of .pcd files.
    pub input: Option<PathBuf>,

    /// Format of INPUT when it cannot be told from the file name.
    #[clap(short, long, requires = "input")]
    pub format: Option<SourceKind>,

    /// Velodyne pcap capture to replay.
    #[clap(long)]
    pub pcap_file: Option<PathBuf>,

    /// Read a live sensor on this UDP address. Used with the default
    /// address when no other source is given.
    #[clap(long, value_name = "ADDR", num_args = 0..=1, default_missing_value = VELODYNE_DATA_ADDR)]
    pub udp: Option<SocketAddr>,

    /// JSON sensor profile of the capture, e.g. {"model": "vlp32c"}.
    #[clap(long)]
    pub calibration_file: Option<PathBuf>,

    /// PCD file or directory of PCD files to replay.
    #[clap(long)]
    pub pcd: Option<PathBuf>,

    /// Generate frames from a simulated spinning sensor.
    #[clap(long)]
    pub synthetic: bool,

    /// Replay rate in frames per second.
    #[clap(long, default_value = "10", value_parser = clap::value_parser!(u32).range(1..))]
    pub fps: u32,

    /// Restart from the first frame when the input ends.
    #[clap(long = "loop")]
    pub looping: bool,

    /// Point field used for coloring; overrides the config file.
    #[clap(long)]
    pub color_field: Option<ColorField>,

    /// JSON file with viewer settings.
    #[clap(long)]
    pub config: Option<PathBuf>,

    #[clap(long, default_value = "info")]
    pub log_level: LogLevel,
}

impl Opts {
    pub fn source_spec(&self) -> Result<SourceSpec> {
        let spec = if let Some(input) = &self.input {
            let kind = match self.format {
                Some(kind) => kind,
                None => guess_source_kind(input).ok_or_else(|| {
                    eyre!("unable to guess the format of '{}'", input.display())
                })?,
            };

            match kind {
                SourceKind::VelodynePcap => SourceSpec::VelodynePcap {
                    pcap_file: input.clone(),
                    calibration_file: self.calibration_file.clone(),
                },
                SourceKind::Pcd => SourceSpec::Pcd(input.clone()),
            }
        } else if let Some(pcap_file) = &self.pcap_file {
            SourceSpec::VelodynePcap {
                pcap_file: pcap_file.clone(),
                calibration_file: self.calibration_file.clone(),
            }
        } else if let Some(addr) = self.udp {
            SourceSpec::VelodyneUdp {
                addr,
                calibration_file: self.calibration_file.clone(),
            }
        } else if let Some(pcd) = &self.pcd {
            SourceSpec::Pcd(pcd.clone())
        } else if self.synthetic {
            SourceSpec::Synthetic
        } else {
            SourceSpec::VelodyneUdp {
                addr: default_udp_addr(),
                calibration_file: self.calibration_file.clone(),
            }
        };

        let is_velodyne = matches!(
            spec,
            SourceSpec::VelodynePcap { .. } | SourceSpec::VelodyneUdp { .. }
        );
        if self.calibration_file.is_some() && !is_velodyne {
            bail!("--calibration-file only applies to Velodyne captures and sensors");
        }

        Ok(spec)
    }
}
