use clap::ValueEnum;
use cloud_format::PointField;
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum SourceKind {
    #[value(name = "pcap.velodyne")]
    VelodynePcap,
    #[value(name = "pcd")]
    Pcd,
}

/// The frame producer selected on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    VelodynePcap {
        pcap_file: PathBuf,
        calibration_file: Option<PathBuf>,
    },
    /// Live sensor data arriving as UDP datagrams on `addr`.
    VelodyneUdp {
        addr: SocketAddr,
        calibration_file: Option<PathBuf>,
    },
    Pcd(PathBuf),
    Synthetic,
}

/// Per-point field driving the cloud colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorField {
    #[default]
    Intensity,
    X,
    Y,
    Z,
    /// Paint every point white.
    None,
}

impl ColorField {
    pub fn point_field(&self) -> Option<PointField> {
        let field = match self {
            ColorField::Intensity => PointField::Intensity,
            ColorField::X => PointField::X,
            ColorField::Y => PointField::Y,
            ColorField::Z => PointField::Z,
            ColorField::None => return None,
        };
        Some(field)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorModel {
    Vlp16,
    PuckLite,
    PuckHiRes,
    Vlp32c,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnMode {
    #[default]
    Strongest,
    Last,
    Dual,
}
