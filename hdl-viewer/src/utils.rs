use crate::types::{LogLevel, SourceKind};
use std::path::Path;
use tracing::level_filters::LevelFilter;

pub fn guess_source_kind<P>(path: P) -> Option<SourceKind>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    if path.is_dir() {
        return Some(SourceKind::Pcd);
    }
    let file_name = path.file_name()?.to_str()?;

    let kind = if file_name.ends_with(".pcap") {
        SourceKind::VelodynePcap
    } else if file_name.ends_with(".pcd") {
        SourceKind::Pcd
    } else {
        return None;
    };

    Some(kind)
}

pub fn log_level_filter(level: LogLevel) -> LevelFilter {
    match level {
        LogLevel::Trace => LevelFilter::TRACE,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Error => LevelFilter::ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn guesses_from_extension() {
        assert_eq!(
            guess_source_kind("captures/drive.pcap"),
            Some(SourceKind::VelodynePcap)
        );
        assert_eq!(guess_source_kind("000001.pcd"), Some(SourceKind::Pcd));
        assert_eq!(guess_source_kind("notes.txt"), None);
    }

    #[test]
    fn directory_is_a_pcd_sequence() {
        let dir = TempDir::new().unwrap();
        assert_eq!(guess_source_kind(dir.path()), Some(SourceKind::Pcd));
    }
}
