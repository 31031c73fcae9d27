use super::{FrameStream, OpenStream, Playback, PlaybackSource};
use crate::io::{list_pcd_files, load_pcd_points};
use eyre::{ensure, Result};
use std::path::{Path, PathBuf};

/// Replays a single PCD file as one frame, or every PCD file of a
/// directory in file-name order.
pub fn pcd_source<P>(path: P, playback: Playback) -> Result<PlaybackSource>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let files = if path.is_dir() {
        let files = list_pcd_files(path)?;
        ensure!(!files.is_empty(), "no .pcd files in '{}'", path.display());
        files
    } else {
        ensure!(path.is_file(), "'{}' does not exist", path.display());
        vec![path.to_path_buf()]
    };

    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "pcd".to_string());
    let open: OpenStream = Box::new(move || -> Result<FrameStream> { Ok(pcd_stream(files.clone())) });

    Ok(PlaybackSource::new(name, open, playback))
}

fn pcd_stream(files: Vec<PathBuf>) -> FrameStream {
    Box::new(files.into_iter().map(load_pcd_points))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{io::tests::write_ascii_pcd, source::FrameSource};
    use std::{
        sync::mpsc,
        thread,
        time::{Duration, Instant},
    };
    use tempfile::TempDir;

    fn fast() -> Playback {
        Playback {
            interval: Duration::ZERO,
            looping: false,
        }
    }

    fn write_frame(dir: &Path, name: &str, x: f32) {
        write_ascii_pcd(
            &dir.join(name),
            &["x", "y", "z", "intensity"],
            &["F", "F", "F", "F"],
            &[vec![x, 0.0, 0.0, 1.0]],
        );
    }

    #[test]
    fn directory_plays_in_file_name_order() {
        let dir = TempDir::new().unwrap();
        write_frame(dir.path(), "b.pcd", 2.0);
        write_frame(dir.path(), "a.pcd", 1.0);
        write_frame(dir.path(), "c.pcd", 3.0);

        let mut source = pcd_source(dir.path(), fast()).unwrap();
        let (tx, rx) = mpsc::channel();
        let subscription = source.subscribe(Box::new(move |frame| {
            let _ = tx.send((frame.seq, frame.points[0].x));
        }));

        source.start().unwrap();
        let deadline = Instant::now() + Duration::from_secs(10);
        while source.is_running() {
            assert!(Instant::now() < deadline);
            thread::sleep(Duration::from_millis(1));
        }
        source.stop().unwrap();
        subscription.disconnect();

        let frames: Vec<_> = rx.try_iter().collect();
        assert_eq!(frames, vec![(0, 1.0), (1, 2.0), (2, 3.0)]);
    }

    #[test]
    fn single_file_is_one_frame() {
        let dir = TempDir::new().unwrap();
        write_frame(dir.path(), "only.pcd", 5.0);

        let frames: Vec<_> = pcd_stream(vec![dir.path().join("only.pcd")])
            .map(|frame| frame.unwrap())
            .collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0][0].x, 5.0);
    }

    #[test]
    fn empty_directory_is_rejected() {
        let dir = TempDir::new().unwrap();
        assert!(pcd_source(dir.path(), fast()).is_err());
    }

    #[test]
    fn missing_path_is_rejected() {
        assert!(pcd_source("/nonexistent/frames", fast()).is_err());
    }
}
