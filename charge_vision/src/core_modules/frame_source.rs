//! Frame acquisition boundary.
//!
//! The monitor pulls frames through `FrameSource`. A source is opened and
//! released on the worker that reads from it; nothing else touches it.
//! `ImageSequenceSource` replays image files from disk so the engine can run
//! without a camera; a capture-device binding implements the same trait.

use crate::core_modules::utils::image_helper::image_helper;
use crate::error::CaptureError;
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Device index tried first at start-up.
pub const PRIMARY_DEVICE_INDEX: u32 = 1;
/// Device index tried when the primary one cannot be opened.
pub const FALLBACK_DEVICE_INDEX: u32 = 0;

const FRAME_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

pub trait FrameSource: Send {
    /// Returns the next frame, `Ok(None)` at end of stream, or an error when the read fails.
    fn read_frame(&mut self) -> Result<Option<RgbImage>, CaptureError>;

    /// Releases the underlying device. Called once, on the thread that opened it.
    fn release(&mut self) {}
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn read_frame(&mut self) -> Result<Option<RgbImage>, CaptureError> {
        (**self).read_frame()
    }

    fn release(&mut self) {
        (**self).release()
    }
}

/// Opens device 1, falling back once to device 0. No retries beyond that.
pub fn open_with_fallback<S, F>(mut open: F) -> Result<(u32, S), CaptureError>
where
    F: FnMut(u32) -> Result<S, CaptureError>,
{
    match open(PRIMARY_DEVICE_INDEX) {
        Ok(source) => Ok((PRIMARY_DEVICE_INDEX, source)),
        Err(primary_err) => {
            log::warn!(
                "device {} unavailable ({}), falling back to device {}",
                PRIMARY_DEVICE_INDEX,
                primary_err,
                FALLBACK_DEVICE_INDEX
            );
            open(FALLBACK_DEVICE_INDEX)
                .map(|source| (FALLBACK_DEVICE_INDEX, source))
                .map_err(|fallback_err| {
                    log::error!("device {} unavailable ({})", FALLBACK_DEVICE_INDEX, fallback_err);
                    CaptureError::OpenFailed {
                        tried: vec![PRIMARY_DEVICE_INDEX, FALLBACK_DEVICE_INDEX],
                        reason: format!(
                            "device {PRIMARY_DEVICE_INDEX}: {primary_err}; device {FALLBACK_DEVICE_INDEX}: {fallback_err}"
                        ),
                    }
                })
        }
    }
}

/// Replays the image files of one directory in file-name order.
pub struct ImageSequenceSource {
    frames: Vec<PathBuf>,
    next: usize,
    frame_interval: Option<Duration>,
    last_read: Option<Instant>,
}

impl ImageSequenceSource {
    pub fn open(dir: &Path) -> Result<Self, CaptureError> {
        let entries = std::fs::read_dir(dir).map_err(|e| CaptureError::SourceUnavailable {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        })?;
        let mut frames: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            })
            .collect();
        frames.sort();
        log::info!("replaying {} frames from {}", frames.len(), dir.display());
        Ok(Self {
            frames,
            next: 0,
            frame_interval: None,
            last_read: None,
        })
    }

    /// Opens `<root>/video<index>`, the on-disk stand-in for capture device `index`.
    pub fn open_device(root: &Path, index: u32) -> Result<Self, CaptureError> {
        let dir = root.join(format!("video{index}"));
        if !dir.is_dir() {
            return Err(CaptureError::OpenFailed {
                tried: vec![index],
                reason: format!("{} is not a directory", dir.display()),
            });
        }
        Self::open(&dir)
    }

    /// Paces reads to at most one frame per `interval`, like a live camera.
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = Some(interval);
        self
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FrameSource for ImageSequenceSource {
    fn read_frame(&mut self) -> Result<Option<RgbImage>, CaptureError> {
        let Some(path) = self.frames.get(self.next) else {
            return Ok(None);
        };
        if let (Some(interval), Some(last)) = (self.frame_interval, self.last_read) {
            let elapsed = last.elapsed();
            if elapsed < interval {
                std::thread::sleep(interval - elapsed);
            }
        }
        let frame = image_helper::load_frame(path)
            .map_err(|e| CaptureError::ReadFailed(format!("{}: {e}", path.display())))?;
        self.next += 1;
        self.last_read = Some(Instant::now());
        Ok(Some(frame))
    }

    fn release(&mut self) {
        log::debug!("releasing image sequence after {} frames", self.next);
        self.frames.clear();
        self.next = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn primary_device_is_preferred() {
        let (index, value) = open_with_fallback(|i| Ok::<_, CaptureError>(i * 10)).expect("opens");
        assert_eq!((index, value), (1, 10));
    }

    #[test]
    fn falls_back_to_device_zero_once() {
        let mut attempts = Vec::new();
        let (index, _) = open_with_fallback(|i| {
            attempts.push(i);
            if i == 1 {
                Err(CaptureError::OpenFailed {
                    tried: vec![i],
                    reason: "busy".into(),
                })
            } else {
                Ok(())
            }
        })
        .expect("fallback opens");
        assert_eq!(index, 0);
        assert_eq!(attempts, vec![1, 0]);
    }

    #[test]
    fn both_devices_failing_is_open_failed() {
        let err = open_with_fallback(|i| {
            Err::<(), _>(CaptureError::OpenFailed {
                tried: vec![i],
                reason: format!("no camera on {i}"),
            })
        })
        .unwrap_err();
        match err {
            CaptureError::OpenFailed { tried, reason } => {
                assert_eq!(tried, vec![1, 0]);
                // Both devices' failures are kept.
                assert!(reason.contains("no camera on 1"), "{reason}");
                assert!(reason.contains("no camera on 0"), "{reason}");
            }
            other => panic!("expected open failure, got {other:?}"),
        }
    }

    #[test]
    fn unlistable_directory_is_unavailable_not_a_read_failure() {
        let dir = tempfile::tempdir().expect("temp dir");
        let missing = dir.path().join("no_such_frames");
        match ImageSequenceSource::open(&missing) {
            Err(CaptureError::SourceUnavailable { path, .. }) => assert_eq!(path, missing),
            Err(other) => panic!("expected unavailable source, got {other:?}"),
            Ok(_) => panic!("missing directory opened"),
        }
    }

    #[test]
    fn sequence_replays_sorted_images_then_ends() {
        let dir = tempfile::tempdir().expect("temp dir");
        for (name, shade) in [("frame_002.png", 20u8), ("frame_001.png", 10u8)] {
            let frame = RgbImage::from_pixel(4, 4, Rgb([shade, shade, shade]));
            image_helper::save(&dir.path().join(name), &frame).expect("write frame");
        }
        std::fs::write(dir.path().join("notes.txt"), "ignored").expect("write note");

        let mut source = ImageSequenceSource::open(dir.path()).expect("opens");
        assert_eq!(source.len(), 2);
        let first = source.read_frame().expect("read").expect("frame");
        let second = source.read_frame().expect("read").expect("frame");
        assert_eq!(first.get_pixel(0, 0)[0], 10);
        assert_eq!(second.get_pixel(0, 0)[0], 20);
        assert!(source.read_frame().expect("read").is_none());
    }

    #[test]
    fn undecodable_frame_is_a_read_failure() {
        let dir = tempfile::tempdir().expect("temp dir");
        std::fs::write(dir.path().join("broken.png"), b"not a png").expect("write");
        let mut source = ImageSequenceSource::open(dir.path()).expect("opens");
        assert!(matches!(source.read_frame(), Err(CaptureError::ReadFailed(_))));
    }

    #[test]
    fn device_directories_follow_video_index_naming() {
        let dir = tempfile::tempdir().expect("temp dir");
        std::fs::create_dir(dir.path().join("video0")).expect("mkdir");
        let (index, _) = open_with_fallback(|i| ImageSequenceSource::open_device(dir.path(), i)).expect("opens");
        assert_eq!(index, 0);
    }
}
