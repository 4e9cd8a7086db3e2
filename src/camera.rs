use crate::configuration::CaptureConfig;
use crate::error::{GuideError, GuideResult};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::*;

/// Blocking source of JPEG encoded frames
pub trait FrameSource: Send {
    fn capture(&mut self) -> GuideResult<Vec<u8>>;
}

/// Frame source shared between the capture loop and on-demand uploads
#[derive(Clone)]
pub struct SharedFrameSource {
    inner: Arc<Mutex<Box<dyn FrameSource>>>,
}

impl SharedFrameSource {
    pub fn new(source: Box<dyn FrameSource>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(source)),
        }
    }

    pub async fn grab(&self) -> GuideResult<Vec<u8>> {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let mut source = inner
                .lock()
                .map_err(|_| GuideError::CameraError("frame source lock poisoned".to_owned()))?;
            source.capture()
        })
        .await?
    }
}

/// Replays one JPEG file for every frame
pub struct StillImageSource {
    path: PathBuf,
}

impl StillImageSource {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_owned(),
        }
    }
}

impl FrameSource for StillImageSource {
    fn capture(&mut self) -> GuideResult<Vec<u8>> {
        Ok(std::fs::read(&self.path)?)
    }
}

pub fn open_frame_source(config: &CaptureConfig) -> GuideResult<Box<dyn FrameSource>> {
    if let Some(path) = &config.still_image {
        info!("Using still image {:?} as camera", path);
        return Ok(Box::new(StillImageSource::new(path)));
    }
    open_camera(config)
}

#[cfg(feature = "camera")]
fn open_camera(config: &CaptureConfig) -> GuideResult<Box<dyn FrameSource>> {
    Ok(Box::new(v4l_camera::V4lCamera::open(config)?))
}

#[cfg(not(feature = "camera"))]
fn open_camera(_config: &CaptureConfig) -> GuideResult<Box<dyn FrameSource>> {
    Err(GuideError::CameraError(
        "built without camera support, configure capture.still_image".to_owned(),
    ))
}

#[cfg(feature = "camera")]
mod v4l_camera {
    use super::FrameSource;
    use crate::configuration::CaptureConfig;
    use crate::error::{GuideError, GuideResult};
    use tracing::*;
    use v4l::buffer::Type;
    use v4l::io::mmap::Stream;
    use v4l::io::traits::CaptureStream;
    use v4l::video::Capture;
    use v4l::{Device, FourCC};

    const BUFFER_COUNT: u32 = 4;

    pub struct V4lCamera {
        _device: Device,
        stream: Stream<'static>,
    }

    impl V4lCamera {
        pub fn open(config: &CaptureConfig) -> GuideResult<Self> {
            let device = Device::new(config.device_index)?;

            let caps = device.query_caps()?;
            info!("Opened camera {} ({})", caps.card, caps.driver);

            let mjpeg = FourCC::new(b"MJPG");
            let mut format = device.format()?;
            format.width = config.width;
            format.height = config.height;
            format.fourcc = mjpeg;
            let format = device.set_format(&format)?;
            if format.fourcc != mjpeg {
                return Err(GuideError::CameraError(format!(
                    "camera does not support MJPG, got {:?}",
                    format.fourcc
                )));
            }
            info!("Capturing {}x{} MJPG", format.width, format.height);

            let stream = Stream::with_buffers(&device, Type::VideoCapture, BUFFER_COUNT)?;
            Ok(Self {
                _device: device,
                stream,
            })
        }
    }

    impl FrameSource for V4lCamera {
        fn capture(&mut self) -> GuideResult<Vec<u8>> {
            let (buffer, meta) = self.stream.next()?;
            let used = (meta.bytesused as usize).min(buffer.len());
            if used == 0 {
                return Err(GuideError::CameraError("camera returned empty frame".to_owned()));
            }
            Ok(buffer[..used].to_vec())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[tokio::test]
    async fn still_image_is_replayed() {
        let temp_dir = TempDir::new("walk_guide_camera").unwrap();
        let path = temp_dir.path().join("frame.jpg");
        std::fs::write(&path, [0xFF, 0xD8, 0xFF, 0xD9]).unwrap();

        let frames = SharedFrameSource::new(Box::new(StillImageSource::new(&path)));
        assert_eq!(frames.grab().await.unwrap(), vec![0xFF, 0xD8, 0xFF, 0xD9]);
        assert_eq!(frames.clone().grab().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn missing_still_image_fails() {
        let frames = SharedFrameSource::new(Box::new(StillImageSource::new(Path::new(
            "/nonexistent/walk_guide/frame.jpg",
        ))));
        assert!(matches!(frames.grab().await, Err(GuideError::IoError(_))));
    }
}
