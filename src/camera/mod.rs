pub mod codec;
pub mod live;
pub mod stream;
pub mod svo;

use crate::{
    frame::{FrameSizeError, PointCloudFrame},
    params::{InitParameters, InputSource},
};
use serde::{Deserialize, Serialize};
use std::{fmt, io};
use thiserror::Error;
use tracing::info;

/// Status codes reported by camera backends.
#[derive(Debug, Error)]
pub enum ErrorCode {
    #[error("CAMERA NOT DETECTED: {0}")]
    CameraNotDetected(String),
    #[error("INVALID SVO FILE: {0}")]
    InvalidSvoFile(String),
    #[error("CONNECTION FAILED: {0}")]
    ConnectionFailed(String),
    #[error("CONNECTION LOST")]
    ConnectionLost,
    #[error("END OF SVO FILE REACHED")]
    EndOfSvoFileReached,
    #[error("CORRUPTED FRAME: {0}")]
    CorruptedFrame(String),
    #[error("INVALID RESOLUTION: {0}")]
    InvalidResolution(#[from] FrameSizeError),
    #[error("INVALID FUNCTION CALL: {0}")]
    InvalidFunctionCall(&'static str),
    #[cfg(feature = "realsense")]
    #[error("FAILURE: {0}")]
    Failure(String),
    #[error("I/O ERROR: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraInformation {
    pub model: String,
    pub serial_number: u32,
    /// Native frame size as `(width, height)`.
    pub resolution: (u32, u32),
    pub fps: f32,
}

impl fmt::Display for CameraInformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (width, height) = self.resolution;
        write!(
            f,
            "{} (S/N {}), {width}x{height} @ {} fps",
            self.model, self.serial_number, self.fps
        )
    }
}

/// A source of point cloud frames.
///
/// `grab` acquires the next frame; `retrieve_point_cloud` then returns that
/// frame any number of times, optionally resampled.
pub trait DepthCamera {
    fn information(&self) -> &CameraInformation;

    fn grab(&mut self) -> Result<(), ErrorCode>;

    /// Returns the last grabbed frame, resampled to `resolution` when given.
    fn retrieve_point_cloud(
        &mut self,
        resolution: Option<(u32, u32)>,
    ) -> Result<PointCloudFrame, ErrorCode>;

    /// Restarts playback from the first frame.
    fn rewind(&mut self) -> Result<(), ErrorCode> {
        Err(ErrorCode::InvalidFunctionCall("rewind is only supported for SVO input"))
    }
}

/// Opens the camera backend selected by `params.input`.
pub fn open(params: &InitParameters) -> Result<Box<dyn DepthCamera>, ErrorCode> {
    let camera: Box<dyn DepthCamera> = match &params.input {
        InputSource::Svo(path) => Box::new(svo::SvoCamera::open(path, params)?),
        InputSource::Stream(addr) => Box::new(stream::StreamCamera::connect(*addr, params)?),
        InputSource::Live => live::open(params)?,
    };
    info!("Opened {}: {}", params.input, camera.information());
    Ok(camera)
}

/// Frame storage shared by the backends: holds the last grabbed frame with
/// the configured depth range already applied.
#[derive(Debug)]
pub(crate) struct LastFrame {
    depth_range: (f32, f32),
    frame: Option<PointCloudFrame>,
}

impl LastFrame {
    pub fn new(params: &InitParameters) -> Self {
        Self {
            depth_range: (params.depth_minimum_distance, params.depth_maximum_distance),
            frame: None,
        }
    }

    pub fn store(&mut self, mut frame: PointCloudFrame) {
        let (min, max) = self.depth_range;
        frame.apply_depth_range(min, max);
        self.frame = Some(frame);
    }

    pub fn retrieve(&self, resolution: Option<(u32, u32)>) -> Result<PointCloudFrame, ErrorCode> {
        let frame = self
            .frame
            .as_ref()
            .ok_or(ErrorCode::InvalidFunctionCall("no frame has been grabbed"))?;
        let frame = match resolution {
            Some((width, height)) => frame.resampled(width, height)?,
            None => frame.clone(),
        };
        Ok(frame)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::frame::PointSample;

    pub fn information() -> CameraInformation {
        CameraInformation {
            model: "test".to_string(),
            serial_number: 7,
            resolution: (4, 2),
            fps: 15.0,
        }
    }

    /// A 4x2 frame whose depths step from 0.1 m to 20 m.
    pub fn frame(timestamp_ns: u64) -> PointCloudFrame {
        let depths = [0.1, 1.0, 2.0, 4.0, 8.0, 12.0, 16.0, 20.0];
        let samples = depths
            .iter()
            .enumerate()
            .map(|(i, &z)| PointSample::new([0.0, 0.0, -z], [i as u8, 0, 0, 255]))
            .collect();
        PointCloudFrame::new(4, 2, timestamp_ns, samples).unwrap()
    }

    #[test]
    fn retrieve_requires_a_grab() {
        let last = LastFrame::new(&InitParameters::default());
        assert!(matches!(
            last.retrieve(None),
            Err(ErrorCode::InvalidFunctionCall(_))
        ));
    }

    #[test]
    fn stored_frames_are_depth_filtered() {
        let mut last = LastFrame::new(&InitParameters::default());
        last.store(frame(1));

        let full = last.retrieve(None).unwrap();
        assert_eq!(full.dimensions(), (4, 2));
        assert_eq!(full.valid_count(), 5);

        let small = last.retrieve(Some((2, 1))).unwrap();
        assert_eq!(small.dimensions(), (2, 1));

        assert!(matches!(
            last.retrieve(Some((0, 0))),
            Err(ErrorCode::InvalidResolution(_))
        ));
    }

    #[test]
    fn open_reports_missing_svo_file() {
        let params = InitParameters {
            input: InputSource::Svo("does/not/exist.svo".into()),
            ..InitParameters::default()
        };
        assert!(matches!(open(&params), Err(ErrorCode::InvalidSvoFile(_))));
    }
}
