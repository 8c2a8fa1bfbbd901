//! Live depth camera input.

use super::{DepthCamera, ErrorCode};
use crate::params::InitParameters;

#[cfg(feature = "realsense")]
pub use realsense::LiveCamera;

#[cfg(feature = "realsense")]
pub fn open(params: &InitParameters) -> Result<Box<dyn DepthCamera>, ErrorCode> {
    Ok(Box::new(LiveCamera::open(params)?))
}

#[cfg(not(feature = "realsense"))]
pub fn open(_params: &InitParameters) -> Result<Box<dyn DepthCamera>, ErrorCode> {
    Err(ErrorCode::CameraNotDetected(
        "no live camera backend was compiled in, rebuild with `--features realsense` \
         or use --input_svo_file / --ip_address"
            .to_string(),
    ))
}

#[cfg(feature = "realsense")]
mod realsense {
    use crate::{
        camera::{CameraInformation, DepthCamera, ErrorCode, LastFrame},
        frame::{PointCloudFrame, PointSample},
        params::{InitParameters, Resolution},
    };
    use itertools::iproduct;
    use realsense_rust::{
        config::Config,
        context::Context,
        frame::{DepthFrame, FrameEx},
        kind::{Rs2CameraInfo, Rs2Format, Rs2ProductLine, Rs2StreamKind},
        pipeline::{ActivePipeline, InactivePipeline},
    };
    use std::{collections::HashSet, convert::TryFrom, fmt::Display, time::Duration};
    use tracing::{info, warn};

    const FRAME_TIMEOUT: Duration = Duration::from_millis(2000);
    const FPS: usize = 30;

    pub struct LiveCamera {
        pipeline: ActivePipeline,
        information: CameraInformation,
        last: LastFrame,
    }

    impl LiveCamera {
        pub fn open(params: &InitParameters) -> Result<Self, ErrorCode> {
            let context = Context::new().map_err(failure)?;

            let mut product_lines = HashSet::new();
            product_lines.insert(Rs2ProductLine::D400);
            let devices = context.query_devices(product_lines);
            let device = devices.first().ok_or_else(|| {
                ErrorCode::CameraNotDetected("no RealSense D400 device found".to_string())
            })?;

            let serial = device
                .info(Rs2CameraInfo::SerialNumber)
                .ok_or_else(|| ErrorCode::Failure("device has no serial number".to_string()))?;
            let model = device
                .info(Rs2CameraInfo::Name)
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "RealSense".to_string());
            let serial_number = serial.to_string_lossy().parse().unwrap_or_default();

            let (width, height) = depth_stream_size(params.resolution);
            let mut config = Config::new();
            config
                .enable_device_from_serial(serial)
                .map_err(failure)?
                .disable_all_streams()
                .map_err(failure)?
                .enable_stream(
                    Rs2StreamKind::Depth,
                    None,
                    width,
                    height,
                    Rs2Format::Z16,
                    FPS,
                )
                .map_err(failure)?;

            let pipeline = InactivePipeline::try_from(&context).map_err(failure)?;
            let pipeline = pipeline.start(Some(config)).map_err(failure)?;

            let information = CameraInformation {
                model,
                serial_number,
                resolution: (width as u32, height as u32),
                fps: FPS as f32,
            };

            Ok(Self {
                pipeline,
                information,
                last: LastFrame::new(params),
            })
        }
    }

    impl DepthCamera for LiveCamera {
        fn information(&self) -> &CameraInformation {
            &self.information
        }

        fn grab(&mut self) -> Result<(), ErrorCode> {
            let frames = self.pipeline.wait(Some(FRAME_TIMEOUT)).map_err(failure)?;
            let depth = frames
                .frames_of_type::<DepthFrame>()
                .pop()
                .ok_or_else(|| ErrorCode::CorruptedFrame("no depth frame".to_string()))?;
            let frame = deproject(&depth)?;
            self.last.store(frame);
            Ok(())
        }

        fn retrieve_point_cloud(
            &mut self,
            resolution: Option<(u32, u32)>,
        ) -> Result<PointCloudFrame, ErrorCode> {
            self.last.retrieve(resolution)
        }
    }

    /// Back-projects every depth pixel with the pinhole intrinsics and
    /// converts from the optical frame (Y down, Z forward) to Y-up with the
    /// camera looking down -Z.
    fn deproject(depth: &DepthFrame) -> Result<PointCloudFrame, ErrorCode> {
        let intrinsics = depth.stream_profile().intrinsics().map_err(failure)?;
        let (fx, fy) = (intrinsics.fx(), intrinsics.fy());
        let (ppx, ppy) = (intrinsics.ppx(), intrinsics.ppy());
        let (width, height) = (depth.width(), depth.height());

        let samples = iproduct!(0..height, 0..width)
            .map(|(row, col)| match depth.distance(col, row) {
                Ok(z) if z > 0.0 => {
                    let x = (col as f32 - ppx) / fx * z;
                    let y = (row as f32 - ppy) / fy * z;
                    PointSample::new([x, -y, -z], [255; 4])
                }
                _ => PointSample::INVALID,
            })
            .collect();

        let timestamp_ns = (depth.timestamp() * 1e6) as u64;
        Ok(PointCloudFrame::new(
            width as u32,
            height as u32,
            timestamp_ns,
            samples,
        )?)
    }

    /// Depth stream sizes supported by D400 cameras closest to `resolution`.
    fn depth_stream_size(resolution: Resolution) -> (usize, usize) {
        let size = match resolution {
            Resolution::Hd720 => (1280, 720),
            Resolution::Svga | Resolution::Vga => (640, 480),
            other => {
                warn!("{other} is not available on RealSense depth streams, using 1280x720");
                (1280, 720)
            }
        };
        info!("RealSense depth stream at {}x{}", size.0, size.1);
        size
    }

    fn failure(err: impl Display) -> ErrorCode {
        ErrorCode::Failure(err.to_string())
    }
}
