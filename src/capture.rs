//! Per-frame acquisition: grab, display retrieval, streaming and saving.

use crate::{
    camera::{stream::StreamServer, svo::SvoRecorder, DepthCamera, ErrorCode},
    export::FrameSaver,
    frame::PointCloudFrame,
    recording::RecordingState,
};
use anyhow::Result;
use tracing::{error, info, warn};

/// Point clouds are retrieved at this size for display; saving uses the
/// camera's full resolution.
pub const DISPLAY_RESOLUTION: (u32, u32) = (720, 404);

pub struct Capture {
    camera: Box<dyn DepthCamera>,
    saver: FrameSaver,
    recording: RecordingState,
    recorder: Option<SvoRecorder>,
    stream_server: Option<StreamServer>,
}

impl Capture {
    pub fn new(
        camera: Box<dyn DepthCamera>,
        saver: FrameSaver,
        recorder: Option<SvoRecorder>,
        stream_server: Option<StreamServer>,
    ) -> Self {
        Self {
            camera,
            saver,
            recording: RecordingState::default(),
            recorder,
            stream_server,
        }
    }

    pub fn recording(&self) -> &RecordingState {
        &self.recording
    }

    pub fn recording_mut(&mut self) -> &mut RecordingState {
        &mut self.recording
    }

    pub fn saver(&self) -> &FrameSaver {
        &self.saver
    }

    pub fn stream_client_count(&self) -> Option<usize> {
        self.stream_server.as_ref().map(StreamServer::client_count)
    }

    /// Grabs one frame, publishes it and persists it where requested, then
    /// returns it at display resolution.
    ///
    /// Returns `None` when no frame could be grabbed or retrieved. Those
    /// failures are logged and skipped, as are write failures. Only an
    /// unusable SVO file is returned as an error.
    pub fn next_frame(&mut self) -> Result<Option<PointCloudFrame>> {
        match self.camera.grab() {
            Ok(()) => {}
            Err(ErrorCode::EndOfSvoFileReached) => {
                info!("End of SVO file reached, restarting playback");
                self.camera.rewind()?;
                return Ok(None);
            }
            Err(err @ ErrorCode::InvalidSvoFile(_)) => return Err(err.into()),
            Err(err) => {
                warn!("Failed to grab frame: {err}");
                return Ok(None);
            }
        }

        let display = match self.camera.retrieve_point_cloud(Some(DISPLAY_RESOLUTION)) {
            Ok(frame) => frame,
            Err(err) => {
                warn!("Failed to retrieve point cloud: {err}");
                return Ok(None);
            }
        };
        if let Some(server) = &mut self.stream_server {
            server.publish(&display);
        }

        let snapshot = self.recording.snapshot_requested();
        if !(snapshot || self.recording.is_recording() || self.recorder.is_some()) {
            return Ok(Some(display));
        }

        let full = match self.camera.retrieve_point_cloud(None) {
            Ok(frame) => frame,
            Err(err) => {
                // a pending save request stays queued for the next frame
                warn!("Failed to retrieve full resolution point cloud: {err}");
                return Ok(Some(display));
            }
        };
        if snapshot {
            self.recording.take_snapshot_request();
        }
        self.persist(&full, snapshot);
        Ok(Some(display))
    }

    fn persist(&mut self, frame: &PointCloudFrame, snapshot: bool) {
        if snapshot {
            match self.saver.save_snapshot(frame) {
                Ok(path) => info!("Point cloud saved to: {}", path.display()),
                Err(err) => error!("Failed to save point cloud: {err:#}"),
            }
        }

        if self.recording.is_recording() {
            match self.saver.save_sequence_frame(frame) {
                Ok(path) => {
                    let count = self.recording.frame_saved();
                    info!("Recording frame {count}: {}", path.display());
                }
                Err(err) => error!("Failed to save frame: {err:#}"),
            }
        }

        if let Some(recorder) = &mut self.recorder {
            if let Err(err) = recorder.write_frame(frame) {
                error!("Failed to write SVO frame: {err}");
            }
        }
    }
}

impl Drop for Capture {
    fn drop(&mut self) {
        if self.recording.is_recording() {
            info!(
                "Continuous recording DISABLED. Saved {} frames.",
                self.recording.frame_count()
            );
        }
        if let Some(recorder) = &mut self.recorder {
            match recorder.flush() {
                Ok(()) => info!(
                    "SVO recording closed after {} frames",
                    recorder.frames_written()
                ),
                Err(err) => error!("Failed to finish SVO recording: {err}"),
            }
        }
    }
}
