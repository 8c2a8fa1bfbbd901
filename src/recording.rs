/// Save requests and the continuous recording switch driven by key presses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordingState {
    snapshot_requested: bool,
    recording: bool,
    frame_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Enabled,
    Disabled { frames_saved: u64 },
}

impl RecordingState {
    pub fn request_snapshot(&mut self) {
        self.snapshot_requested = true;
    }

    pub fn snapshot_requested(&self) -> bool {
        self.snapshot_requested
    }

    /// Returns whether a snapshot was requested and clears the request.
    pub fn take_snapshot_request(&mut self) -> bool {
        std::mem::take(&mut self.snapshot_requested)
    }

    /// Flips continuous recording. Enabling restarts the frame count.
    pub fn toggle(&mut self) -> Toggle {
        self.recording = !self.recording;
        if self.recording {
            self.frame_count = 0;
            Toggle::Enabled
        } else {
            Toggle::Disabled {
                frames_saved: self.frame_count,
            }
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Counts one saved frame and returns the new total.
    pub fn frame_saved(&mut self) -> u64 {
        self.frame_count += 1;
        self.frame_count
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}
