//! Recorded session playback and recording.

use super::{
    codec::{FrameReader, FrameWriter},
    CameraInformation, DepthCamera, ErrorCode, LastFrame,
};
use crate::{frame::PointCloudFrame, params::InitParameters};
use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::{Path, PathBuf},
};
use tracing::debug;

pub type SvoRecorder = FrameWriter<BufWriter<File>>;

/// Plays back an SVO session file one frame per grab.
pub struct SvoCamera {
    path: PathBuf,
    reader: FrameReader<BufReader<File>>,
    last: LastFrame,
    position: u64,
}

impl SvoCamera {
    pub fn open(path: impl AsRef<Path>, params: &InitParameters) -> Result<Self, ErrorCode> {
        let path = path.as_ref().to_path_buf();
        let reader = open_reader(&path)?;
        Ok(Self {
            path,
            reader,
            last: LastFrame::new(params),
            position: 0,
        })
    }

    /// Index of the next frame to be grabbed.
    #[cfg(test)]
    pub fn position(&self) -> u64 {
        self.position
    }
}

impl DepthCamera for SvoCamera {
    fn information(&self) -> &CameraInformation {
        self.reader.information()
    }

    fn grab(&mut self) -> Result<(), ErrorCode> {
        match self.reader.read_frame()? {
            Some(frame) => {
                self.last.store(frame);
                self.position += 1;
                Ok(())
            }
            None if self.position == 0 => Err(ErrorCode::InvalidSvoFile(format!(
                "{} contains no frames",
                self.path.display()
            ))),
            None => Err(ErrorCode::EndOfSvoFileReached),
        }
    }

    fn retrieve_point_cloud(
        &mut self,
        resolution: Option<(u32, u32)>,
    ) -> Result<PointCloudFrame, ErrorCode> {
        self.last.retrieve(resolution)
    }

    fn rewind(&mut self) -> Result<(), ErrorCode> {
        debug!("Rewinding {} after {} frames", self.path.display(), self.position);
        self.reader = open_reader(&self.path)?;
        self.position = 0;
        Ok(())
    }
}

fn open_reader(path: &Path) -> Result<FrameReader<BufReader<File>>, ErrorCode> {
    let file = File::open(path)
        .map_err(|err| ErrorCode::InvalidSvoFile(format!("{}: {err}", path.display())))?;
    FrameReader::new(BufReader::new(file))
}

/// Starts a session file at `path`, truncating any existing file.
pub fn create_recorder(
    path: impl AsRef<Path>,
    information: &CameraInformation,
) -> Result<SvoRecorder, ErrorCode> {
    let file = File::create(path)?;
    FrameWriter::new(BufWriter::new(file), information)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::tests::{frame, information};

    fn record(path: &Path, count: u64) {
        let mut recorder = create_recorder(path, &information()).unwrap();
        for ts in 0..count {
            recorder.write_frame(&frame(ts)).unwrap();
        }
        recorder.flush().unwrap();
    }

    #[test]
    fn playback_ends_and_rewinds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.svo");
        record(&path, 3);

        let mut camera = SvoCamera::open(&path, &InitParameters::default()).unwrap();
        assert_eq!(camera.information(), &information());

        for expected in 0..3 {
            camera.grab().unwrap();
            let frame = camera.retrieve_point_cloud(None).unwrap();
            assert_eq!(frame.timestamp_ns(), expected);
            assert_eq!(frame.valid_count(), 5);
        }
        assert_eq!(camera.position(), 3);
        assert!(matches!(camera.grab(), Err(ErrorCode::EndOfSvoFileReached)));

        camera.rewind().unwrap();
        assert_eq!(camera.position(), 0);
        camera.grab().unwrap();
        let frame = camera.retrieve_point_cloud(Some((2, 2))).unwrap();
        assert_eq!(frame.timestamp_ns(), 0);
        assert_eq!(frame.dimensions(), (2, 2));
    }

    #[test]
    fn header_only_session_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.svo");
        record(&path, 0);

        let mut camera = SvoCamera::open(&path, &InitParameters::default()).unwrap();
        assert!(matches!(camera.grab(), Err(ErrorCode::InvalidSvoFile(_))));
        camera.rewind().unwrap();
        assert!(matches!(camera.grab(), Err(ErrorCode::InvalidSvoFile(_))));
    }

    #[test]
    fn not_a_session_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bogus.svo");
        std::fs::write(&path, b"definitely not a recording").unwrap();

        assert!(matches!(
            SvoCamera::open(&path, &InitParameters::default()),
            Err(ErrorCode::InvalidSvoFile(_))
        ));
    }
}
