//! Framing shared by SVO session files and network streams.
//!
//! A session starts with the magic bytes, a little-endian `u16` version and
//! one record holding the [`CameraInformation`]. Every following record is
//! one frame. A record is a little-endian `u32` byte length followed by a
//! bincode payload.

use super::{CameraInformation, ErrorCode};
use crate::frame::PointCloudFrame;
use serde::{de::DeserializeOwned, Serialize};
use std::io::{ErrorKind, Read, Write};

pub const MAGIC: &[u8; 4] = b"ZCSV";
pub const VERSION: u16 = 1;
pub const MAX_RECORD_LEN: u32 = 512 << 20;

pub struct FrameWriter<W: Write> {
    inner: W,
    frames_written: u64,
}

impl<W: Write> FrameWriter<W> {
    /// Writes the session header.
    pub fn new(mut inner: W, information: &CameraInformation) -> Result<Self, ErrorCode> {
        inner.write_all(MAGIC)?;
        inner.write_all(&VERSION.to_le_bytes())?;
        write_record(&mut inner, information)?;
        Ok(Self {
            inner,
            frames_written: 0,
        })
    }

    pub fn write_frame(&mut self, frame: &PointCloudFrame) -> Result<(), ErrorCode> {
        write_record(&mut self.inner, frame)?;
        self.frames_written += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), ErrorCode> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    #[cfg(test)]
    pub fn get_ref(&self) -> &W {
        &self.inner
    }
}

pub struct FrameReader<R: Read> {
    inner: R,
    information: CameraInformation,
}

impl<R: Read> FrameReader<R> {
    /// Reads and validates the session header.
    pub fn new(mut inner: R) -> Result<Self, ErrorCode> {
        let invalid = |reason: String| ErrorCode::InvalidSvoFile(reason);

        let mut magic = [0u8; 4];
        inner
            .read_exact(&mut magic)
            .map_err(|err| invalid(format!("cannot read header: {err}")))?;
        if &magic != MAGIC {
            return Err(invalid(format!("unexpected magic bytes {magic:02x?}")));
        }

        let mut version = [0u8; 2];
        inner
            .read_exact(&mut version)
            .map_err(|err| invalid(format!("cannot read header: {err}")))?;
        let version = u16::from_le_bytes(version);
        if version != VERSION {
            return Err(invalid(format!("unsupported version {version}")));
        }

        let information = read_record(&mut inner)
            .and_then(|record| record.ok_or(ErrorCode::CorruptedFrame("missing record".to_string())))
            .map_err(|err| invalid(format!("cannot read camera information: {err}")))?;

        Ok(Self { inner, information })
    }

    pub fn information(&self) -> &CameraInformation {
        &self.information
    }

    /// Reads the next frame, or `None` at a clean end of input.
    pub fn read_frame(&mut self) -> Result<Option<PointCloudFrame>, ErrorCode> {
        let Some(frame) = read_record::<_, PointCloudFrame>(&mut self.inner)? else {
            return Ok(None);
        };
        frame
            .check_size()
            .map_err(|err| ErrorCode::CorruptedFrame(err.to_string()))?;
        Ok(Some(frame))
    }
}

fn write_record<W: Write, T: Serialize>(writer: &mut W, value: &T) -> Result<(), ErrorCode> {
    let payload =
        bincode::serialize(value).map_err(|err| ErrorCode::CorruptedFrame(err.to_string()))?;
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|&len| len <= MAX_RECORD_LEN)
        .ok_or_else(|| {
            ErrorCode::CorruptedFrame(format!("record of {} bytes is too large", payload.len()))
        })?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    Ok(())
}

fn read_record<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<Option<T>, ErrorCode> {
    let mut len = [0u8; 4];
    if !read_or_eof(reader, &mut len)? {
        return Ok(None);
    }
    let len = u32::from_le_bytes(len);
    if len > MAX_RECORD_LEN {
        return Err(ErrorCode::CorruptedFrame(format!(
            "record length {len} exceeds {MAX_RECORD_LEN}"
        )));
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).map_err(|err| match err.kind() {
        ErrorKind::UnexpectedEof => ErrorCode::CorruptedFrame("truncated record".to_string()),
        _ => ErrorCode::Io(err),
    })?;

    let value =
        bincode::deserialize(&payload).map_err(|err| ErrorCode::CorruptedFrame(err.to_string()))?;
    Ok(Some(value))
}

/// Fills `buf` completely. Returns `false` if the input ended before the
/// first byte; ending after it is a truncated record.
fn read_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<bool, ErrorCode> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => return Err(ErrorCode::CorruptedFrame("truncated record".to_string())),
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) => return Err(ErrorCode::Io(err)),
        }
    }
    Ok(true)
}

impl<W: Write> Drop for FrameWriter<W> {
    fn drop(&mut self) {
        let _ = self.inner.flush();
    }
}
