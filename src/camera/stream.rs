//! Point cloud streaming over TCP.
//!
//! The wire format is the session format from [`super::codec`]: every
//! accepted client first receives the header, then one record per frame.

use super::{
    codec::{FrameReader, FrameWriter},
    CameraInformation, DepthCamera, ErrorCode, LastFrame,
};
use crate::{frame::PointCloudFrame, params::InitParameters};
use std::{
    io::{BufReader, BufWriter, ErrorKind},
    net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpListener, TcpStream},
    time::Duration,
};
use tracing::{info, warn};

/// Bounds both the TCP connect and the wait for the session header.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// A sender that stays silent this long during a grab is considered lost.
pub const GRAB_TIMEOUT: Duration = Duration::from_secs(2);
/// A client that cannot take a frame within this time is dropped.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Receives frames published by a remote [`StreamServer`].
pub struct StreamCamera {
    addr: SocketAddrV4,
    reader: FrameReader<BufReader<TcpStream>>,
    last: LastFrame,
    lost: bool,
}

impl StreamCamera {
    pub fn connect(addr: SocketAddrV4, params: &InitParameters) -> Result<Self, ErrorCode> {
        let stream = TcpStream::connect_timeout(&SocketAddr::V4(addr), CONNECT_TIMEOUT)
            .map_err(|err| ErrorCode::ConnectionFailed(format!("{addr}: {err}")))?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(CONNECT_TIMEOUT))?;

        let reader = FrameReader::new(BufReader::new(stream.try_clone()?)).map_err(|err| {
            match err {
                ErrorCode::InvalidSvoFile(reason) => {
                    ErrorCode::ConnectionFailed(format!("{addr}: {reason}"))
                }
                other => other,
            }
        })?;
        stream.set_read_timeout(Some(GRAB_TIMEOUT))?;

        Ok(Self {
            addr,
            reader,
            last: LastFrame::new(params),
            lost: false,
        })
    }
}

impl DepthCamera for StreamCamera {
    fn information(&self) -> &CameraInformation {
        self.reader.information()
    }

    fn grab(&mut self) -> Result<(), ErrorCode> {
        if self.lost {
            return Err(ErrorCode::ConnectionLost);
        }

        match self.reader.read_frame() {
            Ok(Some(frame)) => {
                self.last.store(frame);
                Ok(())
            }
            Ok(None) => {
                warn!("Stream from {} closed", self.addr);
                self.lost = true;
                Err(ErrorCode::ConnectionLost)
            }
            Err(ErrorCode::Io(err)) => {
                // a timeout may have split a record, so the stream is unusable
                warn!("Stream from {} failed: {err}", self.addr);
                self.lost = true;
                Err(ErrorCode::ConnectionLost)
            }
            Err(err) => {
                // the byte stream cannot be resynchronized after a bad record
                self.lost = true;
                Err(err)
            }
        }
    }

    fn retrieve_point_cloud(
        &mut self,
        resolution: Option<(u32, u32)>,
    ) -> Result<PointCloudFrame, ErrorCode> {
        self.last.retrieve(resolution)
    }
}

/// Publishes grabbed frames to any number of TCP clients without blocking
/// on new connections.
pub struct StreamServer {
    listener: TcpListener,
    information: CameraInformation,
    clients: Vec<(SocketAddr, FrameWriter<BufWriter<TcpStream>>)>,
}

impl StreamServer {
    pub fn bind(port: u16, information: CameraInformation) -> Result<Self, ErrorCode> {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))?;
        listener.set_nonblocking(true)?;
        let server = Self {
            listener,
            information,
            clients: vec![],
        };
        info!("Streaming point clouds on {}", server.local_addr()?);
        Ok(server)
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ErrorCode> {
        Ok(self.listener.local_addr()?)
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Sends `frame` to every client, accepting pending connections first.
    /// Returns the number of clients that received it.
    pub fn publish(&mut self, frame: &PointCloudFrame) -> usize {
        self.accept_pending();

        self.clients.retain_mut(|(addr, writer)| {
            match writer.write_frame(frame).and_then(|()| writer.flush()) {
                Ok(()) => true,
                Err(err) => {
                    info!("Stream client {addr} dropped: {err}");
                    false
                }
            }
        });
        self.clients.len()
    }

    fn accept_pending(&mut self) {
        loop {
            let (stream, addr) = match self.listener.accept() {
                Ok(conn) => conn,
                Err(err) if err.kind() == ErrorKind::WouldBlock => return,
                Err(err) => {
                    warn!("Failed to accept stream client: {err}");
                    return;
                }
            };

            match self.attach(stream) {
                Ok(writer) => {
                    info!("Stream client connected: {addr}");
                    self.clients.push((addr, writer));
                }
                Err(err) => warn!("Failed to set up stream client {addr}: {err}"),
            }
        }
    }

    fn attach(&self, stream: TcpStream) -> Result<FrameWriter<BufWriter<TcpStream>>, ErrorCode> {
        stream.set_nonblocking(false)?;
        stream.set_nodelay(true)?;
        stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
        let mut writer = FrameWriter::new(BufWriter::new(stream), &self.information)?;
        writer.flush()?;
        Ok(writer)
    }
}
