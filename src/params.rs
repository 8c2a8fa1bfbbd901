use std::{
    fmt,
    net::{Ipv4Addr, SocketAddrV4},
    path::PathBuf,
};
use tracing::{info, warn};

/// Port used by stream senders when the address carries none.
pub const DEFAULT_STREAM_PORT: u16 = 30000;

/// Camera output resolutions, ordered from largest to smallest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resolution {
    Hd2k,
    Hd1200,
    Hd1080,
    Hd720,
    Svga,
    Vga,
}

impl Resolution {
    /// Matching order for command line values. `SVGA` precedes `VGA` since
    /// the latter is a substring of the former.
    const MATCH_ORDER: [Self; 6] = [
        Self::Hd2k,
        Self::Hd1200,
        Self::Hd1080,
        Self::Hd720,
        Self::Svga,
        Self::Vga,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Hd2k => "HD2K",
            Self::Hd1200 => "HD1200",
            Self::Hd1080 => "HD1080",
            Self::Hd720 => "HD720",
            Self::Svga => "SVGA",
            Self::Vga => "VGA",
        }
    }

    /// Image size as `(width, height)` in pixels.
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Self::Hd2k => (2208, 1242),
            Self::Hd1200 => (1920, 1200),
            Self::Hd1080 => (1920, 1080),
            Self::Hd720 => (1280, 720),
            Self::Svga => (960, 600),
            Self::Vga => (672, 376),
        }
    }

    /// Finds the first resolution whose name occurs in `arg`.
    pub fn from_arg(arg: &str) -> Option<Self> {
        Self::MATCH_ORDER
            .into_iter()
            .find(|resolution| arg.contains(resolution.name()))
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::Hd720
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where frames come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    Live,
    Svo(PathBuf),
    Stream(SocketAddrV4),
}

impl InputSource {
    /// Resolves the `--input_svo_file` and `--ip_address` values. Unusable
    /// values are reported and replaced by the live camera.
    pub fn from_args(svo_file: Option<&str>, ip_address: Option<&str>) -> Self {
        if let Some(path) = svo_file.filter(|path| !path.is_empty()) {
            if path.ends_with(".svo") {
                info!("Using SVO file input: {path}");
                return Self::Svo(PathBuf::from(path));
            }
            warn!("{path} is not an .svo file. Using live stream");
            return Self::Live;
        }

        match ip_address.filter(|ip| !ip.is_empty()) {
            Some(ip) => match parse_stream_address(ip) {
                Some(addr) => {
                    info!("Using stream input, IP: {addr}");
                    Self::Stream(addr)
                }
                None => {
                    warn!("Invalid IP format. Using live stream");
                    Self::Live
                }
            },
            None => Self::Live,
        }
    }
}

impl fmt::Display for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Live => write!(f, "live camera"),
            Self::Svo(path) => write!(f, "SVO {}", path.display()),
            Self::Stream(addr) => write!(f, "stream {addr}"),
        }
    }
}

/// Parses `a.b.c.d` or `a.b.c.d:port`.
pub fn parse_stream_address(text: &str) -> Option<SocketAddrV4> {
    let (ip, port) = match text.split_once(':') {
        Some((ip, port)) => {
            if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            (ip, port.parse().ok()?)
        }
        None => (text, DEFAULT_STREAM_PORT),
    };

    if ip.split('.').count() != 4 {
        return None;
    }
    let ip: Ipv4Addr = ip.parse().ok()?;
    Some(SocketAddrV4::new(ip, port))
}

/// Everything needed to open a camera.
///
/// Frame positions are always expressed in meters in a right-handed,
/// Y-up coordinate system.
#[derive(Debug, Clone, PartialEq)]
pub struct InitParameters {
    pub input: InputSource,
    pub resolution: Resolution,
    /// Closest distance at which a sample is kept.
    pub depth_minimum_distance: f32,
    /// Farthest distance at which a sample is kept.
    pub depth_maximum_distance: f32,
}

impl Default for InitParameters {
    fn default() -> Self {
        Self {
            input: InputSource::Live,
            resolution: Resolution::default(),
            depth_minimum_distance: 0.3,
            depth_maximum_distance: 15.0,
        }
    }
}

impl InitParameters {
    /// Applies a `--resolution` value, keeping the default when it does not
    /// name a known resolution.
    pub fn set_resolution_arg(&mut self, arg: Option<&str>) {
        match arg.filter(|arg| !arg.is_empty()) {
            Some(arg) => match Resolution::from_arg(arg) {
                Some(resolution) => {
                    let (width, height) = resolution.dimensions();
                    info!("Using camera in resolution {resolution} ({width}x{height})");
                    self.resolution = resolution;
                }
                None => warn!("No valid resolution entered. Using default"),
            },
            None => info!("Using default resolution"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_substring_order() {
        assert_eq!(Resolution::from_arg("SVGA"), Some(Resolution::Svga));
        assert_eq!(Resolution::from_arg("VGA"), Some(Resolution::Vga));
        assert_eq!(Resolution::from_arg("HD1080"), Some(Resolution::Hd1080));
        assert_eq!(Resolution::from_arg("use HD2K"), Some(Resolution::Hd2k));
        assert_eq!(Resolution::from_arg("hd720"), None);
        assert_eq!(Resolution::from_arg(""), None);
    }

    #[test]
    fn unknown_resolution_keeps_default() {
        let mut params = InitParameters::default();
        params.set_resolution_arg(Some("4K"));
        assert_eq!(params.resolution, Resolution::Hd720);

        params.set_resolution_arg(Some("VGA"));
        assert_eq!(params.resolution, Resolution::Vga);
        assert_eq!(params.resolution.dimensions(), (672, 376));
    }

    #[test]
    fn stream_addresses() {
        assert_eq!(
            parse_stream_address("192.168.1.20:4000"),
            Some(SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 20), 4000))
        );
        assert_eq!(
            parse_stream_address("10.0.0.1"),
            Some(SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), DEFAULT_STREAM_PORT))
        );
        assert_eq!(parse_stream_address("10.0.0"), None);
        assert_eq!(parse_stream_address("10.0.0.1:"), None);
        assert_eq!(parse_stream_address("10.0.0.1:port"), None);
        assert_eq!(parse_stream_address("camera.local:30000"), None);
        assert_eq!(parse_stream_address("10.0.0.1:1:2"), None);
    }

    #[test]
    fn input_source_selection() {
        assert_eq!(
            InputSource::from_args(Some("rec.svo"), None),
            InputSource::Svo(PathBuf::from("rec.svo"))
        );
        assert_eq!(
            InputSource::from_args(Some("rec.mp4"), None),
            InputSource::Live
        );
        assert_eq!(
            InputSource::from_args(None, Some("127.0.0.1:9000")),
            InputSource::Stream(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 9000))
        );
        assert_eq!(InputSource::from_args(None, Some("nope")), InputSource::Live);
        assert_eq!(InputSource::from_args(Some(""), Some("")), InputSource::Live);
    }
}
