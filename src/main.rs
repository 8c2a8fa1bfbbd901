mod camera;
mod capture;
mod export;
mod frame;
mod gradient;
mod params;
mod recording;
mod viewer;

use anyhow::{Context, Result};
use camera::{stream::StreamServer, svo};
use capture::Capture;
use clap::Parser;
use export::{FrameSaver, PointCloudFormat};
use gradient::DepthGradient;
use kiss3d::{light::Light, window::Window};
use params::{InitParameters, InputSource};
use std::{path::PathBuf, process::ExitCode};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use viewer::App;

/// Depth camera point cloud viewer with depth-gradient coloring and
/// point cloud capture.
#[derive(Parser)]
struct Opts {
    /// Path to an .svo file, if you want to replay it.
    #[clap(long = "input_svo_file")]
    pub input_svo_file: Option<String>,

    /// IP address of a point cloud stream, in format a.b.c.d:port or a.b.c.d.
    #[clap(long = "ip_address")]
    pub ip_address: Option<String>,

    /// Resolution, can be either HD2K, HD1200, HD1080, HD720, SVGA or VGA.
    #[clap(long)]
    pub resolution: Option<String>,

    /// The directory that receives saved point clouds.
    #[clap(long = "output_dir", default_value = "point_clouds")]
    pub output_dir: PathBuf,

    /// File format of saved point clouds.
    #[clap(long, value_enum, default_value_t = PointCloudFormat::Ply)]
    pub format: PointCloudFormat,

    /// Record every grabbed frame into this .svo file.
    #[clap(long = "output_svo_file")]
    pub output_svo_file: Option<PathBuf>,

    /// Publish the displayed point clouds on this TCP port.
    #[clap(long = "stream_port")]
    pub stream_port: Option<u16>,

    /// Depth in meters drawn in pure red.
    #[clap(long, default_value = "0.5")]
    pub near: f32,

    /// Depth in meters drawn in pure blue.
    #[clap(long, default_value = "10.0")]
    pub far: f32,

    /// Samples closer than this many meters are discarded.
    #[clap(long = "depth_min", default_value = "0.3")]
    pub depth_min: f32,

    /// Samples farther than this many meters are discarded.
    #[clap(long = "depth_max", default_value = "15.0")]
    pub depth_max: f32,

    /// Set the plotted point size.
    #[clap(long = "point_size", default_value = "2.0")]
    pub point_size: f32,
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let opts = Opts::parse();
    if opts.has_conflicting_inputs() {
        error!(
            "Specify only input_svo_file or ip_address, or none to use wired camera, not both. \
             Exit program"
        );
        return Ok(ExitCode::FAILURE);
    }

    let gradient = DepthGradient::new(opts.near, opts.far)?;
    anyhow::ensure!(
        0.0 <= opts.depth_min && opts.depth_min < opts.depth_max,
        "depth range must satisfy 0 <= depth_min < depth_max"
    );

    let saver = FrameSaver::create(&opts.output_dir, opts.format)?;
    print_banner(&saver);

    let input = InputSource::from_args(opts.input_svo_file.as_deref(), opts.ip_address.as_deref());
    let mut params = InitParameters {
        input,
        depth_minimum_distance: opts.depth_min,
        depth_maximum_distance: opts.depth_max,
        ..InitParameters::default()
    };
    params.set_resolution_arg(opts.resolution.as_deref());

    let camera = match camera::open(&params) {
        Ok(camera) => camera,
        Err(err) => {
            error!("Error opening camera: {err}");
            return Ok(ExitCode::FAILURE);
        }
    };

    let recorder = opts
        .output_svo_file
        .as_ref()
        .map(|path| {
            info!("Recording SVO to {}", path.display());
            svo::create_recorder(path, camera.information())
                .with_context(|| format!("unable to create {}", path.display()))
        })
        .transpose()?;
    let stream_server = opts
        .stream_port
        .map(|port| StreamServer::bind(port, camera.information().clone()))
        .transpose()
        .context("unable to start streaming")?;

    let mut window = Window::new(env!("CARGO_BIN_NAME"));

    window.set_light(Light::StickToCamera);
    window.set_background_color(0.05, 0.05, 0.08);

    let capture = Capture::new(camera, saver, recorder, stream_server);
    let state = App::build(capture, params.input.to_string(), gradient, opts.point_size)?;
    window.render_loop(state);

    info!("Application closed");
    Ok(ExitCode::SUCCESS)
}

impl Opts {
    /// Both an SVO file and a stream address were given. Empty values do
    /// not count.
    fn has_conflicting_inputs(&self) -> bool {
        let given = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.is_empty());
        given(&self.input_svo_file) && given(&self.ip_address)
    }
}

fn print_banner(saver: &FrameSaver) {
    info!("Depth point cloud viewer with RGB depth gradient");
    info!("Depth coloring: RED (close) -> GREEN (middle) -> BLUE (far)");
    info!("Saving point clouds to {}", saver.dir().display());
    info!("Controls:");
    info!("  Esc          quit");
    info!("  S            save a point cloud");
    info!("  R            enable/disable continuous recording");
    info!("  mouse wheel  zoom in/out");
    info!("  mouse drag   rotate the view");
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_consistent() {
        Opts::command().debug_assert();
    }

    #[test]
    fn svo_and_ip_are_exclusive() {
        let opts = Opts::try_parse_from([
            "viewer",
            "--input_svo_file",
            "rec.svo",
            "--ip_address",
            "10.0.0.2",
        ])
        .unwrap();
        assert!(opts.has_conflicting_inputs());

        let opts =
            Opts::try_parse_from(["viewer", "--input_svo_file", "", "--ip_address", "10.0.0.2"])
                .unwrap();
        assert!(!opts.has_conflicting_inputs());

        let opts = Opts::try_parse_from(["viewer", "--ip_address", "10.0.0.2"]).unwrap();
        assert!(!opts.has_conflicting_inputs());
    }

    #[test]
    fn defaults() {
        let opts = Opts::try_parse_from(["viewer", "--resolution", "VGA"]).unwrap();
        assert_eq!(opts.output_dir, PathBuf::from("point_clouds"));
        assert_eq!(opts.format, PointCloudFormat::Ply);
        assert_eq!((opts.near, opts.far), (0.5, 10.0));
        assert_eq!((opts.depth_min, opts.depth_max), (0.3, 15.0));
        assert_eq!(opts.resolution.as_deref(), Some("VGA"));
        assert!(opts.input_svo_file.is_none());

        let opts = Opts::try_parse_from(["viewer", "--format", "pcd"]).unwrap();
        assert_eq!(opts.format, PointCloudFormat::Pcd);
    }
}
