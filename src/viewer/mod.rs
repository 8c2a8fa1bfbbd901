mod renderer;

pub use renderer::PointCloudRenderer;

use crate::{capture::Capture, gradient::DepthGradient, recording::Toggle};
use anyhow::Result;
use kiss3d::{
    camera::{ArcBall, Camera},
    event::{Action, Key, WindowEvent},
    planar_camera::PlanarCamera,
    post_processing::PostProcessingEffect,
    renderer::Renderer,
    text::Font,
    window::{State, Window},
};
use kiss3d_utils::WindowPlotExt;
use nalgebra::{Point2, Point3};
use std::rc::Rc;
use tracing::{error, info};

const LEGEND_STEPS: usize = 64;
const TEXT_COLOR: [f32; 3] = [0.0, 0.8, 0.0];
const REC_COLOR: [f32; 3] = [0.9, 0.1, 0.1];

pub struct App {
    capture: Capture,
    source: String,
    orbit: ArcBall,
    renderer: PointCloudRenderer,
    gradient: DepthGradient,
    font: Rc<Font>,
}

impl State for App {
    fn step(&mut self, window: &mut Window) {
        let result = self.try_step(window);
        if let Err(err) = result {
            error!("{err:#}");
            window.close();
        }
    }

    fn cameras_and_effect_and_renderer(
        &mut self,
    ) -> (
        Option<&mut dyn Camera>,
        Option<&mut dyn PlanarCamera>,
        Option<&mut dyn Renderer>,
        Option<&mut dyn PostProcessingEffect>,
    ) {
        (Some(&mut self.orbit), None, Some(&mut self.renderer), None)
    }
}

impl App {
    pub fn build(
        capture: Capture,
        source: String,
        gradient: DepthGradient,
        point_size: f32,
    ) -> Result<Self> {
        // Y-up frames with the camera looking down -Z
        let eye = Point3::from([0.0f32, 0.5, 1.0]);
        let at = Point3::from([0.0f32, 0.0, -3.0]);
        let orbit = ArcBall::new(eye, at);

        let renderer = PointCloudRenderer::new(&gradient, point_size)?;

        Ok(Self {
            capture,
            source,
            orbit,
            renderer,
            gradient,
            font: Font::default(),
        })
    }

    fn try_step(&mut self, window: &mut Window) -> Result<()> {
        self.update(window);
        if let Some(display) = self.capture.next_frame()? {
            self.renderer.load(&display);
        }
        self.render(window);
        Ok(())
    }

    fn update(&mut self, window: &mut Window) {
        let mut quit = false;

        window.events().iter().for_each(|event| {
            use Action as A;
            use Key as K;
            use WindowEvent as E;

            match event.value {
                E::Key(K::Escape, A::Press, _) => {
                    quit = true;
                }
                E::Key(K::S, A::Press, _) => {
                    // save once
                    self.capture.recording_mut().request_snapshot();
                }
                E::Key(K::R, A::Press, _) => match self.capture.recording_mut().toggle() {
                    Toggle::Enabled => info!("Continuous recording ENABLED"),
                    Toggle::Disabled { frames_saved } => {
                        info!("Continuous recording DISABLED. Saved {frames_saved} frames.")
                    }
                },
                _ => {}
            }
        });

        if quit {
            window.close();
        }
    }

    fn render(&mut self, window: &mut Window) {
        let text_color = Point3::from(TEXT_COLOR);
        window.draw_text(
            &format!(
                "{}  points: {}",
                self.source,
                self.renderer.num_points()
            ),
            &Point2::from([5.0; 2]),
            40.0,
            &self.font,
            &text_color,
        );
        window.draw_text(
            &format!(
                "near {:.2} m  far {:.2} m  [S] save  [R] record  [Esc] quit",
                self.gradient.near(),
                self.gradient.far()
            ),
            &Point2::from([5.0, 45.0]),
            32.0,
            &self.font,
            &text_color,
        );
        if let Some(clients) = self.capture.stream_client_count() {
            window.draw_text(
                &format!("streaming to {clients} clients"),
                &Point2::from([5.0, 115.0]),
                32.0,
                &self.font,
                &text_color,
            );
        }
        let recording = self.capture.recording();
        if recording.is_recording() {
            window.draw_text(
                &format!(
                    "REC {} frames -> {}",
                    recording.frame_count(),
                    self.capture.saver().dir().display()
                ),
                &Point2::from([5.0, 80.0]),
                32.0,
                &self.font,
                &Point3::from(REC_COLOR),
            );
        }

        draw_legend(window, &self.gradient);
        window.draw_axes(Point3::origin(), 0.5);
    }
}

/// Horizontal color bar in the lower left corner, from the near depth on
/// the left to the far depth on the right.
fn draw_legend(window: &mut Window, gradient: &DepthGradient) {
    let size = window.size();
    let (width, height) = (size[0] as f32, size[1] as f32);
    let left = -width / 2.0 + 20.0;
    let bottom = -height / 2.0 + 20.0;
    let bar_width = 240.0;
    let step = bar_width / LEGEND_STEPS as f32;

    for index in 0..LEGEND_STEPS {
        let t = (index as f32 + 0.5) / LEGEND_STEPS as f32;
        let depth = gradient.near() + t * (gradient.far() - gradient.near());
        let (r, g, b) = gradient.color(depth).into_components();
        let color = Point3::new(r, g, b);
        let x0 = left + index as f32 * step;
        for row in 0..12 {
            let y = bottom + row as f32;
            window.draw_planar_line(&Point2::new(x0, y), &Point2::new(x0 + step, y), &color);
        }
    }
}
