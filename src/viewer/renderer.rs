use crate::{frame::PointCloudFrame, gradient::DepthGradient};
use anyhow::{Context as _, Result};
use kiss3d::{
    camera::Camera,
    context::Context,
    renderer::Renderer,
    resource::{AllocationType, BufferType, Effect, GPUVec, ShaderAttribute, ShaderUniform},
};
use nalgebra::{Matrix4, Point3};

/// Draws point positions with a vertex shader that derives each color
/// from the point's distance to the camera.
pub struct PointCloudRenderer {
    shader: Effect,
    position: ShaderAttribute<Point3<f32>>,
    proj: ShaderUniform<Matrix4<f32>>,
    view: ShaderUniform<Matrix4<f32>>,
    points: GPUVec<Point3<f32>>,
    point_size: f32,
}

impl PointCloudRenderer {
    pub fn new(gradient: &DepthGradient, point_size: f32) -> Result<Self> {
        let mut shader =
            Effect::new_from_str(&gradient.vertex_shader(), gradient.fragment_shader());
        shader.use_program();

        Ok(Self {
            position: shader
                .get_attrib("position")
                .context("point shader has no `position` attribute")?,
            proj: shader
                .get_uniform("proj")
                .context("point shader has no `proj` uniform")?,
            view: shader
                .get_uniform("view")
                .context("point shader has no `view` uniform")?,
            points: GPUVec::new(Vec::new(), BufferType::Array, AllocationType::StreamDraw),
            shader,
            point_size,
        })
    }

    /// Replaces the drawn points with the valid samples of `frame`.
    pub fn load(&mut self, frame: &PointCloudFrame) {
        if let Some(points) = self.points.data_mut() {
            points.clear();
            points.extend(frame.valid_samples().map(|sample| sample.position()));
        }
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }
}

impl Renderer for PointCloudRenderer {
    fn render(&mut self, pass: usize, camera: &mut dyn Camera) {
        if self.points.len() == 0 {
            return;
        }

        self.shader.use_program();
        self.position.enable();

        camera.upload(pass, &mut self.proj, &mut self.view);
        self.position.bind(&mut self.points);

        let ctxt = Context::get();
        ctxt.point_size(self.point_size);
        ctxt.draw_arrays(Context::POINTS, 0, self.points.len() as i32);

        self.position.disable();
    }
}
