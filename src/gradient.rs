//! Depth-to-color mapping shared by the point shader and the on-screen
//! legend.
//!
//! Normalized depth runs through three linear segments: red to yellow,
//! yellow to cyan, then cyan to blue.

use anyhow::{ensure, Result};
use itertools::Itertools;
use palette::{Mix, Srgb};

/// Gradient stops as `(normalized depth, rgb)`.
const STOPS: [(f32, [f32; 3]); 4] = [
    (0.0, [1.0, 0.0, 0.0]),
    (0.33, [1.0, 1.0, 0.0]),
    (0.67, [0.0, 1.0, 1.0]),
    (1.0, [0.0, 0.0, 1.0]),
];

pub const FRAGMENT_SHADER: &str = "#version 100
#ifdef GL_FRAGMENT_PRECISION_HIGH
   precision highp float;
#else
   precision mediump float;
#endif

varying vec3 Color;

void main() {
    gl_FragColor = vec4(Color, 1.0);
}
";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthGradient {
    near: f32,
    far: f32,
}

impl Default for DepthGradient {
    fn default() -> Self {
        Self {
            near: 0.5,
            far: 10.0,
        }
    }
}

impl DepthGradient {
    pub fn new(near: f32, far: f32) -> Result<Self> {
        ensure!(
            near.is_finite() && far.is_finite(),
            "gradient bounds must be finite"
        );
        ensure!(
            0.0 <= near && near < far,
            "gradient bounds must satisfy 0 <= near < far, got near = {near}, far = {far}"
        );
        Ok(Self { near, far })
    }

    pub fn near(&self) -> f32 {
        self.near
    }

    pub fn far(&self) -> f32 {
        self.far
    }

    /// Maps a depth in meters onto `[0, 1]`.
    pub fn normalize(&self, depth: f32) -> f32 {
        ((depth - self.near) / (self.far - self.near)).clamp(0.0, 1.0)
    }

    /// Color for a depth in meters.
    pub fn color(&self, depth: f32) -> Srgb<f32> {
        self.color_normalized(self.normalize(depth))
    }

    /// Color for an already normalized depth. NaN maps to the near color.
    pub fn color_normalized(&self, t: f32) -> Srgb<f32> {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        let ((lo, lo_rgb), (hi, hi_rgb)) = STOPS
            .iter()
            .copied()
            .tuple_windows()
            .find(|&(_, (hi, _))| t < hi)
            .unwrap_or((STOPS[2], STOPS[3]));
        let factor = ((t - lo) / (hi - lo)).clamp(0.0, 1.0);
        srgb(lo_rgb).mix(srgb(hi_rgb), factor)
    }

    /// GLSL vertex shader applying this gradient to each point by its
    /// distance from the camera.
    pub fn vertex_shader(&self) -> String {
        let mut src = String::from(
            "#version 100
attribute vec3 position;
uniform mat4 proj;
uniform mat4 view;
varying vec3 Color;

void main() {
    float depth = length(position);
",
        );
        src.push_str(&format!(
            "    float t = clamp((depth - {near}) / ({far} - {near}), 0.0, 1.0);\n",
            near = glsl_float(self.near),
            far = glsl_float(self.far),
        ));

        let segments: Vec<_> = STOPS.iter().tuple_windows().collect();
        for (index, ((lo, lo_rgb), (hi, hi_rgb))) in segments.iter().enumerate() {
            let keyword = match index {
                0 => format!("    if (t < {}) {{\n", glsl_float(*hi)),
                _ if index + 1 == segments.len() => "    } else {\n".to_string(),
                _ => format!("    }} else if (t < {}) {{\n", glsl_float(*hi)),
            };
            src.push_str(&keyword);
            src.push_str(&format!(
                "        Color = mix({}, {}, (t - {}) / {});\n",
                glsl_vec3(lo_rgb),
                glsl_vec3(hi_rgb),
                glsl_float(*lo),
                glsl_float(hi - lo),
            ));
        }
        src.push_str(
            "    }
    gl_Position = proj * view * vec4(position, 1.0);
}
",
        );
        src
    }

    pub fn fragment_shader(&self) -> &'static str {
        FRAGMENT_SHADER
    }
}

fn srgb([r, g, b]: [f32; 3]) -> Srgb<f32> {
    Srgb::new(r, g, b)
}

fn glsl_float(value: f32) -> String {
    format!("{value:.6}")
}

fn glsl_vec3([r, g, b]: &[f32; 3]) -> String {
    format!("vec3({}, {}, {})", glsl_float(*r), glsl_float(*g), glsl_float(*b))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-4;

    fn rgb(color: Srgb<f32>) -> [f32; 3] {
        let (r, g, b) = color.into_components();
        [r, g, b]
    }

    fn assert_close(a: [f32; 3], b: [f32; 3], eps: f32) {
        for (x, y) in a.iter().zip(b) {
            assert!((x - y).abs() <= eps, "{a:?} != {b:?}");
        }
    }

    #[test]
    fn near_is_red_and_far_is_blue() {
        let gradient = DepthGradient::default();
        for depth in [-1.0, 0.0, 0.25, 0.5] {
            assert_close(rgb(gradient.color(depth)), [1.0, 0.0, 0.0], EPS);
        }
        for depth in [10.0, 12.5, 1000.0, f32::INFINITY] {
            assert_close(rgb(gradient.color(depth)), [0.0, 0.0, 1.0], EPS);
        }
    }

    #[test]
    fn segment_midpoints() {
        let gradient = DepthGradient::new(0.0, 1.0).unwrap();
        assert_close(rgb(gradient.color(0.33)), [1.0, 1.0, 0.0], EPS);
        assert_close(rgb(gradient.color(0.5)), [0.5, 1.0, 0.5], 1e-2);
        assert_close(rgb(gradient.color(0.67)), [0.0, 1.0, 1.0], EPS);
    }

    #[test]
    fn continuous_at_segment_boundaries() {
        let gradient = DepthGradient::new(0.0, 1.0).unwrap();
        for boundary in [0.33_f32, 0.67] {
            let below = rgb(gradient.color(boundary - 1e-5));
            let above = rgb(gradient.color(boundary + 1e-5));
            assert_close(below, above, 1e-3);
        }
    }

    #[test]
    fn channels_stay_in_unit_range() {
        let gradient = DepthGradient::default();
        for step in 0..=2000 {
            let depth = step as f32 * 0.01 - 2.0;
            for channel in rgb(gradient.color(depth)) {
                assert!((0.0..=1.0).contains(&channel), "{depth} -> {channel}");
            }
        }
        assert_close(rgb(gradient.color(f32::NAN)), [1.0, 0.0, 0.0], EPS);
    }

    #[test]
    fn invalid_bounds() {
        assert!(DepthGradient::new(2.0, 1.0).is_err());
        assert!(DepthGradient::new(1.0, 1.0).is_err());
        assert!(DepthGradient::new(-0.5, 1.0).is_err());
        assert!(DepthGradient::new(0.5, f32::NAN).is_err());
    }

    #[test]
    fn vertex_shader_bakes_bounds() {
        let src = DepthGradient::new(0.25, 8.0).unwrap().vertex_shader();
        assert!(src.starts_with("#version 100"));
        assert!(src.contains("(depth - 0.250000) / (8.000000 - 0.250000)"));
        assert!(src.contains("if (t < 0.330000) {"));
        assert!(src.contains("} else if (t < 0.670000) {"));
        assert!(src.contains("} else {"));
        assert_eq!(src.matches("Color = mix(").count(), 3);
        assert_eq!(src.matches('{').count(), src.matches('}').count());
        assert!(src.contains("gl_Position = proj * view * vec4(position, 1.0);"));
    }
}
