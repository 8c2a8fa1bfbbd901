use itertools::iproduct;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointSample {
    /// Position in meters. Non-finite when the sample has no depth.
    pub xyz: [f32; 3],
    pub rgba: [u8; 4],
}

impl PointSample {
    pub const INVALID: Self = Self {
        xyz: [f32::NAN; 3],
        rgba: [0; 4],
    };

    pub fn new(xyz: [f32; 3], rgba: [u8; 4]) -> Self {
        Self { xyz, rgba }
    }

    pub fn position(&self) -> Point3<f32> {
        Point3::from(self.xyz)
    }

    pub fn is_valid(&self) -> bool {
        self.xyz.iter().all(|v| v.is_finite())
    }

    /// Distance from the camera origin.
    pub fn depth(&self) -> f32 {
        let [x, y, z] = self.xyz;
        (x * x + y * y + z * z).sqrt()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("a {width}x{height} frame needs {expected} samples, got {actual}")]
pub struct FrameSizeError {
    pub width: u32,
    pub height: u32,
    pub expected: usize,
    pub actual: usize,
}

/// One organized point cloud: a `width x height` grid in row-major order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointCloudFrame {
    width: u32,
    height: u32,
    timestamp_ns: u64,
    samples: Vec<PointSample>,
}

impl PointCloudFrame {
    pub fn new(
        width: u32,
        height: u32,
        timestamp_ns: u64,
        samples: Vec<PointSample>,
    ) -> Result<Self, FrameSizeError> {
        let frame = Self {
            width,
            height,
            timestamp_ns,
            samples,
        };
        frame.check_size()?;
        Ok(frame)
    }

    /// Verifies that the sample count matches the grid size. Frames decoded
    /// from untrusted bytes must pass this before use.
    pub fn check_size(&self) -> Result<(), FrameSizeError> {
        let expected = self.width as usize * self.height as usize;
        if self.samples.len() != expected {
            return Err(FrameSizeError {
                width: self.width,
                height: self.height,
                expected,
                actual: self.samples.len(),
            });
        }
        Ok(())
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn timestamp_ns(&self) -> u64 {
        self.timestamp_ns
    }

    #[cfg(test)]
    pub fn samples(&self) -> &[PointSample] {
        &self.samples
    }

    #[cfg(test)]
    pub fn get(&self, x: u32, y: u32) -> Option<&PointSample> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.samples.get(y as usize * self.width as usize + x as usize)
    }

    pub fn valid_samples(&self) -> impl Iterator<Item = &PointSample> + '_ {
        self.samples.iter().filter(|sample| sample.is_valid())
    }

    pub fn valid_count(&self) -> usize {
        self.valid_samples().count()
    }

    /// Nearest-neighbour resampling onto a `width x height` grid.
    pub fn resampled(&self, width: u32, height: u32) -> Result<Self, FrameSizeError> {
        if (width, height) == self.dimensions() {
            return Ok(self.clone());
        }
        if width == 0 || height == 0 || self.samples.is_empty() {
            return Err(FrameSizeError {
                width,
                height,
                expected: width as usize * height as usize,
                actual: 0,
            });
        }

        let scale = |dst: u32, dst_len: u32, src_len: u32| {
            (dst as u64 * src_len as u64 / dst_len as u64) as u32
        };
        let samples = iproduct!(0..height, 0..width)
            .map(|(y, x)| {
                let src_x = scale(x, width, self.width);
                let src_y = scale(y, height, self.height);
                self.samples[src_y as usize * self.width as usize + src_x as usize]
            })
            .collect();

        Ok(Self {
            width,
            height,
            timestamp_ns: self.timestamp_ns,
            samples,
        })
    }

    /// Invalidates samples whose depth falls outside `[min, max]`.
    pub fn apply_depth_range(&mut self, min: f32, max: f32) {
        self.samples
            .iter_mut()
            .filter(|sample| !(min..=max).contains(&sample.depth()))
            .for_each(|sample| *sample = PointSample::INVALID);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(width: u32, height: u32) -> PointCloudFrame {
        let samples = iproduct!(0..height, 0..width)
            .map(|(y, x)| PointSample::new([x as f32, y as f32, 1.0], [x as u8, y as u8, 0, 255]))
            .collect();
        PointCloudFrame::new(width, height, 42, samples).unwrap()
    }

    #[test]
    fn size_mismatch_is_rejected() {
        let err = PointCloudFrame::new(2, 2, 0, vec![PointSample::INVALID; 3]).unwrap_err();
        assert_eq!(err.actual, 3);
        assert!(err.to_string().contains("needs 4 samples"));
    }

    #[test]
    fn downsampling_picks_nearest_sample() {
        let frame = grid(4, 4);
        let small = frame.resampled(2, 2).unwrap();
        assert_eq!(small.dimensions(), (2, 2));
        assert_eq!(small.timestamp_ns(), 42);
        assert_eq!(small.get(1, 1).unwrap().xyz, [2.0, 2.0, 1.0]);
        assert_eq!(small.get(1, 0).unwrap().xyz, [2.0, 0.0, 1.0]);
        assert!(small.get(2, 0).is_none());
    }

    #[test]
    fn upsampling_repeats_samples() {
        let frame = grid(2, 1);
        let wide = frame.resampled(4, 2).unwrap();
        let xs: Vec<f32> = wide.samples().iter().map(|s| s.xyz[0]).collect();
        assert_eq!(xs, vec![0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 1.0]);
        assert!(frame.resampled(0, 3).is_err());
    }

    #[test]
    fn depth_range_invalidates_outliers() {
        let mut frame = PointCloudFrame::new(
            3,
            1,
            0,
            vec![
                PointSample::new([0.0, 0.0, 0.1], [1; 4]),
                PointSample::new([0.0, 3.0, 4.0], [2; 4]),
                PointSample::new([0.0, 0.0, 20.0], [3; 4]),
            ],
        )
        .unwrap();
        frame.apply_depth_range(0.3, 15.0);

        assert_eq!(frame.valid_count(), 1);
        let kept = frame.valid_samples().next().unwrap();
        assert_eq!(kept.depth(), 5.0);
        assert_eq!(kept.rgba, [2; 4]);
        assert!(!frame.get(0, 0).unwrap().is_valid());
    }
}
