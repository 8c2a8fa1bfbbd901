use crate::frame::{PointCloudFrame, PointSample};
use anyhow::{anyhow, ensure, Context, Result};
use chrono::{DateTime, Local};
use clap::ValueEnum;
use pcd_rs::{DataKind, PcdDeserialize, PcdSerialize, WriterInit};
use ply_rs::{
    ply::{
        Addable, DefaultElement, ElementDef, Encoding, Ply, Property, PropertyDef, PropertyType,
        ScalarType,
    },
    writer::Writer,
};
use std::{
    fs::{self, File},
    io::BufWriter,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum PointCloudFormat {
    #[default]
    Ply,
    Pcd,
}

impl PointCloudFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Ply => "ply",
            Self::Pcd => "pcd",
        }
    }

    pub fn write(&self, path: &Path, frame: &PointCloudFrame) -> Result<()> {
        match self {
            Self::Ply => write_ply(path, frame),
            Self::Pcd => write_pcd(path, frame),
        }
    }
}

/// Saves frames under one directory with timestamped names.
#[derive(Debug, Clone)]
pub struct FrameSaver {
    dir: PathBuf,
    format: PointCloudFormat,
}

impl FrameSaver {
    /// Creates `dir` if needed.
    pub fn create(dir: impl AsRef<Path>, format: PointCloudFormat) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("unable to create directory {}", dir.display()))?;
        Ok(Self { dir, format })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `pointcloud_YYYYmmdd_HHMMSS.<ext>`
    pub fn snapshot_path(&self, time: &DateTime<Local>) -> PathBuf {
        self.path_for(time, "%Y%m%d_%H%M%S")
    }

    /// `pointcloud_YYYYmmdd_HHMMSS_ffffff.<ext>`, unique per microsecond.
    pub fn sequence_path(&self, time: &DateTime<Local>) -> PathBuf {
        self.path_for(time, "%Y%m%d_%H%M%S_%6f")
    }

    pub fn save_snapshot(&self, frame: &PointCloudFrame) -> Result<PathBuf> {
        let path = self.snapshot_path(&Local::now());
        self.format.write(&path, frame)?;
        Ok(path)
    }

    pub fn save_sequence_frame(&self, frame: &PointCloudFrame) -> Result<PathBuf> {
        let path = self.sequence_path(&Local::now());
        self.format.write(&path, frame)?;
        Ok(path)
    }

    fn path_for(&self, time: &DateTime<Local>, pattern: &str) -> PathBuf {
        let stamp = time.format(pattern);
        self.dir
            .join(format!("pointcloud_{stamp}.{}", self.format.extension()))
    }
}

/// Writes the valid samples of `frame` as a binary little-endian PLY file.
pub fn write_ply(path: &Path, frame: &PointCloudFrame) -> Result<()> {
    ensure!(frame.valid_count() > 0, "frame has no valid points");

    let mut ply = Ply::<DefaultElement>::new();
    ply.header.encoding = Encoding::BinaryLittleEndian;
    ply.header
        .comments
        .push(format!("timestamp_ns {}", frame.timestamp_ns()));

    let mut vertex = ElementDef::new("vertex".to_string());
    for name in ["x", "y", "z"] {
        vertex.properties.add(PropertyDef::new(
            name.to_string(),
            PropertyType::Scalar(ScalarType::Float),
        ));
    }
    for name in ["red", "green", "blue", "alpha"] {
        vertex.properties.add(PropertyDef::new(
            name.to_string(),
            PropertyType::Scalar(ScalarType::UChar),
        ));
    }
    ply.header.elements.add(vertex);

    let vertices: Vec<_> = frame.valid_samples().map(ply_vertex).collect();
    ply.payload.insert("vertex".to_string(), vertices);
    ply.make_consistent()
        .map_err(|err| anyhow!("inconsistent PLY data: {err:?}"))?;

    let file =
        File::create(path).with_context(|| format!("unable to create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    Writer::new()
        .write_ply(&mut out, &mut ply)
        .with_context(|| format!("unable to write {}", path.display()))?;
    Ok(())
}

fn ply_vertex(sample: &PointSample) -> DefaultElement {
    let [x, y, z] = sample.xyz;
    let [r, g, b, a] = sample.rgba;
    let mut vertex = DefaultElement::new();
    vertex.insert("x".to_string(), Property::Float(x));
    vertex.insert("y".to_string(), Property::Float(y));
    vertex.insert("z".to_string(), Property::Float(z));
    vertex.insert("red".to_string(), Property::UChar(r));
    vertex.insert("green".to_string(), Property::UChar(g));
    vertex.insert("blue".to_string(), Property::UChar(b));
    vertex.insert("alpha".to_string(), Property::UChar(a));
    vertex
}

/// A PCD point with color packed into a float, as PCL stores it.
#[derive(Debug, Clone, Copy, PartialEq, PcdSerialize, PcdDeserialize)]
pub struct PcdPoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub rgb: f32,
}

impl PcdPoint {
    pub fn from_sample(sample: &PointSample) -> Self {
        let [x, y, z] = sample.xyz;
        let [r, g, b, _] = sample.rgba;
        let packed = (r as u32) << 16 | (g as u32) << 8 | b as u32;
        Self {
            x,
            y,
            z,
            rgb: f32::from_bits(packed),
        }
    }

    #[cfg(test)]
    pub fn color(&self) -> [u8; 3] {
        let packed = self.rgb.to_bits();
        [(packed >> 16) as u8, (packed >> 8) as u8, packed as u8]
    }
}

/// Writes the valid samples of `frame` as an unorganized binary PCD file.
pub fn write_pcd(path: &Path, frame: &PointCloudFrame) -> Result<()> {
    let count = frame.valid_count();
    ensure!(count > 0, "frame has no valid points");

    let mut writer: pcd_rs::Writer<PcdPoint, _> = WriterInit {
        width: count as u64,
        height: 1,
        viewpoint: Default::default(),
        data_kind: DataKind::Binary,
        schema: None,
    }
    .create(path)
    .with_context(|| format!("unable to create {}", path.display()))?;

    for sample in frame.valid_samples() {
        writer.push(&PcdPoint::from_sample(sample))?;
    }
    writer
        .finish()
        .with_context(|| format!("unable to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ply_rs::parser::Parser;

    fn frame() -> PointCloudFrame {
        PointCloudFrame::new(
            3,
            1,
            99,
            vec![
                PointSample::new([1.0, 2.0, -3.0], [10, 20, 30, 255]),
                PointSample::INVALID,
                PointSample::new([-0.5, 0.25, -8.0], [200, 100, 50, 128]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn file_names() {
        let dir = tempfile::tempdir().unwrap();
        let saver = FrameSaver::create(dir.path().join("point_clouds"), PointCloudFormat::Ply)
            .unwrap();
        assert!(saver.dir().is_dir());

        let time = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
            + chrono::Duration::microseconds(42);
        assert_eq!(
            saver.snapshot_path(&time).file_name().unwrap(),
            "pointcloud_20240309_140507.ply"
        );
        assert_eq!(
            saver.sequence_path(&time).file_name().unwrap(),
            "pointcloud_20240309_140507_000042.ply"
        );
    }

    #[test]
    fn ply_keeps_valid_points_only() {
        let dir = tempfile::tempdir().unwrap();
        let saver = FrameSaver::create(dir.path(), PointCloudFormat::Ply).unwrap();
        let path = saver.save_snapshot(&frame()).unwrap();
        assert_eq!(path.extension().unwrap(), "ply");

        let mut file = File::open(&path).unwrap();
        let ply = Parser::<DefaultElement>::new().read_ply(&mut file).unwrap();
        assert_eq!(ply.header.encoding, Encoding::BinaryLittleEndian);

        let vertices = &ply.payload["vertex"];
        assert_eq!(vertices.len(), 2);
        assert_eq!(vertices[1]["z"], Property::Float(-8.0));
        assert_eq!(vertices[1]["red"], Property::UChar(200));
        assert_eq!(vertices[0]["alpha"], Property::UChar(255));
    }

    #[test]
    fn pcd_packs_color() {
        let dir = tempfile::tempdir().unwrap();
        let saver = FrameSaver::create(dir.path(), PointCloudFormat::Pcd).unwrap();
        let path = saver.save_sequence_frame(&frame()).unwrap();
        assert_eq!(path.extension().unwrap(), "pcd");

        let points: Vec<PcdPoint> = pcd_rs::Reader::open(&path)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].x, 1.0);
        assert_eq!(points[0].color(), [10, 20, 30]);
        assert_eq!(points[1].color(), [200, 100, 50]);
    }

    #[test]
    fn empty_frames_are_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let empty = PointCloudFrame::new(1, 1, 0, vec![PointSample::INVALID]).unwrap();
        for format in [PointCloudFormat::Ply, PointCloudFormat::Pcd] {
            let path = dir.path().join(format!("empty.{}", format.extension()));
            assert!(format.write(&path, &empty).is_err());
            assert!(!path.exists());
        }
    }
}
