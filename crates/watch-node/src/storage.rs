//! Filesystem sink for raw photos, the annotated image and the status record.

use anyhow::{Context, Result};
use common::status::{PhotoEntry, StatusRecord};
use image::{ImageFormat, RgbImage};
use lazy_static::lazy_static;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

pub const PHOTOS_DIR: &str = "photos";
pub const STATUS_DIR: &str = "status";
pub const ANNOTATED_IMAGE: &str = "latest.jpg";
pub const STATUS_RECORD: &str = "latest.json";
pub const DEFAULT_PHOTO_LIMIT: usize = 40;

lazy_static! {
    static ref PHOTO_NAME: Option<Regex> = Regex::new(r"^\w+-(\d+)\.jpg$").ok();
}

/// Capture timestamp encoded in a photo file name such as `camera-1700000000.jpg`
pub fn photo_timestamp(file_name: &str) -> Option<u64> {
    PHOTO_NAME
        .as_ref()?
        .captures(file_name)
        .and_then(|captures| captures.get(1))
        .and_then(|ts| ts.as_str().parse().ok())
}

#[derive(Debug, Clone)]
pub struct DataDirs {
    root: PathBuf,
}

impl DataDirs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create `photos/` and `status/` under the root
    pub fn setup(&self) -> Result<()> {
        for dir in [self.photos_dir(), self.status_dir()] {
            fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
        }
        tracing::info!(root = %self.root.display(), "Data directories ready");
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn photos_dir(&self) -> PathBuf {
        self.root.join(PHOTOS_DIR)
    }

    pub fn status_dir(&self) -> PathBuf {
        self.root.join(STATUS_DIR)
    }

    pub fn status_record_path(&self) -> PathBuf {
        self.status_dir().join(STATUS_RECORD)
    }

    pub fn annotated_image_path(&self) -> PathBuf {
        self.status_dir().join(ANNOTATED_IMAGE)
    }

    /// Store the decoded frame as `photos/camera-<ts>.jpg`, JPEG whatever
    /// format the camera sent
    pub fn save_photo(&self, image: &RgbImage, timestamp: u64) -> Result<PathBuf> {
        let path = self.photos_dir().join(format!("camera-{}.jpg", timestamp));
        write_jpeg(image, &path)?;
        Ok(path)
    }

    pub fn save_annotated(&self, image: &RgbImage) -> Result<PathBuf> {
        let path = self.annotated_image_path();
        write_jpeg(image, &path)?;
        Ok(path)
    }

    /// Replace `status/latest.json`; readers see the old or the new record,
    /// never a partial one
    pub fn write_status(&self, record: &StatusRecord) -> Result<()> {
        let path = self.status_record_path();
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(record)?).with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &path).with_context(|| format!("failed to replace {}", path.display()))?;
        Ok(())
    }

    pub fn read_status(&self) -> Result<Option<StatusRecord>> {
        match fs::read(self.status_record_path()) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Most recent photos first, at most `limit`
    pub fn list_photos(&self, limit: usize) -> Result<Vec<PhotoEntry>> {
        let mut photos = Vec::new();

        for entry in fs::read_dir(self.photos_dir())? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some(ts) = photo_timestamp(name) {
                photos.push(PhotoEntry {
                    path: format!("/{}/{}", PHOTOS_DIR, name),
                    ts,
                });
            }
        }

        photos.sort_by(|a, b| b.ts.cmp(&a.ts).then_with(|| b.path.cmp(&a.path)));
        photos.truncate(limit);
        Ok(photos)
    }
}

/// Encode next to `path` and rename over it, so a served file is never partial
fn write_jpeg(image: &RgbImage, path: &Path) -> Result<()> {
    let tmp = path.with_extension("jpg.tmp");
    image
        .save_with_format(&tmp, ImageFormat::Jpeg)
        .with_context(|| format!("failed to encode {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::faces::{BoundingBox, IdentityResult, Recognition};

    fn dirs() -> (tempfile::TempDir, DataDirs) {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = DataDirs::new(tmp.path());
        dirs.setup().unwrap();
        (tmp, dirs)
    }

    #[test]
    fn test_photo_timestamp() {
        assert_eq!(photo_timestamp("camera-1700000000.jpg"), Some(1_700_000_000));
        assert_eq!(photo_timestamp("front_door-12.jpg"), Some(12));
        assert_eq!(photo_timestamp("camera-.jpg"), None);
        assert_eq!(photo_timestamp("camera-12.png"), None);
        assert_eq!(photo_timestamp("../camera-12.jpg"), None);
        assert_eq!(photo_timestamp("latest.jpg"), None);
    }

    #[test]
    fn test_setup_creates_directories() {
        let (_tmp, dirs) = dirs();
        assert!(dirs.photos_dir().is_dir());
        assert!(dirs.status_dir().is_dir());
        // Idempotent
        dirs.setup().unwrap();
    }

    #[test]
    fn test_list_photos_newest_first_and_limited() {
        let (_tmp, dirs) = dirs();
        for ts in [100, 300, 200] {
            dirs.save_photo(&RgbImage::new(4, 4), ts).unwrap();
        }
        fs::write(dirs.photos_dir().join("notes.txt"), "x").unwrap();

        let photos = dirs.list_photos(2).unwrap();
        assert_eq!(
            photos,
            vec![
                PhotoEntry {
                    path: "/photos/camera-300.jpg".to_string(),
                    ts: 300
                },
                PhotoEntry {
                    path: "/photos/camera-200.jpg".to_string(),
                    ts: 200
                },
            ]
        );
    }

    #[test]
    fn test_status_round_trip_leaves_no_temp_file() {
        let (_tmp, dirs) = dirs();
        assert_eq!(dirs.read_status().unwrap(), None);

        let mut recognition = Recognition::default();
        recognition.push(IdentityResult::known("alice", 0.82), BoundingBox::new(0, 0, 10, 10));
        let record = StatusRecord::new("status/latest.jpg", 42, &recognition);
        dirs.write_status(&record).unwrap();

        assert_eq!(dirs.read_status().unwrap(), Some(record));
        let names: Vec<_> = fs::read_dir(dirs.status_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["latest.json"]);
    }

    #[test]
    fn test_save_photo_encodes_jpeg() {
        let (_tmp, dirs) = dirs();
        let image = RgbImage::from_pixel(20, 10, image::Rgb([200, 40, 40]));
        let path = dirs.save_photo(&image, 1_700_000_000).unwrap();

        assert_eq!(path, dirs.photos_dir().join("camera-1700000000.jpg"));
        let bytes = fs::read(&path).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Jpeg);
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (20, 10));

        let names: Vec<_> = fs::read_dir(dirs.photos_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["camera-1700000000.jpg"]);
    }

    #[test]
    fn test_save_annotated_writes_jpeg() {
        let (_tmp, dirs) = dirs();
        let path = dirs.save_annotated(&RgbImage::new(16, 16)).unwrap();
        let decoded = image::open(&path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 16));
    }
}
