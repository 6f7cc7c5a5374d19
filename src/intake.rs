use axum::extract::{Multipart, multipart::MultipartError};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::models::RecommendRequest;

pub const MAX_IMAGES: usize = 5;
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024; // 10 MB per image
pub const DEFAULT_ORGAN: &str = "leaf";

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("Plant name is required")]
    MissingName,
    #[error("No images uploaded")]
    NoImages,
    #[error("At most {} images can be uploaded", MAX_IMAGES)]
    TooManyImages,
    #[error("image exceeds {} MB limit", MAX_IMAGE_BYTES / 1024 / 1024)]
    ImageTooLarge,
    #[error("Location coordinates are required")]
    MissingCoordinates,
    #[error("invalid multipart payload: {0}")]
    Multipart(#[from] MultipartError),
    #[error("failed to stage upload: {0}")]
    Io(#[from] std::io::Error),
}

/// One uploaded photo, buffered on disk until the request finishes.
#[derive(Debug, Clone)]
pub struct StagedImage {
    pub path: PathBuf,
    pub file_name: String,
    pub content_type: String,
    pub organ: String,
    pub size: usize,
}

/// Uploaded photos for a single request.
///
/// The files live in a private temporary directory that is removed when this
/// value is dropped, whichever way the request ends.
#[derive(Debug)]
pub struct StagedUploads {
    _dir: TempDir,
    images: Vec<StagedImage>,
}

impl StagedUploads {
    #[must_use]
    pub fn images(&self) -> &[StagedImage] {
        &self.images
    }
}

/// A validated identification request: photos or a typed species name, never both.
#[derive(Debug)]
pub enum IdentificationRequest {
    Images(StagedUploads),
    Name(String),
}

impl IdentificationRequest {
    /// # Errors
    ///
    /// Returns [`IntakeError::MissingName`] when the name is absent or blank.
    pub fn by_name(name: Option<&str>) -> Result<Self, IntakeError> {
        match name.map(str::trim) {
            Some(n) if !n.is_empty() => Ok(Self::Name(n.to_string())),
            _ => Err(IntakeError::MissingName),
        }
    }

    /// # Errors
    ///
    /// Returns [`IntakeError::NoImages`] or [`IntakeError::TooManyImages`] when
    /// the upload count is outside `1..=MAX_IMAGES`.
    pub fn by_images(uploads: StagedUploads) -> Result<Self, IntakeError> {
        match uploads.images.len() {
            0 => Err(IntakeError::NoImages),
            n if n > MAX_IMAGES => Err(IntakeError::TooManyImages),
            _ => Ok(Self::Images(uploads)),
        }
    }
}

/// Stream the `images` parts of a multipart body to disk and pair them with
/// the parallel `organs` parts.
///
/// Accepts `images`, `images[]` and `image` for files and `organs` /
/// `organs[]` for organ tags. Missing or blank organs default to `leaf`.
///
/// # Errors
///
/// Fails on malformed multipart data, more than [`MAX_IMAGES`] files, a file
/// over [`MAX_IMAGE_BYTES`], or when the staging directory can't be written.
pub async fn stage_multipart(
    multipart: &mut Multipart,
    upload_dir: &Path,
) -> Result<StagedUploads, IntakeError> {
    tokio::fs::create_dir_all(upload_dir).await?;
    let dir = tempfile::Builder::new()
        .prefix("identify-")
        .tempdir_in(upload_dir)?;

    let mut images: Vec<StagedImage> = Vec::new();
    let mut organs: Vec<String> = Vec::new();

    while let Some(mut field) = multipart.next_field().await? {
        let name = field.name().map(ToString::to_string);
        match name.as_deref() {
            Some("images" | "images[]" | "image") => {
                if images.len() >= MAX_IMAGES {
                    return Err(IntakeError::TooManyImages);
                }

                let idx = images.len();
                let file_name = field
                    .file_name()
                    .map_or_else(|| format!("image_{idx}.jpg"), ToString::to_string);
                let content_type = field
                    .content_type()
                    .map_or_else(|| "image/jpeg".to_string(), ToString::to_string);

                let path = dir.path().join(format!("image-{idx}"));
                let mut file = tokio::fs::File::create(&path).await?;
                let mut size = 0usize;
                while let Some(chunk) = field.chunk().await? {
                    size += chunk.len();
                    if size > MAX_IMAGE_BYTES {
                        return Err(IntakeError::ImageTooLarge);
                    }
                    file.write_all(&chunk).await?;
                }
                file.flush().await?;

                images.push(StagedImage {
                    path,
                    file_name,
                    content_type,
                    organ: String::new(),
                    size,
                });
            }
            Some("organs" | "organs[]") => organs.push(field.text().await?),
            _ => {}
        }
    }

    for (idx, image) in images.iter_mut().enumerate() {
        image.organ = organ_for(&organs, idx);
    }

    tracing::debug!(
        count = images.len(),
        dir = %dir.path().display(),
        "staged uploaded images"
    );

    Ok(StagedUploads { _dir: dir, images })
}

fn organ_for(organs: &[String], idx: usize) -> String {
    organs
        .get(idx)
        .map(|o| o.trim())
        .filter(|o| !o.is_empty())
        .unwrap_or(DEFAULT_ORGAN)
        .to_string()
}

/// Validated location for the recommendation flow.
#[derive(Debug, Clone, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
    pub address: Option<String>,
}

impl TryFrom<RecommendRequest> for Coordinates {
    type Error = IntakeError;

    fn try_from(req: RecommendRequest) -> Result<Self, Self::Error> {
        let (Some(latitude), Some(longitude)) = (req.latitude, req.longitude) else {
            return Err(IntakeError::MissingCoordinates);
        };
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(IntakeError::MissingCoordinates);
        }
        let address = req
            .address
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty());
        Ok(Self {
            latitude,
            longitude,
            address,
        })
    }
}
