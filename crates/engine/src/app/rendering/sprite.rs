use std::path::{Path, PathBuf};

use image::ImageReader;
use thiserror::Error;

use crate::app::display::PixelBuffer;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpritePathError {
    #[error("sprite path must not be empty")]
    Empty,
    #[error("sprite path must be relative to the asset root")]
    LeadingSlash,
    #[error("sprite path must not contain '\\\\'")]
    Backslash,
    #[error("sprite path must not contain '..'")]
    ParentTraversal,
    #[error("sprite path contains invalid character '{character}'")]
    InvalidCharacter { character: char },
}

#[derive(Debug, Error)]
pub enum SpriteError {
    #[error("invalid sprite path '{path}': {source}")]
    InvalidPath {
        path: String,
        #[source]
        source: SpritePathError,
    },
    #[error("failed to open sprite: {0}")]
    Open(#[source] std::io::Error),
    #[error("failed to decode sprite: {0}")]
    Decode(#[source] image::ImageError),
    #[error("decoded sprite has inconsistent dimensions {width}x{height}")]
    Dimensions { width: u32, height: u32 },
}

/// Checks a content-supplied sprite path before it is joined onto the
/// asset root.
pub fn validate_sprite_path(path: &str) -> Result<(), SpritePathError> {
    if path.is_empty() {
        return Err(SpritePathError::Empty);
    }
    if path.starts_with('/') {
        return Err(SpritePathError::LeadingSlash);
    }
    if path.contains('\\') {
        return Err(SpritePathError::Backslash);
    }
    if path.contains("..") {
        return Err(SpritePathError::ParentTraversal);
    }
    for ch in path.chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '_' | '/' | '-' | '.') {
            continue;
        }
        return Err(SpritePathError::InvalidCharacter { character: ch });
    }
    Ok(())
}

pub fn resolve_sprite_path(asset_root: &Path, relative: &str) -> Result<PathBuf, SpriteError> {
    validate_sprite_path(relative).map_err(|source| SpriteError::InvalidPath {
        path: relative.to_string(),
        source,
    })?;
    Ok(asset_root.join(relative))
}

pub fn load_sprite(path: &Path) -> Result<PixelBuffer, SpriteError> {
    let reader = ImageReader::open(path).map_err(SpriteError::Open)?;
    let decoded = reader.decode().map_err(SpriteError::Decode)?;
    let image = decoded.to_rgba8();
    let (width, height) = (image.width(), image.height());
    PixelBuffer::from_rgba(width, height, image.into_raw())
        .ok_or(SpriteError::Dimensions { width, height })
}

pub fn scaled_sprite_dimensions(sprite: &PixelBuffer, scale: f32) -> (u32, u32) {
    let scale = if scale.is_finite() && scale > 0.0 {
        scale
    } else {
        1.0
    };
    let width = (sprite.width() as f32 * scale).round().max(1.0) as u32;
    let height = (sprite.height() as f32 * scale).round().max(1.0) as u32;
    (width, height)
}
