//! Extension allow-list for declared upload files
//!
//! Each content category accepts a fixed list of file name suffixes. The
//! `special_content` category accepts any file through the wildcard marker.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

/// Marker in an allow-list meaning "any file name"
pub const WILDCARD: &str = "*";

/// Closed set of upload categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentCategory {
    Images,
    Audios,
    Podcasts,
    SpecialContent,
}

/// Category name outside the closed set
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid content_type: {0}")]
pub struct InvalidCategory(pub String);

impl ContentCategory {
    pub const ALL: [ContentCategory; 4] = [
        ContentCategory::Images,
        ContentCategory::Audios,
        ContentCategory::Podcasts,
        ContentCategory::SpecialContent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentCategory::Images => "images",
            ContentCategory::Audios => "audios",
            ContentCategory::Podcasts => "podcasts",
            ContentCategory::SpecialContent => "special_content",
        }
    }

    /// Suffixes accepted for this category
    pub fn allowed_extensions(&self) -> &'static [&'static str] {
        match self {
            ContentCategory::Images => &["jpg", "jpeg", "png"],
            ContentCategory::Audios => &["mp3"],
            ContentCategory::Podcasts => &["mp3"],
            ContentCategory::SpecialContent => &[WILDCARD],
        }
    }
}

impl fmt::Display for ContentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentCategory {
    type Err = InvalidCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContentCategory::ALL
            .into_iter()
            .find(|category| category.as_str() == s)
            .ok_or_else(|| InvalidCategory(s.to_string()))
    }
}

/// Check a file path against the allow-list of an already parsed category
///
/// Matching is a case-sensitive literal suffix test: `"photo.JPG"` is rejected
/// for `images`, and no leading dot is implied.
pub fn is_valid_for(category: ContentCategory, file_path: &str) -> bool {
    let valid = category
        .allowed_extensions()
        .iter()
        .any(|ext| *ext == WILDCARD || file_path.ends_with(ext));

    if !valid {
        warn!("Invalid file:{} for content_type:{}", file_path, category);
    }
    valid
}

/// Check a file path against the allow-list of a category given by name
pub fn is_valid(content_type: &str, file_path: &str) -> Result<bool, InvalidCategory> {
    let category = content_type.parse::<ContentCategory>()?;
    Ok(is_valid_for(category, file_path))
}
