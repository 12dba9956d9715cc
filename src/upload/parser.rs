//! Parser for uploader command output
//!
//! Uploader tools print human-oriented text. The values we need sit after a
//! fixed label at the start of a line, e.g.
//!
//! ```text
//! Uploading filler-20260101-120000.mp4 ... done
//! File ID: 9f8e7d6c
//! ```
//!
//! Label matching is case-insensitive and tolerates leading whitespace.

use super::{PublicLinks, UploadReceipt};
use crate::config::UploadConfig;
use crate::error::{Result, UploadError};
use regex::Regex;

/// Labels that precede each value in uploader output
#[derive(Debug, Clone)]
pub struct ResponseLabels {
    file_id: Regex,
    direct_link: Regex,
    social_link: Regex,
}

impl ResponseLabels {
    /// Compile labels from upload configuration
    pub fn from_config(config: &UploadConfig) -> Result<Self> {
        Ok(Self {
            file_id: label_regex(&config.file_id_label, "upload.file_id_label")?,
            direct_link: label_regex(&config.direct_link_label, "upload.direct_link_label")?,
            social_link: label_regex(&config.social_link_label, "upload.social_link_label")?,
        })
    }
}

fn label_regex(label: &str, key: &str) -> Result<Regex> {
    let label = label.trim();
    if label.is_empty() {
        return Err(crate::Error::config(key, "label must not be empty"));
    }
    Regex::new(&format!(r"(?mi)^[ \t]*{}[ \t]*(\S+)", regex::escape(label)))
        .map_err(|e| crate::Error::config(key, e.to_string()))
}

fn find(regex: &Regex, output: &str) -> Option<String> {
    regex
        .captures(output)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Parse the content identifier out of an upload response
///
/// # Errors
///
/// [`UploadError::Parse`] when no line carries the file id label. The raw
/// response is kept in the error for the failure record.
pub fn parse_upload_output(output: &str, labels: &ResponseLabels) -> Result<UploadReceipt> {
    match find(&labels.file_id, output) {
        Some(file_id) => Ok(UploadReceipt { file_id }),
        None => Err(UploadError::Parse {
            field: "file id",
            response: output.to_string(),
        }
        .into()),
    }
}

/// Parse direct and social links out of a link response
///
/// # Errors
///
/// [`UploadError::MissingLink`] naming the first link kind that is absent.
pub fn parse_link_output(output: &str, labels: &ResponseLabels) -> Result<PublicLinks> {
    let direct = find(&labels.direct_link, output).ok_or(UploadError::MissingLink { kind: "direct" })?;
    let social = find(&labels.social_link, output).ok_or(UploadError::MissingLink { kind: "social" })?;
    Ok(PublicLinks { direct, social })
}
