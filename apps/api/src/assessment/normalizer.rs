//! Artifact Normalizer: raw pasted text or uploaded files → plain-text artifacts.
//!
//! Pure: no I/O, no state. The artifact id is a content hash of the normalized
//! text, so the same content always gets the same id.

use std::collections::HashSet;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::warn;

use crate::models::assessment::RejectedArtifact;

/// Largest accepted upload.
pub const MAX_ARTIFACT_BYTES: usize = 10 * 1024 * 1024;

const PLAIN_TEXT_EXTENSIONS: &[&str] = &["txt", "md", "csv", "json", "log"];
const HTML_EXTENSIONS: &[&str] = &["html", "htm"];

#[derive(Debug, Clone)]
pub enum RawArtifact {
    Text { source_id: String, text: String },
    File { filename: String, bytes: Bytes },
}

impl RawArtifact {
    pub fn source_id(&self) -> &str {
        match self {
            RawArtifact::Text { source_id, .. } => source_id,
            RawArtifact::File { filename, .. } => filename,
        }
    }

    /// The bytes as submitted, for archiving.
    pub fn body(&self) -> Bytes {
        match self {
            RawArtifact::Text { text, .. } => Bytes::from(text.clone()),
            RawArtifact::File { bytes, .. } => bytes.clone(),
        }
    }

    pub fn content_type(&self) -> &'static str {
        let RawArtifact::File { filename, .. } = self else {
            return "text/plain; charset=utf-8";
        };
        match filename.rsplit_once('.').map(|(_, ext)| ext.to_lowercase()).as_deref() {
            Some("pdf") => "application/pdf",
            Some("html" | "htm") => "text/html",
            Some("json") => "application/json",
            Some("csv") => "text/csv",
            Some("md") => "text/markdown",
            _ => "text/plain",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Artifact {
    pub id: String,
    pub source_id: String,
    pub text: String,
}

#[derive(Debug, Error, PartialEq)]
pub enum NormalizeError {
    #[error("file is {size} bytes, limit is {MAX_ARTIFACT_BYTES}")]
    TooLarge { size: usize },

    #[error("unsupported file type '{0}'")]
    UnsupportedType(String),

    #[error("artifact contains no text")]
    Empty,

    #[error("could not extract PDF text: {0}")]
    Pdf(String),

    #[error("duplicate of artifact {0}")]
    Duplicate(String),
}

#[derive(Debug, Default)]
pub struct NormalizedBatch {
    pub artifacts: Vec<Artifact>,
    /// Input position of each accepted artifact, parallel to `artifacts`.
    pub accepted_from: Vec<usize>,
    pub rejected: Vec<RejectedArtifact>,
}

pub fn normalize_artifact(raw: &RawArtifact) -> Result<Artifact, NormalizeError> {
    let text = match raw {
        RawArtifact::Text { text, .. } => text.clone(),
        RawArtifact::File { filename, bytes } => extract_file_text(filename, bytes)?,
    };

    let text = collapse_whitespace(&text);
    if text.is_empty() {
        return Err(NormalizeError::Empty);
    }

    Ok(Artifact {
        id: content_id(&text),
        source_id: raw.source_id().to_string(),
        text,
    })
}

/// Normalizes every input, collecting rejections instead of failing.
/// A later artifact with the same content as an earlier one is rejected.
pub fn normalize_all(raws: &[RawArtifact]) -> NormalizedBatch {
    let mut batch = NormalizedBatch::default();
    let mut seen = HashSet::new();

    for (index, raw) in raws.iter().enumerate() {
        let result = normalize_artifact(raw).and_then(|artifact| {
            if seen.insert(artifact.id.clone()) {
                Ok(artifact)
            } else {
                Err(NormalizeError::Duplicate(artifact.id))
            }
        });
        match result {
            Ok(artifact) => {
                batch.artifacts.push(artifact);
                batch.accepted_from.push(index);
            }
            Err(e) => {
                warn!("Rejected artifact '{}': {e}", raw.source_id());
                batch.rejected.push(RejectedArtifact {
                    source_id: raw.source_id().to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }
    batch
}

fn extract_file_text(filename: &str, bytes: &[u8]) -> Result<String, NormalizeError> {
    if bytes.len() > MAX_ARTIFACT_BYTES {
        return Err(NormalizeError::TooLarge { size: bytes.len() });
    }
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();

    if PLAIN_TEXT_EXTENSIONS.contains(&ext.as_str()) {
        Ok(String::from_utf8_lossy(bytes).into_owned())
    } else if HTML_EXTENSIONS.contains(&ext.as_str()) {
        Ok(strip_html(&String::from_utf8_lossy(bytes)))
    } else if ext == "pdf" {
        pdf_extract::extract_text_from_mem(bytes).map_err(|e| NormalizeError::Pdf(e.to_string()))
    } else {
        Err(NormalizeError::UnsupportedType(if ext.is_empty() {
            filename.to_string()
        } else {
            ext
        }))
    }
}

/// Drops tags, script and style bodies; decodes the handful of entities
/// that show up in exported docs.
fn strip_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;

    while let Some(start) = rest.find('<') {
        out.push_str(&rest[..start]);
        let after = &rest[start..];
        let Some(end) = after.find('>') else {
            rest = "";
            break;
        };
        let tag = after[1..end].trim().to_lowercase();
        rest = &after[end + 1..];

        for skipped in ["script", "style"] {
            if tag == skipped || tag.starts_with(&format!("{skipped} ")) {
                let close = format!("</{skipped}");
                rest = match rest.to_ascii_lowercase().find(&close) {
                    Some(pos) => rest[pos..].find('>').map_or("", |gt| &rest[pos + gt + 1..]),
                    None => "",
                };
            }
        }
        // Block-level boundaries keep words apart.
        out.push(' ');
    }
    out.push_str(rest);

    out.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

fn collapse_whitespace(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn content_id(text: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(text.as_bytes()));
    format!("art_{}", &digest[..12])
}
