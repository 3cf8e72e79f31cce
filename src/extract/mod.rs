//! Content extraction.
//!
//! An [`Extractor`] turns gateway metadata (and, for richer implementations,
//! file content) into the [`Document`] stored in the index. Extraction
//! failures are never fatal to the indexer.

use crate::Result;
use crate::models::{Document, MediaKind, ResourceInfo, Token, media::STORAGE_METADATA_PREFIX};

/// Arbitrary metadata key holding comma-separated tags.
pub const TAGS_METADATA_KEY: &str = "tags";

/// Builds index documents for resources.
pub trait Extractor: Send + Sync {
    /// Extracts the document for `info`.
    ///
    /// # Errors
    ///
    /// Returns an error if the content cannot be read or parsed. Callers fall
    /// back to structural metadata.
    fn extract(&self, token: &Token, info: &ResourceInfo) -> Result<Document>;
}

/// Extractor that only uses the metadata returned by `stat`.
///
/// Media metadata is read back from `libre.graph.<kind>.<field>` entries,
/// which is where the indexer writes it after a richer extraction.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicExtractor;

impl BasicExtractor {
    /// Creates a new basic extractor.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Extractor for BasicExtractor {
    fn extract(&self, _token: &Token, info: &ResourceInfo) -> Result<Document> {
        let mut document = structural_document(info);
        document.tags = info
            .arbitrary_metadata
            .get(TAGS_METADATA_KEY)
            .map(|raw| parse_tags(raw))
            .unwrap_or_default();

        for (key, raw) in &info.arbitrary_metadata {
            let Some(flat) = key.strip_prefix(STORAGE_METADATA_PREFIX) else {
                continue;
            };
            let Some((kind, field)) = MediaKind::resolve_field(flat) else {
                continue;
            };
            if let Err(e) = set_media_field(&mut document, kind, field, raw) {
                tracing::debug!(key = %key, error = %e, "Ignoring invalid media metadata");
            }
        }

        Ok(document)
    }
}

/// Builds a document from structural metadata only.
#[must_use]
pub fn structural_document(info: &ResourceInfo) -> Document {
    Document {
        name: info.name.clone(),
        size: info.size,
        mtime: info.mtime,
        mime_type: info.mime_type.clone(),
        ..Document::default()
    }
}

/// Splits a comma-separated tag list, dropping blanks and duplicates.
#[must_use]
pub fn parse_tags(raw: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}

fn set_media_field(document: &mut Document, kind: MediaKind, field: &str, raw: &str) -> Result<bool> {
    match kind {
        MediaKind::Audio => document.audio.get_or_insert_with(Default::default).set(field, raw),
        MediaKind::Image => document.image.get_or_insert_with(Default::default).set(field, raw),
        MediaKind::Location => document
            .location
            .get_or_insert_with(Default::default)
            .set(field, raw),
        MediaKind::Photo => document.photo.get_or_insert_with(Default::default).set(field, raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ResourceId, ResourceType};

    fn info(metadata: &[(&str, &str)]) -> ResourceInfo {
        ResourceInfo {
            id: ResourceId::new("st", "sp", "f"),
            name: "song.mp3".to_string(),
            resource_type: ResourceType::File,
            size: 42,
            mime_type: "audio/mpeg".to_string(),
            arbitrary_metadata: metadata
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            ..ResourceInfo::default()
        }
    }

    #[test]
    fn test_structural_fields() {
        let doc = BasicExtractor::new()
            .extract(&Token::new("t"), &info(&[]))
            .unwrap();
        assert_eq!(doc.name, "song.mp3");
        assert_eq!(doc.size, 42);
        assert_eq!(doc.mime_type, "audio/mpeg");
        assert!(doc.tags.is_empty());
        assert!(!doc.has_media());
    }

    #[test]
    fn test_tags_and_media_metadata() {
        let doc = BasicExtractor::new()
            .extract(
                &Token::new("t"),
                &info(&[
                    ("tags", "work, music,,work"),
                    ("libre.graph.audio.artist", "Nina Simone"),
                    ("libre.graph.audio.year", "1965"),
                    ("libre.graph.audio.duration", "not a number"),
                    ("libre.graph.location.latitude", "52.5"),
                    ("unrelated", "x"),
                ]),
            )
            .unwrap();

        assert_eq!(doc.tags, vec!["work", "music"]);
        let audio = doc.audio.unwrap();
        assert_eq!(audio.artist.as_deref(), Some("Nina Simone"));
        assert_eq!(audio.year, Some(1965));
        assert_eq!(audio.duration, None);
        assert_eq!(doc.location.unwrap().latitude, Some(52.5));
        assert!(doc.photo.is_none());
    }
}
