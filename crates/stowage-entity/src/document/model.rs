//! Document entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use stowage_core::types::{DirectoryId, DocumentId, UserId};

use super::state::UploadState;

/// A file record. The bytes live in the object store under [`DocumentRecord::object_key`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct DocumentRecord {
    /// Unique document identifier (also the object key stem).
    pub id: DocumentId,
    /// The directory containing this document.
    pub parent_id: DirectoryId,
    /// The document owner.
    pub owner_id: UserId,
    /// The file name (including extension).
    pub name: String,
    /// Lowercase extension with leading dot, or empty.
    pub extension: String,
    /// MIME type declared at reservation.
    pub content_type: String,
    /// Declared size while reserved, observed size once committed.
    pub size_bytes: i64,
    /// Persisted upload state.
    pub upload_state: UploadState,
    /// When the document was moved to the trash.
    pub trashed_at: Option<DateTime<Utc>>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the record was last updated.
    pub updated_at: DateTime<Utc>,
    /// When the upload was committed.
    pub committed_at: Option<DateTime<Utc>>,
}

impl DocumentRecord {
    /// Key of the object holding this document's bytes.
    pub fn object_key(&self) -> String {
        format!("{}{}", self.id, self.extension)
    }

    /// Check if the document's bytes have been verified.
    pub fn is_committed(&self) -> bool {
        self.upload_state == UploadState::Committed
    }

    /// Check if the document is in the trash.
    pub fn is_trashed(&self) -> bool {
        self.trashed_at.is_some()
    }

    /// Bytes this document contributes to aggregates.
    pub fn counted_bytes(&self) -> i64 {
        if self.is_committed() { self.size_bytes } else { 0 }
    }
}

/// Data required to create a reserved document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDocument {
    /// Pre-generated identifier.
    pub id: DocumentId,
    /// The target directory.
    pub parent_id: DirectoryId,
    /// The owner.
    pub owner_id: UserId,
    /// The file name.
    pub name: String,
    /// MIME type.
    pub content_type: String,
    /// Declared size in bytes.
    pub declared_size_bytes: i64,
}

impl CreateDocument {
    /// Extension derived from the file name.
    pub fn extension(&self) -> String {
        extension_of(&self.name)
    }
}

/// Lowercase extension of a file name including the leading dot, or empty.
pub fn extension_of(file_name: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty() && !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            format!(".{}", ext.to_ascii_lowercase())
        }
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("Report.PDF"), ".pdf");
        assert_eq!(extension_of("archive.tar.gz"), ".gz");
        assert_eq!(extension_of("README"), "");
        assert_eq!(extension_of(".bashrc"), "");
        assert_eq!(extension_of("weird.ex t"), "");
    }

    #[test]
    fn test_object_key_uses_id_and_extension() {
        let now = Utc::now();
        let doc = DocumentRecord {
            id: DocumentId::new(),
            parent_id: DirectoryId::new(),
            owner_id: UserId::new(),
            name: "a.txt".into(),
            extension: ".txt".into(),
            content_type: "text/plain".into(),
            size_bytes: 10,
            upload_state: UploadState::Reserved,
            trashed_at: None,
            created_at: now,
            updated_at: now,
            committed_at: None,
        };
        assert_eq!(doc.object_key(), format!("{}.txt", doc.id));
        assert_eq!(doc.counted_bytes(), 0);
    }
}
