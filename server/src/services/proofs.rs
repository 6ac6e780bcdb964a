//! Classification of uploaded payment proofs.

use crate::utils::error::{AppError, Result};

#[derive(Debug, Clone)]
pub struct ProofUpload {
    /// Name the customer's file had. Kept as metadata, never used for storage.
    pub original_file_name: Option<String>,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub max_bytes: usize,
    pub allowed_mime_types: Vec<String>,
}

/// Folds aliases onto one canonical MIME type.
pub fn normalize_mime(content_type: &str) -> String {
    let base = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match base.as_str() {
        "image/jpg" | "image/pjpeg" => "image/jpeg".to_string(),
        _ => base,
    }
}

/// MIME type implied by the leading bytes, for the formats we know.
pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        Some("image/png")
    } else if bytes.starts_with(b"%PDF-") {
        Some("application/pdf")
    } else {
        None
    }
}

impl UploadPolicy {
    pub fn new(max_bytes: usize, allowed_mime_types: &[String]) -> Self {
        let mut allowed: Vec<String> = allowed_mime_types
            .iter()
            .map(|m| normalize_mime(m))
            .filter(|m| !m.is_empty())
            .collect();
        allowed.sort();
        allowed.dedup();
        Self {
            max_bytes,
            allowed_mime_types: allowed,
        }
    }

    /// Returns the canonical MIME type the file will be stored as.
    pub fn classify(&self, upload: &ProofUpload) -> Result<String> {
        if upload.bytes.is_empty() {
            return Err(AppError::validation("file", "No file uploaded"));
        }

        if upload.bytes.len() > self.max_bytes {
            return Err(AppError::validation(
                "file",
                format!(
                    "File size exceeds maximum allowed size of {}",
                    human_size(self.max_bytes)
                ),
            ));
        }

        let declared = normalize_mime(&upload.content_type);
        if !self.allowed_mime_types.contains(&declared) {
            return Err(AppError::validation(
                "file",
                format!(
                    "Invalid file type. Allowed: {}",
                    self.allowed_mime_types.join(", ")
                ),
            ));
        }

        if let Some(sniffed) = sniff_mime(&upload.bytes) {
            if sniffed != declared {
                return Err(AppError::validation(
                    "file",
                    format!("File content is {}, not {}", sniffed, declared),
                ));
            }
        } else if matches!(declared.as_str(), "image/jpeg" | "image/png" | "application/pdf") {
            return Err(AppError::validation(
                "file",
                format!("File content does not look like {}", declared),
            ));
        }

        Ok(declared)
    }
}

fn human_size(bytes: usize) -> String {
    const MB: usize = 1024 * 1024;
    if bytes % MB == 0 {
        format!("{}MB", bytes / MB)
    } else {
        format!("{} bytes", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: usize = 1024 * 1024;

    fn policy() -> UploadPolicy {
        UploadPolicy::new(
            5 * MB,
            &[
                "image/jpeg".to_string(),
                "image/png".to_string(),
                "image/jpg".to_string(),
                "application/pdf".to_string(),
            ],
        )
    }

    fn upload(content_type: &str, bytes: Vec<u8>) -> ProofUpload {
        ProofUpload {
            original_file_name: Some("receipt.png".into()),
            content_type: content_type.into(),
            bytes,
        }
    }

    fn png(len: usize) -> Vec<u8> {
        let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        bytes.resize(len, 0);
        bytes
    }

    #[test]
    fn test_accepts_allowed_types_and_normalizes_aliases() {
        let policy = policy();
        assert_eq!(policy.classify(&upload("image/png", png(64))).unwrap(), "image/png");

        let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xE0];
        jpeg.resize(64, 0);
        assert_eq!(policy.classify(&upload("image/jpg", jpeg)).unwrap(), "image/jpeg");
        assert_eq!(
            policy
                .classify(&upload("application/pdf; charset=binary", b"%PDF-1.4".to_vec()))
                .unwrap(),
            "application/pdf"
        );
    }

    #[test]
    fn test_six_megabytes_is_over_a_five_megabyte_limit() {
        let err = policy().classify(&upload("image/png", png(6 * MB))).unwrap_err();
        match err {
            AppError::ValidationError { field, message } => {
                assert_eq!(field, "file");
                assert!(message.contains("5MB"), "{}", message);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_rejects_disallowed_empty_and_mislabelled_files() {
        let policy = policy();
        assert!(policy.classify(&upload("image/gif", b"GIF89a".to_vec())).is_err());
        assert!(policy.classify(&upload("image/png", Vec::new())).is_err());
        assert!(policy.classify(&upload("application/pdf", png(64))).is_err());
        assert!(policy.classify(&upload("image/png", b"plain text".to_vec())).is_err());
    }
}
