//! Registration form: client-side validation and multipart encoding
//!
//! A form that fails validation never reaches the network.

use std::path::Path;

use chrono::NaiveDate;
use mime::Mime;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};

use crate::error::{Result, UsercastError};

/// Multipart field names expected by the directory API
pub mod fields {
    pub const FIRST_NAME: &str = "user[first_name]";
    pub const LAST_NAME: &str = "user[last_name]";
    pub const EMAIL: &str = "user[email]";
    pub const DATE_OF_BIRTH: &str = "user[date_of_birth]";
    pub const UPLOADED_FILE: &str = "user[uploaded_file]";
}

/// Reasons a form is blocked before submission
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("{0:?} is not a valid email address")]
    InvalidEmail(String),
    #[error("{0:?} is not a valid date (expected YYYY-MM-DD)")]
    InvalidDateOfBirth(String),
    #[error("a file upload is required")]
    MissingFile,
}

impl From<FormError> for UsercastError {
    fn from(e: FormError) -> Self {
        UsercastError::InvalidInput(e.to_string())
    }
}

/// File attached to a registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let content_type = content_type_for(&file_name).to_string();
        Self {
            file_name,
            content_type,
            bytes,
        }
    }

    /// Read a file from disk
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        Ok(Self::new(file_name, bytes))
    }
}

/// Content type for an upload, from its extension.
///
/// Only the document and image types the directory API accepts are named;
/// anything else goes up as `application/octet-stream`.
pub fn content_type_for(file_name: &str) -> Mime {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match extension.as_deref() {
        Some("pdf") => mime::APPLICATION_PDF,
        Some("png") => mime::IMAGE_PNG,
        Some("jpg") | Some("jpeg") => mime::IMAGE_JPEG,
        Some("gif") => mime::IMAGE_GIF,
        Some("txt") => mime::TEXT_PLAIN,
        _ => mime::APPLICATION_OCTET_STREAM,
    }
}

/// Text fields of the registration form
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationForm {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub date_of_birth: String,
    #[serde(skip)]
    pub file: Option<UploadedFile>,
}

impl RegistrationForm {
    /// Check every field the way the browser form does before submitting
    pub fn validate(&self) -> std::result::Result<(), FormError> {
        for (name, value) in [
            ("first name", &self.first_name),
            ("last name", &self.last_name),
            ("email", &self.email),
            ("date of birth", &self.date_of_birth),
        ] {
            if value.trim().is_empty() {
                return Err(FormError::MissingField(name));
            }
        }

        if !is_plausible_email(self.email.trim()) {
            return Err(FormError::InvalidEmail(self.email.clone()));
        }

        if NaiveDate::parse_from_str(self.date_of_birth.trim(), "%Y-%m-%d").is_err() {
            return Err(FormError::InvalidDateOfBirth(self.date_of_birth.clone()));
        }

        match &self.file {
            Some(file) if !file.file_name.is_empty() => Ok(()),
            _ => Err(FormError::MissingFile),
        }
    }

    /// Validate and encode as a multipart body
    pub fn into_multipart(self) -> Result<Form> {
        self.validate()?;
        let file = self.file.ok_or(FormError::MissingFile)?;

        let part = Part::bytes(file.bytes)
            .file_name(file.file_name)
            .mime_str(&file.content_type)?;

        Ok(Form::new()
            .text(fields::FIRST_NAME, self.first_name.trim().to_string())
            .text(fields::LAST_NAME, self.last_name.trim().to_string())
            .text(fields::EMAIL, self.email.trim().to_string())
            .text(fields::DATE_OF_BIRTH, self.date_of_birth.trim().to_string())
            .part(fields::UPLOADED_FILE, part))
    }
}

// Same shape check as an `<input type="email">`: one @, non-empty local part,
// dotless hosts allowed.
fn is_plausible_email(email: &str) -> bool {
    let mut parts = email.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            !local.is_empty()
                && !domain.is_empty()
                && !email.contains(char::is_whitespace)
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled() -> RegistrationForm {
        RegistrationForm {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            date_of_birth: "1815-12-10".to_string(),
            file: Some(UploadedFile::new("notes.pdf", b"%PDF-1.4".to_vec())),
        }
    }

    #[test]
    fn test_complete_form_is_valid() {
        assert_eq!(filled().validate(), Ok(()));
        assert!(filled().into_multipart().is_ok());
    }

    #[test]
    fn test_required_fields() {
        let mut form = filled();
        form.last_name = "  ".to_string();
        assert_eq!(form.validate(), Err(FormError::MissingField("last name")));

        let mut form = filled();
        form.file = None;
        assert_eq!(form.validate(), Err(FormError::MissingFile));
        assert!(matches!(
            form.into_multipart(),
            Err(UsercastError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_email_and_date_shape() {
        let mut form = filled();
        form.email = "ada.example.com".to_string();
        assert!(matches!(form.validate(), Err(FormError::InvalidEmail(_))));

        let mut form = filled();
        form.email = "ada@localhost".to_string();
        assert_eq!(form.validate(), Ok(()));

        let mut form = filled();
        form.date_of_birth = "10/12/1815".to_string();
        assert!(matches!(
            form.validate(),
            Err(FormError::InvalidDateOfBirth(_))
        ));
    }

    #[test]
    fn test_content_type_from_extension() {
        assert_eq!(content_type_for("scan.PDF"), mime::APPLICATION_PDF);
        assert_eq!(content_type_for("photo.jpeg"), mime::IMAGE_JPEG);
        assert_eq!(content_type_for("photo.png"), mime::IMAGE_PNG);
        assert_eq!(content_type_for("notes.txt").essence_str(), "text/plain");
        assert_eq!(content_type_for("archive"), mime::APPLICATION_OCTET_STREAM);
    }

    #[tokio::test]
    async fn test_uploaded_file_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("id.png");
        std::fs::write(&path, [0x89, b'P', b'N', b'G']).unwrap();

        let file = UploadedFile::from_path(&path).await.unwrap();
        assert_eq!(file.file_name, "id.png");
        assert_eq!(file.content_type, "image/png");
        assert_eq!(file.bytes.len(), 4);
    }
}
