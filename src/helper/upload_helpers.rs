use crate::helper::image_host_helpers::{UploadError, UploadFile};
use crate::helper::pdf_helpers::{is_pdf_file, PDF_MIME_TYPE};
use crate::models::db_operations::users_db_operations;
use crate::setup::db_setup::{DEFAULT_ALLOWED_IMAGE_TYPES, DEFAULT_MAX_UPLOAD_SIZE_MB};
use actix_multipart::Multipart;
use actix_web::web::BytesMut;
use futures_util::StreamExt;
use rusqlite::Connection;
use std::collections::{HashMap, HashSet};

const MAX_TEXT_FIELD_BYTES: usize = 16 * 1024;

#[derive(Debug, Clone)]
pub struct UploadLimits {
    pub max_file_size_mb: u64,
    pub allowed_image_types: HashSet<String>,
}

impl UploadLimits {
    /// Reads the limits an admin configured on the settings page.
    pub fn from_settings(conn: &Connection) -> Self {
        let max_file_size_mb = users_db_operations::read_setting(conn, "max_file_upload_size_mb")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or_else(|| DEFAULT_MAX_UPLOAD_SIZE_MB.parse().unwrap_or(20));
        let types = users_db_operations::read_setting(conn, "allowed_image_types")
            .unwrap_or_else(|| DEFAULT_ALLOWED_IMAGE_TYPES.to_string());

        UploadLimits { max_file_size_mb, allowed_image_types: parse_type_list(&types) }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }
}

impl Default for UploadLimits {
    fn default() -> Self {
        UploadLimits {
            max_file_size_mb: 20,
            allowed_image_types: parse_type_list(DEFAULT_ALLOWED_IMAGE_TYPES),
        }
    }
}

pub fn parse_type_list(value: &str) -> HashSet<String> {
    value
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Files in the order the browser sent them, plus any plain text fields.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub files: Vec<UploadFile>,
    pub fields: HashMap<String, String>,
}

impl UploadForm {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|v| v.trim()).filter(|v| !v.is_empty())
    }
}

/// Decides the stored content type of an incoming file or refuses it.
pub fn classify_file(
    content_type: Option<&str>,
    file_name: &str,
    limits: &UploadLimits,
    allow_pdf: bool,
) -> Result<String, UploadError> {
    if is_pdf_file(content_type, file_name) {
        return if allow_pdf {
            Ok(PDF_MIME_TYPE.to_string())
        } else {
            Err(UploadError::UnsupportedType(PDF_MIME_TYPE.to_string()))
        };
    }

    let content_type = content_type.unwrap_or("application/octet-stream").to_lowercase();
    if limits.allowed_image_types.contains(&content_type) {
        Ok(content_type)
    } else {
        Err(UploadError::UnsupportedType(content_type))
    }
}

/// Drains a multipart body. Any field carrying a filename is treated as a
/// file; everything else is read as UTF-8 text.
pub async fn read_upload_form(
    mut payload: Multipart,
    limits: &UploadLimits,
    allow_pdf: bool,
) -> Result<UploadForm, UploadError> {
    let mut form = UploadForm::default();
    let max_bytes = limits.max_bytes();

    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| UploadError::InvalidForm(e.to_string()))?;
        let field_name = field.content_disposition().get_name().unwrap_or_default().to_string();
        let file_name = field.content_disposition().get_filename().map(str::to_string);

        match file_name {
            Some(file_name) => {
                let content_type = field.content_type().map(|m| m.essence_str().to_string());
                let content_type = classify_file(content_type.as_deref(), &file_name, limits, allow_pdf)?;

                let mut data = BytesMut::new();
                while let Some(chunk) = field.next().await {
                    let chunk = chunk.map_err(|e| UploadError::InvalidForm(e.to_string()))?;
                    if (data.len() + chunk.len()) as u64 > max_bytes {
                        return Err(UploadError::TooLarge { file: file_name, max_mb: limits.max_file_size_mb });
                    }
                    data.extend_from_slice(&chunk);
                }

                if data.is_empty() {
                    log::warn!("Skipping empty upload '{}'", file_name);
                    continue;
                }
                form.files.push(UploadFile { file_name, content_type, bytes: data.to_vec() });
            }
            None => {
                let mut data = BytesMut::new();
                while let Some(chunk) = field.next().await {
                    let chunk = chunk.map_err(|e| UploadError::InvalidForm(e.to_string()))?;
                    if data.len() + chunk.len() > MAX_TEXT_FIELD_BYTES {
                        return Err(UploadError::InvalidForm(format!("field '{}' is too long", field_name)));
                    }
                    data.extend_from_slice(&chunk);
                }
                let value = String::from_utf8(data.to_vec())
                    .map_err(|_| UploadError::InvalidForm("Invalid UTF-8 in form field.".to_string()))?;
                form.fields.insert(field_name, value);
            }
        }
    }

    Ok(form)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdfs_pass_only_where_allowed() {
        let limits = UploadLimits::default();
        assert_eq!(classify_file(None, "ch.pdf", &limits, true).unwrap(), "application/pdf");
        assert!(matches!(
            classify_file(Some("application/pdf"), "ch", &limits, false),
            Err(UploadError::UnsupportedType(_))
        ));
    }

    #[test]
    fn images_are_checked_against_the_allow_list() {
        let limits = UploadLimits::default();
        assert_eq!(classify_file(Some("IMAGE/PNG"), "a.png", &limits, true).unwrap(), "image/png");
        assert!(classify_file(Some("image/svg+xml"), "a.svg", &limits, true).is_err());
        assert!(classify_file(None, "a.png", &limits, true).is_err());
    }

    #[test]
    fn type_lists_are_normalised() {
        let types = parse_type_list(" image/JPEG, ,image/png ");
        assert_eq!(types.len(), 2);
        assert!(types.contains("image/jpeg"));
    }
}
