use crate::config::Config;
use actix_web::web;
use futures_util::future::{try_join_all, LocalBoxFuture};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::multipart;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

pub const IMGBB_UPLOAD_URL: &str = "https://api.imgbb.com/1/upload";
pub const CLOUDINARY_FOLDER: &str = "comics";
/// Pages go out this many at a time; batches run one after another.
pub const UPLOAD_BATCH_SIZE: usize = 5;

static NON_ALPHANUMERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-zA-Z0-9]").expect("static regex is valid"));

/// An in-memory file on its way to an image host.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("HTTP error while uploading '{file}': {source}")]
    Http {
        file: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Upload of '{file}' failed with status {status}")]
    Status { file: String, status: u16 },
    #[error("Image host rejected '{file}': {detail}")]
    Rejected { file: String, detail: String },
    #[error("Failed to store '{file}': {source}")]
    Io {
        file: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Unsupported file type: '{0}'. Please upload one of the allowed types.")]
    UnsupportedType(String),
    #[error("File '{file}' is too large. Maximum size is {max_mb}MB.")]
    TooLarge { file: String, max_mb: u64 },
    #[error("Upload task failed: {0}")]
    Blocking(String),
    #[error("Invalid upload form: {0}")]
    InvalidForm(String),
}

/// Anything that can take an image and hand back a public URL for it.
pub trait ImageHost: Send + Sync {
    fn name(&self) -> &'static str;

    /// `public_name` is a hint; hosts that cannot name files ignore it.
    fn upload<'a>(
        &'a self,
        file: &'a UploadFile,
        public_name: Option<&'a str>,
    ) -> LocalBoxFuture<'a, Result<String, UploadError>>;
}

/// Securely maps a validated MIME type to a file extension.
pub fn mime_to_safe_extension(mime_type: &str) -> Option<&'static str> {
    let map: BTreeMap<&str, &str> = [
        ("image/gif", "gif"),
        ("image/jpeg", "jpg"),
        ("image/png", "png"),
        ("image/webp", "webp"),
    ]
    .iter()
    .cloned()
    .collect();

    map.get(mime_type).cloned()
}

fn file_part(file: &UploadFile) -> Result<multipart::Part, UploadError> {
    multipart::Part::bytes(file.bytes.clone())
        .file_name(file.file_name.clone())
        .mime_str(&file.content_type)
        .map_err(|source| UploadError::Http { file: file.file_name.clone(), source })
}

// --- imgbb ---

#[derive(Deserialize)]
struct ImgbbResponse {
    success: bool,
    data: Option<ImgbbData>,
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct ImgbbData {
    url: String,
}

pub struct ImgbbHost {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl ImgbbHost {
    pub fn new(client: reqwest::Client, api_key: String) -> Self {
        ImgbbHost { client, api_key, endpoint: IMGBB_UPLOAD_URL.to_string() }
    }

    async fn send(&self, file: &UploadFile, public_name: Option<&str>) -> Result<String, UploadError> {
        let mut form = multipart::Form::new()
            .text("key", self.api_key.clone())
            .part("image", file_part(file)?);
        if let Some(name) = public_name {
            form = form.text("name", name.to_string());
        }

        let http_err = |source: reqwest::Error| UploadError::Http { file: file.file_name.clone(), source };
        let response = self.client.post(&self.endpoint).multipart(form).send().await.map_err(http_err)?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::Status { file: file.file_name.clone(), status: status.as_u16() });
        }

        let body: ImgbbResponse = response.json().await.map_err(http_err)?;
        match (body.success, body.data) {
            (true, Some(data)) => Ok(data.url),
            (_, _) => Err(UploadError::Rejected {
                file: file.file_name.clone(),
                detail: body.error.map(|e| e.to_string()).unwrap_or_else(|| "Upload failed".to_string()),
            }),
        }
    }
}

impl ImageHost for ImgbbHost {
    fn name(&self) -> &'static str {
        "imgbb"
    }

    fn upload<'a>(
        &'a self,
        file: &'a UploadFile,
        public_name: Option<&'a str>,
    ) -> LocalBoxFuture<'a, Result<String, UploadError>> {
        Box::pin(self.send(file, public_name))
    }
}

// --- Cloudinary (unsigned preset) ---

#[derive(Deserialize)]
struct CloudinaryResponse {
    secure_url: Option<String>,
    error: Option<CloudinaryErrorBody>,
}

#[derive(Deserialize)]
struct CloudinaryErrorBody {
    message: String,
}

pub struct CloudinaryHost {
    client: reqwest::Client,
    upload_preset: String,
    endpoint: String,
}

impl CloudinaryHost {
    pub fn new(client: reqwest::Client, cloud_name: &str, upload_preset: String) -> Self {
        CloudinaryHost {
            client,
            upload_preset,
            endpoint: format!("https://api.cloudinary.com/v1_1/{}/image/upload", cloud_name),
        }
    }

    async fn send(&self, file: &UploadFile, public_name: Option<&str>) -> Result<String, UploadError> {
        let mut form = multipart::Form::new()
            .part("file", file_part(file)?)
            .text("upload_preset", self.upload_preset.clone())
            .text("folder", CLOUDINARY_FOLDER);
        if let Some(name) = public_name {
            form = form.text("public_id", name.to_string());
        }

        let http_err = |source: reqwest::Error| UploadError::Http { file: file.file_name.clone(), source };
        let response = self.client.post(&self.endpoint).multipart(form).send().await.map_err(http_err)?;
        let status = response.status();
        let body: CloudinaryResponse = response.json().await.map_err(http_err)?;

        if let Some(error) = body.error {
            return Err(UploadError::Rejected { file: file.file_name.clone(), detail: error.message });
        }
        if !status.is_success() {
            return Err(UploadError::Status { file: file.file_name.clone(), status: status.as_u16() });
        }
        body.secure_url.ok_or_else(|| UploadError::Rejected {
            file: file.file_name.clone(),
            detail: "response carried no secure_url".to_string(),
        })
    }
}

impl ImageHost for CloudinaryHost {
    fn name(&self) -> &'static str {
        "cloudinary"
    }

    fn upload<'a>(
        &'a self,
        file: &'a UploadFile,
        public_name: Option<&'a str>,
    ) -> LocalBoxFuture<'a, Result<String, UploadError>> {
        Box::pin(self.send(file, public_name))
    }
}

// --- Local media directory ---

/// Stores pages under `MEDIA_PATH/pages/xx/yy/<uuid>.<ext>`, served from `/media`.
pub struct LocalHost {
    media_path: PathBuf,
}

impl LocalHost {
    pub fn new(media_path: impl Into<PathBuf>) -> Self {
        LocalHost { media_path: media_path.into() }
    }

    async fn store(&self, file: &UploadFile) -> Result<String, UploadError> {
        let ext = mime_to_safe_extension(&file.content_type)
            .ok_or_else(|| UploadError::UnsupportedType(file.content_type.clone()))?;

        let id = Uuid::new_v4().to_string();
        let (dir1, dir2) = (&id[0..2], &id[2..4]);
        let dir = self.media_path.join("pages").join(dir1).join(dir2);
        let final_path = dir.join(format!("{}.{}", id, ext));

        let bytes = file.bytes.clone();
        web::block(move || {
            fs::create_dir_all(&dir)?;
            fs::write(&final_path, bytes)
        })
        .await
        .map_err(|e| UploadError::Blocking(e.to_string()))?
        .map_err(|source| UploadError::Io { file: file.file_name.clone(), source })?;

        Ok(format!("/media/pages/{}/{}/{}.{}", dir1, dir2, id, ext))
    }
}

impl ImageHost for LocalHost {
    fn name(&self) -> &'static str {
        "local"
    }

    fn upload<'a>(
        &'a self,
        file: &'a UploadFile,
        _public_name: Option<&'a str>,
    ) -> LocalBoxFuture<'a, Result<String, UploadError>> {
        Box::pin(self.store(file))
    }
}

/// Picks the host named by `IMAGE_HOST`. Config loading has already checked
/// that the matching credentials are present.
pub fn build_image_host(config: &Config) -> Arc<dyn ImageHost> {
    let client = reqwest::Client::new();
    match (
        config.image_host.as_str(),
        config.imgbb_api_key.as_ref(),
        config.cloudinary_cloud_name.as_ref(),
        config.cloudinary_upload_preset.as_ref(),
    ) {
        ("imgbb", Some(key), _, _) => Arc::new(ImgbbHost::new(client, key.clone())),
        ("cloudinary", _, Some(cloud), Some(preset)) => {
            Arc::new(CloudinaryHost::new(client, cloud, preset.clone()))
        }
        (other, ..) => {
            if other != "local" {
                log::warn!("Image host '{}' is missing credentials; storing pages locally.", other);
            }
            Arc::new(LocalHost::new(&config.media_path))
        }
    }
}

/// Uploads `files` in batches of [`UPLOAD_BATCH_SIZE`] and returns their URLs
/// in input order. The first failure aborts the whole run.
pub async fn upload_many(
    host: &dyn ImageHost,
    files: &[UploadFile],
    public_names: Option<&[String]>,
) -> Result<Vec<String>, UploadError> {
    let mut urls = Vec::with_capacity(files.len());

    for (batch_index, batch) in files.chunks(UPLOAD_BATCH_SIZE).enumerate() {
        let uploads = batch.iter().enumerate().map(|(offset, file)| {
            let name = public_names
                .and_then(|names| names.get(batch_index * UPLOAD_BATCH_SIZE + offset))
                .map(String::as_str);
            host.upload(file, name)
        });
        urls.extend(try_join_all(uploads).await?);
        log::debug!(
            "Uploaded batch {} to {} ({}/{} files)",
            batch_index + 1,
            host.name(),
            urls.len(),
            files.len()
        );
    }

    Ok(urls)
}

pub fn sanitize_name_segment(segment: &str) -> String {
    NON_ALPHANUMERIC.replace_all(segment, "_").into_owned()
}

/// `{comic}_chap{n}_{title|Untitled}_page_{i}` for a freshly created chapter.
pub fn chapter_page_names(
    comic_title: &str,
    chapter_number: u32,
    chapter_title: Option<&str>,
    count: usize,
) -> Vec<String> {
    let comic = sanitize_name_segment(comic_title);
    let title = chapter_title
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(sanitize_name_segment)
        .unwrap_or_else(|| "Untitled".to_string());

    (1..=count)
        .map(|i| format!("{}_chap{}_{}_page_{}", comic, chapter_number, title, i))
        .collect()
}

/// `{comic}_chap{n}_page_{i}` for pages appended after `existing` pages.
pub fn appended_page_names(comic_title: &str, chapter_number: u32, existing: usize, count: usize) -> Vec<String> {
    let comic = sanitize_name_segment(comic_title);
    (existing + 1..=existing + count)
        .map(|i| format!("{}_chap{}_page_{}", comic, chapter_number, i))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingHost {
        calls: Mutex<Vec<(String, Option<String>)>>,
        fail_on: Option<String>,
    }

    impl ImageHost for RecordingHost {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn upload<'a>(
            &'a self,
            file: &'a UploadFile,
            public_name: Option<&'a str>,
        ) -> LocalBoxFuture<'a, Result<String, UploadError>> {
            Box::pin(async move {
                self.calls
                    .lock()
                    .unwrap()
                    .push((file.file_name.clone(), public_name.map(str::to_string)));
                if self.fail_on.as_deref() == Some(file.file_name.as_str()) {
                    return Err(UploadError::Rejected { file: file.file_name.clone(), detail: "nope".into() });
                }
                Ok(format!("https://img.test/{}", file.file_name))
            })
        }
    }

    fn files(n: usize) -> Vec<UploadFile> {
        (1..=n)
            .map(|i| UploadFile {
                file_name: format!("p{}.jpg", i),
                content_type: "image/jpeg".to_string(),
                bytes: vec![0xFF, 0xD8, i as u8],
            })
            .collect()
    }

    #[actix_web::test]
    async fn upload_many_keeps_input_order_across_batches() {
        let host = RecordingHost { calls: Mutex::new(Vec::new()), fail_on: None };
        let names = chapter_page_names("My Comic!", 3, Some("The End"), 12);

        let urls = upload_many(&host, &files(12), Some(&names)).await.unwrap();

        assert_eq!(urls.len(), 12);
        assert_eq!(urls[0], "https://img.test/p1.jpg");
        assert_eq!(urls[11], "https://img.test/p12.jpg");
        let calls = host.calls.lock().unwrap();
        assert_eq!(calls[6].1.as_deref(), Some("My_Comic__chap3_The_End_page_7"));
    }

    #[actix_web::test]
    async fn upload_many_stops_at_first_failing_batch() {
        let host = RecordingHost { calls: Mutex::new(Vec::new()), fail_on: Some("p2.jpg".to_string()) };

        let result = upload_many(&host, &files(8), None).await;

        assert!(matches!(result, Err(UploadError::Rejected { .. })));
        // The second batch never starts.
        let calls = host.calls.lock().unwrap();
        assert!(calls.iter().all(|(name, _)| name != "p6.jpg"));
        assert!(calls.len() <= UPLOAD_BATCH_SIZE);
    }

    #[actix_web::test]
    async fn local_host_writes_under_media_pages() {
        let dir = tempfile::tempdir().unwrap();
        let host = LocalHost::new(dir.path());
        let file = &files(1)[0];

        let url = host.upload(file, None).await.unwrap();

        assert!(url.starts_with("/media/pages/"));
        assert!(url.ends_with(".jpg"));
        let on_disk = dir.path().join(url.trim_start_matches("/media/"));
        assert_eq!(fs::read(on_disk).unwrap(), file.bytes);
    }

    #[actix_web::test]
    async fn local_host_refuses_unknown_types() {
        let dir = tempfile::tempdir().unwrap();
        let host = LocalHost::new(dir.path());
        let file = UploadFile {
            file_name: "x.svg".into(),
            content_type: "image/svg+xml".into(),
            bytes: vec![1],
        };
        assert!(matches!(host.upload(&file, None).await, Err(UploadError::UnsupportedType(_))));
    }

    #[test]
    fn page_names_follow_the_chapter() {
        assert_eq!(
            chapter_page_names("One Piece", 1, None, 2),
            vec!["One_Piece_chap1_Untitled_page_1", "One_Piece_chap1_Untitled_page_2"]
        );
        assert_eq!(chapter_page_names("A", 2, Some("  "), 1), vec!["A_chap2_Untitled_page_1"]);
        assert_eq!(
            appended_page_names("One Piece", 4, 10, 2),
            vec!["One_Piece_chap4_page_11", "One_Piece_chap4_page_12"]
        );
    }
}
