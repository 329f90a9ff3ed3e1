use crate::helper::image_host_helpers::{self, ImageHost, UploadError, UploadFile};
use crate::helper::pdf_helpers::{self, PdfError, PDF_MIME_TYPE};
use crate::helper::sanitization_helpers::{clean_text_field, is_acceptable_image_url, strip_all_html};
use crate::helper::upload_helpers::{parse_type_list, UploadForm};
use crate::models::db_operations::comics_db_operations::{self, DbError};
use crate::models::db_operations::users_db_operations;
use crate::models::{ChapterUpdate, ComicUpdate, NewChapter, NewComic, Role};
use crate::setup::db_setup::{DEFAULT_ALLOWED_IMAGE_TYPES, DEFAULT_MAX_UPLOAD_SIZE_MB};
use crate::{AppState, DbPool};
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use redb::Database;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

const MAX_TITLE_CHARS: usize = 200;
const MAX_AUTHOR_CHARS: usize = 200;
const MAX_GENRE_CHARS: usize = 300;
const MAX_DESCRIPTION_CHARS: usize = 5000;
const MAX_CHAPTER_TITLE_CHARS: usize = 200;

#[derive(Error, Debug)]
pub enum AdminHelperError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Comic store error: {0}")]
    Store(DbError),
    #[error("R2D2 Pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("{0}")]
    Pdf(#[from] PdfError),
    #[error("{0}")]
    Upload(#[from] UploadError),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
}

impl From<DbError> for AdminHelperError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound(what) => AdminHelperError::NotFound(what),
            DbError::InvalidInput(msg) => AdminHelperError::Validation(msg),
            other => AdminHelperError::Store(other),
        }
    }
}

impl ResponseError for AdminHelperError {
    fn status_code(&self) -> StatusCode {
        match self {
            AdminHelperError::Validation(_) => StatusCode::BAD_REQUEST,
            AdminHelperError::NotFound(_) => StatusCode::NOT_FOUND,
            AdminHelperError::Upload(UploadError::UnsupportedType(_))
            | AdminHelperError::Upload(UploadError::InvalidForm(_)) => StatusCode::BAD_REQUEST,
            AdminHelperError::Upload(UploadError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            AdminHelperError::Upload(_) => StatusCode::BAD_GATEWAY,
            AdminHelperError::Pdf(PdfError::InvalidPdf(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            AdminHelperError::Pdf(PdfError::LibraryUnavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let message = match self {
            AdminHelperError::Database(_) | AdminHelperError::Store(_) | AdminHelperError::Pool(_) => {
                log::error!("Admin request failed: {}", self);
                "A database error occurred.".to_string()
            }
            _ if status.is_server_error() => {
                log::error!("Admin request failed: {}", self);
                self.to_string()
            }
            _ => {
                log::warn!("Admin request rejected: {}", self);
                self.to_string()
            }
        };
        HttpResponse::build(status).json(json!({ "success": false, "error": message }))
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Settings {
    pub max_file_upload_size_mb: String,
    pub allowed_image_types: String,
}

// Helper to get a connection from the pool
fn get_conn(pool: &DbPool) -> Result<r2d2::PooledConnection<r2d2_sqlite::SqliteConnectionManager>, AdminHelperError> {
    pool.get().map_err(AdminHelperError::Pool)
}

/// Returns the normalised email when the credentials belong to an active admin.
pub fn verify_admin_credentials(pool: &DbPool, email: &str, password: &str) -> Option<String> {
    let conn = pool.get().ok()?;
    match users_db_operations::verify_credentials(&conn, email, password) {
        Some((email, Role::Admin)) => {
            if let Err(e) = users_db_operations::update_last_login_time(&conn, &email) {
                log::warn!("Could not record login time for '{}': {}", email, e);
            }
            Some(email)
        }
        _ => None,
    }
}

pub fn get_settings(conn: &Connection) -> Settings {
    let max_size = users_db_operations::read_setting(conn, "max_file_upload_size_mb")
        .unwrap_or_else(|| DEFAULT_MAX_UPLOAD_SIZE_MB.to_string());
    let image_types = users_db_operations::read_setting(conn, "allowed_image_types")
        .unwrap_or_else(|| DEFAULT_ALLOWED_IMAGE_TYPES.to_string());

    Settings { max_file_upload_size_mb: max_size, allowed_image_types: image_types }
}

pub fn load_settings(pool: &DbPool) -> Result<Settings, AdminHelperError> {
    let conn = get_conn(pool)?;
    Ok(get_settings(&conn))
}

#[derive(Deserialize, Debug, Default)]
pub struct SettingsPayload {
    pub max_file_upload_size_mb: Option<String>,
    pub allowed_image_types: Option<String>,
}

pub fn update_settings(pool: &DbPool, payload: &SettingsPayload) -> Result<Settings, AdminHelperError> {
    let conn = get_conn(pool)?;

    if let Some(max_size) = payload.max_file_upload_size_mb.as_deref().map(str::trim) {
        match max_size.parse::<u64>() {
            Ok(mb) if (1..=500).contains(&mb) => {
                users_db_operations::update_setting(&conn, "max_file_upload_size_mb", max_size)?
            }
            _ => {
                return Err(AdminHelperError::Validation(
                    "Invalid max file size. It must be a whole number between 1 and 500.".to_string(),
                ))
            }
        }
    }

    if let Some(types) = payload.allowed_image_types.as_deref() {
        let parsed = parse_type_list(types);
        if parsed.is_empty() {
            return Err(AdminHelperError::Validation("At least one image type must be allowed.".to_string()));
        }
        if let Some(unknown) = parsed.iter().find(|t| image_host_helpers::mime_to_safe_extension(t).is_none()) {
            return Err(AdminHelperError::Validation(format!(
                "'{}' is not a supported image type.",
                unknown
            )));
        }
        let mut sorted: Vec<_> = parsed.into_iter().collect();
        sorted.sort();
        users_db_operations::update_setting(&conn, "allowed_image_types", &sorted.join(","))?;
    }

    Ok(get_settings(&conn))
}

// --- Comic and chapter payloads ---

/// Raw JSON body for comic create/update; every field optional so missing
/// ones produce a readable 400 instead of a deserialisation error.
#[derive(Deserialize, Debug, Default)]
pub struct ComicPayload {
    pub title: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub genre: Option<String>,
    pub cover_image_url: Option<String>,
    pub banner_image_url: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct ChapterPayload {
    pub chapter_number: Option<u32>,
    pub title: Option<String>,
    pub page_image_urls: Option<Vec<String>>,
}

fn require(field: &Option<String>, name: &str) -> Result<String, AdminHelperError> {
    field
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AdminHelperError::Validation(format!("{} is required.", name)))
}

fn checked_url(value: &str, name: &str) -> Result<String, AdminHelperError> {
    if is_acceptable_image_url(value) {
        Ok(value.trim().to_string())
    } else {
        Err(AdminHelperError::Validation(format!("{} must be an http(s) URL or a /media path.", name)))
    }
}

fn checked_page_urls(urls: &[String]) -> Result<Vec<String>, AdminHelperError> {
    urls.iter().map(|u| checked_url(u, "Page image URL")).collect()
}

fn clean_optional_title(title: Option<&str>) -> Result<Option<String>, AdminHelperError> {
    match title.map(str::trim).filter(|t| !t.is_empty()) {
        Some(t) => clean_text_field("Chapter title", t, MAX_CHAPTER_TITLE_CHARS)
            .map(Some)
            .map_err(AdminHelperError::Validation),
        None => Ok(None),
    }
}

pub fn validate_new_comic(payload: &ComicPayload) -> Result<NewComic, AdminHelperError> {
    let title = require(&payload.title, "Title")?;
    let author = require(&payload.author, "Author")?;
    let genre = require(&payload.genre, "Genre")?;
    let cover = require(&payload.cover_image_url, "Cover image")?;

    Ok(NewComic {
        title: clean_text_field("Title", &title, MAX_TITLE_CHARS).map_err(AdminHelperError::Validation)?,
        description: strip_all_html(payload.description.as_deref().unwrap_or("").trim())
            .chars()
            .take(MAX_DESCRIPTION_CHARS)
            .collect(),
        author: clean_text_field("Author", &author, MAX_AUTHOR_CHARS).map_err(AdminHelperError::Validation)?,
        genre: clean_text_field("Genre", &genre, MAX_GENRE_CHARS).map_err(AdminHelperError::Validation)?,
        cover_image_url: checked_url(&cover, "Cover image")?,
        banner_image_url: match payload.banner_image_url.as_deref().map(str::trim) {
            Some(b) if !b.is_empty() => Some(checked_url(b, "Banner image")?),
            _ => None,
        },
    })
}

pub fn validate_comic_update(payload: &ComicPayload) -> Result<ComicUpdate, AdminHelperError> {
    let text = |value: &Option<String>, name: &str, max: usize| -> Result<Option<String>, AdminHelperError> {
        value
            .as_deref()
            .map(|v| clean_text_field(name, v, max).map_err(AdminHelperError::Validation))
            .transpose()
    };

    Ok(ComicUpdate {
        title: text(&payload.title, "Title", MAX_TITLE_CHARS)?,
        description: payload
            .description
            .as_deref()
            .map(|d| strip_all_html(d.trim()).chars().take(MAX_DESCRIPTION_CHARS).collect()),
        author: text(&payload.author, "Author", MAX_AUTHOR_CHARS)?,
        genre: text(&payload.genre, "Genre", MAX_GENRE_CHARS)?,
        cover_image_url: payload
            .cover_image_url
            .as_deref()
            .map(|u| checked_url(u, "Cover image"))
            .transpose()?,
        // An empty banner clears it.
        banner_image_url: match payload.banner_image_url.as_deref().map(str::trim) {
            Some("") => Some(String::new()),
            Some(b) => Some(checked_url(b, "Banner image")?),
            None => None,
        },
    })
}

pub fn validate_new_chapter(payload: &ChapterPayload) -> Result<NewChapter, AdminHelperError> {
    let chapter_number = payload
        .chapter_number
        .filter(|n| *n >= 1)
        .ok_or_else(|| AdminHelperError::Validation("Chapter number must be a positive whole number.".to_string()))?;
    let urls = payload
        .page_image_urls
        .as_ref()
        .filter(|u| !u.is_empty())
        .ok_or_else(|| AdminHelperError::Validation("At least one page image is required.".to_string()))?;

    Ok(NewChapter {
        chapter_number,
        title: clean_optional_title(payload.title.as_deref())?,
        page_image_urls: checked_page_urls(urls)?,
    })
}

pub fn validate_chapter_update(payload: &ChapterPayload) -> Result<ChapterUpdate, AdminHelperError> {
    if payload.chapter_number == Some(0) {
        return Err(AdminHelperError::Validation("Chapter number must be a positive whole number.".to_string()));
    }
    let page_image_urls = match &payload.page_image_urls {
        Some(urls) if urls.is_empty() => {
            return Err(AdminHelperError::Validation("A chapter needs at least one page.".to_string()))
        }
        Some(urls) => Some(checked_page_urls(urls)?),
        None => None,
    };

    Ok(ChapterUpdate {
        chapter_number: payload.chapter_number,
        // An empty title clears it.
        title: match payload.title.as_deref() {
            Some(t) if t.trim().is_empty() => Some(String::new()),
            Some(t) => clean_optional_title(Some(t))?,
            None => None,
        },
        page_image_urls,
    })
}

// --- Uploads and PDF ingestion ---

/// Replaces every PDF in `files` with its rendered pages, in place, so the
/// resulting order is the order the files were picked in.
pub async fn expand_pdf_files(state: &AppState, files: Vec<UploadFile>) -> Result<Vec<UploadFile>, AdminHelperError> {
    let mut pages = Vec::with_capacity(files.len());
    for file in files {
        if file.content_type != PDF_MIME_TYPE {
            pages.push(file);
            continue;
        }
        log::info!("Converting PDF '{}' ({} bytes) to page images", file.file_name, file.bytes.len());
        let base_name = pdf_helpers::base_name_for(&file.file_name);
        let images = pdf_helpers::convert_pdf_to_images(
            file.bytes,
            state.pdf_options,
            state.pdfium_library_path.clone(),
        )
        .await?;
        pages.extend(pdf_helpers::pdf_images_to_files(images, &base_name));
    }
    Ok(pages)
}

pub async fn upload_files(host: &dyn ImageHost, files: &[UploadFile], names: Option<&[String]>) -> Result<Vec<String>, AdminHelperError> {
    if files.is_empty() {
        return Err(AdminHelperError::Validation("No files were uploaded.".to_string()));
    }
    Ok(image_host_helpers::upload_many(host, files, names).await?)
}

fn form_chapter_number(form: &UploadForm) -> Result<u32, AdminHelperError> {
    form.field("chapter_number")
        .and_then(|n| n.parse::<u32>().ok())
        .filter(|n| *n >= 1)
        .ok_or_else(|| AdminHelperError::Validation("Chapter number must be a positive whole number.".to_string()))
}

/// Creates a chapter from a multipart form of page images and/or PDFs.
/// Returns the new chapter's id and its page count.
pub async fn create_chapter_from_upload(
    db: &Database,
    state: &AppState,
    comic_id: &str,
    form: UploadForm,
) -> Result<(String, usize), AdminHelperError> {
    let comic = comics_db_operations::read_comic(db, comic_id)?
        .ok_or_else(|| AdminHelperError::NotFound(format!("comic {}", comic_id)))?;
    let chapter_number = form_chapter_number(&form)?;
    let title = clean_optional_title(form.field("title"))?;

    if form.files.is_empty() {
        return Err(AdminHelperError::Validation("At least one page image or PDF is required.".to_string()));
    }

    let pages = expand_pdf_files(state, form.files).await?;
    let names = image_host_helpers::chapter_page_names(&comic.record.title, chapter_number, title.as_deref(), pages.len());
    let urls = upload_files(state.image_host.as_ref(), &pages, Some(&names)).await?;

    let chapter = NewChapter { chapter_number, title, page_image_urls: urls };
    let id = comics_db_operations::create_chapter(db, comic_id, &chapter)?;
    log::info!(
        "Created chapter {} of '{}' with {} pages via {}",
        chapter_number,
        comic.record.title,
        chapter.page_image_urls.len(),
        state.image_host.name()
    );
    Ok((id, chapter.page_image_urls.len()))
}

/// Uploads extra pages and appends them to an existing chapter.
pub async fn append_pages_from_upload(
    db: &Database,
    state: &AppState,
    comic_id: &str,
    chapter_id: &str,
    form: UploadForm,
) -> Result<Vec<String>, AdminHelperError> {
    let comic = comics_db_operations::read_comic(db, comic_id)?
        .ok_or_else(|| AdminHelperError::NotFound(format!("comic {}", comic_id)))?;
    let chapter = comics_db_operations::read_chapter(db, comic_id, chapter_id)?
        .ok_or_else(|| AdminHelperError::NotFound(format!("chapter {}", chapter_id)))?;

    let pages = expand_pdf_files(state, form.files).await?;
    let existing = chapter.record.page_image_urls.len();
    let names = image_host_helpers::appended_page_names(
        &comic.record.title,
        chapter.record.chapter_number,
        existing,
        pages.len(),
    );
    let new_urls = upload_files(state.image_host.as_ref(), &pages, Some(&names)).await?;

    let mut all_urls = chapter.record.page_image_urls;
    all_urls.extend(new_urls);
    let update = ChapterUpdate { page_image_urls: Some(all_urls.clone()), ..Default::default() };
    comics_db_operations::update_chapter(db, comic_id, chapter_id, &update)?;
    Ok(all_urls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::db_setup::setup_users_db;
    use r2d2_sqlite::SqliteConnectionManager;

    fn pool() -> (tempfile::TempDir, DbPool) {
        let dir = tempfile::tempdir().unwrap();
        let manager = SqliteConnectionManager::file(dir.path().join("users.db"));
        let pool = r2d2::Pool::builder().max_size(1).build(manager).unwrap();
        setup_users_db(&mut pool.get().unwrap()).unwrap();
        (dir, pool)
    }

    fn comic_payload() -> ComicPayload {
        ComicPayload {
            title: Some("<b>Night</b> Shift".into()),
            description: Some("Late.".into()),
            author: Some("R. Ito".into()),
            genre: Some("Drama, Slice of Life".into()),
            cover_image_url: Some("https://i.ibb.co/a/cover.jpg".into()),
            banner_image_url: Some("".into()),
        }
    }

    #[test]
    fn new_comic_is_cleaned() {
        let comic = validate_new_comic(&comic_payload()).unwrap();
        assert_eq!(comic.title, "Night Shift");
        assert!(comic.banner_image_url.is_none());
    }

    #[test]
    fn new_comic_text_is_stored_unescaped() {
        let payload = ComicPayload {
            title: Some("Tom & Jerry".into()),
            description: Some("a < b".into()),
            genre: Some("Action & Adventure, Comedy".into()),
            ..comic_payload()
        };
        let comic = validate_new_comic(&payload).unwrap();
        assert_eq!(comic.title, "Tom & Jerry");
        assert_eq!(comic.description, "a < b");
        assert_eq!(comic.genre, "Action & Adventure, Comedy");
    }

    #[test]
    fn new_comic_requires_core_fields() {
        let mut payload = comic_payload();
        payload.author = None;
        let err = validate_new_comic(&payload).unwrap_err();
        assert_eq!(err.to_string(), "Author is required.");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let mut payload = comic_payload();
        payload.cover_image_url = Some("ftp://x/cover.jpg".into());
        assert!(validate_new_comic(&payload).is_err());
    }

    #[test]
    fn chapter_needs_number_and_pages() {
        let missing_pages = ChapterPayload { chapter_number: Some(1), title: None, page_image_urls: Some(vec![]) };
        assert!(validate_new_chapter(&missing_pages).is_err());

        let zero = ChapterPayload {
            chapter_number: Some(0),
            title: None,
            page_image_urls: Some(vec!["/media/pages/a/b/c.jpg".into()]),
        };
        assert!(validate_new_chapter(&zero).is_err());

        let ok = ChapterPayload {
            chapter_number: Some(2),
            title: Some("  ".into()),
            page_image_urls: Some(vec!["/media/pages/a/b/c.jpg".into()]),
        };
        let chapter = validate_new_chapter(&ok).unwrap();
        assert_eq!(chapter.chapter_number, 2);
        assert!(chapter.title.is_none());
    }

    #[test]
    fn chapter_update_can_clear_title() {
        let update = validate_chapter_update(&ChapterPayload { title: Some("".into()), ..Default::default() }).unwrap();
        assert_eq!(update.title.as_deref(), Some(""));
        assert!(update.page_image_urls.is_none());
    }

    #[test]
    fn store_errors_map_to_statuses() {
        let not_found: AdminHelperError = DbError::NotFound("comic x".into()).into();
        assert_eq!(not_found.status_code(), StatusCode::NOT_FOUND);
        let invalid: AdminHelperError = DbError::InvalidInput("bad".into()).into();
        assert_eq!(invalid.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn settings_are_validated_before_saving() {
        let (_dir, pool) = pool();
        let bad = SettingsPayload { max_file_upload_size_mb: Some("lots".into()), allowed_image_types: None };
        assert!(matches!(update_settings(&pool, &bad), Err(AdminHelperError::Validation(_))));

        let unknown = SettingsPayload { max_file_upload_size_mb: None, allowed_image_types: Some("image/tiff".into()) };
        assert!(update_settings(&pool, &unknown).is_err());

        let good = SettingsPayload {
            max_file_upload_size_mb: Some("30".into()),
            allowed_image_types: Some("image/png, image/jpeg".into()),
        };
        let settings = update_settings(&pool, &good).unwrap();
        assert_eq!(settings.max_file_upload_size_mb, "30");
        assert_eq!(settings.allowed_image_types, "image/jpeg,image/png");
    }

    #[test]
    fn only_admins_pass_the_console_login() {
        let (_dir, pool) = pool();
        {
            let conn = pool.get().unwrap();
            users_db_operations::create_user(&conn, "boss@example.com", "pw-123456", Role::Admin).unwrap();
            users_db_operations::create_user(&conn, "fan@example.com", "pw-123456", Role::User).unwrap();
        }
        assert_eq!(verify_admin_credentials(&pool, "boss@example.com", "pw-123456").as_deref(), Some("boss@example.com"));
        assert!(verify_admin_credentials(&pool, "fan@example.com", "pw-123456").is_none());

        let conn = pool.get().unwrap();
        let boss = users_db_operations::read_user_by_email(&conn, "boss@example.com").unwrap();
        assert!(boss.last_login_time.is_some());
    }
}
