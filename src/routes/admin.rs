use crate::config::Config;
use crate::helper::admin_helpers::{
    self, AdminHelperError, ChapterPayload, ComicPayload, SettingsPayload,
};
use crate::helper::pagination_helpers::{PageRequest, ITEMS_PER_PAGE_OPTIONS};
use crate::helper::upload_helpers::{self, UploadLimits};
use crate::middleware::{admin_guard, AuthenticatedAdmin};
use crate::models::db_operations::comics_db_operations;
use crate::models::Notification;
use crate::{AppState, DbPool};
use actix_csrf::extractor::{Csrf, CsrfGuarded, CsrfToken};
use actix_multipart::Multipart;
use actix_session::Session;
use actix_web::{error::InternalError, web, HttpResponse, Responder};
use redb::Database;
use serde::Deserialize;
use serde_json::json;
use tera::{Context, Tera};

const MAX_JSON_BODY_BYTES: usize = 4 * 1024 * 1024;

#[derive(Deserialize)]
struct LoginForm {
    csrf_token: CsrfToken,
    email: String,
    password: String,
}

impl CsrfGuarded for LoginForm {
    fn csrf_token(&self) -> &CsrfToken {
        &self.csrf_token
    }
}

#[derive(Deserialize)]
struct SettingsForm {
    csrf_token: CsrfToken,
    max_file_upload_size_mb: Option<String>,
    allowed_image_types: Option<String>,
}

impl CsrfGuarded for SettingsForm {
    fn csrf_token(&self) -> &CsrfToken {
        &self.csrf_token
    }
}

#[derive(Deserialize)]
struct DashboardQuery {
    page: Option<String>,
    limit: Option<String>,
}

#[derive(Deserialize)]
struct MovePayload {
    target_comic_id: Option<String>,
}

pub fn config_login(cfg: &mut web::ServiceConfig) {
    cfg.route("/login", web::get().to(show_admin_login_form))
        .route("/login", web::post().to(handle_admin_login))
        .route("/logout", web::post().to(handle_admin_logout));
}

pub fn config_dashboard(cfg: &mut web::ServiceConfig) {
    cfg.route("/dashboard", web::get().to(show_admin_dashboard))
        .route("/update_settings", web::post().to(update_settings_action))
        .service(
            web::scope("/api")
                // Long chapters carry hundreds of page URLs.
                .app_data(web::JsonConfig::default().limit(MAX_JSON_BODY_BYTES).error_handler(|err, _req| {
                    let response = HttpResponse::BadRequest()
                        .json(json!({ "success": false, "error": format!("Invalid JSON body: {}", err) }));
                    InternalError::from_response(err, response).into()
                }))
                .route("/comics", web::post().to(create_comic))
                .route("/comics/{id}", web::put().to(update_comic))
                .route("/comics/{id}", web::delete().to(delete_comic))
                .route("/comics/{id}/chapters", web::post().to(create_chapter))
                .route("/comics/{id}/chapters", web::delete().to(delete_all_chapters))
                .route("/comics/{id}/chapters/upload", web::post().to(upload_chapter))
                .route("/comics/{id}/chapters/renumber", web::post().to(renumber_chapters))
                .route("/comics/{id}/chapters/{chapter_id}", web::put().to(update_chapter))
                .route("/comics/{id}/chapters/{chapter_id}", web::delete().to(delete_chapter))
                .route("/comics/{id}/chapters/{chapter_id}/pages", web::post().to(append_pages))
                .route("/comics/{id}/chapters/{chapter_id}/move", web::post().to(move_chapter))
                .route("/upload", web::post().to(upload_images))
                .route("/settings", web::get().to(get_settings))
                .route("/settings", web::post().to(post_settings)),
        );
}

fn set_notification(session: &Session, message: &str, r#type: &str) {
    let notification = Notification { message: message.to_string(), r#type: r#type.to_string() };
    if let Err(e) = session.insert("notification", &notification) {
        log::error!("Failed to store notification in session: {}", e);
    }
}

fn redirect(location: String) -> HttpResponse {
    HttpResponse::Found().append_header(("location", location)).finish()
}

// --- Login ---

async fn show_admin_login_form(
    session: Session,
    tera: web::Data<Tera>,
    token: CsrfToken,
    config: web::Data<Config>,
) -> impl Responder {
    let admin_url_prefix = &config.admin_url_prefix;
    if admin_guard(&session) {
        return redirect(format!("/management/{}/dashboard", admin_url_prefix));
    }

    let mut ctx = Context::new();
    ctx.insert("admin_url_prefix", admin_url_prefix);
    ctx.insert("csrf_token", token.get());

    if let Ok(Some(error)) = session.get::<String>("error") {
        ctx.insert("error", &error);
        session.remove("error");
    }

    match tera.render("admin/login.html", &ctx) {
        Ok(rendered) => HttpResponse::Ok().content_type("text/html; charset=utf-8").body(rendered),
        Err(err) => {
            log::error!("Template rendering error: {}", err);
            HttpResponse::InternalServerError().body("Template error")
        }
    }
}

async fn handle_admin_login(
    session: Session,
    pool: web::Data<DbPool>,
    form: Csrf<web::Form<LoginForm>>,
    config: web::Data<Config>,
) -> impl Responder {
    let admin_url_prefix = &config.admin_url_prefix;
    let login_url = format!("/management/{}/login", admin_url_prefix);
    let dashboard_url = format!("/management/{}/dashboard", admin_url_prefix);

    let login_data = form.into_inner().into_inner();
    let pool = pool.into_inner();
    let (email, password) = (login_data.email, login_data.password);

    // bcrypt is slow on purpose; keep it off the async workers.
    let verified = web::block(move || admin_helpers::verify_admin_credentials(&pool, &email, &password)).await;

    match verified {
        Ok(Some(email)) => {
            session.renew();
            let stored = session
                .insert("email", &email)
                .and_then(|_| session.insert("role", "admin"));
            if let Err(e) = stored {
                log::error!("Failed to start admin session: {}", e);
                return HttpResponse::InternalServerError().body("Could not start session.");
            }
            session.remove("error");
            log::info!("Admin '{}' logged in", email);
            redirect(dashboard_url)
        }
        Ok(None) => {
            if let Err(e) = session.insert("error", "Invalid credentials or account suspended.") {
                log::error!("Failed to store login error in session: {}", e);
            }
            redirect(login_url)
        }
        Err(e) => {
            log::error!("Credential check failed: {}", e);
            HttpResponse::InternalServerError().body("Login is temporarily unavailable.")
        }
    }
}

async fn handle_admin_logout(session: Session, config: web::Data<Config>) -> impl Responder {
    session.purge();
    redirect(format!("/management/{}/login", &config.admin_url_prefix))
}

// --- Dashboard (HTML) ---

async fn show_admin_dashboard(
    auth_user: AuthenticatedAdmin,
    session: Session,
    tera: web::Data<Tera>,
    pool: web::Data<DbPool>,
    db: web::Data<Database>,
    token: CsrfToken,
    config: web::Data<Config>,
    state: web::Data<AppState>,
    query: web::Query<DashboardQuery>,
) -> impl Responder {
    let mut ctx = Context::new();
    ctx.insert("admin_url_prefix", &config.admin_url_prefix);
    ctx.insert("user", &auth_user);
    ctx.insert("csrf_token", token.get());
    ctx.insert("image_host", state.image_host.name());
    ctx.insert("items_per_page_options", &ITEMS_PER_PAGE_OPTIONS);

    if let Ok(Some(notification)) = session.get::<Notification>("notification") {
        ctx.insert("notification", &notification);
        session.remove("notification");
    }

    let settings = match admin_helpers::load_settings(&pool) {
        Ok(settings) => settings,
        Err(e) => {
            log::error!("Could not load settings for dashboard: {}", e);
            admin_helpers::Settings {
                max_file_upload_size_mb: "0".to_string(),
                allowed_image_types: "".to_string(),
            }
        }
    };
    ctx.insert("settings", &settings);

    let request = PageRequest::from_query(query.page.as_deref(), query.limit.as_deref());
    match comics_db_operations::list_comics(&db, request) {
        Ok(page) => ctx.insert("comics", &page),
        Err(e) => {
            log::error!("Failed to fetch comics for admin dashboard: {}", e);
            ctx.insert("comics", &json!({ "items": [], "total_count": 0, "current_page": 1, "total_pages": 0, "has_more": false }));
        }
    }

    match tera.render("admin/dashboard.html", &ctx) {
        Ok(rendered) => HttpResponse::Ok().content_type("text/html; charset=utf-8").body(rendered),
        Err(err) => {
            log::error!("Template rendering error: {}", err);
            HttpResponse::InternalServerError().body("Error rendering admin dashboard.")
        }
    }
}

async fn update_settings_action(
    session: Session,
    pool: web::Data<DbPool>,
    form: Csrf<web::Form<SettingsForm>>,
    config: web::Data<Config>,
) -> impl Responder {
    let dashboard_url = format!("/management/{}/dashboard", &config.admin_url_prefix);

    let form = form.into_inner().into_inner();
    let payload = SettingsPayload {
        max_file_upload_size_mb: form.max_file_upload_size_mb,
        allowed_image_types: form.allowed_image_types,
    };

    match admin_helpers::update_settings(&pool, &payload) {
        Ok(_) => set_notification(&session, "Settings updated successfully.", "success"),
        Err(AdminHelperError::Validation(msg)) => set_notification(&session, &msg, "error"),
        Err(e) => {
            log::error!("Failed to update settings: {}", e);
            set_notification(&session, "Failed to update settings in database.", "error");
        }
    }
    redirect(dashboard_url)
}

// --- JSON API ---

async fn create_comic(
    db: web::Data<Database>,
    payload: web::Json<ComicPayload>,
) -> Result<HttpResponse, AdminHelperError> {
    let new_comic = admin_helpers::validate_new_comic(&payload)?;
    let id = comics_db_operations::create_comic(&db, &new_comic)?;
    let comic = comics_db_operations::read_comic(&db, &id)?;
    log::info!("Created comic '{}' ({})", new_comic.title, id);
    Ok(HttpResponse::Created().json(json!({ "success": true, "id": id, "comic": comic })))
}

async fn update_comic(
    id: web::Path<String>,
    db: web::Data<Database>,
    payload: web::Json<ComicPayload>,
) -> Result<HttpResponse, AdminHelperError> {
    let update = admin_helpers::validate_comic_update(&payload)?;
    comics_db_operations::update_comic(&db, &id, &update)?;
    let comic = comics_db_operations::read_comic(&db, &id)?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "comic": comic })))
}

async fn delete_comic(id: web::Path<String>, db: web::Data<Database>) -> Result<HttpResponse, AdminHelperError> {
    let removed = comics_db_operations::delete_comic(&db, &id)?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "deleted_chapters": removed })))
}

async fn create_chapter(
    id: web::Path<String>,
    db: web::Data<Database>,
    payload: web::Json<ChapterPayload>,
) -> Result<HttpResponse, AdminHelperError> {
    let new_chapter = admin_helpers::validate_new_chapter(&payload)?;
    let chapter_id = comics_db_operations::create_chapter(&db, &id, &new_chapter)?;
    Ok(HttpResponse::Created().json(json!({ "success": true, "id": chapter_id })))
}

async fn update_chapter(
    path: web::Path<(String, String)>,
    db: web::Data<Database>,
    payload: web::Json<ChapterPayload>,
) -> Result<HttpResponse, AdminHelperError> {
    let (comic_id, chapter_id) = path.into_inner();
    let update = admin_helpers::validate_chapter_update(&payload)?;
    comics_db_operations::update_chapter(&db, &comic_id, &chapter_id, &update)?;
    let chapter = comics_db_operations::read_chapter(&db, &comic_id, &chapter_id)?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "chapter": chapter })))
}

async fn delete_chapter(
    path: web::Path<(String, String)>,
    db: web::Data<Database>,
) -> Result<HttpResponse, AdminHelperError> {
    let (comic_id, chapter_id) = path.into_inner();
    comics_db_operations::delete_chapter(&db, &comic_id, &chapter_id)?;
    Ok(HttpResponse::Ok().json(json!({ "success": true })))
}

async fn delete_all_chapters(id: web::Path<String>, db: web::Data<Database>) -> Result<HttpResponse, AdminHelperError> {
    let removed = comics_db_operations::delete_all_chapters(&db, &id)?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "deleted_chapters": removed })))
}

fn upload_limits(pool: &DbPool) -> Result<UploadLimits, AdminHelperError> {
    let conn = pool.get()?;
    Ok(UploadLimits::from_settings(&conn))
}

async fn upload_chapter(
    id: web::Path<String>,
    db: web::Data<Database>,
    pool: web::Data<DbPool>,
    state: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse, AdminHelperError> {
    let limits = upload_limits(&pool)?;
    let form = upload_helpers::read_upload_form(payload, &limits, true).await?;
    let (chapter_id, page_count) = admin_helpers::create_chapter_from_upload(&db, &state, &id, form).await?;
    Ok(HttpResponse::Created().json(json!({ "success": true, "id": chapter_id, "page_count": page_count })))
}

async fn append_pages(
    path: web::Path<(String, String)>,
    db: web::Data<Database>,
    pool: web::Data<DbPool>,
    state: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse, AdminHelperError> {
    let (comic_id, chapter_id) = path.into_inner();
    let limits = upload_limits(&pool)?;
    let form = upload_helpers::read_upload_form(payload, &limits, true).await?;
    let urls = admin_helpers::append_pages_from_upload(&db, &state, &comic_id, &chapter_id, form).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "page_image_urls": urls })))
}

async fn move_chapter(
    path: web::Path<(String, String)>,
    db: web::Data<Database>,
    payload: web::Json<MovePayload>,
) -> Result<HttpResponse, AdminHelperError> {
    let (comic_id, chapter_id) = path.into_inner();
    let target = payload
        .target_comic_id
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AdminHelperError::Validation("target_comic_id is required.".to_string()))?;

    let number = comics_db_operations::move_chapter(&db, &comic_id, &chapter_id, target)?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "chapter_number": number })))
}

async fn renumber_chapters(id: web::Path<String>, db: web::Data<Database>) -> Result<HttpResponse, AdminHelperError> {
    let changed = comics_db_operations::renumber_chapters(&db, &id)?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "changed": changed })))
}

/// Plain image upload used by the cover/banner pickers and page editors.
/// With `single=true` only the first file is sent.
async fn upload_images(
    pool: web::Data<DbPool>,
    state: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse, AdminHelperError> {
    let limits = upload_limits(&pool)?;
    let mut form = upload_helpers::read_upload_form(payload, &limits, false).await?;
    let single = form.field("single") == Some("true");

    if single {
        form.files.truncate(1);
    }
    let urls = admin_helpers::upload_files(state.image_host.as_ref(), &form.files, None).await?;

    if single {
        Ok(HttpResponse::Ok().json(json!({ "success": true, "url": urls.first() })))
    } else {
        Ok(HttpResponse::Ok().json(json!({ "success": true, "urls": urls })))
    }
}

async fn get_settings(pool: web::Data<DbPool>) -> Result<HttpResponse, AdminHelperError> {
    let settings = admin_helpers::load_settings(&pool)?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "settings": settings })))
}

async fn post_settings(
    pool: web::Data<DbPool>,
    payload: web::Json<SettingsPayload>,
) -> Result<HttpResponse, AdminHelperError> {
    let settings = admin_helpers::update_settings(&pool, &payload)?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "settings": settings })))
}
