use crate::helper::pagination_helpers::PageRequest;
use crate::helper::public_helpers::{self, ComicFilter};
use crate::models::ChapterOrder;
use actix_web::{error::InternalError, web, HttpResponse, Responder};
use redb::Database;
use serde::Deserialize;
use serde_json::json;

// page and limit stay strings so junk values fall back instead of failing.
#[derive(Deserialize)]
pub struct ComicsQuery {
    search: Option<String>,
    genre: Option<String>,
    page: Option<String>,
    limit: Option<String>,
}

#[derive(Deserialize)]
pub struct ChaptersQuery {
    #[serde(default)]
    order: ChapterOrder,
}

pub fn config_api(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .app_data(web::QueryConfig::default().error_handler(|err, _req| {
                let response = HttpResponse::BadRequest().json(json!({ "error": format!("Invalid query: {}", err) }));
                InternalError::from_response(err, response).into()
            }))
            .route("/is_server_active", web::get().to(is_server_active))
            .route("/comics", web::get().to(get_comics))
            .route("/comics/{id}", web::get().to(get_comic_by_id))
            .route("/comics/{id}/chapters", web::get().to(get_chapters))
            .route("/comics/{id}/chapters/latest", web::get().to(get_latest_chapter))
            .route("/comics/{id}/chapters/{chapter_id}", web::get().to(get_chapter))
            .route("/genres", web::get().to(get_genres)),
    );
}

fn not_found(what: &str) -> HttpResponse {
    HttpResponse::NotFound().json(json!({ "error": format!("{} not found", what) }))
}

fn internal_error() -> HttpResponse {
    HttpResponse::InternalServerError().json(json!({ "error": "Internal server error" }))
}

async fn is_server_active() -> impl Responder {
    HttpResponse::Ok().body("active")
}

async fn get_comics(db: web::Data<Database>, query: web::Query<ComicsQuery>) -> impl Responder {
    let filter = ComicFilter::from_query(query.search.as_deref(), query.genre.as_deref());
    let request = PageRequest::from_query(query.page.as_deref(), query.limit.as_deref());

    match public_helpers::fetch_comics(&db, &filter, request) {
        Ok(page) => HttpResponse::Ok().json(page),
        Err(e) => {
            log::error!("Failed to list comics ({:?}): {}", filter, e);
            internal_error()
        }
    }
}

async fn get_comic_by_id(id: web::Path<String>, db: web::Data<Database>) -> impl Responder {
    match public_helpers::fetch_comic_by_id(&db, &id) {
        Ok(Some(comic)) => HttpResponse::Ok().json(comic),
        Ok(None) => not_found("Comic"),
        Err(e) => {
            log::error!("Failed to read comic {}: {}", id, e);
            internal_error()
        }
    }
}

async fn get_chapters(
    id: web::Path<String>,
    db: web::Data<Database>,
    query: web::Query<ChaptersQuery>,
) -> impl Responder {
    match public_helpers::fetch_chapters(&db, &id, query.order) {
        Ok(Some(chapters)) => HttpResponse::Ok().json(chapters),
        Ok(None) => not_found("Comic"),
        Err(e) => {
            log::error!("Failed to list chapters of {}: {}", id, e);
            internal_error()
        }
    }
}

async fn get_latest_chapter(id: web::Path<String>, db: web::Data<Database>) -> impl Responder {
    match public_helpers::fetch_latest_chapter(&db, &id) {
        Ok(Some(latest)) => HttpResponse::Ok().json(latest),
        Ok(None) => not_found("Chapter"),
        Err(e) => {
            log::error!("Failed to read latest chapter of {}: {}", id, e);
            internal_error()
        }
    }
}

async fn get_chapter(path: web::Path<(String, String)>, db: web::Data<Database>) -> impl Responder {
    let (comic_id, chapter_id) = path.into_inner();
    match public_helpers::fetch_chapter(&db, &comic_id, &chapter_id) {
        Ok(Some(chapter)) => HttpResponse::Ok().json(chapter),
        Ok(None) => not_found("Chapter"),
        Err(e) => {
            log::error!("Failed to read chapter {} of {}: {}", chapter_id, comic_id, e);
            internal_error()
        }
    }
}

async fn get_genres(db: web::Data<Database>) -> impl Responder {
    match public_helpers::fetch_all_genres(&db) {
        Ok(genres) => HttpResponse::Ok().json(genres),
        Err(e) => {
            log::error!("Failed to fetch genres: {}", e);
            internal_error()
        }
    }
}
