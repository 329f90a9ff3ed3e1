use crate::helper::pagination_helpers::parse_query_number;
use crate::helper::public_helpers;
use crate::helper::reader_helpers::ReadingMode;
use actix_web::{web, HttpResponse, Responder};
use redb::Database;
use serde::Deserialize;
use tera::{Context, Tera};

#[derive(Deserialize)]
pub struct ReaderQuery {
    mode: Option<String>,
    page: Option<String>,
}

pub fn config_reader(cfg: &mut web::ServiceConfig) {
    cfg.route("/read/{comic_id}/{chapter_id}", web::get().to(show_chapter));
}

async fn show_chapter(
    path: web::Path<(String, String)>,
    query: web::Query<ReaderQuery>,
    db: web::Data<Database>,
    tera: web::Data<Tera>,
) -> impl Responder {
    let (comic_id, chapter_id) = path.into_inner();

    let mode = ReadingMode::from_param(query.mode.as_deref());
    let page = parse_query_number(query.page.as_deref()).map(|p| p as usize);

    let view = match public_helpers::load_reader_view(&db, &comic_id, &chapter_id, mode, page) {
        Ok(Some(view)) => view,
        Ok(None) => {
            return HttpResponse::NotFound()
                .content_type("text/html; charset=utf-8")
                .body("<p>Chapter not found</p>")
        }
        Err(e) => {
            log::error!("Failed to load chapter {} of {}: {}", chapter_id, comic_id, e);
            return HttpResponse::InternalServerError().body("Error loading chapter.");
        }
    };

    let mut ctx = Context::new();
    ctx.insert("view", &view);
    ctx.insert("mode", view.mode.as_str());

    match tera.render("reader/chapter.html", &ctx) {
        Ok(rendered) => HttpResponse::Ok().content_type("text/html; charset=utf-8").body(rendered),
        Err(err) => {
            log::error!("Template rendering error: {}", err);
            HttpResponse::InternalServerError().body("Error rendering chapter.")
        }
    }
}
