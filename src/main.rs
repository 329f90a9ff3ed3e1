use actix_cors::Cors;
use actix_csrf::CsrfMiddleware;
use actix_session::{storage::CookieSessionStore, SessionMiddleware};
use actix_web::{
    cookie::Key,
    middleware::{DefaultHeaders, Logger},
    web, App, HttpResponse, HttpServer, Responder,
};
use clap::Parser;
use comicbase::{config::Config, middleware::RequireAdmin, routes, AppState};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rand::prelude::StdRng;
use redb::Database;
use std::convert::TryFrom;
use std::fs;
use std::io::{Error as IoError, ErrorKind};
use std::path::PathBuf;
use tera::Tera;

/// A simple handler for the root URL.
async fn root_handler() -> impl Responder {
    HttpResponse::Ok().content_type("text/plain").body("OK")
}

#[derive(Parser, Debug)]
#[command(name = "comicbase_server", author, version, about = "Starts the ComicBase web server.")]
struct Cli {
    /// Path to the .env configuration file.
    #[arg(long, required = true, value_name = "FILE")]
    env_file: PathBuf,
}

fn fatal(message: impl Into<String>) -> IoError {
    IoError::new(ErrorKind::Other, message.into())
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let cli = Cli::parse();

    // Load configuration first
    let config = Config::from_env(&cli.env_file)
        .map_err(|e| fatal(format!("FATAL: Failed to load or parse configuration: {}", e)))?;

    // Initialize logger using the value from config
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(&config.log_level));

    let tera = Tera::new("templates/**/*.html")
        .map_err(|e| fatal(format!("FATAL: Tera initialization failed: {}", e)))?;

    fs::create_dir_all(&config.database_path)?;
    fs::create_dir_all(&config.media_path)?;

    let comics_db = Database::open(config.comics_db_path()).map_err(|e| {
        fatal(format!(
            "FATAL: comics.db could not be opened ({}). Run 'cargo run --bin setup_cli -- --env-file <path> db setup'",
            e
        ))
    })?;
    let redb_db_data = web::Data::new(comics_db);

    let manager = SqliteConnectionManager::file(config.users_db_path());
    let pool = Pool::builder()
        .build(manager)
        .map_err(|e| fatal(format!("FATAL: Failed to create Rusqlite connection pool: {}", e)))?;

    let app_state = web::Data::new(AppState::from_config(&config));
    log::info!("Uploading page images via '{}'", app_state.image_host.name());
    match &config.pdfium_library_path {
        Some(path) => log::info!("PDF ingestion will bind pdfium from '{}'", path),
        None => log::info!("PDF ingestion will bind the system pdfium library"),
    }

    let session_key_bytes = hex::decode(&config.session_secret_key)
        .map_err(|_| fatal("FATAL: SESSION_SECRET_KEY in .env is not a valid hex string."))?;
    let session_key = Key::try_from(session_key_bytes.as_slice())
        .map_err(|_| fatal("FATAL: The decoded SESSION_SECRET_KEY is not long enough (minimum 64 bytes required)."))?;

    let server_address = format!("{}:{}", config.web.host, config.web.port);
    log::info!("Server starting at http://{}", server_address);

    HttpServer::new(move || {
        let session_mw = SessionMiddleware::builder(CookieSessionStore::default(), session_key.clone())
            .cookie_secure(config.use_secure_cookies)
            .cookie_http_only(true)
            .cookie_same_site(actix_web::cookie::SameSite::Lax)
            .build();

        let cors = {
            let allowed_origins_str = &config.allowed_origins;
            let cors = if allowed_origins_str.trim() == "*" {
                Cors::default().allow_any_origin()
            } else {
                allowed_origins_str
                    .split(',')
                    .map(|s| s.trim())
                    .filter(|s| !s.is_empty())
                    .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
            };
            cors.allowed_methods(vec!["GET", "POST", "PUT", "DELETE"])
                .allowed_headers(vec![
                    actix_web::http::header::AUTHORIZATION,
                    actix_web::http::header::ACCEPT,
                    actix_web::http::header::CONTENT_TYPE,
                ])
                .supports_credentials()
                .max_age(3600)
        };

        let admin_url_prefix = config.admin_url_prefix.clone();
        let login_path = format!("/management/{}/login", admin_url_prefix);

        App::new()
            .wrap(cors)
            .wrap(Logger::default())
            .wrap(
                DefaultHeaders::new()
                    .add(("X-Content-Type-Options", "nosniff"))
                    .add(("X-Frame-Options", "DENY"))
                    .add(("X-XSS-Protection", "1; mode=block")),
            )
            .app_data(web::Data::new(config.clone()))
            .app_data(web::Data::new(tera.clone()))
            .app_data(redb_db_data.clone())
            .app_data(web::Data::new(pool.clone()))
            .app_data(app_state.clone())
            .configure(routes::public::config_api)
            .configure(routes::reader::config_reader)
            .service(actix_files::Files::new("/media", &config.media_path))
            .route("/", web::get().to(root_handler))
            .service(
                web::scope("")
                    .wrap(session_mw)
                    .service(
                        web::scope(&format!("/management/{}", admin_url_prefix))
                            .wrap(
                                CsrfMiddleware::<StdRng>::new()
                                    .set_cookie(actix_web::http::Method::GET, login_path.clone())
                                    .set_cookie(
                                        actix_web::http::Method::GET,
                                        format!("/management/{}/dashboard", admin_url_prefix),
                                    ),
                            )
                            .configure(routes::admin::config_login)
                            .service(
                                web::scope("")
                                    .wrap(RequireAdmin::new(login_path))
                                    .configure(routes::admin::config_dashboard),
                            ),
                    ),
            )
    })
    .bind(server_address)?
    .run()
    .await
}
