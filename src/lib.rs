use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::Config;
use crate::helper::image_host_helpers::{self, ImageHost};
use crate::helper::pdf_helpers::PdfConversionOptions;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Process-wide services shared by every worker.
pub struct AppState {
    pub image_host: Arc<dyn ImageHost>,
    pub pdf_options: PdfConversionOptions,
    pub pdfium_library_path: Option<String>,
}

impl AppState {
    pub fn from_config(config: &Config) -> Self {
        AppState {
            image_host: image_host_helpers::build_image_host(config),
            pdf_options: PdfConversionOptions {
                scale: config.pdf_render_scale as f32,
                quality: config.pdf_jpeg_quality as f32,
            },
            pdfium_library_path: config.pdfium_library_path.clone(),
        }
    }
}

pub mod config;
pub mod helper;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod setup;
