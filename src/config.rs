use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::env;
use config; // Explicitly import the config crate

#[derive(Debug, Deserialize, Clone)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub web: WebConfig,
    // These fields will be populated from the .env file
    pub database_path: String,
    pub media_path: String,
    pub allowed_origins: String,
    pub log_level: String,
    pub session_secret_key: String,
    pub admin_url_prefix: String,
    pub use_secure_cookies: bool,
    /// One of `local`, `imgbb` or `cloudinary`.
    pub image_host: String,
    pub imgbb_api_key: Option<String>,
    pub cloudinary_cloud_name: Option<String>,
    pub cloudinary_upload_preset: Option<String>,
    pub pdfium_library_path: Option<String>,
    pub pdf_render_scale: f64,
    pub pdf_jpeg_quality: f64,
}

fn required_var(name: &str) -> Result<String, config::ConfigError> {
    env::var(name).map_err(|_| config::ConfigError::Message(format!(
        "FATAL: Environment variable '{}' is not set in your .env file.", name
    )))
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl Config {
    pub fn from_env(env_path: &Path) -> Result<Self, config::ConfigError> {
        // Load the specified .env file. Propagate an error if it fails.
        dotenvy::from_path(env_path)
            .map_err(|e| config::ConfigError::Message(format!(
                "FATAL: Failed to load .env file from '{}'. Error: {}", env_path.display(), e
            )))?;

        let database_path = required_var("DATABASE_PATH")?;
        let media_path = required_var("MEDIA_PATH")?;
        let session_secret_key = required_var("SESSION_SECRET_KEY")?;

        // 128 hex characters decode to the 64-byte cookie key.
        if session_secret_key.len() != 128 || !session_secret_key.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(config::ConfigError::Message(
                "FATAL: 'SESSION_SECRET_KEY' must be 128 hexadecimal characters long (64 bytes).".to_string()
            ));
        }

        let admin_url_prefix = required_var("ADMIN_URL_PREFIX")?;
        if admin_url_prefix.is_empty() || !admin_url_prefix.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
            return Err(config::ConfigError::Message(
                "FATAL: 'ADMIN_URL_PREFIX' must not be empty and can only contain letters, numbers, underscores, and hyphens.".to_string()
            ));
        }

        let allowed_origins = env::var("ALLOWED_ORIGINS").unwrap_or_else(|_| "".to_string());
        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let use_secure_cookies = env::var("USE_SECURE_COOKIES")
            .unwrap_or_else(|_| "false".to_string())
            .parse::<bool>()
            .unwrap_or(false);

        let image_host = optional_var("IMAGE_HOST").unwrap_or_else(|| "local".to_string()).to_lowercase();
        let imgbb_api_key = optional_var("IMGBB_API_KEY");
        let cloudinary_cloud_name = optional_var("CLOUDINARY_CLOUD_NAME");
        let cloudinary_upload_preset = optional_var("CLOUDINARY_UPLOAD_PRESET");

        match image_host.as_str() {
            "local" => {}
            "imgbb" if imgbb_api_key.is_none() => {
                return Err(config::ConfigError::Message(
                    "FATAL: IMAGE_HOST=imgbb requires 'IMGBB_API_KEY'.".to_string()
                ));
            }
            "imgbb" => {}
            "cloudinary" if cloudinary_cloud_name.is_none() || cloudinary_upload_preset.is_none() => {
                return Err(config::ConfigError::Message(
                    "FATAL: IMAGE_HOST=cloudinary requires 'CLOUDINARY_CLOUD_NAME' and 'CLOUDINARY_UPLOAD_PRESET'.".to_string()
                ));
            }
            "cloudinary" => {}
            other => {
                return Err(config::ConfigError::Message(format!(
                    "FATAL: Unknown IMAGE_HOST '{}'. Use 'local', 'imgbb' or 'cloudinary'.", other
                )));
            }
        }

        let pdf_render_scale = optional_var("PDF_RENDER_SCALE")
            .map(|v| v.parse::<f64>())
            .transpose()
            .map_err(|_| config::ConfigError::Message("FATAL: 'PDF_RENDER_SCALE' must be a number.".to_string()))?
            .unwrap_or(2.0);
        let pdf_jpeg_quality = optional_var("PDF_JPEG_QUALITY")
            .map(|v| v.parse::<f64>())
            .transpose()
            .map_err(|_| config::ConfigError::Message("FATAL: 'PDF_JPEG_QUALITY' must be a number.".to_string()))?
            .unwrap_or(0.9);

        if !(0.1..=1.0).contains(&pdf_jpeg_quality) {
            return Err(config::ConfigError::Message(
                "FATAL: 'PDF_JPEG_QUALITY' must be between 0.1 and 1.0.".to_string()
            ));
        }
        if !(pdf_render_scale > 0.0 && pdf_render_scale <= 8.0) {
            return Err(config::ConfigError::Message(
                "FATAL: 'PDF_RENDER_SCALE' must be greater than 0 and at most 8.".to_string()
            ));
        }

        if Path::new(&database_path).is_relative() {
            return Err(config::ConfigError::Message(format!(
                "FATAL: The 'DATABASE_PATH' in your .env file is a relative path ('{}'). It MUST be an absolute path.",
                database_path
            )));
        }

        if Path::new(&media_path).is_relative() {
            return Err(config::ConfigError::Message(format!(
                "FATAL: The 'MEDIA_PATH' in your .env file is a relative path ('{}'). It MUST be an absolute path.",
                media_path
            )));
        }

        let mut builder = config::Config::builder()
            // Base settings (web host/port) come from the TOML file.
            .add_source(config::File::new("config/default.toml", config::FileFormat::Toml))
            .set_override("database_path", database_path)?
            .set_override("media_path", media_path)?
            .set_override("session_secret_key", session_secret_key)?
            .set_override("allowed_origins", allowed_origins)?
            .set_override("log_level", log_level)?
            .set_override("use_secure_cookies", use_secure_cookies)?
            .set_override("admin_url_prefix", admin_url_prefix)?
            .set_override("image_host", image_host)?
            .set_override("pdf_render_scale", pdf_render_scale)?
            .set_override("pdf_jpeg_quality", pdf_jpeg_quality)?;

        for (key, value) in [
            ("imgbb_api_key", imgbb_api_key),
            ("cloudinary_cloud_name", cloudinary_cloud_name),
            ("cloudinary_upload_preset", cloudinary_upload_preset),
            ("pdfium_library_path", optional_var("PDFIUM_LIBRARY_PATH")),
        ] {
            if let Some(value) = value {
                builder = builder.set_override(key, value)?;
            }
        }

        builder.build()?.try_deserialize()
    }

    /// Returns the full path to the users database file inside its own folder.
    pub fn users_db_path(&self) -> PathBuf {
        PathBuf::from(&self.database_path)
            .join("users")
            .join("users.db")
    }

    /// Returns the full path to the comics database file inside its own folder.
    pub fn comics_db_path(&self) -> PathBuf {
        PathBuf::from(&self.database_path)
            .join("comics")
            .join("comics.db")
    }
}
