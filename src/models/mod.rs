use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stored form of a comic. The id is the table key and the latest chapter is
/// derived on read, so neither lives here.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ComicRecord {
    pub title: String,
    pub description: String,
    pub author: String,
    pub genre: String, // comma-separated, e.g. "Action, Fantasy"
    pub cover_image_url: String,
    pub banner_image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LatestChapter {
    pub id: String,
    pub number: u32,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Clone)]
pub struct Comic {
    pub id: String,
    #[serde(flatten)]
    pub record: ComicRecord,
    pub latest_chapter: Option<LatestChapter>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChapterRecord {
    pub comic_id: String,
    pub chapter_number: u32,
    pub title: Option<String>,
    pub page_image_urls: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Clone)]
pub struct Chapter {
    pub id: String,
    #[serde(flatten)]
    pub record: ChapterRecord,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NewComic {
    pub title: String,
    pub description: String,
    pub author: String,
    pub genre: String,
    pub cover_image_url: String,
    pub banner_image_url: Option<String>,
}

/// Partial comic edit. Absent fields keep their stored value.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ComicUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub genre: Option<String>,
    pub cover_image_url: Option<String>,
    pub banner_image_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NewChapter {
    pub chapter_number: u32,
    pub title: Option<String>,
    pub page_image_urls: Vec<String>,
}

/// Partial chapter edit. `page_image_urls` replaces the whole list, which is
/// how reordered, deleted and appended pages all arrive.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ChapterUpdate {
    pub chapter_number: Option<u32>,
    pub title: Option<String>,
    pub page_image_urls: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChapterOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }

    pub fn parse(value: &str) -> Option<Role> {
        match value {
            "admin" => Some(Role::Admin),
            "user" => Some(Role::User),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct User {
    pub id: i32,
    pub email: String,
    pub role: Role,
    pub is_active: bool,
    pub last_login_time: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Notification {
    pub message: String,
    pub r#type: String, // 'success' or 'error'
}

pub mod db_operations;
