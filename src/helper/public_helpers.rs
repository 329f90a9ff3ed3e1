use crate::helper::pagination_helpers::{Page, PageRequest};
use crate::helper::reader_helpers::{self, ReaderView, ReadingMode};
use crate::models::db_operations::comics_db_operations::{self, DbError};
use crate::models::{Chapter, ChapterOrder, Comic, LatestChapter};
use redb::Database;

/// What a listing request asked for. A non-empty search wins over a genre;
/// with neither, the plain newest-first listing is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComicFilter {
    All,
    Search(String),
    Genre(String),
}

impl ComicFilter {
    pub fn from_query(search: Option<&str>, genre: Option<&str>) -> Self {
        let search = search.map(str::trim).filter(|s| !s.is_empty());
        let genre = genre.map(str::trim).filter(|g| !g.is_empty());
        match (search, genre) {
            (Some(term), _) => ComicFilter::Search(term.to_string()),
            (None, Some(genre)) => ComicFilter::Genre(genre.to_string()),
            (None, None) => ComicFilter::All,
        }
    }
}

pub fn fetch_comics(db: &Database, filter: &ComicFilter, request: PageRequest) -> Result<Page<Comic>, DbError> {
    match filter {
        ComicFilter::All => comics_db_operations::list_comics(db, request),
        ComicFilter::Search(term) => comics_db_operations::search_comics(db, term, request),
        ComicFilter::Genre(genre) => comics_db_operations::comics_by_genre(db, genre, request),
    }
}

pub fn fetch_comic_by_id(db: &Database, id: &str) -> Result<Option<Comic>, DbError> {
    comics_db_operations::read_comic(db, id)
}

/// `None` when the comic itself does not exist, so callers can 404.
pub fn fetch_chapters(db: &Database, comic_id: &str, order: ChapterOrder) -> Result<Option<Vec<Chapter>>, DbError> {
    if comics_db_operations::read_comic(db, comic_id)?.is_none() {
        return Ok(None);
    }
    comics_db_operations::chapters_for_comic(db, comic_id, order).map(Some)
}

pub fn fetch_chapter(db: &Database, comic_id: &str, chapter_id: &str) -> Result<Option<Chapter>, DbError> {
    comics_db_operations::read_chapter(db, comic_id, chapter_id)
}

/// `None` for an unknown comic and for a comic with no chapters yet.
pub fn fetch_latest_chapter(db: &Database, comic_id: &str) -> Result<Option<LatestChapter>, DbError> {
    comics_db_operations::latest_chapter(db, comic_id)
}

pub fn fetch_all_genres(db: &Database) -> Result<Vec<String>, DbError> {
    comics_db_operations::all_genres(db)
}

pub fn load_reader_view(
    db: &Database,
    comic_id: &str,
    chapter_id: &str,
    mode: ReadingMode,
    page: Option<usize>,
) -> Result<Option<ReaderView>, DbError> {
    let comic = match comics_db_operations::read_comic(db, comic_id)? {
        Some(comic) => comic,
        None => return Ok(None),
    };
    let chapters = comics_db_operations::chapters_for_comic(db, comic_id, ChapterOrder::Asc)?;
    Ok(reader_helpers::build_reader_view(&comic, &chapters, chapter_id, mode, page))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_takes_precedence_over_genre() {
        assert_eq!(
            ComicFilter::from_query(Some(" hero "), Some("Action")),
            ComicFilter::Search("hero".to_string())
        );
        assert_eq!(ComicFilter::from_query(Some("  "), Some("Action")), ComicFilter::Genre("Action".to_string()));
        assert_eq!(ComicFilter::from_query(None, Some("")), ComicFilter::All);
    }
}
