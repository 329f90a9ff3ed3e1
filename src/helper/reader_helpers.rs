use crate::models::{Chapter, Comic};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingMode {
    #[default]
    Paged,
    Continuous,
}

impl ReadingMode {
    /// Unknown or missing values read as paged.
    pub fn from_param(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("continuous") => ReadingMode::Continuous,
            _ => ReadingMode::Paged,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingMode::Paged => "paged",
            ReadingMode::Continuous => "continuous",
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChapterLink {
    pub id: String,
    pub chapter_number: u32,
    pub title: Option<String>,
    pub page_count: usize,
}

impl From<&Chapter> for ChapterLink {
    fn from(chapter: &Chapter) -> Self {
        ChapterLink {
            id: chapter.id.clone(),
            chapter_number: chapter.record.chapter_number,
            title: chapter.record.title.clone(),
            page_count: chapter.record.page_image_urls.len(),
        }
    }
}

/// Everything the reader template needs for one request.
#[derive(Debug, Serialize)]
pub struct ReaderView {
    pub comic_id: String,
    pub comic_title: String,
    pub chapter: ChapterLink,
    pub mode: ReadingMode,
    pub pages: Vec<String>,
    /// The single image shown in paged mode.
    pub current_image: Option<String>,
    pub current_page: usize,
    pub total_pages: usize,
    pub prev_chapter: Option<ChapterLink>,
    pub next_chapter: Option<ChapterLink>,
    pub prev_url: Option<String>,
    pub next_url: Option<String>,
    pub chapters: Vec<ChapterLink>,
}

pub fn reader_url(comic_id: &str, chapter_id: &str, mode: ReadingMode, page: Option<usize>) -> String {
    match (mode, page) {
        (ReadingMode::Paged, Some(page)) => format!("/read/{}/{}?mode=paged&page={}", comic_id, chapter_id, page),
        _ => format!("/read/{}/{}?mode={}", comic_id, chapter_id, mode.as_str()),
    }
}

/// Clamps a 1-based page request into 1..=total. An empty chapter sits on page 1.
pub fn clamp_page(requested: Option<usize>, total: usize) -> usize {
    requested.unwrap_or(1).clamp(1, total.max(1))
}

/// `chapters` must already be in ascending chapter order.
pub fn build_reader_view(
    comic: &Comic,
    chapters: &[Chapter],
    chapter_id: &str,
    mode: ReadingMode,
    requested_page: Option<usize>,
) -> Option<ReaderView> {
    let index = chapters.iter().position(|c| c.id == chapter_id)?;
    let current = &chapters[index];
    let prev = index.checked_sub(1).and_then(|i| chapters.get(i));
    let next = chapters.get(index + 1);

    let pages = current.record.page_image_urls.clone();
    let total_pages = pages.len();
    let current_page = clamp_page(requested_page, total_pages);

    let chapter_start = |c: &Chapter| reader_url(&comic.id, &c.id, mode, Some(1));
    let chapter_end = |c: &Chapter| {
        reader_url(&comic.id, &c.id, mode, Some(c.record.page_image_urls.len().max(1)))
    };

    let (prev_url, next_url) = match mode {
        ReadingMode::Continuous => (prev.map(chapter_start), next.map(chapter_start)),
        ReadingMode::Paged => {
            let prev_url = if current_page > 1 {
                Some(reader_url(&comic.id, &current.id, mode, Some(current_page - 1)))
            } else {
                prev.map(chapter_end)
            };
            let next_url = if current_page < total_pages {
                Some(reader_url(&comic.id, &current.id, mode, Some(current_page + 1)))
            } else {
                next.map(chapter_start)
            };
            (prev_url, next_url)
        }
    };

    Some(ReaderView {
        comic_id: comic.id.clone(),
        comic_title: comic.record.title.clone(),
        chapter: ChapterLink::from(current),
        mode,
        current_image: pages.get(current_page - 1).cloned(),
        pages,
        current_page,
        total_pages,
        prev_chapter: prev.map(ChapterLink::from),
        next_chapter: next.map(ChapterLink::from),
        prev_url,
        next_url,
        chapters: chapters.iter().map(ChapterLink::from).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChapterRecord, ComicRecord};
    use chrono::Utc;

    fn comic() -> Comic {
        let now = Utc::now();
        Comic {
            id: "c1".into(),
            record: ComicRecord {
                title: "Night Shift".into(),
                description: "d".into(),
                author: "a".into(),
                genre: "Drama".into(),
                cover_image_url: "/cover.jpg".into(),
                banner_image_url: None,
                created_at: now,
                updated_at: now,
            },
            latest_chapter: None,
        }
    }

    fn chapter(id: &str, number: u32, pages: usize) -> Chapter {
        let now = Utc::now();
        Chapter {
            id: id.into(),
            record: ChapterRecord {
                comic_id: "c1".into(),
                chapter_number: number,
                title: None,
                page_image_urls: (1..=pages).map(|p| format!("/p/{}/{}.jpg", id, p)).collect(),
                created_at: now,
                updated_at: now,
            },
        }
    }

    fn chapters() -> Vec<Chapter> {
        vec![chapter("a", 1, 3), chapter("b", 2, 2), chapter("c", 3, 4)]
    }

    #[test]
    fn mode_param_defaults_to_paged() {
        assert_eq!(ReadingMode::from_param(Some("Continuous")), ReadingMode::Continuous);
        assert_eq!(ReadingMode::from_param(Some("sideways")), ReadingMode::Paged);
        assert_eq!(ReadingMode::from_param(None), ReadingMode::Paged);
    }

    #[test]
    fn page_is_clamped() {
        assert_eq!(clamp_page(None, 5), 1);
        assert_eq!(clamp_page(Some(0), 5), 1);
        assert_eq!(clamp_page(Some(9), 5), 5);
        assert_eq!(clamp_page(Some(3), 0), 1);
    }

    #[test]
    fn middle_page_moves_within_the_chapter() {
        let view = build_reader_view(&comic(), &chapters(), "c", ReadingMode::Paged, Some(2)).unwrap();
        assert_eq!(view.prev_url.as_deref(), Some("/read/c1/c?mode=paged&page=1"));
        assert_eq!(view.next_url.as_deref(), Some("/read/c1/c?mode=paged&page=3"));
        assert_eq!(view.current_image.as_deref(), Some("/p/c/2.jpg"));
    }

    #[test]
    fn chapter_edges_cross_into_neighbours() {
        let view = build_reader_view(&comic(), &chapters(), "b", ReadingMode::Paged, Some(1)).unwrap();
        // Previous chapter opens on its last page.
        assert_eq!(view.prev_url.as_deref(), Some("/read/c1/a?mode=paged&page=3"));

        let view = build_reader_view(&comic(), &chapters(), "b", ReadingMode::Paged, Some(2)).unwrap();
        assert_eq!(view.next_url.as_deref(), Some("/read/c1/c?mode=paged&page=1"));
    }

    #[test]
    fn first_and_last_chapters_stop() {
        let first = build_reader_view(&comic(), &chapters(), "a", ReadingMode::Paged, None).unwrap();
        assert!(first.prev_url.is_none());
        assert!(first.prev_chapter.is_none());

        let last = build_reader_view(&comic(), &chapters(), "c", ReadingMode::Paged, Some(99)).unwrap();
        assert_eq!(last.current_page, 4);
        assert!(last.next_url.is_none());
    }

    #[test]
    fn continuous_mode_links_whole_chapters() {
        let view = build_reader_view(&comic(), &chapters(), "b", ReadingMode::Continuous, Some(2)).unwrap();
        assert_eq!(view.pages.len(), 2);
        assert_eq!(view.prev_url.as_deref(), Some("/read/c1/a?mode=continuous"));
        assert_eq!(view.next_url.as_deref(), Some("/read/c1/c?mode=continuous"));
    }

    #[test]
    fn unknown_chapter_has_no_view() {
        assert!(build_reader_view(&comic(), &chapters(), "zzz", ReadingMode::Paged, None).is_none());
    }
}
