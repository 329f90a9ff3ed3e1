use crate::helper::pagination_helpers::{paginate, Page, PageRequest};
use crate::models::{
    Chapter, ChapterOrder, ChapterRecord, ChapterUpdate, Comic, ComicRecord, ComicUpdate,
    LatestChapter, NewChapter, NewComic,
};
use chrono::{DateTime, Utc};
use redb::{
    CommitError, Database, ReadTransaction, ReadableTable, StorageError, TableDefinition,
    TableError, TransactionError, WriteTransaction,
};
use std::collections::{BTreeSet, HashSet};
use std::ops::RangeInclusive;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Redb storage error: {0}")]
    RedbStorage(#[from] StorageError),
    #[error("Redb transaction error: {0}")]
    RedbTransaction(#[from] TransactionError),
    #[error("Redb table error: {0}")]
    RedbTable(#[from] TableError),
    #[error("Redb commit error: {0}")]
    RedbCommit(#[from] CommitError),
    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("Item not found in database: {0}")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub const COMICS: TableDefinition<&[u8; 16], &str> = TableDefinition::new("comics");
// Keyed by negated updated_at millis so a forward scan is newest first.
pub const COMIC_UPDATED_INDEX: TableDefinition<(i64, &[u8; 16]), ()> = TableDefinition::new("comic_updated_index");
pub const GENRE_INDEX: TableDefinition<(&str, &[u8; 16]), ()> = TableDefinition::new("genre_index");

pub const CHAPTERS: TableDefinition<&[u8; 16], &str> = TableDefinition::new("chapters");
// (comic id, chapter number, chapter id)
pub const CHAPTER_INDEX: TableDefinition<(&[u8; 16], u32, &[u8; 16]), ()> = TableDefinition::new("chapter_index");

/// Splits a comic's genre string into its tags: trimmed, non-empty, first
/// occurrence wins.
pub fn split_genres(genre: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    genre
        .split(',')
        .map(|g| g.trim())
        .filter(|g| !g.is_empty())
        .filter(|g| seen.insert(g.to_string()))
        .map(str::to_string)
        .collect()
}

fn parse_id(id: &str) -> Result<[u8; 16], DbError> {
    Uuid::parse_str(id)
        .map(|uuid| uuid.into_bytes())
        .map_err(|_| DbError::NotFound(id.to_string()))
}

fn id_string(bytes: &[u8; 16]) -> String {
    Uuid::from_bytes(*bytes).to_string()
}

fn updated_key(timestamp: &DateTime<Utc>) -> i64 {
    -timestamp.timestamp_millis()
}

fn chapter_range(comic: &[u8; 16]) -> RangeInclusive<(&[u8; 16], u32, &[u8; 16])> {
    (comic, 0u32, &[0u8; 16])..=(comic, u32::MAX, &[255u8; 16])
}

// ====================================================================
// ======================= TRANSACTION HELPERS ========================
// ====================================================================

fn load_comic_record(txn: &WriteTransaction, id: &[u8; 16]) -> Result<ComicRecord, DbError> {
    let comics = txn.open_table(COMICS)?;
    let guard = comics
        .get(id)?
        .ok_or_else(|| DbError::NotFound(format!("Comic {}", id_string(id))))?;
    let record: ComicRecord = serde_json::from_str(guard.value())?;
    Ok(record)
}

/// Writes a comic and keeps its updated and genre index entries in step.
fn store_comic_record(
    txn: &WriteTransaction,
    id: &[u8; 16],
    old: Option<&ComicRecord>,
    new: &ComicRecord,
) -> Result<(), DbError> {
    let json = serde_json::to_string(new)?;

    let mut comics = txn.open_table(COMICS)?;
    let mut updated_index = txn.open_table(COMIC_UPDATED_INDEX)?;
    let mut genre_index = txn.open_table(GENRE_INDEX)?;

    comics.insert(id, json.as_str())?;

    if let Some(old) = old {
        updated_index.remove((updated_key(&old.updated_at), id))?;
        for genre in split_genres(&old.genre) {
            genre_index.remove((genre.as_str(), id))?;
        }
    }
    updated_index.insert((updated_key(&new.updated_at), id), ())?;
    for genre in split_genres(&new.genre) {
        genre_index.insert((genre.as_str(), id), ())?;
    }
    Ok(())
}

fn touch_comic(txn: &WriteTransaction, id: &[u8; 16], now: DateTime<Utc>) -> Result<(), DbError> {
    let old = load_comic_record(txn, id)?;
    let mut new = old.clone();
    new.updated_at = now;
    store_comic_record(txn, id, Some(&old), &new)
}

/// Loads a chapter and checks it belongs to `comic`.
fn load_chapter_record(
    txn: &WriteTransaction,
    comic: &[u8; 16],
    chapter: &[u8; 16],
) -> Result<ChapterRecord, DbError> {
    let chapters = txn.open_table(CHAPTERS)?;
    let guard = chapters
        .get(chapter)?
        .ok_or_else(|| DbError::NotFound(format!("Chapter {}", id_string(chapter))))?;
    let record: ChapterRecord = serde_json::from_str(guard.value())?;

    if record.comic_id != id_string(comic) {
        return Err(DbError::NotFound(format!(
            "Chapter {} in comic {}",
            id_string(chapter),
            id_string(comic)
        )));
    }
    Ok(record)
}

fn store_chapter_record(
    txn: &WriteTransaction,
    id: &[u8; 16],
    old: Option<&ChapterRecord>,
    new: &ChapterRecord,
) -> Result<(), DbError> {
    let json = serde_json::to_string(new)?;
    let new_comic = parse_id(&new.comic_id)?;

    let mut chapters = txn.open_table(CHAPTERS)?;
    let mut index = txn.open_table(CHAPTER_INDEX)?;

    chapters.insert(id, json.as_str())?;
    if let Some(old) = old {
        let old_comic = parse_id(&old.comic_id)?;
        index.remove((&old_comic, old.chapter_number, id))?;
    }
    index.insert((&new_comic, new.chapter_number, id), ())?;
    Ok(())
}

fn chapter_entries(txn: &WriteTransaction, comic: &[u8; 16]) -> Result<Vec<(u32, [u8; 16])>, DbError> {
    let index = txn.open_table(CHAPTER_INDEX)?;
    let mut entries = Vec::new();
    for item in index.range(chapter_range(comic))? {
        let (key, _) = item?;
        let (_, number, chapter_id) = key.value();
        entries.push((number, *chapter_id));
    }
    Ok(entries)
}

fn remove_chapters_of(txn: &WriteTransaction, comic: &[u8; 16]) -> Result<usize, DbError> {
    let entries = chapter_entries(txn, comic)?;

    let mut index = txn.open_table(CHAPTER_INDEX)?;
    let mut chapters = txn.open_table(CHAPTERS)?;
    for (number, chapter_id) in &entries {
        index.remove((comic, *number, chapter_id))?;
        chapters.remove(chapter_id)?;
    }
    Ok(entries.len())
}

fn latest_chapter_in(read_txn: &ReadTransaction, comic: &[u8; 16]) -> Result<Option<LatestChapter>, DbError> {
    let index = read_txn.open_table(CHAPTER_INDEX)?;
    let chapters = read_txn.open_table(CHAPTERS)?;

    let chapter_id = match index.range(chapter_range(comic))?.next_back() {
        Some(entry) => *entry?.0.value().2,
        None => return Ok(None),
    };

    let latest = match chapters.get(&chapter_id)? {
        Some(guard) => {
            let record: ChapterRecord = serde_json::from_str(guard.value())?;
            Ok(Some(LatestChapter {
                id: id_string(&chapter_id),
                number: record.chapter_number,
                title: record.title,
                created_at: record.created_at,
            }))
        }
        None => {
            log::warn!(
                "Chapter index entry {} for comic {} has no chapter record.",
                id_string(&chapter_id),
                id_string(comic)
            );
            Ok(None)
        }
    };
    latest
}

fn comics_newest_first(read_txn: &ReadTransaction) -> Result<Vec<([u8; 16], ComicRecord)>, DbError> {
    let updated_index = read_txn.open_table(COMIC_UPDATED_INDEX)?;
    let comics = read_txn.open_table(COMICS)?;

    let mut out = Vec::new();
    for item in updated_index.iter()? {
        let (key, _) = item?;
        let id = *key.value().1;
        if let Some(guard) = comics.get(&id)? {
            let record: ComicRecord = serde_json::from_str(guard.value())?;
            out.push((id, record));
        }
    }
    Ok(out)
}

/// Attaches the latest chapter to each comic on the page. Only the page's
/// items pay for the lookup, never the whole matching set.
fn hydrate_page(read_txn: &ReadTransaction, page: Page<([u8; 16], ComicRecord)>) -> Result<Page<Comic>, DbError> {
    let mut items = Vec::with_capacity(page.items.len());
    for (id, record) in page.items {
        items.push(Comic {
            id: id_string(&id),
            latest_chapter: latest_chapter_in(read_txn, &id)?,
            record,
        });
    }
    Ok(Page {
        items,
        total_count: page.total_count,
        has_more: page.has_more,
        current_page: page.current_page,
        total_pages: page.total_pages,
    })
}

// ====================================================================
// ========================= COMIC OPERATIONS =========================
// ====================================================================

pub fn create_comic(db: &Database, new: &NewComic) -> Result<String, DbError> {
    let comic_uuid = Uuid::new_v4();
    let now = Utc::now();

    let record = ComicRecord {
        title: new.title.clone(),
        description: new.description.clone(),
        author: new.author.clone(),
        genre: new.genre.clone(),
        cover_image_url: new.cover_image_url.clone(),
        banner_image_url: new.banner_image_url.clone().filter(|s| !s.is_empty()),
        created_at: now,
        updated_at: now,
    };

    let write_txn = db.begin_write()?;
    store_comic_record(&write_txn, comic_uuid.as_bytes(), None, &record)?;
    write_txn.commit()?;

    Ok(comic_uuid.to_string())
}

pub fn read_comic(db: &Database, id: &str) -> Result<Option<Comic>, DbError> {
    let id_bytes = match Uuid::parse_str(id) {
        Ok(uuid) => uuid.into_bytes(),
        Err(_) => return Ok(None),
    };

    let read_txn = db.begin_read()?;
    let comics = read_txn.open_table(COMICS)?;
    let record: ComicRecord = match comics.get(&id_bytes)? {
        Some(guard) => serde_json::from_str(guard.value())?,
        None => return Ok(None),
    };

    Ok(Some(Comic {
        id: id_string(&id_bytes),
        latest_chapter: latest_chapter_in(&read_txn, &id_bytes)?,
        record,
    }))
}

pub fn update_comic(db: &Database, id: &str, update: &ComicUpdate) -> Result<(), DbError> {
    let id_bytes = parse_id(id)?;

    let write_txn = db.begin_write()?;
    {
        let old = load_comic_record(&write_txn, &id_bytes)?;
        let mut new = old.clone();

        if let Some(title) = &update.title {
            new.title = title.clone();
        }
        if let Some(description) = &update.description {
            new.description = description.clone();
        }
        if let Some(author) = &update.author {
            new.author = author.clone();
        }
        if let Some(genre) = &update.genre {
            new.genre = genre.clone();
        }
        if let Some(cover) = &update.cover_image_url {
            new.cover_image_url = cover.clone();
        }
        if let Some(banner) = &update.banner_image_url {
            // An empty banner clears it.
            new.banner_image_url = Some(banner.clone()).filter(|s| !s.is_empty());
        }
        new.updated_at = Utc::now();

        store_comic_record(&write_txn, &id_bytes, Some(&old), &new)?;
    }
    write_txn.commit()?;
    Ok(())
}

/// Deletes a comic together with all of its chapters in one transaction.
pub fn delete_comic(db: &Database, id: &str) -> Result<usize, DbError> {
    let id_bytes = parse_id(id)?;

    let write_txn = db.begin_write()?;
    let removed_chapters = {
        let record = load_comic_record(&write_txn, &id_bytes)?;
        let removed = remove_chapters_of(&write_txn, &id_bytes)?;

        let mut comics = write_txn.open_table(COMICS)?;
        let mut updated_index = write_txn.open_table(COMIC_UPDATED_INDEX)?;
        let mut genre_index = write_txn.open_table(GENRE_INDEX)?;

        comics.remove(&id_bytes)?;
        updated_index.remove((updated_key(&record.updated_at), &id_bytes))?;
        for genre in split_genres(&record.genre) {
            genre_index.remove((genre.as_str(), &id_bytes))?;
        }
        removed
    };
    write_txn.commit()?;

    log::info!("Deleted comic {} and {} chapter(s).", id, removed_chapters);
    Ok(removed_chapters)
}

pub fn list_comics(db: &Database, request: PageRequest) -> Result<Page<Comic>, DbError> {
    let read_txn = db.begin_read()?;
    let all = comics_newest_first(&read_txn)?;
    hydrate_page(&read_txn, paginate(all, request))
}

/// Case-insensitive substring match against title, author or the raw genre
/// string.
pub fn search_comics(db: &Database, term: &str, request: PageRequest) -> Result<Page<Comic>, DbError> {
    let needle = term.trim().to_lowercase();

    let read_txn = db.begin_read()?;
    let matching: Vec<_> = comics_newest_first(&read_txn)?
        .into_iter()
        .filter(|(_, comic)| {
            comic.title.to_lowercase().contains(&needle)
                || comic.author.to_lowercase().contains(&needle)
                || comic.genre.to_lowercase().contains(&needle)
        })
        .collect();

    hydrate_page(&read_txn, paginate(matching, request))
}

/// Comics carrying `genre` as one of their tags, compared exactly after trimming.
pub fn comics_by_genre(db: &Database, genre: &str, request: PageRequest) -> Result<Page<Comic>, DbError> {
    let wanted = genre.trim();

    let read_txn = db.begin_read()?;
    let mut ids = HashSet::new();
    {
        let genre_index = read_txn.open_table(GENRE_INDEX)?;
        for item in genre_index.range((wanted, &[0u8; 16])..=(wanted, &[255u8; 16]))? {
            let (key, _) = item?;
            ids.insert(*key.value().1);
        }
    }

    let matching: Vec<_> = comics_newest_first(&read_txn)?
        .into_iter()
        .filter(|(id, _)| ids.contains(id))
        .collect();

    hydrate_page(&read_txn, paginate(matching, request))
}

pub fn all_genres(db: &Database) -> Result<Vec<String>, DbError> {
    let read_txn = db.begin_read()?;
    let genre_index = read_txn.open_table(GENRE_INDEX)?;

    let mut genres = BTreeSet::new();
    for item in genre_index.iter()? {
        let (key, _) = item?;
        genres.insert(key.value().0.to_string());
    }
    Ok(genres.into_iter().collect())
}

// ====================================================================
// ======================== CHAPTER OPERATIONS ========================
// ====================================================================

pub fn create_chapter(db: &Database, comic_id: &str, new: &NewChapter) -> Result<String, DbError> {
    if new.chapter_number == 0 {
        return Err(DbError::InvalidInput("Chapter number must be at least 1.".to_string()));
    }
    let comic = parse_id(comic_id)?;
    let chapter_uuid = Uuid::new_v4();
    let now = Utc::now();

    let record = ChapterRecord {
        comic_id: id_string(&comic),
        chapter_number: new.chapter_number,
        title: new.title.clone().filter(|t| !t.trim().is_empty()),
        page_image_urls: new.page_image_urls.clone(),
        created_at: now,
        updated_at: now,
    };

    let write_txn = db.begin_write()?;
    touch_comic(&write_txn, &comic, now)?;
    store_chapter_record(&write_txn, chapter_uuid.as_bytes(), None, &record)?;
    write_txn.commit()?;

    Ok(chapter_uuid.to_string())
}

pub fn read_chapter(db: &Database, comic_id: &str, chapter_id: &str) -> Result<Option<Chapter>, DbError> {
    let (comic, chapter) = match (Uuid::parse_str(comic_id), Uuid::parse_str(chapter_id)) {
        (Ok(comic), Ok(chapter)) => (comic, chapter.into_bytes()),
        _ => return Ok(None),
    };

    let read_txn = db.begin_read()?;
    let chapters = read_txn.open_table(CHAPTERS)?;
    let record: ChapterRecord = match chapters.get(&chapter)? {
        Some(guard) => serde_json::from_str(guard.value())?,
        None => return Ok(None),
    };

    if record.comic_id != comic.to_string() {
        return Ok(None);
    }
    Ok(Some(Chapter { id: id_string(&chapter), record }))
}

pub fn chapters_for_comic(db: &Database, comic_id: &str, order: ChapterOrder) -> Result<Vec<Chapter>, DbError> {
    let comic = match Uuid::parse_str(comic_id) {
        Ok(uuid) => uuid.into_bytes(),
        Err(_) => return Ok(Vec::new()),
    };

    let read_txn = db.begin_read()?;
    let index = read_txn.open_table(CHAPTER_INDEX)?;
    let chapters = read_txn.open_table(CHAPTERS)?;

    let mut out = Vec::new();
    for item in index.range(chapter_range(&comic))? {
        let (key, _) = item?;
        let chapter_id = *key.value().2;
        if let Some(guard) = chapters.get(&chapter_id)? {
            out.push(Chapter {
                id: id_string(&chapter_id),
                record: serde_json::from_str(guard.value())?,
            });
        }
    }

    if order == ChapterOrder::Desc {
        out.reverse();
    }
    Ok(out)
}

pub fn latest_chapter(db: &Database, comic_id: &str) -> Result<Option<LatestChapter>, DbError> {
    let comic = match Uuid::parse_str(comic_id) {
        Ok(uuid) => uuid.into_bytes(),
        Err(_) => return Ok(None),
    };
    let read_txn = db.begin_read()?;
    latest_chapter_in(&read_txn, &comic)
}

pub fn update_chapter(
    db: &Database,
    comic_id: &str,
    chapter_id: &str,
    update: &ChapterUpdate,
) -> Result<(), DbError> {
    if update.chapter_number == Some(0) {
        return Err(DbError::InvalidInput("Chapter number must be at least 1.".to_string()));
    }
    let comic = parse_id(comic_id)?;
    let chapter = parse_id(chapter_id)?;

    let write_txn = db.begin_write()?;
    {
        let old = load_chapter_record(&write_txn, &comic, &chapter)?;
        let mut new = old.clone();

        if let Some(number) = update.chapter_number {
            new.chapter_number = number;
        }
        if let Some(title) = &update.title {
            new.title = Some(title.clone()).filter(|t| !t.trim().is_empty());
        }
        if let Some(pages) = &update.page_image_urls {
            new.page_image_urls = pages.clone();
        }
        new.updated_at = Utc::now();

        store_chapter_record(&write_txn, &chapter, Some(&old), &new)?;
    }
    write_txn.commit()?;
    Ok(())
}

pub fn delete_chapter(db: &Database, comic_id: &str, chapter_id: &str) -> Result<(), DbError> {
    let comic = parse_id(comic_id)?;
    let chapter = parse_id(chapter_id)?;

    let write_txn = db.begin_write()?;
    {
        let record = load_chapter_record(&write_txn, &comic, &chapter)?;
        {
            let mut chapters = write_txn.open_table(CHAPTERS)?;
            let mut index = write_txn.open_table(CHAPTER_INDEX)?;
            chapters.remove(&chapter)?;
            index.remove((&comic, record.chapter_number, &chapter))?;
        }
        touch_comic(&write_txn, &comic, Utc::now())?;
    }
    write_txn.commit()?;
    Ok(())
}

pub fn delete_all_chapters(db: &Database, comic_id: &str) -> Result<usize, DbError> {
    let comic = parse_id(comic_id)?;

    let write_txn = db.begin_write()?;
    let removed = {
        load_comic_record(&write_txn, &comic)?;
        let removed = remove_chapters_of(&write_txn, &comic)?;
        touch_comic(&write_txn, &comic, Utc::now())?;
        removed
    };
    write_txn.commit()?;

    log::info!("Deleted {} chapter(s) of comic {}.", removed, comic_id);
    Ok(removed)
}

/// Re-parents a chapter onto another comic. The chapter keeps its number
/// unless the target already has a chapter with that number, in which case it
/// is appended after the target's highest chapter. Returns the final number.
pub fn move_chapter(
    db: &Database,
    source_comic_id: &str,
    chapter_id: &str,
    target_comic_id: &str,
) -> Result<u32, DbError> {
    let source = parse_id(source_comic_id)?;
    let target = parse_id(target_comic_id)?;
    let chapter = parse_id(chapter_id)?;

    if source == target {
        return Err(DbError::InvalidInput(
            "The chapter already belongs to this comic.".to_string(),
        ));
    }

    let write_txn = db.begin_write()?;
    let number = {
        let old = load_chapter_record(&write_txn, &source, &chapter)?;
        let now = Utc::now();

        touch_comic(&write_txn, &target, now)?;
        let taken: Vec<u32> = chapter_entries(&write_txn, &target)?
            .into_iter()
            .map(|(number, _)| number)
            .collect();

        let number = if taken.contains(&old.chapter_number) {
            taken
                .iter()
                .max()
                .copied()
                .unwrap_or(0)
                .checked_add(1)
                .ok_or_else(|| {
                    DbError::InvalidInput("The target comic has no free chapter number left.".to_string())
                })?
        } else {
            old.chapter_number
        };

        let mut new = old.clone();
        new.comic_id = id_string(&target);
        new.chapter_number = number;
        new.updated_at = now;
        store_chapter_record(&write_txn, &chapter, Some(&old), &new)?;

        touch_comic(&write_txn, &source, now)?;
        number
    };
    write_txn.commit()?;

    log::info!(
        "Moved chapter {} from comic {} to comic {} as number {}.",
        chapter_id, source_comic_id, target_comic_id, number
    );
    Ok(number)
}

/// Renumbers a comic's chapters 1..=n, keeping their current order (ties on
/// number are broken by creation time). Returns how many chapters changed.
pub fn renumber_chapters(db: &Database, comic_id: &str) -> Result<usize, DbError> {
    let comic = parse_id(comic_id)?;

    let write_txn = db.begin_write()?;
    let changed = {
        load_comic_record(&write_txn, &comic)?;

        let mut records = Vec::new();
        for (_, chapter_id) in chapter_entries(&write_txn, &comic)? {
            let record = load_chapter_record(&write_txn, &comic, &chapter_id)?;
            records.push((chapter_id, record));
        }
        records.sort_by(|a, b| {
            a.1.chapter_number
                .cmp(&b.1.chapter_number)
                .then(a.1.created_at.cmp(&b.1.created_at))
        });

        let now = Utc::now();
        let mut changed = 0;
        for (position, (chapter_id, old)) in records.iter().enumerate() {
            let number = position as u32 + 1;
            if old.chapter_number == number {
                continue;
            }
            let mut new = old.clone();
            new.chapter_number = number;
            new.updated_at = now;
            store_chapter_record(&write_txn, chapter_id, Some(old), &new)?;
            changed += 1;
        }
        changed
    };
    write_txn.commit()?;
    Ok(changed)
}
