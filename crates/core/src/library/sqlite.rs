//! SQLite-backed library implementation.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use super::{own_refs, CommitReceipt, DuplicateKey, Library, LibraryError, LibraryStats};
use crate::task::{ImportTask, Item, ItemRef, MediaTask};

fn db_err(e: rusqlite::Error) -> LibraryError {
    LibraryError::Database(e.to_string())
}

/// SQLite-backed library.
pub struct SqliteLibrary {
    conn: Mutex<Connection>,
}

impl SqliteLibrary {
    /// Open (or create) the library database at `path`.
    pub fn new(path: &Path) -> Result<Self, LibraryError> {
        let conn = Connection::open(path).map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory library (useful for testing).
    pub fn in_memory() -> Result<Self, LibraryError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), LibraryError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS albums (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                albumartist TEXT NOT NULL,
                album TEXT NOT NULL,
                year INTEGER,
                mb_albumid TEXT,
                added_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_albums_name ON albums(albumartist COLLATE NOCASE, album COLLATE NOCASE);
            CREATE INDEX IF NOT EXISTS idx_albums_mbid ON albums(mb_albumid);

            CREATE TABLE IF NOT EXISTS items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                album_id INTEGER REFERENCES albums(id) ON DELETE SET NULL,
                path TEXT NOT NULL UNIQUE,
                artist TEXT NOT NULL,
                albumartist TEXT NOT NULL,
                album TEXT NOT NULL,
                title TEXT NOT NULL,
                track INTEGER NOT NULL DEFAULT 0,
                disc INTEGER NOT NULL DEFAULT 0,
                year INTEGER,
                length REAL NOT NULL DEFAULT 0,
                bitrate INTEGER,
                format TEXT NOT NULL DEFAULT '',
                mb_trackid TEXT,
                mb_albumid TEXT,
                added_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_items_album ON items(album_id);
            CREATE INDEX IF NOT EXISTS idx_items_name ON items(artist COLLATE NOCASE, title COLLATE NOCASE);
            CREATE INDEX IF NOT EXISTS idx_items_mbid ON items(mb_trackid);
            "#,
        )
        .map_err(db_err)?;

        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, LibraryError> {
        self.conn
            .lock()
            .map_err(|_| LibraryError::Database("connection lock poisoned".to_string()))
    }

    fn row_to_item(row: &rusqlite::Row) -> rusqlite::Result<Item> {
        let path: String = row.get(1)?;
        Ok(Item {
            id: Some(row.get(0)?),
            path: PathBuf::from(path),
            artist: row.get(2)?,
            albumartist: row.get(3)?,
            album: row.get(4)?,
            title: row.get(5)?,
            track: row.get(6)?,
            disc: row.get(7)?,
            year: row.get(8)?,
            length: row.get(9)?,
            bitrate: row.get(10)?,
            format: row.get(11)?,
            mb_trackid: row.get(12)?,
            mb_albumid: row.get(13)?,
        })
    }

    fn store_item(
        tx: &rusqlite::Transaction<'_>,
        item: &Item,
        album_id: Option<i64>,
        now: &str,
    ) -> Result<ItemRef, LibraryError> {
        let path = item.path.to_string_lossy().into_owned();

        if let Some(id) = item.id {
            let updated = tx
                .execute(
                    "UPDATE items SET album_id = ?1, path = ?2, artist = ?3, albumartist = ?4,
                         album = ?5, title = ?6, track = ?7, disc = ?8, year = ?9, length = ?10,
                         bitrate = ?11, format = ?12, mb_trackid = ?13, mb_albumid = ?14
                     WHERE id = ?15",
                    params![
                        album_id,
                        path,
                        item.artist,
                        item.albumartist,
                        item.album,
                        item.title,
                        item.track,
                        item.disc,
                        item.year,
                        item.length,
                        item.bitrate,
                        item.format,
                        item.mb_trackid,
                        item.mb_albumid,
                        id,
                    ],
                )
                .map_err(db_err)?;
            if updated == 0 {
                return Err(LibraryError::ItemNotFound(ItemRef(id)));
            }
            return Ok(ItemRef(id));
        }

        // Re-importing a path that is already stored updates that row.
        let id: i64 = tx
            .query_row(
                "INSERT INTO items (album_id, path, artist, albumartist, album, title, track,
                     disc, year, length, bitrate, format, mb_trackid, mb_albumid, added_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
                 ON CONFLICT(path) DO UPDATE SET
                     album_id = excluded.album_id, artist = excluded.artist,
                     albumartist = excluded.albumartist, album = excluded.album,
                     title = excluded.title, track = excluded.track, disc = excluded.disc,
                     year = excluded.year, length = excluded.length,
                     bitrate = excluded.bitrate, format = excluded.format,
                     mb_trackid = excluded.mb_trackid, mb_albumid = excluded.mb_albumid
                 RETURNING id",
                params![
                    album_id,
                    path,
                    item.artist,
                    item.albumartist,
                    item.album,
                    item.title,
                    item.track,
                    item.disc,
                    item.year,
                    item.length,
                    item.bitrate,
                    item.format,
                    item.mb_trackid,
                    item.mb_albumid,
                    now,
                ],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(ItemRef(id))
    }

    fn delete_items(
        tx: &rusqlite::Transaction<'_>,
        refs: &BTreeSet<ItemRef>,
    ) -> Result<usize, LibraryError> {
        let mut removed = 0;
        for r in refs {
            removed += tx
                .execute("DELETE FROM items WHERE id = ?", params![r.0])
                .map_err(db_err)?;
        }
        Ok(removed)
    }

    fn insert_album(
        tx: &rusqlite::Transaction<'_>,
        media: &MediaTask,
        now: &str,
    ) -> Result<i64, LibraryError> {
        let year = media.items.iter().find_map(|i| i.year);
        let mb_albumid = media.items.iter().find_map(|i| i.mb_albumid.clone());
        tx.execute(
            "INSERT INTO albums (albumartist, album, year, mb_albumid, added_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                media.cur_artist().unwrap_or_default(),
                media.cur_album().unwrap_or_default(),
                year,
                mb_albumid,
                now,
            ],
        )
        .map_err(db_err)?;
        Ok(tx.last_insert_rowid())
    }
}

impl Library for SqliteLibrary {
    fn find_duplicates(&self, task: &ImportTask) -> Result<BTreeSet<ItemRef>, LibraryError> {
        let Some(key) = DuplicateKey::for_task(task) else {
            return Ok(BTreeSet::new());
        };
        let conn = self.lock()?;

        let ids: Vec<i64> = match key {
            DuplicateKey::Album {
                artist,
                album,
                mb_albumid,
            } => {
                let mut stmt = conn
                    .prepare(
                        "SELECT i.id FROM items i JOIN albums a ON i.album_id = a.id
                         WHERE (a.albumartist = ?1 COLLATE NOCASE AND a.album = ?2 COLLATE NOCASE)
                            OR (?3 IS NOT NULL AND a.mb_albumid = ?3)",
                    )
                    .map_err(db_err)?;
                let rows = stmt
                    .query_map(params![artist, album, mb_albumid], |row| row.get(0))
                    .map_err(db_err)?;
                rows.collect::<Result<_, _>>().map_err(db_err)?
            }
            DuplicateKey::Item {
                artist,
                title,
                mb_trackid,
            } => {
                let mut stmt = conn
                    .prepare(
                        "SELECT id FROM items
                         WHERE (artist = ?1 COLLATE NOCASE AND title = ?2 COLLATE NOCASE)
                            OR (?3 IS NOT NULL AND mb_trackid = ?3)",
                    )
                    .map_err(db_err)?;
                let rows = stmt
                    .query_map(params![artist, title, mb_trackid], |row| row.get(0))
                    .map_err(db_err)?;
                rows.collect::<Result<_, _>>().map_err(db_err)?
            }
        };

        let own = own_refs(task);
        Ok(ids
            .into_iter()
            .map(ItemRef)
            .filter(|r| !own.contains(r))
            .collect())
    }

    fn items_for(&self, refs: &BTreeSet<ItemRef>) -> Result<Vec<Item>, LibraryError> {
        if refs.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.lock()?;
        let placeholders = vec!["?"; refs.len()].join(", ");
        let sql = format!(
            "SELECT id, path, artist, albumartist, album, title, track, disc, year, length,
                    bitrate, format, mb_trackid, mb_albumid
             FROM items WHERE id IN ({})
             ORDER BY album_id, disc, track, path",
            placeholders
        );
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params_from_iter(refs.iter().map(|r| r.0)), Self::row_to_item)
            .map_err(db_err)?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row.map_err(db_err)?);
        }
        Ok(items)
    }

    fn commit(&self, task: &ImportTask) -> Result<CommitReceipt, LibraryError> {
        let Some(media) = task.media() else {
            return Err(LibraryError::InvalidTask("sentinel tasks carry no items".to_string()));
        };
        if media.items.is_empty() {
            return Err(LibraryError::InvalidTask("task has no items".to_string()));
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(db_err)?;
        let now = Utc::now().to_rfc3339();

        let mut receipt = CommitReceipt::default();
        if media.should_remove_duplicates {
            if let Some(dups) = &media.duplicates {
                receipt.removed = Self::delete_items(&tx, dups)?;
            }
        }

        let album_id = if task.is_album() {
            Some(Self::insert_album(&tx, media, &now)?)
        } else {
            None
        };
        receipt.album_id = album_id;

        for item in &media.items {
            receipt.items.push(Self::store_item(&tx, item, album_id, &now)?);
        }

        tx.execute(
            "DELETE FROM albums WHERE id NOT IN
                 (SELECT album_id FROM items WHERE album_id IS NOT NULL)",
            [],
        )
        .map_err(db_err)?;

        tx.commit().map_err(db_err)?;
        Ok(receipt)
    }

    fn relocate(&self, item: ItemRef, path: &Path) -> Result<(), LibraryError> {
        let conn = self.lock()?;
        let updated = conn
            .execute(
                "UPDATE items SET path = ?1 WHERE id = ?2",
                params![path.to_string_lossy().into_owned(), item.0],
            )
            .map_err(db_err)?;
        if updated == 0 {
            return Err(LibraryError::ItemNotFound(item));
        }
        Ok(())
    }

    fn stats(&self) -> Result<LibraryStats, LibraryError> {
        let conn = self.lock()?;
        let albums: i64 = conn
            .query_row("SELECT COUNT(*) FROM albums", [], |row| row.get(0))
            .map_err(db_err)?;
        let items: i64 = conn
            .query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))
            .map_err(db_err)?;
        Ok(LibraryStats {
            albums: albums as u64,
            items: items as u64,
        })
    }
}

impl SqliteLibrary {
    /// Look up a single item by path.
    pub fn item_by_path(&self, path: &Path) -> Result<Option<Item>, LibraryError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, path, artist, albumartist, album, title, track, disc, year, length,
                    bitrate, format, mb_trackid, mb_albumid
             FROM items WHERE path = ?",
            params![path.to_string_lossy().into_owned()],
            Self::row_to_item,
        )
        .optional()
        .map_err(db_err)
    }
}
