use crate::book::Book;
use log::info;
use std::fs;
use std::path::{Path, PathBuf};

const BOOK_MANIFEST: &str = "book.json";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("no {BOOK_MANIFEST} in {0}")]
    NotABook(PathBuf),
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed {path}: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Persistence collaborator for books. `save` is an idempotent whole-book
/// upsert; there is no partial-field update contract.
pub trait BookPersistence {
    fn save(&self, book: &Book) -> Result<(), StorageError>;
    fn load(&self, book_id: &str) -> Result<Book, StorageError>;
}

/// Books stored as directories holding a `book.json` manifest next to
/// their image assets.
pub struct JsonBookStore {
    root: PathBuf,
}

impl JsonBookStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn book_dir(&self, book_id: &str) -> PathBuf {
        self.root.join(book_id)
    }

    fn manifest_path(&self, book_id: &str) -> PathBuf {
        self.book_dir(book_id).join(BOOK_MANIFEST)
    }

    pub fn load_from_dir(dir: &Path) -> Result<Book, StorageError> {
        let path = dir.join(BOOK_MANIFEST);
        if !path.exists() {
            return Err(StorageError::NotABook(dir.to_path_buf()));
        }
        let content = fs::read_to_string(&path).map_err(|source| StorageError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| StorageError::Malformed { path, source })
    }

    /// Book directories directly under the store root, in name order.
    pub fn discover(&self) -> Vec<(PathBuf, Book)> {
        let mut found = Vec::new();
        let Ok(entries) = fs::read_dir(&self.root) else {
            return found;
        };
        for entry in entries.flatten() {
            let dir = entry.path();
            if !dir.is_dir() {
                continue;
            }
            match Self::load_from_dir(&dir) {
                Ok(book) => found.push((dir, book)),
                Err(StorageError::NotABook(_)) => {}
                Err(e) => log::warn!("Skipping {}: {e}", dir.display()),
            }
        }
        found.sort_by(|(a, _), (b, _)| a.cmp(b));
        found
    }
}

impl BookPersistence for JsonBookStore {
    fn save(&self, book: &Book) -> Result<(), StorageError> {
        let dir = self.book_dir(&book.id);
        fs::create_dir_all(&dir).map_err(|source| StorageError::Io {
            path: dir.clone(),
            source,
        })?;
        let path = self.manifest_path(&book.id);
        let content = serde_json::to_string_pretty(book).map_err(|source| {
            StorageError::Malformed {
                path: path.clone(),
                source,
            }
        })?;
        fs::write(&path, content).map_err(|source| StorageError::Io {
            path: path.clone(),
            source,
        })?;
        info!("Saved book {} to {}", book.id, path.display());
        Ok(())
    }

    fn load(&self, book_id: &str) -> Result<Book, StorageError> {
        Self::load_from_dir(&self.book_dir(book_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::{Chapter, Highlight, HighlightColor};

    fn sample_book() -> Book {
        Book {
            id: "sample".to_string(),
            title: "Sample".to_string(),
            author: Some("Nobody".to_string()),
            chapters: vec![Chapter {
                id: "c1".to_string(),
                title: "One".to_string(),
                order: 1,
                content: "Hello world".to_string(),
            }],
            highlights: Vec::new(),
            progress: None,
        }
    }

    #[test]
    fn save_then_load_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let store = JsonBookStore::new(tmp.path());
        let book = sample_book();

        store.save(&book).unwrap();
        let loaded = store.load("sample").unwrap();
        assert_eq!(loaded, book);
    }

    #[test]
    fn save_is_an_upsert() {
        let tmp = tempfile::tempdir().unwrap();
        let store = JsonBookStore::new(tmp.path());
        let mut book = sample_book();

        store.save(&book).unwrap();
        book.add_highlight(Highlight::new("c1", "Hello", HighlightColor::Yellow));
        store.save(&book).unwrap();

        let loaded = store.load("sample").unwrap();
        assert_eq!(loaded.highlights.len(), 1);
    }

    #[test]
    fn discover_skips_directories_without_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        let store = JsonBookStore::new(tmp.path());
        store.save(&sample_book()).unwrap();
        std::fs::create_dir(tmp.path().join("not-a-book")).unwrap();

        let found = store.discover();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].1.id, "sample");
    }
}
