use crate::book::{Book, Chapter, ReadingProgress};
use crate::storage::{BookPersistence, StorageError};
use chrono::Utc;

/// Owns the reader's shared mutable state: the loaded book, the current
/// chapter and the current page index. Every mutation goes through a
/// setter here; no component reaches into another's internals.
pub struct ReaderStore {
    book: Book,
    current_chapter_id: String,
    current_page: usize,
}

impl ReaderStore {
    /// Opens the book at its saved reading position, or at the first
    /// chapter in reading order.
    pub fn new(book: Book) -> Self {
        let current_chapter_id = book
            .progress
            .as_ref()
            .filter(|p| book.chapter_by_id(&p.chapter_id).is_some())
            .map(|p| p.chapter_id.clone())
            .or_else(|| book.sorted_chapters().first().map(|c| c.id.clone()))
            .unwrap_or_default();
        let current_page = book
            .progress
            .as_ref()
            .filter(|p| p.chapter_id == current_chapter_id)
            .map(|p| p.page_index)
            .unwrap_or(0);
        Self {
            book,
            current_chapter_id,
            current_page,
        }
    }

    pub fn book(&self) -> &Book {
        &self.book
    }

    pub fn book_mut(&mut self) -> &mut Book {
        &mut self.book
    }

    pub fn set_book(&mut self, book: Book) {
        self.book = book;
        if self.book.chapter_by_id(&self.current_chapter_id).is_none() {
            self.current_chapter_id = self
                .book
                .sorted_chapters()
                .first()
                .map(|c| c.id.clone())
                .unwrap_or_default();
            self.current_page = 0;
        }
    }

    pub fn current_chapter_id(&self) -> &str {
        &self.current_chapter_id
    }

    pub fn current_chapter(&self) -> Option<&Chapter> {
        self.book.chapter_by_id(&self.current_chapter_id)
    }

    /// Changing chapter resets the page; the new chapter's pagination
    /// settles independently.
    pub fn set_current_chapter(&mut self, chapter_id: &str) {
        if self.current_chapter_id != chapter_id {
            self.current_chapter_id = chapter_id.to_string();
            self.current_page = 0;
        }
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn set_current_page(&mut self, page: usize) {
        self.current_page = page;
    }

    /// Position of the current chapter in reading order, with the total.
    pub fn chapter_position(&self) -> (usize, usize) {
        let chapters = self.book.sorted_chapters();
        let index = chapters
            .iter()
            .position(|c| c.id == self.current_chapter_id)
            .unwrap_or(0);
        (index, chapters.len())
    }

    pub fn next_chapter_id(&self) -> Option<String> {
        let chapters = self.book.sorted_chapters();
        let index = chapters
            .iter()
            .position(|c| c.id == self.current_chapter_id)?;
        chapters.get(index + 1).map(|c| c.id.clone())
    }

    pub fn prev_chapter_id(&self) -> Option<String> {
        let chapters = self.book.sorted_chapters();
        let index = chapters
            .iter()
            .position(|c| c.id == self.current_chapter_id)?;
        index.checked_sub(1).and_then(|i| chapters.get(i)).map(|c| c.id.clone())
    }

    /// Derives a progress record from the current state and delegates to
    /// the persistence collaborator. The record is overwritten wholesale,
    /// never appended.
    pub fn save_reading_progress(
        &mut self,
        persistence: &dyn BookPersistence,
    ) -> Result<(), StorageError> {
        self.book.progress = Some(ReadingProgress {
            chapter_id: self.current_chapter_id.clone(),
            page_index: self.current_page,
            last_read: Utc::now(),
        });
        persistence.save(&self.book)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::JsonBookStore;

    fn book_with_chapters() -> Book {
        Book {
            id: "b1".to_string(),
            title: "Test".to_string(),
            author: None,
            chapters: vec![
                Chapter {
                    id: "c2".to_string(),
                    title: "Two".to_string(),
                    order: 2,
                    content: String::new(),
                },
                Chapter {
                    id: "c1".to_string(),
                    title: "One".to_string(),
                    order: 1,
                    content: String::new(),
                },
            ],
            highlights: Vec::new(),
            progress: None,
        }
    }

    #[test]
    fn opens_at_first_chapter_in_reading_order() {
        let store = ReaderStore::new(book_with_chapters());
        assert_eq!(store.current_chapter_id(), "c1");
        assert_eq!(store.current_page(), 0);
    }

    #[test]
    fn opens_at_saved_progress() {
        let mut book = book_with_chapters();
        book.progress = Some(ReadingProgress {
            chapter_id: "c2".to_string(),
            page_index: 3,
            last_read: Utc::now(),
        });
        let store = ReaderStore::new(book);
        assert_eq!(store.current_chapter_id(), "c2");
        assert_eq!(store.current_page(), 3);
    }

    #[test]
    fn stale_progress_chapter_falls_back_to_first() {
        let mut book = book_with_chapters();
        book.progress = Some(ReadingProgress {
            chapter_id: "deleted".to_string(),
            page_index: 9,
            last_read: Utc::now(),
        });
        let store = ReaderStore::new(book);
        assert_eq!(store.current_chapter_id(), "c1");
        assert_eq!(store.current_page(), 0);
    }

    #[test]
    fn set_book_keeps_position_while_chapter_survives() {
        let mut store = ReaderStore::new(book_with_chapters());
        store.set_current_chapter("c2");
        store.set_current_page(3);

        // Whole-book replacement, e.g. after an edit elsewhere.
        let mut edited = book_with_chapters();
        edited.chapters[0].content = "revised".to_string();
        store.set_book(edited);

        assert_eq!(store.current_chapter_id(), "c2");
        assert_eq!(store.current_page(), 3);
    }

    #[test]
    fn set_book_falls_back_when_current_chapter_disappears() {
        let mut store = ReaderStore::new(book_with_chapters());
        store.set_current_chapter("c2");
        store.set_current_page(3);

        let mut shrunk = book_with_chapters();
        shrunk.chapters.retain(|c| c.id == "c1");
        store.set_book(shrunk);

        assert_eq!(store.current_chapter_id(), "c1");
        assert_eq!(store.current_page(), 0);
    }

    #[test]
    fn chapter_change_resets_page() {
        let mut store = ReaderStore::new(book_with_chapters());
        store.set_current_page(4);
        store.set_current_chapter("c2");
        assert_eq!(store.current_page(), 0);
    }

    #[test]
    fn neighbor_chapters_follow_reading_order() {
        let mut store = ReaderStore::new(book_with_chapters());
        assert_eq!(store.prev_chapter_id(), None);
        assert_eq!(store.next_chapter_id(), Some("c2".to_string()));
        store.set_current_chapter("c2");
        assert_eq!(store.prev_chapter_id(), Some("c1".to_string()));
        assert_eq!(store.next_chapter_id(), None);
    }

    #[test]
    fn save_reading_progress_overwrites_single_record() {
        let tmp = tempfile::tempdir().unwrap();
        let persistence = JsonBookStore::new(tmp.path());
        let mut store = ReaderStore::new(book_with_chapters());

        store.set_current_page(2);
        store.save_reading_progress(&persistence).unwrap();
        store.set_current_chapter("c2");
        store.save_reading_progress(&persistence).unwrap();

        let loaded = persistence.load("b1").unwrap();
        let progress = loaded.progress.unwrap();
        assert_eq!(progress.chapter_id, "c2");
        assert_eq!(progress.page_index, 0);
    }
}
