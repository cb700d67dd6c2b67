use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Named highlight colors, resolved to actual colors through the theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HighlightColor {
    #[default]
    Yellow,
    Green,
    Blue,
    Pink,
}

impl HighlightColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            HighlightColor::Yellow => "yellow",
            HighlightColor::Green => "green",
            HighlightColor::Blue => "blue",
            HighlightColor::Pink => "pink",
        }
    }
}

/// User-created marker over a literal text span within a chapter.
///
/// Highlights are appended to and removed from the owning [`Book`];
/// they are never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Highlight {
    pub id: String,
    pub chapter_id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default)]
    pub color: HighlightColor,
    pub created_at: DateTime<Utc>,
}

impl Highlight {
    pub fn new(chapter_id: &str, text: &str, color: HighlightColor) -> Self {
        Self {
            id: format!("hl-{}", Utc::now().timestamp_millis()),
            chapter_id: chapter_id.to_string(),
            text: text.to_string(),
            note: None,
            color,
            created_at: Utc::now(),
        }
    }
}

/// Ordered document unit within a book. Immutable once loaded; an edit
/// replaces the chapter wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: String,
    pub title: String,
    pub order: u32,
    pub content: String,
}

impl Chapter {
    pub fn word_count(&self) -> usize {
        self.content.split_whitespace().count()
    }
}

/// Last reading position. A single instance per book, overwritten on every
/// save; always re-derivable from navigation state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingProgress {
    pub chapter_id: String,
    pub page_index: usize,
    pub last_read: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub chapters: Vec<Chapter>,
    #[serde(default)]
    pub highlights: Vec<Highlight>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<ReadingProgress>,
}

impl Book {
    /// Chapters in reading order. Chapter `order` is authoritative, not the
    /// position in the serialized list.
    pub fn sorted_chapters(&self) -> Vec<&Chapter> {
        let mut chapters: Vec<&Chapter> = self.chapters.iter().collect();
        chapters.sort_by_key(|c| c.order);
        chapters
    }

    pub fn chapter_by_id(&self, chapter_id: &str) -> Option<&Chapter> {
        self.chapters.iter().find(|c| c.id == chapter_id)
    }

    pub fn highlights_for_chapter(&self, chapter_id: &str) -> Vec<&Highlight> {
        self.highlights
            .iter()
            .filter(|h| h.chapter_id == chapter_id)
            .collect()
    }

    pub fn add_highlight(&mut self, highlight: Highlight) {
        self.highlights.push(highlight);
    }

    pub fn remove_highlight(&mut self, highlight_id: &str) -> bool {
        let before = self.highlights.len();
        self.highlights.retain(|h| h.id != highlight_id);
        self.highlights.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapter(id: &str, order: u32) -> Chapter {
        Chapter {
            id: id.to_string(),
            title: format!("Chapter {order}"),
            order,
            content: String::new(),
        }
    }

    #[test]
    fn chapters_sort_by_order_not_list_position() {
        let book = Book {
            id: "b1".to_string(),
            title: "Test".to_string(),
            author: None,
            chapters: vec![chapter("c3", 3), chapter("c1", 1), chapter("c2", 2)],
            highlights: Vec::new(),
            progress: None,
        };

        let ordered: Vec<&str> = book
            .sorted_chapters()
            .iter()
            .map(|c| c.id.as_str())
            .collect();
        assert_eq!(ordered, vec!["c1", "c2", "c3"]);
    }

    #[test]
    fn word_count_splits_on_any_whitespace() {
        let mut ch = chapter("c1", 1);
        ch.content = "one  two\nthree\t four".to_string();
        assert_eq!(ch.word_count(), 4);
    }

    #[test]
    fn highlights_scoped_to_chapter() {
        let mut book = Book {
            id: "b1".to_string(),
            title: "Test".to_string(),
            author: None,
            chapters: vec![chapter("c1", 1), chapter("c2", 2)],
            highlights: Vec::new(),
            progress: None,
        };
        book.add_highlight(Highlight::new("c1", "first", HighlightColor::Yellow));
        book.add_highlight(Highlight::new("c2", "second", HighlightColor::Green));

        let scoped = book.highlights_for_chapter("c1");
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].text, "first");
    }

    #[test]
    fn remove_highlight_reports_missing_id() {
        let mut book = Book {
            id: "b1".to_string(),
            title: "Test".to_string(),
            author: None,
            chapters: vec![chapter("c1", 1)],
            highlights: vec![Highlight::new("c1", "keep", HighlightColor::Blue)],
            progress: None,
        };
        let id = book.highlights[0].id.clone();

        assert!(!book.remove_highlight("no-such-id"));
        assert_eq!(book.highlights.len(), 1);
        assert!(book.remove_highlight(&id));
        assert!(book.highlights.is_empty());
    }
}
