use crate::book::{Highlight, HighlightColor};
use regex::RegexBuilder;

/// What a matched segment represents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchTag {
    Search,
    Annotation {
        /// 1-based position of the highlight in the chapter's highlight
        /// list, in input order.
        display_index: usize,
        highlight_id: String,
        color: HighlightColor,
    },
}

/// One piece of a partitioned text run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    Literal(&'a str),
    Match { text: &'a str, tag: MatchTag },
}

#[derive(Debug, Clone)]
struct MatchRecord {
    start: usize,
    end: usize,
    tag: MatchTag,
}

/// Partitions `text` into literal and tagged segments for rendering.
///
/// Search matches are scanned first, then annotation matches in the order
/// the highlights were given. Overlaps resolve in a single left-to-right
/// sweep: whichever match starts earlier wins, and at equal starts the
/// earlier-enumerated record wins while the other is dropped entirely.
pub fn partition_text<'a>(
    text: &'a str,
    search_term: &str,
    annotations: &[&Highlight],
) -> Vec<Segment<'a>> {
    if search_term.is_empty() && annotations.is_empty() {
        return vec![Segment::Literal(text)];
    }

    let mut records: Vec<MatchRecord> = Vec::new();

    if !search_term.is_empty() {
        if let Some(re) = literal_pattern(search_term) {
            for m in re.find_iter(text) {
                records.push(MatchRecord {
                    start: m.start(),
                    end: m.end(),
                    tag: MatchTag::Search,
                });
            }
        }
    }

    for (i, annotation) in annotations.iter().enumerate() {
        let Some(re) = annotation_pattern(&annotation.text) else {
            continue;
        };
        for m in re.find_iter(text) {
            records.push(MatchRecord {
                start: m.start(),
                end: m.end(),
                tag: MatchTag::Annotation {
                    display_index: i + 1,
                    highlight_id: annotation.id.clone(),
                    color: annotation.color,
                },
            });
        }
    }

    if records.is_empty() {
        return vec![Segment::Literal(text)];
    }
    records.sort_by_key(|r| r.start);

    let mut segments = Vec::new();
    let mut last_index = 0;
    for record in records {
        // Already covered by an earlier match; dropped entirely, never
        // rendered partially or nested.
        if record.start < last_index {
            continue;
        }
        if record.start > last_index {
            segments.push(Segment::Literal(&text[last_index..record.start]));
        }
        segments.push(Segment::Match {
            text: &text[record.start..record.end],
            tag: record.tag,
        });
        last_index = record.end;
    }
    if last_index < text.len() {
        segments.push(Segment::Literal(&text[last_index..]));
    }
    segments
}

/// Case-insensitive pattern matching the term literally.
fn literal_pattern(term: &str) -> Option<regex::Regex> {
    RegexBuilder::new(&regex::escape(term))
        .case_insensitive(true)
        .build()
        .ok()
}

/// Case-insensitive pattern for stored annotation text that may have been
/// wrapped or re-flowed in the source: runs of whitespace in the stored
/// text match one or more whitespace characters (newlines included).
fn annotation_pattern(stored: &str) -> Option<regex::Regex> {
    let tokens: Vec<&str> = stored.split_whitespace().collect();
    if tokens.is_empty() {
        return None;
    }
    let pattern = tokens
        .iter()
        .map(|t| regex::escape(t))
        .collect::<Vec<_>>()
        .join(r"\s+");
    RegexBuilder::new(&pattern).case_insensitive(true).build().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn highlight(id: &str, text: &str) -> Highlight {
        Highlight {
            id: id.to_string(),
            chapter_id: "c1".to_string(),
            text: text.to_string(),
            note: None,
            color: HighlightColor::Yellow,
            created_at: Utc::now(),
        }
    }

    fn spans(segments: &[Segment]) -> Vec<(String, bool)> {
        segments
            .iter()
            .map(|s| match s {
                Segment::Literal(t) => (t.to_string(), false),
                Segment::Match { text, .. } => (text.to_string(), true),
            })
            .collect()
    }

    #[test]
    fn no_term_no_annotations_returns_text_unchanged() {
        let segments = partition_text("plain text", "", &[]);
        assert_eq!(segments, vec![Segment::Literal("plain text")]);
    }

    #[test]
    fn single_search_match_with_remainder_literal() {
        let text = "The quick brown fox";
        let segments = partition_text(text, "quick", &[]);

        assert_eq!(
            segments,
            vec![
                Segment::Literal("The "),
                Segment::Match {
                    text: "quick",
                    tag: MatchTag::Search
                },
                Segment::Literal(" brown fox"),
            ]
        );
        // The match covers [4, 9) of the source text.
        assert_eq!(&text[4..9], "quick");
    }

    #[test]
    fn search_is_case_insensitive_and_literal() {
        let segments = partition_text("a+b equals A+B", "a+b", &[]);
        let matched: Vec<_> = spans(&segments)
            .into_iter()
            .filter(|(_, m)| *m)
            .collect();
        assert_eq!(matched.len(), 2);
    }

    #[test]
    fn annotation_matches_across_rewrapped_whitespace() {
        let hl = highlight("h1", "quick  brown");
        let segments = partition_text("The quick\nbrown fox", "", &[&hl]);

        assert_eq!(
            spans(&segments),
            vec![
                ("The ".to_string(), false),
                ("quick\nbrown".to_string(), true),
                (" fox".to_string(), false),
            ]
        );
    }

    #[test]
    fn whitespace_only_annotation_never_matches() {
        let hl = highlight("h1", "   \n  ");
        let segments = partition_text("some text", "", &[&hl]);
        assert_eq!(segments, vec![Segment::Literal("some text")]);
    }

    #[test]
    fn annotation_carries_one_based_display_index() {
        let first = highlight("h1", "alpha");
        let second = highlight("h2", "gamma");
        let segments = partition_text("alpha beta gamma", "", &[&first, &second]);

        let indices: Vec<usize> = segments
            .iter()
            .filter_map(|s| match s {
                Segment::Match {
                    tag: MatchTag::Annotation { display_index, .. },
                    ..
                } => Some(*display_index),
                _ => None,
            })
            .collect();
        assert_eq!(indices, vec![1, 2]);
    }

    #[test]
    fn same_start_overlap_keeps_earlier_enumerated_span() {
        // Search term and annotation both start at offset 4; search records
        // are enumerated first, so the annotation span is dropped whole.
        let hl = highlight("h1", "quick brown");
        let segments = partition_text("The quick brown fox", "quick", &[&hl]);

        assert_eq!(
            segments,
            vec![
                Segment::Literal("The "),
                Segment::Match {
                    text: "quick",
                    tag: MatchTag::Search
                },
                Segment::Literal(" brown fox"),
            ]
        );
    }

    #[test]
    fn earlier_start_wins_across_tags() {
        // Annotation starts before the search match and swallows it.
        let hl = highlight("h1", "The quick");
        let segments = partition_text("The quick brown fox", "quick", &[&hl]);

        assert_eq!(
            spans(&segments),
            vec![
                ("The quick".to_string(), true),
                (" brown fox".to_string(), false),
            ]
        );
    }

    #[test]
    fn adjacent_matches_do_not_merge() {
        let segments = partition_text("aaaa", "aa", &[]);
        assert_eq!(
            spans(&segments),
            vec![("aa".to_string(), true), ("aa".to_string(), true)]
        );
    }
}
