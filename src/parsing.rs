//! Markdown → document tree, via pulldown-cmark.
//!
//! This is the reading surface's parsing collaborator: it produces the
//! [`Document`] model and nothing else. No layout, no styling decisions.

use crate::markdown::{
    Block, Document, HeadingLevel, Inline, Style, Text, TextNode, TextOrInline,
};
use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};

pub fn parse_markdown(source: &str) -> Document {
    let parser = Parser::new_ext(source, Options::empty());

    let mut blocks: Vec<Block> = Vec::new();
    let mut run = Text::default();
    let mut style_stack: Vec<Style> = Vec::new();

    // Open list context: (ordered, items collected so far).
    let mut list: Option<(bool, Vec<Text>)> = None;
    let mut list_depth = 0usize;

    let mut code: Option<(Option<String>, String)> = None;
    let mut link: Option<(String, String)> = None;
    let mut image: Option<(String, String)> = None;
    let mut heading: Option<HeadingLevel> = None;

    for event in parser {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                heading = HeadingLevel::from_u8(level as u8).or(Some(HeadingLevel::H3));
                run = Text::default();
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some(level) = heading.take() {
                    blocks.push(Block::Heading {
                        level,
                        content: std::mem::take(&mut run),
                    });
                }
            }
            Event::Start(Tag::Paragraph) => {
                if list.is_none() {
                    run = Text::default();
                }
            }
            Event::End(TagEnd::Paragraph) => {
                if list.is_none() && !run.is_empty() {
                    blocks.push(Block::Paragraph {
                        content: std::mem::take(&mut run),
                    });
                }
            }
            Event::Start(Tag::List(start)) => {
                list_depth += 1;
                if list.is_none() {
                    list = Some((start.is_some(), Vec::new()));
                }
            }
            Event::End(TagEnd::List(_)) => {
                list_depth = list_depth.saturating_sub(1);
                if list_depth == 0 {
                    if let Some((ordered, items)) = list.take() {
                        if !items.is_empty() {
                            blocks.push(Block::List { ordered, items });
                        }
                    }
                }
            }
            Event::Start(Tag::Item) => {
                run = Text::default();
            }
            Event::End(TagEnd::Item) => {
                if let Some((_, items)) = list.as_mut() {
                    if !run.is_empty() {
                        items.push(std::mem::take(&mut run));
                    }
                }
            }
            Event::Start(Tag::CodeBlock(kind)) => {
                let language = match kind {
                    CodeBlockKind::Fenced(lang) if !lang.is_empty() => {
                        Some(lang.into_string())
                    }
                    _ => None,
                };
                code = Some((language, String::new()));
            }
            Event::End(TagEnd::CodeBlock) => {
                if let Some((language, content)) = code.take() {
                    blocks.push(Block::CodeBlock { language, content });
                }
            }
            Event::Start(Tag::Emphasis) => style_stack.push(Style::Emphasis),
            Event::End(TagEnd::Emphasis) => {
                style_stack.pop();
            }
            Event::Start(Tag::Strong) => style_stack.push(Style::Strong),
            Event::End(TagEnd::Strong) => {
                style_stack.pop();
            }
            Event::Start(Tag::Link { dest_url, .. }) => {
                link = Some((String::new(), dest_url.into_string()));
            }
            Event::End(TagEnd::Link) => {
                if let Some((text, url)) = link.take() {
                    run.push_inline(Inline::Link { text, url });
                }
            }
            Event::Start(Tag::Image { dest_url, .. }) => {
                image = Some((String::new(), dest_url.into_string()));
            }
            Event::End(TagEnd::Image) => {
                if let Some((alt_text, src)) = image.take() {
                    run.push_inline(Inline::Image { alt_text, src });
                }
            }
            Event::Text(text) => {
                if let Some((_, content)) = code.as_mut() {
                    content.push_str(&text);
                } else if let Some((alt, _)) = image.as_mut() {
                    alt.push_str(&text);
                } else if let Some((label, _)) = link.as_mut() {
                    label.push_str(&text);
                } else {
                    append_text(&mut run, &text, style_stack.last().copied());
                }
            }
            Event::Code(text) => {
                if let Some((label, _)) = link.as_mut() {
                    label.push_str(&text);
                } else {
                    run.push_text(TextNode::styled(text.into_string(), Style::Code));
                }
            }
            Event::SoftBreak => {
                // Source line wrap inside a block; kept as a newline so
                // stored highlight text still matches re-flowed content.
                append_text(&mut run, "\n", style_stack.last().copied());
            }
            Event::HardBreak => run.push_inline(Inline::LineBreak),
            _ => {}
        }
    }

    Document { blocks }
}

/// Appends to the run, merging into the previous node when the style is
/// unchanged so a heading parsed from several events still reads as a
/// single plain run.
fn append_text(run: &mut Text, content: &str, style: Option<Style>) {
    if let Some(TextOrInline::Text(last)) = run.last_mut() {
        if last.style == style {
            last.content.push_str(content);
            return;
        }
    }
    run.push_text(TextNode {
        content: content.to_string(),
        style,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headings_levels_one_to_three_are_typed() {
        let doc = parse_markdown("# One\n\n## Two\n\n### Three\n");
        let levels: Vec<HeadingLevel> = doc
            .blocks
            .iter()
            .filter_map(|b| match b {
                Block::Heading { level, .. } => Some(*level),
                _ => None,
            })
            .collect();
        assert_eq!(
            levels,
            vec![HeadingLevel::H1, HeadingLevel::H2, HeadingLevel::H3]
        );
    }

    #[test]
    fn deeper_headings_clamp_to_h3() {
        let doc = parse_markdown("##### Deep\n");
        assert!(matches!(
            doc.blocks[0],
            Block::Heading {
                level: HeadingLevel::H3,
                ..
            }
        ));
    }

    #[test]
    fn heading_with_plain_content_is_single_run() {
        let doc = parse_markdown("# Chapter One\n");
        let Block::Heading { content, .. } = &doc.blocks[0] else {
            panic!("expected heading");
        };
        assert_eq!(content.as_single_plain_text(), Some("Chapter One"));
    }

    #[test]
    fn heading_with_emphasis_is_composite() {
        let doc = parse_markdown("# Chapter *One*\n");
        let Block::Heading { content, .. } = &doc.blocks[0] else {
            panic!("expected heading");
        };
        assert_eq!(content.as_single_plain_text(), None);
    }

    #[test]
    fn soft_break_becomes_newline_in_run() {
        let doc = parse_markdown("quick\nbrown\n");
        let Block::Paragraph { content } = &doc.blocks[0] else {
            panic!("expected paragraph");
        };
        assert_eq!(content.as_single_plain_text(), Some("quick\nbrown"));
    }

    #[test]
    fn lists_collect_item_runs() {
        let doc = parse_markdown("- alpha\n- beta\n");
        let Block::List { ordered, items } = &doc.blocks[0] else {
            panic!("expected list");
        };
        assert!(!ordered);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_single_plain_text(), Some("alpha"));
    }

    #[test]
    fn images_survive_as_inline_nodes() {
        let doc = parse_markdown("![cover art](images/cover.png)\n");
        let Block::Paragraph { content } = &doc.blocks[0] else {
            panic!("expected paragraph");
        };
        let inline = content.iter().next().unwrap();
        assert_eq!(
            *inline,
            TextOrInline::Inline(Inline::Image {
                alt_text: "cover art".to_string(),
                src: "images/cover.png".to_string(),
            })
        );
    }

    #[test]
    fn fenced_code_keeps_language_and_body() {
        let doc = parse_markdown("```rust\nfn main() {}\n```\n");
        assert_eq!(
            doc.blocks[0],
            Block::CodeBlock {
                language: Some("rust".to_string()),
                content: "fn main() {}\n".to_string(),
            }
        );
    }
}
