//! Markdown render adapter: maps the document tree to styled terminal
//! lines, routing text runs through the matcher and registering embedded
//! images with the readiness tracker.

use crate::book::{Highlight, HighlightColor};
use crate::images::{ImageState, ImageTracker};
use crate::markdown::{Block, Document, HeadingLevel, Inline, Style, TextOrInline};
use crate::matcher::{self, MatchTag, Segment};
use crate::theme::Base16Palette;
use ratatui::style::{Modifier, Style as TuiStyle};
use ratatui::text::{Line, Span};
use unicode_width::UnicodeWidthStr;

/// Where a styled fragment came from; used for click hit-testing.
#[derive(Debug, Clone, PartialEq)]
enum Origin {
    Plain,
    Annotation { highlight_id: String },
}

#[derive(Debug, Clone)]
struct Frag {
    text: String,
    style: TuiStyle,
    origin: Origin,
}

/// A span of a rendered line occupied by a stored highlight. Coordinates
/// are (line index in the strip, character column range).
#[derive(Debug, Clone, PartialEq)]
pub struct HighlightRegion {
    pub line: usize,
    pub cols: (usize, usize),
    pub highlight_id: String,
}

/// The chapter rendered as one continuous strip of lines at a fixed
/// content width. Recomputed whenever width, content, search term,
/// highlights or font tier change.
#[derive(Debug, Default)]
pub struct RenderedStrip {
    pub lines: Vec<Line<'static>>,
    /// Plain text per line, for selection extraction.
    pub line_text: Vec<String>,
    /// Heading slug -> strip line index.
    pub anchors: Vec<(String, usize)>,
    pub highlight_regions: Vec<HighlightRegion>,
}

impl RenderedStrip {
    pub fn height(&self) -> usize {
        self.lines.len()
    }

    pub fn highlight_at(&self, line: usize, col: usize) -> Option<&str> {
        self.highlight_regions
            .iter()
            .find(|r| r.line == line && col >= r.cols.0 && col < r.cols.1)
            .map(|r| r.highlight_id.as_str())
    }
}

pub struct RenderContext<'a> {
    pub search_term: &'a str,
    pub annotations: Vec<&'a Highlight>,
    pub palette: &'a Base16Palette,
}

/// URL-safe anchor identifier for a heading: lowercase, runs of
/// non-alphanumeric characters collapse to a single separator, ends
/// trimmed.
pub fn slugify(text: &str) -> String {
    let mut slug = String::new();
    let mut pending_sep = false;
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('-');
            }
            pending_sep = false;
            for lower in ch.to_lowercase() {
                slug.push(lower);
            }
        } else {
            pending_sep = true;
        }
    }
    slug
}

pub fn render_chapter(
    doc: &Document,
    width: u16,
    ctx: &RenderContext,
    images: &mut ImageTracker,
) -> RenderedStrip {
    let width = width.max(1) as usize;
    let mut strip = RenderedStrip::default();

    for (i, block) in doc.blocks.iter().enumerate() {
        if i > 0 {
            push_blank(&mut strip);
        }
        match block {
            Block::Heading { content, .. } => {
                if let Some(plain) = content.as_single_plain_text() {
                    let slug = slugify(plain);
                    if !slug.is_empty() {
                        strip.anchors.push((slug, strip.lines.len()));
                    }
                }
                // Headings carry one style for the whole run, so plain
                // textwrap does the line breaking.
                let (text, style) = heading_text(block, ctx);
                for piece in textwrap::wrap(&text, width) {
                    let piece = piece.into_owned();
                    strip.line_text.push(piece.clone());
                    strip.lines.push(Line::from(Span::styled(piece, style)));
                }
            }
            Block::Paragraph { content } => {
                // A lone image is a block of its own and reserves vertical
                // space, so settling its dimensions shifts the flow extent.
                if let Some((src, alt)) = single_image(content) {
                    images.register(src, alt);
                    let height = images.get(src).map(|i| i.height_in_cells()).unwrap_or(1);
                    let frag = image_frag(src, images, ctx.palette);
                    push_wrapped(&mut strip, vec![frag], width, 0);
                    for _ in 1..height {
                        push_blank(&mut strip);
                    }
                } else {
                    let frags = run_frags(content, ctx, images);
                    push_wrapped(&mut strip, frags, width, 0);
                }
            }
            Block::List { ordered, items } => {
                for (n, item) in items.iter().enumerate() {
                    let marker = if *ordered {
                        format!("{}. ", n + 1)
                    } else {
                        "- ".to_string()
                    };
                    let mut frags = vec![Frag {
                        text: marker.clone(),
                        style: TuiStyle::default().fg(ctx.palette.muted_color()),
                        origin: Origin::Plain,
                    }];
                    frags.extend(run_frags(item, ctx, images));
                    push_wrapped(&mut strip, frags, width, marker.width());
                }
            }
            Block::CodeBlock { content, .. } => {
                let style = TuiStyle::default()
                    .fg(ctx.palette.text_color())
                    .bg(ctx.palette.selection_bg());
                for line in content.lines() {
                    strip
                        .lines
                        .push(Line::from(Span::styled(line.to_string(), style)));
                    strip.line_text.push(line.to_string());
                }
            }
        }
    }

    if strip.lines.is_empty() {
        push_blank(&mut strip);
    }
    strip
}

fn push_blank(strip: &mut RenderedStrip) {
    strip.lines.push(Line::default());
    strip.line_text.push(String::new());
}

fn heading_text(block: &Block, ctx: &RenderContext) -> (String, TuiStyle) {
    let Block::Heading { level, content } = block else {
        return (String::new(), TuiStyle::default());
    };
    let mut style = TuiStyle::default()
        .fg(ctx.palette.heading_color())
        .add_modifier(Modifier::BOLD);
    if *level == HeadingLevel::H1 {
        style = style.add_modifier(Modifier::UNDERLINED);
    }
    let mut text = String::new();
    for child in content.iter() {
        match child {
            TextOrInline::Text(node) => text.push_str(&node.content),
            TextOrInline::Inline(Inline::Link { text: label, .. }) => text.push_str(label),
            TextOrInline::Inline(Inline::Image { alt_text, .. }) => text.push_str(alt_text),
            TextOrInline::Inline(Inline::LineBreak) => text.push(' '),
        }
    }
    (flatten_newlines(&text), style)
}

/// Converts one mixed text run into styled fragments. Plain text children
/// route through the matcher; styled children and inline elements pass
/// through unchanged.
fn run_frags(
    content: &crate::markdown::Text,
    ctx: &RenderContext,
    images: &mut ImageTracker,
) -> Vec<Frag> {
    let mut frags = Vec::new();
    for child in content.iter() {
        match child {
            TextOrInline::Text(node) => match node.style {
                None => {
                    for segment in
                        matcher::partition_text(&node.content, ctx.search_term, &ctx.annotations)
                    {
                        frags.push(segment_frag(segment, ctx.palette));
                    }
                }
                Some(style) => frags.push(Frag {
                    text: flatten_newlines(&node.content),
                    style: inline_style(style, ctx.palette),
                    origin: Origin::Plain,
                }),
            },
            TextOrInline::Inline(Inline::Link { text, .. }) => frags.push(Frag {
                text: flatten_newlines(text),
                style: TuiStyle::default()
                    .fg(ctx.palette.heading_color())
                    .add_modifier(Modifier::UNDERLINED),
                origin: Origin::Plain,
            }),
            TextOrInline::Inline(Inline::Image { alt_text, src }) => {
                images.register(src, alt_text);
                frags.push(image_frag(src, images, ctx.palette));
            }
            TextOrInline::Inline(Inline::LineBreak) => frags.push(Frag {
                text: "\n".to_string(),
                style: TuiStyle::default(),
                origin: Origin::Plain,
            }),
        }
    }
    frags
}

fn segment_frag(segment: Segment, palette: &Base16Palette) -> Frag {
    match segment {
        Segment::Literal(text) => Frag {
            text: flatten_newlines(text),
            style: TuiStyle::default().fg(palette.text_color()),
            origin: Origin::Plain,
        },
        Segment::Match { text, tag } => match tag {
            MatchTag::Search => Frag {
                text: flatten_newlines(text),
                style: TuiStyle::default()
                    .fg(palette.search_match_fg())
                    .bg(palette.search_match_bg()),
                origin: Origin::Plain,
            },
            MatchTag::Annotation {
                highlight_id,
                color,
                ..
            } => Frag {
                text: flatten_newlines(text),
                style: annotation_style(color, palette),
                origin: Origin::Annotation { highlight_id },
            },
        },
    }
}

fn annotation_style(color: HighlightColor, palette: &Base16Palette) -> TuiStyle {
    TuiStyle::default()
        .fg(palette.annotation_color(color))
        .add_modifier(Modifier::UNDERLINED)
}

fn inline_style(style: Style, palette: &Base16Palette) -> TuiStyle {
    match style {
        Style::Emphasis => TuiStyle::default()
            .fg(palette.text_color())
            .add_modifier(Modifier::ITALIC),
        Style::Strong => TuiStyle::default()
            .fg(palette.text_color())
            .add_modifier(Modifier::BOLD),
        Style::Code => TuiStyle::default()
            .fg(palette.annotation_color(HighlightColor::Green))
            .bg(palette.selection_bg()),
    }
}

fn image_frag(src: &str, images: &ImageTracker, palette: &Base16Palette) -> Frag {
    let label = match images.get(src).map(|img| &img.state) {
        Some(ImageState::Loaded { width, height }) => {
            format!("[image {src} {width}x{height}]")
        }
        Some(ImageState::Failed { .. }) => format!("[image {src} unavailable]"),
        _ => format!("[image {src} loading]"),
    };
    Frag {
        text: label,
        style: TuiStyle::default().fg(palette.muted_color()),
        origin: Origin::Plain,
    }
}

/// Source newlines are soft wraps; the strip re-flows them at the current
/// width.
fn flatten_newlines(text: &str) -> String {
    text.replace('\n', " ")
}

/// A run consisting of nothing but one image inline.
fn single_image(content: &crate::markdown::Text) -> Option<(&str, &str)> {
    let mut iter = content.iter();
    let first = iter.next()?;
    if iter.next().is_some() {
        return None;
    }
    match first {
        TextOrInline::Inline(Inline::Image { alt_text, src }) => {
            Some((src.as_str(), alt_text.as_str()))
        }
        _ => None,
    }
}

/// Greedy word wrap over styled fragments. Later lines of a wrapped block
/// are indented by `hang` columns (list item continuation).
fn push_wrapped(strip: &mut RenderedStrip, frags: Vec<Frag>, width: usize, hang: usize) {
    let mut line: Vec<Frag> = Vec::new();
    let mut line_width = 0usize;
    let mut first_line = true;

    let indent = |first: bool| if first { 0 } else { hang.min(width.saturating_sub(1)) };

    let mut flush =
        |line: &mut Vec<Frag>, line_width: &mut usize, first_line: &mut bool, strip: &mut RenderedStrip| {
            let pad = indent(*first_line);
            emit_line(strip, std::mem::take(line), pad);
            *line_width = 0;
            *first_line = false;
        };

    for frag in frags {
        for token in tokenize(&frag.text) {
            if token == "\n" {
                flush(&mut line, &mut line_width, &mut first_line, strip);
                continue;
            }
            let token_width = token.width();
            let avail = width.saturating_sub(indent(first_line));
            let is_space = token.chars().all(char::is_whitespace);

            if line_width + token_width > avail && !line.is_empty() {
                flush(&mut line, &mut line_width, &mut first_line, strip);
                if is_space {
                    continue;
                }
            }
            if is_space && line.is_empty() {
                continue;
            }
            line.push(Frag {
                text: token.to_string(),
                style: frag.style,
                origin: frag.origin.clone(),
            });
            line_width += token_width;
        }
    }
    if !line.is_empty() || first_line {
        let pad = indent(first_line);
        emit_line(strip, line, pad);
    }
}

fn emit_line(strip: &mut RenderedStrip, frags: Vec<Frag>, pad: usize) {
    let line_index = strip.lines.len();
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut text = String::new();
    let mut col = 0usize;

    if pad > 0 {
        spans.push(Span::raw(" ".repeat(pad)));
        text.push_str(&" ".repeat(pad));
        col = pad;
    }

    for frag in frags {
        let start = col;
        col += frag.text.width();
        if let Origin::Annotation { highlight_id } = &frag.origin {
            // Adjacent fragments of the same highlight merge into one region.
            match strip.highlight_regions.last_mut() {
                Some(last)
                    if last.line == line_index
                        && last.highlight_id == *highlight_id
                        && last.cols.1 == start =>
                {
                    last.cols.1 = col;
                }
                _ => strip.highlight_regions.push(HighlightRegion {
                    line: line_index,
                    cols: (start, col),
                    highlight_id: highlight_id.clone(),
                }),
            }
        }
        text.push_str(&frag.text);
        spans.push(Span::styled(frag.text, frag.style));
    }

    strip.lines.push(Line::from(spans));
    strip.line_text.push(text);
}

/// Splits into words, runs of spaces, and explicit newlines.
fn tokenize(text: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c == '\n' {
            if i > start {
                tokens.push(&text[start..i]);
            }
            tokens.push("\n");
            start = i + c.len_utf8();
            continue;
        }
        let next_is_boundary = match chars.peek() {
            Some((_, n)) => c.is_whitespace() != n.is_whitespace() || *n == '\n',
            None => true,
        };
        if next_is_boundary {
            let end = i + c.len_utf8();
            tokens.push(&text[start..end]);
            start = end;
        }
    }
    tokens
}
