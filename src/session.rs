//! Reading session orchestration: chapter resolution, pagination
//! settlement, input routing, selection capture, and debounced progress
//! persistence.

use crate::book::{Book, Highlight, HighlightColor};
use crate::images::ImageTracker;
use crate::markdown::Document;
use crate::navigation::{self, ChapterHandoff, DragTracker, NavIntent, NavOutcome};
use crate::pagination::{
    self, LayoutMeasurer, PaginationEngine, PaginationEvent, TerminalMeasurer,
};
use crate::parsing::parse_markdown;
use crate::render::{RenderContext, RenderedStrip, render_chapter};
use crate::search::SearchState;
use crate::settings;
use crate::storage::BookPersistence;
use crate::store::ReaderStore;
use crate::theme;
use crossterm::event::{KeyCode, KeyEvent, MouseEvent, MouseEventKind};
use log::{debug, error};
use ratatui::Frame;
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Rapid page flips collapse into one write this long after input settles.
pub const PROGRESS_SAVE_DEBOUNCE: Duration = Duration::from_millis(500);
/// Average adult reading speed used for the footer estimate.
pub const WORDS_PER_MINUTE: usize = 238;
/// Notifications linger this long in the footer.
const NOTIFICATION_TTL: Duration = Duration::from_secs(3);
/// Selections shorter than this many characters are treated as clicks.
const MIN_SELECTION_CHARS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Continue,
    Exit,
}

/// Exclusive claim on text-selection input for the reading surface's
/// active lifetime; released deterministically on teardown.
#[derive(Debug, Default)]
pub struct SelectionCapture {
    held: bool,
}

impl SelectionCapture {
    fn acquire(&mut self) {
        self.held = true;
    }

    fn release(&mut self) {
        self.held = false;
    }

    pub fn is_held(&self) -> bool {
        self.held
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StripPos {
    line: usize,
    col: usize,
}

#[derive(Debug, Clone, Copy)]
struct Selection {
    anchor: StripPos,
    head: StripPos,
}

impl Selection {
    fn ordered(&self) -> (StripPos, StripPos) {
        if (self.head.line, self.head.col) < (self.anchor.line, self.anchor.col) {
            (self.head, self.anchor)
        } else {
            (self.anchor, self.head)
        }
    }
}

/// What a press turned out to be; decided by the first motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MouseMode {
    Undecided,
    PageDrag,
    Select,
}

pub struct ReadingSession {
    store: ReaderStore,
    engine: PaginationEngine,
    measurer: Box<dyn LayoutMeasurer>,
    images: ImageTracker,
    doc: Document,
    doc_chapter: Option<String>,
    strip: RenderedStrip,
    strip_dirty: bool,
    recompute_pending: bool,
    search: SearchState,
    drag: DragTracker,
    mouse_mode: Option<MouseMode>,
    press: Option<(u16, u16)>,
    selection: Option<Selection>,
    selection_capture: SelectionCapture,
    progress_deadline: Option<Instant>,
    content_area: Rect,
    notification: Option<(String, Instant)>,
}

impl ReadingSession {
    pub fn new(book: Book, base_dir: Option<PathBuf>) -> Self {
        let mut capture = SelectionCapture::default();
        capture.acquire();
        Self {
            store: ReaderStore::new(book),
            engine: PaginationEngine::new(),
            measurer: Box::new(TerminalMeasurer),
            images: ImageTracker::new(base_dir),
            doc: Document::default(),
            doc_chapter: None,
            strip: RenderedStrip::default(),
            strip_dirty: true,
            recompute_pending: true,
            search: SearchState::default(),
            drag: DragTracker::default(),
            mouse_mode: None,
            press: None,
            selection: None,
            selection_capture: capture,
            progress_deadline: None,
            content_area: Rect::default(),
            notification: None,
        }
    }

    /// Swaps the layout measurer; tests use the deterministic model.
    pub fn with_measurer(mut self, measurer: Box<dyn LayoutMeasurer>) -> Self {
        self.measurer = measurer;
        self
    }

    pub fn store(&self) -> &ReaderStore {
        &self.store
    }

    pub fn current_page(&self) -> usize {
        self.store.current_page()
    }

    pub fn total_pages(&self) -> usize {
        self.engine.total_pages()
    }

    pub fn selection_capture_held(&self) -> bool {
        self.selection_capture.is_held()
    }

    pub fn next_timer_deadline(&self) -> Option<Instant> {
        match (self.engine.next_deadline(), self.progress_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn is_animating(&self) -> bool {
        self.engine.is_animating()
    }

    fn handoff(&self) -> ChapterHandoff {
        ChapterHandoff {
            has_prev: self.store.prev_chapter_id().is_some(),
            has_next: self.store.next_chapter_id().is_some(),
        }
    }

    /// Content, search term, highlight list or font tier changed: the
    /// strip must re-render and the page count must re-settle.
    fn content_changed(&mut self, now: Instant) {
        self.strip_dirty = true;
        self.recompute_pending = true;
        self.engine.mark_content_changed(now);
    }

    fn schedule_progress_save(&mut self, now: Instant) {
        self.progress_deadline = Some(now + PROGRESS_SAVE_DEBOUNCE);
    }

    fn notify(&mut self, message: impl Into<String>, now: Instant) {
        self.notification = Some((message.into(), now + NOTIFICATION_TTL));
    }

    // --- chapter / strip lifecycle ---------------------------------------

    fn refresh_document(&mut self) {
        let current = self.store.current_chapter_id().to_string();
        if self.doc_chapter.as_deref() == Some(current.as_str()) {
            return;
        }
        self.doc = match self.store.current_chapter() {
            Some(chapter) => parse_markdown(&chapter.content),
            None => {
                // Missing chapter renders a minimal fallback, never an error.
                debug!("Chapter {current} not found, rendering fallback");
                parse_markdown(&format!(
                    "# {}\n\nThis chapter is unavailable.",
                    self.store.book().title
                ))
            }
        };
        self.doc_chapter = Some(current);
        self.images.reset();
    }

    fn rebuild_strip(&mut self) {
        let Some(dims) = self.engine.dims() else {
            return;
        };
        self.refresh_document();
        let chapter_id = self.store.current_chapter_id().to_string();
        let annotations = self.store.book().highlights_for_chapter(&chapter_id);
        let ctx = RenderContext {
            search_term: self.search.term(),
            annotations,
            palette: theme::current_theme(),
        };
        self.strip = render_chapter(&self.doc, dims.width, &ctx, &mut self.images);
        self.strip_dirty = false;
    }

    fn change_chapter(&mut self, chapter_id: &str, now: Instant) {
        self.store.set_current_chapter(chapter_id);
        self.engine.snap_to_page(0);
        self.selection = None;
        self.content_changed(now);
        self.schedule_progress_save(now);
    }

    // --- navigation -------------------------------------------------------

    fn navigate(&mut self, intent: NavIntent, now: Instant) {
        let outcome = navigation::resolve(
            intent,
            self.store.current_page(),
            self.engine.total_pages(),
            self.handoff(),
        );
        match outcome {
            NavOutcome::PageChanged(page) => {
                self.store.set_current_page(page);
                self.engine.set_page(page);
                self.schedule_progress_save(now);
            }
            NavOutcome::ChapterNext => {
                if let Some(id) = self.store.next_chapter_id() {
                    self.change_chapter(&id, now);
                }
            }
            NavOutcome::ChapterPrev => {
                if let Some(id) = self.store.prev_chapter_id() {
                    self.change_chapter(&id, now);
                }
            }
            NavOutcome::NoOp => {}
        }
    }

    // --- input ------------------------------------------------------------

    pub fn handle_key(&mut self, key: &KeyEvent, now: Instant) -> SessionOutcome {
        if self.search.is_typing() {
            match key.code {
                KeyCode::Esc => {
                    self.search.cancel();
                    self.content_changed(now);
                }
                KeyCode::Enter => self.search.confirm(),
                KeyCode::Backspace => {
                    self.search.pop_char();
                    self.content_changed(now);
                }
                KeyCode::Char(c) => {
                    self.search.push_char(c);
                    self.content_changed(now);
                }
                _ => {}
            }
            return SessionOutcome::Continue;
        }

        if let Some(intent) = navigation::key_intent(key) {
            self.navigate(intent, now);
            return SessionOutcome::Continue;
        }

        match key.code {
            KeyCode::Char('/') => self.search.start(),
            KeyCode::Esc => {
                if self.search.is_active() {
                    self.search.cancel();
                    self.content_changed(now);
                } else {
                    return SessionOutcome::Exit;
                }
            }
            KeyCode::Char('q') => return SessionOutcome::Exit,
            KeyCode::Char('+') | KeyCode::Char('=') => {
                settings::update_settings(|s| s.font_size = s.font_size.next());
                let tier = settings::current_settings().font_size;
                self.notify(format!("Text size: {}", tier.as_str()), now);
                self.content_changed(now);
            }
            KeyCode::Char('-') => {
                settings::update_settings(|s| s.font_size = s.font_size.prev());
                let tier = settings::current_settings().font_size;
                self.notify(format!("Text size: {}", tier.as_str()), now);
                self.content_changed(now);
            }
            KeyCode::Char('t') => {
                let themes = theme::ThemeId::all();
                let current = theme::current_theme_id();
                let next = themes
                    .iter()
                    .cycle()
                    .skip_while(|t| **t != current)
                    .nth(1)
                    .copied()
                    .unwrap_or_default();
                theme::set_theme(next);
                settings::update_settings(|s| s.theme = next.name().to_string());
                self.strip_dirty = true;
            }
            _ => {}
        }
        SessionOutcome::Continue
    }

    pub fn handle_mouse(
        &mut self,
        event: &MouseEvent,
        now: Instant,
        persistence: &dyn BookPersistence,
    ) {
        match event.kind {
            MouseEventKind::Down(_) => {
                self.press = Some((event.column, event.row));
                self.mouse_mode = Some(MouseMode::Undecided);
                self.drag.begin(event.column, now);
                if let Some(pos) = self.strip_pos(event.column, event.row) {
                    self.selection = Some(Selection {
                        anchor: pos,
                        head: pos,
                    });
                }
            }
            MouseEventKind::Drag(_) => self.on_mouse_drag(event.column, event.row, now),
            MouseEventKind::Up(_) => self.on_mouse_up(event.column, event.row, now, persistence),
            _ => {}
        }
    }

    fn on_mouse_drag(&mut self, x: u16, y: u16, now: Instant) {
        let Some((px, py)) = self.press else { return };
        let dx = x as i32 - px as i32;
        let dy = y as i32 - py as i32;

        if self.mouse_mode == Some(MouseMode::Undecided) {
            if dy.abs() >= 1 {
                self.mouse_mode = Some(MouseMode::Select);
            } else if dx.abs() >= 3 {
                self.mouse_mode = Some(MouseMode::PageDrag);
                self.engine.begin_drag();
            }
        }

        match self.mouse_mode {
            Some(MouseMode::PageDrag) => {
                self.drag.update(x, now);
                self.engine.apply_drag(dx);
            }
            Some(MouseMode::Select) => {
                if self.selection_capture.is_held() {
                    let pos = self.strip_pos(x, y);
                    if let (Some(selection), Some(pos)) = (self.selection.as_mut(), pos) {
                        selection.head = pos;
                    }
                }
            }
            _ => {}
        }
    }

    fn on_mouse_up(
        &mut self,
        x: u16,
        y: u16,
        now: Instant,
        persistence: &dyn BookPersistence,
    ) {
        let mode = self.mouse_mode.take().unwrap_or(MouseMode::Undecided);
        match mode {
            MouseMode::PageDrag => {
                let intent = self.drag.release(x, now);
                if let Some(intent) = intent {
                    self.navigate(intent, now);
                }
                self.engine.end_drag();
                self.selection = None;
            }
            MouseMode::Select => {
                self.drag.cancel();
                if let Some(pos) = self.strip_pos(x, y) {
                    if let Some(selection) = self.selection.as_mut() {
                        selection.head = pos;
                    }
                }
                self.finish_selection(now, persistence);
            }
            MouseMode::Undecided => {
                self.drag.cancel();
                self.selection = None;
                self.on_click(x, y, now);
            }
        }
        self.press = None;
    }

    fn on_click(&mut self, x: u16, y: u16, now: Instant) {
        if !self.content_area.contains(ratatui::layout::Position::new(x, y)) {
            return;
        }
        if let Some(intent) = navigation::tap_zone_intent(x, self.content_area) {
            self.navigate(intent, now);
            return;
        }
        if let Some(pos) = self.strip_pos(x, y) {
            if let Some(id) = self.strip.highlight_at(pos.line, pos.col) {
                let id = id.to_string();
                // A noteless highlight still acknowledges the click.
                let message = self
                    .store
                    .book()
                    .highlights
                    .iter()
                    .find(|h| h.id == id)
                    .map(|h| match &h.note {
                        Some(note) => note.clone(),
                        None => format!("{} highlight", h.color.as_str()),
                    });
                if let Some(message) = message {
                    self.notify(message, now);
                }
            }
        }
    }

    fn finish_selection(&mut self, now: Instant, persistence: &dyn BookPersistence) {
        let Some(selection) = self.selection.take() else {
            return;
        };
        if !self.selection_capture.is_held() {
            return;
        }
        let text = self.selected_text(&selection);
        if text.trim().chars().count() < MIN_SELECTION_CHARS {
            return;
        }
        let chapter_id = self.store.current_chapter_id().to_string();
        let highlight = Highlight::new(&chapter_id, &text, HighlightColor::Yellow);
        self.store.book_mut().add_highlight(highlight);
        if let Err(e) = persistence.save(self.store.book()) {
            error!("Failed to save highlight: {e}");
        }
        self.notify("Highlighted", now);
        self.content_changed(now);
    }

    fn selected_text(&self, selection: &Selection) -> String {
        let (from, to) = selection.ordered();
        let mut parts = Vec::new();
        for line in from.line..=to.line {
            let Some(text) = self.strip.line_text.get(line) else {
                break;
            };
            let start = if line == from.line { from.col } else { 0 };
            let end = if line == to.line {
                to.col + 1
            } else {
                text.chars().count()
            };
            parts.push(substring_chars(text, start, end));
        }
        parts.join("\n").trim().to_string()
    }

    /// Viewport coordinates -> strip line/column, through the current page.
    fn strip_pos(&self, x: u16, y: u16) -> Option<StripPos> {
        let area = self.content_area;
        if !area.contains(ratatui::layout::Position::new(x, y)) {
            return None;
        }
        let viewport = area.height.max(1) as usize;
        let line = self.store.current_page() * viewport + (y - area.y) as usize;
        if line >= self.strip.height() {
            return None;
        }
        Some(StripPos {
            line,
            col: (x - area.x) as usize,
        })
    }

    // --- settlement -------------------------------------------------------

    /// One event-loop tick: re-settle timers, image readiness, bounds
    /// repair, debounced progress persistence and the page transition.
    pub fn on_tick(&mut self, now: Instant, persistence: &dyn BookPersistence) {
        if self.engine.poll_resettle(now) {
            self.recompute_pending = true;
        }

        if !self.images.all_settled() && self.images.resolve_pending() {
            // A settled image can change placeholder heights; re-measure.
            self.content_changed(now);
        }

        if self.recompute_pending && self.engine.dims().is_some() {
            if self.strip_dirty {
                self.rebuild_strip();
            }
            let events =
                self.engine
                    .recompute(&self.strip, self.measurer.as_ref(), self.store.current_page());
            self.apply_pagination_events(events, now);
            self.recompute_pending = false;
        }

        if let Some(deadline) = self.progress_deadline {
            if now >= deadline {
                self.progress_deadline = None;
                // Fire-and-forget: a failed write never disturbs reading.
                if let Err(e) = self.store.save_reading_progress(persistence) {
                    error!("Failed to save reading progress: {e}");
                }
            }
        }

        if let Some((_, expires)) = self.notification {
            if now >= expires {
                self.notification = None;
            }
        }

        self.engine.tick_animation();
    }

    fn apply_pagination_events(&mut self, events: Vec<PaginationEvent>, now: Instant) {
        for event in events {
            match event {
                PaginationEvent::TotalPagesChanged(total) => {
                    debug!("Total pages now {total}");
                }
                PaginationEvent::PageClamped(page) => {
                    self.store.set_current_page(page);
                    self.engine.snap_to_page(page);
                    self.schedule_progress_save(now);
                }
            }
        }
    }

    /// Leaves the reading surface: cancels every pending timer, flushes
    /// unsaved progress, releases the selection capture.
    pub fn teardown(&mut self, persistence: &dyn BookPersistence) {
        self.engine.cancel_pending();
        if self.progress_deadline.take().is_some() {
            if let Err(e) = self.store.save_reading_progress(persistence) {
                error!("Failed to save reading progress on teardown: {e}");
            }
        }
        self.selection_capture.release();
    }

    // --- presentation -----------------------------------------------------

    pub fn draw(&mut self, f: &mut Frame, area: Rect, now: Instant) {
        let chunks = Layout::vertical([
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(area);

        let margin = settings::current_settings().font_size.content_margin() + 1;
        let content = inset_horizontal(chunks[1], margin);
        self.content_area = content;

        if self
            .engine
            .observe_geometry(content.width, content.height, now)
        {
            self.strip_dirty = true;
            self.recompute_pending = true;
        }
        if self.strip_dirty && self.engine.dims().is_some() {
            self.rebuild_strip();
        }

        self.draw_title_bar(f, chunks[0]);
        self.draw_content(f, content);
        self.draw_nav_buttons(f, chunks[1]);
        self.draw_footer(f, chunks[2], now);
    }

    fn draw_title_bar(&self, f: &mut Frame, area: Rect) {
        let palette = theme::current_theme();
        let title = self
            .store
            .current_chapter()
            .map(|c| c.title.clone())
            .unwrap_or_else(|| self.store.book().title.clone());
        let mut spans = vec![Span::styled(
            title,
            Style::default()
                .fg(palette.heading_color())
                .add_modifier(Modifier::BOLD),
        )];
        if self.search.is_active() {
            let prompt = format!("  /{}", self.search.term());
            spans.push(Span::styled(
                prompt,
                Style::default().fg(palette.search_match_bg()),
            ));
            if self.search.is_typing() {
                spans.push(Span::styled("▏", Style::default().fg(palette.text_color())));
            }
        }
        f.render_widget(Paragraph::new(Line::from(spans)), area);
    }

    fn draw_content(&mut self, f: &mut Frame, area: Rect) {
        let Some(dims) = self.engine.dims() else {
            return;
        };
        let offset = self.engine.visual_offset();
        let settled = (offset - offset.round()).abs() < f32::EPSILON;
        let rows = if settled {
            let mut rows =
                pagination::page_rows(&self.strip, dims, offset.round() as usize).to_vec();
            self.overlay_selection(&mut rows, dims);
            rows
        } else {
            pagination::animated_rows(&self.strip, dims, offset)
        };
        f.render_widget(Paragraph::new(ratatui::text::Text::from(rows)), area);
    }

    /// Reversed-video feedback over the in-progress selection.
    fn overlay_selection(&self, rows: &mut [Line<'static>], dims: pagination::LayoutDims) {
        let Some(selection) = self.selection else {
            return;
        };
        if self.mouse_mode != Some(MouseMode::Select) {
            return;
        }
        let (from, to) = selection.ordered();
        let viewport = dims.height.max(1) as usize;
        let page_start = self.store.current_page() * viewport;
        for (row_idx, row) in rows.iter_mut().enumerate() {
            let line = page_start + row_idx;
            if line < from.line || line > to.line {
                continue;
            }
            let text = self.strip.line_text.get(line).cloned().unwrap_or_default();
            let start = if line == from.line { from.col } else { 0 };
            let end = if line == to.line {
                to.col + 1
            } else {
                text.chars().count()
            };
            *row = selection_line(&text, start, end);
        }
    }

    fn draw_nav_buttons(&self, f: &mut Frame, area: Rect) {
        let palette = theme::current_theme();
        let (page, total) = (self.store.current_page(), self.engine.total_pages());
        let style = Style::default().fg(palette.muted_color());
        let mid_y = area.y + area.height / 2;
        if area.width < 2 || area.height == 0 {
            return;
        }
        // Hidden entirely when there is no destination.
        if navigation::can_navigate(NavIntent::Retreat, page, total, self.handoff()) {
            f.render_widget(
                Paragraph::new(Span::styled("‹", style)),
                Rect::new(area.x, mid_y, 1, 1),
            );
        }
        if navigation::can_navigate(NavIntent::Advance, page, total, self.handoff()) {
            f.render_widget(
                Paragraph::new(Span::styled("›", style)),
                Rect::new(area.x + area.width - 1, mid_y, 1, 1),
            );
        }
    }

    fn draw_footer(&self, f: &mut Frame, area: Rect, now: Instant) {
        let palette = theme::current_theme();
        let line = match &self.notification {
            Some((message, expires)) if *expires > now => Line::from(Span::styled(
                message.clone(),
                Style::default().fg(palette.search_match_bg()),
            )),
            _ => {
                let (chapter_index, chapter_count) = self.store.chapter_position();
                let page = self.store.current_page();
                let total = self.engine.total_pages();
                let words = self
                    .store
                    .current_chapter()
                    .map(|c| c.word_count())
                    .unwrap_or(0);
                let percent = if chapter_count == 0 {
                    0
                } else {
                    ((chapter_index as f64 + (page + 1) as f64 / total.max(1) as f64)
                        / chapter_count as f64
                        * 100.0)
                        .round() as u32
                };
                Line::from(Span::styled(
                    format!(
                        "{}/{}  ·  {}%  ·  {}",
                        page + 1,
                        total,
                        percent.min(100),
                        time_remaining_label(words, total, page),
                    ),
                    Style::default().fg(palette.muted_color()),
                ))
            }
        };
        f.render_widget(Paragraph::new(line).right_aligned(), area);
    }
}

/// `"~N min left"` from the per-page word density, at 238 wpm. Zero pages
/// or zero words never divide; they fall back to the neutral estimate.
pub fn time_remaining_label(total_words: usize, total_pages: usize, current_page: usize) -> String {
    if total_pages == 0 || total_words == 0 {
        return "almost done".to_string();
    }
    let words_per_page = total_words as f64 / total_pages as f64;
    let pages_left = total_pages.saturating_sub(current_page);
    let words_left = words_per_page * pages_left as f64;
    let minutes = (words_left / WORDS_PER_MINUTE as f64).ceil() as u64;
    if minutes == 0 {
        "almost done".to_string()
    } else {
        format!("~{minutes} min left")
    }
}

fn inset_horizontal(area: Rect, margin: u16) -> Rect {
    let margin = margin.min(area.width / 2);
    Rect::new(
        area.x + margin,
        area.y,
        area.width.saturating_sub(margin * 2),
        area.height,
    )
}

fn substring_chars(text: &str, from: usize, to: usize) -> String {
    text.chars().skip(from).take(to.saturating_sub(from)).collect()
}

fn selection_line(text: &str, start: usize, end: usize) -> Line<'static> {
    let palette = theme::current_theme();
    let before: String = text.chars().take(start).collect();
    let selected: String = text
        .chars()
        .skip(start)
        .take(end.saturating_sub(start))
        .collect();
    let after: String = text.chars().skip(end).collect();
    Line::from(vec![
        Span::styled(before, Style::default().fg(palette.text_color())),
        Span::styled(
            selected,
            Style::default()
                .bg(palette.selection_bg())
                .add_modifier(Modifier::REVERSED),
        ),
        Span::styled(after, Style::default().fg(palette.text_color())),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::Chapter;
    use crate::pagination::FixedCharsPerPage;
    use crate::storage::JsonBookStore;

    fn book(chapter_words: usize) -> Book {
        let content = (0..chapter_words)
            .map(|i| format!("word{i}"))
            .collect::<Vec<_>>()
            .join(" ");
        Book {
            id: "b1".to_string(),
            title: "Test Book".to_string(),
            author: None,
            chapters: vec![
                Chapter {
                    id: "c1".to_string(),
                    title: "One".to_string(),
                    order: 1,
                    content: content.clone(),
                },
                Chapter {
                    id: "c2".to_string(),
                    title: "Two".to_string(),
                    order: 2,
                    content,
                },
            ],
            highlights: Vec::new(),
            progress: None,
        }
    }

    fn settled_session(tmp: &tempfile::TempDir) -> (ReadingSession, JsonBookStore) {
        let persistence = JsonBookStore::new(tmp.path());
        let mut session = ReadingSession::new(book(200), None)
            .with_measurer(Box::new(FixedCharsPerPage { chars_per_page: 300 }));
        let now = Instant::now();
        session.engine.observe_geometry(80, 24, now);
        session.on_tick(now, &persistence);
        (session, persistence)
    }

    #[test]
    fn time_estimate_matches_average_reading_speed() {
        assert_eq!(time_remaining_label(4760, 20, 10), "~10 min left");
    }

    #[test]
    fn time_estimate_guards_zero_pages_and_words() {
        assert_eq!(time_remaining_label(0, 10, 0), "almost done");
        assert_eq!(time_remaining_label(100, 0, 0), "almost done");
    }

    #[test]
    fn settlement_clamps_out_of_range_page() {
        let tmp = tempfile::tempdir().unwrap();
        let (mut session, persistence) = settled_session(&tmp);

        // Externally supplied index far past the end.
        session.store.set_current_page(99);
        session.recompute_pending = true;
        session.on_tick(Instant::now(), &persistence);

        let total = session.total_pages();
        assert!(total >= 1);
        assert_eq!(session.current_page(), total - 1);
    }

    #[test]
    fn advance_at_final_boundary_is_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let (mut session, _persistence) = settled_session(&tmp);
        let now = Instant::now();

        // Walk to the very end of the last chapter.
        session.change_chapter("c2", now);
        let last = session.total_pages() - 1;
        session.store.set_current_page(last);

        session.navigate(NavIntent::Advance, now);
        assert_eq!(session.current_page(), last);
        assert_eq!(session.store.current_chapter_id(), "c2");
    }

    #[test]
    fn advance_past_chapter_end_hands_off_and_resets_page() {
        let tmp = tempfile::tempdir().unwrap();
        let (mut session, persistence) = settled_session(&tmp);
        let now = Instant::now();

        let last = session.total_pages() - 1;
        session.store.set_current_page(last);
        session.navigate(NavIntent::Advance, now);
        session.on_tick(now, &persistence);

        assert_eq!(session.store.current_chapter_id(), "c2");
        assert_eq!(session.current_page(), 0);
    }

    #[test]
    fn progress_save_debounces_rapid_page_changes() {
        let tmp = tempfile::tempdir().unwrap();
        let (mut session, persistence) = settled_session(&tmp);
        let t0 = Instant::now();

        session.navigate(NavIntent::Advance, t0);
        session.on_tick(t0 + Duration::from_millis(100), &persistence);
        // Not yet persisted: the debounce window is still open.
        assert!(persistence.load("b1").is_err());

        session.navigate(NavIntent::Advance, t0 + Duration::from_millis(200));
        // First deadline was superseded; still nothing at t0+600.
        session.on_tick(t0 + Duration::from_millis(600), &persistence);
        assert!(persistence.load("b1").is_err());

        session.on_tick(t0 + Duration::from_millis(800), &persistence);
        let saved = persistence.load("b1").unwrap();
        assert_eq!(saved.progress.unwrap().page_index, 2);
    }

    #[test]
    fn teardown_flushes_progress_and_releases_capture() {
        let tmp = tempfile::tempdir().unwrap();
        let (mut session, persistence) = settled_session(&tmp);
        let now = Instant::now();

        session.navigate(NavIntent::Advance, now);
        assert!(session.selection_capture_held());

        session.teardown(&persistence);
        assert!(!session.selection_capture_held());
        assert!(session.next_timer_deadline().is_none());
        let saved = persistence.load("b1").unwrap();
        assert_eq!(saved.progress.unwrap().page_index, 1);
    }

    #[test]
    fn missing_chapter_renders_fallback_not_error() {
        let tmp = tempfile::tempdir().unwrap();
        let persistence = JsonBookStore::new(tmp.path());
        let mut empty = book(10);
        empty.chapters.clear();
        let mut session = ReadingSession::new(empty, None);
        let now = Instant::now();
        session.engine.observe_geometry(80, 24, now);
        session.on_tick(now, &persistence);

        assert!(session.strip.height() >= 1);
        let text = session.strip.line_text.join(" ");
        assert!(text.contains("unavailable"));
    }
}
