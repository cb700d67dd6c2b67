use crate::book::Book;
use crate::event_source::EventSource;
use crate::session::{ReadingSession, SessionOutcome};
use crate::storage::{BookPersistence, JsonBookStore};
use crate::theme;
use anyhow::Result;
use crossterm::event::{Event, KeyCode, KeyEventKind};
use log::info;
use ratatui::Terminal;
use ratatui::backend::Backend;
use ratatui::layout::Rect;
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use std::path::PathBuf;
use std::time::{Duration, Instant};

const TICK_RATE: Duration = Duration::from_millis(50);
const ANIMATION_TICK: Duration = Duration::from_millis(16);

pub struct App {
    store: JsonBookStore,
    books: Vec<(PathBuf, Book)>,
    list_state: ListState,
    session: Option<ReadingSession>,
    should_quit: bool,
}

impl App {
    /// Library mode over every book found under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let store = JsonBookStore::new(root);
        let books = store.discover();
        let mut list_state = ListState::default();
        if !books.is_empty() {
            list_state.select(Some(0));
        }
        Self {
            store,
            books,
            list_state,
            session: None,
            should_quit: false,
        }
    }

    /// Opens one book directly, skipping the library list.
    pub fn with_book(book_dir: PathBuf, book: Book) -> Self {
        let root = book_dir.parent().map(PathBuf::from).unwrap_or_default();
        let mut app = Self::new(root);
        app.session = Some(ReadingSession::new(book, Some(book_dir)));
        app
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    pub fn session(&self) -> Option<&ReadingSession> {
        self.session.as_ref()
    }

    pub fn persistence(&self) -> &dyn BookPersistence {
        &self.store
    }

    fn open_selected(&mut self) {
        let Some(index) = self.list_state.selected() else {
            return;
        };
        if let Some((dir, book)) = self.books.get(index) {
            info!("Opening book {}", book.id);
            self.session = Some(ReadingSession::new(book.clone(), Some(dir.clone())));
        }
    }

    fn close_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.teardown(&self.store);
        }
        // Progress may have changed while reading.
        self.books = self.store.discover();
    }

    pub fn handle_event(&mut self, event: &Event, now: Instant) {
        match event {
            Event::Key(key) if key.kind == KeyEventKind::Press => {
                if let Some(session) = self.session.as_mut() {
                    if session.handle_key(key, now) == SessionOutcome::Exit {
                        self.close_session();
                    }
                } else {
                    self.handle_library_key(key.code);
                }
            }
            Event::Mouse(mouse) => {
                if let Some(session) = self.session.as_mut() {
                    session.handle_mouse(mouse, now, &self.store);
                }
            }
            _ => {}
        }
    }

    fn handle_library_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Char('j') | KeyCode::Down => self.select_next(),
            KeyCode::Char('k') | KeyCode::Up => self.select_prev(),
            KeyCode::Enter => self.open_selected(),
            _ => {}
        }
    }

    fn select_next(&mut self) {
        if self.books.is_empty() {
            return;
        }
        let i = match self.list_state.selected() {
            Some(i) if i + 1 < self.books.len() => i + 1,
            Some(_) => 0,
            None => 0,
        };
        self.list_state.select(Some(i));
    }

    fn select_prev(&mut self) {
        if self.books.is_empty() {
            return;
        }
        let i = match self.list_state.selected() {
            Some(0) | None => self.books.len() - 1,
            Some(i) => i - 1,
        };
        self.list_state.select(Some(i));
    }

    pub fn on_tick(&mut self, now: Instant) {
        if let Some(session) = self.session.as_mut() {
            session.on_tick(now, &self.store);
        }
    }

    pub fn draw(&mut self, f: &mut ratatui::Frame, now: Instant) {
        let area = f.area();
        if let Some(session) = self.session.as_mut() {
            session.draw(f, area, now);
        } else {
            self.draw_library(f, area);
        }
    }

    fn draw_library(&mut self, f: &mut ratatui::Frame, area: Rect) {
        let palette = theme::current_theme();
        let items: Vec<ListItem> = self
            .books
            .iter()
            .map(|(_, book)| {
                let mut spans = vec![Span::styled(
                    book.title.clone(),
                    Style::default().fg(palette.text_color()),
                )];
                if let Some(author) = &book.author {
                    spans.push(Span::styled(
                        format!("  {author}"),
                        Style::default().fg(palette.muted_color()),
                    ));
                }
                if book.progress.is_some() {
                    spans.push(Span::styled(
                        "  ·  in progress",
                        Style::default().fg(palette.heading_color()),
                    ));
                }
                ListItem::new(Line::from(spans))
            })
            .collect();

        if items.is_empty() {
            let empty = Paragraph::new("No books found. Point folio at a library directory.")
                .style(Style::default().fg(palette.muted_color()));
            f.render_widget(empty, area);
            return;
        }

        let list = List::new(items)
            .block(
                Block::default()
                    .title(" Library ")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(palette.muted_color())),
            )
            .highlight_style(
                Style::default()
                    .bg(palette.selection_bg())
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol("> ");
        f.render_stateful_widget(list, area, &mut self.list_state);
    }
}

pub fn run_app_with_event_source<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    events: &mut dyn EventSource,
) -> Result<()>
where
    <B as Backend>::Error: Send + Sync + 'static,
{
    loop {
        let now = Instant::now();
        terminal.draw(|f| app.draw(f, now))?;

        // Settlement runs after the render pass, never inside it.
        app.on_tick(Instant::now());

        let animating = app.session().is_some_and(|s| s.is_animating());
        let timeout = if animating { ANIMATION_TICK } else { TICK_RATE };
        if events.poll(timeout)? {
            let event = events.read()?;
            app.handle_event(&event, Instant::now());
        }
        if app.should_quit() {
            return Ok(());
        }
    }
}
