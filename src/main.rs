use anyhow::Result;
use clap::Parser;
use crossterm::{
    event::EnableMouseCapture,
    execute,
    terminal::{EnterAlternateScreen, enable_raw_mode},
};
use folio::event_source::TerminalEventSource;
use folio::main_app::{App, run_app_with_event_source};
use folio::panic_handler::{initialize_panic_handler, restore_terminal};
use folio::storage::JsonBookStore;
use folio::{settings, theme};
use log::{error, info};
use ratatui::{Terminal, backend::CrosstermBackend};
use simplelog::{Config, LevelFilter, WriteLogger};
use std::fs::File;
use std::io::stdout;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "folio", about = "A terminal book reader", version)]
struct Cli {
    /// A book directory (containing book.json) or a library directory of
    /// books. Defaults to the current directory.
    path: Option<PathBuf>,

    /// Log file path
    #[arg(long, default_value = "folio.log")]
    log_file: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    WriteLogger::init(
        LevelFilter::Debug,
        Config::default(),
        File::create(&cli.log_file)?,
    )?;
    info!("Starting folio");

    initialize_panic_handler();
    settings::load_settings();
    theme::set_theme(theme::ThemeId::from_name(&settings::current_settings().theme));

    let path = cli.path.unwrap_or_else(|| PathBuf::from("."));
    let mut app = match JsonBookStore::load_from_dir(&path) {
        Ok(book) => App::with_book(path, book),
        Err(_) => App::new(path),
    };

    enable_raw_mode()?;
    let mut out = stdout();
    execute!(out, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(out);
    let mut terminal = Terminal::new(backend)?;

    let mut events = TerminalEventSource;
    let res = run_app_with_event_source(&mut terminal, &mut app, &mut events);

    restore_terminal();
    terminal.show_cursor()?;

    if let Err(err) = &res {
        error!("Application error: {err:?}");
        println!("{err:?}");
    }

    if let Err(e) = settings::save_settings() {
        error!("Failed to save settings: {e}");
    }

    info!("Shutting down folio");
    res
}
