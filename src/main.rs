use std::fs;
use std::path::Path;
use std::sync::Arc;

use bunkai::{
    cli::{Cli, Command},
    config::Config,
    engine::epub::EpubEngine,
    logging::{self, LogLevel},
    models::{Focus, Screen},
    persistence::Gateway,
    preferences::{PreferenceStore, PreferenceUpdate},
    session::Session,
    store::SqliteStore,
    ui::shell::Shell,
};

use clap::Parser;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use eyre::{Result, WrapErr, bail};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(LogLevel::from_flags(cli.verbose, cli.debug));

    let config = match &cli.config {
        Some(path) => Config::load_from(path.clone())?,
        None => Config::new()?,
    };
    let db_path = cli.db.clone().unwrap_or_else(|| config.database_path());

    let store = SqliteStore::open(&db_path)
        .wrap_err_with(|| format!("could not open database {}", db_path.display()))?;
    let gateway = Gateway::new(Arc::new(store));
    let prefs = PreferenceStore::load(gateway.clone()).await;
    let session = Session::new(
        Arc::new(EpubEngine::new()),
        gateway,
        prefs,
        config.settings.layout,
    );
    let shell = Shell::new(session, config.scroll_window());

    let result = run(&shell, cli.command).await;
    shell.flush().await;
    shell.session().close();
    result
}

async fn run(shell: &Shell, command: Command) -> Result<()> {
    match command {
        Command::Open { file } => {
            let bytes = fs::read(&file)
                .wrap_err_with(|| format!("could not read {}", file.display()))?;
            let meta = shell.open_book(&file_name(&file), bytes).await?;
            let title = shell.session().metadata().title.unwrap_or(meta.title);
            println!("Opened {}", title);
            print_contents(shell);
        }
        Command::Toc => {
            require_book(shell).await?;
            print_contents(shell);
        }
        Command::Read { href } => {
            require_book(shell).await?;
            let target = href.or_else(|| {
                if shell.session().current_location().is_some() {
                    return None;
                }
                shell.session().location_index().get(0).map(|entry| entry.href.clone())
            });
            if let Some(href) = target {
                shell.activate(Screen::Contents);
                shell.navigate(&href).await?;
            }
            print_page(shell);
        }
        Command::Next | Command::Prev => {
            require_book(shell).await?;
            let code = if matches!(command, Command::Next) {
                KeyCode::Right
            } else {
                KeyCode::Left
            };
            if shell.screen() != Screen::Reader {
                bail!("nothing is being read yet; use `bunkai read` first");
            }
            let moved = shell
                .handle_key(KeyEvent::new(code, KeyModifiers::NONE), Focus::Document)
                .await?;
            if !moved {
                println!("No further chapter in that direction.");
            }
            print_page(shell);
        }
        Command::Settings {
            theme,
            font_size,
            font_family,
            line_height,
        } => {
            let update = PreferenceUpdate {
                theme,
                font_size,
                font_family,
                line_height,
            };
            let store = shell.session().preferences().clone();
            let prefs = if update.is_empty() {
                store.get()
            } else {
                store.set(update).await?
            };
            println!("theme        {}", prefs.theme);
            println!("font size    {}%", prefs.font_size);
            println!("font family  {}", prefs.font_family);
            println!("line height  {}", prefs.line_height);
        }
        Command::Clear => {
            shell.discard().await?;
            println!("Cleared the stored book and reading position.");
        }
    }
    Ok(())
}

async fn require_book(shell: &Shell) -> Result<()> {
    if shell.restore().await? == Screen::Landing {
        bail!("no book loaded; run `bunkai open <FILE>` first");
    }
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn print_contents(shell: &Shell) {
    for line in shell.contents().render_lines() {
        println!("{}", line);
    }
}

fn print_page(shell: &Shell) {
    let Some(page) = shell.session().page() else {
        println!("Nothing to display.");
        return;
    };
    if let Some(title) = &page.title {
        println!("{}\n", title);
    }
    for line in &page.lines {
        println!("{}", line);
    }
    if let Some((index, total)) = shell.session().position() {
        println!("\n{} / {}", index + 1, total);
    }
}
