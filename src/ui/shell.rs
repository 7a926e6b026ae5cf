//! Owns the active screen: binds the matching navigation handler, turns
//! arrow keys into chapter steps and tracks scroll offsets.

use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind};
use tracing::debug;

use crate::debounce::ScrollTracker;
use crate::error::Result;
use crate::models::{BookMeta, Focus, Screen, ScrollChannel};
use crate::session::Session;
use crate::ui::contents::ContentsList;
use crate::ui::router::{
    ContentsNavigation, NavigationRouter, NoBookNavigation, ReaderNavigation, ViewState,
};

pub struct Shell {
    session: Session,
    router: NavigationRouter,
    view: Arc<ViewState>,
    contents_scroll: ScrollTracker,
    sidebar_scroll: ScrollTracker,
}

impl Shell {
    pub fn new(session: Session, scroll_window: Duration) -> Self {
        let view = Arc::new(ViewState::new());
        let gateway = session.gateway().clone();
        Self {
            router: NavigationRouter::new(view.clone()),
            contents_scroll: ScrollTracker::new(gateway.clone(), ScrollChannel::Contents, scroll_window),
            sidebar_scroll: ScrollTracker::new(gateway, ScrollChannel::Sidebar, scroll_window),
            session,
            view,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn router(&self) -> &NavigationRouter {
        &self.router
    }

    pub fn view(&self) -> &Arc<ViewState> {
        &self.view
    }

    pub fn screen(&self) -> Screen {
        self.view.screen()
    }

    /// Makes `screen` active and rebinds the navigation handler for it.
    pub fn activate(&self, screen: Screen) {
        self.view.set_screen(screen);
        if !self.session.state().is_open() {
            self.router.register(Arc::new(NoBookNavigation));
            return;
        }
        match screen {
            Screen::Landing => self.router.register(Arc::new(NoBookNavigation)),
            Screen::Contents => self.router.register(Arc::new(ContentsNavigation::new(
                self.session.clone(),
                self.view.clone(),
            ))),
            Screen::Reader => self
                .router
                .register(Arc::new(ReaderNavigation::new(self.session.clone()))),
        }
        debug!(?screen, "activated screen");
    }

    /// Reopens the stored book and picks the screen to resume on.
    pub async fn restore(&self) -> Result<Screen> {
        let screen = if !self.session.restore().await? {
            Screen::Landing
        } else if self.session.current_location().is_some() {
            Screen::Reader
        } else {
            Screen::Contents
        };
        self.activate(screen);
        Ok(screen)
    }

    pub async fn open_book(&self, file_name: &str, bytes: Vec<u8>) -> Result<BookMeta> {
        let meta = self.session.import_book(file_name, bytes).await?;
        self.activate(Screen::Contents);
        Ok(meta)
    }

    pub async fn discard(&self) -> Result<()> {
        self.session.discard().await?;
        self.activate(Screen::Landing);
        Ok(())
    }

    pub async fn navigate(&self, href: &str) -> Result<()> {
        let result = self.router.navigate(href).await;
        // The contents handler may have switched to the reader.
        self.activate(self.view.screen());
        result
    }

    pub fn contents(&self) -> ContentsList {
        let current = self.session.current_location();
        ContentsList::new(&self.session.location_index(), current.as_deref())
    }

    /// Steps to the next or previous chapter. Returns whether the key was
    /// consumed; keys typed into a text input never are.
    pub async fn handle_key(&self, key: KeyEvent, focus: Focus) -> Result<bool> {
        if focus == Focus::TextInput || key.kind != KeyEventKind::Press {
            return Ok(false);
        }
        if self.view.screen() != Screen::Reader {
            return Ok(false);
        }

        let adjacent = self.session.adjacent();
        let target = match key.code {
            KeyCode::Right => adjacent.next,
            KeyCode::Left => adjacent.previous,
            _ => return Ok(false),
        };
        match target {
            Some(entry) => {
                self.navigate(&entry.href).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn tracker(&self, channel: ScrollChannel) -> &ScrollTracker {
        match channel {
            ScrollChannel::Contents => &self.contents_scroll,
            ScrollChannel::Sidebar => &self.sidebar_scroll,
        }
    }

    pub fn record_scroll(&self, channel: ScrollChannel, y: f64) {
        self.tracker(channel).record(y);
    }

    pub async fn restore_scroll(&self, channel: ScrollChannel) -> f64 {
        self.tracker(channel).restore().await
    }

    /// Writes out pending scroll offsets and queued relocations.
    pub async fn flush(&self) {
        self.contents_scroll.flush().await;
        self.sidebar_scroll.flush().await;
        self.session.process_relocations().await;
    }
}
