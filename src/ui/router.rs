//! Routes "go to this href" requests to whichever screen currently owns
//! navigation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::Result;
use crate::models::Screen;
use crate::session::Session;

#[async_trait]
pub trait NavigationHandler: Send + Sync {
    async fn navigate(&self, href: &str) -> Result<()>;
}

/// Screen-level view state shared by the router and its handlers.
#[derive(Debug, Default)]
pub struct ViewState {
    screen: Mutex<Screen>,
    drawer_open: AtomicBool,
}

impl ViewState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn screen(&self) -> Screen {
        *self.screen.lock()
    }

    pub fn set_screen(&self, screen: Screen) {
        *self.screen.lock() = screen;
    }

    pub fn is_drawer_open(&self) -> bool {
        self.drawer_open.load(Ordering::Relaxed)
    }

    pub fn open_drawer(&self) {
        self.drawer_open.store(true, Ordering::Relaxed);
    }

    pub fn close_drawer(&self) {
        self.drawer_open.store(false, Ordering::Relaxed);
    }

    pub fn toggle_drawer(&self) {
        self.drawer_open.fetch_xor(true, Ordering::Relaxed);
    }
}

/// Holds at most one handler. Registering replaces the previous one.
pub struct NavigationRouter {
    slot: Mutex<Option<Arc<dyn NavigationHandler>>>,
    view: Arc<ViewState>,
}

impl NavigationRouter {
    pub fn new(view: Arc<ViewState>) -> Self {
        Self {
            slot: Mutex::new(None),
            view,
        }
    }

    pub fn view(&self) -> &Arc<ViewState> {
        &self.view
    }

    pub fn register(&self, handler: Arc<dyn NavigationHandler>) {
        *self.slot.lock() = Some(handler);
    }

    pub fn unregister(&self) {
        self.slot.lock().take();
    }

    pub fn has_handler(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Hands `href` to the registered handler and closes the contents
    /// drawer. Without a handler this only logs.
    pub async fn navigate(&self, href: &str) -> Result<()> {
        let handler = self.slot.lock().clone();
        let Some(handler) = handler else {
            warn!(href, "no navigation handler registered");
            return Ok(());
        };
        let result = handler.navigate(href).await;
        self.view.close_drawer();
        result
    }
}

/// Contents screen: opens the reader, then goes to the chapter.
pub struct ContentsNavigation {
    session: Session,
    view: Arc<ViewState>,
}

impl ContentsNavigation {
    pub fn new(session: Session, view: Arc<ViewState>) -> Self {
        Self { session, view }
    }
}

#[async_trait]
impl NavigationHandler for ContentsNavigation {
    async fn navigate(&self, href: &str) -> Result<()> {
        self.view.set_screen(Screen::Reader);
        self.session.navigate_to(href).await
    }
}

/// Reader screen: navigates in place.
pub struct ReaderNavigation {
    session: Session,
}

impl ReaderNavigation {
    pub fn new(session: Session) -> Self {
        Self { session }
    }
}

#[async_trait]
impl NavigationHandler for ReaderNavigation {
    async fn navigate(&self, href: &str) -> Result<()> {
        self.session.navigate_to(href).await
    }
}

/// Any screen without a book.
pub struct NoBookNavigation;

#[async_trait]
impl NavigationHandler for NoBookNavigation {
    async fn navigate(&self, href: &str) -> Result<()> {
        debug!(href, "ignoring navigation, no book loaded");
        Ok(())
    }
}
