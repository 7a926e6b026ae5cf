//! The reading session: owns the engine handle for the open book, keeps the
//! current location in step with what is on screen and applies reader
//! preferences to the rendition.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, instrument, warn};

use crate::engine::epub::is_epub_file_name;
use crate::engine::{
    BookHandle, Engine, ListenerId, Page, Rendition, Surface, theme_style,
};
use crate::error::{Result, SessionError};
use crate::location::{FlatEntry, LocationIndex};
use crate::models::{BookMeta, BookMetadata, LayoutOptions, Relocation};
use crate::persistence::Gateway;
use crate::preferences::{PreferenceChange, PreferenceStore, Preferences, SubscriptionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Empty,
    Loading,
    Ready,
    Navigating,
    Closed,
}

impl SessionState {
    pub fn is_open(self) -> bool {
        matches!(self, SessionState::Ready | SessionState::Navigating)
    }
}

/// Called with the href and flat-list index of the chapter now on screen.
pub type ChapterListener = Arc<dyn Fn(&str, usize) + Send + Sync>;

/// The entries either side of the current location.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Adjacent {
    pub previous: Option<FlatEntry>,
    pub next: Option<FlatEntry>,
}

/// Engine resources held for one book. Dropping the lease destroys the
/// rendition and then the book; teardown errors are logged and dropped.
#[derive(Default)]
struct EngineLease {
    book: Option<Box<dyn BookHandle>>,
    rendition: Option<Box<dyn Rendition>>,
    listener: Option<ListenerId>,
}

impl EngineLease {
    fn rendition_mut(&mut self) -> Option<&mut (dyn Rendition + 'static)> {
        self.rendition.as_deref_mut()
    }

    fn release(&mut self) {
        if let Some(mut rendition) = self.rendition.take() {
            if let Some(id) = self.listener.take() {
                rendition.off_relocate(id);
            }
            if let Err(err) = rendition.destroy() {
                warn!(?err, "rendition teardown failed");
            }
        }
        if let Some(mut book) = self.book.take() {
            if let Err(err) = book.destroy() {
                warn!(?err, "book teardown failed");
            }
        }
    }
}

impl Drop for EngineLease {
    fn drop(&mut self) {
        self.release();
    }
}

struct Core {
    state: SessionState,
    /// Bumped by every load and close; work started under an older epoch
    /// is discarded.
    epoch: u64,
    /// Bumped by every navigation request; only the newest may commit.
    ticket: u64,
    buffer: Option<Arc<[u8]>>,
    lease: Option<EngineLease>,
    index: LocationIndex,
    current_location: Option<String>,
    metadata: BookMetadata,
}

impl Default for Core {
    fn default() -> Self {
        Self {
            state: SessionState::Empty,
            epoch: 0,
            ticket: 0,
            buffer: None,
            lease: None,
            index: LocationIndex::default(),
            current_location: None,
            metadata: BookMetadata::default(),
        }
    }
}

impl Core {
    /// Drops everything tied to the open book and hands back the engine
    /// lease so it can be released outside the lock.
    fn reset(&mut self, state: SessionState) -> Option<EngineLease> {
        self.state = state;
        self.buffer = None;
        self.index = LocationIndex::default();
        self.current_location = None;
        self.metadata = BookMetadata::default();
        self.lease.take()
    }
}

struct Inner {
    engine: Arc<dyn Engine>,
    gateway: Gateway,
    prefs: Arc<PreferenceStore>,
    layout: LayoutOptions,
    surface: Surface,
    core: Mutex<Core>,
    /// Held for the whole of a load so only one engine handle exists.
    load_gate: tokio::sync::Mutex<()>,
    nav_gate: tokio::sync::Mutex<()>,
    relocations_tx: UnboundedSender<(u64, Relocation)>,
    relocations_rx: Mutex<UnboundedReceiver<(u64, Relocation)>>,
    chapter_listeners: Mutex<Vec<ChapterListener>>,
    subscription: Mutex<Option<SubscriptionId>>,
}

impl Inner {
    fn apply_preferences(&self, prefs: &Preferences, change: PreferenceChange) {
        let mut core = self.core.lock();
        if !core.state.is_open() {
            return;
        }
        let Some(rendition) = core.lease.as_mut().and_then(EngineLease::rendition_mut) else {
            return;
        };
        if change.needs_restyle() {
            debug!(?change, "restyling rendition");
            apply_all(rendition, prefs);
        } else {
            apply_fonts(rendition, prefs);
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(id) = self.subscription.get_mut().take() {
            self.prefs.unsubscribe(id);
        }
    }
}

fn apply_fonts(rendition: &mut dyn Rendition, prefs: &Preferences) {
    rendition.set_font_size(prefs.font_size);
    rendition.set_font_family(&prefs.font_family);
}

/// Registers every theme variant with the current line height, then selects
/// the active theme. The engine only picks up a re-registered variant on a
/// second selection, and font settings do not survive a selection.
fn apply_all(rendition: &mut dyn Rendition, prefs: &Preferences) {
    for theme in crate::models::Theme::ALL {
        rendition.register_style(theme.name(), theme_style(theme, prefs.line_height));
    }
    rendition.select_style(prefs.theme.name());
    apply_fonts(rendition, prefs);
    rendition.select_style(prefs.theme.name());
}

/// Handle to the reading session. Clones share the same session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    pub fn new(
        engine: Arc<dyn Engine>,
        gateway: Gateway,
        prefs: Arc<PreferenceStore>,
        layout: LayoutOptions,
    ) -> Self {
        let (relocations_tx, relocations_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            engine,
            gateway,
            prefs: prefs.clone(),
            layout,
            surface: Surface::new(),
            core: Mutex::new(Core::default()),
            load_gate: tokio::sync::Mutex::new(()),
            nav_gate: tokio::sync::Mutex::new(()),
            relocations_tx,
            relocations_rx: Mutex::new(relocations_rx),
            chapter_listeners: Mutex::new(Vec::new()),
            subscription: Mutex::new(None),
        });

        let weak: Weak<Inner> = Arc::downgrade(&inner);
        let id = prefs.subscribe(Arc::new(move |prefs: &Preferences, change: PreferenceChange| {
            if let Some(inner) = weak.upgrade() {
                inner.apply_preferences(prefs, change);
            }
        }));
        *inner.subscription.lock() = Some(id);

        Self { inner }
    }

    pub fn gateway(&self) -> &Gateway {
        &self.inner.gateway
    }

    pub fn preferences(&self) -> &Arc<PreferenceStore> {
        &self.inner.prefs
    }

    pub fn surface(&self) -> Surface {
        self.inner.surface.clone()
    }

    pub fn page(&self) -> Option<Page> {
        self.inner.surface.page()
    }

    pub fn state(&self) -> SessionState {
        self.inner.core.lock().state
    }

    pub fn has_book(&self) -> bool {
        self.inner.core.lock().buffer.is_some()
    }

    pub fn current_location(&self) -> Option<String> {
        self.inner.core.lock().current_location.clone()
    }

    pub fn location_index(&self) -> LocationIndex {
        self.inner.core.lock().index.clone()
    }

    pub fn metadata(&self) -> BookMetadata {
        self.inner.core.lock().metadata.clone()
    }

    /// Index of the current location and the number of entries.
    pub fn position(&self) -> Option<(usize, usize)> {
        let core = self.inner.core.lock();
        let href = core.current_location.as_deref()?;
        core.index.index_of(href).map(|i| (i, core.index.len()))
    }

    pub fn adjacent(&self) -> Adjacent {
        let core = self.inner.core.lock();
        let Some(index) = core
            .current_location
            .as_deref()
            .and_then(|href| core.index.index_of(href))
        else {
            return Adjacent::default();
        };
        let neighbors = core.index.neighbors(index);
        Adjacent {
            previous: neighbors.previous.cloned(),
            next: neighbors.next.cloned(),
        }
    }

    pub fn on_chapter_change(&self, listener: ChapterListener) {
        self.inner.chapter_listeners.lock().push(listener);
    }

    fn epoch(&self) -> u64 {
        self.inner.core.lock().epoch
    }

    /// Opens `bytes` as the current book, replacing any open one. The
    /// previous engine handle is released before the new one is created.
    /// Loads run one at a time; a load overtaken by a newer load or a close
    /// resolves to [`SessionError::Superseded`].
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn load_buffer(&self, bytes: Vec<u8>) -> Result<()> {
        let buffer: Arc<[u8]> = Arc::from(bytes);
        let epoch = {
            let mut core = self.inner.core.lock();
            core.epoch += 1;
            core.epoch
        };

        let _gate = self.inner.load_gate.lock().await;

        let previous = {
            let mut core = self.inner.core.lock();
            if core.epoch != epoch {
                debug!("load superseded before opening");
                return Err(SessionError::Superseded);
            }
            let previous = core.reset(SessionState::Loading);
            core.buffer = Some(buffer.clone());
            previous
        };
        drop(previous);
        self.inner.surface.clear();

        let mut lease = EngineLease::default();
        let book = match self.inner.engine.open(buffer).await {
            Ok(book) => book,
            Err(err) => {
                warn!(?err, "engine rejected book");
                self.fail_load(epoch);
                return Err(SessionError::LoadFailure(err.to_string()));
            }
        };
        let book = lease.book.insert(book);
        if self.epoch() != epoch {
            return Err(SessionError::Superseded);
        }

        let index = LocationIndex::new(&book.navigation_tree());
        if !index.duplicate_hrefs().is_empty() {
            warn!(
                duplicates = ?index.duplicate_hrefs(),
                "navigation tree repeats hrefs, first occurrence wins"
            );
        }
        let metadata = book.metadata();

        let mut rendition = match book.render(self.inner.surface.clone(), self.inner.layout) {
            Ok(rendition) => rendition,
            Err(err) => {
                warn!(?err, "engine could not render book");
                self.fail_load(epoch);
                return Err(SessionError::LoadFailure(err.to_string()));
            }
        };

        let tx = self.inner.relocations_tx.clone();
        let listener = rendition.on_relocate(Arc::new(move |relocation: Relocation| {
            // The receiver lives as long as the session.
            let _ = tx.send((epoch, relocation));
        }));
        apply_all(rendition.as_mut(), &self.inner.prefs.get());
        lease.rendition = Some(rendition);
        lease.listener = Some(listener);

        let initial = match self.inner.gateway.load_location().await {
            Ok(location) => location,
            Err(err) => {
                warn!(?err, "could not read last location");
                None
            }
        };

        {
            let mut core = self.inner.core.lock();
            if core.epoch != epoch {
                return Err(SessionError::Superseded);
            }
            info!(entries = index.len(), title = ?metadata.title, "book ready");
            core.index = index;
            core.metadata = metadata;
            core.lease = Some(lease);
            core.state = SessionState::Ready;
        }

        if let Some(href) = initial {
            match self.navigate_to(&href).await {
                Ok(()) => {
                    let theme = self.inner.prefs.get().theme;
                    let mut core = self.inner.core.lock();
                    if let Some(rendition) =
                        core.lease.as_mut().and_then(EngineLease::rendition_mut)
                    {
                        rendition.select_style(theme.name());
                    }
                }
                Err(SessionError::StorageFailure(err)) => {
                    warn!(?err, "could not persist restored location");
                }
                Err(err) if err.is_superseded() => return Err(err),
                Err(err) => warn!(?err, href = %href, "could not display last location"),
            }
        }
        Ok(())
    }

    fn fail_load(&self, epoch: u64) {
        let lease = {
            let mut core = self.inner.core.lock();
            if core.epoch != epoch {
                return;
            }
            core.reset(SessionState::Empty)
        };
        drop(lease);
    }

    /// Displays `href`. Overlapping calls are serialized; a call overtaken by
    /// a newer one resolves to [`SessionError::Superseded`] without
    /// committing its location.
    #[instrument(skip(self))]
    pub async fn navigate_to(&self, href: &str) -> Result<()> {
        let (epoch, ticket) = {
            let mut core = self.inner.core.lock();
            if !core.state.is_open() {
                return Err(SessionError::NotReady);
            }
            core.ticket += 1;
            core.state = SessionState::Navigating;
            (core.epoch, core.ticket)
        };

        let _gate = self.inner.nav_gate.lock().await;

        let display = {
            let mut core = self.inner.core.lock();
            if core.epoch != epoch || core.ticket != ticket {
                debug!(href, "navigation superseded before display");
                return Err(SessionError::Superseded);
            }
            let Some(rendition) = core.lease.as_mut().and_then(EngineLease::rendition_mut) else {
                return Err(SessionError::NotReady);
            };
            rendition.display(href)
        };
        let outcome = display.await;

        let stale = {
            let mut core = self.inner.core.lock();
            let stale = core.epoch != epoch || core.ticket != ticket;
            if !stale {
                core.state = SessionState::Ready;
            }
            stale
        };

        match outcome {
            _ if stale => {
                debug!(href, "navigation superseded after display");
                Err(SessionError::Superseded)
            }
            Ok(()) => {
                let relocation = Relocation {
                    href: href.to_string(),
                    position: None,
                };
                self.commit(epoch, &relocation).await?;
                Ok(())
            }
            Err(err) => {
                warn!(?err, href, "display failed, keeping last location");
                Err(SessionError::NavigationFailure(err))
            }
        }
    }

    /// Applies relocation reports queued by the engine since the last call.
    /// Reports from a book that has since been replaced are dropped.
    pub async fn process_relocations(&self) -> usize {
        let pending: Vec<(u64, Relocation)> = {
            let mut rx = self.inner.relocations_rx.lock();
            std::iter::from_fn(|| rx.try_recv().ok()).collect()
        };

        let mut applied = 0;
        for (epoch, relocation) in pending {
            let live = {
                let core = self.inner.core.lock();
                core.epoch == epoch && core.state.is_open()
            };
            if !live {
                debug!(href = %relocation.href, "dropping stale relocation");
                continue;
            }
            if let Err(err) = self.commit(epoch, &relocation).await {
                warn!(?err, href = %relocation.href, "could not persist relocation");
            }
            applied += 1;
        }
        applied
    }

    /// Records `relocation` as the current location and persists it. Chapter
    /// listeners hear about a location once, when it becomes current, and
    /// only if it is in the table of contents.
    async fn commit(&self, epoch: u64, relocation: &Relocation) -> Result<()> {
        let href = relocation.href.as_str();
        let (changed, index) = {
            let mut core = self.inner.core.lock();
            if core.epoch != epoch {
                return Ok(());
            }
            let changed = core.current_location.as_deref() != Some(href);
            core.current_location = Some(href.to_string());
            (changed, core.index.index_of(href))
        };

        if index.is_none() {
            debug!(
                err = %SessionError::NotFoundInIndex(href.to_string()),
                "location outside the table of contents"
            );
        }
        self.inner.gateway.save_location(href).await?;
        if let Some(position) = &relocation.position {
            self.inner.gateway.save_reading_position(position).await?;
        }

        if let (true, Some(index)) = (changed, index) {
            let listeners: Vec<ChapterListener> = self.inner.chapter_listeners.lock().clone();
            for listener in listeners {
                listener(href, index);
            }
        }
        Ok(())
    }

    /// Releases the engine handle and the book buffer. Safe to call more
    /// than once.
    pub fn close(&self) {
        let lease = {
            let mut core = self.inner.core.lock();
            if matches!(core.state, SessionState::Empty | SessionState::Closed) {
                return;
            }
            core.epoch += 1;
            core.reset(SessionState::Closed)
        };
        drop(lease);
        self.inner.surface.clear();
        info!("session closed");
    }

    /// Stores a newly chosen book and opens it. Reading state from the
    /// previous book is discarded. If the store rejects the book the open
    /// session, if any, is left untouched.
    pub async fn import_book(&self, file_name: &str, bytes: Vec<u8>) -> Result<BookMeta> {
        if !is_epub_file_name(file_name) {
            return Err(SessionError::LoadFailure(
                "Please select a valid .epub file".to_string(),
            ));
        }

        let meta = BookMeta::from_file_name(file_name, &bytes);
        self.inner.gateway.store_book(&bytes, &meta).await?;

        if let Err(err) = self.load_buffer(bytes).await {
            if !err.is_superseded() {
                if let Err(clear_err) = self.inner.gateway.clear_all().await {
                    warn!(?clear_err, "could not remove unreadable book");
                }
            }
            return Err(err);
        }
        info!(title = %meta.title, digest = %meta.digest, "imported book");
        Ok(meta)
    }

    /// Reopens the stored book, if there is one.
    pub async fn restore(&self) -> Result<bool> {
        let bytes = match self.inner.gateway.load_book().await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Ok(false),
            Err(err) => {
                warn!(?err, "could not read stored book");
                return Ok(false);
            }
        };
        self.load_buffer(bytes).await?;
        Ok(true)
    }

    /// Closes the session and removes every persisted trace of the book.
    pub async fn discard(&self) -> Result<()> {
        self.close();
        self.inner.gateway.clear_all().await?;
        self.inner.core.lock().state = SessionState::Empty;
        Ok(())
    }
}
