use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use epub::doc::{EpubDoc, NavPoint};
use html2text::config;
use parking_lot::Mutex;
use scraper::{Html, Selector};
use tracing::debug;

use crate::engine::{
    AppliedStyle, BookHandle, DisplayFuture, Engine, ListenerId, Page, RelocateListener,
    Rendition, StyleSheet, Surface,
};
use crate::error::EngineError;
use crate::models::{BookMetadata, Flow, LayoutOptions, NavNode, Relocation};

type Doc = EpubDoc<Cursor<Arc<[u8]>>>;

/// Text engine backed by the `epub` crate. Chapters are rendered to plain
/// text lines at the layout width.
#[derive(Debug, Default, Clone, Copy)]
pub struct EpubEngine;

impl EpubEngine {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Engine for EpubEngine {
    async fn open(&self, bytes: Arc<[u8]>) -> Result<Box<dyn BookHandle>, EngineError> {
        let parsed = tokio::task::spawn_blocking(move || {
            EpubDoc::from_reader(Cursor::new(bytes)).map_err(|err| err.to_string())
        })
        .await
        .map_err(|err| EngineError::Parse(err.to_string()))?;

        let doc = parsed.map_err(EngineError::Parse)?;
        Ok(Box::new(EpubBook::new(doc)))
    }
}

pub struct EpubBook {
    doc: Arc<Mutex<Option<Doc>>>,
    toc: Vec<NavNode>,
    metadata: BookMetadata,
}

impl EpubBook {
    fn new(doc: Doc) -> Self {
        let toc = doc.toc.iter().map(nav_node).collect();

        let mut metadata = BookMetadata::default();
        if let Some(title) = doc.mdata("title") {
            metadata.title = Some(title.value.clone());
        }
        if let Some(creator) = doc.mdata("creator") {
            metadata.creator = Some(creator.value.clone());
        }

        Self {
            doc: Arc::new(Mutex::new(Some(doc))),
            toc,
            metadata,
        }
    }
}

fn nav_node(navpoint: &NavPoint) -> NavNode {
    NavNode {
        id: None,
        href: navpoint.content.to_string_lossy().into_owned(),
        label: navpoint.label.clone(),
        children: navpoint.children.iter().map(nav_node).collect(),
    }
}

impl BookHandle for EpubBook {
    fn navigation_tree(&self) -> Vec<NavNode> {
        self.toc.clone()
    }

    fn metadata(&self) -> BookMetadata {
        self.metadata.clone()
    }

    fn render(
        &mut self,
        surface: Surface,
        layout: LayoutOptions,
    ) -> Result<Box<dyn Rendition>, EngineError> {
        if self.doc.lock().is_none() {
            return Err(EngineError::Render("book has been destroyed".to_string()));
        }
        Ok(Box::new(EpubRendition {
            doc: self.doc.clone(),
            surface,
            layout,
            styles: HashMap::new(),
            selected: None,
            font_size: None,
            font_family: None,
            listeners: Vec::new(),
            next_listener: 1,
            destroyed: false,
        }))
    }

    fn destroy(&mut self) -> Result<(), EngineError> {
        self.doc.lock().take();
        Ok(())
    }
}

pub struct EpubRendition {
    doc: Arc<Mutex<Option<Doc>>>,
    surface: Surface,
    layout: LayoutOptions,
    styles: HashMap<String, StyleSheet>,
    selected: Option<String>,
    font_size: Option<u16>,
    font_family: Option<String>,
    listeners: Vec<(ListenerId, RelocateListener)>,
    next_listener: u64,
    destroyed: bool,
}

impl EpubRendition {
    fn applied_style(&self) -> AppliedStyle {
        let line_height = self
            .selected
            .as_ref()
            .and_then(|name| self.styles.get(name))
            .and_then(|sheet| sheet.rule("body"))
            .and_then(|body| body.get("line-height"))
            .map(|value| value.trim_end_matches("!important").trim().to_string());

        AppliedStyle {
            style_name: self.selected.clone(),
            font_size: self.font_size,
            font_family: self.font_family.clone(),
            line_height,
        }
    }

    fn render_page(&self, location: &str) -> Result<Page, EngineError> {
        let display_err = |reason: &str| EngineError::Display {
            location: location.to_string(),
            reason: reason.to_string(),
        };

        if self.destroyed {
            return Err(display_err("rendition destroyed"));
        }

        let html = {
            let mut guard = self.doc.lock();
            let doc = guard.as_mut().ok_or_else(|| display_err("book destroyed"))?;
            let (resource, _) = split_location(location);
            let chapter = doc
                .resource_uri_to_chapter(&PathBuf::from(resource))
                .ok_or_else(|| display_err("not in the spine"))?;
            if !doc.set_current_chapter(chapter) {
                return Err(display_err("chapter out of range"));
            }
            let (content, _mime) = doc
                .get_current_str()
                .ok_or_else(|| display_err("chapter has no text"))?;
            content
        };

        let mut lines = html_to_lines(&html, self.layout.width)
            .map_err(|reason| display_err(&reason))?;
        if self.layout.flow == Flow::Paginated && self.layout.height > 0 {
            lines.truncate(self.layout.height);
        }

        Ok(Page {
            location: location.to_string(),
            title: chapter_title(&html),
            lines,
            style: self.applied_style(),
        })
    }
}

impl Rendition for EpubRendition {
    fn register_style(&mut self, name: &str, style: StyleSheet) {
        self.styles.insert(name.to_string(), style);
    }

    fn select_style(&mut self, name: &str) {
        self.selected = Some(name.to_string());
    }

    fn set_font_size(&mut self, percent: u16) {
        self.font_size = Some(percent);
    }

    fn set_font_family(&mut self, family: &str) {
        self.font_family = Some(family.to_string());
    }

    fn display(&mut self, location: &str) -> DisplayFuture {
        let result = self.render_page(location).map(|page| {
            self.surface.write(page);
            debug!(location, "rendered location");
            let relocation = Relocation {
                href: location.to_string(),
                position: Some(format!("{}@0", location)),
            };
            let listeners: Vec<RelocateListener> =
                self.listeners.iter().map(|(_, l)| l.clone()).collect();
            for listener in listeners {
                listener(relocation.clone());
            }
        });
        Box::pin(async move { result })
    }

    fn on_relocate(&mut self, listener: RelocateListener) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, listener));
        id
    }

    fn off_relocate(&mut self, id: ListenerId) {
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
    }

    fn destroy(&mut self) -> Result<(), EngineError> {
        self.destroyed = true;
        self.listeners.clear();
        self.surface.clear();
        Ok(())
    }
}

/// Splits `path#fragment` into its resource path and optional fragment.
pub fn split_location(location: &str) -> (&str, Option<&str>) {
    match location.split_once('#') {
        Some((path, fragment)) if !fragment.is_empty() => (path, Some(fragment)),
        Some((path, _)) => (path, None),
        None => (location, None),
    }
}

/// Converts chapter markup to plain text lines wrapped at `width`.
pub fn html_to_lines(html: &str, width: usize) -> Result<Vec<String>, String> {
    let text = config::plain()
        .link_footnotes(false)
        .string_from_read(html.as_bytes(), width.max(20))
        .map_err(|err| err.to_string())?;
    Ok(text.lines().map(|s| s.to_string()).collect())
}

/// The chapter's `<title>`, or its first top-level heading.
pub fn chapter_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    ["title", "h1", "h2"].iter().find_map(|tag| {
        let selector = Selector::parse(tag).ok()?;
        document
            .select(&selector)
            .map(|el| el.text().collect::<String>().trim().to_string())
            .find(|text| !text.is_empty())
    })
}

/// Whether a path names an EPUB file.
pub fn is_epub_file_name(name: &str) -> bool {
    Path::new(name)
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("epub"))
        .unwrap_or(false)
}
