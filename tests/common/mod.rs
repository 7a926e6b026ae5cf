#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use bunkai::engine::{
    BookHandle, DisplayFuture, Engine, ListenerId, Page, RelocateListener, Rendition, StyleSheet,
    Surface,
};
use bunkai::error::EngineError;
use bunkai::models::{BookMetadata, LayoutOptions, NavNode, Relocation};
use bunkai::persistence::Gateway;
use bunkai::preferences::PreferenceStore;
use bunkai::session::Session;
use bunkai::store::MemoryStore;

/// Everything the session asked the engine to do, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Open,
    Render,
    RegisterStyle { name: String, line_height: String },
    SelectStyle(String),
    FontSize(u16),
    FontFamily(String),
    Display(String),
    OnRelocate,
    OffRelocate,
    DestroyRendition,
    DestroyBook,
}

#[derive(Default)]
pub struct Controls {
    pub fail_parse: AtomicBool,
    pub fail_render: AtomicBool,
    pub fail_teardown: AtomicBool,
    pub yield_on_display: AtomicBool,
    pub yield_on_open: AtomicBool,
    fail_display: Mutex<HashSet<String>>,
    tree: Mutex<Vec<NavNode>>,
    ops: Mutex<Vec<Op>>,
    listeners: Mutex<Vec<(ListenerId, RelocateListener)>>,
    next_listener: AtomicUsize,
    pub live_books: AtomicUsize,
    pub max_live_books: AtomicUsize,
    pub live_renditions: AtomicUsize,
}

impl Controls {
    pub fn set_tree(&self, tree: Vec<NavNode>) {
        *self.tree.lock() = tree;
    }

    pub fn fail_display_of(&self, href: &str) {
        self.fail_display.lock().insert(href.to_string());
    }

    pub fn ops(&self) -> Vec<Op> {
        self.ops.lock().clone()
    }

    pub fn clear_ops(&self) {
        self.ops.lock().clear();
    }

    pub fn displays(&self) -> Vec<String> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                Op::Display(href) => Some(href),
                _ => None,
            })
            .collect()
    }

    pub fn live_books(&self) -> usize {
        self.live_books.load(Ordering::SeqCst)
    }

    /// The most book handles that were ever alive at once.
    pub fn max_live_books(&self) -> usize {
        self.max_live_books.load(Ordering::SeqCst)
    }

    pub fn live_renditions(&self) -> usize {
        self.live_renditions.load(Ordering::SeqCst)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Reports a settled location the way a real engine does after the
    /// user scrolls or pages.
    pub fn relocate(&self, href: &str, position: Option<&str>) {
        let listeners: Vec<RelocateListener> =
            self.listeners.lock().iter().map(|(_, l)| l.clone()).collect();
        for listener in listeners {
            listener(Relocation {
                href: href.to_string(),
                position: position.map(str::to_string),
            });
        }
    }

    fn record(&self, op: Op) {
        self.ops.lock().push(op);
    }

    fn teardown_result(&self, what: &str) -> Result<(), EngineError> {
        if self.fail_teardown.load(Ordering::SeqCst) {
            Err(EngineError::Teardown(format!("{} refused to die", what)))
        } else {
            Ok(())
        }
    }
}

pub struct FakeEngine {
    pub controls: Arc<Controls>,
}

impl FakeEngine {
    pub fn new() -> Self {
        let controls = Arc::new(Controls::default());
        controls.set_tree(sample_tree());
        Self { controls }
    }
}

#[async_trait]
impl Engine for FakeEngine {
    async fn open(&self, _bytes: Arc<[u8]>) -> Result<Box<dyn BookHandle>, EngineError> {
        self.controls.record(Op::Open);
        if self.controls.fail_parse.load(Ordering::SeqCst) {
            return Err(EngineError::Parse("not a book".to_string()));
        }
        let live = self.controls.live_books.fetch_add(1, Ordering::SeqCst) + 1;
        self.controls.max_live_books.fetch_max(live, Ordering::SeqCst);
        let book = FakeBook {
            controls: self.controls.clone(),
            alive: true,
        };
        if self.controls.yield_on_open.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        Ok(Box::new(book))
    }
}

struct FakeBook {
    controls: Arc<Controls>,
    alive: bool,
}

impl BookHandle for FakeBook {
    fn navigation_tree(&self) -> Vec<NavNode> {
        self.controls.tree.lock().clone()
    }

    fn metadata(&self) -> BookMetadata {
        BookMetadata {
            title: Some("Sample".to_string()),
            creator: Some("A. Writer".to_string()),
        }
    }

    fn render(
        &mut self,
        surface: Surface,
        _layout: LayoutOptions,
    ) -> Result<Box<dyn Rendition>, EngineError> {
        self.controls.record(Op::Render);
        if self.controls.fail_render.load(Ordering::SeqCst) {
            return Err(EngineError::Render("no surface".to_string()));
        }
        self.controls.live_renditions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeRendition {
            controls: self.controls.clone(),
            surface,
            alive: true,
        }))
    }

    fn destroy(&mut self) -> Result<(), EngineError> {
        self.controls.record(Op::DestroyBook);
        if std::mem::take(&mut self.alive) {
            self.controls.live_books.fetch_sub(1, Ordering::SeqCst);
        }
        self.controls.teardown_result("book")
    }
}

struct FakeRendition {
    controls: Arc<Controls>,
    surface: Surface,
    alive: bool,
}

impl Rendition for FakeRendition {
    fn register_style(&mut self, name: &str, style: StyleSheet) {
        let line_height = style
            .rule("body")
            .and_then(|body| body.get("line-height"))
            .unwrap_or_default()
            .to_string();
        self.controls.record(Op::RegisterStyle {
            name: name.to_string(),
            line_height,
        });
    }

    fn select_style(&mut self, name: &str) {
        self.controls.record(Op::SelectStyle(name.to_string()));
    }

    fn set_font_size(&mut self, percent: u16) {
        self.controls.record(Op::FontSize(percent));
    }

    fn set_font_family(&mut self, family: &str) {
        self.controls.record(Op::FontFamily(family.to_string()));
    }

    fn display(&mut self, location: &str) -> DisplayFuture {
        self.controls.record(Op::Display(location.to_string()));
        let failed = self.controls.fail_display.lock().contains(location);
        let yield_first = self.controls.yield_on_display.load(Ordering::SeqCst);
        let surface = self.surface.clone();
        let location = location.to_string();
        Box::pin(async move {
            if yield_first {
                tokio::task::yield_now().await;
            }
            if failed {
                return Err(EngineError::Display {
                    location,
                    reason: "missing resource".to_string(),
                });
            }
            surface.write(Page {
                location,
                ..Default::default()
            });
            Ok(())
        })
    }

    fn on_relocate(&mut self, listener: RelocateListener) -> ListenerId {
        self.controls.record(Op::OnRelocate);
        let id = ListenerId(self.controls.next_listener.fetch_add(1, Ordering::SeqCst) as u64);
        self.controls.listeners.lock().push((id, listener));
        id
    }

    fn off_relocate(&mut self, id: ListenerId) {
        self.controls.record(Op::OffRelocate);
        self.controls.listeners.lock().retain(|(listener_id, _)| *listener_id != id);
    }

    fn destroy(&mut self) -> Result<(), EngineError> {
        self.controls.record(Op::DestroyRendition);
        if std::mem::take(&mut self.alive) {
            self.controls.live_renditions.fetch_sub(1, Ordering::SeqCst);
        }
        self.controls.teardown_result("rendition")
    }
}

/// c1, then c2 with one child c2a.
pub fn sample_tree() -> Vec<NavNode> {
    vec![
        NavNode::new("c1", "Chapter 1"),
        NavNode::new("c2", "Chapter 2").with_children(vec![NavNode::new("c2a", "Section 2.1")]),
    ]
}

pub struct Harness {
    pub session: Session,
    pub engine: Arc<Controls>,
    pub store: Arc<MemoryStore>,
    pub gateway: Gateway,
    pub prefs: Arc<PreferenceStore>,
}

pub async fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let gateway = Gateway::new(store.clone());
    let prefs = PreferenceStore::load(gateway.clone()).await;
    let engine = FakeEngine::new();
    let controls = engine.controls.clone();
    let session = Session::new(
        Arc::new(engine),
        gateway.clone(),
        prefs.clone(),
        LayoutOptions::default(),
    );
    Harness {
        session,
        engine: controls,
        store,
        gateway,
        prefs,
    }
}

pub fn book_bytes() -> Vec<u8> {
    b"PK\x03\x04 sample book".to_vec()
}

const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

const CONTENT_OPF: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="bookid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>Sample Book</dc:title>
    <dc:creator>A. Writer</dc:creator>
    <dc:identifier id="bookid">urn:uuid:5f1c2c7e-0000-4000-8000-000000000001</dc:identifier>
    <dc:language>en</dc:language>
  </metadata>
  <manifest>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
    <item id="ch1" href="ch1.xhtml" media-type="application/xhtml+xml"/>
    <item id="ch2" href="ch2.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
  <spine toc="ncx">
    <itemref idref="ch1"/>
    <itemref idref="ch2"/>
  </spine>
</package>"#;

const TOC_NCX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head><meta name="dtb:uid" content="urn:uuid:5f1c2c7e-0000-4000-8000-000000000001"/></head>
  <docTitle><text>Sample Book</text></docTitle>
  <navMap>
    <navPoint id="np1" playOrder="1">
      <navLabel><text>Chapter One</text></navLabel>
      <content src="ch1.xhtml"/>
    </navPoint>
    <navPoint id="np2" playOrder="2">
      <navLabel><text>Chapter Two</text></navLabel>
      <content src="ch2.xhtml"/>
    </navPoint>
  </navMap>
</ncx>"#;

fn chapter(title: &str, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>{title}</title></head>
<body><h1>{title}</h1><p>{body}</p></body>
</html>"#
    )
}

/// A two-chapter EPUB 2 book, stored uncompressed.
pub fn sample_epub() -> Vec<u8> {
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;
    use zip::{CompressionMethod, ZipWriter};

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let files = [
        ("mimetype", "application/epub+zip".to_string()),
        ("META-INF/container.xml", CONTAINER_XML.to_string()),
        ("OEBPS/content.opf", CONTENT_OPF.to_string()),
        ("OEBPS/toc.ncx", TOC_NCX.to_string()),
        ("OEBPS/ch1.xhtml", chapter("Chapter One", "It was a bright cold day in April.")),
        ("OEBPS/ch2.xhtml", chapter("Chapter Two", "The clocks were striking thirteen.")),
    ];
    for (name, contents) in files {
        writer.start_file(name, options).unwrap();
        writer.write_all(contents.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}
