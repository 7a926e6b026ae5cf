//! Contract with the rendering engine.
//!
//! An [`Engine`] parses a book payload into a [`BookHandle`]; a handle renders
//! into a [`Surface`] as a [`Rendition`]. The session owns at most one handle
//! and one rendition at a time and tears both down explicitly.

pub mod epub;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::EngineError;
use crate::models::{BookMetadata, LayoutOptions, NavNode, Relocation, Theme};

pub type DisplayFuture = Pin<Box<dyn Future<Output = Result<(), EngineError>> + Send>>;
pub type RelocateListener = Arc<dyn Fn(Relocation) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

#[async_trait]
pub trait Engine: Send + Sync {
    /// Parses a payload. Resolves once the book is ready.
    async fn open(&self, bytes: Arc<[u8]>) -> Result<Box<dyn BookHandle>, EngineError>;
}

pub trait BookHandle: Send {
    fn navigation_tree(&self) -> Vec<NavNode>;
    fn metadata(&self) -> BookMetadata;
    fn render(
        &mut self,
        surface: Surface,
        layout: LayoutOptions,
    ) -> Result<Box<dyn Rendition>, EngineError>;
    fn destroy(&mut self) -> Result<(), EngineError>;
}

pub trait Rendition: Send {
    fn register_style(&mut self, name: &str, style: StyleSheet);
    fn select_style(&mut self, name: &str);
    fn set_font_size(&mut self, percent: u16);
    fn set_font_family(&mut self, family: &str);
    /// Issues a display command; the returned future resolves when the
    /// location has been rendered.
    fn display(&mut self, location: &str) -> DisplayFuture;
    fn on_relocate(&mut self, listener: RelocateListener) -> ListenerId;
    fn off_relocate(&mut self, id: ListenerId);
    fn destroy(&mut self) -> Result<(), EngineError>;
}

/// One CSS-like rule: a selector and its declarations.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleRule {
    pub selector: String,
    pub declarations: Vec<(String, String)>,
}

impl StyleRule {
    fn new(selector: &str, declarations: &[(&str, String)]) -> Self {
        Self {
            selector: selector.to_string(),
            declarations: declarations
                .iter()
                .map(|(property, value)| (property.to_string(), value.clone()))
                .collect(),
        }
    }

    pub fn get(&self, property: &str) -> Option<&str> {
        self.declarations
            .iter()
            .find(|(p, _)| p == property)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct StyleSheet {
    pub rules: Vec<StyleRule>,
}

impl StyleSheet {
    pub fn rule(&self, selector: &str) -> Option<&StyleRule> {
        self.rules.iter().find(|rule| rule.selector == selector)
    }
}

pub struct Palette {
    pub background: &'static str,
    pub text: &'static str,
}

pub fn palette(theme: Theme) -> Palette {
    match theme {
        Theme::Oled => Palette { background: "#000000", text: "#a0a0a0" },
        Theme::Dark => Palette { background: "#111111", text: "#cccccc" },
        Theme::Light => Palette { background: "#fdfbf7", text: "#000000" },
    }
}

/// The style variant registered for `theme`. Line height is part of the
/// body rule, so every variant must be rebuilt when it changes.
pub fn theme_style(theme: Theme, line_height: f32) -> StyleSheet {
    let colors = palette(theme);
    let mut rules = vec![StyleRule::new(
        "body",
        &[
            ("background", format!("{} !important", colors.background)),
            ("color", format!("{} !important", colors.text)),
            ("line-height", format!("{} !important", line_height)),
        ],
    )];
    if theme == Theme::Oled {
        rules.push(StyleRule::new("p", &[("color", format!("{} !important", colors.text))]));
    }
    StyleSheet { rules }
}

/// A rendered page as last written by a rendition.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Page {
    pub location: String,
    pub title: Option<String>,
    pub lines: Vec<String>,
    pub style: AppliedStyle,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppliedStyle {
    pub style_name: Option<String>,
    pub font_size: Option<u16>,
    pub font_family: Option<String>,
    pub line_height: Option<String>,
}

/// Shared display target a rendition writes into.
#[derive(Debug, Clone, Default)]
pub struct Surface {
    page: Arc<Mutex<Option<Page>>>,
}

impl Surface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(&self) -> Option<Page> {
        self.page.lock().clone()
    }

    pub fn write(&self, page: Page) {
        *self.page.lock() = Some(page);
    }

    pub fn clear(&self) {
        *self.page.lock() = None;
    }
}
