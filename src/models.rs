use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// One entry of a book's table of contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavNode {
    pub id: Option<String>,
    pub href: String,
    pub label: String,
    #[serde(default)]
    pub children: Vec<NavNode>,
}

impl NavNode {
    pub fn new(href: &str, label: &str) -> Self {
        Self {
            id: None,
            href: href.to_string(),
            label: label.to_string(),
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<NavNode>) -> Self {
        self.children = children;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Oled,
    Dark,
    Light,
}

impl Theme {
    pub const ALL: [Theme; 3] = [Theme::Oled, Theme::Dark, Theme::Light];

    pub fn name(self) -> &'static str {
        match self {
            Theme::Oled => "oled",
            Theme::Dark => "dark",
            Theme::Light => "light",
        }
    }
}

impl Default for Theme {
    fn default() -> Self {
        Theme::Oled
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "oled" => Ok(Theme::Oled),
            "dark" => Ok(Theme::Dark),
            "light" => Ok(Theme::Light),
            other => Err(format!("unknown theme '{}' (expected oled, dark or light)", other)),
        }
    }
}

/// Metadata recorded alongside a stored book payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookMeta {
    pub title: String,
    pub author: String,
    pub cover_url: Option<String>,
    pub stored_at: DateTime<Utc>,
    pub digest: String,
}

impl BookMeta {
    /// Initial metadata for a freshly selected file. Title is the file name
    /// without its extension.
    pub fn from_file_name(file_name: &str, bytes: &[u8]) -> Self {
        static EXTENSION: OnceLock<Regex> = OnceLock::new();
        let re = EXTENSION.get_or_init(|| Regex::new(r"\.[^/.]+$").expect("static regex"));

        let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
        let stem = re.replace(base, "");
        let title = if stem.trim().is_empty() {
            "Untitled".to_string()
        } else {
            stem.to_string()
        };

        Self {
            title,
            author: "Unknown".to_string(),
            cover_url: None,
            stored_at: Utc::now(),
            digest: payload_digest(bytes),
        }
    }
}

/// Short SHA-1 fingerprint of a book payload.
pub fn payload_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    let hash = hasher.finalize();
    hex::encode(hash)[..16].to_string()
}

/// Title and author as reported by the rendering engine after parsing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BookMetadata {
    pub title: Option<String>,
    pub creator: Option<String>,
}

/// A settled location reported by a rendition.
#[derive(Debug, Clone, PartialEq)]
pub struct Relocation {
    /// Chapter-level location token, comparable with navigation hrefs.
    pub href: String,
    /// Precise position inside the chapter, if the engine provides one.
    pub position: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flow {
    Scrolled,
    Paginated,
}

impl Default for Flow {
    fn default() -> Self {
        Flow::Scrolled
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutOptions {
    pub flow: Flow,
    pub width: usize,
    /// Rows per page; 0 means unbounded.
    pub height: usize,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            flow: Flow::Scrolled,
            width: 80,
            height: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Landing,
    Contents,
    Reader,
}

impl Default for Screen {
    fn default() -> Self {
        Screen::Landing
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScrollChannel {
    Contents,
    Sidebar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Document,
    TextInput,
}
