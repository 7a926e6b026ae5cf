//! Flattened view of a book's table of contents.
//!
//! The position of an entry in the flattened list is its chapter number; it
//! drives the `n / total` counter and previous/next navigation.

use std::collections::HashSet;

use crate::models::NavNode;

/// A navigation node lifted out of the tree, with its nesting depth.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatEntry {
    pub id: Option<String>,
    pub href: String,
    pub label: String,
    pub depth: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Neighbors<'a> {
    pub previous: Option<&'a FlatEntry>,
    pub next: Option<&'a FlatEntry>,
}

/// Pre-order traversal: parents before children, siblings in tree order.
pub fn flatten(tree: &[NavNode]) -> Vec<FlatEntry> {
    let mut entries = Vec::new();
    append_entries(&mut entries, tree, 0);
    entries
}

fn append_entries(entries: &mut Vec<FlatEntry>, nodes: &[NavNode], depth: usize) {
    for node in nodes {
        entries.push(FlatEntry {
            id: node.id.clone(),
            href: node.href.clone(),
            label: node.label.clone(),
            depth,
        });

        if !node.children.is_empty() {
            append_entries(entries, &node.children, depth + 1);
        }
    }
}

/// First entry whose href matches exactly. No fragment or encoding
/// normalization is applied.
pub fn index_of(entries: &[FlatEntry], href: &str) -> Option<usize> {
    entries.iter().position(|entry| entry.href == href)
}

pub fn neighbors(entries: &[FlatEntry], index: usize) -> Neighbors<'_> {
    if index >= entries.len() {
        return Neighbors::default();
    }
    Neighbors {
        previous: index.checked_sub(1).and_then(|i| entries.get(i)),
        next: entries.get(index + 1),
    }
}

/// The flattened list for one loaded book.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocationIndex {
    entries: Vec<FlatEntry>,
    duplicates: Vec<String>,
}

impl LocationIndex {
    pub fn new(tree: &[NavNode]) -> Self {
        let entries = flatten(tree);

        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        for entry in &entries {
            if !seen.insert(entry.href.as_str()) && !duplicates.contains(&entry.href) {
                duplicates.push(entry.href.clone());
            }
        }

        Self { entries, duplicates }
    }

    pub fn entries(&self) -> &[FlatEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&FlatEntry> {
        self.entries.get(index)
    }

    pub fn index_of(&self, href: &str) -> Option<usize> {
        index_of(&self.entries, href)
    }

    pub fn neighbors(&self, index: usize) -> Neighbors<'_> {
        neighbors(&self.entries, index)
    }

    /// Hrefs that appear more than once; lookups resolve to the first.
    pub fn duplicate_hrefs(&self) -> &[String] {
        &self.duplicates
    }
}
