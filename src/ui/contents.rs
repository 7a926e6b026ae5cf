use crate::location::{FlatEntry, LocationIndex};

/// The table of contents with the current chapter marked.
pub struct ContentsList {
    pub entries: Vec<FlatEntry>,
    current: Option<usize>,
}

impl ContentsList {
    pub fn new(index: &LocationIndex, current_location: Option<&str>) -> Self {
        Self {
            entries: index.entries().to_vec(),
            current: current_location.and_then(|href| index.index_of(href)),
        }
    }

    /// Chapter counter, 1-based.
    pub fn footer(&self) -> Option<String> {
        self.current
            .map(|index| format!("{} / {}", index + 1, self.entries.len()))
    }

    pub fn render_lines(&self) -> Vec<String> {
        if self.entries.is_empty() {
            return vec!["No table of contents available".to_string()];
        }

        let mut lines: Vec<String> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let marker = if Some(i) == self.current { '>' } else { ' ' };
                format!("{} {}{}", marker, "  ".repeat(entry.depth), entry.label)
            })
            .collect();

        if let Some(footer) = self.footer() {
            lines.push(String::new());
            lines.push(footer);
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NavNode;

    fn index() -> LocationIndex {
        LocationIndex::new(&[
            NavNode::new("c1", "One"),
            NavNode::new("c2", "Two").with_children(vec![NavNode::new("c2a", "Two A")]),
        ])
    }

    #[test]
    fn test_render_marks_current_and_indents_children() {
        let list = ContentsList::new(&index(), Some("c2a"));
        assert_eq!(
            list.render_lines(),
            vec![
                "  One".to_string(),
                "  Two".to_string(),
                ">   Two A".to_string(),
                String::new(),
                "3 / 3".to_string(),
            ]
        );
    }

    #[test]
    fn test_location_outside_contents_has_no_marker() {
        let list = ContentsList::new(&index(), Some("appendix.xhtml"));
        assert_eq!(list.footer(), None);
        assert!(list.render_lines().iter().all(|line| !line.starts_with('>')));
        assert_eq!(list.render_lines().len(), 3);
    }

    #[test]
    fn test_empty_contents() {
        let list = ContentsList::new(&LocationIndex::default(), None);
        assert_eq!(list.render_lines(), vec!["No table of contents available".to_string()]);
        assert_eq!(list.footer(), None);
    }
}
