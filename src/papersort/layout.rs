//! Docstore layout tree, its text parser, and the filing-path validator.
//!
//! Layout text is a plain outline. Everything before the start marker is
//! prose for humans (and for the classifier prompt). After the marker, each
//! non-empty line is `name` or `name: description`, and its indentation
//! (two whitespace characters per level) decides nesting.

use crate::error::PaperSortError;
use std::collections::BTreeMap;

pub const LAYOUT_MARKER: &str = "LAYOUT STARTS HERE";
pub const MAX_FOLDER_NAME_CHARS: usize = 30;
const INDENT_WIDTH: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WildcardKind {
    #[default]
    None,
    ByYear,
    ByCompany,
}

impl WildcardKind {
    pub fn from_name(name: &str) -> Self {
        if name.eq_ignore_ascii_case("by year") {
            Self::ByYear
        } else if name.eq_ignore_ascii_case("by company") {
            Self::ByCompany
        } else {
            Self::None
        }
    }

    /// Whether `segment` may stand in for this wildcard.
    pub fn accepts(self, segment: &str) -> bool {
        match self {
            Self::None => false,
            Self::ByYear => segment.len() == 4 && segment.chars().all(|c| c.is_ascii_digit()),
            Self::ByCompany => true,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::None => "",
            Self::ByYear => "any year",
            Self::ByCompany => "any company",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayoutNode {
    pub name: String,
    pub description: String,
    pub kind: WildcardKind,
    pub children: BTreeMap<String, LayoutNode>,
}

impl LayoutNode {
    fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            kind: WildcardKind::from_name(name),
            children: BTreeMap::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// The wildcard this node offers to unknown child segments. `By year`
    /// wins when both sentinels are present.
    pub fn wildcard(&self) -> WildcardKind {
        let mut found = WildcardKind::None;
        for child in self.children.values() {
            match child.kind {
                WildcardKind::ByYear => return WildcardKind::ByYear,
                WildcardKind::ByCompany => found = WildcardKind::ByCompany,
                WildcardKind::None => {}
            }
        }
        found
    }
}

#[derive(Debug, Clone)]
pub struct Layout {
    root: LayoutNode,
    text: String,
}

pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn validate_folder_name(name: &str) -> Result<(), PaperSortError> {
    if name.chars().count() > MAX_FOLDER_NAME_CHARS {
        return Err(PaperSortError::InvalidLayout(format!(
            "folder name too long (max {MAX_FOLDER_NAME_CHARS} chars): {name}"
        )));
    }
    if name.is_empty() || name.starts_with('.') || name.starts_with('-') {
        return Err(PaperSortError::InvalidLayout(format!(
            "invalid folder name (cannot be empty or start with . or -): {name}"
        )));
    }
    if name.chars().any(|c| c == '/' || c == '\\' || c.is_control()) {
        return Err(PaperSortError::InvalidLayout(format!(
            "invalid characters in folder name (no path separators or control characters): {name}"
        )));
    }
    Ok(())
}

impl Layout {
    pub fn parse(text: &str) -> Result<Self, PaperSortError> {
        let mut root = LayoutNode::default();
        let mut current_path: Vec<String> = Vec::new();
        let mut last_level: Option<usize> = None;
        let mut started = false;
        let mut entries = 0usize;

        for (idx, raw_line) in text.lines().enumerate() {
            let indent = raw_line.chars().take_while(|c| c.is_whitespace()).count();
            let level = indent / INDENT_WIDTH;
            let line = raw_line.trim();

            if line.contains(LAYOUT_MARKER) {
                started = true;
                continue;
            }
            if !started || line.is_empty() {
                continue;
            }

            let line = line.trim_start_matches('-').trim();
            if line.matches(':').count() > 1 {
                tracing::warn!(line = idx + 1, "malformed layout line skipped: '{line}'");
                continue;
            }
            let (name, description) = match line.split_once(':') {
                Some((name, description)) => (name.trim(), description.trim()),
                None => (line, ""),
            };
            validate_folder_name(name)?;

            match last_level {
                Some(prev) if level == prev => {
                    if let Some(last) = current_path.last_mut() {
                        *last = name.to_string();
                    }
                }
                Some(prev) if level < prev => {
                    current_path.truncate(level);
                    current_path.push(name.to_string());
                }
                _ => current_path.push(name.to_string()),
            }
            last_level = Some(level);

            let mut node = &mut root;
            for part in &current_path[..current_path.len() - 1] {
                node = node
                    .children
                    .entry(part.clone())
                    .or_insert_with(|| LayoutNode::new(part, ""));
            }
            let entry = node
                .children
                .entry(name.to_string())
                .or_insert_with(|| LayoutNode::new(name, description));
            entry.description = description.to_string();
            entries += 1;
        }

        if !started {
            return Err(PaperSortError::InvalidLayout(format!(
                "layout marker '{LAYOUT_MARKER}' not found"
            )));
        }
        if entries == 0 {
            return Err(PaperSortError::InvalidLayout(
                "no valid layout entries found after the layout marker".to_string(),
            ));
        }

        Ok(Self {
            root,
            text: text.to_string(),
        })
    }

    pub fn root(&self) -> &LayoutNode {
        &self.root
    }

    /// Raw layout text as read, handed to the classifier verbatim.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn node(&self, path: &str) -> Option<&LayoutNode> {
        let mut node = &self.root;
        for part in split_path(path) {
            node = node.children.get(part)?;
        }
        Some(node)
    }

    /// Accepts `path` only when it names a filing target: a leaf of the tree,
    /// or a concrete value substituted for a `By year` / `By company` slot.
    pub fn path_exists(&self, path: &str) -> bool {
        let parts = split_path(path);
        let Some(last) = parts.last() else {
            return false;
        };
        if WildcardKind::from_name(last) != WildcardKind::None {
            tracing::debug!("path '{path}' ends with placeholder '{last}'");
            return false;
        }

        let mut current = Some(&self.root);
        let mut used_dynamic = false;
        for part in &parts {
            let Some(node) = current else {
                tracing::debug!("path component '{part}' is below a dynamic folder");
                return false;
            };
            if let Some(child) = node.children.get(*part) {
                current = Some(child);
                continue;
            }
            if node.wildcard().accepts(part) {
                used_dynamic = true;
                current = None;
                continue;
            }
            tracing::debug!("path component '{part}' not found in layout");
            return false;
        }

        if used_dynamic {
            return true;
        }
        current.is_some_and(LayoutNode::is_leaf)
    }

    /// Every tree path whose node carries a `By company` child.
    pub fn wildcard_parents(&self) -> Vec<String> {
        fn walk(node: &LayoutNode, prefix: &str, out: &mut Vec<String>) {
            for child in node.children.values() {
                if child.kind == WildcardKind::ByCompany {
                    out.push(prefix.to_string());
                    continue;
                }
                let next = if prefix.is_empty() {
                    child.name.clone()
                } else {
                    format!("{prefix}/{}", child.name)
                };
                walk(child, &next, out);
            }
        }

        let mut out = Vec::new();
        walk(&self.root, "", &mut out);
        out.dedup();
        out
    }

    /// Whether the segment before the last one offers a `By company` slot.
    pub fn is_company_path(&self, path: &str) -> bool {
        let parts = split_path(path);
        if parts.len() < 2 {
            return false;
        }
        let parent = parts[..parts.len() - 1].join("/");
        self.node(&parent)
            .is_some_and(|node| node.children.values().any(|c| c.kind == WildcardKind::ByCompany))
    }

    /// All static leaf paths, sentinels excluded.
    pub fn leaf_paths(&self) -> Vec<String> {
        fn walk(node: &LayoutNode, prefix: &str, out: &mut Vec<String>) {
            for child in node.children.values() {
                if child.kind != WildcardKind::None {
                    continue;
                }
                let path = if prefix.is_empty() {
                    child.name.clone()
                } else {
                    format!("{prefix}/{}", child.name)
                };
                if child.is_leaf() {
                    out.push(path);
                } else {
                    walk(child, &path, out);
                }
            }
        }

        let mut out = Vec::new();
        walk(&self.root, "", &mut out);
        out
    }

    pub fn render(&self) -> String {
        fn walk(node: &LayoutNode, level: usize, out: &mut String) {
            for child in node.children.values() {
                out.push_str(&"  ".repeat(level));
                out.push_str("- ");
                out.push_str(&child.name);
                if child.kind != WildcardKind::None {
                    out.push_str(&format!(" <{}>", child.kind.label()));
                }
                if !child.description.is_empty() {
                    out.push_str(&format!(" ({})", child.description));
                }
                out.push('\n');
                walk(child, level + 1, out);
            }
        }

        let mut out = String::new();
        walk(&self.root, 0, &mut out);
        out
    }
}
