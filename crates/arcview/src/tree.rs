//! Unified directory/file tree built from a flat entry enumeration.

use crate::types::{format_size, EntryRecord};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// A node in the unified path tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TreeNode {
    Directory {
        name: String,
        #[serde(serialize_with = "ordered_children")]
        children: BTreeMap<String, TreeNode>,
    },
    File {
        name: String,
        info: EntryRecord,
    },
}

/// Folds entry records into a [`TreeNode`] rooted at an unnamed directory.
pub struct PathTreeBuilder;

impl PathTreeBuilder {
    /// Build the tree. Intermediate directories are synthesized on demand.
    ///
    /// When a name is used both as a file and as a directory, the directory
    /// wins and the conflicting file record is dropped with a warning.
    pub fn build<I>(entries: I) -> TreeNode
    where
        I: IntoIterator<Item = EntryRecord>,
    {
        let mut root = BTreeMap::new();

        for entry in entries {
            let Some(last) = entry.path.last().cloned() else {
                continue;
            };
            let parents = entry.path[..entry.path.len() - 1].to_vec();

            let Some(level) = parents
                .iter()
                .try_fold(&mut root, |level, segment| directory_children(level, segment))
            else {
                continue;
            };

            if last.is_empty() || entry.is_directory {
                if !last.is_empty() {
                    directory_children(level, &last);
                }
                continue;
            }

            if matches!(level.get(&last), Some(TreeNode::Directory { .. })) {
                tracing::warn!(path = %entry.display_path(), "File shadows a directory, keeping the directory");
                continue;
            }

            level.insert(
                last.clone(),
                TreeNode::File {
                    name: last,
                    info: entry,
                },
            );
        }

        TreeNode::Directory {
            name: String::new(),
            children: root,
        }
    }
}

/// Children of the directory `segment` under `level`, created on demand.
/// A file already stored under that name is replaced by the directory.
fn directory_children<'a>(
    level: &'a mut BTreeMap<String, TreeNode>,
    segment: &str,
) -> Option<&'a mut BTreeMap<String, TreeNode>> {
    let node = level
        .entry(segment.to_string())
        .or_insert_with(|| empty_directory(segment));

    if let TreeNode::File { info, .. } = node {
        tracing::warn!(path = %info.display_path(), "Directory shadows a file, keeping the directory");
        *node = empty_directory(segment);
    }

    match node {
        TreeNode::Directory { children, .. } => Some(children),
        TreeNode::File { .. } => None,
    }
}

fn empty_directory(segment: &str) -> TreeNode {
    TreeNode::Directory {
        name: segment.to_string(),
        children: BTreeMap::new(),
    }
}

/// Display order: directories first, then case-insensitive by name.
fn display_order(a: &TreeNode, b: &TreeNode) -> Ordering {
    match (a.is_dir(), b.is_dir()) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a
            .name()
            .to_lowercase()
            .cmp(&b.name().to_lowercase())
            .then_with(|| a.name().cmp(b.name())),
    }
}

fn ordered_children<S>(children: &BTreeMap<String, TreeNode>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    let mut nodes: Vec<&TreeNode> = children.values().collect();
    nodes.sort_by(|a, b| display_order(a, b));
    serializer.collect_seq(nodes)
}

impl TreeNode {
    pub fn name(&self) -> &str {
        match self {
            TreeNode::Directory { name, .. } | TreeNode::File { name, .. } => name,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, TreeNode::Directory { .. })
    }

    /// Entry metadata, present only for files.
    pub fn file_info(&self) -> Option<&EntryRecord> {
        match self {
            TreeNode::File { info, .. } => Some(info),
            TreeNode::Directory { .. } => None,
        }
    }

    /// Children in display order. Empty for files.
    pub fn children(&self) -> Vec<&TreeNode> {
        match self {
            TreeNode::Directory { children, .. } => {
                let mut nodes: Vec<&TreeNode> = children.values().collect();
                nodes.sort_by(|a, b| display_order(a, b));
                nodes
            }
            TreeNode::File { .. } => Vec::new(),
        }
    }

    /// Look up a node by `/`-separated path relative to this node.
    pub fn find(&self, path: &str) -> Option<&TreeNode> {
        let mut node = self;
        for segment in path.split('/').filter(|s| !s.is_empty() && *s != ".") {
            match node {
                TreeNode::Directory { children, .. } => node = children.get(segment)?,
                TreeNode::File { .. } => return None,
            }
        }
        Some(node)
    }

    /// Number of file nodes below this node.
    pub fn file_count(&self) -> usize {
        match self {
            TreeNode::File { .. } => 1,
            TreeNode::Directory { children, .. } => children.values().map(TreeNode::file_count).sum(),
        }
    }

    /// Number of directory nodes below this node, excluding itself.
    pub fn dir_count(&self) -> usize {
        match self {
            TreeNode::File { .. } => 0,
            TreeNode::Directory { children, .. } => children
                .values()
                .map(|child| usize::from(child.is_dir()) + child.dir_count())
                .sum(),
        }
    }

    /// Depth-first walk in display order, yielding `(depth, node)` pairs.
    /// The node itself is not yielded.
    pub fn walk(&self) -> Vec<(usize, &TreeNode)> {
        let mut out = Vec::new();
        self.walk_into(0, &mut out);
        out
    }

    fn walk_into<'a>(&'a self, depth: usize, out: &mut Vec<(usize, &'a TreeNode)>) {
        for child in self.children() {
            out.push((depth, child));
            child.walk_into(depth + 1, out);
        }
    }

    /// Icon key for the node: `folder`, the lower-cased extension, or `file`.
    pub fn icon_key(&self) -> String {
        if self.is_dir() {
            return "folder".to_string();
        }
        std::path::Path::new(self.name())
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_else(|| "file".to_string())
    }

    /// Plain-text rendering, one node per line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (depth, node) in self.walk() {
            let indent = "  ".repeat(depth);
            match node {
                TreeNode::Directory { name, .. } => {
                    let _ = writeln!(out, "{}{}/", indent, name);
                }
                TreeNode::File { name, info } => {
                    let _ = writeln!(out, "{}{}  {}", indent, name, format_size(info.size_bytes));
                }
            }
        }
        out
    }
}
