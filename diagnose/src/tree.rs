use std::borrow::Borrow;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Opaque identifier minted by the file index.
///
/// Carries no meaning outside the session that minted it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(String);

impl FileId {
    pub(crate) fn new(raw: String) -> Self {
        Self(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for FileId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    File,
    Directory,
}

/// One entry discovered while indexing a repository.
///
/// `path` never leaves the index: it is skipped on serialization so the tree
/// summary handed to the engine only carries `{id, name, kind, children}`.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct FileNode {
    pub id: FileId,
    #[serde(skip)]
    pub path: PathBuf,
    pub name: String,
    pub kind: FileKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<FileNode>>,
}

impl FileNode {
    pub fn file(id: FileId, path: &Path, name: String) -> Self {
        Self {
            id,
            path: path.to_path_buf(),
            name,
            kind: FileKind::File,
            children: None,
        }
    }

    pub fn directory(id: FileId, path: &Path, name: String) -> Self {
        Self {
            id,
            path: path.to_path_buf(),
            name,
            kind: FileKind::Directory,
            children: Some(Vec::new()),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }

    pub fn children(&self) -> &[FileNode] {
        self.children.as_deref().unwrap_or_default()
    }

    /// Depth-first pre-order walk over this node and its descendants.
    pub fn walk(&self) -> Vec<&FileNode> {
        let mut out = Vec::new();
        walk_inner(self, &mut out);
        out
    }

    /// Find a descendant (or self) by name path relative to this node, e.g. `["src", "main.rs"]`.
    pub fn find(&self, names: &[&str]) -> Option<&FileNode> {
        let Some((first, rest)) = names.split_first() else {
            return Some(self);
        };
        self.children()
            .iter()
            .find(|child| child.name == *first)
            .and_then(|child| child.find(rest))
    }
}

fn walk_inner<'a>(node: &'a FileNode, out: &mut Vec<&'a FileNode>) {
    out.push(node);
    for child in node.children() {
        walk_inner(child, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serialized_node_omits_path() {
        let mut dir = FileNode::directory(
            FileId::new("d1".to_string()),
            Path::new("/secret/repo"),
            "repo".to_string(),
        );
        dir.children.as_mut().expect("dir children").push(FileNode::file(
            FileId::new("f1".to_string()),
            Path::new("/secret/repo/a.ts"),
            "a.ts".to_string(),
        ));

        let value = serde_json::to_value(&dir).expect("serialize");
        assert_eq!(
            value,
            json!({
                "id": "d1",
                "name": "repo",
                "kind": "directory",
                "children": [{"id": "f1", "name": "a.ts", "kind": "file"}]
            })
        );
        assert!(!value.to_string().contains("/secret"));
    }

    #[test]
    fn find_follows_name_path() {
        let mut root = FileNode::directory(
            FileId::new("r".to_string()),
            Path::new("/r"),
            "r".to_string(),
        );
        let mut src = FileNode::directory(
            FileId::new("s".to_string()),
            Path::new("/r/src"),
            "src".to_string(),
        );
        src.children.as_mut().expect("src children").push(FileNode::file(
            FileId::new("m".to_string()),
            Path::new("/r/src/main.rs"),
            "main.rs".to_string(),
        ));
        root.children.as_mut().expect("root children").push(src);

        let found = root.find(&["src", "main.rs"]).expect("found");
        assert_eq!(found.id.as_str(), "m");
        assert!(root.find(&["missing"]).is_none());
        assert_eq!(root.walk().len(), 3);
    }
}
