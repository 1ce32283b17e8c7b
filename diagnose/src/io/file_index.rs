//! Opaque file-identity index over a repository directory.
//!
//! The index walks the tree once, mints an id per entry, and answers id → path
//! queries. Paths stay inside the index; the engine only ever sees ids through
//! [`FileIndex::serialize`].

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result, anyhow};
use rand::{Rng, distributions::Alphanumeric};
use serde_json::Value;
use tracing::{debug, instrument, warn};
use walkdir::{DirEntry, WalkDir};

use crate::tree::{FileId, FileNode};

/// Directory names never indexed.
const SKIPPED_DIRS: &[&str] = &[".git"];

/// Sessions started by this process; suffixes every session tag.
static SESSION_SEQ: AtomicU64 = AtomicU64::new(0);

/// Returned by [`FileIndex::resolve`] for ids this index never minted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotFound {
    pub id: String,
}

impl fmt::Display for NotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no file with id {}", self.id)
    }
}

impl std::error::Error for NotFound {}

/// Immutable id space over one directory tree.
#[derive(Debug, Clone)]
pub struct FileIndex {
    session_tag: String,
    root: FileNode,
    paths: HashMap<FileId, PathBuf>,
}

impl FileIndex {
    /// Walk `root` and mint an id for every reachable entry.
    pub fn build(root: &Path) -> Result<Self> {
        Self::build_with(root, |_, _| {})
    }

    /// Like [`FileIndex::build`], invoking `on_discover` once per minted id.
    #[instrument(skip_all, fields(root = %root.display()))]
    pub fn build_with<F>(root: &Path, mut on_discover: F) -> Result<Self>
    where
        F: FnMut(&FileId, &Path),
    {
        let root = root
            .canonicalize()
            .with_context(|| format!("resolve repository root {}", root.display()))?;
        if !root.is_dir() {
            return Err(anyhow!("repository root {} is not a directory", root.display()));
        }

        let mut minter = IdMinter::new(generate_session_tag());
        let mut paths = HashMap::new();
        let mut visited_dirs = HashSet::new();
        // stack[d] is the open directory at depth d.
        let mut stack: Vec<FileNode> = Vec::new();

        let mut walker = WalkDir::new(&root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();

        while let Some(entry) = walker.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) if err.depth() == 0 => {
                    return Err(err).with_context(|| format!("walk {}", root.display()));
                }
                Err(err) => {
                    warn!(error = %err, "skipping unreadable entry");
                    continue;
                }
            };
            let depth = entry.depth();
            let is_dir = entry.file_type().is_dir();

            if depth > 0 && is_dir && is_skipped_dir(&entry) {
                walker.skip_current_dir();
                continue;
            }

            while stack.len() > depth {
                close_dir(&mut stack);
            }

            if is_dir {
                let real = fs::canonicalize(entry.path()).unwrap_or_else(|_| entry.path().into());
                if !visited_dirs.insert(real) {
                    debug!(path = %entry.path().display(), "directory already visited");
                    walker.skip_current_dir();
                    continue;
                }
            }

            let id = minter.mint();
            on_discover(&id, entry.path());
            paths.insert(id.clone(), entry.path().to_path_buf());

            let name = entry_name(&entry);
            if is_dir {
                stack.push(FileNode::directory(id, entry.path(), name));
            } else if let Some(parent) = stack.last_mut() {
                parent
                    .children
                    .get_or_insert_with(Vec::new)
                    .push(FileNode::file(id, entry.path(), name));
            }
        }

        while stack.len() > 1 {
            close_dir(&mut stack);
        }
        let root_node = stack
            .pop()
            .ok_or_else(|| anyhow!("repository root {} produced no entries", root.display()))?;

        debug!(entries = paths.len(), session_tag = %minter.tag, "file index built");
        Ok(Self {
            session_tag: minter.tag,
            root: root_node,
            paths,
        })
    }

    /// Resolve an id minted by this index.
    pub fn resolve(&self, id: &str) -> Result<&Path, NotFound> {
        self.paths
            .get(id)
            .map(PathBuf::as_path)
            .ok_or_else(|| NotFound { id: id.to_string() })
    }

    /// Tree summary safe to hand to the engine (`{id, name, kind, children}`).
    pub fn serialize(&self) -> Result<Value> {
        serde_json::to_value(&self.root).context("serialize file tree")
    }

    pub fn root(&self) -> &FileNode {
        &self.root
    }

    pub fn session_tag(&self) -> &str {
        &self.session_tag
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

struct IdMinter {
    tag: String,
    next: u64,
}

impl IdMinter {
    fn new(tag: String) -> Self {
        Self { tag, next: 1 }
    }

    fn mint(&mut self) -> FileId {
        let id = FileId::new(format!("{}-{}", self.tag, self.next));
        self.next += 1;
        id
    }
}

/// Six random characters, then the process-wide sequence number. The random
/// part has a fixed width, so distinct sequence numbers give distinct tags.
fn generate_session_tag() -> String {
    let mut rng = rand::thread_rng();
    let random = std::iter::repeat_with(|| rng.sample(Alphanumeric))
        .map(char::from)
        .take(6)
        .collect::<String>()
        .to_lowercase();
    let seq = SESSION_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{random}{seq}")
}

fn close_dir(stack: &mut Vec<FileNode>) {
    if stack.len() < 2 {
        return;
    }
    if let Some(done) = stack.pop()
        && let Some(parent) = stack.last_mut()
    {
        parent.children.get_or_insert_with(Vec::new).push(done);
    }
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| SKIPPED_DIRS.contains(&name))
}

fn entry_name(entry: &DirEntry) -> String {
    let name = entry.file_name().to_string_lossy();
    if name.is_empty() {
        ".".to_string()
    } else {
        name.into_owned()
    }
}
