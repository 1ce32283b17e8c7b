//! Repository preparation boundary.
//!
//! Fetching and unpacking repositories is someone else's job. A session only
//! needs to know whether a local source root is available and where it is.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

/// Directory name used for unpacked sources inside a prepared checkout.
pub const SOURCE_DIR: &str = "__SOURCE_CODE__";

/// Identifies the repository a client asked about.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RepoLocator {
    pub org: String,
    pub name: String,
}

/// Outcome of preparing a repository on local storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prepared {
    pub success: bool,
    pub root_path: Option<PathBuf>,
}

impl Prepared {
    pub fn ready(root_path: PathBuf) -> Self {
        Self {
            success: true,
            root_path: Some(root_path),
        }
    }

    pub fn failed() -> Self {
        Self {
            success: false,
            root_path: None,
        }
    }
}

/// Makes a repository available locally.
#[async_trait]
pub trait RepoPreparer: Send + Sync {
    async fn prepare(&self, locator: &RepoLocator) -> Prepared;
}

/// Serves repositories already present under `<repos_dir>/<org>/<name>`.
#[derive(Debug, Clone)]
pub struct LocalPreparer {
    repos_dir: PathBuf,
}

impl LocalPreparer {
    pub fn new(repos_dir: impl Into<PathBuf>) -> Self {
        Self {
            repos_dir: repos_dir.into(),
        }
    }

    fn locate(&self, locator: &RepoLocator) -> Option<PathBuf> {
        if !is_plain_segment(&locator.org) || !is_plain_segment(&locator.name) {
            warn!(org = %locator.org, name = %locator.name, "rejecting repository locator");
            return None;
        }
        let checkout = self.repos_dir.join(&locator.org).join(&locator.name);
        let source = checkout.join(SOURCE_DIR);
        let root = if source.is_dir() { source } else { checkout };
        if !root.is_dir() {
            return None;
        }

        let base = self.repos_dir.canonicalize().ok()?;
        let real = root.canonicalize().ok()?;
        if !real.starts_with(&base) {
            warn!(path = %real.display(), "repository escapes repos_dir");
            return None;
        }
        Some(real)
    }
}

#[async_trait]
impl RepoPreparer for LocalPreparer {
    async fn prepare(&self, locator: &RepoLocator) -> Prepared {
        match self.locate(locator) {
            Some(root) => {
                debug!(root = %root.display(), "repository prepared");
                Prepared::ready(root)
            }
            None => {
                warn!(org = %locator.org, name = %locator.name, "repository not available");
                Prepared::failed()
            }
        }
    }
}

fn is_plain_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && Path::new(segment).components().count() == 1
}
