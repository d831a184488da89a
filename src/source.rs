//! Source tree references and exclusion filtering
//!
//! A [`Directory`] names a host directory plus the exclusion set applied when
//! it is copied into an image. Staging walks the tree once, skipping excluded
//! paths, and copies the survivors into a build context. The same walk feeds
//! the content digest used to address the resulting layer.

use crate::error::{MlpipeError, MlpipeResult};
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// A compiled set of exclusion patterns.
///
/// Patterns are anchored at the source root. A path is excluded when the
/// pattern's segments match a prefix of the path's segments, so `.git`
/// excludes `.git/HEAD` and `data/interim/*` excludes `data/interim/a.csv`
/// while keeping `data/interim` itself. A leading `**` segment matches at
/// any depth.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExcludeSet {
    patterns: Vec<Pattern>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Pattern {
    any_depth: bool,
    segments: Vec<String>,
}

impl Pattern {
    fn parse(raw: &str) -> Option<Self> {
        let mut segments: Vec<String> = raw
            .trim()
            .split('/')
            .filter(|s| !s.is_empty() && *s != ".")
            .map(String::from)
            .collect();

        let any_depth = segments.first().is_some_and(|s| s == "**");
        if any_depth {
            segments.remove(0);
        }

        if segments.is_empty() {
            return None;
        }

        Some(Self {
            any_depth,
            segments,
        })
    }

    fn matches(&self, path: &[Option<&str>]) -> bool {
        if self.any_depth {
            (0..path.len()).any(|start| self.matches_at(&path[start..]))
        } else {
            self.matches_at(path)
        }
    }

    /// Segments that are not valid UTF-8 never match
    fn matches_at(&self, path: &[Option<&str>]) -> bool {
        path.len() >= self.segments.len()
            && self
                .segments
                .iter()
                .zip(path)
                .all(|(pat, seg)| seg.is_some_and(|seg| glob_segment(pat, seg)))
    }
}

/// Match one path segment against a pattern with `*` and `?` wildcards
fn glob_segment(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();

    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<usize> = None;
    let mut mark = 0;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            mark = ti;
            pi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            mark += 1;
            ti = mark;
        } else {
            return false;
        }
    }

    p[pi..].iter().all(|c| *c == '*')
}

impl ExcludeSet {
    /// Compile a list of patterns. Blank entries are ignored.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
        Self {
            patterns: patterns
                .iter()
                .filter_map(|p| Pattern::parse(p.as_ref()))
                .collect(),
        }
    }

    /// Whether `relative` (a path relative to the source root) is excluded
    pub fn is_excluded(&self, relative: &Path) -> bool {
        let segments: Vec<Option<&str>> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_str()),
                _ => None,
            })
            .collect();

        if segments.is_empty() {
            return false;
        }

        self.patterns.iter().any(|p| p.matches(&segments))
    }
}

/// A host directory reference with the exclusions applied on copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    root: PathBuf,
    exclude: ExcludeSet,
}

/// Kind of a surviving tree entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Dir,
    File,
    /// Kept as a link, never followed
    Symlink,
}

/// Summary of a staged source tree
#[derive(Debug, Clone)]
pub struct StagedTree {
    /// Where the filtered tree was written
    pub dest: PathBuf,
    /// Number of regular files copied
    pub files: usize,
}

impl Directory {
    /// Reference `root` with no exclusions
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            exclude: ExcludeSet::default(),
        }
    }

    /// Return a copy of this reference with `exclude` applied
    pub fn with_exclude(&self, exclude: ExcludeSet) -> Self {
        Self {
            root: self.root.clone(),
            exclude,
        }
    }

    /// Host path of the tree
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Relative paths of every entry that survives the exclusion filter,
    /// in a deterministic order.
    pub fn entries(&self) -> MlpipeResult<Vec<(PathBuf, EntryKind)>> {
        if !self.root.is_dir() {
            return Err(MlpipeError::PathNotFound(self.root.clone()));
        }

        let mut entries = Vec::new();
        let root = self.root.clone();
        let exclude = self.exclude.clone();

        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| {
                entry
                    .path()
                    .strip_prefix(&root)
                    .map(|rel| !exclude.is_excluded(rel))
                    .unwrap_or(true)
            });

        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_default();
                MlpipeError::io(
                    format!("walking {}", path.display()),
                    e.into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("filesystem loop")),
                )
            })?;

            let rel = entry
                .path()
                .strip_prefix(&self.root)
                .map_err(|e| MlpipeError::Internal(e.to_string()))?
                .to_path_buf();

            let file_type = entry.file_type();
            let kind = if file_type.is_symlink() {
                EntryKind::Symlink
            } else if file_type.is_dir() {
                EntryKind::Dir
            } else {
                EntryKind::File
            };

            entries.push((rel, kind));
        }

        Ok(entries)
    }

    fn read_link(&self, rel: &Path) -> MlpipeResult<PathBuf> {
        let path = self.root.join(rel);
        std::fs::read_link(&path)
            .map_err(|e| MlpipeError::io(format!("reading link {}", path.display()), e))
    }

    /// Content digest of the filtered tree: relative paths plus file bytes.
    /// Symlinks contribute their target, so dangling links are fine.
    pub fn digest(&self) -> MlpipeResult<String> {
        let mut hasher = Sha256::new();

        for (rel, kind) in self.entries()? {
            hasher.update(rel.to_string_lossy().as_bytes());
            match kind {
                EntryKind::Dir => hasher.update(b"/"),
                EntryKind::Symlink => {
                    hasher.update(b"->");
                    hasher.update(self.read_link(&rel)?.to_string_lossy().as_bytes());
                }
                EntryKind::File => {
                    let path = self.root.join(&rel);
                    let bytes = std::fs::read(&path)
                        .map_err(|e| MlpipeError::io(format!("reading {}", path.display()), e))?;
                    hasher.update((bytes.len() as u64).to_le_bytes());
                    hasher.update(&bytes);
                }
            }
        }

        Ok(hex::encode(hasher.finalize()))
    }

    /// Copy the filtered tree into `dest`, which is created if missing.
    /// Symlinks are recreated with their original target.
    pub fn stage(&self, dest: &Path) -> MlpipeResult<StagedTree> {
        std::fs::create_dir_all(dest)
            .map_err(|e| MlpipeError::io(format!("creating {}", dest.display()), e))?;

        let mut files = 0;
        for (rel, kind) in self.entries()? {
            let target = dest.join(&rel);
            match kind {
                EntryKind::Dir => {
                    std::fs::create_dir_all(&target).map_err(|e| {
                        MlpipeError::io(format!("creating {}", target.display()), e)
                    })?;
                }
                EntryKind::Symlink => {
                    let link = self.read_link(&rel)?;
                    symlink(&link, &target)?;
                }
                EntryKind::File => {
                    let source = self.root.join(&rel);
                    std::fs::copy(&source, &target).map_err(|e| {
                        MlpipeError::io(format!("copying {}", source.display()), e)
                    })?;
                    files += 1;
                }
            }
        }

        debug!(
            "Staged {} files from {} into {}",
            files,
            self.root.display(),
            dest.display()
        );

        Ok(StagedTree {
            dest: dest.to_path_buf(),
            files,
        })
    }
}

#[cfg(unix)]
fn symlink(link: &Path, target: &Path) -> MlpipeResult<()> {
    std::os::unix::fs::symlink(link, target)
        .map_err(|e| MlpipeError::io(format!("linking {}", target.display()), e))
}

#[cfg(not(unix))]
fn symlink(_link: &Path, target: &Path) -> MlpipeResult<()> {
    debug!("Skipping symlink {}", target.display());
    Ok(())
}
