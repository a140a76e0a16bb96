//! Project scoping: turn a project configuration into the concrete list of
//! files to index.
//!
//! Include roots are resolved against the project root and walked
//! depth-first; exclude patterns match against the relative path, the
//! absolute path, and the basename. A `.gitignore` at the project root
//! contributes additional patterns (negations are ignored).

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::constants::ALWAYS_EXCLUDED_DIRS;
use crate::error::{Result, SemIndexError};
use crate::paths;
use crate::store::ProjectConfig;

/// One candidate file inside the project scope.
#[derive(Debug, Clone)]
pub struct FilePreview {
    pub absolute_path: PathBuf,
    pub relative_path: String,
    pub extension: String,
    pub size: u64,
    pub hidden: bool,
    pub last_modified: i64,
}

/// The compiled scope of a project: exclude matcher + extension allow-list.
pub struct ProjectScope {
    root: PathBuf,
    include_roots: Vec<PathBuf>,
    excludes: GlobSet,
    extensions: HashSet<String>,
    auto_exclude_hidden: bool,
}

impl ProjectScope {
    pub fn new(config: &ProjectConfig) -> Result<Self> {
        let root = config
            .root_path
            .canonicalize()
            .map_err(|e| SemIndexError::io(config.root_path.clone(), e))?;

        let mut include_roots = Vec::new();
        let includes = if config.include_paths.is_empty() {
            vec![".".to_string()]
        } else {
            config.include_paths.clone()
        };
        for include in &includes {
            let abs = if include == "." {
                root.clone()
            } else {
                root.join(include)
            };
            let Ok(abs) = abs.canonicalize() else {
                tracing::warn!(path = %abs.display(), "include path does not exist, skipping");
                continue;
            };
            if abs.is_dir() && !include_roots.contains(&abs) {
                include_roots.push(abs);
            }
        }

        let mut patterns: Vec<String> = config.exclude_patterns.clone();
        patterns.extend(gitignore_patterns(&root));

        let mut builder = GlobSetBuilder::new();
        for pattern in &patterns {
            match Glob::new(pattern) {
                Ok(glob) => {
                    builder.add(glob);
                }
                Err(e) => {
                    tracing::warn!(pattern = %pattern, "ignoring invalid exclude pattern: {e}");
                }
            }
        }
        let excludes = builder
            .build()
            .map_err(|e| SemIndexError::Other(format!("build exclude set: {e}")))?;

        let extensions = config
            .file_extensions
            .iter()
            .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
            .collect();

        Ok(Self {
            root,
            include_roots,
            excludes,
            extensions,
            auto_exclude_hidden: config.auto_exclude_hidden,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether a path matches any exclude pattern, tested against its
    /// relative, absolute, and basename forms.
    fn is_excluded(&self, absolute: &Path) -> bool {
        if self.excludes.is_empty() {
            return false;
        }
        if self.excludes.is_match(absolute) {
            return true;
        }
        if let Ok(rel) = absolute.strip_prefix(&self.root) {
            if self.excludes.is_match(rel) {
                return true;
            }
        }
        absolute
            .file_name()
            .map(|name| self.excludes.is_match(Path::new(name)))
            .unwrap_or(false)
    }

    fn dir_enterable(&self, entry: &walkdir::DirEntry) -> bool {
        let name = entry.file_name().to_string_lossy();
        if ALWAYS_EXCLUDED_DIRS.contains(&name.as_ref()) {
            return false;
        }
        if self.auto_exclude_hidden && name.starts_with('.') && entry.depth() > 0 {
            return false;
        }
        !self.is_excluded(entry.path())
    }

    /// Whether a single file is in scope (used by the watcher for events).
    pub fn accepts_file(&self, absolute: &Path) -> bool {
        let Some(rel) = paths::relative_within(&self.root, absolute) else {
            return false;
        };
        // Every ancestor directory must itself be enterable
        for component in Path::new(&rel)
            .components()
            .take(Path::new(&rel).components().count().saturating_sub(1))
        {
            let name = component.as_os_str().to_string_lossy();
            if ALWAYS_EXCLUDED_DIRS.contains(&name.as_ref()) {
                return false;
            }
            if self.auto_exclude_hidden && name.starts_with('.') {
                return false;
            }
        }
        if self.is_excluded(absolute) {
            return false;
        }
        self.extension_allowed(absolute)
    }

    fn extension_allowed(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.contains(&e.to_ascii_lowercase()))
            .unwrap_or(false)
    }

    /// Walk every include root and emit the deduplicated candidate list.
    pub fn preview_files(&self) -> Result<Vec<FilePreview>> {
        let mut seen: HashSet<PathBuf> = HashSet::new();
        let mut previews = Vec::new();

        for include_root in &self.include_roots {
            for entry in WalkDir::new(include_root)
                .follow_links(false)
                .into_iter()
                .filter_entry(|e| e.file_type().is_file() || self.dir_enterable(e))
            {
                let entry = match entry {
                    Ok(e) => e,
                    Err(e) => {
                        tracing::warn!("walk error: {e}");
                        continue;
                    }
                };
                if !entry.file_type().is_file() {
                    continue;
                }
                let absolute = entry.path().to_path_buf();
                if seen.contains(&absolute) {
                    continue;
                }
                if self.is_excluded(&absolute) || !self.extension_allowed(&absolute) {
                    continue;
                }
                let Some(relative) = paths::relative_within(&self.root, &absolute) else {
                    continue;
                };
                let Ok(metadata) = entry.metadata() else {
                    continue;
                };
                let last_modified = metadata
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                    .map(|d| d.as_secs() as i64)
                    .unwrap_or(0);
                let name = entry.file_name().to_string_lossy();

                previews.push(FilePreview {
                    extension: absolute
                        .extension()
                        .and_then(|e| e.to_str())
                        .map(|e| e.to_ascii_lowercase())
                        .unwrap_or_default(),
                    size: metadata.len(),
                    hidden: name.starts_with('.'),
                    last_modified,
                    relative_path: relative,
                    absolute_path: absolute.clone(),
                });
                seen.insert(absolute);
            }
        }

        previews.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        Ok(previews)
    }

    /// Directories the watcher should register, honouring the same scope.
    pub fn watchable_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = Vec::new();
        for include_root in &self.include_roots {
            for entry in WalkDir::new(include_root)
                .follow_links(false)
                .into_iter()
                .filter_entry(|e| e.file_type().is_file() || self.dir_enterable(e))
                .flatten()
            {
                if entry.file_type().is_dir() {
                    dirs.push(entry.path().to_path_buf());
                }
            }
        }
        dirs
    }
}

/// Patterns from the project root `.gitignore`, expanded so they match at
/// any depth. Negation rules are ignored.
fn gitignore_patterns(root: &Path) -> Vec<String> {
    let Ok(content) = std::fs::read_to_string(root.join(".gitignore")) else {
        return Vec::new();
    };
    let mut patterns = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let anchored = line.starts_with('/');
        let cleaned = line.trim_start_matches('/').trim_end_matches('/');
        if cleaned.is_empty() {
            continue;
        }
        if anchored {
            patterns.push(cleaned.to_string());
            patterns.push(format!("{cleaned}/**"));
        } else {
            patterns.push(cleaned.to_string());
            patterns.push(format!("**/{cleaned}"));
            patterns.push(format!("**/{cleaned}/**"));
            patterns.push(format!("{cleaned}/**"));
        }
    }
    patterns
}
