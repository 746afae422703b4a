use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use tracing::{debug, warn};

use super::languages::{COMMON_SKIP_DIRS, Language, is_route_file};
use crate::config::Config;
use crate::error::{IndexError, Result};

/// A file selected for extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub language: Language,
}

/// Enumerates indexable files under a root.
///
/// Directories are pruned before descent: hidden ones (the root excepted),
/// the common skip list and `extra_skip_dirs`. Files are then matched by
/// extension, filtered by the language's own skip list and test convention,
/// by `exclude` globs and by size. Siblings are visited in file-name order.
pub struct Walker<'c> {
    config: &'c Config,
    excludes: GlobSet,
}

impl<'c> Walker<'c> {
    pub fn new(config: &'c Config) -> Self {
        let mut builder = GlobSetBuilder::new();
        for pattern in &config.exclude {
            match Glob::new(pattern) {
                Ok(glob) => {
                    builder.add(glob);
                }
                Err(e) => warn!("Ignoring exclude pattern {pattern}: {e}"),
            }
        }
        let excludes = builder.build().unwrap_or_else(|e| {
            warn!("Failed to build exclude set: {e}");
            GlobSet::empty()
        });
        Self { config, excludes }
    }

    pub fn walk(&self, root: &Path) -> Result<Vec<SourceFile>> {
        let files = self.files_under(root)?;
        let selected: Vec<SourceFile> = files
            .into_iter()
            .filter_map(|path| {
                let language = Language::from_path(&path)?;
                if !self.config.is_enabled(language) {
                    return None;
                }
                let lang = language.config();
                let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
                if !self.config.include_tests && (lang.is_test_file)(name) {
                    return None;
                }
                let rel = path.strip_prefix(root).unwrap_or(&path);
                let skipped = rel.parent().is_some_and(|parent| {
                    parent
                        .components()
                        .any(|c| lang.skips_dir(&c.as_os_str().to_string_lossy()))
                });
                if skipped {
                    return None;
                }
                Some(SourceFile { path, language })
            })
            .collect();
        debug!("Selected {} files under {}", selected.len(), root.display());
        Ok(selected)
    }

    /// `routes/<web|api|console|channels>.php` files under `root`.
    pub fn discover_route_files(&self, root: &Path) -> Result<Vec<PathBuf>> {
        Ok(self
            .files_under(root)?
            .into_iter()
            .filter(|p| is_route_file(p))
            .collect())
    }

    fn files_under(&self, root: &Path) -> Result<Vec<PathBuf>> {
        if !root.exists() {
            return Err(IndexError::RootNotFound(root.to_path_buf()));
        }

        let extra = self.config.extra_skip_dirs.clone();
        let mut builder = WalkBuilder::new(root);
        builder
            .standard_filters(self.config.respect_gitignore)
            .hidden(false)
            .require_git(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .filter_entry(move |entry| {
                if entry.depth() == 0 {
                    return true;
                }
                let name = entry.file_name().to_string_lossy();
                if name.starts_with('.') {
                    return false;
                }
                let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
                !(is_dir
                    && (COMMON_SKIP_DIRS.contains(&name.as_ref())
                        || extra.iter().any(|d| d == name.as_ref())))
            });

        let mut files = Vec::new();
        for result in builder.build() {
            let entry = match result {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry: {e}");
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let path = entry.path();
            let rel = path.strip_prefix(root).unwrap_or(path);
            if self.excludes.is_match(rel) {
                debug!("Excluded {}", path.display());
                continue;
            }
            if let Ok(meta) = entry.metadata()
                && meta.len() > self.config.max_file_bytes
            {
                debug!(
                    "Skipping large file {} ({} bytes > {})",
                    path.display(),
                    meta.len(),
                    self.config.max_file_bytes
                );
                continue;
            }
            files.push(path.to_path_buf());
        }
        Ok(files)
    }
}
