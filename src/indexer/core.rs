use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chunk::{Chunk, ChunkKind};
use crate::config::Config;
use crate::error::{IndexError, Result};
use crate::indexer::convert::unit_to_chunks;
use crate::indexer::go::GoExtractor;
use crate::indexer::languages::{Language, UnitScope};
use crate::indexer::markdown::MarkdownExtractor;
use crate::indexer::php::PhpExtractor;
use crate::indexer::php::eloquent::EloquentEnricher;
use crate::indexer::php::routes::RouteParser;
use crate::indexer::python::PythonExtractor;
use crate::indexer::symbols::CompilationUnit;
use crate::indexer::walker::{SourceFile, Walker};

#[derive(Debug, Default, PartialEq, Serialize)]
pub struct IndexReport {
    pub chunks: Vec<Chunk>,
    pub units_parsed: usize,
    pub units_failed: usize,
    pub routes: usize,
}

pub struct Indexer {
    config: Config,
    cancel: CancellationToken,
}

impl Indexer {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop between units once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Index every root, in the given order.
    ///
    /// Chunks come back sorted by `(file_path, start_line)`. A unit that
    /// fails to read or parse is logged and counted, never fatal. A missing
    /// root fails the whole call before any work is done; cancellation
    /// returns [`IndexError::Cancelled`] with what was collected so far.
    pub fn index<P: AsRef<Path>>(&self, roots: &[P]) -> Result<IndexReport> {
        for root in roots {
            let root = root.as_ref();
            if !root.exists() {
                return Err(IndexError::RootNotFound(root.to_path_buf()));
            }
        }

        let mut run = Run::new(&self.config, &self.cancel);
        for root in roots {
            run.root(root.as_ref())?;
        }
        run.explicit_routes()?;
        run.enrich();
        Ok(run.finish())
    }
}

/// State of one `index` call. Nothing here outlives it.
struct Run<'c> {
    config: &'c Config,
    cancel: &'c CancellationToken,
    walker: Walker<'c>,
    go: Option<GoExtractor>,
    php: Option<PhpExtractor>,
    routes: Option<RouteParser>,
    /// Package directories already converted.
    visited: HashSet<PathBuf>,
    route_files: HashSet<PathBuf>,
    php_units: Vec<CompilationUnit>,
    report: IndexReport,
}

impl<'c> Run<'c> {
    fn new(config: &'c Config, cancel: &'c CancellationToken) -> Self {
        Self {
            config,
            cancel,
            walker: Walker::new(config),
            go: None,
            php: None,
            routes: None,
            visited: HashSet::new(),
            route_files: HashSet::new(),
            php_units: Vec::new(),
            report: IndexReport::default(),
        }
    }

    fn check_cancelled(&mut self) -> Result<()> {
        if !self.cancel.is_cancelled() {
            return Ok(());
        }
        warn!(
            "Indexing cancelled after {} chunks",
            self.report.chunks.len()
        );
        let mut partial = std::mem::take(&mut self.report.chunks);
        sort_chunks(&mut partial);
        Err(IndexError::Cancelled { partial })
    }

    fn root(&mut self, root: &Path) -> Result<()> {
        info!("Indexing {}", root.display());
        let files = self.walker.walk(root)?;

        let mut packages: BTreeMap<(Language, PathBuf), Vec<PathBuf>> = BTreeMap::new();
        for file in &files {
            if file.language.config().unit_scope == UnitScope::Directory {
                packages
                    .entry((file.language, parent_dir(&file.path)))
                    .or_default()
                    .push(file.path.clone());
            }
        }

        for file in &files {
            self.check_cancelled()?;
            match file.language.config().unit_scope {
                UnitScope::File => self.file_unit(file),
                UnitScope::Directory => {
                    let key = (file.language, parent_dir(&file.path));
                    if let Some(paths) = packages.remove(&key) {
                        self.package_unit(file.language, &key.1, &paths);
                    }
                }
            }
        }

        if self.config.discover_routes
            && self.config.route_files.is_empty()
            && self.config.is_enabled(Language::Php)
        {
            for path in self.walker.discover_route_files(root)? {
                self.check_cancelled()?;
                self.route_file(&path);
            }
        }
        Ok(())
    }

    fn package_unit(&mut self, language: Language, dir: &Path, paths: &[PathBuf]) {
        match language {
            Language::Go => self.go_package(dir, paths),
            other => warn!("No package extractor for {other}, skipping {}", dir.display()),
        }
    }

    fn go_package(&mut self, dir: &Path, paths: &[PathBuf]) {
        let key = fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf());
        if !self.visited.insert(key) {
            return;
        }
        if self.go.is_none() {
            match GoExtractor::new(self.config.go.exported_only) {
                Ok(extractor) => self.go = Some(extractor),
                Err(e) => {
                    warn!("Go extractor unavailable: {e}");
                    self.report.units_failed += 1;
                    return;
                }
            }
        }
        let Some(go) = self.go.as_mut() else {
            return;
        };
        match go.extract_files(dir, paths) {
            Some(unit) => self.accept(unit),
            None => {
                warn!("Skipping Go package {}: no parseable files", dir.display());
                self.report.units_failed += 1;
            }
        }
    }

    fn file_unit(&mut self, file: &SourceFile) {
        let result = match file.language {
            Language::Php => self.php_unit(&file.path),
            Language::Python => PythonExtractor::extract_file(&file.path),
            Language::Markdown => MarkdownExtractor::extract_file(&file.path),
            Language::Go => return,
        };
        match result {
            Ok(unit) => self.accept(unit),
            Err(e) => {
                warn!("Skipping {}: {e}", file.path.display());
                self.report.units_failed += 1;
            }
        }
    }

    fn php_unit(&mut self, path: &Path) -> Result<CompilationUnit> {
        if self.php.is_none() {
            self.php = Some(PhpExtractor::new()?);
        }
        match self.php.as_mut() {
            Some(php) => php.extract_file(path),
            None => Err(IndexError::parse(path, "PHP extractor unavailable")),
        }
    }

    fn accept(&mut self, unit: CompilationUnit) {
        let chunks = unit_to_chunks(&unit);
        debug!("{}: {} chunks", unit.path, chunks.len());
        self.report.units_parsed += 1;
        self.report.chunks.extend(chunks);
        if unit.language == Language::Php {
            self.php_units.push(unit);
        }
    }

    fn explicit_routes(&mut self) -> Result<()> {
        let files = self.config.route_files.clone();
        for path in &files {
            self.check_cancelled()?;
            self.route_file(path);
        }
        Ok(())
    }

    fn route_file(&mut self, path: &Path) {
        let key = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        if !self.route_files.insert(key) {
            return;
        }
        if self.routes.is_none() {
            match RouteParser::new() {
                Ok(parser) => self.routes = Some(parser),
                Err(e) => {
                    warn!("Route parser unavailable: {e}");
                    self.report.units_failed += 1;
                    return;
                }
            }
        }
        let Some(parser) = self.routes.as_mut() else {
            return;
        };
        match parser.parse_file(path) {
            Ok(routes) => {
                debug!("{}: {} routes", path.display(), routes.len());
                self.report.routes += routes.len();
                self.report
                    .chunks
                    .extend(routes.iter().map(|route| route.to_chunk()));
            }
            Err(e) => {
                warn!("Skipping route file {}: {e}", path.display());
                self.report.units_failed += 1;
            }
        }
    }

    /// Merge ORM descriptors into the matching class chunks.
    fn enrich(&mut self) {
        if self.php_units.is_empty() {
            return;
        }
        let models = EloquentEnricher::new(&self.php_units).models();
        if models.is_empty() {
            return;
        }
        let classes: HashMap<(&str, usize, &str), usize> = self
            .report
            .chunks
            .iter()
            .enumerate()
            .filter(|(_, c)| c.kind == ChunkKind::Class)
            .map(|(i, c)| ((c.file_path.as_str(), c.start_line, c.name.as_str()), i))
            .collect();
        let targets: Vec<(usize, usize)> = models
            .iter()
            .enumerate()
            .filter_map(|(m, model)| {
                let idx = *classes.get(&(
                    model.file_path.as_str(),
                    model.start_line,
                    model.short_name(),
                ))?;
                model.matches(&self.report.chunks[idx]).then_some((m, idx))
            })
            .collect();
        for (m, idx) in targets {
            models[m].apply(&mut self.report.chunks[idx]);
        }
        info!("Enriched {} ORM models", models.len());
    }

    fn finish(mut self) -> IndexReport {
        sort_chunks(&mut self.report.chunks);
        info!(
            "Indexed {} chunks from {} units ({} failed, {} routes)",
            self.report.chunks.len(),
            self.report.units_parsed,
            self.report.units_failed,
            self.report.routes
        );
        self.report
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent().unwrap_or(Path::new(".")).to_path_buf()
}

/// Stable sort by file, then first line.
fn sort_chunks(chunks: &mut [Chunk]) {
    chunks.sort_by(|a, b| {
        a.file_path
            .cmp(&b.file_path)
            .then(a.start_line.cmp(&b.start_line))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_index_mixed_tree() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path();
        write(root, "svc/a.go", "package svc\n\nfunc A() {}\n");
        write(root, "svc/b.go", "package svc\n\nfunc B() {}\n");
        write(root, "tool.py", "def run():\n    pass\n");
        write(root, "README.md", "# Readme\n");

        let report = Indexer::new(Config::default()).index(&[root]).unwrap();
        assert_eq!(report.units_parsed, 3);
        assert_eq!(report.units_failed, 0);
        let names: Vec<&str> = report.chunks.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Readme", "A", "B", "run"]);
    }

    #[test]
    fn test_package_visited_once_across_roots() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path();
        write(root, "svc/a.go", "package svc\n\nfunc A() {}\n");

        let svc = root.join("svc");
        let report = Indexer::new(Config::default())
            .index(&[root.to_path_buf(), svc])
            .unwrap();
        assert_eq!(report.units_parsed, 1);
        assert_eq!(report.chunks.len(), 1);
    }

    #[test]
    fn test_only_go_files_group_into_packages() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path();
        write(root, "svc/a.go", "package svc\n\nfunc A() {}\n");
        write(root, "svc/b.go", "package svc\n\nfunc B() {}\n");
        write(root, "svc/x.py", "def x():\n    pass\n");
        write(root, "svc/y.py", "def y():\n    pass\n");
        write(root, "tools/c.go", "package tools\n\nfunc C() {}\n");

        let report = Indexer::new(Config::default()).index(&[root]).unwrap();
        assert_eq!(report.units_parsed, 4);
        let names: Vec<&str> = report.chunks.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "x", "y", "C"]);
    }

    #[test]
    fn test_classes_sharing_a_line_are_enriched_separately() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path();
        write(
            root,
            "app/Shapes.php",
            "<?php\nclass Post extends Model { protected $table = 'posts'; } class Note {}\n",
        );

        let report = Indexer::new(Config::default()).index(&[root]).unwrap();
        let post = report.chunks.iter().find(|c| c.name == "Post").unwrap();
        let note = report.chunks.iter().find(|c| c.name == "Note").unwrap();
        assert_eq!(post.start_line, note.start_line);
        assert_eq!(post.meta("orm").unwrap()["table"], "posts");
        assert!(note.meta("orm").is_none());
    }

    #[test]
    fn test_failed_units_are_counted() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path();
        write(root, "broken.php", "<?php\nclass {\n");
        write(root, "ok.php", "<?php\nfunction ok() {}\n");

        let report = Indexer::new(Config::default()).index(&[root]).unwrap();
        assert_eq!(report.units_parsed, 1);
        assert_eq!(report.units_failed, 1);
        assert_eq!(report.chunks[0].name, "ok");
    }

    #[test]
    fn test_cancelled_before_first_unit() {
        let temp_dir = tempdir().unwrap();
        write(temp_dir.path(), "tool.py", "def run():\n    pass\n");

        let token = CancellationToken::new();
        token.cancel();
        let err = Indexer::new(Config::default())
            .with_cancellation(token)
            .index(&[temp_dir.path()])
            .unwrap_err();
        match err {
            IndexError::Cancelled { partial } => assert!(partial.is_empty()),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_sort_is_stable() {
        let mut chunks = vec![
            Chunk::new(ChunkKind::Class, "B", "php", "b.php", 3, 9),
            Chunk::new(ChunkKind::Class, "A", "php", "a.php", 3, 9),
            Chunk::new(ChunkKind::Method, "m", "php", "a.php", 3, 4),
            Chunk::new(ChunkKind::Const, "C", "php", "a.php", 1, 1),
        ];
        sort_chunks(&mut chunks);
        let names: Vec<&str> = chunks.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["C", "A", "m", "B"]);
    }
}
