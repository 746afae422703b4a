use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Languages the indexer knows how to extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Go,
    Php,
    Python,
    Markdown,
}

/// How many files make up one compilation unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitScope {
    /// Every file is its own unit.
    File,
    /// All files of one directory form a package.
    Directory,
}

pub struct LanguageConfig {
    pub extensions: &'static [&'static str],
    pub unit_scope: UnitScope,
    /// Directory names skipped on top of [`COMMON_SKIP_DIRS`].
    pub skip_dirs: &'static [&'static str],
    pub is_test_file: fn(&str) -> bool,
}

/// Directory names never descended into, whatever the language.
pub const COMMON_SKIP_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    ".bzr",
    "node_modules",
    "vendor",
    "bower_components",
    "build",
    "dist",
    "out",
    "target",
    "bin",
    "obj",
    ".cache",
    "__pycache__",
    "testdata",
    "fixtures",
    "__fixtures__",
    ".idea",
    ".vscode",
];

/// Directory holding route files.
pub const ROUTES_DIR: &str = "routes";

/// File names recognised inside a [`ROUTES_DIR`] directory.
pub const ROUTE_FILE_NAMES: &[&str] = &["web.php", "api.php", "console.php", "channels.php"];

impl Language {
    pub fn all() -> &'static [Language] {
        &[
            Language::Go,
            Language::Php,
            Language::Python,
            Language::Markdown,
        ]
    }

    pub fn config(&self) -> LanguageConfig {
        match self {
            Language::Go => go_config(),
            Language::Php => php_config(),
            Language::Python => python_config(),
            Language::Markdown => markdown_config(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Go => "go",
            Language::Php => "php",
            Language::Python => "python",
            Language::Markdown => "markdown",
        }
    }

    pub fn from_name(name: &str) -> Option<Language> {
        match name.to_ascii_lowercase().as_str() {
            "go" | "golang" => Some(Language::Go),
            "php" => Some(Language::Php),
            "python" | "py" => Some(Language::Python),
            "markdown" | "md" => Some(Language::Markdown),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Language> {
        let ext = path.extension().and_then(|e| e.to_str())?;
        Self::all()
            .iter()
            .copied()
            .find(|lang| lang.config().extensions.contains(&ext))
    }

    /// Grammar handle for the tree-sitter based extractors.
    pub fn grammar(&self) -> Option<tree_sitter::Language> {
        match self {
            Language::Go => Some(tree_sitter_go::LANGUAGE.into()),
            Language::Php => Some(tree_sitter_php::LANGUAGE_PHP.into()),
            Language::Python | Language::Markdown => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl LanguageConfig {
    /// Whether `name` is on this language's skip list. Entries starting with
    /// `*` match by suffix (`*.egg-info`).
    pub fn skips_dir(&self, name: &str) -> bool {
        COMMON_SKIP_DIRS.contains(&name)
            || self.skip_dirs.iter().any(|skip| match skip.strip_prefix('*') {
                Some(suffix) => name.ends_with(suffix),
                None => *skip == name,
            })
    }
}

/// Whether `path` is a route file: `routes/<web|api|console|channels>.php`.
pub fn is_route_file(path: &Path) -> bool {
    let in_routes_dir = path
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .is_some_and(|n| n == ROUTES_DIR);
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    in_routes_dir && ROUTE_FILE_NAMES.contains(&file_name)
}

fn go_config() -> LanguageConfig {
    LanguageConfig {
        extensions: &["go"],
        unit_scope: UnitScope::Directory,
        skip_dirs: &[],
        is_test_file: |name| name.ends_with("_test.go"),
    }
}

fn php_config() -> LanguageConfig {
    LanguageConfig {
        extensions: &["php"],
        unit_scope: UnitScope::File,
        skip_dirs: &["storage", "bootstrap"],
        is_test_file: |name| name.ends_with("Test.php"),
    }
}

fn python_config() -> LanguageConfig {
    LanguageConfig {
        extensions: &["py"],
        unit_scope: UnitScope::File,
        skip_dirs: &[
            "venv",
            ".venv",
            "env",
            "site-packages",
            ".tox",
            ".mypy_cache",
            ".pytest_cache",
            "*.egg-info",
        ],
        is_test_file: |name| {
            name == "conftest.py"
                || (name.starts_with("test_") && name.ends_with(".py"))
                || name.ends_with("_test.py")
        },
    }
}

fn markdown_config() -> LanguageConfig {
    LanguageConfig {
        extensions: &["md", "markdown"],
        unit_scope: UnitScope::File,
        skip_dirs: &[],
        is_test_file: |_| false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_path() {
        assert_eq!(Language::from_path(Path::new("a/b.go")), Some(Language::Go));
        assert_eq!(Language::from_path(Path::new("User.php")), Some(Language::Php));
        assert_eq!(Language::from_path(Path::new("x.py")), Some(Language::Python));
        assert_eq!(Language::from_path(Path::new("README.md")), Some(Language::Markdown));
        assert_eq!(Language::from_path(Path::new("lib.rs")), None);
    }

    #[test]
    fn test_test_file_conventions() {
        assert!((Language::Go.config().is_test_file)("server_test.go"));
        assert!(!(Language::Go.config().is_test_file)("server.go"));
        assert!((Language::Php.config().is_test_file)("UserTest.php"));
        assert!((Language::Python.config().is_test_file)("test_models.py"));
        assert!((Language::Python.config().is_test_file)("models_test.py"));
        assert!(!(Language::Python.config().is_test_file)("latest.py"));
    }

    #[test]
    fn test_only_go_groups_by_directory() {
        assert_eq!(Language::Go.config().unit_scope, UnitScope::Directory);
        for lang in [Language::Php, Language::Python, Language::Markdown] {
            assert_eq!(lang.config().unit_scope, UnitScope::File);
        }
    }

    #[test]
    fn test_skip_dirs() {
        let py = Language::Python.config();
        assert!(py.skips_dir(".git"));
        assert!(py.skips_dir("venv"));
        assert!(py.skips_dir("mypkg.egg-info"));
        assert!(!py.skips_dir("src"));
        assert!(!Language::Go.config().skips_dir("venv"));
    }

    #[test]
    fn test_route_file_rule() {
        assert!(is_route_file(Path::new("app/routes/web.php")));
        assert!(is_route_file(Path::new("routes/api.php")));
        assert!(!is_route_file(Path::new("app/route/web.php")));
        assert!(!is_route_file(Path::new("routes/admin.php")));
    }
}
