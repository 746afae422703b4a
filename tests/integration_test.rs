/// End-to-end tests for the indexing pipeline.
///
/// Each test lays out a small project in a temp dir and runs
///   Config → Walker → Extractors → Convert → Eloquent/Routes → sorted chunks
use std::fs;
use std::path::Path;

use serde_json::json;
use symdex::chunk::{Chunk, ChunkKind};
use symdex::config::Config;
use symdex::error::IndexError;
use symdex::indexer::Indexer;
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Registry;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn index(root: &Path) -> Vec<Chunk> {
    Indexer::new(Config::default()).index(&[root]).unwrap().chunks
}

fn find<'a>(chunks: &'a [Chunk], kind: ChunkKind, name: &str) -> &'a Chunk {
    chunks
        .iter()
        .find(|c| c.kind == kind && c.name == name)
        .unwrap_or_else(|| panic!("no {kind} chunk named {name}"))
}

const POST_MODEL: &str = r#"<?php

namespace App\Models;

use Illuminate\Database\Eloquent\Model;
use Acme\Billing\Invoice;

class Post extends Model
{
    protected $table = 'posts';
    protected $fillable = ['title', 'body'];
    protected $casts = ['published' => 'boolean'];

    public function invoices()
    {
        return $this->hasMany(Invoice::class, 'post_ref');
    }

    public function comments()
    {
        return $this->hasMany(Comment::class, 'post_id');
    }

    public function scopePublished($query)
    {
        return $query->where('published', true);
    }

    public function getTitleCaseAttribute()
    {
        return ucwords($this->title);
    }
}
"#;

const ROUTES: &str = r#"<?php

use Illuminate\Support\Facades\Route;

Route::resource('photos', PhotoController::class);
Route::match(['get', 'post'], '/x', 'Target@action');
Route::get('/health', fn () => 'ok')->name('health');
"#;

#[test]
fn test_type_and_methods_become_chunks() {
    let temp_dir = tempdir().unwrap();
    let root = temp_dir.path();
    write(
        root,
        "store/store.go",
        "package store\n\ntype Store struct {\n\tdb int\n}\n\nfunc (s *Store) Get() int { return s.db }\n\nfunc (s *Store) Put(v int) { s.db = v }\n\nfunc (s *Store) Len() int { return 1 }\n",
    );

    let chunks = index(root);
    let types = chunks.iter().filter(|c| c.kind == ChunkKind::Type).count();
    let methods: Vec<&Chunk> = chunks
        .iter()
        .filter(|c| c.kind == ChunkKind::Method)
        .collect();
    assert_eq!(types, 1);
    assert_eq!(methods.len(), 3);
    assert!(chunks.len() >= 1 + methods.len());
    assert!(methods.iter().all(|m| m.parent.as_deref() == Some("Store")));
}

#[test]
fn test_resource_and_match_routes() {
    let temp_dir = tempdir().unwrap();
    let root = temp_dir.path();
    write(root, "routes/web.php", ROUTES);

    let report = Indexer::new(Config::default()).index(&[root]).unwrap();
    let routes: Vec<&Chunk> = report
        .chunks
        .iter()
        .filter(|c| c.kind == ChunkKind::Route)
        .collect();
    assert_eq!(report.routes, routes.len());

    let photos: Vec<&Chunk> = routes
        .iter()
        .copied()
        .filter(|c| c.meta("controller") == Some(&json!("PhotoController")))
        .collect();
    assert_eq!(photos.len(), 7);
    let verbs: Vec<&str> = photos
        .iter()
        .map(|c| c.meta("method").and_then(|v| v.as_str()).unwrap())
        .collect();
    assert_eq!(verbs, vec!["GET", "GET", "POST", "GET", "GET", "PUT/PATCH", "DELETE"]);
    let uris: Vec<&str> = photos
        .iter()
        .map(|c| c.meta("uri").and_then(|v| v.as_str()).unwrap())
        .collect();
    assert_eq!(
        uris,
        vec![
            "photos",
            "photos/create",
            "photos",
            "photos/{id}",
            "photos/{id}/edit",
            "photos/{id}",
            "photos/{id}"
        ]
    );

    let matched: Vec<&Chunk> = routes
        .iter()
        .copied()
        .filter(|c| c.meta("uri") == Some(&json!("/x")))
        .collect();
    assert_eq!(matched.len(), 2);
    assert_eq!(matched[0].meta("method"), Some(&json!("GET")));
    assert_eq!(matched[1].meta("method"), Some(&json!("POST")));
    assert!(
        matched
            .iter()
            .all(|c| c.meta("action") == Some(&json!("action")))
    );

    let health = find(&report.chunks, ChunkKind::Route, "GET /health");
    assert_eq!(health.meta("route_name"), Some(&json!("health")));
    assert_eq!(health.meta("controller"), Some(&json!("Closure")));
}

#[test]
fn test_explicit_route_files_replace_discovery() {
    let temp_dir = tempdir().unwrap();
    let root = temp_dir.path();
    write(root, "routes/web.php", ROUTES);
    write(root, "custom/admin.php", "<?php\nRoute::get('/admin', 'AdminController@index');\n");

    let config = Config {
        route_files: vec![root.join("custom/admin.php")],
        ..Config::default()
    };
    let report = Indexer::new(config).index(&[root]).unwrap();
    assert_eq!(report.routes, 1);
    find(&report.chunks, ChunkKind::Route, "GET /admin");
}

#[test]
fn test_eloquent_model_metadata() {
    let temp_dir = tempdir().unwrap();
    let root = temp_dir.path();
    write(root, "app/Models/Post.php", POST_MODEL);

    let chunks = index(root);
    let post = find(&chunks, ChunkKind::Class, "Post");

    let orm = post.meta("orm").unwrap();
    assert_eq!(orm["framework"], json!("eloquent"));
    assert_eq!(orm["table"], json!("posts"));
    assert_eq!(orm["fillable"], json!(["title", "body"]));
    assert_eq!(orm["casts"], json!({"published": "boolean"}));
    assert_eq!(orm["scopes"], json!(["published"]));
    assert_eq!(orm["accessors"], json!(["title_case"]));

    let relations = post.meta("relations").unwrap().as_array().unwrap();
    assert_eq!(relations.len(), 2);
    // Imported target resolves through the `use` table.
    assert_eq!(relations[0]["related_type"], json!("Acme\\Billing\\Invoice"));
    assert_eq!(relations[0]["foreign_key"], json!("post_ref"));
    // No import: qualified with the current namespace.
    assert_eq!(relations[1]["related_type"], json!("App\\Models\\Comment"));
    assert_eq!(relations[1]["relation_kind"], json!("hasMany"));
}

#[test]
fn test_plain_class_is_not_enriched() {
    let temp_dir = tempdir().unwrap();
    let root = temp_dir.path();
    write(
        root,
        "app/Services/Mailer.php",
        "<?php\nnamespace App\\Services;\n\nclass Mailer\n{\n    protected $table = 'mails';\n}\n",
    );

    let chunks = index(root);
    let mailer = find(&chunks, ChunkKind::Class, "Mailer");
    assert!(mailer.meta("orm").is_none());
}

#[test]
fn test_malformed_file_is_skipped() {
    let temp_dir = tempdir().unwrap();
    let root = temp_dir.path();
    write(root, "app/Broken.php", "<?php\nclass Broken {\n    public function (\n");
    write(root, "app/Fine.php", "<?php\nclass Fine\n{\n}\n");

    let report = Indexer::new(Config::default()).index(&[root]).unwrap();
    assert_eq!(report.units_failed, 1);
    assert!(
        report
            .chunks
            .iter()
            .all(|c| c.file_path.ends_with("app/Fine.php"))
    );
    find(&report.chunks, ChunkKind::Class, "Fine");
}

#[test]
fn test_line_invariants_and_order() {
    let temp_dir = tempdir().unwrap();
    let root = temp_dir.path();
    write(root, "app/Models/Post.php", POST_MODEL);
    write(root, "routes/api.php", ROUTES);
    write(
        root,
        "lib/models.py",
        "\"\"\"Models.\"\"\"\n\nclass User:\n    def name(self):\n        return 'x'\n",
    );
    write(root, "docs/guide.md", "# Guide\n\n## Install\n\nRun it.\n");
    write(root, "pkg/pkg.go", "// Package pkg does things.\npackage pkg\n\nconst Max = 3\n");

    let chunks = index(root);
    assert!(!chunks.is_empty());
    for chunk in &chunks {
        assert!(chunk.start_line <= chunk.end_line, "{chunk:?}");
        assert!(!chunk.file_path.is_empty(), "{chunk:?}");
    }
    for pair in chunks.windows(2) {
        let a = (&pair[0].file_path, pair[0].start_line);
        let b = (&pair[1].file_path, pair[1].start_line);
        assert!(a <= b);
    }
    let file = find(&chunks, ChunkKind::File, "pkg");
    assert_eq!(file.docstring, "Package pkg does things.");
}

#[test]
fn test_rerun_is_idempotent() {
    let temp_dir = tempdir().unwrap();
    let root = temp_dir.path();
    write(root, "app/Models/Post.php", POST_MODEL);
    write(root, "routes/web.php", ROUTES);
    write(root, "lib/models.py", "class User:\n    pass\n");

    let first = index(root);
    let second = index(root);
    assert_eq!(first, second);
}

#[test]
fn test_missing_root_is_fatal() {
    let temp_dir = tempdir().unwrap();
    let missing = temp_dir.path().join("nope");
    let err = Indexer::new(Config::default())
        .index(&[temp_dir.path().to_path_buf(), missing])
        .unwrap_err();
    assert!(matches!(err, IndexError::RootNotFound(_)));
}

#[test]
fn test_empty_root_is_not_an_error() {
    let temp_dir = tempdir().unwrap();
    let report = Indexer::new(Config::default())
        .index(&[temp_dir.path()])
        .unwrap();
    assert!(report.chunks.is_empty());
    assert_eq!(report.units_parsed, 0);
}

#[test]
fn test_cancel_before_start() {
    let temp_dir = tempdir().unwrap();
    let root = temp_dir.path();
    write(root, "a.py", "def a():\n    pass\n");

    let token = CancellationToken::new();
    token.cancel();
    let err = Indexer::new(Config::default())
        .with_cancellation(token)
        .index(&[root])
        .unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err, IndexError::Cancelled { .. }));
}

/// Cancels the token on the first per-unit debug event of the engine, which
/// fires once that unit's chunks have been collected.
struct CancelAfterFirstUnit(CancellationToken);

impl<S: Subscriber> Layer<S> for CancelAfterFirstUnit {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if *meta.level() == Level::DEBUG && meta.target() == "symdex::indexer::core" {
            self.0.cancel();
        }
    }
}

#[test]
fn test_cancel_between_units_keeps_finished_units() {
    let temp_dir = tempdir().unwrap();
    let root = temp_dir.path();
    write(root, "a.py", "class A:\n    def run(self):\n        pass\n\nLIMIT = 3\n");
    write(root, "b.py", "def b():\n    pass\n");

    let complete: Vec<Chunk> = index(root)
        .into_iter()
        .filter(|c| c.file_path.ends_with("a.py"))
        .collect();
    assert_eq!(complete.len(), 3);

    let token = CancellationToken::new();
    let subscriber = Registry::default().with(CancelAfterFirstUnit(token.clone()));
    let result = tracing::subscriber::with_default(subscriber, || {
        Indexer::new(Config::default())
            .with_cancellation(token.clone())
            .index(&[root])
    });

    assert!(token.is_cancelled());
    match result {
        Err(IndexError::Cancelled { partial }) => assert_eq!(partial, complete),
        other => panic!("expected cancellation, got {other:?}"),
    }
}
