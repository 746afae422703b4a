use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use symdex::config::{Config, DEFAULT_CONFIG_FILE};
use symdex::indexer::Indexer;
use symdex::indexer::languages::Language;

/// Turn Go, PHP, Python and Markdown trees into symbol chunks (JSON lines).
#[derive(Parser, Debug)]
#[command(name = "symdex", version, about)]
struct Cli {
    /// Files or directories to index, in order.
    #[arg(required_unless_present = "init_config")]
    roots: Vec<PathBuf>,

    /// JSON config file (defaults to ./symdex.json when present).
    #[arg(short, long)]
    config: Option<String>,

    /// Index test files too.
    #[arg(long)]
    include_tests: bool,

    /// Restrict to a language; repeatable (go, php, python, markdown).
    #[arg(short, long = "language", value_parser = parse_language)]
    languages: Vec<Language>,

    /// Route file to parse; repeatable. Disables route discovery.
    #[arg(long = "routes")]
    routes: Vec<PathBuf>,

    /// Pretty-print each chunk.
    #[arg(long)]
    pretty: bool,

    /// Write the default configuration to ./symdex.json and exit.
    #[arg(long)]
    init_config: bool,
}

fn parse_language(name: &str) -> std::result::Result<Language, String> {
    Language::from_name(name).ok_or_else(|| format!("unknown language: {name}"))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    if cli.init_config {
        Config::default().save(DEFAULT_CONFIG_FILE)?;
        info!("Wrote {DEFAULT_CONFIG_FILE}");
        return Ok(());
    }

    let mut config = Config::load(cli.config.as_deref().unwrap_or(""))?;
    if cli.include_tests {
        config.include_tests = true;
    }
    if !cli.languages.is_empty() {
        config.languages = cli.languages.clone();
    }
    config.route_files.extend(cli.routes.iter().cloned());
    config.validate().context("invalid configuration")?;

    let report = Indexer::new(config)
        .index(&cli.roots)
        .context("indexing failed")?;

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for chunk in &report.chunks {
        if cli.pretty {
            serde_json::to_writer_pretty(&mut out, chunk)?;
        } else {
            serde_json::to_writer(&mut out, chunk)?;
        }
        out.write_all(b"\n")?;
    }
    out.flush()?;

    info!(
        "{} chunks, {} units parsed, {} failed, {} routes",
        report.chunks.len(),
        report.units_parsed,
        report.units_failed,
        report.routes
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_repeated_flags() {
        let cli = Cli::try_parse_from([
            "symdex",
            "--language",
            "go",
            "-l",
            "py",
            "--routes",
            "routes/web.php",
            "--pretty",
            "src",
            "app",
        ])
        .unwrap();
        assert_eq!(cli.languages, vec![Language::Go, Language::Python]);
        assert_eq!(cli.routes, vec![PathBuf::from("routes/web.php")]);
        assert_eq!(cli.roots, vec![PathBuf::from("src"), PathBuf::from("app")]);
        assert!(cli.pretty);
    }

    #[test]
    fn test_cli_rejects_unknown_language() {
        assert!(Cli::try_parse_from(["symdex", "-l", "cobol", "src"]).is_err());
    }

    #[test]
    fn test_cli_requires_roots() {
        assert!(Cli::try_parse_from(["symdex"]).is_err());
        assert!(Cli::try_parse_from(["symdex", "--init-config"]).is_ok());
    }
}
