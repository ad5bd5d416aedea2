use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use doctree::cancel::CancelToken;
use doctree::extract::Registry;
use doctree::{pipeline, search, server, store};
use std::path::{Path, PathBuf};
use std::process::Command as ProcessCommand;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "doctree")]
#[command(about = "Library documentation indexer and search service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a directory
    Index {
        /// Directory to index
        dir: PathBuf,

        /// Where doctree stores its data
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Name of the project (defaults to the git remote, then the
        /// absolute path)
        #[arg(long)]
        project: Option<String>,
    },
    /// Search indexed projects
    Search {
        /// The search query
        query: String,

        /// Where doctree stores its data
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Restrict results to one project
        #[arg(long)]
        project: Option<String>,
    },
    /// Run the doctree server
    Serve {
        /// Address to bind for the HTTP server
        #[arg(long, default_value = ":3333")]
        http: String,

        /// Where doctree stores its data
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Register a directory for auto-indexing and index it once
    Add {
        /// Directory to register
        dir: PathBuf,

        /// Where doctree stores its data
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Name of the project
        #[arg(long)]
        project: Option<String>,
    },
    /// List indexed projects
    List {
        /// Where doctree stores its data
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // Usage problems exit 1; --help and --version are not errors.
            let code = if err.use_stderr() { 1 } else { 0 };
            let _ = err.print();
            std::process::exit(code);
        }
    };

    if let Err(err) = run(cli) {
        eprintln!("doctree: {err:#}");
        std::process::exit(2);
    }
}

fn run(cli: Cli) -> Result<()> {
    let registry = Registry::with_defaults();

    match cli.command {
        Commands::Index {
            dir,
            data_dir,
            project,
        } => {
            let data_dir = data_dir.unwrap_or_else(store::default_data_dir);
            let project = match project {
                Some(project) => project,
                None => default_project_name(&dir)?,
            };
            pipeline::run(&CancelToken::new(), &registry, &dir, &data_dir, &project)?;
            println!("indexed {project}");
            Ok(())
        }

        Commands::Search {
            query,
            data_dir,
            project,
        } => {
            let data_dir = data_dir.unwrap_or_else(store::default_data_dir);
            let results = search::search(
                &store::index_data_dir(&data_dir),
                &query,
                project.as_deref(),
                &CancelToken::new(),
            )?;
            if results.is_empty() {
                println!("no results");
                return Ok(());
            }
            for result in results {
                println!(
                    "{:>8.2}  {}  {}  {}#{}",
                    result.score, result.project_name, result.search_key, result.path, result.id
                );
            }
            Ok(())
        }

        Commands::Serve { http, data_dir } => {
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| "info".into()),
                )
                .init();

            let data_dir = data_dir.unwrap_or_else(store::default_data_dir);
            let addr = normalize_addr(&http);
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(server::serve(&addr, data_dir, Arc::new(registry)))
        }

        Commands::Add {
            dir,
            data_dir,
            project,
        } => {
            let data_dir = data_dir.unwrap_or_else(store::default_data_dir);
            let project = match project {
                Some(project) => project,
                None => default_project_name(&dir)?,
            };
            let abs_dir = dir
                .canonicalize()
                .with_context(|| format!("invalid directory {}", dir.display()))?;

            store::ensure_data_dir(&data_dir)?;
            store::register_auto_index(&data_dir, &abs_dir.to_string_lossy(), &project)?;
            pipeline::run(&CancelToken::new(), &registry, &abs_dir, &data_dir, &project)?;
            println!("registered {project} ({})", abs_dir.display());
            Ok(())
        }

        Commands::List { data_dir } => {
            let data_dir = data_dir.unwrap_or_else(store::default_data_dir);
            for project in store::list_projects(&store::index_data_dir(&data_dir))? {
                println!("{project}");
            }
            Ok(())
        }
    }
}

/// `":3333"` means "any interface, port 3333".
fn normalize_addr(addr: &str) -> String {
    if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    }
}

/// Default project name: the normalized git remote of the directory, falling
/// back to its absolute path.
fn default_project_name(dir: &Path) -> Result<String> {
    if let Some(remote) = git_remote_url(dir) {
        if let Some(name) = normalize_git_url(&remote) {
            return Ok(name);
        }
    }
    let abs = dir
        .canonicalize()
        .with_context(|| format!("invalid directory {}", dir.display()))?;
    Ok(abs.to_string_lossy().into_owned())
}

fn git_remote_url(dir: &Path) -> Option<String> {
    let output = ProcessCommand::new("git")
        .args(["config", "--get", "remote.origin.url"])
        .current_dir(dir)
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let url = String::from_utf8(output.stdout).ok()?;
    let url = url.trim();
    if url.is_empty() {
        None
    } else {
        Some(url.to_string())
    }
}

/// Reduce a git remote URL to `host/path` form:
/// `git@github.com:a/b.git` and `https://github.com/a/b.git` both become
/// `github.com/a/b`.
fn normalize_git_url(url: &str) -> Option<String> {
    let url = url.strip_suffix(".git").unwrap_or(url);

    // scp-like syntax: git@host:path
    if let Some(rest) = url.strip_prefix("git@") {
        let (host, path) = rest.split_once(':')?;
        return Some(format!("{}/{}", host, path.trim_start_matches('/')));
    }

    // scheme://[user@]host/path
    if let Some((_, rest)) = url.split_once("://") {
        let rest = rest.rsplit_once('@').map_or(rest, |(_, r)| r);
        let (host, path) = rest.split_once('/')?;
        return Some(format!("{}/{}", host, path.trim_start_matches('/')));
    }

    None
}
