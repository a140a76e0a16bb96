//! semindex CLI: serve the tool protocol, manage projects, run scans, and
//! query from the terminal.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use semindex::constants::{self, SHUTDOWN_REQUESTED};
use semindex::embed::default_factory;
use semindex::service::{CreateProjectRequest, ProjectService};

#[derive(Parser)]
#[command(name = "semindex", version, about = "Local-first semantic code indexing and retrieval engine")]
struct Cli {
    /// Override the application data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the tool server (and indexers for continuous projects)
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1:7600")]
        addr: SocketAddr,
    },
    /// Manage projects
    Project {
        #[command(subcommand)]
        action: ProjectAction,
    },
    /// Run one indexing pass for a project
    Index {
        project_id: String,
        /// Wipe derived data and rebuild from scratch
        #[arg(long)]
        reindex: bool,
    },
    /// Search a project from the terminal
    Search {
        project_id: String,
        query: String,
        #[arg(short, default_value_t = 10)]
        k: i64,
    },
    /// Show catalog and per-project statistics
    Status {
        project_id: Option<String>,
    },
}

#[derive(Subcommand)]
enum ProjectAction {
    /// Register a project rooted at the given directory
    Add {
        root: PathBuf,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Keep a watcher running and re-index on change
        #[arg(long)]
        continuous: bool,
    },
    /// List registered projects
    List,
    /// Delete a project and its database
    Remove { project_id: String },
}

fn init_tracing(data_dir: &std::path::Path) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_dir = data_dir.join(constants::LOG_DIR_NAME);
    std::fs::create_dir_all(&log_dir).context("create log directory")?;
    let file_appender =
        tracing_appender::rolling::daily(&log_dir, constants::LOG_FILE_NAME);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_env("SEMINDEX_LOG")
        .unwrap_or_else(|_| EnvFilter::new("semindex=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false),
        )
        .init();
    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let data_dir = match &cli.data_dir {
        Some(dir) => dir.clone(),
        None => constants::data_dir()?,
    };
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("create data directory {}", data_dir.display()))?;
    let _log_guard = init_tracing(&data_dir)?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || {
            SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
            cancel.cancel();
        })
        .context("install CTRL-C handler")?;
    }

    let models_dir = constants::models_dir(&data_dir)?;
    let service = Arc::new(ProjectService::new(&data_dir, default_factory(&models_dir))?);

    match cli.command {
        Command::Serve { addr } => {
            // Continuous projects resume watching on startup
            for project in service.list_projects()? {
                if project.is_indexing && project.config.continuous_indexing {
                    if let Err(e) = service.start_indexing(&project.id).await {
                        tracing::warn!(project = %project.id, "could not resume indexing: {e}");
                    }
                }
            }
            semindex::server::serve(service.clone(), addr, cancel).await?;
            service.shutdown().await;
        }
        Command::Project { action } => match action {
            ProjectAction::Add {
                root,
                name,
                description,
                continuous,
            } => {
                let name = name.unwrap_or_else(|| {
                    root.file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| "project".to_string())
                });
                let project = service.create_project(CreateProjectRequest {
                    name,
                    description: description.unwrap_or_default(),
                    root_path: root,
                    slug: None,
                    embedding_model_id: None,
                    continuous_indexing: continuous,
                })?;
                println!("created project '{}' ({})", project.name, project.id);
            }
            ProjectAction::List => {
                let projects = service.list_projects()?;
                if projects.is_empty() {
                    println!("no projects registered");
                }
                for project in projects {
                    println!(
                        "{:<24} {:<32} {}",
                        project.id,
                        project.name,
                        project.config.root_path.display()
                    );
                }
            }
            ProjectAction::Remove { project_id } => {
                service.delete_project(&project_id).await?;
                println!("deleted project '{project_id}'");
            }
        },
        Command::Index {
            project_id,
            reindex,
        } => {
            if reindex {
                service.reindex_project(&project_id).await?;
            } else {
                service.start_indexing(&project_id).await?;
            }
            // Wait for the scan to reach a terminal state
            loop {
                tokio::time::sleep(std::time::Duration::from_millis(200)).await;
                if cancel.is_cancelled() {
                    service.stop_indexing(&project_id).await?;
                    break;
                }
                match service.get_progress(&project_id) {
                    Some(progress) => {
                        use semindex::indexer::IndexStatus;
                        match progress.status {
                            IndexStatus::Completed | IndexStatus::Idle => {
                                println!(
                                    "indexed {}/{} files ({} updated)",
                                    progress.processed_files,
                                    progress.total_files,
                                    progress.updated_files
                                );
                                break;
                            }
                            IndexStatus::Error => {
                                anyhow::bail!(
                                    "indexing failed: {}",
                                    progress.message.unwrap_or_default()
                                );
                            }
                            IndexStatus::Indexing => {}
                        }
                    }
                    None => break,
                }
            }
            service.shutdown().await;
        }
        Command::Search {
            project_id,
            query,
            k,
        } => {
            let response = service.search(&project_id, &query, k)?;
            for result in &response.results {
                println!(
                    "{:.3}  {}:{}-{}  {}",
                    result.similarity,
                    result.chunk.file_path,
                    result.chunk.line_start,
                    result.chunk.line_end,
                    result.chunk.symbol_name.as_deref().unwrap_or("-"),
                );
            }
            println!(
                "{} results in {} ms",
                response.total_results, response.query_time_ms
            );
        }
        Command::Status { project_id } => {
            match project_id {
                Some(id) => {
                    let stats = service.store_for(&id)?.get_stats()?;
                    println!("{}", serde_json::to_string_pretty(&stats)?);
                }
                None => {
                    println!("data dir: {}", data_dir.display());
                    if let Some(selected) = service.catalog().selected_project()? {
                        println!("selected project: {selected}");
                    }
                    for project in service.list_projects()? {
                        let stats = service.store_for(&project.id)?.get_stats()?;
                        println!(
                            "{:<24} files={} chunks={} symbols={}",
                            project.id,
                            stats.total_files,
                            stats.total_chunks,
                            stats.total_symbols
                        );
                    }
                    println!("models:");
                    for model in service.catalog().list_embedding_models()? {
                        println!(
                            "  {:<20} {:<24} dim={} backend={}",
                            model.id,
                            model.display_name,
                            model.dimension,
                            model.backend.as_str()
                        );
                    }
                }
            }
        }
    }

    Ok(())
}
