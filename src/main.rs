use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use codecritic::cache::ReviewCache;
use codecritic::client::{Analyzer, BackendClient};
use codecritic::config::Config;
use codecritic::pipeline::{review_file, FileReview, ReviewContext};
use codecritic::report::{batch_report, file_report};
use codecritic::sinks::{
    ConsoleOutput, DiagnosticCollection, MemoryReviewStore, OutputSink, ScoreBadges, Sinks,
};
use codecritic::util::display_path;
use codecritic::workspace::{review_workspace, CancelFlag};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "codecritic",
    about = "AI code review for single files and whole workspaces",
    version
)]
struct Args {
    /// Review backend base URL (overrides config and CODECRITIC_BACKEND_URL)
    #[arg(long, global = true)]
    backend: Option<String>,

    /// Per-request timeout in milliseconds
    #[arg(long, global = true, value_parser = parse_timeout_ms)]
    timeout_ms: Option<u64>,

    /// Print results as JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Review a single file
    File { path: PathBuf },

    /// Review every eligible file under the given roots (Ctrl-C cancels)
    Workspace {
        /// Folders to scan (defaults to current directory)
        roots: Vec<PathBuf>,

        /// Files reviewed at once
        #[arg(short, long)]
        concurrency: Option<usize>,
    },

    /// Check that the review backend is reachable
    Health,

    /// Show or change saved settings
    Config {
        #[arg(long)]
        set_backend: Option<String>,

        #[arg(long)]
        set_timeout_ms: Option<u64>,

        #[arg(long)]
        set_concurrency: Option<usize>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(args).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("codecritic=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("codecritic=warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(args: Args) -> Result<ExitCode> {
    let mut config = Config::load();
    if let Some(backend) = &args.backend {
        config.backend_url = backend.clone();
    }
    if let Some(ms) = args.timeout_ms {
        config.request_timeout_ms = ms;
    }

    let output = ConsoleOutput;
    let store = MemoryReviewStore::new();
    let badges = ScoreBadges::new(&store);
    let diagnostics = DiagnosticCollection::new();
    let cache = ReviewCache::new();
    let sinks = Sinks {
        diagnostics: &diagnostics,
        store: &store,
        decorations: &badges,
        output: &output,
    };

    match args.command {
        Command::Config {
            set_backend,
            set_timeout_ms,
            set_concurrency,
        } => edit_config(set_backend.as_deref(), set_timeout_ms, set_concurrency),

        Command::Health => {
            let client = connect(&config)?;
            match client.health_check().await {
                Ok(()) => {
                    output.line(&format!("Backend at {} is healthy", client.base_url()));
                    Ok(ExitCode::SUCCESS)
                }
                Err(err) => {
                    tracing::debug!("health check failed: {}", err);
                    output.line(&err.status_message());
                    Ok(ExitCode::FAILURE)
                }
            }
        }

        Command::File { path } => {
            let cwd = std::env::current_dir().context("Failed to read current directory")?;
            let path = if path.is_absolute() { path } else { cwd.join(path) };
            let root = review_root(&path, &cwd);

            let client = connect(&config)?;
            let ctx = ReviewContext::new(&client, &cache, sinks);
            let ctx = match root {
                Some(root) => ctx.with_root(root),
                None => ctx,
            };

            if let Err(err) = client.health_check().await {
                tracing::debug!("health check failed: {}", err);
                output.line(&err.status_message());
                return Ok(ExitCode::FAILURE);
            }

            let shown = display_path(&path, root);
            match review_file(ctx, &path).await {
                Ok(outcome) => {
                    if args.json {
                        println!("{}", serde_json::to_string_pretty(&outcome)?);
                        return Ok(ExitCode::SUCCESS);
                    }
                    match &outcome {
                        FileReview::Reviewed { review, cached } => {
                            print!("{}", file_report(shown, review, *cached));
                            for line in diagnostics.render() {
                                println!("{}", line);
                            }
                            if let Some(badge) = badges.badge(shown) {
                                output.line(&format!("{} {}", shown.display(), badge));
                            }
                        }
                        FileReview::Skipped { reason } => {
                            output.line(&format!("Skipped {}: {}", shown.display(), reason));
                        }
                    }
                    Ok(ExitCode::SUCCESS)
                }
                Err(err) => {
                    tracing::error!("{}", err);
                    output.line(&err.status_message());
                    Ok(ExitCode::FAILURE)
                }
            }
        }

        Command::Workspace { roots, concurrency } => {
            let roots = if roots.is_empty() {
                vec![std::env::current_dir().context("Failed to read current directory")?]
            } else {
                roots
            };
            for root in &roots {
                if !root.is_dir() {
                    bail!("Not a directory: {}", root.display());
                }
            }
            let concurrency = concurrency.unwrap_or(config.concurrency).max(1);
            let client = connect(&config)?;
            let ctx = ReviewContext::new(&client, &cache, sinks);

            let cancel = CancelFlag::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if watch_interrupts(&on_interrupt, tokio::signal::ctrl_c).await {
                    std::process::exit(130);
                }
            });

            let result = review_workspace(ctx, &roots, concurrency, &cancel, |p| {
                output.line(&format!(
                    "[{}/{}] {} of {} file(s) done",
                    p.batch, p.batches, p.completed, p.total
                ));
            })
            .await;

            let summary = match result {
                Ok(summary) => summary,
                Err(err) => {
                    tracing::debug!("workspace review aborted: {}", err);
                    output.line(&err.status_message());
                    return Ok(ExitCode::FAILURE);
                }
            };

            if args.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print!("{}", batch_report(&summary));
            }

            Ok(if summary.failed > 0 {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }
    }
}

/// First interrupt cancels between batches; returns true on a second one,
/// meaning the caller should quit without waiting for in-flight requests.
async fn watch_interrupts<S, F>(cancel: &CancelFlag, mut next_signal: S) -> bool
where
    S: FnMut() -> F,
    F: Future<Output = std::io::Result<()>>,
{
    if next_signal().await.is_err() {
        return false;
    }
    eprintln!("\nCancelling after the current batch... (Ctrl-C again to quit)");
    cancel.cancel();
    next_signal().await.is_ok()
}

fn parse_timeout_ms(value: &str) -> Result<u64, String> {
    let ms = value
        .parse::<u64>()
        .map_err(|e| format!("invalid milliseconds {:?}: {}", value, e))?;
    Config::validate_timeout_ms(ms)
}

fn connect(config: &Config) -> Result<BackendClient> {
    let client = BackendClient::from_config(config).map_err(anyhow::Error::msg)?;
    tracing::debug!("using backend {}", client.base_url());
    Ok(client)
}

/// Root used for eligibility and display of a single file: the current
/// directory when the file is under it, otherwise the file's own folder.
fn review_root<'a>(path: &'a Path, cwd: &'a Path) -> Option<&'a Path> {
    if path.starts_with(cwd) {
        Some(cwd)
    } else {
        path.parent()
    }
}

fn edit_config(
    backend: Option<&str>,
    timeout_ms: Option<u64>,
    concurrency: Option<usize>,
) -> Result<ExitCode> {
    let mut config = Config::load_saved();
    let changed = backend.is_some() || timeout_ms.is_some() || concurrency.is_some();

    if let Some(url) = backend {
        Config::validate_backend_url(url).map_err(anyhow::Error::msg)?;
        config.backend_url = url.trim().to_string();
    }
    if let Some(ms) = timeout_ms {
        config.request_timeout_ms = Config::validate_timeout_ms(ms).map_err(anyhow::Error::msg)?;
    }
    if let Some(k) = concurrency {
        if k == 0 {
            bail!("Concurrency must be at least 1");
        }
        config.concurrency = k;
    }

    if changed {
        config.save().map_err(anyhow::Error::msg)?;
        eprintln!("Saved {}", Config::config_location());
    } else {
        eprintln!("{}", Config::config_location());
    }
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_timeout_flag_rejects_zero() {
        assert!(Args::try_parse_from(["codecritic", "--timeout-ms", "0", "health"]).is_err());
        assert!(Args::try_parse_from(["codecritic", "health", "--timeout-ms", "abc"]).is_err());

        let args = Args::try_parse_from(["codecritic", "health", "--timeout-ms", "1500"]).unwrap();
        assert_eq!(args.timeout_ms, Some(1500));
    }

    #[tokio::test]
    async fn test_second_interrupt_asks_to_quit() {
        let cancel = CancelFlag::new();
        let mut seen = 0;
        let quit = watch_interrupts(&cancel, || {
            seen += 1;
            std::future::ready(Ok(()))
        })
        .await;
        assert!(quit);
        assert!(cancel.is_cancelled());
        assert_eq!(seen, 2);
    }

    #[tokio::test]
    async fn test_unavailable_signal_handler_cancels_nothing() {
        let cancel = CancelFlag::new();
        let quit = watch_interrupts(&cancel, || {
            std::future::ready(Err(io::Error::other("no signals")))
        })
        .await;
        assert!(!quit);
        assert!(!cancel.is_cancelled());
    }
}
