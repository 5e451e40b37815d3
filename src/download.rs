use crate::cli::DownloadArgs;
use bookfetch::archive::{ArchiveClient, ArchiveError, Authenticator, BookUrl, Credentials};
use bookfetch::assemble::OutputMode;
use bookfetch::config::{Config, ConfigError, ValidationError};
use bookfetch::fetch::HttpPageSource;
use bookfetch::runner::{BookError, BookReport, BookRunner, DownloadOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Missing {0}: pass it on the command line or set {1}")]
    MissingCredential(&'static str, &'static str),

    #[error("Failed to read {path}: {source}")]
    UrlFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No book URLs given")]
    NoBooks,

    #[error("Output directory does not exist: {0}")]
    MissingOutputDir(PathBuf),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("Failed to download {url}: {source}")]
    Book {
        url: String,
        #[source]
        source: BookError,
    },
}

/// Apply command-line values on top of the loaded configuration
fn apply_overrides(config: &mut Config, args: &DownloadArgs) {
    if let Some(email) = &args.email {
        config.archive.email = Some(email.clone());
    }
    if let Some(password) = &args.password {
        config.archive.password = Some(password.clone());
    }
    if let Some(resolution) = args.resolution {
        config.download.resolution = resolution;
    }
    if let Some(threads) = args.threads {
        config.download.concurrency = threads;
    }
}

/// `--url` values first, then every non-blank line of `--file`
fn collect_urls(args: &DownloadArgs) -> Result<Vec<String>, DownloadError> {
    let mut urls: Vec<String> = args.urls.iter().map(|u| u.trim().to_string()).collect();

    if let Some(path) = &args.file {
        let content = std::fs::read_to_string(path).map_err(|source| DownloadError::UrlFile {
            path: path.clone(),
            source,
        })?;
        urls.extend(
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string),
        );
    }

    if urls.is_empty() {
        return Err(DownloadError::NoBooks);
    }
    Ok(urls)
}

fn output_dir(dir: Option<&Path>) -> Result<PathBuf, DownloadError> {
    let dir = match dir {
        Some(dir) => dir.to_path_buf(),
        None => PathBuf::from("."),
    };
    if !dir.is_dir() {
        return Err(DownloadError::MissingOutputDir(dir));
    }
    Ok(dir)
}

pub async fn run(args: DownloadArgs) -> Result<Vec<BookReport>, DownloadError> {
    let mut config = Config::load_with(args.config.clone())?;
    apply_overrides(&mut config, &args);
    config.validate()?;

    let email = config
        .archive
        .email
        .clone()
        .ok_or(DownloadError::MissingCredential("email", "BOOKFETCH_EMAIL"))?;
    let password = config
        .archive
        .password
        .clone()
        .ok_or(DownloadError::MissingCredential("password", "BOOKFETCH_PASSWORD"))?;

    // Every URL is checked before anything is downloaded
    let books = collect_urls(&args)?
        .iter()
        .map(|url| BookUrl::parse(url, &config.archive.base_url))
        .collect::<Result<Vec<_>, _>>()?;
    let dir = output_dir(args.dir.as_deref())?;

    info!(books = books.len(), "Book(s) to download");

    let client = Arc::new(ArchiveClient::new(&config.archive, &config.http));
    let session = client.login(&Credentials::new(email, password)).await?;

    let options = DownloadOptions {
        output_dir: dir,
        mode: if args.jpg {
            OutputMode::Images
        } else {
            OutputMode::Pdf
        },
        save_metadata: args.meta,
        resolution: config.download.resolution,
        concurrency: config.download.concurrency,
        retry: config.download.retry_policy(),
    };
    let source = Arc::new(HttpPageSource::new(&format!("{}/", client.base_url())));
    let runner = BookRunner::new(client.clone(), client.clone(), source, options);

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    let mut reports = Vec::with_capacity(books.len());
    for book in &books {
        let report = runner
            .run(&session, book, &cancel)
            .await
            .map_err(|source| DownloadError::Book {
                url: book.to_string(),
                source,
            })?;
        reports.push(report);
    }

    let incomplete = reports.iter().filter(|r| !r.failures.is_empty()).count();
    if incomplete > 0 {
        warn!(books = reports.len(), incomplete, "Finished with missing pages");
    } else {
        info!(books = reports.len(), "All books downloaded");
    }

    Ok(reports)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    warn!("Shutdown signal received, cancelling downloads");
}
