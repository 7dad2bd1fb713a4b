//! CLI binary for docshift.
//!
//! A thin shim over the library crate: maps flags and env vars onto
//! `ServiceConfig`, then either runs the HTTP server or performs a single
//! conversion through the same lifecycle the server uses.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use docshift::{capabilities, server, ConversionRequest, ConversionService, ServiceConfig};
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  docshift                                   serve on 127.0.0.1:5000
  docshift serve --bind 0.0.0.0:8080         serve on all interfaces
  docshift convert report.pdf --to docx      write report_converted.docx
  docshift convert photo.png --to pdf -o out.pdf
  docshift formats --json

PDF → PPTX needs the pdfium shared library. Point PDFIUM_LIB_PATH at the
library file or its directory, or install it system-wide.
"#;

/// Convert documents, spreadsheets, and images between formats.
#[derive(Parser, Debug)]
#[command(
    name = "docshift",
    version,
    about = "Convert documents, spreadsheets, and images between formats",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    service: ServiceArgs,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "DOCSHIFT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "DOCSHIFT_QUIET")]
    quiet: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true, env = "DOCSHIFT_LOG_JSON")]
    log_json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default).
    Serve {
        /// Address to listen on.
        #[arg(long, env = "DOCSHIFT_BIND", default_value = "127.0.0.1:5000")]
        bind: SocketAddr,
    },
    /// Convert one file and write the result to disk.
    Convert {
        /// File to convert; its extension decides the source format.
        input: PathBuf,

        /// Target format (e.g. docx, pdf, csv, png).
        #[arg(short, long = "to")]
        to: String,

        /// Output path. Default: `<stem>_converted.<ext>` next to the input.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List supported conversions.
    Formats {
        /// Print the table as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
struct ServiceArgs {
    /// Working directory for staged uploads and outputs.
    #[arg(long, global = true, env = "DOCSHIFT_WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// Largest accepted upload, in MiB.
    #[arg(long, global = true, env = "DOCSHIFT_MAX_UPLOAD_MB", default_value_t = 32,
          value_parser = clap::value_parser!(u64).range(1..=4096))]
    max_upload_mb: u64,

    /// Conversions allowed to run at once.
    #[arg(long, global = true, env = "DOCSHIFT_MAX_CONCURRENCY", default_value_t = 4)]
    max_concurrency: usize,

    /// pdfium shared library, or the directory containing it.
    #[arg(long, global = true, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// Width in pixels of rendered PDF pages (200–4000).
    #[arg(long, global = true, env = "DOCSHIFT_RENDER_WIDTH", default_value_t = 1600,
          value_parser = clap::value_parser!(u32).range(200..=4000))]
    render_width: u32,
}

impl ServiceArgs {
    fn to_config(&self) -> Result<ServiceConfig> {
        let mut builder = ServiceConfig::builder()
            .max_upload_bytes((self.max_upload_mb * 1024 * 1024) as usize)
            .max_concurrent_conversions(self.max_concurrency)
            .render_width(self.render_width);
        if let Some(dir) = &self.work_dir {
            builder = builder.work_dir(dir);
        }
        if let Some(lib) = &self.pdfium_lib {
            builder = builder.pdfium_library(lib);
        }
        builder.build().context("Invalid configuration")
    }
}

fn init_logging(cli: &Cli) {
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr);
    if cli.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    match cli.command {
        None => serve(&cli.service, default_bind()?).await,
        Some(Command::Serve { bind }) => serve(&cli.service, bind).await,
        Some(Command::Convert {
            ref input,
            ref to,
            ref output,
        }) => convert_one(&cli.service, input, to, output.as_deref(), cli.quiet).await,
        Some(Command::Formats { json }) => print_formats(json),
    }
}

fn default_bind() -> Result<SocketAddr> {
    let raw = std::env::var("DOCSHIFT_BIND").unwrap_or_else(|_| "127.0.0.1:5000".into());
    raw.parse()
        .with_context(|| format!("DOCSHIFT_BIND is not a socket address: {raw}"))
}

async fn serve(args: &ServiceArgs, bind: SocketAddr) -> Result<()> {
    let config = args.to_config()?;
    let service = Arc::new(ConversionService::new(config).context("Failed to start service")?);

    info!(version = env!("CARGO_PKG_VERSION"), "docshift starting");
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;
    server::serve(listener, service, shutdown_signal())
        .await
        .context("HTTP server failed")?;
    info!("docshift stopped");
    Ok(())
}

async fn convert_one(
    args: &ServiceArgs,
    input: &Path,
    to: &str,
    output: Option<&Path>,
    quiet: bool,
) -> Result<()> {
    let started = Instant::now();
    let data = tokio::fs::read(input)
        .await
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let file_name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let service = ConversionService::new(args.to_config()?).context("Failed to start service")?;
    let converted = service
        .convert(ConversionRequest::new(file_name, data, to))
        .await
        .with_context(|| format!("Could not convert {}", input.display()))?;

    let dest = match output {
        Some(p) => p.to_path_buf(),
        None => input
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(converted.file_name()),
    };
    if dest.exists() && !quiet {
        warn!("overwriting {}", dest.display());
    }
    let bytes = converted.into_bytes().await?;
    tokio::fs::write(&dest, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", dest.display()))?;

    if !quiet {
        eprintln!(
            "{} {} {}",
            green("✓"),
            bold(&dest.display().to_string()),
            dim(&format!(
                "({} bytes, {:.1}s)",
                bytes.len(),
                started.elapsed().as_secs_f64()
            ))
        );
    }
    Ok(())
}

fn print_formats(json: bool) -> Result<()> {
    let table = capabilities();
    let mut out = io::stdout().lock();
    if json {
        serde_json::to_writer_pretty(&mut out, &table).context("Failed to encode table")?;
        writeln!(out)?;
        return Ok(());
    }
    if table.is_empty() {
        bail!("no conversions registered");
    }
    for (source, targets) in &table {
        let targets: Vec<String> = targets.iter().map(ToString::to_string).collect();
        writeln!(out, "{:>6}  →  {}", bold(&source.to_string()), targets.join(", "))?;
    }
    Ok(())
}

/// Resolves when SIGINT (Ctrl-C) or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received; starting graceful shutdown");
}
