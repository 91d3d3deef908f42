//! CLI binary for md2pdf.
//!
//! A thin shim over the library crate: `serve` runs the HTTP service,
//! `convert` renders one markdown file to PDF and exits.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use md2pdf::pipeline::input::MarkdownSource;
use md2pdf::{server, ConversionConfig, Converter};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
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

const AFTER_HELP: &str = r##"EXAMPLES:
  # Run the service on port 3000
  md2pdf serve

  # Generate, then download (the file is deleted after the download)
  curl -s localhost:3000/generate-single-para \
       -H 'content-type: application/json' \
       -d '{"content":"# Hello\n\nWorld"}'
  curl -OJ localhost:3000/download/document-1718000000000.pdf

  # One-shot conversion
  md2pdf convert README.md              # writes README.pdf
  cat notes.md | md2pdf convert - -o notes.pdf

ENVIRONMENT VARIABLES:
  PORT                     Listen port for `serve`
  CHROME_PATH              Browser executable (skips auto-detection)
  PUPPETEER_CACHE_DIR      Extra place to look for a downloaded Chromium
  RUST_LOG                 Log filter, overrides -v / -q

BROWSER:
  A Chromium-family browser is required. It is looked up in CHROME_PATH,
  then PATH (chromium, chromium-browser, google-chrome, ...), then the usual
  install locations, then ~/.cache/puppeteer.
"##;

/// Convert Markdown to PDF with headless Chromium.
#[derive(Parser, Debug)]
#[command(
    name = "md2pdf",
    version,
    about = "Convert Markdown to PDF with headless Chromium",
    long_about = "Convert Markdown to PDF with headless Chromium. Run as an HTTP service that \
hands out every generated PDF for exactly one download, or convert a single file from the \
command line.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    render: RenderArgs,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "MD2PDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "MD2PDF_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service.
    Serve(ServeArgs),

    /// Convert one markdown file (or stdin) to PDF.
    Convert(ConvertArgs),
}

/// Options shared by both commands.
#[derive(Args, Debug)]
struct RenderArgs {
    /// Browser executable; auto-detected if unset.
    #[arg(long, global = true, env = "CHROME_PATH")]
    chrome_path: Option<PathBuf>,

    /// Seconds one render may take before the browser is killed.
    #[arg(long, global = true, env = "MD2PDF_RENDER_TIMEOUT", default_value_t = 60)]
    render_timeout: u64,

    /// Maximum concurrent browser processes.
    #[arg(long, global = true, env = "MD2PDF_MAX_RENDERS", default_value_t = 4)]
    max_renders: usize,

    /// Milliseconds the page may spend settling (network, fonts) before printing.
    #[arg(long, global = true, env = "MD2PDF_SETTLE_BUDGET_MS", default_value_t = 5000)]
    settle_budget: u64,

    /// Escape raw HTML in the markdown instead of passing it through.
    #[arg(long, global = true, env = "MD2PDF_ESCAPE_HTML")]
    escape_html: bool,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Listen port.
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// Listen address.
    #[arg(long, env = "MD2PDF_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Directory holding generated PDFs until they are downloaded.
    #[arg(long, env = "MD2PDF_OUTPUT_DIR", default_value = "./temp_files")]
    output_dir: PathBuf,

    /// Delete never-downloaded PDFs older than this many seconds.
    #[arg(long, env = "MD2PDF_ARTIFACT_TTL")]
    artifact_ttl: Option<u64>,

    /// Seconds between expiry sweeps (with --artifact-ttl).
    #[arg(long, env = "MD2PDF_SWEEP_INTERVAL", default_value_t = 60)]
    sweep_interval: u64,
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// Markdown file, or `-` for stdin.
    input: String,

    /// Output PDF. Default: INPUT with a `.pdf` extension.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match &cli.command {
        Command::Serve(args) => run_serve(&cli.render, args).await,
        Command::Convert(args) => run_convert(&cli.render, args, cli.quiet).await,
    }
}

async fn run_serve(render: &RenderArgs, args: &ServeArgs) -> Result<()> {
    let config = build_config(render)
        .output_dir(&args.output_dir)
        .artifact_ttl_secs(args.artifact_ttl)
        .sweep_interval_secs(args.sweep_interval)
        .build()
        .context("Invalid configuration")?;

    // The browser is resolved per render; a missing one only fails requests.
    match chromium_locate::find_browser_with(config.chrome_path.as_deref()) {
        Ok(path) => info!("Rendering engine: {}", path.display()),
        Err(e) => warn!("{}", e),
    }

    let converter = Arc::new(Converter::new(config));
    converter
        .store()
        .ensure_namespace()
        .await
        .context("Failed to prepare output directory")?;
    let _sweeper = converter.spawn_sweeper();

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", args.host, args.port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("PDF generator server listening on port {}", args.port);

    server::serve(listener, converter, shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn run_convert(render: &RenderArgs, args: &ConvertArgs, quiet: bool) -> Result<()> {
    let source = MarkdownSource::parse(&args.input);
    let output = match (&args.output, source.default_output()) {
        (Some(path), _) => path.clone(),
        (None, Some(path)) => path,
        (None, None) => anyhow::bail!("--output is required when reading from stdin"),
    };

    let config = build_config(render)
        .build()
        .context("Invalid configuration")?;
    let markdown = source.read().await.context("Failed to read markdown")?;

    let converter = Converter::new(config);
    let stats = converter
        .convert_to_file(&markdown, &output)
        .await
        .context("Conversion failed")?;

    if !quiet {
        eprintln!(
            "{}  {} bytes  {}ms  →  {}",
            green("✔"),
            stats.pdf_bytes,
            stats.total_ms,
            bold(&output.display().to_string()),
        );
        eprintln!(
            "   {}",
            dim(&format!(
                "transform {}ms  /  render {}ms",
                stats.transform_ms, stats.render_ms
            )),
        );
    }
    Ok(())
}

/// Map shared CLI args onto a config builder.
fn build_config(render: &RenderArgs) -> md2pdf::ConversionConfigBuilder {
    let mut builder = ConversionConfig::builder()
        .render_timeout_secs(render.render_timeout)
        .max_concurrent_renders(render.max_renders)
        .settle_budget_ms(render.settle_budget)
        .allow_raw_html(!render.escape_html);
    if let Some(ref path) = render.chrome_path {
        builder = builder.chrome_path(path);
    }
    builder
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested, draining connections");
}
