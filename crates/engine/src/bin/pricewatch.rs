// ABOUTME: CLI binary for the pricewatch engine: resolves prices for URLs or a saved HTML file.
// ABOUTME: Prints one tab-separated line per product or JSON, logs to stderr, exits 1 if any product has no price.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::Parser;
use pricewatch_engine::{load_builtin_registry, load_registry_from_path, ExtractionResult, PriceEngine};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "pricewatch")]
#[command(about = "Resolve the current price published on product pages")]
struct Args {
    /// Catalog SKU recorded in each result
    #[arg(long = "sku", default_value = "")]
    sku: String,

    /// HTML file to resolve offline (requires --url)
    #[arg(long = "html")]
    html: Option<PathBuf>,

    /// URL context for --html (drives override lookup and cents exemptions)
    #[arg(long = "url")]
    url: Option<String>,

    /// JSON override table, consulted before the builtin one
    #[arg(long = "overrides")]
    overrides: Option<PathBuf>,

    /// Output results as JSON
    #[arg(long = "json")]
    json_output: bool,

    /// Fall back to a headless Chromium render when the plain fetch finds no price
    #[cfg(feature = "chromium")]
    #[arg(long = "render")]
    render: bool,

    /// Allow fetching from private/local networks
    #[arg(long = "allow-private-networks")]
    allow_private_networks: bool,

    /// Print elapsed time in ms to stderr
    #[arg(long = "timing")]
    timing: bool,

    /// Debug logging (RUST_LOG overrides)
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Product page URLs
    #[arg()]
    urls: Vec<String>,
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "pricewatch=debug,pricewatch_engine=debug"
    } else {
        "pricewatch=info,pricewatch_engine=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

fn build_engine(args: &Args) -> Result<PriceEngine> {
    let mut registry = match args.overrides {
        Some(ref path) => load_registry_from_path(path)
            .with_context(|| format!("loading overrides from {}", path.display()))?,
        None => Default::default(),
    };
    registry.extend(load_builtin_registry());

    #[allow(unused_mut)]
    let mut builder = PriceEngine::builder()
        .registry(registry)
        .allow_private_networks(args.allow_private_networks);

    #[cfg(feature = "chromium")]
    if args.render {
        builder = builder.launcher(std::sync::Arc::new(pricewatch_engine::ChromiumLauncher::new()));
    }

    Ok(builder.build())
}

fn format_output(results: &[ExtractionResult], json_output: bool) -> Result<String> {
    if json_output {
        let out = if results.len() == 1 {
            serde_json::to_string_pretty(&results[0])?
        } else {
            serde_json::to_string_pretty(results)?
        };
        return Ok(out);
    }
    Ok(results
        .iter()
        .map(ExtractionResult::summary_line)
        .collect::<Vec<_>>()
        .join("\n"))
}

async fn run(args: Args) -> Result<bool> {
    if args.html.is_some() && args.url.is_none() {
        bail!("--url is required when using --html");
    }
    if args.html.is_none() && args.urls.is_empty() {
        bail!("at least one URL is required, or use --html with --url");
    }
    if args.html.is_some() && !args.urls.is_empty() {
        bail!("cannot use both --html and positional URLs");
    }

    let engine = build_engine(&args)?;
    let start = Instant::now();
    let mut results = Vec::new();

    match (&args.html, &args.url) {
        (Some(path), Some(url)) => {
            let html = fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            results.push(engine.resolve_html(&args.sku, url, &html));
        }
        _ => {
            for url in &args.urls {
                results.push(engine.resolve_price_for(&args.sku, url).await);
            }
        }
    }

    let elapsed = start.elapsed();
    println!("{}", format_output(&results, args.json_output)?);

    if args.timing {
        let gate = engine.gate().tracker().summary();
        eprintln!(
            "elapsed: {}ms (requests: {}, rate limited: {}, backoff: {}ms)",
            elapsed.as_millis(),
            gate.requests,
            gate.rate_limited,
            gate.total_backoff.as_millis()
        );
    }

    Ok(results.iter().all(ExtractionResult::is_resolved))
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    match run(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}
