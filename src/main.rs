use std::path::Path;

use clap::Parser;
use color_eyre::eyre::{Result, eyre};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use webimage::infrastructure::config::Command;
use webimage::infrastructure::{CliArgs, ConfigStore, LogLevel, TieredCache, WebImageConfig};
use webimage::{ImageLoader, LoadOptions, LoadOutcome};

fn init_logging(level: LogLevel, log_path: Option<&Path>) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    if let Some(log_path) = log_path {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();

        info!(path = %log_path.display(), "Logging initialized");
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    Ok(())
}

fn load_config(args: &CliArgs) -> Result<WebImageConfig> {
    let store = ConfigStore::new()?;
    let mut config = store.load(args.config.as_deref())?;
    if let Some(level) = args.log_level {
        config.log_level = level;
    }
    Ok(config)
}

async fn fetch(
    config: &WebImageConfig,
    url: &str,
    options: LoadOptions,
    output: Option<&Path>,
) -> Result<()> {
    let loader = ImageLoader::with_defaults(config).await?;
    let outcome = loader.load(url, options).outcome().await;

    let image = match outcome {
        LoadOutcome::Success(image) => image,
        LoadOutcome::Failure(err) => return Err(eyre!("Failed to load {url}: {err}")),
        LoadOutcome::Cancelled => return Err(eyre!("Load of {url} was cancelled")),
    };

    let entry = &image.entry;
    let dimensions = entry
        .dimensions()
        .map_or_else(|| "unknown".to_string(), |(w, h)| format!("{w}x{h}"));
    println!(
        "source={} format={} bytes={} dimensions={dimensions}",
        image.source,
        entry.format,
        entry.byte_size()
    );

    if let Some(output) = output {
        let output = if output.extension().is_none() {
            output.with_extension(entry.format.extension())
        } else {
            output.to_path_buf()
        };
        tokio::fs::write(&output, &entry.data).await?;
        info!(path = %output.display(), "Wrote image");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = CliArgs::parse();
    let config = load_config(&args)?;
    init_logging(config.log_level, args.log_path.as_deref())?;

    info!(version = webimage::VERSION, "Starting webimage");

    match args.command {
        Command::Fetch {
            url,
            bypass_cache,
            retry_failed,
            memory_only,
            output,
        } => {
            let options = LoadOptions {
                bypass_cache,
                retry_failed,
                memory_only,
                ..LoadOptions::default()
            };
            fetch(&config, &url, options, output.as_deref()).await?;
        }
        Command::Sweep => {
            let cache = TieredCache::new(config.cache).await?;
            let report = cache.sweep_expired().await;
            println!(
                "removed={} freed={}",
                report.removed_count, report.freed_bytes
            );
        }
        Command::Stats { json } => {
            let cache = TieredCache::new(config.cache).await?;
            let (count, bytes) = cache.calculate_size().await;
            let path = cache.disk().cache_dir().display().to_string();
            if json {
                let stats = serde_json::json!({ "path": path, "count": count, "bytes": bytes });
                println!("{stats}");
            } else {
                println!("path={path} count={count} bytes={bytes}");
            }
        }
        Command::Clear => {
            let cache = TieredCache::new(config.cache).await?;
            let removed = cache.clear_disk().await;
            println!("removed={removed}");
        }
    }

    Ok(())
}
