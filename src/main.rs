mod cli;

use vidsentry::pipeline::probe::DurationProbe;
use vidsentry::server;
use vidsentry_core::config::Config;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;

async fn start_server(
    host: Option<String>,
    port: Option<u16>,
    config_path: Option<&Path>,
) -> Result<()> {
    let mut config = Config::load_or_default(config_path).context("Failed to load config")?;

    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    for warning in config.validate() {
        tracing::warn!("Config: {}", warning);
    }

    tracing::info!("Starting vidsentry");
    tracing::info!(
        "Server will listen on {}:{}",
        config.server.host,
        config.server.port
    );
    tracing::info!("Database at {}", config.server.db_path.display());
    tracing::info!("Uploads stored in {}", config.upload.storage_dir.display());

    server::start_server(config).await
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "vidsentry=trace,vidsentry_core=debug,vidsentry_db=debug,tower_http=debug".to_string()
        } else {
            "vidsentry=debug,vidsentry_core=info,vidsentry_db=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::Probe { file } => probe_file(&file),
        Commands::CheckTools => check_tools(),
        Commands::Validate { file } => {
            let path = file.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("vidsentry {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn probe_file(file: &Path) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let Some(probe) = DurationProbe::from_path() else {
        anyhow::bail!("ffprobe not found on PATH");
    };

    let rt = tokio::runtime::Runtime::new()?;
    match rt.block_on(probe.duration_seconds(file)) {
        Some(secs) => {
            let whole = secs as u64;
            println!("File: {}", file.display());
            println!(
                "Duration: {:02}:{:02}:{:02} ({:.3}s)",
                whole / 3600,
                (whole / 60) % 60,
                whole % 60,
                secs
            );
        }
        None => println!("File: {} (duration unknown)", file.display()),
    }

    Ok(())
}

fn check_tools() -> Result<()> {
    println!("Checking external tools...\n");

    match DurationProbe::from_path() {
        Some(probe) => {
            println!("✓ ffprobe - {}", probe.ffprobe_path().display());
            println!("\nAll optional tools are available!");
        }
        None => {
            println!("✗ ffprobe");
            println!("\nffprobe is missing; media durations will not be recorded.");
        }
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            Config::load(p).with_context(|| format!("Failed to load {:?}", p))?
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    let warnings = config.validate();
    if warnings.is_empty() {
        println!("✓ Configuration is valid");
    } else {
        println!("✓ Configuration parsed with {} warning(s):", warnings.len());
        for warning in &warnings {
            println!("  - {}", warning);
        }
    }
    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!("  Database: {}", config.server.db_path.display());
    println!("  Upload dir: {}", config.upload.storage_dir.display());
    println!("  Max upload: {} bytes", config.upload.max_size_bytes);
    println!("  Allowed types: {}", config.upload.allowed_types.join(", "));
    println!("  Serve flagged: {}", config.delivery.serve_flagged);

    Ok(())
}
