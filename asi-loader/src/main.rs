//! ASI Loader CLI
//!
//! Runs the loader's discovery and load pass against a plugin directory
//! outside of any host process.

use anyhow::Context;
use asi_loader_core::diagnostics::CollectingSink;
use asi_loader_core::{ConfigLoader, LoaderConfig};
use asi_loader_host::{DirectoryHost, LoaderContext, LoaderEntryPoint, ThreadSpawner};
use asi_loader_plugin::{ExtensionFilter, NativeModuleLoader, PluginDiscoverer};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "asi-loader")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the plugins that would be loaded, in load order
    List {
        /// Directory of the host executable
        #[arg(long, default_value = ".")]
        host_dir: PathBuf,

        /// Loader config file (default: asi-loader.toml in the host directory)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Validate a loader config file
    #[command(name = "check-config")]
    CheckConfig {
        /// Config file to validate
        config: PathBuf,
    },

    /// Load the plugins and run their initializers
    Load {
        /// Directory of the host executable
        #[arg(long, default_value = ".")]
        host_dir: PathBuf,

        /// Loader config file (default: asi-loader.toml in the host directory)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays machine readable
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::List { host_dir, config } => {
            let config = load_config(&host_dir, config.as_deref())?;
            let plugin_dir = host_dir.join(&config.plugins.directory);
            let discoverer = PluginDiscoverer::new(ExtensionFilter::new(config.plugins.extension.as_str()));

            tracing::info!("Listing {} in {}", discoverer.filter().pattern(), plugin_dir.display());
            for name in discoverer.discover(&plugin_dir) {
                println!("{}", name);
            }
        }

        Commands::CheckConfig { config } => match ConfigLoader::load(&config) {
            Ok(_) => println!("✅ Configuration '{}' is valid!", config.display()),
            Err(e) => {
                eprintln!("❌ Configuration Error: {}", e);
                std::process::exit(1);
            }
        },

        Commands::Load { host_dir, config } => {
            let mut config = load_config(&host_dir, config.as_deref())?;
            // There is no host code to redirect; the barrier is fired below
            config.anchor.enabled = false;

            let sink = Arc::new(CollectingSink::forwarding());
            let ctx = Arc::new(LoaderContext::new(
                config,
                Arc::new(DirectoryHost::new(host_dir)),
                Arc::new(NativeModuleLoader),
                sink.clone(),
            ));

            let attach = LoaderEntryPoint::unpatched(&ThreadSpawner).attach(&ctx, 0);
            let barrier = ctx.fire_barrier();

            println!("Load mode: {:?}", attach.mode);
            println!("Loaded plugins:");
            for name in ctx.loaded_plugins() {
                println!("  {}", name);
            }
            println!("Initializers run: {}", barrier.invoked);

            let diagnostics = sink.diagnostics();
            if !diagnostics.is_empty() {
                println!("Diagnostics:");
                for diagnostic in &diagnostics {
                    println!("  {}", diagnostic);
                }
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn load_config(host_dir: &Path, config: Option<&Path>) -> anyhow::Result<LoaderConfig> {
    let loaded = match config {
        Some(path) => ConfigLoader::load(path),
        None => ConfigLoader::locate(host_dir),
    };
    loaded.context("Failed to load loader config")
}
