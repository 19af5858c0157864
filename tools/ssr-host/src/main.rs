//! SSR host - serves server-rendered pages with hydration state.
//!
//! Commands:
//! - `ssr-host serve` - Serve the demo application
//! - `ssr-host render <url>` - Render one page to stdout

mod config;
mod demo;
mod error;
mod index_html;
mod logging;
mod matchpath;
mod proxy;
mod render_manager;
mod server;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ssr_core::Headers;
use ssr_fetch::HttpTransport;

use config::HostConfig;
use index_html::{IndexHtml, PageResponse};
use render_manager::RenderManager;

/// SSR host - render pages on the server and hand their data to the client
#[derive(Parser)]
#[command(name = "ssr-host")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use JSON log format
    #[arg(long, global = true)]
    json: bool,

    /// Config file path
    #[arg(short, long, global = true, default_value = "ssr-host.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve pages over HTTP
    Serve,

    /// Render one URL and print the composed page
    Render {
        /// Path and query to render
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = HostConfig::load(&cli.config)?;
    logging::init(&config.log.clone().with_overrides(cli.verbose, cli.json));

    let app = config.ssr.apply_fetch(demo::app_config());
    let def = demo::definition(Arc::new(HttpTransport::new()), app);

    match cli.command {
        Commands::Serve => server::serve(&config, def).await,
        Commands::Render { url } => render_once(&config, def, &url).await,
    }
}

async fn render_once(config: &HostConfig, def: ssr_render::AppDefinition, url: &str) -> Result<()> {
    let base = std::env::current_dir().context("Failed to get current directory")?;
    let public_dir = config.ssr.public_dir(&base);
    let index = IndexHtml::load(config.env, &public_dir)
        .with_context(|| format!("Failed to load index.html from {}", public_dir.display()))?;

    let manager = RenderManager::new(def, config.ssr.origin.clone(), config.ssr.timeout());
    let (_, result) = manager.render(url, Headers::new(), index.manifest()).await;

    match index.compose(&result) {
        PageResponse::Html { status, body } => {
            eprintln!("status: {}", status);
            println!("{}", body);
        }
        PageResponse::Redirect { status, location } => {
            eprintln!("status: {}", status);
            println!("{}", location);
        }
    }
    Ok(())
}
