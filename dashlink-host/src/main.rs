//! dashlink — terminal client for a remotely defined dashboard.
//!
//! Loads the dashboard over HTTP, follows the server's hub calls and
//! prints the rendered tree after every change.

mod console;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use log::{error, info};

use dashlink_core::{ComponentRegistry, PassthroughRenderer};
use dashlink_sync::bus::{TOPIC_MODAL_CLOSE, TOPIC_MODAL_OPEN, TOPIC_WRITE};
use dashlink_sync::{BusMessage, ClientConfig, Dashboard, HttpApi};

use console::ConsoleHost;

#[derive(Parser, Debug)]
#[command(name = "dashlink")]
#[command(about = "Follow a dashboard server and print its component tree")]
struct Args {
    /// Dashboard server base URL
    #[arg(short, long, env = "DASHLINK_API", default_value = dashlink_sync::config::DEFAULT_API_BASE)]
    api: String,

    /// Path the client is mounted under, prefixed to in-app redirects
    #[arg(long, env = "DASHLINK_BASE_PATH", default_value = "/")]
    base_path: String,

    /// Dashboard to load
    #[arg(short, long, env = "DASHLINK_DASHBOARD_ID", default_value = "")]
    dashboard: String,

    /// Session liveness poll interval in milliseconds
    #[arg(long, default_value = "5000")]
    liveness_ms: u64,

    /// Component types rendered by the generic renderer
    #[arg(long, value_delimiter = ',', default_value = "page,row,column,card,paper,grid,form")]
    components: Vec<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let config = ClientConfig::new(args.api)
        .with_base_path(args.base_path)
        .with_dashboard_id(args.dashboard)
        .with_liveness_interval(Duration::from_millis(args.liveness_ms));

    let mut registry = ComponentRegistry::new();
    for kind in &args.components {
        registry.register(kind.clone(), PassthroughRenderer);
    }

    // The engine is single-threaded; spawned network calls share this runtime.
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    runtime.block_on(async move {
        info!("Loading dashboard from {}", config.api_base);
        let api = Arc::new(HttpApi::new(config.clone())?);
        let mut dashboard = Dashboard::new(config, api, ConsoleHost::new(std::io::stdout()), registry);

        let _modal = dashboard.subscribe(TOPIC_MODAL_OPEN, |message| {
            if let BusMessage::Modal(content) = message {
                info!("Modal opened: {}", content.to_value());
            }
        });
        let _modal_close = dashboard.subscribe(TOPIC_MODAL_CLOSE, |_| info!("Modal closed"));
        let _write = dashboard.subscribe(TOPIC_WRITE, |message| {
            if let BusMessage::Write(value) = message {
                println!("{}", value.as_str().map(str::to_owned).unwrap_or_else(|| value.to_string()));
            }
        });

        let handle = dashboard.handle();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, closing session");
                handle.shutdown();
            }
        });

        if let Err(e) = dashboard.run().await {
            error!("{e}");
            return Err(e.into());
        }
        if let Some(copied) = dashboard.host().clipboard() {
            info!("Clipboard at exit: {copied}");
        }
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}
