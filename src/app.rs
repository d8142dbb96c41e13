use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::api;
use crate::config;
use crate::data::{BackendCommentService, BackendFeedService, BackendSubmitService};
use crate::storage;
use crate::ui;
use crate::votes::VoteOverlay;

const LOG_FILTER_ENV: &str = "CAMPUS_ECHO_LOG";

pub fn run() -> Result<()> {
    let cfg = config::load(config::LoadOptions::default()).context("load config")?;
    let config_path = config::default_path();
    let display_path = friendly_path(config_path.as_ref());

    init_logging();
    info!(
        "campus-echo {} starting against {}",
        crate::VERSION,
        cfg.backend.base_url
    );

    let store = Arc::new(
        storage::Store::open(storage::Options {
            path: cfg.storage.path.clone(),
        })
        .context("open storage")?,
    );

    let client = Arc::new(
        api::Client::new(api::ClientConfig {
            base_url: Some(cfg.backend.base_url.clone()),
            asset_base_url: cfg.backend.asset_base_url.clone(),
            user_agent: cfg.backend.user_agent.clone(),
            http_client: None,
        })
        .context("build feed client")?,
    );

    let options = ui::Options {
        feed_service: Arc::new(BackendFeedService::new(client.clone())),
        comment_service: Arc::new(BackendCommentService::new(client.clone())),
        submit_service: Arc::new(BackendSubmitService::new(client)),
        votes: VoteOverlay::new(store),
        refresh_interval: cfg.feed.refresh_interval,
        config_path: display_path,
    };

    let mut model = ui::Model::new(options);
    model.run()
}

/// Logs go to a file under the config dir; writing to stderr would tear the
/// alternate screen.
fn init_logging() {
    let Some(dir) = dirs::config_dir().map(|dir| dir.join("campus-echo")) else {
        return;
    };
    if fs::create_dir_all(&dir).is_err() {
        return;
    }
    let Ok(file) = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join("campus-echo.log"))
    else {
        return;
    };
    let filter =
        EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Arc::new(file))
        .with_ansi(false)
        .try_init();
}

fn friendly_path(path: Option<&std::path::PathBuf>) -> String {
    if let Some(path) = path {
        if let Some(home) = dirs::home_dir() {
            if let Ok(stripped) = path.strip_prefix(&home) {
                let mut display = String::from("~");
                if !stripped.as_os_str().is_empty() {
                    display.push_str(&format!("/{}", stripped.display()));
                }
                return display;
            }
        }
        path.display().to_string()
    } else {
        "~/.config/campus-echo/config.yaml".to_string()
    }
}
