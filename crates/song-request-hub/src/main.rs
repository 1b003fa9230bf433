//! `song-request-hub`: takes song requests from stream chat and plays them in order.
//!
//! Chat events arrive over HTTP from a chat relay. Requested URLs are queued, downloaded
//! with yt-dlp in the background, and advanced through a single now-playing slot.

mod api;
mod chat;
mod config;
mod models;
mod openapi;
mod startup;
mod state;
mod ytdlp;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_SHA"),
    ", ",
    env!("BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "song-request-hub", version = VERSION)]
pub(crate) struct Args {
    /// HTTP bind address, e.g. 0.0.0.0:8090
    #[arg(long)]
    pub bind: Option<std::net::SocketAddr>,

    /// Directory for downloaded audio (overrides config)
    #[arg(long)]
    pub download_dir: Option<PathBuf>,

    /// Optional server config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[actix_web::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,actix_web=info,song_request_hub=info,song_queue=info")
        }))
        .init();

    startup::run(args).await
}
