use std::path::PathBuf;
use std::process::exit;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::{Config, Mode, Overrides, Settings};
use crate::driver::{Announcer, PollDriver};
use crate::format::Formatter;
use crate::sources::reddit::RedditClient;
use crate::sources::PostSource;
use crate::stream::{EventDriver, Scanner};
use crate::webhook::WebhookClient;

mod avatar;
mod bookmark;
mod config;
mod driver;
mod error;
mod format;
mod sources;
mod stream;
mod webhook;

/// How many posts one stream scan looks at.
const SCAN_LIMIT: u32 = 25;

#[derive(Parser)]
#[clap(version, about)]
struct Args {
    /// Toml configuration. Optional when --webhook and --subreddit are given.
    #[clap(short, long, value_parser, default_value = "subhook.toml")]
    config: PathBuf,

    /// Webhook URL to post to.
    #[clap(long, value_parser, env = "WEBHOOK")]
    webhook: Option<String>,

    /// Subreddit to monitor.
    #[clap(long, value_parser, env = "SUBREDDIT")]
    subreddit: Option<String>,

    /// Poll with a bookmark, or stream every new post.
    #[clap(long, value_enum)]
    mode: Option<Mode>,

    /// Seconds between polls/scans.
    #[clap(long, value_parser)]
    interval: Option<u64>,

    /// Debug logging for this program.
    #[clap(short, long, value_parser, default_value_t = false)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    let settings = match load_settings(&args) {
        Ok(s) => s,
        Err(e) => {
            error!("{:#}", e);
            exit(1);
        }
    };

    info!(subreddit = %settings.subreddit, mode = ?settings.mode, "Starting");

    let worker = tokio::task::spawn_blocking(move || run(settings));

    tokio::select! {
        res = worker => match res {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("{:#}", e);
                exit(1);
            }
            Err(e) => {
                error!("worker panicked: {}", e);
                exit(2);
            }
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            // The worker is parked in blocking I/O or sleep; don't wait for it.
            exit(0);
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "info,subhook=debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_settings(args: &Args) -> anyhow::Result<Settings> {
    info!("Try reading config from {}...", args.config.display());
    let config = Config::load(&args.config)?;

    let settings = config.into_settings(Overrides {
        webhook: args.webhook.clone(),
        subreddit: args.subreddit.clone(),
        mode: args.mode,
        interval_secs: args.interval,
    })?;
    Ok(settings)
}

/// Everything blocking lives here, off the async runtime.
fn run(settings: Settings) -> anyhow::Result<()> {
    let reddit = Arc::new(
        RedditClient::new(&settings.subreddit, &settings.user_agent, settings.credentials.clone())
            .context("Error in creating Reddit client")?,
    );
    let formatter = Formatter::new(settings.format.clone(), reddit.clone());
    let announcer = Announcer::new(formatter, WebhookClient::new(settings.webhook_url.clone()));

    match settings.mode {
        Mode::Poll => {
            let mut driver = PollDriver::new(reddit, announcer, settings.advance);
            driver.start().context("Error starting up against Reddit")?;
            info!(
                every = ?settings.interval,
                bookmark = ?driver.bookmark(),
                state = ?driver.state(),
                "Polling r/{}",
                settings.subreddit
            );
            driver.run(settings.interval);
        }
        Mode::Stream => {
            reddit.authenticate().context("Error logging in to Reddit")?;
            info!("Listening to r/{}", settings.subreddit);

            let (tx, rx) = mpsc::channel(SCAN_LIMIT as usize);
            let scanner = Scanner::new(reddit, SCAN_LIMIT);
            let interval = settings.interval;
            let scan = std::thread::spawn(move || scanner.run(interval, tx));

            EventDriver::new(announcer).run(rx);
            scan.join().map_err(|_| anyhow::anyhow!("scanner thread panicked"))?;
        }
    }
    Ok(())
}
