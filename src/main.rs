mod api;
mod config;
mod consts;
mod environment;
mod events;
mod job;
mod listings;
mod poller;
mod resources;
mod runtime;

use crate::api::StitchApiClient;
use crate::api::JobApi;
use crate::config::{get_config_path, Config};
use crate::environment::Environment;
use crate::listings::{PopularEntry, RecentEntry};
use crate::runtime::Session;
use clap::{Parser, Subcommand};
use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
/// Command-line arguments
struct Args {
    /// Command to execute
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Stitch two videos into one output
    Stitch {
        /// First input video
        #[arg(long, value_name = "FILE")]
        first: PathBuf,

        /// Second input video
        #[arg(long, value_name = "FILE")]
        second: PathBuf,

        /// Where to copy the stitched result
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Delay between status checks, in milliseconds
        #[arg(long, value_name = "MILLIS")]
        poll_interval: Option<u64>,

        /// Maximum number of status checks before giving up
        #[arg(long, value_name = "COUNT")]
        max_attempts: Option<u32>,
    },
    /// Show the most recently submitted jobs
    Recent,
    /// Show the most downloaded jobs
    Popular,
    /// Download the output of a completed job by id
    Fetch {
        /// Identifier of the completed job
        #[arg(long, value_name = "TASK_ID")]
        task_id: String,

        /// Where to copy the downloaded result
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Clear the saved configuration
    Reset,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let config_path = get_config_path()?;
    let config = if config_path.exists() {
        Config::load_from_file(&config_path)?
    } else {
        // First run: persist the defaults so they can be edited.
        let config = Config::default();
        config.save(&config_path)?;
        config
    };

    // VSTITCH_ENVIRONMENT wins over the config file.
    let environment_str = std::env::var("VSTITCH_ENVIRONMENT").unwrap_or_default();
    let environment = if !environment_str.is_empty() {
        match environment_str.parse::<Environment>() {
            Ok(env) => env,
            Err(_) => {
                eprintln!("Invalid environment: {}", environment_str);
                return Err("Invalid environment".into());
            }
        }
    } else if !config.environment.is_empty() {
        config
            .environment
            .parse::<Environment>()
            .unwrap_or_default()
    } else {
        Environment::default()
    };

    let args = Args::parse();
    match args.command {
        Command::Stitch {
            first,
            second,
            output,
            poll_interval,
            max_attempts,
        } => {
            stitch(
                environment,
                &config,
                first,
                second,
                output,
                poll_interval,
                max_attempts,
            )
            .await
        }
        Command::Recent => {
            let client = StitchApiClient::new(environment);
            print_recent(&client.recent().await?);
            Ok(())
        }
        Command::Popular => {
            let client = StitchApiClient::new(environment);
            print_popular(&client.popular().await?);
            Ok(())
        }
        Command::Fetch { task_id, output } => fetch(environment, &config, task_id, output).await,
        Command::Reset => {
            println!("Clearing configuration file...");
            Config::clear(&config_path).map_err(Into::into)
        }
    }
}

/// Run one stitch end-to-end, printing flow events until the session ends.
async fn stitch(
    environment: Environment,
    config: &Config,
    first: PathBuf,
    second: PathBuf,
    output: Option<PathBuf>,
    poll_interval: Option<u64>,
    max_attempts: Option<u32>,
) -> Result<(), Box<dyn Error>> {
    let poll_interval = Duration::from_millis(poll_interval.unwrap_or(config.poll_interval_ms));
    let max_attempts = max_attempts.unwrap_or(config.max_poll_attempts);

    let client = StitchApiClient::new(environment);
    println!("Environment: {}", client.environment());
    let (mut session, mut event_receiver) = Session::new(Arc::new(client), poll_interval, max_attempts)?;

    // Trigger shutdown on Ctrl+C
    let (shutdown_sender, _) = broadcast::channel(1);
    let shutdown_on_ctrl_c = shutdown_sender.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_on_ctrl_c.send(());
        }
    });

    // Print flow events as they arrive.
    let printer = tokio::spawn(async move {
        while let Some(event) = event_receiver.recv().await {
            println!("{}", event);
        }
    });

    session.refresh_listings().await;

    let result = session
        .stitch(&first, &second, shutdown_sender.subscribe())
        .await;

    let exit: Result<(), Box<dyn Error>> = match result {
        Ok(Some(handle)) => {
            println!("Stitched video ready: {}", handle.path().display());
            let mut copy_result = Ok(());
            if let Some(output) = &output {
                copy_result = match fs::copy(handle.path(), output) {
                    Ok(_) => {
                        println!("Saved to {}", output.display());
                        Ok(())
                    }
                    Err(e) => Err(e.into()),
                };
            }
            print_recent(session.listings().recent());
            print_popular(session.listings().popular());
            copy_result
        }
        Ok(None) => {
            println!("Stitch cancelled.");
            Ok(())
        }
        Err(e) => Err(e.into()),
    };

    session.finish();
    let _ = printer.await;
    exit
}

/// Re-download a completed job's output by id.
async fn fetch(
    environment: Environment,
    config: &Config,
    task_id: String,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn Error>> {
    let api = Arc::new(StitchApiClient::new(environment));
    let (mut session, mut event_receiver) = Session::new(
        api,
        Duration::from_millis(config.poll_interval_ms),
        config.max_poll_attempts,
    )?;

    let printer = tokio::spawn(async move {
        while let Some(event) = event_receiver.recv().await {
            println!("{}", event);
        }
    });

    let result = session.fetch_existing(&task_id).await;
    let exit: Result<(), Box<dyn Error>> = match result {
        Ok(handle) => {
            println!("Downloaded output: {}", handle.path().display());
            match &output {
                Some(output) => match fs::copy(handle.path(), output) {
                    Ok(_) => {
                        println!("Saved to {}", output.display());
                        Ok(())
                    }
                    Err(e) => Err(e.into()),
                },
                None => Ok(()),
            }
        }
        Err(e) => Err(e.into()),
    };

    session.finish();
    let _ = printer.await;
    exit
}

fn print_recent(entries: &[RecentEntry]) {
    if entries.is_empty() {
        return;
    }
    println!("\nRecent jobs:");
    for entry in entries {
        println!(
            "  {}  {}  (task {})",
            format_timestamp(entry.timestamp),
            entry.filename,
            entry.task_id
        );
    }
}

fn print_popular(entries: &[PopularEntry]) {
    if entries.is_empty() {
        return;
    }
    println!("\nPopular downloads:");
    for entry in entries {
        println!(
            "  {:>4} downloads  {}  (task {})",
            entry.downloads, entry.output_filename, entry.id
        );
    }
}

fn format_timestamp(secs: f64) -> String {
    chrono::DateTime::from_timestamp(secs as i64, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}
