#![deny(unsafe_code)]

use std::path::{Path, PathBuf};

use anyhow::Context;
use directories_next::ProjectDirs;
use structopt::StructOpt;

use feedback_client::config;
use feedback_client::context::FeedbackContext;
use feedback_client::store::GroupStore;
use feedback_client::Error;

const PACKAGE_ID: [&str; 3] = ["tools", "semaphore", "feedback-client"];

/// The Feedback Client Command-line tool
///
/// Join the group and post anonymous feedback from a config directory:
///
///     $ feedback-client -vvv -c <CONFIG_DIR_PATH> join
///     $ feedback-client -vvv -c <CONFIG_DIR_PATH> send "great talk!"
#[derive(StructOpt)]
#[structopt(name = "Feedback Client")]
struct Opts {
    /// A level of verbosity, and can be used multiple times
    #[structopt(short, long, parse(from_occurrences))]
    verbose: i32,
    /// Directory that contains configration files.
    #[structopt(
        short = "c",
        long = "config-dir",
        value_name = "PATH",
        parse(from_os_str)
    )]
    config_dir: Option<PathBuf>,
    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(StructOpt)]
enum Command {
    /// Join the feedback group with the configured identity.
    Join,
    /// Post an anonymous feedback message.
    Send {
        /// The feedback text; at most 32 bytes of UTF-8.
        message: String,
    },
    /// List the group members, newest first.
    Members,
    /// List the posted feedback, newest first.
    Feedback,
}

#[paw::main]
#[tokio::main]
async fn main(args: Opts) -> anyhow::Result<()> {
    setup_logger(args.verbose)?;
    match dotenv::dotenv() {
        Ok(_) => {
            tracing::trace!("Loaded .env file");
        }
        Err(e) => {
            tracing::warn!("Failed to load .env file: {}", e);
        }
    }
    let config = load_config(args.config_dir.clone())?;
    let ctx = FeedbackContext::new(config)?;
    tracing::event!(
        target: feedback_client::probe::TARGET,
        tracing::Level::DEBUG,
        kind = %feedback_client::probe::Kind::Lifecycle,
        started = true
    );
    let group_id = ctx.group_id();
    match args.cmd {
        Command::Join => {
            let identity = ctx.load_identity()?.ok_or(Error::MissingIdentity)?;
            match ctx.orchestrator().join_group(Some(&identity)).await? {
                Some(tx_hash) => println!("joined; transaction: {}", tx_hash),
                None => println!("nothing submitted"),
            }
        }
        Command::Send { message } => {
            if message.is_empty() {
                return Err(Error::EmptyMessage.into());
            }
            let identity = ctx.load_identity()?.ok_or(Error::MissingIdentity)?;
            match ctx
                .orchestrator()
                .send_feedback(Some(&identity), &message)
                .await?
            {
                Some(tx_hash) => println!("posted; transaction: {}", tx_hash),
                None => println!("nothing submitted"),
            }
        }
        Command::Members => {
            ctx.sync().refresh(group_id).await?;
            let members = ctx.sync().store().members(group_id);
            println!("{} member(s)", members.len());
            for member in members.iter().rev() {
                println!("{}", member);
            }
        }
        Command::Feedback => {
            ctx.sync().refresh(group_id).await?;
            let feedback = ctx.sync().store().feedback(group_id);
            println!("{} feedback message(s)", feedback.len());
            for message in feedback.iter().rev() {
                println!("{}", message);
            }
        }
    }
    tracing::event!(
        target: feedback_client::probe::TARGET,
        tracing::Level::DEBUG,
        kind = %feedback_client::probe::Kind::Lifecycle,
        finished = true
    );
    Ok(())
}

fn setup_logger(verbosity: i32) -> anyhow::Result<()> {
    use tracing::Level;
    let log_level = match verbosity {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        3 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("feedback_client={}", log_level).parse()?);
    let logger = tracing_subscriber::fmt()
        .with_target(true)
        .with_max_level(log_level)
        .with_env_filter(env_filter);
    // if we are not compiling for integration tests, we should use pretty logs
    #[cfg(not(feature = "integration-tests"))]
    let logger = logger.pretty();
    // otherwise, we should use json, which is easy to parse.
    #[cfg(feature = "integration-tests")]
    let logger = logger.json();

    logger.init();
    Ok(())
}

fn load_config<P>(config_dir: Option<P>) -> anyhow::Result<config::FeedbackClientConfig>
where
    P: AsRef<Path>,
{
    tracing::debug!("Getting default dirs for the feedback client");
    let dirs = ProjectDirs::from(PACKAGE_ID[0], PACKAGE_ID[1], PACKAGE_ID[2])
        .context("failed to get config")?;
    let path = match config_dir {
        Some(p) => p.as_ref().to_path_buf(),
        None => dirs.config_dir().to_path_buf(),
    };
    // return an error if the path is not a directory.
    if !path.is_dir() {
        return Err(anyhow::anyhow!("{} is not a directory", path.display()));
    }
    tracing::trace!("Loading Config from {} ..", path.display());
    config::load(path).map_err(Into::into)
}
