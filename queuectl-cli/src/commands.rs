use std::path::PathBuf;

use clap::{Parser, Subcommand};

use queuectl_common::config::{Config, DEFAULT_CONFIG_PATH};

use crate::{dlq, jobs, settings, workers};

#[derive(Parser)]
#[command(name = "queuectl", version, about = "A CLI-based background job queue", long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Enqueue a new job. SPEC is either a JSON descriptor carrying at
    /// least "command" (optionally "id" and "max_retries"), or a bare
    /// command string.
    Enqueue { spec: String },

    /// Show queue statistics
    Status {
        /// Also show the active configuration
        #[arg(short, long)]
        verbose: bool,
    },

    /// List jobs, newest first
    List {
        /// Filter by state (pending, processing, completed, failed, dead)
        #[arg(short, long)]
        state: Option<String>,

        /// Limit the number of results
        #[arg(short, long)]
        limit: Option<u32>,

        /// Show retry schedule and error details
        #[arg(short, long)]
        verbose: bool,
    },

    /// Manage workers
    Worker {
        #[command(subcommand)]
        cmd: WorkerCommand,
    },

    /// Manage the dead letter queue
    Dlq {
        #[command(subcommand)]
        cmd: DlqCommand,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        cmd: ConfigCommand,
    },
}

#[derive(Subcommand)]
pub enum WorkerCommand {
    /// Start worker processes; runs until interrupted
    Start {
        /// Number of workers to start
        #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        count: u32,
    },

    /// Entry point for a single worker process, spawned by `worker start`
    #[command(hide = true)]
    Run {
        #[arg(long)]
        worker_id: String,
    },
}

#[derive(Subcommand)]
pub enum DlqCommand {
    /// List dead jobs
    List {
        /// Limit the number of results
        #[arg(short, long)]
        limit: Option<u32>,
    },

    /// Requeue a dead job for a fresh round of attempts
    Retry { job_id: String },

    /// Delete every job in the dead letter queue
    Clear {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show the current configuration
    Show,

    /// Set a configuration value
    Set { key: String, value: String },

    /// Reset the configuration to its defaults
    Reset {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

impl Cli {
    pub async fn run() -> anyhow::Result<()> {
        let Cli {
            config: config_path,
            command,
        } = Cli::parse();
        let mut config = Config::load(&config_path);

        match command {
            Commands::Enqueue { spec } => jobs::enqueue(&config, &spec).await,
            Commands::Status { verbose } => jobs::status(&config, verbose).await,
            Commands::List {
                state,
                limit,
                verbose,
            } => jobs::list(&config, state.as_deref(), limit, verbose).await,
            Commands::Worker { cmd } => match cmd {
                WorkerCommand::Start { count } => {
                    workers::start(&config, &config_path, count).await
                }
                WorkerCommand::Run { worker_id } => workers::run(&config, &worker_id).await,
            },
            Commands::Dlq { cmd } => match cmd {
                DlqCommand::List { limit } => dlq::list(&config, limit).await,
                DlqCommand::Retry { job_id } => dlq::retry(&config, &job_id).await,
                DlqCommand::Clear { yes } => dlq::clear(&config, yes).await,
            },
            Commands::Config { cmd } => match cmd {
                ConfigCommand::Show => {
                    settings::show(&config);
                    Ok(())
                }
                ConfigCommand::Set { key, value } => settings::set(&mut config, &key, &value),
                ConfigCommand::Reset { yes } => settings::reset(&mut config, yes),
            },
        }
    }
}
