//! `labelrelayctl`: run annotation batches from the command line.

mod cli;

use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{BackendChoice, ConfigOptions, RunOptions, RunOverrides};

#[derive(Parser)]
#[command(
    name = "labelrelayctl",
    version,
    about = "Batch records into human annotation tasks and merge the results"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Clone)]
struct ConfigArgs {
    /// Configuration file (TOML or JSON)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Environment file loaded before reading variables
    #[arg(long)]
    env_file: Option<PathBuf>,
}

impl From<ConfigArgs> for ConfigOptions {
    fn from(args: ConfigArgs) -> Self {
        ConfigOptions {
            config_path: args.config,
            env_file: args.env_file,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendArg {
    Memory,
    LabelStudio,
}

impl From<BackendArg> for BackendChoice {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Memory => BackendChoice::Memory,
            BackendArg::LabelStudio => BackendChoice::LabelStudio,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Submit JSONL records for annotation and write the merged records
    Run {
        #[command(flatten)]
        config: ConfigArgs,
        /// Input JSONL file, one record per line (`-` for stdin)
        #[arg(long, short)]
        input: PathBuf,
        /// Output JSONL file (defaults to stdout)
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Wait for annotations before writing output
        #[arg(long, conflicts_with = "no_wait")]
        wait: bool,
        /// Return immediately with whatever annotations already exist
        #[arg(long)]
        no_wait: bool,
        /// Maximum time to wait, e.g. `90s` or `1h`
        #[arg(long, value_parser = humantime::parse_duration)]
        timeout: Option<Duration>,
        /// Delay between status checks, e.g. `30s`
        #[arg(long, value_parser = humantime::parse_duration)]
        poll_interval: Option<Duration>,
        /// Records grouped into one task
        #[arg(long)]
        samples_per_task: Option<usize>,
        /// Tasks submitted per backend call
        #[arg(long)]
        max_tasks_per_batch: Option<usize>,
        #[arg(long, value_enum)]
        backend: Option<BackendArg>,
        /// Reuse an existing backend project
        #[arg(long)]
        project_id: Option<i64>,
        #[arg(long)]
        project_name: Option<String>,
    },
    /// Print the resolved configuration as TOML
    Config {
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Validate configuration and connect to the backend
    Check {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so JSONL output on stdout stays clean.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            input,
            output,
            wait,
            no_wait,
            timeout,
            poll_interval,
            samples_per_task,
            max_tasks_per_batch,
            backend,
            project_id,
            project_name,
        } => {
            let wait = match (wait, no_wait) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            let opts = RunOptions {
                config: config.into(),
                input,
                output,
                overrides: RunOverrides {
                    wait,
                    timeout,
                    poll_interval,
                    samples_per_task,
                    max_tasks_per_batch,
                    project_id,
                    project_name,
                    backend: backend.map(Into::into),
                },
            };
            cli::run_annotation(&opts).await
        }
        Command::Config { config } => {
            println!("{}", cli::render_config(&config.into())?);
            Ok(())
        }
        Command::Check { config } => {
            println!("{}", cli::check(&config.into()).await?);
            Ok(())
        }
    }
}
