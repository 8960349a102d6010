//! kdeploy - deploy projects of Kubernetes manifests.

mod commands;
mod docker;
mod observability;
mod printer;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::GlobalOptions;
use commands::lifecycle::Action;
use observability::{TracingConfig, init_tracing};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

/// kdeploy - bring a project of Kubernetes manifests up and down.
#[derive(Parser)]
#[command(name = "kdeploy")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to the kubeconfig file (defaults to ~/.kube/config)
    #[arg(long, env = "KUBECONFIG", global = true)]
    kubeconfig: Option<PathBuf>,

    /// Kubeconfig context to use
    #[arg(long, global = true)]
    context: Option<String>,

    /// Namespace overriding the project's own
    #[arg(short, long, global = true)]
    namespace: Option<String>,

    /// How long `wait` blocks before giving up (e.g. 30s, 15m, 1h)
    #[arg(long, default_value = "15m", value_parser = commands::parse_duration, global = true)]
    timeout: Duration,

    /// Template variable override (key=value, repeatable)
    #[arg(long = "variable", value_name = "KEY=VALUE", global = true)]
    variables: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create every asset of a project
    Up {
        /// Project folder or descriptor file
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Destroy every asset of a project
    Down {
        /// Project folder or descriptor file
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Destroy the services of a project
    DownServices {
        /// Project folder or descriptor file
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Replace update-capable assets in place
    Update {
        /// Project folder or descriptor file
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Move deployments listed under auto_updates to a new image tag
    Autoupdate {
        /// Project folder or descriptor file
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Tag to apply; the newest registry tag when omitted
        tag: Option<String>,
    },

    /// Wait for a job to finish
    Wait {
        /// Job name
        job: String,
    },

    /// Follow a pod's log until it finishes
    Log {
        /// Pod name
        pod: String,
    },

    /// Print the rendered project
    Debug {
        /// Project folder or descriptor file
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Show version information
    Version,
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let options = GlobalOptions {
        kubeconfig: cli.kubeconfig,
        context: cli.context,
        namespace: cli.namespace,
        timeout: cli.timeout,
        variables: cli.variables,
    };

    match cli.command {
        Commands::Up { path } => commands::lifecycle::run(&options, &path, Action::Up).await?,
        Commands::Down { path } => commands::lifecycle::run(&options, &path, Action::Down).await?,
        Commands::DownServices { path } => {
            commands::lifecycle::run(&options, &path, Action::DownServices).await?
        }
        Commands::Update { path } => {
            commands::lifecycle::run(&options, &path, Action::Update).await?
        }
        Commands::Autoupdate { path, tag } => {
            commands::autoupdate::run(&options, &path, tag.as_deref()).await?
        }
        Commands::Wait { job } => return commands::wait::run(&options, &job).await,
        Commands::Log { pod } => return commands::log::run(&options, &pod).await,
        Commands::Debug { path } => commands::debug::run(&options, &path)?,
        Commands::Version => commands::version::run()?,
    }
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_tracing(&TracingConfig::from_env(cli.verbose)) {
        eprintln!("Warning: {e:#}");
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
