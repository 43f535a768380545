use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use convoy_lib::{Author, Config};

mod cmd;
mod output;

/// convoy - versioned topology and deployment orchestrator
#[derive(Parser)]
#[command(name = "convoy")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Data directory holding the registry and system repositories
  #[arg(long, global = true, default_value = ".convoy")]
  data_dir: PathBuf,

  /// Author name for repository commits
  #[arg(long, global = true, default_value = "convoy")]
  author: String,

  /// Author email for repository commits
  #[arg(long, global = true, default_value = "convoy@localhost")]
  email: String,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Register a new system and create its repository
  Init {
    /// Namespace the system belongs to
    namespace: String,
    /// System name
    name: String,
  },

  /// List registered systems
  Systems {
    /// Emit machine-readable JSON
    #[arg(long)]
    json: bool,
  },

  /// Commit the working tree as a new revision
  Commit {
    /// System id or namespace/name
    system: String,

    /// Revision description
    #[arg(short, long)]
    message: String,
  },

  /// List revisions of a system, newest first
  Revisions {
    /// System id or namespace/name
    system: String,

    /// Emit machine-readable JSON
    #[arg(long)]
    json: bool,
  },

  /// Print the document compiled for a target at a revision
  Show {
    /// System id or namespace/name
    system: String,

    /// Revision id, prefix, head/latest, or EDITS
    #[arg(default_value = "head")]
    revision: String,

    /// Deploy target whose document to read
    #[arg(long, default_value = "development")]
    target: String,
  },

  /// Move an environment's deployment pointer to a revision
  Mark {
    /// System id or namespace/name
    system: String,

    /// Revision id, prefix, head/latest, or EDITS
    revision: String,

    /// Environment to point at the revision
    env: String,

    /// User recorded in the audit timeline
    #[arg(long, default_value = "cli")]
    user: String,
  },

  /// Show deployment pointers of a system
  Status {
    /// System id or namespace/name
    system: String,

    /// Emit machine-readable JSON
    #[arg(long)]
    json: bool,
  },
}

fn main() -> ExitCode {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .without_time()
    .init();

  let cli = Cli::parse();
  let config = Config::new(&cli.data_dir, Author::new(&cli.author, &cli.email));

  match run(cli.command, config) {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      output::print_error(&format!("{err:#}"));
      ExitCode::FAILURE
    }
  }
}

fn run(command: Commands, config: Config) -> Result<()> {
  match command {
    Commands::Init { namespace, name } => cmd::cmd_init(config, &namespace, &name),
    Commands::Systems { json } => cmd::cmd_systems(config, json),
    Commands::Commit { system, message } => cmd::cmd_commit(config, &system, &message),
    Commands::Revisions { system, json } => cmd::cmd_revisions(config, &system, json),
    Commands::Show {
      system,
      revision,
      target,
    } => cmd::cmd_show(config, &system, &revision, &target),
    Commands::Mark {
      system,
      revision,
      env,
      user,
    } => cmd::cmd_mark(config, &system, &revision, &env, &user),
    Commands::Status { system, json } => cmd::cmd_status(config, &system, json),
  }
}
