//! toolshell - drive tool servers from a natural-language REPL

use clap::{Args, Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

mod commands;
mod render;

use commands::{
    init_command, parse_command, profiles_command, repl_command, run_command, status_command,
    tools_command, SessionOptions,
};

/// toolshell - natural language in, tool calls out
#[derive(Parser)]
#[command(name = "toolshell")]
#[command(about = "◆ Drive tool servers from a natural-language REPL")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default ~/.toolshell/config.json)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct SessionArgs {
    /// Client profile
    #[arg(short, long)]
    profile: Option<String>,
    /// Tool endpoint URL
    #[arg(long)]
    url: Option<String>,
    /// Use input as literal commands
    #[arg(long)]
    no_translator: bool,
    /// Translator context entry, key=value
    #[arg(long = "set", value_name = "KEY=VALUE")]
    context: Vec<String>,
}

impl From<SessionArgs> for SessionOptions {
    fn from(args: SessionArgs) -> Self {
        SessionOptions {
            profile: args.profile,
            url: args.url,
            no_translator: args.no_translator,
            context: args.context,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize config
    Init,
    /// Interactive session
    Repl {
        #[command(flatten)]
        session: SessionArgs,
    },
    /// Submit one request and exit
    Run {
        #[command(flatten)]
        session: SessionArgs,
        /// Request text
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Parse a command string offline
    Parse {
        /// Client profile
        #[arg(short, long)]
        profile: Option<String>,
        /// Command string
        command: String,
    },
    /// List tools offered by the endpoint
    Tools {
        /// Client profile
        #[arg(short, long)]
        profile: Option<String>,
        /// Tool endpoint URL
        #[arg(long)]
        url: Option<String>,
    },
    /// List client profiles
    Profiles,
    /// Show configuration status
    Status,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.config;
    let result = match cli.command {
        Commands::Init => init_command(config).await,
        Commands::Repl { session } => repl_command(config, session.into()).await,
        Commands::Run { session, text } => {
            match run_command(config, session.into(), text.join(" ")).await {
                Ok(true) => Ok(()),
                Ok(false) => std::process::exit(1),
                Err(e) => Err(e),
            }
        }
        Commands::Parse { profile, command } => parse_command(config, profile, command).await,
        Commands::Tools { profile, url } => tools_command(config, profile, url).await,
        Commands::Profiles => profiles_command(config).await,
        Commands::Status => status_command(config).await,
    };

    if let Err(e) = result {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}
