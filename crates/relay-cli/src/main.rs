mod cmd;
mod output;
mod settings;

use clap::{Parser, Subcommand};
use settings::ConfigArgs;

#[derive(Parser)]
#[command(
    name = "sonar-relay",
    about = "Relay SonarQube quality findings into ServiceNow incidents",
    version,
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    settings: ConfigArgs,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP relay
    Serve {
        /// Port to listen on
        #[arg(long, env = "PORT", default_value = "3000")]
        port: u16,
    },

    /// Probe SonarQube and ServiceNow once and report
    Check,

    /// File incidents for the given project keys without running the server
    Create {
        /// SonarQube project keys (1-50)
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Print the effective configuration with secrets redacted
    Config,
}

fn main() {
    // A missing .env file is normal in production.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let result = match cli.command {
        Commands::Serve { port } => cmd::serve::run(&cli.settings, port),
        Commands::Check => cmd::check::run(&cli.settings, cli.json),
        Commands::Create { keys } => cmd::create::run(&cli.settings, keys, cli.json),
        Commands::Config => cmd::config::run(&cli.settings, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
