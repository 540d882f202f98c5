//! Yardline - backend configuration diagnostics
//!
//! Shows which backend the app would talk to and where that came from.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use yardline::config::{self, encode_override, DotenvFile, LaunchContext, Resolver};
use yardline::observability::init_tracing;
use yardline::{BackendClient, ResolvedConfig};

/// Yardline backend configuration diagnostics
#[derive(Parser, Debug)]
#[command(name = "yardline")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Launch URL whose `config` query parameter may carry an override
    #[arg(long, env = "YARDLINE_LAUNCH_URL", global = true)]
    launch_url: Option<String>,

    /// Read environment values from this file instead of the process environment
    #[arg(long, env = "YARDLINE_ENV_FILE", global = true)]
    env_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "YARDLINE_LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, env = "YARDLINE_LOG_JSON", global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve and print the backend configuration
    Resolve {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print a launch override value for a backend url and public key
    EncodeOverride { backend_url: String, api_key: String },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_json);

    match &cli.command {
        Command::Resolve { json } => {
            let launch = match &cli.launch_url {
                Some(url) => LaunchContext::from_url(url)?,
                None => LaunchContext::empty(),
            };
            let resolved = resolve(&cli, launch)?;
            print_config(&resolved, *json)?;
        }
        Command::EncodeOverride {
            backend_url,
            api_key,
        } => {
            println!("{}", encode_override(backend_url, api_key));
        }
    }

    Ok(())
}

fn resolve(cli: &Cli, launch: LaunchContext) -> anyhow::Result<ResolvedConfig> {
    if let Some(path) = &cli.env_file {
        let env = DotenvFile::from_path(path)
            .with_context(|| format!("loading env file {}", path.display()))?;
        tracing::debug!(vars = env.len(), "Using env file snapshot");
        return Ok(Resolver::new(env).with_launch(launch).resolve());
    }

    config::load_dotenv();
    Ok(config::init(&launch).clone())
}

fn print_config(resolved: &ResolvedConfig, json: bool) -> anyhow::Result<()> {
    let client_available = BackendClient::from_config(resolved).is_some();

    if json {
        let out = serde_json::json!({
            "backend_url": resolved.backend_url,
            "api_key": resolved.masked_key(),
            "admin_contact": resolved.admin_contact,
            "source": resolved.source,
            "rest_endpoint": resolved.rest_endpoint(),
            "functions_endpoint": resolved.functions_endpoint(),
            "client_available": client_available,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("source:             {}", resolved.source);
        println!("backend url:        {}", resolved.backend_url);
        println!("public key:         {}", resolved.masked_key());
        println!("admin contact:      {}", resolved.admin_contact);
        println!("rest endpoint:      {}", resolved.rest_endpoint());
        println!("functions endpoint: {}", resolved.functions_endpoint());
        println!("client available:   {}", client_available);
    }

    Ok(())
}
