//! Binary entrypoint for factorio-supervisor.
//!
//! Commands:
//! - `run [--no-privilege-drop] -- <server argv...>` - supervise the server
//! - `init` - write a starter config file
//! - `saves [--json]` - print the save listing shown by `!savelist`
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::{error, info};

use factorio_supervisor::commands::saves::list_saves;
use factorio_supervisor::config::Config;
use factorio_supervisor::handlers::HandlerSet;
use factorio_supervisor::supervisor::privileges::drop_privileges;
use factorio_supervisor::supervisor::signals::spawn_signal_listener;
use factorio_supervisor::supervisor::{LineReader, Supervisor};

#[derive(Parser)]
#[command(name = "factorio-supervisor")]
#[command(about = "Supervise a headless Factorio server and react to its console")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "supervisor.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch the server and relay its console until it exits
    Run {
        /// Keep the current user even when running as root
        #[arg(long)]
        no_privilege_drop: bool,

        /// Server command line
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        argv: Vec<String>,
    },
    /// Write a default configuration file
    Init,
    /// List save games, newest first
    Saves {
        /// Print JSON instead of chat-style lines
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            init_logging(&None, cli.verbose);
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);
        }
        Commands::Saves { json } => {
            let config = load_config(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            let saves = list_saves(&config.saves.dir)
                .map_err(|e| anyhow!("Failed to list {}: {}", config.saves.dir.display(), e))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&saves)?);
            } else {
                let now = chrono::Utc::now();
                for save in &saves {
                    println!("{}", save.describe(now));
                }
            }
        }
        Commands::Run {
            no_privilege_drop,
            argv,
        } => {
            let config = load_config(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            info!("Starting factorio-supervisor v{}", env!("CARGO_PKG_VERSION"));

            if !no_privilege_drop {
                drop_privileges(&config.supervisor.run_as_user)?;
            }

            let supervisor = Supervisor::new(&config, argv);
            spawn_signal_listener(supervisor.clone())?;

            let handlers = HandlerSet::standard(&config);
            info!(
                "Line handlers: {:?}; chat handlers: {:?}",
                handlers.line_handler_names(),
                handlers.chat_handler_names()
            );
            let operator = config
                .supervisor
                .forward_stdin
                .then(|| LineReader::spawn("operator", tokio::io::stdin()));

            let result = supervisor.run(handlers, operator).await;
            // The operator stdin reader may be parked in a blocking read that
            // would hold up runtime shutdown; leave right away.
            if let Err(e) = result {
                error!("{}", e);
                std::process::exit(1);
            }
            std::process::exit(0);
        }
    }

    Ok(())
}

async fn load_config(path: &str) -> Result<Config> {
    let mut config = Config::load_or_default(path).await?;
    config.apply_env();
    config.validate()?;
    Ok(config)
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity raises the configured level, never lowers it
    let configured = config
        .as_ref()
        .map(|cfg| cfg.logging.level_filter())
        .unwrap_or(log::LevelFilter::Info);
    let base_level = match verbosity {
        0 => configured,
        1 => configured.max(log::LevelFilter::Debug),
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let log_file = config
        .as_ref()
        .and_then(|cfg| cfg.logging.file.as_ref())
        .and_then(|file| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(file)
                .ok()
        });

    if let Some(f) = log_file {
        let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
        // Mirror to the console only when someone is watching it
        let is_tty = atty::is(atty::Stream::Stderr);
        builder.format(move |fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] {}", ts, record.level(), record.args());
            if let Ok(mut guard) = write_mutex.lock() {
                let _ = writeln!(guard, "{}", line);
            }
            if is_tty {
                writeln!(fmt, "{}", line)
            } else {
                Ok(())
            }
        });
    } else {
        builder.format(|fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
        });
    }
    let _ = builder.try_init();
}
