use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use voxdesk::app::{self, Overrides, WhisperFactory};
use voxdesk::cli::{Cli, Commands, ConfigAction, LogsAction, StoreAction};
use voxdesk::config::Config;
use voxdesk::ipc::Response;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Listen {
            device,
            model,
            language,
        } => {
            let overrides = Overrides {
                device,
                model,
                language,
                tail_padding: None,
            };
            let config = overrides.apply(load_config(cli.config.as_deref())?)?;
            init_logging(&config, cli.verbose);
            app::run_listen(&config, cli.quiet).await?;
        }
        Commands::Decode {
            file,
            model,
            language,
            tail_padding,
        } => {
            let overrides = Overrides {
                device: None,
                model,
                language,
                tail_padding,
            };
            let config = overrides.apply(load_config(cli.config.as_deref())?)?;
            init_logging(&config, cli.verbose);
            let finals = tokio::task::spawn_blocking(move || {
                app::run_decode(&config, &file, WhisperFactory::new())
            })
            .await
            .context("decode task failed")??;
            if finals.is_empty() && !cli.quiet {
                eprintln!("{}", "No speech recognized.".dimmed());
            }
        }
        Commands::Devices => {
            app::run_devices()?;
        }
        Commands::Serve { socket } => {
            let config = load_config(cli.config.as_deref())?;
            config.validate()?;
            let logger = app::setup_logging(&config, cli.verbose)
                .context("Failed to set up file logging")?;
            if !cli.quiet {
                eprintln!("Log file: {}", logger.current_path().display());
            }
            app::run_serve(&config, socket, logger).await?;
        }
        Commands::Invoke { request, socket } => {
            let config = load_config(cli.config.as_deref())?;
            let socket = socket.unwrap_or_else(|| config.socket_path());
            handle_invoke(&socket, &request).await;
        }
        Commands::Store { action } => {
            let config = load_config(cli.config.as_deref())?;
            handle_store_command(&config, action)?;
        }
        Commands::Logs { action } => {
            let config = load_config(cli.config.as_deref())?;
            match action {
                LogsAction::Path => println!("{}", app::log_file_path(&config).display()),
                LogsAction::Prune { days } => {
                    let removed = app::prune_logs(&config, days)?;
                    for path in &removed {
                        println!("{}", path.display());
                    }
                    if !cli.quiet {
                        eprintln!("Removed {} log file(s).", removed.len());
                    }
                }
            }
        }
        Commands::Config { action } => {
            handle_config_command(action, cli.config.as_deref())?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "voxdesk", &mut std::io::stdout());
        }
    }

    Ok(())
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config)
/// 2. Default config path (~/.config/voxdesk/config.toml)
/// 3. Built-in defaults with environment variable overrides
fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path).with_context(|| format!("Failed to load {}", path.display()))?
    } else {
        Config::load_or_default(&Config::default_path())?
    };

    Ok(config.with_env_overrides())
}

/// File logging for interactive commands; a broken log dir is not fatal here.
fn init_logging(config: &Config, verbose: u8) {
    if let Err(e) = app::setup_logging(config, verbose) {
        eprintln!("{}", format!("Warning: file logging disabled: {}", e).yellow());
    }
}

fn handle_store_command(config: &Config, action: StoreAction) -> Result<()> {
    match action {
        StoreAction::Get { key } => match app::store_get(config, &key)? {
            Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
            None => {
                eprintln!("{}", format!("No value for '{}'", key).dimmed());
                std::process::exit(1);
            }
        },
        StoreAction::Set {
            key,
            value,
            expires,
            once,
        } => {
            app::store_set(config, &key, &value, expires, once)?;
            println!("Set {}", key.green());
        }
        StoreAction::Remove { key } => {
            if app::store_remove(config, &key)? {
                println!("Removed {}", key.green());
            } else {
                eprintln!("{}", format!("No value for '{}'", key).dimmed());
            }
        }
        StoreAction::All => {
            println!("{}", serde_json::to_string_pretty(&app::store_all(config)?)?);
        }
    }
    Ok(())
}

fn handle_config_command(action: ConfigAction, custom_path: Option<&Path>) -> Result<()> {
    let config_path = custom_path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path);

    match action {
        ConfigAction::Path => println!("{}", config_path.display()),
        ConfigAction::Show => {
            let config = load_config(custom_path)?;
            print!(
                "{}",
                toml::to_string_pretty(&config).context("Failed to render configuration")?
            );
        }
    }
    Ok(())
}

/// Send one request to the host and render its reply.
async fn handle_invoke(socket: &Path, request: &str) {
    match app::run_invoke(socket, request).await {
        Ok(None) => println!("{}", "sent".green()),
        Ok(Some(response)) => render_response(response),
        Err(e) => {
            eprintln!("{}", format!("Failed to talk to host: {}", e).red());
            eprintln!("Is the host running? Start it with: voxdesk serve");
            std::process::exit(1);
        }
    }
}

fn render_response(response: Response) {
    match response {
        Response::Ok => println!("{}", "ok".green()),
        Response::Value { value } => match value {
            Some(value) => println!("{}", value),
            None => println!("{}", "null".dimmed()),
        },
        Response::Values { values } => {
            for (key, value) in values {
                println!("{} {}", key.dimmed(), value);
            }
        }
        Response::Path { path } => println!("{}", path.display()),
        Response::Devices { devices } => {
            for device in devices {
                println!("{} {}", device.interface.dimmed(), device.mac);
            }
        }
        Response::Events { events } => {
            for event in events {
                if event.is_final() {
                    println!("{} {}", event.segment_index(), event.text());
                } else {
                    println!(
                        "{} {}",
                        event.segment_index().dimmed(),
                        event.text().dimmed()
                    );
                }
            }
        }
        Response::Transcript { segments } => {
            for (index, text) in segments.iter().enumerate() {
                println!("{} {}", index, text);
            }
        }
        Response::Error { message } => {
            eprintln!("{}", format!("Error: {}", message).red());
            std::process::exit(1);
        }
    }
}
