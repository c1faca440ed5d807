mod cli;
mod commands;
mod config;
mod prompt;
mod storage;

use std::io;

use crate::cli::{Command, ConfigCommand};
use crate::prompt::TerminalPrompt;
use clap::Parser;
use color_eyre::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Entry point wiring the CLI to the library manager.
fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    let config = config::load()?;
    match cli.command.unwrap_or(Command::Show { name: None }) {
        Command::Version => print_version(),
        Command::Config(ConfigCommand::Init) => init_config(&config)?,
        command => run_library_command(command, &config)?,
    }

    Ok(())
}

fn init_tracing() {
    // Respect user-provided filters; default to warn so command output stays readable.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("librarian {}", env!("CARGO_PKG_VERSION"));
}

fn init_config(config: &config::Config) -> Result<()> {
    let path = config::write_default_if_missing(config)?;
    println!("Config initialized at {}", path.display());
    Ok(())
}

fn run_library_command(command: Command, config: &config::Config) -> Result<()> {
    let mut manager = storage::manager_from_config(config, TerminalPrompt)?;
    let mut out = io::stdout().lock();

    match command {
        Command::Show { name } => commands::show(&mut manager, name.as_deref(), &mut out)?,
        Command::List => commands::list(&manager, &mut out)?,
        Command::New { name, encrypt } => {
            commands::create(&mut manager, &name, encrypt, &mut TerminalPrompt, &mut out)?
        }
        Command::Meta { name, key, value } => {
            commands::meta(&mut manager, &name, &key, value, &mut out)?
        }
        Command::Headers { name, toggle } => {
            commands::headers(&mut manager, &name, &toggle, &mut out)?
        }
        Command::Passwd { name, remove } => {
            commands::passwd(&mut manager, &name, remove, &mut TerminalPrompt, &mut out)?
        }
        Command::Version | Command::Config(_) => {}
    }

    // Surface a failed final save instead of leaving it to Drop.
    manager.close()?;
    Ok(())
}
