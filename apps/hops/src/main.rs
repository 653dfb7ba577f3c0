//! hops - macOS package maintenance tool
//!
//! CLI front end over the hops crates: keg relocation, cache/cellar/log
//! cleanup, binary inspection and the command registry.

mod cli;
mod error;
mod events;

use std::process;
use std::sync::Arc;

use clap::Parser;
use tokio::select;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use hops_cleanup::Cleaner;
use hops_commands::{find_builtin, Registry, BUILTINS};
use hops_config::{ColorChoice, Config};
use hops_events::{AppEvent, EventReceiver, EventSender, GeneralEvent};
use hops_macho::{MachOBackend, OpContext, Relocator};

use crate::cli::{Cli, Commands};
use crate::error::CliError;
use crate::events::EventHandler;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.global.debug);

    if let Err(e) = run(cli).await {
        error!("application error: {e}");
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn init_tracing(debug: bool) {
    let default_directive = if debug { "hops=debug" } else { "hops=warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    info!("starting hops v{}", env!("CARGO_PKG_VERSION"));

    // Precedence: defaults < config file < environment < CLI flags.
    let mut config = Config::load_or_default(cli.global.config.as_deref()).await?;
    config.merge_env()?;

    let colors_enabled = match cli.global.color.unwrap_or(config.general.color) {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => console::Term::stdout().features().colors_supported(),
    };
    let mut event_handler = EventHandler::new(colors_enabled, cli.global.debug);

    let (event_sender, event_receiver) = hops_events::channel();
    execute_command_with_events(
        cli.command,
        &config,
        event_sender,
        event_receiver,
        &mut event_handler,
    )
    .await
}

/// Drive the command while draining the event channel concurrently.
async fn execute_command_with_events(
    command: Commands,
    config: &Config,
    event_sender: EventSender,
    mut event_receiver: EventReceiver,
    event_handler: &mut EventHandler,
) -> Result<(), CliError> {
    let mut command_future = Box::pin(execute_command(command, config, event_sender));

    loop {
        select! {
            result = &mut command_future => {
                // Drain any remaining events
                while let Ok(event) = event_receiver.try_recv() {
                    event_handler.handle_event(event);
                }
                return result;
            }

            event = event_receiver.recv() => {
                match event {
                    Some(event) => event_handler.handle_event(event),
                    None => { /* channel closed: keep waiting for the command */ }
                }
            }
        }
    }
}

fn message(sender: &EventSender, text: String) {
    hops_events::emit(Some(sender), AppEvent::General(GeneralEvent::Message { text }));
}

async fn execute_command(
    command: Commands,
    config: &Config,
    event_sender: EventSender,
) -> Result<(), CliError> {
    match command {
        Commands::Cleanup {
            dry_run,
            prune,
            scrub,
        } => {
            let cleaner = Cleaner::new(
                config.cache_path(),
                config.cellar_path(),
                config.logs_path(),
                config.prefix(),
            )
            .dry_run(dry_run)
            .prune(prune)
            .scrub(scrub)
            .scratch_dirs(config.cleanup.scratch_dirs.clone())
            .log_retention_days(config.cleanup.log_retention_days)
            .event_sender(Some(event_sender));

            cleaner.run().await?;
            Ok(())
        }

        Commands::Relocate {
            keg,
            from,
            to,
            backend,
            continue_on_error,
        } => {
            let strategy = backend.unwrap_or(config.macho.backend);
            let backend: Arc<dyn MachOBackend> =
                Arc::from(strategy.create(config.macho.strict));
            let ctx = OpContext::new(Some(event_sender.clone()));

            let relocator = Relocator::new(backend).continue_on_error(continue_on_error);
            let report = relocator.relocate_keg(&ctx, &keg, &from, &to).await?;
            message(
                &event_sender,
                format!(
                    "Scanned {} files, changed {}",
                    report.files_scanned, report.files_changed
                ),
            );
            Ok(())
        }

        Commands::Info { path, backend } => {
            let strategy = backend.unwrap_or(config.macho.backend);
            let backend = strategy.create(config.macho.strict);
            let ctx = OpContext::new(Some(event_sender.clone()));

            let slices = backend.slices(&ctx, &path).await?;
            let metadata = backend.link_metadata(&ctx, &path).await?;

            message(&event_sender, format!("{}:", path.display()));
            for slice in &slices {
                message(&event_sender, format!("  {} {}", slice.arch, slice.kind));
            }
            if let Some(id) = &metadata.dylib_id {
                message(&event_sender, format!("  id: {id}"));
            }
            if !metadata.linked_libraries.is_empty() {
                message(&event_sender, "  links:".to_string());
                for lib in &metadata.linked_libraries {
                    message(&event_sender, format!("    {lib}"));
                }
            }
            Ok(())
        }

        Commands::Commands {
            quiet,
            include_aliases,
        } => {
            let registry = Registry::from_path_env();
            let externals = registry.external_commands().await;

            if quiet {
                let mut names: Vec<String> =
                    BUILTINS.iter().map(|cmd| cmd.name.to_string()).collect();
                if include_aliases {
                    names.extend(
                        BUILTINS
                            .iter()
                            .flat_map(|cmd| cmd.aliases.iter().map(ToString::to_string)),
                    );
                }
                names.extend(externals.iter().map(|cmd| cmd.name.clone()));
                names.sort();
                names.dedup();
                for name in names {
                    message(&event_sender, name);
                }
            } else {
                message(&event_sender, "Built-in commands:".to_string());
                for cmd in BUILTINS {
                    message(
                        &event_sender,
                        format!("  {:<10} {}", cmd.name, cmd.description),
                    );
                }
                if include_aliases {
                    message(&event_sender, "Built-in aliases:".to_string());
                    for cmd in BUILTINS {
                        for alias in cmd.aliases {
                            message(&event_sender, format!("  {:<10} {}", alias, cmd.name));
                        }
                    }
                }
                if !externals.is_empty() {
                    message(&event_sender, "External commands:".to_string());
                    for cmd in &externals {
                        message(&event_sender, format!("  {}", cmd.name));
                    }
                }
            }
            Ok(())
        }

        Commands::Command { name } => {
            // Resolve aliases before heading to the filesystem.
            let canonical = find_builtin(&name).map_or(name, |cmd| cmd.name.to_string());
            let path = Registry::from_path_env().command_path(&canonical).await?;
            message(&event_sender, path.display().to_string());
            Ok(())
        }
    }
}
