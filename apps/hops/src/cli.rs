//! Command line interface definition

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use hops_cleanup::Prune;
use hops_config::ColorChoice;
use hops_macho::BackendStrategy;

/// hops - macOS package maintenance tool
#[derive(Parser)]
#[command(name = "hops")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "macOS package maintenance tool: keg relocation and cleanup")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Global arguments available for all commands
#[derive(Parser)]
pub struct GlobalArgs {
    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Color output control (always, auto, never)
    #[arg(long, global = true, value_parser = parse_color)]
    pub color: Option<ColorChoice>,

    /// Use alternate config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Remove stale downloads, old kegs, logs and lockfiles
    #[command(alias = "clean")]
    Cleanup {
        /// Report what would be removed without touching anything
        #[arg(long)]
        dry_run: bool,

        /// Remove cache entries older than DAYS (or "all")
        #[arg(long, value_name = "DAYS|all", value_parser = parse_prune)]
        prune: Option<Prune>,

        /// Also remove cached artifacts of packages no longer installed
        #[arg(long)]
        scrub: bool,
    },

    /// Rewrite install names in a keg for a new prefix
    #[command(alias = "rel")]
    Relocate {
        /// Keg directory to relocate
        keg: PathBuf,

        /// Prefix recorded in the binaries
        #[arg(long, value_name = "PREFIX")]
        from: String,

        /// Prefix to record instead
        #[arg(long, value_name = "PREFIX")]
        to: String,

        /// Mach-O backend (native, external-tool, verified)
        #[arg(long, value_parser = parse_backend)]
        backend: Option<BackendStrategy>,

        /// Keep going past per-file edit failures
        #[arg(long)]
        continue_on_error: bool,
    },

    /// Show architecture slices and link metadata of a binary
    #[command(alias = "i")]
    Info {
        /// Path to a Mach-O file
        path: PathBuf,

        /// Mach-O backend (native, external-tool, verified)
        #[arg(long, value_parser = parse_backend)]
        backend: Option<BackendStrategy>,
    },

    /// List built-in and external commands
    Commands {
        /// Print a flat list without group headers
        #[arg(long)]
        quiet: bool,

        /// Include aliases of built-in commands
        #[arg(long)]
        include_aliases: bool,
    },

    /// Show the file backing a command
    Command {
        /// Command name
        name: String,
    },
}

fn parse_color(s: &str) -> Result<ColorChoice, String> {
    s.parse()
}

fn parse_prune(s: &str) -> Result<Prune, String> {
    s.parse().map_err(|e: hops_errors::CleanupError| e.to_string())
}

fn parse_backend(s: &str) -> Result<BackendStrategy, String> {
    s.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cleanup_flags() {
        let cli = Cli::parse_from(["hops", "cleanup", "--dry-run", "--prune", "30"]);
        match cli.command {
            Commands::Cleanup {
                dry_run,
                prune,
                scrub,
            } => {
                assert!(dry_run);
                assert_eq!(prune, Some(Prune::Days(30)));
                assert!(!scrub);
            }
            _ => panic!("expected cleanup"),
        }

        let cli = Cli::parse_from(["hops", "clean", "--prune", "all", "--scrub"]);
        assert!(matches!(
            cli.command,
            Commands::Cleanup {
                prune: Some(Prune::All),
                scrub: true,
                ..
            }
        ));

        assert!(Cli::try_parse_from(["hops", "cleanup", "--prune", "soon"]).is_err());
    }

    #[test]
    fn parses_relocate_with_backend() {
        let cli = Cli::parse_from([
            "hops", "rel", "/opt/hops/Cellar/wget/1.21.4", "--from", "@@PREFIX@@", "--to",
            "/opt/hops", "--backend", "verified",
        ]);
        match cli.command {
            Commands::Relocate { keg, backend, .. } => {
                assert_eq!(keg, PathBuf::from("/opt/hops/Cellar/wget/1.21.4"));
                assert_eq!(backend, Some(BackendStrategy::Verified));
            }
            _ => panic!("expected relocate"),
        }
    }

    #[test]
    fn global_flags_work_after_subcommand() {
        let cli = Cli::parse_from(["hops", "info", "/bin/ls", "--color", "never", "--debug"]);
        assert_eq!(cli.global.color, Some(ColorChoice::Never));
        assert!(cli.global.debug);
    }
}
