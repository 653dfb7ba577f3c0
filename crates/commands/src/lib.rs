#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Command registry for hops
//!
//! Knows every built-in subcommand (with aliases and a one-line
//! description), discovers external `hops-<name>` executables on a search
//! path, and resolves a user-typed name to whichever of the two backs it.

use std::path::{Path, PathBuf};

use hops_errors::CommandError;
use tracing::debug;

/// One built-in subcommand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinCommand {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub description: &'static str,
}

/// Built-in command table, the single source for CLI help and `commands`.
pub const BUILTINS: &[BuiltinCommand] = &[
    BuiltinCommand {
        name: "cleanup",
        aliases: &["clean"],
        description: "Remove stale downloads, old kegs, logs and lockfiles",
    },
    BuiltinCommand {
        name: "relocate",
        aliases: &["rel"],
        description: "Rewrite install names in a keg for a new prefix",
    },
    BuiltinCommand {
        name: "info",
        aliases: &["i"],
        description: "Show architecture slices and link metadata of a binary",
    },
    BuiltinCommand {
        name: "commands",
        aliases: &[],
        description: "List built-in and external commands",
    },
    BuiltinCommand {
        name: "command",
        aliases: &[],
        description: "Show the file backing a command",
    },
];

/// An external `hops-<name>` executable found on the search path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommand {
    pub name: String,
    pub path: PathBuf,
}

/// What a command name resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Internal(&'static BuiltinCommand),
    External(ExternalCommand),
    Unknown,
}

impl Resolved {
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }
}

/// Built-in lookup, following aliases to their canonical command.
#[must_use]
pub fn find_builtin(name: &str) -> Option<&'static BuiltinCommand> {
    BUILTINS
        .iter()
        .find(|cmd| cmd.name == name || cmd.aliases.contains(&name))
}

/// Command registry over a set of external search directories.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    search_dirs: Vec<PathBuf>,
}

impl Registry {
    /// Registry searching the given directories for external commands, in
    /// order. Earlier directories shadow later ones.
    #[must_use]
    pub fn new(search_dirs: Vec<PathBuf>) -> Self {
        Self { search_dirs }
    }

    /// Registry over the `PATH` environment variable.
    #[must_use]
    pub fn from_path_env() -> Self {
        let search_dirs = std::env::var_os("PATH")
            .map(|path| std::env::split_paths(&path).collect())
            .unwrap_or_default();
        Self { search_dirs }
    }

    /// Every external `hops-<name>` executable, sorted by name, first hit
    /// per name wins.
    pub async fn external_commands(&self) -> Vec<ExternalCommand> {
        let mut found: Vec<ExternalCommand> = Vec::new();
        for dir in &self.search_dirs {
            let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
                continue;
            };
            while let Ok(Some(entry)) = entries.next_entry().await {
                let path = entry.path();
                let Some(name) = external_name(&path) else {
                    continue;
                };
                if !is_executable(&path).await {
                    debug!(path = %path.display(), "skipping non-executable candidate");
                    continue;
                }
                if found.iter().any(|cmd| cmd.name == name) {
                    continue;
                }
                found.push(ExternalCommand {
                    name: name.to_string(),
                    path,
                });
            }
        }
        found.sort_by(|a, b| a.name.cmp(&b.name));
        found
    }

    /// Resolve a user-typed name: built-ins (and their aliases) first, then
    /// external executables.
    pub async fn resolve(&self, name: &str) -> Resolved {
        if let Some(builtin) = find_builtin(name) {
            return Resolved::Internal(builtin);
        }
        for dir in &self.search_dirs {
            let candidate = dir.join(format!("hops-{name}"));
            if is_executable(&candidate).await {
                return Resolved::External(ExternalCommand {
                    name: name.to_string(),
                    path: candidate,
                });
            }
        }
        Resolved::Unknown
    }

    /// Path of the file backing `name`, for the `command` operation.
    ///
    /// Built-ins are backed by the running executable.
    ///
    /// # Errors
    ///
    /// `UnknownCommand` when the name matches nothing.
    pub async fn command_path(&self, name: &str) -> Result<PathBuf, CommandError> {
        match self.resolve(name).await {
            Resolved::Internal(_) => {
                std::env::current_exe().map_err(|e| CommandError::ScanFailed {
                    path: "current executable".to_string(),
                    message: e.to_string(),
                })
            }
            Resolved::External(cmd) => Ok(cmd.path),
            Resolved::Unknown => Err(CommandError::UnknownCommand {
                name: name.to_string(),
            }),
        }
    }
}

fn external_name(path: &Path) -> Option<&str> {
    path.file_name()?.to_str()?.strip_prefix("hops-")
}

#[cfg(target_family = "unix")]
async fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    match tokio::fs::metadata(path).await {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

#[cfg(not(target_family = "unix"))]
async fn is_executable(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .is_ok_and(|meta| meta.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(target_family = "unix")]
    fn make_executable(path: &Path) {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn seed_external(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
        #[cfg(target_family = "unix")]
        make_executable(&path);
        path
    }

    #[test]
    fn builtin_lookup_follows_aliases() {
        assert_eq!(find_builtin("cleanup").unwrap().name, "cleanup");
        assert_eq!(find_builtin("clean").unwrap().name, "cleanup");
        assert_eq!(find_builtin("rel").unwrap().name, "relocate");
        assert!(find_builtin("uninstall").is_none());
    }

    #[tokio::test]
    async fn discovers_external_commands() {
        let dir = tempfile::tempdir().unwrap();
        seed_external(dir.path(), "hops-audit");
        seed_external(dir.path(), "hops-bundle");
        std::fs::write(dir.path().join("hops-notes.txt"), "not a command").unwrap();
        std::fs::write(dir.path().join("unrelated"), "nope").unwrap();

        let registry = Registry::new(vec![dir.path().to_path_buf()]);
        let externals = registry.external_commands().await;
        let names: Vec<_> = externals.iter().map(|c| c.name.as_str()).collect();
        // hops-notes.txt is not executable; unrelated has no hops- prefix.
        assert_eq!(names, vec!["audit", "bundle"]);
    }

    #[tokio::test]
    async fn earlier_search_dirs_shadow_later_ones() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let winner = seed_external(first.path(), "hops-audit");
        seed_external(second.path(), "hops-audit");

        let registry = Registry::new(vec![
            first.path().to_path_buf(),
            second.path().to_path_buf(),
        ]);
        let externals = registry.external_commands().await;
        assert_eq!(externals.len(), 1);
        assert_eq!(externals[0].path, winner);

        let resolved = registry.resolve("audit").await;
        assert_eq!(
            resolved,
            Resolved::External(ExternalCommand {
                name: "audit".to_string(),
                path: winner,
            })
        );
    }

    #[tokio::test]
    async fn resolve_prefers_builtins_and_reports_unknown() {
        let dir = tempfile::tempdir().unwrap();
        seed_external(dir.path(), "hops-cleanup");
        let registry = Registry::new(vec![dir.path().to_path_buf()]);

        assert!(matches!(
            registry.resolve("cleanup").await,
            Resolved::Internal(cmd) if cmd.name == "cleanup"
        ));
        assert!(registry.resolve("missing").await.is_unknown());
    }

    #[tokio::test]
    async fn command_path_resolves_or_fails() {
        let dir = tempfile::tempdir().unwrap();
        let external = seed_external(dir.path(), "hops-audit");
        let registry = Registry::new(vec![dir.path().to_path_buf()]);

        assert_eq!(registry.command_path("audit").await.unwrap(), external);
        assert!(registry.command_path("info").await.is_ok());
        assert!(matches!(
            registry.command_path("missing").await.unwrap_err(),
            CommandError::UnknownCommand { .. }
        ));
    }
}
