//! Event handling and user-facing output

use console::style;
use hops_events::{AppEvent, CleanupEvent, GeneralEvent, RelocateEvent};

/// Turns domain events into terminal output.
pub struct EventHandler {
    colors: bool,
    debug: bool,
}

impl EventHandler {
    pub fn new(colors: bool, debug: bool) -> Self {
        Self { colors, debug }
    }

    pub fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Relocate(event) => self.handle_relocate(event),
            AppEvent::Cleanup(event) => self.handle_cleanup(event),
            AppEvent::General(event) => self.handle_general(event),
        }
    }

    fn handle_relocate(&self, event: RelocateEvent) {
        match event {
            RelocateEvent::OperationStarted {
                operation,
                binary_path,
                ..
            } => {
                if self.debug {
                    eprintln!("{operation}: {binary_path}");
                }
            }
            RelocateEvent::OperationCompleted {
                operation,
                binary_path,
                duration_ms,
                ..
            } => {
                if self.debug {
                    eprintln!("{operation}: {binary_path} done in {duration_ms}ms");
                }
            }
            RelocateEvent::OperationFailed {
                operation,
                binary_path,
                error_message,
                ..
            } => {
                eprintln!(
                    "{} {operation} on {binary_path}: {error_message}",
                    self.paint("Warning:", |s| s.yellow().bold())
                );
            }
            RelocateEvent::KegRelocated {
                keg_path,
                files_changed,
            } => {
                println!(
                    "{} Relocated {keg_path} ({files_changed} files changed)",
                    self.paint("==>", |s| s.blue().bold())
                );
            }
        }
    }

    fn handle_cleanup(&self, event: CleanupEvent) {
        match event {
            CleanupEvent::PathRemoved {
                path,
                size_bytes,
                dry_run,
            } => {
                let size = format_size(size_bytes);
                if dry_run {
                    println!("Would remove: {path} ({size})");
                } else {
                    println!("Removing: {path}... ({size})");
                }
            }
            CleanupEvent::PathSkipped { path, reason } => {
                if self.debug {
                    eprintln!("Skipping {path}: {reason}");
                }
            }
            CleanupEvent::Completed {
                paths_removed,
                reclaimed_bytes,
                dry_run,
            } => {
                let size = format_size(reclaimed_bytes);
                let verb = if dry_run { "would free" } else { "freed" };
                println!(
                    "{} Removed {paths_removed} paths, {verb} approximately {size} of disk space",
                    self.paint("==>", |s| s.blue().bold())
                );
            }
        }
    }

    fn handle_general(&self, event: GeneralEvent) {
        match event {
            GeneralEvent::Message { text } => println!("{text}"),
            GeneralEvent::Warning { text } => {
                eprintln!("{} {text}", self.paint("Warning:", |s| s.yellow().bold()));
            }
        }
    }

    fn paint(
        &self,
        text: &str,
        f: impl Fn(console::StyledObject<String>) -> console::StyledObject<String>,
    ) -> String {
        if self.colors {
            f(style(text.to_string())).to_string()
        } else {
            text.to_string()
        }
    }
}

/// Human-readable byte count (decimal units, one fractional digit).
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes}B")
    } else {
        format!("{value:.1}{}", UNITS[unit])
    }
}
