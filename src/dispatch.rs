use std::path::{Path, PathBuf};

use crate::builtins::Builtin;

/// How a stage's command is run, decided once per stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Runs inside the shell process.
    Builtin(Builtin),
    /// Spawned from the resolved executable path.
    External(PathBuf),
    /// Neither a builtin nor anything on `PATH`.
    NotFound,
}

/// Resolve a command name against the builtin table, then `PATH`.
///
/// Names containing a path separator skip the `PATH` search and resolve to
/// the file itself when it exists; whether it can actually be executed is
/// left to the spawn.
pub fn resolve(command: &str) -> Dispatch {
    if let Some(builtin) = Builtin::from_name(command) {
        return Dispatch::Builtin(builtin);
    }

    if command.is_empty() {
        return Dispatch::NotFound;
    }

    if command.contains('/') || (cfg!(windows) && command.contains('\\')) {
        let path = Path::new(command);
        return if path.exists() {
            Dispatch::External(path.to_path_buf())
        } else {
            Dispatch::NotFound
        };
    }

    match which::which(command) {
        Ok(path) => Dispatch::External(path),
        Err(err) => {
            log::debug!("{command}: not on PATH: {err}");
            Dispatch::NotFound
        }
    }
}
