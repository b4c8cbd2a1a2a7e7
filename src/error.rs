use std::io;

use thiserror::Error;

use crate::status;

/// Failures while preparing or starting a pipeline stage.
///
/// None of these unwind sibling stages: the executor turns them into the
/// failing stage's exit status, except [`ExecError::PipelineBuiltin`] and
/// [`ExecError::Pipe`], which abort the whole pipeline before anything runs.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("{0}: cannot be used in pipeline")]
    PipelineBuiltin(String),

    #[error("{0}: command not found")]
    NotFound(String),

    #[error("{0}: Permission denied")]
    PermissionDenied(String),

    #[error("{command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("{path}: {source}")]
    Redirect {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to create pipe: {0}")]
    Pipe(#[source] io::Error),
}

impl ExecError {
    /// The exit status this failure contributes.
    pub fn status(&self) -> i32 {
        match self {
            ExecError::NotFound(_) => status::NOT_FOUND,
            ExecError::PermissionDenied(_) | ExecError::Spawn { .. } => status::NOT_EXECUTABLE,
            ExecError::PipelineBuiltin(_) | ExecError::Redirect { .. } | ExecError::Pipe(_) => {
                status::FAILURE
            }
        }
    }

    /// Classify an error returned by spawning `command`.
    pub fn from_spawn(command: &str, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => ExecError::NotFound(command.to_string()),
            io::ErrorKind::PermissionDenied => ExecError::PermissionDenied(command.to_string()),
            _ => ExecError::Spawn {
                command: command.to_string(),
                source,
            },
        }
    }

    /// Write the diagnostic to the shell's own stderr.
    pub fn report(&self) {
        eprintln!("pipesh: {self}");
    }
}
