//! Crate-wide error taxonomy and formatting.

use std::fmt;

use crate::styling::{ERROR, HINT, format_with_gutter};

/// Unified error type for everything the library layer can fail with.
///
/// Call sites outside the core (CLI argument handling, top-level `main`) use
/// `anyhow::Error` and convert at the boundary; internal operations return
/// `Result<T, GistoreError>` so the exit-code mapping in [`GistoreError::exit_code`]
/// stays exhaustive.
#[derive(Debug)]
pub enum GistoreError {
    /// An abstract driver operation with no concrete implementation was invoked.
    NotImplemented(String),
    /// An external command failed and was not matched by a success predicate.
    CommandError {
        command: String,
        status: Option<i32>,
        output: String,
    },
    /// The DVCS driver was asked to operate on a task that has not been `init`'d.
    UninitializedRepository { task: String },
    /// The mount engine or `main.rootonly` enforcement refused the operation.
    PermissionDenied { reason: String },
    /// The task resolver could not find a task by name or path.
    TaskNotExists { name: String },
    /// `init` was run against a task that already exists.
    TaskAlreadyExists { name: String },
    /// A named lock (`mount` or `commit`) is already held.
    LockError { event: String, holder_pid: Option<u32> },
}

impl GistoreError {
    /// Stable process exit code for this error, distinct from the generic `1`
    /// used for `anyhow`-wrapped failures that never reach the taxonomy.
    pub fn exit_code(&self) -> i32 {
        match self {
            GistoreError::LockError { .. } => 3,
            GistoreError::TaskNotExists { .. } => 4,
            GistoreError::TaskAlreadyExists { .. } => 5,
            GistoreError::UninitializedRepository { .. } => 6,
            GistoreError::PermissionDenied { .. } => 7,
            GistoreError::NotImplemented(_) => 70,
            GistoreError::CommandError { .. } => 1,
        }
    }
}

impl fmt::Display for GistoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GistoreError::NotImplemented(what) => {
                write!(f, "{ERROR}not implemented: {what}{ERROR:#}")
            }
            GistoreError::CommandError {
                command,
                status,
                output,
            } => {
                let status = status
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".into());
                if output.trim().is_empty() {
                    write!(f, "{ERROR}command failed (exit {status}): {command}{ERROR:#}")
                } else {
                    write!(
                        f,
                        "{ERROR}command failed (exit {status}): {command}{ERROR:#}\n{}",
                        format_with_gutter(output.trim_end(), "")
                    )
                }
            }
            GistoreError::UninitializedRepository { task } => {
                write!(
                    f,
                    "{ERROR}task '{task}' has not been initialized{ERROR:#}\n\n{HINT}run `gistore init` to create it{HINT:#}"
                )
            }
            GistoreError::PermissionDenied { reason } => {
                write!(f, "{ERROR}permission denied: {reason}{ERROR:#}")
            }
            GistoreError::TaskNotExists { name } => {
                write!(f, "{ERROR}no such task: {name}{ERROR:#}")
            }
            GistoreError::TaskAlreadyExists { name } => {
                write!(
                    f,
                    "{ERROR}task already exists: {name}{ERROR:#}\n\n{HINT}remove it first, or pick a different task name{HINT:#}"
                )
            }
            GistoreError::LockError { event, holder_pid } => match holder_pid {
                Some(pid) => write!(
                    f,
                    "{ERROR}lock '{event}' is held by pid {pid}{ERROR:#}\n\n{HINT}another gistore process is already running; wait for it to finish{HINT:#}"
                ),
                None => write!(
                    f,
                    "{ERROR}lock '{event}' is held{ERROR:#}\n\n{HINT}another gistore process is already running; wait for it to finish{HINT:#}"
                ),
            },
        }
    }
}

impl std::error::Error for GistoreError {}

pub type Result<T> = std::result::Result<T, GistoreError>;
