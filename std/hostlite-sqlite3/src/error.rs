///
/// Error types for the SQLite bridge.
///
/// Every failure crosses the boundary as one `Error` value. Engine failures
/// always carry the status code together with the canonical message for
/// that code, whether they come from open, prepare, bind, step or close.
///

use std::fmt;

use hostlite_core::{
    ERROR_KIND_ARGUMENT_ERROR, ERROR_KIND_CONFIG_ERROR, ERROR_KIND_DB_ERROR,
    ERROR_KIND_DECODE_ERROR, ERROR_KIND_INVALID_HANDLE,
};
use thiserror::Error;

/// Which registry a handle belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    Connection,
    Statement,
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandleKind::Connection => f.write_str("connection"),
            HandleKind::Statement => f.write_str("statement"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// A non-OK status returned by the engine. `message` is the engine's
    /// text for `code`; `detail` is the connection's own diagnostic, when
    /// one was available.
    #[error("{message} (code {code}){}", format_detail(detail))]
    Sqlite {
        code: i32,
        message: String,
        detail: Option<String>,
    },

    #[error("Invalid {kind} handle {handle}")]
    InvalidHandle { kind: HandleKind, handle: i64 },

    #[error("Unknown type tag {tag} in column {column}")]
    UnknownColumnType { column: usize, tag: i32 },

    #[error("SQL text contains no statement")]
    EmptyStatement,

    #[error("Character {ch:?} cannot be encoded as Latin-1")]
    Unencodable { ch: char },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Too many live {kind} handles")]
    RegistryFull { kind: HandleKind },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

fn format_detail(detail: &Option<String>) -> String {
    match detail {
        Some(d) => format!(": {}", d),
        None => String::new(),
    }
}

impl Error {
    /// Host error kind ID (see `hostlite_core::exception`)
    pub fn kind_id(&self) -> i64 {
        match self {
            Error::Sqlite { .. } => ERROR_KIND_DB_ERROR,
            Error::InvalidHandle { .. } => ERROR_KIND_INVALID_HANDLE,
            Error::UnknownColumnType { .. } | Error::Unencodable { .. } => ERROR_KIND_DECODE_ERROR,
            Error::Config(_) | Error::Io(_) => ERROR_KIND_CONFIG_ERROR,
            Error::EmptyStatement | Error::InvalidArgument(_) | Error::RegistryFull { .. } => {
                ERROR_KIND_ARGUMENT_ERROR
            }
        }
    }

    /// Engine status code, or -1 for failures raised by this layer
    pub fn code(&self) -> i64 {
        match self {
            Error::Sqlite { code, .. } => *code as i64,
            _ => -1,
        }
    }

    pub fn is_invalid_handle(&self) -> bool {
        matches!(self, Error::InvalidHandle { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
