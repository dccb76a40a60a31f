//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::{DbError, ErrorKind};

/// Map a database error to a one-line message prefixed with its stable kind.
pub fn map_error(e: &DbError) -> String {
    let kind = match e.kind() {
        ErrorKind::Conflict => "conflict",
        ErrorKind::NotFound => "not found",
        ErrorKind::Forbidden => "forbidden",
        ErrorKind::InvalidOperation => "invalid operation",
        ErrorKind::WrongFormat => "wrong format",
        ErrorKind::Busy => "busy",
        ErrorKind::TransactionInProgress => "transaction in progress",
        ErrorKind::Storage => "storage",
        ErrorKind::Config => "config",
    };
    format!("error ({}): {}", kind, e)
}
