use thiserror::Error;

/// Failure classes shared by the loader and the calculation engine.
///
/// These travel as the root cause inside `anyhow::Error`, so callers that
/// only want to print get the usual context chain, while callers that need
/// to distinguish a bad lookup from bad input can `downcast_ref`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DataError {
    /// A required lookup key has no match in its static table.
    #[error("no {table} entry for {key}")]
    MissingReference { table: &'static str, key: String },

    /// A town or alliance named in a request does not exist in the registry.
    #[error("unknown {entity} {key}")]
    UnknownEntity { entity: &'static str, key: String },

    /// A field could not be parsed during load.
    #[error("malformed {field}: {value:?}")]
    Malformed { field: &'static str, value: String },
}
