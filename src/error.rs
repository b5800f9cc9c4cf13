use thiserror::Error;

/// Registry inconsistencies detected before any persistence happens.
///
/// These abort the whole job; everything else the engine hits is recorded
/// on the import context and the walk carries on.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("relation cycle through '{kind}' ({path})")]
    Cycle { kind: &'static str, path: String },

    #[error("child relation '{relation}' names kind '{kind}' which has no definition")]
    MissingDefinition {
        relation: &'static str,
        kind: &'static str,
    },

    #[error("kind '{kind}': '{attr}' is flagged for remapping but is not an accepted column")]
    UnknownRemapColumn {
        kind: &'static str,
        attr: &'static str,
    },

    #[error("kind '{kind}': find-or-create declared without a natural key")]
    EmptyNaturalKey { kind: &'static str },
}

/// A node whose decoded shape does not match its relation definition.
/// Fatal for that node's subtree only.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct SchemaError(pub String);

/// The persistence engine rejected a constructed entity.
/// Fatal for that node's subtree only.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ValidationError(pub String);
