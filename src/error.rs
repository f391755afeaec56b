//! Error types for schema expansion, linking and coverage.

use std::path::PathBuf;
use thiserror::Error;

/// Errors parsing or converting a property address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("invalid {kind} address {address:?}: expected at most one owner separator ':'")]
    OwnerSeparator { kind: &'static str, address: String },

    #[error("invalid {kind} address {address:?}: owner before ':' is empty")]
    EmptyOwner { kind: &'static str, address: String },

    #[error("invalid {kind} address {address:?}: empty segment")]
    EmptySegment { kind: &'static str, address: String },

    #[error(
        "invalid discriminator property notation {segment:?} in {address:?} (expected format: \"prop[variant]\")"
    )]
    Discriminator { segment: String, address: String },

    #[error("address {address:?} has no schema name")]
    MissingOwner { address: String },

    #[error("address {address:?} selects a discriminator variant and has no definition pointer")]
    VariantInPointer { address: String },
}

/// Errors loading a Swagger document.
#[derive(Debug, Error)]
pub enum LoadError {
    // IO errors (exit code 3)
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "remote")]
    #[error("failed to fetch {url}: {source}")]
    NetworkError {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("cannot fetch {url}: remote loading is disabled")]
    RemoteDisabled { url: String },

    // Parse errors (exit code 2)
    #[error("invalid JSON in {locator}: {source}")]
    InvalidJson {
        locator: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("fragment {fragment:?} not found in {locator}")]
    FragmentNotFound { locator: String, fragment: String },
}

impl LoadError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            LoadError::FileNotFound { .. }
            | LoadError::ReadError { .. }
            | LoadError::RemoteDisabled { .. } => 3,
            #[cfg(feature = "remote")]
            LoadError::NetworkError { .. } => 3,
            _ => 2,
        }
    }
}

/// Errors expanding, linking, granting or measuring a Swagger schema.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Address(#[from] AddressError),

    #[error("schema {schema:?} is not found in swagger document {document}")]
    SchemaNotFound { schema: String, document: String },

    #[error("property {address} does not exist in schema {schema} ({document})")]
    PropertyNotFound {
        address: String,
        schema: String,
        document: String,
    },

    #[error("property {address} doesn't belong to schema {schema} ({document})")]
    PropertyNotLinkable {
        address: String,
        schema: String,
        document: String,
    },

    #[error("resolve reference {reference} from {document}: {source}")]
    Reference {
        reference: String,
        document: String,
        #[source]
        source: LoadError,
    },

    #[error("variant schema with discriminator {discriminator:?} set to {variant:?} is not found for {address} ({document})")]
    DiscriminatorVariantNotFound {
        discriminator: String,
        variant: String,
        address: String,
        document: String,
    },

    #[error("expanding property {address} in schema {schema} ({document}): {source}")]
    Expansion {
        address: String,
        schema: String,
        document: String,
        #[source]
        source: Box<SchemaError>,
    },

    #[error("{address:?} has already been added to the coverage store")]
    DuplicateCoverage { address: String },

    #[error("property to be granted {address:?} doesn't exist in swagger schema {schema}")]
    GrantTargetMissing { address: String, schema: String },

    #[error("schema {schema} was dropped after an earlier failure: {reason}")]
    Poisoned { schema: String, reason: String },
}

impl SchemaError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            SchemaError::Load(e) => e.exit_code(),
            SchemaError::Reference { source, .. } => source.exit_code(),
            SchemaError::Expansion { source, .. } => source.exit_code(),
            SchemaError::PropertyNotFound { .. }
            | SchemaError::PropertyNotLinkable { .. }
            | SchemaError::GrantTargetMissing { .. } => 1,
            _ => 2,
        }
    }

    /// Whether the error leaves the affected schema unusable.
    ///
    /// Non-fatal errors concern a single address and the caller may skip it.
    pub fn is_fatal(&self) -> bool {
        match self {
            SchemaError::Address(_)
            | SchemaError::PropertyNotFound { .. }
            | SchemaError::PropertyNotLinkable { .. } => false,
            SchemaError::Expansion { source, .. } => source.is_fatal(),
            SchemaError::Poisoned { .. } => false,
            _ => true,
        }
    }

    /// Whether the error invalidates every result of the run, not just the
    /// schema it was raised for.
    pub fn aborts_run(&self) -> bool {
        match self {
            SchemaError::DiscriminatorVariantNotFound { .. } => true,
            SchemaError::Expansion { source, .. } => source.aborts_run(),
            _ => false,
        }
    }
}

/// Errors reading, validating or replaying a Terraform declaration.
#[derive(Debug, Error)]
pub enum DeclarationError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid declaration {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("validating terraform schema {name}: {message}")]
    Validation { name: String, message: String },

    #[error("schema name between existing ({existing:?}) and the new ({new:?}) declaration is different")]
    NameMismatch { existing: String, new: String },

    #[error("linking {tf_address} to {swagger_address}: {source}")]
    Link {
        tf_address: String,
        swagger_address: String,
        #[source]
        source: SchemaError,
    },
}

impl DeclarationError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            DeclarationError::Io { .. } => 3,
            DeclarationError::Link { source, .. } => source.exit_code(),
            _ => 2,
        }
    }

    /// See [`SchemaError::aborts_run`].
    pub fn aborts_run(&self) -> bool {
        matches!(self, DeclarationError::Link { source, .. } if source.aborts_run())
    }
}

/// Errors reading a grant directory.
#[derive(Debug, Error)]
pub enum GrantError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid grant file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl GrantError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            GrantError::Io { .. } => 3,
            GrantError::Json { .. } => 2,
        }
    }
}

/// Errors aborting a whole coverage build.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("terraform schema directory {path} is not readable: {source}")]
    TfSchemaDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("loading grants: {0}")]
    Grant(#[from] GrantError),

    #[error("applying grants: {0}")]
    ApplyGrant(#[source] SchemaError),

    #[error("calculating coverage for {schema}: {source}")]
    Coverage {
        schema: String,
        #[source]
        source: SchemaError,
    },

    #[error("replay of {path} aborted the build: {source}")]
    Aborted {
        path: PathBuf,
        #[source]
        source: DeclarationError,
    },
}

impl BuildError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            BuildError::TfSchemaDir { .. } => 3,
            BuildError::Grant(e) => e.exit_code(),
            BuildError::ApplyGrant(e) => e.exit_code(),
            BuildError::Coverage { .. } => 2,
            BuildError::Aborted { source, .. } => source.exit_code(),
        }
    }
}
