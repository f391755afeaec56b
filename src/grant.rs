//! Grants: schemas and properties deliberately left out of coverage.
//!
//! A grant directory mirrors the Swagger tree. Each `<rel_path>.json` file
//! holds one object keyed by schema name:
//!
//! ```json
//! {
//!   "ResourceGroupPatchable": { "comment": "covered by the create schema" },
//!   "ResourceGroup": { "properties": { "managedBy": "read only" } }
//! }
//! ```
//!
//! An entry without properties grants the whole schema.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cache::SchemaAddr;
use crate::error::GrantError;
use crate::loader::{collect_json_files, relative_slash_path};

/// Grant of one schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaGrant {
    /// Why the whole schema is granted.
    #[serde(
        rename = "comment",
        alias = "Comment",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub comment: String,

    /// Relative property address to grant comment.
    #[serde(
        rename = "properties",
        alias = "Properties",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub properties: BTreeMap<String, String>,
}

impl SchemaGrant {
    pub fn schema(comment: impl Into<String>) -> Self {
        Self {
            comment: comment.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn properties<I, K, V>(properties: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            comment: String::new(),
            properties: properties
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Whether the grant covers the whole schema.
    pub fn is_schema_granted(&self) -> bool {
        self.properties.is_empty()
    }
}

/// All grants, keyed by schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Grant(BTreeMap<SchemaAddr, SchemaGrant>);

impl Grant {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, addr: SchemaAddr, grant: SchemaGrant) {
        self.0.insert(addr, grant);
    }

    pub fn get(&self, addr: &SchemaAddr) -> Option<&SchemaGrant> {
        self.0.get(addr)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SchemaAddr, &SchemaGrant)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Load every grant file under `dir`.
///
/// The path of each file relative to `dir` is the Swagger document path the
/// grants apply to.
///
/// # Errors
///
/// Returns `GrantError::Io` if `dir` or a file cannot be read, and
/// `GrantError::Json` for malformed grant files.
pub fn load_grants(dir: &Path) -> Result<Grant, GrantError> {
    std::fs::metadata(dir).map_err(|source| GrantError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut grant = Grant::new();
    for path in collect_json_files(dir) {
        let content = std::fs::read_to_string(&path).map_err(|source| GrantError::Io {
            path: path.clone(),
            source,
        })?;
        let schemas: BTreeMap<String, SchemaGrant> =
            serde_json::from_str(&content).map_err(|source| GrantError::Json {
                path: path.clone(),
                source,
            })?;

        let Some(rel_path) = relative_slash_path(&path, dir) else {
            continue;
        };
        tracing::debug!(file = %rel_path, schemas = schemas.len(), "loaded grants");
        for (name, schema_grant) in schemas {
            grant.insert(SchemaAddr::new(&rel_path, &name), schema_grant);
        }
    }
    Ok(grant)
}
