//! Process-wide cache of schema trees.
//!
//! One [`SchemaTree`] per (document, schema name) pair, created on first
//! link and deepened by every later one. A single lock guards lookup,
//! creation and mutation, so linking is safe from many threads while at
//! most one tree mutation is in flight at a time.
//!
//! A link failing with a fatal [`SchemaError`] poisons its schema: the tree
//! is dropped, later links into it are refused, and it never shows up in a
//! report.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::address::{SwaggerPropertyAddr, TerraformPropertyAddr};
use crate::coverage::Coverage;
use crate::error::SchemaError;
use crate::grant::Grant;
use crate::loader::DocumentLoader;
use crate::schema::SchemaTree;

const SCHEMA_ADDR_SEP: &str = "#/definitions/";

/// Key of one schema: `<swagger rel path>#/definitions/<schema name>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaAddr(String);

impl SchemaAddr {
    pub fn new(rel_path: &str, schema_name: &str) -> Self {
        Self(format!("{rel_path}{SCHEMA_ADDR_SEP}{schema_name}"))
    }

    pub fn rel_path(&self) -> &str {
        self.0
            .split_once(SCHEMA_ADDR_SEP)
            .map_or(self.0.as_str(), |(rel, _)| rel)
    }

    pub fn schema_name(&self) -> &str {
        self.0
            .split_once(SCHEMA_ADDR_SEP)
            .map_or("", |(_, name)| name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SchemaAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Persisted coverage report, keyed by schema.
pub type Report = BTreeMap<SchemaAddr, SchemaReport>;

/// Report of one schema tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SchemaReport {
    pub swagger_rel_path: String,
    pub name: String,
    #[serde(default)]
    pub is_granted: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub grant_comment: String,
    pub coverage: Coverage,
    /// Relative address of every frontier entry.
    pub properties: BTreeMap<String, PropertyReport>,
}

/// Report of one frontier entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyReport {
    #[serde(rename = "TFLinks", default)]
    pub tf_links: Vec<TerraformPropertyAddr>,
    #[serde(rename = "IsGranted", default)]
    pub is_granted: bool,
    #[serde(
        rename = "GrantComment",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub grant_comment: String,
}

impl From<&SchemaTree> for SchemaReport {
    fn from(tree: &SchemaTree) -> Self {
        Self {
            swagger_rel_path: tree.rel_path().to_string(),
            name: tree.name().to_string(),
            is_granted: tree.is_granted(),
            grant_comment: tree.grant_comment().to_string(),
            coverage: tree.schema_coverage(),
            properties: tree
                .properties()
                .map(|prop| {
                    (
                        prop.addr().relative(),
                        PropertyReport {
                            tf_links: prop.tf_links().to_vec(),
                            is_granted: prop.is_granted(),
                            grant_comment: prop.grant_comment().to_string(),
                        },
                    )
                })
                .collect(),
        }
    }
}

/// Schema trees shared by every link of one run.
#[derive(Debug, Default)]
pub struct SchemaTreeCache {
    loader: Arc<DocumentLoader>,
    trees: Mutex<Trees>,
}

#[derive(Debug, Default)]
struct Trees {
    live: BTreeMap<SchemaAddr, SchemaTree>,
    /// Schemas dropped after a fatal link error, with that error's message.
    poisoned: BTreeMap<SchemaAddr, String>,
}

impl SchemaTreeCache {
    /// A cache loading documents from files and URLs.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_loader(loader: Arc<DocumentLoader>) -> Self {
        Self {
            loader,
            trees: Mutex::new(Trees::default()),
        }
    }

    pub fn loader(&self) -> &Arc<DocumentLoader> {
        &self.loader
    }

    fn trees(&self) -> MutexGuard<'_, Trees> {
        self.trees.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Link `tf` to `api` in the schema `api.owner()` of document
    /// `base`/`rel_path`, creating the tree on first use.
    ///
    /// A tree that was created successfully stays cached when the link
    /// fails with a non-fatal error. A fatal error poisons the schema.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError::Poisoned` for a poisoned schema, otherwise any
    /// error constructing the tree or linking into it.
    pub fn link_schema(
        &self,
        base: &str,
        rel_path: &str,
        api: &SwaggerPropertyAddr,
        tf: &TerraformPropertyAddr,
    ) -> Result<(), SchemaError> {
        let addr = SchemaAddr::new(rel_path, api.owner());
        let mut trees = self.trees();
        if let Some(reason) = trees.poisoned.get(&addr) {
            return Err(SchemaError::Poisoned {
                schema: addr.to_string(),
                reason: reason.clone(),
            });
        }

        let tree = match trees.live.entry(addr.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let tree = SchemaTree::new(Arc::clone(&self.loader), base, rel_path, api.owner())?;
                entry.insert(tree)
            }
        };
        let result = tree.add_link(api, tf);
        if let Err(e) = &result {
            if e.is_fatal() {
                tracing::warn!(schema = %addr, error = %e, "dropping schema after fatal link error");
                trees.live.remove(&addr);
                trees.poisoned.insert(addr, e.to_string());
            }
        }
        result
    }

    /// Schemas dropped after a fatal link error, in order.
    pub fn poisoned(&self) -> Vec<SchemaAddr> {
        self.trees().poisoned.keys().cloned().collect()
    }

    /// Apply grants to the cached trees.
    ///
    /// Grants for schemas that were never linked are skipped.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError::GrantTargetMissing` if a granted property is not
    /// on its schema's frontier.
    pub fn grant(&self, grant: &Grant) -> Result<(), SchemaError> {
        let mut trees = self.trees();
        for (addr, schema_grant) in grant.iter() {
            let Some(tree) = trees.live.get_mut(addr) else {
                tracing::warn!(schema = %addr, "skipping grant for schema that is never linked");
                continue;
            };
            if schema_grant.is_schema_granted() {
                tree.grant_schema(&schema_grant.comment);
                continue;
            }
            for (property, comment) in &schema_grant.properties {
                tree.grant_property(property, comment)?;
            }
        }
        Ok(())
    }

    /// Compute coverage of every cached tree.
    ///
    /// # Errors
    ///
    /// Returns the schema and error of the first tree that fails.
    pub fn calc_coverage(&self) -> Result<(), (SchemaAddr, SchemaError)> {
        let mut trees = self.trees();
        for (addr, tree) in trees.live.iter_mut() {
            tree.calc_coverage().map_err(|e| (addr.clone(), e))?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.trees().live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees().live.is_empty()
    }

    /// Keys of all cached trees, in order.
    pub fn schema_addrs(&self) -> Vec<SchemaAddr> {
        self.trees().live.keys().cloned().collect()
    }

    /// Run `f` against one cached tree.
    pub fn with_tree<R>(&self, addr: &SchemaAddr, f: impl FnOnce(&SchemaTree) -> R) -> Option<R> {
        self.trees().live.get(addr).map(f)
    }

    pub fn schema_coverage(&self, addr: &SchemaAddr) -> Option<Coverage> {
        self.with_tree(addr, SchemaTree::schema_coverage)
    }

    pub fn find_coverage(
        &self,
        addr: &SchemaAddr,
        prefix: &SwaggerPropertyAddr,
    ) -> Option<Coverage> {
        self.with_tree(addr, |tree| tree.find_coverage(prefix))
            .flatten()
    }

    /// Snapshot of every cached tree.
    pub fn report(&self) -> Report {
        self.trees()
            .live
            .iter()
            .map(|(addr, tree)| (addr.clone(), SchemaReport::from(tree)))
            .collect()
    }
}
