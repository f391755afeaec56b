//! Terraform to Swagger property coverage
//!
//! Measures how much of each Swagger (OpenAPI 2.0) object schema a Terraform
//! provider exposes, down to individual nested properties.
//!
//! Declarations map every Terraform attribute to the Swagger properties
//! backing it. Replaying them expands each referenced Swagger schema lazily,
//! only as deep as the links require, following `$ref`s across documents,
//! flattening `allOf` and fanning discriminators out into their variants.
//! The expanded frontier of each schema is then counted into a coverage trie.
//!
//! # Example
//!
//! ```
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! use serde_json::json;
//! use tf_swagger_insight::{
//!     DocumentLoader, SchemaAddr, SchemaTreeCache, SwaggerPropertyAddr, TerraformPropertyAddr,
//! };
//!
//! let docs = HashMap::from([(
//!     "specs/rg.json".to_string(),
//!     json!({
//!         "definitions": {
//!             "ResourceGroup": {
//!                 "properties": {
//!                     "location": { "type": "string" },
//!                     "properties": {
//!                         "type": "object",
//!                         "properties": { "provisioningState": { "type": "string" } }
//!                     }
//!                 }
//!             }
//!         }
//!     }),
//! )]);
//! let cache = SchemaTreeCache::with_loader(Arc::new(DocumentLoader::with_source(docs)));
//!
//! let api: SwaggerPropertyAddr = "ResourceGroup:location".parse()?;
//! let tf: TerraformPropertyAddr = "azurerm_resource_group:location".parse()?;
//! cache.link_schema("specs", "rg.json", &api, &tf)?;
//! cache.calc_coverage().map_err(|(_, e)| e)?;
//!
//! let coverage = cache
//!     .schema_coverage(&SchemaAddr::new("rg.json", "ResourceGroup"))
//!     .unwrap();
//! assert_eq!((coverage.covered, coverage.total), (1, 2));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Addresses
//!
//! | Form | Meaning |
//! |------|---------|
//! | `Schema:` | The schema itself |
//! | `Schema:a.b` | Property `b` of object property `a` |
//! | `Schema:a[Cat].meow` | Property `meow` of the `Cat` variant of `a` |
//! | `resource:a.b` | Terraform attribute `b` nested in `a` |
//!
//! # Logging
//!
//! The library emits [`tracing`] events; the binary prints them to stderr
//! filtered by the `TF_SWAGGER_INSIGHT_LOG` environment variable.

mod address;
mod cache;
mod coverage;
mod error;
mod grant;
mod loader;
mod pipeline;
mod schema;
mod tfschema;
mod types;

pub use address::{
    Address, AddressFlavor, Generic, PropertyAddr, Segment, Swagger, SwaggerPropertyAddr,
    Terraform, TerraformPropertyAddr,
};
pub use cache::{PropertyReport, Report, SchemaAddr, SchemaReport, SchemaTreeCache};
pub use coverage::{Coverage, CoverageStore};
pub use error::{
    AddressError, BuildError, DeclarationError, GrantError, LoadError, SchemaError,
};
pub use grant::{load_grants, Grant, SchemaGrant};
pub use loader::{
    canonical_locator, collect_json_files, is_url, join_locator, load_document, load_document_auto,
    navigate_fragment, normalize_ref, split_ref, DefaultSource, DocumentLoader, DocumentSource,
};
pub use pipeline::{
    build_coverage, build_coverage_with, replay_file, BuildOptions, BuildOutcome, FileFailure,
};
pub use schema::{Expansion, SchemaProperty, SchemaTree};
pub use tfschema::{
    AttributeType, PropertyLinks, SwaggerLink, TerraformAttribute, TerraformBlock,
    TerraformNestedBlock, TerraformNestedType, TerraformProvider, TerraformProviderSchemas,
    TerraformSchema, TfSchema, DATA_SOURCE_PREFIX,
};
pub use types::DISCRIMINATOR_VALUE_EXTENSION;

#[cfg(feature = "remote")]
pub use loader::load_document_url;
