//! Terraform schemas and their Swagger link declarations.
//!
//! The provider model reads the output of `terraform providers schema -json`.
//! A declaration ([`TfSchema`]) lists, per leaf attribute of one resource,
//! the Swagger properties it is backed by:
//!
//! ```json
//! {
//!   "Name": "azurerm_resource_group",
//!   "swagger": "resources/stable/2020-06-01/resources.json",
//!   "PropertyLinks": {
//!     "location": [{ "prop": "ResourceGroup:location" }],
//!     "tags": [{ "prop": "ResourceGroup:tags" }]
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::address::{PropertyAddr, SwaggerPropertyAddr, TerraformPropertyAddr};
use crate::cache::SchemaTreeCache;
use crate::error::DeclarationError;
use crate::types::json_type_name;

/// Name prefix of data source declarations.
pub const DATA_SOURCE_PREFIX: &str = "data_";

/// `terraform providers schema -json` output.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TerraformProviderSchemas {
    #[serde(default)]
    pub format_version: String,
    #[serde(default)]
    pub provider_schemas: BTreeMap<String, TerraformProvider>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TerraformProvider {
    #[serde(default)]
    pub resource_schemas: BTreeMap<String, TerraformSchema>,
    #[serde(default)]
    pub data_source_schemas: BTreeMap<String, TerraformSchema>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TerraformSchema {
    #[serde(default)]
    pub block: TerraformBlock,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TerraformBlock {
    #[serde(default)]
    pub attributes: BTreeMap<String, TerraformAttribute>,
    #[serde(default)]
    pub block_types: BTreeMap<String, TerraformNestedBlock>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TerraformAttribute {
    #[serde(rename = "type", default)]
    pub attr_type: Option<AttributeType>,
    /// Protocol 6 nested attributes.
    #[serde(default)]
    pub nested_type: Option<TerraformNestedType>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TerraformNestedType {
    #[serde(default)]
    pub attributes: BTreeMap<String, TerraformAttribute>,
    #[serde(default)]
    pub nesting_mode: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TerraformNestedBlock {
    #[serde(default)]
    pub block: TerraformBlock,
    #[serde(default)]
    pub nesting_mode: Option<String>,
}

/// A cty type expression.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "Value")]
pub enum AttributeType {
    /// `string`, `number`, `bool` or `dynamic`.
    Primitive(String),
    List(Box<AttributeType>),
    Set(Box<AttributeType>),
    Map(Box<AttributeType>),
    Object(BTreeMap<String, AttributeType>),
    Tuple(Vec<AttributeType>),
}

impl TryFrom<Value> for AttributeType {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(name) => Ok(AttributeType::Primitive(name)),
            Value::Array(mut parts) if parts.len() == 2 => {
                let arg = parts.pop().unwrap_or_default();
                let kind = parts.pop().unwrap_or_default();
                match kind.as_str() {
                    Some("list") => Ok(AttributeType::List(Box::new(arg.try_into()?))),
                    Some("set") => Ok(AttributeType::Set(Box::new(arg.try_into()?))),
                    Some("map") => Ok(AttributeType::Map(Box::new(arg.try_into()?))),
                    Some("object") => match arg {
                        Value::Object(attrs) => attrs
                            .into_iter()
                            .map(|(k, v)| AttributeType::try_from(v).map(|t| (k, t)))
                            .collect::<Result<BTreeMap<_, _>, _>>()
                            .map(AttributeType::Object),
                        other => Err(format!(
                            "object type attributes must be a map, got {}",
                            json_type_name(&other)
                        )),
                    },
                    Some("tuple") => match arg {
                        Value::Array(elems) => elems
                            .into_iter()
                            .map(AttributeType::try_from)
                            .collect::<Result<Vec<_>, _>>()
                            .map(AttributeType::Tuple),
                        other => Err(format!(
                            "tuple element types must be a list, got {}",
                            json_type_name(&other)
                        )),
                    },
                    _ => Err(format!("unknown type constructor {kind}")),
                }
            }
            other => Err(format!("invalid type expression {other}")),
        }
    }
}

/// One Swagger property a Terraform attribute is backed by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwaggerLink {
    /// Document overriding the declaration's default one.
    #[serde(rename = "swagger", default, skip_serializing_if = "Option::is_none")]
    pub swagger: Option<String>,
    pub prop: SwaggerPropertyAddr,
}

impl SwaggerLink {
    pub fn new(prop: SwaggerPropertyAddr) -> Self {
        Self {
            swagger: None,
            prop,
        }
    }

    pub fn in_document(mut self, swagger: impl Into<String>) -> Self {
        self.swagger = Some(swagger.into());
        self
    }
}

/// Relative Terraform address to the Swagger properties backing it.
pub type PropertyLinks = BTreeMap<String, Vec<SwaggerLink>>;

/// Link declaration of one Terraform resource or data source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TfSchema {
    #[serde(rename = "Name")]
    pub name: String,
    /// Default Swagger document, relative to the Swagger base.
    #[serde(rename = "swagger", default)]
    pub swagger: String,
    #[serde(rename = "PropertyLinks", default)]
    pub property_links: PropertyLinks,
}

impl TfSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Read a declaration file.
    pub fn load(path: &Path) -> Result<Self, DeclarationError> {
        let content = std::fs::read_to_string(path).map_err(|source| DeclarationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| DeclarationError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// A scaffold with one empty link list per leaf attribute of `block`.
    pub fn scaffold(name: impl Into<String>, block: &TerraformBlock) -> Self {
        let mut schema = Self::new(name);
        record_block(&PropertyAddr::root(""), block, &mut schema.property_links);
        schema
    }

    /// Rebuild the scaffold of `name` from `block`, keeping what `existing`
    /// declared for attributes that still exist.
    ///
    /// # Errors
    ///
    /// Returns `DeclarationError::NameMismatch` if `existing` declares
    /// another resource.
    pub fn update_scaffold(
        name: impl Into<String>,
        block: &TerraformBlock,
        existing: &TfSchema,
    ) -> Result<Self, DeclarationError> {
        let mut schema = Self::scaffold(name, block);
        if existing.name != schema.name {
            return Err(DeclarationError::NameMismatch {
                existing: existing.name.clone(),
                new: schema.name,
            });
        }

        schema.swagger = existing.swagger.clone();
        for (property, links) in &existing.property_links {
            match schema.property_links.get_mut(property) {
                Some(slot) => *slot = links.clone(),
                None => tracing::warn!(
                    schema = %schema.name,
                    %property,
                    "property removed by the new terraform schema"
                ),
            }
        }
        Ok(schema)
    }

    /// Check that locators are relative and addresses are well formed.
    pub fn validate(&self) -> Result<(), DeclarationError> {
        let invalid = |message: String| DeclarationError::Validation {
            name: self.name.clone(),
            message,
        };

        if self.swagger.starts_with('/') {
            return Err(invalid(format!(
                "swagger spec path {:?} should be relative (not starting with \"/\")",
                self.swagger
            )));
        }
        for (property, links) in &self.property_links {
            let addr = PropertyAddr::parse(property).map_err(|e| invalid(e.to_string()))?;
            if !addr.owner().is_empty() {
                return Err(invalid(format!(
                    "terraform property address {property} should not specify owner"
                )));
            }
            for link in links {
                if link.prop.owner().is_empty() {
                    return Err(invalid(format!(
                        "swagger property address {} should specify owner",
                        link.prop
                    )));
                }
                if let Some(swagger) = link.swagger.as_deref().filter(|s| s.starts_with('/')) {
                    return Err(invalid(format!(
                        "swagger spec path {swagger:?} should be relative (not starting with \"/\")"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Replay every declared link against `cache`.
    ///
    /// # Errors
    ///
    /// Stops at the first link that fails.
    pub fn link_swagger(&self, cache: &SchemaTreeCache, base: &str) -> Result<(), DeclarationError> {
        for (property, links) in &self.property_links {
            let tf = TerraformPropertyAddr::parse_relative(self.name.clone(), property).map_err(
                |e| DeclarationError::Validation {
                    name: self.name.clone(),
                    message: e.to_string(),
                },
            )?;
            for link in links {
                let rel_path = link.swagger.as_deref().unwrap_or(&self.swagger);
                cache
                    .link_schema(base, rel_path, &link.prop, &tf)
                    .map_err(|source| DeclarationError::Link {
                        tf_address: tf.to_string(),
                        swagger_address: link.prop.to_string(),
                        source,
                    })?;
            }
        }
        Ok(())
    }

    /// Number of declared (Terraform, Swagger) pairs.
    pub fn link_count(&self) -> usize {
        self.property_links.values().map(Vec::len).sum()
    }
}

fn record_block(parent: &PropertyAddr, block: &TerraformBlock, links: &mut PropertyLinks) {
    for (name, attribute) in &block.attributes {
        record_attribute(&parent.append(name), attribute, links);
    }
    for (name, nested) in &block.block_types {
        record_block(&parent.append(name), &nested.block, links);
    }
}

fn record_attribute(addr: &PropertyAddr, attribute: &TerraformAttribute, links: &mut PropertyLinks) {
    match (&attribute.nested_type, &attribute.attr_type) {
        (Some(nested), _) => {
            for (name, attribute) in &nested.attributes {
                record_attribute(&addr.append(name), attribute, links);
            }
        }
        (None, Some(attr_type)) => record_type(addr, attr_type, links),
        (None, None) => record_leaf(addr, links),
    }
}

fn record_type(addr: &PropertyAddr, attr_type: &AttributeType, links: &mut PropertyLinks) {
    match attr_type {
        AttributeType::List(elem) | AttributeType::Set(elem) | AttributeType::Map(elem) => {
            record_type(addr, elem, links)
        }
        AttributeType::Object(attrs) => {
            for (name, attr_type) in attrs {
                record_type(&addr.append(name), attr_type, links);
            }
        }
        AttributeType::Primitive(_) | AttributeType::Tuple(_) => record_leaf(addr, links),
    }
}

fn record_leaf(addr: &PropertyAddr, links: &mut PropertyLinks) {
    links.insert(addr.relative(), Vec::new());
}
