//! Lazy expansion of one Swagger schema into a property tree.
//!
//! A [`SchemaTree`] holds the current *frontier* of one named definition:
//! a map from relative address to [`SchemaProperty`]. Expanding an entry
//! replaces it with its children, following `$ref`s (also across
//! documents), flattening `allOf` and fanning discriminator bases out into
//! one child per variant. Every property carries the set of references
//! already followed on its own path, so a reference cycle stops that path
//! without affecting siblings that reach the same target independently.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde_json::{json, Value};

use crate::address::{Segment, SwaggerPropertyAddr, TerraformPropertyAddr};
use crate::coverage::{Coverage, CoverageStore};
use crate::error::SchemaError;
use crate::loader::{join_locator, normalize_ref, split_ref, DocumentLoader};
use crate::types;

/// One node of the expanded schema tree.
#[derive(Debug, Clone)]
pub struct SchemaProperty {
    addr: SwaggerPropertyAddr,
    schema: Value,
    tf_links: Vec<TerraformPropertyAddr>,
    is_granted: bool,
    grant_comment: String,
    /// Normalized references followed on the path to this node.
    resolved_refs: BTreeSet<String>,
    /// Locator of the document `schema` lives in.
    document: String,
}

impl SchemaProperty {
    fn new(addr: SwaggerPropertyAddr, schema: Value, document: String) -> Self {
        Self {
            addr,
            schema,
            tf_links: Vec::new(),
            is_granted: false,
            grant_comment: String::new(),
            resolved_refs: BTreeSet::new(),
            document,
        }
    }

    /// A child inheriting links, followed references and document.
    fn derive(&self, addr: SwaggerPropertyAddr, schema: Value) -> Self {
        Self {
            addr,
            schema,
            tf_links: self.tf_links.clone(),
            is_granted: false,
            grant_comment: String::new(),
            resolved_refs: self.resolved_refs.clone(),
            document: self.document.clone(),
        }
    }

    pub fn addr(&self) -> &SwaggerPropertyAddr {
        &self.addr
    }

    /// The schema fragment this property currently resolves to.
    pub fn schema(&self) -> &Value {
        &self.schema
    }

    pub fn tf_links(&self) -> &[TerraformPropertyAddr] {
        &self.tf_links
    }

    pub fn is_granted(&self) -> bool {
        self.is_granted
    }

    pub fn grant_comment(&self) -> &str {
        &self.grant_comment
    }

    pub fn resolved_refs(&self) -> &BTreeSet<String> {
        &self.resolved_refs
    }

    pub fn document(&self) -> &str {
        &self.document
    }
}

/// Outcome of expanding one frontier entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expansion {
    /// The entry was replaced by this many children.
    Expanded { children: usize },
    /// The entry has no children and stays on the frontier.
    Leaf,
    /// A reference cycle was hit; the entry stays as a terminal leaf.
    Cyclic,
}

/// The expandable property tree of one (document, schema) pair.
#[derive(Debug)]
pub struct SchemaTree {
    rel_path: String,
    name: String,
    document: String,
    properties: BTreeMap<String, SchemaProperty>,
    is_granted: bool,
    grant_comment: String,
    loader: Arc<DocumentLoader>,
    coverage: Option<CoverageStore>,
}

impl SchemaTree {
    /// Load definition `name` from `base`/`rel_path` and expand its first level.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError::SchemaNotFound` if the document has no such
    /// definition, or any load/expansion error of the root.
    pub fn new(
        loader: Arc<DocumentLoader>,
        base: &str,
        rel_path: &str,
        name: &str,
    ) -> Result<Self, SchemaError> {
        let document = join_locator(base, rel_path);
        let doc = loader.load(&document)?;
        let schema = types::definitions_of(&doc)
            .and_then(|defs| defs.get(name))
            .cloned()
            .ok_or_else(|| SchemaError::SchemaNotFound {
                schema: name.to_string(),
                document: document.clone(),
            })?;

        let root_addr = SwaggerPropertyAddr::root(name);
        let mut root = SchemaProperty::new(root_addr.clone(), schema, document.clone());
        // A discriminator base is only ever referenced through its variants.
        if !types::is_discriminator_base(&root.schema) {
            let pointer = root_addr.to_definition_pointer()?;
            root.resolved_refs
                .insert(normalize_ref(&pointer, &document));
        }

        tracing::debug!(schema = %name, %document, "creating schema tree");
        let mut tree = Self {
            rel_path: rel_path.to_string(),
            name: name.to_string(),
            document,
            properties: BTreeMap::from([(String::new(), root)]),
            is_granted: false,
            grant_comment: String::new(),
            loader,
            coverage: None,
        };
        tree.expand_one_level(&root_addr)?;
        Ok(tree)
    }

    /// Build a tree for every schema name `selector` picks from a document.
    pub fn collect<F>(
        loader: Arc<DocumentLoader>,
        base: &str,
        rel_path: &str,
        selector: F,
    ) -> Result<Vec<Self>, SchemaError>
    where
        F: FnOnce(&Value) -> Vec<String>,
    {
        let doc = loader.load(&join_locator(base, rel_path))?;
        selector(&doc)
            .iter()
            .map(|name| Self::new(Arc::clone(&loader), base, rel_path, name))
            .collect()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Document path relative to the swagger base.
    pub fn rel_path(&self) -> &str {
        &self.rel_path
    }

    /// Locator of the document defining this schema.
    pub fn document(&self) -> &str {
        &self.document
    }

    pub fn is_granted(&self) -> bool {
        self.is_granted
    }

    pub fn grant_comment(&self) -> &str {
        &self.grant_comment
    }

    /// Current frontier entries, ordered by relative address.
    pub fn properties(&self) -> impl Iterator<Item = &SchemaProperty> {
        self.properties.values()
    }

    /// Frontier entry at relative address `rel`.
    pub fn property(&self, rel: &str) -> Option<&SchemaProperty> {
        self.properties.get(rel)
    }

    /// Expand the frontier entry at `addr` one level deep.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError::PropertyNotFound` if `addr` is not on the
    /// frontier (including when it was already expanded), a wrapped
    /// reference error if a `$ref` cannot be resolved, and
    /// `SchemaError::DiscriminatorVariantNotFound` if a declared variant has
    /// no schema.
    pub fn expand_one_level(
        &mut self,
        addr: &SwaggerPropertyAddr,
    ) -> Result<Expansion, SchemaError> {
        let key = addr.relative();
        let mut prop = self
            .properties
            .get(&key)
            .cloned()
            .ok_or_else(|| self.not_found(addr))?;

        let cyclic = self
            .deref_in_place(&mut prop)
            .map_err(|e| self.expansion_error(addr, e))?;
        if cyclic {
            tracing::trace!(%addr, "cyclic reference, not expanded further");
            self.properties.insert(key, prop);
            return Ok(Expansion::Cyclic);
        }

        let mut level: BTreeMap<String, SchemaProperty> = direct_properties(addr, &prop)
            .into_iter()
            .collect();
        level.extend(
            self.all_of_properties(addr, &prop)
                .map_err(|e| self.expansion_error(addr, e))?,
        );

        let children: Vec<SchemaProperty> = match self.variants(addr, &prop, &level)? {
            Some(variants) => variants,
            None => level.into_values().collect(),
        };

        let count = children.len();
        for child in children {
            self.properties.insert(child.addr.relative(), child);
        }

        if self.properties.values().any(|p| addr.contains(&p.addr)) {
            self.properties.remove(&key);
        } else {
            self.properties.insert(key, prop);
        }

        tracing::trace!(%addr, children = count, "expanded property");
        Ok(if count == 0 {
            Expansion::Leaf
        } else {
            Expansion::Expanded { children: count }
        })
    }

    /// Attach Terraform address `tf` to Swagger address `api`, expanding the
    /// frontier as deep as needed.
    ///
    /// Linking an address whose descendants are already on the frontier
    /// links every one of them.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError::PropertyNotLinkable` if `api` cannot be reached
    /// from the frontier, or any error raised while expanding towards it.
    pub fn add_link(
        &mut self,
        api: &SwaggerPropertyAddr,
        tf: &TerraformPropertyAddr,
    ) -> Result<(), SchemaError> {
        loop {
            let mut fanned_out = false;
            let mut ancestor = None;
            for prop in self.properties.values_mut() {
                if prop.addr == *api {
                    prop.tf_links.push(tf.clone());
                    return Ok(());
                }
                if api.contains(&prop.addr) {
                    prop.tf_links.push(tf.clone());
                    fanned_out = true;
                    continue;
                }
                if prop.addr.contains(api) {
                    ancestor = Some(prop.addr.clone());
                    break;
                }
            }

            match ancestor {
                Some(ancestor) => {
                    // Leaves and cycles cannot be expanded any further.
                    if !matches!(
                        self.expand_one_level(&ancestor)?,
                        Expansion::Expanded { .. }
                    ) {
                        return Err(self.not_linkable(api));
                    }
                }
                None if fanned_out => return Ok(()),
                None => return Err(self.not_linkable(api)),
            }
        }
    }

    /// Exclude the whole schema from coverage.
    pub fn grant_schema(&mut self, comment: &str) {
        self.is_granted = true;
        self.grant_comment = comment.to_string();
    }

    /// Exclude the frontier entry at relative address `rel` from coverage.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError::GrantTargetMissing` if no such entry exists.
    pub fn grant_property(&mut self, rel: &str, comment: &str) -> Result<(), SchemaError> {
        let addr = SwaggerPropertyAddr::parse_relative(self.name.clone(), rel)?;
        let prop = self
            .properties
            .get_mut(&addr.relative())
            .ok_or_else(|| SchemaError::GrantTargetMissing {
                address: rel.to_string(),
                schema: self.name.clone(),
            })?;
        prop.is_granted = true;
        prop.grant_comment = comment.to_string();
        Ok(())
    }

    /// Build the coverage trie from the current frontier.
    ///
    /// A schema granted as a whole covers nothing and counts nothing.
    pub fn calc_coverage(&mut self) -> Result<(), SchemaError> {
        let mut store = CoverageStore::new();
        if !self.is_granted {
            for prop in self.properties.values() {
                store.add(&prop.addr, prop.tf_links.len(), prop.is_granted)?;
            }
        }
        self.coverage = Some(store);
        Ok(())
    }

    /// Whole-schema coverage; zero until [`calc_coverage`](Self::calc_coverage) ran.
    pub fn schema_coverage(&self) -> Coverage {
        self.coverage
            .as_ref()
            .map(CoverageStore::schema_coverage)
            .unwrap_or_default()
    }

    /// Coverage below `prefix`, if coverage was computed and the prefix is known.
    pub fn find_coverage(&self, prefix: &SwaggerPropertyAddr) -> Option<Coverage> {
        self.coverage.as_ref()?.find_coverage(prefix)
    }

    /// Follow `$ref`s (and array item `$ref`s) until a concrete fragment is
    /// reached. Returns `true` when a reference already followed on this
    /// path comes up again.
    fn deref_in_place(&self, prop: &mut SchemaProperty) -> Result<bool, SchemaError> {
        while let Some(reference) = types::deref_target(&prop.schema) {
            let reference = reference.to_string();
            let normalized = normalize_ref(&reference, &prop.document);
            if prop.resolved_refs.contains(&normalized) {
                return Ok(true);
            }

            let target =
                self.loader
                    .resolve(&normalized)
                    .map_err(|source| SchemaError::Reference {
                        reference: reference.clone(),
                        document: prop.document.clone(),
                        source,
                    })?;

            // Discriminator bases stay re-enterable through each of their variants.
            if !types::is_discriminator_base(&target) {
                prop.resolved_refs.insert(normalized.clone());
            }
            prop.schema = target;
            prop.document = split_ref(&normalized).0.to_string();
        }
        Ok(false)
    }

    /// Properties contributed by `allOf` members, nested members included.
    fn all_of_properties(
        &self,
        addr: &SwaggerPropertyAddr,
        prop: &SchemaProperty,
    ) -> Result<Vec<(String, SchemaProperty)>, SchemaError> {
        let mut output = Vec::new();
        for member in types::all_of(&prop.schema) {
            let mut inherited = prop.derive(addr.clone(), member.clone());
            if types::ref_of(&inherited.schema).is_some() && self.deref_in_place(&mut inherited)? {
                continue;
            }
            output.extend(self.all_of_properties(addr, &inherited)?);
            output.extend(direct_properties(addr, &inherited));
        }
        Ok(output)
    }

    /// One child per discriminator variant, when `prop` is a discriminator
    /// base whose discriminator property enumerates its variants.
    fn variants(
        &self,
        addr: &SwaggerPropertyAddr,
        prop: &SchemaProperty,
        level: &BTreeMap<String, SchemaProperty>,
    ) -> Result<Option<Vec<SchemaProperty>>, SchemaError> {
        // A node already standing for one variant is not fanned out again.
        if addr
            .segments()
            .last()
            .and_then(Segment::variant)
            .is_some()
        {
            return Ok(None);
        }
        let Some(discriminator) = types::discriminator_of(&prop.schema) else {
            return Ok(None);
        };
        let Some(values) = level
            .get(discriminator)
            .and_then(|p| types::enum_of(&p.schema))
        else {
            return Ok(None);
        };

        let doc = self.loader.load(&prop.document)?;
        let mut variants = Vec::with_capacity(values.len());
        for value in values {
            let not_found = || SchemaError::DiscriminatorVariantNotFound {
                discriminator: discriminator.to_string(),
                variant: value.as_str().map_or_else(|| value.to_string(), str::to_string),
                address: addr.to_string(),
                document: prop.document.clone(),
            };
            let variant = value.as_str().ok_or_else(not_found)?;
            let (def_name, def) =
                types::find_variant_definition(&doc, variant).ok_or_else(not_found)?;

            let pointer = SwaggerPropertyAddr::root(def_name).to_definition_pointer()?;
            let normalized = normalize_ref(&pointer, &prop.document);
            let child = if prop.resolved_refs.contains(&normalized) {
                // Variant already entered on this path: left as a reference so
                // expanding it stops at the cycle.
                prop.derive(addr.as_variant(variant), json!({ "$ref": pointer }))
            } else {
                let mut child = prop.derive(addr.as_variant(variant), def.clone());
                child.resolved_refs.insert(normalized);
                child
            };
            tracing::trace!(%addr, %variant, schema = %def_name, "discriminator variant");
            variants.push(child);
        }
        Ok(Some(variants))
    }

    fn not_found(&self, addr: &SwaggerPropertyAddr) -> SchemaError {
        SchemaError::PropertyNotFound {
            address: addr.to_string(),
            schema: self.name.clone(),
            document: self.document.clone(),
        }
    }

    fn not_linkable(&self, addr: &SwaggerPropertyAddr) -> SchemaError {
        SchemaError::PropertyNotLinkable {
            address: addr.to_string(),
            schema: self.name.clone(),
            document: self.document.clone(),
        }
    }

    fn expansion_error(&self, addr: &SwaggerPropertyAddr, source: SchemaError) -> SchemaError {
        SchemaError::Expansion {
            address: addr.to_string(),
            schema: self.name.clone(),
            document: self.document.clone(),
            source: Box::new(source),
        }
    }
}

/// Direct children of `prop` (of its array item, for arrays).
fn direct_properties(
    addr: &SwaggerPropertyAddr,
    prop: &SchemaProperty,
) -> Vec<(String, SchemaProperty)> {
    types::properties_of(&prop.schema)
        .into_iter()
        .flatten()
        .map(|(name, schema)| {
            let child = prop.derive(addr.append_segment(Segment::new(name)), schema.clone());
            (name.clone(), child)
        })
        .collect()
}
