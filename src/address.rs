//! Property addresses.
//!
//! An address is an optional owner (a Swagger schema name or a Terraform
//! resource name) followed by a dot-separated list of segments:
//!
//! ```text
//! def_foo:prop_object.prop_nested
//! azurerm_resource_group:tags
//! ```
//!
//! Swagger addresses may additionally tag a segment with a discriminator
//! variant, `prop[Variant]`, meaning "the `Variant` subtype of `prop`".
//! The three flavors share one implementation; the [`AddressFlavor`] marker
//! decides whether variant tags are recognised.

use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::AddressError;

const OWNER_SEP: char = ':';
const SEGMENT_SEP: char = '.';
const VARIANT_START: char = '[';
const VARIANT_END: char = ']';

/// Policy for one address grammar.
pub trait AddressFlavor:
    Copy + Clone + fmt::Debug + Default + PartialEq + Eq + Hash + Send + Sync + 'static
{
    /// Whether segments may carry a `[variant]` tag.
    const SUPPORTS_VARIANTS: bool;
    /// Name used in error messages.
    const KIND: &'static str;
}

/// Plain addresses with no variant tags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Generic;

/// Swagger schema property addresses, variant tags allowed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Swagger;

/// Terraform resource property addresses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Terraform;

impl AddressFlavor for Generic {
    const SUPPORTS_VARIANTS: bool = false;
    const KIND: &'static str = "property";
}

impl AddressFlavor for Swagger {
    const SUPPORTS_VARIANTS: bool = true;
    const KIND: &'static str = "swagger property";
}

impl AddressFlavor for Terraform {
    const SUPPORTS_VARIANTS: bool = false;
    const KIND: &'static str = "terraform property";
}

pub type PropertyAddr = Address<Generic>;
pub type SwaggerPropertyAddr = Address<Swagger>;
pub type TerraformPropertyAddr = Address<Terraform>;

/// One step of an address path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Segment {
    name: String,
    /// Set only when the segment denotes one concrete subtype of a polymorphic property.
    variant: Option<String>,
}

impl Segment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variant: None,
        }
    }

    pub fn with_variant(name: impl Into<String>, variant: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variant: Some(variant.into()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn variant(&self) -> Option<&str> {
        self.variant.as_deref()
    }

    /// Same name, and our tag is absent or identical to `other`'s.
    fn generalizes(&self, other: &Segment) -> bool {
        self.name == other.name && (self.variant.is_none() || self.variant == other.variant)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if let Some(variant) = &self.variant {
            write!(f, "{VARIANT_START}{variant}{VARIANT_END}")?;
        }
        Ok(())
    }
}

/// An immutable property address of flavor `F`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address<F: AddressFlavor> {
    owner: String,
    segments: Vec<Segment>,
    flavor: PhantomData<F>,
}

impl<F: AddressFlavor> Address<F> {
    /// Build an address from parts.
    ///
    /// Variant tags are dropped for flavors that do not support them.
    pub fn new(owner: impl Into<String>, segments: Vec<Segment>) -> Self {
        let segments = if F::SUPPORTS_VARIANTS {
            segments
        } else {
            segments
                .into_iter()
                .map(|s| Segment::new(s.name))
                .collect()
        };
        Self {
            owner: owner.into(),
            segments,
            flavor: PhantomData,
        }
    }

    /// The address of the owner itself (no segments).
    pub fn root(owner: impl Into<String>) -> Self {
        Self::new(owner, Vec::new())
    }

    /// Build an address from plain segment names.
    pub fn from_names<S: AsRef<str>>(owner: impl Into<String>, names: &[S]) -> Self {
        Self::new(
            owner,
            names.iter().map(|n| Segment::new(n.as_ref())).collect(),
        )
    }

    /// Parse the canonical string form `owner:seg1.seg2`.
    ///
    /// # Errors
    ///
    /// Returns `AddressError` for more than one owner separator, an empty
    /// owner before `:`, empty segments, or malformed `[variant]` notation.
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        let mut parts = s.split(OWNER_SEP);
        let first = parts.next().unwrap_or_default();
        match (parts.next(), parts.next()) {
            (None, _) => Self::parse_relative("", first),
            (Some(rel), None) => {
                if first.is_empty() {
                    return Err(AddressError::EmptyOwner {
                        kind: F::KIND,
                        address: s.to_string(),
                    });
                }
                Self::parse_relative(first, rel)
            }
            (Some(_), Some(_)) => Err(AddressError::OwnerSeparator {
                kind: F::KIND,
                address: s.to_string(),
            }),
        }
    }

    /// Parse a relative path (no owner part) and attach `owner` to it.
    pub fn parse_relative(owner: impl Into<String>, rel: &str) -> Result<Self, AddressError> {
        let owner = owner.into();
        if rel.is_empty() {
            return Ok(Self::root(owner));
        }
        let segments = rel
            .split(SEGMENT_SEP)
            .map(|raw| parse_segment::<F>(raw, rel))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(owner, segments))
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Whether the address names the owner itself.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// The relative path, without the owner.
    pub fn relative(&self) -> String {
        self.segments
            .iter()
            .map(Segment::to_string)
            .collect::<Vec<_>>()
            .join(".")
    }

    /// The same path under a different owner.
    pub fn with_owner(&self, owner: impl Into<String>) -> Self {
        Self::new(owner, self.segments.clone())
    }

    /// Append one plain segment. An empty name leaves the address unchanged.
    pub fn append(&self, name: &str) -> Self {
        if name.is_empty() {
            return self.clone();
        }
        self.append_segment(Segment::new(name))
    }

    pub fn append_segment(&self, segment: Segment) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment);
        Self::new(self.owner.clone(), segments)
    }

    /// Whether `other` lies strictly below this address.
    ///
    /// Owners must match and every segment of `self` must name the matching
    /// segment of `other`. A tagged segment only contains the same tag; an
    /// untagged segment contains any tag, so `p` contains both `p[A]` and
    /// `p[A].x` while `p[A]` contains neither `p` nor `p[B].x`.
    pub fn contains(&self, other: &Self) -> bool {
        if self.owner != other.owner || self.segments.len() > other.segments.len() || self == other
        {
            return false;
        }
        self.segments
            .iter()
            .zip(&other.segments)
            .all(|(mine, theirs)| mine.generalizes(theirs))
    }
}

impl Address<Swagger> {
    /// Tag the last segment with a discriminator variant.
    ///
    /// On the schema root this yields a single unnamed segment, `[variant]`.
    pub fn as_variant(&self, variant: &str) -> Self {
        let mut segments = self.segments.clone();
        match segments.last_mut() {
            Some(last) => last.variant = Some(variant.to_string()),
            None => segments.push(Segment::with_variant("", variant)),
        }
        Self::new(self.owner.clone(), segments)
    }

    /// Map the address to a `#/definitions/...` JSON pointer.
    ///
    /// # Errors
    ///
    /// Returns `AddressError::MissingOwner` when no schema name is set, and
    /// `AddressError::VariantInPointer` when a segment carries a variant tag.
    pub fn to_definition_pointer(&self) -> Result<String, AddressError> {
        if self.owner.is_empty() {
            return Err(AddressError::MissingOwner {
                address: self.to_string(),
            });
        }
        let mut pointer = format!("#/definitions/{}", escape_pointer(&self.owner));
        for segment in &self.segments {
            if segment.variant.is_some() {
                return Err(AddressError::VariantInPointer {
                    address: self.to_string(),
                });
            }
            pointer.push_str("/properties/");
            pointer.push_str(&escape_pointer(&segment.name));
        }
        Ok(pointer)
    }
}

fn parse_segment<F: AddressFlavor>(raw: &str, rel: &str) -> Result<Segment, AddressError> {
    if F::SUPPORTS_VARIANTS && (raw.contains(VARIANT_START) || raw.contains(VARIANT_END)) {
        let malformed = || AddressError::Discriminator {
            segment: raw.to_string(),
            address: rel.to_string(),
        };
        let (name, rest) = raw.split_once(VARIANT_START).ok_or_else(malformed)?;
        let variant = rest.strip_suffix(VARIANT_END).ok_or_else(malformed)?;
        if variant.is_empty()
            || variant.contains(&[VARIANT_START, VARIANT_END][..])
            || name.contains(VARIANT_END)
        {
            return Err(malformed());
        }
        return Ok(Segment::with_variant(name, variant));
    }
    if raw.is_empty() {
        return Err(AddressError::EmptySegment {
            kind: F::KIND,
            address: rel.to_string(),
        });
    }
    Ok(Segment::new(raw))
}

fn escape_pointer(s: &str) -> String {
    s.replace('~', "~0").replace('/', "~1")
}

impl<F: AddressFlavor> fmt::Display for Address<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.owner.is_empty() {
            return f.write_str(&self.relative());
        }
        write!(f, "{}{OWNER_SEP}{}", self.owner, self.relative())
    }
}

impl<F: AddressFlavor> FromStr for Address<F> {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl<F: AddressFlavor> Serialize for Address<F> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de, F: AddressFlavor> Deserialize<'de> for Address<F> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(de::Error::custom)
    }
}
