//! Coverage aggregation trie.
//!
//! Built once from a finished schema tree: every leaf property is inserted
//! along its segment path, bumping `total` at each node on the way and
//! `covered` when the property has at least one Terraform link.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::address::SwaggerPropertyAddr;
use crate::error::SchemaError;

/// Covered and total property counts under some prefix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Coverage {
    pub covered: usize,
    pub total: usize,
}

impl Coverage {
    /// Coverage ratio in `[0, 1]`; a schema with nothing to cover counts as fully covered.
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.covered as f64 / self.total as f64
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct CoverageNode {
    coverage: Coverage,
    /// An added address ends here.
    terminal: bool,
    children: BTreeMap<String, CoverageNode>,
}

impl CoverageNode {
    fn add(&mut self, segments: &[String], is_covered: bool) {
        self.coverage.total += 1;
        if is_covered {
            self.coverage.covered += 1;
        }
        match segments.split_first() {
            None => self.terminal = true,
            Some((head, rest)) => self
                .children
                .entry(head.clone())
                .or_default()
                .add(rest, is_covered),
        }
    }
}

/// Per-schema coverage trie.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverageStore {
    root: CoverageNode,
}

impl CoverageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one leaf property.
    ///
    /// Granted properties are ignored. Addresses must be disjoint: adding an
    /// address that was already added, or one that is an ancestor or
    /// descendant of an added address, is an error.
    pub fn add(
        &mut self,
        addr: &SwaggerPropertyAddr,
        link_count: usize,
        is_granted: bool,
    ) -> Result<(), SchemaError> {
        if is_granted {
            return Ok(());
        }

        let segments: Vec<String> = addr.segments().iter().map(ToString::to_string).collect();
        if self.overlaps(&segments) {
            return Err(SchemaError::DuplicateCoverage {
                address: addr.to_string(),
            });
        }

        self.root.add(&segments, link_count != 0);
        Ok(())
    }

    fn overlaps(&self, segments: &[String]) -> bool {
        let mut node = &self.root;
        for segment in segments {
            if node.terminal {
                return true;
            }
            match node.children.get(segment) {
                Some(child) => node = child,
                None => return false,
            }
        }
        // The path already exists: either the same address or an ancestor of an added one.
        node.terminal || node.coverage.total > 0
    }

    /// Coverage of the whole schema.
    pub fn schema_coverage(&self) -> Coverage {
        self.root.coverage
    }

    /// Coverage under `prefix`, or `None` if no recorded property lies there.
    pub fn find_coverage(&self, prefix: &SwaggerPropertyAddr) -> Option<Coverage> {
        let mut node = &self.root;
        for segment in prefix.segments() {
            node = node.children.get(&segment.to_string())?;
        }
        Some(node.coverage)
    }
}
