//! Filter set: which resources of which types are selected for deletion.
//!
//! A filter file maps resource types to lists of [`TypeFilter`] entries:
//!
//! ```yaml
//! aws_instance:
//!   - id: ^i-0
//!     tags:
//!       env: dev
//!       NOT(keep): ^true$
//! aws_vpc:
//!   - tagged: false
//!     created:
//!       before: 30d
//! aws_subnet:
//! ```
//!
//! Entries of one type are ORed, fields within one entry are ANDed, and an
//! empty (or null) list selects every resource of that type. Tag values may
//! be unquoted numbers or booleans; they are matched as their string form.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::registry;
use crate::types::Resource;
use crate::types::error::CloudrmError;

pub mod created;
pub mod pattern;
pub mod type_filter;

pub use created::{CreatedWindow, parse_time_bound};
pub use pattern::PatternRule;
pub use type_filter::{FilterEntry, TypeFilter};

type RawFilterFile = BTreeMap<String, Option<Vec<FilterEntry>>>;

/// Resource type -> filter entries. Immutable once loaded.
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    filters: BTreeMap<String, Vec<TypeFilter>>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add filters for a type. An empty list selects everything of that type.
    pub fn insert(&mut self, resource_type: &str, filters: Vec<TypeFilter>) {
        self.filters.insert(resource_type.to_string(), filters);
    }

    /// Parse a filter file (YAML; JSON also parses). Relative time bounds are
    /// resolved against `now` here and never again.
    pub fn from_yaml_str(source: &str, now: DateTime<Utc>) -> Result<Self> {
        let raw: Option<RawFilterFile> = if source.trim().is_empty() {
            None
        } else {
            serde_yaml::from_str(source)
                .map_err(|e| anyhow!(CloudrmError::InvalidConfig(format!("filter file: {e}"))))?
        };

        let mut filter_set = Self::new();
        for (resource_type, entries) in raw.unwrap_or_default() {
            let filters = entries
                .unwrap_or_default()
                .iter()
                .enumerate()
                .map(|(index, entry)| {
                    TypeFilter::compile(entry, now).with_context(|| {
                        format!("filter entry {} of {resource_type}", index + 1)
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            filter_set.insert(&resource_type, filters);
        }

        debug!(
            resource_types = filter_set.filters.len(),
            "filter file has been loaded."
        );
        Ok(filter_set)
    }

    pub fn from_file(path: &Path, now: DateTime<Utc>) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            anyhow!(CloudrmError::InvalidConfig(format!(
                "failed to read filter file {}: {e}",
                path.display()
            )))
        })?;
        Self::from_yaml_str(&source, now)
    }

    /// Fail on the first pass over the file if any type is unknown, rejected
    /// by the registry, or not handled by the provider. Every offending type
    /// is named in the error.
    pub fn validate<F>(&self, is_supported: F) -> Result<()>
    where
        F: Fn(&str) -> bool,
    {
        let unsupported: Vec<String> = self
            .filters
            .keys()
            .filter_map(|resource_type| {
                if let Some(reason) = registry::rejection_reason(resource_type) {
                    Some(format!("{resource_type} ({reason})"))
                } else if !is_supported(resource_type) {
                    Some(resource_type.clone())
                } else {
                    None
                }
            })
            .collect();

        if unsupported.is_empty() {
            return Ok(());
        }
        Err(anyhow!(CloudrmError::UnsupportedResourceType(
            unsupported.join(", ")
        )))
    }

    /// Requested types, highest dependency rank first. Equal ranks keep
    /// lexical order.
    pub fn ordered_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.filters.keys().map(String::as_str).collect();
        // Stable sort over lexically ordered keys.
        types.sort_by_key(|resource_type| std::cmp::Reverse(registry::dependency_rank(resource_type)));
        types
    }

    pub fn is_match(&self, resource: &Resource) -> bool {
        match self.filters.get(&resource.resource_type) {
            None => false,
            Some(filters) if filters.is_empty() => true,
            Some(filters) => filters.iter().any(|filter| filter.matches(resource)),
        }
    }

    pub fn filters_for(&self, resource_type: &str) -> Option<&[TypeFilter]> {
        self.filters.get(resource_type).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }
}
