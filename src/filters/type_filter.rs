//! A single selection rule for one resource type.
//!
//! Every field that is present must hold (AND); absent fields impose no
//! constraint, so `TypeFilter::default()` selects every resource.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use tracing::debug;

use crate::filters::created::CreatedWindow;
use crate::filters::pattern::{PatternRule, strip_not_wrapper};
use crate::types::Resource;

/// One list entry of the filter file, as written by the user.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FilterEntry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub tagged: Option<bool>,
    #[serde(default, deserialize_with = "deserialize_tag_patterns")]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub created: Option<CreatedEntry>,
}

/// Tag patterns may be written as bare YAML scalars (`Owner: 12345`,
/// `keep: true`); they are matched against their string form.
fn deserialize_tag_patterns<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, serde_yaml::Value>>::deserialize(deserializer)?;
    raw.unwrap_or_default()
        .into_iter()
        .map(|(key, value)| {
            let pattern = match value {
                serde_yaml::Value::String(s) => s,
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::Bool(b) => b.to_string(),
                other => {
                    return Err(D::Error::custom(format!(
                        "tag '{key}' must be a string, number or boolean pattern, found {other:?}"
                    )));
                }
            };
            Ok((key, pattern))
        })
        .collect()
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CreatedEntry {
    #[serde(default)]
    pub before: Option<String>,
    #[serde(default)]
    pub after: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TagRule {
    pub key: String,
    pub rule: PatternRule,
}

#[derive(Debug, Clone, Default)]
pub struct TypeFilter {
    pub id_rule: Option<PatternRule>,
    pub tagged: Option<bool>,
    /// Plain tag keys: the tag must exist and its value must satisfy the rule.
    pub include_tags: Vec<TagRule>,
    /// `NOT(key)` tag keys: if the tag exists its value must not satisfy the rule.
    pub exclude_tags: Vec<TagRule>,
    pub created: Option<CreatedWindow>,
}

impl TypeFilter {
    /// Compile a filter-file entry. Patterns and time bounds are checked here,
    /// so a broken entry fails at load time instead of per resource.
    pub fn compile(entry: &FilterEntry, now: DateTime<Utc>) -> Result<Self> {
        let id_rule = entry.id.as_deref().map(PatternRule::parse).transpose()?;

        let mut include_tags = Vec::new();
        let mut exclude_tags = Vec::new();
        for (key, pattern) in &entry.tags {
            let rule = PatternRule::parse(pattern)?;
            match strip_not_wrapper(key) {
                Some(excluded_key) => exclude_tags.push(TagRule {
                    key: excluded_key.to_string(),
                    rule,
                }),
                None => include_tags.push(TagRule {
                    key: key.clone(),
                    rule,
                }),
            }
        }

        let created = match &entry.created {
            Some(created) => {
                let window =
                    CreatedWindow::parse(created.before.as_deref(), created.after.as_deref(), now)?;
                (!window.is_empty()).then_some(window)
            }
            None => None,
        };

        Ok(Self {
            id_rule,
            tagged: entry.tagged,
            include_tags,
            exclude_tags,
            created,
        })
    }

    pub fn matches(&self, resource: &Resource) -> bool {
        if !match_id(self.id_rule.as_ref(), &resource.id) {
            debug!(
                resource_type = %resource.resource_type,
                id = %resource.id,
                "resource filtered by id."
            );
            return false;
        }
        if !match_tagged(self.tagged, &resource.tags) {
            debug!(
                resource_type = %resource.resource_type,
                id = %resource.id,
                tagged = ?self.tagged,
                "resource filtered by tagged."
            );
            return false;
        }
        if !match_tags(&self.include_tags, &self.exclude_tags, &resource.tags) {
            debug!(
                resource_type = %resource.resource_type,
                id = %resource.id,
                "resource filtered by tags."
            );
            return false;
        }
        if !match_created(self.created.as_ref(), resource.created_at) {
            debug!(
                resource_type = %resource.resource_type,
                id = %resource.id,
                created_at = ?resource.created_at,
                "resource filtered by creation time."
            );
            return false;
        }
        true
    }
}

pub fn match_id(rule: Option<&PatternRule>, id: &str) -> bool {
    rule.is_none_or(|rule| rule.is_match(id))
}

pub fn match_tagged(tagged: Option<bool>, tags: &BTreeMap<String, String>) -> bool {
    match tagged {
        None => true,
        Some(true) => !tags.is_empty(),
        Some(false) => tags.is_empty(),
    }
}

/// Inclusion rules need the key to be present. Exclusion rules only bite when
/// the key is present and its value satisfies the rule; a missing key passes.
pub fn match_tags(
    include: &[TagRule],
    exclude: &[TagRule],
    tags: &BTreeMap<String, String>,
) -> bool {
    let included = include.iter().all(|tag_rule| {
        tags.get(&tag_rule.key)
            .is_some_and(|value| tag_rule.rule.is_match(value))
    });
    if !included {
        return false;
    }

    exclude.iter().all(|tag_rule| {
        tags.get(&tag_rule.key)
            .is_none_or(|value| !tag_rule.rule.is_match(value))
    })
}

pub fn match_created(window: Option<&CreatedWindow>, created_at: Option<DateTime<Utc>>) -> bool {
    window.is_none_or(|window| window.contains(created_at))
}
