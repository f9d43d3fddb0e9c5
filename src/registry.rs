//! Supported resource types, their dependency ranks and record normalizers.
//!
//! Each entry describes how a provider-native record of that type is turned
//! into a [`Resource`]: which field carries the ID, which fields may carry
//! the creation time, and which fields the destroy call needs as attributes.
//!
//! Ranks order whole types: a higher rank is destroyed earlier, so a
//! dependent (an instance in a subnet) always ranks above what it depends on
//! (the subnet, then the VPC).

use std::collections::BTreeMap;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::warn;

use crate::types::error::CloudrmError;
use crate::types::{RawResource, Resource};

/// Field names carrying tags, tried in order.
const TAG_FIELDS: [&str; 2] = ["Tags", "TagSet"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryEntry {
    pub name: &'static str,
    pub dependency_rank: i32,
    pub id_field: &'static str,
    /// Candidate creation-time fields, tried in order.
    pub created_fields: &'static [&'static str],
    /// `(attribute name, raw field)` pairs passed on to `destroy`.
    pub attribute_fields: &'static [(&'static str, &'static str)],
    pub static_attributes: &'static [(&'static str, &'static str)],
    /// Set for types that must never be enumerated.
    pub rejection: Option<&'static str>,
}

const fn entry(
    name: &'static str,
    dependency_rank: i32,
    id_field: &'static str,
    created_fields: &'static [&'static str],
) -> RegistryEntry {
    RegistryEntry {
        name,
        dependency_rank,
        id_field,
        created_fields,
        attribute_fields: &[],
        static_attributes: &[],
        rejection: None,
    }
}

pub static REGISTRY: &[RegistryEntry] = &[
    entry("aws_instance", 9980, "InstanceId", &["LaunchTime"]),
    entry("aws_key_pair", 9970, "KeyName", &["CreateTime"]),
    entry("aws_nat_gateway", 9940, "NatGatewayId", &["CreateTime"]),
    RegistryEntry {
        attribute_fields: &[("association_id", "AssociationId")],
        ..entry("aws_eip", 9890, "AllocationId", &[])
    },
    RegistryEntry {
        attribute_fields: &[("vpc_id", "VpcId")],
        ..entry("aws_internet_gateway", 9880, "InternetGatewayId", &[])
    },
    entry("aws_subnet", 9870, "SubnetId", &[]),
    entry("aws_route_table", 9860, "RouteTableId", &[]),
    entry("aws_security_group", 9850, "GroupId", &[]),
    entry("aws_vpc", 9830, "VpcId", &[]),
    RegistryEntry {
        static_attributes: &[("force_destroy", "true")],
        ..entry("aws_s3_bucket", 9750, "Name", &["CreationDate"])
    },
    entry("aws_ami", 9740, "ImageId", &["CreationDate"]),
    entry("aws_ebs_volume", 9730, "VolumeId", &["CreateTime"]),
    RegistryEntry {
        rejection: Some("refreshing its state crashes the provider, delete it with the owning role or policy"),
        ..entry("aws_iam_policy_attachment", 9000, "PolicyArn", &[])
    },
];

pub fn lookup(resource_type: &str) -> Option<&'static RegistryEntry> {
    REGISTRY.iter().find(|e| e.name == resource_type)
}

/// Known and not rejected.
pub fn is_supported(resource_type: &str) -> bool {
    lookup(resource_type).is_some_and(|e| e.rejection.is_none())
}

pub fn rejection_reason(resource_type: &str) -> Option<&'static str> {
    lookup(resource_type).and_then(|e| e.rejection)
}

/// Types outside the table rank 0 and therefore come after every known type.
pub fn dependency_rank(resource_type: &str) -> i32 {
    lookup(resource_type).map_or(0, |e| e.dependency_rank)
}

/// Turn a provider-native record into a [`Resource`].
pub fn normalize(resource_type: &str, raw: &RawResource) -> Result<Resource> {
    let entry = lookup(resource_type)
        .ok_or_else(|| anyhow!(CloudrmError::UnsupportedResourceType(resource_type.to_string())))?;

    let id = raw.get_str(entry.id_field).ok_or_else(|| {
        anyhow!(CloudrmError::Enumeration {
            resource_type: resource_type.to_string(),
            message: format!("record without a string '{}' field", entry.id_field),
        })
    })?;

    let mut resource = Resource::new(resource_type, id);
    resource.tags = extract_tags(raw);
    resource.created_at = entry
        .created_fields
        .iter()
        .find_map(|field| raw.get(field))
        .and_then(|value| {
            let created_at = parse_created_at(value);
            if created_at.is_none() {
                warn!(
                    resource_type = resource_type,
                    id = id,
                    value = %value,
                    "creation time could not be parsed, treating as absent."
                );
            }
            created_at
        });

    for (attribute, field) in entry.attribute_fields {
        if let Some(value) = raw.get(field).and_then(value_as_string) {
            resource.attributes.insert(attribute.to_string(), value);
        }
    }
    for (attribute, value) in entry.static_attributes {
        resource
            .attributes
            .insert(attribute.to_string(), value.to_string());
    }

    Ok(resource)
}

/// Tags from `Tags` or `TagSet`: either a `[{Key, Value}]` list or a plain map.
pub fn extract_tags(raw: &RawResource) -> BTreeMap<String, String> {
    let Some(value) = TAG_FIELDS.iter().find_map(|field| raw.get(field)) else {
        return BTreeMap::new();
    };

    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| {
                let key = item.get("Key")?.as_str()?;
                let value = item.get("Value").and_then(Value::as_str).unwrap_or("");
                Some((key.to_string(), value.to_string()))
            })
            .collect(),
        Value::Object(map) => map
            .iter()
            .filter_map(|(k, v)| value_as_string(v).map(|v| (k.clone(), v)))
            .collect(),
        _ => BTreeMap::new(),
    }
}

/// Epoch seconds (integer or fractional) or an RFC 3339 string.
pub fn parse_created_at(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(number) => {
            if let Some(secs) = number.as_i64() {
                DateTime::from_timestamp(secs, 0)
            } else {
                let secs = number.as_f64()?;
                DateTime::from_timestamp_millis((secs * 1000.0).round() as i64)
            }
        }
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        _ => None,
    }
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
