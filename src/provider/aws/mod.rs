pub mod client_builder;

use std::collections::BTreeMap;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_ec2::error::SdkError;
use aws_sdk_ec2::types::Filter;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use aws_smithy_types::error::metadata::ProvideErrorMetadata;
use aws_smithy_types_convert::date_time::DateTimeExt;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::config::ClientConfig;
use crate::provider::ProviderTrait;
use crate::types::RawResource;
use crate::types::error::CloudrmError;

/// Resource types this provider can enumerate and destroy.
pub const SUPPORTED_TYPES: [&str; 12] = [
    "aws_instance",
    "aws_key_pair",
    "aws_nat_gateway",
    "aws_eip",
    "aws_internet_gateway",
    "aws_subnet",
    "aws_route_table",
    "aws_security_group",
    "aws_vpc",
    "aws_s3_bucket",
    "aws_ami",
    "aws_ebs_volume",
];

const DEFAULT_SECURITY_GROUP_NAME: &str = "default";
const S3_DELETE_OBJECTS_LIMIT: usize = 1000;
const S3_NO_SUCH_TAG_SET: &str = "NoSuchTagSet";

/// Extracts the error code and message from an AWS SDK error.
///
/// For service errors, returns the API error code (e.g. "DependencyViolation")
/// and the message from the response. For other error types (network,
/// timeout, construction failure), returns "N/A" as the code and the full
/// error description as the message.
fn extract_sdk_error_details<E: std::fmt::Display + ProvideErrorMetadata>(
    e: &SdkError<E>,
) -> (String, String) {
    if let Some(service_err) = e.as_service_error() {
        (
            service_err.code().unwrap_or("unknown").to_string(),
            service_err.message().unwrap_or("no message").to_string(),
        )
    } else {
        ("N/A".to_string(), e.to_string())
    }
}

fn sdk_error<E: std::fmt::Display + ProvideErrorMetadata>(e: SdkError<E>) -> anyhow::Error {
    let (code, message) = extract_sdk_error_details(&e);
    anyhow!("{code}: {message}")
}

/// `GetBucketTagging` answers an untagged bucket with an error.
fn is_missing_tag_set(code: &str) -> bool {
    code == S3_NO_SUCH_TAG_SET
}

/// The account's default VPC is never listed.
fn vpc_record(vpc: &aws_sdk_ec2::types::Vpc) -> Option<RawResource> {
    if vpc.is_default().unwrap_or(false) {
        return None;
    }
    Some(
        RawResource::new()
            .with_field("VpcId", vpc.vpc_id()?)
            .with_field("Tags", ec2_tags(vpc.tags())),
    )
}

fn ec2_tags(tags: &[aws_sdk_ec2::types::Tag]) -> Value {
    Value::Array(
        tags.iter()
            .map(|tag| json!({"Key": tag.key(), "Value": tag.value()}))
            .collect(),
    )
}

fn epoch_seconds(time: Option<&aws_smithy_types::DateTime>) -> Value {
    time.map_or(Value::Null, |t| json!(t.secs()))
}

/// AWS implementation of [`ProviderTrait`] backed by the EC2 and S3 APIs.
#[derive(Clone)]
pub struct AwsProvider {
    ec2: aws_sdk_ec2::Client,
    s3: aws_sdk_s3::Client,
}

impl AwsProvider {
    pub async fn new(client_config: &ClientConfig) -> Self {
        let sdk_config = client_config.load_sdk_config().await;
        Self::from_sdk_config(&sdk_config)
    }

    pub fn from_sdk_config(sdk_config: &SdkConfig) -> Self {
        Self {
            ec2: aws_sdk_ec2::Client::new(sdk_config),
            s3: aws_sdk_s3::Client::new(sdk_config),
        }
    }

    async fn list_instances(&self) -> Result<Vec<RawResource>> {
        let state_filter = Filter::builder()
            .name("instance-state-name")
            .values("pending")
            .values("running")
            .values("stopping")
            .values("stopped")
            .build();
        let pages = self
            .ec2
            .describe_instances()
            .filters(state_filter)
            .into_paginator()
            .send()
            .try_collect()
            .await
            .map_err(sdk_error)?;

        Ok(pages
            .iter()
            .flat_map(|page| page.reservations())
            .flat_map(|reservation| reservation.instances())
            .filter_map(|instance| {
                Some(
                    RawResource::new()
                        .with_field("InstanceId", instance.instance_id()?)
                        .with_field("Tags", ec2_tags(instance.tags()))
                        .with_field("LaunchTime", epoch_seconds(instance.launch_time())),
                )
            })
            .collect())
    }

    async fn list_key_pairs(&self) -> Result<Vec<RawResource>> {
        let output = self
            .ec2
            .describe_key_pairs()
            .send()
            .await
            .map_err(sdk_error)?;

        Ok(output
            .key_pairs()
            .iter()
            .filter_map(|key_pair| {
                Some(
                    RawResource::new()
                        .with_field("KeyName", key_pair.key_name()?)
                        .with_field("Tags", ec2_tags(key_pair.tags()))
                        .with_field("CreateTime", epoch_seconds(key_pair.create_time())),
                )
            })
            .collect())
    }

    async fn list_nat_gateways(&self) -> Result<Vec<RawResource>> {
        let state_filter = Filter::builder()
            .name("state")
            .values("pending")
            .values("available")
            .build();
        let pages = self
            .ec2
            .describe_nat_gateways()
            .filter(state_filter)
            .into_paginator()
            .send()
            .try_collect()
            .await
            .map_err(sdk_error)?;

        Ok(pages
            .iter()
            .flat_map(|page| page.nat_gateways())
            .filter_map(|nat_gateway| {
                Some(
                    RawResource::new()
                        .with_field("NatGatewayId", nat_gateway.nat_gateway_id()?)
                        .with_field("Tags", ec2_tags(nat_gateway.tags()))
                        .with_field("CreateTime", epoch_seconds(nat_gateway.create_time())),
                )
            })
            .collect())
    }

    async fn list_addresses(&self) -> Result<Vec<RawResource>> {
        let output = self
            .ec2
            .describe_addresses()
            .send()
            .await
            .map_err(sdk_error)?;

        Ok(output
            .addresses()
            .iter()
            .filter_map(|address| {
                let mut raw = RawResource::new()
                    .with_field("AllocationId", address.allocation_id()?)
                    .with_field("Tags", ec2_tags(address.tags()));
                if let Some(association_id) = address.association_id() {
                    raw.set_field("AssociationId", association_id);
                }
                Some(raw)
            })
            .collect())
    }

    async fn list_internet_gateways(&self) -> Result<Vec<RawResource>> {
        let pages = self
            .ec2
            .describe_internet_gateways()
            .into_paginator()
            .send()
            .try_collect()
            .await
            .map_err(sdk_error)?;

        Ok(pages
            .iter()
            .flat_map(|page| page.internet_gateways())
            .filter_map(|gateway| {
                let mut raw = RawResource::new()
                    .with_field("InternetGatewayId", gateway.internet_gateway_id()?)
                    .with_field("Tags", ec2_tags(gateway.tags()));
                if let Some(vpc_id) = gateway.attachments().iter().find_map(|a| a.vpc_id()) {
                    raw.set_field("VpcId", vpc_id);
                }
                Some(raw)
            })
            .collect())
    }

    async fn list_subnets(&self) -> Result<Vec<RawResource>> {
        let pages = self
            .ec2
            .describe_subnets()
            .into_paginator()
            .send()
            .try_collect()
            .await
            .map_err(sdk_error)?;

        Ok(pages
            .iter()
            .flat_map(|page| page.subnets())
            .filter_map(|subnet| {
                Some(
                    RawResource::new()
                        .with_field("SubnetId", subnet.subnet_id()?)
                        .with_field("Tags", ec2_tags(subnet.tags())),
                )
            })
            .collect())
    }

    /// Main route tables are left out: they go away with their VPC.
    async fn list_route_tables(&self) -> Result<Vec<RawResource>> {
        let pages = self
            .ec2
            .describe_route_tables()
            .into_paginator()
            .send()
            .try_collect()
            .await
            .map_err(sdk_error)?;

        Ok(pages
            .iter()
            .flat_map(|page| page.route_tables())
            .filter(|table| {
                !table
                    .associations()
                    .iter()
                    .any(|association| association.main() == Some(true))
            })
            .filter_map(|table| {
                Some(
                    RawResource::new()
                        .with_field("RouteTableId", table.route_table_id()?)
                        .with_field("Tags", ec2_tags(table.tags())),
                )
            })
            .collect())
    }

    /// Default security groups cannot be deleted and are never listed.
    async fn list_security_groups(&self) -> Result<Vec<RawResource>> {
        let pages = self
            .ec2
            .describe_security_groups()
            .into_paginator()
            .send()
            .try_collect()
            .await
            .map_err(sdk_error)?;

        Ok(pages
            .iter()
            .flat_map(|page| page.security_groups())
            .filter(|group| group.group_name() != Some(DEFAULT_SECURITY_GROUP_NAME))
            .filter_map(|group| {
                Some(
                    RawResource::new()
                        .with_field("GroupId", group.group_id()?)
                        .with_field("Tags", ec2_tags(group.tags())),
                )
            })
            .collect())
    }

    async fn list_vpcs(&self) -> Result<Vec<RawResource>> {
        let pages = self
            .ec2
            .describe_vpcs()
            .into_paginator()
            .send()
            .try_collect()
            .await
            .map_err(sdk_error)?;

        Ok(pages
            .iter()
            .flat_map(|page| page.vpcs())
            .filter_map(vpc_record)
            .collect())
    }

    async fn list_volumes(&self) -> Result<Vec<RawResource>> {
        let pages = self
            .ec2
            .describe_volumes()
            .into_paginator()
            .send()
            .try_collect()
            .await
            .map_err(sdk_error)?;

        Ok(pages
            .iter()
            .flat_map(|page| page.volumes())
            .filter_map(|volume| {
                Some(
                    RawResource::new()
                        .with_field("VolumeId", volume.volume_id()?)
                        .with_field("Tags", ec2_tags(volume.tags()))
                        .with_field("CreateTime", epoch_seconds(volume.create_time())),
                )
            })
            .collect())
    }

    /// Only images owned by the calling account.
    async fn list_images(&self) -> Result<Vec<RawResource>> {
        let output = self
            .ec2
            .describe_images()
            .owners("self")
            .send()
            .await
            .map_err(sdk_error)?;

        Ok(output
            .images()
            .iter()
            .filter_map(|image| {
                let mut raw = RawResource::new()
                    .with_field("ImageId", image.image_id()?)
                    .with_field("Tags", ec2_tags(image.tags()));
                if let Some(creation_date) = image.creation_date() {
                    raw.set_field("CreationDate", creation_date);
                }
                Some(raw)
            })
            .collect())
    }

    /// Bucket tags need one extra call per bucket. Only `NoSuchTagSet` means
    /// untagged; a bucket whose tags cannot be read is left out, otherwise
    /// a `NOT(key)` or `tagged: false` rule would select it.
    async fn list_buckets(&self) -> Result<Vec<RawResource>> {
        let output = self.s3.list_buckets().send().await.map_err(sdk_error)?;

        let mut resources = Vec::new();
        for bucket in output.buckets() {
            let Some(name) = bucket.name() else {
                continue;
            };

            let tag_set = match self.s3.get_bucket_tagging().bucket(name).send().await {
                Ok(tagging) => Value::Array(
                    tagging
                        .tag_set()
                        .iter()
                        .map(|tag| json!({"Key": tag.key(), "Value": tag.value()}))
                        .collect(),
                ),
                Err(e) => {
                    let (code, message) = extract_sdk_error_details(&e);
                    if !is_missing_tag_set(&code) {
                        warn!(
                            bucket = name,
                            code = code,
                            "bucket skipped, its tags cannot be read: {message}"
                        );
                        continue;
                    }
                    Value::Array(vec![])
                }
            };

            let mut raw = RawResource::new()
                .with_field("Name", name)
                .with_field("TagSet", tag_set);
            if let Some(creation_date) = bucket
                .creation_date()
                .and_then(|t| t.to_chrono_utc().ok())
            {
                raw.set_field("CreationDate", creation_date.to_rfc3339());
            }
            resources.push(raw);
        }

        Ok(resources)
    }

    async fn release_address(&self, id: &str, association_id: Option<&String>) -> Result<()> {
        if let Some(association_id) = association_id {
            self.ec2
                .disassociate_address()
                .association_id(association_id)
                .send()
                .await
                .map_err(sdk_error)
                .context("disassociate address")?;
        }
        self.ec2
            .release_address()
            .allocation_id(id)
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(())
    }

    async fn delete_internet_gateway(&self, id: &str, vpc_id: Option<&String>) -> Result<()> {
        if let Some(vpc_id) = vpc_id {
            self.ec2
                .detach_internet_gateway()
                .internet_gateway_id(id)
                .vpc_id(vpc_id)
                .send()
                .await
                .map_err(sdk_error)
                .context("detach internet gateway")?;
        }
        self.ec2
            .delete_internet_gateway()
            .internet_gateway_id(id)
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(())
    }

    /// Subnet associations are removed first, a table cannot be deleted while associated.
    async fn delete_route_table(&self, id: &str) -> Result<()> {
        let output = self
            .ec2
            .describe_route_tables()
            .route_table_ids(id)
            .send()
            .await
            .map_err(sdk_error)?;

        let association_ids = output
            .route_tables()
            .iter()
            .flat_map(|table| table.associations())
            .filter(|association| association.main() != Some(true))
            .filter_map(|association| association.route_table_association_id());
        for association_id in association_ids {
            self.ec2
                .disassociate_route_table()
                .association_id(association_id)
                .send()
                .await
                .map_err(sdk_error)
                .context("disassociate route table")?;
        }

        self.ec2
            .delete_route_table()
            .route_table_id(id)
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str, force_destroy: bool) -> Result<()> {
        if force_destroy {
            self.empty_bucket(bucket).await?;
        }
        self.s3
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(())
    }

    /// Delete every object version and delete marker, in batches of at most 1000.
    async fn empty_bucket(&self, bucket: &str) -> Result<()> {
        let mut key_marker: Option<String> = None;
        let mut version_id_marker: Option<String> = None;

        loop {
            let output = self
                .s3
                .list_object_versions()
                .bucket(bucket)
                .set_key_marker(key_marker.take())
                .set_version_id_marker(version_id_marker.take())
                .send()
                .await
                .map_err(sdk_error)
                .context("list object versions")?;

            let versions = output
                .versions()
                .iter()
                .map(|v| (v.key(), v.version_id()));
            let markers = output
                .delete_markers()
                .iter()
                .map(|m| (m.key(), m.version_id()));
            let identifiers = versions
                .chain(markers)
                .filter_map(|(key, version_id)| {
                    ObjectIdentifier::builder()
                        .set_key(key.map(str::to_string))
                        .set_version_id(version_id.map(str::to_string))
                        .build()
                        .ok()
                })
                .collect::<Vec<_>>();

            for chunk in identifiers.chunks(S3_DELETE_OBJECTS_LIMIT) {
                let delete = Delete::builder()
                    .set_objects(Some(chunk.to_vec()))
                    .quiet(true)
                    .build()?;
                let result = self
                    .s3
                    .delete_objects()
                    .bucket(bucket)
                    .delete(delete)
                    .send()
                    .await
                    .map_err(sdk_error)
                    .context("delete objects")?;
                for error in result.errors() {
                    warn!(
                        bucket = bucket,
                        key = error.key(),
                        code = error.code(),
                        "failed to delete object while emptying bucket."
                    );
                }
            }

            if output.is_truncated() != Some(true) {
                return Ok(());
            }
            key_marker = output.next_key_marker().map(str::to_string);
            version_id_marker = output.next_version_id_marker().map(str::to_string);
        }
    }
}

#[async_trait]
impl ProviderTrait for AwsProvider {
    fn is_supported(&self, resource_type: &str) -> bool {
        SUPPORTED_TYPES.contains(&resource_type)
    }

    async fn list_resources(&self, resource_type: &str) -> Result<Vec<RawResource>> {
        let result = match resource_type {
            "aws_instance" => self.list_instances().await,
            "aws_key_pair" => self.list_key_pairs().await,
            "aws_nat_gateway" => self.list_nat_gateways().await,
            "aws_eip" => self.list_addresses().await,
            "aws_internet_gateway" => self.list_internet_gateways().await,
            "aws_subnet" => self.list_subnets().await,
            "aws_route_table" => self.list_route_tables().await,
            "aws_security_group" => self.list_security_groups().await,
            "aws_vpc" => self.list_vpcs().await,
            "aws_s3_bucket" => self.list_buckets().await,
            "aws_ami" => self.list_images().await,
            "aws_ebs_volume" => self.list_volumes().await,
            _ => {
                return Err(anyhow!(CloudrmError::UnsupportedResourceType(
                    resource_type.to_string()
                )));
            }
        };

        result.map_err(|e| {
            anyhow!(CloudrmError::Enumeration {
                resource_type: resource_type.to_string(),
                message: format!("{e:#}"),
            })
        })
    }

    async fn destroy(
        &self,
        resource_type: &str,
        id: &str,
        attributes: &BTreeMap<String, String>,
    ) -> Result<()> {
        let result = match resource_type {
            "aws_instance" => self
                .ec2
                .terminate_instances()
                .instance_ids(id)
                .send()
                .await
                .map(|_| ())
                .map_err(sdk_error),
            "aws_key_pair" => self
                .ec2
                .delete_key_pair()
                .key_name(id)
                .send()
                .await
                .map(|_| ())
                .map_err(sdk_error),
            "aws_nat_gateway" => self
                .ec2
                .delete_nat_gateway()
                .nat_gateway_id(id)
                .send()
                .await
                .map(|_| ())
                .map_err(sdk_error),
            "aws_eip" => {
                self.release_address(id, attributes.get("association_id"))
                    .await
            }
            "aws_internet_gateway" => {
                self.delete_internet_gateway(id, attributes.get("vpc_id"))
                    .await
            }
            "aws_subnet" => self
                .ec2
                .delete_subnet()
                .subnet_id(id)
                .send()
                .await
                .map(|_| ())
                .map_err(sdk_error),
            "aws_route_table" => self.delete_route_table(id).await,
            "aws_security_group" => self
                .ec2
                .delete_security_group()
                .group_id(id)
                .send()
                .await
                .map(|_| ())
                .map_err(sdk_error),
            "aws_vpc" => self
                .ec2
                .delete_vpc()
                .vpc_id(id)
                .send()
                .await
                .map(|_| ())
                .map_err(sdk_error),
            "aws_s3_bucket" => {
                let force_destroy = attributes
                    .get("force_destroy")
                    .is_some_and(|v| v == "true");
                self.delete_bucket(id, force_destroy).await
            }
            "aws_ami" => self
                .ec2
                .deregister_image()
                .image_id(id)
                .send()
                .await
                .map(|_| ())
                .map_err(sdk_error),
            "aws_ebs_volume" => self
                .ec2
                .delete_volume()
                .volume_id(id)
                .send()
                .await
                .map(|_| ())
                .map_err(sdk_error),
            _ => {
                return Err(anyhow!(CloudrmError::UnsupportedResourceType(
                    resource_type.to_string()
                )));
            }
        };

        match result {
            Ok(()) => {
                info!(resource_type = resource_type, id = id, "resource destroyed.");
                Ok(())
            }
            Err(e) => Err(anyhow!(CloudrmError::Destroy {
                resource_type: resource_type.to_string(),
                id: id.to_string(),
                message: format!("{e:#}"),
            })),
        }
    }
}
