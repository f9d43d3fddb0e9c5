use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use dyn_clone::DynClone;

use crate::config::ClientConfig;
use crate::types::RawResource;

pub mod aws;

/// Type alias for a boxed provider trait object.
pub type Provider = Box<dyn ProviderTrait + Send + Sync>;

/// Cloud-side collaborator of the deletion pipeline.
///
/// The pipeline never talks to a cloud API directly: it asks the provider
/// which types it can handle, lists the raw records of one type at a time,
/// and destroys matches one resource per call. Implementations must allow
/// concurrent `destroy` calls for distinct resources of the same type.
#[async_trait]
pub trait ProviderTrait: DynClone {
    /// Whether this provider can enumerate and destroy `resource_type`.
    fn is_supported(&self, resource_type: &str) -> bool;

    /// List every live record of `resource_type`.
    ///
    /// Listing failures are unrecoverable: the pipeline aborts the run.
    async fn list_resources(&self, resource_type: &str) -> Result<Vec<RawResource>>;

    /// Destroy one resource.
    ///
    /// `attributes` carries the extra inputs some types need (the VPC an
    /// internet gateway is attached to, `force_destroy` for buckets). A
    /// failure here is reported for this resource only.
    async fn destroy(
        &self,
        resource_type: &str,
        id: &str,
        attributes: &BTreeMap<String, String>,
    ) -> Result<()>;
}

dyn_clone::clone_trait_object!(ProviderTrait);

/// Create the AWS provider from the client configuration.
pub async fn create_provider(client_config: &ClientConfig) -> Provider {
    Box::new(aws::AwsProvider::new(client_config).await)
}
