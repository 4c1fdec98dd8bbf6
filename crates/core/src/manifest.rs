//! Declarative `Bucket` manifests for the ACK S3 controller.

use serde::Serialize;

pub const BUCKET_API_VERSION: &str = "s3.services.k8s.aws/v1alpha1";
pub const BUCKET_KIND: &str = "Bucket";

/// Desired state of one bucket. Built once per attempt and never mutated.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Manifest {
    resource_name: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ManifestDocument<'a> {
    api_version: &'static str,
    kind: &'static str,
    metadata: NameField<'a>,
    spec: NameField<'a>,
}

#[derive(Serialize)]
struct NameField<'a> {
    name: &'a str,
}

impl Manifest {
    /// Builds the manifest for `resource_name`. Name validity is left to the
    /// controller.
    pub fn build(resource_name: impl Into<String>) -> Self {
        Self { resource_name: resource_name.into() }
    }

    pub fn kind(&self) -> &'static str {
        BUCKET_KIND
    }

    pub fn resource_name(&self) -> &str {
        &self.resource_name
    }

    /// Renders the YAML document submitted to `kubectl apply -f -`.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&ManifestDocument {
            api_version: BUCKET_API_VERSION,
            kind: BUCKET_KIND,
            metadata: NameField { name: &self.resource_name },
            spec: NameField { name: &self.resource_name },
        })
    }
}
