//! Bucket provisioning core: configuration, manifests, and the collision-aware
//! creation routine that drives an ACK controller through `kubectl`.

pub mod config;
pub mod controller;
pub mod creator;
pub mod errors;
pub mod logging;
pub mod manifest;

pub use controller::{
    classify_rejection, ApplyOutcome, CommandOutput, ControllerCli, KubectlCli, Phase, Rejection,
    ResourceController, SubmitMode,
};
pub use creator::{
    generate_bucket_name, AttemptOutcome, BucketCreationAttempt, CreationReport, CreationResult,
    RetryingCreator, DEFAULT_MAX_RETRIES, MAX_RETRIES_CAP,
};
pub use errors::ControllerError;
pub use manifest::{Manifest, BUCKET_API_VERSION, BUCKET_KIND};
