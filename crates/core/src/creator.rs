//! Collision-tolerant bucket creation on top of [`ResourceController`].

use std::fmt;

use rand::distributions::{Distribution, Uniform};
use tracing::{info, warn};

use crate::controller::{ApplyOutcome, Phase, ResourceController};
use crate::manifest::Manifest;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Upper bound for the configured default; per-request budgets are not capped.
pub const MAX_RETRIES_CAP: u32 = 10;

const NAME_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
// 36^8 is a little over 41 bits.
const NAME_SUFFIX_LEN: usize = 8;

/// Generates `<prefix>-<suffix>` with a random lowercase-alphanumeric suffix.
pub fn generate_bucket_name(prefix: &str) -> String {
    let mut rng = rand::thread_rng();
    let index = Uniform::from(0..NAME_ALPHABET.len());
    let suffix: String = (0..NAME_SUFFIX_LEN)
        .map(|_| char::from(NAME_ALPHABET[index.sample(&mut rng)]))
        .collect();
    format!("{prefix}-{suffix}")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    NameConflict,
    ValidationFailed,
    ApplyFailed,
}

impl AttemptOutcome {
    fn from_apply(outcome: &ApplyOutcome) -> Self {
        match outcome {
            ApplyOutcome::Applied { .. } => Self::Success,
            ApplyOutcome::Conflict { .. } => Self::NameConflict,
            ApplyOutcome::Failed { phase: Phase::Validation, .. } => Self::ValidationFailed,
            ApplyOutcome::Failed { phase: Phase::Apply, .. } => Self::ApplyFailed,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BucketCreationAttempt {
    pub candidate_name: String,
    pub attempt_index: u32,
    pub outcome: AttemptOutcome,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CreationResult {
    Created { name: String, dry_run_output: String, apply_output: String },
    Failed { name: String, phase: Phase, details: String },
    Exhausted { attempts: u32, last_details: String },
}

/// Final outcome of one creation request. Exhausting the retry budget is a
/// normal result, rendered like any other.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreationReport {
    pub attempts: Vec<BucketCreationAttempt>,
    pub result: CreationResult,
}

impl CreationReport {
    pub fn is_success(&self) -> bool {
        matches!(self.result, CreationResult::Created { .. })
    }
}

impl fmt::Display for CreationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.result {
            CreationResult::Created { name, dry_run_output, apply_output } => write!(
                f,
                "Successfully validated and created bucket: {name}\n\
                 Dry run output: {}\n\
                 Apply output: {}",
                dry_run_output.trim_end(),
                apply_output.trim_end()
            ),
            CreationResult::Failed { name, phase, details } => {
                write!(f, "Error creating bucket {name} ({phase} failed): {details}")
            }
            CreationResult::Exhausted { attempts, last_details } => write!(
                f,
                "Failed to create bucket after {attempts} attempts. Last error: {last_details}"
            ),
        }
    }
}

pub struct RetryingCreator {
    controller: ResourceController,
    name_prefix: String,
}

impl RetryingCreator {
    pub fn new(controller: ResourceController, name_prefix: impl Into<String>) -> Self {
        Self { controller, name_prefix: name_prefix.into() }
    }

    /// Creates a bucket, retrying only on name conflicts.
    ///
    /// A blank `requested_name` is treated as absent. A `max_retries` of zero
    /// still makes one attempt.
    pub async fn create(&self, requested_name: Option<&str>, max_retries: u32) -> CreationReport {
        let max_retries = max_retries.max(1);
        let base_name = match requested_name.map(str::trim).filter(|name| !name.is_empty()) {
            Some(name) => name.to_string(),
            None => generate_bucket_name(&self.name_prefix),
        };

        let mut attempts = Vec::new();
        let mut last_details = String::new();

        for attempt in 0..max_retries {
            let candidate =
                if attempt == 0 { base_name.clone() } else { format!("{base_name}-{attempt}") };
            let outcome = self.controller.validate_and_apply(&Manifest::build(&candidate)).await;

            attempts.push(BucketCreationAttempt {
                candidate_name: candidate.clone(),
                attempt_index: attempt,
                outcome: AttemptOutcome::from_apply(&outcome),
            });

            match outcome {
                ApplyOutcome::Applied { dry_run_output, apply_output } => {
                    info!(
                        event_name = "creator.bucket.created",
                        candidate = %candidate,
                        attempt,
                        "bucket created"
                    );
                    return CreationReport {
                        attempts,
                        result: CreationResult::Created {
                            name: candidate,
                            dry_run_output,
                            apply_output,
                        },
                    };
                }
                ApplyOutcome::Conflict { details, .. } => {
                    warn!(
                        event_name = "creator.bucket.conflict",
                        candidate = %candidate,
                        attempt,
                        max_retries,
                        "bucket name already in use"
                    );
                    last_details = details;
                }
                ApplyOutcome::Failed { phase, details } => {
                    warn!(
                        event_name = "creator.bucket.failed",
                        candidate = %candidate,
                        attempt,
                        phase = %phase,
                        "bucket creation failed"
                    );
                    return CreationReport {
                        attempts,
                        result: CreationResult::Failed { name: candidate, phase, details },
                    };
                }
            }
        }

        warn!(
            event_name = "creator.bucket.exhausted",
            base_name = %base_name,
            max_retries,
            "bucket creation retries exhausted"
        );
        CreationReport { attempts, result: CreationResult::Exhausted { attempts: max_retries, last_details } }
    }
}
