//! Handoff packages passed from one phase to the next.
//!
//! The package digest is the SHA-256 hex of the serialised
//! `(from, to, artifacts, context)` tuple; [`HandoffPackage::verify`]
//! re-derives it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::context::SmartContext;
use crate::domain::WorkflowPhase;

use super::error::{WorkflowError, WorkflowResult};
use super::state::Artifact;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffPackage {
    pub id: String,
    pub from: WorkflowPhase,
    pub to: WorkflowPhase,
    pub artifacts: BTreeMap<String, Artifact>,
    pub context: Option<SmartContext>,
    pub created_at: DateTime<Utc>,
    pub digest: String,
}

impl HandoffPackage {
    pub fn build(
        from: WorkflowPhase,
        to: WorkflowPhase,
        artifacts: BTreeMap<String, Artifact>,
        context: Option<SmartContext>,
    ) -> WorkflowResult<Self> {
        let digest = digest_of(from, to, &artifacts, &context)?;
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            from,
            to,
            artifacts,
            context,
            created_at: Utc::now(),
            digest,
        })
    }

    /// Fails with [`WorkflowError::DigestMismatch`] if the contents changed
    /// after the package was built.
    pub fn verify(&self) -> WorkflowResult<()> {
        let actual = digest_of(self.from, self.to, &self.artifacts, &self.context)?;
        if actual != self.digest {
            return Err(WorkflowError::DigestMismatch {
                expected: self.digest.clone(),
                actual,
            });
        }
        Ok(())
    }

    pub fn context_preserved(&self) -> bool {
        self.context.is_some()
    }
}

fn digest_of(
    from: WorkflowPhase,
    to: WorkflowPhase,
    artifacts: &BTreeMap<String, Artifact>,
    context: &Option<SmartContext>,
) -> WorkflowResult<String> {
    let bytes = serde_json::to_vec(&(from, to, artifacts, context))?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}
