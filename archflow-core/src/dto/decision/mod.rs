//! Decision DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::choices::DecisionChoice;
use crate::workflow::JobKind;

/// Job parked until a choice is supplied
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwaitingDecision {
    pub job_id: Uuid,
    pub package_id: Uuid,
    pub chain_id: String,
    pub link_id: String,
    pub kind: JobKind,
    pub description: String,
    pub choices: Vec<DecisionChoice>,
    pub awaiting_since: DateTime<Utc>,
}

/// Request resolving a parked decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MakeDecision {
    /// Value of one of the offered choices
    pub choice: String,
}
