//! ID resolver module
//!
//! Resolves job ID prefixes against the decisions the scheduler has parked,
//! so users can type a few characters instead of a full UUID.

use anyhow::{Context, Result, anyhow};
use archflow_client::SchedulerClient;
use archflow_core::dto::decision::AwaitingDecision;

use crate::types::IdOrPrefix;

/// Resolve a job ID or prefix to the parked decision it names
///
/// # Errors
/// Returns an error if:
/// - No parked job matches
/// - Multiple parked jobs match the prefix (ambiguous)
/// - The API call fails
pub async fn resolve_decision(
    client: &SchedulerClient,
    id_or_prefix: &IdOrPrefix,
) -> Result<AwaitingDecision> {
    let decisions = client
        .list_decisions()
        .await
        .context("Failed to fetch decisions for ID resolution")?;

    select_decision(decisions, id_or_prefix)
}

fn select_decision(
    decisions: Vec<AwaitingDecision>,
    id_or_prefix: &IdOrPrefix,
) -> Result<AwaitingDecision> {
    let mut matches: Vec<AwaitingDecision> = decisions
        .into_iter()
        .filter(|d| id_or_prefix.matches(d.job_id))
        .collect();

    match matches.len() {
        0 => Err(anyhow!(
            "No decision is awaiting for a job starting with '{}'",
            id_or_prefix
        )),
        1 => Ok(matches.remove(0)),
        _ => {
            let ids: Vec<String> = matches.iter().map(|d| d.job_id.to_string()).collect();
            Err(anyhow!(
                "Ambiguous prefix '{}' matches multiple jobs: {}",
                id_or_prefix,
                ids.join(", ")
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archflow_core::workflow::JobKind;
    use uuid::Uuid;

    fn awaiting(job_id: &str) -> AwaitingDecision {
        serde_json::from_value(serde_json::json!({
            "job_id": job_id,
            "package_id": Uuid::new_v4(),
            "chain_id": "C1",
            "link_id": "L5",
            "kind": JobKind::NextChainDecision,
            "description": "Store AIP",
            "choices": [],
            "awaiting_since": "2024-05-01T10:20:30Z"
        }))
        .unwrap()
    }

    #[test]
    fn test_select_decision() {
        let decisions = vec![
            awaiting("1a2b3c4d-0000-4000-8000-000000000001"),
            awaiting("1a2bffff-0000-4000-8000-000000000002"),
        ];

        let found = select_decision(decisions.clone(), &IdOrPrefix::parse("1a2b3")).unwrap();
        assert_eq!(found.job_id.to_string(), "1a2b3c4d-0000-4000-8000-000000000001");

        let err = select_decision(decisions.clone(), &IdOrPrefix::parse("1a2b")).unwrap_err();
        assert!(err.to_string().contains("Ambiguous prefix"));

        assert!(select_decision(decisions, &IdOrPrefix::parse("ffff")).is_err());
    }
}
