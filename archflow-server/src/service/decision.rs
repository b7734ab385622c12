//! Decision Service
//!
//! Lists parked decisions and resolves them through the package queue.

use archflow_core::dto::decision::AwaitingDecision;
use uuid::Uuid;

use super::AppState;
use super::package::Result;
use crate::queue::JobReport;

/// Jobs waiting for a user's choice, oldest first
pub fn list_awaiting(state: &AppState) -> Vec<AwaitingDecision> {
    state.queue.awaiting_decisions()
}

/// Resolve a parked decision
pub async fn make_decision(state: &AppState, job_id: Uuid, choice: &str) -> Result<JobReport> {
    let report = state.queue.decide(job_id, choice).await?;
    tracing::info!(
        "Job {} resolved with '{}'; package {} continues",
        job_id,
        choice,
        report.package_id
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::DecisionError;
    use crate::queue::QueueLimits;
    use crate::service::package::ServiceError;
    use crate::test_support::TestEnvironment;

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let env = TestEnvironment::new();
        let state = env.app_state(QueueLimits {
            worker_count: 1,
            max_concurrent_packages: 1,
            max_queued_packages: 1,
            queued_package_timeout: None,
        });

        assert!(list_awaiting(&state).is_empty());
        let err = make_decision(&state, Uuid::new_v4(), "C2").await.unwrap_err();
        assert!(matches!(err, ServiceError::Decision(DecisionError::NotFound(_))));
    }
}
