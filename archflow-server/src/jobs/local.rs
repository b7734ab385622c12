//! Unit variable jobs, executed without workers

use archflow_core::domain::unit_variable::UnitVariable;
use tracing::debug;

use super::{ChainEffect, Completion, Job, JobEnvironment, JobError, JobOutcome};

impl Job {
    /// Jumps to the link stored with `variable`, or to `default_link_id`
    pub(super) async fn get_unit_variable(
        &mut self,
        env: &JobEnvironment,
        variable: &str,
        default_link_id: Option<&str>,
    ) -> Result<JobOutcome, JobError> {
        let stored = env
            .repository
            .get_unit_variable(self.package.id, variable)
            .await?;

        if let Some(link_id) = stored.and_then(|v| v.link_id) {
            debug!("Unit variable {} of {} leads to {}", variable, self.package.id, link_id);
            return Ok(JobOutcome::Completed(Completion::with_effect(
                0,
                ChainEffect::JumpToLink(link_id),
            )));
        }

        let completion = match default_link_id {
            Some(link_id) => Completion::with_effect(1, ChainEffect::JumpToLink(link_id.to_string())),
            None => Completion::new(1),
        };
        Ok(JobOutcome::Completed(completion))
    }

    /// Upserts `variable` for the package
    pub(super) async fn set_unit_variable(
        &mut self,
        env: &JobEnvironment,
        variable: &str,
        value: Option<&str>,
        link_id: Option<String>,
    ) -> Result<JobOutcome, JobError> {
        let value = value.map(|v| self.context.substitute(v)).unwrap_or_default();
        let row = UnitVariable::new(self.package.id, self.package.kind, variable, value, link_id);
        env.repository.set_unit_variable(&row).await?;
        Ok(JobOutcome::Completed(Completion::new(0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::Repository;
    use crate::test_support::{TestEnvironment, link_fixture};
    use archflow_core::Context;
    use archflow_core::choices::GeneratedChoices;
    use archflow_core::domain::package::{Package, PackageKind};
    use serde_json::json;
    use uuid::Uuid;

    fn sip() -> Package {
        Package::new(Uuid::new_v4(), PackageKind::Sip, "%sharedPath%s/")
    }

    #[tokio::test]
    async fn test_set_then_get_unit_variable() {
        let env = TestEnvironment::new();
        let package = sip();

        let set = link_fixture(
            "S",
            json!({"kind": "set_unit_variable", "variable": "normalizationPath", "link_id": "N2"}),
        );
        let mut job = Job::new(package.clone(), "C1", &set, Context::new(), GeneratedChoices::default());
        job.execute(&env.job_environment()).await.unwrap();

        let stored = env
            .repository
            .get_unit_variable(package.id, "normalizationPath")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.link_id.as_deref(), Some("N2"));
        assert_eq!(stored.unit_type, PackageKind::Sip);

        let get = link_fixture(
            "G",
            json!({"kind": "get_unit_variable", "variable": "normalizationPath", "default_link_id": "D"}),
        );
        let mut job = Job::new(package, "C1", &get, Context::new(), GeneratedChoices::default());
        let outcome = job.execute(&env.job_environment()).await.unwrap();
        assert_eq!(
            outcome,
            JobOutcome::Completed(Completion::with_effect(0, ChainEffect::JumpToLink("N2".to_string())))
        );
    }

    #[tokio::test]
    async fn test_get_missing_unit_variable_uses_default() {
        let env = TestEnvironment::new();
        let get = link_fixture(
            "G",
            json!({"kind": "get_unit_variable", "variable": "missing", "default_link_id": "D"}),
        );
        let mut job = Job::new(sip(), "C1", &get, Context::new(), GeneratedChoices::default());
        let outcome = job.execute(&env.job_environment()).await.unwrap();
        assert_eq!(
            outcome,
            JobOutcome::Completed(Completion::with_effect(1, ChainEffect::JumpToLink("D".to_string())))
        );

        let get = link_fixture("G", json!({"kind": "get_unit_variable", "variable": "missing"}));
        let mut job = Job::new(sip(), "C1", &get, Context::new(), GeneratedChoices::default());
        let outcome = job.execute(&env.job_environment()).await.unwrap();
        assert_eq!(outcome, JobOutcome::Completed(Completion::new(1)));
    }
}
