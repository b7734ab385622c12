//! Client script jobs
//!
//! Build tasks from the link's argument template, hand them to the task
//! backend and fold the returned exit codes into one.

use archflow_core::Context;
use archflow_core::choices::GeneratedChoices;
use archflow_core::domain::task::Task;
use archflow_core::workflow::ScriptConfig;
use tracing::{debug, warn};

use super::{ChainEffect, Completion, Job, JobEnvironment, JobError, JobOutcome};

impl Job {
    /// Placeholder mapping for this job: base < package < chain context
    fn script_mapping(&self, env: &JobEnvironment, filter_subdir: Option<&str>) -> Context {
        self.package
            .replacement_mapping(&env.directories, filter_subdir)
            .layered(&self.context)
    }

    fn build_task(mapping: &Context, script: &ScriptConfig) -> Task {
        let stdout_file = script.stdout_file.as_deref().map(|f| mapping.substitute(f));
        let stderr_file = script.stderr_file.as_deref().map(|f| mapping.substitute(f));
        Task::new(mapping.substitute(&script.arguments)).with_output_files(stdout_file, stderr_file)
    }

    /// Waits for every submitted task and returns the highest exit code
    async fn collect_tasks(&mut self, env: &JobEnvironment) -> i32 {
        let mut results = env.backend.wait_for_results(self.id);
        let mut exit_code = 0;

        while let Some(task) = results.next().await {
            if let Some(code) = task.exit_code() {
                exit_code = exit_code.max(code);
            }
            self.tasks.push(task);
        }

        exit_code
    }

    /// Runs a single task built from the package mapping
    pub(super) async fn run_client_script(
        &mut self,
        env: &JobEnvironment,
        script: &ScriptConfig,
        filter_subdir: Option<&str>,
    ) -> Result<JobOutcome, JobError> {
        let mapping = self.script_mapping(env, filter_subdir);
        let task = Self::build_task(&mapping, script);
        debug!("Job {} submits {} {}", self.id, script.execute, task.arguments);

        env.backend.submit_task(self.id, &script.execute, task);
        let exit_code = self.collect_tasks(env).await;
        Ok(JobOutcome::Completed(Completion::new(exit_code)))
    }

    /// Runs one task per package file
    pub(super) async fn run_files_client_script(
        &mut self,
        env: &JobEnvironment,
        script: &ScriptConfig,
    ) -> Result<JobOutcome, JobError> {
        let files = env
            .files
            .enumerate(
                &self.package,
                &env.directories,
                script.filter_subdir.as_deref(),
                script.filter_file_end.as_deref(),
            )
            .await?;

        if files.is_empty() {
            debug!("Job {} found no files to process", self.id);
            return Ok(JobOutcome::Completed(Completion::new(0)));
        }

        let mapping = self.script_mapping(env, None);
        for file_mapping in &files {
            let task = Self::build_task(&mapping.layered(file_mapping), script);
            env.backend.submit_task(self.id, &script.execute, task);
        }
        debug!(
            "Job {} submitted {} task(s) to {}",
            self.id,
            files.len(),
            script.execute
        );

        let exit_code = self.collect_tasks(env).await;
        Ok(JobOutcome::Completed(Completion::new(exit_code)))
    }

    /// Runs one task and reads the choices it prints
    pub(super) async fn run_output_client_script(
        &mut self,
        env: &JobEnvironment,
        script: &ScriptConfig,
    ) -> Result<JobOutcome, JobError> {
        let mapping = self.script_mapping(env, None);
        let task = Self::build_task(&mapping, script).wanting_output();
        env.backend.submit_task(self.id, &script.execute, task);
        let exit_code = self.collect_tasks(env).await;

        let stdout = self
            .tasks
            .last()
            .and_then(|task| task.result())
            .map(|result| result.stdout.as_str())
            .unwrap_or_default();
        let choices = match GeneratedChoices::parse(stdout) {
            Ok(choices) => choices,
            Err(e) => {
                warn!(
                    "Output of {} for job {} is not a choice list: {}",
                    script.execute, self.id, e
                );
                GeneratedChoices::default()
            }
        };

        Ok(JobOutcome::Completed(Completion::with_effect(
            exit_code,
            ChainEffect::GeneratedChoices(choices),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{TestEnvironment, link_fixture};
    use archflow_core::domain::package::{Package, PackageKind};
    use serde_json::json;
    use uuid::Uuid;

    /// Transfer whose `objects/` directory exists under the test shared directory
    fn transfer(env: &TestEnvironment) -> Package {
        let id = Uuid::new_v4();
        let package = Package::new(
            id,
            PackageKind::Transfer,
            format!("%sharedPath%currentlyProcessing/images-{}/", id),
        );
        let dir = env.directories.expand(&package.current_path);
        std::fs::create_dir_all(format!("{}objects", dir)).unwrap();
        package
    }

    #[tokio::test]
    async fn test_client_script_substitutes_arguments() {
        let env = TestEnvironment::new();
        let package = transfer(&env);
        let link = link_fixture(
            "L1",
            json!({"kind": "client_script", "execute": "echo_v0.0",
                   "arguments": "--uuid=%SIPUUID% --name=%SIPName% --store=%AIPsStore%"}),
        );
        let context = Context::new().with("%AIPsStore%", "/loc/");
        let mut job = Job::new(package.clone(), "C1", &link, context, GeneratedChoices::default());

        let outcome = job.execute(&env.job_environment()).await.unwrap();
        assert_eq!(outcome, JobOutcome::Completed(Completion::new(0)));
        assert_eq!(job.tasks().len(), 1);
        assert_eq!(
            job.tasks()[0].arguments,
            format!("--uuid={} --name=images --store=/loc/", package.id)
        );
    }

    #[tokio::test]
    async fn test_directory_script_uses_subdirectory() {
        let env = TestEnvironment::new();
        let package = transfer(&env);
        let link = link_fixture(
            "L1",
            json!({"kind": "directory_client_script", "execute": "echo_v0.0",
                   "arguments": "%relativeLocation%", "filter_subdir": "objects"}),
        );
        let mut job = Job::new(package.clone(), "C1", &link, Context::new(), GeneratedChoices::default());

        job.execute(&env.job_environment()).await.unwrap();
        assert_eq!(
            job.tasks()[0].arguments,
            format!("%sharedPath%currentlyProcessing/images-{}/objects", package.id)
        );
    }

    #[tokio::test]
    async fn test_files_script_takes_highest_exit_code() {
        let env = TestEnvironment::new();
        let package = transfer(&env);
        let objects = format!("{}objects", env.directories.expand(&package.current_path));
        for name in ["a.tif", "b.tif", "fail-me.tif"] {
            std::fs::write(format!("{}/{}", objects, name), b"x").unwrap();
        }
        let link = link_fixture(
            "L2",
            json!({"kind": "files_client_script", "execute": "echo_v0.0",
                   "arguments": "%fileUUID% %relativeLocation%", "filter_subdir": "objects"}),
        );
        let mut job = Job::new(package, "C1", &link, Context::new(), GeneratedChoices::default());

        let outcome = job.execute(&env.job_environment()).await.unwrap();
        assert_eq!(outcome, JobOutcome::Completed(Completion::new(3)));
        assert_eq!(job.tasks().len(), 3);
        assert!(job.tasks().iter().all(|t| t.arguments.starts_with("None ")));
    }

    #[tokio::test]
    async fn test_files_script_without_files() {
        let env = TestEnvironment::new();
        let package = transfer(&env);
        let link = link_fixture(
            "L2",
            json!({"kind": "files_client_script", "execute": "echo_v0.0", "arguments": "%fileUUID%"}),
        );
        let mut job = Job::new(package, "C1", &link, Context::new(), GeneratedChoices::default());

        let outcome = job.execute(&env.job_environment()).await.unwrap();
        assert_eq!(outcome, JobOutcome::Completed(Completion::new(0)));
        assert!(job.tasks().is_empty());
        assert_eq!(env.transport.batch_sizes(), Vec::<usize>::new());
    }

    #[tokio::test]
    async fn test_output_script_generates_choices() {
        let env = TestEnvironment::new();
        let package = transfer(&env);
        let link = link_fixture(
            "L3",
            json!({"kind": "output_client_script", "execute": "echo_v0.0",
                   "arguments": r#"{"default": {"description": "Default Location", "uri": "/api/v2/location/default/"}}"#}),
        );
        let mut job = Job::new(package.clone(), "C1", &link, Context::new(), GeneratedChoices::default());

        let outcome = job.execute(&env.job_environment()).await.unwrap();
        let JobOutcome::Completed(Completion {
            exit_code: 0,
            effect: Some(ChainEffect::GeneratedChoices(choices)),
        }) = outcome
        else {
            panic!("expected generated choices");
        };
        assert_eq!(choices.get("default").unwrap().uri, "/api/v2/location/default/");
        assert!(job.tasks()[0].wants_output);

        let garbage = link_fixture(
            "L3",
            json!({"kind": "output_client_script", "execute": "echo_v0.0", "arguments": "not json"}),
        );
        let mut job = Job::new(package, "C1", &garbage, Context::new(), GeneratedChoices::default());
        let outcome = job.execute(&env.job_environment()).await.unwrap();
        assert_eq!(
            outcome,
            JobOutcome::Completed(Completion::with_effect(
                0,
                ChainEffect::GeneratedChoices(GeneratedChoices::default())
            ))
        );
    }
}
