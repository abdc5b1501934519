use std::io::Write;
use std::path::{Path, PathBuf};

use tokio::time::sleep;

use crate::error::Result;
use crate::progress::{self, Stopwatch};
use crate::query::RacfQuery;
use crate::scrape;
use crate::tower::{JobStatus, TowerClient, TowerConfig};
use crate::watsonx::{self, TextGenerator};

pub const DEFAULT_OUTPUT_FILE: &str = "ansible_output.txt";

/// Runs the RACF playbook for a query and turns its output into prose.
pub struct Assistant {
    tower: TowerClient,
    tower_config: TowerConfig,
    generator: Box<dyn TextGenerator>,
    output_path: PathBuf,
}

impl Assistant {
    pub fn new(
        tower_config: TowerConfig,
        generator: Box<dyn TextGenerator>,
        output_path: PathBuf,
    ) -> Result<Self> {
        Ok(Assistant {
            tower: TowerClient::new(&tower_config)?,
            tower_config,
            generator,
            output_path,
        })
    }

    /// Full round trip. Failures of either half are reported to `out` and yield `None`.
    pub async fn answer<W: Write>(&self, query: &RacfQuery, out: &mut W) -> Result<Option<String>> {
        let watch = Stopwatch::start();
        let artifact = match self.run_playbook(query, out).await {
            Ok(path) => path,
            Err(e) => {
                writeln!(out, "An error occurred while executing the playbook: {}", e)?;
                None
            }
        };
        writeln!(out, "{}", progress::completion_message(watch.elapsed()))?;
        tracing::debug!("{}", watch.activity().status_line());

        let Some(path) = artifact else {
            writeln!(out, "No information was obtained from the z/OS server.")?;
            return Ok(None);
        };
        writeln!(out, "Ansible output file found: {}", path.display())?;
        match self.humanize(&path, query, out).await {
            Ok(text) => Ok(Some(text)),
            Err(e) => {
                writeln!(
                    out,
                    "An error occurred while processing the Ansible output file: {}",
                    e
                )?;
                Ok(None)
            }
        }
    }

    /// Launches the job, waits for it, and saves the cleaned RACF output.
    /// `Ok(None)` means the job ran but produced nothing usable.
    pub async fn run_playbook<W: Write>(&self, query: &RacfQuery, out: &mut W) -> Result<Option<PathBuf>> {
        let extra_vars = query.extra_vars();
        writeln!(out, "Payload sent to Ansible Tower:")?;
        writeln!(
            out,
            "{}",
            serde_json::json!({ "extra_vars": &extra_vars })
        )?;

        let job_id = self
            .tower
            .launch(self.tower_config.job_template_id, &extra_vars)
            .await?;

        let mut write_error = None;
        let status = self
            .tower
            .wait_for_job(
                job_id,
                self.tower_config.poll_interval,
                self.tower_config.poll_timeout,
                &mut |_: &JobStatus| {
                    if write_error.is_none() {
                        if let Err(e) = writeln!(out, "Working on the query, please wait...") {
                            write_error = Some(e);
                        }
                    }
                },
            )
            .await?;
        if let Some(e) = write_error {
            return Err(e.into());
        }

        sleep(self.tower_config.settle_delay).await;

        if !status.is_successful() {
            tracing::warn!(job_id, %status, "playbook did not succeed");
            writeln!(out, "The playbook execution failed.")?;
            return Ok(None);
        }

        let html = self.tower.stdout_html(job_id).await?;
        let Some(cleaned) = scrape::extract_racf_output(&html) else {
            writeln!(out, "No relevant output found in the Ansible output.")?;
            return Ok(None);
        };

        tokio::fs::write(&self.output_path, &cleaned).await?;
        progress::ARTIFACT_BYTES_WRITTEN
            .fetch_add(cleaned.len(), std::sync::atomic::Ordering::Relaxed);
        writeln!(
            out,
            "Cleaned Ansible output saved to {}",
            self.output_path.display()
        )?;
        Ok(Some(self.output_path.clone()))
    }

    pub async fn humanize<W: Write>(&self, path: &Path, query: &RacfQuery, out: &mut W) -> Result<String> {
        let racf_output = tokio::fs::read_to_string(path).await?;
        let prompt = query.humanize_prompt(&racf_output);
        tracing::debug!(%prompt, "humanizing RACF output");

        let responses = watsonx::generate_all(self.generator.as_ref(), &[prompt]).await?;
        let text = responses.into_iter().next().unwrap_or_default();
        writeln!(
            out,
            "Humanized information for {} {}:",
            query.entity_type, query.entity_name
        )?;
        writeln!(out, "{}", text)?;
        Ok(text)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::ChatError;
    use crate::query::EntityType;
    use crate::tower::DEFAULT_JOB_TEMPLATE_ID;
    use async_trait::async_trait;
    use mockito::Matcher;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    pub(crate) const RACF_HTML: &str = r#"<html><body><pre>
<span>TASK [Print RACF output parts] ***</span>
<span>ok: [zos1] =&gt; {</span>
<span>    "msg": "USER=IBMUSER  NAME=SYSTEM PROGRAMMER"</span>
<span>}</span>
<span>PLAY RECAP ***</span>
</pre></body></html>"#;

    /// Records prompts and answers with a canned reply.
    #[derive(Clone, Default)]
    pub(crate) struct CannedGenerator {
        pub prompts: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl TextGenerator for CannedGenerator {
        async fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("IBMUSER is the system programmer account.".to_string())
        }
    }

    pub(crate) fn tower_config(server: &mockito::ServerGuard) -> TowerConfig {
        TowerConfig {
            url: server.url(),
            token: "tower-token".to_string(),
            job_template_id: DEFAULT_JOB_TEMPLATE_ID,
            verify_tls: false,
            poll_interval: Duration::ZERO,
            settle_delay: Duration::ZERO,
            poll_timeout: None,
        }
    }

    pub(crate) async fn mock_job(
        server: &mut mockito::ServerGuard,
        final_status: &str,
        stdout: &str,
    ) -> Vec<mockito::Mock> {
        let launch = server
            .mock("POST", "/api/v2/job_templates/5097/launch/")
            .with_status(201)
            .with_body(r#"{"job":42,"id":42}"#)
            .create_async()
            .await;
        let status = server
            .mock("GET", "/api/v2/jobs/42/")
            .with_status(200)
            .with_body(format!(r#"{{"id":42,"status":"{final_status}"}}"#))
            .create_async()
            .await;
        let stdout = server
            .mock("GET", "/api/v2/jobs/42/stdout/")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(stdout)
            .create_async()
            .await;
        vec![launch, status, stdout]
    }

    fn query() -> RacfQuery {
        RacfQuery {
            host: "zos1.example.com".to_string(),
            entity_type: EntityType::User,
            entity_name: "IBMUSER".to_string(),
        }
    }

    #[tokio::test]
    async fn test_answer_end_to_end() {
        let mut server = mockito::Server::new_async().await;
        let _mocks = mock_job(&mut server, "successful", RACF_HTML).await;
        let dir = tempfile::tempdir().unwrap();
        let output_path = dir.path().join(DEFAULT_OUTPUT_FILE);
        let generator = CannedGenerator::default();
        let assistant = Assistant::new(
            tower_config(&server),
            Box::new(generator.clone()),
            output_path.clone(),
        )
        .unwrap();

        let mut out = Vec::new();
        let answer = assistant.answer(&query(), &mut out).await.unwrap();
        assert_eq!(
            answer.as_deref(),
            Some("IBMUSER is the system programmer account.")
        );

        let saved = std::fs::read_to_string(&output_path).unwrap();
        assert_eq!(saved, "USER=IBMUSER  NAME=SYSTEM PROGRAMMER");

        let prompts = generator.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].starts_with("The following information is about a user"));
        assert!(prompts[0].ends_with("USER=IBMUSER  NAME=SYSTEM PROGRAMMER"));

        let printed = String::from_utf8(out).unwrap();
        assert!(printed.contains("\"entity_name\":\"IBMUSER\""));
        assert!(printed.contains("Cleaned Ansible output saved to"));
        assert!(printed.contains("Query completed in approximately"));
        assert!(printed.contains("Humanized information for user IBMUSER:"));
    }

    #[tokio::test]
    async fn test_pending_polls_then_success() {
        let mut server = mockito::Server::new_async().await;
        let _launch = server
            .mock("POST", "/api/v2/job_templates/5097/launch/")
            .with_status(201)
            .with_body(r#"{"job":42,"id":42}"#)
            .create_async()
            .await;
        let running = server
            .mock("GET", "/api/v2/jobs/42/")
            .with_status(200)
            .with_body(r#"{"id":42,"status":"running"}"#)
            .expect(2)
            .create_async()
            .await;
        let successful = server
            .mock("GET", "/api/v2/jobs/42/")
            .with_status(200)
            .with_body(r#"{"id":42,"status":"successful"}"#)
            .expect(1)
            .create_async()
            .await;
        let _stdout = server
            .mock("GET", "/api/v2/jobs/42/stdout/")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(RACF_HTML)
            .create_async()
            .await;
        let dir = tempfile::tempdir().unwrap();
        let assistant = Assistant::new(
            tower_config(&server),
            Box::new(CannedGenerator::default()),
            dir.path().join(DEFAULT_OUTPUT_FILE),
        )
        .unwrap();

        let mut out = Vec::new();
        let path = assistant.run_playbook(&query(), &mut out).await.unwrap();
        assert!(path.is_some());
        running.assert_async().await;
        successful.assert_async().await;

        let printed = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = printed.lines().collect();
        assert_eq!(lines[0], "Payload sent to Ansible Tower:");
        assert_eq!(lines[2], "Working on the query, please wait...");
        assert_eq!(lines[3], "Working on the query, please wait...");
        assert!(lines[4].starts_with("Cleaned Ansible output saved to"));
        assert_eq!(lines.len(), 5);
    }

    #[tokio::test]
    async fn test_artifact_is_overwritten() {
        let mut server = mockito::Server::new_async().await;
        let _mocks = mock_job(&mut server, "successful", RACF_HTML).await;
        let dir = tempfile::tempdir().unwrap();
        let output_path = dir.path().join(DEFAULT_OUTPUT_FILE);
        std::fs::write(&output_path, "STALE ".repeat(50)).unwrap();
        let assistant = Assistant::new(
            tower_config(&server),
            Box::new(CannedGenerator::default()),
            output_path.clone(),
        )
        .unwrap();

        let mut out = Vec::new();
        assistant.run_playbook(&query(), &mut out).await.unwrap();
        let saved = std::fs::read_to_string(&output_path).unwrap();
        assert_eq!(saved, "USER=IBMUSER  NAME=SYSTEM PROGRAMMER");
    }

    #[tokio::test]
    async fn test_pending_message_write_error() {
        struct BrokenPipe;
        impl Write for BrokenPipe {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                if buf.starts_with(b"Working") {
                    return Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"));
                }
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut server = mockito::Server::new_async().await;
        let _launch = server
            .mock("POST", "/api/v2/job_templates/5097/launch/")
            .with_status(201)
            .with_body(r#"{"job":42,"id":42}"#)
            .create_async()
            .await;
        let _running = server
            .mock("GET", "/api/v2/jobs/42/")
            .with_status(200)
            .with_body(r#"{"id":42,"status":"running"}"#)
            .expect(1)
            .create_async()
            .await;
        let _successful = server
            .mock("GET", "/api/v2/jobs/42/")
            .with_status(200)
            .with_body(r#"{"id":42,"status":"successful"}"#)
            .create_async()
            .await;
        let dir = tempfile::tempdir().unwrap();
        let assistant = Assistant::new(
            tower_config(&server),
            Box::new(CannedGenerator::default()),
            dir.path().join(DEFAULT_OUTPUT_FILE),
        )
        .unwrap();

        let err = assistant
            .run_playbook(&query(), &mut BrokenPipe)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Io(_)));
    }

    #[tokio::test]
    async fn test_failed_job_produces_nothing() {
        let mut server = mockito::Server::new_async().await;
        let mocks = mock_job(&mut server, "failed", RACF_HTML).await;
        let dir = tempfile::tempdir().unwrap();
        let output_path = dir.path().join(DEFAULT_OUTPUT_FILE);
        let generator = CannedGenerator::default();
        let assistant = Assistant::new(
            tower_config(&server),
            Box::new(generator.clone()),
            output_path.clone(),
        )
        .unwrap();

        let mut out = Vec::new();
        let answer = assistant.answer(&query(), &mut out).await.unwrap();
        assert_eq!(answer, None);
        assert!(!output_path.exists());
        assert!(generator.prompts.lock().unwrap().is_empty());
        // stdout is never fetched for a failed job
        assert!(!mocks[2].matched_async().await);

        let printed = String::from_utf8(out).unwrap();
        assert!(printed.contains("The playbook execution failed."));
        assert!(printed.contains("No information was obtained from the z/OS server."));
    }

    #[tokio::test]
    async fn test_irrelevant_stdout() {
        let mut server = mockito::Server::new_async().await;
        let _mocks = mock_job(&mut server, "successful", "<pre>PLAY RECAP</pre>").await;
        let dir = tempfile::tempdir().unwrap();
        let assistant = Assistant::new(
            tower_config(&server),
            Box::new(CannedGenerator::default()),
            dir.path().join(DEFAULT_OUTPUT_FILE),
        )
        .unwrap();

        let mut out = Vec::new();
        let path = assistant.run_playbook(&query(), &mut out).await.unwrap();
        assert_eq!(path, None);
        let printed = String::from_utf8(out).unwrap();
        assert!(printed.contains("No relevant output found in the Ansible output."));
    }

    #[tokio::test]
    async fn test_launch_error_is_reported() {
        let mut server = mockito::Server::new_async().await;
        let _launch = server
            .mock("POST", "/api/v2/job_templates/5097/launch/")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;
        let dir = tempfile::tempdir().unwrap();
        let assistant = Assistant::new(
            tower_config(&server),
            Box::new(CannedGenerator::default()),
            dir.path().join(DEFAULT_OUTPUT_FILE),
        )
        .unwrap();

        let mut out = Vec::new();
        let err = assistant.run_playbook(&query(), &mut out).await.unwrap_err();
        assert!(matches!(err, ChatError::Status { .. }));

        let mut out = Vec::new();
        assert_eq!(assistant.answer(&query(), &mut out).await.unwrap(), None);
        let printed = String::from_utf8(out).unwrap();
        assert!(printed.contains("An error occurred while executing the playbook:"));
    }
}
