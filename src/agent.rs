//! The Agent Adapter (C1): uniform invocation of external CLI agents.
//!
//! Each call writes a prompt over stdin to a `tokio::process::Command`,
//! captures stdout/stderr, and measures duration, alongside parallel
//! specialist dispatch under a shared per-call timeout. Structured-output
//! parsing reuses `util::extract_json_object` and fence-stripping for
//! fenced reviewer artifacts.

use crate::budget::BudgetLedger;
use crate::errors::{AgentError, ReviewError};
use crate::review::findings::ReviewerArtifact;
use crate::util::{extract_json_object, strip_code_fences};
use crate::workflow::store::WorkflowStore;
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// The closed set of agent capabilities (§9 Design Notes): a tagged variant
/// per capability rather than open-ended dynamic dispatch across
/// heterogeneous agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    ProducePlan,
    ImplementTask,
    ReviewSecurity,
    ReviewArchitecture,
}

impl Capability {
    /// The fixed agent identity associated with this capability, used to
    /// enforce the four-eyes protocol (invariant 8): a single identity
    /// never appears simultaneously as author and reviewer.
    pub fn agent_identity(self) -> &'static str {
        match self {
            Capability::ProducePlan | Capability::ImplementTask => "writer",
            Capability::ReviewSecurity => "security-reviewer",
            Capability::ReviewArchitecture => "architecture-reviewer",
        }
    }

    fn is_reviewer(self) -> bool {
        matches!(self, Capability::ReviewSecurity | Capability::ReviewArchitecture)
    }
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub claude_cmd: String,
    pub working_dir: PathBuf,
    pub soft_timeout: Duration,
    pub hard_timeout: Duration,
    pub cost_per_invocation: f64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            claude_cmd: "claude".to_string(),
            working_dir: PathBuf::from("."),
            soft_timeout: Duration::from_secs(120),
            hard_timeout: Duration::from_secs(600),
            cost_per_invocation: 1.0,
        }
    }
}

pub struct AgentInvocationResult {
    pub agent: String,
    pub raw_output: String,
    pub duration: Duration,
}

/// Invokes external CLI agents as opaque subprocesses and enforces budget,
/// timeout, and retry control (§4.5).
pub struct AgentAdapter {
    config: AgentConfig,
}

impl AgentAdapter {
    pub fn new(config: AgentConfig) -> Self {
        Self { config }
    }

    /// Runs one agent invocation: pre-debits the budget ledger, spawns the
    /// subprocess with `prompt` on stdin, applies a soft timeout (one retry
    /// with exponential backoff) then a hard timeout (fatal), and commits
    /// actual cost on completion, persisting the resulting `BudgetRecord`
    /// through the Workflow Store (invariant 7).
    pub async fn invoke(
        &self,
        capability: Capability,
        workflow_id: &str,
        task_id: &str,
        prompt: &str,
        budget: &mut BudgetLedger,
        store: &WorkflowStore,
    ) -> Result<AgentInvocationResult, AgentError> {
        let agent = capability.agent_identity();
        let estimate = self.config.cost_per_invocation;
        if !budget.pre_debit(task_id, agent, estimate) {
            return Err(AgentError::BudgetExceeded {
                agent: agent.to_string(),
                estimate,
                ceiling: budget.remaining(task_id),
            });
        }

        let start = Instant::now();
        let result = self.run_with_retry(agent, prompt).await;
        let duration = start.elapsed();

        match result {
            Ok(raw_output) => {
                let record = budget.commit(workflow_id, task_id, agent, estimate, duration);
                store
                    .record_budget(&record.workflow_id, &record.task_id, &record.agent_id, record.cost_units, record.duration_ms)
                    .map_err(|e| AgentError::Other(anyhow::anyhow!(e)))?;
                Ok(AgentInvocationResult {
                    agent: agent.to_string(),
                    raw_output,
                    duration,
                })
            }
            Err(err) => {
                let record = budget.commit(workflow_id, task_id, agent, 0.0, duration);
                if let Err(store_err) =
                    store.record_budget(&record.workflow_id, &record.task_id, &record.agent_id, record.cost_units, record.duration_ms)
                {
                    tracing::warn!(agent = %agent, error = %store_err, "failed to persist budget record for failed invocation");
                }
                Err(err)
            }
        }
    }

    async fn run_with_retry(&self, agent: &str, prompt: &str) -> Result<String, AgentError> {
        match tokio::time::timeout(self.config.soft_timeout, self.spawn_once(agent, prompt)).await {
            Ok(res) => res,
            Err(_elapsed) => {
                tokio::time::sleep(Duration::from_millis(500)).await;
                match tokio::time::timeout(self.config.hard_timeout, self.spawn_once(agent, prompt)).await {
                    Ok(res) => res,
                    Err(_) => Err(AgentError::HardTimeout {
                        agent: agent.to_string(),
                        elapsed_secs: self.config.hard_timeout.as_secs(),
                    }),
                }
            }
        }
    }

    async fn spawn_once(&self, agent: &str, prompt: &str) -> Result<String, AgentError> {
        let mut cmd = Command::new(&self.config.claude_cmd);
        cmd.arg("--print")
            .arg("--dangerously-skip-permissions")
            .current_dir(&self.config.working_dir)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        let mut child = cmd.spawn().map_err(|source| AgentError::SpawnFailed {
            capability: agent.to_string(),
            source,
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.write_all(prompt.as_bytes()).await;
            let _ = stdin.shutdown().await;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|source| AgentError::SpawnFailed {
                capability: agent.to_string(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if !output.status.success() && extract_json_object(&stdout).is_none() {
            return Err(AgentError::AgentError {
                agent: agent.to_string(),
                exit_code: output.status.code().unwrap_or(-1),
            });
        }
        Ok(stdout)
    }

    /// Parses a structured-output agent response, stripping a markdown
    /// fence first if present (the architecture reviewer's artifact may
    /// arrive fenced, §6.3).
    pub fn parse_structured<T: DeserializeOwned>(agent: &str, raw_output: &str) -> Result<T, AgentError> {
        let unfenced = strip_code_fences(raw_output);
        let json = extract_json_object(unfenced).ok_or_else(|| AgentError::InvalidOutput {
            agent: agent.to_string(),
            message: "no JSON object found in output".to_string(),
        })?;
        serde_json::from_str(&json).map_err(|e| AgentError::InvalidOutput {
            agent: agent.to_string(),
            message: e.to_string(),
        })
    }

    /// Dispatches the security and architecture reviewers concurrently over
    /// the same artifact (Phase 2 / Phase 4). One agent's failure does not
    /// cancel the other; a failed slot comes back as `None` so the arbiter
    /// can render `{partial: true, missing: <agent>}` (§4.5).
    ///
    /// Asserts the four-eyes protocol (invariant 8) before dispatching
    /// anything: the writer identity that authored the artifact under
    /// review must not appear among the reviewer identities.
    pub async fn dispatch_reviewers(
        &self,
        workflow_id: &str,
        task_id: &str,
        security_prompt: &str,
        architecture_prompt: &str,
        budget: &mut BudgetLedger,
        store: &WorkflowStore,
    ) -> Result<(Option<ReviewerArtifact>, Option<ReviewerArtifact>), ReviewError> {
        enforce_four_eyes(
            Capability::ProducePlan.agent_identity(),
            &[Capability::ReviewSecurity.agent_identity(), Capability::ReviewArchitecture.agent_identity()],
        )?;

        let security_estimate = self.config.cost_per_invocation;
        let architecture_estimate = self.config.cost_per_invocation;
        let security_allowed = budget.pre_debit(task_id, "security-reviewer", security_estimate);
        let architecture_allowed = budget.pre_debit(task_id, "architecture-reviewer", architecture_estimate);

        let security_fut = async {
            if !security_allowed {
                return (None, Duration::ZERO);
            }
            let start = Instant::now();
            let artifact = match self.run_with_retry("security-reviewer", security_prompt).await {
                Ok(raw) => Self::parse_structured::<ReviewerArtifact>("security-reviewer", &raw).ok(),
                Err(_) => None,
            };
            (artifact, start.elapsed())
        };
        let architecture_fut = async {
            if !architecture_allowed {
                return (None, Duration::ZERO);
            }
            let start = Instant::now();
            let artifact = match self.run_with_retry("architecture-reviewer", architecture_prompt).await {
                Ok(raw) => Self::parse_structured::<ReviewerArtifact>("architecture-reviewer", &raw).ok(),
                Err(_) => None,
            };
            (artifact, start.elapsed())
        };

        let ((security, security_duration), (architecture, architecture_duration)) = tokio::join!(security_fut, architecture_fut);

        let security_record = budget.commit(
            workflow_id,
            task_id,
            "security-reviewer",
            if security.is_some() { security_estimate } else { 0.0 },
            security_duration,
        );
        let architecture_record = budget.commit(
            workflow_id,
            task_id,
            "architecture-reviewer",
            if architecture.is_some() { architecture_estimate } else { 0.0 },
            architecture_duration,
        );
        for record in [&security_record, &architecture_record] {
            store
                .record_budget(&record.workflow_id, &record.task_id, &record.agent_id, record.cost_units, record.duration_ms)
                .map_err(|e| ReviewError::Other(anyhow::anyhow!(e)))?;
        }

        Ok((security, architecture))
    }
}

/// Enforces invariant 8: the agent that authored an artifact must never be
/// recorded as one of its reviewers.
pub fn enforce_four_eyes(author: &str, reviewers: &[&str]) -> Result<(), ReviewError> {
    if reviewers.iter().any(|r| *r == author) {
        return Err(ReviewError::AuthorIsReviewer { agent: author.to_string() });
    }
    Ok(())
}
