use std::path::Path;
use std::sync::Arc;

use crate::agent_engine::history::{LogKind, SessionLog};
use crate::agent_engine::prompt;
use crate::agent_engine::state::{CycleState, Observation, PredictionOutcome, FAILURE_SENTINEL};
use crate::agent_engine::trajectory::{PendingStep, StepFeedback, Trajectory};
use crate::config::AppConfig;
use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::llm::provider::LlmProvider;
use crate::llm::providers::active_provider;
use crate::llm::types::{mask_image_urls, CallConfig, ChatMessage};
use crate::protocol::action;
use crate::protocol::guard::{annotate_reasoning, DuplicateGuard, GuardVerdict};
use crate::protocol::parser::parse_response;

pub const AGENT_TYPE: &str = "DeskPilotNavigationAgent";
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Multi-turn desktop agent: one `predict` call per observed screenshot.
///
/// Owns its model client and trajectory. Not meant to be shared between
/// concurrent callers; run one instance per session.
pub struct NavigationAgent {
    provider: Arc<dyn LlmProvider>,
    call_cfg: CallConfig,
    system_prompt: String,
    max_attempts: u32,
    guard: DuplicateGuard,
    trajectory: Trajectory,
    log: SessionLog,
}

impl NavigationAgent {
    pub fn new(provider: Arc<dyn LlmProvider>, call_cfg: CallConfig, system_prompt: String) -> Self {
        Self {
            provider,
            call_cfg,
            system_prompt,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            guard: DuplicateGuard::default(),
            trajectory: Trajectory::new(),
            log: SessionLog::disabled(),
        }
    }

    /// Build from config. `config_dir` resolves a relative system template path.
    pub fn from_config(config: &AppConfig, config_dir: Option<&Path>) -> DeskPilotResult<Self> {
        let (provider, model) = active_provider(&config.llm)?;
        let system_prompt = config.prompts.render_system_prompt(config_dir)?;
        let log = if config.agent.session_log {
            SessionLog::new(config.agent.log_dir.as_deref())
        } else {
            SessionLog::disabled()
        };

        let agent = Self::new(provider, config.decoding.call_config(&model), system_prompt)
            .with_max_attempts(config.agent.max_attempts)
            .with_guard(DuplicateGuard::new(
                config.agent.duplicate_click_radius,
                config.agent.duplicate_wait_seconds,
            ))
            .with_session_log(log);
        Ok(agent)
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_guard(mut self, guard: DuplicateGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn with_session_log(mut self, log: SessionLog) -> Self {
        log.record(
            0,
            LogKind::SessionStart,
            serde_json::json!({
                "agent": AGENT_TYPE,
                "provider": self.provider.name(),
                "model": &self.call_cfg.model,
                "decoding": &self.call_cfg,
                "max_attempts": self.max_attempts,
            }),
        );
        self.log = log;
        self
    }

    pub fn trajectory(&self) -> &Trajectory {
        &self.trajectory
    }

    pub fn session_log(&self) -> &SessionLog {
        &self.log
    }

    /// Clear the trajectory and goal for a new task.
    pub fn reset(&mut self) {
        tracing::info!(steps = self.trajectory.len(), "agent reset");
        self.log.record(self.trajectory.len(), LogKind::Reset, serde_json::Value::Null);
        self.trajectory.reset();
    }

    /// Run one prediction cycle.
    ///
    /// Feedback in `obs` describes the previous step and is stored on it once
    /// the cycle succeeds. A failed cycle leaves the trajectory untouched, so
    /// the caller can retry with a fresh observation.
    pub async fn predict(&mut self, instruction: &str, obs: Observation) -> PredictionOutcome {
        if self.trajectory.set_goal_once(instruction) {
            tracing::info!(goal = %instruction, "task goal set");
        }
        let step = self.trajectory.len();
        let pending_feedback = self.pending_feedback(&obs);

        let mut messages: Vec<ChatMessage> = Vec::new();
        let mut state = CycleState::BuildPrompt { obs };

        loop {
            tracing::debug!(step, state = state.name(), "cycle state");
            state = match state {
                // ── Build prompt from trajectory + observation ─────────────
                CycleState::BuildPrompt { obs } => {
                    let goal = self.trajectory.goal().unwrap_or(instruction);
                    match prompt::build_messages(
                        &self.system_prompt,
                        goal,
                        &self.trajectory,
                        pending_feedback.as_ref(),
                        &obs.screenshot,
                    ) {
                        Ok(built) => {
                            self.log.record(
                                step,
                                LogKind::Request,
                                mask_image_urls(&built, "[IMAGE_DATA]"),
                            );
                            messages = built;
                            CycleState::CallModel { attempt: 1, obs }
                        }
                        Err(e) => CycleState::Failed {
                            attempts: 0,
                            last_error: e.to_string(),
                        },
                    }
                }

                // ── Model call ─────────────────────────────────────────────
                CycleState::CallModel { attempt, obs } => {
                    tracing::info!(step, attempt, provider = self.provider.name(), "calling model");
                    match self.provider.chat(messages.clone(), &self.call_cfg).await {
                        Ok(response) => {
                            let raw = response.content.trim().to_string();
                            self.log.record(step, LogKind::RawResponse, serde_json::json!(raw));
                            CycleState::Parse { attempt, raw, obs }
                        }
                        Err(e) => self.retry_or_fail(step, attempt, e, obs),
                    }
                }

                // ── Parse tag soup ─────────────────────────────────────────
                CycleState::Parse { attempt, raw, obs } => {
                    let parsed = parse_response(&raw);
                    match parsed.action {
                        Some(candidate) => CycleState::Validate {
                            attempt,
                            raw,
                            reasoning: parsed.reasoning,
                            candidate,
                            obs,
                        },
                        None => {
                            let reason = parsed
                                .diagnostic
                                .unwrap_or_else(|| "no action block found".into());
                            self.retry_or_fail(step, attempt, DeskPilotError::Parse(reason), obs)
                        }
                    }
                }

                // ── Structural validation ──────────────────────────────────
                CycleState::Validate { attempt, raw, reasoning, candidate, obs } => {
                    match action::validate(&candidate) {
                        Ok(action) => {
                            self.log.record(
                                step,
                                LogKind::Parsed,
                                serde_json::json!({ "reasoning": &reasoning, "action": &candidate }),
                            );
                            CycleState::Guard {
                                attempt,
                                raw,
                                reasoning,
                                action,
                                action_map: candidate,
                                obs,
                            }
                        }
                        Err(e) => self.retry_or_fail(step, attempt, e, obs),
                    }
                }

                // ── Duplicate suppression ──────────────────────────────────
                CycleState::Guard { attempt, raw, reasoning, action, action_map, obs } => {
                    match self.guard.check(self.trajectory.last_action(), action) {
                        GuardVerdict::Pass(action) => CycleState::Persist {
                            attempt,
                            raw,
                            reasoning,
                            action,
                            action_map,
                            duplicate_blocked: false,
                            obs,
                        },
                        GuardVerdict::Substituted { blocked, replacement } => {
                            tracing::warn!(step, blocked = blocked.name(), "duplicate action replaced with wait");
                            self.log.record(
                                step,
                                LogKind::DuplicateBlocked,
                                serde_json::json!({ "blocked": &action_map, "replacement": &replacement }),
                            );
                            CycleState::Persist {
                                attempt,
                                raw,
                                reasoning: Some(annotate_reasoning(reasoning.as_deref(), &blocked)),
                                action_map: replacement.to_map(),
                                action: replacement,
                                duplicate_blocked: true,
                                obs,
                            }
                        }
                    }
                }

                // ── Commit feedback and the new step ───────────────────────
                CycleState::Persist { attempt, raw, reasoning, action, action_map, duplicate_blocked, obs } => {
                    if let Some(feedback) = pending_feedback.clone() {
                        if let Err(e) = self.trajectory.record_feedback(feedback) {
                            tracing::warn!(error = %e, "previous step feedback not recorded");
                        }
                    }
                    let step_index = self
                        .trajectory
                        .append(PendingStep {
                            screenshot: obs.screenshot,
                            accessibility_tree: obs.accessibility_tree,
                            raw_output: raw.clone(),
                            reasoning: reasoning.clone(),
                            action: action.clone(),
                            action_map,
                            agent_type: AGENT_TYPE.into(),
                            model_name: self.call_cfg.model.clone(),
                        })
                        .index();
                    CycleState::Done(PredictionOutcome::Acted {
                        step_index,
                        raw_output: raw,
                        reasoning,
                        action,
                        duplicate_blocked,
                        attempts: attempt,
                    })
                }

                CycleState::Done(outcome) => {
                    if let Some(action) = outcome.action() {
                        tracing::info!(step, action = action.name(), "prediction cycle done");
                    }
                    return outcome;
                }

                CycleState::Failed { attempts, last_error } => {
                    tracing::error!(step, attempts, error = %last_error, "prediction cycle failed");
                    self.log.record(
                        step,
                        LogKind::CycleFailed,
                        serde_json::json!({ "attempts": attempts, "error": &last_error }),
                    );
                    return PredictionOutcome::Failed {
                        message: FAILURE_SENTINEL.into(),
                        attempts,
                        last_error,
                    };
                }
            };
        }
    }

    /// Feedback from `obs` that should land on the previous step.
    fn pending_feedback(&self, obs: &Observation) -> Option<StepFeedback> {
        let feedback = obs.feedback()?;
        match self.trajectory.last() {
            None => {
                tracing::debug!("feedback supplied before any step; ignored");
                None
            }
            Some(last) if last.feedback().is_some() => {
                tracing::warn!(step = last.index(), "previous step already has feedback; ignored");
                None
            }
            Some(_) => Some(feedback),
        }
    }

    fn retry_or_fail(&self, step: usize, attempt: u32, err: DeskPilotError, obs: Observation) -> CycleState {
        tracing::warn!(
            step,
            attempt,
            max_attempts = self.max_attempts,
            kind = err.failure_kind(),
            error = %err,
            "prediction attempt failed"
        );
        self.log.record(
            step,
            LogKind::AttemptFailed,
            serde_json::json!({
                "attempt": attempt,
                "kind": err.failure_kind(),
                "error": err.to_string(),
            }),
        );
        if attempt < self.max_attempts {
            CycleState::CallModel {
                attempt: attempt + 1,
                obs,
            }
        } else {
            CycleState::Failed {
                attempts: attempt,
                last_error: err.to_string(),
            }
        }
    }
}
