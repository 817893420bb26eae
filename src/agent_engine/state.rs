use serde::Serialize;

use crate::agent_engine::trajectory::StepFeedback;
use crate::perception::screenshot::Screenshot;
use crate::protocol::action::{Action, ActionMap};

/// Text returned in place of a model prediction when a cycle gives up.
pub const FAILURE_SENTINEL: &str = "llm client error";

/// Input to one prediction cycle.
///
/// `execution_result`, `user_reply` and `tool_reply` describe the *previous*
/// step's action; they are attached to that step, not the new one.
#[derive(Debug, Clone)]
pub struct Observation {
    pub screenshot: Screenshot,
    pub accessibility_tree: Option<serde_json::Value>,
    pub execution_result: String,
    pub user_reply: Option<String>,
    pub tool_reply: Option<String>,
}

impl Observation {
    pub fn new(screenshot: Screenshot) -> Self {
        Self {
            screenshot,
            accessibility_tree: None,
            execution_result: String::new(),
            user_reply: None,
            tool_reply: None,
        }
    }

    pub fn with_execution_result(mut self, result: impl Into<String>) -> Self {
        self.execution_result = result.into();
        self
    }

    pub fn with_user_reply(mut self, reply: impl Into<String>) -> Self {
        self.user_reply = Some(reply.into());
        self
    }

    pub fn with_tool_reply(mut self, reply: impl Into<String>) -> Self {
        self.tool_reply = Some(reply.into());
        self
    }

    pub fn with_accessibility_tree(mut self, tree: serde_json::Value) -> Self {
        self.accessibility_tree = Some(tree);
        self
    }

    /// Feedback for the previous step, if the caller supplied any.
    pub fn feedback(&self) -> Option<StepFeedback> {
        let feedback = StepFeedback {
            execution_result: self.execution_result.clone(),
            user_reply: self.user_reply.clone(),
            tool_reply: self.tool_reply.clone(),
        };
        (!feedback.is_empty()).then_some(feedback)
    }
}

/// States of a single prediction cycle.
///
/// The observation travels with the cycle until `Persist` moves its
/// screenshot into the new step.
#[derive(Debug)]
pub enum CycleState {
    BuildPrompt {
        obs: Observation,
    },
    CallModel {
        attempt: u32,
        obs: Observation,
    },
    Parse {
        attempt: u32,
        raw: String,
        obs: Observation,
    },
    Validate {
        attempt: u32,
        raw: String,
        reasoning: Option<String>,
        candidate: ActionMap,
        obs: Observation,
    },
    Guard {
        attempt: u32,
        raw: String,
        reasoning: Option<String>,
        action: Action,
        action_map: ActionMap,
        obs: Observation,
    },
    Persist {
        attempt: u32,
        raw: String,
        reasoning: Option<String>,
        action: Action,
        action_map: ActionMap,
        duplicate_blocked: bool,
        obs: Observation,
    },
    Done(PredictionOutcome),
    Failed {
        attempts: u32,
        last_error: String,
    },
}

impl CycleState {
    pub fn name(&self) -> &'static str {
        match self {
            CycleState::BuildPrompt { .. } => "build_prompt",
            CycleState::CallModel { .. } => "call_model",
            CycleState::Parse { .. } => "parse",
            CycleState::Validate { .. } => "validate",
            CycleState::Guard { .. } => "guard",
            CycleState::Persist { .. } => "persist",
            CycleState::Done(_) => "done",
            CycleState::Failed { .. } => "failed",
        }
    }
}

/// Result of one cycle, handed back to the caller for execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PredictionOutcome {
    Acted {
        step_index: usize,
        raw_output: String,
        reasoning: Option<String>,
        action: Action,
        duplicate_blocked: bool,
        attempts: u32,
    },
    /// All attempts failed; the trajectory was left untouched.
    Failed {
        message: String,
        attempts: u32,
        last_error: String,
    },
}

impl PredictionOutcome {
    pub fn action(&self) -> Option<&Action> {
        match self {
            PredictionOutcome::Acted { action, .. } => Some(action),
            PredictionOutcome::Failed { .. } => None,
        }
    }

    pub fn reasoning(&self) -> Option<&str> {
        match self {
            PredictionOutcome::Acted { reasoning, .. } => reasoning.as_deref(),
            PredictionOutcome::Failed { .. } => None,
        }
    }

    /// Raw model output on success, the failure sentinel otherwise.
    pub fn prediction(&self) -> &str {
        match self {
            PredictionOutcome::Acted { raw_output, .. } => raw_output,
            PredictionOutcome::Failed { message, .. } => message,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, PredictionOutcome::Failed { .. })
    }
}
