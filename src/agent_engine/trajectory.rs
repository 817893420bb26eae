//! Ordered, append-only log of completed prediction cycles for one session.
//! This is the only place past turns are remembered.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::perception::screenshot::Screenshot;
use crate::protocol::action::{Action, ActionMap};

/// What the outside world reported back about a step's action.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StepFeedback {
    pub execution_result: String,
    /// Answer to an ask-user prompt.
    pub user_reply: Option<String>,
    /// Response from an external tool server.
    pub tool_reply: Option<String>,
}

impl StepFeedback {
    pub fn is_empty(&self) -> bool {
        self.execution_result.is_empty()
            && self.user_reply.as_deref().map_or(true, str::is_empty)
            && self.tool_reply.as_deref().map_or(true, str::is_empty)
    }
}

/// Everything needed to append a step; the store assigns the index.
#[derive(Debug, Clone)]
pub struct PendingStep {
    pub screenshot: Screenshot,
    pub accessibility_tree: Option<serde_json::Value>,
    pub raw_output: String,
    pub reasoning: Option<String>,
    pub action: Action,
    /// The action as the model wrote it, coordinates in unit space.
    pub action_map: ActionMap,
    pub agent_type: String,
    pub model_name: String,
}

/// One completed turn. Immutable once appended, except for feedback which
/// is set at most once.
#[derive(Debug, Clone)]
pub struct TrajectoryStep {
    index: usize,
    screenshot: Screenshot,
    accessibility_tree: Option<serde_json::Value>,
    raw_output: String,
    reasoning: Option<String>,
    action: Action,
    action_map: ActionMap,
    feedback: Option<StepFeedback>,
    agent_type: String,
    model_name: String,
    created_at: DateTime<Utc>,
}

impl TrajectoryStep {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn screenshot(&self) -> &Screenshot {
        &self.screenshot
    }

    pub fn accessibility_tree(&self) -> Option<&serde_json::Value> {
        self.accessibility_tree.as_ref()
    }

    pub fn raw_output(&self) -> &str {
        &self.raw_output
    }

    pub fn reasoning(&self) -> Option<&str> {
        self.reasoning.as_deref()
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    /// Replayed into history in place of a re-serialized `action`, so the
    /// model sees its own field order and number formatting.
    pub fn action_map(&self) -> &ActionMap {
        &self.action_map
    }

    pub fn feedback(&self) -> Option<&StepFeedback> {
        self.feedback.as_ref()
    }

    /// Empty until the executor reports back.
    pub fn execution_result(&self) -> &str {
        self.feedback
            .as_ref()
            .map(|f| f.execution_result.as_str())
            .unwrap_or("")
    }

    pub fn agent_type(&self) -> &str {
        &self.agent_type
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[derive(Debug, Default)]
pub struct Trajectory {
    goal: Option<String>,
    steps: Vec<TrajectoryStep>,
}

impl Trajectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn goal(&self) -> Option<&str> {
        self.goal.as_deref()
    }

    /// First write wins. Returns whether the goal was set by this call.
    pub fn set_goal_once(&mut self, goal: &str) -> bool {
        if self.goal.is_some() {
            return false;
        }
        self.goal = Some(goal.to_string());
        true
    }

    pub fn steps(&self) -> &[TrajectoryStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn last(&self) -> Option<&TrajectoryStep> {
        self.steps.last()
    }

    pub fn last_action(&self) -> Option<&Action> {
        self.steps.last().map(|s| &s.action)
    }

    pub fn append(&mut self, pending: PendingStep) -> &TrajectoryStep {
        let index = self.steps.len();
        self.steps.push(TrajectoryStep {
            index,
            screenshot: pending.screenshot,
            accessibility_tree: pending.accessibility_tree,
            raw_output: pending.raw_output,
            reasoning: pending.reasoning,
            action: pending.action,
            action_map: pending.action_map,
            feedback: None,
            agent_type: pending.agent_type,
            model_name: pending.model_name,
            created_at: Utc::now(),
        });
        tracing::debug!(step = index, "trajectory step appended");
        &self.steps[index]
    }

    /// Attach feedback to the most recent step. Fails if there is no step or
    /// the step already has feedback.
    pub fn record_feedback(&mut self, feedback: StepFeedback) -> DeskPilotResult<()> {
        let step = self
            .steps
            .last_mut()
            .ok_or_else(|| DeskPilotError::Trajectory("no step to attach feedback to".into()))?;
        if step.feedback.is_some() {
            return Err(DeskPilotError::Trajectory(format!(
                "step {} already has feedback",
                step.index
            )));
        }
        step.feedback = Some(feedback);
        Ok(())
    }

    pub fn reset(&mut self) {
        self.steps.clear();
        self.goal = None;
    }
}
