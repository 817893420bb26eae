//! Prompt construction. A pure function of the trajectory and the current
//! observation: the same inputs always produce the same messages.

use crate::agent_engine::trajectory::{StepFeedback, Trajectory};
use crate::errors::DeskPilotResult;
use crate::llm::types::ChatMessage;
use crate::perception::screenshot::Screenshot;
use crate::protocol::render::render_response;

pub const EXECUTION_RESULT_PREFIX: &str = "[EXECUTION RESULT]: ";

/// System turn, goal, replayed history, then the current screenshot.
///
/// `pending_feedback` belongs to the last step and is rendered as if it were
/// already stored there.
pub fn build_messages(
    system_prompt: &str,
    goal: &str,
    trajectory: &Trajectory,
    pending_feedback: Option<&StepFeedback>,
    screenshot: &Screenshot,
) -> DeskPilotResult<Vec<ChatMessage>> {
    let mut messages = vec![ChatMessage::system(system_prompt), ChatMessage::user(goal)];
    messages.extend(history_messages(trajectory, pending_feedback)?);
    messages.push(ChatMessage::user_image(screenshot.to_data_uri(), None));
    Ok(messages)
}

pub fn history_messages(
    trajectory: &Trajectory,
    pending_feedback: Option<&StepFeedback>,
) -> DeskPilotResult<Vec<ChatMessage>> {
    let last_index = trajectory.len().checked_sub(1);
    let mut messages = Vec::with_capacity(trajectory.len() * 2);

    for step in trajectory.steps() {
        messages.push(ChatMessage::assistant(render_response(
            step.reasoning(),
            step.action_map(),
        )?));

        let feedback = step.feedback().or(if Some(step.index()) == last_index {
            pending_feedback
        } else {
            None
        });
        if let Some(feedback) = feedback {
            messages.extend(feedback_messages(feedback));
        }
    }
    Ok(messages)
}

fn feedback_messages(feedback: &StepFeedback) -> Vec<ChatMessage> {
    let mut messages = Vec::new();
    for reply in [&feedback.user_reply, &feedback.tool_reply].into_iter().flatten() {
        if !reply.is_empty() {
            messages.push(ChatMessage::user(reply.as_str()));
        }
    }
    if !feedback.execution_result.is_empty() {
        messages.push(ChatMessage::user(format!(
            "{EXECUTION_RESULT_PREFIX}{}",
            feedback.execution_result
        )));
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_engine::trajectory::PendingStep;
    use crate::protocol::action::Action;
    use crate::protocol::render::BLANK_REASONING;

    fn shot() -> Screenshot {
        Screenshot::from_bytes(vec![0x89, b'P', b'N', b'G']).unwrap()
    }

    fn step(reasoning: Option<&str>, action: Action) -> PendingStep {
        PendingStep {
            action_map: action.to_map(),
            screenshot: shot(),
            accessibility_tree: None,
            raw_output: String::new(),
            reasoning: reasoning.map(str::to_string),
            action,
            agent_type: "test".into(),
            model_name: "m".into(),
        }
    }

    #[test]
    fn empty_trajectory_is_system_goal_image() {
        let msgs = build_messages("sys", "open notepad", &Trajectory::new(), None, &shot()).unwrap();
        let roles: Vec<_> = msgs.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, ["system", "user", "user"]);
        assert_eq!(msgs[1].text_content(), "open notepad");
        assert_eq!(msgs[2].image_count(), 1);
    }

    #[test]
    fn history_replays_rescaled_actions_and_feedback() {
        let mut traj = Trajectory::new();
        traj.append(step(Some("launch it"), Action::Launch { text: "notepad".into() }));
        traj.record_feedback(StepFeedback {
            execution_result: "launched notepad".into(),
            user_reply: Some("yes, use notepad".into()),
            tool_reply: None,
        })
        .unwrap();
        traj.append(step(None, Action::Click { coordinate: [0.5, 0.5], button: None }));

        let pending = StepFeedback {
            execution_result: "clicked".into(),
            ..Default::default()
        };
        let msgs = build_messages("sys", "goal", &traj, Some(&pending), &shot()).unwrap();
        let texts: Vec<_> = msgs.iter().map(|m| (m.role.as_str(), m.text_content())).collect();

        assert_eq!(texts[2].0, "assistant");
        assert!(texts[2].1.contains("launch it"));
        assert_eq!(texts[3], ("user", "yes, use notepad".to_string()));
        assert_eq!(texts[4], ("user", "[EXECUTION RESULT]: launched notepad".to_string()));
        assert_eq!(texts[5].0, "assistant");
        assert!(texts[5].1.contains(BLANK_REASONING));
        assert!(texts[5].1.contains("\"coordinate\":[500,500]"));
        assert_eq!(texts[6], ("user", "[EXECUTION RESULT]: clicked".to_string()));
        assert_eq!(msgs.len(), 8);
        assert_eq!(msgs[7].image_count(), 1);
    }

    #[test]
    fn building_is_deterministic() {
        let mut traj = Trajectory::new();
        traj.append(step(Some("t"), Action::Wait { duration: 1.0 }));
        let a = build_messages("sys", "g", &traj, None, &shot()).unwrap();
        let b = build_messages("sys", "g", &traj, None, &shot()).unwrap();
        assert_eq!(a, b);
    }
}
