//! Loop suppression: stop the agent from emitting the same effective action
//! twice in a row.

use crate::protocol::action::Action;
use crate::protocol::coords;

/// Clicks closer than this (unit-space Euclidean distance) count as the same click.
pub const DEFAULT_CLICK_RADIUS: f64 = 0.03;
/// Duration of the neutral `wait` substituted for a blocked action, in seconds.
pub const DEFAULT_WAIT_SECONDS: f64 = 2.0;

#[derive(Debug, Clone, PartialEq)]
pub enum GuardVerdict {
    Pass(Action),
    /// The candidate repeated the previous action and was replaced.
    Substituted { blocked: Action, replacement: Action },
}

impl GuardVerdict {
    pub fn action(&self) -> &Action {
        match self {
            GuardVerdict::Pass(a) => a,
            GuardVerdict::Substituted { replacement, .. } => replacement,
        }
    }

    pub fn into_action(self) -> Action {
        match self {
            GuardVerdict::Pass(a) => a,
            GuardVerdict::Substituted { replacement, .. } => replacement,
        }
    }

    pub fn is_substituted(&self) -> bool {
        matches!(self, GuardVerdict::Substituted { .. })
    }
}

#[derive(Debug, Clone)]
pub struct DuplicateGuard {
    pub click_radius: f64,
    pub wait_seconds: f64,
}

impl Default for DuplicateGuard {
    fn default() -> Self {
        Self {
            click_radius: DEFAULT_CLICK_RADIUS,
            wait_seconds: DEFAULT_WAIT_SECONDS,
        }
    }
}

impl DuplicateGuard {
    pub fn new(click_radius: f64, wait_seconds: f64) -> Self {
        Self { click_radius, wait_seconds }
    }

    /// True when `candidate` repeats `previous`. Only `click`, `type` and
    /// `launch` are ever flagged.
    pub fn is_duplicate(&self, previous: &Action, candidate: &Action) -> bool {
        match (previous, candidate) {
            (Action::Click { coordinate: a, .. }, Action::Click { coordinate: b, .. }) => {
                coords::distance(*a, *b) < self.click_radius
            }
            (Action::Type { text: a }, Action::Type { text: b }) => !a.is_empty() && a == b,
            (Action::Launch { text: a }, Action::Launch { text: b }) => {
                a.to_lowercase() == b.to_lowercase()
            }
            _ => false,
        }
    }

    pub fn check(&self, previous: Option<&Action>, candidate: Action) -> GuardVerdict {
        match previous {
            Some(prev) if self.is_duplicate(prev, &candidate) => GuardVerdict::Substituted {
                blocked: candidate,
                replacement: Action::Wait {
                    duration: self.wait_seconds,
                },
            },
            _ => GuardVerdict::Pass(candidate),
        }
    }
}

/// Appends the substitution note to the model's reasoning.
pub fn annotate_reasoning(reasoning: Option<&str>, blocked: &Action) -> String {
    let note = format!(
        "[duplicate {} blocked: the previous step already did this, waiting instead]",
        blocked.name()
    );
    match reasoning {
        Some(r) if !r.trim().is_empty() => format!("{r}\n{note}"),
        _ => note,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn click(x: f64, y: f64) -> Action {
        Action::Click { coordinate: [x, y], button: None }
    }

    #[test]
    fn near_click_is_replaced_with_wait() {
        let guard = DuplicateGuard::default();
        let verdict = guard.check(Some(&click(0.50, 0.50)), click(0.51, 0.51));
        assert!(verdict.is_substituted());
        assert_eq!(verdict.action(), &Action::Wait { duration: DEFAULT_WAIT_SECONDS });
    }

    #[test]
    fn distant_click_passes() {
        let guard = DuplicateGuard::default();
        let verdict = guard.check(Some(&click(0.50, 0.50)), click(0.60, 0.60));
        assert_eq!(verdict, GuardVerdict::Pass(click(0.60, 0.60)));
    }

    #[test]
    fn type_requires_equal_non_empty_text() {
        let guard = DuplicateGuard::default();
        let t = |s: &str| Action::Type { text: s.into() };
        assert!(guard.is_duplicate(&t("hello"), &t("hello")));
        assert!(!guard.is_duplicate(&t("hello"), &t("Hello")));
        assert!(!guard.is_duplicate(&t(""), &t("")));
    }

    #[test]
    fn launch_compares_case_insensitively() {
        let guard = DuplicateGuard::default();
        let l = |s: &str| Action::Launch { text: s.into() };
        assert!(guard.is_duplicate(&l("Notepad"), &l("notepad")));
        assert!(!guard.is_duplicate(&l("notepad"), &l("chrome")));
    }

    #[test]
    fn other_actions_and_mixed_kinds_never_flag() {
        let guard = DuplicateGuard::default();
        let wait = Action::Wait { duration: 1.0 };
        assert!(!guard.is_duplicate(&wait, &wait));
        assert!(!guard.is_duplicate(&click(0.5, 0.5), &Action::DoubleClick { coordinate: [0.5, 0.5], button: None }));
        assert_eq!(guard.check(None, click(0.5, 0.5)), GuardVerdict::Pass(click(0.5, 0.5)));
    }

    #[test]
    fn annotation_keeps_original_reasoning() {
        let note = annotate_reasoning(Some("Step 2/3: click search"), &click(0.5, 0.5));
        assert!(note.starts_with("Step 2/3: click search\n"));
        assert!(note.contains("duplicate click blocked"));
        assert!(annotate_reasoning(None, &click(0.5, 0.5)).starts_with("[duplicate click"));
    }
}
