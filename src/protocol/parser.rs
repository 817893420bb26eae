//! Extraction of reasoning text and a candidate action from raw model output.
//!
//! Parsing runs in two phases. A delimiter scanner locates the reasoning
//! block and the action block; the action body is then handed to
//! `serde_json`. Nothing in here fails hard: a missing or broken action
//! block yields `action: None` with a diagnostic for the retry path.

use std::borrow::Cow;

use serde_json::Value;

use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::protocol::action::ActionMap;
use crate::protocol::coords::{self, COORDINATE_KEYS};

pub const REASONING_OPEN: &str = "<thinking>";
pub const REASONING_CLOSE: &str = "</thinking>";
pub const INVOKE_OPEN: &str = "<invoke>";
pub const INVOKE_CLOSE: &str = "</invoke>";

// Emitted by "thinking" model variants.
const ALT_REASONING_OPEN: &str = "<think>";
const ALT_REASONING_CLOSE: &str = "</think>";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedResponse {
    /// `None` when no reasoning block exists; `Some("")` when it exists but is blank.
    pub reasoning: Option<String>,
    /// Candidate action with coordinates already normalized to unit space.
    pub action: Option<ActionMap>,
    /// Why `action` is `None`, if it is.
    pub diagnostic: Option<String>,
}

impl ParsedResponse {
    pub fn require_action(&self) -> DeskPilotResult<&ActionMap> {
        self.action.as_ref().ok_or_else(|| {
            DeskPilotError::Parse(
                self.diagnostic
                    .clone()
                    .unwrap_or_else(|| "no action block found".into()),
            )
        })
    }
}

/// Parse raw model output into reasoning and a normalized candidate action.
pub fn parse_response(raw: &str) -> ParsedResponse {
    let text = canonicalize_reasoning_tags(raw.trim());
    let text = text.as_ref();

    let mut parsed = ParsedResponse::default();
    let mut cursor = 0;

    if let Some(block) = find_block(text, 0, &[REASONING_OPEN], REASONING_CLOSE) {
        parsed.reasoning = Some(clean_body(block.body).to_string());
        cursor = block.end;
    }

    // Models sometimes open the action block with the closing marker.
    let Some(block) = find_block(text, cursor, &[INVOKE_OPEN, INVOKE_CLOSE], INVOKE_CLOSE) else {
        parsed.diagnostic = Some("no action block found".into());
        return parsed;
    };

    match parse_action_body(clean_body(block.body)) {
        Ok(mut action) => {
            normalize_coordinates(&mut action);
            parsed.action = Some(action);
        }
        Err(e) => {
            tracing::debug!(error = %e, "action body rejected");
            parsed.diagnostic = Some(e.to_string());
        }
    }
    parsed
}

/// Rewrites `<think>`/`</think>` output to the canonical reasoning tags.
///
/// Only applies when the canonical closing tag is absent. A missing opening
/// tag is synthesized at the start of the text.
pub fn canonicalize_reasoning_tags(text: &str) -> Cow<'_, str> {
    if !text.contains(ALT_REASONING_CLOSE) || text.contains(REASONING_CLOSE) {
        return Cow::Borrowed(text);
    }
    let mut rewritten = text
        .replace(ALT_REASONING_CLOSE, REASONING_CLOSE)
        .replace(ALT_REASONING_OPEN, REASONING_OPEN);
    if !rewritten.contains(REASONING_OPEN) {
        rewritten.insert_str(0, REASONING_OPEN);
    }
    Cow::Owned(rewritten)
}

// ── Phase 1: delimiter scanning ──────────────────────────────────────────────

#[derive(Debug, PartialEq)]
struct Block<'a> {
    body: &'a str,
    /// Byte offset just past the closing marker.
    end: usize,
}

/// Finds the earliest of `openers` at or after `from`, then the next `close`
/// after it. The body is everything in between.
fn find_block<'a>(text: &'a str, from: usize, openers: &[&str], close: &str) -> Option<Block<'a>> {
    let haystack = text.get(from..)?;
    let (open_at, open_len) = openers
        .iter()
        .filter_map(|marker| haystack.find(marker).map(|i| (i, marker.len())))
        .min_by_key(|(i, _)| *i)?;

    let body_start = from + open_at + open_len;
    let body_len = text[body_start..].find(close)?;
    let body_end = body_start + body_len;
    Some(Block {
        body: &text[body_start..body_end],
        end: body_end + close.len(),
    })
}

fn clean_body(body: &str) -> &str {
    body.trim().trim_matches('"').trim()
}

// ── Phase 2: structured body ─────────────────────────────────────────────────

/// Decodes the action block body, unwrapping one `{"arguments": {...}}` level.
fn parse_action_body(body: &str) -> DeskPilotResult<ActionMap> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| DeskPilotError::Parse(format!("invalid JSON in action block: {e}")))?;

    let Value::Object(mut map) = value else {
        return Err(DeskPilotError::Parse("action block is not a JSON object".into()));
    };

    match map.remove("arguments") {
        None => Ok(map),
        Some(Value::Object(inner)) => Ok(inner),
        // Some endpoints serialize arguments as a JSON string.
        Some(Value::String(s)) => match serde_json::from_str::<Value>(&s) {
            Ok(Value::Object(inner)) => Ok(inner),
            _ => Err(DeskPilotError::Parse("`arguments` string is not a JSON object".into())),
        },
        Some(_) => Err(DeskPilotError::Parse("`arguments` is not a JSON object".into())),
    }
}

/// Collapses bounding boxes and converts every coordinate field to unit space.
/// Fields that are not numeric lists of length 2 or 4 are left for validation.
pub fn normalize_coordinates(action: &mut ActionMap) {
    for key in COORDINATE_KEYS {
        let Some(Value::Array(items)) = action.get(key) else {
            continue;
        };
        let numbers: Option<Vec<f64>> = items.iter().map(Value::as_f64).collect();
        let Some(point) = numbers.as_deref().and_then(coords::collapse) else {
            continue;
        };
        let [x, y] = coords::normalize_point(point);
        action.insert(key.to_string(), serde_json::json!([x, y]));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn coord(parsed: &ParsedResponse, key: &str) -> Vec<f64> {
        parsed.action.as_ref().unwrap()[key]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_f64().unwrap())
            .collect()
    }

    #[test]
    fn canonical_click_is_normalized() {
        let raw = r#"<thinking>ok</thinking><invoke>{"action":"click","coordinate":[500,500]}</invoke>"#;
        let parsed = parse_response(raw);
        assert_eq!(parsed.reasoning.as_deref(), Some("ok"));
        let c = coord(&parsed, "coordinate");
        assert!((c[0] - 500.0 / 999.0).abs() < 1e-12);
        assert!((c[1] - 500.0 / 999.0).abs() < 1e-12);
        assert_eq!(parsed.action.as_ref().unwrap()["action"], "click");
        assert!(parsed.diagnostic.is_none());
    }

    #[test]
    fn alternate_think_close_matches_canonical() {
        let canonical = parse_response(
            "<thinking>open the menu</thinking>\n<invoke>{\"action\":\"type\",\"text\":\"hi\"}</invoke>",
        );
        let alternate =
            parse_response("open the menu</think>\n<invoke>{\"action\":\"type\",\"text\":\"hi\"}</invoke>");
        let with_open = parse_response(
            "<think>open the menu</think>\n<invoke>{\"action\":\"type\",\"text\":\"hi\"}</invoke>",
        );
        assert_eq!(canonical, alternate);
        assert_eq!(canonical, with_open);
    }

    #[test]
    fn either_opening_marker_is_accepted() {
        let a = parse_response("<thinking>x</thinking>\n<invoke>\n{\"action\":\"launch\",\"text\":\"notepad\"}\n</invoke>");
        let b = parse_response("<thinking>x</thinking>\n</invoke>\n{\"action\":\"launch\",\"text\":\"notepad\"}\n</invoke>");
        assert!(a.action.is_some());
        assert_eq!(a, b);
    }

    #[test]
    fn wrapped_and_direct_bodies_agree() {
        let wrapped = parse_response(
            r#"<thinking>t</thinking><invoke>{"name":"desktop_use","arguments":{"action":"click","coordinate":[10,20]}}</invoke>"#,
        );
        let direct =
            parse_response(r#"<thinking>t</thinking><invoke>{"action":"click","coordinate":[10,20]}</invoke>"#);
        assert_eq!(wrapped, direct);
    }

    #[test]
    fn stringified_arguments_are_unwrapped() {
        let parsed = parse_response(
            r#"<thinking>t</thinking><invoke>{"name":"desktop_use","arguments":"{\"action\":\"wait\",\"duration\":1}"}</invoke>"#,
        );
        assert_eq!(parsed.action.unwrap()["duration"], json!(1));
    }

    #[test]
    fn bounding_box_matches_midpoint() {
        let bbox = parse_response(r#"<thinking></thinking><invoke>{"action":"click","coordinate":[10,20,30,40]}</invoke>"#);
        let mid = parse_response(r#"<thinking></thinking><invoke>{"action":"click","coordinate":[20,30]}</invoke>"#);
        assert_eq!(coord(&bbox, "coordinate"), coord(&mid, "coordinate"));
    }

    #[test]
    fn drag_coordinates_are_normalized() {
        let parsed = parse_response(
            r#"<thinking>d</thinking><invoke>{"action":"drag","start_coordinate":[0,999],"end_coordinate":[0.25,0.75]}</invoke>"#,
        );
        assert_eq!(coord(&parsed, "start_coordinate"), vec![0.0, 1.0]);
        assert_eq!(coord(&parsed, "end_coordinate"), vec![0.25, 0.75]);
    }

    #[test]
    fn malformed_json_keeps_reasoning() {
        let parsed = parse_response("<thinking>still here</thinking><invoke>{\"action\": \"click\", </invoke>");
        assert_eq!(parsed.reasoning.as_deref(), Some("still here"));
        assert!(parsed.action.is_none());
        assert!(parsed.diagnostic.as_deref().unwrap().contains("invalid JSON"));
        assert!(matches!(parsed.require_action(), Err(DeskPilotError::Parse(_))));
    }

    #[test]
    fn no_blocks_yields_nothing() {
        let parsed = parse_response("I would click the button.");
        assert_eq!(parsed.reasoning, None);
        assert_eq!(parsed.action, None);
    }

    #[test]
    fn blank_reasoning_is_distinct_from_absent() {
        let parsed = parse_response("<thinking>  \n </thinking><invoke>{\"action\":\"wait\",\"duration\":1}</invoke>");
        assert_eq!(parsed.reasoning.as_deref(), Some(""));
        assert!(parsed.action.is_some());
    }

    #[test]
    fn quoted_body_is_stripped() {
        let parsed = parse_response("<thinking>\"q\"</thinking><invoke>\"{\"action\":\"answer\",\"text\":\"42\"}\"</invoke>");
        assert_eq!(parsed.reasoning.as_deref(), Some("q"));
        assert_eq!(parsed.action.unwrap()["text"], "42");
    }

    #[test]
    fn odd_coordinate_arity_is_left_untouched() {
        let parsed = parse_response(r#"<thinking>x</thinking><invoke>{"action":"click","coordinate":[1,2,3]}</invoke>"#);
        assert_eq!(parsed.action.unwrap()["coordinate"], json!([1, 2, 3]));
    }
}
