//! Rebuilds the exact text a model would have emitted for a stored step, so
//! replayed history matches the model's own output convention.

use serde_json::Value;

use crate::errors::DeskPilotResult;
use crate::protocol::action::ActionMap;
use crate::protocol::coords::{self, COORDINATE_KEYS};
use crate::protocol::parser::{INVOKE_CLOSE, INVOKE_OPEN, REASONING_CLOSE, REASONING_OPEN};

/// Function name the model wraps its action arguments in.
pub const TOOL_NAME: &str = "desktop_use";

/// Stands in for blank reasoning so history never carries an empty tag pair.
pub const BLANK_REASONING: &str = "(proceeding with action)";

/// The action mapping with coordinates converted back to scaled integers.
/// Every other field, and the key order, is left as stored.
pub fn wire_action(action: &ActionMap) -> ActionMap {
    let mut map = action.clone();
    for key in COORDINATE_KEYS {
        let Some(Value::Array(items)) = map.get(key) else {
            continue;
        };
        if let [Some(x), Some(y)] = [
            items.first().and_then(Value::as_f64),
            items.get(1).and_then(Value::as_f64),
        ] {
            let scaled = coords::denormalize_point([x, y]);
            map.insert(key.to_string(), serde_json::json!(scaled));
        }
    }
    map
}

/// `{"name":"desktop_use","arguments":{...}}` in compact form.
pub fn render_invoke_body(action: &ActionMap) -> DeskPilotResult<String> {
    let arguments = serde_json::to_string(&wire_action(action))?;
    Ok(format!("{{\"name\":\"{TOOL_NAME}\",\"arguments\":{arguments}}}"))
}

pub fn render_response(reasoning: Option<&str>, action: &ActionMap) -> DeskPilotResult<String> {
    let thinking = match reasoning.map(str::trim) {
        Some(r) if !r.is_empty() => r,
        _ => BLANK_REASONING,
    };
    let body = render_invoke_body(action)?;
    Ok(format!(
        "{REASONING_OPEN}\n{thinking}\n{REASONING_CLOSE}\n{INVOKE_OPEN}\n{body}\n{INVOKE_CLOSE}"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::action::{validate, Action};
    use crate::protocol::parser::parse_response;

    #[test]
    fn click_renders_scaled_integers() {
        let action = Action::Click { coordinate: [0.5, 0.25], button: None };
        let text = render_response(Some("press it"), &action.to_map()).unwrap();
        assert_eq!(
            text,
            "<thinking>\npress it\n</thinking>\n<invoke>\n{\"name\":\"desktop_use\",\"arguments\":{\"action\":\"click\",\"coordinate\":[500,250]}}\n</invoke>"
        );
    }

    #[test]
    fn blank_reasoning_uses_placeholder() {
        let action = Action::Wait { duration: 2.0 }.to_map();
        for reasoning in [None, Some(""), Some("   ")] {
            let text = render_response(reasoning, &action).unwrap();
            assert!(text.contains(BLANK_REASONING), "{text}");
        }
    }

    #[test]
    fn model_output_is_reproduced_verbatim() {
        let cases = [
            r#"{"action":"scroll","coordinate":[500,500],"direction":"down","amount":3}"#,
            r#"{"action":"wait","duration":2}"#,
            r#"{"action":"click","button":"left","coordinate":[12,987]}"#,
            r#"{"action":"type","text":"你好\n"}"#,
            r#"{"action":"drag","end_coordinate":[900,800],"start_coordinate":[100,200]}"#,
            r#"{"action":"hotkey","keys":["ctrl","s"]}"#,
        ];
        for args in cases {
            let parsed = parse_response(&format!("<thinking>t</thinking><invoke>{args}</invoke>"));
            let stored = parsed.action.unwrap();
            assert_eq!(
                render_invoke_body(&stored).unwrap(),
                format!("{{\"name\":\"desktop_use\",\"arguments\":{args}}}")
            );
        }
    }

    #[test]
    fn bounding_box_replays_as_its_center() {
        let parsed = parse_response(r#"<invoke>{"action":"click","coordinate":[10,20,30,40]}</invoke>"#);
        assert_eq!(
            render_invoke_body(&parsed.action.unwrap()).unwrap(),
            r#"{"name":"desktop_use","arguments":{"action":"click","coordinate":[20,30]}}"#
        );
    }

    #[test]
    fn rendered_text_parses_back_to_same_action() {
        let action = Action::Drag { start_coordinate: [0.1, 0.2], end_coordinate: [0.9, 0.8] };
        let text = render_response(Some("drag it"), &action.to_map()).unwrap();
        let parsed = parse_response(&text);
        assert_eq!(parsed.reasoning.as_deref(), Some("drag it"));
        let back = validate(parsed.action.as_ref().unwrap()).unwrap();
        let Action::Drag { start_coordinate, end_coordinate } = back else {
            panic!("expected drag, got {back:?}");
        };
        for (a, b) in start_coordinate.iter().chain(&end_coordinate).zip([0.1, 0.2, 0.9, 0.8]) {
            assert!((a - b).abs() <= 1.0 / coords::SCALE);
        }
    }
}
