//! Typed desktop actions and structural validation of parsed candidates.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::protocol::coords::Point;

/// Untyped action as decoded from the model, keyed by field name.
pub type ActionMap = Map<String, Value>;

/// Key holding the action discriminator.
pub const DISCRIMINATOR: &str = "action";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

/// A validated action. Coordinates are in unit space.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Click { coordinate: Point, button: Option<MouseButton> },
    DoubleClick { coordinate: Point, button: Option<MouseButton> },
    Drag { start_coordinate: Point, end_coordinate: Point },
    Scroll { coordinate: Point, direction: ScrollDirection, amount: f64 },
    Type { text: String },
    Launch { text: String },
    Wait { duration: f64 },
    Terminate { status: String },
    Answer { text: String },
    /// Unrecognized discriminator, forwarded untouched for the executor to reject.
    Unknown { name: String, fields: ActionMap },
}

impl Action {
    /// The discriminator string, as the model spells it.
    pub fn name(&self) -> &str {
        match self {
            Action::Click { .. } => "click",
            Action::DoubleClick { .. } => "double_click",
            Action::Drag { .. } => "drag",
            Action::Scroll { .. } => "scroll",
            Action::Type { .. } => "type",
            Action::Launch { .. } => "launch",
            Action::Wait { .. } => "wait",
            Action::Terminate { .. } => "terminate",
            Action::Answer { .. } => "answer",
            Action::Unknown { name, .. } => name,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Action::Unknown { .. })
    }

    /// Back to the untyped mapping, coordinates still in unit space.
    /// Whole-number amounts and durations come out as JSON integers.
    pub fn to_map(&self) -> ActionMap {
        let value = match self {
            Action::Click { coordinate, button } | Action::DoubleClick { coordinate, button } => {
                let mut v = json!({ "coordinate": coordinate });
                if let Some(b) = button {
                    v["button"] = json!(b);
                }
                v
            }
            Action::Drag { start_coordinate, end_coordinate } => json!({
                "start_coordinate": start_coordinate,
                "end_coordinate": end_coordinate,
            }),
            Action::Scroll { coordinate, direction, amount } => json!({
                "coordinate": coordinate,
                "direction": direction,
                "amount": number_value(*amount),
            }),
            Action::Type { text } | Action::Launch { text } | Action::Answer { text } => {
                json!({ "text": text })
            }
            Action::Wait { duration } => json!({ "duration": number_value(*duration) }),
            Action::Terminate { status } => json!({ "status": status }),
            Action::Unknown { fields, .. } => Value::Object(fields.clone()),
        };

        let mut map = Map::new();
        map.insert(DISCRIMINATOR.into(), Value::String(self.name().to_string()));
        if let Value::Object(fields) = value {
            map.extend(fields);
        }
        map
    }
}

impl Serialize for Action {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        self.to_map().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::de::Deserializer<'de>,
    {
        let map = ActionMap::deserialize(deserializer)?;
        validate(&map).map_err(serde::de::Error::custom)
    }
}

// ── Validation ───────────────────────────────────────────────────────────────

/// Checks the discriminator and required fields of a parsed candidate.
///
/// Expects coordinates already collapsed to pairs (see
/// [`crate::protocol::parser::normalize_coordinates`]); anything else is a
/// `MalformedAction`. Unknown discriminators pass through as [`Action::Unknown`].
pub fn validate(map: &ActionMap) -> DeskPilotResult<Action> {
    let name = match map.get(DISCRIMINATOR) {
        Some(Value::String(s)) if !s.is_empty() => s.as_str(),
        Some(_) => return Err(malformed("discriminator `action` is not a non-empty string")),
        None => return Err(malformed("missing discriminator `action`")),
    };

    let action = match name {
        "click" => Action::Click {
            coordinate: point(map, "coordinate")?,
            button: optional_enum(map, "button")?,
        },
        "double_click" => Action::DoubleClick {
            coordinate: point(map, "coordinate")?,
            button: optional_enum(map, "button")?,
        },
        "drag" => Action::Drag {
            start_coordinate: point(map, "start_coordinate")?,
            end_coordinate: point(map, "end_coordinate")?,
        },
        "scroll" => Action::Scroll {
            coordinate: point(map, "coordinate")?,
            direction: required_enum(map, "direction")?,
            amount: number(map, "amount")?,
        },
        "type" => Action::Type { text: text(map, "text")? },
        "launch" => Action::Launch { text: text(map, "text")? },
        "answer" => Action::Answer { text: text(map, "text")? },
        "wait" => Action::Wait { duration: number(map, "duration")? },
        "terminate" => Action::Terminate { status: text(map, "status")? },
        other => {
            tracing::debug!(action = other, "unrecognized action forwarded to executor");
            let fields: ActionMap = map
                .iter()
                .filter(|(k, _)| k.as_str() != DISCRIMINATOR)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            Action::Unknown { name: other.to_string(), fields }
        }
    };
    Ok(action)
}

/// Validate a raw map, normalizing coordinates first.
pub fn normalize(mut map: ActionMap) -> DeskPilotResult<Action> {
    crate::protocol::parser::normalize_coordinates(&mut map);
    validate(&map)
}

fn malformed(msg: impl Into<String>) -> DeskPilotError {
    DeskPilotError::MalformedAction(msg.into())
}

fn field<'a>(map: &'a ActionMap, key: &str) -> DeskPilotResult<&'a Value> {
    map.get(key)
        .ok_or_else(|| malformed(format!("missing required field `{key}`")))
}

fn point(map: &ActionMap, key: &str) -> DeskPilotResult<Point> {
    let items = field(map, key)?
        .as_array()
        .ok_or_else(|| malformed(format!("`{key}` is not a list")))?;
    match items.as_slice() {
        [x, y] => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => Ok([x, y]),
            _ => Err(malformed(format!("`{key}` has non-numeric elements"))),
        },
        other => Err(malformed(format!(
            "`{key}` must have 2 elements, got {}",
            other.len()
        ))),
    }
}

fn number(map: &ActionMap, key: &str) -> DeskPilotResult<f64> {
    let value = field(map, key)?;
    // Numeric strings show up occasionally ("duration": "2").
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
        .ok_or_else(|| malformed(format!("`{key}` is not a number")))
}

fn text(map: &ActionMap, key: &str) -> DeskPilotResult<String> {
    field(map, key)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| malformed(format!("`{key}` is not a string")))
}

fn required_enum<T: serde::de::DeserializeOwned>(map: &ActionMap, key: &str) -> DeskPilotResult<T> {
    let raw = field(map, key)?;
    serde_json::from_value(lowercase(raw))
        .map_err(|_| malformed(format!("`{key}` has unsupported value {raw}")))
}

fn optional_enum<T: serde::de::DeserializeOwned>(
    map: &ActionMap,
    key: &str,
) -> DeskPilotResult<Option<T>> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(_) => required_enum(map, key).map(Some),
    }
}

fn lowercase(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.to_lowercase()),
        other => other.clone(),
    }
}

fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        Value::from(n as i64)
    } else {
        json!(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(v: Value) -> ActionMap {
        match v {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn click_with_button() {
        let action = validate(&map(json!({"action": "click", "coordinate": [0.5, 0.25], "button": "Right"}))).unwrap();
        assert_eq!(
            action,
            Action::Click { coordinate: [0.5, 0.25], button: Some(MouseButton::Right) }
        );
    }

    #[test]
    fn every_known_variant_validates() {
        let cases = [
            json!({"action": "double_click", "coordinate": [0.1, 0.2]}),
            json!({"action": "drag", "start_coordinate": [0.1, 0.2], "end_coordinate": [0.3, 0.4]}),
            json!({"action": "scroll", "coordinate": [0.5, 0.5], "direction": "down", "amount": 3}),
            json!({"action": "type", "text": "hello\n"}),
            json!({"action": "launch", "text": "notepad"}),
            json!({"action": "wait", "duration": 2.0}),
            json!({"action": "terminate", "status": "success"}),
            json!({"action": "answer", "text": "42"}),
        ];
        for case in cases {
            let action = validate(&map(case.clone())).unwrap();
            assert!(action.is_known());
            assert_eq!(action.name(), case["action"]);
        }
    }

    #[test]
    fn missing_discriminator_is_malformed() {
        let err = validate(&map(json!({"coordinate": [0.1, 0.2]}))).unwrap_err();
        assert!(matches!(err, DeskPilotError::MalformedAction(_)));
    }

    #[test]
    fn missing_required_field_is_malformed() {
        for case in [
            json!({"action": "click"}),
            json!({"action": "drag", "start_coordinate": [0.1, 0.2]}),
            json!({"action": "scroll", "coordinate": [0.5, 0.5], "amount": 3}),
            json!({"action": "type"}),
            json!({"action": "wait"}),
            json!({"action": "terminate"}),
        ] {
            assert!(
                matches!(validate(&map(case.clone())), Err(DeskPilotError::MalformedAction(_))),
                "{case}"
            );
        }
    }

    #[test]
    fn coordinate_arity_is_enforced() {
        let err = validate(&map(json!({"action": "click", "coordinate": [0.1, 0.2, 0.3]}))).unwrap_err();
        assert!(err.to_string().contains("2 elements"));
    }

    #[test]
    fn bad_enum_value_is_malformed() {
        let err = validate(&map(json!({"action": "click", "coordinate": [0.1, 0.2], "button": "middle"})));
        assert!(matches!(err, Err(DeskPilotError::MalformedAction(_))));
    }

    #[test]
    fn unknown_discriminator_passes_through() {
        let action = validate(&map(json!({"action": "hotkey", "keys": ["ctrl", "s"]}))).unwrap();
        assert!(!action.is_known());
        assert_eq!(action.name(), "hotkey");
        assert_eq!(action.to_map()["keys"], json!(["ctrl", "s"]));
        assert_eq!(action.to_map()["action"], "hotkey");
    }

    #[test]
    fn normalize_collapses_and_scales() {
        let action = normalize(map(json!({"action": "click", "coordinate": [10, 20, 30, 40]}))).unwrap();
        let midpoint = crate::protocol::coords::normalize_point([20.0, 30.0]);
        assert_eq!(action, Action::Click { coordinate: midpoint, button: None });
    }

    #[test]
    fn serde_round_trip_uses_flat_mapping() {
        let action = Action::Scroll { coordinate: [0.5, 0.5], direction: ScrollDirection::Up, amount: 5.0 };
        let value = serde_json::to_value(&action).unwrap();
        assert_eq!(value["action"], "scroll");
        assert_eq!(value["direction"], "up");
        let back: Action = serde_json::from_value(value).unwrap();
        assert_eq!(back, action);
    }

    #[test]
    fn whole_numbers_serialize_as_integers() {
        let wait = Action::Wait { duration: 2.0 }.to_map();
        assert_eq!(serde_json::to_string(&wait).unwrap(), r#"{"action":"wait","duration":2}"#);
        let half = Action::Wait { duration: 1.5 }.to_map();
        assert_eq!(half["duration"], json!(1.5));
    }

    #[test]
    fn unknown_fields_keep_their_order() {
        let action = validate(&map(json!({"action": "hotkey", "keys": ["ctrl", "s"], "hold": 1, "after": "x"}))).unwrap();
        let keys: Vec<_> = action.to_map().keys().cloned().collect();
        assert_eq!(keys, ["action", "keys", "hold", "after"]);
    }
}
