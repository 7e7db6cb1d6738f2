//! Turns the model's free text into a [`ModelResult`].
//!
//! The model is told to answer with `{"type": ..., "data": ...}` but does
//! not always comply, so anything plausible is accepted and classified.

use serde_json::{Map, Value};
use tracing::debug;

use crate::types::{ModelResult, PredefinedTour, TourStep};

/// Parses model text as JSON, preferring the contents of a fenced code
/// block. Returns `None` when neither the block nor the raw text parses.
pub fn parse_json(text: &str) -> Option<Value> {
    if let Some(inner) = fenced_block(text) {
        if let Ok(value) = serde_json::from_str(inner) {
            return Some(value);
        }
    }
    serde_json::from_str(text.trim()).ok()
}

fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after = &text[start + 3..];
    let end = after.find("```")?;
    let inner = &after[..end];
    // Drop the info string (`json`, `JSON`, ...), which may share the
    // line with the payload.
    let info_len = inner
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(inner.len());
    Some(inner[info_len..].trim())
}

/// Classifies a parsed value, falling back through the accepted shapes.
pub fn normalize(value: Value, existing: Option<&PredefinedTour>) -> ModelResult {
    match value {
        Value::Object(map) if map.contains_key("type") && map.contains_key("data") => {
            from_envelope(map)
        }
        Value::Array(items) => steps_or_unknown(Value::Array(items)),
        Value::Object(map) => from_bare_object(map, existing),
        other => ModelResult::Unknown(other),
    }
}

fn from_envelope(mut map: Map<String, Value>) -> ModelResult {
    let kind = map.get("type").and_then(Value::as_str).unwrap_or_default();
    match kind {
        "tour" => {
            let data = map.remove("data").unwrap_or(Value::Null);
            steps_or_unknown(data)
        }
        "fill_input_form" => match map.get_mut("data").map(Value::take) {
            Some(Value::Object(mut data)) => {
                let tour_name = data
                    .get("tourName")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                match data.remove("formInput") {
                    Some(Value::Object(form_input)) => ModelResult::FillForm {
                        tour_name,
                        form_input,
                    },
                    // A flat mapping without the formInput wrapper.
                    _ => {
                        data.remove("tourName");
                        ModelResult::FillForm {
                            tour_name,
                            form_input: data,
                        }
                    }
                }
            }
            other => {
                map.insert("data".into(), other.unwrap_or(Value::Null));
                ModelResult::Unknown(Value::Object(map))
            }
        },
        _ => ModelResult::Unknown(Value::Object(map)),
    }
}

fn from_bare_object(map: Map<String, Value>, existing: Option<&PredefinedTour>) -> ModelResult {
    match map.values().next() {
        Some(Value::Array(items)) if items.first().is_some_and(looks_like_step) => {
            let items = items.clone();
            return steps_or_unknown(Value::Array(items));
        }
        Some(first) if looks_like_step(first) => {
            let items: Vec<Value> = map.values().cloned().collect();
            return steps_or_unknown(Value::Array(items));
        }
        _ => {}
    }

    if let Some(tour) = existing {
        if tour.input_keys().any(|key| map.contains_key(key)) {
            debug!(tour = %tour.tour_name, "treating bare object as form input");
            return ModelResult::FillForm {
                tour_name: tour.tour_name.clone(),
                form_input: map,
            };
        }
    }

    ModelResult::Unknown(Value::Object(map))
}

fn looks_like_step(value: &Value) -> bool {
    value.get("popover").is_some()
}

fn steps_or_unknown(data: Value) -> ModelResult {
    match serde_json::from_value::<Vec<TourStep>>(data.clone()) {
        Ok(steps) => ModelResult::Tour(steps),
        Err(e) => {
            debug!("tour data does not decode as steps: {}", e);
            ModelResult::Unknown(data)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FormInput, Locator};
    use serde_json::json;

    fn signup_tour() -> PredefinedTour {
        PredefinedTour {
            tour_name: "Create account".into(),
            description: String::new(),
            url: "example.com/signup".into(),
            steps: vec![],
            form_inputs: vec![
                FormInput {
                    name: "email".into(),
                    description: "Email address".into(),
                },
                FormInput {
                    name: "password".into(),
                    description: String::new(),
                },
            ],
        }
    }

    #[test]
    fn parse_json_reads_plain_and_fenced_text() {
        let v = json!({"a": [1, 2, {"b": null}], "c": "d"});
        assert_eq!(parse_json(&v.to_string()), Some(v.clone()));

        let fenced = "Here you go:\n```json\n{\"type\":\"tour\",\"data\":[]}\n```\nEnjoy";
        assert_eq!(parse_json(fenced), Some(json!({"type": "tour", "data": []})));

        let bare_fence = "```\n[1,2]\n```";
        assert_eq!(parse_json(bare_fence), Some(json!([1, 2])));
    }

    #[test]
    fn parse_json_signals_no_parse() {
        assert_eq!(parse_json("I cannot help with that."), None);
        assert_eq!(parse_json("```json\n{broken\n```"), None);
        assert_eq!(parse_json(""), None);
    }

    #[test]
    fn envelope_tour_is_typed() {
        let value = json!({
            "type": "tour",
            "data": [{"element": "#signup", "popover": {"title": "Sign Up", "description": "Click here"}}]
        });
        match normalize(value, None) {
            ModelResult::Tour(steps) => {
                assert_eq!(steps.len(), 1);
                assert_eq!(steps[0].target, Some(Locator::Selector("#signup".into())));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn sloppy_popovers_still_make_a_tour() {
        let enveloped = json!({
            "type": "tour",
            "data": [
                {"element": "#a", "popover": {"title": null, "description": "d"}},
                {"element": "#b", "popover": {"title": "B", "description": "e", "side": "middle", "align": 3}}
            ]
        });
        let ModelResult::Tour(steps) = normalize(enveloped, None) else {
            panic!("null title or odd placement rejected the tour");
        };
        assert_eq!(steps[0].popover.title, "");
        assert_eq!(steps[1].popover.side, None);
        assert_eq!(steps[1].popover.align, None);

        let bare = json!([{"element": "#a", "popover": {"title": "A", "description": null}}]);
        let ModelResult::Tour(steps) = normalize(bare, None) else {
            panic!("null description rejected the tour");
        };
        assert_eq!(steps[0].popover.description, "");
    }

    #[test]
    fn one_line_fence_drops_its_info_word() {
        let text = "```json {\"type\":\"tour\",\"data\":[]}```";
        assert_eq!(parse_json(text), Some(json!({"type": "tour", "data": []})));

        let bare = "```[1, 2]```";
        assert_eq!(parse_json(bare), Some(json!([1, 2])));
    }

    #[test]
    fn bare_array_becomes_tour() {
        let value = json!([
            {"popover": {"title": "Intro"}},
            {"element": "#a", "popover": {"title": "A"}}
        ]);
        match normalize(value, None) {
            ModelResult::Tour(steps) => {
                assert_eq!(steps.len(), 2);
                assert!(steps[0].target.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn object_wrapping_steps_becomes_tour() {
        let value = json!({"steps": [{"element": "#a", "popover": {"title": "A"}}]});
        assert!(matches!(normalize(value, None), ModelResult::Tour(s) if s.len() == 1));

        let keyed = json!({
            "0": {"element": "#a", "popover": {"title": "A"}},
            "1": {"element": "#b", "popover": {"title": "B"}}
        });
        match normalize(keyed, None) {
            ModelResult::Tour(steps) => {
                assert_eq!(steps[1].target, Some(Locator::Selector("#b".into())));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn object_with_input_keys_becomes_form_input() {
        let tour = signup_tour();
        let value = json!({"email": "ada@example.com", "nickname": "ada"});
        match normalize(value, Some(&tour)) {
            ModelResult::FillForm {
                tour_name,
                form_input,
            } => {
                assert_eq!(tour_name, "Create account");
                assert_eq!(form_input["email"], "ada@example.com");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn envelope_form_input_is_typed() {
        let value = json!({
            "type": "fill_input_form",
            "data": {"tourName": "Create account", "formInput": {"password": "hunter2"}}
        });
        match normalize(value, None) {
            ModelResult::FillForm { form_input, .. } => {
                assert_eq!(form_input["password"], "hunter2");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unrecognized_shapes_are_unknown() {
        let value = json!({"answer": 42});
        assert_eq!(
            normalize(value.clone(), Some(&signup_tour())),
            ModelResult::Unknown(value)
        );
        assert!(matches!(
            normalize(json!("just text"), None),
            ModelResult::Unknown(_)
        ));
        assert!(matches!(
            normalize(json!({"type": "tour", "data": "nope"}), None),
            ModelResult::Unknown(_)
        ));
    }
}
