use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Where a tour step points on the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Locator {
    Selector(String),
    XPath { xpath: String },
}

impl Locator {
    /// Drops locators that cannot match anything (blank selectors or paths).
    pub fn non_empty(self) -> Option<Self> {
        match &self {
            Locator::Selector(s) if s.trim().is_empty() => None,
            Locator::XPath { xpath } if xpath.trim().is_empty() => None,
            _ => Some(self),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
    Top,
    Bottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    Start,
    Center,
    End,
}

/// The floating text panel attached to a highlighted element.
///
/// Model output is loose: `null` text reads as empty and an unknown
/// placement reads as unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Popover {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub side: Option<Side>,
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub align: Option<Align>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Something to do automatically when the user advances past a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum NextAction {
    Click { locator: Locator },
    #[serde(other)]
    Unsupported,
}

/// A single instruction in a tour.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TourStep {
    #[serde(
        default,
        rename = "element",
        alias = "target",
        skip_serializing_if = "Option::is_none"
    )]
    pub target: Option<Locator>,
    #[serde(default)]
    pub popover: Popover,
    #[serde(default, rename = "waitForInput", skip_serializing_if = "is_false")]
    pub wait_for_input: bool,
    #[serde(default, rename = "inputName", skip_serializing_if = "Option::is_none")]
    pub input_name: Option<String>,
    #[serde(default, rename = "inputValue", skip_serializing_if = "Option::is_none")]
    pub input_value: Option<String>,
    #[serde(default, rename = "nextActions", skip_serializing_if = "Vec::is_empty")]
    pub next_actions: Vec<NextAction>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl TourStep {
    pub fn new(target: Option<Locator>, title: &str, description: &str) -> Self {
        Self {
            target,
            popover: Popover {
                title: title.to_string(),
                description: description.to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

/// Compact description of the current page sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageContext {
    pub title: String,
    pub url: String,
    pub timestamp: String,
    #[serde(rename = "textSnippet")]
    pub text_snippet: Option<String>,
}

/// One user-fillable input declared by a predefined tour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// A tour shipped with the extension, matched against the page URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredefinedTour {
    #[serde(rename = "tourName")]
    pub tour_name: String,
    #[serde(default)]
    pub description: String,
    pub url: String,
    pub steps: Vec<TourStep>,
    #[serde(default, rename = "formInputs", skip_serializing_if = "Vec::is_empty")]
    pub form_inputs: Vec<FormInput>,
}

impl PredefinedTour {
    pub fn input_keys(&self) -> impl Iterator<Item = &str> {
        self.form_inputs.iter().map(|f| f.name.as_str())
    }

    /// Writes mapped values into the steps whose `inputName` matches.
    pub fn apply_form_input(&mut self, form_input: &Map<String, Value>) -> usize {
        let mut filled = 0;
        for step in &mut self.steps {
            let Some(name) = step.input_name.as_deref() else {
                continue;
            };
            let value = match form_input.get(name) {
                Some(Value::Null) | None => continue,
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
            };
            step.input_value = Some(value);
            filled += 1;
        }
        filled
    }
}

/// Normalized output of the model gateway.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelResult {
    Tour(Vec<TourStep>),
    FillForm {
        tour_name: String,
        form_input: Map<String, Value>,
    },
    Unknown(Value),
}

impl ModelResult {
    pub fn kind(&self) -> &'static str {
        match self {
            ModelResult::Tour(_) => "tour",
            ModelResult::FillForm { .. } => "fill_input_form",
            ModelResult::Unknown(_) => "unknown",
        }
    }
}

/// Maximum number of snippet characters sent to the model.
pub const TEXT_SNIPPET_MAX_CHARS: usize = 8000;

/// Prompt prefix that selects the canned offline tour.
pub const MOCK_PROMPT_PREFIX: &str = "mock:";
