use serde::Serialize;

use crate::types::{Locator, NextAction, Popover, TourStep};

/// A step in the form the highlighter consumes.
///
/// The element stays a [`Locator`] and is only looked up when the
/// highlighter is about to show the step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriveStep {
    pub element: Option<Locator>,
    pub popover: Popover,
    /// False while the step waits for its input to be filled.
    #[serde(rename = "showNext")]
    pub show_next: bool,
    #[serde(skip)]
    pub input: Option<InputWait>,
    #[serde(skip)]
    pub clicks: Vec<Locator>,
}

/// Pause on a step until its target loses focus.
#[derive(Debug, Clone, PartialEq)]
pub struct InputWait {
    pub value: Option<String>,
}

pub fn normalize_step(step: TourStep) -> DriveStep {
    let element = step.target.and_then(Locator::non_empty);
    let input = (step.wait_for_input && element.is_some()).then(|| InputWait {
        value: step.input_value,
    });
    let clicks = step
        .next_actions
        .into_iter()
        .filter_map(|action| match action {
            NextAction::Click { locator } => locator.non_empty(),
            NextAction::Unsupported => None,
        })
        .collect();

    DriveStep {
        element,
        popover: step.popover,
        show_next: input.is_none(),
        input,
        clicks,
    }
}

/// JavaScript expression that evaluates to the element a locator points
/// at, or `null`.
pub fn element_expression(locator: &Locator) -> String {
    match locator {
        Locator::Selector(selector) => {
            format!("document.querySelector({})", js_string(selector))
        }
        Locator::XPath { xpath } => format!(
            "document.evaluate({}, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue",
            js_string(xpath)
        ),
    }
}

/// Quotes a string as a JavaScript literal.
pub fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}
