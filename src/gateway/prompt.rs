use std::fmt::Write as _;

use crate::types::{PageContext, PredefinedTour, TEXT_SNIPPET_MAX_CHARS};

const OUTPUT_FORMAT: &str = r##"Respond with ONE strict JSON object and nothing else. No markdown, no explanation.

The object MUST have exactly this shape:
{"type": "tour" | "fill_input_form", "data": ...}

Rules for "type": "tour":
1. "data" is an array of steps, in the order the user should see them.
2. Each step is {"element": <CSS selector string or null>, "popover": {"title": string, "description": string, "side"?: "left"|"right"|"top"|"bottom", "align"?: "start"|"center"|"end"}}.
3. Only use selectors that match elements present in the page context. Prefer ids, then stable attributes.
4. Use "element": null for introduction and closing steps that do not point at anything.
5. Keep titles short. Descriptions are one or two sentences.

Example:
{"type":"tour","data":[{"element":null,"popover":{"title":"Welcome","description":"Let's create your account."}},{"element":"#signup","popover":{"title":"Sign Up","description":"Click here to start.","side":"bottom"}}]}"##;

/// Builds the text sent to the model: the user's request, the page context
/// and the output format rules.
pub fn build_prompt(
    prompt: &str,
    context: &PageContext,
    existing: Option<&PredefinedTour>,
) -> String {
    let mut out = String::with_capacity(prompt.len() + TEXT_SNIPPET_MAX_CHARS + 2048);

    let _ = writeln!(out, "User request:\n{}\n", prompt.trim());

    let snippet = context.text_snippet.as_deref().unwrap_or("");
    let truncated: String = snippet.chars().take(TEXT_SNIPPET_MAX_CHARS).collect();
    let _ = writeln!(out, "Page context:");
    let _ = writeln!(out, "Title: {}", context.title);
    let _ = writeln!(out, "URL: {}", context.url);
    let _ = writeln!(out, "Interactive elements:\n{}\n", truncated);

    out.push_str(OUTPUT_FORMAT);

    if let Some(tour) = existing {
        let keys: Vec<&str> = tour.input_keys().collect();
        let _ = write!(
            out,
            "\n\nThis request fills the inputs of the existing tour \"{}\".\n\
             You MUST answer with \"type\": \"fill_input_form\" and \
             \"data\": {{\"tourName\": \"{}\", \"formInput\": {{<key>: <value>}}}}.\n\
             The expected input keys are:\n",
            tour.tour_name, tour.tour_name
        );
        for input in &tour.form_inputs {
            if input.description.is_empty() {
                let _ = writeln!(out, "- {}", input.name);
            } else {
                let _ = writeln!(out, "- {}: {}", input.name, input.description);
            }
        }
        if keys.is_empty() {
            out.push_str("(none declared)\n");
        }
    }

    out
}
