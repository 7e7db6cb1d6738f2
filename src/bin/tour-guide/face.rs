use std::convert::Infallible;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::response::Html;
use axum::response::sse::{Event, Sse};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info};

use page_tour::initiator::{GenerateOptions, InitiatorEvent};
use page_tour::{Initiator, Outcome, PredefinedTour, TourStep};

fn event_name(event: &InitiatorEvent) -> &'static str {
    match event {
        InitiatorEvent::Generating { .. } => "generating",
        InitiatorEvent::Completed => "completed",
        InitiatorEvent::Failed { .. } => "failed",
    }
}

fn event_data(event: &InitiatorEvent) -> serde_json::Value {
    match event {
        InitiatorEvent::Generating { prompt } => json!({ "prompt": prompt }),
        InitiatorEvent::Completed => json!({}),
        InitiatorEvent::Failed { message } => json!({ "message": message }),
    }
}

fn sse_event(event: &InitiatorEvent) -> Event {
    Event::default()
        .event(event_name(event))
        .data(event_data(event).to_string())
}

#[derive(Deserialize)]
struct GeneratePayload {
    prompt: String,
    #[serde(default, rename = "apiKey")]
    api_key: Option<String>,
    #[serde(default)]
    mock: bool,
    #[serde(default, rename = "showRaw")]
    show_raw: bool,
}

#[derive(Deserialize)]
struct FillPayload {
    tour: PredefinedTour,
    prompt: String,
}

#[derive(Deserialize)]
struct StartPayload {
    steps: Vec<TourStep>,
}

#[derive(Serialize)]
struct CredentialStatus {
    saved: Option<String>,
}

/// Serves the control page on the first free port from `port`.
pub async fn serve(initiator: Arc<Initiator>, port: u16) -> Result<()> {
    let app = Router::new()
        .route("/", get(index_handler))
        .route("/credential", get(credential_handler))
        .route("/generate", post(generate_handler))
        .route("/tours", get(tours_handler))
        .route("/tours/fill", post(fill_handler))
        .route("/tours/start", post(start_handler))
        .route("/events", get(sse_handler))
        .route(
            "/favicon.ico",
            get(|| async { axum::http::StatusCode::NO_CONTENT }),
        )
        .with_state(initiator);

    let mut listener = None;
    for p in port..port.saturating_add(10) {
        if let Ok(l) = tokio::net::TcpListener::bind(("127.0.0.1", p)).await {
            listener = Some((l, p));
            break;
        }
    }
    let (listener, bound) = listener
        .ok_or_else(|| anyhow!("could not bind any port in {}..{}", port, port + 10))?;

    info!("control page at http://localhost:{}", bound);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn credential_handler(State(initiator): State<Arc<Initiator>>) -> Json<CredentialStatus> {
    Json(CredentialStatus {
        saved: initiator.saved_credential(),
    })
}

async fn generate_handler(
    State(initiator): State<Arc<Initiator>>,
    Json(payload): Json<GeneratePayload>,
) -> Json<Outcome> {
    debug!(mock = payload.mock, "POST /generate");
    let options = GenerateOptions {
        mock: payload.mock,
        show_raw: payload.show_raw,
    };
    let outcome = initiator
        .generate(&payload.prompt, payload.api_key.as_deref(), options)
        .await;
    Json(outcome)
}

async fn tours_handler(State(initiator): State<Arc<Initiator>>) -> Json<Vec<PredefinedTour>> {
    let url = initiator.active_page_url().await.unwrap_or_default();
    Json(initiator.predefined_tours(&url).await)
}

async fn fill_handler(
    State(initiator): State<Arc<Initiator>>,
    Json(payload): Json<FillPayload>,
) -> Json<serde_json::Value> {
    match initiator.fill_form_inputs(payload.tour, &payload.prompt).await {
        Ok(steps) => Json(json!({ "ok": true, "steps": steps })),
        Err(error) => Json(json!({ "ok": false, "error": error })),
    }
}

async fn start_handler(
    State(initiator): State<Arc<Initiator>>,
    Json(payload): Json<StartPayload>,
) -> Json<Outcome> {
    Json(initiator.start_tour(payload.steps).await)
}

async fn sse_handler(
    State(initiator): State<Arc<Initiator>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(initiator.subscribe()).filter_map(|result| match result {
        Ok(event) => Some(Ok::<_, Infallible>(sse_event(&event))),
        Err(_) => None,
    });
    Sse::new(stream)
}

const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Tour Guide</title>
<style>
  * { margin: 0; padding: 0; box-sizing: border-box; }
  body {
    background: #0a0a0f;
    color: #e0e0e0;
    font-family: 'Segoe UI', system-ui, -apple-system, sans-serif;
    max-width: 640px;
    margin: 0 auto;
    padding: 32px;
    display: flex;
    flex-direction: column;
    gap: 16px;
  }
  h1 { font-size: 20px; font-weight: 600; color: #fff; }
  label { font-size: 13px; color: #9ca3af; }
  input, textarea {
    width: 100%;
    background: #12121a;
    border: 1px solid #1a1a2e;
    border-radius: 8px;
    color: #e0e0e0;
    padding: 10px 12px;
    font-size: 14px;
  }
  textarea { min-height: 90px; resize: vertical; }
  button {
    background: #6366f1;
    border: none;
    border-radius: 8px;
    color: #fff;
    padding: 10px 16px;
    font-size: 14px;
    cursor: pointer;
  }
  button:disabled { opacity: 0.5; cursor: default; }
  .row { display: flex; gap: 12px; align-items: center; }
  #status { font-size: 13px; color: #9ca3af; min-height: 18px; }
  #raw { white-space: pre-wrap; font-family: monospace; font-size: 12px; color: #a5b4fc; }
  .tour { border: 1px solid #1a1a2e; border-radius: 8px; padding: 12px; display: flex; flex-direction: column; gap: 8px; }
  .tour h2 { font-size: 15px; color: #fff; }
  .tour p { font-size: 13px; color: #9ca3af; }
</style>
</head>
<body>
  <h1>Tour Guide</h1>
  <div>
    <label for="key">Gemini API key <span id="saved"></span></label>
    <input id="key" type="password" placeholder="Leave empty to keep the saved key">
  </div>
  <div>
    <label for="prompt">What do you want to learn on this page?</label>
    <textarea id="prompt" placeholder="show me how to sign up"></textarea>
  </div>
  <div class="row">
    <button id="go">Generate tour</button>
    <label><input id="mock" type="checkbox" style="width:auto"> mock</label>
    <label><input id="showRaw" type="checkbox" style="width:auto"> show raw output</label>
  </div>
  <div id="status"></div>
  <div id="raw"></div>
  <div id="tours"></div>
<script>
  const $ = (id) => document.getElementById(id);
  const post = (url, body) => fetch(url, {
    method: 'POST',
    headers: { 'Content-Type': 'application/json' },
    body: JSON.stringify(body),
  }).then(r => r.json());

  fetch('/credential').then(r => r.json()).then(c => {
    $('saved').textContent = c.saved ? '(saved: ' + c.saved + ')' : '(none saved)';
  });

  function show(outcome) {
    if (outcome.outcome === 'alert') {
      alert(outcome.message);
      $('status').textContent = '';
      return;
    }
    $('status').textContent = 'Tour started.';
    if (outcome.rawText) $('raw').textContent = outcome.rawText;
  }

  $('go').onclick = async () => {
    $('go').disabled = true;
    $('raw').textContent = '';
    const key = $('key').value.trim();
    try {
      show(await post('/generate', {
        prompt: $('prompt').value,
        apiKey: key || null,
        mock: $('mock').checked,
        showRaw: $('showRaw').checked,
      }));
      if (key) $('key').value = '';
    } finally {
      $('go').disabled = false;
    }
  };

  function renderTours(tours) {
    const box = $('tours');
    box.innerHTML = '';
    for (const tour of tours) {
      const el = document.createElement('div');
      el.className = 'tour';
      el.innerHTML = '<h2></h2><p></p><div class="row"></div>';
      el.querySelector('h2').textContent = tour.tourName;
      el.querySelector('p').textContent = tour.description;
      const start = document.createElement('button');
      start.textContent = 'Start';
      start.onclick = async () => show(await post('/tours/start', { steps: tour.steps }));
      el.querySelector('.row').appendChild(start);
      if (tour.formInputs && tour.formInputs.length) {
        const fill = document.createElement('button');
        fill.textContent = 'Fill from prompt';
        fill.onclick = async () => {
          const r = await post('/tours/fill', { tour, prompt: $('prompt').value });
          if (!r.ok) { alert(r.error); return; }
          show(await post('/tours/start', { steps: r.steps }));
        };
        el.querySelector('.row').appendChild(fill);
      }
      box.appendChild(el);
    }
  }

  fetch('/tours').then(r => r.json()).then(renderTours);

  const events = new EventSource('/events');
  events.addEventListener('generating', () => { $('status').textContent = 'Generating…'; });
  events.addEventListener('failed', (e) => { $('status').textContent = JSON.parse(e.data).message; });
</script>
</body>
</html>
"##;
