mod config;
mod error;
mod models;
mod services;
mod utils;

use axum::{
    Router,
    extract::{DefaultBodyLimit, Multipart, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header},
    response::{Html, Json},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use config::Settings;
use models::{
    AIResponse, AnswerFeedback, ContentNode, Conversation, HistoryEntry, ImageUpload, Language,
    QuizSpec, ScanInput,
};
use serde::{Deserialize, Serialize};
use services::llm::LLMClient;
use services::markdown::render;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};
use uuid::Uuid;

/// Upper bound for `/analyze` bodies, matching the vision API's per-image cap.
const MAX_IMAGE_UPLOAD: usize = 20 * 1024 * 1024;

#[derive(Clone)]
struct AppState {
    llm_client: Arc<LLMClient>,
    settings: Arc<Settings>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let settings = Settings::from_env()?;
    let llm_client = Arc::new(LLMClient::new(&settings));
    info!(
        model = %settings.model,
        vision_model = %settings.vision_model,
        relay = settings.use_relay,
        credential_configured = settings.api_key.is_some(),
        "settings loaded"
    );

    let bind_addr = settings.bind_addr;
    let app = router(AppState {
        llm_client,
        settings: Arc::new(settings),
    });

    let listener = TcpListener::bind(bind_addr).await?;
    info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/render", post(render_text))
        .route("/explain", post(explain))
        .route(
            "/analyze",
            post(analyze).layer(DefaultBodyLimit::max(MAX_IMAGE_UPLOAD)),
        )
        .route("/chat", post(chat))
        .route("/quiz/check", post(check_quiz))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        // The browser front-end is served from another origin
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::AllowMethods::any())
                .allow_headers(tower_http::cors::AllowHeaders::any()),
        )
}

async fn index() -> Html<&'static str> {
    Html(
        r#"
    <!DOCTYPE html>
    <html>
    <head>
        <title>NeuroLens</title>
        <meta charset="utf-8">
        <style>
            body { font-family: Arial, sans-serif; margin: 40px; }
            .endpoint { background-color: #f5f5f5; padding: 10px; margin: 10px 0; border-radius: 4px; font-family: monospace; }
        </style>
    </head>
    <body>
        <h1>NeuroLens</h1>
        <p>Scan and learn: send a question or an image, get an explanation and a quiz back.</p>

        <h2>Available Endpoints:</h2>
        <div class="endpoint">GET /health - Health check</div>
        <div class="endpoint">POST /render - Render explanation markdown into nodes</div>
        <div class="endpoint">POST /explain - Explain a text question</div>
        <div class="endpoint">POST /analyze - Explain an uploaded image (multipart field 'image')</div>
        <div class="endpoint">POST /chat - One tutoring turn</div>
        <div class="endpoint">POST /quiz/check - Check a quiz answer</div>

        <p>Pass <code>api_key</code> in the request or an <code>Authorization: Bearer</code> header.
        Without one, placeholder content explains how to configure a key.</p>
    </body>
    </html>
    "#,
    )
}

async fn health_check() -> &'static str {
    "OK"
}

#[derive(Debug, Deserialize)]
struct RenderRequest {
    text: String,
}

#[derive(Debug, Serialize)]
struct RenderResponse {
    nodes: Vec<ContentNode>,
    html: String,
}

async fn render_text(
    payload: Result<Json<RenderRequest>, JsonRejection>,
) -> Result<Json<RenderResponse>, StatusCode> {
    let request = json_body(payload)?;
    let nodes = render(&request.text);
    let html = utils::render_html(&nodes);
    Ok(Json(RenderResponse { nodes, html }))
}

#[derive(Debug, Deserialize)]
struct ExplainRequest {
    question: String,
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    language: Option<Language>,
}

#[derive(Debug, Serialize)]
struct ExplainResponse {
    #[serde(flatten)]
    response: AIResponse,
    nodes: Vec<ContentNode>,
}

impl From<AIResponse> for ExplainResponse {
    fn from(response: AIResponse) -> Self {
        let nodes = render(&response.explanation);
        ExplainResponse { response, nodes }
    }
}

async fn explain(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ExplainRequest>, JsonRejection>,
) -> Result<Json<ExplainResponse>, StatusCode> {
    let request = json_body(payload)?;
    let request_id = Uuid::new_v4();
    info!(%request_id, "explaining text question");

    let credential = state
        .settings
        .credential(request.api_key.as_deref().or(bearer_token(&headers)));
    let language = request.language.unwrap_or(state.settings.language);

    let response = state
        .llm_client
        .explain_scan(&ScanInput::Text(request.question), credential, language)
        .await;
    Ok(Json(response.into()))
}

async fn analyze(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<ExplainResponse>, StatusCode> {
    let request_id = Uuid::new_v4();
    let mut scan = None;
    let mut api_key = None;
    let mut language = state.settings.language;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?
    {
        let name = field.name().unwrap_or("unknown").to_string();
        match name.as_str() {
            "image" => {
                let file_name = field.file_name().unwrap_or("image").to_string();
                let mime_type = field.content_type().unwrap_or_default().to_string();
                if !mime_type.starts_with("image/") {
                    warn!(%request_id, %mime_type, "rejecting non-image upload");
                    return Err(StatusCode::UNSUPPORTED_MEDIA_TYPE);
                }
                let bytes = field.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?;
                scan = Some(ScanInput::Image(ImageUpload {
                    file_name,
                    mime_type,
                    bytes: bytes.to_vec(),
                }));
            }
            "reference" if scan.is_none() => {
                let reference = field.text().await.map_err(|_| StatusCode::BAD_REQUEST)?;
                scan = Some(ScanInput::ImageReference(reference));
            }
            "api_key" => {
                api_key = Some(field.text().await.map_err(|_| StatusCode::BAD_REQUEST)?);
            }
            "language" => {
                let raw = field.text().await.map_err(|_| StatusCode::BAD_REQUEST)?;
                language = raw.parse().map_err(|_| StatusCode::BAD_REQUEST)?;
            }
            _ => {}
        }
    }

    let Some(scan) = scan else {
        return Err(StatusCode::BAD_REQUEST);
    };
    info!(%request_id, "explaining image");

    let credential = state
        .settings
        .credential(api_key.as_deref().or(bearer_token(&headers)));
    let response = state.llm_client.explain_scan(&scan, credential, language).await;
    Ok(Json(response.into()))
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    history: Vec<HistoryEntry>,
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    language: Option<Language>,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    answer: String,
    nodes: Vec<ContentNode>,
    timestamp: Option<DateTime<Utc>>,
}

async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, StatusCode> {
    let request = json_body(payload)?;
    let request_id = Uuid::new_v4();
    info!(%request_id, turns = request.history.len(), "chat turn");

    let credential = state
        .settings
        .credential(request.api_key.as_deref().or(bearer_token(&headers)));
    let language = request.language.unwrap_or(state.settings.language);

    // No history means a fresh conversation, which opens with the greeting
    let mut conversation = if request.history.is_empty() {
        Conversation::new()
    } else {
        Conversation::resume(request.history)
    };
    let answer = state
        .llm_client
        .converse(&mut conversation, &request.message, credential, language)
        .await
        .ok_or(StatusCode::BAD_REQUEST)?;
    info!(%request_id, turns = conversation.len(), "chat turn answered");

    let timestamp = conversation.messages().last().map(|reply| reply.timestamp);
    let nodes = render(&answer);
    Ok(Json(ChatResponse {
        answer,
        nodes,
        timestamp,
    }))
}

#[derive(Debug, Deserialize)]
struct QuizCheckRequest {
    quiz: QuizSpec,
    answer: String,
}

async fn check_quiz(
    payload: Result<Json<QuizCheckRequest>, JsonRejection>,
) -> Result<Json<AnswerFeedback>, StatusCode> {
    let request = json_body(payload)?;
    if let Err(defect) = request.quiz.validate() {
        warn!(%defect, "refusing to check an unanswerable quiz");
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }
    Ok(Json(request.quiz.check_answer(&request.answer)))
}

/// Any body that does not decode into the route's request shape is a 400.
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, StatusCode> {
    payload.map(|Json(body)| body).map_err(|rejection| {
        warn!(%rejection, "rejecting request body");
        StatusCode::BAD_REQUEST
    })
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::transport::mock::ScriptedTransport;
    use axum::body::{Body, to_bytes};
    use http::Request;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn app(transport: &Arc<ScriptedTransport>) -> Router {
        let settings = Settings::default();
        router(AppState {
            llm_client: Arc::new(LLMClient::with_transport(&settings, transport.clone())),
            settings: Arc::new(settings),
        })
    }

    async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    type Part<'a> = (&'a str, Option<(&'a str, &'a str)>, &'a [u8]);

    const BOUNDARY: &str = "neurolens-boundary";

    fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, file, content) in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            let disposition = match file {
                Some((file_name, mime)) => format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
                     Content-Type: {mime}\r\n\r\n"
                ),
                None => format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n"),
            };
            body.extend_from_slice(disposition.as_bytes());
            body.extend_from_slice(content);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    async fn post_multipart(app: Router, parts: &[Part<'_>]) -> StatusCode {
        let request = Request::post("/analyze")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(parts)))
            .unwrap();
        app.oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn health_answers_ok() {
        let transport = Arc::new(ScriptedTransport::new());
        let request = Request::get("/health").body(Body::empty()).unwrap();
        let response = app(&transport).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn render_returns_nodes_and_html() {
        let transport = Arc::new(ScriptedTransport::new());
        let (status, body) =
            post_json(app(&transport), "/render", json!({"text": "# Hi\n- **a**"})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["nodes"][0]["type"], "heading");
        assert_eq!(body["nodes"][1]["text"][0]["type"], "bold");
        assert_eq!(body["html"], "<h1>Hi</h1>\n<li><strong>a</strong></li>\n");
    }

    #[tokio::test]
    async fn explain_without_key_returns_placeholder_offline() {
        let transport = Arc::new(ScriptedTransport::new());
        let (status, body) =
            post_json(app(&transport), "/explain", json!({"question": "what is gravity"})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["quiz"]["correctAnswer"], "a");
        assert!(body["nodes"].as_array().unwrap().len() > 1);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn explain_uses_bearer_header_as_credential() {
        let transport = Arc::new(ScriptedTransport::new().completion("Plain answer."));
        let request = Request::post("/explain")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, "Bearer sk-header")
            .body(Body::from(json!({"question": "q"}).to_string()))
            .unwrap();
        let response = app(&transport).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["explanation"], "Plain answer.");
        assert!(body["quiz"].is_null());
        assert_eq!(transport.calls()[0].bearer.as_deref(), Some("sk-header"));
    }

    #[tokio::test]
    async fn analyze_sends_uploaded_image() {
        let transport = Arc::new(ScriptedTransport::new().completion("A diagram of a cell."));
        let png = [0x89u8, 0x50, 0x4e, 0x47];
        let status = post_multipart(
            app(&transport),
            &[
                ("api_key", None, &b"sk-test"[..]),
                ("image", Some(("cell.png", "image/png")), &png[..]),
            ],
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        let url = calls[0].body["messages"][1]["content"][1]["image_url"]["url"]
            .as_str()
            .unwrap()
            .to_string();
        assert_eq!(url, "data:image/png;base64,iVBORw==");
    }

    #[tokio::test]
    async fn analyze_rejects_non_images() {
        let transport = Arc::new(ScriptedTransport::new());
        let status = post_multipart(
            app(&transport),
            &[("image", Some(("notes.txt", "text/plain")), &b"hi"[..])],
        )
        .await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn analyze_accepts_photos_over_two_mebibytes() {
        let transport = Arc::new(ScriptedTransport::new().completion("A photo of a leaf."));
        let photo = vec![0xffu8; 3 * 1024 * 1024];
        let status = post_multipart(
            app(&transport),
            &[
                ("api_key", None, &b"sk-test"[..]),
                ("image", Some(("leaf.jpg", "image/jpeg")), &photo[..]),
            ],
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn chat_replies_in_relay_shape() {
        let transport = Arc::new(ScriptedTransport::new().completion("**Atoms** are small."));
        let (status, body) = post_json(
            app(&transport),
            "/chat",
            json!({
                "message": "atoms?",
                "history": [
                    {"role": "user", "content": "hi"},
                    {"role": "assistant", "content": "hello"}
                ],
                "api_key": "sk-test"
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["answer"], "**Atoms** are small.");
        assert_eq!(body["nodes"][0]["text"][0]["text"], "Atoms");
        assert!(body["timestamp"].is_string());

        let messages = transport.calls()[0].body["messages"].as_array().unwrap().clone();
        assert_eq!(messages.len(), 4);
    }

    #[tokio::test]
    async fn unknown_language_is_a_bad_request() {
        let transport = Arc::new(ScriptedTransport::new());
        let (status, _) = post_json(
            app(&transport),
            "/explain",
            json!({"question": "q", "language": "FR"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) =
            post_json(app(&transport), "/chat", json!({"message": "hi", "language": "FR"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn blank_chat_message_is_rejected() {
        let transport = Arc::new(ScriptedTransport::new());
        let (status, _) = post_json(app(&transport), "/chat", json!({"message": "  "})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn quiz_check_reports_feedback() {
        let transport = Arc::new(ScriptedTransport::new());
        let quiz = json!({
            "question": "q",
            "options": [{"id": "a", "text": "Yes"}, {"id": "b", "text": "No"}],
            "correctAnswer": "a"
        });

        let (status, body) =
            post_json(app(&transport), "/quiz/check", json!({"quiz": quiz, "answer": "b"})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["is_correct"], false);
        assert_eq!(body["message"], "✗ Not quite. The correct answer is: Yes");
    }

    #[tokio::test]
    async fn quiz_check_refuses_broken_quiz() {
        let transport = Arc::new(ScriptedTransport::new());
        let quiz = json!({
            "question": "q",
            "options": [{"id": "a", "text": "Yes"}],
            "correctAnswer": "z"
        });

        let (status, _) =
            post_json(app(&transport), "/quiz/check", json!({"quiz": quiz, "answer": "a"})).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }
}
