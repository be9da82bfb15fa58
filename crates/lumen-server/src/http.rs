//! Routes.
//!
//! - `GET /`, `GET /health`: liveness
//! - `GET /health/ai`: model provider round trip
//! - `POST /chat/stream`: multipart `text` / `image`, streamed `text/plain` answer
//! - `POST /chat`: same form, JSON answer after waiting (bounded) for the video
//! - `POST /chat-json`: JSON `text` / `image_base64`, JSON answer, video rendered in background
//! - `GET /chat/video_base64/{request_id}`: 202 pending, 404 never, 200 once
//! - `GET /chat/video/{request_id}`: same, raw `video/mp4` body
//!
//! Every route sits behind the CORS layer and a panic handler.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use lumen_core::app::{
    ChatInput, ChatReply, ChatService, ImageUpload, InputType, VideoFile, VideoPoll, VideoPoller,
};
use lumen_core::domain::{ChatError, RequestId};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_stream::StreamExt;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer};

use crate::error::{ApiError, panic_response};

const NO_VIDEO_MESSAGE: &str = "No video will be created for this request";
const AI_HEALTH_TIMEOUT: Duration = Duration::from_secs(30);
/// How long `POST /chat` waits for the render before answering without a video.
const RENDER_WAIT: Duration = Duration::from_secs(180);
/// Room for the text field and multipart framing on top of the image itself.
const FORM_OVERHEAD: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<ChatService>,
    pub poller: Arc<VideoPoller>,
    pub max_file_size: usize,
}

/// CORS for the configured browser origins. `*` allows any origin without credentials.
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.iter().any(|o| o == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid allowed origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

pub fn build_router(state: AppState, cors: CorsLayer) -> Router {
    let form_limit = state.max_file_size.saturating_add(FORM_OVERHEAD);
    // base64 inflates the image by 4/3
    let json_limit = (state.max_file_size / 3)
        .saturating_mul(4)
        .saturating_add(FORM_OVERHEAD);
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/health/ai", get(ai_health))
        .route(
            "/chat/stream",
            post(chat_stream).layer(DefaultBodyLimit::max(form_limit)),
        )
        .route(
            "/chat",
            post(chat_sync).layer(DefaultBodyLimit::max(form_limit)),
        )
        .route(
            "/chat-json",
            post(chat_json).layer(DefaultBodyLimit::max(json_limit)),
        )
        .route("/chat/video_base64/{request_id}", get(video_base64))
        .route("/chat/video/{request_id}", get(video_file))
        .with_state(state)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(cors)
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    timestamp: String,
    version: &'static str,
}

async fn health() -> Json<Health> {
    Json(Health {
        status: "healthy",
        timestamp: Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn ai_health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let timestamp = Utc::now().to_rfc3339();
    let ping = tokio::time::timeout(AI_HEALTH_TIMEOUT, state.chat.generator().ping()).await;
    let body = match ping {
        Ok(Ok(())) => json!({
            "status": "healthy",
            "ai_service": "connected",
            "timestamp": timestamp,
        }),
        Ok(Err(e)) => {
            tracing::warn!("AI health check failed: {}", e);
            json!({
                "status": "degraded",
                "ai_service": "error",
                "error": e.to_string(),
                "timestamp": timestamp,
            })
        }
        Err(_) => json!({
            "status": "degraded",
            "ai_service": "timeout",
            "timestamp": timestamp,
        }),
    };
    Json(body)
}

async fn chat_stream(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let input = read_chat_form(multipart, state.max_file_size).await?;
    let session = state.chat.start(input).await?;
    tracing::info!(
        request_id = %session.request_id,
        animation = session.has_animation,
        "streaming explanation"
    );

    let body = Body::from_stream(session.stream.map(Ok::<_, Infallible>));
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response())
}

/// Answer body shared by the JSON chat routes.
#[derive(Debug, Serialize)]
struct ChatJsonResponse {
    success: bool,
    explanation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_id: Option<String>,
    has_animation: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    video_base64: Option<String>,
    error_message: Option<String>,
    input_type: Option<InputType>,
}

impl ChatJsonResponse {
    fn answered(reply: ChatReply) -> Self {
        Self {
            success: true,
            explanation: reply.explanation,
            request_id: Some(reply.request_id.to_string()),
            has_animation: reply.has_animation,
            video_base64: None,
            error_message: None,
            input_type: Some(reply.input_type),
        }
    }

    fn failed(message: String) -> Self {
        tracing::error!("chat request failed: {}", message);
        Self {
            success: false,
            explanation: String::new(),
            request_id: None,
            has_animation: false,
            video_base64: None,
            error_message: Some(message),
            input_type: None,
        }
    }
}

async fn chat_sync(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ChatJsonResponse>, ApiError> {
    let input = read_chat_form(multipart, state.max_file_size).await?;
    let reply = match state.chat.answer(input).await {
        Ok(reply) => reply,
        // accepted input, failed afterwards: reported in the body
        Err(ChatError::Upload(e)) => return Ok(Json(ChatJsonResponse::failed(e.to_string()))),
        Err(e) => return Err(e.into()),
    };

    let video_base64 = if reply.has_animation {
        match state.poller.wait(reply.request_id, RENDER_WAIT).await {
            VideoPoll::Ready { video_base64 } => Some(video_base64),
            VideoPoll::Pending | VideoPoll::NoVideo => None,
        }
    } else {
        None
    };
    Ok(Json(ChatJsonResponse {
        video_base64,
        ..ChatJsonResponse::answered(reply)
    }))
}

#[derive(Debug, Deserialize)]
struct ChatJsonRequest {
    text: Option<String>,
    image_base64: Option<String>,
}

async fn chat_json(
    State(state): State<AppState>,
    Json(request): Json<ChatJsonRequest>,
) -> Result<Json<ChatJsonResponse>, ApiError> {
    let image = request
        .image_base64
        .as_deref()
        .filter(|data| !data.trim().is_empty())
        .map(ImageUpload::from_base64)
        .transpose()?;
    if image
        .as_ref()
        .is_some_and(|i| i.bytes.len() > state.max_file_size)
    {
        return Err(too_large(state.max_file_size));
    }

    let input = ChatInput {
        text: request.text,
        image,
    };
    match state.chat.answer(input).await {
        Ok(reply) => Ok(Json(ChatJsonResponse::answered(reply))),
        Err(ChatError::Upload(e)) => Ok(Json(ChatJsonResponse::failed(e.to_string()))),
        Err(e) => Err(e.into()),
    }
}

fn too_large(max_file_size: usize) -> ApiError {
    ApiError::PayloadTooLarge(format!(
        "Image exceeds the maximum size of {max_file_size} bytes"
    ))
}

async fn read_chat_form(
    mut multipart: Multipart,
    max_file_size: usize,
) -> Result<ChatInput, ApiError> {
    let mut input = ChatInput::default();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "text" => input.text = Some(field.text().await?),
            "image" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await?;
                if bytes.len() > max_file_size {
                    return Err(too_large(max_file_size));
                }
                if !file_name.is_empty() {
                    input.image = Some(ImageUpload {
                        file_name,
                        bytes: bytes.to_vec(),
                    });
                }
            }
            other => tracing::debug!(field = other, "ignoring form field"),
        }
    }
    Ok(input)
}

async fn video_base64(State(state): State<AppState>, Path(raw): Path<String>) -> Response {
    // an id we never issued can never correlate to a video
    let Ok(id) = raw.parse::<RequestId>() else {
        return (StatusCode::NOT_FOUND, NO_VIDEO_MESSAGE).into_response();
    };
    match state.poller.poll(id).await {
        VideoPoll::Pending => StatusCode::ACCEPTED.into_response(),
        VideoPoll::NoVideo => (StatusCode::NOT_FOUND, NO_VIDEO_MESSAGE).into_response(),
        VideoPoll::Ready { video_base64 } => {
            Json(json!({ "video_base64": video_base64 })).into_response()
        }
    }
}

async fn video_file(State(state): State<AppState>, Path(raw): Path<String>) -> Response {
    let Ok(id) = raw.parse::<RequestId>() else {
        return (StatusCode::NOT_FOUND, NO_VIDEO_MESSAGE).into_response();
    };
    match state.poller.take(id).await {
        VideoFile::Pending => StatusCode::ACCEPTED.into_response(),
        VideoFile::NoVideo => (StatusCode::NOT_FOUND, NO_VIDEO_MESSAGE).into_response(),
        VideoFile::Ready(bytes) => ([(header::CONTENT_TYPE, "video/mp4")], bytes).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::http::{Method, Request};
    use lumen_core::app::{RenderOrchestrator, RenderSupervisor, parse_request_id};
    use lumen_core::config::PipelineConfig;
    use lumen_core::domain::{Generation, GenerationError, RepairError};
    use lumen_core::impls::InMemoryOutcomeStore;
    use lumen_core::ports::{
        ExplanationGenerator, RenderOutput, SceneRenderer, ScriptRepairer, TextExtractor,
    };
    use std::path::PathBuf;
    use tower::util::ServiceExt;

    const BOUNDARY: &str = "lumen-test-boundary";
    const SCRIPT: &str = "from manim import *\nclass Demo(Scene):\n    pass";
    const FRONTEND: &str = "http://localhost:5173";

    struct FixedGenerator(Option<Generation>);

    #[async_trait]
    impl ExplanationGenerator for FixedGenerator {
        async fn generate(&self, _prompt: &str) -> Result<Generation, GenerationError> {
            self.0
                .clone()
                .ok_or_else(|| GenerationError::RequestFailed("overloaded".into()))
        }

        async fn generate_simple(&self, prompt: &str) -> Result<Generation, GenerationError> {
            self.generate(prompt).await
        }

        async fn ping(&self) -> Result<(), GenerationError> {
            match self.0 {
                Some(_) => Ok(()),
                None => Err(GenerationError::RequestFailed("down".into())),
            }
        }
    }

    struct PanickingGenerator;

    #[async_trait]
    impl ExplanationGenerator for PanickingGenerator {
        async fn generate(&self, _prompt: &str) -> Result<Generation, GenerationError> {
            panic!("generator blew up");
        }

        async fn generate_simple(&self, _prompt: &str) -> Result<Generation, GenerationError> {
            panic!("generator blew up");
        }

        async fn ping(&self) -> Result<(), GenerationError> {
            Ok(())
        }
    }

    struct NoText;

    #[async_trait]
    impl TextExtractor for NoText {
        async fn extract_text(&self, _image_path: &std::path::Path) -> Option<String> {
            None
        }
    }

    /// Writes a small fake video into `dir`.
    struct FileRenderer {
        dir: PathBuf,
    }

    #[async_trait]
    impl SceneRenderer for FileRenderer {
        async fn render(&self, script: &str, _scene: &str, id: RequestId) -> RenderOutput {
            let video = self.dir.join(format!("{id}.mp4"));
            match tokio::fs::write(&video, b"mp4").await {
                Ok(()) => RenderOutput::Rendered {
                    video,
                    script_used: script.to_string(),
                },
                Err(e) => RenderOutput::Failed {
                    error: e.to_string(),
                    script_used: script.to_string(),
                },
            }
        }
    }

    struct NoRepair;

    #[async_trait]
    impl ScriptRepairer for NoRepair {
        async fn repair(&self, _script: &str, _error: &str) -> Result<String, RepairError> {
            Err(RepairError::Empty)
        }
    }

    struct TestApp {
        router: Router,
        chat: Arc<ChatService>,
        media: tempfile::TempDir,
    }

    fn app(generation: Option<Generation>, max_file_size: usize) -> TestApp {
        app_with(Arc::new(FixedGenerator(generation)), max_file_size)
    }

    fn app_with(generator: Arc<dyn ExplanationGenerator>, max_file_size: usize) -> TestApp {
        let media = tempfile::tempdir().unwrap();
        let store = Arc::new(InMemoryOutcomeStore::default());
        let orchestrator = RenderOrchestrator::new(
            Arc::new(FileRenderer {
                dir: media.path().to_path_buf(),
            }),
            Arc::new(NoRepair),
            store.clone(),
        );
        let supervisor = Arc::new(RenderSupervisor::new(Arc::new(orchestrator), 2));
        let pipeline = PipelineConfig {
            generation_timeout: Duration::from_secs(1),
            fallback_timeout: Duration::from_secs(1),
            stream_delay: Duration::ZERO,
        };
        let chat = Arc::new(ChatService::new(
            generator,
            Arc::new(NoText),
            supervisor,
            media.path().join("uploads"),
            &pipeline,
        ));
        let router = build_router(
            AppState {
                chat: chat.clone(),
                poller: Arc::new(VideoPoller::new(store)),
                max_file_size,
            },
            cors_layer(&[FRONTEND.to_string()]),
        );
        TestApp { router, chat, media }
    }

    enum Part<'a> {
        Text(&'a str),
        Image(&'a str, &'a [u8]),
    }

    fn form(parts: &[Part<'_>]) -> Request<Body> {
        form_to("/chat/stream", parts)
    }

    fn form_to(uri: &str, parts: &[Part<'_>]) -> Request<Body> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match part {
                Part::Text(text) => {
                    body.extend_from_slice(
                        b"Content-Disposition: form-data; name=\"text\"\r\n\r\n",
                    );
                    body.extend_from_slice(text.as_bytes());
                }
                Part::Image(name, bytes) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"image\"; filename=\"{name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(bytes);
                }
            }
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    fn json_req(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/chat-json")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_text(resp: Response) -> String {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn health_reports_healthy() {
        let t = app(None, 1024);
        let resp = t.router.oneshot(get_req("/health")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let v: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
        assert_eq!(v["status"], "healthy");
        assert!(v["timestamp"].is_string());
    }

    #[tokio::test]
    async fn ai_health_reports_degraded_provider() {
        let t = app(None, 1024);
        let resp = t.router.oneshot(get_req("/health/ai")).await.unwrap();
        let v: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
        assert_eq!(v["status"], "degraded");
        assert_eq!(v["ai_service"], "error");
    }

    #[tokio::test]
    async fn text_only_chat_streams_and_reports_no_video() {
        let t = app(Some(Generation::explanation_only("A B C")), 1024);

        let resp = t.router.clone().oneshot(form(&[Part::Text("hi")])).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_text(resp).await;
        let id = parse_request_id(&body).unwrap();
        assert!(body.starts_with("A B C \n[REQUEST_ID:"));

        let poll = t
            .router
            .oneshot(get_req(&format!("/chat/video_base64/{id}")))
            .await
            .unwrap();
        assert_eq!(poll.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_text(poll).await, NO_VIDEO_MESSAGE);
    }

    #[tokio::test]
    async fn rendered_video_is_served_exactly_once() {
        let t = app(
            Some(Generation::new("Squares.", Some(SCRIPT.to_string()))),
            1024,
        );

        let resp = t.router.clone().oneshot(form(&[Part::Text("square")])).await.unwrap();
        let id = parse_request_id(&body_text(resp).await).unwrap();
        t.chat.supervisor().shutdown_and_join().await;

        let uri = format!("/chat/video_base64/{id}");
        let first = t.router.clone().oneshot(get_req(&uri)).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let v: serde_json::Value = serde_json::from_str(&body_text(first).await).unwrap();
        assert_eq!(v["video_base64"], "bXA0");
        assert!(!t.media.path().join(format!("{id}.mp4")).exists());

        let second = t.router.oneshot(get_req(&uri)).await.unwrap();
        assert_eq!(second.status(), StatusCode::ACCEPTED);
        assert!(body_text(second).await.is_empty());
    }

    #[tokio::test]
    async fn unknown_id_is_pending_and_garbage_is_not_found() {
        let t = app(None, 1024);
        let pending = t
            .router
            .clone()
            .oneshot(get_req(&format!("/chat/video_base64/{}", RequestId::new_v4())))
            .await
            .unwrap();
        assert_eq!(pending.status(), StatusCode::ACCEPTED);

        let garbage = t
            .router
            .oneshot(get_req("/chat/video_base64/not-an-id"))
            .await
            .unwrap();
        assert_eq!(garbage.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn blank_text_is_bad_request() {
        let t = app(None, 1024);
        let resp = t.router.oneshot(form(&[Part::Text("   ")])).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let v: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
        assert_eq!(v["detail"], "Either text or image must be provided");
    }

    #[tokio::test]
    async fn unsupported_image_is_bad_request() {
        let t = app(Some(Generation::explanation_only("x")), 1024);
        let resp = t
            .router
            .oneshot(form(&[Part::Image("clip.gif", b"GIF89a")]))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn oversized_image_is_rejected() {
        let t = app(Some(Generation::explanation_only("x")), 16);
        let big = vec![0u8; 64];
        let resp = t
            .router
            .oneshot(form(&[Part::Image("big.png", &big)]))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn generation_outage_is_service_unavailable() {
        let t = app(None, 1024);
        let resp = t.router.oneshot(form(&[Part::Text("hi")])).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let v: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
        assert!(
            v["detail"]
                .as_str()
                .unwrap()
                .starts_with("AI service unavailable")
        );
    }

    #[tokio::test]
    async fn image_without_readable_text_is_bad_request() {
        let t = app(Some(Generation::explanation_only("Looked.")), 1024);
        let resp = t
            .router
            .oneshot(form(&[Part::Image("scan.png", b"\x89PNG")]))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let v: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
        assert!(v["detail"].as_str().unwrap().starts_with("No readable text"));
    }

    #[tokio::test]
    async fn allowed_origin_gets_cors_headers() {
        let t = app(None, 1024);
        let uri = format!("/chat/video_base64/{}", RequestId::new_v4());
        let req = Request::builder()
            .method(Method::GET)
            .uri(&uri)
            .header(header::ORIGIN, FRONTEND)
            .body(Body::empty())
            .unwrap();
        let resp = t.router.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        assert_eq!(
            resp.headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .and_then(|v| v.to_str().ok()),
            Some(FRONTEND)
        );

        let stranger = Request::builder()
            .method(Method::GET)
            .uri(&uri)
            .header(header::ORIGIN, "https://elsewhere.example")
            .body(Body::empty())
            .unwrap();
        let resp = t.router.oneshot(stranger).await.unwrap();
        assert!(
            resp.headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .is_none()
        );
    }

    #[tokio::test]
    async fn preflight_for_stream_is_answered() {
        let t = app(None, 1024);
        let req = Request::builder()
            .method(Method::OPTIONS)
            .uri("/chat/stream")
            .header(header::ORIGIN, FRONTEND)
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
            .body(Body::empty())
            .unwrap();
        let resp = t.router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let headers = resp.headers();
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            FRONTEND
        );
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_METHODS).unwrap(),
            "POST"
        );
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(),
            "true"
        );
    }

    async fn origin_header(cors: CorsLayer, origin: &str) -> Option<String> {
        let router: Router = Router::new().route("/", get(health)).layer(cors);
        let req = Request::builder()
            .uri("/")
            .header(header::ORIGIN, origin)
            .body(Body::empty())
            .unwrap();
        let resp = router.oneshot(req).await.unwrap();
        resp.headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    #[tokio::test]
    async fn wildcard_origin_allows_any() {
        let cors = cors_layer(&["*".to_string()]);
        assert_eq!(
            origin_header(cors, "https://elsewhere.example").await.as_deref(),
            Some("*")
        );
    }

    #[tokio::test]
    async fn invalid_origins_are_skipped() {
        let cors = cors_layer(&["not a header\n".to_string(), FRONTEND.to_string()]);
        assert_eq!(origin_header(cors, FRONTEND).await.as_deref(), Some(FRONTEND));
    }

    #[tokio::test]
    async fn raw_video_route_serves_mp4_once() {
        let t = app(
            Some(Generation::new("Squares.", Some(SCRIPT.to_string()))),
            1024,
        );
        let resp = t.router.clone().oneshot(form(&[Part::Text("square")])).await.unwrap();
        let id = parse_request_id(&body_text(resp).await).unwrap();
        t.chat.supervisor().shutdown_and_join().await;

        let uri = format!("/chat/video/{id}");
        let first = t.router.clone().oneshot(get_req(&uri)).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(first.headers().get(header::CONTENT_TYPE).unwrap(), "video/mp4");
        assert_eq!(body_text(first).await, "mp4");

        let second = t.router.clone().oneshot(get_req(&uri)).await.unwrap();
        assert_eq!(second.status(), StatusCode::ACCEPTED);

        let garbage = t.router.oneshot(get_req("/chat/video/nope")).await.unwrap();
        assert_eq!(garbage.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn raw_video_route_reports_no_video() {
        let t = app(Some(Generation::explanation_only("Words.")), 1024);
        let resp = t.router.clone().oneshot(form(&[Part::Text("hi")])).await.unwrap();
        let id = parse_request_id(&body_text(resp).await).unwrap();

        let resp = t
            .router
            .oneshot(get_req(&format!("/chat/video/{id}")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn chat_json_answers_with_request_id() {
        let t = app(
            Some(Generation::new("Squares.", Some(SCRIPT.to_string()))),
            1024,
        );
        let resp = t
            .router
            .clone()
            .oneshot(json_req(json!({ "text": "square" })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let v: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
        assert_eq!(v["success"], true);
        assert_eq!(v["explanation"], "Squares.");
        assert_eq!(v["has_animation"], true);
        assert_eq!(v["input_type"], "text_only");

        t.chat.supervisor().shutdown_and_join().await;
        let id = v["request_id"].as_str().unwrap();
        let poll = t
            .router
            .oneshot(get_req(&format!("/chat/video_base64/{id}")))
            .await
            .unwrap();
        assert_eq!(poll.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn chat_json_validates_input() {
        let t = app(Some(Generation::explanation_only("x")), 16);

        let empty = t.router.clone().oneshot(json_req(json!({}))).await.unwrap();
        assert_eq!(empty.status(), StatusCode::BAD_REQUEST);

        let garbage = t
            .router
            .clone()
            .oneshot(json_req(json!({ "image_base64": "data:image/png;base64,%%%" })))
            .await
            .unwrap();
        assert_eq!(garbage.status(), StatusCode::BAD_REQUEST);

        // 33 bytes decoded, limit is 16
        let big = json!({ "image_base64": "A".repeat(44) });
        let resp = t.router.oneshot(json_req(big)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn sync_chat_waits_for_the_video() {
        let t = app(
            Some(Generation::new("Squares.", Some(SCRIPT.to_string()))),
            1024,
        );
        let resp = t
            .router
            .oneshot(form_to("/chat", &[Part::Text("square")]))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let v: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
        assert_eq!(v["success"], true);
        assert_eq!(v["video_base64"], "bXA0");
    }

    #[tokio::test]
    async fn sync_chat_without_script_has_no_video() {
        let t = app(Some(Generation::explanation_only("Words.")), 1024);
        let resp = t
            .router
            .oneshot(form_to("/chat", &[Part::Text("hi")]))
            .await
            .unwrap();
        let v: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
        assert_eq!(v["explanation"], "Words.");
        assert_eq!(v["has_animation"], false);
        assert!(v.get("video_base64").is_none());
    }

    #[tokio::test]
    async fn panicking_handler_answers_internal_error() {
        let t = app_with(Arc::new(PanickingGenerator), 1024);
        let resp = t
            .router
            .oneshot(json_req(json!({ "text": "anything" })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let v: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
        assert_eq!(v["detail"], "Internal server error: generator blew up");
    }
}
