//! HTTP API server implementation

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::core::config::{Settings, DEFAULT_MAX_UPLOAD_BYTES};
use crate::core::errors::{ConversionError, ErrorCategory, Result};
use crate::core::models::{ensure_cobol_file, ConversionResult, TargetLanguage, TranslationRequest};
use crate::core::pipeline::CodeConverter;
use crate::server::request_id::propagate_request_id;

/// Multipart field carrying the uploaded source file
pub const UPLOAD_FIELD: &str = "file";

const INTERNAL_ERROR_DETAIL: &str = "Internal server error. Please check server logs for details.";

/// Application state
#[derive(Clone)]
pub struct AppState {
    converter: CodeConverter,
    upload_limit: usize,
}

impl AppState {
    /// State with the default upload limit
    pub fn new(converter: CodeConverter) -> Self {
        Self {
            converter,
            upload_limit: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    /// Cap request bodies on the conversion routes at `bytes`
    pub fn with_upload_limit(mut self, bytes: usize) -> Self {
        self.upload_limit = bytes;
        self
    }
}

/// Health check response
#[derive(Serialize)]
struct TouchResponse {
    message: &'static str,
    status: &'static str,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable description
    pub detail: String,
    /// Error category identifier
    pub r#type: String,
}

impl ErrorResponse {
    fn new(detail: impl Into<String>, category: ErrorCategory) -> Self {
        Self {
            detail: detail.into(),
            r#type: category.as_str().to_string(),
        }
    }
}

impl IntoResponse for ConversionError {
    fn into_response(self) -> Response {
        let category = self.category();
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let detail = match category {
            ErrorCategory::InvalidRequest => {
                info!("Rejected request: {}", self);
                self.to_string()
            }
            ErrorCategory::Configuration => self.to_string(),
            ErrorCategory::Internal => INTERNAL_ERROR_DETAIL.to_string(),
        };

        (status, Json(ErrorResponse::new(detail, category))).into_response()
    }
}

/// Turn a handler panic into a generic 500
fn internal_error_for_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!("Handler panicked: {}", message);

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new("Internal server error", ErrorCategory::Internal)),
    )
        .into_response()
}

/// Health check handler
async fn touch() -> Json<TouchResponse> {
    Json(TouchResponse {
        message: "API is valid and operational",
        status: "success",
    })
}

/// Pull the uploaded file out of the form, rejecting non-COBOL names
/// before the body is read
async fn read_upload(mut multipart: Multipart, limit: usize) -> Result<(String, Vec<u8>)> {
    let invalid = |e: MultipartError| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ConversionError::UploadTooLarge { limit }
        } else {
            ConversionError::InvalidUpload {
                message: e.body_text(),
            }
        }
    };

    while let Some(field) = multipart.next_field().await.map_err(invalid)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        ensure_cobol_file(&filename)?;

        let contents = field.bytes().await.map_err(invalid)?;
        return Ok((filename, contents.to_vec()));
    }

    Err(ConversionError::InvalidUpload {
        message: format!("missing `{UPLOAD_FIELD}` field"),
    })
}

async fn convert_upload(
    state: &AppState,
    target: TargetLanguage,
    multipart: Multipart,
) -> Result<Json<ConversionResult>> {
    let (filename, contents) = read_upload(multipart, state.upload_limit).await?;
    info!("Received {} ({} bytes) for conversion to {}", filename, contents.len(), target);

    let request = TranslationRequest::from_upload(&filename, contents, target)?;
    let result = state.converter.convert(&request).await?;
    Ok(Json(result))
}

/// COBOL to Java handler
async fn convert_to_java(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<ConversionResult>> {
    convert_upload(&state, TargetLanguage::Java, multipart).await
}

/// COBOL to Python handler
async fn convert_to_python(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<ConversionResult>> {
    convert_upload(&state, TargetLanguage::Python, multipart).await
}

/// Wrap a router with panic recovery, tracing, CORS and correlation ids.
/// The correlation layer is outermost so every response gets the header.
pub fn with_middleware(router: Router) -> Router {
    router
        .layer(CatchPanicLayer::custom(internal_error_for_panic))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(middleware::from_fn(propagate_request_id))
}

/// Build the full application mounted under `base_path`
pub fn router(state: AppState, base_path: &str) -> Router {
    let upload_limit = state.upload_limit;
    let routes = Router::new()
        .route("/touch", get(touch))
        .route("/convert/cobol-to-java", post(convert_to_java))
        .route("/convert/cobol-to-python", post(convert_to_python))
        .layer(DefaultBodyLimit::max(upload_limit))
        .with_state(Arc::new(state));

    let base = base_path.trim_end_matches('/');
    let app = if base.is_empty() {
        routes
    } else {
        Router::new().nest(base, routes)
    };

    with_middleware(app)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Run the HTTP server
pub async fn run_server(settings: Settings) -> anyhow::Result<()> {
    let converter = CodeConverter::from_settings(&settings)?;
    let state = AppState::new(converter).with_upload_limit(settings.max_upload_bytes);
    let app = router(state, &settings.base_path);

    let addr: SocketAddr = format!("{}:{}", settings.host, settings.port).parse()?;
    info!("Starting server on {} under {}", addr, settings.base_path);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::RawCompletion;
    use crate::core::providers::{ClientResolver, InferenceClient};
    use crate::core::templates::TemplateStore;
    use crate::server::request_id::REQUEST_ID_HEADER;
    use assert_json_diff::assert_json_eq;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{HeaderValue, Request};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use tower::ServiceExt;

    const BOUNDARY: &str = "X-CONVERTER-BOUNDARY";
    const BASE: &str = "/code-conversion";

    struct MockClient {
        reply: Option<String>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl InferenceClient for MockClient {
        fn provider(&self) -> &str {
            "mock"
        }

        async fn invoke(&self, _prompt: &str) -> Result<RawCompletion> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply
                .clone()
                .map(RawCompletion)
                .ok_or_else(|| ConversionError::provider("mock", "upstream unavailable"))
        }
    }

    struct MockResolver {
        client: Arc<MockClient>,
        provider: Option<&'static str>,
    }

    impl ClientResolver for MockResolver {
        fn resolve(&self) -> Result<Arc<dyn InferenceClient>> {
            if let Some(provider) = self.provider {
                return Err(ConversionError::UnsupportedProvider {
                    provider: provider.to_string(),
                });
            }
            let client: Arc<dyn InferenceClient> = self.client.clone();
            Ok(client)
        }
    }

    struct Harness {
        app: Router,
        client: Arc<MockClient>,
        _prompts: TempDir,
    }

    fn prompts_dir() -> TempDir {
        let prompts = TempDir::new().unwrap();
        std::fs::write(prompts.path().join("to_java.jinja"), "Java:\n{{ source_code }}").unwrap();
        std::fs::write(prompts.path().join("to_python.jinja"), "Python:\n{{ source_code }}").unwrap();
        prompts
    }

    fn harness_with(reply: Option<&str>, unsupported_provider: Option<&'static str>) -> Harness {
        harness_limited(reply, unsupported_provider, DEFAULT_MAX_UPLOAD_BYTES)
    }

    fn harness_limited(
        reply: Option<&str>,
        unsupported_provider: Option<&'static str>,
        upload_limit: usize,
    ) -> Harness {
        let prompts = prompts_dir();

        let client = Arc::new(MockClient {
            reply: reply.map(str::to_string),
            calls: AtomicUsize::new(0),
        });
        let resolver = MockResolver {
            client: client.clone(),
            provider: unsupported_provider,
        };
        let converter = CodeConverter::new(TemplateStore::new(prompts.path()), Arc::new(resolver));

        Harness {
            app: router(AppState::new(converter).with_upload_limit(upload_limit), BASE),
            client,
            _prompts: prompts,
        }
    }

    fn harness(reply: &str) -> Harness {
        harness_with(Some(reply), None)
    }

    fn upload(path: &str, filename: &str, contents: &str) -> Request<Body> {
        let body = format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n\
             {contents}\r\n\
             --{BOUNDARY}--\r\n"
        );

        Request::builder()
            .method("POST")
            .uri(format!("{BASE}{path}"))
            .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(body))
            .unwrap()
    }

    fn with_request_id(mut request: Request<Body>, id: &'static str) -> Request<Body> {
        request
            .headers_mut()
            .insert(REQUEST_ID_HEADER, HeaderValue::from_static(id));
        request
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_touch() {
        let h = harness("unused");
        let request = Request::builder()
            .uri(format!("{BASE}/touch"))
            .body(Body::empty())
            .unwrap();

        let response = h.app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_json_eq!(
            body_json(response).await,
            json!({"message": "API is valid and operational", "status": "success"})
        );
    }

    #[tokio::test]
    async fn test_convert_to_java() {
        let h = harness("```json\n{\"code\":\"class X {}\"}\n```");
        let response = h
            .app
            .oneshot(upload("/convert/cobol-to-java", "PROG.cbl", "STOP RUN."))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
        assert_json_eq!(body_json(response).await, json!({"code": "class X {}"}));
        assert_eq!(h.client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_prose_completion_is_degraded_but_ok() {
        let prose = "The program prints HELLO and stops.";
        let h = harness(prose);
        let response = h
            .app
            .oneshot(upload("/convert/cobol-to-python", "PROG.cbl", "DISPLAY 'HELLO'."))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_json_eq!(
            body_json(response).await,
            json!({"error": "Failed to parse JSON", "raw_response": prose})
        );
    }

    #[tokio::test]
    async fn test_wrong_extension_is_rejected_before_pipeline() {
        let h = harness("unused");
        let response = h
            .app
            .oneshot(upload("/convert/cobol-to-java", "PROG.txt", "STOP RUN."))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
        assert_json_eq!(
            body_json(response).await,
            json!({
                "detail": "Only COBOL files (.cob, .cbl) are supported.",
                "type": "invalid_request_error"
            })
        );
        assert_eq!(h.client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_upload_is_rejected() {
        let h = harness("unused");
        let response = h
            .app
            .oneshot(upload("/convert/cobol-to-java", "PROG.cob", ""))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(h.client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unsupported_provider_is_configuration_error() {
        let h = harness_with(Some("unused"), Some("llama"));
        let response = h
            .app
            .oneshot(upload("/convert/cobol-to-java", "PROG.cbl", "STOP RUN."))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
        assert_json_eq!(
            body_json(response).await,
            json!({
                "detail": "LLM provider 'llama' not supported.",
                "type": "configuration_error"
            })
        );
        assert_eq!(h.client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_provider_failure_is_generic_internal_error() {
        let h = harness_with(None, None);
        let response = h
            .app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("{BASE}/convert/cobol-to-java"))
                    .header(REQUEST_ID_HEADER, "retry-7")
                    .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
                    .body(Body::from(format!(
                        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"PROG.cbl\"\r\n\r\nSTOP RUN.\r\n--{BOUNDARY}--\r\n"
                    )))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[REQUEST_ID_HEADER], "retry-7");
        assert_json_eq!(
            body_json(response).await,
            json!({"detail": INTERNAL_ERROR_DETAIL, "type": "internal_error"})
        );
        assert_eq!(h.client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_supplied_request_id_is_echoed() {
        let h = harness("unused");
        let request = Request::builder()
            .uri(format!("{BASE}/touch"))
            .header(REQUEST_ID_HEADER, "abc-123")
            .body(Body::empty())
            .unwrap();

        let response = h.app.oneshot(request).await.unwrap();
        assert_eq!(response.headers()[REQUEST_ID_HEADER], "abc-123");
    }

    #[tokio::test]
    async fn test_missing_request_id_is_generated() {
        let h = harness("unused");
        let request = Request::builder()
            .uri(format!("{BASE}/touch"))
            .body(Body::empty())
            .unwrap();

        let response = h.app.oneshot(request).await.unwrap();
        let id = response.headers()[REQUEST_ID_HEADER].to_str().unwrap();
        assert!(uuid::Uuid::parse_str(id).is_ok());
    }

    #[tokio::test]
    async fn test_unknown_route_still_carries_request_id() {
        let h = harness("unused");
        let request = Request::builder()
            .uri("/nowhere")
            .header(REQUEST_ID_HEADER, "lost-1")
            .body(Body::empty())
            .unwrap();

        let response = h.app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[REQUEST_ID_HEADER], "lost-1");
    }

    #[tokio::test]
    async fn test_concurrent_requests_keep_their_own_ids() {
        let h = harness("unused");
        let requests = (0..8).map(|i| {
            let app = h.app.clone();
            async move {
                let request = Request::builder()
                    .uri(format!("{BASE}/touch"))
                    .header(REQUEST_ID_HEADER, format!("req-{i}"))
                    .body(Body::empty())
                    .unwrap();
                let response = app.oneshot(request).await.unwrap();
                (i, response.headers()[REQUEST_ID_HEADER].to_str().unwrap().to_string())
            }
        });

        let handles: Vec<_> = requests.map(tokio::spawn).collect();
        for handle in handles {
            let (i, id) = handle.await.unwrap();
            assert_eq!(id, format!("req-{i}"));
        }
    }

    async fn boom() -> &'static str {
        panic!("handler exploded")
    }

    #[tokio::test]
    async fn test_panic_becomes_internal_error_with_request_id() {
        let app = with_middleware(Router::new().route("/boom", get(boom)));
        let request = Request::builder()
            .uri("/boom")
            .header(REQUEST_ID_HEADER, "boom-1")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[REQUEST_ID_HEADER], "boom-1");
        assert_json_eq!(
            body_json(response).await,
            json!({"detail": "Internal server error", "type": "internal_error"})
        );
    }

    #[tokio::test]
    async fn test_root_mount() {
        let prompts = TempDir::new().unwrap();
        let resolver = MockResolver {
            client: Arc::new(MockClient {
                reply: None,
                calls: AtomicUsize::new(0),
            }),
            provider: None,
        };
        let converter = CodeConverter::new(TemplateStore::new(prompts.path()), Arc::new(resolver));
        let app = router(AppState::new(converter), "/");

        let request = Request::builder().uri("/touch").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_oversized_upload_is_payload_too_large() {
        let h = harness_limited(Some("unused"), None, 256);
        let response = h
            .app
            .oneshot(upload("/convert/cobol-to-java", "PROG.cbl", &"X".repeat(4096)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
        assert_json_eq!(
            body_json(response).await,
            json!({
                "detail": "Uploaded file exceeds the 256 byte limit.",
                "type": "invalid_request_error"
            })
        );
        assert_eq!(h.client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_upload_within_limit_is_accepted() {
        let h = harness_limited(Some("```json\n{\"code\":\"x = 1\"}\n```"), None, 1024);
        let response = h
            .app
            .oneshot(upload("/convert/cobol-to-python", "PROG.cbl", "STOP RUN."))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_json_eq!(body_json(response).await, json!({"code": "x = 1"}));
    }

    /// fmt output sink shared with the test body
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn install(&self) -> tracing::subscriber::DefaultGuard {
            let sink = self.clone();
            let subscriber = tracing_subscriber::fmt()
                .with_writer(move || sink.clone())
                .with_ansi(false)
                .with_max_level(tracing::Level::INFO)
                .finish();
            tracing::subscriber::set_default(subscriber)
        }

        fn lines(&self) -> Vec<String> {
            let bytes = self.0.lock().unwrap().clone();
            String::from_utf8(bytes)
                .unwrap()
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(str::to_string)
                .collect()
        }
    }

    #[tokio::test]
    async fn test_request_logs_carry_request_id() {
        let logs = CapturedLogs::default();
        let _guard = logs.install();

        let h = harness("The program stops.");
        let request = with_request_id(
            upload("/convert/cobol-to-java", "PROG.cbl", "STOP RUN."),
            "abc-123",
        );
        let response = h.app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let lines = logs.lines();
        assert!(lines.iter().any(|l| l.contains("Received PROG.cbl")));
        assert!(lines.iter().any(|l| l.contains("Converting 9 characters")));
        assert!(lines.iter().any(|l| l.contains("Returning unstructured completion")));
        for line in &lines {
            assert!(line.contains("request_id=abc-123"), "untagged log line: {line}");
        }
    }

    /// Yields around a log line so concurrent requests interleave
    struct YieldingEcho;

    #[async_trait]
    impl InferenceClient for YieldingEcho {
        fn provider(&self) -> &str {
            "yielding-echo"
        }

        async fn invoke(&self, prompt: &str) -> Result<RawCompletion> {
            tokio::task::yield_now().await;
            info!("Model saw {}", prompt.lines().last().unwrap_or_default());
            tokio::task::yield_now().await;
            Ok(RawCompletion(prompt.to_string()))
        }
    }

    struct StaticResolver(Arc<dyn InferenceClient>);

    impl ClientResolver for StaticResolver {
        fn resolve(&self) -> Result<Arc<dyn InferenceClient>> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_interleaved_requests_log_their_own_ids() {
        let logs = CapturedLogs::default();
        let _guard = logs.install();

        let prompts = prompts_dir();
        let converter = CodeConverter::new(
            TemplateStore::new(prompts.path()),
            Arc::new(StaticResolver(Arc::new(YieldingEcho))),
        );
        let app = router(AppState::new(converter), BASE);

        let (alpha, beta) = tokio::join!(
            app.clone().oneshot(with_request_id(
                upload("/convert/cobol-to-java", "ALPHA.cbl", "ALPHA SECTION."),
                "id-alpha",
            )),
            app.clone().oneshot(with_request_id(
                upload("/convert/cobol-to-java", "BETA.cbl", "BETA SECTION."),
                "id-beta",
            )),
        );
        assert_eq!(alpha.unwrap().headers()[REQUEST_ID_HEADER], "id-alpha");
        assert_eq!(beta.unwrap().headers()[REQUEST_ID_HEADER], "id-beta");

        let lines = logs.lines();
        for (marker, own, other) in [("ALPHA", "id-alpha", "id-beta"), ("BETA", "id-beta", "id-alpha")] {
            let tagged: Vec<_> = lines.iter().filter(|l| l.contains(marker)).collect();
            assert!(tagged.iter().any(|l| l.contains("Model saw")), "no model log for {marker}");
            for line in tagged {
                assert!(line.contains(&format!("request_id={own}")), "{line}");
                assert!(!line.contains(other), "{line}");
            }
        }
    }
}
