use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::FormRejection;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::dispatch::{Dispatcher, InboundEvent, Outcome};
use crate::error::BotError;

const BANNER: &str = "ESPHome PR Bot";

/// Build the HTTP router around a dispatcher.
pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/webhook", post(webhook).fallback(not_found))
        .route("/mailhook", post(mailhook).fallback(not_found))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(dispatcher)
}

async fn root() -> &'static str {
    BANNER
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not Found")
}

impl IntoResponse for BotError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "event handling failed");
        } else {
            warn!(error = %self, status = status.as_u16(), "rejected event");
        }
        (status, self.to_string()).into_response()
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

async fn webhook(
    State(dispatcher): State<Arc<Dispatcher>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<&'static str, BotError> {
    let event = InboundEvent::Webhook {
        event_type: header(&headers, "x-github-event"),
        signature: header(&headers, "x-hub-signature-256"),
        raw_body: &body,
    };
    let outcome = dispatcher.dispatch(event).await?;
    info!(outcome = ?outcome, "webhook handled");
    Ok("OK")
}

#[derive(Debug, Deserialize)]
struct MailForm {
    subject: Option<String>,
}

async fn mailhook(
    State(dispatcher): State<Arc<Dispatcher>>,
    form: Result<Form<MailForm>, FormRejection>,
) -> Result<(StatusCode, &'static str), BotError> {
    let subject = form.ok().and_then(|Form(form)| form.subject);
    let event = InboundEvent::Mailhook {
        subject: subject.as_deref(),
    };
    match dispatcher.dispatch(event).await? {
        Outcome::Processed(action) => {
            info!(action = %action, "mailhook handled");
            Ok((StatusCode::OK, "OK"))
        }
        Outcome::Ignored(reason) => Ok((StatusCode::ACCEPTED, reason)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::tests::{pull_details, pull_request_payload, sign, test_config};
    use crate::github::fake::FakeGitHub;
    use axum::body::Body;
    use axum::http::{header, Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn app(github: &FakeGitHub) -> Router {
        router(Arc::new(Dispatcher::new(
            test_config(),
            Arc::new(github.clone()),
        )))
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, String) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn webhook_request(event: &str, body: &str, signature: Option<&str>) -> Request<Body> {
        let mut builder = Request::post("/webhook")
            .header("x-github-event", event)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(signature) = signature {
            builder = builder.header("x-hub-signature-256", signature);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn mailhook_request(form: &str) -> Request<Body> {
        Request::post("/mailhook")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(form.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_root_banner() {
        let request = Request::get("/").body(Body::empty()).unwrap();
        let (status, body) = send(app(&FakeGitHub::new()), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ESPHome PR Bot");
    }

    #[tokio::test]
    async fn test_unknown_routes_not_found() {
        let request = Request::get("/nope").body(Body::empty()).unwrap();
        let (status, body) = send(app(&FakeGitHub::new()), request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "Not Found");

        let request = Request::get("/webhook").body(Body::empty()).unwrap();
        let (status, _) = send(app(&FakeGitHub::new()), request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_webhook_bad_signature_401() {
        let payload = pull_request_payload("opened", 42);
        let request = webhook_request("pull_request", &payload, Some("sha256=deadbeef"));
        let (status, body) = send(app(&FakeGitHub::new()), request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, "Invalid signature");

        let request = webhook_request("pull_request", &payload, None);
        let (status, _) = send(app(&FakeGitHub::new()), request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_webhook_verifies_raw_body_bytes() {
        let github = FakeGitHub::new().with_files(&["esphome/components/sensor/foo.py"]);
        // Pretty-printed payload: re-serializing would not reproduce these bytes.
        let value: serde_json::Value =
            serde_json::from_str(&pull_request_payload("opened", 42)).unwrap();
        let payload = serde_json::to_string_pretty(&value).unwrap();
        let signature = sign(payload.as_bytes());
        let request = webhook_request("pull_request", &payload, Some(&signature));
        let (status, body) = send(app(&github), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "OK");
        assert_eq!(github.comments().len(), 1);
    }

    #[tokio::test]
    async fn test_webhook_no_op_is_ok() {
        let github = FakeGitHub::new().with_files(&["docs/readme.md"]);
        let payload = pull_request_payload("opened", 42);
        let signature = sign(payload.as_bytes());
        let request = webhook_request("pull_request", &payload, Some(&signature));
        let (status, body) = send(app(&github), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "OK");
        assert!(github.comments().is_empty());
    }

    #[tokio::test]
    async fn test_webhook_upstream_failure_500_with_message() {
        let github = FakeGitHub::new()
            .with_files(&["esphome/components/sensor/foo.py"])
            .failing_files();
        let payload = pull_request_payload("opened", 42);
        let signature = sign(payload.as_bytes());
        let request = webhook_request("pull_request", &payload, Some(&signature));
        let (status, body) = send(app(&github), request).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "GitHub API returned an unexpected response: page 2 failed");
    }

    #[tokio::test]
    async fn test_webhook_no_installation_500() {
        let github = FakeGitHub::new().with_installations(&[]);
        let payload = pull_request_payload("synchronize", 42);
        let signature = sign(payload.as_bytes());
        let request = webhook_request("pull_request", &payload, Some(&signature));
        let (status, body) = send(app(&github), request).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "No installation found for this GitHub App.");
    }

    #[tokio::test]
    async fn test_mailhook_wrong_user_202() {
        let github = FakeGitHub::new()
            .with_pull(pull_details("someone-else"))
            .with_files(&["esphome/components/wifi/wifi.cpp"]);
        let request = mailhook_request(
            "from=notifications%40github.com&subject=%5Besphome%2Fesphome%5D+Something+happened+%28PR+%2342%29",
        );
        let (status, body) = send(app(&github), request).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body, "Wrong user");
        assert!(github.comments().is_empty());
    }

    #[tokio::test]
    async fn test_mailhook_success_200() {
        let github = FakeGitHub::new()
            .with_pull(pull_details("clydebarrow"))
            .with_files(&["esphome/components/wifi/wifi.cpp"]);
        let request = mailhook_request(
            "subject=%5Besphome%2Fesphome%5D+Something+happened+%28PR+%2342%29",
        );
        let (status, body) = send(app(&github), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "OK");
        assert!(github.comments()[0].body.contains("components: [wifi]"));
    }

    #[tokio::test]
    async fn test_mailhook_no_component_changes_202() {
        let github = FakeGitHub::new()
            .with_pull(pull_details("clydebarrow"))
            .with_files(&["README.md"]);
        let request = mailhook_request(
            "subject=%5Besphome%2Fesphome%5D+Something+happened+%28PR+%2342%29",
        );
        let (status, body) = send(app(&github), request).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body, "No component changes");
    }

    #[tokio::test]
    async fn test_mailhook_bad_subject_400() {
        let (status, body) = send(app(&FakeGitHub::new()), mailhook_request("from=x")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Missing subject");

        let (status, body) =
            send(app(&FakeGitHub::new()), mailhook_request("subject=hello")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Invalid subject format");
    }
}
