//! HTTP Handlers

use std::collections::BTreeMap;

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use agent_core::{provider::ModelInfo, Attachment};
use med_advisor::{intake, AdvisorError, WorkflowSnapshot};

use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub provider_connected: bool,
    pub active_sessions: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub session_id: String,
    pub decided: bool,
    pub tools: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FilesResponse {
    pub files: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResultsResponse {
    pub session_id: String,
    pub results: BTreeMap<String, String>,
    pub workflow: WorkflowSnapshot,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, err: &AdvisorError) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: err.user_message(),
            code: err.code().into(),
        }),
    )
}

/// Status code for an advisor failure
fn status_for(err: &AdvisorError) -> StatusCode {
    match err {
        AdvisorError::MissingInput(_) | AdvisorError::InvalidUpload(_) | AdvisorError::OutOfOrder { .. } => {
            StatusCode::BAD_REQUEST
        }
        AdvisorError::StaleSession(_) => StatusCode::GONE,
        AdvisorError::StepLimit(_) => StatusCode::UNPROCESSABLE_ENTITY,
        AdvisorError::ResearchTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        AdvisorError::ExternalService(_) | AdvisorError::ResearchUnavailable(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn from_advisor(err: AdvisorError) -> ApiError {
    api_error(status_for(&err), &err)
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let provider_connected = state.provider.health_check().await.unwrap_or(false);

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        provider_connected,
        active_sessions: state.consultations.len().await,
    })
}

/// Models offered by the provider
pub async fn list_models(State(state): State<AppState>) -> Result<Json<Vec<ModelInfo>>, ApiError> {
    state.provider.list_models().await.map(Json).map_err(|e| {
        tracing::error!("Model listing failed: {}", e);
        from_advisor(e.into())
    })
}

/// One consultation turn
///
/// Multipart fields: `message`, optional `session_id`, and any number of
/// `images` / `files` uploads.
pub async fn chat_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ChatResponse>, ApiError> {
    let mut message = String::new();
    let mut session_id: Option<String> = None;
    let mut attachments: Vec<Attachment> = Vec::new();
    let mut pending: Vec<(String, axum::body::Bytes)> = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::warn!("Malformed multipart body: {}", e);
        from_advisor(AdvisorError::InvalidUpload("malformed form data".into()))
    })? {
        let name = field.name().unwrap_or_default().trim_end_matches("[]").to_string();

        match name.as_str() {
            "message" => {
                message = field.text().await.map_err(|_| {
                    from_advisor(AdvisorError::InvalidUpload("unreadable message field".into()))
                })?;
            }
            "session_id" => {
                session_id = field.text().await.ok().filter(|s| !s.trim().is_empty());
            }
            "images" | "files" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(|_| {
                    from_advisor(AdvisorError::InvalidUpload(format!("unreadable upload {:?}", filename)))
                })?;
                // browsers send an empty part when no file was chosen
                if filename.is_empty() && bytes.is_empty() {
                    continue;
                }

                attachments.push(intake::attachment_from_bytes(&filename, &bytes).map_err(from_advisor)?);
                pending.push((filename, bytes));
            }
            other => tracing::debug!(field = other, "Ignoring form field"),
        }
    }

    let consultation = state
        .consultations
        .get_or_open(session_id.as_deref())
        .await
        .map_err(from_advisor)?;

    // Staged only once the session is known to be live
    for (filename, bytes) in &pending {
        state.uploads.save(filename, bytes).await.map_err(from_advisor)?;
    }

    let reply = consultation.send(&message, attachments).await.map_err(|e| {
        tracing::error!(session = %consultation.id(), error = %e, "Consultation turn failed");
        from_advisor(e)
    })?;

    Ok(Json(ChatResponse {
        response: reply.message,
        session_id: reply.session_id,
        decided: reply.decided,
        tools: reply.tools,
    }))
}

/// Staged uploads
pub async fn list_files(State(state): State<AppState>) -> Result<Json<FilesResponse>, ApiError> {
    let files = state.uploads.list().await.map_err(from_advisor)?;
    Ok(Json(FilesResponse { files }))
}

/// Research store contents of a live session
pub async fn session_results(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ResultsResponse>, ApiError> {
    let consultation = state.consultations.get(&id).await.ok_or_else(|| {
        api_error(StatusCode::NOT_FOUND, &AdvisorError::StaleSession(id.clone()))
    })?;

    Ok(Json(ResultsResponse {
        results: consultation.results().await.map_err(from_advisor)?,
        workflow: consultation.workflow(),
        session_id: id,
    }))
}

/// End a session and drop its state
pub async fn end_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .consultations
        .end(&id)
        .await
        .map_err(|e| api_error(StatusCode::NOT_FOUND, &e))?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use agent_core::mock::MockProvider;
    use axum::body::Body;
    use axum::http::Request;
    use med_advisor::research::StaticResearchPipeline;
    use med_advisor::{AdvisorConfig, Collaborators, ConsultationManager, UploadArea};
    use tower::ServiceExt;

    use crate::state::AppState;

    const BOUNDARY: &str = "medassist-test-boundary";

    fn state(dir: &std::path::Path) -> AppState {
        let provider = Arc::new(MockProvider::from_fn(|_| "Please describe the symptoms.".into()));
        AppState {
            provider: provider.clone(),
            consultations: Arc::new(ConsultationManager::new(
                Collaborators::new(provider, Arc::new(StaticResearchPipeline::echo())),
                AdvisorConfig::default(),
            )),
            uploads: UploadArea::new(dir),
        }
    }

    /// (field name, optional file name, content)
    fn multipart(parts: &[(&str, Option<&str>, &str)]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, filename, content) in parts {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            match filename {
                Some(file) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                        name, file
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                ),
            }
            body.extend_from_slice(content.as_bytes());
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    fn chat_request(parts: &[(&str, Option<&str>, &str)]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header("content-type", format!("multipart/form-data; boundary={}", BOUNDARY))
            .body(Body::from(multipart(parts)))
            .unwrap()
    }

    async fn json_body<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_chat_stages_uploads_and_keeps_session() {
        let tmp = tempfile::tempdir().unwrap();
        let state = state(tmp.path());

        let response = crate::app(state.clone())
            .oneshot(chat_request(&[
                ("message", None, "fatigue and weight loss"),
                ("images", Some("chest x-ray.png"), "PNG image data"),
                ("files[]", Some("labs.txt"), "HbA1c 8.1%"),
            ]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let chat: ChatResponse = json_body(response).await;
        assert_eq!(chat.response, "Please describe the symptoms.");
        assert!(!chat.decided);

        let files: FilesResponse = json_body(
            crate::app(state.clone())
                .oneshot(Request::builder().uri("/api/files").body(Body::empty()).unwrap())
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(files.files, vec!["chest_x-ray.png", "labs.txt"]);

        let results = crate::app(state)
            .oneshot(
                Request::builder()
                    .uri(format!("/api/sessions/{}/results", chat.session_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(results.status(), StatusCode::OK);
        let results: ResultsResponse = json_body(results).await;
        assert!(results.results.is_empty());
        assert_eq!(results.workflow.doctor_turns, 1);
    }

    #[tokio::test]
    async fn test_disallowed_upload_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let response = crate::app(state(tmp.path()))
            .oneshot(chat_request(&[
                ("message", None, "see attached"),
                ("files", Some("notes.docx"), "PK"),
            ]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let err: ErrorResponse = json_body(response).await;
        assert_eq!(err.code, "invalid_upload");
    }

    #[tokio::test]
    async fn test_empty_turn_is_bad_request() {
        let tmp = tempfile::tempdir().unwrap();
        let response = crate::app(state(tmp.path()))
            .oneshot(chat_request(&[("message", None, "  ")]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let err: ErrorResponse = json_body(response).await;
        assert_eq!(err.code, "missing_input");
    }

    #[tokio::test]
    async fn test_end_session() {
        let tmp = tempfile::tempdir().unwrap();
        let state = state(tmp.path());
        state.consultations.get_or_open(Some("case-1")).await.unwrap();

        let delete = |id: &str| {
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/sessions/{}", id))
                .body(Body::empty())
                .unwrap()
        };

        let response = crate::app(state.clone()).oneshot(delete("case-1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = crate::app(state.clone()).oneshot(delete("case-1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = crate::app(state.clone())
            .oneshot(chat_request(&[
                ("message", None, "hello"),
                ("images", Some("scan.png"), "PNG image data"),
                ("session_id", None, "case-1"),
            ]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::GONE);
        assert!(state.uploads.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_health() {
        let tmp = tempfile::tempdir().unwrap();
        let response = crate::app(state(tmp.path()))
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
