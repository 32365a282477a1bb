use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Rejection, Reply};

use crate::config::SettingsPatch;
use crate::control::ControlPlane;
use crate::error::{RecorderError, Result};
use crate::upload::{UploadMetadata, UploadTarget};

#[derive(Debug, Deserialize)]
pub struct AddChannelRequest {
    #[serde(alias = "name")]
    pub channel: String,
}

#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    /// Artifact id
    #[serde(alias = "id")]
    pub filename: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub privacy: Option<String>,
}

/// Path segments arrive percent-encoded.
fn decode_segment(raw: &str) -> Result<String> {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .map_err(|e| RecorderError::InvalidRequest(format!("Bad path segment {:?}: {}", raw, e)))
}

pub fn error_reply(err: &RecorderError) -> Response {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        tracing::error!(error = %err, "Request failed");
    } else {
        tracing::debug!(error = %err, status = status.as_u16(), "Request rejected");
    }
    warp::reply::with_status(warp::reply::json(&json!({ "error": err.to_string() })), status)
        .into_response()
}

fn reply<T: Serialize>(result: Result<T>) -> std::result::Result<Response, Rejection> {
    Ok(match result {
        Ok(value) => warp::reply::json(&value).into_response(),
        Err(e) => error_reply(&e),
    })
}

fn success(extra: serde_json::Value) -> serde_json::Value {
    let mut body = json!({ "status": "success" });
    if let (Some(body), serde_json::Value::Object(extra)) = (body.as_object_mut(), extra) {
        body.extend(extra);
    }
    body
}

pub async fn status(control: ControlPlane) -> std::result::Result<Response, Rejection> {
    reply(Ok(control.status()))
}

pub async fn toggle_service(control: ControlPlane) -> std::result::Result<Response, Rejection> {
    reply(control.toggle_service())
}

pub async fn list_channels(control: ControlPlane) -> std::result::Result<Response, Rejection> {
    reply(Ok(control.list_sources()))
}

pub async fn add_channel(
    request: AddChannelRequest,
    control: ControlPlane,
) -> std::result::Result<Response, Rejection> {
    reply(
        control
            .add_source(&request.channel)
            .map(|source| success(json!({ "channel": source }))),
    )
}

pub async fn remove_channel(
    name: String,
    control: ControlPlane,
) -> std::result::Result<Response, Rejection> {
    reply(decode_segment(&name).and_then(|name| {
        control
            .remove_source(&name)
            .map(|removed| success(json!({ "removed": removed })))
    }))
}

pub async fn toggle_channel(
    name: String,
    control: ControlPlane,
) -> std::result::Result<Response, Rejection> {
    reply(decode_segment(&name).and_then(|name| control.toggle_source(&name)))
}

pub async fn stop_recording(
    channel: String,
    control: ControlPlane,
) -> std::result::Result<Response, Rejection> {
    let result = match decode_segment(&channel) {
        Ok(channel) => control.stop_session(&channel).await,
        Err(e) => Err(e),
    };
    reply(result)
}

pub async fn list_recordings(control: ControlPlane) -> std::result::Result<Response, Rejection> {
    reply(control.list_artifacts())
}

pub async fn delete_recording(
    id: String,
    control: ControlPlane,
) -> std::result::Result<Response, Rejection> {
    reply(
        decode_segment(&id)
            .and_then(|id| control.delete_artifact(&id))
            .map(|()| success(json!({}))),
    )
}

pub async fn get_settings(control: ControlPlane) -> std::result::Result<Response, Rejection> {
    reply(Ok(control.settings()))
}

pub async fn update_settings(
    patch: SettingsPatch,
    control: ControlPlane,
) -> std::result::Result<Response, Rejection> {
    reply(control.update_settings(patch))
}

pub async fn upload(
    target: String,
    request: UploadRequest,
    control: ControlPlane,
) -> std::result::Result<Response, Rejection> {
    let target: UploadTarget = match target.parse() {
        Ok(target) => target,
        Err(e) => return reply::<()>(Err(e)),
    };
    let metadata = UploadMetadata::with_defaults(
        &request.filename,
        request.title,
        request.description,
        request.privacy,
    );

    let result = control
        .upload(&request.filename, target, metadata)
        .await
        .map(|receipt| success(json!({ "message": receipt.message, "link": receipt.link })));
    reply(result)
}

/// Renders warp's own rejections in the same `{"error": ...}` shape.
pub async fn handle_rejection(err: Rejection) -> std::result::Result<Response, Infallible> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".to_string())
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, format!("Invalid request body: {}", e))
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large".to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else {
        tracing::error!(rejection = ?err, "Unhandled rejection");
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
    };

    Ok(warp::reply::with_status(warp::reply::json(&json!({ "error": message })), status)
        .into_response())
}
