use std::num::NonZeroU32;
use std::time::Duration;

use axum::body::Body;
use axum::extract::multipart::Field;
use axum::extract::{Form, FromRequest, Multipart, Path, Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::store::{self, key_prefix, ConsumeResult, Payload, SecretView};
use crate::AppState;

// ── Health ───────────────────────────────────────────────────────────────────

pub async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

// ── Create ───────────────────────────────────────────────────────────────────

/// Urlencoded share form. Field names are part of the public API, hence the
/// camelCase renames.
#[derive(Debug, Deserialize)]
pub struct CreateForm {
    #[serde(default)]
    pub data: String,
    #[serde(rename = "maxViews")]
    pub max_views: Option<String>,
    #[serde(rename = "expireIn")]
    pub expire_in: Option<String>,
}

/// `POST /api/`: store a secret, answer with the bare key. The client
/// builds the one-time link as `<origin>/<key>` itself.
///
/// Urlencoded bodies carry a text message in `data`; multipart bodies may
/// carry a file part instead, keeping its filename and MIME type.
pub async fn create_secret(State(state): State<AppState>, req: Request) -> ApiResult<Response> {
    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_owned();

    let (payload, max_views, expire_in) =
        if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(form) = Form::<CreateForm>::from_request(req, &())
                .await
                .map_err(|_| ApiError::invalid("malformed form body"))?;
            (
                Payload::message(form.data.into_bytes()),
                form.max_views,
                form.expire_in,
            )
        } else if content_type.starts_with("multipart/form-data") {
            read_multipart(req).await?
        } else {
            return Err(ApiError::UnsupportedMediaType);
        };

    let max_views = parse_max_views(max_views.as_deref(), state.limits.max_views)?;
    let ttl = parse_expire_in(expire_in.as_deref(), state.limits.max_ttl)?;

    if payload.is_empty() {
        return Err(ApiError::invalid("data must not be empty"));
    }

    let size = payload.len();
    let key = state.store.create(payload, max_views, ttl);
    info!(
        key = key_prefix(&key),
        size,
        views = max_views.get(),
        ttl = %humantime::format_duration(ttl),
        "created secret"
    );

    Ok((StatusCode::OK, key).into_response())
}

/// Pull the `data` / `maxViews` / `expireIn` fields out of a multipart body.
/// A `data` part with a filename becomes a file payload; without one it is
/// treated as a pasted message.
async fn read_multipart(req: Request) -> ApiResult<(Payload, Option<String>, Option<String>)> {
    let mut multipart = Multipart::from_request(req, &())
        .await
        .map_err(|_| ApiError::invalid("malformed multipart body"))?;

    let mut payload = None;
    let mut max_views = None;
    let mut expire_in = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::invalid("malformed multipart body"))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("data") => {
                let filename = field.file_name().map(str::to_owned);
                let content_type = field.content_type().map(str::to_owned).unwrap_or_default();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|_| ApiError::invalid("could not read data field"))?;
                payload = Some(match filename {
                    Some(filename) => Payload::file(filename, content_type, bytes.to_vec()),
                    None => Payload::message(bytes.to_vec()),
                });
            }
            Some("maxViews") => max_views = Some(field_text(field).await?),
            Some("expireIn") => expire_in = Some(field_text(field).await?),
            _ => {}
        }
    }

    let payload = payload.ok_or_else(|| ApiError::invalid("missing data field"))?;
    Ok((payload, max_views, expire_in))
}

async fn field_text(field: Field<'_>) -> ApiResult<String> {
    field
        .text()
        .await
        .map_err(|_| ApiError::invalid("malformed multipart body"))
}

fn parse_max_views(raw: Option<&str>, limit: NonZeroU32) -> ApiResult<NonZeroU32> {
    let raw = raw.ok_or_else(|| ApiError::invalid("missing maxViews field"))?;
    let value: u32 = raw
        .trim()
        .parse()
        .map_err(|_| ApiError::invalid("maxViews must be a whole number"))?;
    match NonZeroU32::new(value) {
        Some(views) if views <= limit => Ok(views),
        _ => Err(ApiError::invalid(format!(
            "maxViews must be between 1 and {limit}"
        ))),
    }
}

fn parse_expire_in(raw: Option<&str>, max_ttl: Duration) -> ApiResult<Duration> {
    let raw = raw.ok_or_else(|| ApiError::invalid("missing expireIn field"))?;
    let ttl = humantime::parse_duration(raw.trim())
        .map_err(|_| ApiError::invalid("expireIn must be a duration like 5m or 1h30m"))?;
    if ttl.is_zero() {
        return Err(ApiError::invalid("expireIn must be greater than zero"));
    }
    if ttl > max_ttl {
        return Err(ApiError::invalid(format!(
            "expireIn must be at most {}",
            humantime::format_duration(max_ttl)
        )));
    }
    Ok(ttl)
}

// ── Metadata ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaResponse {
    pub max_views: u32,
    pub views: u32,
    /// Remaining time budget in nanoseconds, truncated to whole seconds.
    pub expire_in: u64,
}

/// `GET /api/{key}`: counters and remaining lifetime, as JSON. Never
/// charges a view: the share page polls this without burning anything.
pub async fn secret_meta(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<Json<MetaResponse>> {
    if !store::looks_like_key(&key) {
        return Err(ApiError::NotFound);
    }
    match state.store.peek(&key) {
        None => Err(ApiError::NotFound),
        Some((_, true)) => Err(ApiError::Spent),
        Some((meta, false)) => Ok(Json(MetaResponse {
            max_views: meta.max_views,
            views: meta.views,
            expire_in: meta.expires_in.as_secs().saturating_mul(1_000_000_000),
        })),
    }
}

// ── Fetch ────────────────────────────────────────────────────────────────────

/// `GET /{key}`: redeem one view and stream the payload back.
pub async fn fetch_secret(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<Response> {
    serve_payload(&state, &key)
}

/// `GET /{key}/{filename}`: same as [`fetch_secret`]; the trailing segment
/// only gives browsers a sensible default name for the download.
pub async fn fetch_secret_named(
    State(state): State<AppState>,
    Path((key, _filename)): Path<(String, String)>,
) -> ApiResult<Response> {
    serve_payload(&state, &key)
}

/// The one place a view gets charged. Every call costs exactly one view;
/// the store decides atomically whether this caller still gets the payload.
fn serve_payload(state: &AppState, key: &str) -> ApiResult<Response> {
    if !store::looks_like_key(key) {
        return Err(ApiError::NotFound);
    }
    match state.store.consume(key) {
        ConsumeResult::Viewed(view) => {
            info!(
                key = key_prefix(key),
                views = view.views,
                left = view.views_left(),
                "served secret view"
            );
            Ok(payload_response(view))
        }
        ConsumeResult::Burned(view) => {
            info!(
                key = key_prefix(key),
                views = view.views,
                "served final view, secret burned"
            );
            Ok(payload_response(view))
        }
        ConsumeResult::Spent => Err(ApiError::Spent),
        ConsumeResult::NotFound => Err(ApiError::NotFound),
    }
}

fn payload_response(mut view: SecretView) -> Response {
    let content_type = HeaderValue::from_str(view.payload.content_type())
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header("X-Wick-Views", view.views.to_string())
        .header("X-Wick-Views-Left", view.views_left().to_string());

    if let Some(filename) = view.payload.filename() {
        builder = builder.header(header::CONTENT_DISPOSITION, attachment_disposition(filename));
    }

    builder
        .body(Body::from(view.payload.take_bytes()))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// `Content-Disposition` value for a file payload. Quotes, backslashes and
/// control characters are stripped from the filename so the value stays one
/// well-formed header.
fn attachment_disposition(filename: &str) -> String {
    let clean: String = filename
        .chars()
        .filter(|c| !c.is_control() && *c != '"' && *c != '\\')
        .collect();
    format!("attachment; filename=\"{clean}\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limit(n: u32) -> NonZeroU32 {
        NonZeroU32::new(n).unwrap()
    }

    #[test]
    fn max_views_parsing() {
        assert_eq!(parse_max_views(Some("3"), limit(1000)).unwrap().get(), 3);
        assert_eq!(parse_max_views(Some(" 10 "), limit(1000)).unwrap().get(), 10);
        assert!(parse_max_views(None, limit(1000)).is_err());
        assert!(parse_max_views(Some(""), limit(1000)).is_err());
        assert!(parse_max_views(Some("0"), limit(1000)).is_err());
        assert!(parse_max_views(Some("-2"), limit(1000)).is_err());
        assert!(parse_max_views(Some("2.5"), limit(1000)).is_err());
        assert!(parse_max_views(Some("1001"), limit(1000)).is_err());
    }

    #[test]
    fn expire_in_parsing() {
        let week = Duration::from_secs(7 * 24 * 3600);
        assert_eq!(
            parse_expire_in(Some("5m"), week).unwrap(),
            Duration::from_secs(300)
        );
        assert_eq!(
            parse_expire_in(Some("1h30m"), week).unwrap(),
            Duration::from_secs(5400)
        );
        assert!(parse_expire_in(None, week).is_err());
        assert!(parse_expire_in(Some("soon"), week).is_err());
        assert!(parse_expire_in(Some("0s"), week).is_err());
        assert!(parse_expire_in(Some("8d"), week).is_err());
    }

    #[test]
    fn disposition_strips_header_breakers() {
        assert_eq!(
            attachment_disposition("report.pdf"),
            "attachment; filename=\"report.pdf\""
        );
        assert_eq!(
            attachment_disposition("bad\"name\r\n.txt"),
            "attachment; filename=\"badname.txt\""
        );
    }
}
