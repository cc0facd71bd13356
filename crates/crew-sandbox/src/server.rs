//! HTTP front-end of the tool service
//!
//! | Endpoint | Success | Errors |
//! |---|---|---|
//! | `POST /read` | `{content}` | 404, 400 |
//! | `POST /write` | `{ok: true}` | 400 |
//! | `POST /list` | `{entries}` | 404, 400 |
//! | `POST /exec` | `{output}` / `{exit, output}` | 400, 404, 504 |
//! | `POST /scan` | scan report | 400, 404, 500 |
//! | `GET /healthz` | `{status: "ok"}` | |
//!
//! Error bodies are `{"detail": "..."}`. A body that does not match the
//! endpoint's request shape is 422, so 400 always means a path escape.

use crate::error::SandboxError;
use crate::service::ToolService;
use crew_protocol::{
    ErrorBody, ExecRequest, HealthResponse, ListRequest, ListResponse, ReadRequest, ReadResponse,
    ScanRequest, WriteRequest, WriteResponse,
};
use serde::Serialize;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

/// HTTP status for a service error
#[must_use]
pub fn status_for(err: &SandboxError) -> StatusCode {
    match err {
        SandboxError::PathEscape(_) => StatusCode::BAD_REQUEST,
        SandboxError::NotFound(_) => StatusCode::NOT_FOUND,
        SandboxError::TimedOut { .. } => StatusCode::GATEWAY_TIMEOUT,
        SandboxError::ScanFailure(_) | SandboxError::Spawn { .. } | SandboxError::Io { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn respond<T: Serialize>(result: Result<T, SandboxError>) -> Response {
    match result {
        Ok(body) => warp::reply::json(&body).into_response(),
        Err(err) => {
            let status = status_for(&err);
            if status.is_server_error() {
                tracing::error!(%err, "tool request failed");
            } else {
                tracing::warn!(%err, "tool request rejected");
            }
            warp::reply::with_status(warp::reply::json(&ErrorBody::new(err.to_string())), status)
                .into_response()
        }
    }
}

fn with_service(
    service: ToolService,
) -> impl Filter<Extract = (ToolService,), Error = Infallible> + Clone {
    warp::any().map(move || service.clone())
}

async fn read_handler(req: ReadRequest, service: ToolService) -> Result<Response, Infallible> {
    Ok(respond(
        service
            .read(&req.path)
            .await
            .map(|content| ReadResponse { content }),
    ))
}

async fn write_handler(req: WriteRequest, service: ToolService) -> Result<Response, Infallible> {
    Ok(respond(
        service
            .write(&req.path, req.content.as_bytes())
            .await
            .map(|()| WriteResponse::ack()),
    ))
}

async fn list_handler(req: ListRequest, service: ToolService) -> Result<Response, Infallible> {
    Ok(respond(
        service
            .list(&req.path)
            .await
            .map(|entries| ListResponse { entries }),
    ))
}

async fn exec_handler(req: ExecRequest, service: ToolService) -> Result<Response, Infallible> {
    Ok(respond(
        service
            .execute(&req.command, &req.workdir, req.timeout)
            .await,
    ))
}

async fn scan_handler(req: ScanRequest, service: ToolService) -> Result<Response, Infallible> {
    Ok(respond(service.scan(&req.path).await))
}

async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    let (status, detail) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "no such endpoint".to_string())
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "method not allowed".to_string())
    } else if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
        (StatusCode::UNSUPPORTED_MEDIA_TYPE, "expected a JSON body".to_string())
    } else {
        tracing::error!(?err, "unhandled rejection");
        (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
    };
    Ok(warp::reply::with_status(warp::reply::json(&ErrorBody::new(detail)), status).into_response())
}

/// All tool service routes
pub fn routes(
    service: ToolService,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let health = warp::path!("healthz")
        .and(warp::get())
        .map(|| warp::reply::json(&HealthResponse::ok()).into_response());

    let read = warp::path!("read")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_service(service.clone()))
        .and_then(read_handler);
    let write = warp::path!("write")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_service(service.clone()))
        .and_then(write_handler);
    let list = warp::path!("list")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_service(service.clone()))
        .and_then(list_handler);
    let exec = warp::path!("exec")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_service(service.clone()))
        .and_then(exec_handler);
    let scan = warp::path!("scan")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_service(service))
        .and_then(scan_handler);

    health
        .or(read)
        .unify()
        .or(write)
        .unify()
        .or(list)
        .unify()
        .or(exec)
        .unify()
        .or(scan)
        .unify()
        .recover(handle_rejection)
        .unify()
        .with(warp::trace::request())
}

/// Bind the tool service; the returned future runs until `shutdown` resolves
///
/// # Errors
/// Returns the bind error if `addr` is unavailable
pub fn serve(
    service: ToolService,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(SocketAddr, impl Future<Output = ()>), warp::Error> {
    warp::serve(routes(service)).try_bind_with_graceful_shutdown(addr, shutdown)
}
