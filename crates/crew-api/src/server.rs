//! HTTP routes of the submission interface

use crate::wire::{RefactorRequest, RefactorResponse, SessionView};
use crew_core::{Orchestrator, SessionError, SessionId};
use crew_protocol::{ErrorBody, HealthResponse};
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

fn error_reply(status: StatusCode, detail: impl Into<String>) -> Response {
    warp::reply::with_status(warp::reply::json(&ErrorBody::new(detail)), status).into_response()
}

fn with_orchestrator(
    orchestrator: Orchestrator,
) -> impl Filter<Extract = (Orchestrator,), Error = Infallible> + Clone {
    warp::any().map(move || orchestrator.clone())
}

async fn refactor_handler(
    req: RefactorRequest,
    orchestrator: Orchestrator,
) -> Result<Response, Infallible> {
    // The run is detached from the request: a dropped connection does not
    // cancel it, and its results are still persisted.
    let run = tokio::spawn(async move { orchestrator.submit(&req.code, &req.filename).await });

    let reply = match run.await {
        Ok(Ok(report)) => {
            let status = if report.is_success() {
                StatusCode::OK
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            warp::reply::with_status(warp::reply::json(&RefactorResponse::from(&report)), status)
                .into_response()
        }
        Ok(Err(err)) if err.is_client_error() => error_reply(StatusCode::BAD_REQUEST, err.to_string()),
        Ok(Err(err)) => {
            tracing::error!(error = %err, "submission failed");
            error_reply(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
        Err(join) => {
            tracing::error!(error = %join, "pipeline task aborted");
            error_reply(StatusCode::INTERNAL_SERVER_ERROR, "pipeline task aborted")
        }
    };
    Ok(reply)
}

async fn session_handler(id: String, orchestrator: Orchestrator) -> Result<Response, Infallible> {
    let Ok(id) = id.parse::<SessionId>() else {
        return Ok(error_reply(StatusCode::NOT_FOUND, format!("session not found: {id}")));
    };
    let reply = match orchestrator.sessions().record(&id).await {
        Ok(record) => warp::reply::json(&SessionView::from(record)).into_response(),
        Err(err @ SessionError::NotFound(_)) => error_reply(StatusCode::NOT_FOUND, err.to_string()),
        Err(err) => {
            tracing::error!(session = %id, error = %err, "session lookup failed");
            error_reply(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    };
    Ok(reply)
}

async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    let reply = if err.is_not_found() {
        error_reply(StatusCode::NOT_FOUND, "no such endpoint")
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        error_reply(StatusCode::BAD_REQUEST, e.to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        error_reply(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
    } else if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
        error_reply(StatusCode::UNSUPPORTED_MEDIA_TYPE, "expected a JSON body")
    } else {
        tracing::error!(?err, "unhandled rejection");
        error_reply(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
    };
    Ok(reply)
}

/// All submission routes
pub fn routes(
    orchestrator: Orchestrator,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let health = warp::path!("healthz")
        .and(warp::get())
        .map(|| warp::reply::json(&HealthResponse::ok()).into_response());

    let refactor = warp::path!("refactor")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_orchestrator(orchestrator.clone()))
        .and_then(refactor_handler);

    let session = warp::path!("sessions" / String)
        .and(warp::get())
        .and(with_orchestrator(orchestrator))
        .and_then(session_handler);

    health
        .or(refactor)
        .unify()
        .or(session)
        .unify()
        .recover(handle_rejection)
        .unify()
        .with(warp::trace::request())
}

/// Bind the submission interface; the returned future runs until `shutdown`
///
/// # Errors
/// Returns the bind error if `addr` is unavailable
pub fn serve(
    orchestrator: Orchestrator,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(SocketAddr, impl Future<Output = ()>), warp::Error> {
    warp::serve(routes(orchestrator)).try_bind_with_graceful_shutdown(addr, shutdown)
}

