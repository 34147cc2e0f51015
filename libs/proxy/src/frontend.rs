//! Client-facing HTTP listener
//!
//! Each request is resolved by its `Host` header, dumped to raw bytes and
//! tunneled to one worker serving that domain. The worker's raw response is
//! parsed and relayed back.

use std::convert::Infallible;
use std::fmt::Display;
use std::sync::Arc;

use burrow_core::protocol::{self, arg, status};
use burrow_core::raw;
use burrow_fabric::Arguments;
use bytes::Bytes;
use http::header::{CONTENT_TYPE, HOST};
use http::{Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::router::DomainRouter;

/// Serve HTTP/1.1 clients from `listener` until `shutdown` fires
pub async fn serve(listener: TcpListener, router: Arc<DomainRouter>, shutdown: CancellationToken) {
    let tasks = TaskTracker::new();
    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(error = %e, "failed to accept http client");
                    continue;
                }
            },
        };

        let router = Arc::clone(&router);
        let shutdown = shutdown.clone();
        tasks.spawn(async move {
            let service = service_fn(move |req| {
                let router = Arc::clone(&router);
                async move { Ok::<_, Infallible>(handle(&router, req).await) }
            });
            let conn = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
            tokio::pin!(conn);
            tokio::select! {
                res = conn.as_mut() => {
                    if let Err(e) = res {
                        debug!(peer = %peer, error = %e, "http connection ended with error");
                    }
                }
                _ = shutdown.cancelled() => {
                    conn.as_mut().graceful_shutdown();
                    let _ = conn.await;
                }
            }
        });
    }
    tasks.close();
    tasks.wait().await;
}

/// Answer one client request through the tunnel
pub async fn handle<B>(router: &DomainRouter, request: Request<B>) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: Display,
{
    let Some(host) = request_host(&request) else {
        return error_response(StatusCode::NOT_FOUND, "missing host");
    };
    let route = match router.resolve(&host) {
        Ok(route) => route,
        Err(e) => {
            debug!(host = %host, "no route");
            return error_response(StatusCode::NOT_FOUND, e.to_string());
        }
    };

    let (parts, body) = request.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(host = %host, error = %e, "failed to read request body");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to read request body");
        }
    };
    let raw_request = raw::dump_request(&parts, &body);

    match route.forward(raw_request).await {
        Ok(reply) => relay(&host, reply),
        Err(burrow_fabric::Error::ReplyTimeout(after)) => {
            warn!(host = %host, connection = %route.connection(), ?after, "worker did not reply in time");
            error_response(StatusCode::GATEWAY_TIMEOUT, "worker did not reply in time")
        }
        Err(e) => {
            warn!(host = %host, connection = %route.connection(), error = %e, "tunnel request failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

fn relay(host: &str, reply: Arguments) -> Response<Full<Bytes>> {
    let code = match protocol::require_text(&reply, arg::STATUS) {
        Ok(code) => code,
        Err(e) => {
            warn!(host = %host, error = %e, "reply without status");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "malformed worker reply");
        }
    };
    if code != status::OK {
        let msg = reply
            .get(arg::MSG)
            .map(|m| String::from_utf8_lossy(m).into_owned())
            .unwrap_or_else(|| format!("worker failed with status {code}"));
        debug!(host = %host, status = %code, msg = %msg, "worker reported failure");
        return error_response(StatusCode::NOT_FOUND, msg);
    }

    let parsed = protocol::require(&reply, arg::RESP).and_then(raw::parse_response);
    match parsed {
        Ok(response) => response.map(Full::new),
        Err(e) => {
            warn!(host = %host, error = %e, "unreadable upstream response");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "malformed upstream response")
        }
    }
}

fn request_host<B>(request: &Request<B>) -> Option<String> {
    let host = match request.headers().get(HOST) {
        Some(value) => value.to_str().ok()?.to_string(),
        None => request.uri().authority()?.as_str().to_string(),
    };
    let host = protocol::normalize_domain(&host);
    (!host.is_empty()).then_some(host)
}

fn error_response(status: StatusCode, body: impl Into<String>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body.into())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        http::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
