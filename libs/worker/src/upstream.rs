use bytes::Bytes;
use http::{Request, Response, Uri};
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{Error, Result};

/// Perform one HTTP/1.1 exchange against the authority in `request`'s URI
///
/// A fresh connection is opened per call and the response body is fully
/// buffered.
pub async fn call(request: Request<Bytes>) -> Result<Response<Bytes>> {
    let authority = request
        .uri()
        .authority()
        .ok_or_else(|| Error::upstream(format!("request has no target: {}", request.uri())))?
        .to_string();

    let stream = TcpStream::connect(authority.as_str())
        .await
        .map_err(|e| Error::upstream(format!("failed to connect to {authority}: {e}")))?;
    let (mut sender, conn) = http1::handshake(TokioIo::new(stream))
        .await
        .map_err(|e| Error::upstream(format!("handshake with {authority} failed: {e}")))?;
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "upstream connection ended with error");
        }
    });

    let (mut parts, body) = request.into_parts();
    parts.uri = origin_form(&parts.uri);
    let response = sender
        .send_request(Request::from_parts(parts, Full::new(body)))
        .await
        .map_err(|e| Error::upstream(format!("request to {authority} failed: {e}")))?;

    let (parts, body) = response.into_parts();
    let body = body
        .collect()
        .await
        .map_err(|e| Error::upstream(format!("failed to read response from {authority}: {e}")))?
        .to_bytes();
    Ok(Response::from_parts(parts, body))
}

fn origin_form(uri: &Uri) -> Uri {
    uri.path_and_query()
        .map(|pq| Uri::from(pq.clone()))
        .unwrap_or_else(|| Uri::from_static("/"))
}
