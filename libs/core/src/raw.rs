//! HTTP/1.1 messages as raw bytes, the form they take inside envelopes.
//!
//! Bodies are always fully buffered: hop-by-hop headers are dropped and the
//! body length is written as `content-length`.

use bytes::Bytes;
use http::header::{CONTENT_LENGTH, HOST};
use http::{request, response, HeaderMap, HeaderValue, Method, Request, Response, StatusCode, Uri, Version};

use crate::error::{Error, Result};

const MAX_HEADERS: usize = 128;

const HOP_BY_HOP: [&str; 7] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub fn dump_request(parts: &request::Parts, body: &[u8]) -> Vec<u8> {
    let target = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let mut out = format!(
        "{} {} {}\r\n",
        parts.method,
        target,
        version_str(parts.version)
    )
    .into_bytes();
    write_head(&mut out, &parts.headers, body);
    out
}

pub fn dump_response(parts: &response::Parts, body: &[u8]) -> Vec<u8> {
    let mut out = format!(
        "{} {} {}\r\n",
        version_str(parts.version),
        parts.status.as_u16(),
        parts.status.canonical_reason().unwrap_or("")
    )
    .into_bytes();
    write_head(&mut out, &parts.headers, body);
    out
}

pub fn parse_request(bytes: &[u8]) -> Result<Request<Bytes>> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers);
    let head_len = match req
        .parse(bytes)
        .map_err(|e| Error::http(format!("invalid request head: {e}")))?
    {
        httparse::Status::Complete(len) => len,
        httparse::Status::Partial => return Err(Error::http("incomplete request head")),
    };

    let method = req.method.ok_or_else(|| Error::http("missing method"))?;
    let method = Method::from_bytes(method.as_bytes())
        .map_err(|e| Error::http(format!("invalid method: {e}")))?;
    let uri: Uri = req
        .path
        .ok_or_else(|| Error::http("missing request target"))?
        .parse()
        .map_err(|e| Error::http(format!("invalid request target: {e}")))?;

    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .version(parsed_version(req.version));
    for header in req.headers.iter() {
        builder = builder.header(header.name, header.value);
    }
    let mut request = builder
        .body(Bytes::new())
        .map_err(|e| Error::http(e.to_string()))?;

    *request.body_mut() = body_after(bytes, head_len, request.headers())?;
    Ok(request)
}

pub fn parse_response(bytes: &[u8]) -> Result<Response<Bytes>> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut resp = httparse::Response::new(&mut headers);
    let head_len = match resp
        .parse(bytes)
        .map_err(|e| Error::http(format!("invalid response head: {e}")))?
    {
        httparse::Status::Complete(len) => len,
        httparse::Status::Partial => return Err(Error::http("incomplete response head")),
    };

    let code = resp.code.ok_or_else(|| Error::http("missing status code"))?;
    let status = StatusCode::from_u16(code)
        .map_err(|e| Error::http(format!("invalid status code {code}: {e}")))?;

    let mut builder = Response::builder()
        .status(status)
        .version(parsed_version(resp.version));
    for header in resp.headers.iter() {
        builder = builder.header(header.name, header.value);
    }
    let mut response = builder
        .body(Bytes::new())
        .map_err(|e| Error::http(e.to_string()))?;

    *response.body_mut() = body_after(bytes, head_len, response.headers())?;
    Ok(response)
}

/// Point `request` at `authority`: absolute `http://` URI plus a matching `Host`
pub fn retarget(request: &mut Request<Bytes>, authority: &str) -> Result<()> {
    let path = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let uri: Uri = format!("http://{authority}{path}")
        .parse()
        .map_err(|e| Error::http(format!("invalid target {authority:?}: {e}")))?;
    let host = HeaderValue::from_str(authority)
        .map_err(|e| Error::http(format!("invalid host {authority:?}: {e}")))?;

    *request.uri_mut() = uri;
    request.headers_mut().insert(HOST, host);
    Ok(())
}

fn write_head(out: &mut Vec<u8>, headers: &HeaderMap, body: &[u8]) {
    for (name, value) in headers {
        if name == CONTENT_LENGTH || HOP_BY_HOP.contains(&name.as_str()) {
            continue;
        }
        out.extend_from_slice(name.as_str().as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    if !body.is_empty() {
        out.extend_from_slice(format!("content-length: {}\r\n", body.len()).as_bytes());
    }
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(body);
}

fn body_after(bytes: &[u8], head_len: usize, headers: &HeaderMap) -> Result<Bytes> {
    let rest = &bytes[head_len..];
    let declared = match headers.get(CONTENT_LENGTH) {
        Some(value) => Some(
            value
                .to_str()
                .ok()
                .and_then(|v| v.trim().parse::<usize>().ok())
                .ok_or_else(|| Error::http("invalid content-length"))?,
        ),
        None => None,
    };
    match declared {
        Some(len) if len > rest.len() => Err(Error::http(format!(
            "body has {} bytes, content-length says {len}",
            rest.len()
        ))),
        Some(len) => Ok(Bytes::copy_from_slice(&rest[..len])),
        None => Ok(Bytes::copy_from_slice(rest)),
    }
}

fn version_str(version: Version) -> &'static str {
    if version == Version::HTTP_10 {
        "HTTP/1.0"
    } else {
        "HTTP/1.1"
    }
}

fn parsed_version(minor: Option<u8>) -> Version {
    match minor {
        Some(0) => Version::HTTP_10,
        _ => Version::HTTP_11,
    }
}
