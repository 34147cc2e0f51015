//! Names and argument encodings shared by the server and the worker.

use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Component every tunnel operation is addressed to
pub const COMPONENT: &str = "tcpWorker";

/// Text of the diagnostic message sent to a freshly accepted worker
pub const GREETING: &str = "show me domain";

pub mod op {
    /// worker -> server: serve `domain`
    pub const REGISTER: &str = "Register";
    /// either direction: free text in `msg`
    pub const MESSAGE: &str = "Message";
    /// server -> worker: `domain`, `request`, `requestId`
    pub const HTTP_REQUEST: &str = "HttpRequest";
    /// worker -> server: echoes `domain` and `requestId`, adds `status` and `resp` or `msg`
    pub const HTTP_RESPONSE: &str = "HttpResponse";
}

pub mod arg {
    pub const DOMAIN: &str = "domain";
    pub const MSG: &str = "msg";
    pub const REQUEST: &str = "request";
    pub const REQUEST_ID: &str = "requestId";
    pub const STATUS: &str = "status";
    pub const RESP: &str = "resp";
}

/// Values of the `status` argument on `HttpResponse`
pub mod status {
    pub const OK: &str = "200";
    pub const BAD_REQUEST: &str = "400";
    pub const FAILED: &str = "500";
}

pub fn encode_request_id(id: u32) -> Vec<u8> {
    id.to_le_bytes().to_vec()
}

pub fn decode_request_id(bytes: &[u8]) -> Result<u32> {
    let bytes: [u8; 4] = bytes
        .try_into()
        .map_err(|_| Error::RequestId(bytes.len()))?;
    Ok(u32::from_le_bytes(bytes))
}

/// Look up a required argument
pub fn require<'a>(arguments: &'a BTreeMap<String, Vec<u8>>, key: &'static str) -> Result<&'a [u8]> {
    arguments
        .get(key)
        .map(Vec::as_slice)
        .ok_or(Error::MissingArgument(key))
}

/// Look up a required argument as (lossy) UTF-8 text
pub fn require_text(arguments: &BTreeMap<String, Vec<u8>>, key: &'static str) -> Result<String> {
    require(arguments, key).map(|bytes| String::from_utf8_lossy(bytes).into_owned())
}

/// Canonical form used to compare domains and `Host` headers
pub fn normalize_domain(domain: &str) -> String {
    domain.trim().to_ascii_lowercase()
}
