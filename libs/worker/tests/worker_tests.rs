use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;

use burrow_core::protocol::{arg, op, status, COMPONENT};
use burrow_core::raw;
use burrow_fabric::codec::{Codec, JsonCodec};
use burrow_fabric::transport::{FrameReader, FrameWriter, TcpTransportListener};
use burrow_fabric::Envelope;
use burrow_worker::{Worker, WorkerConfig, WorkerHandle};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;

/// Origin answering "{METHOD} {PATH} host={HOST}: {BODY}"
async fn start_origin() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let handler = |req: Request<hyper::body::Incoming>| async move {
                    let method = req.method().clone();
                    let path = req.uri().path().to_string();
                    let host = req
                        .headers()
                        .get("host")
                        .and_then(|h| h.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    let body = req.collect().await.unwrap().to_bytes();
                    let text = format!(
                        "{method} {path} host={host}: {}",
                        String::from_utf8_lossy(&body)
                    );
                    Ok::<_, Infallible>(Response::new(Full::new(Bytes::from(text))))
                };
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service_fn(handler))
                    .await;
            });
        }
    });
    addr
}

/// An address nothing is listening on
async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

struct FakeProxy {
    reader: FrameReader<OwnedReadHalf>,
    writer: FrameWriter<OwnedWriteHalf>,
    worker: WorkerHandle,
}

impl FakeProxy {
    async fn recv(&mut self) -> Envelope {
        let frame = tokio::time::timeout(Duration::from_secs(5), self.reader.read_frame())
            .await
            .expect("worker sent nothing")
            .unwrap();
        JsonCodec.decode(&frame).unwrap()
    }

    async fn send(&mut self, envelope: Envelope) {
        self.writer
            .write_frame(&JsonCodec.encode(&envelope).unwrap())
            .await
            .unwrap();
    }
}

/// Start a worker against a one-shot listener and accept its connection
async fn connect_worker(target: SocketAddr) -> FakeProxy {
    let listener = TcpTransportListener::bind("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let config = WorkerConfig {
        server: listener.local_addr().unwrap(),
        domain: "a.test".to_string(),
        target: target.to_string(),
        ..WorkerConfig::default()
    };

    let connecting = tokio::spawn(Worker::connect(config));
    let (transport, _) = listener.accept().await.unwrap();
    let worker = connecting.await.unwrap().unwrap();
    let handle = worker.handle();
    tokio::spawn(worker.run());

    let (reader, writer) = transport.into_split();
    FakeProxy {
        reader,
        writer,
        worker: handle,
    }
}

fn http_request(raw_request: &[u8], id: u32) -> Envelope {
    Envelope::new(COMPONENT, op::HTTP_REQUEST)
        .with_arg(arg::DOMAIN, "a.test")
        .with_arg(arg::REQUEST, raw_request)
        .with_arg(arg::REQUEST_ID, id.to_le_bytes().to_vec())
}

#[tokio::test]
async fn worker_registers_its_domain_first() {
    let mut proxy = connect_worker(closed_port().await).await;

    let register = proxy.recv().await;

    assert_eq!(register.component, COMPONENT);
    assert_eq!(register.operation, op::REGISTER);
    assert_eq!(register.arg(arg::DOMAIN), Some(&b"a.test"[..]));
}

#[tokio::test]
async fn request_is_replayed_against_the_target() {
    let origin = start_origin().await;
    let mut proxy = connect_worker(origin).await;
    proxy.recv().await;

    let raw_request = b"POST /submit HTTP/1.1\r\nhost: a.test\r\ncontent-length: 4\r\n\r\nping";
    proxy.send(http_request(raw_request, 7)).await;
    let reply = proxy.recv().await;

    assert_eq!(reply.operation, op::HTTP_RESPONSE);
    assert_eq!(reply.arg(arg::STATUS), Some(status::OK.as_bytes()));
    assert_eq!(reply.arg(arg::DOMAIN), Some(&b"a.test"[..]));
    assert_eq!(reply.arg(arg::REQUEST_ID), Some(&7u32.to_le_bytes()[..]));
    assert!(reply.arg(arg::REQUEST).is_none());

    let response = raw::parse_response(reply.arg(arg::RESP).unwrap()).unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.body().as_ref(),
        format!("POST /submit host={origin}: ping").as_bytes()
    );
}

#[tokio::test]
async fn concurrent_requests_keep_their_ids() {
    let origin = start_origin().await;
    let mut proxy = connect_worker(origin).await;
    proxy.recv().await;

    for id in 1..=5u32 {
        let raw_request = format!("GET /item/{id} HTTP/1.1\r\nhost: a.test\r\n\r\n");
        proxy.send(http_request(raw_request.as_bytes(), id)).await;
    }

    for _ in 1..=5 {
        let reply = proxy.recv().await;
        let id = u32::from_le_bytes(reply.arg(arg::REQUEST_ID).unwrap().try_into().unwrap());
        let response = raw::parse_response(reply.arg(arg::RESP).unwrap()).unwrap();
        let body = String::from_utf8(response.body().to_vec()).unwrap();
        assert!(body.starts_with(&format!("GET /item/{id} ")), "{id}: {body}");
    }
}

#[tokio::test]
async fn missing_request_is_a_bad_request() {
    let mut proxy = connect_worker(closed_port().await).await;
    proxy.recv().await;

    proxy
        .send(
            Envelope::new(COMPONENT, op::HTTP_REQUEST)
                .with_arg(arg::DOMAIN, "a.test")
                .with_arg(arg::REQUEST_ID, 3u32.to_le_bytes().to_vec()),
        )
        .await;
    let reply = proxy.recv().await;

    assert_eq!(reply.arg(arg::STATUS), Some(status::BAD_REQUEST.as_bytes()));
    assert_eq!(reply.arg(arg::REQUEST_ID), Some(&3u32.to_le_bytes()[..]));
    assert!(reply.arg(arg::MSG).is_some());
    assert!(reply.arg(arg::RESP).is_none());
}

#[tokio::test]
async fn unparsable_request_is_a_bad_request() {
    let mut proxy = connect_worker(closed_port().await).await;
    proxy.recv().await;

    proxy.send(http_request(b"\x00\x01 not http", 4)).await;
    let reply = proxy.recv().await;

    assert_eq!(reply.arg(arg::STATUS), Some(status::BAD_REQUEST.as_bytes()));
    assert_eq!(reply.arg(arg::REQUEST_ID), Some(&4u32.to_le_bytes()[..]));
}

#[tokio::test]
async fn unreachable_target_fails() {
    let mut proxy = connect_worker(closed_port().await).await;
    proxy.recv().await;

    proxy
        .send(http_request(b"GET / HTTP/1.1\r\nhost: a.test\r\n\r\n", 5))
        .await;
    let reply = proxy.recv().await;

    assert_eq!(reply.arg(arg::STATUS), Some(status::FAILED.as_bytes()));
    assert_eq!(reply.arg(arg::DOMAIN), Some(&b"a.test"[..]));
    assert!(reply.arg(arg::MSG).is_some());
}

#[tokio::test]
async fn console_lines_reach_the_proxy_as_messages() {
    let mut proxy = connect_worker(closed_port().await).await;
    proxy.recv().await;

    proxy.worker.message("hello from the worker").await.unwrap();
    let message = proxy.recv().await;

    assert_eq!(message.operation, op::MESSAGE);
    assert_eq!(message.arg(arg::MSG), Some(&b"hello from the worker"[..]));
}

#[tokio::test]
async fn closing_the_worker_ends_the_tunnel() {
    let mut proxy = connect_worker(closed_port().await).await;
    proxy.recv().await;

    proxy.worker.close().await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), proxy.reader.read_frame())
        .await
        .expect("tunnel stayed open");
    assert!(matches!(result, Err(burrow_fabric::Error::ConnectionClosed)));
}
