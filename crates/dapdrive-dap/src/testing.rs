//! In-memory stand-in for a debug adapter, used by unit tests.

use serde_json::{json, Value};
use tokio::io::{AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};

use crate::codec::{encode_message, FrameReader};
use crate::protocol::{ProtocolMessage, Request};

/// The adapter end of a `tokio::io::duplex` pair.
pub(crate) struct FakeAdapter {
    reader: FrameReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
    seq: i64,
}

impl FakeAdapter {
    pub(crate) fn new(stream: DuplexStream) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: FrameReader::new(reader),
            writer,
            seq: 0,
        }
    }

    /// Read the next request from the client, or `None` once it hung up.
    pub(crate) async fn next_request(&mut self) -> Option<Request> {
        let value = self.reader.read_message().await.ok()?;
        match ProtocolMessage::from_value(value).expect("client sent a valid message") {
            ProtocolMessage::Request(req) => Some(req),
            other => panic!("client sent a non-request: {other:?}"),
        }
    }

    /// Read the next request and check its command.
    pub(crate) async fn expect(&mut self, command: &str) -> Request {
        let req = self
            .next_request()
            .await
            .unwrap_or_else(|| panic!("client hung up before sending {command}"));
        assert_eq!(req.command, command, "unexpected request order");
        req
    }

    pub(crate) async fn respond(&mut self, req: &Request, body: Value) {
        self.send(json!({
            "type": "response",
            "request_seq": req.seq,
            "success": true,
            "command": req.command,
            "body": body,
        }))
        .await;
    }

    pub(crate) async fn fail(&mut self, req: &Request, message: &str) {
        self.send(json!({
            "type": "response",
            "request_seq": req.seq,
            "success": false,
            "command": req.command,
            "message": message,
        }))
        .await;
    }

    pub(crate) async fn event(&mut self, name: &str, body: Value) {
        self.send(json!({"type": "event", "event": name, "body": body}))
            .await;
    }

    async fn send(&mut self, mut doc: Value) {
        self.seq += 1;
        doc["seq"] = json!(self.seq);
        let bytes = encode_message(&doc).expect("encodable test message");
        // The client may already be gone in teardown paths.
        let _ = self.writer.write_all(&bytes).await;
    }
}
