//! Line-oriented transport over stdin/stdout
//!
//! The cluster harness routes every message through the node's standard
//! streams. A single writer task owns stdout so concurrent senders never
//! interleave lines; sending only enqueues.

use crate::framing::EnvelopeCodec;
use crate::transport::{Inbound, MsgIds, Transport, TransportError};
use async_trait::async_trait;
use broadcast_core::{Envelope, NodeId, Payload};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, info, warn};

/// Transport over the process's standard streams
pub struct StdioTransport {
    local_id: NodeId,
    node_ids: Vec<NodeId>,
    outbound: mpsc::UnboundedSender<Envelope>,
    msg_ids: MsgIds,
}

impl StdioTransport {
    /// Run the `init` handshake on stdin/stdout and start the I/O tasks.
    pub async fn connect() -> Result<(Arc<Self>, Inbound), TransportError> {
        Self::connect_with(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Same as [`connect`](Self::connect) over arbitrary streams.
    pub async fn connect_with<R, W>(
        reader: R,
        writer: W,
    ) -> Result<(Arc<Self>, Inbound), TransportError>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut lines = FramedRead::new(reader, EnvelopeCodec::new());
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(FramedWrite::new(writer, EnvelopeCodec::new()), out_rx));

        let (request, node_id, node_ids) = loop {
            let env = match lines.next().await {
                None => {
                    return Err(TransportError::Handshake(
                        "input closed before init".to_string(),
                    ))
                }
                Some(Err(e)) => return Err(e.into()),
                Some(Ok(Err(e))) => {
                    warn!("Dropping {}", e);
                    continue;
                }
                Some(Ok(Ok(env))) => env,
            };

            let init = match &env.body.payload {
                Payload::Init { node_id, node_ids } => Some((node_id.clone(), node_ids.clone())),
                other => {
                    warn!("Dropping {} from {} before init", other.kind(), env.src);
                    None
                }
            };
            if let Some((node_id, node_ids)) = init {
                break (env, node_id, node_ids);
            }
        };

        info!("Initialized as {} ({} nodes in cluster)", node_id, node_ids.len());

        let transport = Arc::new(Self {
            local_id: node_id,
            node_ids,
            outbound: out_tx,
            msg_ids: MsgIds::default(),
        });
        transport.reply(&request, Payload::InitOk).await?;

        let (in_tx, in_rx) = mpsc::unbounded_channel();
        tokio::spawn(read_loop(lines, in_tx));

        Ok((transport, in_rx))
    }

    fn enqueue(&self, env: Envelope) -> Result<(), TransportError> {
        self.outbound
            .send(env)
            .map_err(|_| TransportError::ConnectionClosed)
    }
}

#[async_trait]
impl Transport for StdioTransport {
    fn local_id(&self) -> &NodeId {
        &self.local_id
    }

    fn node_ids(&self) -> &[NodeId] {
        &self.node_ids
    }

    async fn send(&self, dest: &NodeId, payload: Payload) -> Result<(), TransportError> {
        self.enqueue(self.msg_ids.envelope(&self.local_id, dest, None, payload))
    }

    async fn reply(&self, request: &Envelope, payload: Payload) -> Result<(), TransportError> {
        self.enqueue(self.msg_ids.envelope(
            &self.local_id,
            &request.src,
            request.body.msg_id,
            payload,
        ))
    }
}

async fn read_loop<R>(mut lines: FramedRead<R, EnvelopeCodec>, inbound: mpsc::UnboundedSender<Envelope>)
where
    R: AsyncRead + Unpin,
{
    while let Some(item) = lines.next().await {
        match item {
            Ok(Ok(env)) => {
                if matches!(env.body.payload, Payload::Init { .. }) {
                    warn!("Ignoring repeated init from {}", env.src);
                    continue;
                }
                if inbound.send(env).is_err() {
                    debug!("Inbound receiver dropped, stopping reader");
                    return;
                }
            }
            Ok(Err(e)) => warn!("Dropping {}", e),
            Err(e) => {
                error!("Input stream failed: {}", e);
                return;
            }
        }
    }
    info!("Input closed");
}

async fn write_loop<W>(mut sink: FramedWrite<W, EnvelopeCodec>, mut outbound: mpsc::UnboundedReceiver<Envelope>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(env) = outbound.recv().await {
        if let Err(e) = sink.send(env).await {
            error!("Output stream failed: {}", e);
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broadcast_core::Value;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    const INIT: &str = r#"{"src":"c0","dest":"n1","body":{"type":"init","msg_id":1,"node_id":"n1","node_ids":["n1","n2"]}}"#;

    #[tokio::test]
    async fn test_handshake_and_reply() {
        let (mut harness_in, node_in) = tokio::io::duplex(4096);
        let (node_out, harness_out) = tokio::io::duplex(4096);
        let mut harness_out = BufReader::new(harness_out).lines();

        harness_in.write_all(b"{\"src\":\"c0\",\"dest\":\"n1\",\"body\":{\"type\":\"read\"}}\n").await.unwrap();
        harness_in.write_all(INIT.as_bytes()).await.unwrap();
        harness_in.write_all(b"\n").await.unwrap();

        let (transport, mut inbound) = StdioTransport::connect_with(node_in, node_out).await.unwrap();
        assert_eq!(transport.local_id(), &NodeId::from("n1"));
        assert_eq!(transport.node_ids().len(), 2);

        let init_ok: serde_json::Value =
            serde_json::from_str(&harness_out.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(init_ok["body"]["type"], "init_ok");
        assert_eq!(init_ok["body"]["in_reply_to"], 1);
        assert_eq!(init_ok["dest"], "c0");

        // Garbage, a repeated init, then a real message
        harness_in.write_all(b"garbage\n").await.unwrap();
        harness_in.write_all(INIT.as_bytes()).await.unwrap();
        harness_in.write_all(b"\n").await.unwrap();
        harness_in
            .write_all(b"{\"src\":\"c1\",\"dest\":\"n1\",\"body\":{\"type\":\"broadcast\",\"msg_id\":4,\"message\":9}}\n")
            .await
            .unwrap();

        let env = inbound.recv().await.unwrap();
        assert_eq!(env.body.payload, Payload::Broadcast { message: Value::Int(9) });

        transport.reply(&env, Payload::BroadcastOk).await.unwrap();
        let ack: serde_json::Value =
            serde_json::from_str(&harness_out.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(ack["body"]["type"], "broadcast_ok");
        assert_eq!(ack["body"]["in_reply_to"], 4);
        assert_eq!(ack["src"], "n1");
    }

    #[tokio::test]
    async fn test_handshake_fails_on_closed_input() {
        let (harness_in, node_in) = tokio::io::duplex(64);
        drop(harness_in);
        let (node_out, _harness_out) = tokio::io::duplex(64);

        let result = StdioTransport::connect_with(node_in, node_out).await;
        assert!(matches!(result, Err(TransportError::Handshake(_))));
    }

    #[tokio::test]
    async fn test_inbound_closes_on_eof() {
        let (mut harness_in, node_in) = tokio::io::duplex(4096);
        let (node_out, _harness_out) = tokio::io::duplex(4096);

        harness_in.write_all(INIT.as_bytes()).await.unwrap();
        harness_in.write_all(b"\n").await.unwrap();
        let (_transport, mut inbound) = StdioTransport::connect_with(node_in, node_out).await.unwrap();

        drop(harness_in);
        assert!(inbound.recv().await.is_none());
    }
}
