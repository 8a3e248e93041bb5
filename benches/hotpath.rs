//! Hot-path benchmarks for plexrpc.
//!
//! Measures the lock-free fast paths (sequence id allocation, round-robin
//! pool acquire) and the full request round-trip over the in-memory host.

use criterion::{Criterion, criterion_group, criterion_main};
use plexrpc::{
    Client, ClientConfig, Connection, ConnectionEvents, ConnectionHost, ConnectionPool,
    MemoryHost, Message, MultiplexPool, Protocol, ProtocolError, Request, SequenceId,
    SequenceIdGenerator, TransportError,
};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
struct Frame {
    seq: SequenceId,
    #[allow(dead_code)]
    body: Vec<u8>,
}

impl Message for Frame {
    fn sequence_id(&self) -> SequenceId {
        self.seq
    }
}

struct FrameProtocol;

impl Protocol for FrameProtocol {
    type Message = Frame;

    fn is_async(&self) -> bool {
        true
    }

    fn parse(
        &self,
        _conn: &Connection<Frame>,
        buffer: &[u8],
    ) -> Result<(Option<Frame>, usize), ProtocolError> {
        if buffer.len() < 8 {
            return Ok((None, 0));
        }
        let len = u32::from_be_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]) as usize;
        if len < 4 {
            return Err(ProtocolError::new("frame length below header size"));
        }
        if buffer.len() < 4 + len {
            return Ok((None, 0));
        }
        let raw = i32::from_be_bytes([buffer[4], buffer[5], buffer[6], buffer[7]]);
        let seq = SequenceId::new(raw).ok_or_else(|| ProtocolError::new("bad sequence id"))?;
        let body = buffer[8..4 + len].to_vec();
        Ok((Some(Frame { seq, body }), 4 + len))
    }
}

fn frame(seq: SequenceId, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + body.len());
    out.extend_from_slice(&((body.len() as u32 + 4).to_be_bytes()));
    out.extend_from_slice(&seq.get().to_be_bytes());
    out.extend_from_slice(body);
    out
}

struct Quiet;

impl ConnectionEvents<Frame> for Quiet {
    fn on_connected(&self, _conn: &Arc<Connection<Frame>>) {}
    fn on_start_sending(&self, _conn: &Arc<Connection<Frame>>, _request: &Arc<Request<Frame>>) {}
    fn on_send_complete(
        &self,
        _conn: &Arc<Connection<Frame>>,
        _request: &Arc<Request<Frame>>,
        _ok: bool,
    ) {
    }
    fn on_message_received(&self, _conn: &Arc<Connection<Frame>>, buffer: &[u8]) -> usize {
        buffer.len()
    }
    fn on_disconnected(&self, _conn: &Arc<Connection<Frame>>, _error: Option<TransportError>) {}
}

fn bench_sequence_ids(c: &mut Criterion) {
    let generator = SequenceIdGenerator::new();
    c.bench_function("sequence_id_next", |b| b.iter(|| generator.next()));
}

fn bench_pool_acquire(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let pool = MultiplexPool::new();
    rt.block_on(async {
        let host = MemoryHost::<Frame>::new();
        for i in 0..4 {
            let conn = host
                .connect(&format!("node-{i}"), Arc::new(Quiet))
                .await
                .unwrap();
            pool.register(conn);
        }
    });

    c.bench_function("multiplex_try_acquire", |b| {
        b.iter(|| pool.try_acquire().unwrap())
    });
}

fn bench_call_roundtrip(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let client = rt.block_on(async {
        let host = MemoryHost::<Frame>::new();
        let client = Client::new(FrameProtocol, host.clone(), ClientConfig::default());
        assert!(client.try_register_endpoint("alpha", "node-a", None));
        let peer = host.accept().await.unwrap();
        while client.connection_count() < 1 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        tokio::spawn(async move {
            while let Some(sent) = peer.sent().await {
                peer.inject(sent);
            }
        });
        client
    });

    c.bench_function("memory_call_roundtrip", |b| {
        b.to_async(&rt).iter(|| async {
            client
                .call("echo", |seq| frame(seq, b"ping"))
                .await
                .unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_sequence_ids,
    bench_pool_acquire,
    bench_call_roundtrip
);
criterion_main!(benches);
