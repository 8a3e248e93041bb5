//
// Copyright 2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! In-flight request records and sequence id generation.
//!
//! A [`Request`] is the inert record of one in-flight call: its sequence
//! id, logical name, pre-framed payload, receive deadline, timestamps, and
//! the single-shot callback pair that completes it. Sequence ids correlate
//! a request to its response and are unique for the lifetime of a client.

use crate::error::RequestError;
use crate::host::Connection;
use crate::protocol::Message;
use parking_lot::Mutex;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tracing::error;

/// A positive 31-bit sequence identifier correlating a request to its
/// response.
///
/// Sequence ids are carried on the wire inside the caller's pre-framed
/// payload and echoed back by the server in the response message. The top
/// bit is always zero; the value is never `0`.
///
/// # Examples
///
/// ```rust
/// use plexrpc::SequenceId;
///
/// let id = SequenceId::new(42).unwrap();
/// assert_eq!(id.get(), 42);
/// assert!(SequenceId::new(0).is_none());
/// assert!(SequenceId::new(-1).is_none());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SequenceId(i32);

impl SequenceId {
    /// Creates a sequence id from a raw wire value.
    ///
    /// Returns `None` unless the value is strictly positive, which also
    /// rejects any value with the top bit set.
    #[must_use]
    pub const fn new(value: i32) -> Option<Self> {
        if value > 0 { Some(Self(value)) } else { None }
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn get(self) -> i32 {
        self.0
    }
}

impl std::fmt::Display for SequenceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Seq({})", self.0)
    }
}

/// Generates unique sequence ids for request-response correlation.
///
/// Ids start at 1 and increment monotonically through an atomic counter
/// masked to 31 bits; after `i32::MAX` the sequence wraps back to 1,
/// skipping 0. The generator is lock-free and can be shared across tasks.
///
/// # Examples
///
/// ```rust
/// use plexrpc::SequenceIdGenerator;
///
/// let generator = SequenceIdGenerator::new();
/// let a = generator.next();
/// let b = generator.next();
/// assert_ne!(a, b);
/// assert!(a.get() > 0);
/// ```
#[derive(Debug)]
pub struct SequenceIdGenerator {
    counter: AtomicU32,
}

impl SequenceIdGenerator {
    /// Creates a new generator starting at 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            counter: AtomicU32::new(1),
        }
    }

    /// Allocates the next sequence id.
    ///
    /// The raw counter value is masked with `0x7fff_ffff`; a masked value
    /// of 0 (the wrap point) is skipped so that ids stay strictly
    /// positive.
    #[must_use]
    pub fn next(&self) -> SequenceId {
        loop {
            let raw = self.counter.fetch_add(1, Ordering::Relaxed);
            let masked = raw & 0x7fff_ffff;
            if masked != 0 {
                return SequenceId(masked as i32);
            }
        }
    }
}

impl Default for SequenceIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Result callback of a request.
pub type ResultFn<M> = Box<dyn FnOnce(M) + Send + 'static>;

/// Exception callback of a request.
pub type ExceptionFn = Box<dyn FnOnce(RequestError) + Send + 'static>;

struct Completion<M> {
    on_result: ResultFn<M>,
    on_exception: ExceptionFn,
}

/// Record of one in-flight call.
///
/// Requests are created through
/// [`Client::new_request`](crate::Client::new_request) and completed
/// exactly once: either the result callback fires with the correlated
/// response message, or the exception callback fires with a
/// [`RequestError`]. Both callbacks run on a spawned worker task, never on
/// a connection's I/O task or a timer task, and a panic inside either is
/// logged and swallowed.
pub struct Request<M: Message> {
    seq_id: SequenceId,
    name: String,
    payload: Vec<u8>,
    receive_timeout: Duration,
    allow_retry: bool,
    created_at: Instant,
    sent_at: Mutex<Option<Instant>>,
    send_connection: Mutex<Option<Arc<Connection<M>>>>,
    completion: Mutex<Option<Completion<M>>>,
}

impl<M: Message> Request<M> {
    pub(crate) fn new(
        seq_id: SequenceId,
        name: impl Into<String>,
        payload: Vec<u8>,
        receive_timeout: Duration,
        allow_retry: bool,
        on_result: ResultFn<M>,
        on_exception: ExceptionFn,
    ) -> Arc<Self> {
        Arc::new(Self {
            seq_id,
            name: name.into(),
            payload,
            receive_timeout,
            allow_retry,
            created_at: Instant::now(),
            sent_at: Mutex::new(None),
            send_connection: Mutex::new(None),
            completion: Mutex::new(Some(Completion {
                on_result,
                on_exception,
            })),
        })
    }

    /// Returns the sequence id of this request.
    #[must_use]
    pub fn seq_id(&self) -> SequenceId {
        self.seq_id
    }

    /// Returns the logical method name of this request.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the pre-framed payload bytes.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Returns `true` if a transient send failure may re-dispatch this
    /// request.
    #[must_use]
    pub fn allow_retry(&self) -> bool {
        self.allow_retry
    }

    /// Returns the per-request receive deadline.
    #[must_use]
    pub fn receive_timeout(&self) -> Duration {
        self.receive_timeout
    }

    /// Returns the time elapsed since this request was created.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Returns `true` if a completion callback has already been taken.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completion.lock().is_none()
    }

    /// Marks the send as complete, starting the receive deadline.
    pub(crate) fn mark_sent(&self) {
        *self.sent_at.lock() = Some(Instant::now());
    }

    /// Returns `true` if the request was sent and its receive deadline has
    /// passed at `now`.
    ///
    /// A request that is registered but whose send has not yet completed
    /// has no `sent_at` and never times out here.
    pub(crate) fn receive_deadline_passed(&self, now: Instant) -> bool {
        self.sent_at
            .lock()
            .is_some_and(|sent| now.saturating_duration_since(sent) >= self.receive_timeout)
    }

    /// Records the connection currently carrying this request.
    pub(crate) fn attach_connection(&self, conn: Arc<Connection<M>>) {
        *self.send_connection.lock() = Some(conn);
    }

    /// Clears and returns the carrying connection, if any.
    pub(crate) fn take_connection(&self) -> Option<Arc<Connection<M>>> {
        self.send_connection.lock().take()
    }

    /// Completes the request with a result message.
    ///
    /// Returns `false` if the request was already completed; the message is
    /// dropped in that case.
    pub(crate) fn complete_with_result(&self, message: M) -> bool {
        let Some(completion) = self.completion.lock().take() else {
            return false;
        };
        dispatch_user_callback("on_result", move || (completion.on_result)(message));
        true
    }

    /// Completes the request with a terminal error.
    ///
    /// Returns `false` if the request was already completed.
    pub(crate) fn complete_with_exception(&self, error: RequestError) -> bool {
        let Some(completion) = self.completion.lock().take() else {
            return false;
        };
        dispatch_user_callback("on_exception", move || (completion.on_exception)(error));
        true
    }
}

impl<M: Message> std::fmt::Debug for Request<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("seq_id", &self.seq_id)
            .field("name", &self.name)
            .field("payload_len", &self.payload.len())
            .field("allow_retry", &self.allow_retry)
            .field("completed", &self.is_completed())
            .finish()
    }
}

/// Runs a user-supplied callback on a spawned worker task.
///
/// A panic inside the callback is caught, logged, and swallowed; user bugs
/// must not take down an I/O or timer task. Outside a Tokio runtime (a
/// client dropped after its runtime) the callback runs inline with the
/// same panic containment.
pub(crate) fn dispatch_user_callback(context: &'static str, f: impl FnOnce() + Send + 'static) {
    let run = move || {
        if catch_unwind(AssertUnwindSafe(f)).is_err() {
            error!(callback = context, "user callback panicked; ignoring");
        }
    };
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move { run() });
        }
        Err(_) => run(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug)]
    struct TestMessage(SequenceId);

    impl Message for TestMessage {
        fn sequence_id(&self) -> SequenceId {
            self.0
        }
    }

    fn request(seq: i32) -> Arc<Request<TestMessage>> {
        Request::new(
            SequenceId::new(seq).unwrap(),
            "test",
            vec![1, 2, 3],
            Duration::from_millis(100),
            true,
            Box::new(|_| {}),
            Box::new(|_| {}),
        )
    }

    #[test]
    fn test_sequence_id_rejects_non_positive() {
        assert!(SequenceId::new(0).is_none());
        assert!(SequenceId::new(-5).is_none());
        assert!(SequenceId::new(i32::MIN).is_none());
        assert_eq!(SequenceId::new(i32::MAX).unwrap().get(), i32::MAX);
    }

    #[test]
    fn test_generator_starts_at_one() {
        let generator = SequenceIdGenerator::new();
        assert_eq!(generator.next().get(), 1);
        assert_eq!(generator.next().get(), 2);
    }

    #[test]
    fn test_generator_uniqueness() {
        let generator = SequenceIdGenerator::new();
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            let id = generator.next();
            assert!(id.get() > 0);
            assert!(seen.insert(id), "duplicate id {id}");
        }
    }

    #[test]
    fn test_generator_wraps_to_one() {
        let generator = SequenceIdGenerator {
            counter: AtomicU32::new(i32::MAX as u32),
        };
        assert_eq!(generator.next().get(), i32::MAX);
        // The masked wrap point (0) is skipped.
        assert_eq!(generator.next().get(), 1);
        assert_eq!(generator.next().get(), 2);
    }

    #[tokio::test]
    async fn test_generator_concurrent_uniqueness() {
        let generator = Arc::new(SequenceIdGenerator::new());
        let mut handles = vec![];
        for _ in 0..8 {
            let generator = generator.clone();
            handles.push(tokio::spawn(async move {
                (0..500).map(|_| generator.next()).collect::<Vec<_>>()
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.await.unwrap() {
                assert!(seen.insert(id), "duplicate id {id}");
            }
        }
        assert_eq!(seen.len(), 4000);
    }

    #[tokio::test]
    async fn test_request_completes_once() {
        static FIRED: AtomicUsize = AtomicUsize::new(0);

        let req = Request::<TestMessage>::new(
            SequenceId::new(7).unwrap(),
            "once",
            vec![],
            Duration::from_millis(100),
            true,
            Box::new(|_| {
                FIRED.fetch_add(1, Ordering::SeqCst);
            }),
            Box::new(|_| {
                FIRED.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert!(!req.is_completed());
        assert!(req.complete_with_result(TestMessage(SequenceId::new(7).unwrap())));
        assert!(req.is_completed());
        assert!(!req.complete_with_result(TestMessage(SequenceId::new(7).unwrap())));
        assert!(!req.complete_with_exception(RequestError::SendFailed {
            name: "once".to_string()
        }));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(FIRED.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exception_carries_name() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let tx = Mutex::new(Some(tx));
        let req = Request::<TestMessage>::new(
            SequenceId::new(9).unwrap(),
            "lookup",
            vec![],
            Duration::from_millis(100),
            false,
            Box::new(|_| {}),
            Box::new(move |err| {
                if let Some(tx) = tx.lock().take() {
                    let _ = tx.send(err);
                }
            }),
        );

        assert!(req.complete_with_exception(RequestError::SendFailed {
            name: req.name().to_string()
        }));
        let err = rx.await.unwrap();
        assert_eq!(err.name(), "lookup");
    }

    #[test]
    fn test_receive_deadline_requires_sent() {
        let req = request(1);
        let later = Instant::now() + Duration::from_secs(60);
        // Never sent: the deadline never passes.
        assert!(!req.receive_deadline_passed(later));

        req.mark_sent();
        assert!(!req.receive_deadline_passed(Instant::now()));
        assert!(req.receive_deadline_passed(later));
    }

    #[tokio::test]
    async fn test_callback_panic_is_swallowed() {
        let req = Request::<TestMessage>::new(
            SequenceId::new(3).unwrap(),
            "boom",
            vec![],
            Duration::from_millis(100),
            true,
            Box::new(|_| panic!("user bug")),
            Box::new(|_| {}),
        );

        assert!(req.complete_with_result(TestMessage(SequenceId::new(3).unwrap())));
        // The panic happens on a worker task and must not propagate.
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

// Made with Bob
