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

//! Pending-send queue.
//!
//! Requests submitted while no connection is available wait here in FIFO
//! order. A periodic tick drains a bounded batch — the queue length
//! observed at the start of the tick — and re-dispatches each entry that
//! is still younger than the send timeout. A re-dispatched request whose
//! acquire fails again simply re-enters the queue, so a single tick can
//! grow the queue but never spins on it; progress arrives with the next
//! connection registration.

use crate::protocol::Message;
use crate::request::Request;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// FIFO of requests waiting for a connection.
pub(crate) struct PendingQueue<M: Message> {
    queue: Mutex<VecDeque<Arc<Request<M>>>>,
}

impl<M: Message> PendingQueue<M> {
    pub(crate) fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Appends `request` to the back of the queue.
    pub(crate) fn push(&self, request: Arc<Request<M>>) {
        self.queue.lock().push_back(request);
    }

    /// Removes and returns the request at the front of the queue.
    pub(crate) fn pop(&self) -> Option<Arc<Request<M>>> {
        self.queue.lock().pop_front()
    }

    /// Removes and returns every queued request.
    pub(crate) fn drain(&self) -> Vec<Arc<Request<M>>> {
        self.queue.lock().drain(..).collect()
    }

    /// Returns the number of queued requests.
    pub(crate) fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Returns `true` if the queue is empty.
    pub(crate) fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

impl<M: Message> std::fmt::Debug for PendingQueue<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingQueue")
            .field("queued", &self.len())
            .finish()
    }
}


// Made with Bob
