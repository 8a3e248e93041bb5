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

//! Registry of requests awaiting responses.
//!
//! The receiving registry maps sequence ids to in-flight requests. A
//! request is registered when it is handed to a connection for sending and
//! removed either by the response that correlates back to it, by a send
//! failure, or by the periodic receive-timeout sweep. Removal is atomic
//! and is the linearization point of the completion-once guarantee:
//! whichever path removes the entry owns the completion.

use crate::protocol::Message;
use crate::request::{Request, SequenceId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Maps sequence ids to requests awaiting their responses.
pub(crate) struct ReceivingRegistry<M: Message> {
    entries: Mutex<HashMap<SequenceId, Arc<Request<M>>>>,
}

impl<M: Message> ReceivingRegistry<M> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Registers `request` under its sequence id.
    ///
    /// Returns `false` if an entry with the same id already exists; the
    /// existing entry is left untouched.
    pub(crate) fn try_add(&self, request: &Arc<Request<M>>) -> bool {
        let mut entries = self.entries.lock();
        if entries.contains_key(&request.seq_id()) {
            return false;
        }
        entries.insert(request.seq_id(), request.clone());
        true
    }

    /// Atomically removes and returns the request registered under `id`.
    pub(crate) fn try_remove(&self, id: SequenceId) -> Option<Arc<Request<M>>> {
        self.entries.lock().remove(&id)
    }

    /// Removes and returns every request whose receive deadline has passed.
    ///
    /// Requests that are registered but whose send has not completed carry
    /// no sent timestamp and are left alone.
    pub(crate) fn take_expired(&self, now: Instant) -> Vec<Arc<Request<M>>> {
        let mut entries = self.entries.lock();
        let expired: Vec<SequenceId> = entries
            .iter()
            .filter(|(_, request)| request.receive_deadline_passed(now))
            .map(|(id, _)| *id)
            .collect();
        expired
            .into_iter()
            .filter_map(|id| entries.remove(&id))
            .collect()
    }

    /// Removes and returns every registered request.
    pub(crate) fn drain(&self) -> Vec<Arc<Request<M>>> {
        self.entries.lock().drain().map(|(_, request)| request).collect()
    }

    /// Returns the number of in-flight requests.
    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if no requests are awaiting responses.
    pub(crate) fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl<M: Message> std::fmt::Debug for ReceivingRegistry<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceivingRegistry")
            .field("in_flight", &self.len())
            .finish()
    }
}


// Made with Bob
