// Copyright 2019 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Transaction-layer state: outstanding requests awaiting a response,
//! keyed by `(token, remote)`.

use crate::message::{Message, MsgToken};
use crate::timer::TimerHandle;
use std::collections::HashMap;
use std::net::SocketAddr;

/// Outcome delivered to a request's completion callback.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TransactionResult {
    /// A matching response arrived.
    Success,

    /// The peer answered with a reset message.
    Reset,

    /// No response arrived within the request's timeout, or the message
    /// layer exhausted its retransmission budget.
    Timeout,

    /// The request was cancelled locally.
    Cancelled,
}

/// Completion callback for a request: receives the outcome, the request as
/// sent, and the response for `Success` outcomes.
///
/// Each callback is invoked at most once; `FnOnce` makes that structural.
pub type ResponseCallback = Box<dyn FnOnce(TransactionResult, &Message, Option<&Message>) + Send>;

/// One outstanding request with a completion callback.
pub(crate) struct PendingRequest {
    pub request: Message,
    pub callback: ResponseCallback,
    pub timeout_timer: Option<TimerHandle>,
}

impl PendingRequest {
    /// Disarms the timeout timer and invokes the callback, consuming the
    /// record.
    pub fn complete(self, result: TransactionResult, response: Option<&Message>) {
        if let Some(timer) = self.timeout_timer {
            timer.cancel();
        }
        (self.callback)(result, &self.request, response);
    }
}

/// Table of outstanding requests.
pub(crate) struct TransactionLayer {
    pub(crate) outgoing_requests: HashMap<(MsgToken, SocketAddr), PendingRequest>,
}

impl TransactionLayer {
    pub fn new() -> TransactionLayer {
        TransactionLayer {
            outgoing_requests: HashMap::new(),
        }
    }

    /// Registers an outstanding request. A second request with the same
    /// token and remote replaces the first.
    pub fn register(&mut self, token: MsgToken, remote: SocketAddr, pending: PendingRequest) {
        self.outgoing_requests.insert((token, remote), pending);
    }

    /// Removes and returns the record matching `(token, remote)`, if any.
    pub fn take(&mut self, token: &MsgToken, remote: SocketAddr) -> Option<PendingRequest> {
        self.outgoing_requests.remove(&(*token, remote))
    }

    /// True if a request with this token and remote is outstanding.
    pub fn contains(&self, token: &MsgToken, remote: SocketAddr) -> bool {
        self.outgoing_requests.contains_key(&(*token, remote))
    }
}
