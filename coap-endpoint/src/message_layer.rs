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

//! Message-layer state: confirmable exchanges awaiting acknowledgement and
//! the deduplication window for incoming message ids.

use crate::message::{Message, MsgId, MsgType};
use crate::timer::TimerHandle;
use rand::Rng;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// State for one confirmable message in flight.
pub(crate) struct Exchange {
    /// The message as handed to the transport.
    pub message: Message,

    /// Encoded bytes; retransmissions resend these verbatim.
    pub data: Vec<u8>,

    pub remote: SocketAddr,

    /// Number of retransmissions performed so far.
    pub attempt: u32,

    /// Delay until the next retransmission timer fires; doubles after every
    /// retransmission.
    pub backoff: Duration,

    pub retransmit_timer: Option<TimerHandle>,
}

/// Record of a recently received CON or NON message id, keyed by
/// `(mid, remote)`.
pub(crate) struct DedupRecord {
    pub mtype: MsgType,
    pub received_at: Instant,

    /// Encoded response already emitted for this message, if any. Duplicates
    /// are answered with these bytes verbatim.
    pub response: Option<Vec<u8>>,
}

/// Result of checking an incoming CON/NON against the dedup window.
pub(crate) enum DedupStatus {
    /// First sighting; a record was created and the message should be
    /// delivered upward.
    New,

    /// Already seen. Carries the stored response bytes to replay, if a
    /// response was attached.
    Duplicate(Option<Vec<u8>>),
}

/// Outcome of a retransmission timer firing.
pub(crate) enum RetransmitAction {
    /// Resend `data` and reschedule after `next_backoff`.
    Resend {
        data: Vec<u8>,
        remote: SocketAddr,
        next_backoff: Duration,
    },

    /// The retransmission budget is exhausted; the exchange was removed.
    GiveUp { message: Message, remote: SocketAddr },

    /// No such exchange (already acknowledged or cancelled).
    Unknown,
}

/// Tables backing the message layer.
pub(crate) struct MessageLayer {
    /// Confirmable messages in flight that we originated, keyed by mid.
    pub(crate) active_exchanges: HashMap<MsgId, Exchange>,

    /// Dedup window for received CON/NON messages.
    pub(crate) recent_remote_ids: HashMap<(MsgId, SocketAddr), DedupRecord>,

    next_msg_id: MsgId,
}

impl MessageLayer {
    pub fn new() -> MessageLayer {
        MessageLayer {
            active_exchanges: HashMap::new(),
            recent_remote_ids: HashMap::new(),
            next_msg_id: rand::thread_rng().gen(),
        }
    }

    /// Returns the next message id. Ids increase monotonically and wrap;
    /// the initial value is random.
    pub fn next_msg_id(&mut self) -> MsgId {
        let mid = self.next_msg_id;
        self.next_msg_id = self.next_msg_id.wrapping_add(1);
        mid
    }

    /// Inserts a confirmable exchange. The retransmission timer handle is
    /// attached separately once scheduled.
    pub fn register_exchange(
        &mut self,
        mid: MsgId,
        message: Message,
        data: Vec<u8>,
        remote: SocketAddr,
        backoff: Duration,
    ) {
        self.active_exchanges.insert(
            mid,
            Exchange {
                message,
                data,
                remote,
                attempt: 0,
                backoff,
                retransmit_timer: None,
            },
        );
    }

    /// Attaches the current retransmission timer handle to an exchange.
    pub fn set_retransmit_timer(&mut self, mid: MsgId, timer: TimerHandle) {
        if let Some(exchange) = self.active_exchanges.get_mut(&mid) {
            exchange.retransmit_timer = Some(timer);
        }
    }

    /// Removes and returns the exchange for `mid`, if any.
    pub fn take_exchange(&mut self, mid: MsgId) -> Option<Exchange> {
        self.active_exchanges.remove(&mid)
    }

    /// Advances the retransmission state machine for `mid`.
    ///
    /// While fewer than `max_retransmit` retransmissions have happened, the
    /// attempt counter advances, the backoff doubles, and the caller is told
    /// to resend; on the firing after the last retransmission the exchange is
    /// removed and the caller is told to give up.
    pub fn retransmit(&mut self, mid: MsgId, max_retransmit: u32) -> RetransmitAction {
        let exhausted = match self.active_exchanges.get(&mid) {
            Some(exchange) => exchange.attempt >= max_retransmit,
            None => return RetransmitAction::Unknown,
        };

        if exhausted {
            match self.active_exchanges.remove(&mid) {
                Some(exchange) => RetransmitAction::GiveUp {
                    message: exchange.message,
                    remote: exchange.remote,
                },
                None => RetransmitAction::Unknown,
            }
        } else {
            match self.active_exchanges.get_mut(&mid) {
                Some(exchange) => {
                    exchange.attempt += 1;
                    exchange.backoff *= 2;
                    RetransmitAction::Resend {
                        data: exchange.data.clone(),
                        remote: exchange.remote,
                        next_backoff: exchange.backoff,
                    }
                }
                None => RetransmitAction::Unknown,
            }
        }
    }

    /// Checks an incoming CON/NON against the dedup window, inserting a
    /// record on first sight.
    pub fn note_incoming(&mut self, mid: MsgId, remote: SocketAddr, mtype: MsgType) -> DedupStatus {
        if let Some(record) = self.recent_remote_ids.get(&(mid, remote)) {
            return DedupStatus::Duplicate(record.response.clone());
        }

        self.recent_remote_ids.insert(
            (mid, remote),
            DedupRecord {
                mtype,
                received_at: Instant::now(),
                response: None,
            },
        );
        DedupStatus::New
    }

    /// Stores the encoded response emitted for `(mid, remote)` so that
    /// duplicates can be answered without re-entering the application.
    /// Returns false if the record is gone.
    pub fn attach_response(&mut self, mid: MsgId, remote: SocketAddr, data: Vec<u8>) -> bool {
        match self.recent_remote_ids.get_mut(&(mid, remote)) {
            Some(record) => {
                record.response = Some(data);
                true
            }
            None => false,
        }
    }

    /// True if `(mid, remote)` is still awaiting its first response, i.e. a
    /// delayed empty ACK would not duplicate one already sent.
    pub fn needs_separate_ack(&self, mid: MsgId, remote: SocketAddr) -> bool {
        match self.recent_remote_ids.get(&(mid, remote)) {
            Some(record) => record.response.is_none(),
            None => false,
        }
    }

    /// Drops the dedup record for `(mid, remote)` once its lifetime elapsed.
    pub fn evict(&mut self, mid: MsgId, remote: SocketAddr) {
        if let Some(record) = self.recent_remote_ids.remove(&(mid, remote)) {
            log::debug!(
                "Evicting {:?} dedup record for mid {:04X} after {:?}",
                record.mtype,
                mid,
                record.received_at.elapsed()
            );
        }
    }
}
