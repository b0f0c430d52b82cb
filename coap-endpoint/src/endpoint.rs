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

//! The endpoint composition root: binds a transport to the message layer and
//! the transaction layer.

use crate::consts::MAX_TOKEN_LENGTH;
use crate::error::Error;
use crate::handler::{RequestHandler, RequestOutcome};
use crate::message::{random_token, Message, MsgCode, MsgId, MsgToken, MsgType};
use crate::message_layer::{DedupStatus, MessageLayer, RetransmitAction};
use crate::timer::{Timer, TimerHandle};
use crate::trans_params::{StandardCoapParams, TransParams};
use crate::transaction_layer::{PendingRequest, ResponseCallback, TransactionLayer, TransactionResult};
use crate::transport::{Transport, TransportReceiver};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

/// A CoAP endpoint.
///
/// A `Coap` serves resources through a registered [`RequestHandler`] and
/// issues requests through [`request`](Coap::request), both over the same
/// [`Transport`]. Inbound datagrams pass the message layer (deduplication,
/// ACK/RST routing) and are then dispatched either to the request handler or
/// to the transaction layer's response matching.
///
/// All engine state lives behind one mutex; completion callbacks and request
/// handlers are invoked outside of it, so they are free to call back into the
/// endpoint.
pub struct Coap {
    inner: Arc<CoapInner>,
}

struct CoapState {
    message_layer: MessageLayer,
    transaction_layer: TransactionLayer,
    request_handler: Option<Arc<dyn RequestHandler>>,
}

struct CoapInner {
    weak_self: Weak<CoapInner>,
    transport: Arc<dyn Transport>,
    timer: Timer,
    trans_params: StandardCoapParams,
    state: Mutex<CoapState>,
}

impl Coap {
    /// Creates a new endpoint over `transport` and registers itself as a
    /// receiver of the transport's inbound datagrams.
    pub fn new(transport: Arc<dyn Transport>) -> Coap {
        let inner = Arc::new_cyclic(|weak_self| CoapInner {
            weak_self: weak_self.clone(),
            transport,
            timer: Timer::new(),
            trans_params: StandardCoapParams,
            state: Mutex::new(CoapState {
                message_layer: MessageLayer::new(),
                transaction_layer: TransactionLayer::new(),
                request_handler: None,
            }),
        });

        let receiver: Arc<dyn TransportReceiver> = inner.clone();
        inner.transport.register_receiver(&receiver);

        Coap { inner }
    }

    /// Borrows the transport this endpoint sends through.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.inner.transport
    }

    /// Registers the handler for incoming requests, replacing any previous
    /// one.
    pub fn register_request_handler(&self, handler: Arc<dyn RequestHandler>) {
        self.inner.lock_state().request_handler = Some(handler);
    }

    /// Sends a request.
    ///
    /// An empty token is replaced with a fresh random one and a missing
    /// message id is assigned by the message layer. With a callback supplied,
    /// the request is tracked until a matching response arrives, the request
    /// times out (`msg.timeout`), or it is cancelled; the callback fires
    /// exactly once.
    ///
    /// Returns the message as actually sent, usable with
    /// [`cancel_request`](Coap::cancel_request).
    ///
    /// Fails with [`Error::InvalidArgument`] unless `msg` is a CON or NON
    /// request with a remote endpoint set.
    pub fn request(
        &self,
        msg: Message,
        callback: Option<ResponseCallback>,
    ) -> Result<Message, Error> {
        self.inner.send_request(msg, callback)
    }

    /// Cancels an outstanding request previously returned by
    /// [`request`](Coap::request). The completion callback fires with
    /// [`TransactionResult::Cancelled`]; retransmissions stop. A late
    /// response is answered with an empty RST.
    pub fn cancel_request(&self, request: &Message) {
        self.inner.cancel_request(request);
    }

    /// Sends a response message.
    ///
    /// This is the path for completing an exchange the request handler
    /// answered with [`RequestOutcome::Deferred`]: the response carries the
    /// request's token and travels as a CON or NON message. ACK and RST typed
    /// responses are attached to the dedup record of their message id so
    /// duplicates of the request are answered verbatim.
    ///
    /// Fails with [`Error::InvalidArgument`] if `msg` does not carry a
    /// response code.
    pub fn send_response(&self, msg: Message) -> Result<(), Error> {
        self.inner.send_outgoing_response(msg, None)
    }

    /// Feeds one raw datagram into the engine.
    ///
    /// This is the entry point behind the [`TransportReceiver`] registration;
    /// it is public so that alternative transports and tests can inject
    /// datagrams directly. Parse failures surface as errors here and are
    /// logged-and-dropped when arriving through the receiver interface.
    pub fn receive_datagram(
        &self,
        data: &[u8],
        remote: SocketAddr,
        local: SocketAddr,
    ) -> Result<(), Error> {
        self.inner.receive_datagram(data, remote, local)
    }
}

impl std::fmt::Debug for Coap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock_state();
        f.debug_struct("Coap")
            .field(
                "active_exchanges",
                &state.message_layer.active_exchanges.len(),
            )
            .field(
                "recent_remote_ids",
                &state.message_layer.recent_remote_ids.len(),
            )
            .field(
                "outgoing_requests",
                &state.transaction_layer.outgoing_requests.len(),
            )
            .finish()
    }
}

impl TransportReceiver for CoapInner {
    fn receive(&self, data: &[u8], remote: SocketAddr, local: SocketAddr) {
        if let Err(err) = self.receive_datagram(data, remote, local) {
            debug!("Dropping datagram from {}: {}", remote, err);
        }
    }
}

impl CoapInner {
    fn lock_state(&self) -> MutexGuard<'_, CoapState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                debug!("Recovering from mutex poisoning");
                poisoned.into_inner()
            }
        }
    }

    /// Schedules a one-shot callback that re-enters the engine unless the
    /// endpoint has been dropped in the meantime.
    fn schedule<F>(&self, delay: Duration, f: F) -> TimerHandle
    where
        F: FnOnce(&CoapInner) + Send + 'static,
    {
        let weak = self.weak_self.clone();
        self.timer.schedule(delay, move || {
            if let Some(inner) = weak.upgrade() {
                f(&inner);
            }
        })
    }

    fn send_frame(&self, data: &[u8], remote: SocketAddr) {
        // A failed send is not fatal for the exchange; the normal
        // retransmission schedule turns persistent failure into Timeout.
        if let Err(err) = self.transport.send(data, remote) {
            warn!("Transport send to {} failed: {}", remote, err);
        }
    }

    fn send_request(
        &self,
        mut msg: Message,
        callback: Option<ResponseCallback>,
    ) -> Result<Message, Error> {
        if !msg.is_request() {
            return Err(Error::InvalidArgument);
        }
        let remote = msg.remote.ok_or(Error::InvalidArgument)?;
        let mtype = msg.mtype.ok_or(Error::InvalidArgument)?;
        if !mtype.is_con() && !mtype.is_non() {
            return Err(Error::InvalidArgument);
        }

        let mut state = self.lock_state();
        if msg.token.is_empty() {
            msg.token = random_token(MAX_TOKEN_LENGTH);
        }
        if msg.mid.is_none() {
            msg.mid = Some(state.message_layer.next_msg_id());
        }
        let mid = msg.mid.ok_or(Error::InvalidArgument)?;
        let data = msg.encode()?;

        if let Some(callback) = callback {
            let token = msg.token;
            if state.transaction_layer.contains(&token, remote) {
                warn!("Replacing outstanding request with token {}", token);
            }
            let timer = self.schedule(msg.timeout, move |inner| {
                inner.request_timeout_fired(token, remote)
            });
            state.transaction_layer.register(
                token,
                remote,
                PendingRequest {
                    request: msg.clone(),
                    callback,
                    timeout_timer: Some(timer),
                },
            );
        }

        debug!(
            "Sending {:?} request mid {:04X} token {} to {}",
            mtype, mid, msg.token, remote
        );
        if mtype.is_con() {
            self.start_confirmable(&mut state, &msg, mid, data, remote);
        } else {
            self.send_frame(&data, remote);
        }

        Ok(msg)
    }

    /// Registers a confirmable exchange, arms its retransmission timer, and
    /// performs the first transmission.
    fn start_confirmable(
        &self,
        state: &mut CoapState,
        msg: &Message,
        mid: MsgId,
        data: Vec<u8>,
        remote: SocketAddr,
    ) {
        let backoff = self.trans_params.initial_retransmit_duration();
        state
            .message_layer
            .register_exchange(mid, msg.clone(), data.clone(), remote, backoff);
        let timer = self.schedule(backoff, move |inner| inner.retransmit_fired(mid));
        state.message_layer.set_retransmit_timer(mid, timer);

        self.send_frame(&data, remote);
    }

    fn retransmit_fired(&self, mid: MsgId) {
        let mut state = self.lock_state();
        let max_retransmit = self.trans_params.max_retransmit();

        match state.message_layer.retransmit(mid, max_retransmit) {
            RetransmitAction::Resend {
                data,
                remote,
                next_backoff,
            } => {
                debug!("Retransmitting mid {:04X} to {}", mid, remote);
                self.send_frame(&data, remote);
                let timer = self.schedule(next_backoff, move |inner| inner.retransmit_fired(mid));
                state.message_layer.set_retransmit_timer(mid, timer);
            }
            RetransmitAction::GiveUp { message, remote } => {
                info!(
                    "Giving up on mid {:04X} after {} transmissions",
                    mid,
                    max_retransmit + 1
                );
                let pending = state.transaction_layer.take(&message.token, remote);
                drop(state);
                if let Some(pending) = pending {
                    pending.complete(TransactionResult::Timeout, None);
                }
            }
            RetransmitAction::Unknown => {}
        }
    }

    fn request_timeout_fired(&self, token: MsgToken, remote: SocketAddr) {
        let mut state = self.lock_state();
        let pending = match state.transaction_layer.take(&token, remote) {
            Some(pending) => pending,
            None => return,
        };

        if let Some(mid) = pending.request.mid {
            if let Some(exchange) = state.message_layer.take_exchange(mid) {
                if let Some(timer) = exchange.retransmit_timer {
                    timer.cancel();
                }
            }
        }
        drop(state);

        info!("Request with token {} timed out", token);
        pending.complete(TransactionResult::Timeout, None);
    }

    fn cancel_request(&self, request: &Message) {
        let remote = match request.remote {
            Some(remote) => remote,
            None => return,
        };

        let mut state = self.lock_state();
        let pending = state.transaction_layer.take(&request.token, remote);
        if let Some(mid) = request.mid {
            if let Some(exchange) = state.message_layer.take_exchange(mid) {
                if let Some(timer) = exchange.retransmit_timer {
                    timer.cancel();
                }
            }
        }
        drop(state);

        if let Some(pending) = pending {
            pending.complete(TransactionResult::Cancelled, None);
        }
    }

    fn receive_datagram(
        &self,
        data: &[u8],
        remote: SocketAddr,
        local: SocketAddr,
    ) -> Result<(), Error> {
        let _ = local;
        let msg = Message::decode(data, Some(remote))?;
        let mtype = msg.mtype.ok_or(Error::MalformedMessage)?;

        match mtype {
            MsgType::Con | MsgType::Non => self.receive_con_non(msg, mtype, remote),
            MsgType::Ack => self.receive_ack(msg, remote),
            MsgType::Rst => self.receive_rst(msg, remote),
        }
    }

    fn receive_con_non(
        &self,
        msg: Message,
        mtype: MsgType,
        remote: SocketAddr,
    ) -> Result<(), Error> {
        let mid = msg.mid.ok_or(Error::MalformedMessage)?;
        let mut state = self.lock_state();

        match state.message_layer.note_incoming(mid, remote, mtype) {
            DedupStatus::Duplicate(Some(response)) => {
                debug!(
                    "Duplicate mid {:04X} from {}; replaying stored response",
                    mid, remote
                );
                drop(state);
                self.send_frame(&response, remote);
                return Ok(());
            }
            DedupStatus::Duplicate(None) => {
                debug!("Duplicate mid {:04X} from {}; dropping", mid, remote);
                return Ok(());
            }
            DedupStatus::New => {}
        }

        let lifetime = if mtype.is_con() {
            self.trans_params.exchange_lifetime()
        } else {
            self.trans_params.non_lifetime()
        };
        self.schedule(lifetime, move |inner| {
            inner.lock_state().message_layer.evict(mid, remote);
        });

        if msg.is_request() {
            self.deliver_request(state, msg, mtype, mid, remote)
        } else if msg.is_response() {
            self.deliver_separate_response(state, msg, mtype, mid, remote);
            Ok(())
        } else if msg.code == MsgCode::Empty && mtype.is_con() {
            // CoAP ping: answer with an empty reset.
            let rst = Message::empty_rst(&msg);
            let data = rst.encode()?;
            state.message_layer.attach_response(mid, remote, data.clone());
            drop(state);
            debug!("Ping from {}; answering with RST", remote);
            self.send_frame(&data, remote);
            Ok(())
        } else {
            debug!(
                "Dropping {:?} message with code {:?} from {}",
                mtype, msg.code, remote
            );
            Ok(())
        }
    }

    fn deliver_request(
        &self,
        state: MutexGuard<'_, CoapState>,
        msg: Message,
        mtype: MsgType,
        mid: MsgId,
        remote: SocketAddr,
    ) -> Result<(), Error> {
        let handler = state.request_handler.clone();
        drop(state);

        let handler = match handler {
            Some(handler) => handler,
            None => {
                debug!("No request handler registered; dropping request from {}", remote);
                return Ok(());
            }
        };

        match handler.receive_request(&msg) {
            RequestOutcome::Respond(response) => self.send_outgoing_response(response, Some(&msg)),
            RequestOutcome::NoResponse => Ok(()),
            RequestOutcome::Deferred => {
                if mtype.is_con() {
                    self.schedule(self.trans_params.empty_ack_delay(), move |inner| {
                        inner.empty_ack_delay_fired(mid, remote);
                    });
                }
                Ok(())
            }
        }
    }

    /// Sends the delayed empty ACK for a deferred confirmable request,
    /// unless a response was attached in the meantime.
    fn empty_ack_delay_fired(&self, mid: MsgId, remote: SocketAddr) {
        let mut state = self.lock_state();
        if !state.message_layer.needs_separate_ack(mid, remote) {
            return;
        }

        let mut ack = Message::new(MsgType::Ack, mid, MsgCode::Empty);
        ack.remote = Some(remote);
        if let Ok(data) = ack.encode() {
            state.message_layer.attach_response(mid, remote, data.clone());
            drop(state);
            debug!("Sending empty ACK for deferred mid {:04X}", mid);
            self.send_frame(&data, remote);
        }
    }

    /// Routes a response from the handler or from
    /// [`Coap::send_response`]. ACK/RST responses attach to the dedup record
    /// of their mid; CON responses enter the retransmission machinery.
    fn send_outgoing_response(
        &self,
        mut rsp: Message,
        request: Option<&Message>,
    ) -> Result<(), Error> {
        if !rsp.is_response() {
            return Err(Error::InvalidArgument);
        }

        if let Some(request) = request {
            if rsp.remote.is_none() {
                rsp.remote = request.remote;
            }
            if rsp.token.is_empty() {
                rsp.token = request.token;
            }
            if rsp.mid.is_none() && matches!(rsp.mtype, Some(MsgType::Ack) | Some(MsgType::Rst)) {
                rsp.mid = request.mid;
            }
        }

        let remote = rsp.remote.ok_or(Error::InvalidArgument)?;
        let mtype = rsp.mtype.ok_or(Error::InvalidArgument)?;

        let mut state = self.lock_state();
        match mtype {
            MsgType::Ack | MsgType::Rst => {
                let mid = rsp.mid.ok_or(Error::InvalidArgument)?;
                let data = rsp.encode()?;
                state.message_layer.attach_response(mid, remote, data.clone());
                drop(state);
                self.send_frame(&data, remote);
            }
            MsgType::Con => {
                if rsp.mid.is_none() {
                    rsp.mid = Some(state.message_layer.next_msg_id());
                }
                let mid = rsp.mid.ok_or(Error::InvalidArgument)?;
                let data = rsp.encode()?;
                self.start_confirmable(&mut state, &rsp, mid, data, remote);
            }
            MsgType::Non => {
                if rsp.mid.is_none() {
                    rsp.mid = Some(state.message_layer.next_msg_id());
                }
                let data = rsp.encode()?;
                drop(state);
                self.send_frame(&data, remote);
            }
        }

        Ok(())
    }

    /// Handles a CON/NON datagram carrying a response code: a separate
    /// response from a peer we asked earlier, or an unexpected one.
    fn deliver_separate_response(
        &self,
        mut state: MutexGuard<'_, CoapState>,
        msg: Message,
        mtype: MsgType,
        mid: MsgId,
        remote: SocketAddr,
    ) {
        match state.transaction_layer.take(&msg.token, remote) {
            Some(pending) => {
                if mtype.is_con() {
                    // Acknowledge the separate response; the stored bytes
                    // also answer duplicates of it.
                    let ack = Message::empty_ack(&msg);
                    if let Ok(data) = ack.encode() {
                        state.message_layer.attach_response(mid, remote, data.clone());
                        self.send_frame(&data, remote);
                    }
                }
                drop(state);
                debug!("Separate response matched token {}", msg.token);
                pending.complete(TransactionResult::Success, Some(&msg));
            }
            None => {
                // Nobody is waiting for this response; reject it.
                let rst = Message::empty_rst(&msg);
                if let Ok(data) = rst.encode() {
                    state.message_layer.attach_response(mid, remote, data.clone());
                    drop(state);
                    info!(
                        "Unexpected response from {} (token {}); sending RST",
                        remote, msg.token
                    );
                    self.send_frame(&data, remote);
                }
            }
        }
    }

    fn receive_ack(&self, msg: Message, remote: SocketAddr) -> Result<(), Error> {
        let mid = msg.mid.ok_or(Error::MalformedMessage)?;
        let mut state = self.lock_state();

        match state.message_layer.take_exchange(mid) {
            Some(exchange) => {
                if let Some(timer) = exchange.retransmit_timer {
                    timer.cancel();
                }
            }
            None => {
                debug!("ACK for unknown mid {:04X} from {}", mid, remote);
                return Err(Error::UnexpectedAck);
            }
        }

        if msg.is_response() {
            // Piggybacked response.
            let pending = state.transaction_layer.take(&msg.token, remote);
            drop(state);
            if let Some(pending) = pending {
                debug!("Piggybacked response matched token {}", msg.token);
                pending.complete(TransactionResult::Success, Some(&msg));
            }
        } else {
            debug!("Empty ACK for mid {:04X}; awaiting separate response", mid);
        }

        Ok(())
    }

    fn receive_rst(&self, msg: Message, remote: SocketAddr) -> Result<(), Error> {
        let mid = msg.mid.ok_or(Error::MalformedMessage)?;
        let mut state = self.lock_state();

        match state.message_layer.take_exchange(mid) {
            Some(exchange) => {
                if let Some(timer) = exchange.retransmit_timer {
                    timer.cancel();
                }
                let pending = state
                    .transaction_layer
                    .take(&exchange.message.token, remote);
                drop(state);
                info!("Peer {} reset mid {:04X}", remote, mid);
                if let Some(pending) = pending {
                    pending.complete(TransactionResult::Reset, None);
                }
            }
            None => {
                debug!("RST for unknown mid {:04X} from {}", mid, remote);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TesterTransport;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    const TEST_MID: MsgId = 1000;

    fn test_remote() -> SocketAddr {
        "12.34.56.78:12345".parse().unwrap()
    }

    fn test_local() -> SocketAddr {
        "10.10.10.10:20000".parse().unwrap()
    }

    fn test_token() -> MsgToken {
        MsgToken::new(b"abcd").unwrap()
    }

    fn setup() -> (Coap, Arc<TesterTransport>) {
        let transport = Arc::new(TesterTransport::new());
        let coap = Coap::new(transport.clone());
        transport.open().unwrap();
        (coap, transport)
    }

    /// Handler answering every request with a canned response, counting
    /// invocations.
    struct CannedHandler {
        response: Mutex<Option<Message>>,
        calls: AtomicUsize,
    }

    impl CannedHandler {
        fn new(response: Option<Message>) -> Arc<CannedHandler> {
            Arc::new(CannedHandler {
                response: Mutex::new(response),
                calls: AtomicUsize::new(0),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl RequestHandler for CannedHandler {
        fn receive_request(&self, _request: &Message) -> RequestOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.response.lock().unwrap().clone() {
                Some(response) => RequestOutcome::Respond(response),
                None => RequestOutcome::NoResponse,
            }
        }
    }

    /// Captures the completion callback's outcome for later assertions.
    #[derive(Default)]
    struct CallbackProbe {
        result: Mutex<Option<TransactionResult>>,
        payload: Mutex<Option<Vec<u8>>>,
        calls: AtomicUsize,
    }

    impl CallbackProbe {
        fn new() -> Arc<CallbackProbe> {
            Arc::new(CallbackProbe::default())
        }

        fn callback(self: &Arc<Self>) -> ResponseCallback {
            let probe = self.clone();
            Box::new(move |result, _request, response| {
                *probe.result.lock().unwrap() = Some(result);
                *probe.payload.lock().unwrap() = response.map(|r| r.payload.clone());
                probe.calls.fetch_add(1, Ordering::SeqCst);
            })
        }

        fn result(&self) -> Option<TransactionResult> {
            *self.result.lock().unwrap()
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn con_get_request() -> Message {
        let mut msg = Message::new(MsgType::Con, TEST_MID, MsgCode::MethodGet);
        msg.token = test_token();
        msg.payload = b"testPayload".to_vec();
        msg.remote = Some(test_remote());
        msg
    }

    fn in_retransmission_list(coap: &Coap, mid: MsgId) -> bool {
        coap.inner
            .lock_state()
            .message_layer
            .active_exchanges
            .contains_key(&mid)
    }

    fn in_outgoing_request_list(coap: &Coap, token: MsgToken) -> bool {
        coap.inner
            .lock_state()
            .transaction_layer
            .contains(&token, test_remote())
    }

    fn dedup_response(coap: &Coap, mid: MsgId) -> Option<Option<Vec<u8>>> {
        coap.inner
            .lock_state()
            .message_layer
            .recent_remote_ids
            .get(&(mid, test_remote()))
            .map(|record| record.response.clone())
    }

    #[test]
    fn rejects_non_request_message() {
        let (coap, _transport) = setup();
        let mut msg = Message::new(MsgType::Con, TEST_MID, MsgCode::SuccessChanged);
        msg.remote = Some(test_remote());

        assert_eq!(Err(Error::InvalidArgument), coap.request(msg, None));
    }

    #[test]
    fn rejects_request_without_remote() {
        let (coap, _transport) = setup();
        let msg = Message::new(MsgType::Con, TEST_MID, MsgCode::MethodGet);
        assert_eq!(Err(Error::InvalidArgument), coap.request(msg, None));
    }

    #[test]
    fn con_request_is_queued_for_retransmission() {
        let (coap, transport) = setup();
        let msg = con_get_request();

        let sent = coap.request(msg.clone(), None).unwrap();
        assert_eq!(1, transport.output_count());
        assert_eq!(Some(msg.encode().unwrap()), transport.last_data());
        assert_eq!(Some(test_remote()), transport.last_remote());
        assert_eq!(true, in_retransmission_list(&coap, TEST_MID));
        assert_eq!(
            msg,
            coap.inner.lock_state().message_layer.active_exchanges[&TEST_MID].message
        );
        assert_eq!(sent, msg);
    }

    #[test]
    fn non_request_is_not_queued_for_retransmission() {
        let (coap, transport) = setup();
        let mut msg = con_get_request();
        msg.mtype = Some(MsgType::Non);

        coap.request(msg, None).unwrap();
        assert_eq!(1, transport.output_count());
        assert_eq!(false, in_retransmission_list(&coap, TEST_MID));
    }

    #[test]
    fn callback_request_is_queued_on_outgoing_list() {
        let (coap, _transport) = setup();
        let probe = CallbackProbe::new();

        coap.request(con_get_request(), Some(probe.callback())).unwrap();
        assert_eq!(true, in_outgoing_request_list(&coap, test_token()));
    }

    #[test]
    fn request_without_callback_is_not_tracked() {
        let (coap, _transport) = setup();
        coap.request(con_get_request(), None).unwrap();
        assert_eq!(false, in_outgoing_request_list(&coap, test_token()));
    }

    #[test]
    fn empty_token_and_mid_are_assigned() {
        let (coap, _transport) = setup();
        let mut msg = Message::request(MsgType::Con, MsgCode::MethodGet);
        msg.remote = Some(test_remote());

        let sent = coap.request(msg, None).unwrap();
        assert_eq!(8, sent.token.len());
        assert_eq!(true, sent.mid.is_some());
    }

    fn incoming_request(mtype: MsgType) -> Vec<u8> {
        let mut req = Message::new(mtype, TEST_MID, MsgCode::MethodGet);
        req.token = test_token();
        req.options.set_uri_path(vec!["test"]);
        req.encode().unwrap()
    }

    #[test]
    fn invalid_handler_response_is_rejected() {
        let (coap, _transport) = setup();
        // A GET code is not a response code.
        let rsp = Message::new(MsgType::Ack, TEST_MID, MsgCode::MethodGet);
        coap.register_request_handler(CannedHandler::new(Some(rsp)));

        assert_eq!(
            Err(Error::InvalidArgument),
            coap.receive_datagram(&incoming_request(MsgType::Con), test_remote(), test_local())
        );
    }

    #[test]
    fn con_response_is_queued_for_retransmission() {
        let (coap, _transport) = setup();
        let mut rsp = Message::new(MsgType::Con, TEST_MID + 1, MsgCode::SuccessContent);
        rsp.token = test_token();
        coap.register_request_handler(CannedHandler::new(Some(rsp.clone())));

        coap.receive_datagram(&incoming_request(MsgType::Non), test_remote(), test_local())
            .unwrap();
        assert_eq!(true, in_retransmission_list(&coap, TEST_MID + 1));
        assert_eq!(
            rsp,
            coap.inner.lock_state().message_layer.active_exchanges[&(TEST_MID + 1)].message
        );
    }

    #[test]
    fn non_response_is_not_queued_for_retransmission() {
        let (coap, transport) = setup();
        let mut rsp = Message::new(MsgType::Non, TEST_MID + 1, MsgCode::SuccessContent);
        rsp.token = test_token();
        coap.register_request_handler(CannedHandler::new(Some(rsp)));

        coap.receive_datagram(&incoming_request(MsgType::Non), test_remote(), test_local())
            .unwrap();
        assert_eq!(1, transport.output_count());
        assert_eq!(false, in_retransmission_list(&coap, TEST_MID + 1));
    }

    #[test]
    fn ack_response_is_attached_to_dedup_record() {
        let (coap, _transport) = setup();
        let mut rsp = Message::new(MsgType::Ack, TEST_MID, MsgCode::SuccessContent);
        rsp.token = test_token();
        coap.register_request_handler(CannedHandler::new(Some(rsp.clone())));

        coap.receive_datagram(&incoming_request(MsgType::Non), test_remote(), test_local())
            .unwrap();
        assert_eq!(Some(Some(rsp.encode().unwrap())), dedup_response(&coap, TEST_MID));
    }

    #[test]
    fn received_requests_enter_the_dedup_list() {
        for mtype in vec![MsgType::Con, MsgType::Non] {
            let (coap, _transport) = setup();
            coap.receive_datagram(&incoming_request(mtype), test_remote(), test_local())
                .unwrap();
            assert_eq!(Some(None), dedup_response(&coap, TEST_MID));
        }
    }

    fn check_duplicate_is_auto_answered(rsp: Message) {
        let (coap, transport) = setup();
        let handler = CannedHandler::new(Some(rsp.clone()));
        coap.register_request_handler(handler.clone());
        let raw = incoming_request(MsgType::Con);

        coap.receive_datagram(&raw, test_remote(), test_local()).unwrap();
        assert_eq!(1, handler.call_count());
        assert_eq!(1, transport.output_count());
        assert_eq!(Some(rsp.encode().unwrap()), transport.last_data());

        coap.receive_datagram(&raw, test_remote(), test_local()).unwrap();
        assert_eq!(1, handler.call_count());
        assert_eq!(2, transport.output_count());
        assert_eq!(Some(rsp.encode().unwrap()), transport.last_data());
        assert_eq!(Some(test_remote()), transport.last_remote());
    }

    #[test]
    fn duplicated_con_request_gets_ack_resent() {
        let mut rsp = Message::new(MsgType::Ack, TEST_MID, MsgCode::SuccessContent);
        rsp.token = test_token();
        rsp.payload = b"testPayload".to_vec();
        check_duplicate_is_auto_answered(rsp);
    }

    #[test]
    fn duplicated_con_request_gets_rst_resent() {
        let mut rsp = Message::new(MsgType::Rst, TEST_MID, MsgCode::SuccessContent);
        rsp.token = test_token();
        check_duplicate_is_auto_answered(rsp);
    }

    #[test]
    fn duplicated_con_without_stored_response_is_ignored() {
        let (coap, transport) = setup();
        let handler = CannedHandler::new(None);
        coap.register_request_handler(handler.clone());
        let raw = incoming_request(MsgType::Con);

        coap.receive_datagram(&raw, test_remote(), test_local()).unwrap();
        assert_eq!(1, handler.call_count());

        coap.receive_datagram(&raw, test_remote(), test_local()).unwrap();
        assert_eq!(1, handler.call_count());
        assert_eq!(0, transport.output_count());
    }

    #[test]
    fn duplicated_non_request_is_ignored() {
        let (coap, transport) = setup();
        let mut rsp = Message::new(MsgType::Non, TEST_MID, MsgCode::SuccessContent);
        rsp.token = test_token();
        let handler = CannedHandler::new(Some(rsp));
        coap.register_request_handler(handler.clone());
        let raw = incoming_request(MsgType::Non);

        coap.receive_datagram(&raw, test_remote(), test_local()).unwrap();
        assert_eq!(1, handler.call_count());
        assert_eq!(1, transport.output_count());

        coap.receive_datagram(&raw, test_remote(), test_local()).unwrap();
        assert_eq!(1, handler.call_count());
        assert_eq!(1, transport.output_count());
    }

    fn receive_ack_response(coap: &Coap) {
        let mut rsp = Message::new(MsgType::Ack, TEST_MID, MsgCode::SuccessContent);
        rsp.token = test_token();
        rsp.payload = b"testPayload".to_vec();
        coap.receive_datagram(&rsp.encode().unwrap(), test_remote(), test_local())
            .unwrap();
    }

    fn receive_rst_response(coap: &Coap) {
        let rsp = Message::new(MsgType::Rst, TEST_MID, MsgCode::Empty);
        coap.receive_datagram(&rsp.encode().unwrap(), test_remote(), test_local())
            .unwrap();
    }

    #[test]
    fn ack_removes_exchange_from_retransmission_list() {
        let (coap, _transport) = setup();
        let probe = CallbackProbe::new();
        coap.request(con_get_request(), Some(probe.callback())).unwrap();
        assert_eq!(true, in_retransmission_list(&coap, TEST_MID));

        receive_ack_response(&coap);
        assert_eq!(false, in_retransmission_list(&coap, TEST_MID));
    }

    #[test]
    fn rst_removes_exchange_from_retransmission_list() {
        let (coap, _transport) = setup();
        let probe = CallbackProbe::new();
        coap.request(con_get_request(), Some(probe.callback())).unwrap();

        receive_rst_response(&coap);
        assert_eq!(false, in_retransmission_list(&coap, TEST_MID));
    }

    #[test]
    fn response_removes_pending_request() {
        let (coap, _transport) = setup();
        let probe = CallbackProbe::new();
        coap.request(con_get_request(), Some(probe.callback())).unwrap();
        assert_eq!(true, in_outgoing_request_list(&coap, test_token()));

        receive_ack_response(&coap);
        assert_eq!(false, in_outgoing_request_list(&coap, test_token()));
    }

    #[test]
    fn callback_fires_with_success_on_response() {
        let (coap, _transport) = setup();
        let probe = CallbackProbe::new();
        coap.request(con_get_request(), Some(probe.callback())).unwrap();

        receive_ack_response(&coap);
        assert_eq!(Some(TransactionResult::Success), probe.result());
        assert_eq!(
            Some(b"testPayload".to_vec()),
            probe.payload.lock().unwrap().clone()
        );
        assert_eq!(1, probe.call_count());
    }

    #[test]
    fn callback_fires_with_reset_on_rst() {
        let (coap, _transport) = setup();
        let probe = CallbackProbe::new();
        coap.request(con_get_request(), Some(probe.callback())).unwrap();

        receive_rst_response(&coap);
        assert_eq!(Some(TransactionResult::Reset), probe.result());
        assert_eq!(false, in_outgoing_request_list(&coap, test_token()));
    }

    #[test]
    fn callback_fires_with_cancelled_on_cancel() {
        let (coap, _transport) = setup();
        let probe = CallbackProbe::new();
        let sent = coap.request(con_get_request(), Some(probe.callback())).unwrap();

        coap.cancel_request(&sent);
        assert_eq!(Some(TransactionResult::Cancelled), probe.result());
        assert_eq!(false, in_retransmission_list(&coap, TEST_MID));
        assert_eq!(false, in_outgoing_request_list(&coap, test_token()));
        assert_eq!(1, probe.call_count());
    }

    #[test]
    fn late_response_after_cancel_is_reset() {
        let (coap, transport) = setup();
        let probe = CallbackProbe::new();
        let sent = coap.request(con_get_request(), Some(probe.callback())).unwrap();
        coap.cancel_request(&sent);
        assert_eq!(1, transport.output_count());

        // A separate response arriving after cancellation matches nothing
        // and is answered with an empty RST; the callback stays at one call.
        let mut late = Message::new(MsgType::Con, TEST_MID + 1, MsgCode::SuccessContent);
        late.token = test_token();
        coap.receive_datagram(&late.encode().unwrap(), test_remote(), test_local())
            .unwrap();

        let raw_rst = Message::new(MsgType::Rst, TEST_MID + 1, MsgCode::Empty)
            .encode()
            .unwrap();
        assert_eq!(2, transport.output_count());
        assert_eq!(Some(raw_rst), transport.last_data());
        assert_eq!(1, probe.call_count());
        assert_eq!(Some(TransactionResult::Cancelled), probe.result());
    }

    #[test]
    fn callback_fires_with_timeout() {
        let (coap, _transport) = setup();
        let probe = CallbackProbe::new();
        let mut msg = con_get_request();
        msg.timeout = Duration::from_millis(100);

        coap.request(msg, Some(probe.callback())).unwrap();
        assert_eq!(None, probe.result());

        thread::sleep(Duration::from_millis(300));
        assert_eq!(Some(TransactionResult::Timeout), probe.result());
        assert_eq!(1, probe.call_count());
        assert_eq!(false, in_retransmission_list(&coap, TEST_MID));
        assert_eq!(false, in_outgoing_request_list(&coap, test_token()));
    }

    #[test]
    fn retransmission_exhaustion_reports_timeout() {
        let (coap, transport) = setup();
        let probe = CallbackProbe::new();
        coap.request(con_get_request(), Some(probe.callback())).unwrap();
        assert_eq!(1, transport.output_count());

        // Drive the retransmission timer by hand instead of waiting out the
        // exponential backoff.
        for count in 2..=5 {
            coap.inner.retransmit_fired(TEST_MID);
            assert_eq!(count, transport.output_count());
        }
        let frames = transport.frames();
        assert!(frames.iter().all(|(data, _)| *data == frames[0].0));

        coap.inner.retransmit_fired(TEST_MID);
        assert_eq!(5, transport.output_count());
        assert_eq!(Some(TransactionResult::Timeout), probe.result());
        assert_eq!(1, probe.call_count());

        coap.inner.retransmit_fired(TEST_MID);
        assert_eq!(1, probe.call_count());
    }

    #[test]
    fn separate_response_round_trip() {
        let (coap, transport) = setup();
        let probe = CallbackProbe::new();
        coap.request(con_get_request(), Some(probe.callback())).unwrap();
        assert_eq!(1, transport.output_count());

        // Empty ACK: no callback yet.
        let empty_ack = Message::new(MsgType::Ack, TEST_MID, MsgCode::Empty);
        coap.receive_datagram(&empty_ack.encode().unwrap(), test_remote(), test_local())
            .unwrap();
        assert_eq!(None, probe.result());

        // Separate CON response: callback fires and an empty ACK goes out.
        let mut separate = Message::new(MsgType::Con, TEST_MID + 1, MsgCode::SuccessContent);
        separate.token = test_token();
        separate.payload = b"testPayload".to_vec();
        let raw_separate = separate.encode().unwrap();
        let raw_empty_ack = Message::new(MsgType::Ack, TEST_MID + 1, MsgCode::Empty)
            .encode()
            .unwrap();

        coap.receive_datagram(&raw_separate, test_remote(), test_local()).unwrap();
        assert_eq!(2, transport.output_count());
        assert_eq!(Some(raw_empty_ack.clone()), transport.last_data());
        assert_eq!(Some(TransactionResult::Success), probe.result());
        assert_eq!(1, probe.call_count());

        // A duplicate of the separate response is answered with the stored
        // empty ACK and no further callback.
        coap.receive_datagram(&raw_separate, test_remote(), test_local()).unwrap();
        assert_eq!(3, transport.output_count());
        assert_eq!(Some(raw_empty_ack), transport.last_data());
        assert_eq!(1, probe.call_count());
    }

    #[test]
    fn unexpected_separate_response_is_reset() {
        let (coap, transport) = setup();

        let mut rsp = Message::new(MsgType::Con, TEST_MID, MsgCode::SuccessContent);
        rsp.token = test_token();
        coap.receive_datagram(&rsp.encode().unwrap(), test_remote(), test_local())
            .unwrap();

        let raw_rst = Message::new(MsgType::Rst, TEST_MID, MsgCode::Empty)
            .encode()
            .unwrap();
        assert_eq!(1, transport.output_count());
        assert_eq!(Some(raw_rst), transport.last_data());
    }

    #[test]
    fn unexpected_ack_is_reported() {
        let (coap, _transport) = setup();
        let ack = Message::new(MsgType::Ack, TEST_MID, MsgCode::Empty);
        assert_eq!(
            Err(Error::UnexpectedAck),
            coap.receive_datagram(&ack.encode().unwrap(), test_remote(), test_local())
        );
    }

    #[test]
    fn malformed_datagram_is_rejected() {
        let (coap, _transport) = setup();
        assert_eq!(
            Err(Error::MalformedMessage),
            coap.receive_datagram(&[0x40, 0x00], test_remote(), test_local())
        );
    }

    #[test]
    fn ping_is_answered_with_rst() {
        let (coap, transport) = setup();
        let ping = Message::new(MsgType::Con, TEST_MID, MsgCode::Empty);
        coap.receive_datagram(&ping.encode().unwrap(), test_remote(), test_local())
            .unwrap();

        let raw_rst = Message::new(MsgType::Rst, TEST_MID, MsgCode::Empty)
            .encode()
            .unwrap();
        assert_eq!(1, transport.output_count());
        assert_eq!(Some(raw_rst), transport.last_data());
    }

    #[test]
    fn deferred_request_gets_delayed_empty_ack() {
        let (coap, transport) = setup();
        coap.register_request_handler(Arc::new(crate::handler::HandlerFn(
            |_request: &Message| RequestOutcome::Deferred,
        )));

        coap.receive_datagram(&incoming_request(MsgType::Con), test_remote(), test_local())
            .unwrap();
        assert_eq!(0, transport.output_count());

        // EMPTY_ACK_DELAY is 100 ms.
        thread::sleep(Duration::from_millis(300));
        let raw_empty_ack = Message::new(MsgType::Ack, TEST_MID, MsgCode::Empty)
            .encode()
            .unwrap();
        assert_eq!(1, transport.output_count());
        assert_eq!(Some(raw_empty_ack.clone()), transport.last_data());

        // A duplicate of the request is now answered with the stored ACK.
        coap.receive_datagram(&incoming_request(MsgType::Con), test_remote(), test_local())
            .unwrap();
        assert_eq!(2, transport.output_count());
        assert_eq!(Some(raw_empty_ack), transport.last_data());

        // The deferred separate response goes out as a CON with the
        // request's token.
        let mut separate = Message::request(MsgType::Con, MsgCode::SuccessContent);
        separate.token = test_token();
        separate.remote = Some(test_remote());
        separate.payload = b"late".to_vec();
        coap.send_response(separate).unwrap();
        assert_eq!(3, transport.output_count());
        let last = Message::decode(&transport.last_data().unwrap(), None).unwrap();
        assert_eq!(Some(MsgType::Con), last.mtype);
        assert_eq!(MsgCode::SuccessContent, last.code);
        assert_eq!(test_token(), last.token);
        assert_eq!(true, in_retransmission_list(&coap, last.mid.unwrap()));
    }

    #[test]
    fn synchronous_response_suppresses_delayed_empty_ack() {
        let (coap, transport) = setup();
        let mut rsp = Message::new(MsgType::Ack, TEST_MID, MsgCode::SuccessContent);
        rsp.token = test_token();
        coap.register_request_handler(CannedHandler::new(Some(rsp)));

        coap.receive_datagram(&incoming_request(MsgType::Con), test_remote(), test_local())
            .unwrap();
        assert_eq!(1, transport.output_count());

        thread::sleep(Duration::from_millis(300));
        // No extra empty ACK shows up after the delay.
        assert_eq!(1, transport.output_count());
    }

    #[test]
    fn send_response_rejects_non_response() {
        let (coap, _transport) = setup();
        let mut msg = Message::new(MsgType::Con, TEST_MID, MsgCode::MethodGet);
        msg.remote = Some(test_remote());
        assert_eq!(Err(Error::InvalidArgument), coap.send_response(msg));
    }
}
