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

//! The abstract datagram transport the protocol engine runs on, plus a
//! recording transport for tests.

use crate::error::Error;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

/// Receives datagrams from a [`Transport`].
///
/// A transport delivering from its own thread must serialize calls into one
/// receiver; the engine relies on inbound datagrams arriving one at a time.
pub trait TransportReceiver: Send + Sync {
    /// Called with every datagram the transport receives. `remote` is the
    /// sender's endpoint and `local` the endpoint the datagram arrived on.
    fn receive(&self, data: &[u8], remote: SocketAddr, local: SocketAddr);
}

/// An abstract datagram transport.
///
/// The engine assumes the transport performs no framing (datagrams arrive
/// whole) and that [`send`](Transport::send) is non-blocking or bounded.
/// `send` may be called concurrently, including from timer callbacks.
pub trait Transport: Send + Sync {
    /// Opens the transport for communication.
    fn open(&self) -> Result<(), Error>;

    /// Closes the transport.
    fn close(&self);

    /// Sends one datagram to the given destination endpoint.
    fn send(&self, data: &[u8], dest: SocketAddr) -> Result<(), Error>;

    /// Registers a receiver for inbound datagrams. The transport holds the
    /// receiver weakly; the caller keeps it alive for as long as delivery is
    /// wanted.
    fn register_receiver(&self, receiver: &Arc<dyn TransportReceiver>);

    /// Removes a previously registered receiver.
    fn remove_receiver(&self, receiver: &Arc<dyn TransportReceiver>);
}

/// Weak-observer receiver set shared by transport implementations.
///
/// Dead receivers are pruned on dispatch.
#[derive(Default)]
pub struct Receivers {
    list: Mutex<Vec<Weak<dyn TransportReceiver>>>,
}

impl Receivers {
    /// Creates an empty receiver set.
    pub fn new() -> Receivers {
        Receivers::default()
    }

    fn lock_list(&self) -> MutexGuard<'_, Vec<Weak<dyn TransportReceiver>>> {
        match self.list.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Adds `receiver` unless it is already registered.
    pub fn register(&self, receiver: &Arc<dyn TransportReceiver>) {
        let weak = Arc::downgrade(receiver);
        let mut list = self.lock_list();
        if !list.iter().any(|existing| Weak::ptr_eq(existing, &weak)) {
            list.push(weak);
        }
    }

    /// Removes `receiver` if it is registered.
    pub fn remove(&self, receiver: &Arc<dyn TransportReceiver>) {
        let weak = Arc::downgrade(receiver);
        self.lock_list()
            .retain(|existing| !Weak::ptr_eq(existing, &weak));
    }

    /// Delivers one datagram to every live receiver.
    pub fn dispatch(&self, data: &[u8], remote: SocketAddr, local: SocketAddr) {
        let receivers: Vec<Arc<dyn TransportReceiver>> = {
            let mut list = self.lock_list();
            list.retain(|weak| weak.upgrade().is_some());
            list.iter().filter_map(Weak::upgrade).collect()
        };

        for receiver in receivers {
            receiver.receive(data, remote, local);
        }
    }
}

impl std::fmt::Debug for Receivers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Receivers")
            .field("len", &self.lock_list().len())
            .finish()
    }
}

#[derive(Debug, Default)]
struct TesterState {
    opened: bool,
    frames: Vec<(Vec<u8>, SocketAddr)>,
}

/// Transport for tests: records every outbound frame instead of sending it,
/// and lets tests feed inbound datagrams to the registered receivers.
#[derive(Debug, Default)]
pub struct TesterTransport {
    receivers: Receivers,
    state: Mutex<TesterState>,
}

impl TesterTransport {
    /// Creates a new tester transport.
    pub fn new() -> TesterTransport {
        TesterTransport::default()
    }

    fn lock_state(&self) -> MutexGuard<'_, TesterState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// True once [`Transport::open`] has been called.
    pub fn is_open(&self) -> bool {
        self.lock_state().opened
    }

    /// Number of frames sent through this transport so far.
    pub fn output_count(&self) -> usize {
        self.lock_state().frames.len()
    }

    /// Bytes of the most recently sent frame.
    pub fn last_data(&self) -> Option<Vec<u8>> {
        self.lock_state().frames.last().map(|(data, _)| data.clone())
    }

    /// Destination of the most recently sent frame.
    pub fn last_remote(&self) -> Option<SocketAddr> {
        self.lock_state().frames.last().map(|(_, remote)| *remote)
    }

    /// All frames sent so far, oldest first.
    pub fn frames(&self) -> Vec<(Vec<u8>, SocketAddr)> {
        self.lock_state().frames.clone()
    }

    /// Delivers a datagram to the registered receivers as if it had arrived
    /// from `remote`.
    pub fn push_datagram(&self, data: &[u8], remote: SocketAddr, local: SocketAddr) {
        self.receivers.dispatch(data, remote, local);
    }
}

impl Transport for TesterTransport {
    fn open(&self) -> Result<(), Error> {
        self.lock_state().opened = true;
        Ok(())
    }

    fn close(&self) {
        self.lock_state().opened = false;
    }

    fn send(&self, data: &[u8], dest: SocketAddr) -> Result<(), Error> {
        self.lock_state().frames.push((data.to_vec(), dest));
        Ok(())
    }

    fn register_receiver(&self, receiver: &Arc<dyn TransportReceiver>) {
        self.receivers.register(receiver);
    }

    fn remove_receiver(&self, receiver: &Arc<dyn TransportReceiver>) {
        self.receivers.remove(receiver);
    }
}
