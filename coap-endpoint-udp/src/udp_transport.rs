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

use coap_endpoint::{Error, Receivers, Transport, TransportReceiver};
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

/// Largest datagram the listener accepts; a typical Ethernet MTU.
const MTU: usize = 1500;

/// How often the listener thread checks for a close request.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

struct Listener {
    handle: thread::JoinHandle<()>,
    terminate: Arc<AtomicBool>,
}

#[derive(Default)]
struct UdpState {
    socket: Option<Arc<UdpSocket>>,
    listener: Option<Listener>,
}

struct UdpInner {
    port: u16,
    receivers: Receivers,
    state: Mutex<UdpState>,
}

/// A [`Transport`] over a standard UDP socket.
///
/// [`open`](Transport::open) binds the socket and starts a listener thread
/// that delivers inbound datagrams to the registered receivers;
/// [`close`](Transport::close) stops the thread and releases the socket.
/// Opening an already-open transport rebinds it.
pub struct UdpTransport {
    inner: Arc<UdpInner>,
}

impl UdpTransport {
    /// Creates a transport that will bind to the given UDP port. Port 0
    /// picks an ephemeral port; see [`local_addr`](UdpTransport::local_addr).
    pub fn new(port: u16) -> UdpTransport {
        UdpTransport {
            inner: Arc::new(UdpInner {
                port,
                receivers: Receivers::new(),
                state: Mutex::new(UdpState::default()),
            }),
        }
    }

    /// The bound local address, once the transport is open.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner
            .lock_state()
            .socket
            .as_ref()
            .and_then(|socket| socket.local_addr().ok())
    }
}

impl UdpInner {
    fn lock_state(&self) -> MutexGuard<'_, UdpState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Stops any running listener. The join happens with the state lock
    /// released: the listener may be inside a receiver that sends a reply
    /// through this transport, which needs the lock.
    fn shutdown_listener(&self) {
        let listener = {
            let mut state = self.lock_state();
            state.socket = None;
            state.listener.take()
        };

        if let Some(listener) = listener {
            listener.terminate.store(true, Ordering::Relaxed);
            if let Err(err) = listener.handle.join() {
                warn!("UDP listener thread panicked: {:?}", err);
            }
        }
    }
}

impl Transport for UdpTransport {
    fn open(&self) -> Result<(), Error> {
        self.inner.shutdown_listener();

        let socket = UdpSocket::bind(("0.0.0.0", self.inner.port))?;
        // The timeout lets the listener notice a close request without a
        // datagram arriving.
        socket.set_read_timeout(Some(POLL_INTERVAL))?;
        let socket = Arc::new(socket);

        let terminate = Arc::new(AtomicBool::new(false));
        let listener_socket = socket.clone();
        let listener_terminate = terminate.clone();
        let listener_inner = self.inner.clone();
        let handle = thread::Builder::new()
            .name("coap-udp-listener".into())
            .spawn(move || listen_loop(listener_socket, listener_terminate, listener_inner))?;

        info!("UDP transport bound to {:?}", socket.local_addr());
        let mut state = self.inner.lock_state();
        state.socket = Some(socket);
        state.listener = Some(Listener { handle, terminate });

        Ok(())
    }

    fn close(&self) {
        self.inner.shutdown_listener();
    }

    fn send(&self, data: &[u8], dest: SocketAddr) -> Result<(), Error> {
        let socket = self
            .inner
            .lock_state()
            .socket
            .clone()
            .ok_or(Error::IOError)?;
        socket.send_to(data, dest)?;
        Ok(())
    }

    fn register_receiver(&self, receiver: &Arc<dyn TransportReceiver>) {
        self.inner.receivers.register(receiver);
    }

    fn remove_receiver(&self, receiver: &Arc<dyn TransportReceiver>) {
        self.inner.receivers.remove(receiver);
    }
}

impl std::fmt::Debug for UdpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdpTransport")
            .field("port", &self.inner.port)
            .field("open", &self.inner.lock_state().socket.is_some())
            .finish()
    }
}

fn listen_loop(socket: Arc<UdpSocket>, terminate: Arc<AtomicBool>, inner: Arc<UdpInner>) {
    let local = match socket.local_addr() {
        Ok(local) => local,
        Err(err) => {
            warn!("UDP listener has no local address: {}", err);
            return;
        }
    };

    let mut buffer = [0u8; MTU];
    while !terminate.load(Ordering::Relaxed) {
        match socket.recv_from(&mut buffer) {
            Ok((len, remote)) => {
                debug!("Received {} bytes from {}", len, remote);
                inner.receivers.dispatch(&buffer[..len], remote, local);
            }
            Err(err)
                if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::TimedOut => {}
            Err(err) => {
                warn!("UDP receive failed: {}", err);
                break;
            }
        }
    }
}
