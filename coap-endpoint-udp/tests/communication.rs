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

//! Client/server round trip over the loopback interface.

use coap_endpoint::{
    Coap, Message, MethodDispatcher, MethodHandler, MethodOutcome, MsgCode, MsgType,
    TransactionResult, Transport,
};
use coap_endpoint_udp::UdpTransport;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

const PAYLOAD: &[u8] = b"123456789 123456789 123456789 123456789 123456789 \
                         123456789 123456789 123456789 123456789 123456789 ";

struct TextResource;

impl MethodHandler for TextResource {
    fn on_get(&self, request: &Message) -> MethodOutcome {
        if request.options.uri_path() != vec!["text".to_owned()] {
            return MethodOutcome::Respond(Message::ack(
                request,
                MsgCode::ClientErrorNotFound,
                b"Error: Resource not found!".to_vec(),
            ));
        }

        MethodOutcome::Respond(Message::ack(
            request,
            MsgCode::SuccessContent,
            PAYLOAD.to_vec(),
        ))
    }
}

#[test]
fn client_server_communication() {
    let server_transport = Arc::new(UdpTransport::new(0));
    let server = Coap::new(server_transport.clone());
    server.register_request_handler(Arc::new(MethodDispatcher(TextResource)));
    server_transport.open().unwrap();
    let server_port = server_transport.local_addr().unwrap().port();

    let client_transport = Arc::new(UdpTransport::new(0));
    let client = Coap::new(client_transport.clone());
    client_transport.open().unwrap();

    let received = Arc::new(AtomicBool::new(false));
    let payload = Arc::new(Mutex::new(Vec::new()));

    let mut request = Message::request(MsgType::Con, MsgCode::MethodGet);
    request.options.set_uri_path(vec!["text"]);
    request.remote = Some(
        format!("127.0.0.1:{}", server_port)
            .parse::<SocketAddr>()
            .unwrap(),
    );
    request.timeout = Duration::from_secs(2);

    let callback_received = received.clone();
    let callback_payload = payload.clone();
    client
        .request(
            request,
            Some(Box::new(move |result, _request, response| {
                if result == TransactionResult::Success {
                    if let Some(response) = response {
                        *callback_payload.lock().unwrap() = response.payload.clone();
                    }
                }
                callback_received.store(true, Ordering::SeqCst);
            })),
        )
        .unwrap();

    let mut counter = 0;
    while !received.load(Ordering::SeqCst) {
        counter += 1;
        assert!(counter < 500, "timeout while waiting for the response");
        thread::sleep(Duration::from_millis(10));
    }

    assert_eq!(PAYLOAD.to_vec(), *payload.lock().unwrap());

    client_transport.close();
    server_transport.close();
}
