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

//! [`std::net::UdpSocket`]-backed [`Transport`](coap_endpoint::Transport)
//! for [`coap-endpoint`](coap_endpoint).
//!
//! ```no_run
//! use coap_endpoint::Coap;
//! use coap_endpoint_udp::UdpTransport;
//! use std::sync::Arc;
//!
//! let transport = Arc::new(UdpTransport::new(coap_endpoint::consts::DEFAULT_PORT_COAP_UDP));
//! let coap = Coap::new(transport.clone());
//! coap.transport().open().expect("UDP bind failed");
//! ```

#[macro_use]
extern crate log;

mod udp_transport;

pub use udp_transport::UdpTransport;
