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

//! A callback-driven implementation of the Constrained Application Protocol
//! (CoAP, [RFC 7252]).
//!
//! This crate implements the CoAP *message layer* (confirmable retransmission
//! with exponential backoff and jitter, duplicate detection, separate
//! responses, piggybacked acknowledgements, reset handling) and the
//! *request/response layer* (matching responses to outstanding requests by
//! token), together with the option codec and block-wise transfer helpers.
//! One [`Coap`] endpoint both serves resources, through a registered
//! [`RequestHandler`], and issues requests, over the same datagram
//! [`Transport`].
//!
//! The engine is not async: it is driven by inbound datagrams and by an
//! internal one-shot [`Timer`], and delivers results through completion
//! callbacks. Wrapping [`Coap::request`] in a future is a matter of
//! completing the future from the callback.
//!
//! [RFC 7252]: https://tools.ietf.org/html/rfc7252
//!
//! ```
//! use coap_endpoint::{Coap, Message, MsgCode, MsgType, TransactionResult};
//! use coap_endpoint::TesterTransport;
//! use std::sync::Arc;
//!
//! let transport = Arc::new(TesterTransport::new());
//! let coap = Coap::new(transport.clone());
//!
//! let mut request = Message::request(MsgType::Con, MsgCode::MethodGet);
//! request.options.set_uri_path(vec!["sensors", "temperature"]);
//! request.remote = Some("192.0.2.1:5683".parse().unwrap());
//!
//! let handle = coap
//!     .request(
//!         request,
//!         Some(Box::new(|result, _request, response| {
//!             if result == TransactionResult::Success {
//!                 println!("{:?}", response.map(|r| r.payload.clone()));
//!             }
//!         })),
//!     )
//!     .unwrap();
//!
//! // The request went out through the transport and can still be cancelled.
//! assert_eq!(1, transport.output_count());
//! coap.cancel_request(&handle);
//! ```

#[macro_use]
extern crate log;

pub mod block;
pub mod consts;
pub mod handler;
pub mod message;
pub mod option;
pub mod timer;
pub mod trans_params;
pub mod transport;

mod content_format;
mod endpoint;
mod error;
mod message_layer;
mod transaction_layer;
mod util;

pub use block::{
    build_block1_request, build_block1_response, build_block2_request, build_block2_response,
    extract_block, BlockInfo,
};
pub use content_format::ContentFormat;
pub use endpoint::Coap;
pub use error::Error;
pub use handler::{
    HandlerFn, MethodDispatcher, MethodHandler, MethodOutcome, RequestHandler, RequestOutcome,
};
pub use message::{random_token, Message, MsgCode, MsgId, MsgToken, MsgType};
pub use option::{OptionNumber, OptionValue, OptionValueType, Options};
pub use timer::{Timer, TimerHandle};
pub use trans_params::{StandardCoapParams, TransParams};
pub use transaction_layer::{ResponseCallback, TransactionResult};
pub use transport::{Receivers, TesterTransport, Transport, TransportReceiver};
