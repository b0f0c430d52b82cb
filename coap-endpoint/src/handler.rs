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

//! The application-facing request handler interface.

use crate::message::{Message, MsgCode};

/// Outcome of handling an incoming request.
#[derive(Debug)]
pub enum RequestOutcome {
    /// Send this response. For a confirmable request an ACK-typed response
    /// is piggybacked; CON/NON responses are sent on their own.
    Respond(Message),

    /// No response will be sent for this request.
    NoResponse,

    /// The application will answer later through
    /// [`Coap::send_response`](crate::Coap::send_response). For a confirmable
    /// request the endpoint emits an empty ACK once
    /// [`EMPTY_ACK_DELAY`](crate::TransParams::EMPTY_ACK_DELAY) elapses, and
    /// the eventual response travels as a separate CON or NON carrying the
    /// request's token.
    Deferred,
}

/// Application-side handler for incoming requests.
///
/// An endpoint has at most one registered handler; registering another
/// replaces it.
pub trait RequestHandler: Send + Sync {
    /// Called once for every distinct incoming request. Duplicates within
    /// the dedup window never reach this method.
    fn receive_request(&self, request: &Message) -> RequestOutcome;
}

/// Wraps a closure as a [`RequestHandler`].
#[derive(Debug)]
pub struct HandlerFn<F>(pub F);

impl<F> RequestHandler for HandlerFn<F>
where
    F: Fn(&Message) -> RequestOutcome + Send + Sync,
{
    fn receive_request(&self, request: &Message) -> RequestOutcome {
        (self.0)(request)
    }
}

/// Outcome of one [`MethodHandler`] operation.
#[derive(Debug)]
pub enum MethodOutcome {
    /// Send this response.
    Respond(Message),

    /// The resource does not allow this method; the dispatcher answers
    /// `4.05 Method Not Allowed`.
    NotAllowed,

    /// No response will be sent.
    NoResponse,

    /// The application will answer later; see [`RequestOutcome::Deferred`].
    Deferred,
}

/// Request handler with one operation per CoAP method.
///
/// Every operation defaults to [`MethodOutcome::NotAllowed`]; a resource
/// implements only the methods it supports. Use [`MethodDispatcher`] to
/// register one of these with an endpoint.
pub trait MethodHandler: Send + Sync {
    /// Handles a GET request.
    fn on_get(&self, request: &Message) -> MethodOutcome {
        let _ = request;
        MethodOutcome::NotAllowed
    }

    /// Handles a POST request.
    fn on_post(&self, request: &Message) -> MethodOutcome {
        let _ = request;
        MethodOutcome::NotAllowed
    }

    /// Handles a PUT request.
    fn on_put(&self, request: &Message) -> MethodOutcome {
        let _ = request;
        MethodOutcome::NotAllowed
    }

    /// Handles a DELETE request.
    fn on_delete(&self, request: &Message) -> MethodOutcome {
        let _ = request;
        MethodOutcome::NotAllowed
    }
}

/// Adapter dispatching requests to a [`MethodHandler`] by method code.
///
/// [`MethodOutcome::NotAllowed`] and methods outside GET/POST/PUT/DELETE are
/// answered with a piggybacked `4.05 Method Not Allowed`.
#[derive(Debug)]
pub struct MethodDispatcher<H>(pub H);

impl<H: MethodHandler> RequestHandler for MethodDispatcher<H> {
    fn receive_request(&self, request: &Message) -> RequestOutcome {
        let outcome = match request.code {
            MsgCode::MethodGet => self.0.on_get(request),
            MsgCode::MethodPost => self.0.on_post(request),
            MsgCode::MethodPut => self.0.on_put(request),
            MsgCode::MethodDelete => self.0.on_delete(request),
            _ => MethodOutcome::NotAllowed,
        };

        match outcome {
            MethodOutcome::Respond(response) => RequestOutcome::Respond(response),
            MethodOutcome::NoResponse => RequestOutcome::NoResponse,
            MethodOutcome::Deferred => RequestOutcome::Deferred,
            MethodOutcome::NotAllowed => RequestOutcome::Respond(Message::ack(
                request,
                MsgCode::ClientErrorMethodNotAllowed,
                b"Error: Method not allowed!".to_vec(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MsgType;

    struct GetOnly;

    impl MethodHandler for GetOnly {
        fn on_get(&self, request: &Message) -> MethodOutcome {
            MethodOutcome::Respond(Message::ack(
                request,
                MsgCode::SuccessContent,
                b"ok".to_vec(),
            ))
        }
    }

    #[test]
    fn dispatches_to_implemented_method() {
        let dispatcher = MethodDispatcher(GetOnly);
        let request = Message::new(MsgType::Con, 7, MsgCode::MethodGet);

        match dispatcher.receive_request(&request) {
            RequestOutcome::Respond(response) => {
                assert_eq!(MsgCode::SuccessContent, response.code);
                assert_eq!(request.mid, response.mid);
            }
            _ => panic!("expected a response"),
        }
    }

    #[test]
    fn unimplemented_method_is_not_allowed() {
        let dispatcher = MethodDispatcher(GetOnly);
        let request = Message::new(MsgType::Con, 7, MsgCode::MethodDelete);

        match dispatcher.receive_request(&request) {
            RequestOutcome::Respond(response) => {
                assert_eq!(MsgCode::ClientErrorMethodNotAllowed, response.code);
            }
            _ => panic!("expected a response"),
        }
    }
}
