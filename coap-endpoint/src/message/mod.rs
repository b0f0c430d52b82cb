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

//! CoAP message representation and codec.

mod msg_code;
mod msg_type;
mod token;

pub use msg_code::MsgCode;
pub use msg_type::MsgType;
pub use token::{random_token, MsgToken};

use crate::consts::COAP_VERSION;
use crate::error::Error;
use crate::option::{decode_options, encode_options, Options};
use crate::trans_params::{StandardCoapParams, TransParams};
use std::net::SocketAddr;
use std::time::Duration;

/// Type for CoAP message ids.
pub type MsgId = u16;

/// A CoAP message: header fields, token, options, and payload.
///
/// `mtype` and `mid` are optional so that a message can be constructed before
/// the endpoint assigns a message id; both must be present to [`encode`]
/// a message.
///
/// `remote` and `timeout` are transient fields that never appear on the wire:
/// `remote` names the peer the message was received from or will be sent to,
/// and `timeout` bounds how long the transaction layer waits for a response.
///
/// [`encode`]: Message::encode
#[derive(Debug, Clone)]
pub struct Message {
    /// Message type. Required for encoding.
    pub mtype: Option<MsgType>,

    /// Message code: a method, a response code, or `Empty`.
    pub code: MsgCode,

    /// Message id. Required for encoding; assigned by the endpoint when
    /// absent at send time.
    pub mid: Option<MsgId>,

    /// Token matching responses to requests. May be empty.
    pub token: MsgToken,

    /// The options carried by this message.
    pub options: Options,

    /// Payload bytes. May be empty, in which case no payload marker is
    /// emitted.
    pub payload: Vec<u8>,

    /// The peer endpoint. Not part of the wire form.
    pub remote: Option<SocketAddr>,

    /// Time the transaction layer waits for a response before reporting
    /// `Timeout`. Not part of the wire form.
    pub timeout: Duration,
}

impl Default for Message {
    fn default() -> Self {
        Message {
            mtype: None,
            code: MsgCode::Empty,
            mid: None,
            token: MsgToken::EMPTY,
            options: Options::new(),
            payload: Vec::new(),
            remote: None,
            timeout: StandardCoapParams::REQUEST_TIMEOUT,
        }
    }
}

/// Equality ignores the transient `remote` and `timeout` fields.
impl PartialEq for Message {
    fn eq(&self, other: &Message) -> bool {
        self.mtype == other.mtype
            && self.code == other.code
            && self.mid == other.mid
            && self.token == other.token
            && self.options == other.options
            && self.payload == other.payload
    }
}

impl Eq for Message {}

impl Message {
    /// Creates a new message with the given type, message id, and code.
    pub fn new(mtype: MsgType, mid: MsgId, code: MsgCode) -> Message {
        Message {
            mtype: Some(mtype),
            code,
            mid: Some(mid),
            ..Message::default()
        }
    }

    /// Creates a new request with no message id assigned yet. The endpoint
    /// picks the id (and a token, if none was set) when the request is sent.
    pub fn request(mtype: MsgType, code: MsgCode) -> Message {
        Message {
            mtype: Some(mtype),
            code,
            ..Message::default()
        }
    }

    /// Creates a `Message` from the binary representation of a message.
    ///
    /// Fails with [`Error::MalformedMessage`] when the datagram is too short,
    /// carries an unknown protocol version or code, or declares an oversized
    /// token; option-section failures surface as [`Error::BadOption`].
    pub fn decode(data: &[u8], remote: Option<SocketAddr>) -> Result<Message, Error> {
        if data.len() < 4 {
            return Err(Error::MalformedMessage);
        }

        let vttkl = data[0];
        if vttkl >> 6 != COAP_VERSION {
            return Err(Error::MalformedMessage);
        }

        let mtype = MsgType::try_from((vttkl >> 4) & 0x03).ok_or(Error::MalformedMessage)?;
        let token_length = (vttkl & 0x0F) as usize;

        let code = MsgCode::try_from(data[1]).ok_or(Error::MalformedMessage)?;
        let mid = u16::from_be_bytes([data[2], data[3]]);

        if data.len() < 4 + token_length {
            return Err(Error::MalformedMessage);
        }
        // Token lengths 9-15 are reserved; MsgToken::new rejects them.
        let token =
            MsgToken::new(&data[4..4 + token_length]).map_err(|_| Error::MalformedMessage)?;

        let (options, payload) = decode_options(&data[4 + token_length..])?;

        Ok(Message {
            mtype: Some(mtype),
            code,
            mid: Some(mid),
            token,
            options,
            payload: payload.to_vec(),
            remote,
            timeout: StandardCoapParams::REQUEST_TIMEOUT,
        })
    }

    /// Creates the binary representation of this message.
    ///
    /// Fails with [`Error::InvalidArgument`] if `mtype` or `mid` is unset.
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        let mtype = self.mtype.ok_or(Error::InvalidArgument)?;
        let mid = self.mid.ok_or(Error::InvalidArgument)?;

        let mut data = Vec::with_capacity(4 + self.token.len() + self.payload.len() + 16);
        data.push((COAP_VERSION << 6) | ((mtype as u8) << 4) | (self.token.len() as u8));
        data.push(self.code as u8);
        data.extend_from_slice(&mid.to_be_bytes());
        data.extend_from_slice(self.token.as_bytes());
        encode_options(&self.options, &mut data)?;
        if !self.payload.is_empty() {
            data.push(0xFF);
            data.extend_from_slice(&self.payload);
        }

        Ok(data)
    }

    /// Returns true if this message is a request.
    pub fn is_request(&self) -> bool {
        self.code.is_request()
    }

    /// Returns true if this message is a response.
    pub fn is_response(&self) -> bool {
        self.code.is_response()
    }

    /// Returns true if this message is a successful response.
    pub fn is_success(&self) -> bool {
        self.code.is_success()
    }

    /// Creates a piggybacked acknowledgement for `request`, echoing its
    /// message id and token.
    pub fn ack(request: &Message, code: MsgCode, payload: Vec<u8>) -> Message {
        Message {
            mtype: Some(MsgType::Ack),
            code,
            mid: request.mid,
            token: request.token,
            payload,
            remote: request.remote,
            ..Message::default()
        }
    }

    /// Creates an empty acknowledgement for `request`.
    pub fn empty_ack(request: &Message) -> Message {
        Message::empty_reply(request, MsgType::Ack)
    }

    /// Creates an empty reset message for `request`.
    pub fn empty_rst(request: &Message) -> Message {
        Message::empty_reply(request, MsgType::Rst)
    }

    fn empty_reply(request: &Message, mtype: MsgType) -> Message {
        Message {
            mtype: Some(mtype),
            code: MsgCode::Empty,
            mid: request.mid,
            remote: request.remote,
            ..Message::default()
        }
    }
}
