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

/// Enum representing a CoAP message code.
#[derive(Debug, Copy, Eq, PartialEq, Clone, Hash)]
pub enum MsgCode {
    /// Empty message code. Only used for ping requests, resets, and empty
    /// acknowledgements.
    Empty = 0x00,

    /// CoAP GET method.
    MethodGet = 0x01,

    /// CoAP POST method.
    MethodPost = 0x02,

    /// CoAP PUT method.
    MethodPut = 0x03,

    /// CoAP DELETE method.
    MethodDelete = 0x04,

    /// CoAP CREATED success code.
    SuccessCreated = 0x41,

    /// CoAP DELETED success code.
    SuccessDeleted = 0x42,

    /// CoAP VALID success code.
    SuccessValid = 0x43,

    /// CoAP CHANGED success code.
    SuccessChanged = 0x44,

    /// CoAP CONTENT success code.
    SuccessContent = 0x45,

    /// CoAP CONTINUE success code.
    SuccessContinue = 0x5F,

    /// CoAP BAD_REQUEST client error.
    ClientErrorBadRequest = 0x80,

    /// CoAP UNAUTHORIZED client error.
    ClientErrorUnauthorized = 0x81,

    /// CoAP BAD_OPTION client error.
    ClientErrorBadOption = 0x82,

    /// CoAP FORBIDDEN client error.
    ClientErrorForbidden = 0x83,

    /// CoAP NOT_FOUND client error.
    ClientErrorNotFound = 0x84,

    /// CoAP METHOD_NOT_ALLOWED client error.
    ClientErrorMethodNotAllowed = 0x85,

    /// CoAP NOT_ACCEPTABLE client error.
    ClientErrorNotAcceptable = 0x86,

    /// CoAP REQUEST_ENTITY_INCOMPLETE client error.
    ClientErrorRequestEntityIncomplete = 0x88,

    /// CoAP PRECONDITION_FAILED client error.
    ClientErrorPreconditionFailed = 0x8C,

    /// CoAP REQUEST_ENTITY_TOO_LARGE client error.
    ClientErrorRequestEntityTooLarge = 0x8D,

    /// CoAP UNSUPPORTED_MEDIA_TYPE client error.
    ClientErrorUnsupportedMediaType = 0x8F,

    /// CoAP INTERNAL_SERVER_ERROR server error.
    ServerErrorInternalServerError = 0xA0,

    /// CoAP NOT_IMPLEMENTED server error.
    ServerErrorNotImplemented = 0xA1,

    /// CoAP BAD_GATEWAY server error.
    ServerErrorBadGateway = 0xA2,

    /// CoAP SERVICE_UNAVAILABLE server error.
    ServerErrorServiceUnavailable = 0xA3,

    /// CoAP GATEWAY_TIMEOUT server error.
    ServerErrorGatewayTimeout = 0xA4,

    /// CoAP PROXYING_NOT_SUPPORTED server error.
    ServerErrorProxyingNotSupported = 0xA5,
}

impl MsgCode {
    /// Tries to convert the given `u8` into a `MsgCode`. If the given code
    /// isn't recognized, this method will return `None`.
    pub fn try_from(x: u8) -> Option<MsgCode> {
        use MsgCode::*;
        match x {
            0x00 => Some(Empty),
            0x01 => Some(MethodGet),
            0x02 => Some(MethodPost),
            0x03 => Some(MethodPut),
            0x04 => Some(MethodDelete),

            0x41 => Some(SuccessCreated),
            0x42 => Some(SuccessDeleted),
            0x43 => Some(SuccessValid),
            0x44 => Some(SuccessChanged),
            0x45 => Some(SuccessContent),
            0x5F => Some(SuccessContinue),

            0x80 => Some(ClientErrorBadRequest),
            0x81 => Some(ClientErrorUnauthorized),
            0x82 => Some(ClientErrorBadOption),
            0x83 => Some(ClientErrorForbidden),
            0x84 => Some(ClientErrorNotFound),
            0x85 => Some(ClientErrorMethodNotAllowed),
            0x86 => Some(ClientErrorNotAcceptable),
            0x88 => Some(ClientErrorRequestEntityIncomplete),
            0x8C => Some(ClientErrorPreconditionFailed),
            0x8D => Some(ClientErrorRequestEntityTooLarge),
            0x8F => Some(ClientErrorUnsupportedMediaType),

            0xA0 => Some(ServerErrorInternalServerError),
            0xA1 => Some(ServerErrorNotImplemented),
            0xA2 => Some(ServerErrorBadGateway),
            0xA3 => Some(ServerErrorServiceUnavailable),
            0xA4 => Some(ServerErrorGatewayTimeout),
            0xA5 => Some(ServerErrorProxyingNotSupported),

            _ => None,
        }
    }

    /// Returns true if this is the empty code.
    pub fn is_empty(self) -> bool {
        self as u8 == 0
    }

    /// Returns true if this code is a request method (`0.01`-`0.31`).
    pub fn is_request(self) -> bool {
        let code = self as u8;
        code >= 0x01 && code < 0x20
    }

    /// Returns true if this code is a response (`2.00`-`5.31`).
    pub fn is_response(self) -> bool {
        let code = self as u8;
        code >= 0x40 && code < 0xC0
    }

    /// Returns true if this code indicates success (`2.00`-`2.31`).
    pub fn is_success(self) -> bool {
        let code = self as u8;
        code >= 0x40 && code < 0x60
    }
}

impl Default for MsgCode {
    fn default() -> Self {
        MsgCode::Empty
    }
}

impl core::convert::From<MsgCode> for u8 {
    fn from(code: MsgCode) -> Self {
        code as u8
    }
}
