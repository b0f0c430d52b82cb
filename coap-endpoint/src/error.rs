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

use std::fmt::{Debug, Display, Formatter};

/// Type for errors encountered while encoding, decoding, or exchanging CoAP
/// messages.
///
/// Transaction outcomes (`Timeout`, `Reset`, `Cancelled`) are not errors; they
/// are delivered to completion callbacks as
/// [`TransactionResult`](crate::TransactionResult) values.
#[derive(Debug, Eq, PartialEq, Hash, Copy, Clone)]
pub enum Error {
    /// One or more of the supplied arguments are not valid for the given
    /// operation.
    InvalidArgument,

    /// The datagram could not be parsed as a CoAP message.
    MalformedMessage,

    /// The option section of a message could not be parsed.
    BadOption,

    /// An acknowledgement arrived for a message id with no exchange in flight.
    UnexpectedAck,

    /// An I/O error occurred while performing this operation.
    IOError,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        <Self as Debug>::fmt(self, f)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(_: std::io::Error) -> Self {
        Error::IOError
    }
}
