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

use crate::consts::MAX_TOKEN_LENGTH;
use crate::error::Error;
use rand::Rng;

/// Type for holding the value of a CoAP message token: zero to eight bytes
/// chosen by the requester, echoed by responses.
///
/// Tokens are value types; unused trailing bytes are always zero, so the
/// derived equality and hashing see only the populated prefix.
#[derive(Debug, Eq, PartialEq, Hash, Copy, Clone, Ord, PartialOrd)]
pub struct MsgToken {
    bytes: [u8; MAX_TOKEN_LENGTH],
    len: u8,
}

impl MsgToken {
    /// The zero-length token.
    pub const EMPTY: MsgToken = MsgToken {
        bytes: [0; MAX_TOKEN_LENGTH],
        len: 0,
    };

    /// Creates a token holding a copy of `value`.
    ///
    /// Fails with [`Error::InvalidArgument`] when `value` is longer than
    /// [`MAX_TOKEN_LENGTH`].
    pub fn new(value: &[u8]) -> Result<MsgToken, Error> {
        if value.len() > MAX_TOKEN_LENGTH {
            return Err(Error::InvalidArgument);
        }

        let mut token = MsgToken::EMPTY;
        token.bytes[..value.len()].copy_from_slice(value);
        token.len = value.len() as u8;
        Ok(token)
    }

    /// Returns the length of this token.
    pub fn len(&self) -> usize {
        usize::from(self.len)
    }

    /// Returns true if the length of this token is zero.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns a byte slice containing this token.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len()]
    }
}

impl Default for MsgToken {
    fn default() -> Self {
        MsgToken::EMPTY
    }
}

impl std::fmt::Display for MsgToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return f.write_str("(empty)");
        }
        for byte in self.as_bytes() {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Generates a new random token of the given length, drawn from the
/// thread-local CSPRNG.
///
/// Panics if `length` is greater than [`MAX_TOKEN_LENGTH`].
pub fn random_token(length: usize) -> MsgToken {
    assert!(length <= MAX_TOKEN_LENGTH);
    let mut token = MsgToken::EMPTY;
    rand::thread_rng().fill(&mut token.bytes[..length]);
    token.len = length as u8;
    token
}
