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

use crate::block::BlockInfo;
use crate::error::Error;
use crate::util::{decode_uint, encode_uint};

/// The semantic kind of value an option number carries on the wire.
#[derive(Debug, Copy, Eq, PartialEq, Clone)]
pub enum OptionValueType {
    /// Zero-length option (e.g. If-None-Match).
    Empty,

    /// Uninterpreted byte string.
    Opaque,

    /// UTF-8 string.
    String,

    /// Minimal big-endian unsigned integer.
    Uint,

    /// Block1/Block2 descriptor.
    Block,
}

/// A single decoded option value.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum OptionValue {
    /// A zero-length value.
    Empty,

    /// An uninterpreted byte string.
    Opaque(Vec<u8>),

    /// A UTF-8 string.
    String(String),

    /// An unsigned integer.
    Uint(u32),

    /// A block descriptor.
    Block(BlockInfo),
}

impl OptionValue {
    /// Decodes a raw option value of the given kind.
    ///
    /// A non-empty value for an `Empty`-kind option is preserved as opaque
    /// bytes rather than rejected.
    pub fn decode(kind: OptionValueType, raw: &[u8]) -> Result<OptionValue, Error> {
        match kind {
            OptionValueType::Empty if raw.is_empty() => Ok(OptionValue::Empty),
            OptionValueType::Empty | OptionValueType::Opaque => {
                Ok(OptionValue::Opaque(raw.to_vec()))
            }
            OptionValueType::String => match std::str::from_utf8(raw) {
                Ok(s) => Ok(OptionValue::String(s.to_owned())),
                Err(_) => Err(Error::BadOption),
            },
            OptionValueType::Uint => decode_uint(raw)
                .map(OptionValue::Uint)
                .ok_or(Error::BadOption),
            OptionValueType::Block => decode_uint(raw)
                .map(|value| OptionValue::Block(BlockInfo(value)))
                .ok_or(Error::BadOption),
        }
    }

    /// Encodes this value into its wire form. Length is implicit in the
    /// returned bytes.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            OptionValue::Empty => Vec::new(),
            OptionValue::Opaque(bytes) => bytes.clone(),
            OptionValue::String(s) => s.as_bytes().to_vec(),
            OptionValue::Uint(value) => encode_uint(*value),
            OptionValue::Block(block) => encode_uint(block.0),
        }
    }

    /// Returns the string form of this value, if it is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the opaque bytes of this value, if it is opaque.
    pub fn as_opaque(&self) -> Option<&[u8]> {
        match self {
            OptionValue::Opaque(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Returns the integer form of this value, if it is an integer.
    pub fn as_uint(&self) -> Option<u32> {
        match self {
            OptionValue::Uint(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the block descriptor, if this value is one.
    pub fn as_block(&self) -> Option<BlockInfo> {
        match self {
            OptionValue::Block(block) => Some(*block),
            _ => None,
        }
    }
}
