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

use super::OptionValueType;

/// Type representing a CoAP option number.
#[derive(Debug, Copy, Eq, PartialEq, Hash, Clone, Ord, PartialOrd)]
pub struct OptionNumber(pub u16);

impl OptionNumber {
    /// IF_MATCH option.
    pub const IF_MATCH: OptionNumber = OptionNumber(1);

    /// URI_HOST option.
    pub const URI_HOST: OptionNumber = OptionNumber(3);

    /// ETAG option.
    pub const ETAG: OptionNumber = OptionNumber(4);

    /// IF_NONE_MATCH option.
    pub const IF_NONE_MATCH: OptionNumber = OptionNumber(5);

    /// OBSERVE option.
    pub const OBSERVE: OptionNumber = OptionNumber(6);

    /// URI_PORT option.
    pub const URI_PORT: OptionNumber = OptionNumber(7);

    /// LOCATION_PATH option.
    pub const LOCATION_PATH: OptionNumber = OptionNumber(8);

    /// URI_PATH option.
    pub const URI_PATH: OptionNumber = OptionNumber(11);

    /// CONTENT_FORMAT option.
    pub const CONTENT_FORMAT: OptionNumber = OptionNumber(12);

    /// MAX_AGE option.
    pub const MAX_AGE: OptionNumber = OptionNumber(14);

    /// URI_QUERY option.
    pub const URI_QUERY: OptionNumber = OptionNumber(15);

    /// ACCEPT option.
    pub const ACCEPT: OptionNumber = OptionNumber(17);

    /// LOCATION_QUERY option.
    pub const LOCATION_QUERY: OptionNumber = OptionNumber(20);

    /// BLOCK2 option.
    pub const BLOCK2: OptionNumber = OptionNumber(23);

    /// BLOCK1 option.
    pub const BLOCK1: OptionNumber = OptionNumber(27);

    /// SIZE2 option.
    pub const SIZE2: OptionNumber = OptionNumber(28);

    /// PROXY_URI option.
    pub const PROXY_URI: OptionNumber = OptionNumber(35);

    /// PROXY_SCHEME option.
    pub const PROXY_SCHEME: OptionNumber = OptionNumber(39);

    /// SIZE1 option.
    pub const SIZE1: OptionNumber = OptionNumber(60);

    /// Returns the semantic kind of value carried by this option number.
    /// Unrecognized numbers decode as opaque.
    pub fn value_type(self) -> OptionValueType {
        match self {
            OptionNumber::IF_MATCH => OptionValueType::Opaque,
            OptionNumber::URI_HOST => OptionValueType::String,
            OptionNumber::ETAG => OptionValueType::Opaque,
            OptionNumber::IF_NONE_MATCH => OptionValueType::Empty,
            OptionNumber::OBSERVE => OptionValueType::Uint,
            OptionNumber::URI_PORT => OptionValueType::Uint,
            OptionNumber::LOCATION_PATH => OptionValueType::String,
            OptionNumber::URI_PATH => OptionValueType::String,
            OptionNumber::CONTENT_FORMAT => OptionValueType::Uint,
            OptionNumber::MAX_AGE => OptionValueType::Uint,
            OptionNumber::URI_QUERY => OptionValueType::String,
            OptionNumber::ACCEPT => OptionValueType::Uint,
            OptionNumber::LOCATION_QUERY => OptionValueType::String,
            OptionNumber::BLOCK2 => OptionValueType::Block,
            OptionNumber::BLOCK1 => OptionValueType::Block,
            OptionNumber::SIZE2 => OptionValueType::Uint,
            OptionNumber::PROXY_URI => OptionValueType::String,
            OptionNumber::PROXY_SCHEME => OptionValueType::String,
            OptionNumber::SIZE1 => OptionValueType::Uint,
            OptionNumber(_) => OptionValueType::Opaque,
        }
    }
}

impl std::fmt::Display for OptionNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for OptionNumber {
    fn from(x: u16) -> Self {
        OptionNumber(x)
    }
}
