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

use std::fmt::{Display, Formatter};

/// A type for representing a CoAP Content-Format value.
#[derive(Debug, Copy, Eq, PartialEq, Hash, Clone, Ord, PartialOrd)]
pub struct ContentFormat(pub u16);

impl ContentFormat {
    /// From IETF-RFC7252.
    pub const TEXT_PLAIN_UTF8: ContentFormat = ContentFormat(0);

    /// From IETF-RFC7252.
    pub const APPLICATION_LINK_FORMAT: ContentFormat = ContentFormat(40);

    /// From IETF-RFC7252.
    pub const APPLICATION_XML: ContentFormat = ContentFormat(41);

    /// From IETF-RFC7252.
    pub const APPLICATION_OCTET_STREAM: ContentFormat = ContentFormat(42);

    /// From IETF-RFC7252.
    pub const APPLICATION_EXI: ContentFormat = ContentFormat(47);

    /// From IETF-RFC7252.
    pub const APPLICATION_JSON: ContentFormat = ContentFormat(50);

    /// From IETF-RFC7049 Concise Binary Object Representation (CBOR).
    pub const APPLICATION_CBOR: ContentFormat = ContentFormat(60);
}

impl From<u16> for ContentFormat {
    fn from(x: u16) -> Self {
        ContentFormat(x)
    }
}

impl Display for ContentFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        match *self {
            ContentFormat::TEXT_PLAIN_UTF8 => f.write_str("text/plain;charset=utf-8"),
            ContentFormat::APPLICATION_LINK_FORMAT => f.write_str("application/link-format"),
            ContentFormat::APPLICATION_XML => f.write_str("application/xml"),
            ContentFormat::APPLICATION_OCTET_STREAM => f.write_str("application/octet-stream"),
            ContentFormat::APPLICATION_EXI => f.write_str("application/exi"),
            ContentFormat::APPLICATION_JSON => f.write_str("application/json"),
            ContentFormat::APPLICATION_CBOR => f.write_str("application/cbor"),
            ContentFormat(x) => write!(f, "application/x-coap-{}", x),
        }
    }
}
