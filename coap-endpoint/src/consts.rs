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

//! Module defining various CoAP-related constants.

/// The standard default IP port number used for CoAP-over-UDP.
pub const DEFAULT_PORT_COAP_UDP: u16 = 5683;

/// The only protocol version defined by RFC 7252. Messages carrying any
/// other version number are rejected at decode time.
pub const COAP_VERSION: u8 = 1;

/// Maximum length of a message token, in bytes.
pub const MAX_TOKEN_LENGTH: usize = 8;

/// Default block size exponent for block-wise transfers (64-byte blocks).
pub const DEFAULT_BLOCK_SIZE_EXP: u8 = 2;
