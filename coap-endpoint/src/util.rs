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

/// Encodes an unsigned 32-bit value as the shortest big-endian byte string
/// that represents it. Zero encodes as the empty string; no leading zero
/// bytes are ever emitted.
pub(crate) fn encode_uint(value: u32) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let skip = (value.leading_zeros() / 8) as usize;
    bytes[skip..].to_vec()
}

/// Decodes a big-endian unsigned value of up to four bytes. The empty string
/// decodes to zero. Returns `None` for inputs longer than four bytes.
pub(crate) fn decode_uint(src: &[u8]) -> Option<u32> {
    if src.len() > 4 {
        return None;
    }
    Some(src.iter().fold(0u32, |acc, &b| (acc << 8) | u32::from(b)))
}
