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

//! Wire codec for the option section of a message.

use super::{OptionNumber, OptionValue, Options};
use crate::error::Error;

/// Decodes a large option delta or option length from its nibble and the
/// bytes that follow it.
///
/// Nibble values 0-12 carry the literal value; 13 means one extended byte
/// follows (add 13); 14 means two big-endian extended bytes follow (add 269).
/// Returns the decoded value and the remaining bytes. Nibble 15 is reserved
/// and fails with [`Error::BadOption`], as does an extended field that
/// overruns the buffer.
pub fn read_extended_field_value(value: u8, data: &[u8]) -> Result<(u32, &[u8]), Error> {
    match value {
        0..=12 => Ok((u32::from(value), data)),
        13 => match data.split_first() {
            Some((&ext, rest)) => Ok((u32::from(ext) + 13, rest)),
            None => Err(Error::BadOption),
        },
        14 => {
            if data.len() < 2 {
                return Err(Error::BadOption);
            }
            let ext = u32::from(u16::from_be_bytes([data[0], data[1]]));
            Ok((ext + 269, &data[2..]))
        }
        _ => Err(Error::BadOption),
    }
}

/// Encodes a large option delta or option length as a nibble plus zero, one,
/// or two extended bytes.
///
/// Fails with [`Error::InvalidArgument`] for values that do not fit the
/// two-byte extended form (65805 and up).
pub fn write_extended_field_value(value: u32) -> Result<(u8, Vec<u8>), Error> {
    if value < 13 {
        Ok((value as u8, Vec::new()))
    } else if value < 269 {
        Ok((13, vec![(value - 13) as u8]))
    } else if value < 65805 {
        Ok((14, ((value - 269) as u16).to_be_bytes().to_vec()))
    } else {
        Err(Error::InvalidArgument)
    }
}

/// Decodes the option section of a message.
///
/// Decoding ends at end-of-buffer or at the `0xFF` payload marker; the bytes
/// after the marker are returned as the payload.
pub fn decode_options(mut data: &[u8]) -> Result<(Options, &[u8]), Error> {
    let mut options = Options::new();
    let mut number: u32 = 0;

    while let Some((&header, after_header)) = data.split_first() {
        if header == 0xFF {
            return Ok((options, after_header));
        }

        let (delta, rest) = read_extended_field_value(header >> 4, after_header)?;
        let (length, rest) = read_extended_field_value(header & 0x0F, rest)?;

        number += delta;
        if number > u32::from(u16::MAX) {
            return Err(Error::BadOption);
        }

        let length = length as usize;
        if rest.len() < length {
            return Err(Error::BadOption);
        }

        let option_number = OptionNumber(number as u16);
        let value = OptionValue::decode(option_number.value_type(), &rest[..length])?;
        options.push(option_number, value);

        data = &rest[length..];
    }

    Ok((options, &[]))
}

/// Encodes all options in ascending number order, delta-encoded against the
/// previous option's number, appending to `out`.
pub fn encode_options(options: &Options, out: &mut Vec<u8>) -> Result<(), Error> {
    let mut current: u32 = 0;

    for (number, value) in options.iter() {
        let raw = value.encode();
        let (delta_nibble, extended_delta) =
            write_extended_field_value(u32::from(number.0) - current)?;
        let (length_nibble, extended_length) = write_extended_field_value(raw.len() as u32)?;

        out.push((delta_nibble << 4) | length_nibble);
        out.extend_from_slice(&extended_delta);
        out.extend_from_slice(&extended_length);
        out.extend_from_slice(&raw);

        current = u32::from(number.0);
    }

    Ok(())
}
