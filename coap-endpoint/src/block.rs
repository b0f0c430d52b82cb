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

//! Block-wise transfer helpers: the `block1`/`block2` option value type and
//! construction of block-carrying requests and responses.

use crate::consts::MAX_TOKEN_LENGTH;
use crate::error::Error;
use crate::message::{random_token, Message, MsgCode, MsgType};

/// Type for interpreting and constructing `block1` and `block2` option
/// values.
///
/// The wire form is the integer `(num << 4) | (m << 3) | szx`, where the
/// actual block size is `2^(szx + 4)` bytes.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub struct BlockInfo(pub u32);

impl BlockInfo {
    const MORE_FLAG: u32 = 0b1000;

    /// Maximum legal value for `num`.
    pub const NUM_MAX: u32 = (1 << 20) - 1;

    /// Maximum legal value for `szx` (1024-byte blocks); 7 is reserved.
    pub const SZX_MAX: u8 = 6;

    /// Constructs a new `BlockInfo` from the block number, more flag, and
    /// size exponent. Returns `None` if `num` or `szx` is out of range.
    pub fn new(num: u32, m: bool, szx: u8) -> Option<BlockInfo> {
        if num > Self::NUM_MAX || szx > Self::SZX_MAX {
            None
        } else {
            Some(BlockInfo((num << 4) | ((m as u32) << 3) | u32::from(szx)))
        }
    }

    /// Block number value.
    #[inline]
    pub fn num(&self) -> u32 {
        self.0 >> 4
    }

    /// More flag value. If set, there are more blocks to follow.
    #[inline]
    pub fn more(&self) -> bool {
        (self.0 & Self::MORE_FLAG) == Self::MORE_FLAG
    }

    /// Block size exponent field value.
    #[inline]
    pub fn szx(&self) -> u8 {
        self.0 as u8 & 0b111
    }

    /// The size of this block, in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        1 << (self.szx() as usize + 4)
    }

    /// The offset (in bytes) that this block starts at.
    #[inline]
    pub fn offset(&self) -> usize {
        self.num() as usize * self.size()
    }
}

impl std::fmt::Display for BlockInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.num(), self.more() as u8, self.size())
    }
}

/// Returns the `num`-th block of `data` for block size `2^(szx + 4)` along
/// with the more flag. Returns `(None, false)` when the block offset lies at
/// or past the end of `data`.
pub fn extract_block(data: &[u8], num: u32, szx: u8) -> (Option<&[u8]>, bool) {
    let size = 1usize << (szx as usize + 4);
    let offset = num as usize * size;

    if offset >= data.len() {
        return (None, false);
    }

    let more = offset + size < data.len();
    let end = if more { offset + size } else { data.len() };

    (Some(&data[offset..end]), more)
}

/// Builds the `num`-th block-1 request of an upload of `data`.
///
/// Fails with [`Error::InvalidArgument`] unless the type is CON or NON, the
/// code is PUT or POST, and the block number addresses a block inside `data`.
pub fn build_block1_request(
    data: &[u8],
    num: u32,
    uri_path: &[&str],
    mtype: MsgType,
    code: MsgCode,
    szx: u8,
) -> Result<Message, Error> {
    if !mtype.is_con() && !mtype.is_non() {
        return Err(Error::InvalidArgument);
    }
    if code != MsgCode::MethodPut && code != MsgCode::MethodPost {
        return Err(Error::InvalidArgument);
    }

    BlockInfo::new(num, false, szx).ok_or(Error::InvalidArgument)?;
    let (payload, more) = extract_block(data, num, szx);
    let payload = payload.ok_or(Error::InvalidArgument)?;

    let mut request = Message::request(mtype, code);
    request.token = random_token(MAX_TOKEN_LENGTH);
    request.payload = payload.to_vec();
    request.options.set_uri_path(uri_path.iter().copied());
    request
        .options
        .set_block1(BlockInfo::new(num, more, szx).ok_or(Error::InvalidArgument)?);

    Ok(request)
}

/// Builds a response acknowledging the block-1 request `request`, echoing its
/// block descriptor: `2.31 Continue` while more blocks are expected and
/// `2.04 Changed` for the final block.
///
/// Fails with [`Error::InvalidArgument`] if the request carries no `block1`
/// option.
pub fn build_block1_response(request: &Message) -> Result<Message, Error> {
    let block1 = request.options.block1().ok_or(Error::InvalidArgument)?;

    let code = if block1.more() {
        MsgCode::SuccessContinue
    } else {
        MsgCode::SuccessChanged
    };

    let mut response = if request.mtype == Some(MsgType::Con) {
        Message::ack(request, code, Vec::new())
    } else {
        let mut msg = Message::request(MsgType::Non, code);
        msg.token = request.token;
        msg.remote = request.remote;
        msg
    };
    response.options.set_block1(block1);

    Ok(response)
}

/// Builds a GET request for the `num`-th block of a resource.
pub fn build_block2_request(
    num: u32,
    uri_path: &[&str],
    mtype: MsgType,
    szx: u8,
) -> Result<Message, Error> {
    if !mtype.is_con() && !mtype.is_non() {
        return Err(Error::InvalidArgument);
    }

    let block = BlockInfo::new(num, false, szx).ok_or(Error::InvalidArgument)?;

    let mut request = Message::request(mtype, MsgCode::MethodGet);
    request.token = random_token(MAX_TOKEN_LENGTH);
    request.options.set_uri_path(uri_path.iter().copied());
    request.options.set_block2(block);

    Ok(request)
}

/// Builds the block-2 response for `request`, carrying the block of `data`
/// the request's `block2` option asks for. The response is a piggybacked ACK
/// for a CON request and a NON message echoing the request's token otherwise.
///
/// Fails with [`Error::InvalidArgument`] if the request carries no `block2`
/// option or the requested block lies past the end of `data`.
pub fn build_block2_response(data: &[u8], request: &Message) -> Result<Message, Error> {
    let block2 = request.options.block2().ok_or(Error::InvalidArgument)?;

    let (payload, more) = extract_block(data, block2.num(), block2.szx());
    let payload = payload.ok_or(Error::InvalidArgument)?;

    let mut response = if request.mtype == Some(MsgType::Con) {
        Message::ack(request, MsgCode::SuccessContent, payload.to_vec())
    } else {
        let mut msg = Message::request(MsgType::Non, MsgCode::SuccessContent);
        msg.token = request.token;
        msg.remote = request.remote;
        msg.payload = payload.to_vec();
        msg
    };
    response
        .options
        .set_block2(BlockInfo::new(block2.num(), more, block2.szx()).ok_or(Error::InvalidArgument)?);

    Ok(response)
}
