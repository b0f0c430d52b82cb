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

//! CoAP option processing: option numbers, typed values, the ordered option
//! multimap, and the option wire codec.

mod codec;
mod num;
mod value;

pub use codec::{
    decode_options, encode_options, read_extended_field_value, write_extended_field_value,
};
pub use num::OptionNumber;
pub use value::{OptionValue, OptionValueType};

use crate::block::BlockInfo;
use crate::content_format::ContentFormat;
use std::collections::BTreeMap;
use std::convert::TryFrom;

/// The options carried by a message: a multimap keyed by option number.
///
/// Options are emitted in ascending number order; within one number,
/// insertion order is preserved. Setters replace all options of their number.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Options {
    map: BTreeMap<OptionNumber, Vec<OptionValue>>,
}

impl Options {
    /// Creates an empty option set.
    pub fn new() -> Options {
        Options::default()
    }

    /// Appends an option value under the given number.
    pub fn push(&mut self, number: OptionNumber, value: OptionValue) {
        self.map.entry(number).or_insert_with(Vec::new).push(value);
    }

    /// Returns all values stored under the given number, in insertion order.
    pub fn get(&self, number: OptionNumber) -> &[OptionValue] {
        self.map.get(&number).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Removes all values stored under the given number.
    pub fn remove(&mut self, number: OptionNumber) {
        self.map.remove(&number);
    }

    /// Returns the total number of option instances.
    pub fn len(&self) -> usize {
        self.map.values().map(Vec::len).sum()
    }

    /// Returns true if no options are present.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterates over all options in wire emission order.
    pub fn iter(&self) -> impl Iterator<Item = (OptionNumber, &OptionValue)> + '_ {
        self.map
            .iter()
            .flat_map(|(number, values)| values.iter().map(move |value| (*number, value)))
    }

    fn string_segments(&self, number: OptionNumber) -> Vec<String> {
        self.get(number)
            .iter()
            .filter_map(OptionValue::as_str)
            .map(str::to_owned)
            .collect()
    }

    fn set_string_segments<I, S>(&mut self, number: OptionNumber, segments: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.remove(number);
        for segment in segments {
            self.push(number, OptionValue::String(segment.into()));
        }
    }

    fn single_uint(&self, number: OptionNumber) -> Option<u32> {
        self.get(number).first().and_then(OptionValue::as_uint)
    }

    fn set_single_uint(&mut self, number: OptionNumber, value: u32) {
        self.remove(number);
        self.push(number, OptionValue::Uint(value));
    }

    /// Convenience getter: Uri-Path segments.
    pub fn uri_path(&self) -> Vec<String> {
        self.string_segments(OptionNumber::URI_PATH)
    }

    /// Convenience setter: Uri-Path option. Takes a sequence of segments;
    /// passing one scalar string for a multi-segment path is a type error
    /// here, not a runtime one.
    pub fn set_uri_path<I, S>(&mut self, segments: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_string_segments(OptionNumber::URI_PATH, segments);
    }

    /// The Uri-Path segments joined into a single `/`-prefixed string.
    pub fn uri_path_as_string(&self) -> String {
        format!("/{}", self.uri_path().join("/"))
    }

    /// Convenience getter: Uri-Query segments.
    pub fn uri_query(&self) -> Vec<String> {
        self.string_segments(OptionNumber::URI_QUERY)
    }

    /// Convenience setter: Uri-Query option.
    pub fn set_uri_query<I, S>(&mut self, segments: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_string_segments(OptionNumber::URI_QUERY, segments);
    }

    /// Convenience getter: Location-Path segments.
    pub fn location_path(&self) -> Vec<String> {
        self.string_segments(OptionNumber::LOCATION_PATH)
    }

    /// Convenience setter: Location-Path option.
    pub fn set_location_path<I, S>(&mut self, segments: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_string_segments(OptionNumber::LOCATION_PATH, segments);
    }

    /// Convenience getter: Block1 option.
    pub fn block1(&self) -> Option<BlockInfo> {
        self.get(OptionNumber::BLOCK1).first().and_then(OptionValue::as_block)
    }

    /// Convenience setter: Block1 option.
    pub fn set_block1(&mut self, block: BlockInfo) {
        self.remove(OptionNumber::BLOCK1);
        self.push(OptionNumber::BLOCK1, OptionValue::Block(block));
    }

    /// Convenience getter: Block2 option.
    pub fn block2(&self) -> Option<BlockInfo> {
        self.get(OptionNumber::BLOCK2).first().and_then(OptionValue::as_block)
    }

    /// Convenience setter: Block2 option.
    pub fn set_block2(&mut self, block: BlockInfo) {
        self.remove(OptionNumber::BLOCK2);
        self.push(OptionNumber::BLOCK2, OptionValue::Block(block));
    }

    /// Convenience getter: Content-Format option.
    pub fn content_format(&self) -> Option<ContentFormat> {
        self.single_uint(OptionNumber::CONTENT_FORMAT)
            .and_then(|value| u16::try_from(value).ok())
            .map(ContentFormat)
    }

    /// Convenience setter: Content-Format option.
    pub fn set_content_format(&mut self, format: ContentFormat) {
        self.set_single_uint(OptionNumber::CONTENT_FORMAT, u32::from(format.0));
    }

    /// Convenience getter: Accept option.
    pub fn accept(&self) -> Option<ContentFormat> {
        self.single_uint(OptionNumber::ACCEPT)
            .and_then(|value| u16::try_from(value).ok())
            .map(ContentFormat)
    }

    /// Convenience setter: Accept option.
    pub fn set_accept(&mut self, format: ContentFormat) {
        self.set_single_uint(OptionNumber::ACCEPT, u32::from(format.0));
    }

    /// Convenience getter: Observe option.
    pub fn observe(&self) -> Option<u32> {
        self.single_uint(OptionNumber::OBSERVE)
    }

    /// Convenience setter: Observe option.
    pub fn set_observe(&mut self, value: u32) {
        self.set_single_uint(OptionNumber::OBSERVE, value);
    }

    /// Access to a single ETag on the message (as used in responses).
    pub fn etag(&self) -> Option<&[u8]> {
        self.get(OptionNumber::ETAG).first().and_then(OptionValue::as_opaque)
    }

    /// Sets the single ETag of a response.
    pub fn set_etag(&mut self, etag: &[u8]) {
        self.remove(OptionNumber::ETAG);
        self.push(OptionNumber::ETAG, OptionValue::Opaque(etag.to_vec()));
    }

    /// Access to the list of ETags on the message (as used in requests).
    pub fn etags(&self) -> Vec<&[u8]> {
        self.get(OptionNumber::ETAG)
            .iter()
            .filter_map(OptionValue::as_opaque)
            .collect()
    }

    /// Sets the list of ETags of a request.
    pub fn set_etags<I>(&mut self, etags: I)
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        self.remove(OptionNumber::ETAG);
        for etag in etags {
            self.push(OptionNumber::ETAG, OptionValue::Opaque(etag));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_path_accessors() {
        let mut options = Options::new();
        options.set_uri_path(vec!["core"]);
        assert_eq!(1, options.get(OptionNumber::URI_PATH).len());
        assert_eq!(vec!["core".to_owned()], options.uri_path());
        assert_eq!("/core", options.uri_path_as_string());

        let mut options = Options::new();
        options.set_uri_path(vec!["core", ".well-known"]);
        assert_eq!(2, options.get(OptionNumber::URI_PATH).len());
        assert_eq!("/core/.well-known", options.uri_path_as_string());
    }

    #[test]
    fn setters_replace_previous_values() {
        let mut options = Options::new();
        options.set_uri_path(vec!["a", "b"]);
        options.set_uri_path(vec!["c"]);
        assert_eq!(vec!["c".to_owned()], options.uri_path());

        options.set_observe(1);
        options.set_observe(2);
        assert_eq!(Some(2), options.observe());
        assert_eq!(1, options.get(OptionNumber::OBSERVE).len());
    }

    #[test]
    fn etag_accessors() {
        let mut options = Options::new();
        assert_eq!(None, options.etag());
        assert_eq!(true, options.etags().is_empty());

        options.set_etag(b"abcd");
        assert_eq!(Some(&b"abcd"[..]), options.etag());

        options.set_etags(vec![b"ab".to_vec(), b"cd".to_vec()]);
        assert_eq!(vec![&b"ab"[..], &b"cd"[..]], options.etags());
        assert_eq!(Some(&b"ab"[..]), options.etag());
    }

    #[test]
    fn block_accessors() {
        let mut options = Options::new();
        assert_eq!(None, options.block1());

        let block = BlockInfo::new(3, true, 4).unwrap();
        options.set_block1(block);
        assert_eq!(Some(block), options.block1());
        assert_eq!(None, options.block2());

        options.set_block2(block);
        assert_eq!(Some(block), options.block2());
    }

    #[test]
    fn content_format_accessors() {
        let mut options = Options::new();
        options.set_content_format(ContentFormat::APPLICATION_JSON);
        assert_eq!(Some(ContentFormat(50)), options.content_format());

        options.set_accept(ContentFormat::TEXT_PLAIN_UTF8);
        assert_eq!(Some(ContentFormat(0)), options.accept());
    }

    #[test]
    fn insertion_order_is_preserved_within_a_number() {
        let mut options = Options::new();
        options.push(OptionNumber::URI_PATH, OptionValue::String("b".into()));
        options.push(OptionNumber::URI_PATH, OptionValue::String("a".into()));
        assert_eq!(vec!["b".to_owned(), "a".to_owned()], options.uri_path());
    }

    #[test]
    fn iteration_is_number_ordered() {
        let mut options = Options::new();
        options.set_block2(BlockInfo::new(0, false, 0).unwrap());
        options.set_uri_path(vec!["x"]);
        options.set_etag(b"e");

        let numbers: Vec<u16> = options.iter().map(|(number, _)| number.0).collect();
        assert_eq!(vec![4, 11, 23], numbers);
    }
}
