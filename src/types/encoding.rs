//! Canonical binary encoding used for every digest in the ledger.
//!
//! Two values with equal content always produce identical bytes, so hashes
//! computed by independent implementations agree.
//!
//! # Binary Format
//!
//! - Integers: little-endian, fixed-width
//! - `usize`: encoded as `u64`
//! - `bool`: single byte (0 = false, 1 = true)
//! - `Vec<T>`/`String`/`Bytes`: 8-byte length prefix followed by elements
//! - `Option<T>`: 1-byte tag (0 = None, 1 = Some) followed by the value
//! - `BTreeMap<K, V>`/`BTreeSet<T>`: length prefix, then entries in ascending
//!   key order, independent of insertion order
//! - Arrays `[T; N]`: elements back to back, no length prefix
//! - Derived structs: fields in declaration order; derived enums: a one-byte
//!   variant tag, then the variant's fields

use crate::types::bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet};
use syncledger_derive::Error;

/// Destination for encoded bytes.
///
/// Implemented by byte buffers and by the hash builder, so a value can be
/// streamed straight into a digest without an intermediate allocation.
pub trait EncodeSink {
    fn write(&mut self, bytes: &[u8]);
}

/// Counts encoded bytes without storing them.
#[derive(Default)]
pub struct SizeCounter {
    len: usize,
}

impl SizeCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl EncodeSink for SizeCounter {
    fn write(&mut self, bytes: &[u8]) {
        self.len += bytes.len();
    }
}

impl EncodeSink for Vec<u8> {
    fn write(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }
}

impl EncodeSink for Bytes {
    fn write(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }
}

/// A value with a canonical byte representation.
pub trait Encode {
    fn encode<S: EncodeSink>(&self, out: &mut S);

    /// Serializes into a buffer sized exactly for the encoding.
    fn to_bytes(&self) -> Bytes {
        let mut counter = SizeCounter::new();
        self.encode(&mut counter);

        let mut out = Bytes::with_capacity(counter.len());
        self.encode(&mut out);
        out
    }
}

/// Errors produced while decoding canonical bytes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("invalid value")]
    InvalidValue,
    #[error("length prefix exceeds the allowed maximum")]
    LengthOverflow,
}

/// A value that can be read back from its canonical encoding.
pub trait Decode: Sized {
    /// Decodes one value and advances `input` past it.
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError>;

    /// Decodes a value that must span all of `data`.
    fn from_bytes(data: &[u8]) -> Result<Self, DecodeError> {
        let mut input = data;
        let value = Self::decode(&mut input)?;
        if !input.is_empty() {
            return Err(DecodeError::InvalidValue);
        }
        Ok(value)
    }
}

/// Upper bound on decoded collection lengths.
pub const MAX_VEC_LEN: usize = 1_000_000;

fn read_bytes<'a>(input: &mut &'a [u8], n: usize) -> Result<&'a [u8], DecodeError> {
    if input.len() < n {
        return Err(DecodeError::UnexpectedEof);
    }
    let (bytes, rest) = input.split_at(n);
    *input = rest;
    Ok(bytes)
}

fn read_len(input: &mut &[u8]) -> Result<usize, DecodeError> {
    let len = usize::decode(input)?;
    if len > MAX_VEC_LEN {
        return Err(DecodeError::LengthOverflow);
    }
    Ok(len)
}

macro_rules! impl_int {
    ($($t:ty),*) => {
        $(
            impl Encode for $t {
                fn encode<S: EncodeSink>(&self, out: &mut S) {
                    out.write(&self.to_le_bytes());
                }
            }

            impl Decode for $t {
                fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
                    let bytes = read_bytes(input, std::mem::size_of::<$t>())?;
                    let mut buf = [0u8; std::mem::size_of::<$t>()];
                    buf.copy_from_slice(bytes);
                    Ok(<$t>::from_le_bytes(buf))
                }
            }
        )*
    };
}

impl_int!(u8, u16, u32, u64, u128, i64);

impl Encode for usize {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        (*self as u64).encode(out);
    }
}

impl Decode for usize {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        usize::try_from(u64::decode(input)?).map_err(|_| DecodeError::LengthOverflow)
    }
}

impl Encode for bool {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        out.write(&[*self as u8]);
    }
}

impl Decode for bool {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        match u8::decode(input)? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(DecodeError::InvalidValue),
        }
    }
}

impl<T: Encode + ?Sized> Encode for &T {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        (**self).encode(out);
    }
}

impl Encode for str {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.len().encode(out);
        out.write(self.as_bytes());
    }
}

impl Encode for String {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.as_str().encode(out);
    }
}

impl Decode for String {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let len = read_len(input)?;
        let bytes = read_bytes(input, len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidValue)
    }
}

impl<T: Encode> Encode for [T] {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.len().encode(out);
        for item in self {
            item.encode(out);
        }
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.as_slice().encode(out);
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let len = read_len(input)?;
        let mut vec = Vec::with_capacity(len.min(1024));
        for _ in 0..len {
            vec.push(T::decode(input)?);
        }
        Ok(vec)
    }
}

impl<T: Encode> Encode for Box<[T]> {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        (**self).encode(out);
    }
}

impl<T: Decode> Decode for Box<[T]> {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Vec::<T>::decode(input)?.into_boxed_slice())
    }
}

impl<T: Encode> Encode for Option<T> {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        match self {
            None => 0u8.encode(out),
            Some(value) => {
                1u8.encode(out);
                value.encode(out);
            }
        }
    }
}

impl<T: Decode> Decode for Option<T> {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        match u8::decode(input)? {
            0 => Ok(None),
            1 => Ok(Some(T::decode(input)?)),
            _ => Err(DecodeError::InvalidValue),
        }
    }
}

impl<T: Encode, const N: usize> Encode for [T; N] {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        for item in self {
            item.encode(out);
        }
    }
}

impl<const N: usize> Decode for [u8; N] {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(read_bytes(input, N)?);
        Ok(buf)
    }
}

impl<K: Encode, V: Encode> Encode for BTreeMap<K, V> {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.len().encode(out);
        for (key, value) in self {
            key.encode(out);
            value.encode(out);
        }
    }
}

impl<K: Decode + Ord, V: Decode> Decode for BTreeMap<K, V> {
    /// Keys must arrive strictly ascending; anything else is not canonical.
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let len = read_len(input)?;
        let mut map = BTreeMap::new();
        for _ in 0..len {
            let key = K::decode(input)?;
            let value = V::decode(input)?;
            if map.last_key_value().is_some_and(|(last, _)| *last >= key) {
                return Err(DecodeError::InvalidValue);
            }
            map.insert(key, value);
        }
        Ok(map)
    }
}

impl<T: Encode> Encode for BTreeSet<T> {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.len().encode(out);
        for item in self {
            item.encode(out);
        }
    }
}

impl<T: Decode + Ord> Decode for BTreeSet<T> {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let len = read_len(input)?;
        let mut set = BTreeSet::new();
        for _ in 0..len {
            let item = T::decode(input)?;
            if set.last().is_some_and(|last| *last >= item) {
                return Err(DecodeError::InvalidValue);
            }
            set.insert(item);
        }
        Ok(set)
    }
}

impl<A: Encode, B: Encode> Encode for (A, B) {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.0.encode(out);
        self.1.encode(out);
    }
}

impl<A: Decode, B: Decode> Decode for (A, B) {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok((A::decode(input)?, B::decode(input)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_counter_matches_encoded_length() {
        let value = (42u64, "ledger".to_string());
        let mut counter = SizeCounter::new();
        value.encode(&mut counter);
        assert_eq!(counter.len(), value.to_bytes().len());
        assert_eq!(counter.len(), 8 + 8 + 6);
    }

    #[test]
    fn integers_are_little_endian() {
        assert_eq!(0x12345678u32.to_bytes().as_slice(), &[0x78, 0x56, 0x34, 0x12]);
        assert_eq!(1u128.to_bytes()[0], 1);
        assert_eq!(1u128.to_bytes().len(), 16);
    }

    #[test]
    fn usize_is_encoded_as_u64() {
        assert_eq!(7usize.to_bytes(), 7u64.to_bytes());
    }

    #[test]
    fn integers_decode_from_exact_width() {
        assert_eq!(u16::from_bytes(&[0x34, 0x12]), Ok(0x1234));
        assert_eq!(u64::from_bytes(&42u64.to_bytes()), Ok(42));
        assert_eq!(i64::from_bytes(&(-5i64).to_bytes()), Ok(-5));
        assert_eq!(u128::from_bytes(&u128::MAX.to_bytes()), Ok(u128::MAX));
        assert_eq!(u32::from_bytes(&[1, 2, 3]), Err(DecodeError::UnexpectedEof));
    }

    #[test]
    fn bool_rejects_non_canonical_bytes() {
        assert_eq!(bool::from_bytes(&[1]), Ok(true));
        assert_eq!(bool::from_bytes(&[2]), Err(DecodeError::InvalidValue));
    }

    #[test]
    fn str_and_string_encode_identically() {
        assert_eq!("abc".to_bytes(), "abc".to_string().to_bytes());
    }

    #[test]
    fn string_rejects_invalid_utf8() {
        let mut bytes = Vec::new();
        2usize.encode(&mut bytes);
        bytes.extend_from_slice(&[0xFF, 0xFE]);
        assert_eq!(String::from_bytes(&bytes), Err(DecodeError::InvalidValue));
    }

    #[test]
    fn vec_length_prefix_is_bounded() {
        let bytes = ((MAX_VEC_LEN as u64) + 1).to_bytes();
        assert_eq!(
            Vec::<u8>::from_bytes(&bytes),
            Err(DecodeError::LengthOverflow)
        );
    }

    #[test]
    fn option_tag_must_be_zero_or_one() {
        assert_eq!(Option::<u8>::from_bytes(&[0]), Ok(None));
        assert_eq!(Option::<u8>::from_bytes(&[1, 9]), Ok(Some(9)));
        assert_eq!(
            Option::<u8>::from_bytes(&[3, 9]),
            Err(DecodeError::InvalidValue)
        );
    }

    #[test]
    fn map_encoding_ignores_insertion_order() {
        let mut first = BTreeMap::new();
        first.insert("zeta".to_string(), 1u64);
        first.insert("alpha".to_string(), 2u64);

        let mut second = BTreeMap::new();
        second.insert("alpha".to_string(), 2u64);
        second.insert("zeta".to_string(), 1u64);

        assert_eq!(first.to_bytes(), second.to_bytes());
        assert_eq!(
            BTreeMap::<String, u64>::from_bytes(&first.to_bytes()).unwrap(),
            first
        );
    }

    #[test]
    fn map_decode_rejects_unsorted_keys() {
        let mut bytes = Vec::new();
        2usize.encode(&mut bytes);
        "b".encode(&mut bytes);
        1u8.encode(&mut bytes);
        "a".encode(&mut bytes);
        2u8.encode(&mut bytes);

        assert_eq!(
            BTreeMap::<String, u8>::from_bytes(&bytes),
            Err(DecodeError::InvalidValue)
        );
    }

    #[test]
    fn set_decode_rejects_duplicates() {
        let mut bytes = Vec::new();
        2usize.encode(&mut bytes);
        5u32.encode(&mut bytes);
        5u32.encode(&mut bytes);

        assert_eq!(
            BTreeSet::<u32>::from_bytes(&bytes),
            Err(DecodeError::InvalidValue)
        );
    }

    #[test]
    fn from_bytes_rejects_trailing_input() {
        assert_eq!(u8::from_bytes(&[1, 2]), Err(DecodeError::InvalidValue));
    }

    #[test]
    fn truncated_input_is_eof() {
        assert_eq!(u32::from_bytes(&[1, 2]), Err(DecodeError::UnexpectedEof));
        assert_eq!(u64::from_bytes(&[]), Err(DecodeError::UnexpectedEof));
    }

    #[test]
    fn decode_advances_the_cursor() {
        let bytes = (3u16, 9u8).to_bytes();
        let mut input = bytes.as_slice();
        assert_eq!(u16::decode(&mut input), Ok(3));
        assert_eq!(input.len(), 1);
        assert_eq!(u8::decode(&mut input), Ok(9));
        assert!(input.is_empty());
    }
}
