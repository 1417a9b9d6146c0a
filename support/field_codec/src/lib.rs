// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Table-driven encoding and decoding of named fields inside byte buffers.
//!
//! A [`FieldTable`] describes the layout of one buffer (a log page, an
//! identify structure, a single command dword) as an ordered list of
//! `(id, FieldSpec)` pairs. The same table decodes a buffer into
//! [`FieldValues`] and encodes values back into a buffer.
//!
//! Three kinds of fields are supported:
//!
//! * Mask fields: a bitmask applied to an integer read at a byte offset. The
//!   integer width (1 to 8 bytes) is implied by the highest set bit of the
//!   mask. Encoding ORs into the destination bytes, so several mask fields may
//!   share a byte.
//! * Byte fields: a verbatim byte range, optionally interpreted as a little
//!   or big endian integer or as padded text.
//! * Bit fields: `width` bits starting at a bit offset, with the whole buffer
//!   viewed as one little endian integer.
//!
//! Tables are `const` so their extent can be checked against the buffer they
//! describe at compile time:
//!
//! ```
//! use field_codec::{field_ids, FieldSpec, FieldTable, FieldValues};
//!
//! field_ids! {
//!     pub enum Flags {
//!         Enable,
//!         Mode,
//!     }
//! }
//!
//! const FLAGS: FieldTable<Flags> = FieldTable::new(&[
//!     (Flags::Enable, FieldSpec::mask(0, 0x01)),
//!     (Flags::Mode, FieldSpec::mask(0, 0x0e)),
//! ]);
//! const _: () = assert!(FLAGS.min_len() == 1);
//!
//! let mut buf = [0u8; 1];
//! let values = FieldValues::new().with(Flags::Enable, true).with(Flags::Mode, 5u8);
//! FLAGS.encode(&values, &mut buf).unwrap();
//! assert_eq!(buf, [0x0b]);
//! assert_eq!(FLAGS.decode(&buf).unwrap(), values);
//! ```

#![forbid(unsafe_code)]

use std::fmt::Debug;
use thiserror::Error;

/// An identifier for one field of a [`FieldTable`].
///
/// Usually declared with [`field_ids!`].
pub trait FieldId: Copy + Eq + Debug + 'static {
    /// The name used in diagnostics.
    fn name(self) -> &'static str;
}

/// Declares a field identifier enum and implements [`FieldId`] for it.
#[macro_export]
macro_rules! field_ids {
    (
        $(#[$a:meta])*
        $v:vis enum $name:ident {
            $(
                $(#[$vattr:meta])*
                $variant:ident
            ),* $(,)?
        }
    ) => {
        $(#[$a])*
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
        $v enum $name {
            $(
                $(#[$vattr])*
                $variant,
            )*
        }

        impl $crate::FieldId for $name {
            fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => stringify!($variant),)*
                }
            }
        }
    };
}

/// Byte order used to assemble a multi-byte integer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ByteOrder {
    /// Most significant byte first.
    Big,
    /// Least significant byte first.
    Little,
}

/// How a byte field's contents are interpreted.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Transform {
    /// Verbatim bytes.
    Raw,
    /// Little endian unsigned integer (at most 8 bytes).
    LittleEndian,
    /// Big endian unsigned integer (at most 8 bytes).
    BigEndian,
    /// Text padded with trailing NULs or spaces.
    Text,
}

/// The location and interpretation of one field.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FieldSpec {
    /// A bitmask over an integer read at `offset`.
    Mask {
        /// Byte offset of the integer.
        offset: usize,
        /// Non-zero mask; its highest set bit determines the integer width.
        mask: u64,
        /// Byte order of the integer.
        order: ByteOrder,
    },
    /// A contiguous byte range.
    Bytes {
        /// Byte offset of the range.
        offset: usize,
        /// Length of the range in bytes.
        len: usize,
        /// Interpretation of the range.
        transform: Transform,
    },
    /// A bit range of the buffer viewed as a little endian integer.
    Bits {
        /// Offset of the least significant bit.
        bit_offset: usize,
        /// Number of bits, 1 to 64.
        width: u32,
    },
}

impl FieldSpec {
    /// A big endian mask field. Use [`FieldSpec::le`] for little endian.
    pub const fn mask(offset: usize, mask: u64) -> Self {
        assert!(mask != 0, "mask fields need at least one bit");
        Self::Mask {
            offset,
            mask,
            order: ByteOrder::Big,
        }
    }

    /// A raw byte range.
    pub const fn bytes(offset: usize, len: usize) -> Self {
        Self::Bytes {
            offset,
            len,
            transform: Transform::Raw,
        }
    }

    /// A bit range starting at `bit_offset`.
    pub const fn bits(bit_offset: usize, width: u32) -> Self {
        assert!(width >= 1 && width <= 64, "bit fields are 1 to 64 bits wide");
        Self::Bits { bit_offset, width }
    }

    /// A single-bit field.
    pub const fn flag(bit_offset: usize) -> Self {
        Self::bits(bit_offset, 1)
    }

    /// Reads a mask field's integer, or a byte field's contents, as little
    /// endian.
    pub const fn le(self) -> Self {
        match self {
            Self::Mask { offset, mask, .. } => Self::Mask {
                offset,
                mask,
                order: ByteOrder::Little,
            },
            Self::Bytes { offset, len, .. } => {
                assert!(len <= 8, "integer byte fields are at most 8 bytes");
                Self::Bytes {
                    offset,
                    len,
                    transform: Transform::LittleEndian,
                }
            }
            Self::Bits { .. } => panic!("bit fields are always little endian"),
        }
    }

    /// Reads a mask field's integer, or a byte field's contents, as big
    /// endian.
    pub const fn be(self) -> Self {
        match self {
            Self::Mask { offset, mask, .. } => Self::Mask {
                offset,
                mask,
                order: ByteOrder::Big,
            },
            Self::Bytes { offset, len, .. } => {
                assert!(len <= 8, "integer byte fields are at most 8 bytes");
                Self::Bytes {
                    offset,
                    len,
                    transform: Transform::BigEndian,
                }
            }
            Self::Bits { .. } => panic!("bit fields are always little endian"),
        }
    }

    /// Interprets a byte field as padded text.
    pub const fn text(self) -> Self {
        match self {
            Self::Bytes { offset, len, .. } => Self::Bytes {
                offset,
                len,
                transform: Transform::Text,
            },
            _ => panic!("only byte fields carry text"),
        }
    }

    /// One past the last byte this field touches.
    pub const fn end(&self) -> usize {
        match *self {
            Self::Mask { offset, mask, .. } => offset + mask_width(mask),
            Self::Bytes { offset, len, .. } => offset + len,
            Self::Bits { bit_offset, width } => (bit_offset + width as usize).div_ceil(8),
        }
    }

    /// The largest integer value this field can hold, if it holds integers.
    pub const fn max_value(&self) -> Option<u64> {
        match *self {
            Self::Mask { mask, .. } => Some(mask >> mask.trailing_zeros()),
            Self::Bytes { len, transform, .. } => match transform {
                Transform::LittleEndian | Transform::BigEndian => Some(width_max(len as u32 * 8)),
                Transform::Raw | Transform::Text => None,
            },
            Self::Bits { width, .. } => Some(width_max(width)),
        }
    }
}

/// Number of bytes spanned by `mask`, from byte 0 to its highest set bit.
const fn mask_width(mask: u64) -> usize {
    (64 - mask.leading_zeros() as usize).div_ceil(8)
}

const fn width_max(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1 << bits) - 1
    }
}

/// A decoded field value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldValue {
    /// An integer, from a mask, bit, or integer byte field.
    Uint(u64),
    /// Verbatim bytes.
    Bytes(Vec<u8>),
    /// Text with its padding removed.
    Text(String),
}

impl FieldValue {
    /// Returns the integer value, if this is one.
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Self::Uint(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the byte value, if this is one.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the text value, if this is one.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }
}

macro_rules! uint_value {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for FieldValue {
                fn from(v: $ty) -> Self {
                    Self::Uint(v.into())
                }
            }
        )*
    };
}

uint_value!(u8, u16, u32, u64, bool);

impl From<Vec<u8>> for FieldValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<&[u8]> for FieldValue {
    fn from(v: &[u8]) -> Self {
        Self::Bytes(v.to_vec())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

/// A set of field values, keyed by field id.
///
/// Equality ignores insertion order.
#[derive(Clone, Debug)]
pub struct FieldValues<F> {
    entries: Vec<(F, FieldValue)>,
}

impl<F> Default for FieldValues<F> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<F: FieldId> FieldValues<F> {
    /// Returns an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a value, builder style.
    pub fn with(mut self, id: F, value: impl Into<FieldValue>) -> Self {
        self.insert(id, value);
        self
    }

    /// Adds or replaces a value, returning the previous one.
    pub fn insert(&mut self, id: F, value: impl Into<FieldValue>) -> Option<FieldValue> {
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == id) {
            Some((_, v)) => Some(std::mem::replace(v, value)),
            None => {
                self.entries.push((id, value));
                None
            }
        }
    }

    /// Returns the value for `id`.
    pub fn get(&self, id: F) -> Option<&FieldValue> {
        self.entries.iter().find(|(k, _)| *k == id).map(|(_, v)| v)
    }

    /// Returns the integer value for `id`.
    pub fn get_u64(&self, id: F) -> Option<u64> {
        self.get(id).and_then(FieldValue::as_u64)
    }

    /// Returns the byte value for `id`.
    pub fn get_bytes(&self, id: F) -> Option<&[u8]> {
        self.get(id).and_then(FieldValue::as_bytes)
    }

    /// Returns the text value for `id`.
    pub fn get_text(&self, id: F) -> Option<&str> {
        self.get(id).and_then(FieldValue::as_text)
    }

    /// Returns whether integer field `id` is present and non-zero.
    pub fn flag(&self, id: F) -> bool {
        self.get_u64(id).is_some_and(|v| v != 0)
    }

    /// Iterates over the values in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (F, &FieldValue)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    /// The number of values.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<F: FieldId> PartialEq for FieldValues<F> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

impl<F: FieldId> Eq for FieldValues<F> {}

impl<F: FieldId, V: Into<FieldValue>> FromIterator<(F, V)> for FieldValues<F> {
    fn from_iter<T: IntoIterator<Item = (F, V)>>(iter: T) -> Self {
        let mut values = Self::new();
        for (k, v) in iter {
            values.insert(k, v);
        }
        values
    }
}

/// An error encoding or decoding a field.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FieldError {
    /// The field extends past the end of the buffer.
    #[error("field {field} ends at byte {end} but the buffer is {len} bytes")]
    BufferTooSmall {
        /// The field.
        field: &'static str,
        /// One past the field's last byte.
        end: usize,
        /// The buffer length.
        len: usize,
    },
    /// The value does not fit in the field.
    #[error("value {value:#x} does not fit in field {field} (max {max:#x})")]
    ValueTooLarge {
        /// The field.
        field: &'static str,
        /// The rejected value.
        value: u64,
        /// The largest value the field holds.
        max: u64,
    },
    /// The value's kind cannot be stored in the field.
    #[error("field {field} cannot store a value of this kind")]
    TypeMismatch {
        /// The field.
        field: &'static str,
    },
}

/// An ordered, immutable layout description for one kind of buffer.
#[derive(Debug)]
pub struct FieldTable<F: 'static> {
    fields: &'static [(F, FieldSpec)],
}

// Manual impls so that `F` need not be `Clone`.
impl<F: 'static> Clone for FieldTable<F> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<F: 'static> Copy for FieldTable<F> {}

impl<F: 'static> FieldTable<F> {
    /// Creates a table from `(id, spec)` pairs.
    pub const fn new(fields: &'static [(F, FieldSpec)]) -> Self {
        Self { fields }
    }

    /// The smallest buffer length that holds every field.
    pub const fn min_len(&self) -> usize {
        let mut len = 0;
        let mut i = 0;
        while i < self.fields.len() {
            let end = self.fields[i].1.end();
            if end > len {
                len = end;
            }
            i += 1;
        }
        len
    }
}

impl<F: FieldId> FieldTable<F> {
    /// Iterates over the table's fields in order.
    pub fn fields(&self) -> impl Iterator<Item = (F, FieldSpec)> + '_ {
        self.fields.iter().copied()
    }

    /// Returns the [`FieldSpec`] for `id`.
    pub fn spec(&self, id: F) -> Option<FieldSpec> {
        self.fields.iter().find(|(k, _)| *k == id).map(|(_, s)| *s)
    }

    /// Decodes every field of the table from `buffer`.
    pub fn decode(&self, buffer: &[u8]) -> Result<FieldValues<F>, FieldError> {
        let mut values = FieldValues::new();
        for &(id, spec) in self.fields {
            values.entries.push((id, decode_field(id, &spec, buffer)?));
        }
        Ok(values)
    }

    /// Decodes a single field from `buffer`. Returns `Ok(None)` if `id` is not
    /// part of this table.
    pub fn decode_one(&self, id: F, buffer: &[u8]) -> Result<Option<FieldValue>, FieldError> {
        self.spec(id)
            .map(|spec| decode_field(id, &spec, buffer))
            .transpose()
    }

    /// Encodes the values whose ids are part of this table into `buffer`.
    ///
    /// Mask fields are ORed into the buffer; byte and bit fields replace the
    /// bytes or bits they cover. Byte values shorter than their field leave
    /// the remaining bytes untouched. The buffer is not modified if any value
    /// fails validation.
    pub fn encode(&self, values: &FieldValues<F>, buffer: &mut [u8]) -> Result<(), FieldError> {
        let mut pending = Vec::with_capacity(values.len());
        for (id, value) in values.iter() {
            if let Some(spec) = self.spec(id) {
                check_field(id, &spec, value, buffer.len())?;
                pending.push((spec, value));
            }
        }
        for (spec, value) in pending {
            write_field(&spec, value, buffer);
        }
        Ok(())
    }
}

/// Decodes `buffer` according to `table`.
pub fn decode<F: FieldId>(
    buffer: &[u8],
    table: &FieldTable<F>,
) -> Result<FieldValues<F>, FieldError> {
    table.decode(buffer)
}

/// Encodes `values` into `buffer` according to `table`.
pub fn encode<F: FieldId>(
    values: &FieldValues<F>,
    table: &FieldTable<F>,
    buffer: &mut [u8],
) -> Result<(), FieldError> {
    table.encode(values, buffer)
}

fn check_bounds<F: FieldId>(id: F, spec: &FieldSpec, len: usize) -> Result<(), FieldError> {
    let end = spec.end();
    if end > len {
        return Err(FieldError::BufferTooSmall {
            field: id.name(),
            end,
            len,
        });
    }
    Ok(())
}

fn decode_field<F: FieldId>(
    id: F,
    spec: &FieldSpec,
    buffer: &[u8],
) -> Result<FieldValue, FieldError> {
    check_bounds(id, spec, buffer.len())?;
    let value = match *spec {
        FieldSpec::Mask {
            offset,
            mask,
            order,
        } => {
            let raw = read_int(&buffer[offset..offset + mask_width(mask)], order);
            FieldValue::Uint((raw & mask) >> mask.trailing_zeros())
        }
        FieldSpec::Bytes {
            offset,
            len,
            transform,
        } => {
            let bytes = &buffer[offset..offset + len];
            match transform {
                Transform::Raw => FieldValue::Bytes(bytes.to_vec()),
                Transform::LittleEndian => FieldValue::Uint(read_int(bytes, ByteOrder::Little)),
                Transform::BigEndian => FieldValue::Uint(read_int(bytes, ByteOrder::Big)),
                Transform::Text => FieldValue::Text(
                    String::from_utf8_lossy(bytes)
                        .trim_end_matches(|c| c == '\0' || c == ' ')
                        .to_owned(),
                ),
            }
        }
        FieldSpec::Bits { bit_offset, width } => {
            FieldValue::Uint((0..width as usize).fold(0, |acc, i| {
                let pos = bit_offset + i;
                let bit = (buffer[pos / 8] >> (pos % 8)) & 1;
                acc | (u64::from(bit) << i)
            }))
        }
    };
    Ok(value)
}

fn check_field<F: FieldId>(
    id: F,
    spec: &FieldSpec,
    value: &FieldValue,
    len: usize,
) -> Result<(), FieldError> {
    check_bounds(id, spec, len)?;
    let accepts = match (spec, value) {
        (FieldSpec::Mask { .. } | FieldSpec::Bits { .. }, FieldValue::Uint(_)) => true,
        (FieldSpec::Bytes { transform, .. }, FieldValue::Uint(_)) => {
            matches!(transform, Transform::LittleEndian | Transform::BigEndian)
        }
        (FieldSpec::Bytes { .. }, FieldValue::Bytes(_)) => true,
        (FieldSpec::Bytes { transform, .. }, FieldValue::Text(_)) => {
            matches!(transform, Transform::Raw | Transform::Text)
        }
        _ => false,
    };
    if !accepts {
        return Err(FieldError::TypeMismatch { field: id.name() });
    }
    if let (FieldValue::Uint(value), Some(max)) = (value, spec.max_value()) {
        if *value > max {
            return Err(FieldError::ValueTooLarge {
                field: id.name(),
                value: *value,
                max,
            });
        }
    }
    Ok(())
}

fn write_field(spec: &FieldSpec, value: &FieldValue, buffer: &mut [u8]) {
    match (*spec, value) {
        (
            FieldSpec::Mask {
                offset,
                mask,
                order,
            },
            &FieldValue::Uint(v),
        ) => {
            let width = mask_width(mask);
            let mut bytes = [0; 8];
            write_int((v << mask.trailing_zeros()) & mask, &mut bytes[..width], order);
            for (dst, src) in buffer[offset..offset + width].iter_mut().zip(&bytes[..width]) {
                *dst |= *src;
            }
        }
        (
            FieldSpec::Bytes {
                offset,
                len,
                transform,
            },
            &FieldValue::Uint(v),
        ) => {
            let order = if transform == Transform::BigEndian {
                ByteOrder::Big
            } else {
                ByteOrder::Little
            };
            write_int(v, &mut buffer[offset..offset + len], order);
        }
        (FieldSpec::Bytes { offset, len, .. }, FieldValue::Bytes(v)) => {
            copy_clamped(&mut buffer[offset..offset + len], v);
        }
        (FieldSpec::Bytes { offset, len, .. }, FieldValue::Text(v)) => {
            copy_clamped(&mut buffer[offset..offset + len], v.as_bytes());
        }
        (FieldSpec::Bits { bit_offset, width }, &FieldValue::Uint(v)) => {
            for i in 0..width as usize {
                let pos = bit_offset + i;
                let bit = 1 << (pos % 8);
                if (v >> i) & 1 != 0 {
                    buffer[pos / 8] |= bit;
                } else {
                    buffer[pos / 8] &= !bit;
                }
            }
        }
        // Rejected by check_field.
        _ => {}
    }
}

fn copy_clamped(dst: &mut [u8], src: &[u8]) {
    let n = dst.len().min(src.len());
    dst[..n].copy_from_slice(&src[..n]);
}

fn read_int(bytes: &[u8], order: ByteOrder) -> u64 {
    match order {
        ByteOrder::Big => bytes.iter().fold(0, |acc, &b| (acc << 8) | u64::from(b)),
        ByteOrder::Little => bytes
            .iter()
            .rev()
            .fold(0, |acc, &b| (acc << 8) | u64::from(b)),
    }
}

fn write_int(value: u64, out: &mut [u8], order: ByteOrder) {
    let n = out.len();
    for i in 0..n {
        let byte = (value >> (8 * i)) as u8;
        match order {
            ByteOrder::Little => out[i] = byte,
            ByteOrder::Big => out[n - 1 - i] = byte,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    field_ids! {
        enum Sample {
            Opcode,
            Fuse,
            Psdt,
            Length,
            Serial,
            Payload,
            Wide,
            Straddle,
        }
    }

    const SAMPLE: FieldTable<Sample> = FieldTable::new(&[
        (Sample::Opcode, FieldSpec::mask(0, 0xff)),
        (Sample::Fuse, FieldSpec::mask(1, 0x03)),
        (Sample::Psdt, FieldSpec::mask(1, 0xc0)),
        (Sample::Length, FieldSpec::bytes(2, 4).le()),
        (Sample::Serial, FieldSpec::bytes(6, 8).text()),
        (Sample::Payload, FieldSpec::bytes(14, 4)),
        (Sample::Wide, FieldSpec::mask(18, 0x0fff_0000).le()),
        (Sample::Straddle, FieldSpec::bits(180, 9)),
    ]);

    const _: () = assert!(SAMPLE.min_len() == 24);

    fn sample_values() -> FieldValues<Sample> {
        FieldValues::new()
            .with(Sample::Opcode, 0x06u8)
            .with(Sample::Fuse, 2u8)
            .with(Sample::Psdt, 1u8)
            .with(Sample::Length, 0x1234_5678u32)
            .with(Sample::Serial, "S123")
            .with(Sample::Payload, vec![1, 2, 3, 4])
            .with(Sample::Wide, 0xabcu16)
            .with(Sample::Straddle, 0x1a5u16)
    }

    #[test]
    fn round_trip() {
        let values = sample_values();
        let mut buf = [0u8; 24];
        encode(&values, &SAMPLE, &mut buf).unwrap();
        assert_eq!(decode(&buf, &SAMPLE).unwrap(), values);
    }

    #[test]
    fn mask_width_follows_highest_bit() {
        assert_eq!(FieldSpec::mask(0, 0x80).end(), 1);
        assert_eq!(FieldSpec::mask(0, 0x100).end(), 2);
        assert_eq!(FieldSpec::mask(4, 0x0fff_0000).end(), 8);
        assert_eq!(FieldSpec::mask(0, 1 << 63).end(), 8);
    }

    #[test]
    fn mask_default_is_big_endian() {
        field_ids! {
            enum Word {
                Hi,
            }
        }
        const BE: FieldTable<Word> = FieldTable::new(&[(Word::Hi, FieldSpec::mask(0, 0xff00))]);
        const LE: FieldTable<Word> =
            FieldTable::new(&[(Word::Hi, FieldSpec::mask(0, 0xff00).le())]);

        let buf = [0x12, 0x34];
        assert_eq!(BE.decode(&buf).unwrap().get_u64(Word::Hi), Some(0x12));
        assert_eq!(LE.decode(&buf).unwrap().get_u64(Word::Hi), Some(0x34));
    }

    #[test]
    fn shared_byte_is_or_merged_in_any_order() {
        let fuse = FieldValues::new().with(Sample::Fuse, 3u8);
        let psdt = FieldValues::new().with(Sample::Psdt, 2u8);

        let mut a = [0u8; 24];
        SAMPLE.encode(&fuse, &mut a).unwrap();
        SAMPLE.encode(&psdt, &mut a).unwrap();

        let mut b = [0u8; 24];
        SAMPLE.encode(&psdt, &mut b).unwrap();
        SAMPLE.encode(&fuse, &mut b).unwrap();

        assert_eq!(a, b);
        assert_eq!(a[1], 0x83);
        let decoded = SAMPLE.decode(&a).unwrap();
        assert_eq!(decoded.get_u64(Sample::Fuse), Some(3));
        assert_eq!(decoded.get_u64(Sample::Psdt), Some(2));
    }

    #[test]
    fn bit_fields_replace_only_their_bits() {
        let mut buf = [0xffu8; 24];
        SAMPLE
            .encode(&FieldValues::new().with(Sample::Straddle, 0u8), &mut buf)
            .unwrap();
        // Bits 180..189 cover the top nibble of byte 22 and the low five bits
        // of byte 23.
        assert_eq!(buf[22], 0x0f);
        assert_eq!(buf[23], 0xe0);
        assert_eq!(buf[21], 0xff);
    }

    #[test]
    fn short_byte_values_leave_residue() {
        let mut buf = [0xeeu8; 24];
        SAMPLE
            .encode(&FieldValues::new().with(Sample::Payload, vec![9u8]), &mut buf)
            .unwrap();
        assert_eq!(&buf[14..18], &[9, 0xee, 0xee, 0xee]);

        // Oversized values are clamped to the field.
        SAMPLE
            .encode(&FieldValues::new().with(Sample::Payload, vec![7u8; 10]), &mut buf)
            .unwrap();
        assert_eq!(&buf[14..19], &[7, 7, 7, 7, 0xee]);
    }

    #[test]
    fn text_padding_is_trimmed() {
        let mut buf = [0u8; 24];
        buf[6..14].copy_from_slice(b"AB12    ");
        assert_eq!(SAMPLE.decode(&buf).unwrap().get_text(Sample::Serial), Some("AB12"));
    }

    #[test]
    fn value_too_large() {
        let mut buf = [0u8; 24];
        let err = SAMPLE
            .encode(&FieldValues::new().with(Sample::Fuse, 4u8), &mut buf)
            .unwrap_err();
        assert_eq!(
            err,
            FieldError::ValueTooLarge {
                field: "Fuse",
                value: 4,
                max: 3
            }
        );

        let err = SAMPLE
            .encode(&FieldValues::new().with(Sample::Straddle, 0x200u16), &mut buf)
            .unwrap_err();
        assert!(matches!(err, FieldError::ValueTooLarge { max: 0x1ff, .. }));
    }

    #[test]
    fn failed_encode_leaves_buffer_untouched() {
        let mut buf = [0u8; 24];
        let values = FieldValues::new()
            .with(Sample::Opcode, 1u8)
            .with(Sample::Fuse, 9u8);
        SAMPLE.encode(&values, &mut buf).unwrap_err();
        assert_eq!(buf, [0; 24]);
    }

    #[test]
    fn buffer_too_small() {
        let buf = [0u8; 20];
        assert_eq!(
            SAMPLE.decode(&buf).unwrap_err(),
            FieldError::BufferTooSmall {
                field: "Wide",
                end: 22,
                len: 20
            }
        );

        let mut buf = [0u8; 4];
        let err = SAMPLE
            .encode(&FieldValues::new().with(Sample::Length, 1u8), &mut buf)
            .unwrap_err();
        assert!(matches!(err, FieldError::BufferTooSmall { field: "Length", .. }));
    }

    #[test]
    fn type_mismatch() {
        let mut buf = [0u8; 24];
        let err = SAMPLE
            .encode(&FieldValues::new().with(Sample::Opcode, "x"), &mut buf)
            .unwrap_err();
        assert_eq!(err, FieldError::TypeMismatch { field: "Opcode" });
    }

    #[test]
    fn values_outside_table_are_ignored() {
        field_ids! {
            enum Pair {
                A,
                B,
            }
        }
        const ONLY_A: FieldTable<Pair> = FieldTable::new(&[(Pair::A, FieldSpec::bytes(0, 1).le())]);
        let mut buf = [0u8; 1];
        ONLY_A
            .encode(&FieldValues::new().with(Pair::A, 5u8).with(Pair::B, 7u8), &mut buf)
            .unwrap();
        assert_eq!(buf, [5]);
        assert_eq!(ONLY_A.decode_one(Pair::B, &buf).unwrap(), None);
    }
}
