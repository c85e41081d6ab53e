// Copyright 2026 the Handoff Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Flat little-endian encoding of resource lists for crossing a process
//! boundary.
//!
//! Each list is a tag byte, a `u32` entry count, and that many fixed-size
//! records:
//!
//! | list | tag | record |
//! |---|---|---|
//! | transferable | `b'T'` | `id: u32, target: u8, format: u8, width: u32, height: u32, sync_point: u32` (18 bytes) |
//! | returned | `b'R'` | `id: u32, count: u32, lost: u8, sync_point: u32` (13 bytes) |
//!
//! Decoding checks the whole buffer before allocating, so a bogus count
//! cannot trigger a huge allocation.

use alloc::vec::Vec;

use crate::resource::{
    ResourceFormat, ResourceId, ReturnedResource, TextureTarget, TransferableResource,
};

const TAG_TRANSFERABLE: u8 = b'T';
const TAG_RETURNED: u8 = b'R';
const HEADER_LEN: usize = 5;
const TRANSFERABLE_LEN: usize = 18;
const RETURNED_LEN: usize = 13;

/// Why a buffer could not be decoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    /// The buffer ends before the data it announces.
    #[error("buffer truncated: need {needed} bytes, have {available}")]
    Truncated {
        /// Bytes the header implies.
        needed: usize,
        /// Bytes present.
        available: usize,
    },
    /// The buffer holds a different kind of list.
    #[error("unexpected list tag {found:#04x}, expected {expected:#04x}")]
    UnexpectedTag {
        /// Tag for the requested list kind.
        expected: u8,
        /// Tag found in the buffer.
        found: u8,
    },
    /// A texture target code is not recognized.
    #[error("unknown texture target {0}")]
    UnknownTextureTarget(u8),
    /// A resource format code is not recognized.
    #[error("unknown resource format {0}")]
    UnknownFormat(u8),
    /// A returned entry relinquishes zero references.
    #[error("returned resource {0:?} has a zero count")]
    ZeroCount(ResourceId),
    /// Bytes remain after the last record.
    #[error("{0} trailing bytes after the last record")]
    TrailingBytes(usize),
    /// A list has more entries than the `u32` header can count.
    #[error("list of {0} entries does not fit the header")]
    TooManyEntries(usize),
}

/// Encodes a transferable resource list.
///
/// # Errors
///
/// Returns [`WireError::TooManyEntries`] if the list is longer than
/// `u32::MAX`.
pub fn encode_transferable(resources: &[TransferableResource]) -> Result<Vec<u8>, WireError> {
    let count = entry_count(resources.len())?;
    let mut w = Writer::with_capacity(HEADER_LEN + resources.len() * TRANSFERABLE_LEN);
    w.u8(TAG_TRANSFERABLE);
    w.u32(count);
    for r in resources {
        w.u32(r.id.0);
        w.u8(target_code(r.target));
        w.u8(format_code(r.format));
        w.u32(r.size[0]);
        w.u32(r.size[1]);
        w.u32(r.sync_point);
    }
    Ok(w.buf)
}

/// Decodes a transferable resource list.
///
/// # Errors
///
/// Returns a [`WireError`] if the buffer is not exactly one well-formed
/// transferable list.
pub fn decode_transferable(bytes: &[u8]) -> Result<Vec<TransferableResource>, WireError> {
    let (mut r, count) = Reader::open(bytes, TAG_TRANSFERABLE, TRANSFERABLE_LEN)?;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let id = ResourceId(r.u32());
        let target = decode_target(r.u8())?;
        let format = decode_format(r.u8())?;
        let size = [r.u32(), r.u32()];
        let sync_point = r.u32();
        out.push(TransferableResource {
            id,
            target,
            format,
            size,
            sync_point,
        });
    }
    Ok(out)
}

/// Encodes a returned resource list.
///
/// # Errors
///
/// Returns [`WireError::TooManyEntries`] if the list is longer than
/// `u32::MAX`.
pub fn encode_returned(returned: &[ReturnedResource]) -> Result<Vec<u8>, WireError> {
    let count = entry_count(returned.len())?;
    let mut w = Writer::with_capacity(HEADER_LEN + returned.len() * RETURNED_LEN);
    w.u8(TAG_RETURNED);
    w.u32(count);
    for r in returned {
        w.u32(r.id.0);
        w.u32(r.count);
        w.u8(u8::from(r.lost));
        w.u32(r.sync_point);
    }
    Ok(w.buf)
}

/// Decodes a returned resource list.
///
/// # Errors
///
/// Returns a [`WireError`] if the buffer is not exactly one well-formed
/// returned list, or if an entry has a zero count.
pub fn decode_returned(bytes: &[u8]) -> Result<Vec<ReturnedResource>, WireError> {
    let (mut r, count) = Reader::open(bytes, TAG_RETURNED, RETURNED_LEN)?;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let id = ResourceId(r.u32());
        let refs = r.u32();
        let lost = r.u8() != 0;
        let sync_point = r.u32();
        if refs == 0 {
            return Err(WireError::ZeroCount(id));
        }
        out.push(ReturnedResource {
            id,
            count: refs,
            lost,
            sync_point,
        });
    }
    Ok(out)
}

fn entry_count(len: usize) -> Result<u32, WireError> {
    u32::try_from(len).map_err(|_| WireError::TooManyEntries(len))
}

const fn target_code(target: TextureTarget) -> u8 {
    match target {
        TextureTarget::Texture2d => 0,
        TextureTarget::Rectangle => 1,
        TextureTarget::External => 2,
    }
}

const fn decode_target(code: u8) -> Result<TextureTarget, WireError> {
    match code {
        0 => Ok(TextureTarget::Texture2d),
        1 => Ok(TextureTarget::Rectangle),
        2 => Ok(TextureTarget::External),
        other => Err(WireError::UnknownTextureTarget(other)),
    }
}

const fn format_code(format: ResourceFormat) -> u8 {
    match format {
        ResourceFormat::Rgba8 => 0,
        ResourceFormat::Bgra8 => 1,
        ResourceFormat::Luminance8 => 2,
    }
}

const fn decode_format(code: u8) -> Result<ResourceFormat, WireError> {
    match code {
        0 => Ok(ResourceFormat::Rgba8),
        1 => Ok(ResourceFormat::Bgra8),
        2 => Ok(ResourceFormat::Luminance8),
        other => Err(WireError::UnknownFormat(other)),
    }
}

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
}

/// Reads records from a buffer whose length was checked up front.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Checks the header and total length, returning a reader positioned at
    /// the first record and the record count.
    fn open(data: &'a [u8], tag: u8, record_len: usize) -> Result<(Self, usize), WireError> {
        if data.len() < HEADER_LEN {
            return Err(WireError::Truncated {
                needed: HEADER_LEN,
                available: data.len(),
            });
        }
        if data[0] != tag {
            return Err(WireError::UnexpectedTag {
                expected: tag,
                found: data[0],
            });
        }
        let count = u32::from_le_bytes([data[1], data[2], data[3], data[4]]);
        let count = usize::try_from(count).unwrap_or(usize::MAX);
        let needed = count
            .checked_mul(record_len)
            .and_then(|n| n.checked_add(HEADER_LEN))
            .unwrap_or(usize::MAX);
        if data.len() < needed {
            return Err(WireError::Truncated {
                needed,
                available: data.len(),
            });
        }
        if data.len() > needed {
            return Err(WireError::TrailingBytes(data.len() - needed));
        }
        Ok((
            Self {
                data,
                pos: HEADER_LEN,
            },
            count,
        ))
    }

    fn u8(&mut self) -> u8 {
        let v = self.data[self.pos];
        self.pos += 1;
        v
    }

    fn u32(&mut self) -> u32 {
        let b = &self.data[self.pos..self.pos + 4];
        self.pos += 4;
        u32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;

    fn sample_transferable() -> Vec<TransferableResource> {
        vec![
            TransferableResource::new(ResourceId(444), [256, 128]),
            TransferableResource {
                id: ResourceId(555),
                target: TextureTarget::External,
                format: ResourceFormat::Luminance8,
                size: [1920, 1080],
                sync_point: 17,
            },
        ]
    }

    #[test]
    fn transferable_list_survives_the_wire() {
        let list = sample_transferable();
        let bytes = encode_transferable(&list).expect("short list");
        assert_eq!(bytes.len(), HEADER_LEN + 2 * TRANSFERABLE_LEN);
        assert_eq!(bytes[0], b'T');
        assert_eq!(decode_transferable(&bytes), Ok(list));
    }

    #[test]
    fn returned_layout_is_little_endian() {
        let bytes = encode_returned(&[ReturnedResource {
            id: ResourceId(0x0102_0304),
            count: 2,
            lost: true,
            sync_point: 9,
        }])
        .expect("short list");
        assert_eq!(
            bytes,
            [
                b'R', 1, 0, 0, 0, // header
                4, 3, 2, 1, // id
                2, 0, 0, 0, // count
                1, // lost
                9, 0, 0, 0, // sync point
            ]
        );
        let decoded = decode_returned(&bytes).expect("well-formed");
        assert_eq!(decoded[0].id, ResourceId(0x0102_0304));
        assert!(decoded[0].lost);
    }

    #[test]
    fn empty_lists_are_just_a_header() {
        assert_eq!(encode_returned(&[]), Ok(vec![b'R', 0, 0, 0, 0]));
        assert_eq!(decode_returned(&[b'R', 0, 0, 0, 0]), Ok(Vec::new()));
    }

    #[test]
    fn truncated_and_oversized_counts_are_rejected() {
        let mut bytes = encode_transferable(&sample_transferable()).expect("short list");
        bytes.pop();
        assert!(matches!(
            decode_transferable(&bytes),
            Err(WireError::Truncated { .. })
        ));

        let huge = [b'T', 0xff, 0xff, 0xff, 0xff];
        assert!(matches!(
            decode_transferable(&huge),
            Err(WireError::Truncated { .. })
        ));
        assert_eq!(
            decode_transferable(&[b'T']),
            Err(WireError::Truncated {
                needed: HEADER_LEN,
                available: 1,
            })
        );
    }

    #[test]
    fn wrong_tag_and_bad_codes_are_rejected() {
        let bytes = encode_returned(&[]).expect("empty list");
        assert_eq!(
            decode_transferable(&bytes),
            Err(WireError::UnexpectedTag {
                expected: b'T',
                found: b'R',
            })
        );

        let mut bytes = encode_transferable(&sample_transferable()[..1]).expect("short list");
        bytes[HEADER_LEN + 4] = 9;
        assert_eq!(
            decode_transferable(&bytes),
            Err(WireError::UnknownTextureTarget(9))
        );
        bytes[HEADER_LEN + 4] = 0;
        bytes[HEADER_LEN + 5] = 7;
        assert_eq!(decode_transferable(&bytes), Err(WireError::UnknownFormat(7)));
    }

    #[test]
    fn zero_count_and_trailing_bytes_are_rejected() {
        let mut bytes = encode_returned(&[ReturnedResource {
            id: ResourceId(3),
            count: 0,
            lost: false,
            sync_point: 0,
        }])
        .expect("short list");
        assert_eq!(
            decode_returned(&bytes),
            Err(WireError::ZeroCount(ResourceId(3)))
        );
        bytes[HEADER_LEN + 4] = 1;
        bytes.push(0);
        assert_eq!(decode_returned(&bytes), Err(WireError::TrailingBytes(1)));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn oversized_lists_are_refused_instead_of_truncated() {
        let len = usize::try_from(u64::from(u32::MAX) + 1).expect("64-bit usize");
        assert_eq!(entry_count(len), Err(WireError::TooManyEntries(len)));
        assert_eq!(entry_count(len - 1), Ok(u32::MAX));
    }
}
