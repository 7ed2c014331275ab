/*
 * SPDX-FileCopyrightText: 2025 Inria
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Variable-length delta coding of sorted neighbor lists.
//!
//! A list of ids is written as a sequence of gaps: the first gap is taken
//! from an external base (usually zero), every following gap from the
//! previous id. Each gap is then written as a base-128 varint: seven payload
//! bits per byte, least significant group first, with the high bit of a byte
//! set when more bytes follow. A full `u64` needs at most
//! [`MAX_VARINT_LEN`] bytes, and gaps smaller than 128 need just one.
//!
//! Decoding is block oriented: [`decode_block`] rebuilds a fixed number of
//! absolute ids from a byte offset and a running value, so that
//! [cursors](crate::cursor::AdjacencyCursor) can decode [`CHUNK_SIZE`] ids at
//! a time instead of whole lists.

use thiserror::Error;

/// The number of ids decoded at once by a cursor.
pub const CHUNK_SIZE: usize = 64;

/// The maximum number of bytes of an encoded `u64`.
pub const MAX_VARINT_LEN: usize = 10;

const PAYLOAD_BITS: u32 = 7;
const PAYLOAD_MASK: u64 = 0x7F;
const CONTINUATION: u8 = 0x80;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
/// Errors that can happen when delta-encoding a list of ids.
pub enum EncodeError {
    #[error("The first id {first} is smaller than the base {base}")]
    BelowBase { first: u64, base: u64 },
    #[error("Ids are not sorted: {prev} is followed by {next} at position {pos}")]
    Unsorted { pos: usize, prev: u64, next: u64 },
}

/// Returns the number of bytes needed to write `value` as a varint.
#[inline(always)]
pub fn varint_len(value: u64) -> usize {
    // 64 significant bits at most, in groups of seven
    let bits = 64 - (value | 1).leading_zeros() as usize;
    bits.div_ceil(PAYLOAD_BITS as usize)
}

/// Appends `value` to `out` as a varint and returns the number of bytes written.
#[inline]
pub fn write_varint(mut value: u64, out: &mut Vec<u8>) -> usize {
    let start = out.len();
    while value > PAYLOAD_MASK {
        out.push((value & PAYLOAD_MASK) as u8 | CONTINUATION);
        value >>= PAYLOAD_BITS;
    }
    out.push(value as u8);
    out.len() - start
}

/// Reads a varint starting at `offset`, returning the value and the offset
/// of the following byte.
///
/// # Panics
///
/// If the input ends before the last byte of the varint, or if the varint
/// is longer than [`MAX_VARINT_LEN`] bytes.
#[inline(always)]
pub fn read_varint(bytes: &[u8], mut offset: usize) -> (u64, usize) {
    let mut value = 0;
    let mut shift = 0;
    loop {
        let Some(&byte) = bytes.get(offset) else {
            panic!("varint decode truncated at offset {offset}");
        };
        offset += 1;
        value |= (byte as u64 & PAYLOAD_MASK) << shift;
        if byte & CONTINUATION == 0 {
            return (value, offset);
        }
        shift += PAYLOAD_BITS;
        assert!(
            shift < PAYLOAD_BITS * MAX_VARINT_LEN as u32,
            "varint longer than {MAX_VARINT_LEN} bytes at offset {offset}"
        );
    }
}

/// Checks that `ids` can be delta-encoded starting from `base`.
fn check_sorted(ids: &[u64], base: u64) -> Result<(), EncodeError> {
    if let Some(&first) = ids.first() {
        if first < base {
            return Err(EncodeError::BelowBase { first, base });
        }
    }
    for (pos, w) in ids.windows(2).enumerate() {
        if w[1] < w[0] {
            return Err(EncodeError::Unsorted {
                pos: pos + 1,
                prev: w[0],
                next: w[1],
            });
        }
    }
    Ok(())
}

/// Returns the number of bytes [`encode_deltas`] would write for `ids`.
///
/// The result is meaningful only if `ids` is sorted and not below `base`.
pub fn encoded_len(ids: &[u64], base: u64) -> usize {
    let mut prev = base;
    ids.iter()
        .map(|&id| {
            let len = varint_len(id.wrapping_sub(prev));
            prev = id;
            len
        })
        .sum()
}

/// Appends the delta encoding of `ids` (starting from `base`) to `out`,
/// returning the number of bytes written.
///
/// Ids must be non-decreasing and the first one must not be smaller than
/// `base`; otherwise, nothing is written and an error is returned.
pub fn encode_deltas(ids: &[u64], base: u64, out: &mut Vec<u8>) -> Result<usize, EncodeError> {
    check_sorted(ids, base)?;
    out.reserve(encoded_len(ids, base));
    let mut prev = base;
    let mut written = 0;
    for &id in ids {
        written += write_varint(id - prev, out);
        prev = id;
    }
    Ok(written)
}

/// Decodes `out.len()` ids starting at `offset`, adding each gap to the
/// running value `current`, and returns the offset following the last
/// decoded byte.
///
/// Passing as `current` the last id of the previous block (or the base, for
/// the first block) makes it possible to decode a list one block at a time.
#[inline]
pub fn decode_block(bytes: &[u8], mut offset: usize, mut current: u64, out: &mut [u64]) -> usize {
    for slot in out.iter_mut() {
        let (gap, next) = read_varint(bytes, offset);
        offset = next;
        current += gap;
        *slot = current;
    }
    offset
}

/// Decodes a whole list of `count` ids written with base `base`.
pub fn decode_all(bytes: &[u8], count: usize, base: u64) -> Vec<u64> {
    let mut ids = vec![0; count];
    decode_block(bytes, 0, base, &mut ids);
    ids
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_varint_boundaries() {
        let cases = [
            (0_u64, 1_usize),
            (1, 1),
            (127, 1),
            (128, 2),
            (16_383, 2),
            (16_384, 3),
            (u32::MAX as u64, 5),
            (1 << 63, 10),
            (u64::MAX, 10),
        ];
        for (value, len) in cases {
            assert_eq!(varint_len(value), len, "length of {value}");
            let mut buf = vec![];
            assert_eq!(write_varint(value, &mut buf), len);
            assert_eq!(read_varint(&buf, 0), (value, len));
        }
    }

    #[test]
    fn test_empty_and_single() {
        let mut buf = vec![];
        assert_eq!(encode_deltas(&[], 0, &mut buf), Ok(0));
        assert!(buf.is_empty());
        assert!(decode_all(&buf, 0, 0).is_empty());

        assert_eq!(encode_deltas(&[1000], 990, &mut buf), Ok(1));
        assert_eq!(buf, [10]);
        assert_eq!(decode_all(&buf, 1, 990), [1000]);
    }

    #[test]
    fn test_duplicates_are_zero_gaps() {
        let ids = [0, 1, 2, 2, 3];
        let mut buf = vec![];
        assert_eq!(encode_deltas(&ids, 0, &mut buf), Ok(5));
        assert_eq!(buf, [0, 1, 1, 0, 1]);
        assert_eq!(decode_all(&buf, ids.len(), 0), ids);
    }

    #[test]
    fn test_unsorted_is_rejected() {
        let mut buf = vec![42];
        assert_eq!(
            encode_deltas(&[1, 5, 3], 0, &mut buf),
            Err(EncodeError::Unsorted {
                pos: 2,
                prev: 5,
                next: 3
            })
        );
        assert_eq!(
            encode_deltas(&[1, 5], 2, &mut buf),
            Err(EncodeError::BelowBase { first: 1, base: 2 })
        );
        // nothing was appended
        assert_eq!(buf, [42]);
    }

    #[test]
    fn test_blocks_carry_current_value() {
        let ids: Vec<u64> = (0..3 * CHUNK_SIZE as u64 + 7).map(|x| x * 300).collect();
        let mut buf = vec![];
        encode_deltas(&ids, 0, &mut buf).unwrap();

        let mut decoded = vec![];
        let mut block = [0; CHUNK_SIZE];
        let mut offset = 0;
        let mut current = 0;
        for chunk in ids.chunks(CHUNK_SIZE) {
            let out = &mut block[..chunk.len()];
            offset = decode_block(&buf, offset, current, out);
            current = out[out.len() - 1];
            decoded.extend_from_slice(out);
        }
        assert_eq!(offset, buf.len());
        assert_eq!(decoded, ids);
    }

    #[test]
    #[should_panic(expected = "varint decode truncated")]
    fn test_truncated_input_panics() {
        let mut buf = vec![];
        write_varint(1 << 40, &mut buf);
        buf.pop();
        read_varint(&buf, 0);
    }

    proptest! {
        #[test]
        fn prop_roundtrip(mut ids in proptest::collection::vec(any::<u64>(), 0..300), base in 0_u64..1000) {
            ids.sort_unstable();
            ids.retain(|&id| id >= base);
            let mut buf = vec![];
            let written = encode_deltas(&ids, base, &mut buf).unwrap();
            prop_assert_eq!(written, buf.len());
            prop_assert_eq!(written, encoded_len(&ids, base));
            prop_assert_eq!(decode_all(&buf, ids.len(), base), ids);
        }

        #[test]
        fn prop_varint_len(value in any::<u64>()) {
            let mut buf = vec![];
            prop_assert_eq!(write_varint(value, &mut buf), varint_len(value));
            prop_assert_eq!(read_varint(&buf, 0), (value, buf.len()));
        }
    }
}
