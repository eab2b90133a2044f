//! Order-preserving variable-length encoding for unsigned 64-bit integers.
//!
//! `xor` is `0x00` for the ascending encoding and `0xFF` for the descending
//! ("negative"/"NEG_TIME") variant: every emitted
//! byte is XOR'd with `xor`, and decoding XORs the same mask back off before
//! interpreting the byte, so the whole size-bucket table above is reused
//! unchanged for both directions.

use crate::error::CoreError;

/// Append the order-preserving encoding of `v` to `out`, emitting 1-9 bytes
/// depending on magnitude (see the size table below).
pub fn write_uint(v: u64, xor: u8, out: &mut Vec<u8>) {
    if v <= 240 {
        out.push(xor ^ (v as u8));
    } else if v <= 2287 {
        let v = v - 240;
        out.push(xor ^ (241 + (v >> 8) as u8));
        out.push(xor ^ (v & 0xff) as u8);
    } else if v <= 67823 {
        let v = v - 2288;
        out.push(xor ^ 0xf9);
        out.push(xor ^ ((v >> 8) & 0xff) as u8);
        out.push(xor ^ (v & 0xff) as u8);
    } else if v <= 0xff_ffff {
        out.push(xor ^ 0xfa);
        push_be(out, v, 3, xor);
    } else if v <= 0xffff_ffff {
        out.push(xor ^ 0xfb);
        push_be(out, v, 4, xor);
    } else if v <= 0xff_ffff_ffff {
        out.push(xor ^ 0xfc);
        push_be(out, v, 5, xor);
    } else if v <= 0xffff_ffff_ffff {
        out.push(xor ^ 0xfd);
        push_be(out, v, 6, xor);
    } else if v <= 0xff_ffff_ffff_ffff {
        out.push(xor ^ 0xfe);
        push_be(out, v, 7, xor);
    } else {
        out.push(xor ^ 0xff);
        push_be(out, v, 8, xor);
    }
}

#[inline]
fn push_be(out: &mut Vec<u8>, v: u64, nbytes: u32, xor: u8) {
    for i in (0..nbytes).rev() {
        out.push(xor ^ (((v >> (8 * i)) & 0xff) as u8));
    }
}

/// Decode a value written by [`write_uint`], returning the value and the
/// position just past its encoding. `xor` must match the mask used to
/// encode it.
pub fn read_uint(buf: &[u8], pos: usize, xor: u8) -> Result<(u64, usize), CoreError> {
    let byte_at = |i: usize| -> Result<u8, CoreError> {
        buf.get(i)
            .copied()
            .ok_or_else(|| CoreError::CorruptKey("truncated integer".into()))
    };

    let o = xor ^ byte_at(pos)?;
    if o <= 240 {
        return Ok((o as u64, pos + 1));
    }
    if o <= 0xf8 {
        let o2 = xor ^ byte_at(pos + 1)?;
        return Ok((240 + 256 * (o as u64 - 241) + o2 as u64, pos + 2));
    }

    let nbytes = match o {
        0xf9 => 2,
        0xfa => 3,
        0xfb => 4,
        0xfc => 5,
        0xfd => 6,
        0xfe => 7,
        0xff => 8,
        _ => unreachable!("o > 0xf8 is exhaustively covered above"),
    };

    let mut acc: u64 = 0;
    for i in 0..nbytes {
        acc = (acc << 8) | (xor ^ byte_at(pos + 1 + i)?) as u64;
    }
    if o == 0xf9 {
        acc += 2288;
    }
    Ok((acc, pos + 1 + nbytes))
}

/// Pack a single unsigned integer with the ascending encoding.
pub fn pack_uint(v: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(2);
    write_uint(v, 0, &mut out);
    out
}

/// Unpack a single unsigned integer encoded by [`pack_uint`].
pub fn unpack_uint(buf: &[u8]) -> Result<u64, CoreError> {
    read_uint(buf, 0, 0).map(|(v, _)| v)
}

/// Decode the `[varint m][varint len1]...[varint lenm]` offset prefix of a
/// batch physical value: `m` deltas starting at 0, returned as `m + 1`
/// cumulative offsets plus the position the member payload starts at.
pub fn decode_offsets(buf: &[u8]) -> Result<(Vec<usize>, usize), CoreError> {
    let (count, mut pos) = read_uint(buf, 0, 0)?;
    let mut out = Vec::with_capacity(count as usize + 1);
    out.push(0usize);
    for _ in 0..count {
        let (delta, next) = read_uint(buf, pos, 0)?;
        pos = next;
        let prev = *out.last().unwrap();
        out.push(prev + delta as usize);
    }
    Ok((out, pos))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn size_buckets_match_table() {
        let cases: &[(u64, usize)] = &[
            (0, 1),
            (240, 1),
            (241, 2),
            (2287, 2),
            (2288, 3),
            (67823, 3),
            (67824, 4),
            ((1 << 24) - 1, 4),
            (1 << 24, 5),
            ((1u64 << 32) - 1, 5),
            (1u64 << 32, 6),
            ((1u64 << 40) - 1, 6),
            ((1u64 << 48) - 1, 7),
            ((1u64 << 56) - 1, 8),
            (1u64 << 56, 9),
            (u64::MAX, 9),
        ];
        for &(v, expect_len) in cases {
            let enc = pack_uint(v);
            assert_eq!(enc.len(), expect_len, "size mismatch for {v}");
            assert_eq!(unpack_uint(&enc).unwrap(), v, "round-trip mismatch for {v}");
        }
    }

    #[test]
    fn ascending_order_matches_numeric_order() {
        let mut vs: Vec<u64> = vec![
            0, 1, 239, 240, 241, 2287, 2288, 67823, 67824, 1 << 24, 1 << 32, 1 << 40,
            1 << 48, u64::MAX,
        ];
        vs.sort_unstable();
        let encoded: Vec<Vec<u8>> = vs.iter().map(|&v| pack_uint(v)).collect();
        let mut sorted = encoded.clone();
        sorted.sort();
        assert_eq!(encoded, sorted);
    }

    #[test]
    fn descending_variant_reverses_order() {
        let a = {
            let mut v = Vec::new();
            write_uint(5, 0xff, &mut v);
            v
        };
        let b = {
            let mut v = Vec::new();
            write_uint(6, 0xff, &mut v);
            v
        };
        assert!(a > b);
        assert_eq!(read_uint(&a, 0, 0xff).unwrap().0, 5);
        assert_eq!(read_uint(&b, 0, 0xff).unwrap().0, 6);
    }

    #[test]
    fn truncated_buffer_is_corrupt_key() {
        let buf = [0xffu8];
        assert!(read_uint(&buf, 0, 0).is_err());
    }
}
