use crate::dex::error::DexError;

pub(crate) fn encode_uleb128(buffer: &mut Vec<u8>, value: u32) -> usize {
    let start = buffer.len();
    let mut remaining = value;
    loop {
        let byte = (remaining & 0x7f) as u8;
        remaining >>= 7;
        if remaining == 0 {
            buffer.push(byte);
            break;
        }
        buffer.push(byte | 0x80);
    }
    buffer.len() - start
}

/// Dex leb128 values hold at most 32 bits, so valid encodings are at most five bytes.
pub(crate) fn decode_uleb128(bytes: &[u8], ix: &mut usize) -> Result<u32, DexError> {
    let mut value: u32 = 0;
    for i in 0..5 {
        let Some(&byte) = bytes.get(*ix) else {
            fail!("Unexpected end of stream reading uleb128 at index {}", *ix);
        };
        *ix += 1;
        value |= ((byte & 0x7f) as u32) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    fail!("uleb128 value longer than five bytes ending at index {}", *ix)
}

pub(crate) fn encode_sleb128(buffer: &mut Vec<u8>, value: i32) -> usize {
    let start = buffer.len();
    let mut remaining = value;
    loop {
        let byte = (remaining & 0x7f) as u8;
        remaining >>= 7;
        let done = (remaining == 0 && byte & 0x40 == 0) || (remaining == -1 && byte & 0x40 != 0);
        if done {
            buffer.push(byte);
            break;
        }
        buffer.push(byte | 0x80);
    }
    buffer.len() - start
}

pub(crate) fn decode_sleb128(bytes: &[u8], ix: &mut usize) -> Result<i32, DexError> {
    let mut value: i32 = 0;
    let mut shift = 0u32;
    for _ in 0..5 {
        let Some(&byte) = bytes.get(*ix) else {
            fail!("Unexpected end of stream reading sleb128 at index {}", *ix);
        };
        *ix += 1;
        value |= ((byte & 0x7f) as i32) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            if shift < 32 && byte & 0x40 != 0 {
                value |= -1i32 << shift;
            }
            return Ok(value);
        }
    }
    fail!("sleb128 value longer than five bytes ending at index {}", *ix)
}

/// uleb128p1 stores `value + 1`, so `NO_INDEX` (-1) encodes as a single zero byte.
pub(crate) fn encode_uleb128p1(buffer: &mut Vec<u8>, value: i32) -> usize {
    encode_uleb128(buffer, value.wrapping_add(1) as u32)
}

pub(crate) fn decode_uleb128p1(bytes: &[u8], ix: &mut usize) -> Result<i32, DexError> {
    Ok((decode_uleb128(bytes, ix)? as i32).wrapping_sub(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_encode_uleb128() {
        let cases = vec![
            (0, vec![0x00]),
            (1, vec![0x01]),
            (127, vec![0x7F]),
            (128, vec![0x80, 0x01]),
            (16256, vec![0x80, 0x7F]),
            (624485, vec![0xE5, 0x8E, 0x26]),
            (u32::MAX, vec![0xFF, 0xFF, 0xFF, 0xFF, 0x0F]),
        ];

        for (value, expected) in cases {
            let mut buffer = vec![];
            let written = encode_uleb128(&mut buffer, value);
            assert_eq!(buffer, expected);
            assert_eq!(written, expected.len());
        }
    }

    #[test]
    fn test_decode_sleb128() {
        let cases = vec![
            (vec![0x00], 0),
            (vec![0x01], 1),
            (vec![0x7F], -1),
            (vec![0xFF, 0x00], 127),
            (vec![0x80, 0x7F], -128),
            (vec![0xC0, 0xBB, 0x78], -123456),
        ];

        for (encoded, expected) in cases {
            let mut ix = 0;
            assert_eq!(decode_sleb128(&encoded, &mut ix).unwrap(), expected);
            assert_eq!(ix, encoded.len());
        }
    }

    #[test]
    fn test_uleb128p1_no_index() {
        let mut buffer = vec![];
        encode_uleb128p1(&mut buffer, -1);
        assert_eq!(buffer, vec![0x00]);
        let mut ix = 0;
        assert_eq!(decode_uleb128p1(&buffer, &mut ix).unwrap(), -1);
    }

    #[test]
    fn test_truncated_input() {
        let mut ix = 0;
        assert!(decode_uleb128(&[0x80, 0x80], &mut ix).is_err());
        let mut ix = 3;
        assert!(decode_sleb128(&[0x00], &mut ix).is_err());
        let mut ix = 0;
        assert!(decode_uleb128(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x01], &mut ix).is_err());
    }

    #[test]
    fn test_random_values() {
        let mut rng = rand::rng();
        for _ in 0..1000 {
            let u: u32 = rng.random();
            let s: i32 = rng.random();
            let mut buffer = vec![];
            encode_uleb128(&mut buffer, u);
            encode_sleb128(&mut buffer, s);
            let mut ix = 0;
            assert_eq!(decode_uleb128(&buffer, &mut ix).unwrap(), u);
            assert_eq!(decode_sleb128(&buffer, &mut ix).unwrap(), s);
            assert_eq!(ix, buffer.len());
        }
    }
}
