use aes::cipher::block_padding::{PadType, RawPadding, UnpadError};

/// PKCS#5 padding: fill the tail of the block with the count of bytes
/// added. Defined in [RFC 2898](https://tools.ietf.org/html/rfc2898) for
/// 8-byte blocks; the same rule over 16-byte blocks is what encrypted PDF
/// payloads carry.
#[derive(Clone, Copy, Debug)]
pub struct Pkcs5;

impl RawPadding for Pkcs5 {
    const TYPE: PadType = PadType::Reversible;

    #[inline]
    fn raw_pad(block: &mut [u8], pos: usize) {
        debug_assert!(block.len() <= 16, "block size is too big for PKCS#5");
        debug_assert!(pos < block.len(), "`pos` is bigger or equal to block size");
        let padding = (block.len() - pos) as u8;
        for slot in &mut block[pos..] {
            *slot = padding;
        }
    }

    #[inline]
    fn raw_unpad(block: &[u8]) -> Result<&[u8], UnpadError> {
        if block.is_empty() || block.len() > 16 {
            return Err(UnpadError);
        }
        let padding = block[block.len() - 1] as usize;
        if padding == 0 || padding > block.len() {
            return Err(UnpadError);
        }
        let split = block.len() - padding;
        if block[split..block.len() - 1].iter().any(|&b| b as usize != padding) {
            return Err(UnpadError);
        }
        Ok(&block[..split])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pad_fills_with_count() {
        let mut block = *b"abcde\0\0\0\0\0\0\0\0\0\0\0";
        Pkcs5::raw_pad(&mut block, 5);
        assert_eq!(&block[..5], b"abcde");
        assert!(block[5..].iter().all(|&b| b == 11));
    }

    #[test]
    fn unpad_rejects_bad_counts() {
        assert!(Pkcs5::raw_unpad(&[1, 2, 0]).is_err());
        assert!(Pkcs5::raw_unpad(&[4, 4, 4]).is_err());
        assert_eq!(Pkcs5::raw_unpad(&[b'x', 2, 2]).unwrap(), b"x");
    }
}
