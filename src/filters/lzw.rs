use weezl::{BitOrder, decode as lzw_decode, encode as lzw_encode};

use crate::{Error, FilterError, Result};

/// LZW with most-significant-bit-first packing and 8-bit symbols. With
/// `early_change` (the default) code widths grow one code early, the way
/// TIFF writers do.
pub fn decode(data: &[u8], early_change: bool) -> Result<Vec<u8>> {
    let mut decoder = if early_change {
        lzw_decode::Decoder::with_tiff_size_switch(BitOrder::Msb, 8)
    } else {
        lzw_decode::Decoder::new(BitOrder::Msb, 8)
    };
    decoder
        .decode(data)
        .map_err(|err| Error::Filter(FilterError::Corrupt(err.to_string())))
}

pub fn encode(data: &[u8]) -> Vec<u8> {
    lzw_encode::Encoder::with_tiff_size_switch(BitOrder::Msb, 8)
        .encode(data)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_early_change() {
        let data = b"TOBEORNOTTOBEORTOBEORNOT";
        assert_eq!(decode(&encode(data), true).unwrap(), data);
    }

    #[test]
    fn roundtrip_long_repetitive_payload() {
        // Long enough to push the code width past nine bits, which is
        // where early-change handling starts to matter.
        let data: Vec<u8> = (0..4096u32).map(|i| (i % 7) as u8 * 31).collect();
        assert_eq!(decode(&encode(&data), true).unwrap(), data);
    }
}
