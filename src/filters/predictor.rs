use crate::{Dictionary, Error, FilterError, Result};

/// Undoes the predictor declared in a Flate/LZW `DecodeParms` dictionary.
///
/// Predictor 1 (or none) is the identity, 2 is TIFF horizontal
/// differencing, 10 through 15 are the PNG row filters where every row
/// carries its own filter-type byte.
pub fn undo(data: Vec<u8>, parms: Option<&Dictionary>) -> Result<Vec<u8>> {
    let Some(parms) = parms else { return Ok(data) };
    let predictor = int_entry(parms, b"Predictor", 1);
    if predictor <= 1 {
        return Ok(data);
    }
    let colors = int_entry(parms, b"Colors", 1).max(1) as usize;
    let bits = int_entry(parms, b"BitsPerComponent", 8).max(1) as usize;
    let columns = int_entry(parms, b"Columns", 1).max(1) as usize;
    let bytes_per_pixel = (colors * bits).div_ceil(8).max(1);
    let row_len = (columns * colors * bits).div_ceil(8);

    match predictor {
        2 => undo_tiff(data, colors, bits, columns),
        10..=15 => undo_png(data, bytes_per_pixel, row_len),
        other => Err(Error::Filter(FilterError::Predictor(other as u8))),
    }
}

fn int_entry(parms: &Dictionary, key: &[u8], default: i64) -> i64 {
    parms.get(key).and_then(|v| v.as_i64()).unwrap_or(default)
}

fn undo_tiff(mut data: Vec<u8>, colors: usize, bits: usize, columns: usize) -> Result<Vec<u8>> {
    if bits != 8 {
        // Sub-byte TIFF prediction is vanishingly rare; refuse rather
        // than decode wrongly.
        return Err(Error::Filter(FilterError::Predictor(2)));
    }
    let row_len = columns * colors;
    for row in data.chunks_mut(row_len) {
        for i in colors..row.len() {
            row[i] = row[i].wrapping_add(row[i - colors]);
        }
    }
    Ok(data)
}

fn undo_png(data: Vec<u8>, bytes_per_pixel: usize, row_len: usize) -> Result<Vec<u8>> {
    let stride = row_len + 1;
    if data.len() % stride != 0 {
        return Err(Error::Filter(FilterError::Corrupt(
            "predicted data is not a whole number of rows".to_string(),
        )));
    }
    let rows = data.len() / stride;
    let mut output = vec![0u8; rows * row_len];
    let mut previous = vec![0u8; row_len];
    for (index, chunk) in data.chunks(stride).enumerate() {
        let filter_type = chunk[0];
        let row = &mut output[index * row_len..(index + 1) * row_len];
        row.copy_from_slice(&chunk[1..]);
        match filter_type {
            0 => {}
            1 => {
                for i in bytes_per_pixel..row_len {
                    row[i] = row[i].wrapping_add(row[i - bytes_per_pixel]);
                }
            }
            2 => {
                for i in 0..row_len {
                    row[i] = row[i].wrapping_add(previous[i]);
                }
            }
            3 => {
                for i in 0..row_len {
                    let left = if i >= bytes_per_pixel { row[i - bytes_per_pixel] } else { 0 };
                    let average = ((left as u16 + previous[i] as u16) / 2) as u8;
                    row[i] = row[i].wrapping_add(average);
                }
            }
            4 => {
                for i in 0..row_len {
                    let left = if i >= bytes_per_pixel { row[i - bytes_per_pixel] } else { 0 };
                    let upper_left = if i >= bytes_per_pixel {
                        previous[i - bytes_per_pixel]
                    } else {
                        0
                    };
                    row[i] = row[i].wrapping_add(paeth(left, previous[i], upper_left));
                }
            }
            other => {
                return Err(Error::Filter(FilterError::Corrupt(format!(
                    "unknown PNG row filter {other}"
                ))));
            }
        }
        previous.copy_from_slice(row);
    }
    Ok(output)
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let pa = (p - a as i16).abs();
    let pb = (p - b as i16).abs();
    let pc = (p - c as i16).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary;

    fn parms(predictor: i64, columns: i64) -> Dictionary {
        dictionary! { "Predictor" => predictor, "Columns" => columns }
    }

    #[test]
    fn predictor_one_is_identity() {
        let data = vec![1, 2, 3, 4];
        assert_eq!(undo(data.clone(), Some(&parms(1, 2))).unwrap(), data);
        assert_eq!(undo(data.clone(), None).unwrap(), data);
    }

    #[test]
    fn png_up_rows_accumulate() {
        // Two rows of four bytes, both filtered with Up (2). First row's
        // virtual predecessor is all zero.
        let data = vec![
            2, 10, 20, 30, 40, //
            2, 1, 1, 1, 1,
        ];
        assert_eq!(
            undo(data, Some(&parms(12, 4))).unwrap(),
            vec![10, 20, 30, 40, 11, 21, 31, 41]
        );
    }

    #[test]
    fn png_sub_uses_left_neighbor() {
        let data = vec![1, 5, 5, 5, 5];
        assert_eq!(undo(data, Some(&parms(11, 4))).unwrap(), vec![5, 10, 15, 20]);
    }

    #[test]
    fn tiff_horizontal_differencing() {
        let data = vec![10, 5, 5, 5];
        let parms = dictionary! { "Predictor" => 2, "Columns" => 4 };
        assert_eq!(undo(data, Some(&parms)).unwrap(), vec![10, 15, 20, 25]);
    }

    #[test]
    fn ragged_png_rows_are_corrupt() {
        assert!(undo(vec![2, 1, 2], Some(&parms(12, 4))).is_err());
    }
}
