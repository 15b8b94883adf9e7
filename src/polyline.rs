//! The provider's "encoded polyline" format: each coordinate is stored as the
//! delta from the previous one, scaled by 1e5, zigzag encoded and split into
//! 5-bit groups. Every group is offset by 63 so it lands in printable ASCII,
//! and all but the last group of a value carry the 0x20 continuation bit.

use anyhow::Result;

use crate::gps_processor::Point;

const PRECISION: f64 = 1e5;
const OFFSET: u8 = 63;
const CONTINUATION_BIT: i64 = 0x20;
const CHUNK_MASK: i64 = 0x1f;

fn decode_value(bytes: &[u8], index: &mut usize) -> Result<i64> {
    let mut result: i64 = 0;
    let mut shift = 0;
    loop {
        let byte = match bytes.get(*index) {
            Some(byte) => *byte,
            None => bail!("polyline truncated at byte {}", *index),
        };
        if !(OFFSET..=b'~').contains(&byte) {
            bail!(
                "invalid polyline character {:?} at byte {}",
                byte as char,
                *index
            );
        }
        // a valid value never needs more than 7 groups (35 bits)
        if shift > 30 {
            bail!("polyline value overflows at byte {}", *index);
        }
        *index += 1;

        let chunk = (byte - OFFSET) as i64;
        result |= (chunk & CHUNK_MASK) << shift;
        shift += 5;
        if chunk & CONTINUATION_BIT == 0 {
            break;
        }
    }
    Ok(if result & 1 != 0 {
        !(result >> 1)
    } else {
        result >> 1
    })
}

pub fn decode(encoded: &str) -> Result<Vec<Point>> {
    let bytes = encoded.as_bytes();
    let mut index = 0;
    let mut lat: i64 = 0;
    let mut lng: i64 = 0;
    let mut points = Vec::new();

    while index < bytes.len() {
        lat += decode_value(bytes, &mut index)?;
        if index >= bytes.len() {
            bail!("polyline ends after a latitude without its longitude");
        }
        lng += decode_value(bytes, &mut index)?;
        points.push(Point {
            latitude: lat as f64 / PRECISION,
            longitude: lng as f64 / PRECISION,
        });
    }
    Ok(points)
}

fn encode_value(value: i64, out: &mut String) {
    let mut value = if value < 0 { !(value << 1) } else { value << 1 };
    while value >= CONTINUATION_BIT {
        out.push((((CONTINUATION_BIT | (value & CHUNK_MASK)) as u8) + OFFSET) as char);
        value >>= 5;
    }
    out.push(((value as u8) + OFFSET) as char);
}

pub fn encode(points: &[Point]) -> String {
    let mut out = String::new();
    let mut prev_lat: i64 = 0;
    let mut prev_lng: i64 = 0;
    for point in points {
        let lat = (point.latitude * PRECISION).round() as i64;
        let lng = (point.longitude * PRECISION).round() as i64;
        encode_value(lat - prev_lat, &mut out);
        encode_value(lng - prev_lng, &mut out);
        prev_lat = lat;
        prev_lng = lng;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{decode_value, encode_value};

    #[test]
    fn single_values() {
        for value in [0, 1, -1, 17, -17, 3850000, -12020000, 1 << 30] {
            let mut out = String::new();
            encode_value(value, &mut out);
            let mut index = 0;
            assert_eq!(decode_value(out.as_bytes(), &mut index).unwrap(), value);
            assert_eq!(index, out.len());
        }
    }

    #[test]
    fn minus_one_is_a_single_byte() {
        let mut out = String::new();
        encode_value(-1, &mut out);
        assert_eq!(out, "@");
    }
}
