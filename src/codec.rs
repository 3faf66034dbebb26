//! Binary codec: fixed-width primitive and variable-length value encode/decode,
//! parameterized over segment endianness. A single read+write primitive set so
//! the writer and index mirror reuse the exact same byte-level logic the
//! reader does instead of hand-rolling their own endian swaps.

use crate::data_type::TdmsTimestamp;
use crate::TdmsError;
use std::io::{Read, Write};

/// Which byte order a segment's metadata and raw data are encoded in. The table
/// of contents byte itself is always little-endian regardless of this value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endianness {
    Little,
    Big,
}

macro_rules! primitive_rw {
    ($read_name:ident, $write_name:ident, $ty:ty, $n:literal) => {
        pub fn $read_name<R: Read>(r: &mut R, endianness: Endianness) -> Result<$ty, TdmsError> {
            let mut buf = [0u8; $n];
            r.read_exact(&mut buf)?;
            Ok(match endianness {
                Endianness::Little => <$ty>::from_le_bytes(buf),
                Endianness::Big => <$ty>::from_be_bytes(buf),
            })
        }

        pub fn $write_name<W: Write>(
            w: &mut W,
            endianness: Endianness,
            v: $ty,
        ) -> Result<(), TdmsError> {
            let bytes = match endianness {
                Endianness::Little => v.to_le_bytes(),
                Endianness::Big => v.to_be_bytes(),
            };
            w.write_all(&bytes)?;
            Ok(())
        }
    };
}

primitive_rw!(read_u8_bytes, write_u8_bytes, u8, 1);
primitive_rw!(read_i8_bytes, write_i8_bytes, i8, 1);
primitive_rw!(read_u16, write_u16, u16, 2);
primitive_rw!(read_i16, write_i16, i16, 2);
primitive_rw!(read_u32, write_u32, u32, 4);
primitive_rw!(read_i32, write_i32, i32, 4);
primitive_rw!(read_u64, write_u64, u64, 8);
primitive_rw!(read_i64, write_i64, i64, 8);
primitive_rw!(read_f32, write_f32, f32, 4);
primitive_rw!(read_f64, write_f64, f64, 8);

/// u8 has no endianness but is provided for symmetry with the other primitives.
pub fn read_u8<R: Read>(r: &mut R) -> Result<u8, TdmsError> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

pub fn write_u8<W: Write>(w: &mut W, v: u8) -> Result<(), TdmsError> {
    w.write_all(&[v])?;
    Ok(())
}

pub fn read_bool<R: Read>(r: &mut R) -> Result<bool, TdmsError> {
    Ok(read_u8(r)? != 0)
}

pub fn write_bool<W: Write>(w: &mut W, v: bool) -> Result<(), TdmsError> {
    write_u8(w, if v { 1 } else { 0 })
}

/// Length-prefixed UTF-8 string: a `u32` byte count followed by the raw bytes.
/// Used for object paths, property names, and TDMS `String` typed values alike.
pub fn read_string<R: Read>(r: &mut R, endianness: Endianness) -> Result<String, TdmsError> {
    let len = read_u32(r, endianness)?;
    let len = usize::try_from(len)?;

    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;

    String::from_utf8(buf).map_err(|_| TdmsError::InvalidUtf8("string value".to_string()))
}

pub fn write_string<W: Write>(
    w: &mut W,
    endianness: Endianness,
    s: &str,
) -> Result<(), TdmsError> {
    let bytes = s.as_bytes();
    write_u32(w, endianness, bytes.len() as u32)?;
    w.write_all(bytes)?;
    Ok(())
}

/// An unprefixed UTF-8 byte run of known length, used when decoding the
/// contiguous byte blob of a string channel chunk rather than a single
/// length-prefixed property value.
pub fn read_str_bytes<R: Read>(r: &mut R, len: usize) -> Result<String, TdmsError> {
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|_| TdmsError::InvalidUtf8("channel string value".to_string()))
}

/// NI timestamps are a 16 byte pair of a `u64` fraction (units of 2^-64 seconds)
/// and an `i64` signed seconds-since-epoch count. Little-endian segments store
/// `(fraction, seconds)`; big-endian segments store `(seconds, fraction)` - the
/// byte order of each field still follows the segment's endianness.
pub fn read_timestamp<R: Read>(r: &mut R, endianness: Endianness) -> Result<TdmsTimestamp, TdmsError> {
    match endianness {
        Endianness::Little => {
            let fractions_of_a_second = read_u64(r, endianness)?;
            let seconds_since_ni_epoch = read_i64(r, endianness)?;
            Ok(TdmsTimestamp {
                seconds_since_ni_epoch,
                fractions_of_a_second,
            })
        }
        Endianness::Big => {
            let seconds_since_ni_epoch = read_i64(r, endianness)?;
            let fractions_of_a_second = read_u64(r, endianness)?;
            Ok(TdmsTimestamp {
                seconds_since_ni_epoch,
                fractions_of_a_second,
            })
        }
    }
}

pub fn write_timestamp<W: Write>(
    w: &mut W,
    endianness: Endianness,
    ts: &TdmsTimestamp,
) -> Result<(), TdmsError> {
    match endianness {
        Endianness::Little => {
            write_u64(w, endianness, ts.fractions_of_a_second)?;
            write_i64(w, endianness, ts.seconds_since_ni_epoch)?;
        }
        Endianness::Big => {
            write_i64(w, endianness, ts.seconds_since_ni_epoch)?;
            write_u64(w, endianness, ts.fractions_of_a_second)?;
        }
    }
    Ok(())
}

/// The 80-bit extended-precision float is stored opaquely on the wire; we only
/// decode it to an `f64` approximation for display, via the `extended` crate.
pub fn read_extended<R: Read>(r: &mut R) -> Result<[u8; 10], TdmsError> {
    let mut buf = [0u8; 10];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

pub fn write_extended<W: Write>(w: &mut W, buf: &[u8; 10]) -> Result<(), TdmsError> {
    w.write_all(buf)?;
    Ok(())
}

/// Best-effort decode of the raw 10 bytes into an `f64`. `extended::Extended`
/// only round-trips through big-endian 80-bit buffers, so we flip the byte
/// order first when the segment is little-endian.
pub fn extended_to_f64(buf: &[u8; 10], endianness: Endianness) -> f64 {
    let mut be = *buf;
    if endianness == Endianness::Little {
        be.reverse();
    }
    extended::Extended::from_be_bytes(be).into()
}

/// `FixedPoint` values carry no self-describing scale/precision in the segment
/// metadata (that lives in an associated property set by the writer, outside
/// this engine's scope), so we keep the raw 10 bytes and let `fixed`-typed
/// callers reinterpret them.
pub fn read_fixed_point<R: Read>(r: &mut R) -> Result<[u8; 10], TdmsError> {
    let mut buf = [0u8; 10];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

pub fn write_fixed_point<W: Write>(w: &mut W, buf: &[u8; 10]) -> Result<(), TdmsError> {
    w.write_all(buf)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trips_u32_both_endiannesses() {
        let mut buf = Vec::new();
        write_u32(&mut buf, Endianness::Little, 0xdead_beef).unwrap();
        let mut c = Cursor::new(buf);
        assert_eq!(read_u32(&mut c, Endianness::Little).unwrap(), 0xdead_beef);

        let mut buf = Vec::new();
        write_u32(&mut buf, Endianness::Big, 0xdead_beef).unwrap();
        let mut c = Cursor::new(buf);
        assert_eq!(read_u32(&mut c, Endianness::Big).unwrap(), 0xdead_beef);
    }

    #[test]
    fn round_trips_string() {
        let mut buf = Vec::new();
        write_string(&mut buf, Endianness::Little, "hello world").unwrap();
        let mut c = Cursor::new(buf);
        assert_eq!(
            read_string(&mut c, Endianness::Little).unwrap(),
            "hello world"
        );
    }

    #[test]
    fn timestamp_field_order_differs_by_endianness() {
        let ts = TdmsTimestamp {
            seconds_since_ni_epoch: 3_000_000_000,
            fractions_of_a_second: 42,
        };

        let mut le = Vec::new();
        write_timestamp(&mut le, Endianness::Little, &ts).unwrap();
        // fraction (u64) comes first on the wire for little-endian segments
        assert_eq!(&le[0..8], &42u64.to_le_bytes());

        let mut be = Vec::new();
        write_timestamp(&mut be, Endianness::Big, &ts).unwrap();
        // seconds (i64) comes first on the wire for big-endian segments
        assert_eq!(&be[0..8], &3_000_000_000i64.to_be_bytes());

        let mut c = Cursor::new(le);
        let back = read_timestamp(&mut c, Endianness::Little).unwrap();
        assert_eq!(back.seconds_since_ni_epoch, ts.seconds_since_ni_epoch);
        assert_eq!(back.fractions_of_a_second, ts.fractions_of_a_second);
    }

    #[test]
    fn invalid_utf8_surfaces_as_invalid_utf8_error() {
        let mut buf = Vec::new();
        write_u32(&mut buf, Endianness::Little, 2).unwrap();
        buf.extend_from_slice(&[0xff, 0xfe]);
        let mut c = Cursor::new(buf);
        let err = read_string(&mut c, Endianness::Little).unwrap_err();
        assert!(matches!(err, TdmsError::InvalidUtf8(_)));
    }
}
