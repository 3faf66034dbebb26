//! Type registry: the wire-code to `TdmsDataType` mapping, each type's fixed
//! byte width (where it has one), and the decoded `Value` representation used
//! by metadata properties and the object model.

use crate::codec::{self, Endianness};
use crate::TdmsError;
#[cfg(feature = "chrono")]
use chrono::{prelude::*, Duration};
use std::io::{Read, Write};
#[cfg(feature = "time")]
use time::{macros::datetime, Duration, PrimitiveDateTime};

/// Represents the potential TDMS data types. Contained value is size in bytes if applicable.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum TdmsDataType {
    Void,
    I8(usize),
    I16(usize),
    I32(usize),
    I64(usize),
    U8(usize),
    U16(usize),
    U32(usize),
    U64(usize),
    SingleFloat(usize),
    DoubleFloat(usize),
    ExtendedFloat(usize),
    SingleFloatWithUnit(usize),
    DoubleFloatWithUnit(usize),
    ExtendedFloatWithUnit(usize),
    String,
    Boolean(usize),
    TimeStamp(usize),
    FixedPoint(usize),
    ComplexSingleFloat(usize),
    ComplexDoubleFloat(usize),
    DAQmxRawData,
}

/// How a data type's on-the-wire size is determined. Standard descriptors
/// carry an explicit `total_byte_size` field only for `VariableString`; every
/// other fixed-width type's chunk span is `value_count * fixed width`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum SizeClass {
    Fixed(usize),
    VariableString,
    VariableDaqmx,
}

impl TryFrom<i32> for TdmsDataType {
    type Error = TdmsError;

    fn try_from(v: i32) -> Result<Self, TdmsError> {
        match v {
            x if x == 0 => Ok(TdmsDataType::Void),
            x if x == 1 => Ok(TdmsDataType::I8(1)),
            x if x == 2 => Ok(TdmsDataType::I16(2)),
            x if x == 3 => Ok(TdmsDataType::I32(4)),
            x if x == 4 => Ok(TdmsDataType::I64(8)),
            x if x == 5 => Ok(TdmsDataType::U8(1)),
            x if x == 6 => Ok(TdmsDataType::U16(2)),
            x if x == 7 => Ok(TdmsDataType::U32(4)),
            x if x == 8 => Ok(TdmsDataType::U64(8)),
            x if x == 9 => Ok(TdmsDataType::SingleFloat(4)),
            x if x == 10 => Ok(TdmsDataType::DoubleFloat(8)),
            x if x == 11 => Ok(TdmsDataType::ExtendedFloat(10)),
            x if x == 0x19 => Ok(TdmsDataType::SingleFloatWithUnit(4)),
            x if x == 0x1a => Ok(TdmsDataType::DoubleFloatWithUnit(8)),
            x if x == 0x1b => Ok(TdmsDataType::ExtendedFloatWithUnit(10)),
            x if x == 0x20 => Ok(TdmsDataType::String),
            x if x == 0x21 => Ok(TdmsDataType::Boolean(1)),
            x if x == 0x44 => Ok(TdmsDataType::TimeStamp(16)),
            x if x == 0x4f => Ok(TdmsDataType::FixedPoint(10)),
            x if x == 0x08000c => Ok(TdmsDataType::ComplexSingleFloat(8)),
            x if x == 0x10000d => Ok(TdmsDataType::ComplexDoubleFloat(16)),
            x if x == -1 => Ok(TdmsDataType::DAQmxRawData), // 0xFFFFFFFF equivalent
            _ => Err(TdmsError::UnknownDataType()),
        }
    }
}

impl From<TdmsDataType> for i32 {
    fn from(t: TdmsDataType) -> i32 {
        match t {
            TdmsDataType::Void => 0,
            TdmsDataType::I8(_) => 1,
            TdmsDataType::I16(_) => 2,
            TdmsDataType::I32(_) => 3,
            TdmsDataType::I64(_) => 4,
            TdmsDataType::U8(_) => 5,
            TdmsDataType::U16(_) => 6,
            TdmsDataType::U32(_) => 7,
            TdmsDataType::U64(_) => 8,
            TdmsDataType::SingleFloat(_) => 9,
            TdmsDataType::DoubleFloat(_) => 10,
            TdmsDataType::ExtendedFloat(_) => 11,
            TdmsDataType::SingleFloatWithUnit(_) => 0x19,
            TdmsDataType::DoubleFloatWithUnit(_) => 0x1a,
            TdmsDataType::ExtendedFloatWithUnit(_) => 0x1b,
            TdmsDataType::String => 0x20,
            TdmsDataType::Boolean(_) => 0x21,
            TdmsDataType::TimeStamp(_) => 0x44,
            TdmsDataType::FixedPoint(_) => 0x4f,
            TdmsDataType::ComplexSingleFloat(_) => 0x08000c,
            TdmsDataType::ComplexDoubleFloat(_) => 0x10000d,
            TdmsDataType::DAQmxRawData => -1,
        }
    }
}

impl TdmsDataType {
    pub fn get_size(data_type: TdmsDataType) -> usize {
        return match data_type {
            TdmsDataType::Void => 0,
            TdmsDataType::I8(v) => v,
            TdmsDataType::I16(v) => v,
            TdmsDataType::I32(v) => v,
            TdmsDataType::I64(v) => v,
            TdmsDataType::U8(v) => v,
            TdmsDataType::U16(v) => v,
            TdmsDataType::U32(v) => v,
            TdmsDataType::U64(v) => v,
            TdmsDataType::SingleFloat(v) => v,
            TdmsDataType::DoubleFloat(v) => v,
            TdmsDataType::ExtendedFloat(v) => v,
            TdmsDataType::SingleFloatWithUnit(v) => v,
            TdmsDataType::DoubleFloatWithUnit(v) => v,
            TdmsDataType::ExtendedFloatWithUnit(v) => v,
            TdmsDataType::String => 0,
            TdmsDataType::Boolean(v) => v,
            TdmsDataType::TimeStamp(v) => v,
            TdmsDataType::FixedPoint(v) => v,
            TdmsDataType::ComplexSingleFloat(v) => v,
            TdmsDataType::ComplexDoubleFloat(v) => v,
            TdmsDataType::DAQmxRawData => 0,
        };
    }

    /// How this type's per-value byte span is determined when walking a chunk.
    pub fn size_class(&self) -> SizeClass {
        match self {
            TdmsDataType::String => SizeClass::VariableString,
            TdmsDataType::DAQmxRawData => SizeClass::VariableDaqmx,
            other => SizeClass::Fixed(TdmsDataType::get_size(*other)),
        }
    }
}

/// A fully-decoded TDMS value. Used for metadata property values and, via
/// the object model, for values staged for a future write.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Void,
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    /// 80-bit extended float, decoded best-effort to an `f64` via the
    /// `extended` crate; the raw 10 bytes are kept for exact round-trip.
    ExtendedFloat(f64, [u8; 10]),
    String(String),
    Bool(bool),
    Timestamp(TdmsTimestamp),
    /// Opaque 10 byte fixed-point payload; no scale/precision metadata is
    /// available at this layer to interpret it further.
    FixedPoint([u8; 10]),
    ComplexSingleFloat(f32, f32),
    ComplexDoubleFloat(f64, f64),
}

#[derive(Debug, Clone)]
/// `TDMSValue` pairs a decoded `Value` with the data type and endianness it
/// was read under.
pub struct TDMSValue {
    pub data_type: TdmsDataType,
    pub endianness: Endianness,
    pub value: Value,
}

impl TDMSValue {
    /// from_reader accepts an open reader and a data type and attempts to read, generating a
    /// value struct containing the actual decoded value.
    pub fn from_reader<R: Read>(
        endianness: Endianness,
        data_type: TdmsDataType,
        r: &mut R,
    ) -> Result<Self, TdmsError> {
        let value = match data_type {
            TdmsDataType::Void => Value::Void,
            TdmsDataType::I8(_) => Value::I8(codec::read_i8_bytes(r, endianness)?),
            TdmsDataType::I16(_) => Value::I16(codec::read_i16(r, endianness)?),
            TdmsDataType::I32(_) => Value::I32(codec::read_i32(r, endianness)?),
            TdmsDataType::I64(_) => Value::I64(codec::read_i64(r, endianness)?),
            TdmsDataType::U8(_) => Value::U8(codec::read_u8_bytes(r, endianness)?),
            TdmsDataType::U16(_) => Value::U16(codec::read_u16(r, endianness)?),
            TdmsDataType::U32(_) => Value::U32(codec::read_u32(r, endianness)?),
            TdmsDataType::U64(_) => Value::U64(codec::read_u64(r, endianness)?),
            TdmsDataType::SingleFloat(_) | TdmsDataType::SingleFloatWithUnit(_) => {
                Value::F32(codec::read_f32(r, endianness)?)
            }
            TdmsDataType::DoubleFloat(_) | TdmsDataType::DoubleFloatWithUnit(_) => {
                Value::F64(codec::read_f64(r, endianness)?)
            }
            TdmsDataType::ExtendedFloat(_) | TdmsDataType::ExtendedFloatWithUnit(_) => {
                let raw = codec::read_extended(r)?;
                Value::ExtendedFloat(codec::extended_to_f64(&raw, endianness), raw)
            }
            TdmsDataType::String => Value::String(codec::read_string(r, endianness)?),
            TdmsDataType::Boolean(_) => Value::Bool(codec::read_bool(r)?),
            TdmsDataType::TimeStamp(_) => Value::Timestamp(codec::read_timestamp(r, endianness)?),
            TdmsDataType::FixedPoint(_) => Value::FixedPoint(codec::read_fixed_point(r)?),
            TdmsDataType::ComplexSingleFloat(_) => {
                let real = codec::read_f32(r, endianness)?;
                let imag = codec::read_f32(r, endianness)?;
                Value::ComplexSingleFloat(real, imag)
            }
            TdmsDataType::ComplexDoubleFloat(_) => {
                let real = codec::read_f64(r, endianness)?;
                let imag = codec::read_f64(r, endianness)?;
                Value::ComplexDoubleFloat(real, imag)
            }
            TdmsDataType::DAQmxRawData => {
                return Err(TdmsError::TypeMismatch(
                    "a decodable property type".to_string(),
                    "DAQmxRawData".to_string(),
                ))
            }
        };

        Ok(TDMSValue {
            data_type,
            endianness,
            value,
        })
    }

    /// write encodes this value back to the wire, mirroring from_reader exactly
    /// so that properties round-trip byte-for-byte through the writer.
    pub fn write<W: Write>(&self, w: &mut W) -> Result<(), TdmsError> {
        let e = self.endianness;
        match &self.value {
            Value::Void => Ok(()),
            Value::I8(v) => codec::write_i8_bytes(w, e, *v),
            Value::I16(v) => codec::write_i16(w, e, *v),
            Value::I32(v) => codec::write_i32(w, e, *v),
            Value::I64(v) => codec::write_i64(w, e, *v),
            Value::U8(v) => codec::write_u8_bytes(w, e, *v),
            Value::U16(v) => codec::write_u16(w, e, *v),
            Value::U32(v) => codec::write_u32(w, e, *v),
            Value::U64(v) => codec::write_u64(w, e, *v),
            Value::F32(v) => codec::write_f32(w, e, *v),
            Value::F64(v) => codec::write_f64(w, e, *v),
            Value::ExtendedFloat(_, raw) => codec::write_extended(w, raw),
            Value::String(s) => codec::write_string(w, e, s),
            Value::Bool(b) => codec::write_bool(w, *b),
            Value::Timestamp(ts) => codec::write_timestamp(w, e, ts),
            Value::FixedPoint(raw) => codec::write_fixed_point(w, raw),
            Value::ComplexSingleFloat(re, im) => {
                codec::write_f32(w, e, *re)?;
                codec::write_f32(w, e, *im)
            }
            Value::ComplexDoubleFloat(re, im) => {
                codec::write_f64(w, e, *re)?;
                codec::write_f64(w, e, *im)
            }
        }
    }
}

macro_rules! value_try_from {
    ($t:ty, $variant:ident, $name:expr) => {
        impl TryFrom<Value> for $t {
            type Error = TdmsError;

            fn try_from(v: Value) -> Result<Self, TdmsError> {
                match v {
                    Value::$variant(inner) => Ok(inner),
                    other => Err(TdmsError::TypeMismatch($name.to_string(), format!("{:?}", other))),
                }
            }
        }
    };
}

value_try_from!(i8, I8, "I8");
value_try_from!(i16, I16, "I16");
value_try_from!(i32, I32, "I32");
value_try_from!(i64, I64, "I64");
value_try_from!(u8, U8, "U8");
value_try_from!(u16, U16, "U16");
value_try_from!(u32, U32, "U32");
value_try_from!(u64, U64, "U64");
value_try_from!(f32, F32, "F32");
value_try_from!(f64, F64, "F64");
value_try_from!(bool, Bool, "Bool");
value_try_from!(String, String, "String");
value_try_from!(TdmsTimestamp, Timestamp, "Timestamp");

#[derive(Clone, Debug, Copy, PartialEq)]
pub struct TdmsTimestamp {
    pub seconds_since_ni_epoch: i64,
    pub fractions_of_a_second: u64,
}

#[cfg(feature = "time")]
impl TdmsTimestamp {
    const NI_EPOCH: PrimitiveDateTime = datetime!(1904-01-01 00:00);

    pub fn to_duration(&self) -> Duration {
        Duration::seconds(self.seconds_since_ni_epoch)
            + Duration::seconds_f64(self.fractions_of_a_second as f64 / u64::MAX as f64)
    }

    pub fn to_primitive_date_time(&self) -> PrimitiveDateTime {
        TdmsTimestamp::NI_EPOCH + self.to_duration()
    }
}

#[cfg(feature = "chrono")]
impl TdmsTimestamp {
    const NI_EPOCH: NaiveDateTime = NaiveDate::from_ymd_opt(1904, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();

    pub fn to_duration(&self) -> Duration {
        Duration::seconds(self.seconds_since_ni_epoch)
            + (Duration::from_std(std::time::Duration::from_secs_f64(
                self.fractions_of_a_second as f64 / u64::MAX as f64,
            ))
            .unwrap())
    }

    pub fn to_naive_date_time(&self) -> NaiveDateTime {
        TdmsTimestamp::NI_EPOCH + self.to_duration()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn decodes_i32_value() {
        let mut buf = Vec::new();
        codec::write_i32(&mut buf, Endianness::Little, -42).unwrap();
        let mut c = Cursor::new(buf);
        let v = TDMSValue::from_reader(Endianness::Little, TdmsDataType::I32(4), &mut c).unwrap();
        assert_eq!(v.value, Value::I32(-42));
    }

    #[test]
    fn round_trips_string_value() {
        let mut buf = Vec::new();
        codec::write_string(&mut buf, Endianness::Big, "channel one").unwrap();
        let mut c = Cursor::new(buf);
        let v = TDMSValue::from_reader(Endianness::Big, TdmsDataType::String, &mut c).unwrap();
        assert_eq!(v.value, Value::String("channel one".to_string()));

        let mut out = Vec::new();
        v.write(&mut out).unwrap();

        let mut c2 = Cursor::new(out);
        let v2 = TDMSValue::from_reader(Endianness::Big, TdmsDataType::String, &mut c2).unwrap();
        assert_eq!(v2.value, v.value);
    }

    #[test]
    fn size_class_distinguishes_string_and_daqmx() {
        assert_eq!(TdmsDataType::String.size_class(), SizeClass::VariableString);
        assert_eq!(
            TdmsDataType::DAQmxRawData.size_class(),
            SizeClass::VariableDaqmx
        );
        assert_eq!(TdmsDataType::I32(4).size_class(), SizeClass::Fixed(4));
    }
}
