//! Wire format layer: the 28 byte lead-in, the metadata block, and the
//! per-object raw-data index descriptors, read and written exactly as the
//! NI TDMS format lays them out. This module is stateless per segment - it
//! does not know about "reused" history across segments (that rolling state
//! lives in `reader.rs`) or about chunk byte spans (that's `chunk.rs`).

pub use crate::codec::Endianness;
use crate::codec::{self, Endianness::Big, Endianness::Little};
use crate::data_type::{TDMSValue, TdmsDataType, Value};
use crate::object::{DaqmxDescriptor, DaqmxScalers, FormatChangingScaler, RawDataDescriptor};
use crate::TdmsError;
use indexmap::IndexMap;
use log::warn;
use std::io::{Read, Write};

/// Bitmasks for the Table of Contents byte.
pub const K_TOC_META_DATA: u32 = 1 << 1;
/// Set when a segment's channel list/order has changed from the previous
/// segment and the rolling object map's participation order must be reset.
pub const K_TOC_NEW_OBJ_LIST: u32 = 1 << 2;
pub const K_TOC_RAW_DATA: u32 = 1 << 3;
pub const K_TOC_INTERLEAVED_DATA: u32 = 1 << 5;
pub const K_TOC_BIG_ENDIAN: u32 = 1 << 6;
pub const K_TOC_DAQMX_RAW_DATA: u32 = 1 << 7;

pub const LEAD_IN_SIZE: u64 = 28;

const TAG_DATA: &[u8; 4] = b"TDSm";
const TAG_INDEX: &[u8; 4] = b"TDSh";

#[derive(Debug, Clone)]
/// `LeadIn` represents the 28 bytes representing the lead in to a TDMS Segment.
pub struct LeadIn {
    pub tag: [u8; 4],
    pub table_of_contents: u32,
    pub version_number: u32,
    pub next_segment_offset: u64,
    pub raw_data_offset: u64,
}

impl LeadIn {
    /// `from_bytes` accepts a 28 byte array which represents the lead-in to a segment. This is hardcoded
    /// as there are no dynamic lengths in this portion of a segment.
    pub fn from_bytes(lead_in: &[u8; 28]) -> Result<Self, TdmsError> {
        let mut tag: [u8; 4] = [0; 4];
        tag.clone_from_slice(&lead_in[0..4]);

        if &tag != TAG_DATA && &tag != TAG_INDEX {
            return Err(TdmsError::BadSignature(hex::encode(tag)));
        }

        let mut toc: [u8; 4] = [0; 4];
        toc.clone_from_slice(&lead_in[4..8]);

        // the Table of Contents is always in little endian format regardless if the rest of the segment
        // is in big endian
        let table_of_contents = u32::from_le_bytes(toc);
        let endianness = if table_of_contents & K_TOC_BIG_ENDIAN != 0 {
            Big
        } else {
            Little
        };

        let mut version: [u8; 4] = [0; 4];
        version.clone_from_slice(&lead_in[8..12]);
        let version_number = match endianness {
            Little => u32::from_le_bytes(version),
            Big => u32::from_be_bytes(version),
        };

        let mut offset: [u8; 8] = [0; 8];
        offset.clone_from_slice(&lead_in[12..20]);
        let next_segment_offset = match endianness {
            Little => u64::from_le_bytes(offset),
            Big => u64::from_be_bytes(offset),
        };

        let mut raw_offset: [u8; 8] = [0; 8];
        raw_offset.clone_from_slice(&lead_in[20..28]);
        let raw_data_offset = match endianness {
            Little => u64::from_le_bytes(raw_offset),
            Big => u64::from_be_bytes(raw_offset),
        };

        Ok(LeadIn {
            tag,
            table_of_contents,
            version_number,
            next_segment_offset,
            raw_data_offset,
        })
    }

    pub fn endianness(&self) -> Endianness {
        if self.table_of_contents & K_TOC_BIG_ENDIAN != 0 {
            Big
        } else {
            Little
        }
    }

    pub fn to_bytes(&self) -> [u8; 28] {
        let mut out = [0u8; 28];
        out[0..4].copy_from_slice(&self.tag);
        out[4..8].copy_from_slice(&self.table_of_contents.to_le_bytes());

        let endianness = self.endianness();
        let (version, next, raw) = match endianness {
            Little => (
                self.version_number.to_le_bytes(),
                self.next_segment_offset.to_le_bytes(),
                self.raw_data_offset.to_le_bytes(),
            ),
            Big => (
                self.version_number.to_be_bytes(),
                self.next_segment_offset.to_be_bytes(),
                self.raw_data_offset.to_be_bytes(),
            ),
        };

        out[8..12].copy_from_slice(&version);
        out[12..20].copy_from_slice(&next);
        out[20..28].copy_from_slice(&raw);
        out
    }

    pub fn is_index_tag(&self) -> bool {
        &self.tag == TAG_INDEX
    }
}

#[derive(Debug, Clone)]
/// `Metadata` represents the collection of metadata objects for a segment in the order in which they
/// were read.
pub struct Metadata {
    pub objects: Vec<MetadataObject>,
}

#[derive(Debug, Clone)]
/// `MetadataObject` represents one object's entry in a segment's metadata
/// block: its path, its raw-data index descriptor (not yet resolved against
/// segment history - see `reader.rs`), and its properties in wire order.
pub struct MetadataObject {
    pub object_path: String,
    pub raw_data: RawDataDescriptor,
    pub properties: IndexMap<String, (TdmsDataType, Value)>,
}

impl Metadata {
    /// from_reader accepts an open reader and attempts to read metadata from the currently selected
    /// segment. Note that you must have read the segment's lead in information completely before
    /// attempting to use this function.
    pub fn from_reader<R: Read>(endianness: Endianness, r: &mut R) -> Result<Self, TdmsError> {
        let number_of_objects = codec::read_u32(r, endianness)?;

        let mut objects: Vec<MetadataObject> = vec![];

        for _ in 0..number_of_objects {
            let object_path = codec::read_string(r, endianness)?;
            let raw_data = read_raw_data_descriptor(endianness, r)?;

            let num_of_properties = codec::read_u32(r, endianness)?;
            let mut properties = IndexMap::new();
            for _ in 0..num_of_properties {
                let (name, data_type, value) = read_property(endianness, r)?;
                properties.insert(name, (data_type, value));
            }

            objects.push(MetadataObject {
                object_path,
                raw_data,
                properties,
            });
        }

        Ok(Metadata { objects })
    }

    pub fn write<W: Write>(&self, endianness: Endianness, w: &mut W) -> Result<(), TdmsError> {
        codec::write_u32(w, endianness, self.objects.len() as u32)?;

        for obj in &self.objects {
            codec::write_string(w, endianness, &obj.object_path)?;
            write_raw_data_descriptor(endianness, w, &obj.raw_data)?;

            codec::write_u32(w, endianness, obj.properties.len() as u32)?;
            for (name, (data_type, value)) in &obj.properties {
                write_property(endianness, w, name, *data_type, value)?;
            }
        }

        Ok(())
    }
}

fn read_raw_data_descriptor<R: Read>(
    endianness: Endianness,
    r: &mut R,
) -> Result<RawDataDescriptor, TdmsError> {
    let header = codec::read_u32(r, endianness)?;

    match header {
        0xFFFFFFFF => Ok(RawDataDescriptor::Absent),
        0x00000000 => Ok(RawDataDescriptor::Reused),
        0x00001269 | 0x69120000 => Ok(RawDataDescriptor::Daqmx(read_daqmx_descriptor(
            endianness, r, header, true,
        )?)),
        0x0000126A | 0x69130000 | 0x00001369 => Ok(RawDataDescriptor::Daqmx(
            read_daqmx_descriptor(endianness, r, header, false)?,
        )),
        length => {
            if length != 0x14 && length != 0x1C {
                warn!(
                    "object raw-data index declared descriptor length 0x{:X} (expected 0x14 or 0x1C)",
                    length
                );
            }

            let data_type = codec::read_i32(r, endianness)?;
            let data_type = TdmsDataType::try_from(data_type)?;

            let mut dimension = codec::read_u32(r, endianness)?;
            if dimension != 1 {
                warn!(
                    "object raw-data index declared array dimension {} (spec requires 1); forcing to 1",
                    dimension
                );
                dimension = 1;
            }

            let value_count = codec::read_u64(r, endianness)?;

            let total_byte_size = match data_type {
                TdmsDataType::String => Some(codec::read_u64(r, endianness)?),
                _ => None,
            };

            Ok(RawDataDescriptor::Standard {
                data_type,
                dimension,
                value_count,
                total_byte_size,
            })
        }
    }
}

fn write_raw_data_descriptor<W: Write>(
    endianness: Endianness,
    w: &mut W,
    descriptor: &RawDataDescriptor,
) -> Result<(), TdmsError> {
    match descriptor {
        RawDataDescriptor::Absent => codec::write_u32(w, endianness, 0xFFFFFFFF),
        RawDataDescriptor::Reused => codec::write_u32(w, endianness, 0x00000000),
        RawDataDescriptor::Standard {
            data_type,
            dimension,
            value_count,
            total_byte_size,
        } => {
            let length: u32 = if total_byte_size.is_some() { 0x1C } else { 0x14 };
            codec::write_u32(w, endianness, length)?;
            codec::write_i32(w, endianness, (*data_type).into())?;
            codec::write_u32(w, endianness, *dimension)?;
            codec::write_u64(w, endianness, *value_count)?;
            if let Some(size) = total_byte_size {
                codec::write_u64(w, endianness, *size)?;
            }
            Ok(())
        }
        RawDataDescriptor::Daqmx(d) => write_daqmx_descriptor(endianness, w, d),
    }
}

fn read_daqmx_descriptor<R: Read>(
    endianness: Endianness,
    r: &mut R,
    header: u32,
    is_format_changing: bool,
) -> Result<DaqmxDescriptor, TdmsError> {
    let mut dimension = codec::read_u32(r, endianness)?;
    if dimension != 1 {
        warn!(
            "DAQmx raw-data index declared array dimension {} (spec requires 1); forcing to 1",
            dimension
        );
        dimension = 1;
    }
    let _ = dimension;

    let chunk_size = codec::read_u64(r, endianness)?;

    let scaler_count = codec::read_u32(r, endianness)?;
    let scalers = if is_format_changing {
        let mut vec = Vec::with_capacity(scaler_count as usize);
        for _ in 0..scaler_count {
            vec.push(read_format_changing_scaler(endianness, r)?);
        }
        DaqmxScalers::FormatChanging(vec)
    } else {
        let mut vec = Vec::with_capacity(scaler_count as usize);
        for _ in 0..scaler_count {
            let mut buf = [0u8; 17];
            r.read_exact(&mut buf)?;
            vec.push(buf);
        }
        DaqmxScalers::DigitalLine(vec)
    };

    let width_count = codec::read_u32(r, endianness)?;
    let mut raw_width_vector = Vec::with_capacity(width_count as usize);
    for _ in 0..width_count {
        raw_width_vector.push(codec::read_u32(r, endianness)?);
    }

    Ok(DaqmxDescriptor {
        header,
        chunk_size,
        scalers,
        raw_width_vector,
    })
}

fn write_daqmx_descriptor<W: Write>(
    endianness: Endianness,
    w: &mut W,
    d: &DaqmxDescriptor,
) -> Result<(), TdmsError> {
    codec::write_u32(w, endianness, d.header)?;
    codec::write_u32(w, endianness, 1)?; // array dimension, always 1
    codec::write_u64(w, endianness, d.chunk_size)?;

    match &d.scalers {
        DaqmxScalers::FormatChanging(scalers) => {
            codec::write_u32(w, endianness, scalers.len() as u32)?;
            for s in scalers {
                write_format_changing_scaler(endianness, w, s)?;
            }
        }
        DaqmxScalers::DigitalLine(scalers) => {
            codec::write_u32(w, endianness, scalers.len() as u32)?;
            for s in scalers {
                w.write_all(s)?;
            }
        }
    }

    codec::write_u32(w, endianness, d.raw_width_vector.len() as u32)?;
    for width in &d.raw_width_vector {
        codec::write_u32(w, endianness, *width)?;
    }

    Ok(())
}

fn read_format_changing_scaler<R: Read>(
    endianness: Endianness,
    r: &mut R,
) -> Result<FormatChangingScaler, TdmsError> {
    let data_type = TdmsDataType::try_from(codec::read_i32(r, endianness)?)?;
    let raw_buffer_index = codec::read_u32(r, endianness)?;
    let raw_byte_offset = codec::read_u32(r, endianness)?;
    let sample_format_bitmap = codec::read_u32(r, endianness)?;
    let scale_id = codec::read_u32(r, endianness)?;

    Ok(FormatChangingScaler {
        data_type,
        raw_buffer_index,
        raw_byte_offset,
        sample_format_bitmap,
        scale_id,
    })
}

fn write_format_changing_scaler<W: Write>(
    endianness: Endianness,
    w: &mut W,
    s: &FormatChangingScaler,
) -> Result<(), TdmsError> {
    codec::write_i32(w, endianness, s.data_type.into())?;
    codec::write_u32(w, endianness, s.raw_buffer_index)?;
    codec::write_u32(w, endianness, s.raw_byte_offset)?;
    codec::write_u32(w, endianness, s.sample_format_bitmap)?;
    codec::write_u32(w, endianness, s.scale_id)
}

fn read_property<R: Read>(
    endianness: Endianness,
    r: &mut R,
) -> Result<(String, TdmsDataType, Value), TdmsError> {
    let name = codec::read_string(r, endianness)?;
    let data_type = TdmsDataType::try_from(codec::read_i32(r, endianness)?)?;
    let value = TDMSValue::from_reader(endianness, data_type, r)?;

    Ok((name, data_type, value.value))
}

fn write_property<W: Write>(
    endianness: Endianness,
    w: &mut W,
    name: &str,
    data_type: TdmsDataType,
    value: &Value,
) -> Result<(), TdmsError> {
    codec::write_string(w, endianness, name)?;
    codec::write_i32(w, endianness, data_type.into())?;

    let wrapped = TDMSValue {
        data_type,
        endianness,
        value: value.clone(),
    };
    wrapped.write(w)
}

/// `rem_quotes` strips the single-quote wrapping TDMS uses around group and
/// channel names in object paths (`/'group'/'channel'`).
pub fn rem_quotes(value: &str) -> &str {
    let mut original = value.chars();
    let mut chars = value.chars().peekable();

    if let Some(first) = chars.peek() {
        if *first == '\'' {
            original.next();
        }
    }

    let mut reversed = chars.rev().peekable();
    if let Some(last) = reversed.peek() {
        if *last == '\'' {
            original.next_back();
        }
    }

    original.as_str()
}
