//! Chunk decoder: turns a segment's raw-data byte region into per-channel
//! value lists, honoring contiguous vs. interleaved layout, string channels'
//! offset-table encoding, partial trailing chunks, and DAQmx's opaque byte
//! spans.

use crate::codec::{self, Endianness};
use crate::data_type::{TdmsDataType, Value};
use crate::object::RawDataDescriptor;
use crate::reader::{RollingObject, SegmentDescriptor};
use crate::segment::K_TOC_INTERLEAVED_DATA;
use crate::TdmsError;
use indexmap::IndexMap;
use log::warn;
use std::io::{Read, Seek, SeekFrom};

/// The byte span one participant contributes to a single chunk, and whether
/// it can be decoded into `Value`s at all (DAQmx spans are skip-only).
enum ParticipantSpan {
    Fixed {
        data_type: TdmsDataType,
        width: usize,
        count: u64,
    },
    String {
        total_bytes: u64,
        count: u64,
    },
    Opaque {
        bytes: u64,
    },
}

impl ParticipantSpan {
    fn byte_len(&self) -> u64 {
        match self {
            ParticipantSpan::Fixed { width, count, .. } => *width as u64 * count,
            ParticipantSpan::String { total_bytes, .. } => *total_bytes,
            ParticipantSpan::Opaque { bytes } => *bytes,
        }
    }
}

fn participant_span(descriptor: &RawDataDescriptor) -> Result<ParticipantSpan, TdmsError> {
    match descriptor {
        RawDataDescriptor::Standard {
            data_type,
            value_count,
            total_byte_size,
            ..
        } => match data_type.size_class() {
            crate::data_type::SizeClass::VariableString => Ok(ParticipantSpan::String {
                total_bytes: total_byte_size.unwrap_or(0),
                count: *value_count,
            }),
            crate::data_type::SizeClass::Fixed(width) => Ok(ParticipantSpan::Fixed {
                data_type: *data_type,
                width,
                count: *value_count,
            }),
            crate::data_type::SizeClass::VariableDaqmx => unreachable!(),
        },
        RawDataDescriptor::Daqmx(d) => Ok(ParticipantSpan::Opaque {
            bytes: d.byte_span(),
        }),
        RawDataDescriptor::Absent | RawDataDescriptor::Reused => Ok(ParticipantSpan::Opaque { bytes: 0 }),
    }
}

/// Reads every whole chunk in `segment`'s raw-data region and returns the
/// decoded values for each participating channel, in participant order.
/// DAQmx channels are skipped over (their byte span is accounted for, but no
/// `Value`s are produced for them).
pub fn decode_segment<R: Read + Seek>(
    segment: &SegmentDescriptor,
    rolling_objects: &IndexMap<String, RollingObject>,
    r: &mut R,
) -> Result<IndexMap<String, Vec<Value>>, TdmsError> {
    let mut out: IndexMap<String, Vec<Value>> = IndexMap::new();
    for path in &segment.participants {
        out.insert(path.clone(), Vec::new());
    }

    let spans: Vec<(String, ParticipantSpan)> = segment
        .participants
        .iter()
        .map(|path| {
            let descriptor = &rolling_objects
                .get(path)
                .expect("participant must be present in rolling object map")
                .descriptor;
            Ok((path.clone(), participant_span(descriptor)?))
        })
        .collect::<Result<Vec<_>, TdmsError>>()?;

    let raw_len = segment.end_pos.saturating_sub(segment.raw_data_start);
    if raw_len == 0 || spans.is_empty() {
        return Ok(out);
    }

    r.seek(SeekFrom::Start(segment.raw_data_start))?;

    let interleaved = segment.lead_in.table_of_contents & K_TOC_INTERLEAVED_DATA != 0;

    if interleaved {
        decode_interleaved(&spans, raw_len, segment.endianness, r, &mut out)?;
    } else {
        decode_contiguous(&spans, raw_len, segment.endianness, r, &mut out)?;
    }

    Ok(out)
}

fn decode_contiguous<R: Read>(
    spans: &[(String, ParticipantSpan)],
    raw_len: u64,
    endianness: Endianness,
    r: &mut R,
    out: &mut IndexMap<String, Vec<Value>>,
) -> Result<(), TdmsError> {
    let chunk_size: u64 = spans.iter().map(|(_, s)| s.byte_len()).sum();
    if chunk_size == 0 {
        return Ok(());
    }

    let full_chunks = raw_len / chunk_size;
    let remainder = raw_len % chunk_size;

    for _ in 0..full_chunks {
        for (path, span) in spans {
            decode_participant_chunk(path, span, endianness, r, out)?;
        }
    }

    if remainder > 0 {
        let mut budget = remainder;
        for (path, span) in spans {
            let span_len = span.byte_len();
            if budget == 0 {
                break;
            }
            if span_len <= budget {
                decode_participant_chunk(path, span, endianness, r, out)?;
                budget -= span_len;
            } else {
                // Partial participant: decode as many whole values as fit,
                // then stop - the rest of the tail can't form a full record.
                decode_partial_participant(path, span, endianness, budget, r, out)?;
                budget = 0;
            }
        }
    }

    Ok(())
}

fn decode_participant_chunk<R: Read>(
    path: &str,
    span: &ParticipantSpan,
    endianness: Endianness,
    r: &mut R,
    out: &mut IndexMap<String, Vec<Value>>,
) -> Result<(), TdmsError> {
    match span {
        ParticipantSpan::Fixed {
            data_type, count, ..
        } => {
            let values = out.entry(path.to_string()).or_default();
            for _ in 0..*count {
                values.push(read_fixed_value(*data_type, endianness, r)?);
            }
            Ok(())
        }
        ParticipantSpan::String { total_bytes, count } => {
            decode_string_participant(path, *count, *total_bytes, endianness, r, out)
        }
        ParticipantSpan::Opaque { bytes } => {
            io::copy_n(r, *bytes)?;
            Ok(())
        }
    }
}

fn decode_partial_participant<R: Read>(
    path: &str,
    span: &ParticipantSpan,
    endianness: Endianness,
    budget: u64,
    r: &mut R,
    out: &mut IndexMap<String, Vec<Value>>,
) -> Result<(), TdmsError> {
    match span {
        ParticipantSpan::Fixed { data_type, width, .. } => {
            let width = *width as u64;
            if width == 0 {
                return Ok(());
            }
            let whole = budget / width;
            let values = out.entry(path.to_string()).or_default();
            for _ in 0..whole {
                values.push(read_fixed_value(*data_type, endianness, r)?);
            }
            let leftover = budget - whole * width;
            if leftover > 0 {
                io::copy_n(r, leftover)?;
            }
            Ok(())
        }
        ParticipantSpan::String { .. } => {
            // A truncated offset table/byte run can't be safely decoded
            // partially; drop it, matching the reader's "recover, don't
            // panic" posture for truncated tails.
            warn!("dropping partial string chunk for {}", path);
            io::copy_n(r, budget)?;
            Ok(())
        }
        ParticipantSpan::Opaque { .. } => {
            io::copy_n(r, budget)?;
            Ok(())
        }
    }
}

fn decode_string_participant<R: Read>(
    path: &str,
    count: u64,
    total_bytes: u64,
    endianness: Endianness,
    r: &mut R,
    out: &mut IndexMap<String, Vec<Value>>,
) -> Result<(), TdmsError> {
    let count_usize = usize::try_from(count)?;
    let mut offsets = Vec::with_capacity(count_usize);
    for _ in 0..count_usize {
        offsets.push(codec::read_u32(r, endianness)? as u64);
    }

    let header_bytes = 4 * count;
    if total_bytes < header_bytes {
        return Err(TdmsError::InconsistentInterleavedCounts(format!(
            "string channel {} declares total_byte_size {} smaller than its offset table ({} bytes)",
            path, total_bytes, header_bytes
        )));
    }

    let payload_len = total_bytes - header_bytes;
    let mut payload = vec![0u8; usize::try_from(payload_len)?];
    r.read_exact(&mut payload)?;

    let values = out.entry(path.to_string()).or_default();
    let mut prev = 0u64;
    for offset in offsets {
        let start = usize::try_from(prev)?;
        let end = usize::try_from(offset)?;
        if end < start || end > payload.len() {
            return Err(TdmsError::ShortRead(end, payload.len()));
        }
        let s = String::from_utf8(payload[start..end].to_vec())
            .map_err(|_| TdmsError::InvalidUtf8(format!("string channel {}", path)))?;
        values.push(Value::String(s));
        prev = offset;
    }

    Ok(())
}

fn decode_interleaved<R: Read>(
    spans: &[(String, ParticipantSpan)],
    raw_len: u64,
    endianness: Endianness,
    r: &mut R,
    out: &mut IndexMap<String, Vec<Value>>,
) -> Result<(), TdmsError> {
    let string_participants = spans
        .iter()
        .filter(|(_, s)| matches!(s, ParticipantSpan::String { .. }))
        .count();

    if string_participants > 1 || (string_participants == 1 && spans.len() > 1) {
        return Err(TdmsError::InvalidInterleavedString(
            "interleaved layout may only contain a string channel when it is the sole participant"
                .to_string(),
        ));
    }

    if string_participants == 1 {
        // Sole string participant: interleaving is a no-op, decode as contiguous.
        return decode_contiguous(spans, raw_len, endianness, r, out);
    }

    let row_width: u64 = spans.iter().map(|(_, s)| s.byte_len()).sum();
    if row_width == 0 {
        return Ok(());
    }

    let full_rows = raw_len / row_width;
    let remainder = raw_len % row_width;
    if remainder > 0 {
        warn!(
            "interleaved chunk has {} leftover bytes after {} full rows; dropping partial row",
            remainder, full_rows
        );
    }

    for _ in 0..full_rows {
        for (path, span) in spans {
            match span {
                ParticipantSpan::Fixed { data_type, .. } => {
                    let value = read_fixed_value(*data_type, endianness, r)?;
                    out.entry(path.to_string()).or_default().push(value);
                }
                ParticipantSpan::Opaque { bytes } => {
                    io::copy_n(r, *bytes)?;
                }
                ParticipantSpan::String { .. } => unreachable!("filtered out above"),
            }
        }
    }

    if remainder > 0 {
        io::copy_n(r, remainder)?;
    }

    Ok(())
}

fn read_fixed_value<R: Read>(
    data_type: TdmsDataType,
    endianness: Endianness,
    r: &mut R,
) -> Result<Value, TdmsError> {
    Ok(crate::data_type::TDMSValue::from_reader(endianness, data_type, r)?.value)
}

/// Small helper module so chunk.rs doesn't pull in a `byteorder`/`io-util`
/// style dependency just to skip N bytes of a reader.
mod io {
    use crate::TdmsError;
    use std::io::Read;

    pub fn copy_n<R: Read>(r: &mut R, mut n: u64) -> Result<(), TdmsError> {
        let mut buf = [0u8; 4096];
        while n > 0 {
            let take = n.min(buf.len() as u64) as usize;
            r.read_exact(&mut buf[..take])?;
            n -= take as u64;
        }
        Ok(())
    }
}
