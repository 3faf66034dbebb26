//! Segment writer: turns a staged `ObjectModel` into TDMS segment bytes -
//! ToC assembly, lead-in field computation, metadata-then-data write order,
//! classification of what changed since the last write, and in-place
//! lead-in rewriting for append-to-previous-segment continuation.

use crate::codec::{self, Endianness};
use crate::data_type::{TdmsDataType, Value};
use crate::object::{ObjectModel, PendingValues, RawDataDescriptor};
use crate::segment::{
    LeadIn, Metadata, MetadataObject, K_TOC_META_DATA, K_TOC_NEW_OBJ_LIST, K_TOC_RAW_DATA,
    LEAD_IN_SIZE,
};
use crate::TdmsError;
use log::debug;
use std::io::{Seek, SeekFrom, Write};

/// How a participating object's raw-data index entry should be written this
/// flush, decided by comparing its pending values against its last-known
/// descriptor.
#[derive(Debug, PartialEq)]
enum Classification {
    /// No pending values and no property changes - omit from metadata.
    NoData,
    /// Properties changed but there's no data this round - Absent raw index,
    /// properties still carried.
    PropertiesOnly,
    /// First time this object's layout has been declared, or it changed
    /// shape since the last segment that wrote it.
    NewDeclaration(RawDataDescriptor),
    /// Same shape as the last segment that wrote it - wire as `Reused`.
    Reused(RawDataDescriptor),
}

/// Constructor parameters for a `Writer`, mirroring the reader's equivalent
/// configuration surface: version, endianness, interleave, and a buffer-size
/// hint for the per-segment raw-data staging buffer.
#[derive(Debug, Clone, Copy)]
pub struct WriterConfig {
    pub version: u32,
    pub endianness: Endianness,
    /// Lays out raw data in row-major interleaved order instead of
    /// per-participant contiguous blocks. Not yet implemented: `write_segment`
    /// returns `TdmsError::Unsupported` if this is set.
    pub interleave: bool,
    /// Initial capacity hint for the per-segment raw-data buffer.
    pub buffer_size: usize,
}

const VERSION_4713: u32 = 4713;
const DEFAULT_BUFFER_SIZE: usize = 8192;

impl WriterConfig {
    pub fn new(endianness: Endianness) -> Self {
        WriterConfig {
            version: VERSION_4713,
            endianness,
            interleave: false,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

/// Builds and writes TDMS segments from a staged `ObjectModel`. Works with
/// any `Write` sink; gains the append-to-previous-segment optimization when
/// the sink also implements `Seek`. When `index_sink` is supplied, every
/// freshly emitted segment (not append-to-previous extensions, per §4.6 step
/// 3) mirrors its lead-in and metadata there with the `TDSh` tag.
pub struct Writer<W> {
    sink: W,
    index_sink: Option<Box<dyn Write>>,
    pub model: ObjectModel,
    config: WriterConfig,
    last_segment_lead_in_pos: Option<u64>,
    last_segment_end: Option<u64>,
    last_participants: Vec<String>,
    /// Bytes written so far through this writer. Tracked independently of
    /// `Seek` so the append-to-previous rewrite has an absolute position to
    /// seek back to even though we never need to query the sink for it.
    position: u64,
}

impl<W: Write> Writer<W> {
    pub fn new(sink: W, index_sink: Option<Box<dyn Write>>, config: WriterConfig) -> Self {
        Writer {
            sink,
            index_sink,
            model: ObjectModel::new(),
            config,
            last_segment_lead_in_pos: None,
            last_segment_end: None,
            last_participants: Vec::new(),
            position: 0,
        }
    }

    pub fn into_inner(self) -> W {
        self.sink
    }

    pub fn declare(&mut self, path: &str) {
        self.model.declare(path);
    }

    pub fn set_property(&mut self, path: &str, name: &str, data_type: TdmsDataType, value: Value) {
        self.model.set_property(path, name, data_type, value);
        // property-only updates must still surface in the next flush even if
        // the object has no new data staged.
    }

    pub fn append_i32(&mut self, path: &str, values: &[i32]) {
        self.model.set_data_type(path, TdmsDataType::I32(4));
        let mut bytes = Vec::with_capacity(values.len() * 4);
        for v in values {
            codec::write_i32(&mut bytes, self.config.endianness, *v).expect("writing to Vec cannot fail");
        }
        self.model.append_values(path, bytes, values.len() as u64);
    }

    pub fn append_f64(&mut self, path: &str, values: &[f64]) {
        self.model.set_data_type(path, TdmsDataType::DoubleFloat(8));
        let mut bytes = Vec::with_capacity(values.len() * 8);
        for v in values {
            codec::write_f64(&mut bytes, self.config.endianness, *v).expect("writing to Vec cannot fail");
        }
        self.model.append_values(path, bytes, values.len() as u64);
    }

    pub fn append_bool(&mut self, path: &str, values: &[bool]) {
        self.model.set_data_type(path, TdmsDataType::Boolean(1));
        let mut bytes = Vec::with_capacity(values.len());
        for v in values {
            codec::write_bool(&mut bytes, *v).expect("writing to Vec cannot fail");
        }
        self.model.append_values(path, bytes, values.len() as u64);
    }

    pub fn append_strings(&mut self, path: &str, values: Vec<String>) {
        self.model.set_data_type(path, TdmsDataType::String);
        self.model.append_strings(path, values);
    }

    fn classify(&self) -> Vec<(String, Classification)> {
        let mut out = Vec::new();

        for (path, object) in &self.model.objects {
            let has_pending = !object.pending.is_empty();
            let dirty_properties = object.dirty_properties;

            if !has_pending && !dirty_properties {
                out.push((path.clone(), Classification::NoData));
                continue;
            }

            if !has_pending {
                out.push((path.clone(), Classification::PropertiesOnly));
                continue;
            }

            let data_type = object
                .data_type
                .expect("object with pending values must have a data type");

            let descriptor = if let TdmsDataType::String = data_type {
                let strings = match &object.pending {
                    PendingValues::Strings(v) => v,
                    _ => unreachable!(),
                };
                let total_bytes = 4 * strings.len() as u64
                    + strings.iter().map(|s| s.as_bytes().len() as u64).sum::<u64>();
                RawDataDescriptor::Standard {
                    data_type,
                    dimension: 1,
                    value_count: strings.len() as u64,
                    total_byte_size: Some(total_bytes),
                }
            } else {
                RawDataDescriptor::Standard {
                    data_type,
                    dimension: 1,
                    value_count: object.pending.value_count(),
                    total_byte_size: None,
                }
            };

            let is_same_shape = object.descriptor.as_ref() == Some(&descriptor);

            if is_same_shape {
                out.push((path.clone(), Classification::Reused(descriptor)));
            } else {
                out.push((path.clone(), Classification::NewDeclaration(descriptor)));
            }
        }

        out
    }

    /// Writes a full segment (lead-in, metadata, raw data) for every object
    /// with pending values or changed properties, then clears pending state.
    /// Always takes the "emit a new segment" path - callers with a
    /// `Write + Seek` sink should prefer `write_segment_with_append`.
    pub fn write_segment(&mut self) -> Result<(), TdmsError> {
        self.write_segment_inner(false)
    }

    fn write_segment_inner(&mut self, appended: bool) -> Result<(), TdmsError> {
        if self.config.interleave {
            return Err(TdmsError::Unsupported(
                "interleaved segment writing is not implemented".to_string(),
            ));
        }

        let classifications = self.classify();

        let participants: Vec<String> = classifications
            .iter()
            .filter(|(_, c)| !matches!(c, Classification::NoData))
            .map(|(p, _)| p.clone())
            .collect();

        let data_participants: Vec<&String> = classifications
            .iter()
            .filter(|(_, c)| {
                matches!(
                    c,
                    Classification::NewDeclaration(_) | Classification::Reused(_)
                )
            })
            .map(|(p, _)| p)
            .collect();

        if participants.is_empty() {
            debug!("write_segment called with nothing staged; no-op");
            return Ok(());
        }

        let new_obj_list = participants != self.last_participants;

        let mut objects = Vec::new();
        for (path, classification) in &classifications {
            if matches!(classification, Classification::NoData) {
                continue;
            }

            let object = self.model.objects.get(path).unwrap();
            let raw_data = match classification {
                Classification::NoData => unreachable!(),
                Classification::PropertiesOnly => RawDataDescriptor::Absent,
                Classification::NewDeclaration(d) => d.clone(),
                Classification::Reused(_) => RawDataDescriptor::Reused,
            };

            objects.push(MetadataObject {
                object_path: path.clone(),
                raw_data,
                properties: object.properties.clone(),
            });
        }

        let metadata = Metadata { objects };
        let mut metadata_bytes = Vec::new();
        metadata.write(self.config.endianness, &mut metadata_bytes)?;

        let mut raw_data_bytes = Vec::with_capacity(self.config.buffer_size);
        for path in &data_participants {
            let object = self.model.objects.get(*path).unwrap();
            match &object.pending {
                PendingValues::Numeric { bytes, .. } => raw_data_bytes.extend_from_slice(bytes),
                PendingValues::Strings(values) => {
                    write_string_chunk(&mut raw_data_bytes, self.config.endianness, values)?
                }
                PendingValues::None => {}
            }
        }

        let mut toc = K_TOC_META_DATA | K_TOC_RAW_DATA;
        if new_obj_list {
            toc |= K_TOC_NEW_OBJ_LIST;
        }
        if self.config.endianness == Endianness::Big {
            toc |= crate::segment::K_TOC_BIG_ENDIAN;
        }

        let lead_in = LeadIn {
            tag: *b"TDSm",
            table_of_contents: toc,
            version_number: self.config.version,
            next_segment_offset: (metadata_bytes.len() + raw_data_bytes.len()) as u64,
            raw_data_offset: metadata_bytes.len() as u64,
        };

        let lead_in_pos = self.position;
        self.sink.write_all(&lead_in.to_bytes())?;
        self.sink.write_all(&metadata_bytes)?;
        self.sink.write_all(&raw_data_bytes)?;

        if let Some(index_sink) = self.index_sink.as_mut() {
            let index_lead_in = LeadIn {
                tag: *b"TDSh",
                table_of_contents: toc,
                version_number: self.config.version,
                next_segment_offset: metadata_bytes.len() as u64,
                raw_data_offset: metadata_bytes.len() as u64,
            };
            index_sink.write_all(&index_lead_in.to_bytes())?;
            index_sink.write_all(&metadata_bytes)?;
        }

        let segment_end = lead_in_pos + LEAD_IN_SIZE + lead_in.next_segment_offset;
        self.position = segment_end;

        debug!(
            "write_segment: appended={} new_obj_list={} metadata_bytes={} raw_data_bytes={}",
            appended,
            new_obj_list,
            metadata_bytes.len(),
            raw_data_bytes.len()
        );

        self.last_segment_lead_in_pos = Some(lead_in_pos);
        self.last_segment_end = Some(segment_end);
        self.last_participants = participants;

        for path in data_participants {
            let object = self.model.objects.get_mut(path).unwrap();
            let data_type = object.data_type.unwrap();
            object.descriptor = Some(match data_type {
                TdmsDataType::String => {
                    let strings = match &object.pending {
                        PendingValues::Strings(v) => v,
                        _ => unreachable!(),
                    };
                    let total_bytes = 4 * strings.len() as u64
                        + strings.iter().map(|s| s.as_bytes().len() as u64).sum::<u64>();
                    RawDataDescriptor::Standard {
                        data_type,
                        dimension: 1,
                        value_count: strings.len() as u64,
                        total_byte_size: Some(total_bytes),
                    }
                }
                _ => RawDataDescriptor::Standard {
                    data_type,
                    dimension: 1,
                    value_count: object.pending.value_count(),
                    total_byte_size: None,
                },
            });
            object.pending = PendingValues::None;
            object.dirty_properties = false;
        }

        for (path, classification) in classifications {
            if matches!(classification, Classification::PropertiesOnly) {
                if let Some(object) = self.model.objects.get_mut(&path) {
                    object.dirty_properties = false;
                }
            }
        }

        Ok(())
    }
}

fn write_string_chunk<W: Write>(
    w: &mut W,
    endianness: Endianness,
    values: &[String],
) -> Result<(), TdmsError> {
    let mut offset = 0u32;
    for s in values {
        offset += s.as_bytes().len() as u32;
        codec::write_u32(w, endianness, offset)?;
    }
    for s in values {
        w.write_all(s.as_bytes())?;
    }
    Ok(())
}

impl<W: Write + Seek> Writer<W> {
    /// Extends the previous segment's raw data in place when eligible
    /// (no new/changed object declarations, no string channels staged, and a
    /// previous segment exists to extend), rewriting only its lead-in's
    /// `next_segment_offset` field. Falls back to emitting a brand new
    /// segment otherwise.
    pub fn write_segment_with_append(&mut self) -> Result<(), TdmsError> {
        if self.append_eligible() {
            self.append_to_previous()
        } else {
            self.write_segment_inner(false)
        }
    }

    fn append_eligible(&self) -> bool {
        let (Some(_), Some(_)) = (self.last_segment_lead_in_pos, self.last_segment_end) else {
            return false;
        };

        if self.model.objects.values().any(|o| o.dirty_properties) {
            return false;
        }

        let classifications = self.classify();
        let participants: Vec<&String> = classifications
            .iter()
            .filter(|(_, c)| !matches!(c, Classification::NoData))
            .map(|(p, _)| p)
            .collect();

        if participants.is_empty() {
            return false;
        }

        if participants.len() != self.last_participants.len()
            || participants
                .iter()
                .zip(self.last_participants.iter())
                .any(|(a, b)| *a != b)
        {
            return false;
        }

        classifications.iter().all(|(_, c)| match c {
            Classification::NoData => true,
            Classification::Reused(d) => !matches!(d, RawDataDescriptor::Standard { data_type: TdmsDataType::String, .. }),
            _ => false,
        })
    }

    fn append_to_previous(&mut self) -> Result<(), TdmsError> {
        let lead_in_pos = self
            .last_segment_lead_in_pos
            .expect("append_eligible guarantees a previous segment");
        let previous_end = self
            .last_segment_end
            .expect("append_eligible guarantees a previous segment");

        let classifications = self.classify();
        let data_participants: Vec<&String> = classifications
            .iter()
            .filter(|(_, c)| matches!(c, Classification::Reused(_)))
            .map(|(p, _)| p)
            .collect();

        let mut raw_data_bytes = Vec::new();
        for path in &data_participants {
            let object = self.model.objects.get(*path).unwrap();
            if let PendingValues::Numeric { bytes, .. } = &object.pending {
                raw_data_bytes.extend_from_slice(bytes);
            }
        }

        self.sink.seek(SeekFrom::Start(previous_end))?;
        self.sink.write_all(&raw_data_bytes)?;

        let new_end = previous_end + raw_data_bytes.len() as u64;

        let new_next_segment_offset = new_end - lead_in_pos - LEAD_IN_SIZE;
        let offset_bytes = match self.config.endianness {
            Endianness::Little => new_next_segment_offset.to_le_bytes(),
            Endianness::Big => new_next_segment_offset.to_be_bytes(),
        };
        self.sink.seek(SeekFrom::Start(lead_in_pos + 12))?;
        self.sink.write_all(&offset_bytes)?;
        self.sink.seek(SeekFrom::Start(new_end))?;

        debug!(
            "write_segment: appended=true raw_data_bytes={} new_next_segment_offset={}",
            raw_data_bytes.len(),
            new_next_segment_offset
        );

        self.last_segment_end = Some(new_end);
        self.position = new_end;

        for path in data_participants {
            let object = self.model.objects.get_mut(path).unwrap();
            object.pending = PendingValues::None;
            object.dirty_properties = false;
        }

        Ok(())
    }
}
