//! Segment reader: walks a TDMS file segment by segment, maintaining the
//! rolling object map the wire format only implies - telling a "reused"
//! (0x00000000) raw-data index apart from an "absent" (0xFFFFFFFF) one, and
//! carrying forward an object's properties and layout across segments that
//! don't mention it.

use crate::object::RawDataDescriptor;
use crate::segment::{
    Endianness, LeadIn, Metadata, K_TOC_META_DATA, K_TOC_NEW_OBJ_LIST, LEAD_IN_SIZE,
};
use crate::TdmsError;
use indexmap::IndexMap;
use log::warn;
use std::io::{self, Read, Seek, SeekFrom};

const UNKNOWN_SEGMENT_LENGTH: u64 = u64::MAX;

/// One object's accumulated state across the segments read so far: its
/// properties (merged, never cleared by `NewObjectList`) and the last
/// raw-data descriptor it was given (what a `Reused` wire code inherits).
#[derive(Debug, Clone)]
pub struct RollingObject {
    pub path: String,
    pub descriptor: RawDataDescriptor,
    pub properties: IndexMap<String, (crate::data_type::TdmsDataType, crate::data_type::Value)>,
}

/// Everything a chunk decoder needs to know about one segment: where its raw
/// data starts and ends, which objects participate and in what order, and
/// whether the segment was read in full or is a truncated tail.
#[derive(Debug, Clone)]
pub struct SegmentDescriptor {
    pub start_pos: u64,
    pub end_pos: u64,
    pub raw_data_start: u64,
    pub lead_in: LeadIn,
    pub endianness: Endianness,
    pub participants: Vec<String>,
    pub complete: bool,
}

/// Walks a `Read + Seek` source one segment at a time, keeping the rolling
/// object map spec 4.4 describes. Construct with the stream positioned at the
/// start of the file (or wherever the first segment begins) and the total
/// readable length.
pub struct SegmentReader<R> {
    reader: R,
    file_len: u64,
    pos: u64,
    pub rolling_objects: IndexMap<String, RollingObject>,
    participant_order: Vec<String>,
}

impl<R: Read + Seek> SegmentReader<R> {
    pub fn new(mut reader: R, file_len: u64) -> Result<Self, TdmsError> {
        let pos = reader.stream_position()?;
        Ok(SegmentReader {
            reader,
            file_len,
            pos,
            rolling_objects: IndexMap::new(),
            participant_order: Vec::new(),
        })
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    pub fn rolling_object(&self, path: &str) -> Option<&RollingObject> {
        self.rolling_objects.get(path)
    }

    pub fn current_participants(&self) -> &[String] {
        &self.participant_order
    }

    /// Reads and processes the next segment, advancing the rolling object
    /// map. Returns `None` once the stream is exhausted (a clean EOF exactly
    /// at a segment boundary, or too few bytes left to even hold a lead-in).
    pub fn next_segment(&mut self) -> Option<Result<SegmentDescriptor, TdmsError>> {
        if self.pos >= self.file_len {
            return None;
        }

        match self.read_one_segment() {
            Ok(descriptor) => {
                self.pos = descriptor.end_pos;
                Some(Ok(descriptor))
            }
            Err(ReadSegmentError::CleanEof) => None,
            Err(ReadSegmentError::Fatal(e)) => Some(Err(e)),
        }
    }

    fn read_one_segment(&mut self) -> Result<SegmentDescriptor, ReadSegmentError> {
        let start_pos = self.pos;
        self.reader
            .seek(SeekFrom::Start(start_pos))
            .map_err(|e| ReadSegmentError::Fatal(e.into()))?;

        let mut lead_in_bytes = [0u8; 28];
        match self.reader.read_exact(&mut lead_in_bytes) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(ReadSegmentError::CleanEof)
            }
            Err(e) => return Err(ReadSegmentError::Fatal(e.into())),
        }

        let lead_in = LeadIn::from_bytes(&lead_in_bytes).map_err(ReadSegmentError::Fatal)?;
        let endianness = lead_in.endianness();

        let (end_pos, complete) = if lead_in.next_segment_offset == UNKNOWN_SEGMENT_LENGTH {
            (self.file_len, false)
        } else {
            let declared_end = start_pos + LEAD_IN_SIZE + lead_in.next_segment_offset;
            if declared_end > self.file_len {
                warn!(
                    "segment at offset {} declares end {} past file length {}; treating as truncated tail",
                    start_pos, declared_end, self.file_len
                );
                (self.file_len, false)
            } else {
                (declared_end, true)
            }
        };

        let raw_data_start = start_pos + LEAD_IN_SIZE + lead_in.raw_data_offset;
        if raw_data_start > end_pos {
            return Err(ReadSegmentError::Fatal(TdmsError::IncompleteSegment(
                start_pos,
                lead_in.next_segment_offset,
                end_pos.saturating_sub(start_pos + LEAD_IN_SIZE),
            )));
        }

        let new_obj_list = lead_in.table_of_contents & K_TOC_NEW_OBJ_LIST != 0;
        let has_metadata = lead_in.table_of_contents & K_TOC_META_DATA != 0;

        if new_obj_list && !has_metadata {
            return Err(ReadSegmentError::Fatal(TdmsError::InvalidSegment()));
        }

        if has_metadata {
            let metadata =
                Metadata::from_reader(endianness, &mut self.reader).map_err(ReadSegmentError::Fatal)?;
            self.apply_metadata(metadata, new_obj_list)
                .map_err(ReadSegmentError::Fatal)?;
        }

        Ok(SegmentDescriptor {
            start_pos,
            end_pos,
            raw_data_start,
            lead_in,
            endianness,
            participants: self.participant_order.clone(),
            complete,
        })
    }

    fn apply_metadata(&mut self, metadata: Metadata, new_obj_list: bool) -> Result<(), TdmsError> {
        if new_obj_list {
            self.participant_order.clear();
        }

        for obj in metadata.objects {
            let entry = self
                .rolling_objects
                .entry(obj.object_path.clone())
                .or_insert_with(|| RollingObject {
                    path: obj.object_path.clone(),
                    descriptor: RawDataDescriptor::Absent,
                    properties: IndexMap::new(),
                });

            for (name, value) in obj.properties {
                entry.properties.insert(name, value);
            }

            let resolved = match obj.raw_data {
                RawDataDescriptor::Reused => {
                    if matches!(entry.descriptor, RawDataDescriptor::Absent) {
                        return Err(TdmsError::InvalidReuse(obj.object_path.clone()));
                    }
                    entry.descriptor.clone()
                }
                other => other,
            };

            let has_data = !matches!(resolved, RawDataDescriptor::Absent);
            entry.descriptor = resolved;

            if has_data {
                if !self.participant_order.contains(&obj.object_path) {
                    self.participant_order.push(obj.object_path.clone());
                }
            } else {
                self.participant_order.retain(|p| p != &obj.object_path);
            }
        }

        Ok(())
    }
}

enum ReadSegmentError {
    CleanEof,
    Fatal(TdmsError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_type::{TdmsDataType, Value};
    use crate::object::RawDataDescriptor;
    use crate::segment::{MetadataObject, K_TOC_RAW_DATA};
    use indexmap::IndexMap as IM;
    use std::io::Cursor;

    fn write_segment(
        buf: &mut Vec<u8>,
        toc: u32,
        objects: Vec<MetadataObject>,
        raw_data: &[u8],
    ) {
        let mut metadata_bytes = Vec::new();
        if toc & K_TOC_META_DATA != 0 {
            let metadata = Metadata { objects };
            metadata.write(Endianness::Little, &mut metadata_bytes).unwrap();
        }

        let lead_in = LeadIn {
            tag: *b"TDSm",
            table_of_contents: toc,
            version_number: 4713,
            next_segment_offset: (metadata_bytes.len() + raw_data.len()) as u64,
            raw_data_offset: metadata_bytes.len() as u64,
        };

        buf.extend_from_slice(&lead_in.to_bytes());
        buf.extend_from_slice(&metadata_bytes);
        buf.extend_from_slice(raw_data);
    }

    fn standard_object(path: &str, count: u64) -> MetadataObject {
        MetadataObject {
            object_path: path.to_string(),
            raw_data: RawDataDescriptor::Standard {
                data_type: TdmsDataType::I32(4),
                dimension: 1,
                value_count: count,
                total_byte_size: None,
            },
            properties: IM::new(),
        }
    }

    #[test]
    fn reuses_descriptor_across_segments() {
        let mut buf = Vec::new();
        write_segment(
            &mut buf,
            K_TOC_META_DATA | K_TOC_RAW_DATA | K_TOC_NEW_OBJ_LIST,
            vec![standard_object("/'g'/'c'", 4)],
            &[0u8; 16],
        );
        write_segment(
            &mut buf,
            K_TOC_META_DATA | K_TOC_RAW_DATA,
            vec![MetadataObject {
                object_path: "/'g'/'c'".to_string(),
                raw_data: RawDataDescriptor::Reused,
                properties: IM::new(),
            }],
            &[0u8; 16],
        );

        let len = buf.len() as u64;
        let mut reader = SegmentReader::new(Cursor::new(buf), len).unwrap();

        let first = reader.next_segment().unwrap().unwrap();
        assert_eq!(first.participants, vec!["/'g'/'c'".to_string()]);

        let second = reader.next_segment().unwrap().unwrap();
        assert_eq!(second.participants, vec!["/'g'/'c'".to_string()]);
        assert!(reader.next_segment().is_none());
    }

    #[test]
    fn reuse_without_history_is_fatal() {
        let mut buf = Vec::new();
        write_segment(
            &mut buf,
            K_TOC_META_DATA | K_TOC_RAW_DATA | K_TOC_NEW_OBJ_LIST,
            vec![MetadataObject {
                object_path: "/'g'/'c'".to_string(),
                raw_data: RawDataDescriptor::Reused,
                properties: IM::new(),
            }],
            &[],
        );

        let len = buf.len() as u64;
        let mut reader = SegmentReader::new(Cursor::new(buf), len).unwrap();
        let err = reader.next_segment().unwrap().unwrap_err();
        assert!(matches!(err, TdmsError::InvalidReuse(_)));
    }

    #[test]
    fn property_updates_persist_across_new_obj_list() {
        let mut buf = Vec::new();
        let mut obj = standard_object("/'g'/'c'", 1);
        obj.properties.insert(
            "unit".to_string(),
            (TdmsDataType::String, Value::String("volts".to_string())),
        );
        write_segment(
            &mut buf,
            K_TOC_META_DATA | K_TOC_RAW_DATA | K_TOC_NEW_OBJ_LIST,
            vec![obj],
            &[0u8; 4],
        );

        // Second segment resets the object list but must keep the property.
        write_segment(
            &mut buf,
            K_TOC_META_DATA | K_TOC_RAW_DATA | K_TOC_NEW_OBJ_LIST,
            vec![standard_object("/'g'/'c'", 1)],
            &[0u8; 4],
        );

        let len = buf.len() as u64;
        let mut reader = SegmentReader::new(Cursor::new(buf), len).unwrap();
        reader.next_segment().unwrap().unwrap();
        reader.next_segment().unwrap().unwrap();

        let rolling = reader.rolling_object("/'g'/'c'").unwrap();
        assert!(rolling.properties.contains_key("unit"));
    }

    #[test]
    fn truncated_tail_is_reported_not_fatal() {
        let mut buf = Vec::new();
        write_segment(
            &mut buf,
            K_TOC_META_DATA | K_TOC_RAW_DATA | K_TOC_NEW_OBJ_LIST,
            vec![standard_object("/'g'/'c'", 4)],
            &[0u8; 16],
        );
        // Truncate the file mid raw-data.
        buf.truncate(buf.len() - 8);

        let len = buf.len() as u64;
        let mut reader = SegmentReader::new(Cursor::new(buf), len).unwrap();
        let segment = reader.next_segment().unwrap().unwrap();
        assert!(!segment.complete);
        assert_eq!(segment.end_pos, len);
    }

    #[test]
    fn new_obj_list_without_metadata_is_fatal() {
        let lead_in = LeadIn {
            tag: *b"TDSm",
            table_of_contents: K_TOC_NEW_OBJ_LIST | K_TOC_RAW_DATA,
            version_number: 4713,
            next_segment_offset: 4,
            raw_data_offset: 0,
        };

        let mut buf = Vec::new();
        buf.extend_from_slice(&lead_in.to_bytes());
        buf.extend_from_slice(&[0u8; 4]);

        let len = buf.len() as u64;
        let mut reader = SegmentReader::new(Cursor::new(buf), len).unwrap();
        let err = reader.next_segment().unwrap().unwrap_err();
        assert!(matches!(err, TdmsError::InvalidSegment()));
    }
}
