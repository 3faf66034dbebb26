//! A Rust library for reading and writing LabVIEW TDMS files.
//!
//! More information about the TDMS file format can be found here: <https://www.ni.com/en-us/support/documentation/supplemental/07/tdms-file-format-internal-structure.html>

pub mod channel;
pub mod channel_iter;
pub mod chunk;
pub mod codec;
pub mod data_type;
pub mod error;
pub mod index;
pub mod object;
pub mod reader;
pub mod segment;
pub mod writer;
#[cfg(test)]
mod tests;

use crate::channel::Channel;
use crate::object::RawDataDescriptor;
use crate::reader::SegmentReader;
pub use error::TdmsError;
use std::fs;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

pub use codec::Endianness;
pub use data_type::{TdmsDataType, Value};

/// `TDMSFile` represents every group/channel object discovered while walking
/// a TDMS file's segments, with properties merged and raw data decoded
/// (unless `metadata_only` was requested) across the whole file.
#[derive(Debug)]
pub struct TDMSFile<R> {
    reader: R,
    objects: indexmap::IndexMap<String, Channel>,
}

impl TDMSFile<File> {
    /// `from_path` expects a path and whether or not to read only the
    /// metadata of each segment vs. decoding raw data into memory as well.
    pub fn from_path(path: &Path, metadata_only: bool) -> Result<Self, TdmsError> {
        let len = fs::metadata(path)?.len();
        let file = File::open(path)?;
        let reader = BufReader::with_capacity(4096, file);
        TDMSFile::from_reader(reader, len, metadata_only)
    }
}

impl<R: Read + Seek> TDMSFile<R> {
    /// Walks every segment of `reader` (a stream of `len` readable bytes),
    /// resolving the rolling object map and, unless `metadata_only` is set,
    /// decoding each segment's raw data as soon as it's read.
    pub fn from_reader(reader: R, len: u64, metadata_only: bool) -> Result<Self, TdmsError> {
        let mut segment_reader = SegmentReader::new(reader, len)?;
        let mut objects: indexmap::IndexMap<String, Channel> = indexmap::IndexMap::new();

        while let Some(result) = segment_reader.next_segment() {
            let segment = result?;
            // Snapshot before decoding so the borrow checker doesn't need the
            // rolling map and the reader borrowed mutably at the same time -
            // nothing mutates `rolling_objects` again until the next
            // `next_segment()` call, so the snapshot is exact for this segment.
            let rolling = segment_reader.rolling_objects.clone();

            if !metadata_only {
                let decoded = chunk::decode_segment(&segment, &rolling, segment_reader.get_mut())?;
                for (path, mut values) in decoded {
                    let entry = objects
                        .entry(path.clone())
                        .or_insert_with(|| Channel::new(path));
                    entry.values.append(&mut values);
                }
            }

            for (path, rolling_object) in &rolling {
                let entry = objects
                    .entry(path.clone())
                    .or_insert_with(|| Channel::new(path.clone()));
                for (name, value) in &rolling_object.properties {
                    entry.properties.insert(name.clone(), value.clone());
                }
                entry.data_type = data_type_of(&rolling_object.descriptor);
            }
        }

        Ok(TDMSFile {
            reader: segment_reader.into_inner(),
            objects,
        })
    }

    /// `groups` returns every group path (e.g. `/'group'`) discovered in the
    /// file, in the order first seen - inferred from channel paths as well as
    /// any group object explicitly declared with its own properties.
    pub fn groups(&self) -> Vec<String> {
        let mut seen = indexmap::IndexSet::new();
        for path in self.objects.keys() {
            let segments = path_segments(path);
            if segments.len() == 1 || segments.len() == 2 {
                seen.insert(format!("/'{}'", segments[0]));
            }
        }
        seen.into_iter().collect()
    }

    /// `channels` returns the unquoted names of every channel belonging to
    /// `group_path` (as returned by `groups`).
    pub fn channels(&self, group_path: &str) -> Vec<String> {
        let group_name = path_segments(group_path).first().copied().unwrap_or("");
        self.objects
            .keys()
            .filter_map(|path| {
                let segments = path_segments(path);
                if segments.len() == 2 && segments[0] == group_name {
                    Some(segments[1].to_string())
                } else {
                    None
                }
            })
            .collect()
    }

    pub fn channel(&self, group_path: &str, path: &str) -> Result<&Channel, TdmsError> {
        let group_name = path_segments(group_path).first().copied().unwrap_or("");
        if !self.groups().iter().any(|g| g == &format!("/'{}'", group_name)) {
            return Err(TdmsError::GroupDoesNotExist());
        }
        let full_path = format!("/'{}'/'{}'", group_name, path);
        self.objects
            .get(&full_path)
            .ok_or(TdmsError::ChannelDoesNotExist())
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

fn data_type_of(descriptor: &RawDataDescriptor) -> Option<TdmsDataType> {
    match descriptor {
        RawDataDescriptor::Standard { data_type, .. } => Some(*data_type),
        RawDataDescriptor::Daqmx(_) => Some(TdmsDataType::DAQmxRawData),
        RawDataDescriptor::Absent | RawDataDescriptor::Reused => None,
    }
}

/// Splits a TDMS object path into its single-quoted segments, e.g.
/// `/'group'/'channel'` -> `["group", "channel"]`. The root object `/` has no
/// segments.
fn path_segments(path: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut chars = path.char_indices();

    while let Some((i, c)) = chars.next() {
        if c != '\'' {
            continue;
        }
        let start = i + 1;
        for (j, c2) in chars.by_ref() {
            if c2 == '\'' {
                segments.push(&path[start..j]);
                break;
            }
        }
    }

    segments
}

#[cfg(test)]
mod lib_tests {
    use super::*;

    #[test]
    fn path_segments_splits_group_and_channel() {
        assert_eq!(path_segments("/'group'/'channel'"), vec!["group", "channel"]);
        assert_eq!(path_segments("/'group'"), vec!["group"]);
        assert!(path_segments("/").is_empty());
    }

    #[test]
    fn groups_and_channels_round_trip_a_written_file() {
        let mut writer = crate::writer::Writer::new(
            std::io::Cursor::new(Vec::new()),
            None,
            crate::writer::WriterConfig::new(Endianness::Little),
        );
        writer.append_i32("/'group'/'channel'", &[1, 2, 3]);
        writer.write_segment().unwrap();

        let buf = writer.into_inner().into_inner();
        let len = buf.len() as u64;
        let file = TDMSFile::from_reader(std::io::Cursor::new(buf), len, false).unwrap();

        assert_eq!(file.groups(), vec!["/'group'".to_string()]);
        assert_eq!(file.channels("/'group'"), vec!["channel".to_string()]);

        let channel = file.channel("/'group'", "channel").unwrap();
        assert_eq!(channel.len(), 3);
        let values: Result<Vec<i32>, TdmsError> = channel.iter::<i32>().collect();
        assert_eq!(values.unwrap(), vec![1, 2, 3]);

        let err = file.channel("/'missing'", "channel").unwrap_err();
        assert!(matches!(err, TdmsError::GroupDoesNotExist()));

        let err = file.channel("/'group'", "missing").unwrap_err();
        assert!(matches!(err, TdmsError::ChannelDoesNotExist()));
    }
}
