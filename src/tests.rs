//! Whole-file, end-to-end tests built on in-memory fixtures: every scenario
//! here builds its own bytes with `Writer` (or by hand, for the
//! truncated-tail and interleaved cases) and reads them back through
//! `TDMSFile`.

use crate::codec::{self, Endianness};
use crate::data_type::{TdmsDataType, Value};
use crate::object::RawDataDescriptor;
use crate::segment::{LeadIn, Metadata, MetadataObject, K_TOC_META_DATA, K_TOC_NEW_OBJ_LIST, K_TOC_RAW_DATA};
use crate::writer::{Writer, WriterConfig};
use crate::TDMSFile;
use indexmap::IndexMap;
use std::io::Cursor;

#[test]
fn single_int32_channel_round_trips() {
    let mut writer = Writer::new(Cursor::new(Vec::new()), None, WriterConfig::new(Endianness::Little));
    writer.append_i32("/'group'/'channel'", &[10, 20, 30, 40]);
    writer.write_segment().unwrap();

    let buf = writer.into_inner().into_inner();
    let len = buf.len() as u64;
    let file = TDMSFile::from_reader(Cursor::new(buf), len, false).unwrap();

    assert_eq!(file.groups(), vec!["/'group'".to_string()]);
    assert_eq!(file.channels("/'group'"), vec!["channel".to_string()]);

    let channel = file.channel("/'group'", "channel").unwrap();
    let values: Result<Vec<i32>, _> = channel.iter::<i32>().collect();
    assert_eq!(values.unwrap(), vec![10, 20, 30, 40]);
}

#[test]
fn multi_segment_append_extends_without_new_declaration() {
    let mut writer = Writer::new(Cursor::new(Vec::new()), None, WriterConfig::new(Endianness::Little));
    writer.append_i32("/'g'/'c'", &[1, 2]);
    writer.write_segment_with_append().unwrap();
    writer.append_i32("/'g'/'c'", &[3, 4]);
    writer.write_segment_with_append().unwrap();
    writer.append_i32("/'g'/'c'", &[5, 6]);
    writer.write_segment_with_append().unwrap();

    let buf = writer.into_inner().into_inner();
    let len = buf.len() as u64;
    let file = TDMSFile::from_reader(Cursor::new(buf), len, false).unwrap();

    let channel = file.channel("/'g'", "c").unwrap();
    let values: Result<Vec<i32>, _> = channel.iter::<i32>().collect();
    assert_eq!(values.unwrap(), vec![1, 2, 3, 4, 5, 6]);
}

#[test]
fn string_channel_round_trips() {
    let mut writer = Writer::new(Cursor::new(Vec::new()), None, WriterConfig::new(Endianness::Little));
    writer.append_strings(
        "/'g'/'names'",
        vec!["alpha".to_string(), "beta".to_string(), "".to_string()],
    );
    writer.write_segment().unwrap();

    let buf = writer.into_inner().into_inner();
    let len = buf.len() as u64;
    let file = TDMSFile::from_reader(Cursor::new(buf), len, false).unwrap();

    let channel = file.channel("/'g'", "names").unwrap();
    let values: Result<Vec<String>, _> = channel.iter::<String>().collect();
    assert_eq!(
        values.unwrap(),
        vec!["alpha".to_string(), "beta".to_string(), "".to_string()]
    );
}

#[test]
fn property_update_mid_stream_persists_without_clearing_history() {
    let mut writer = Writer::new(Cursor::new(Vec::new()), None, WriterConfig::new(Endianness::Little));
    writer.append_i32("/'g'/'c'", &[1, 2]);
    writer.write_segment().unwrap();

    writer.set_property(
        "/'g'/'c'",
        "unit",
        TdmsDataType::String,
        Value::String("volts".to_string()),
    );
    writer.append_i32("/'g'/'c'", &[3, 4]);
    writer.write_segment().unwrap();

    let buf = writer.into_inner().into_inner();
    let len = buf.len() as u64;
    let file = TDMSFile::from_reader(Cursor::new(buf), len, false).unwrap();

    let channel = file.channel("/'g'", "c").unwrap();
    assert_eq!(
        channel.properties.get("unit"),
        Some(&(TdmsDataType::String, Value::String("volts".to_string())))
    );
    let values: Result<Vec<i32>, _> = channel.iter::<i32>().collect();
    assert_eq!(values.unwrap(), vec![1, 2, 3, 4]);
}

#[test]
fn interleaved_two_channels_decode_in_row_order() {
    let mut raw = Vec::new();
    for row in 0..4i32 {
        codec::write_i32(&mut raw, Endianness::Little, row).unwrap();
        codec::write_i32(&mut raw, Endianness::Little, row * 100).unwrap();
    }

    let metadata = Metadata {
        objects: vec![
            MetadataObject {
                object_path: "/'g'/'a'".to_string(),
                raw_data: RawDataDescriptor::Standard {
                    data_type: TdmsDataType::I32(4),
                    dimension: 1,
                    value_count: 4,
                    total_byte_size: None,
                },
                properties: IndexMap::new(),
            },
            MetadataObject {
                object_path: "/'g'/'b'".to_string(),
                raw_data: RawDataDescriptor::Standard {
                    data_type: TdmsDataType::I32(4),
                    dimension: 1,
                    value_count: 4,
                    total_byte_size: None,
                },
                properties: IndexMap::new(),
            },
        ],
    };
    let mut metadata_bytes = Vec::new();
    metadata.write(Endianness::Little, &mut metadata_bytes).unwrap();

    let toc = K_TOC_META_DATA | K_TOC_RAW_DATA | K_TOC_NEW_OBJ_LIST | crate::segment::K_TOC_INTERLEAVED_DATA;
    let lead_in = LeadIn {
        tag: *b"TDSm",
        table_of_contents: toc,
        version_number: 4713,
        next_segment_offset: (metadata_bytes.len() + raw.len()) as u64,
        raw_data_offset: metadata_bytes.len() as u64,
    };

    let mut buf = Vec::new();
    buf.extend_from_slice(&lead_in.to_bytes());
    buf.extend_from_slice(&metadata_bytes);
    buf.extend_from_slice(&raw);

    let len = buf.len() as u64;
    let file = TDMSFile::from_reader(Cursor::new(buf), len, false).unwrap();

    let a: Result<Vec<i32>, _> = file.channel("/'g'", "a").unwrap().iter::<i32>().collect();
    let b: Result<Vec<i32>, _> = file.channel("/'g'", "b").unwrap().iter::<i32>().collect();
    assert_eq!(a.unwrap(), vec![0, 1, 2, 3]);
    assert_eq!(b.unwrap(), vec![0, 100, 200, 300]);
}

#[test]
fn truncated_tail_is_recovered_not_fatal() {
    let mut writer = Writer::new(Cursor::new(Vec::new()), None, WriterConfig::new(Endianness::Little));
    writer.append_i32("/'g'/'c'", &[1, 2, 3, 4]);
    writer.write_segment().unwrap();

    let mut buf = writer.into_inner().into_inner();
    buf.truncate(buf.len() - 8); // drop the last two i32 values

    let len = buf.len() as u64;
    let file = TDMSFile::from_reader(Cursor::new(buf), len, false).unwrap();

    let channel = file.channel("/'g'", "c").unwrap();
    let values: Result<Vec<i32>, _> = channel.iter::<i32>().collect();
    assert_eq!(values.unwrap(), vec![1, 2]);
}
