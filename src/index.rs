//! Index-file mirror: a TDMS index file (conventionally `<file>.tdms_index`)
//! carries every data segment's lead-in and metadata block, tag rewritten
//! from `TDSm` to `TDSh`, with `next_segment_offset` recomputed to describe
//! the index file's own metadata-only layout instead of the data segment's
//! (which also includes raw data). `raw_data_offset` is copied verbatim so a
//! reader can tell how much of the *data* file's segment was metadata.
//!
//! Built on `segment::LeadIn`'s `is_index_tag`/`to_bytes`.

use crate::segment::{LeadIn, LEAD_IN_SIZE};
use crate::TdmsError;
use std::io::{Read, Seek, SeekFrom, Write};

/// Mirrors every segment of a data file into `index`: same lead-in fields
/// except `tag` (rewritten to `TDSh`) and `next_segment_offset` (recomputed
/// to the metadata block's own length, since an index file carries no raw
/// data). Segments with no metadata at all (a pure raw-data-continuation
/// segment) are mirrored with an empty metadata block.
pub fn write_index_file<R: Read + Seek, W: Write>(
    data: &mut R,
    data_len: u64,
    index: &mut W,
) -> Result<(), TdmsError> {
    let mut pos = 0u64;

    loop {
        let lead_in = match read_lead_in_at(data, pos, data_len)? {
            None => break,
            Some(l) => l,
        };

        let meta_len = usize::try_from(lead_in.raw_data_offset)?;
        let mut metadata_bytes = vec![0u8; meta_len];
        data.read_exact(&mut metadata_bytes)?;

        let mut index_lead_in = lead_in.clone();
        index_lead_in.tag = *b"TDSh";
        index_lead_in.next_segment_offset = metadata_bytes.len() as u64;

        index.write_all(&index_lead_in.to_bytes())?;
        index.write_all(&metadata_bytes)?;

        if lead_in.next_segment_offset == u64::MAX {
            break;
        }
        pos += LEAD_IN_SIZE + lead_in.next_segment_offset;
    }

    Ok(())
}

/// Confirms that `index` is a faithful mirror of `data`'s segments: same
/// number of segments, same lead-in fields (modulo tag/next_segment_offset,
/// which legitimately differ), and byte-identical metadata blocks.
pub fn verify_index_matches_data<R1: Read + Seek, R2: Read + Seek>(
    index: &mut R1,
    index_len: u64,
    data: &mut R2,
    data_len: u64,
) -> Result<(), TdmsError> {
    let mut index_pos = 0u64;
    let mut data_pos = 0u64;
    let mut segment_number = 0u64;

    loop {
        let index_lead_in = match read_lead_in_at(index, index_pos, index_len)? {
            None => break,
            Some(l) => l,
        };
        let data_lead_in = read_lead_in_at(data, data_pos, data_len)?
            .ok_or(TdmsError::IndexMismatch(segment_number))?;

        if index_lead_in.raw_data_offset != data_lead_in.raw_data_offset
            || index_lead_in.table_of_contents != data_lead_in.table_of_contents
            || index_lead_in.version_number != data_lead_in.version_number
        {
            return Err(TdmsError::IndexMismatch(segment_number));
        }

        let meta_len = usize::try_from(index_lead_in.raw_data_offset)?;
        let mut index_meta = vec![0u8; meta_len];
        index.read_exact(&mut index_meta)?;
        let mut data_meta = vec![0u8; meta_len];
        data.read_exact(&mut data_meta)?;
        if index_meta != data_meta {
            return Err(TdmsError::IndexMismatch(segment_number));
        }

        index_pos += LEAD_IN_SIZE + index_lead_in.next_segment_offset;
        data_pos = if data_lead_in.next_segment_offset == u64::MAX {
            data_len
        } else {
            data_pos + LEAD_IN_SIZE + data_lead_in.next_segment_offset
        };
        segment_number += 1;
    }

    if read_lead_in_at(data, data_pos, data_len)?.is_some() {
        return Err(TdmsError::IndexMismatch(segment_number));
    }

    Ok(())
}

fn read_lead_in_at<R: Read + Seek>(
    r: &mut R,
    pos: u64,
    len: u64,
) -> Result<Option<LeadIn>, TdmsError> {
    if pos >= len {
        return Ok(None);
    }
    r.seek(SeekFrom::Start(pos))?;
    let mut buf = [0u8; LEAD_IN_SIZE as usize];
    match r.read_exact(&mut buf) {
        Ok(()) => Ok(Some(LeadIn::from_bytes(&buf)?)),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{self, Endianness};
    use crate::data_type::TdmsDataType;
    use crate::object::RawDataDescriptor;
    use crate::segment::{Metadata, MetadataObject, K_TOC_META_DATA, K_TOC_NEW_OBJ_LIST, K_TOC_RAW_DATA};
    use indexmap::IndexMap;
    use std::io::Cursor;

    fn build_data_file() -> Vec<u8> {
        let mut buf = Vec::new();
        for (toc, count) in [
            (K_TOC_META_DATA | K_TOC_RAW_DATA | K_TOC_NEW_OBJ_LIST, 2u64),
            (K_TOC_META_DATA | K_TOC_RAW_DATA, 2u64),
        ] {
            let metadata = Metadata {
                objects: vec![MetadataObject {
                    object_path: "/'g'/'c'".to_string(),
                    raw_data: RawDataDescriptor::Standard {
                        data_type: TdmsDataType::I32(4),
                        dimension: 1,
                        value_count: count,
                        total_byte_size: None,
                    },
                    properties: IndexMap::new(),
                }],
            };
            let mut metadata_bytes = Vec::new();
            metadata.write(Endianness::Little, &mut metadata_bytes).unwrap();

            let mut raw = Vec::new();
            for v in 0..count as i32 {
                codec::write_i32(&mut raw, Endianness::Little, v).unwrap();
            }

            let lead_in = LeadIn {
                tag: *b"TDSm",
                table_of_contents: toc,
                version_number: 4713,
                next_segment_offset: (metadata_bytes.len() + raw.len()) as u64,
                raw_data_offset: metadata_bytes.len() as u64,
            };

            buf.extend_from_slice(&lead_in.to_bytes());
            buf.extend_from_slice(&metadata_bytes);
            buf.extend_from_slice(&raw);
        }
        buf
    }

    #[test]
    fn mirrors_and_verifies_round_trip() {
        let data_buf = build_data_file();
        let data_len = data_buf.len() as u64;
        let mut data = Cursor::new(data_buf);

        let mut index_buf = Vec::new();
        write_index_file(&mut data, data_len, &mut index_buf).unwrap();

        let mut data2 = Cursor::new(data.into_inner());
        let index_len = index_buf.len() as u64;
        let mut index = Cursor::new(index_buf);

        verify_index_matches_data(&mut index, index_len, &mut data2, data_len).unwrap();
    }

    #[test]
    fn tampered_index_metadata_is_reported() {
        let data_buf = build_data_file();
        let data_len = data_buf.len() as u64;
        let mut data = Cursor::new(data_buf);

        let mut index_buf = Vec::new();
        write_index_file(&mut data, data_len, &mut index_buf).unwrap();
        // Flip a byte inside the first segment's metadata block (after the 28
        // byte lead-in, well within the object path string).
        index_buf[30] ^= 0xFF;

        let mut data2 = Cursor::new(data.into_inner());
        let index_len = index_buf.len() as u64;
        let mut index = Cursor::new(index_buf);

        let err = verify_index_matches_data(&mut index, index_len, &mut data2, data_len).unwrap_err();
        assert!(matches!(err, TdmsError::IndexMismatch(0)));
    }
}
