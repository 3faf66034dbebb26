//! Object model: the writer-side mirror of everything the reader reconstructs
//! from a rolling segment walk. Shaped after `MetadataObject`/`RawDataIndex`
//! (`segment.rs`), turned into a mutable side an application builds up before
//! calling `write_segment`.

use crate::data_type::{TdmsDataType, Value};
use indexmap::IndexMap;

/// The resolved state of an object's raw-data index, shared between the
/// reader's rolling object map and the writer's per-object bookkeeping.
/// `Reused` only ever appears transiently - as soon as the reader resolves a
/// `0x00000000` wire code it replaces it with the inherited `Standard`/`Daqmx`
/// descriptor, so a `TdmsObject.descriptor` is never left holding `Reused`.
#[derive(Debug, Clone, PartialEq)]
pub enum RawDataDescriptor {
    Absent,
    Reused,
    Standard {
        data_type: TdmsDataType,
        dimension: u32,
        value_count: u64,
        total_byte_size: Option<u64>,
    },
    Daqmx(DaqmxDescriptor),
}

/// DAQmx raw data is engine-opaque: we carry enough of the descriptor to
/// compute the byte span to skip, and nothing more (see spec's DAQmx note).
#[derive(Debug, Clone, PartialEq)]
pub struct DaqmxDescriptor {
    pub header: u32,
    pub chunk_size: u64,
    pub scalers: DaqmxScalers,
    pub raw_width_vector: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DaqmxScalers {
    FormatChanging(Vec<FormatChangingScaler>),
    DigitalLine(Vec<[u8; 17]>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormatChangingScaler {
    pub data_type: TdmsDataType,
    pub raw_buffer_index: u32,
    pub raw_byte_offset: u32,
    pub sample_format_bitmap: u32,
    pub scale_id: u32,
}

impl DaqmxDescriptor {
    /// Total raw bytes this object contributes to a chunk - the only thing the
    /// chunk decoder needs to know about a DAQmx object, since its scalers are
    /// not interpreted.
    pub fn byte_span(&self) -> u64 {
        let row_width: u64 = self.raw_width_vector.iter().map(|w| *w as u64).sum();
        self.chunk_size * row_width
    }
}

/// Values staged for an object that have not yet been flushed to a segment.
#[derive(Debug, Clone, Default)]
pub enum PendingValues {
    #[default]
    None,
    /// Pre-encoded fixed-width bytes, plus how many values they represent.
    Numeric { bytes: Vec<u8>, count: u64 },
    Strings(Vec<String>),
}

impl PendingValues {
    pub fn is_empty(&self) -> bool {
        matches!(self, PendingValues::None)
    }

    pub fn value_count(&self) -> u64 {
        match self {
            PendingValues::None => 0,
            PendingValues::Numeric { count, .. } => *count,
            PendingValues::Strings(v) => v.len() as u64,
        }
    }
}

/// A single group/channel object the writer knows about: its accumulated
/// properties, its last-known raw-data descriptor, and anything staged for
/// the next `write_segment` call.
#[derive(Debug, Clone)]
pub struct TdmsObject {
    pub path: String,
    pub data_type: Option<TdmsDataType>,
    pub properties: IndexMap<String, (TdmsDataType, Value)>,
    pub descriptor: Option<RawDataDescriptor>,
    pub pending: PendingValues,
    /// Set by `set_property`, cleared once a flush has carried the change;
    /// lets the writer emit a `PropertiesOnly` entry for an object with no
    /// new values staged.
    pub dirty_properties: bool,
}

impl TdmsObject {
    fn new(path: String) -> Self {
        TdmsObject {
            path,
            data_type: None,
            properties: IndexMap::new(),
            descriptor: None,
            pending: PendingValues::None,
            dirty_properties: false,
        }
    }
}

/// The full set of objects (group, channel, and the root object) an
/// application has declared to a `Writer`, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct ObjectModel {
    pub objects: IndexMap<String, TdmsObject>,
}

impl ObjectModel {
    pub fn new() -> Self {
        ObjectModel::default()
    }

    /// Ensures `path` is known to the model, returning a mutable handle to it.
    /// Declaring an already-known object is a no-op beyond returning it.
    pub fn declare(&mut self, path: &str) -> &mut TdmsObject {
        self.objects
            .entry(path.to_string())
            .or_insert_with(|| TdmsObject::new(path.to_string()))
    }

    pub fn get(&self, path: &str) -> Option<&TdmsObject> {
        self.objects.get(path)
    }

    pub fn set_property(&mut self, path: &str, name: &str, data_type: TdmsDataType, value: Value) {
        let object = self.declare(path);
        object
            .properties
            .insert(name.to_string(), (data_type, value));
        object.dirty_properties = true;
    }

    pub fn set_data_type(&mut self, path: &str, data_type: TdmsDataType) {
        self.declare(path).data_type = Some(data_type);
    }

    /// Stages fixed-width numeric values (already encoded to bytes by the
    /// caller through `codec.rs`) for the next flush.
    pub fn append_values(&mut self, path: &str, bytes: Vec<u8>, count: u64) {
        let object = self.declare(path);
        match &mut object.pending {
            PendingValues::Numeric {
                bytes: existing,
                count: existing_count,
            } => {
                existing.extend(bytes);
                *existing_count += count;
            }
            PendingValues::None => {
                object.pending = PendingValues::Numeric { bytes, count };
            }
            PendingValues::Strings(_) => {
                object.pending = PendingValues::Numeric { bytes, count };
            }
        }
    }

    pub fn append_strings(&mut self, path: &str, values: Vec<String>) {
        let object = self.declare(path);
        match &mut object.pending {
            PendingValues::Strings(existing) => existing.extend(values),
            _ => object.pending = PendingValues::Strings(values),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_type::TdmsDataType;

    #[test]
    fn declare_is_idempotent() {
        let mut model = ObjectModel::new();
        model.declare("/'group'/'chan'");
        model.declare("/'group'/'chan'");
        assert_eq!(model.objects.len(), 1);
    }

    #[test]
    fn append_values_accumulates_count() {
        let mut model = ObjectModel::new();
        model.set_data_type("/'g'/'c'", TdmsDataType::I32(4));
        model.append_values("/'g'/'c'", vec![0, 0, 0, 1], 1);
        model.append_values("/'g'/'c'", vec![0, 0, 0, 2], 1);

        let obj = model.get("/'g'/'c'").unwrap();
        assert_eq!(obj.pending.value_count(), 2);
    }

    #[test]
    fn daqmx_byte_span_sums_row_width_times_chunk_size() {
        let d = DaqmxDescriptor {
            header: 0x1269,
            chunk_size: 10,
            scalers: DaqmxScalers::FormatChanging(vec![]),
            raw_width_vector: vec![2, 4],
        };
        assert_eq!(d.byte_span(), 60);
    }
}
