//! A single group/channel object as exposed to callers of `TDMSFile`: its
//! full path, resolved data type, accumulated properties, and the values
//! decoded for it across every segment read so far. Holds decoded `Value`s
//! directly, built by `chunk::decode_segment`.

use crate::data_type::{TdmsDataType, Value};
use indexmap::IndexMap;

#[derive(Clone, Debug, Default)]
pub struct Channel {
    pub full_path: String,
    pub data_type: Option<TdmsDataType>,
    pub properties: IndexMap<String, (TdmsDataType, Value)>,
    pub(crate) values: Vec<Value>,
}

impl Channel {
    pub(crate) fn new(full_path: String) -> Self {
        Channel {
            full_path,
            data_type: None,
            properties: IndexMap::new(),
            values: Vec::new(),
        }
    }

    /// Number of values decoded for this channel so far.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The raw decoded values, in the order they were read.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// A typed iterator over this channel's values. Each item converts the
    /// decoded `Value` to `T`, surfacing a `TdmsError::TypeMismatch` if the
    /// channel's actual data type doesn't match what the caller asked for.
    pub fn iter<T>(&self) -> crate::channel_iter::ChannelDataIter<'_, T>
    where
        T: TryFrom<Value, Error = crate::TdmsError>,
    {
        crate::channel_iter::ChannelDataIter::new(&self.values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_channel_starts_empty() {
        let c = Channel::new("/'g'/'c'".to_string());
        assert_eq!(c.len(), 0);
        assert!(c.is_empty());
    }
}
