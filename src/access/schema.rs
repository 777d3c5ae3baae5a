use std::mem::size_of;

/// Data types an attribute can hold.
///
/// The discriminants are what the metadata page stores, so they must not
/// be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Int = 0,
    String = 1,
    Float = 2,
    Bool = 3,
}

impl DataType {
    /// On-disk code of the data type.
    pub(crate) fn code(self) -> i32 {
        self as i32
    }

    /// Decode an on-disk data type code.
    pub(crate) fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(DataType::Int),
            1 => Some(DataType::String),
            2 => Some(DataType::Float),
            3 => Some(DataType::Bool),
            _ => None,
        }
    }
}

/// A single column of a table schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    /// The column name. The metadata page stores at most 14 bytes of it.
    pub name: String,

    /// The column data type.
    pub data_type: DataType,

    /// Declared byte length; only meaningful for string attributes.
    pub type_length: usize,
}

impl Attribute {
    pub fn new(name: &str, data_type: DataType, type_length: usize) -> Self {
        Self {
            name: name.to_string(),
            data_type,
            type_length,
        }
    }

    /// Number of payload bytes the attribute occupies inside a record.
    pub fn byte_width(&self) -> usize {
        match self.data_type {
            DataType::Int => size_of::<i32>(),
            DataType::Float => size_of::<f32>(),
            DataType::Bool => 1,
            DataType::String => self.type_length,
        }
    }
}

/// Describes the structure of records: the ordered columns of a table and,
/// optionally, which of them form the key.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    /// Columns of the table, in record layout order.
    pub attrs: Vec<Attribute>,

    /// Positions of the key attributes, if any were declared.
    pub key_attrs: Option<Vec<usize>>,
}

impl Schema {
    pub fn new(attrs: Vec<Attribute>) -> Self {
        Self {
            attrs,
            key_attrs: None,
        }
    }

    pub fn with_keys(attrs: Vec<Attribute>, key_attrs: Vec<usize>) -> Self {
        Self {
            attrs,
            key_attrs: Some(key_attrs),
        }
    }

    /// Total slot size of a record laid out by this schema: one tombstone
    /// byte plus the packed attribute widths.
    pub fn record_size(&self) -> usize {
        1 + self.attrs.iter().map(Attribute::byte_width).sum::<usize>()
    }

    /// Byte offset of an attribute inside a record buffer, counted from the
    /// start of the slot (so the tombstone byte is already skipped).
    pub fn attr_offset(&self, attnum: usize) -> usize {
        1 + self.attrs[..attnum]
            .iter()
            .map(Attribute::byte_width)
            .sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_schema() -> Schema {
        Schema::new(vec![
            Attribute::new("a", DataType::Int, 0),
            Attribute::new("b", DataType::String, 4),
            Attribute::new("c", DataType::Float, 0),
            Attribute::new("d", DataType::Bool, 0),
        ])
    }

    #[test]
    fn test_record_size_counts_tombstone() {
        // 1 tombstone + 4 int + 4 string + 4 float + 1 bool.
        assert_eq!(14, sample_schema().record_size());
    }

    #[test]
    fn test_attr_offsets_are_prefix_sums() {
        let schema = sample_schema();
        assert_eq!(1, schema.attr_offset(0));
        assert_eq!(5, schema.attr_offset(1));
        assert_eq!(9, schema.attr_offset(2));
        assert_eq!(13, schema.attr_offset(3));
    }

    #[test]
    fn test_data_type_codes_round_trip() {
        for dt in [DataType::Int, DataType::String, DataType::Float, DataType::Bool] {
            assert_eq!(Some(dt), DataType::from_code(dt.code()));
        }
        assert_eq!(None, DataType::from_code(9));
    }
}
