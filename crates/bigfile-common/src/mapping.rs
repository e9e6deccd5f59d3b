//! Declarative byte-to-record mapping.
//!
//! A [`Schema`] is an ordered list of [`Field`]s, each naming a byte range
//! and how to interpret it. Applying a schema to a byte slice yields a
//! [`Record`] of typed [`Value`]s; applying it to a byte table yields one
//! record per fixed-stride row. [`encode_record`] is the inverse and is
//! used when tables are regenerated.
//!
//! # Example
//!
//! ```
//! use bigfile_common::mapping::{read_record, Field, Schema};
//! use bigfile_common::Endian;
//!
//! static ENTRY: Schema = Schema::new(&[
//!     Field::uint("size", 0, 4),
//!     Field::str("name", 4, 8),
//! ]);
//!
//! let bytes = b"\x10\x00\x00\x00data.bin";
//! let record = read_record(bytes, &ENTRY, Endian::Little)?;
//! assert_eq!(record.uint("size")?, 16);
//! assert_eq!(record.str("name")?, "data.bin");
//! # Ok::<(), bigfile_common::Error>(())
//! ```

use crate::reader::{BinaryReader, Endian};
use crate::{Error, Result};

/// How a field's bytes are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Fixed-width, null-padded, single-byte-charset text.
    Str,
    /// Unsigned integer in the record's byte order.
    UInt,
    /// Sign-extended integer in the record's byte order.
    Int,
    /// Opaque bytes rendered as lowercase hex.
    Hex,
}

/// One named byte range within a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub position: usize,
    pub length: usize,
    pub kind: FieldKind,
}

impl Field {
    /// Default field length in bytes.
    pub const DEFAULT_LENGTH: usize = 4;

    /// A 4-byte field of the given kind.
    pub const fn new(name: &'static str, position: usize, kind: FieldKind) -> Self {
        Self {
            name,
            position,
            length: Self::DEFAULT_LENGTH,
            kind,
        }
    }

    /// A fixed-width string field.
    pub const fn str(name: &'static str, position: usize, length: usize) -> Self {
        Self {
            name,
            position,
            length,
            kind: FieldKind::Str,
        }
    }

    /// An unsigned integer field of 1..=8 bytes.
    pub const fn uint(name: &'static str, position: usize, length: usize) -> Self {
        assert!(length >= 1 && length <= 8, "integer width must be 1..=8");
        Self {
            name,
            position,
            length,
            kind: FieldKind::UInt,
        }
    }

    /// A signed integer field of 1..=8 bytes.
    pub const fn int(name: &'static str, position: usize, length: usize) -> Self {
        assert!(length >= 1 && length <= 8, "integer width must be 1..=8");
        Self {
            name,
            position,
            length,
            kind: FieldKind::Int,
        }
    }

    /// An opaque byte field.
    pub const fn hex(name: &'static str, position: usize, length: usize) -> Self {
        Self {
            name,
            position,
            length,
            kind: FieldKind::Hex,
        }
    }

    /// One past the last byte this field covers.
    #[inline]
    pub const fn end(&self) -> usize {
        self.position + self.length
    }
}

/// An ordered set of fields describing one fixed-size record.
#[derive(Debug, Clone, Copy)]
pub struct Schema {
    fields: &'static [Field],
}

impl Schema {
    pub const fn new(fields: &'static [Field]) -> Self {
        Self { fields }
    }

    #[inline]
    pub const fn fields(&self) -> &'static [Field] {
        self.fields
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&'static Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Byte length of a record: the furthest end of any field.
    ///
    /// This is also the row stride when the schema maps a table.
    pub const fn byte_len(&self) -> usize {
        let mut len = 0;
        let mut i = 0;
        while i < self.fields.len() {
            let end = self.fields[i].end();
            if end > len {
                len = end;
            }
            i += 1;
        }
        len
    }
}

/// A decoded field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Str(String),
    UInt(u64),
    Int(i64),
    Hex(String),
}

fn kind_name(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::Str => "a string",
        FieldKind::UInt => "an unsigned integer",
        FieldKind::Int => "a signed integer",
        FieldKind::Hex => "a hex string",
    }
}

/// A decoded record: field values in schema order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    values: Vec<(&'static str, Value)>,
    empty: bool,
}

impl Record {
    /// An empty record, to be filled with [`Record::with`] before encoding.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field value, replacing any previous one.
    pub fn with(mut self, name: &'static str, value: Value) -> Self {
        self.set(name, value);
        self
    }

    /// Set a field value, replacing any previous one.
    pub fn set(&mut self, name: &'static str, value: Value) {
        match self.values.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.values.push((name, value)),
        }
    }

    /// Whether every byte the record was decoded from was zero.
    ///
    /// Placeholder slots in over-allocated tables read back like this.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Value)> + '_ {
        self.values.iter().map(|(n, v)| (*n, v))
    }

    fn require(&self, name: &str) -> Result<&Value> {
        self.get(name)
            .ok_or_else(|| Error::MissingField(name.to_string()))
    }

    pub fn str(&self, name: &str) -> Result<&str> {
        match self.require(name)? {
            Value::Str(s) => Ok(s),
            _ => Err(field_type(name, kind_name(FieldKind::Str))),
        }
    }

    pub fn uint(&self, name: &str) -> Result<u64> {
        match self.require(name)? {
            Value::UInt(v) => Ok(*v),
            _ => Err(field_type(name, kind_name(FieldKind::UInt))),
        }
    }

    pub fn int(&self, name: &str) -> Result<i64> {
        match self.require(name)? {
            Value::Int(v) => Ok(*v),
            _ => Err(field_type(name, kind_name(FieldKind::Int))),
        }
    }

    pub fn hex(&self, name: &str) -> Result<&str> {
        match self.require(name)? {
            Value::Hex(s) => Ok(s),
            _ => Err(field_type(name, kind_name(FieldKind::Hex))),
        }
    }
}

fn field_type(name: &str, expected: &'static str) -> Error {
    Error::FieldType {
        field: name.to_string(),
        expected,
    }
}

/// Apply `schema` to the start of `bytes`.
///
/// A field reaching past the slice is an [`Error::OutOfRange`]: callers are
/// expected to size their reads from the schema before decoding.
pub fn read_record(bytes: &[u8], schema: &Schema, endian: Endian) -> Result<Record> {
    let mut values = Vec::with_capacity(schema.fields().len());

    for field in schema.fields() {
        if field.end() > bytes.len() {
            return Err(Error::OutOfRange {
                context: format!("field {}", field.name),
                end: field.end(),
                available: bytes.len(),
            });
        }

        let mut reader = BinaryReader::new_at(bytes, field.position, endian);
        let value = match field.kind {
            FieldKind::Str => Value::Str(reader.read_fixed_str(field.length)?),
            FieldKind::UInt => Value::UInt(reader.read_uint(field.length)?),
            FieldKind::Int => Value::Int(reader.read_int(field.length)?),
            FieldKind::Hex => Value::Hex(hex::encode(reader.read_bytes(field.length)?)),
        };
        values.push((field.name, value));
    }

    let len = schema.byte_len().min(bytes.len());
    Ok(Record {
        values,
        empty: bytes[..len].iter().all(|&b| b == 0),
    })
}

/// Split `bytes` into rows of `row_stride` bytes and decode each one.
///
/// A trailing partial row is ignored.
pub fn read_table(
    bytes: &[u8],
    schema: &Schema,
    row_stride: usize,
    endian: Endian,
) -> Result<Vec<Record>> {
    check_stride(schema, row_stride)?;

    bytes
        .chunks_exact(row_stride)
        .map(|row| read_record(row, schema, endian))
        .collect()
}

/// Encode `record` into a fresh buffer of `schema.byte_len()` bytes.
///
/// Bytes not covered by any field are zero. Every schema field must be
/// present in the record with a value of the matching kind.
pub fn encode_record(record: &Record, schema: &Schema, endian: Endian) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; schema.byte_len()];
    encode_into(&mut buf, record, schema, endian)?;
    Ok(buf)
}

/// Encode `records` as a table of `rows` rows, each `row_stride` bytes.
///
/// Rows past the end of `records` are left zeroed.
pub fn encode_table(
    records: &[Record],
    schema: &Schema,
    row_stride: usize,
    rows: usize,
    endian: Endian,
) -> Result<Vec<u8>> {
    check_stride(schema, row_stride)?;
    if records.len() > rows {
        return Err(Error::OutOfRange {
            context: "table capacity".to_string(),
            end: records.len(),
            available: rows,
        });
    }

    let mut buf = vec![0u8; row_stride * rows];
    for (record, row) in records.iter().zip(buf.chunks_exact_mut(row_stride)) {
        encode_into(row, record, schema, endian)?;
    }
    Ok(buf)
}

fn check_stride(schema: &Schema, row_stride: usize) -> Result<()> {
    if row_stride == 0 || row_stride < schema.byte_len() {
        return Err(Error::OutOfRange {
            context: "table row".to_string(),
            end: schema.byte_len(),
            available: row_stride,
        });
    }
    Ok(())
}

fn encode_into(buf: &mut [u8], record: &Record, schema: &Schema, endian: Endian) -> Result<()> {
    for field in schema.fields() {
        let value = record.require(field.name)?;
        let slot = &mut buf[field.position..field.end()];
        let encoding = |reason: String| Error::Encoding {
            field: field.name.to_string(),
            reason,
        };

        match (field.kind, value) {
            (FieldKind::Str, Value::Str(s)) => {
                let bytes = s
                    .chars()
                    .map(|c| u8::try_from(u32::from(c)))
                    .collect::<std::result::Result<Vec<u8>, _>>()
                    .map_err(|_| encoding(format!("{s:?} is not single-byte text")))?;
                if bytes.len() > field.length {
                    return Err(encoding(format!(
                        "{} bytes do not fit in {}",
                        bytes.len(),
                        field.length
                    )));
                }
                slot[..bytes.len()].copy_from_slice(&bytes);
                slot[bytes.len()..].fill(0);
            }
            (FieldKind::UInt, Value::UInt(v)) => {
                let bits = field.length * 8;
                if bits < 64 && *v >> bits != 0 {
                    return Err(encoding(format!("{v} does not fit in {bits} bits")));
                }
                endian.write_uint(slot, *v, field.length);
            }
            (FieldKind::Int, Value::Int(v)) => {
                let bits = field.length * 8;
                if bits < 64 {
                    let min = -(1i64 << (bits - 1));
                    let max = (1i64 << (bits - 1)) - 1;
                    if *v < min || *v > max {
                        return Err(encoding(format!("{v} does not fit in {bits} bits")));
                    }
                }
                endian.write_int(slot, *v, field.length);
            }
            (FieldKind::Hex, Value::Hex(s)) => {
                let bytes = hex::decode(s)?;
                if bytes.len() != field.length {
                    return Err(encoding(format!(
                        "{} bytes given for a {}-byte field",
                        bytes.len(),
                        field.length
                    )));
                }
                slot.copy_from_slice(&bytes);
            }
            (kind, _) => return Err(field_type(field.name, kind_name(kind))),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    static SAMPLE: Schema = Schema::new(&[
        Field::uint("size", 0, 4),
        Field::int("delta", 4, 2),
        Field::hex("opaque", 6, 2),
        Field::str("name", 8, 8),
    ]);

    static DEFAULT_WIDTH: Schema = Schema::new(&[Field::new("a", 10, FieldKind::UInt)]);

    #[test]
    fn test_schema_byte_len() {
        assert_eq!(SAMPLE.byte_len(), 16);
        assert_eq!(DEFAULT_WIDTH.byte_len(), 14);
    }

    #[test]
    fn test_read_record_little_endian() {
        let bytes = b"\x2a\x00\x00\x00\xfe\xff\xbe\xefSound\0\0\0";
        let record = read_record(bytes, &SAMPLE, Endian::Little).unwrap();

        assert_eq!(record.uint("size").unwrap(), 42);
        assert_eq!(record.int("delta").unwrap(), -2);
        assert_eq!(record.hex("opaque").unwrap(), "beef");
        assert_eq!(record.str("name").unwrap(), "Sound");
        assert!(!record.is_empty());
    }

    #[test]
    fn test_read_record_big_endian() {
        let bytes = b"\x00\x00\x00\x2a\xff\xfe\x00\x01abcdefgh";
        let record = read_record(bytes, &SAMPLE, Endian::Big).unwrap();

        assert_eq!(record.uint("size").unwrap(), 42);
        assert_eq!(record.int("delta").unwrap(), -2);
        assert_eq!(record.str("name").unwrap(), "abcdefgh");
    }

    #[test]
    fn test_zero_record_is_empty() {
        let record = read_record(&[0u8; 16], &SAMPLE, Endian::Little).unwrap();
        assert!(record.is_empty());
        assert_eq!(record.str("name").unwrap(), "");
    }

    #[test]
    fn test_short_slice_is_out_of_range() {
        let err = read_record(&[0u8; 12], &SAMPLE, Endian::Little).unwrap_err();
        assert!(matches!(err, Error::OutOfRange { end: 16, available: 12, .. }));
    }

    #[test]
    fn test_wrong_accessor_is_field_type_error() {
        let record = read_record(&[0u8; 16], &SAMPLE, Endian::Little).unwrap();
        assert!(matches!(record.int("size"), Err(Error::FieldType { .. })));
        assert!(matches!(record.uint("missing"), Err(Error::MissingField(_))));
    }

    #[test]
    fn test_read_table_rows() {
        let mut bytes = vec![0u8; 20 * 3 + 5];
        bytes[0] = 1;
        bytes[40] = 3;
        let rows = read_table(&bytes, &SAMPLE, 20, Endian::Little).unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].uint("size").unwrap(), 1);
        assert!(rows[1].is_empty());
        assert_eq!(rows[2].uint("size").unwrap(), 3);
    }

    #[test]
    fn test_read_table_rejects_short_stride() {
        assert!(read_table(&[0u8; 32], &SAMPLE, 8, Endian::Little).is_err());
        assert!(read_table(&[0u8; 32], &SAMPLE, 0, Endian::Little).is_err());
    }

    #[test]
    fn test_encode_matches_source_bytes() {
        let bytes = b"\x00\x00\x01\x00\xfe\xff\x12\x34Bin\0\0\0\0\0";
        let record = read_record(bytes, &SAMPLE, Endian::Big).unwrap();
        assert_eq!(encode_record(&record, &SAMPLE, Endian::Big).unwrap(), bytes);
    }

    #[test]
    fn test_encode_rejects_overflow() {
        let record = Record::new()
            .with("size", Value::UInt(1))
            .with("delta", Value::Int(40000))
            .with("opaque", Value::Hex("0000".into()))
            .with("name", Value::Str("x".into()));
        assert!(matches!(
            encode_record(&record, &SAMPLE, Endian::Little),
            Err(Error::Encoding { .. })
        ));

        let record = record
            .with("delta", Value::Int(0))
            .with("name", Value::Str("too long name".into()));
        assert!(matches!(
            encode_record(&record, &SAMPLE, Endian::Little),
            Err(Error::Encoding { .. })
        ));
    }

    #[test]
    fn test_encode_table_pads_capacity() {
        let record = Record::new()
            .with("size", Value::UInt(7))
            .with("delta", Value::Int(-1))
            .with("opaque", Value::Hex("abcd".into()))
            .with("name", Value::Str("a".into()));
        let table = encode_table(&[record], &SAMPLE, 20, 3, Endian::Little).unwrap();

        assert_eq!(table.len(), 60);
        assert_eq!(&table[..4], &[7, 0, 0, 0]);
        assert!(table[20..].iter().all(|&b| b == 0));
    }
}
