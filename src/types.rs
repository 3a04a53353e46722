use crate::error::{DbError, Result};
use crate::fields::{FieldVal, IntField, StringField};

/// Width used for a `String` field declared without an explicit length
/// in a schema file (kept for schema files written against the older,
/// single-width string type).
pub const DEFAULT_STRING_LEN: usize = 256;

/// A field's on-disk type. Only fixed-width integers and fixed-length
/// strings are supported, matching the record layout in the spec.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Type {
    IntType,
    /// Fixed-length string of N bytes (the payload capacity, not
    /// counting the 4-byte length prefix).
    StringType(usize),
}

impl Type {
    // Get the size of the type in bytes
    pub fn get_len(&self) -> usize {
        match self {
            // 4 bytes ints
            Type::IntType => 4,
            // 4 bytes for length + N bytes for string
            Type::StringType(n) => n + 4,
        }
    }

    // Parse bytes into a FieldVal
    pub fn parse(&self, bytes: &[u8]) -> Result<FieldVal> {
        match self {
            Type::IntType => {
                if bytes.len() < 4 {
                    return Err(DbError::exception("truncated int field"));
                }
                let mut int_bytes = [0; 4];
                int_bytes.copy_from_slice(&bytes[..4]);
                Ok(FieldVal::IntField(IntField::new(i32::from_be_bytes(
                    int_bytes,
                ))))
            }
            Type::StringType(n) => {
                if bytes.len() < 4 + n {
                    return Err(DbError::exception("truncated string field"));
                }
                let mut len_bytes = [0; 4];
                len_bytes.copy_from_slice(&bytes[..4]);
                let len = (u32::from_be_bytes(len_bytes) as usize).min(*n);
                let string_bytes = &bytes[4..4 + len];
                let value = String::from_utf8_lossy(string_bytes).into_owned();
                Ok(FieldVal::StringField(StringField::new(value, *n)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_round_trips_through_parse() {
        let bytes = 42i32.to_be_bytes();
        let field = Type::IntType.parse(&bytes).unwrap();
        assert_eq!(field.into_int().unwrap().get_value(), 42);
    }

    #[test]
    fn string_parse_respects_declared_length() {
        let ty = Type::StringType(8);
        let mut bytes = vec![0u8; ty.get_len()];
        bytes[3] = 5; // length prefix = 5
        bytes[4..9].copy_from_slice(b"hello");
        let field = ty.parse(&bytes).unwrap();
        assert_eq!(field.into_string().unwrap().get_value(), "hello");
    }
}
