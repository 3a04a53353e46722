use crate::types::Type;

// Wrapper for different types of fields
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum FieldVal {
    IntField(IntField),
    StringField(StringField),
}

impl FieldVal {
    // Extracts the inner IntField
    pub fn into_int(self) -> Option<IntField> {
        match self {
            FieldVal::IntField(int_field) => Some(int_field),
            _ => None,
        }
    }
    // Extracts the inner StringField
    pub fn into_string(self) -> Option<StringField> {
        match self {
            FieldVal::StringField(string_field) => Some(string_field),
            _ => None,
        }
    }

    pub fn get_type(&self) -> Type {
        match self {
            FieldVal::IntField(f) => f.get_type(),
            FieldVal::StringField(f) => f.get_type(),
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        match self {
            FieldVal::IntField(f) => f.serialize(),
            FieldVal::StringField(f) => f.serialize(),
        }
    }
}

// Trait for different types of fields
pub trait Field {
    // Get the type of the field
    fn get_type(&self) -> Type;
    // Serialize the field into bytes
    fn serialize(&self) -> Vec<u8>;
}

#[derive(Debug, PartialEq, Eq, Clone, PartialOrd, Ord)]
pub struct IntField {
    value: i32,
}

impl IntField {
    pub fn new(value: i32) -> Self {
        IntField { value }
    }
    pub fn get_value(&self) -> i32 {
        self.value
    }
}

impl Field for IntField {
    fn get_type(&self) -> Type {
        Type::IntType
    }
    fn serialize(&self) -> Vec<u8> {
        self.value.to_be_bytes().to_vec()
    }
}

/// A fixed-capacity string value: `capacity` is the on-disk payload
/// width (the N in `StringType(N)`), independent of the live value's
/// byte length, which is clamped to `capacity` on construction.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct StringField {
    value: String,
    capacity: usize,
}

impl StringField {
    pub fn new(value: String, capacity: usize) -> Self {
        let value = if value.len() > capacity {
            // truncate on a char boundary so we never split a code point
            let mut end = capacity;
            while end > 0 && !value.is_char_boundary(end) {
                end -= 1;
            }
            value[..end].to_string()
        } else {
            value
        };
        StringField { value, capacity }
    }

    pub fn get_value(&self) -> String {
        self.value.clone()
    }
}

impl Field for StringField {
    fn get_type(&self) -> Type {
        Type::StringType(self.capacity)
    }

    fn serialize(&self) -> Vec<u8> {
        let mut bytes = vec![0; self.capacity + 4];
        let str_bytes = self.value.as_bytes();
        let copy_len = std::cmp::min(str_bytes.len(), self.capacity);
        bytes[0..4].copy_from_slice(&(copy_len as u32).to_be_bytes());
        bytes[4..4 + copy_len].copy_from_slice(&str_bytes[..copy_len]);
        bytes
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_int_field() {
        let int_field = IntField::new(1);
        assert_eq!(int_field.get_type(), Type::IntType);
        assert_eq!(int_field.serialize(), vec![0, 0, 0, 1]);
    }

    #[test]
    fn test_string_field() {
        let string_field = StringField::new("hello".to_string(), 256);
        assert_eq!(string_field.get_type(), Type::StringType(256));
        let mut serialized = vec![0; 256 + 4];
        serialized[3] = 5;
        serialized[4..9].copy_from_slice("hello".as_bytes());

        assert_eq!(string_field.serialize(), serialized);
    }

    #[test]
    fn string_field_truncates_to_capacity() {
        let string_field = StringField::new("hello world".to_string(), 5);
        assert_eq!(string_field.get_value(), "hello");
    }
}
