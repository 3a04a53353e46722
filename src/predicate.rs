use crate::fields::FieldVal;
use crate::tuple::Tuple;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    GreaterThanOrEq,
    LessThanOrEq,
}

impl Op {
    fn holds(&self, lhs: &FieldVal, rhs: &FieldVal) -> bool {
        match self {
            Op::Equals => lhs == rhs,
            Op::NotEquals => lhs != rhs,
            Op::GreaterThan => compare(lhs, rhs) == Some(std::cmp::Ordering::Greater),
            Op::LessThan => compare(lhs, rhs) == Some(std::cmp::Ordering::Less),
            Op::GreaterThanOrEq => matches!(
                compare(lhs, rhs),
                Some(std::cmp::Ordering::Greater) | Some(std::cmp::Ordering::Equal)
            ),
            Op::LessThanOrEq => matches!(
                compare(lhs, rhs),
                Some(std::cmp::Ordering::Less) | Some(std::cmp::Ordering::Equal)
            ),
        }
    }
}

fn compare(lhs: &FieldVal, rhs: &FieldVal) -> Option<std::cmp::Ordering> {
    match (lhs, rhs) {
        (FieldVal::IntField(a), FieldVal::IntField(b)) => Some(a.get_value().cmp(&b.get_value())),
        (FieldVal::StringField(a), FieldVal::StringField(b)) => {
            Some(a.get_value().cmp(&b.get_value()))
        }
        _ => None,
    }
}

/// A single-field comparison against a fixed operand, applied to the
/// field at `field_index` in every tuple a Filter operator sees.
#[derive(Debug, Clone)]
pub struct Predicate {
    field_index: usize,
    op: Op,
    operand: FieldVal,
}

impl Predicate {
    pub fn new(field_index: usize, op: Op, operand: FieldVal) -> Self {
        Predicate {
            field_index,
            op,
            operand,
        }
    }

    pub fn filter(&self, tuple: &Tuple) -> bool {
        match tuple.get_field(self.field_index) {
            Some(field) => self.op.holds(field, &self.operand),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::IntField;
    use crate::tuple::{Tuple, TupleDesc};
    use crate::types::Type;

    fn td() -> TupleDesc {
        TupleDesc::new(vec![Type::IntType], vec!["a".to_string()])
    }

    #[test]
    fn greater_than_matches_expected_rows() {
        let pred = Predicate::new(0, Op::GreaterThan, FieldVal::IntField(IntField::new(5)));
        let low = Tuple::new(vec![FieldVal::IntField(IntField::new(3))], &td());
        let high = Tuple::new(vec![FieldVal::IntField(IntField::new(9))], &td());
        assert!(!pred.filter(&low));
        assert!(pred.filter(&high));
    }

    #[test]
    fn equals_on_strings() {
        use crate::fields::StringField;
        let sd = TupleDesc::new(vec![Type::StringType(8)], vec!["name".to_string()]);
        let pred = Predicate::new(
            0,
            Op::Equals,
            FieldVal::StringField(StringField::new("abc".to_string(), 8)),
        );
        let t = Tuple::new(
            vec![FieldVal::StringField(StringField::new(
                "abc".to_string(),
                8,
            ))],
            &sd,
        );
        assert!(pred.filter(&t));
    }
}
