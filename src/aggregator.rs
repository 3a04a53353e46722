//! Grouping aggregation over a stream of tuples, in the tradition of
//! SimpleDB-lineage engines: a per-group running state merged tuple by
//! tuple, read out on demand by the Aggregate operator.

use crate::error::{DbError, Result};
use crate::fields::{FieldVal, IntField};
use crate::tuple::{Tuple, TupleDesc};
use crate::types::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOp {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

pub trait Aggregator {
    /// Folds one tuple into the running per-group state.
    fn merge(&mut self, tuple: &Tuple) -> Result<()>;
    /// Snapshots the current state as (group value?, aggregate) tuples,
    /// in first-seen group order.
    fn iterate(&self) -> Vec<Tuple>;
    fn get_tuple_desc(&self) -> TupleDesc;
}

struct RunningState {
    count: i64,
    sum: i64,
    min: i32,
    max: i32,
}

impl RunningState {
    fn new() -> Self {
        RunningState {
            count: 0,
            sum: 0,
            min: i32::MAX,
            max: i32::MIN,
        }
    }

    fn merge(&mut self, value: i32) {
        self.count += 1;
        self.sum += value as i64;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    fn value(&self, op: AggregateOp) -> i32 {
        match op {
            AggregateOp::Count => self.count as i32,
            AggregateOp::Sum => self.sum as i32,
            AggregateOp::Avg => {
                if self.count == 0 {
                    0
                } else {
                    (self.sum / self.count) as i32
                }
            }
            AggregateOp::Min => self.min,
            AggregateOp::Max => self.max,
        }
    }
}

/// Aggregates an integer-typed field, optionally grouped by another
/// field. `FieldVal` isn't hashable, so groups are kept in a small
/// first-seen-order vector rather than a map — fine at the group
/// cardinalities this engine is built for.
pub struct IntAggregator {
    group_field: Option<usize>,
    agg_field: usize,
    op: AggregateOp,
    groups: Vec<(Option<FieldVal>, RunningState)>,
}

impl IntAggregator {
    pub fn new(group_field: Option<usize>, agg_field: usize, op: AggregateOp) -> Self {
        IntAggregator {
            group_field,
            agg_field,
            op,
            groups: Vec::new(),
        }
    }

    fn group_key(&self, tuple: &Tuple) -> Result<Option<FieldVal>> {
        match self.group_field {
            Some(i) => Ok(Some(
                tuple
                    .get_field(i)
                    .cloned()
                    .ok_or_else(|| DbError::exception("missing group field"))?,
            )),
            None => Ok(None),
        }
    }

    fn state_for(&mut self, key: &Option<FieldVal>) -> &mut RunningState {
        if let Some(pos) = self.groups.iter().position(|(k, _)| k == key) {
            return &mut self.groups[pos].1;
        }
        self.groups.push((key.clone(), RunningState::new()));
        &mut self.groups.last_mut().unwrap().1
    }
}

impl Aggregator for IntAggregator {
    fn merge(&mut self, tuple: &Tuple) -> Result<()> {
        let key = self.group_key(tuple)?;
        let value = match tuple.get_field(self.agg_field) {
            Some(FieldVal::IntField(f)) => f.get_value(),
            _ => return Err(DbError::exception("aggregate field is not an integer")),
        };
        self.state_for(&key).merge(value);
        Ok(())
    }

    fn iterate(&self) -> Vec<Tuple> {
        let td = self.get_tuple_desc();
        self.groups
            .iter()
            .map(|(key, state)| {
                let mut fields = Vec::new();
                if let Some(k) = key {
                    fields.push(k.clone());
                }
                fields.push(FieldVal::IntField(IntField::new(state.value(self.op))));
                Tuple::new(fields, &td)
            })
            .collect()
    }

    fn get_tuple_desc(&self) -> TupleDesc {
        if self.group_field.is_some() {
            TupleDesc::new(
                vec![Type::IntType, Type::IntType],
                vec!["group".to_string(), "aggregate".to_string()],
            )
        } else {
            TupleDesc::new(vec![Type::IntType], vec!["aggregate".to_string()])
        }
    }
}

/// Aggregates a string-typed field; only COUNT is meaningful over
/// strings, matching the SimpleDB-lineage restriction.
pub struct StringAggregator {
    group_field: Option<usize>,
    agg_field: usize,
    groups: Vec<(Option<FieldVal>, i64)>,
}

impl StringAggregator {
    pub fn new(group_field: Option<usize>, agg_field: usize, op: AggregateOp) -> Result<Self> {
        if op != AggregateOp::Count {
            return Err(DbError::exception(
                "only COUNT is supported over string fields",
            ));
        }
        Ok(StringAggregator {
            group_field,
            agg_field,
            groups: Vec::new(),
        })
    }

    fn group_key(&self, tuple: &Tuple) -> Result<Option<FieldVal>> {
        match self.group_field {
            Some(i) => Ok(Some(
                tuple
                    .get_field(i)
                    .cloned()
                    .ok_or_else(|| DbError::exception("missing group field"))?,
            )),
            None => Ok(None),
        }
    }
}

impl Aggregator for StringAggregator {
    fn merge(&mut self, tuple: &Tuple) -> Result<()> {
        if !matches!(
            tuple.get_field(self.agg_field),
            Some(FieldVal::StringField(_))
        ) {
            return Err(DbError::exception("aggregate field is not a string"));
        }
        let key = self.group_key(tuple)?;
        match self.groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, count)) => *count += 1,
            None => self.groups.push((key, 1)),
        }
        Ok(())
    }

    fn iterate(&self) -> Vec<Tuple> {
        let td = self.get_tuple_desc();
        self.groups
            .iter()
            .map(|(key, count)| {
                let mut fields = Vec::new();
                if let Some(k) = key {
                    fields.push(k.clone());
                }
                fields.push(FieldVal::IntField(IntField::new(*count as i32)));
                Tuple::new(fields, &td)
            })
            .collect()
    }

    fn get_tuple_desc(&self) -> TupleDesc {
        if self.group_field.is_some() {
            TupleDesc::new(
                vec![Type::StringType(0), Type::IntType],
                vec!["group".to_string(), "aggregate".to_string()],
            )
        } else {
            TupleDesc::new(vec![Type::IntType], vec!["aggregate".to_string()])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::IntField;
    use crate::tuple::TupleDesc;

    fn td() -> TupleDesc {
        TupleDesc::new(
            vec![Type::IntType, Type::IntType],
            vec!["group".to_string(), "value".to_string()],
        )
    }

    #[test]
    fn sum_without_grouping() {
        let mut agg = IntAggregator::new(None, 1, AggregateOp::Sum);
        for v in [1, 2, 3] {
            let t = Tuple::new(
                vec![
                    FieldVal::IntField(IntField::new(0)),
                    FieldVal::IntField(IntField::new(v)),
                ],
                &td(),
            );
            agg.merge(&t).unwrap();
        }
        let out = agg.iterate();
        assert_eq!(out.len(), 1);
        assert_eq!(
            out[0].get_field(0).unwrap().clone().into_int().unwrap().get_value(),
            6
        );
    }

    #[test]
    fn grouped_count_tracks_group_order() {
        let mut agg = IntAggregator::new(Some(0), 1, AggregateOp::Count);
        for (g, v) in [(0, 1), (1, 2), (0, 3)] {
            let t = Tuple::new(
                vec![
                    FieldVal::IntField(IntField::new(g)),
                    FieldVal::IntField(IntField::new(v)),
                ],
                &td(),
            );
            agg.merge(&t).unwrap();
        }
        let out = agg.iterate();
        assert_eq!(out.len(), 2);
        assert_eq!(
            out[0].get_field(1).unwrap().clone().into_int().unwrap().get_value(),
            2
        );
        assert_eq!(
            out[1].get_field(1).unwrap().clone().into_int().unwrap().get_value(),
            1
        );
    }

    #[test]
    fn string_aggregator_rejects_non_count() {
        assert!(StringAggregator::new(None, 0, AggregateOp::Sum).is_err());
    }
}
