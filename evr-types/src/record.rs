//! Facade over the record roles the engines consume.
//!
//! The records runtime itself lives outside this workspace; these types carry
//! exactly the fields a device operation may touch: the alarm latch, the
//! record timestamp, and (for array roles) the runtime-typed payload.

use crate::{
    alarm::{Alarm, Condition},
    TimeStamp,
};

/// Fields common to every record the engines touch.
#[derive(Debug, Default)]
pub struct Record {
    pub name: String,
    pub alarm: Alarm,
    pub time: TimeStamp,
}

impl Record {
    pub fn new(name: impl Into<String>) -> Self {
        Record {
            name: name.into(),
            ..Record::default()
        }
    }

    /// Raise `err` on this record and hand it back to the caller.
    pub fn reject<T, E: Condition>(&mut self, err: E) -> Result<T, E> {
        self.alarm.raise(err.stat(), err.severity(), &err);
        Err(err)
    }
}

/// Long-integer record role (event counters).
#[derive(Debug, Default)]
pub struct LongRecord {
    pub record: Record,
    pub val: i32,
}

impl LongRecord {
    pub fn new(name: impl Into<String>) -> Self {
        LongRecord {
            record: Record::new(name),
            val: 0,
        }
    }
}

/// Array field payload.
///
/// The records database types array fields at runtime, so the element type is
/// data rather than a type parameter; engines reject a mismatch with
/// "Bad FTVL".
#[derive(Debug)]
pub enum ArrayValue {
    U32(Vec<u32>),
    F64(Vec<f64>),
}

impl ArrayValue {
    /// Declared element capacity of the field.
    pub fn len(&self) -> usize {
        match self {
            ArrayValue::U32(v) => v.len(),
            ArrayValue::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_u32(&self) -> Option<&[u32]> {
        match self {
            ArrayValue::U32(v) => Some(v),
            ArrayValue::F64(_) => None,
        }
    }

    pub fn as_u32_mut(&mut self) -> Option<&mut [u32]> {
        match self {
            ArrayValue::U32(v) => Some(v),
            ArrayValue::F64(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<&[f64]> {
        match self {
            ArrayValue::F64(v) => Some(v),
            ArrayValue::U32(_) => None,
        }
    }

    pub fn as_f64_mut(&mut self) -> Option<&mut [f64]> {
        match self {
            ArrayValue::F64(v) => Some(v),
            ArrayValue::U32(_) => None,
        }
    }
}

/// Array record role. `value.len()` is the declared capacity; `nord` counts
/// the valid leading elements.
#[derive(Debug)]
pub struct ArrayRecord {
    pub record: Record,
    pub value: ArrayValue,
    pub nord: usize,
}

impl ArrayRecord {
    pub fn u32(name: impl Into<String>, nelm: usize) -> Self {
        ArrayRecord {
            record: Record::new(name),
            value: ArrayValue::U32(vec![0; nelm]),
            nord: 0,
        }
    }

    pub fn f64(name: impl Into<String>, nelm: usize) -> Self {
        ArrayRecord {
            record: Record::new(name),
            value: ArrayValue::F64(vec![0.0; nelm]),
            nord: 0,
        }
    }

    pub fn nelm(&self) -> usize {
        self.value.len()
    }
}
