//! Leaf values and cell contents

use std::fmt;
use std::sync::Arc;

/// A typed leaf value.
///
/// Values carry no kind information beyond their shape; the owning cell's
/// [`LeafKind`](crate::LeafKind) decides whether a value is acceptable.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Value {
    Bool(bool),
    Int(i64),
    /// Index into an enumeration's variant list
    Enum(u32),
    /// Fixed-width bit vector, `bits` holds the low `width` bits
    Bits { width: u8, bits: u64 },
    /// Ordered sequence of values
    Seq(Arc<[Value]>),
}

impl Value {
    pub fn bits(width: u8, bits: u64) -> Self {
        Value::Bits { width, bits }
    }

    pub fn seq(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Seq(items.into_iter().collect::<Vec<_>>().into())
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<u32> {
        match self {
            Value::Enum(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bits(&self) -> Option<u64> {
        match self {
            Value::Bits { bits, .. } => Some(*bits),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&[Value]> {
        match self {
            Value::Seq(items) => Some(items),
            _ => None,
        }
    }

    /// Short shape name used in cast diagnostics
    pub fn shape(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Enum(_) => "enum",
            Value::Bits { .. } => "bits",
            Value::Seq(_) => "seq",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(v) => write!(f, "{}", v),
            Value::Enum(i) => write!(f, "#{}", i),
            Value::Bits { width, bits } => write!(f, "{}'h{:x}", width, bits),
            Value::Seq(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Int(v as i64)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Seq(items.into())
    }
}

/// Contents of a cell: either a value or the distinguished Undefined marker
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum CellValue {
    #[default]
    Undefined,
    Defined(Value),
}

impl CellValue {
    pub fn is_defined(&self) -> bool {
        matches!(self, CellValue::Defined(_))
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            CellValue::Defined(v) => Some(v),
            CellValue::Undefined => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Undefined => write!(f, "UnDefined"),
            CellValue::Defined(v) => write!(f, "{}", v),
        }
    }
}

impl From<Value> for CellValue {
    fn from(v: Value) -> Self {
        CellValue::Defined(v)
    }
}

impl From<Option<Value>> for CellValue {
    fn from(v: Option<Value>) -> Self {
        match v {
            Some(v) => CellValue::Defined(v),
            None => CellValue::Undefined,
        }
    }
}
