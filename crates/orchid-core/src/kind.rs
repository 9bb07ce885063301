//! Leaf kinds
//!
//! A `LeafKind` is resolved once when a cell is declared and carries the
//! whole contract the kernel needs from a leaf type: cast/validate, hash,
//! equality and, for parameter types, a finite domain.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::{stable_hash, CellValue, Value, UNDEFINED_HASH};

/// Largest domain enumerated for rule parameters
pub const MAX_DOMAIN: usize = 1 << 16;

/// Why a value was refused by a leaf kind
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CastRejection {
    #[error("expected {expected}, got {found}")]
    WrongShape { expected: &'static str, found: &'static str },

    #[error("{value} outside [{min}, {max})")]
    OutOfRange { value: i64, min: String, max: String },

    #[error("{name} has no variant {index}")]
    NoSuchVariant { name: String, index: u32 },

    #[error("{bits:#x} does not fit in {width} bits")]
    TooWide { bits: u64, width: u8 },

    #[error("constant {expected} cannot hold {found}")]
    NotConstant { expected: String, found: String },

    #[error("sequence of {len} exceeds capacity {capacity}")]
    TooLong { len: usize, capacity: usize },

    #[error("modulus {modulus} is not positive")]
    BadModulus { modulus: i64 },

    #[error("element {index}: {source}")]
    Element {
        index: usize,
        #[source]
        source: Box<CastRejection>,
    },
}

/// Closed set of leaf kinds
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LeafKind {
    Boolean,
    /// Half-open `[min, max)`, each bound optional
    Integer { min: Option<i64>, max: Option<i64> },
    /// Integers wrapped into `0..modulus`
    Modulo { modulus: i64 },
    Enumeration { name: Arc<str>, variants: Arc<[Arc<str>]> },
    BitVector { width: u8 },
    Constant(Value),
    Sequence { element: Arc<LeafKind>, capacity: Option<usize> },
}

impl LeafKind {
    /// Integer in `[0, max)`
    pub fn bounded(max: i64) -> Self {
        LeafKind::Integer { min: Some(0), max: Some(max) }
    }

    /// Integer in `[min, max)`
    pub fn range(min: i64, max: i64) -> Self {
        LeafKind::Integer { min: Some(min), max: Some(max) }
    }

    pub fn unbounded() -> Self {
        LeafKind::Integer { min: None, max: None }
    }

    pub fn modulo(modulus: i64) -> Self {
        LeafKind::Modulo { modulus }
    }

    pub fn enumeration(name: &str, variants: &[&str]) -> Self {
        LeafKind::Enumeration {
            name: name.into(),
            variants: variants.iter().map(|v| Arc::from(*v)).collect(),
        }
    }

    pub fn bits(width: u8) -> Self {
        LeafKind::BitVector { width }
    }

    pub fn sequence(element: LeafKind, capacity: Option<usize>) -> Self {
        LeafKind::Sequence { element: Arc::new(element), capacity }
    }

    /// Reject kinds that can hold no value at all
    pub fn check_declaration(&self) -> Result<(), CastRejection> {
        match self {
            LeafKind::Modulo { modulus } if *modulus <= 0 => {
                Err(CastRejection::BadModulus { modulus: *modulus })
            }
            LeafKind::Sequence { element, .. } => element.check_declaration(),
            _ => Ok(()),
        }
    }

    /// Validate `value` and convert it into the canonical representation
    pub fn check_and_cast(&self, value: Value) -> Result<Value, CastRejection> {
        match self {
            LeafKind::Boolean => match value {
                Value::Bool(_) => Ok(value),
                Value::Int(0) => Ok(Value::Bool(false)),
                Value::Int(1) => Ok(Value::Bool(true)),
                Value::Int(v) => Err(CastRejection::OutOfRange {
                    value: v,
                    min: "0".into(),
                    max: "2".into(),
                }),
                other => Err(wrong_shape("bool", &other)),
            },
            LeafKind::Integer { min, max } => {
                let v = value.as_int().ok_or_else(|| wrong_shape("int", &value))?;
                let below = min.map_or(false, |m| v < m);
                let above = max.map_or(false, |m| v >= m);
                if below || above {
                    return Err(CastRejection::OutOfRange {
                        value: v,
                        min: bound_text(*min, "-inf"),
                        max: bound_text(*max, "inf"),
                    });
                }
                Ok(value)
            }
            LeafKind::Modulo { modulus } => {
                let v = value.as_int().ok_or_else(|| wrong_shape("int", &value))?;
                if *modulus <= 0 {
                    return Err(CastRejection::BadModulus { modulus: *modulus });
                }
                v.checked_rem_euclid(*modulus)
                    .map(Value::Int)
                    .ok_or(CastRejection::BadModulus { modulus: *modulus })
            }
            LeafKind::Enumeration { name, variants } => {
                let index = value.as_enum().ok_or_else(|| wrong_shape("enum", &value))?;
                if (index as usize) < variants.len() {
                    Ok(value)
                } else {
                    Err(CastRejection::NoSuchVariant { name: name.to_string(), index })
                }
            }
            LeafKind::BitVector { width } => {
                let bits = match value {
                    Value::Bits { bits, .. } => bits,
                    Value::Int(v) if v >= 0 => v as u64,
                    Value::Int(v) => {
                        return Err(CastRejection::OutOfRange {
                            value: v,
                            min: "0".into(),
                            max: format!("2^{}", width),
                        })
                    }
                    ref other => return Err(wrong_shape("bits", other)),
                };
                if *width < 64 && bits >> *width != 0 {
                    return Err(CastRejection::TooWide { bits, width: *width });
                }
                Ok(Value::Bits { width: *width, bits })
            }
            LeafKind::Constant(expected) => {
                if *expected == value {
                    Ok(value)
                } else {
                    Err(CastRejection::NotConstant {
                        expected: expected.to_string(),
                        found: value.to_string(),
                    })
                }
            }
            LeafKind::Sequence { element, capacity } => {
                let items = value.as_seq().ok_or_else(|| wrong_shape("seq", &value))?;
                if let Some(capacity) = capacity {
                    if items.len() > *capacity {
                        return Err(CastRejection::TooLong { len: items.len(), capacity: *capacity });
                    }
                }
                let cast = items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| {
                        element.check_and_cast(item.clone()).map_err(|e| CastRejection::Element {
                            index,
                            source: Box::new(e),
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Seq(cast.into()))
            }
        }
    }

    /// Hash of a cell's content, fed into the model state hash
    pub fn hash_value(&self, value: &CellValue) -> u64 {
        match value {
            CellValue::Undefined => UNDEFINED_HASH,
            CellValue::Defined(v) => stable_hash(v),
        }
    }

    pub fn values_equal(&self, a: &Value, b: &Value) -> bool {
        a == b
    }

    /// Every value of the kind in canonical order, or `None` if the domain
    /// is unbounded or too large to enumerate
    pub fn domain(&self) -> Option<Vec<Value>> {
        match self {
            LeafKind::Boolean => Some(vec![Value::Bool(true), Value::Bool(false)]),
            LeafKind::Integer { min: Some(min), max: Some(max) } => {
                let len = max.checked_sub(*min)?;
                if len < 0 || len as u64 > MAX_DOMAIN as u64 {
                    return None;
                }
                Some((*min..*max).map(Value::Int).collect())
            }
            LeafKind::Integer { .. } => None,
            LeafKind::Modulo { modulus } => {
                if *modulus <= 0 || *modulus as u64 > MAX_DOMAIN as u64 {
                    return None;
                }
                Some((0..*modulus).map(Value::Int).collect())
            }
            LeafKind::Enumeration { variants, .. } => {
                Some((0..variants.len() as u32).map(Value::Enum).collect())
            }
            LeafKind::BitVector { width } if *width <= 16 => {
                Some((0..1u64 << width).map(|bits| Value::Bits { width: *width, bits }).collect())
            }
            LeafKind::BitVector { .. } => None,
            LeafKind::Constant(v) => Some(vec![v.clone()]),
            LeafKind::Sequence { .. } => None,
        }
    }

    /// Enumeration value for a variant name
    pub fn variant(&self, variant: &str) -> Option<Value> {
        match self {
            LeafKind::Enumeration { variants, .. } => variants
                .iter()
                .position(|v| &**v == variant)
                .map(|i| Value::Enum(i as u32)),
            _ => None,
        }
    }

    /// Human-readable rendering of a value of this kind
    pub fn render(&self, value: &Value) -> String {
        match (self, value) {
            (LeafKind::Enumeration { name, variants }, Value::Enum(i)) => match variants.get(*i as usize) {
                Some(v) => format!("{}.{}", name, v),
                None => format!("{}#{}", name, i),
            },
            _ => value.to_string(),
        }
    }

    pub fn render_cell(&self, value: &CellValue) -> String {
        match value {
            CellValue::Undefined => "UnDefined".to_string(),
            CellValue::Defined(v) => self.render(v),
        }
    }
}

impl fmt::Display for LeafKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeafKind::Boolean => write!(f, "Boolean"),
            LeafKind::Integer { min, max } => {
                write!(f, "Integer[{}, {})", bound_text(*min, "-inf"), bound_text(*max, "inf"))
            }
            LeafKind::Modulo { modulus } => write!(f, "Modulo[{}]", modulus),
            LeafKind::Enumeration { name, .. } => write!(f, "{}", name),
            LeafKind::BitVector { width } => write!(f, "Bits[{}]", width),
            LeafKind::Constant(v) => write!(f, "Constant[{}]", v),
            LeafKind::Sequence { element, capacity: Some(c) } => write!(f, "Sequence[{}; {}]", element, c),
            LeafKind::Sequence { element, capacity: None } => write!(f, "Sequence[{}]", element),
        }
    }
}

fn wrong_shape(expected: &'static str, found: &Value) -> CastRejection {
    CastRejection::WrongShape { expected, found: found.shape() }
}

fn bound_text(bound: Option<i64>, open: &str) -> String {
    bound.map_or_else(|| open.to_string(), |b| b.to_string())
}
