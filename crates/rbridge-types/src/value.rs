//! Value kinds tracked per engine variable, and host-side scalars.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The small closed set of value kinds the bridge tracks per variable.
///
/// A variable is `Unknown` from the moment its name is handed out until the
/// assignment that defines it has been acknowledged by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    #[default]
    Unknown,
    Boolean,
    Long,
    Double,
    Vector,
    Matrix,
}

impl ValueType {
    /// Whether values of this kind are read with a scalar probe.
    pub fn is_scalar(self) -> bool {
        matches!(self, ValueType::Boolean | ValueType::Long | ValueType::Double)
    }

    /// Whether values of this kind are read with a tabular dump.
    pub fn is_tabular(self) -> bool {
        matches!(self, ValueType::Vector | ValueType::Matrix)
    }

    /// Width used when arithmetic mixes kinds: the wider operand wins.
    ///
    /// `Unknown` ranks below everything so it never displaces a resolved kind.
    pub fn rank(self) -> u8 {
        match self {
            ValueType::Unknown => 0,
            ValueType::Boolean => 1,
            ValueType::Long => 2,
            ValueType::Double => 3,
            ValueType::Vector => 4,
            ValueType::Matrix => 5,
        }
    }

    /// The wider of two kinds.
    pub fn widen(self, other: ValueType) -> ValueType {
        if other.rank() > self.rank() { other } else { self }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ValueType::Unknown => "unknown",
            ValueType::Boolean => "boolean",
            ValueType::Long => "long",
            ValueType::Double => "double",
            ValueType::Vector => "vector",
            ValueType::Matrix => "matrix",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single value crossing the pipe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Bool(bool),
    Long(i64),
    Double(f64),
}

impl Scalar {
    /// The kind this scalar registers as once assigned.
    pub fn value_type(&self) -> ValueType {
        match self {
            Scalar::Bool(_) => ValueType::Boolean,
            Scalar::Long(_) => ValueType::Long,
            Scalar::Double(_) => ValueType::Double,
        }
    }

    /// Numeric view: booleans map to 1.0 / 0.0.
    pub fn as_f64(&self) -> f64 {
        match *self {
            Scalar::Bool(b) => {
                if b {
                    1.0
                } else {
                    0.0
                }
            }
            Scalar::Long(i) => i as f64,
            Scalar::Double(d) => d,
        }
    }

    /// Equality that treats two NaNs as the same value.
    pub fn same_value(&self, other: &Scalar) -> bool {
        match (self, other) {
            (Scalar::Double(a), Scalar::Double(b)) => a == b || (a.is_nan() && b.is_nan()),
            _ => self == other,
        }
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

impl From<i64> for Scalar {
    fn from(i: i64) -> Self {
        Scalar::Long(i)
    }
}

impl From<i32> for Scalar {
    fn from(i: i32) -> Self {
        Scalar::Long(i as i64)
    }
}

impl From<f64> for Scalar {
    fn from(d: f64) -> Self {
        Scalar::Double(d)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Long(i) => write!(f, "{}", i),
            Scalar::Double(d) => write!(f, "{}", d),
        }
    }
}

/// A named engine variable and the kind of value it currently holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ValueType,
}

impl Variable {
    pub fn new(name: impl Into<String>, ty: ValueType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }

    /// A variable whose defining assignment has not completed yet.
    pub fn unbound(name: impl Into<String>) -> Self {
        Self::new(name, ValueType::Unknown)
    }
}
