// used for dates and date-times produced by the stock parsers
use chrono::{NaiveDate, NaiveDateTime};
// used for decimals of arbitrary precision
use bigdecimal::BigDecimal;

// used for type erasure of values held in containers
use std::any::{Any, TypeId};
// used to print out readable forms of a data type
use std::fmt;
// used when parsing a string to a Decimal
use std::str::FromStr;
use std::ops;
use std::sync::Arc;

/// A type that can be the value of a [`crate::property::Property`].
///
/// `Default` supplies the "language default" that resolution hands out as the
/// `NotDefined` sentinel, so every data type must have one.
pub trait DataType: fmt::Debug + Clone + PartialEq + Default + Send + Sync + 'static {
    // static stuff which needs to be implemented downstream
    const DATA_TYPE: &'static str;
    // instance callable with pre-made implementation
    fn data_type(&self) -> &'static str {
        Self::DATA_TYPE
    }
    fn render(&self) -> String {
        format!("{:?}", self)
    }
}

// Types whose Display form is what we want in diagnostics.
macro_rules! displayed_data_type {
    ($($t:ty => $name:literal),* $(,)?) => {
        $(
            impl DataType for $t {
                const DATA_TYPE: &'static str = $name;
                fn render(&self) -> String {
                    self.to_string()
                }
            }
        )*
    };
}

// ------------- Data Types --------------
displayed_data_type! {
    String => "String",
    bool => "bool",
    i32 => "i32",
    i64 => "i64",
    u32 => "u32",
    u64 => "u64",
    f64 => "f64",
    NaiveDate => "NaiveDate",
    NaiveDateTime => "NaiveDateTime",
    Decimal => "Decimal",
}

impl DataType for Vec<String> {
    const DATA_TYPE: &'static str = "Vec<String>";
    fn render(&self) -> String {
        format!("[{}]", self.join(", "))
    }
}

impl<T: DataType> DataType for Option<T> {
    const DATA_TYPE: &'static str = "Option";
    fn render(&self) -> String {
        match self {
            Some(value) => value.render(),
            None => String::from("null"),
        }
    }
}

// Special types below
#[derive(Eq, PartialEq, Hash, PartialOrd, Ord, Clone, Debug, Default)]
pub struct Decimal(BigDecimal);

impl Decimal {
    pub fn new(value: BigDecimal) -> Self {
        Self(value)
    }
    pub fn from_str(s: &str) -> Option<Decimal> {
        match BigDecimal::from_str(s) {
            Ok(decimal) => Some(Decimal(decimal)),
            _ => None,
        }
    }
}
impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl ops::Deref for Decimal {
    type Target = BigDecimal;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// ------------- Type erasure --------------

/// Object-safe view of a [`DataType`] value, as stored inside containers.
pub trait AnyValue: Any + Send + Sync + fmt::Debug {
    fn as_any(&self) -> &dyn Any;
    fn value_type_name(&self) -> &'static str;
    fn render_value(&self) -> String;
    fn value_eq(&self, other: &dyn AnyValue) -> bool;
}

impl<T: DataType> AnyValue for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn value_type_name(&self) -> &'static str {
        T::DATA_TYPE
    }
    fn render_value(&self) -> String {
        self.render()
    }
    fn value_eq(&self, other: &dyn AnyValue) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| other == self)
    }
}

/// Shared, immutable, type-erased value.
pub type Value = Arc<dyn AnyValue>;

pub fn value_of<T: DataType>(value: T) -> Value {
    Arc::new(value)
}

pub fn value_type_id(value: &Value) -> TypeId {
    value.as_any().type_id()
}

pub fn downcast<T: DataType>(value: &Value) -> Option<&T> {
    value.as_any().downcast_ref::<T>()
}
