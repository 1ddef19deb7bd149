use std::fmt;

use serde::{Deserialize, Serialize};

use crate::datatype::{downcast, value_of, value_type_id, DataType, Value};
use crate::error::{PropbagError, Result};
use crate::property::{Property, PropertyRef};

/// Where a resolved value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueSource {
    NotDefined,
    Defined,
    Calculated,
    DefaultValue,
}

impl ValueSource {
    pub fn is_defined(&self) -> bool {
        *self == ValueSource::Defined
    }
    pub fn is_not_defined(&self) -> bool {
        *self == ValueSource::NotDefined
    }
}

impl fmt::Display for ValueSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueSource::NotDefined => "NotDefined",
            ValueSource::Defined => "Defined",
            ValueSource::Calculated => "Calculated",
            ValueSource::DefaultValue => "DefaultValue",
        };
        f.write_str(name)
    }
}

// ------------- PropertyValue -------------

/// An immutable (property, value, source) triple as stored in containers.
#[derive(Clone)]
pub struct PropertyValue {
    property: PropertyRef,
    value: Value,
    source: ValueSource,
}

impl PropertyValue {
    pub fn new<T: DataType>(property: &Property<T>, value: T, source: ValueSource) -> Self {
        Self {
            property: property.untyped(),
            value: value_of(value),
            source,
        }
    }
    pub fn defined<T: DataType>(property: &Property<T>, value: T) -> Self {
        Self::new(property, value, ValueSource::Defined)
    }
    /// Builds a value from untyped parts, refusing values whose type is not
    /// the property's declared type.
    pub fn create(property: PropertyRef, value: Value, source: ValueSource) -> Result<Self> {
        if value_type_id(&value) != property.value_type() {
            return Err(PropbagError::TypeMismatch {
                property: property.name().to_owned(),
                expected: property.value_type_name(),
                actual: value.value_type_name(),
            });
        }
        Ok(Self {
            property,
            value,
            source,
        })
    }
    // Callers guarantee the value was produced by the property itself.
    pub(crate) fn from_property(property: &PropertyRef, value: Value, source: ValueSource) -> Self {
        Self {
            property: PropertyRef::clone(property),
            value,
            source,
        }
    }
    pub fn property(&self) -> &PropertyRef {
        &self.property
    }
    pub fn value(&self) -> &Value {
        &self.value
    }
    pub fn source(&self) -> ValueSource {
        self.source
    }
    pub fn with_source(&self, source: ValueSource) -> Self {
        Self {
            property: PropertyRef::clone(&self.property),
            value: Value::clone(&self.value),
            source,
        }
    }
    pub fn value_as<T: DataType>(&self) -> Option<&T> {
        downcast::<T>(&self.value)
    }
    pub fn typed<T: DataType>(&self) -> Option<TypedValue<T>> {
        self.value_as::<T>().map(|value| TypedValue {
            property: PropertyRef::clone(&self.property),
            value: value.clone(),
            source: self.source,
        })
    }
}

impl fmt::Debug for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyValue")
            .field("property", &self.property.name())
            .field("type", &self.property.value_type_name())
            .field("value", &self.value)
            .field("source", &self.source)
            .finish()
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.property.name(), self.value.render_value())
    }
}

// ------------- TypedValue -------------

/// Typed view of a resolved [`PropertyValue`].
#[derive(Clone, Debug)]
pub struct TypedValue<T: DataType> {
    property: PropertyRef,
    value: T,
    source: ValueSource,
}

impl<T: DataType> TypedValue<T> {
    pub fn property(&self) -> &PropertyRef {
        &self.property
    }
    pub fn value(&self) -> &T {
        &self.value
    }
    pub fn into_value(self) -> T {
        self.value
    }
    pub fn source(&self) -> ValueSource {
        self.source
    }
}
