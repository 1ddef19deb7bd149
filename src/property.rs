//! Property descriptors.
//!
//! A [`Property<T>`] is a cheap handle (an `Arc`) to an immutable
//! [`PropertyDef<T>`]. Property definitions are normally created once and then
//! shared by every container that holds a value for them, so the handle is
//! what gets cloned around. Reference identity of the definition is what the
//! [`crate::comparer::PropertyComparer::ByReference`] comparer looks at.
//!
//! Containers are heterogeneous and hold properties through the object-safe
//! [`AnyProperty`] view, aliased as [`PropertyRef`].

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::container::Container;
use crate::datatype::{value_of, DataType, Value};
use crate::error::{PropbagError, Result};
use crate::metadata::{HasMetadata, MetadataSlot};

pub type DefaultFn<T> = Arc<dyn Fn() -> T + Send + Sync>;
pub type CalculatorFn<T> = Arc<dyn Fn(&dyn Container) -> Option<T> + Send + Sync>;

// ------------- PropertyDef -------------
pub struct PropertyDef<T: DataType> {
    name: String,
    alias: Option<String>,
    description: Option<String>,
    default_value: Option<DefaultFn<T>>,
    calculator: Option<CalculatorFn<T>>,
    examples: Vec<T>,
    metadata: MetadataSlot,
}

impl<T: DataType> PropertyDef<T> {
    fn named(name: String) -> Self {
        Self {
            name,
            alias: None,
            description: None,
            default_value: None,
            calculator: None,
            examples: Vec::new(),
            metadata: MetadataSlot::new(),
        }
    }
    // Copies the descriptive parts, a fresh definition gets a fresh metadata slot.
    fn derive(&self) -> Self {
        Self {
            name: self.name.clone(),
            alias: self.alias.clone(),
            description: self.description.clone(),
            default_value: self.default_value.clone(),
            calculator: self.calculator.clone(),
            examples: self.examples.clone(),
            metadata: MetadataSlot::new(),
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
    pub fn examples(&self) -> &[T] {
        &self.examples
    }
    /// The configured default, or `T::default()` when none was configured.
    pub fn default_value(&self) -> T {
        match &self.default_value {
            Some(supplier) => supplier(),
            None => T::default(),
        }
    }
    pub fn calculate(&self, container: &dyn Container) -> Option<T> {
        self.calculator
            .as_ref()
            .and_then(|calculator| calculator(container))
    }
}

impl<T: DataType> fmt::Debug for PropertyDef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("name", &self.name)
            .field("type", &T::DATA_TYPE)
            .field("alias", &self.alias)
            .field("description", &self.description)
            .field("examples", &self.examples)
            .field("has_default", &self.default_value.is_some())
            .field("has_calculator", &self.calculator.is_some())
            .finish()
    }
}

impl<T: DataType> HasMetadata for PropertyDef<T> {
    fn metadata_slot(&self) -> &MetadataSlot {
        &self.metadata
    }
}

// ------------- AnyProperty -------------

/// Object-safe view of a property definition of any value type.
pub trait AnyProperty: HasMetadata + Send + Sync + fmt::Debug {
    fn name(&self) -> &str;
    fn alias(&self) -> Option<&str>;
    fn description(&self) -> Option<&str>;
    fn value_type(&self) -> TypeId;
    fn value_type_name(&self) -> &'static str;
    fn has_default(&self) -> bool;
    fn has_calculator(&self) -> bool;
    fn default_value_untyped(&self) -> Value;
    fn calculate_untyped(&self, container: &dyn Container) -> Option<Value>;
    fn not_defined_value(&self) -> Value;
    fn as_any(&self) -> &dyn Any;
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

pub type PropertyRef = Arc<dyn AnyProperty>;

impl<T: DataType> AnyProperty for PropertyDef<T> {
    fn name(&self) -> &str {
        &self.name
    }
    fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }
    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
    fn value_type(&self) -> TypeId {
        TypeId::of::<T>()
    }
    fn value_type_name(&self) -> &'static str {
        T::DATA_TYPE
    }
    fn has_default(&self) -> bool {
        self.default_value.is_some()
    }
    fn has_calculator(&self) -> bool {
        self.calculator.is_some()
    }
    fn default_value_untyped(&self) -> Value {
        value_of(self.default_value())
    }
    fn calculate_untyped(&self, container: &dyn Container) -> Option<Value> {
        self.calculate(container).map(value_of)
    }
    fn not_defined_value(&self) -> Value {
        value_of(T::default())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Reference identity of two property definitions.
pub fn same_property(a: &PropertyRef, b: &PropertyRef) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

// ------------- Property -------------
pub struct Property<T: DataType> {
    def: Arc<PropertyDef<T>>,
}

impl<T: DataType> Property<T> {
    /// # Panics
    /// When `name` is empty. Use [`Property::try_new`] for untrusted names.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        assert!(!name.is_empty(), "property name must not be empty");
        Self {
            def: Arc::new(PropertyDef::named(name)),
        }
    }
    pub fn try_new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(PropbagError::Invariant(String::from(
                "property name must not be empty",
            )));
        }
        Ok(Self {
            def: Arc::new(PropertyDef::named(name)),
        })
    }
    /// Recovers the typed handle from an untyped property, if the value type is `T`.
    pub fn from_untyped(property: &PropertyRef) -> Option<Self> {
        Arc::clone(property)
            .into_any_arc()
            .downcast::<PropertyDef<T>>()
            .ok()
            .map(|def| Self { def })
    }

    // The "with" family never touches the definition it starts from.
    fn with(&self, change: impl FnOnce(&mut PropertyDef<T>)) -> Self {
        let mut def = self.def.derive();
        change(&mut def);
        Self { def: Arc::new(def) }
    }
    pub fn with_alias(&self, alias: impl Into<String>) -> Self {
        let alias = alias.into();
        self.with(|def| def.alias = Some(alias))
    }
    pub fn with_description(&self, description: impl Into<String>) -> Self {
        let description = description.into();
        self.with(|def| def.description = Some(description))
    }
    pub fn with_default_value(&self, value: T) -> Self {
        self.with_default(move || value.clone())
    }
    pub fn with_default(&self, supplier: impl Fn() -> T + Send + Sync + 'static) -> Self {
        self.with(|def| def.default_value = Some(Arc::new(supplier)))
    }
    pub fn with_calculator(
        &self,
        calculator: impl Fn(&dyn Container) -> Option<T> + Send + Sync + 'static,
    ) -> Self {
        self.with(|def| def.calculator = Some(Arc::new(calculator)))
    }
    pub fn with_examples(&self, examples: impl IntoIterator<Item = T>) -> Self {
        let examples: Vec<T> = examples.into_iter().collect();
        self.with(|def| def.examples = examples)
    }

    pub fn name(&self) -> &str {
        self.def.name()
    }
    pub fn alias(&self) -> Option<&str> {
        self.def.alias()
    }
    pub fn description(&self) -> Option<&str> {
        self.def.description()
    }
    pub fn examples(&self) -> &[T] {
        self.def.examples()
    }
    pub fn default_value(&self) -> T {
        self.def.default_value()
    }
    pub fn calculate(&self, container: &dyn Container) -> Option<T> {
        self.def.calculate(container)
    }
    pub fn definition(&self) -> &PropertyDef<T> {
        &self.def
    }
    pub fn untyped(&self) -> PropertyRef {
        self.def.clone()
    }
    pub fn is(&self, property: &PropertyRef) -> bool {
        same_property(&self.untyped(), property)
    }
}

impl<T: DataType> Clone for Property<T> {
    fn clone(&self) -> Self {
        Self {
            def: Arc::clone(&self.def),
        }
    }
}
impl<T: DataType> PartialEq for Property<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.def, &other.def)
    }
}
impl<T: DataType> Eq for Property<T> {}
impl<T: DataType> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.def.fmt(f)
    }
}
impl<T: DataType> fmt::Display for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.def.name)
    }
}
impl<T: DataType> HasMetadata for Property<T> {
    fn metadata_slot(&self) -> &MetadataSlot {
        self.def.metadata_slot()
    }
}
impl<T: DataType> From<&Property<T>> for PropertyRef {
    fn from(property: &Property<T>) -> Self {
        property.untyped()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::PropertyContainer;

    #[test]
    fn with_operations_produce_new_definitions() {
        let age = Property::<i64>::new("Age");
        let aliased = age.with_alias("years").with_description("Age in years");
        assert_eq!(age.alias(), None);
        assert_eq!(aliased.alias(), Some("years"));
        assert_eq!(aliased.description(), Some("Age in years"));
        assert_eq!(aliased.name(), "Age");
        assert_ne!(age, aliased);
        assert_eq!(age, age.clone());
    }

    #[test]
    fn default_falls_back_to_type_default() {
        let age = Property::<i64>::new("Age");
        assert_eq!(age.default_value(), 0);
        let age = age.with_default_value(18);
        assert_eq!(age.default_value(), 18);
        assert!(age.untyped().has_default());
    }

    #[test]
    fn calculator_sees_the_container() {
        let count = Property::<i64>::new("Count")
            .with_calculator(|container| Some(container.count() as i64));
        let container = PropertyContainer::empty();
        assert_eq!(count.calculate(&container), Some(0));
        assert!(count.untyped().has_calculator());
    }

    #[test]
    fn typed_handle_round_trips_through_untyped() {
        let name = Property::<String>::new("Name").with_examples([String::from("Alice")]);
        let untyped = name.untyped();
        assert!(name.is(&untyped));
        let back = Property::<String>::from_untyped(&untyped).unwrap();
        assert_eq!(back, name);
        assert_eq!(back.examples(), &[String::from("Alice")]);
        assert!(Property::<i64>::from_untyped(&untyped).is_none());
    }

    #[test]
    fn empty_names_are_rejected() {
        assert!(Property::<i64>::try_new("").is_err());
        assert!(std::panic::catch_unwind(|| Property::<i64>::new("")).is_err());
    }
}
