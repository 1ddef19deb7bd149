//! Value resolution.
//!
//! [`SearchOptions`] is the policy, [`SearchAlgorithm`] the replaceable
//! procedure and [`DefaultSearch`] the stock procedure. The order is fixed:
//!
//! 1. explicit values, matched by reference, locally then up the parent chain
//! 2. the property's calculator, run against the whole container
//! 3. explicit values again, matched by the configured comparer
//! 4. the property's default value
//! 5. a `NotDefined` sentinel, or nothing
//!
//! An explicit value anywhere in the chain therefore beats calculators and
//! defaults.

use tracing::{trace, warn};

use crate::comparer::PropertyComparer;
use crate::container::{container_identity, Container};
use crate::datatype::DataType;
use crate::error::{PropbagError, Result};
use crate::property::{Property, PropertyRef};
use crate::value::{PropertyValue, TypedValue, ValueSource};

// ------------- SearchOptions -------------
#[derive(Clone, Debug)]
pub struct SearchOptions {
    pub property_comparer: PropertyComparer,
    pub search_in_parent: bool,
    pub calculate_value: bool,
    pub use_default_value: bool,
    pub return_not_defined: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            property_comparer: PropertyComparer::default(),
            search_in_parent: true,
            calculate_value: true,
            use_default_value: true,
            return_not_defined: true,
        }
    }
}

impl SearchOptions {
    /// Only what is literally present in the container itself.
    pub fn existing_only() -> Self {
        Self {
            search_in_parent: false,
            calculate_value: false,
            use_default_value: false,
            return_not_defined: false,
            ..Self::default()
        }
    }
    pub fn with_property_comparer(&self, property_comparer: PropertyComparer) -> Self {
        Self {
            property_comparer,
            ..self.clone()
        }
    }
    pub fn with_search_in_parent(&self, search_in_parent: bool) -> Self {
        Self {
            search_in_parent,
            ..self.clone()
        }
    }
    pub fn with_calculate_value(&self, calculate_value: bool) -> Self {
        Self {
            calculate_value,
            ..self.clone()
        }
    }
    pub fn with_use_default_value(&self, use_default_value: bool) -> Self {
        Self {
            use_default_value,
            ..self.clone()
        }
    }
    pub fn with_return_not_defined(&self, return_not_defined: bool) -> Self {
        Self {
            return_not_defined,
            ..self.clone()
        }
    }
}

// ------------- SearchAlgorithm -------------

/// The resolution procedure. Replace it to, for example, look values up
/// through an index when the set of properties is fixed.
pub trait SearchAlgorithm: Send + Sync {
    /// Full resolution. `None` for options means the container's own options.
    fn search(
        &self,
        container: &dyn Container,
        property: &PropertyRef,
        options: Option<&SearchOptions>,
    ) -> Option<PropertyValue>;

    /// Existence-only resolution: explicit values and the `NotDefined`
    /// sentinel, never calculators or defaults.
    fn search_untyped(
        &self,
        container: &dyn Container,
        property: &PropertyRef,
        options: Option<&SearchOptions>,
    ) -> Option<PropertyValue>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultSearch;

fn find_local(
    container: &dyn Container,
    property: &PropertyRef,
    comparer: &PropertyComparer,
) -> Option<PropertyValue> {
    // a loose comparer may match a property of another value type
    container
        .values()
        .iter()
        .find(|value| {
            value.property().value_type() == property.value_type()
                && comparer.equals(value.property(), property)
        })
        .cloned()
}

// Walks the container and, when asked to, its ancestors. A chain that loops
// back on itself ends the walk at the first repeated container.
fn find_explicit(
    container: &dyn Container,
    property: &PropertyRef,
    comparer: &PropertyComparer,
    search_in_parent: bool,
) -> Option<PropertyValue> {
    if let Some(found) = find_local(container, property, comparer) {
        return Some(found);
    }
    if !search_in_parent {
        return None;
    }
    let mut visited = vec![container_identity(container)];
    let mut next = container.parent();
    while let Some(parent) = next {
        let identity = container_identity(parent.as_ref());
        if visited.contains(&identity) {
            warn!(property = property.name(), "parent chain loops back, search stopped");
            return None;
        }
        visited.push(identity);
        if let Some(found) = find_local(parent.as_ref(), property, comparer) {
            return Some(found);
        }
        next = parent.parent();
    }
    None
}

fn not_defined(property: &PropertyRef, options: &SearchOptions) -> Option<PropertyValue> {
    if options.return_not_defined {
        Some(PropertyValue::from_property(
            property,
            property.not_defined_value(),
            ValueSource::NotDefined,
        ))
    } else {
        None
    }
}

impl SearchAlgorithm for DefaultSearch {
    fn search(
        &self,
        container: &dyn Container,
        property: &PropertyRef,
        options: Option<&SearchOptions>,
    ) -> Option<PropertyValue> {
        let options = options.cloned().unwrap_or_else(|| container.search_options());

        if let Some(found) = find_explicit(
            container,
            property,
            &PropertyComparer::ByReference,
            options.search_in_parent,
        ) {
            trace!(property = property.name(), "resolved explicit value");
            return Some(found);
        }

        if options.calculate_value && property.has_calculator() {
            if let Some(value) = property.calculate_untyped(container) {
                trace!(property = property.name(), "resolved calculated value");
                return Some(PropertyValue::from_property(
                    property,
                    value,
                    ValueSource::Calculated,
                ));
            }
        }

        if !options.property_comparer.is_reference() {
            if let Some(found) = find_explicit(
                container,
                property,
                &options.property_comparer,
                options.search_in_parent,
            ) {
                trace!(property = property.name(), "resolved value through comparer");
                return Some(found);
            }
        }

        if options.use_default_value {
            trace!(property = property.name(), "resolved default value");
            return Some(PropertyValue::from_property(
                property,
                property.default_value_untyped(),
                ValueSource::DefaultValue,
            ));
        }

        not_defined(property, &options)
    }

    fn search_untyped(
        &self,
        container: &dyn Container,
        property: &PropertyRef,
        options: Option<&SearchOptions>,
    ) -> Option<PropertyValue> {
        let options = options.cloned().unwrap_or_else(|| container.search_options());

        find_explicit(
            container,
            property,
            &PropertyComparer::ByReference,
            options.search_in_parent,
        )
        .or_else(|| {
            if options.property_comparer.is_reference() {
                None
            } else {
                find_explicit(
                    container,
                    property,
                    &options.property_comparer,
                    options.search_in_parent,
                )
            }
        })
        .or_else(|| not_defined(property, &options))
    }
}

// ------------- Typed accessors -------------

fn into_typed<T: DataType>(found: PropertyValue) -> Option<TypedValue<T>> {
    let typed = found.typed::<T>();
    if typed.is_none() {
        warn!(
            property = found.property().name(),
            expected = T::DATA_TYPE,
            actual = found.value().value_type_name(),
            "matched a value of another type"
        );
    }
    typed
}

/// Typed access to any container through the resolution procedure.
pub trait ContainerExt {
    fn as_container(&self) -> &dyn Container;

    fn get_property_value_with<T: DataType>(
        &self,
        algorithm: &dyn SearchAlgorithm,
        property: &Property<T>,
        options: Option<&SearchOptions>,
    ) -> Option<TypedValue<T>> {
        algorithm
            .search(self.as_container(), &property.untyped(), options)
            .and_then(into_typed)
    }
    fn get_property_value<T: DataType>(
        &self,
        property: &Property<T>,
        options: Option<&SearchOptions>,
    ) -> Option<TypedValue<T>> {
        self.get_property_value_with(&DefaultSearch, property, options)
    }
    /// The resolved value with the container's own options, `NotDefined`
    /// sentinels included.
    fn get_value<T: DataType>(&self, property: &Property<T>) -> Option<T> {
        self.get_property_value(property, None)
            .map(TypedValue::into_value)
    }
    fn get_value_or_default<T: DataType>(&self, property: &Property<T>) -> T {
        self.get_value(property)
            .unwrap_or_else(|| property.default_value())
    }
    /// Demands a real value, anything `NotDefined` is an error.
    fn require_value<T: DataType>(&self, property: &Property<T>) -> Result<T> {
        match self.get_property_value(property, None) {
            Some(found) if !found.source().is_not_defined() => Ok(found.into_value()),
            _ => Err(PropbagError::MissingValue {
                property: property.name().to_owned(),
            }),
        }
    }
    fn get_untyped(
        &self,
        property: &PropertyRef,
        options: Option<&SearchOptions>,
    ) -> Option<PropertyValue> {
        DefaultSearch.search(self.as_container(), property, options)
    }
    fn search_untyped(
        &self,
        property: &PropertyRef,
        options: Option<&SearchOptions>,
    ) -> Option<PropertyValue> {
        DefaultSearch.search_untyped(self.as_container(), property, options)
    }
    /// Whether an explicit value can be found with the container's options.
    fn has_value(&self, property: &PropertyRef) -> bool {
        let options = self
            .as_container()
            .search_options()
            .with_return_not_defined(false);
        self.search_untyped(property, Some(&options)).is_some()
    }
}

impl<C: Container> ContainerExt for C {
    fn as_container(&self) -> &dyn Container {
        self
    }
}

impl<'a> ContainerExt for dyn Container + 'a {
    fn as_container(&self) -> &dyn Container {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{MutablePropertyContainer, PropertyContainer};

    #[test]
    fn explicit_value_beats_calculator_and_default() {
        let age = Property::<i64>::new("Age")
            .with_default_value(1)
            .with_calculator(|_| Some(2));
        let mut container = MutablePropertyContainer::empty();
        container.set_value(&age, 3);
        let found = container.get_property_value(&age, None).unwrap();
        assert_eq!(*found.value(), 3);
        assert_eq!(found.source(), ValueSource::Defined);
    }

    #[test]
    fn calculator_then_default_then_not_defined() {
        let calculated = Property::<i64>::new("Calculated").with_calculator(|_| Some(2));
        let defaulted = Property::<i64>::new("Defaulted").with_default_value(1);
        let container = PropertyContainer::empty();

        let found = container.get_property_value(&calculated, None).unwrap();
        assert_eq!((*found.value(), found.source()), (2, ValueSource::Calculated));

        let found = container.get_property_value(&defaulted, None).unwrap();
        assert_eq!((*found.value(), found.source()), (1, ValueSource::DefaultValue));

        let options = SearchOptions::default().with_use_default_value(false);
        let found = container.get_property_value(&defaulted, Some(&options)).unwrap();
        assert_eq!((*found.value(), found.source()), (0, ValueSource::NotDefined));

        let options = options.with_return_not_defined(false);
        assert!(container.get_property_value(&defaulted, Some(&options)).is_none());
    }

    #[test]
    fn calculator_without_result_falls_through() {
        let age = Property::<i64>::new("Age")
            .with_default_value(5)
            .with_calculator(|_| None);
        let found = PropertyContainer::empty().get_property_value(&age, None).unwrap();
        assert_eq!(found.source(), ValueSource::DefaultValue);
    }

    #[test]
    fn configured_comparer_finds_aliased_property() {
        let first_name = Property::<String>::new("FirstName");
        let name = Property::<String>::new("Name").with_alias("FirstName");
        let mut container = MutablePropertyContainer::empty();
        container.add_value(&first_name, String::from("Alice"));

        let strict = SearchOptions::existing_only();
        assert!(container.get_property_value(&name, Some(&strict)).is_none());

        let by_alias = strict.with_property_comparer(PropertyComparer::ByNameOrAlias {
            ignore_case: false,
        });
        let found = container.get_property_value(&name, Some(&by_alias)).unwrap();
        assert_eq!(found.value(), "Alice");
        assert!(first_name.is(found.property()));
    }

    #[test]
    fn require_value_rejects_not_defined() {
        let age = Property::<i64>::new("Age");
        let mut container = MutablePropertyContainer::empty();
        container.set_search_options(SearchOptions::default().with_use_default_value(false));
        assert!(matches!(
            container.require_value(&age),
            Err(PropbagError::MissingValue { .. })
        ));
        container.set_value(&age, 9);
        assert_eq!(container.require_value(&age).unwrap(), 9);
    }

    #[test]
    fn untyped_search_never_calculates() {
        let age = Property::<i64>::new("Age").with_calculator(|_| Some(1));
        let container = PropertyContainer::empty();
        let found = container.search_untyped(&age.untyped(), None).unwrap();
        assert_eq!(found.source(), ValueSource::NotDefined);
        assert!(!container.has_value(&age.untyped()));
    }

    #[test]
    fn algorithm_is_replaceable() {
        struct Nothing;
        impl SearchAlgorithm for Nothing {
            fn search(
                &self,
                _: &dyn Container,
                _: &PropertyRef,
                _: Option<&SearchOptions>,
            ) -> Option<PropertyValue> {
                None
            }
            fn search_untyped(
                &self,
                _: &dyn Container,
                _: &PropertyRef,
                _: Option<&SearchOptions>,
            ) -> Option<PropertyValue> {
                None
            }
        }
        let age = Property::<i64>::new("Age");
        let mut container = MutablePropertyContainer::empty();
        container.set_value(&age, 1);
        assert!(container.get_property_value_with(&Nothing, &age, None).is_none());
        assert!(container.get_property_value(&age, None).is_some());
    }

    #[test]
    fn calculator_resolves_other_properties() {
        let base = Property::<i64>::new("Base");
        let lookup = base.clone();
        let doubled = Property::<i64>::new("Doubled")
            .with_calculator(move |container| container.get_value(&lookup).map(|v| v * 2));
        let mut container = MutablePropertyContainer::empty();
        container.set_value(&base, 21);
        let found = container.get_property_value(&doubled, None).unwrap();
        assert_eq!((*found.value(), found.source()), (42, ValueSource::Calculated));
    }

    #[test]
    fn loose_comparer_skips_values_of_another_type() {
        let code = Property::<i64>::new("Code");
        let label = Property::<String>::new("Label")
            .with_alias("Code")
            .with_default_value(String::from("fallback"));
        let mut container = MutablePropertyContainer::empty();
        container.set_value(&code, 7);
        let options = SearchOptions::default()
            .with_property_comparer(PropertyComparer::ByNameOrAlias { ignore_case: false });
        let found = container.get_property_value(&label, Some(&options)).unwrap();
        assert_eq!(found.value(), "fallback");
        assert_eq!(found.source(), ValueSource::DefaultValue);

        let text_code = Property::<String>::new("Code");
        container.set_value(&text_code, String::from("A7"));
        let found = container.get_property_value(&label, Some(&options)).unwrap();
        assert_eq!((found.value().as_str(), found.source()), ("A7", ValueSource::Defined));
    }
}
