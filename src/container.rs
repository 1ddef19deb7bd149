//! Property containers.
//!
//! Three flavours share the read-only [`Container`] contract:
//! * [`PropertyContainer`] is immutable once built and can be read from any
//!   number of threads without locking.
//! * [`MutablePropertyContainer`] is changed through `&mut self`, so the
//!   borrow checker provides the external serialization it needs.
//! * [`ConcurrentPropertyContainer`] serializes every call behind one mutex and
//!   hands out snapshots, never references into the guarded state.
//!
//! Values keep insertion order. When a property appears more than once the
//! first entry wins during resolution.

use std::borrow::Cow;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::trace;

use crate::comparer::PropertyComparer;
use crate::datatype::{DataType, Value};
use crate::error::Result;
use crate::property::{same_property, Property, PropertyRef};
use crate::search::SearchOptions;
use crate::value::{PropertyValue, ValueSource};

/// Read-only view of a container, as consumed by resolution and by downstream
/// renderers.
pub trait Container: Send + Sync + fmt::Debug {
    /// The values in insertion order. Guarded containers return a snapshot.
    fn values(&self) -> Cow<'_, [PropertyValue]>;
    fn parent(&self) -> Option<ContainerRef>;
    fn search_options(&self) -> SearchOptions;
    fn count(&self) -> usize {
        self.values().len()
    }
    fn properties(&self) -> Vec<PropertyRef> {
        self.values()
            .iter()
            .map(|value| PropertyRef::clone(value.property()))
            .collect()
    }
}

pub type ContainerRef = Arc<dyn Container>;

/// Identity of a container, used to notice a parent chain that loops back.
pub fn container_identity(container: &dyn Container) -> usize {
    container as *const dyn Container as *const () as usize
}

// "(name: value, other: value)"
fn fmt_values(values: &[PropertyValue], f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("(")?;
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", value)?;
    }
    f.write_str(")")
}

// Position of the entry for `property`: reference identity first, then the comparer.
pub(crate) fn position_of(
    values: &[PropertyValue],
    property: &PropertyRef,
    comparer: &PropertyComparer,
) -> Option<usize> {
    values
        .iter()
        .position(|value| same_property(value.property(), property))
        .or_else(|| {
            if comparer.is_reference() {
                None
            } else {
                values.iter().position(|value| {
                    value.property().value_type() == property.value_type()
                        && comparer.equals(value.property(), property)
                })
            }
        })
}

// ------------- PropertyContainer -------------
#[derive(Clone)]
pub struct PropertyContainer {
    values: Arc<[PropertyValue]>,
    parent: Option<ContainerRef>,
    search_options: SearchOptions,
}

impl PropertyContainer {
    /// Collects `values` into storage owned by the container.
    pub fn new(
        values: impl IntoIterator<Item = PropertyValue>,
        parent: Option<ContainerRef>,
        search_options: Option<SearchOptions>,
    ) -> Self {
        Self {
            values: values.into_iter().collect(),
            parent,
            search_options: search_options.unwrap_or_default(),
        }
    }
    pub fn empty() -> Self {
        Self::new(Vec::new(), None, None)
    }
    pub fn from_values(values: Vec<PropertyValue>) -> Self {
        Self::new(values, None, None)
    }
    /// Shares already immutable storage instead of copying it.
    pub fn from_shared(
        values: Arc<[PropertyValue]>,
        parent: Option<ContainerRef>,
        search_options: SearchOptions,
    ) -> Self {
        Self {
            values,
            parent,
            search_options,
        }
    }
    /// Copies the current state of any container.
    pub fn snapshot_of(container: &dyn Container) -> Self {
        Self::new(
            container.values().iter().cloned(),
            container.parent(),
            Some(container.search_options()),
        )
    }
    pub fn with_parent(&self, parent: Option<ContainerRef>) -> Self {
        Self::from_shared(Arc::clone(&self.values), parent, self.search_options.clone())
    }
    pub fn with_search_options(&self, search_options: SearchOptions) -> Self {
        Self::from_shared(Arc::clone(&self.values), self.parent.clone(), search_options)
    }
    pub fn shared_values(&self) -> Arc<[PropertyValue]> {
        Arc::clone(&self.values)
    }
    pub fn into_ref(self) -> ContainerRef {
        Arc::new(self)
    }
}

impl Container for PropertyContainer {
    fn values(&self) -> Cow<'_, [PropertyValue]> {
        Cow::Borrowed(&self.values[..])
    }
    fn parent(&self) -> Option<ContainerRef> {
        self.parent.clone()
    }
    fn search_options(&self) -> SearchOptions {
        self.search_options.clone()
    }
    fn count(&self) -> usize {
        self.values.len()
    }
}

impl Default for PropertyContainer {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for PropertyContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyContainer")
            .field("values", &self.values)
            .field("has_parent", &self.parent.is_some())
            .field("search_options", &self.search_options)
            .finish()
    }
}

impl fmt::Display for PropertyContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_values(&self.values, f)
    }
}

impl FromIterator<PropertyValue> for PropertyContainer {
    fn from_iter<I: IntoIterator<Item = PropertyValue>>(iter: I) -> Self {
        Self::new(iter, None, None)
    }
}

// ------------- MutablePropertyContainer -------------
#[derive(Clone, Default)]
pub struct MutablePropertyContainer {
    values: Vec<PropertyValue>,
    parent: Option<ContainerRef>,
    search_options: SearchOptions,
}

impl MutablePropertyContainer {
    pub fn new(
        values: impl IntoIterator<Item = PropertyValue>,
        parent: Option<ContainerRef>,
        search_options: Option<SearchOptions>,
    ) -> Self {
        Self {
            values: values.into_iter().collect(),
            parent,
            search_options: search_options.unwrap_or_default(),
        }
    }
    pub fn empty() -> Self {
        Self::default()
    }
    /// Starts from a copy of another container, parent and options included.
    pub fn copy_of(container: &dyn Container) -> Self {
        Self::new(
            container.values().iter().cloned(),
            container.parent(),
            Some(container.search_options()),
        )
    }
    /// Replaces the first matching entry or appends. Returns the replaced entry.
    pub fn set(&mut self, value: PropertyValue) -> Option<PropertyValue> {
        match position_of(&self.values, value.property(), &self.search_options.property_comparer) {
            Some(i) => {
                trace!(property = value.property().name(), "replacing value");
                Some(std::mem::replace(&mut self.values[i], value))
            }
            None => {
                self.values.push(value);
                None
            }
        }
    }
    pub fn set_value<T: DataType>(
        &mut self,
        property: &Property<T>,
        value: T,
    ) -> Option<PropertyValue> {
        self.set(PropertyValue::defined(property, value))
    }
    /// Sets a value whose type is only known at run time.
    pub fn set_untyped(
        &mut self,
        property: PropertyRef,
        value: Value,
    ) -> Result<Option<PropertyValue>> {
        let value = PropertyValue::create(property, value, ValueSource::Defined)?;
        Ok(self.set(value))
    }
    /// Appends without looking for an existing entry.
    pub fn add(&mut self, value: PropertyValue) {
        self.values.push(value);
    }
    pub fn add_value<T: DataType>(&mut self, property: &Property<T>, value: T) {
        self.add(PropertyValue::defined(property, value));
    }
    pub fn remove(&mut self, property: &PropertyRef) -> Option<PropertyValue> {
        position_of(&self.values, property, &self.search_options.property_comparer)
            .map(|i| self.values.remove(i))
    }
    pub fn clear(&mut self) {
        self.values.clear();
    }
    pub fn set_parent(&mut self, parent: Option<ContainerRef>) {
        self.parent = parent;
    }
    pub fn set_search_options(&mut self, search_options: SearchOptions) {
        self.search_options = search_options;
    }
    pub fn contains(&self, property: &PropertyRef) -> bool {
        position_of(&self.values, property, &self.search_options.property_comparer).is_some()
    }
    pub fn freeze(self) -> PropertyContainer {
        PropertyContainer::new(self.values, self.parent, Some(self.search_options))
    }
    pub fn into_ref(self) -> ContainerRef {
        Arc::new(self)
    }
}

impl Container for MutablePropertyContainer {
    fn values(&self) -> Cow<'_, [PropertyValue]> {
        Cow::Borrowed(&self.values[..])
    }
    fn parent(&self) -> Option<ContainerRef> {
        self.parent.clone()
    }
    fn search_options(&self) -> SearchOptions {
        self.search_options.clone()
    }
    fn count(&self) -> usize {
        self.values.len()
    }
}

impl fmt::Debug for MutablePropertyContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutablePropertyContainer")
            .field("values", &self.values)
            .field("has_parent", &self.parent.is_some())
            .field("search_options", &self.search_options)
            .finish()
    }
}

impl fmt::Display for MutablePropertyContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_values(&self.values, f)
    }
}

// ------------- ConcurrentPropertyContainer -------------
#[derive(Default)]
pub struct ConcurrentPropertyContainer {
    state: Mutex<MutablePropertyContainer>,
}

impl ConcurrentPropertyContainer {
    pub fn new(
        values: impl IntoIterator<Item = PropertyValue>,
        parent: Option<ContainerRef>,
        search_options: Option<SearchOptions>,
    ) -> Self {
        Self {
            state: Mutex::new(MutablePropertyContainer::new(values, parent, search_options)),
        }
    }
    pub fn empty() -> Self {
        Self::default()
    }
    // A panic in another caller leaves the value list intact, so keep going.
    fn state(&self) -> MutexGuard<'_, MutablePropertyContainer> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
    pub fn set(&self, value: PropertyValue) -> Option<PropertyValue> {
        self.state().set(value)
    }
    pub fn set_value<T: DataType>(
        &self,
        property: &Property<T>,
        value: T,
    ) -> Option<PropertyValue> {
        self.state().set_value(property, value)
    }
    pub fn set_untyped(
        &self,
        property: PropertyRef,
        value: Value,
    ) -> Result<Option<PropertyValue>> {
        self.state().set_untyped(property, value)
    }
    pub fn add(&self, value: PropertyValue) {
        self.state().add(value);
    }
    pub fn add_value<T: DataType>(&self, property: &Property<T>, value: T) {
        self.state().add_value(property, value);
    }
    pub fn remove(&self, property: &PropertyRef) -> Option<PropertyValue> {
        self.state().remove(property)
    }
    pub fn clear(&self) {
        self.state().clear();
    }
    pub fn set_parent(&self, parent: Option<ContainerRef>) {
        self.state().set_parent(parent);
    }
    pub fn set_search_options(&self, search_options: SearchOptions) {
        self.state().set_search_options(search_options);
    }
    pub fn contains(&self, property: &PropertyRef) -> bool {
        self.state().contains(property)
    }
    pub fn snapshot(&self) -> PropertyContainer {
        self.state().clone().freeze()
    }
}

impl Container for ConcurrentPropertyContainer {
    fn values(&self) -> Cow<'_, [PropertyValue]> {
        Cow::Owned(self.state().values.clone())
    }
    fn parent(&self) -> Option<ContainerRef> {
        self.state().parent.clone()
    }
    fn search_options(&self) -> SearchOptions {
        self.state().search_options.clone()
    }
    fn count(&self) -> usize {
        self.state().values.len()
    }
}

impl fmt::Debug for ConcurrentPropertyContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("ConcurrentPropertyContainer")
            .field("values", &state.values)
            .field("has_parent", &state.parent.is_some())
            .field("search_options", &state.search_options)
            .finish()
    }
}

impl fmt::Display for ConcurrentPropertyContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_values(&self.values(), f)
    }
}
