//! Operations over containers and their parent chains: walking the chain,
//! flattening it, merging containers and projecting them onto a property set.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::comparer::{property_set, ComparedProperty, PropertyComparer};
use crate::container::{
    container_identity, Container, ContainerRef, MutablePropertyContainer, PropertyContainer,
};
use crate::property::PropertyRef;
use crate::value::PropertyValue;

/// How a value is merged into a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AddMode {
    /// Append, duplicates allowed.
    Add,
    /// Replace the matching entry, append when there is none.
    #[default]
    Set,
    /// Append only when no matching entry exists.
    SetNotExisting,
}

impl MutablePropertyContainer {
    pub fn merge_value(&mut self, value: PropertyValue, mode: AddMode) {
        match mode {
            AddMode::Add => self.add(value),
            AddMode::Set => {
                self.set(value);
            }
            AddMode::SetNotExisting => {
                if !self.contains(value.property()) {
                    self.add(value);
                }
            }
        }
    }
    pub fn merge_values(&mut self, values: impl IntoIterator<Item = PropertyValue>, mode: AddMode) {
        for value in values {
            self.merge_value(value, mode);
        }
    }
    pub fn merge_from(&mut self, other: &dyn Container, mode: AddMode) {
        self.merge_values(other.values().iter().cloned(), mode);
    }
}

/// Parents of `container`, nearest first. Stops at the first container seen twice.
pub fn ancestors(container: &dyn Container) -> Vec<ContainerRef> {
    let mut visited = vec![container_identity(container)];
    let mut chain: Vec<ContainerRef> = Vec::new();
    let mut next = container.parent();
    while let Some(parent) = next {
        let identity = container_identity(parent.as_ref());
        if visited.contains(&identity) {
            warn!(depth = chain.len(), "parent chain loops back, walk stopped");
            break;
        }
        visited.push(identity);
        next = parent.parent();
        chain.push(parent);
    }
    chain
}

/// The chain from the oldest ancestor down to `container` itself.
pub fn hierarchy(container: &ContainerRef) -> Vec<ContainerRef> {
    let mut chain = ancestors(container.as_ref());
    chain.reverse();
    chain.push(ContainerRef::clone(container));
    chain
}

/// Applies every ancestor root first, then `container`, in `Set` mode. The
/// result has no parent and keeps the options of `container`.
pub fn flatten(container: &dyn Container) -> PropertyContainer {
    let mut flat =
        MutablePropertyContainer::new(Vec::new(), None, Some(container.search_options()));
    let chain = ancestors(container);
    for ancestor in chain.iter().rev() {
        flat.merge_from(ancestor.as_ref(), AddMode::Set);
    }
    flat.merge_from(container, AddMode::Set);
    debug!(levels = chain.len() + 1, values = flat.count(), "flattened hierarchy");
    flat.freeze()
}

/// `target` followed by the values of `other`, merged in `mode`. Parent and
/// options are those of `target`.
pub fn merge(target: &dyn Container, other: &dyn Container, mode: AddMode) -> PropertyContainer {
    let mut merged = MutablePropertyContainer::copy_of(target);
    merged.merge_from(other, mode);
    merged.freeze()
}

/// Merges the present containers in order. The first one seeds the result and
/// is handed back untouched when nothing else is present.
pub fn merge_all(
    containers: impl IntoIterator<Item = Option<ContainerRef>>,
    mode: AddMode,
) -> Option<ContainerRef> {
    let mut present = containers.into_iter().flatten();
    let seed = present.next()?;
    let mut merged: Option<MutablePropertyContainer> = None;
    for other in present {
        merged
            .get_or_insert_with(|| MutablePropertyContainer::copy_of(seed.as_ref()))
            .merge_from(other.as_ref(), mode);
    }
    match merged {
        Some(merged) => Some(merged.freeze().into_ref()),
        None => Some(seed),
    }
}

/// Only the entries whose property is in `properties` under `comparer`. The
/// projection keeps the options but not the parent.
pub fn filter(
    container: &dyn Container,
    properties: &[PropertyRef],
    comparer: &PropertyComparer,
) -> PropertyContainer {
    let values = container.values();
    let kept: Vec<PropertyValue> = if comparer.has_exact_hash() {
        let wanted = property_set(properties, comparer);
        values
            .iter()
            .filter(|value| {
                wanted.contains(&ComparedProperty::new(
                    PropertyRef::clone(value.property()),
                    comparer.clone(),
                ))
            })
            .cloned()
            .collect()
    } else {
        values
            .iter()
            .filter(|value| {
                properties
                    .iter()
                    .any(|property| comparer.equals(value.property(), property))
            })
            .cloned()
            .collect()
    };
    PropertyContainer::new(kept, None, Some(container.search_options()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ConcurrentPropertyContainer;
    use crate::property::Property;
    use crate::search::ContainerExt;
    use std::sync::Arc;

    #[test]
    fn merge_modes() {
        let age = Property::<i64>::new("Age");
        let mut container = MutablePropertyContainer::empty();
        container.merge_value(PropertyValue::defined(&age, 1), AddMode::Set);
        container.merge_value(PropertyValue::defined(&age, 2), AddMode::SetNotExisting);
        assert_eq!(container.to_string(), "(Age: 1)");
        container.merge_value(PropertyValue::defined(&age, 3), AddMode::Set);
        assert_eq!(container.to_string(), "(Age: 3)");
        container.merge_value(PropertyValue::defined(&age, 4), AddMode::Add);
        assert_eq!(container.to_string(), "(Age: 3, Age: 4)");
    }

    #[test]
    fn merge_all_returns_lone_seed_untouched() {
        let age = Property::<i64>::new("Age");
        let seed = PropertyContainer::from_values(vec![PropertyValue::defined(&age, 1)]).into_ref();
        let merged = merge_all([None, Some(Arc::clone(&seed)), None], AddMode::Set).unwrap();
        assert!(Arc::ptr_eq(&merged, &seed));
        assert!(merge_all([None, None], AddMode::Set).is_none());
    }

    #[test]
    fn merge_all_applies_in_order() {
        let age = Property::<i64>::new("Age");
        let name = Property::<String>::new("Name");
        let first =
            PropertyContainer::from_values(vec![PropertyValue::defined(&age, 1)]).into_ref();
        let second = PropertyContainer::from_values(vec![
            PropertyValue::defined(&age, 2),
            PropertyValue::defined(&name, String::from("x")),
        ])
        .into_ref();
        let merged = merge_all([Some(first), Some(second)], AddMode::SetNotExisting).unwrap();
        assert_eq!(merged.get_value(&age), Some(1));
        assert_eq!(merged.get_value(&name).as_deref(), Some("x"));
    }

    #[test]
    fn filter_projects_onto_properties() {
        let age = Property::<i64>::new("Age");
        let name = Property::<String>::new("Name");
        let container = PropertyContainer::from_values(vec![
            PropertyValue::defined(&age, 1),
            PropertyValue::defined(&name, String::from("x")),
        ]);
        let other_age = Property::<i64>::new("Age").untyped();
        let by_name = filter(&container, &[other_age.clone()], &PropertyComparer::ByTypeAndName);
        assert_eq!(by_name.to_string(), "(Age: 1)");
        let by_reference = filter(&container, &[other_age], &PropertyComparer::ByReference);
        assert_eq!(by_reference.count(), 0);
        let by_alias = filter(
            &container,
            &[Property::<String>::new("Label").with_alias("Name").untyped()],
            &PropertyComparer::ByNameOrAlias { ignore_case: true },
        );
        assert_eq!(by_alias.to_string(), "(Name: x)");
    }

    #[test]
    fn ancestors_stop_at_a_loop() {
        let a = Arc::new(ConcurrentPropertyContainer::empty());
        let b = Arc::new(ConcurrentPropertyContainer::empty());
        a.set_parent(Some(b.clone()));
        b.set_parent(Some(a.clone()));
        let a_ref: ContainerRef = a.clone();
        assert_eq!(hierarchy(&a_ref).len(), 2);
        // break the loop so the containers can be dropped
        b.set_parent(None);
    }
}
