//! Property equality strategies.
//!
//! Every comparer pairs an equality with a hash that is consistent with it,
//! so properties can be put into hashed collections through
//! [`ComparedProperty`]. The one knowing exception is
//! [`PropertyComparer::ByNameOrAlias`]: it hashes the name only while equality
//! also accepts an alias match, so an alias hit can be missed by a hashed
//! lookup. Scans ([`PropertyComparer::equals`]) always see it.

use std::collections::HashSet;
use std::fmt;
use std::hash::{BuildHasherDefault, Hash, Hasher};
use std::sync::Arc;

use seahash::SeaHasher;
use serde::{Deserialize, Serialize};

use crate::property::{same_property, PropertyRef};

pub type PropertyHasher = BuildHasherDefault<SeaHasher>;
pub type PropertyPredicate = Arc<dyn Fn(&PropertyRef, &PropertyRef) -> bool + Send + Sync>;

#[derive(Clone)]
pub enum PropertyComparer {
    ByReference,
    ByTypeAndName,
    ByTypeAndNameIgnoreCase,
    ByNameOrAlias { ignore_case: bool },
    ByPredicate(PropertyPredicate),
}

fn names_equal(a: &str, b: &str, ignore_case: bool) -> bool {
    if ignore_case {
        a == b || a.to_uppercase() == b.to_uppercase()
    } else {
        a == b
    }
}

impl PropertyComparer {
    pub fn by_predicate(
        predicate: impl Fn(&PropertyRef, &PropertyRef) -> bool + Send + Sync + 'static,
    ) -> Self {
        PropertyComparer::ByPredicate(Arc::new(predicate))
    }
    pub fn is_reference(&self) -> bool {
        matches!(self, PropertyComparer::ByReference)
    }
    pub fn equals(&self, a: &PropertyRef, b: &PropertyRef) -> bool {
        if same_property(a, b) {
            return !matches!(self, PropertyComparer::ByPredicate(_)) || self.predicate(a, b);
        }
        match self {
            PropertyComparer::ByReference => false,
            PropertyComparer::ByTypeAndName => {
                a.value_type() == b.value_type() && a.name() == b.name()
            }
            PropertyComparer::ByTypeAndNameIgnoreCase => {
                a.value_type() == b.value_type() && names_equal(a.name(), b.name(), true)
            }
            PropertyComparer::ByNameOrAlias { ignore_case } => {
                names_equal(a.name(), b.name(), *ignore_case)
                    || a.alias().is_some_and(|alias| names_equal(alias, b.name(), *ignore_case))
                    || b.alias().is_some_and(|alias| names_equal(a.name(), alias, *ignore_case))
            }
            PropertyComparer::ByPredicate(_) => self.predicate(a, b),
        }
    }
    fn predicate(&self, a: &PropertyRef, b: &PropertyRef) -> bool {
        match self {
            PropertyComparer::ByPredicate(predicate) => predicate(a, b),
            _ => false,
        }
    }
    pub fn hash<H: Hasher>(&self, property: &PropertyRef, state: &mut H) {
        match self {
            PropertyComparer::ByReference => {
                (Arc::as_ptr(property) as *const () as usize).hash(state);
            }
            PropertyComparer::ByTypeAndName => {
                property.value_type().hash(state);
                property.name().hash(state);
            }
            PropertyComparer::ByTypeAndNameIgnoreCase => {
                property.value_type().hash(state);
                property.name().to_uppercase().hash(state);
            }
            PropertyComparer::ByNameOrAlias { ignore_case: true } => {
                property.name().to_uppercase().hash(state);
            }
            PropertyComparer::ByNameOrAlias { ignore_case: false } => {
                property.name().hash(state);
            }
            // nothing is known about a predicate, every property lands in one bucket
            PropertyComparer::ByPredicate(_) => (),
        }
    }
    /// Whether hashed lookups find everything [`PropertyComparer::equals`] would.
    pub fn has_exact_hash(&self) -> bool {
        !matches!(self, PropertyComparer::ByNameOrAlias { .. })
    }
}

impl Default for PropertyComparer {
    fn default() -> Self {
        PropertyComparer::ByTypeAndName
    }
}

impl fmt::Debug for PropertyComparer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyComparer::ByReference => f.write_str("ByReference"),
            PropertyComparer::ByTypeAndName => f.write_str("ByTypeAndName"),
            PropertyComparer::ByTypeAndNameIgnoreCase => f.write_str("ByTypeAndNameIgnoreCase"),
            PropertyComparer::ByNameOrAlias { ignore_case } => f
                .debug_struct("ByNameOrAlias")
                .field("ignore_case", ignore_case)
                .finish(),
            PropertyComparer::ByPredicate(_) => f.write_str("ByPredicate(..)"),
        }
    }
}

/// The comparers that can be named in settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparerKind {
    Reference,
    TypeAndName,
    TypeAndNameIgnoreCase,
    NameOrAlias,
    NameOrAliasIgnoreCase,
}

impl From<ComparerKind> for PropertyComparer {
    fn from(kind: ComparerKind) -> Self {
        match kind {
            ComparerKind::Reference => PropertyComparer::ByReference,
            ComparerKind::TypeAndName => PropertyComparer::ByTypeAndName,
            ComparerKind::TypeAndNameIgnoreCase => PropertyComparer::ByTypeAndNameIgnoreCase,
            ComparerKind::NameOrAlias => PropertyComparer::ByNameOrAlias { ignore_case: false },
            ComparerKind::NameOrAliasIgnoreCase => {
                PropertyComparer::ByNameOrAlias { ignore_case: true }
            }
        }
    }
}

// ------------- ComparedProperty -------------

/// A property paired with the comparer that defines its equality and hash.
#[derive(Clone, Debug)]
pub struct ComparedProperty {
    property: PropertyRef,
    comparer: PropertyComparer,
}

impl ComparedProperty {
    pub fn new(property: PropertyRef, comparer: PropertyComparer) -> Self {
        Self { property, comparer }
    }
    pub fn property(&self) -> &PropertyRef {
        &self.property
    }
}

impl PartialEq for ComparedProperty {
    fn eq(&self, other: &Self) -> bool {
        self.comparer.equals(&self.property, &other.property)
    }
}
impl Eq for ComparedProperty {}
impl Hash for ComparedProperty {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.comparer.hash(&self.property, state);
    }
}

pub type PropertySet = HashSet<ComparedProperty, PropertyHasher>;

pub fn property_set<'a>(
    properties: impl IntoIterator<Item = &'a PropertyRef>,
    comparer: &PropertyComparer,
) -> PropertySet {
    properties
        .into_iter()
        .map(|property| ComparedProperty::new(PropertyRef::clone(property), comparer.clone()))
        .collect()
}
