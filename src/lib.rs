//! Propbag – strongly typed property bags with hierarchical value resolution.
//!
//! A property bag stores values under typed keys instead of fixed struct fields:
//! * A [`property::Property`] is an immutable typed descriptor (name, optional
//!   alias, default value, calculator and examples). Properties are shared
//!   through `Arc` and compared by reference unless a comparer says otherwise.
//! * A [`value::PropertyValue`] is a `(property, value, source)` triple, where
//!   [`value::ValueSource`] records whether the value was set explicitly,
//!   calculated, defaulted or is a `NotDefined` sentinel.
//! * A [`container::Container`] is an ordered collection of property values
//!   with an optional parent. Containers come immutable, mutable
//!   (`&mut self`) and concurrent (one mutex per instance).
//!
//! ## Resolution
//! Reading a value goes through a [`search::SearchAlgorithm`]. The stock
//! [`search::DefaultSearch`] gives explicit values anywhere in the parent
//! chain precedence over calculators, and calculators precedence over
//! defaults. [`search::SearchOptions`] switch the individual steps on and off
//! and choose the [`comparer::PropertyComparer`] deciding when two distinct
//! properties count as the same.
//!
//! ## Modules
//! * [`datatype`] – The [`datatype::DataType`] trait and the provided value types.
//! * [`property`], [`value`], [`container`] – The data model.
//! * [`comparer`], [`search`] – Property equality and value resolution.
//! * [`hierarchy`] – Parent chains, flattening, merging and filtering.
//! * [`cache`], [`metadata`] – Bounded and expiring caches, per-object metadata.
//! * [`parsers`], [`parsing`] – Turning raw text rows into containers.
//! * [`settings`], [`logging`] – Configuration and log output.
//!
//! ## Quick Start
//! ```
//! use propbag::container::{Container, MutablePropertyContainer};
//! use propbag::parsers::parse_i64;
//! use propbag::parsing::{row, RowParser, Source};
//! use propbag::property::Property;
//! use propbag::search::ContainerExt;
//! use propbag::value::ValueSource;
//!
//! let age = Property::<i64>::new("Age").with_default_value(18);
//! let parser = RowParser::from_parsers([Source::new("age", parse_i64).target(&age).into_ref()]);
//! let parsed = parser.parse_container(&row([("age", Some("42"))])).into_ref();
//!
//! let mut child = MutablePropertyContainer::empty();
//! child.set_parent(Some(parsed));
//! let found = child.get_property_value(&age, None).unwrap();
//! assert_eq!(*found.value(), 42);
//! assert_eq!(found.source(), ValueSource::Defined);
//! assert_eq!(child.count(), 0);
//! ```

pub mod cache;
pub mod comparer;
pub mod container;
pub mod datatype;
pub mod error;
pub mod hierarchy;
pub mod logging;
pub mod metadata;
pub mod parsers;
pub mod parsing;
pub mod property;
pub mod search;
pub mod settings;
pub mod value;

pub use error::{PropbagError, Result};
