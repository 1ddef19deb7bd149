//! Row parsing.
//!
//! A row is a map from source key to nullable text. Each [`PropertyParser`]
//! turns at most one entry of the row into a [`ParseResult`] for its target
//! property. Parsers run strictly in the declared order, and a failing parser
//! never stops the ones after it. Every parser goes through the same steps:
//!
//! 1. look the source key up, the entry is absent or exists (possibly null)
//! 2. skip when an exclude predicate matches
//! 3. skip when an include predicate fails
//! 4. absent or null text is replaced by the default source text, if any
//! 5. still no text: the default value, if any, is the result
//! 6. still no text and no default: a failure
//! 7. otherwise the parse function decides between success and failure
//! 8. the result is recorded, then the `on_parsed` callback observes it
//!
//! Successes are also added to a live container, so later parsers can look at
//! what earlier ones produced.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::container::{MutablePropertyContainer, PropertyContainer};
use crate::datatype::DataType;
use crate::error::{PropbagError, Result};
use crate::parsers::{ParseFn, ParserRegistry};
use crate::property::{Property, PropertyRef};
use crate::search::{ContainerExt, SearchOptions};
use crate::value::{PropertyValue, ValueSource};

/// One raw input record.
pub type Row = HashMap<String, Option<String>>;

/// Builds a [`Row`] from key and optional text pairs.
pub fn row<K, V>(entries: impl IntoIterator<Item = (K, Option<V>)>) -> Row
where
    K: Into<String>,
    V: Into<String>,
{
    entries
        .into_iter()
        .map(|(key, text)| (key.into(), text.map(Into::into)))
        .collect()
}

// ------------- results -------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    property: String,
    message: String,
}

impl ParseFailure {
    pub fn new(property: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            message: message.into(),
        }
    }
    pub fn property(&self) -> &str {
        &self.property
    }
    pub fn message(&self) -> &str {
        &self.message
    }
    pub fn into_error(self) -> PropbagError {
        PropbagError::Parse {
            property: self.property,
            message: self.message,
        }
    }
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Debug, Clone)]
pub enum ParseResult {
    Success(PropertyValue),
    Failure(ParseFailure),
}

impl ParseResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ParseResult::Success(_))
    }
    pub fn value(&self) -> Option<&PropertyValue> {
        match self {
            ParseResult::Success(value) => Some(value),
            ParseResult::Failure(_) => None,
        }
    }
    pub fn failure(&self) -> Option<&ParseFailure> {
        match self {
            ParseResult::Success(_) => None,
            ParseResult::Failure(failure) => Some(failure),
        }
    }
    /// The value, or the failure turned into an error.
    pub fn into_value(self) -> Result<PropertyValue> {
        match self {
            ParseResult::Success(value) => Ok(value),
            ParseResult::Failure(failure) => Err(failure.into_error()),
        }
    }
}

// ------------- contexts -------------

/// Where the text handed to the parse function came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    /// The row has no entry for the source key.
    Absent,
    /// The row has an entry, its text may still be null.
    Exists,
    /// The configured default source text stands in for missing text.
    DefaultSourceValue,
}

/// What a single parser found in the row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyParserContext {
    source_name: String,
    text: Option<String>,
    kind: SourceKind,
}

impl PropertyParserContext {
    pub fn source_name(&self) -> &str {
        &self.source_name
    }
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }
    pub fn kind(&self) -> SourceKind {
        self.kind
    }
    /// An entry exists but carries no text.
    pub fn is_null(&self) -> bool {
        self.kind == SourceKind::Exists && self.text.is_none()
    }
    pub fn is_absent(&self) -> bool {
        self.kind == SourceKind::Absent
    }
}

/// State of one row while its parsers run.
#[derive(Debug)]
pub struct ParseContext<'r> {
    row: &'r Row,
    results: Vec<ParseResult>,
    container: MutablePropertyContainer,
}

impl<'r> ParseContext<'r> {
    pub fn new(row: &'r Row, search_options: SearchOptions) -> Self {
        Self {
            row,
            results: Vec::new(),
            container: MutablePropertyContainer::new(Vec::new(), None, Some(search_options)),
        }
    }
    pub fn row(&self) -> &Row {
        self.row
    }
    /// Raw text for `key`: `None` when absent, `Some(None)` when null.
    pub fn source(&self, key: &str) -> Option<Option<&str>> {
        self.row.get(key).map(Option::as_deref)
    }
    pub fn results(&self) -> &[ParseResult] {
        &self.results
    }
    /// The successes so far.
    pub fn container(&self) -> &MutablePropertyContainer {
        &self.container
    }
    pub fn record(&mut self, result: ParseResult) {
        if let ParseResult::Success(value) = &result {
            self.container.add(value.clone());
        }
        self.results.push(result);
    }
    pub fn into_results(self) -> Vec<ParseResult> {
        self.results
    }
}

// ------------- parsers -------------

/// Decides whether a parser runs for the current row.
pub type ParserPredicate =
    Arc<dyn Fn(&ParseContext<'_>, &PropertyParserContext) -> bool + Send + Sync>;
/// Observes a result right after it was recorded.
pub type ParsedCallback = Arc<dyn Fn(&ParseContext<'_>, &ParseResult) + Send + Sync>;

pub trait PropertyParser: Send + Sync + fmt::Debug {
    fn source_name(&self) -> &str;
    fn target(&self) -> PropertyRef;
    /// Runs the parser against the row held by `context` and records what it
    /// produced, if anything.
    fn parse(&self, context: &mut ParseContext<'_>);
}

/// First builder stage: a source key and the function parsing its text.
pub struct Source<T: DataType> {
    name: String,
    parse: ParseFn<T>,
}

impl<T: DataType> Source<T> {
    pub fn new(
        name: impl Into<String>,
        parse: impl Fn(&str) -> std::result::Result<T, String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            parse: Arc::new(parse),
        }
    }
    pub fn with_parse_fn(name: impl Into<String>, parse: ParseFn<T>) -> Self {
        Self {
            name: name.into(),
            parse,
        }
    }
    /// Uses whatever `registry` holds for `T`.
    pub fn from_registry(name: impl Into<String>, registry: &ParserRegistry) -> Result<Self> {
        Ok(Self::with_parse_fn(name, registry.require::<T>()?))
    }
    pub fn target(self, property: &Property<T>) -> SourceParser<T> {
        SourceParser {
            source_name: self.name,
            parse: self.parse,
            target: property.clone(),
            default_value: None,
            default_source_value: None,
            excludes: Vec::new(),
            includes: Vec::new(),
            on_parsed: None,
        }
    }
}

/// Parses one source key into one typed property.
pub struct SourceParser<T: DataType> {
    source_name: String,
    parse: ParseFn<T>,
    target: Property<T>,
    default_value: Option<T>,
    default_source_value: Option<String>,
    excludes: Vec<ParserPredicate>,
    includes: Vec<ParserPredicate>,
    on_parsed: Option<ParsedCallback>,
}

impl<T: DataType> SourceParser<T> {
    /// The result when the row has no text for the source key.
    pub fn set_default_value(mut self, value: T) -> Self {
        self.default_value = Some(value);
        self
    }
    /// Text parsed instead when the row has none for the source key.
    pub fn set_default_source_value(mut self, text: impl Into<String>) -> Self {
        self.default_source_value = Some(text.into());
        self
    }
    pub fn exclude<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&ParseContext<'_>, &PropertyParserContext) -> bool + Send + Sync + 'static,
    {
        self.excludes.push(Arc::new(predicate));
        self
    }
    pub fn include<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&ParseContext<'_>, &PropertyParserContext) -> bool + Send + Sync + 'static,
    {
        self.includes.push(Arc::new(predicate));
        self
    }
    /// No result at all for a null entry.
    pub fn skip_null(self) -> Self {
        self.exclude(|_, source| source.is_null())
    }
    /// No result at all when the row lacks the source key.
    pub fn skip_absent(self) -> Self {
        self.exclude(|_, source| source.is_absent())
    }
    /// Runs only when another field of the raw row satisfies `predicate`.
    pub fn include_when_source(
        self,
        key: impl Into<String>,
        predicate: impl Fn(Option<&str>) -> bool + Send + Sync + 'static,
    ) -> Self {
        let key = key.into();
        self.include(move |context, _| predicate(context.source(&key).flatten()))
    }
    /// Runs only when an earlier parser produced `expected` for `property`.
    pub fn include_when_value<V: DataType>(self, property: &Property<V>, expected: V) -> Self {
        let property = property.clone();
        self.include(move |context, _| {
            context
                .container()
                .get_property_value(&property, Some(&SearchOptions::existing_only()))
                .is_some_and(|found| *found.value() == expected)
        })
    }
    pub fn on_parsed(
        mut self,
        callback: impl Fn(&ParseContext<'_>, &ParseResult) + Send + Sync + 'static,
    ) -> Self {
        self.on_parsed = Some(Arc::new(callback));
        self
    }
    pub fn target_property(&self) -> &Property<T> {
        &self.target
    }
    pub fn into_ref(self) -> Arc<dyn PropertyParser> {
        Arc::new(self)
    }

    fn locate(&self, context: &ParseContext<'_>) -> PropertyParserContext {
        match context.source(&self.source_name) {
            Some(text) => PropertyParserContext {
                source_name: self.source_name.clone(),
                text: text.map(str::to_owned),
                kind: SourceKind::Exists,
            },
            None => PropertyParserContext {
                source_name: self.source_name.clone(),
                text: None,
                kind: SourceKind::Absent,
            },
        }
    }
    fn skipped(&self, context: &ParseContext<'_>, source: &PropertyParserContext) -> bool {
        if self.excludes.iter().any(|exclude| exclude(context, source)) {
            trace!(property = self.target.name(), "excluded");
            return true;
        }
        if !self.includes.iter().all(|include| include(context, source)) {
            trace!(property = self.target.name(), "not included");
            return true;
        }
        false
    }
    fn resolve(&self, mut source: PropertyParserContext) -> ParseResult {
        if source.text.is_none() {
            if let Some(text) = &self.default_source_value {
                source.text = Some(text.clone());
                source.kind = SourceKind::DefaultSourceValue;
            }
        }
        let Some(text) = source.text.as_deref() else {
            return match &self.default_value {
                Some(value) => ParseResult::Success(PropertyValue::new(
                    &self.target,
                    value.clone(),
                    ValueSource::DefaultValue,
                )),
                None => ParseResult::Failure(ParseFailure::new(
                    self.target.name(),
                    format!(
                        "Source value for property '{}' is absent (source key '{}')",
                        self.target.name(),
                        self.source_name
                    ),
                )),
            };
        };
        match (self.parse)(text) {
            Ok(value) => ParseResult::Success(PropertyValue::defined(&self.target, value)),
            Err(error) => ParseResult::Failure(ParseFailure::new(
                self.target.name(),
                format!(
                    "Failed to parse property '{}' from value '{}': {}",
                    self.target.name(),
                    text,
                    error
                ),
            )),
        }
    }
}

impl<T: DataType> PropertyParser for SourceParser<T> {
    fn source_name(&self) -> &str {
        &self.source_name
    }
    fn target(&self) -> PropertyRef {
        self.target.untyped()
    }
    fn parse(&self, context: &mut ParseContext<'_>) {
        let source = self.locate(context);
        if self.skipped(context, &source) {
            return;
        }
        let result = self.resolve(source);
        if let ParseResult::Failure(failure) = &result {
            debug!(property = failure.property(), message = failure.message(), "parse failed");
        }
        context.record(result);
        let context: &ParseContext<'_> = context;
        if let (Some(callback), Some(recorded)) = (&self.on_parsed, context.results().last()) {
            callback(context, recorded);
        }
    }
}

impl<T: DataType> fmt::Debug for SourceParser<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceParser")
            .field("source_name", &self.source_name)
            .field("target", &self.target.name())
            .field("default_value", &self.default_value)
            .field("default_source_value", &self.default_source_value)
            .field("excludes", &self.excludes.len())
            .field("includes", &self.includes.len())
            .finish()
    }
}

impl<T: DataType> From<SourceParser<T>> for Arc<dyn PropertyParser> {
    fn from(parser: SourceParser<T>) -> Self {
        parser.into_ref()
    }
}

/// Runs `parsers` in order over `row`.
pub fn parse_row(
    parsers: &[Arc<dyn PropertyParser>],
    row: &Row,
    search_options: SearchOptions,
) -> Vec<ParseResult> {
    let mut context = ParseContext::new(row, search_options);
    for parser in parsers {
        parser.parse(&mut context);
    }
    context.into_results()
}

// ------------- ParseOutcome -------------

/// Everything one row produced.
#[derive(Debug, Clone)]
pub struct ParseOutcome {
    results: Vec<ParseResult>,
    search_options: SearchOptions,
}

impl ParseOutcome {
    pub fn new(results: Vec<ParseResult>, search_options: SearchOptions) -> Self {
        Self {
            results,
            search_options,
        }
    }
    pub fn results(&self) -> &[ParseResult] {
        &self.results
    }
    pub fn successes(&self) -> impl Iterator<Item = &PropertyValue> {
        self.results.iter().filter_map(ParseResult::value)
    }
    pub fn failures(&self) -> impl Iterator<Item = &ParseFailure> {
        self.results.iter().filter_map(ParseResult::failure)
    }
    pub fn is_success(&self) -> bool {
        self.results.iter().all(ParseResult::is_success)
    }
    /// The successes as a container, failures dropped.
    pub fn into_container(self) -> PropertyContainer {
        let values: Vec<PropertyValue> = self
            .results
            .into_iter()
            .filter_map(|result| match result {
                ParseResult::Success(value) => Some(value),
                ParseResult::Failure(_) => None,
            })
            .collect();
        PropertyContainer::new(values, None, Some(self.search_options))
    }
    /// The container, or the first failure as an error.
    pub fn into_result(self) -> Result<PropertyContainer> {
        if let Some(failure) = self.failures().next() {
            return Err(failure.clone().into_error());
        }
        Ok(self.into_container())
    }
}

// ------------- RowParser -------------

/// Supplies the ordered parser list for a kind of row.
pub trait ParserProvider {
    fn parsers(&self) -> Vec<Arc<dyn PropertyParser>>;
}

impl ParserProvider for Vec<Arc<dyn PropertyParser>> {
    fn parsers(&self) -> Vec<Arc<dyn PropertyParser>> {
        self.clone()
    }
}

/// Turns rows into containers with a fixed parser list.
#[derive(Debug, Clone)]
pub struct RowParser {
    parsers: Vec<Arc<dyn PropertyParser>>,
    search_options: SearchOptions,
}

impl RowParser {
    pub fn new(provider: &dyn ParserProvider) -> Self {
        Self::from_parsers(provider.parsers())
    }
    pub fn from_parsers(parsers: impl IntoIterator<Item = Arc<dyn PropertyParser>>) -> Self {
        Self {
            parsers: parsers.into_iter().collect(),
            search_options: SearchOptions::default(),
        }
    }
    /// Options handed to the live container and to produced containers.
    pub fn with_search_options(mut self, search_options: SearchOptions) -> Self {
        self.search_options = search_options;
        self
    }
    pub fn parsers(&self) -> &[Arc<dyn PropertyParser>] {
        &self.parsers
    }
    pub fn parse(&self, row: &Row) -> ParseOutcome {
        let results = parse_row(&self.parsers, row, self.search_options.clone());
        ParseOutcome::new(results, self.search_options.clone())
    }
    /// The successes only. Failures are logged.
    pub fn parse_container(&self, row: &Row) -> PropertyContainer {
        let outcome = self.parse(row);
        let failed = outcome.failures().count();
        if failed > 0 {
            debug!(failed, "row parsed with failures");
        }
        outcome.into_container()
    }
    /// Fails on the first parser failure of the row.
    pub fn parse_strict(&self, row: &Row) -> Result<PropertyContainer> {
        self.parse(row).into_result()
    }
}
