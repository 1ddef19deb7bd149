use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use propbag::container::Container;
use propbag::parsers::{parse_bool, parse_i64, parse_string, ParserRegistry};
use propbag::parsing::{
    parse_row, row, ParseResult, ParserProvider, PropertyParser, Row, RowParser, Source,
};
use propbag::property::Property;
use propbag::search::{ContainerExt, SearchOptions};
use propbag::value::ValueSource;
use propbag::PropbagError;

fn age() -> Property<i64> {
    Property::new("Age")
}

fn run(parser: impl Into<Arc<dyn PropertyParser>>, input: &Row) -> Vec<ParseResult> {
    propbag::logging::try_init();
    parse_row(&[parser.into()], input, SearchOptions::default())
}

#[test]
fn present_text_is_parsed_as_defined() {
    let age = age();
    let results = run(Source::new("age", parse_i64).target(&age), &row([("age", Some("42"))]));
    let value = results[0].value().unwrap();
    assert_eq!(value.value_as::<i64>(), Some(&42));
    assert_eq!(value.source(), ValueSource::Defined);
    assert!(age.is(value.property()));
}

#[test]
fn missing_text_without_default_fails() {
    let age = age();
    let results = run(Source::new("age", parse_i64).target(&age), &Row::new());
    assert_eq!(results.len(), 1);
    assert!(!results[0].is_success());
}

#[test]
fn missing_text_with_default_yields_default_value() {
    let age = age();
    let parser = Source::new("age", parse_i64).target(&age).set_default_value(0);
    let results = run(parser, &Row::new());
    let value = results[0].value().unwrap();
    assert_eq!(value.value_as::<i64>(), Some(&0));
    assert_eq!(value.source(), ValueSource::DefaultValue);
}

#[test]
fn null_with_skip_null_yields_nothing() {
    let age = age();
    let parser = Source::new("age", parse_i64).target(&age).skip_null();
    assert!(run(parser, &row([("age", None::<&str>)])).is_empty());

    // null without skipping is treated like missing text
    let parser = Source::new("age", parse_i64).target(&age);
    let results = run(parser, &row([("age", None::<&str>)]));
    assert!(!results[0].is_success());
}

#[test]
fn one_failure_never_stops_the_row() {
    let name = Property::<String>::new("Name");
    let age = age();
    let active = Property::<bool>::new("Active");
    let parsers: Vec<Arc<dyn PropertyParser>> = vec![
        Source::new("age", parse_i64).target(&age).into(),
        Source::new("name", parse_string).target(&name).into(),
        Source::new("active", parse_bool).target(&active).into(),
    ];
    let outcome = RowParser::new(&parsers).parse(&row([
        ("age", Some("forty")),
        ("name", Some("Ann")),
        ("active", Some("yes")),
    ]));
    assert_eq!(outcome.results().len(), 3);
    assert_eq!(outcome.failures().count(), 1);
    assert_eq!(outcome.successes().count(), 2);

    let container = outcome.into_container();
    assert_eq!(container.get_value(&active), Some(true));
    assert_eq!(container.get_value(&name).as_deref(), Some("Ann"));
}

struct PersonParsers {
    birth_date: Property<NaiveDate>,
    kind: Property<String>,
    married: Property<bool>,
}

impl ParserProvider for PersonParsers {
    fn parsers(&self) -> Vec<Arc<dyn PropertyParser>> {
        let registry = ParserRegistry::new();
        vec![
            Source::new("kind", parse_string).target(&self.kind).into(),
            Source::<NaiveDate>::from_registry("born", &registry)
                .map(|source| source.target(&self.birth_date).skip_absent().into_ref())
                .unwrap_or_else(|e| panic!("no date parser: {e}")),
            Source::new("married", parse_bool)
                .target(&self.married)
                .include_when_value(&self.kind, String::from("person"))
                .set_default_value(false)
                .into(),
        ]
    }
}

#[test]
fn provider_parsers_build_containers() {
    let provider = PersonParsers {
        birth_date: Property::new("BirthDate"),
        kind: Property::new("Kind"),
        married: Property::new("Married"),
    };
    let parser = RowParser::new(&provider).with_search_options(SearchOptions::existing_only());

    let person = parser
        .parse_strict(&row([("kind", Some("person")), ("born", Some("1970-01-31"))]))
        .unwrap();
    assert_eq!(person.get_value(&provider.birth_date), NaiveDate::from_ymd_opt(1970, 1, 31));
    let married = person.get_property_value(&provider.married, None).unwrap();
    assert_eq!((*married.value(), married.source()), (false, ValueSource::DefaultValue));

    let thing = parser.parse_container(&row([("kind", Some("thing"))]));
    assert_eq!(thing.count(), 1);
    assert!(thing.get_value(&provider.married).is_none());
}

#[test]
fn strict_parsing_reports_the_failing_property() {
    let age = age();
    let parser = RowParser::from_parsers([Source::new("age", parse_i64).target(&age).into_ref()]);
    match parser.parse_strict(&row([("age", Some("x"))])) {
        Err(PropbagError::Parse { property, message }) => {
            assert_eq!(property, "Age");
            assert!(message.contains("'x'"));
        }
        other => panic!("expected a parse error, got {:?}", other),
    }
}

#[test]
fn callbacks_observe_in_declared_order() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let parsers: Vec<Arc<dyn PropertyParser>> = ["a", "b", "c"]
        .into_iter()
        .map(|key| {
            let seen = Arc::clone(&seen);
            Source::new(key, parse_string)
                .target(&Property::<String>::new(key))
                .on_parsed(move |_, result| {
                    let name = result.value().map(|v| v.property().name().to_owned());
                    seen.lock().unwrap().push(name);
                })
                .into_ref()
        })
        .collect();
    RowParser::new(&parsers).parse(&row([("a", Some("1")), ("c", Some("3"))]));
    let seen = seen.lock().unwrap();
    assert_eq!(
        *seen,
        vec![Some(String::from("a")), None, Some(String::from("c"))]
    );
}
