//! Text parse functions for row parsing, and a per-type table of them.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::hash::BuildHasherDefault;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use lazy_static::lazy_static;
use regex::Regex;
use seahash::SeaHasher;

use crate::cache::BoundedCache;
use crate::datatype::{DataType, Decimal};
use crate::error::{PropbagError, Result};

/// Turns source text into a typed value, or explains why it cannot.
pub type ParseFn<T> = Arc<dyn Fn(&str) -> std::result::Result<T, String> + Send + Sync>;

lazy_static! {
    // so the default list separator is compiled once
    static ref LIST_SEPARATOR: Regex = Regex::new(r"\s*[,;]\s*").expect("list separator pattern");
}

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d.%m.%Y", "%Y/%m/%d"];
const DATE_TIME_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

pub fn parse_string(text: &str) -> std::result::Result<String, String> {
    Ok(text.to_owned())
}

pub fn parse_i32(text: &str) -> std::result::Result<i32, String> {
    text.trim().parse::<i32>().map_err(|e| e.to_string())
}

pub fn parse_i64(text: &str) -> std::result::Result<i64, String> {
    text.trim().parse::<i64>().map_err(|e| e.to_string())
}

pub fn parse_u32(text: &str) -> std::result::Result<u32, String> {
    text.trim().parse::<u32>().map_err(|e| e.to_string())
}

pub fn parse_u64(text: &str) -> std::result::Result<u64, String> {
    text.trim().parse::<u64>().map_err(|e| e.to_string())
}

pub fn parse_f64(text: &str) -> std::result::Result<f64, String> {
    text.trim().parse::<f64>().map_err(|e| e.to_string())
}

/// Accepts `true/false`, `yes/no`, `y/n` and `1/0`, case insensitively.
pub fn parse_bool(text: &str) -> std::result::Result<bool, String> {
    match text.trim().to_lowercase().as_str() {
        "true" | "yes" | "y" | "1" => Ok(true),
        "false" | "no" | "n" | "0" => Ok(false),
        other => Err(format!("'{}' is not a boolean", other)),
    }
}

pub fn parse_date(text: &str) -> std::result::Result<NaiveDate, String> {
    let text = text.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
        .ok_or_else(|| format!("'{}' is not a date", text))
}

/// Date-times, or plain dates taken as midnight.
pub fn parse_date_time(text: &str) -> std::result::Result<NaiveDateTime, String> {
    let text = text.trim();
    DATE_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            parse_date(text)
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| format!("'{}' is not a date-time", text))
}

pub fn parse_decimal(text: &str) -> std::result::Result<Decimal, String> {
    Decimal::from_str(text.trim()).ok_or_else(|| format!("'{}' is not a decimal", text.trim()))
}

fn split_list(separator: &Regex, text: &str) -> Vec<String> {
    separator
        .split(text.trim())
        .filter(|item| !item.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Comma or semicolon separated items, surrounding blanks dropped.
pub fn parse_list(text: &str) -> std::result::Result<Vec<String>, String> {
    Ok(split_list(&LIST_SEPARATOR, text))
}

pub fn parse_fn<T: DataType>(
    parse: impl Fn(&str) -> std::result::Result<T, String> + Send + Sync + 'static,
) -> ParseFn<T> {
    Arc::new(parse)
}

// ------------- ParserRegistry -------------

type TypeHasher = BuildHasherDefault<SeaHasher>;

// Compiled custom separators are kept around, these many at most.
const SEPARATOR_CACHE_ITEMS: usize = 32;

/// One parse function per value type, filled when the registry is built.
pub struct ParserRegistry {
    parsers: HashMap<TypeId, Arc<dyn Any + Send + Sync>, TypeHasher>,
    separators: BoundedCache<String, Arc<Regex>>,
}

impl ParserRegistry {
    /// A registry without any parser.
    pub fn empty() -> Self {
        Self {
            parsers: HashMap::default(),
            separators: BoundedCache::new(SEPARATOR_CACHE_ITEMS),
        }
    }
    /// A registry holding the stock parsers of this module.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(parse_string);
        registry.register(parse_bool);
        registry.register(parse_i32);
        registry.register(parse_i64);
        registry.register(parse_u32);
        registry.register(parse_u64);
        registry.register(parse_f64);
        registry.register(parse_date);
        registry.register(parse_date_time);
        registry.register(parse_decimal);
        registry.register(parse_list);
        registry
    }
    pub fn register<T: DataType>(
        &mut self,
        parse: impl Fn(&str) -> std::result::Result<T, String> + Send + Sync + 'static,
    ) {
        let parse: ParseFn<T> = Arc::new(parse);
        self.parsers.insert(TypeId::of::<T>(), Arc::new(parse));
    }
    pub fn get<T: DataType>(&self) -> Option<ParseFn<T>> {
        self.parsers
            .get(&TypeId::of::<T>())
            .and_then(|parse| parse.downcast_ref::<ParseFn<T>>())
            .cloned()
    }
    pub fn require<T: DataType>(&self) -> Result<ParseFn<T>> {
        self.get::<T>().ok_or_else(|| {
            PropbagError::Invariant(format!("no parser registered for {}", T::DATA_TYPE))
        })
    }
    /// A list parser splitting on a literal separator.
    pub fn list_parser(&self, separator: &str) -> Result<ParseFn<Vec<String>>> {
        let pattern = format!(r"\s*{}\s*", regex::escape(separator));
        let regex = match self.separators.get(&pattern) {
            Some(regex) => regex,
            None => {
                let compiled = Arc::new(
                    Regex::new(&pattern).map_err(|e| PropbagError::Invariant(e.to_string()))?,
                );
                self.separators.get_or_add(pattern, |_| compiled)
            }
        };
        Ok(Arc::new(move |text: &str| Ok(split_list(&regex, text))))
    }
    pub fn len(&self) -> usize {
        self.parsers.len()
    }
    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_parsers() {
        assert_eq!(parse_i64(" 42 "), Ok(42));
        assert!(parse_i64("4x2").is_err());
        assert_eq!(parse_bool("Yes"), Ok(true));
        assert_eq!(parse_bool("0"), Ok(false));
        assert!(parse_bool("maybe").is_err());
        assert_eq!(parse_date("2004-06-19"), Ok(NaiveDate::from_ymd_opt(2004, 6, 19).unwrap()));
        assert_eq!(parse_date("19.06.2004"), parse_date("2004-06-19"));
        assert_eq!(
            parse_date_time("2004-06-19").unwrap(),
            NaiveDate::from_ymd_opt(2004, 6, 19).unwrap().and_hms_opt(0, 0, 0).unwrap()
        );
        assert_eq!(parse_decimal("12.50").unwrap().to_string(), "12.50");
        let abc = vec![String::from("a"), String::from("b"), String::from("c")];
        assert_eq!(parse_list("a, b;c,,"), Ok(abc));
    }

    #[test]
    fn registry_looks_up_by_type() {
        let registry = ParserRegistry::new();
        let parse = registry.get::<i64>().unwrap();
        assert_eq!(parse("7"), Ok(7));
        assert!(registry.get::<Option<i64>>().is_none());
        assert!(registry.require::<Option<i64>>().is_err());

        let mut registry = ParserRegistry::empty();
        assert!(registry.is_empty());
        registry.register(|text: &str| Ok::<_, String>(Some(text.len() as i64)));
        assert_eq!(registry.get::<Option<i64>>().unwrap()("abc"), Ok(Some(3)));
    }

    #[test]
    fn custom_list_separators_are_cached() {
        let registry = ParserRegistry::new();
        let pipes = registry.list_parser("|").unwrap();
        let abc = vec![String::from("a"), String::from("b"), String::from("c")];
        assert_eq!(pipes("a | b|c"), Ok(abc));
        registry.list_parser("|").unwrap();
        assert_eq!(registry.separators.len(), 1);
    }
}
