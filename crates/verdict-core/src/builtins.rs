//! Builtin functions and methods available to expressions

use crate::interpreter::EvalError;
use crate::value::{Function, Value};
use chrono::{DateTime, Datelike, FixedOffset, Timelike, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use regex::Regex;
use std::num::NonZeroUsize;

/// Global functions, `f(args)`
pub const FUNCTIONS: &[&str] = &[
    "now",
    "timestamp",
    "duration",
    "size",
    "int",
    "double",
    "string",
];

/// Receiver-style methods, `x.m(args)`
pub const METHODS: &[&str] = &[
    "matches",
    "startsWith",
    "endsWith",
    "contains",
    "size",
    "getFullYear",
    "getMonth",
    "getDayOfMonth",
    "getDate",
    "getDayOfWeek",
    "getDayOfYear",
    "getHours",
    "getMinutes",
    "getSeconds",
    "getMilliseconds",
];

/// Default number of compiled patterns kept per cache
pub const DEFAULT_REGEX_CACHE_SIZE: usize = 256;

pub fn is_function(name: &str) -> bool {
    FUNCTIONS.contains(&name)
}

pub fn is_method(name: &str) -> bool {
    METHODS.contains(&name)
}

/// LRU cache of compiled regular expressions shared by every program of a compiler
#[derive(Debug)]
pub struct RegexCache {
    inner: Mutex<LruCache<String, Regex>>,
}

impl RegexCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Return the compiled pattern, compiling and caching it on first use
    pub fn get_or_compile(&self, pattern: &str) -> Result<Regex, regex::Error> {
        let mut cache = self.inner.lock();
        if let Some(regex) = cache.get(pattern) {
            return Ok(regex.clone());
        }
        let regex = Regex::new(pattern)?;
        cache.put(pattern.to_string(), regex.clone());
        Ok(regex)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RegexCache {
    fn default() -> Self {
        Self::new(DEFAULT_REGEX_CACHE_SIZE)
    }
}

impl Function {
    /// Invoke the accessor bound in the context
    pub fn call(&self, args: &[Value]) -> Result<Value, EvalError> {
        match (self, args) {
            (Function::Now, []) => Ok(Value::Timestamp(Utc::now())),
            (Function::Timestamp, [Value::String(s)]) => parse_timestamp(s),
            (Function::Timestamp, [Value::Timestamp(t)]) => Ok(Value::Timestamp(*t)),
            (Function::Timestamp, [Value::Int(secs)]) => DateTime::from_timestamp(*secs, 0)
                .map(Value::Timestamp)
                .ok_or_else(|| EvalError::Overflow("timestamp".to_string())),
            _ => Err(EvalError::no_overload(self.name(), args)),
        }
    }
}

/// Call a global builtin function
pub fn call_function(name: &str, args: &[Value]) -> Result<Value, EvalError> {
    match name {
        "now" => Function::Now.call(args),
        "timestamp" => Function::Timestamp.call(args),
        "duration" => match args {
            [Value::String(s)] => parse_duration(s),
            [Value::Duration(d)] => Ok(Value::Duration(*d)),
            _ => Err(EvalError::no_overload(name, args)),
        },
        "size" => match args {
            [value] => size_of(value).ok_or_else(|| EvalError::no_overload(name, args)),
            _ => Err(EvalError::no_overload(name, args)),
        },
        "int" => match args {
            [Value::Int(i)] => Ok(Value::Int(*i)),
            [Value::Float(f)] => float_to_int(*f),
            [Value::String(s)] => s.trim().parse::<i64>().map(Value::Int).map_err(|e| {
                EvalError::InvalidArgument {
                    function: name.to_string(),
                    message: e.to_string(),
                }
            }),
            [Value::Timestamp(t)] => Ok(Value::Int(t.timestamp())),
            _ => Err(EvalError::no_overload(name, args)),
        },
        "double" => match args {
            [Value::Int(i)] => Ok(Value::Float(*i as f64)),
            [Value::Float(f)] => Ok(Value::Float(*f)),
            [Value::String(s)] => s.trim().parse::<f64>().map(Value::Float).map_err(|e| {
                EvalError::InvalidArgument {
                    function: name.to_string(),
                    message: e.to_string(),
                }
            }),
            _ => Err(EvalError::no_overload(name, args)),
        },
        "string" => match args {
            [v @ (Value::String(_)
            | Value::Int(_)
            | Value::Float(_)
            | Value::Bool(_)
            | Value::Timestamp(_)
            | Value::Duration(_))] => Ok(Value::String(v.to_string())),
            _ => Err(EvalError::no_overload(name, args)),
        },
        _ => Err(EvalError::UnknownFunction(name.to_string())),
    }
}

/// Call a receiver-style builtin method
pub fn call_method(
    target: &Value,
    name: &str,
    args: &[Value],
    regexes: &RegexCache,
) -> Result<Value, EvalError> {
    let overload = || {
        let mut operands = Vec::with_capacity(args.len() + 1);
        operands.push(target.clone());
        operands.extend_from_slice(args);
        EvalError::no_overload(name, &operands)
    };

    match (target, name, args) {
        (Value::String(s), "matches", [Value::String(pattern)]) => {
            let regex =
                regexes
                    .get_or_compile(pattern)
                    .map_err(|e| EvalError::InvalidArgument {
                        function: name.to_string(),
                        message: format!("invalid regex '{}': {}", pattern, e),
                    })?;
            Ok(Value::Bool(regex.is_match(s)))
        }
        (Value::String(s), "startsWith", [Value::String(p)]) => Ok(Value::Bool(s.starts_with(p.as_str()))),
        (Value::String(s), "endsWith", [Value::String(p)]) => Ok(Value::Bool(s.ends_with(p.as_str()))),
        (Value::String(s), "contains", [Value::String(p)]) => Ok(Value::Bool(s.contains(p.as_str()))),
        (_, "size", []) => size_of(target).ok_or_else(overload),
        (Value::Timestamp(t), _, []) => timestamp_accessor(&t.fixed_offset(), name).ok_or_else(overload),
        (Value::Timestamp(t), _, [Value::String(zone)]) => {
            let offset = parse_offset(zone).ok_or_else(|| EvalError::InvalidArgument {
                function: name.to_string(),
                message: format!("unsupported time zone '{}'", zone),
            })?;
            timestamp_accessor(&t.with_timezone(&offset), name).ok_or_else(overload)
        }
        (Value::Duration(d), _, []) => {
            let total = match name {
                "getHours" => d.num_hours(),
                "getMinutes" => d.num_minutes(),
                "getSeconds" => d.num_seconds(),
                "getMilliseconds" => d.num_milliseconds(),
                _ => return Err(overload()),
            };
            Ok(Value::Int(total))
        }
        _ => Err(overload()),
    }
}

fn size_of(value: &Value) -> Option<Value> {
    let len = match value {
        Value::String(s) => s.chars().count(),
        Value::List(items) => items.len(),
        Value::Map(map) => map.len(),
        _ => return None,
    };
    Some(Value::Int(len as i64))
}

fn float_to_int(f: f64) -> Result<Value, EvalError> {
    if f.is_finite() && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Ok(Value::Int(f.trunc() as i64))
    } else {
        Err(EvalError::Overflow("int".to_string()))
    }
}

fn parse_timestamp(text: &str) -> Result<Value, EvalError> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| Value::Timestamp(t.with_timezone(&Utc)))
        .map_err(|e| EvalError::InvalidArgument {
            function: "timestamp".to_string(),
            message: format!("'{}': {}", text, e),
        })
}

fn parse_duration(text: &str) -> Result<Value, EvalError> {
    let invalid = |message: String| EvalError::InvalidArgument {
        function: "duration".to_string(),
        message,
    };
    let std = humantime::parse_duration(text).map_err(|e| invalid(format!("'{}': {}", text, e)))?;
    chrono::Duration::from_std(std)
        .map(Value::Duration)
        .map_err(|e| invalid(e.to_string()))
}

/// `UTC`, `Z` or a fixed offset such as `+05:30` / `-0800`
fn parse_offset(zone: &str) -> Option<FixedOffset> {
    if zone.eq_ignore_ascii_case("utc") || zone == "Z" {
        return FixedOffset::east_opt(0);
    }

    let (sign, rest) = match zone.as_bytes().first()? {
        b'+' => (1, &zone[1..]),
        b'-' => (-1, &zone[1..]),
        _ => return None,
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

fn timestamp_accessor(t: &DateTime<FixedOffset>, name: &str) -> Option<Value> {
    let value = match name {
        "getFullYear" => i64::from(t.year()),
        "getMonth" => i64::from(t.month0()),
        "getDayOfMonth" => i64::from(t.day0()),
        "getDate" => i64::from(t.day()),
        "getDayOfWeek" => i64::from(t.weekday().num_days_from_sunday()),
        "getDayOfYear" => i64::from(t.ordinal0()),
        "getHours" => i64::from(t.hour()),
        "getMinutes" => i64::from(t.minute()),
        "getSeconds" => i64::from(t.second()),
        "getMilliseconds" => i64::from(t.timestamp_subsec_millis()),
        _ => return None,
    };
    Some(Value::Int(value))
}
