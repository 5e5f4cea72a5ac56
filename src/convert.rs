//! Type converter registry
//!
//! Maps a parameter's declared `type_name` to a `string -> Value`
//! conversion function. The built-in set covers integers of all standard
//! widths, floating point, boolean, string passthrough, UUID, ISO-8601
//! datetimes, and case-insensitive enumerations; hosts extend it with
//! their own enum types via [`ConverterRegistry::register_enum`].

use indexmap::IndexMap;
use std::sync::Arc;

use crate::registry::binding::Value;

pub type ConvertFn = Arc<dyn Fn(&str) -> Option<Value> + Send + Sync>;

pub struct ConverterRegistry {
    converters: IndexMap<String, ConvertFn>,
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        let mut registry = Self { converters: IndexMap::new() };
        registry.register("i8", |s| s.parse::<i8>().ok().map(Value::I8));
        registry.register("i16", |s| s.parse::<i16>().ok().map(Value::I16));
        registry.register("i32", |s| s.parse::<i32>().ok().map(Value::I32));
        registry.register("i64", |s| s.parse::<i64>().ok().map(Value::I64));
        registry.register("u8", |s| s.parse::<u8>().ok().map(Value::U8));
        registry.register("u16", |s| s.parse::<u16>().ok().map(Value::U16));
        registry.register("u32", |s| s.parse::<u32>().ok().map(Value::U32));
        registry.register("u64", |s| s.parse::<u64>().ok().map(Value::U64));
        registry.register("f32", |s| s.parse::<f32>().ok().map(Value::F32));
        registry.register("f64", |s| s.parse::<f64>().ok().map(Value::F64));
        registry.register("bool", |s| parse_bool(s).map(Value::Bool));
        registry.register("string", |s| Some(Value::Str(s.to_string())));
        registry.register("uuid", |s| uuid::Uuid::parse_str(s).ok().map(Value::Uuid));
        registry.register("datetime", |s| {
            chrono::DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| Value::DateTime(dt.with_timezone(&chrono::Utc)))
        });
        registry
    }
}

impl ConverterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, type_name: &str, f: impl Fn(&str) -> Option<Value> + Send + Sync + 'static) {
        self.converters.insert(type_name.to_lowercase(), Arc::new(f));
    }

    /// Registers a case-insensitive-name-or-integer-index enum converter,
    /// yielding `Value::Enum(<canonical variant name>)` on success.
    pub fn register_enum(&mut self, type_name: &str, variants: &[&str]) {
        let variants: Vec<String> = variants.iter().map(|v| v.to_string()).collect();
        self.converters.insert(
            type_name.to_lowercase(),
            Arc::new(move |s: &str| {
                if let Ok(index) = s.parse::<usize>() {
                    return variants.get(index).cloned().map(Value::Enum);
                }
                variants
                    .iter()
                    .find(|v| v.eq_ignore_ascii_case(s))
                    .cloned()
                    .map(Value::Enum)
            }),
        );
    }

    pub fn convert(&self, type_name: &str, token: &str) -> Option<Value> {
        self.converters.get(&type_name.to_lowercase()).and_then(|f| f(token))
    }

    pub fn supports(&self, type_name: &str) -> bool {
        self.converters.contains_key(&type_name.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_accepts_all_documented_spellings() {
        let registry = ConverterRegistry::new();
        for (input, expected) in [
            ("true", true),
            ("TRUE", true),
            ("yes", true),
            ("1", true),
            ("false", false),
            ("no", false),
            ("0", false),
        ] {
            assert_eq!(registry.convert("bool", input), Some(Value::Bool(expected)));
        }
        assert_eq!(registry.convert("bool", "maybe"), None);
    }

    #[test]
    fn integer_overflow_fails_conversion() {
        let registry = ConverterRegistry::new();
        assert_eq!(registry.convert("i8", "999"), None);
        assert_eq!(registry.convert("u32", "-1"), None);
    }

    #[test]
    fn uuid_and_datetime_round_trip() {
        let registry = ConverterRegistry::new();
        let id = uuid::Uuid::new_v4();
        assert_eq!(registry.convert("uuid", &id.to_string()), Some(Value::Uuid(id)));
        assert_eq!(registry.convert("datetime", "2024-01-02T03:04:05Z").is_some(), true);
    }

    #[test]
    fn enum_matches_case_insensitive_name_or_index() {
        let mut registry = ConverterRegistry::new();
        registry.register_enum("loglevel", &["Info", "Warning", "Error"]);
        assert_eq!(registry.convert("loglevel", "warning"), Some(Value::Enum("Warning".into())));
        assert_eq!(registry.convert("loglevel", "2"), Some(Value::Enum("Error".into())));
        assert_eq!(registry.convert("loglevel", "bogus"), None);
    }
}
