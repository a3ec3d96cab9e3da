//! Argument translation: one typed value in, zero or more command tokens out.
//!
//! Every function here is total and side-effect free. An absent or empty
//! value always produces no tokens, so callers can unconditionally
//! `extend` a command with the result.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::Path;

fn flag(name: &str) -> String {
    format!("--{name}")
}

/// `[--name, value]`, or `[]` if the value is absent or empty.
pub fn string(name: &str, value: Option<&str>) -> Vec<String> {
    match value {
        Some(value) if !value.is_empty() => vec![flag(name), value.to_string()],
        _ => Vec::new(),
    }
}

/// `[--name=value]`, or `[]` if the value is absent or empty.
pub fn string_with_eq(name: &str, value: Option<&str>) -> Vec<String> {
    match value {
        Some(value) if !value.is_empty() => vec![format!("--{name}={value}")],
        _ => Vec::new(),
    }
}

/// `[--name=v1, --name=v2, ...]`; empty elements are skipped.
pub fn repeated_with_eq<S: AsRef<str>>(name: &str, values: &[S]) -> Vec<String> {
    values
        .iter()
        .flat_map(|value| string_with_eq(name, Some(value.as_ref())))
        .collect()
}

/// `[--name, v1, --name, v2, ...]`; empty elements are skipped.
pub fn repeated<S: AsRef<str>>(name: &str, values: &[S]) -> Vec<String> {
    values
        .iter()
        .flat_map(|value| string(name, Some(value.as_ref())))
        .collect()
}

/// `[--name, value]`, or `[]` if absent.
pub fn integer<N: Display>(name: &str, value: Option<N>) -> Vec<String> {
    match value {
        Some(value) => vec![flag(name), value.to_string()],
        None => Vec::new(),
    }
}

/// `[--name=value]`, or `[]` if absent.
pub fn integer_with_eq<N: Display>(name: &str, value: Option<N>) -> Vec<String> {
    match value {
        Some(value) => vec![format!("--{name}={value}")],
        None => Vec::new(),
    }
}

/// `[--name]` only when the value is `Some(true)`.
pub fn bool(name: &str, value: Option<bool>) -> Vec<String> {
    if value == Some(true) {
        vec![flag(name)]
    } else {
        Vec::new()
    }
}

/// Three-valued boolean: `[--name]`, `[--no-name]` or `[]`.
pub fn bool_with_no(name: &str, value: Option<bool>) -> Vec<String> {
    match value {
        Some(true) => vec![flag(name)],
        Some(false) => vec![format!("--no-{name}")],
        None => Vec::new(),
    }
}

/// `[--name, path]`, or `[]` if the path is absent or empty.
pub fn path(name: &str, value: Option<&Path>) -> Vec<String> {
    match value {
        Some(value) if !value.as_os_str().is_empty() => {
            vec![flag(name), value.to_string_lossy().into_owned()]
        }
        _ => Vec::new(),
    }
}

/// A single `k1=v1,k2=v2` token, or `[]` if the map is empty.
pub fn key_values<K: Display, V: Display>(map: &BTreeMap<K, V>) -> Vec<String> {
    if map.is_empty() {
        return Vec::new();
    }
    let joined = map
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(",");
    vec![joined]
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn string_forms() {
        assert_eq!(string("server", Some("x.com")), vec!["--server", "x.com"]);
        assert!(string("server", Some("")).is_empty());
        assert!(string("server", None).is_empty());
        assert_eq!(string_with_eq("server", Some("x.com")), vec!["--server=x.com"]);
        assert!(string_with_eq("server", None).is_empty());
    }

    #[test]
    fn repeated_forms_preserve_order() {
        assert_eq!(
            repeated_with_eq("jvm_flag", &["-Xmx1g", "-Dfoo=bar"]),
            vec!["--jvm_flag=-Xmx1g", "--jvm_flag=-Dfoo=bar"]
        );
        assert_eq!(
            repeated("jvm_flag", &["a", "b"]),
            vec!["--jvm_flag", "a", "--jvm_flag", "b"]
        );
        assert!(repeated_with_eq::<&str>("jvm_flag", &[]).is_empty());
    }

    #[test]
    fn integer_forms() {
        assert_eq!(integer("port", Some(8080)), vec!["--port", "8080"]);
        assert_eq!(integer_with_eq("port", Some(-1)), vec!["--port=-1"]);
        assert!(integer::<i32>("port", None).is_empty());
    }

    #[test]
    fn boolean_forms() {
        assert_eq!(bool("promote", Some(true)), vec!["--promote"]);
        assert!(bool("promote", Some(false)).is_empty());
        assert!(bool("promote", None).is_empty());
        assert_eq!(bool_with_no("promote", Some(true)), vec!["--promote"]);
        assert_eq!(bool_with_no("promote", Some(false)), vec!["--no-promote"]);
        assert!(bool_with_no("promote", None).is_empty());
    }

    #[test]
    fn path_form() {
        let dir = PathBuf::from("/tmp/out");
        assert_eq!(path("output-directory", Some(&dir)), vec!["--output-directory", "/tmp/out"]);
        assert!(path("output-directory", Some(Path::new(""))).is_empty());
        assert!(path("output-directory", None).is_empty());
    }

    #[test]
    fn key_values_join_into_one_token() {
        let mut map = BTreeMap::new();
        map.insert("b", "2");
        map.insert("a", "1");
        assert_eq!(key_values(&map), vec!["a=1,b=2"]);
        assert!(key_values(&BTreeMap::<String, String>::new()).is_empty());
    }

    proptest! {
        #[test]
        fn string_value_survives_reparse(value in "[a-zA-Z0-9._/-]{1,24}") {
            let tokens = string("server", Some(&value));
            prop_assert_eq!(tokens.len(), 2);
            prop_assert_eq!(&tokens[1], &value);
        }

        #[test]
        fn string_with_eq_value_survives_reparse(value in "[a-zA-Z0-9._/=-]{1,24}") {
            let tokens = string_with_eq("server", Some(&value));
            let parsed = tokens[0].strip_prefix("--server=").map(str::to_string);
            prop_assert_eq!(parsed, Some(value));
        }

        #[test]
        fn integer_value_survives_reparse(value in any::<i32>()) {
            let tokens = integer_with_eq("port", Some(value));
            let parsed: i32 = tokens[0].strip_prefix("--port=").unwrap().parse().unwrap();
            prop_assert_eq!(parsed, value);
        }

        #[test]
        fn bool_with_no_value_survives_reparse(value in proptest::option::of(any::<bool>())) {
            let tokens = bool_with_no("promote", value);
            let parsed = match tokens.first().map(String::as_str) {
                Some("--promote") => Some(true),
                Some("--no-promote") => Some(false),
                _ => None,
            };
            prop_assert_eq!(parsed, value);
        }
    }
}
