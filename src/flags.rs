//! Client-supplied flag maps and their validation against an action's
//! accepted flag set.

use std::collections::BTreeMap;

use crate::args;
use crate::error::{Error, Result};
use crate::flag::{Flag, FlagKind};

/// Flags supplied by a caller, keyed by catalog entry.
///
/// Iteration (and therefore token emission) follows catalog declaration
/// order, so the same map always assembles into the same command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagMap {
    entries: BTreeMap<Flag, String>,
}

impl FlagMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, flag: Flag, value: impl Into<String>) -> Self {
        self.entries.insert(flag, value.into());
        self
    }

    pub fn insert(&mut self, flag: Flag, value: impl Into<String>) -> Option<String> {
        self.entries.insert(flag, value.into())
    }

    pub fn get(&self, flag: Flag) -> Option<&str> {
        self.entries.get(&flag).map(String::as_str)
    }

    pub fn contains(&self, flag: Flag) -> bool {
        self.entries.contains_key(&flag)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Flag, &str)> {
        self.entries.iter().map(|(flag, value)| (*flag, value.as_str()))
    }

    /// Parse `name=value` (or bare `name` for boolean flags) entries.
    ///
    /// Only catalog membership is checked here; value checks happen in
    /// [`FlagMap::validate`].
    pub fn parse<I, S>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut map = FlagMap::new();
        for entry in entries {
            let entry = entry.as_ref();
            let (name, value) = entry.split_once('=').unwrap_or((entry, ""));
            let flag = Flag::lookup(name)
                .ok_or_else(|| Error::invalid_flag(name, "not a recognised flag"))?;
            map.insert(flag, value);
        }
        Ok(map)
    }

    /// Check every entry against `accepted` and against its declared kind.
    ///
    /// Pure: the map is never modified, so validating twice gives the same
    /// answer.
    pub fn validate(&self, accepted: &[Flag], action: &str) -> Result<()> {
        for (flag, value) in self.iter() {
            if !accepted.contains(&flag) {
                return Err(Error::invalid_flag(
                    flag.long_form(),
                    format!("the {} flag is not recognised by the {action} command", flag.long_form()),
                ));
            }
            check_value(flag, value)?;
        }
        Ok(())
    }

    /// Translate every entry into command tokens, in catalog order.
    pub fn to_args(&self) -> Vec<String> {
        self.iter()
            .flat_map(|(flag, value)| translate(flag, value))
            .collect()
    }
}

impl<S: Into<String>> FromIterator<(Flag, S)> for FlagMap {
    fn from_iter<T: IntoIterator<Item = (Flag, S)>>(iter: T) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(flag, value)| (flag, value.into()))
                .collect(),
        }
    }
}

/// Free-function form of [`FlagMap::validate`].
pub fn validate(flags: &FlagMap, accepted: &[Flag], action: &str) -> Result<()> {
    flags.validate(accepted, action)
}

fn check_value(flag: Flag, value: &str) -> Result<()> {
    match flag.kind() {
        FlagKind::String => Ok(()),
        FlagKind::Boolean => {
            if value.is_empty() || parse_bool(value).is_some() {
                Ok(())
            } else {
                Err(Error::invalid_flag(
                    flag.long_form(),
                    format!("the value {value} for flag {} is invalid", flag.long_form()),
                ))
            }
        }
        FlagKind::Integer => {
            if value.is_empty() {
                return Err(Error::invalid_flag(
                    flag.long_form(),
                    format!("flag {} must have a value", flag.long_form()),
                ));
            }
            value.parse::<i32>().map(|_| ()).map_err(|_| {
                Error::invalid_flag(
                    flag.long_form(),
                    format!("the value {value} for flag {} is invalid", flag.long_form()),
                )
            })
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    if value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

// A bare boolean flag (empty value) means "on".
fn translate(flag: Flag, value: &str) -> Vec<String> {
    match flag.kind() {
        FlagKind::String => args::string(flag.name(), Some(value)),
        FlagKind::Integer => args::integer(flag.name(), value.parse::<i32>().ok()),
        FlagKind::Boolean => {
            let value = if value.is_empty() {
                Some(true)
            } else {
                parse_bool(value)
            };
            args::bool_with_no(flag.name(), value)
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use proptest::sample::select;

    use super::*;

    fn reason(err: Error) -> (String, String) {
        match err {
            Error::InvalidFlag { flag, reason } => (flag, reason),
            other => panic!("expected InvalidFlag, got {other:?}"),
        }
    }

    #[test]
    fn unknown_flag_is_rejected_by_name() {
        let flags = FlagMap::new().with(Flag::AdminHost, "h");
        let err = flags.validate(&[Flag::Server], "deploy").unwrap_err();
        let (flag, reason) = reason(err);
        assert_eq!(flag, "--admin_host");
        assert!(reason.contains("deploy"));
    }

    #[test]
    fn integer_flag_needs_a_number() {
        let accepted = [Flag::Days];
        let err = FlagMap::new().with(Flag::Days, "abc").validate(&accepted, "get-logs");
        assert_eq!(reason(err.unwrap_err()).0, "--days");
        let err = FlagMap::new().with(Flag::Days, "").validate(&accepted, "get-logs");
        assert!(reason(err.unwrap_err()).1.contains("must have a value"));
        FlagMap::new().with(Flag::Days, "7").validate(&accepted, "get-logs").unwrap();
    }

    #[test]
    fn boolean_flag_accepts_empty_and_any_case() {
        let accepted = [Flag::Force];
        for value in ["", "true", "TRUE", "False"] {
            FlagMap::new().with(Flag::Force, value).validate(&accepted, "deploy").unwrap();
        }
        assert!(FlagMap::new().with(Flag::Force, "yes").validate(&accepted, "deploy").is_err());
    }

    #[test]
    fn server_flag_becomes_contiguous_tokens() {
        let flags = FlagMap::new().with(Flag::Server, "x.com");
        flags.validate(&[Flag::Server], "deploy").unwrap();
        assert_eq!(flags.to_args(), vec!["--server", "x.com"]);
    }

    #[test]
    fn translation_follows_catalog_order() {
        let flags = FlagMap::new()
            .with(Flag::Version, "v1")
            .with(Flag::Promote, "false")
            .with(Flag::Force, "")
            .with(Flag::Bucket, "gs://b");
        assert_eq!(
            flags.to_args(),
            vec!["--force", "--bucket", "gs://b", "--no-promote", "--version", "v1"]
        );
    }

    #[test]
    fn parse_understands_all_spellings() {
        let flags = FlagMap::parse(["server=x.com", "--days=3", "-f"]).unwrap();
        assert_eq!(flags.get(Flag::Server), Some("x.com"));
        assert_eq!(flags.get(Flag::Days), Some("3"));
        assert_eq!(flags.get(Flag::Force), Some(""));
        assert!(FlagMap::parse(["bogus=1"]).is_err());
    }

    proptest! {
        #[test]
        fn flags_outside_accepted_set_fail(
            flag in select(Flag::ALL.to_vec()),
            accepted in proptest::collection::vec(select(Flag::ALL.to_vec()), 0..8),
        ) {
            prop_assume!(!accepted.contains(&flag));
            let flags = FlagMap::new().with(flag, "1");
            let is_invalid_flag = matches!(flags.validate(&accepted, "x"), Err(Error::InvalidFlag { .. }));
            prop_assert!(is_invalid_flag);
        }

        #[test]
        fn non_boolean_words_fail_boolean_flags(value in "[a-z]{1,8}") {
            prop_assume!(value != "true" && value != "false");
            let flags = FlagMap::new().with(Flag::Promote, value);
            prop_assert!(flags.validate(&[Flag::Promote], "deploy").is_err());
        }

        #[test]
        fn non_numeric_values_fail_integer_flags(value in "[a-z ]{0,8}") {
            let flags = FlagMap::new().with(Flag::Port, value);
            prop_assert!(flags.validate(&[Flag::Port], "run").is_err());
        }

        #[test]
        fn well_typed_maps_validate_repeatedly(port in any::<i32>(), promote in any::<bool>(), host in "[a-z.]{0,12}") {
            let accepted = [Flag::Port, Flag::Promote, Flag::Host];
            let flags = FlagMap::new()
                .with(Flag::Port, port.to_string())
                .with(Flag::Promote, promote.to_string())
                .with(Flag::Host, host);
            prop_assert!(flags.validate(&accepted, "run").is_ok());
            prop_assert!(flags.validate(&accepted, "run").is_ok());
        }
    }
}
