//! Parsing of configuration values read from environment variables.

use std::str::FromStr;

/// Interpret a string value such as "1" or "no" as a boolean.
pub fn str_as_bool(s: &str) -> Option<bool> {
    match s {
        "1" | "true" | "t" | "yes" | "y" => Some(true),
        "0" | "false" | "f" | "no" | "n" => Some(false),
        _ => None,
    }
}

/// Parse the value of a boolean flag named `name`.
///
/// Unrecognized values are logged and ignored.
pub fn parse_flag(name: &str, value: Option<&str>) -> Option<bool> {
    let value = value?;
    let flag = str_as_bool(value);
    if flag.is_none() {
        tracing::warn!(name, value, "unrecognized boolean value");
    }
    flag
}

/// Parse the value of a numeric setting named `name`.
///
/// Unparseable values are logged and ignored.
pub fn parse_number<T: FromStr>(name: &str, value: Option<&str>) -> Option<T> {
    let value = value?;
    let number = value.trim().parse().ok();
    if number.is_none() {
        tracing::warn!(name, value, "unrecognized numeric value");
    }
    number
}
