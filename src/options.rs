use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use crate::env::{parse_flag, parse_number};
use crate::wire::VarintStrictness;

/// Policy for generating values of fields which are declared in the schema
/// but missing from a message.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddDefaultValue {
    /// Don't generate values.
    #[default]
    None,

    /// Generate values only for fields with an explicitly declared default.
    DeclaredOnly,

    /// Also generate enum fields (using the first value) and bool fields
    /// (using `false`).
    DeclaredPlusEnumBool,

    /// Also generate zero values for numeric fields.
    All,
}

impl AddDefaultValue {
    pub fn name(self) -> &'static str {
        match self {
            AddDefaultValue::None => "none",
            AddDefaultValue::DeclaredOnly => "declared_only",
            AddDefaultValue::DeclaredPlusEnumBool => "declared_plus_enum_bool",
            AddDefaultValue::All => "all",
        }
    }
}

impl Display for AddDefaultValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AddDefaultValue {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            AddDefaultValue::None,
            AddDefaultValue::DeclaredOnly,
            AddDefaultValue::DeclaredPlusEnumBool,
            AddDefaultValue::All,
        ]
        .into_iter()
        .find(|policy| policy.name() == s)
        .ok_or_else(|| format!("unknown default value policy \"{}\"", s))
    }
}

/// Upper bound on [`DecodeOptions::max_recursion_depth`].
///
/// Each level of nesting uses native stack, so this holds regardless of the
/// configured depth.
pub const MAX_RECURSION_DEPTH: u32 = 100;

/// Options that control how messages are decoded and displayed.
///
/// Options can be loaded from a JSON file with snake_case keys matching the
/// field names. Missing keys use the default value.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DecodeOptions {
    /// Show every type that fields without a schema could be decoded as.
    pub show_all_possible_field_types: bool,

    /// Decode length-delimited fields without a schema as strings if they
    /// contain valid UTF-8.
    pub try_dissect_as_string: bool,

    /// Show `bytes` values as text in the tree.
    pub dissect_bytes_as_string: bool,

    /// Generate values for fields missing from a message.
    pub add_default_value: AddDefaultValue,

    /// Produce the JSON mapping of messages.
    pub display_json_mapping: bool,

    /// Format timestamps in UTC rather than the local time zone.
    pub use_utc_for_timestamps: bool,

    /// Maximum nesting depth of embedded messages. The outermost message is
    /// at depth zero.
    ///
    /// Values above [`MAX_RECURSION_DEPTH`] are treated as
    /// `MAX_RECURSION_DEPTH`.
    pub max_recursion_depth: u32,

    pub varint_strictness: VarintStrictness,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            show_all_possible_field_types: false,
            try_dissect_as_string: false,
            dissect_bytes_as_string: false,
            add_default_value: AddDefaultValue::None,
            display_json_mapping: false,
            use_utc_for_timestamps: true,
            max_recursion_depth: MAX_RECURSION_DEPTH,
            varint_strictness: VarintStrictness::Lenient,
        }
    }
}

/// Errors reported when loading [`DecodeOptions`].
#[derive(Debug)]
pub enum OptionsError {
    /// An error occurred reading the file from disk.
    ReadFailed(std::io::Error),

    /// The file is not valid JSON or contains unknown options.
    ParseFailed(serde_json::Error),
}

impl Display for OptionsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OptionsError::ReadFailed(e) => write!(f, "read error: {}", e),
            OptionsError::ParseFailed(e) => write!(f, "parse error: {}", e),
        }
    }
}

impl Error for OptionsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            OptionsError::ReadFailed(e) => Some(e),
            OptionsError::ParseFailed(e) => Some(e),
        }
    }
}

/// Prefix of environment variables read by [`DecodeOptions::with_env_overrides`].
pub const ENV_PREFIX: &str = "PBINSPECT_";

impl DecodeOptions {
    /// Parse options from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self, OptionsError> {
        serde_json::from_str(json).map_err(OptionsError::ParseFailed)
    }

    /// Load options from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, OptionsError> {
        let json = std::fs::read_to_string(path).map_err(OptionsError::ReadFailed)?;
        Self::from_json_str(&json)
    }

    /// Apply overrides from `PBINSPECT_*` environment variables.
    ///
    /// The variables are `PBINSPECT_SHOW_ALL_TYPES`, `PBINSPECT_TRY_STRING`,
    /// `PBINSPECT_BYTES_AS_STRING`, `PBINSPECT_JSON`, `PBINSPECT_UTC` and
    /// `PBINSPECT_MAX_DEPTH`.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from variables looked up using `lookup`, which
    /// receives the full variable name.
    pub fn with_overrides<F: Fn(&str) -> Option<String>>(mut self, lookup: F) -> Self {
        let var = |suffix: &str| {
            let name = format!("{}{}", ENV_PREFIX, suffix);
            let value = lookup(&name);
            (name, value)
        };

        let flags = [
            ("SHOW_ALL_TYPES", &mut self.show_all_possible_field_types),
            ("TRY_STRING", &mut self.try_dissect_as_string),
            ("BYTES_AS_STRING", &mut self.dissect_bytes_as_string),
            ("JSON", &mut self.display_json_mapping),
            ("UTC", &mut self.use_utc_for_timestamps),
        ];
        for (suffix, flag) in flags {
            let (name, value) = var(suffix);
            if let Some(enabled) = parse_flag(&name, value.as_deref()) {
                *flag = enabled;
            }
        }

        let (name, value) = var("MAX_DEPTH");
        if let Some(depth) = parse_number(&name, value.as_deref()) {
            self.max_recursion_depth = depth;
        }

        self
    }
}
