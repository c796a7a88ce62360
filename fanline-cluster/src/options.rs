//! Per-call option parsing.

use crate::error::Error;

/// Options accepted by mutating scatter calls.
///
/// Only the keys documented here exist; anything else is rejected so a
/// misspelled option fails loudly instead of silently defaulting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallOptions {
    /// Hand the affected rows back from a mutating call. Off by default:
    /// the reply rows are suppressed and only completion is reported.
    pub want_deleted_tuples: bool,
}

impl CallOptions {
    /// Parse options from string key/value pairs. Unknown keys are an
    /// error.
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Result<Self, Error> {
        let mut options = CallOptions::default();
        for &(key, value) in pairs {
            match key {
                "want_deleted_tuples" => {
                    options.want_deleted_tuples = parse_bool(key, value)?;
                }
                _ => return Err(Error::UnknownOption(key.to_owned())),
            }
        }
        Ok(options)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, Error> {
    match value {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(Error::InvalidOption {
            key: key.to_owned(),
            value: value.to_owned(),
        }),
    }
}
