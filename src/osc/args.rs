//! Typed argument validation.
//!
//! A template string picks one character per positional argument:
//! `s` string, `i` integer (decimal, `0x` hex or `%` binary), `f` float,
//! `b` boolean, `c` MIDI channel (1..16, converted to a 0-based index),
//! `o` existing operator name. Tokens beyond the template pass through as
//! strings, which is how variadic commands like `op` pick up their tail.

use crate::graph::SharedRegistry;
use crate::osc::CommandError;

#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Arg {
    pub fn text(&self) -> &str {
        match self {
            Arg::Str(s) => s,
            _ => "",
        }
    }

    pub fn integer(&self) -> i64 {
        match self {
            Arg::Int(v) => *v,
            _ => 0,
        }
    }

    pub fn flag(&self) -> bool {
        matches!(self, Arg::Bool(true))
    }
}

/// Integer with the dialect's radix prefixes: `0x` hex, `%` binary,
/// otherwise decimal.
pub fn parse_int(token: &str) -> Option<i64> {
    if let Some(hex) = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).ok();
    }
    if let Some(bin) = token.strip_prefix('%') {
        return i64::from_str_radix(bin, 2).ok();
    }
    token.parse().ok()
}

pub fn parse_bool(token: &str) -> Option<bool> {
    match token {
        "true" | "1" | "on" => Some(true),
        "false" | "0" | "off" => Some(false),
        _ => None,
    }
}

/// 1-based channel number to 0-based index; anything outside 1..=16 fails.
pub fn validate_midi_channel(token: &str) -> Option<usize> {
    match parse_int(token) {
        Some(channel @ 1..=16) => Some(channel as usize - 1),
        _ => None,
    }
}

fn token_at<'a>(tokens: &'a [String], index: usize) -> Result<&'a str, CommandError> {
    tokens
        .get(index)
        .map(String::as_str)
        .ok_or(CommandError::ArgCount {
            expected: index + 1,
            got: tokens.len(),
        })
}

pub fn str_token(tokens: &[String], index: usize) -> Result<&str, CommandError> {
    token_at(tokens, index)
}

pub fn int_token(tokens: &[String], index: usize) -> Result<i64, CommandError> {
    let token = token_at(tokens, index)?;
    parse_int(token).ok_or_else(|| CommandError::ArgType {
        index,
        expected: "an integer",
        got: token.to_string(),
    })
}

pub fn bool_token(tokens: &[String], index: usize) -> Result<bool, CommandError> {
    let token = token_at(tokens, index)?;
    parse_bool(token).ok_or_else(|| CommandError::ArgType {
        index,
        expected: "a boolean",
        got: token.to_string(),
    })
}

pub fn channel_token(tokens: &[String], index: usize) -> Result<usize, CommandError> {
    let token = token_at(tokens, index)?;
    validate_midi_channel(token).ok_or_else(|| CommandError::ArgType {
        index,
        expected: "a MIDI channel (1..16)",
        got: token.to_string(),
    })
}

/// Validate `tokens` against `template`. Surplus tokens are appended as
/// strings.
pub fn validate(
    template: &str,
    tokens: &[String],
    registry: &SharedRegistry,
) -> Result<Vec<Arg>, CommandError> {
    let expected = template.len();
    if tokens.len() < expected {
        return Err(CommandError::ArgCount {
            expected,
            got: tokens.len(),
        });
    }

    let mut out = Vec::with_capacity(tokens.len());
    for (index, spec) in template.chars().enumerate() {
        let token = &tokens[index];
        let arg = match spec {
            's' => Arg::Str(token.clone()),
            'i' => Arg::Int(int_token(tokens, index)?),
            'f' => {
                let value = token.parse::<f64>().map_err(|_| CommandError::ArgType {
                    index,
                    expected: "a float",
                    got: token.clone(),
                })?;
                Arg::Float(value)
            }
            'b' => Arg::Bool(bool_token(tokens, index)?),
            'c' => Arg::Int(channel_token(tokens, index)? as i64),
            'o' => {
                let exists = registry
                    .lock()
                    .map(|reg| reg.contains(token))
                    .unwrap_or(false);
                if !exists {
                    return Err(CommandError::Graph(crate::graph::GraphError::NotFound(
                        token.clone(),
                    )));
                }
                Arg::Str(token.clone())
            }
            other => {
                log::error!("bad template character '{}'", other);
                Arg::Str(token.clone())
            }
        };
        out.push(arg);
    }
    for token in &tokens[expected..] {
        out.push(Arg::Str(token.clone()));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::registry::{create_shared_registry, DEFAULT_MAX_TREE_DEPTH};

    fn tokens(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_int_radix_prefixes() {
        assert_eq!(parse_int("42"), Some(42));
        assert_eq!(parse_int("-7"), Some(-7));
        assert_eq!(parse_int("0x2A"), Some(42));
        assert_eq!(parse_int("%101010"), Some(42));
        assert_eq!(parse_int("forty"), None);
    }

    #[test]
    fn test_channel_bounds() {
        assert_eq!(validate_midi_channel("1"), Some(0));
        assert_eq!(validate_midi_channel("16"), Some(15));
        assert_eq!(validate_midi_channel("0"), None);
        assert_eq!(validate_midi_channel("17"), None);
    }

    #[test]
    fn test_too_few_arguments() {
        let registry = create_shared_registry(DEFAULT_MAX_TREE_DEPTH);
        let err = validate("si", &tokens(&["only"]), &registry).unwrap_err();
        assert!(matches!(
            err,
            CommandError::ArgCount { expected: 2, got: 1 }
        ));
    }

    #[test]
    fn test_type_mismatch() {
        let registry = create_shared_registry(DEFAULT_MAX_TREE_DEPTH);
        let err = validate("i", &tokens(&["soon"]), &registry).unwrap_err();
        assert!(matches!(err, CommandError::ArgType { index: 0, .. }));
    }

    #[test]
    fn test_operator_must_exist() {
        let registry = create_shared_registry(DEFAULT_MAX_TREE_DEPTH);
        assert!(validate("o", &tokens(&["ghost"]), &registry).is_err());

        registry.lock().unwrap().create("Monitor", "mon").unwrap();
        let args = validate("o", &tokens(&["mon"]), &registry).unwrap();
        assert_eq!(args[0], Arg::Str("mon".to_string()));
    }

    #[test]
    fn test_surplus_tokens_pass_through() {
        let registry = create_shared_registry(DEFAULT_MAX_TREE_DEPTH);
        let args = validate("s", &tokens(&["cmd", "extra", "bits"]), &registry).unwrap();
        assert_eq!(args.len(), 3);
        assert_eq!(args[2], Arg::Str("bits".to_string()));
    }
}
