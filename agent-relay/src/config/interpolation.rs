// Copyright 2026 The Agent Relay Authors
// SPDX-License-Identifier: Apache-2.0

use super::error::ConfigError;

/// Resolves `${VAR}` and `${VAR:-default}` references from environment
/// variables.
///
/// `${VAR:-default}` uses `default` when `VAR` is unset or empty. A plain
/// `${VAR}` that is unset is `ConfigError::UndefinedVariable`. Unterminated
/// or empty references are kept literally.
pub fn resolve_variables(input: &str) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut reference = String::new();
            let mut found_close = false;
            for c in chars.by_ref() {
                if c == '}' {
                    found_close = true;
                    break;
                }
                reference.push(c);
            }
            if !found_close || reference.is_empty() {
                result.push_str("${");
                result.push_str(&reference);
                if found_close {
                    result.push('}');
                }
                continue;
            }

            let (name, default) = match reference.split_once(":-") {
                Some((name, default)) => (name, Some(default)),
                None => (reference.as_str(), None),
            };

            let value = match (std::env::var(name), default) {
                (Ok(value), Some(default)) if value.is_empty() => default.to_string(),
                (Ok(value), _) => value,
                (Err(_), Some(default)) => default.to_string(),
                (Err(_), None) => {
                    return Err(ConfigError::UndefinedVariable {
                        name: name.to_string(),
                    })
                }
            };
            result.push_str(&value);
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}
