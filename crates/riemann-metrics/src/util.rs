// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Utility functions for metric naming.

/// Parses and validates a service namespace.
///
/// A valid namespace must:
/// - Start with an ASCII letter
/// - Contain only ASCII alphanumerics, underscores, or periods
///
/// Surrounding whitespace is trimmed. On failure the reason is returned so the
/// caller can report it.
///
/// # Examples
///
/// ```
/// use riemann_metrics::util::parse_metric_namespace;
///
/// assert_eq!(parse_metric_namespace(" mercury "), Ok("mercury".to_string()));
/// assert!(parse_metric_namespace("1invalid").is_err());
/// assert!(parse_metric_namespace("my-app").is_err());
/// ```
pub fn parse_metric_namespace(namespace: &str) -> Result<String, String> {
    let trimmed = namespace.trim();
    let mut chars = trimmed.chars();

    match chars.next() {
        None => return Err("namespace cannot be empty".to_string()),
        Some(first_char) if !first_char.is_ascii_alphabetic() => {
            return Err(format!(
                "namespace must start with a letter, got: '{trimmed}'"
            ));
        }
        Some(_) => {}
    }

    if let Some(invalid_char) =
        chars.find(|&ch| !ch.is_ascii_alphanumeric() && ch != '_' && ch != '.')
    {
        return Err(format!(
            "namespace contains invalid character '{invalid_char}' in '{trimmed}'. Only ASCII alphanumerics, underscores, and periods are allowed"
        ));
    }

    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_metric_namespace_valid() {
        assert_eq!(parse_metric_namespace("mercury"), Ok("mercury".to_string()));
        assert_eq!(parse_metric_namespace("my_app"), Ok("my_app".to_string()));
        assert_eq!(parse_metric_namespace("my.app"), Ok("my.app".to_string()));
        assert_eq!(
            parse_metric_namespace("\tmyApp123\n"),
            Ok("myApp123".to_string())
        );
    }

    #[test]
    fn test_parse_metric_namespace_empty() {
        assert!(parse_metric_namespace("").is_err());
        assert!(parse_metric_namespace("   ").is_err());
    }

    #[test]
    fn test_parse_metric_namespace_invalid() {
        for namespace in ["1app", "_app", ".app", "my-app", "my app", "my@app"] {
            assert!(
                parse_metric_namespace(namespace).is_err(),
                "'{namespace}' should be rejected"
            );
        }
    }

    #[test]
    fn test_parse_metric_namespace_reports_character() {
        let reason = parse_metric_namespace("my$app").unwrap_err();
        assert!(reason.contains("'$'"));
    }
}
