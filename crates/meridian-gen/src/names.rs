//! Identifier sanitization and casing for emitted targets.

/// Sanitizes a possibly-qualified IDL name for a target language.
///
/// `::` becomes the target's package separator, anything outside
/// `[A-Za-z0-9_]` (or the separator) becomes `_`, and a leading character
/// that is not a letter or underscore gains a `_` prefix.
#[must_use]
pub fn sanitize(name: &str, separator: &str) -> String {
    let replaced = name.replace("::", separator);
    let mut output = String::with_capacity(replaced.len());

    for (index, c) in replaced.chars().enumerate() {
        let valid = c.is_ascii_alphanumeric() || c == '_' || separator.contains(c);
        if index == 0 && !(c.is_ascii_alphabetic() || c == '_' || separator.contains(c)) {
            output.push('_');
        }
        output.push(if valid { c } else { '_' });
    }

    if output.is_empty() {
        output.push('_');
    }
    output
}

/// Concrete name for a template instantiation, e.g. `boxed<pair>` becomes
/// `boxed_pair`.
#[must_use]
pub fn instantiation_name(template: &str, args: &[String]) -> String {
    let mut name = sanitize(template, "_");
    for arg in args {
        name.push('_');
        name.push_str(&sanitize(arg, "_"));
    }
    name
}

/// Converts an IDL name to Rust type casing.
#[must_use]
pub fn pascal_case(name: &str) -> String {
    let mut output = String::with_capacity(name.len());
    let mut upper_next = true;
    for c in name.chars() {
        if c == '_' || c == ':' {
            upper_next = true;
        } else if upper_next {
            output.extend(c.to_uppercase());
            upper_next = false;
        } else {
            output.push(c);
        }
    }
    output
}

/// Converts an IDL name to Rust field/function casing.
#[must_use]
pub fn snake_case(name: &str) -> String {
    let mut output = String::with_capacity(name.len() + 4);
    let mut previous_lower = false;
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            if previous_lower {
                output.push('_');
            }
            output.extend(c.to_lowercase());
            previous_lower = false;
        } else {
            previous_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
            output.push(c);
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_separators_and_invalid_characters() {
        assert_eq!(sanitize("app::io::Frame", "."), "app.io.Frame");
        assert_eq!(sanitize("app::io::Frame", "_"), "app_io_Frame");
        assert_eq!(sanitize("weird-name", "_"), "weird_name");
        assert_eq!(sanitize("9starts_with_digit", "_"), "_9starts_with_digit");
    }

    #[test]
    fn instantiation_names_are_flat() {
        assert_eq!(
            instantiation_name("boxed", &["pair".to_owned()]),
            "boxed_pair"
        );
        assert_eq!(
            instantiation_name("table", &["string".to_owned(), "app::row".to_owned()]),
            "table_string_app_row"
        );
    }

    #[test]
    fn casing() {
        assert_eq!(pascal_case("status_kind"), "StatusKind");
        assert_eq!(pascal_case("Calculator"), "Calculator");
        assert_eq!(snake_case("Calculator"), "calculator");
        assert_eq!(snake_case("tryCast"), "try_cast");
    }
}
