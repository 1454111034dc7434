//! Small string-shape helpers shared by Link's attribute-name normalization.

use once_cell::sync::Lazy;
use regex::Regex;

static DASH_CASE_REGEXP: Lazy<Regex> = Lazy::new(|| Regex::new(r"-+([a-z0-9])").unwrap());

/// `foo-bar-baz` -> `fooBarBaz`.
pub fn dash_case_to_camel_case(input: &str) -> String {
    DASH_CASE_REGEXP
        .replace_all(input, |caps: &regex::Captures| caps.get(1).unwrap().as_str().to_uppercase())
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_multi_dash_names() {
        assert_eq!(dash_case_to_camel_case("aria-current-page"), "ariaCurrentPage");
    }

    #[test]
    fn leaves_already_camel_names_untouched() {
        assert_eq!(dash_case_to_camel_case("className"), "className");
    }
}
