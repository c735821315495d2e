//! Command-line flag lookup over tokenized argument lists.
//!
//! Lookups are exact token matches. Values embedded as `--flag=value` are only
//! visible after [`normalize`] has split them into two tokens.

/// Splits every token on `=` and flattens the result.
pub fn normalize<S: AsRef<str>>(tokens: &[S]) -> Vec<String> {
    tokens
        .iter()
        .flat_map(|token| token.as_ref().split('='))
        .map(str::to_string)
        .collect()
}

/// Returns the token following the first occurrence of `short`, or of `long`
/// when `short` is absent.
///
/// A flag found as the last token yields `None`; the long form is only
/// consulted when the short form does not appear at all.
pub fn lookup<'a>(tokens: &'a [String], short: &str, long: Option<&str>) -> Option<&'a str> {
    if let Some(value) = value_after(tokens, short) {
        return value;
    }
    long.and_then(|long| value_after(tokens, long).flatten())
}

/// Like [`lookup`], falling back to `default` when no value is found.
pub fn extract(tokens: &[String], short: &str, long: Option<&str>, default: &str) -> String {
    lookup(tokens, short, long).unwrap_or(default).to_string()
}

/// Whether either form of a switch appears anywhere in `tokens`.
pub fn has_switch(tokens: &[String], short: &str, long: Option<&str>) -> bool {
    tokens
        .iter()
        .any(|token| token == short || long.is_some_and(|long| token == long))
}

// Outer `None`: flag absent. Inner `None`: flag present without a following token.
fn value_after<'a>(tokens: &'a [String], flag: &str) -> Option<Option<&'a str>> {
    let idx = tokens.iter().position(|token| token == flag)?;
    Some(tokens.get(idx + 1).map(String::as_str))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(raw: &str) -> Vec<String> {
        raw.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn short_and_long_forms_resolve_the_same_value() {
        let short = tokens("python3 py4web.py run apps -P 9090");
        let long = tokens("python3 py4web.py run apps --port 9090");
        assert_eq!(extract(&short, "-P", Some("--port"), "8000"), "9090");
        assert_eq!(extract(&long, "-P", Some("--port"), "8000"), "9090");
    }

    #[test]
    fn missing_flag_returns_default() {
        let args = tokens("python3 py4web.py run apps");
        assert_eq!(extract(&args, "-P", Some("--port"), "8000"), "8000");
        assert_eq!(lookup(&args, "--ssl_cert", None), None);
    }

    #[test]
    fn trailing_flag_uses_default_without_trying_long_form() {
        let args = tokens("run --port 9000 -P");
        assert_eq!(extract(&args, "-P", Some("--port"), "8000"), "8000");
    }

    #[test]
    fn first_occurrence_wins() {
        let args = tokens("run -P 1 -P 2");
        assert_eq!(extract(&args, "-P", None, "8000"), "1");
    }

    #[test]
    fn no_prefix_matching() {
        let args = tokens("run --port9090 -Px 1");
        assert_eq!(extract(&args, "-P", Some("--port"), "8000"), "8000");
    }

    #[test]
    fn embedded_values_need_normalization() {
        let raw = tokens("run apps --port=9090");
        assert_eq!(extract(&raw, "-P", Some("--port"), "8000"), "8000");
        let normalized = normalize(&raw);
        assert_eq!(normalized, vec!["run", "apps", "--port", "9090"]);
        assert_eq!(extract(&normalized, "-P", Some("--port"), "8000"), "9090");
    }

    #[test]
    fn switches_match_anywhere() {
        assert!(has_switch(&tokens("run apps -D"), "-D", Some("--debug")));
        assert!(has_switch(&tokens("run --debug apps"), "-D", Some("--debug")));
        assert!(!has_switch(&tokens("run apps"), "-D", Some("--debug")));
    }
}
