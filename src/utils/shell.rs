//! POSIX shell quoting for values substituted into `sh -c` command lines.

/// Escape a value for use inside single quotes.
/// Replaces `'` with `'\''` (end quote, escaped quote, start quote).
pub fn escape_single_quote_content(value: &str) -> String {
    value.replace('\'', "'\\''")
}

/// Quote a single argument for shell execution.
/// - Empty strings become `''`
/// - Strings with shell metacharacters are wrapped in single quotes
/// - Embedded single quotes are escaped
pub fn quote_arg(arg: &str) -> String {
    if arg.is_empty() {
        return "''".to_string();
    }

    const SHELL_META: &[char] = &[
        ' ', '\t', '\n', '\'', '"', '\\', '$', '`', '!', '*', '?', '[', ']', '(', ')', '{', '}',
        '<', '>', '|', '&', ';', '#', '~',
    ];

    if !arg.contains(SHELL_META) {
        return arg.to_string();
    }

    format!("'{}'", escape_single_quote_content(arg))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_words_stay_bare() {
        assert_eq!(quote_arg("erp"), "erp");
        assert_eq!(quote_arg("/srv/store/erp"), "/srv/store/erp");
    }

    #[test]
    fn empty_value_is_an_empty_argument() {
        assert_eq!(quote_arg(""), "''");
    }

    #[test]
    fn metacharacters_are_single_quoted() {
        assert_eq!(quote_arg("Srvr=app;Ref=erp;"), "'Srvr=app;Ref=erp;'");
        assert_eq!(quote_arg("pa$$word`id`"), "'pa$$word`id`'");
        assert_eq!(quote_arg("sync from main"), "'sync from main'");
    }

    #[test]
    fn embedded_single_quote_is_escaped() {
        assert_eq!(quote_arg("it's"), "'it'\\''s'");
    }
}
