/// Most tokens a search query is allowed to carry into FTS5.
const MAX_TOKENS: usize = 16;

/// Turn free text into an FTS5 `MATCH` expression that cannot fail to parse.
///
/// The text is split on anything that is not alphanumeric. Every token is
/// quoted, so `AND`, `NOT`, `*`, `-` and `"` all lose their query-syntax
/// meaning. The last token becomes a prefix match for type-ahead. Returns
/// `None` when nothing searchable is left.
///
/// ```
/// use reel_cache::sanitize_match_query;
///
/// assert_eq!(sanitize_match_query("star wars").as_deref(), Some(r#""star" "wars"*"#));
/// assert_eq!(sanitize_match_query(r#"" OR -*"#).as_deref(), Some(r#""OR"*"#));
/// assert_eq!(sanitize_match_query("***"), None);
/// ```
pub fn sanitize_match_query(raw: &str) -> Option<String> {
    let tokens: Vec<&str> = raw
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .take(MAX_TOKENS)
        .collect();
    let (last, rest) = tokens.split_last()?;
    let mut query = String::new();
    for token in rest {
        query.push_str(&quote(token));
        query.push(' ');
    }
    query.push_str(&quote(last));
    query.push('*');
    Some(query)
}

fn quote(token: &str) -> String {
    format!("\"{}\"", token.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("matrix", Some(r#""matrix"*"#))]
    #[case("  the   matrix  ", Some(r#""the" "matrix"*"#))]
    #[case("NOT", Some(r#""NOT"*"#))]
    #[case("a AND b", Some(r#""a" "AND" "b"*"#))]
    #[case("title:foo", Some(r#""title" "foo"*"#))]
    #[case("x-men", Some(r#""x" "men"*"#))]
    #[case("café", Some(r#""café"*"#))]
    #[case("\"", None)]
    #[case("", None)]
    #[case("^*()-", None)]
    fn sanitizes(#[case] raw: &str, #[case] expected: Option<&str>) {
        assert_eq!(sanitize_match_query(raw).as_deref(), expected);
    }

    #[test]
    fn caps_token_count() {
        let raw = (0..100).map(|i| format!("t{i}")).collect::<Vec<_>>().join(" ");
        let query = sanitize_match_query(&raw).unwrap();
        assert_eq!(query.matches('"').count(), MAX_TOKENS * 2);
    }
}
