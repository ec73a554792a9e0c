//! URI query-string fields.
//!
//! Parsing follows the CGI.pm conventions the daemon's other clients use:
//! - an empty section (`a=1&&b=2`) is skipped
//! - a section without `=` is a field with an empty value
//! - a section beginning with `=` is ignored entirely
//!
//! Fields are kept in order. Consumed fields are flagged rather than removed
//! so the remaining ones can be re-serialized for the remote side unchanged.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

/// Characters left unescaped when rebuilding a query: alphanumerics and marks.
const QUERY_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// One `name=value` pair from a query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryField {
    /// Unescaped name.
    pub name: String,
    /// Unescaped value.
    pub value: String,
    /// Consumed locally; left out when the query is rebuilt.
    pub ignore: bool,
}

/// Ordered query fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryFields {
    fields: Vec<QueryField>,
}

impl QueryFields {
    /// Parse a raw (still escaped) query string using `&` as separator.
    pub fn parse(query: &str) -> Self {
        Self::parse_with_separator(query, "&")
    }

    /// Parse with a custom separator.
    pub fn parse_with_separator(query: &str, separator: &str) -> Self {
        let mut fields = Vec::new();
        if query.is_empty() {
            return Self { fields };
        }

        for section in query.split(separator) {
            if section.is_empty() {
                continue;
            }
            let (name, value) = match section.find('=') {
                None => (section, ""),
                Some(0) => continue,
                Some(eq) => (&section[..eq], &section[eq + 1..]),
            };
            fields.push(QueryField {
                name: unescape(name),
                value: unescape(value),
                ignore: false,
            });
        }

        Self { fields }
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueryField> {
        self.fields.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut QueryField> {
        self.fields.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Mark every field named `name` (case-insensitive) as consumed and return
    /// the value of the last one.
    pub fn take(&mut self, name: &str) -> Option<String> {
        let mut taken = None;
        for field in &mut self.fields {
            if field.name.eq_ignore_ascii_case(name) {
                field.ignore = true;
                taken = Some(field.value.clone());
            }
        }
        taken
    }

    /// Rebuild the query from the fields that were not consumed.
    ///
    /// Returns `None` when nothing is left.
    pub fn rebuild(&self) -> Option<String> {
        self.rebuild_with_separator("&")
    }

    pub fn rebuild_with_separator(&self, separator: &str) -> Option<String> {
        let parts: Vec<String> = self
            .fields
            .iter()
            .filter(|f| !f.ignore)
            .map(|f| {
                format!(
                    "{}={}",
                    utf8_percent_encode(&f.name, QUERY_ESCAPE),
                    utf8_percent_encode(&f.value, QUERY_ESCAPE)
                )
            })
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(separator))
        }
    }
}

fn unescape(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn names(fields: &QueryFields) -> Vec<(&str, &str)> {
        fields
            .iter()
            .map(|f| (f.name.as_str(), f.value.as_str()))
            .collect()
    }

    #[test]
    fn parse_simple_pairs() {
        let fields = QueryFields::parse("a=1&b=2");
        assert_eq!(names(&fields), vec![("a", "1"), ("b", "2")]);
    }

    #[test]
    fn consumed_field_is_not_rebuilt() {
        let mut fields = QueryFields::parse("a=1&b=2");
        assert_eq!(fields.take("a").as_deref(), Some("1"));
        assert_eq!(fields.rebuild().as_deref(), Some("b=2"));
    }

    #[test]
    fn all_consumed_rebuilds_to_none() {
        let mut fields = QueryFields::parse("socket=/tmp/s");
        fields.take("socket");
        assert_eq!(fields.rebuild(), None);
        assert_eq!(QueryFields::parse("").rebuild(), None);
    }

    #[test]
    fn empty_sections_are_skipped() {
        let fields = QueryFields::parse("&a=1&&b=2&");
        assert_eq!(names(&fields), vec![("a", "1"), ("b", "2")]);
    }

    #[test]
    fn bare_name_has_empty_value() {
        let fields = QueryFields::parse("flag&x=");
        assert_eq!(names(&fields), vec![("flag", ""), ("x", "")]);
    }

    #[test]
    fn leading_equals_is_ignored() {
        let fields = QueryFields::parse("=value&a=1");
        assert_eq!(names(&fields), vec![("a", "1")]);
        assert!(QueryFields::parse("=value").is_empty());
    }

    #[test]
    fn values_are_unescaped_and_reescaped() {
        let fields = QueryFields::parse("command=%2Fusr%2Fbin%2Fnc%20-q&x=a%26b");
        assert_eq!(
            names(&fields),
            vec![("command", "/usr/bin/nc -q"), ("x", "a&b")]
        );
        assert_eq!(
            fields.rebuild().as_deref(),
            Some("command=%2Fusr%2Fbin%2Fnc%20-q&x=a%26b")
        );
    }

    #[test]
    fn take_is_case_insensitive() {
        let mut fields = QueryFields::parse("No_Verify=1&keep=yes");
        assert_eq!(fields.take("no_verify").as_deref(), Some("1"));
        assert_eq!(fields.rebuild().as_deref(), Some("keep=yes"));
        assert_eq!(fields.take("missing"), None);
    }

    #[test]
    fn custom_separator() {
        let fields = QueryFields::parse_with_separator("a=1;b=2", ";");
        assert_eq!(fields.len(), 2);
        assert_eq!(fields.rebuild_with_separator(";").as_deref(), Some("a=1;b=2"));
    }

    proptest! {
        #[test]
        fn parse_never_panics(query in ".{0,64}") {
            let _ = QueryFields::parse(&query);
        }

        #[test]
        fn unconsumed_fields_survive_rebuild(
            pairs in prop::collection::vec(("[a-z]{1,6}", "[ -~]{0,8}"), 1..6),
            drop_idx in 0usize..6,
        ) {
            let mut fields = QueryFields::default();
            for (name, value) in &pairs {
                fields.fields.push(QueryField {
                    name: name.clone(),
                    value: value.clone(),
                    ignore: false,
                });
            }
            let dropped = drop_idx % pairs.len();
            fields.fields[dropped].ignore = true;

            let rebuilt = fields.rebuild().unwrap_or_default();
            let reparsed = QueryFields::parse(&rebuilt);
            let expected: Vec<(String, String)> = pairs
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != dropped)
                .map(|(_, p)| p.clone())
                .collect();
            let got: Vec<(String, String)> = reparsed
                .iter()
                .map(|f| (f.name.clone(), f.value.clone()))
                .collect();
            prop_assert_eq!(got, expected);
        }
    }
}
