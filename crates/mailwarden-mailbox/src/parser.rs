//! Response parsing helpers.
//!
//! Only the handful of response shapes the polling session drives are
//! handled: SEARCH result lines, literal length markers, header field
//! blocks, and INTERNALDATE values.

use chrono::{DateTime, Utc};

/// Parses a `* SEARCH n n n` line into a list of UIDs.
///
/// Returns `None` if the line is not a SEARCH response.
#[must_use]
pub fn parse_search_line(line: &str) -> Option<Vec<u32>> {
    let rest = line.strip_prefix("* ")?;
    let rest = rest
        .strip_prefix("SEARCH")
        .or_else(|| rest.strip_prefix("search"))?;

    Some(
        rest.split_ascii_whitespace()
            .filter_map(|tok| tok.parse().ok())
            .collect(),
    )
}

/// Returns the byte count of a literal marker when `segment` ends with `{n}`.
#[must_use]
pub fn literal_len(segment: &str) -> Option<usize> {
    let open = segment.rfind('{')?;
    let inner = segment.get(open + 1..)?.strip_suffix('}')?;
    inner.parse().ok()
}

/// Splits a raw header block into unfolded (name, value) pairs.
///
/// Continuation lines (leading whitespace) are folded into the previous
/// field's value, as the wire format requires.
#[must_use]
pub fn header_fields(raw: &str) -> Vec<(String, String)> {
    let mut fields: Vec<(String, String)> = Vec::new();

    for line in raw.lines() {
        if line.is_empty() {
            continue;
        }
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some((_, value)) = fields.last_mut() {
                value.push(' ');
                value.push_str(line.trim());
            }
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            fields.push((name.trim().to_string(), value.trim().to_string()));
        }
    }

    fields
}

/// Looks up a header value by case-insensitive name.
#[must_use]
pub fn header_value<'a>(fields: &'a [(String, String)], name: &str) -> Option<&'a str> {
    fields
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Parses an `INTERNALDATE "07-Aug-2026 12:34:56 +0000"` value out of a
/// FETCH response segment.
#[must_use]
pub fn parse_internal_date(segment: &str) -> Option<DateTime<Utc>> {
    let upper = segment.to_ascii_uppercase();
    let at = upper.find("INTERNALDATE")?;
    let rest = segment.get(at..)?;
    let open = rest.find('"')?;
    let inner = rest.get(open + 1..)?;
    let close = inner.find('"')?;
    let date_str = inner.get(..close)?;

    DateTime::parse_from_str(date_str.trim(), "%d-%b-%Y %H:%M:%S %z")
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parses an RFC 2822 `Date:` header value.
#[must_use]
pub fn parse_date_header(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_search_line() {
        assert_eq!(
            parse_search_line("* SEARCH 3 17 204").unwrap(),
            vec![3, 17, 204]
        );
        assert_eq!(parse_search_line("* SEARCH").unwrap(), Vec::<u32>::new());
        assert!(parse_search_line("* 4 EXISTS").is_none());
    }

    #[test]
    fn test_literal_len() {
        assert_eq!(
            literal_len("* 12 FETCH (BODY[HEADER.FIELDS (SUBJECT)] {342}"),
            Some(342)
        );
        assert_eq!(literal_len(" BODY[TEXT] {0}"), Some(0));
        assert!(literal_len("* 12 FETCH (FLAGS (\\Seen))").is_none());
        assert!(literal_len("{oops}").is_none());
    }

    #[test]
    fn test_header_fields_unfolding() {
        let raw = "Subject: a very\r\n long subject\r\nFrom: a@example.com\r\n";
        let fields = header_fields(raw);
        assert_eq!(header_value(&fields, "subject"), Some("a very long subject"));
        assert_eq!(header_value(&fields, "FROM"), Some("a@example.com"));
        assert_eq!(header_value(&fields, "to"), None);
    }

    #[test]
    fn test_internal_date() {
        let seg = "* 9 FETCH (UID 41 INTERNALDATE \"07-Aug-2026 12:34:56 +0000\"";
        let parsed = parse_internal_date(seg).unwrap();
        assert_eq!(parsed.to_rfc3339(), "2026-08-07T12:34:56+00:00");
        assert!(parse_internal_date("no date here").is_none());
    }

    #[test]
    fn test_date_header() {
        let parsed = parse_date_header("Fri, 07 Aug 2026 09:00:00 +0200").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2026-08-07T07:00:00+00:00");
        assert!(parse_date_header("not a date").is_none());
    }
}
