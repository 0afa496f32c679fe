//! Parser for `.properties` seed resources
//!
//! Supports the line-oriented key/value format: `#` and `!` comments,
//! `=`, `:` or whitespace separators, backslash line continuations and the
//! `\t \n \r \f \uXXXX` escapes. Later duplicates replace earlier ones while
//! keeping the first position.

use std::collections::HashMap;

/// Error raised for malformed input
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}: {reason}")]
pub struct PropertiesError {
    pub line: usize,
    pub reason: String,
}

/// Parse properties text into ordered key/value pairs
pub fn parse(input: &str) -> Result<Vec<(String, String)>, PropertiesError> {
    let mut entries: Vec<(String, String)> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for (line_number, logical) in logical_lines(input) {
        let (raw_key, raw_value) = split_key_value(&logical);
        let key = unescape(raw_key, line_number)?;
        let value = unescape(raw_value, line_number)?;
        match positions.get(&key) {
            Some(&idx) => entries[idx].1 = value,
            None => {
                positions.insert(key.clone(), entries.len());
                entries.push((key, value));
            }
        }
    }
    Ok(entries)
}

fn ends_with_continuation(line: &str) -> bool {
    line.chars().rev().take_while(|&c| c == '\\').count() % 2 == 1
}

/// Join continued lines, dropping blanks and comments
fn logical_lines(input: &str) -> Vec<(usize, String)> {
    let mut result = Vec::new();
    let mut current: Option<(usize, String)> = None;

    for (idx, raw) in input.lines().enumerate() {
        let trimmed = raw.trim_start();
        let continuing = current.is_some();
        if !continuing && (trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!'))
        {
            continue;
        }
        let (start, mut buffer) = current.take().unwrap_or((idx + 1, String::new()));
        if ends_with_continuation(trimmed) {
            buffer.push_str(&trimmed[..trimmed.len() - 1]);
            current = Some((start, buffer));
        } else {
            buffer.push_str(trimmed);
            result.push((start, buffer));
        }
    }
    if let Some(pending) = current {
        result.push(pending);
    }
    result
}

fn split_key_value(line: &str) -> (&str, &str) {
    let mut escaped = false;
    let mut key_end = line.len();
    for (idx, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' | ' ' | '\t' | '\u{c}' => {
                key_end = idx;
                break;
            }
            _ => {}
        }
    }

    let key = &line[..key_end];
    let rest = line[key_end..].trim_start_matches([' ', '\t', '\u{c}']);
    let rest = match rest.strip_prefix(['=', ':']) {
        Some(after) => after.trim_start_matches([' ', '\t', '\u{c}']),
        None => rest,
    };
    (key, rest)
}

fn unescape(raw: &str, line: usize) -> Result<String, PropertiesError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\u{c}'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                let decoded = u32::from_str_radix(&hex, 16)
                    .ok()
                    .filter(|_| hex.len() == 4)
                    .and_then(char::from_u32)
                    .ok_or_else(|| PropertiesError {
                        line,
                        reason: format!("malformed \\u escape '\\u{hex}'"),
                    })?;
                out.push(decoded);
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_separators_and_comments() {
        let input = "# comment\n! also comment\n\na=1\nb : 2\nc 3\nd=\n";
        let parsed = parse(input).unwrap();
        assert_eq!(
            parsed,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string()),
                ("c".to_string(), "3".to_string()),
                ("d".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn test_continuation_lines_are_joined() {
        let input = "servers = zk1:2181,\\\n          zk2:2181\n";
        let parsed = parse(input).unwrap();
        assert_eq!(parsed[0].1, "zk1:2181,zk2:2181");
    }

    #[test]
    fn test_escapes() {
        let input = "path\\=with\\:seps = a\\tb\\u0041\nliteral=ends with \\\\\n";
        let parsed = parse(input).unwrap();
        assert_eq!(parsed[0], ("path=with:seps".to_string(), "a\tbA".to_string()));
        assert_eq!(parsed[1].1, "ends with \\");
    }

    #[test]
    fn test_duplicate_keys_keep_last_value() {
        let parsed = parse("k=1\nother=x\nk=2\n").unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0], ("k".to_string(), "2".to_string()));
    }

    #[test]
    fn test_malformed_unicode_escape_reports_line() {
        let err = parse("ok=1\nbad=\\u12\n").unwrap_err();
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_value_may_contain_separators() {
        let parsed = parse("/db.url=jdbc:mysql://host1:3306/db").unwrap();
        assert_eq!(
            parsed[0],
            (
                "/db.url".to_string(),
                "jdbc:mysql://host1:3306/db".to_string()
            )
        );
    }
}
