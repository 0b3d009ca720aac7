//! `$NAME` / `${NAME}` expansion for working-directory templates.

/// Single-pass expansion: substituted values are never re-scanned.
///
/// `${NAME}` and `$NAME` (letters, digits, underscore) are replaced with
/// `lookup(NAME)` or nothing. A `$` not followed by a name, or an unclosed
/// `${`, is kept literally.
pub fn expand_with<F>(template: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut result = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find('$') {
        result.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) if end > 0 => {
                    result.push_str(&lookup(&braced[..end]).unwrap_or_default());
                    rest = &braced[end + 1..];
                }
                _ => {
                    result.push('$');
                    rest = after;
                }
            }
            continue;
        }

        let name_len = after
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(after.len());
        if name_len == 0 {
            result.push('$');
        } else {
            result.push_str(&lookup(&after[..name_len]).unwrap_or_default());
        }
        rest = &after[name_len..];
    }

    result.push_str(rest);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_braced_and_bare_references() {
        let vars = lookup(&[("HOME", "/home/u"), ("SUB", "work")]);
        assert_eq!(expand_with("${HOME}/x", &vars), "/home/u/x");
        assert_eq!(expand_with("$HOME/$SUB", &vars), "/home/u/work");
        assert_eq!(expand_with("a$SUB-b", &vars), "awork-b");
    }

    #[test]
    fn test_unset_expands_to_empty() {
        let vars = lookup(&[]);
        assert_eq!(expand_with("/tmp/$MISSING/x", &vars), "/tmp//x");
        assert_eq!(expand_with("/tmp/${MISSING}", &vars), "/tmp/");
    }

    #[test]
    fn test_literal_dollar_kept() {
        let vars = lookup(&[("A", "1")]);
        assert_eq!(expand_with("cost$", &vars), "cost$");
        assert_eq!(expand_with("$/x", &vars), "$/x");
        assert_eq!(expand_with("${A", &vars), "${A");
        assert_eq!(expand_with("${}", &vars), "${}");
    }

    #[test]
    fn test_no_rescan_of_substituted_values() {
        let vars = lookup(&[("A", "$B"), ("B", "injected")]);
        assert_eq!(expand_with("$A", &vars), "$B");
    }

    #[test]
    fn test_no_references() {
        let vars = lookup(&[]);
        assert_eq!(expand_with("/plain/path", &vars), "/plain/path");
        assert_eq!(expand_with("", &vars), "");
    }
}
