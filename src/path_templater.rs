use log::debug;
use std::collections::{BTreeMap, BTreeSet};

/// One piece of a route pattern
#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(char),
    Named(String),
    /// A bare `*` wildcard with no name of its own
    Anonymous,
}

/// Builds the stable `{name}` template for a matched route.
///
/// `mount_path` is the prefix a sub-router was nested under (empty at the top
/// level) and `route_pattern` the pattern the framework matched, in any of the
/// supported syntaxes:
///
/// - `:id`, `:id?`, `:id(\\d+)` (colon style)
/// - `{id}`, `{*rest}`, `{id:\\d+}` (brace style)
/// - `*rest` and a bare `*`
///
/// A bare `*` borrows the name of a bound parameter that the pattern does not
/// name itself, falling back to its position. The concrete values in
/// `bound_params` never influence the output, so every request matched by the
/// same pattern lands on the same template.
pub fn normalize(
    mount_path: &str,
    route_pattern: &str,
    bound_params: &BTreeMap<String, String>,
) -> String {
    let full = combine_paths(mount_path, route_pattern);
    let tokens = tokenize(&full);

    let named: BTreeSet<&str> = tokens
        .iter()
        .filter_map(|token| match token {
            Token::Named(name) => Some(name.as_str()),
            _ => None,
        })
        .collect();
    let mut unnamed_bindings = bound_params
        .keys()
        .filter(|key| !named.contains(key.as_str()));

    let mut template = String::with_capacity(full.len());
    let mut anonymous_index = 0;
    for token in &tokens {
        match token {
            Token::Literal(c) => template.push(*c),
            Token::Named(name) => {
                template.push('{');
                template.push_str(name);
                template.push('}');
            }
            Token::Anonymous => {
                let name = unnamed_bindings
                    .next()
                    .cloned()
                    .unwrap_or_else(|| anonymous_index.to_string());
                anonymous_index += 1;
                template.push('{');
                template.push_str(&name);
                template.push('}');
            }
        }
    }

    if template.len() > 1 && template.ends_with('/') {
        template.pop();
    }
    if template.is_empty() {
        template.push('/');
    }

    debug!("Normalized route {} -> {}", full, template);
    template
}

/// Lists the `{name}` placeholders of a template in order of appearance.
pub fn placeholders(template: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        names.push(rest[start + 1..start + len].to_string());
        rest = &rest[start + len + 1..];
    }
    names
}

/// Joins a mount prefix and an inner route with exactly one slash
fn combine_paths(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let path = path.trim_start_matches('/');

    if path.is_empty() {
        if prefix.is_empty() {
            "/".to_string()
        } else {
            prefix.to_string()
        }
    } else {
        format!("{}/{}", prefix, path)
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn tokenize(pattern: &str) -> Vec<Token> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        // Colon parameters only start a segment or follow a `-`/`.` separator
        let colon_allowed = i == 0 || matches!(chars[i - 1], '/' | '-' | '.');

        if c == ':' && colon_allowed && chars.get(i + 1).is_some_and(|n| is_name_char(*n)) {
            let start = i + 1;
            i = start;
            while i < chars.len() && is_name_char(chars[i]) {
                i += 1;
            }
            tokens.push(Token::Named(chars[start..i].iter().collect()));

            // Inline regex constraint
            if chars.get(i) == Some(&'(') {
                let mut depth = 0;
                while i < chars.len() {
                    match chars[i] {
                        '(' => depth += 1,
                        ')' => {
                            depth -= 1;
                            if depth == 0 {
                                i += 1;
                                break;
                            }
                        }
                        _ => {}
                    }
                    i += 1;
                }
            }
            // Modifiers
            if matches!(chars.get(i), Some('?' | '*' | '+')) {
                i += 1;
            }
            continue;
        }

        if c == '{' {
            if let Some(len) = chars[i..].iter().position(|ch| *ch == '}') {
                let inner: String = chars[i + 1..i + len].iter().collect();
                let name = inner
                    .trim_start_matches('*')
                    .split(':')
                    .next()
                    .unwrap_or_default()
                    .to_string();
                tokens.push(if name.is_empty() {
                    Token::Anonymous
                } else {
                    Token::Named(name)
                });
                i += len + 1;
                continue;
            }
        }

        if c == '*' {
            let start = i + 1;
            i = start;
            while i < chars.len() && is_name_char(chars[i]) {
                i += 1;
            }
            if i == start {
                tokens.push(Token::Anonymous);
            } else {
                tokens.push(Token::Named(chars[start..i].iter().collect()));
            }
            continue;
        }

        tokens.push(Token::Literal(c));
        i += 1;
    }

    tokens
}
