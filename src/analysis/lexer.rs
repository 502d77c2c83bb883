//! Literal-aware character walk
//!
//! Comment stripping, continuation detection and argument splitting all need
//! to see code characters only. Everything inside a string, backtick,
//! percent (`%q(..)`, `%w[..]`, `%i<..>`) or regex (`/../`) literal is
//! skipped. A literal left open runs to the end of the text.

/// What the visitor wants next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Resume at this byte offset
    SkipTo(usize),
    Stop,
}

const PERCENT_FLAVORS: &str = "qQwWiIrsx";

/// Characters after which `%` and `/` start a literal rather than an operator
const OPERAND_EXPECTED: &str = "([{,=!&|:;?~<>+-*%^";

/// Call `visit` with the byte offset of every character outside literals
pub fn walk_code(text: &str, mut visit: impl FnMut(usize, char) -> Flow) {
    let mut i = 0;
    // Immediately preceding char, and the last non-whitespace one
    let mut prev_raw: Option<char> = None;
    let mut prev_code: Option<char> = None;

    while let Some(c) = text[i..].chars().next() {
        let next = text[i + c.len_utf8()..].chars().next();
        let literal_end = match c {
            '"' | '\'' | '`' => Some(quoted_end(text, i + 1, c)),
            '%' if operand_position(prev_raw, prev_code, next) => percent_literal_end(text, i),
            '/' if operand_position(prev_raw, prev_code, next) => Some(regex_end(text, i + 1)),
            _ => None,
        };

        let flow = match literal_end {
            Some(end) => Flow::SkipTo(end),
            None => visit(i, c),
        };
        match flow {
            Flow::Continue => {
                i += c.len_utf8();
                prev_raw = Some(c);
                if !c.is_whitespace() {
                    prev_code = Some(c);
                }
            }
            // A skipped span reads as a value
            Flow::SkipTo(end) => {
                i = end.max(i + c.len_utf8()).min(text.len());
                prev_raw = Some('"');
                prev_code = Some('"');
            }
            Flow::Stop => return,
        }
    }
}

/// Net count of open brackets outside literals
pub fn bracket_depth(text: &str) -> i32 {
    let mut depth = 0;
    walk_code(text, |_, c| {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            _ => {}
        }
        Flow::Continue
    });
    depth
}

/// Split on `separator` where it sits outside literals and brackets
pub fn split_outside(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;

    walk_code(text, |i, c| {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            _ if c == separator && depth == 0 => {
                parts.push(text[start..i].trim());
                start = i + c.len_utf8();
            }
            _ => {}
        }
        Flow::Continue
    });
    parts.push(text[start..].trim());

    parts.retain(|p| !p.is_empty());
    parts
}

/// `%` or `/` here starts a literal: at the start, after an operator or
/// opening bracket, or as the first argument of a call without parens
/// (`say %q(..)`, `gsub /x/`).
fn operand_position(prev_raw: Option<char>, prev_code: Option<char>, next: Option<char>) -> bool {
    let Some(code) = prev_code else {
        return true;
    };
    if OPERAND_EXPECTED.contains(code) {
        return true;
    }
    let word_before = code.is_alphanumeric() || code == '_';
    let spaced = prev_raw.map_or(false, char::is_whitespace);
    let tight = next.map_or(false, |n| !n.is_whitespace() && n != '=');
    word_before && spaced && tight
}

fn quoted_end(text: &str, from: usize, quote: char) -> usize {
    let mut escaped = false;
    for (offset, c) in text[from..].char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            return from + offset + c.len_utf8();
        }
    }
    text.len()
}

/// End of a percent literal starting at `start`, or `None` for a modulo
fn percent_literal_end(text: &str, start: usize) -> Option<usize> {
    let mut rest = text[start + 1..].char_indices();
    let (_, first) = rest.next()?;
    let (offset, open) = if PERCENT_FLAVORS.contains(first) {
        rest.next()?
    } else {
        (0, first)
    };
    if open.is_alphanumeric() || open.is_whitespace() || open == '=' {
        return None;
    }
    let close = match open {
        '(' => ')',
        '[' => ']',
        '{' => '}',
        '<' => '>',
        other => other,
    };

    let body = start + 1 + offset + open.len_utf8();
    let mut depth = 0;
    let mut escaped = false;
    for (i, c) in text[body..].char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == close && depth == 0 {
            return Some(body + i + c.len_utf8());
        } else if c == close {
            depth -= 1;
        } else if c == open && open != close {
            depth += 1;
        }
    }
    Some(text.len())
}

/// End of a regex literal whose body starts at `from`, flags included
fn regex_end(text: &str, from: usize) -> usize {
    let mut escaped = false;
    let mut in_class = false;
    for (offset, c) in text[from..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '[' => in_class = true,
            ']' => in_class = false,
            '/' if !in_class => {
                let end = from + offset + 1;
                let flags = text[end..]
                    .chars()
                    .take_while(char::is_ascii_lowercase)
                    .count();
                return end + flags;
            }
            _ => {}
        }
    }
    text.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code_chars(text: &str) -> String {
        let mut seen = String::new();
        walk_code(text, |_, c| {
            seen.push(c);
            Flow::Continue
        });
        seen
    }

    #[test]
    fn test_skips_quoted_strings() {
        assert_eq!(code_chars(r#"a("x(", 'y\'z')"#), "a(, )");
    }

    #[test]
    fn test_skips_percent_literals() {
        assert_eq!(code_chars("say %q(don't (nested) panic)"), "say ");
        assert_eq!(code_chars("NAMES = %w(o'reilly)"), "NAMES = ");
        assert_eq!(code_chars("x(%i[a b], %|p'q|)"), "x(, )");
        assert_eq!(code_chars("%(plain's)"), "");
    }

    #[test]
    fn test_modulo_is_not_a_literal() {
        assert_eq!(code_chars("a % b"), "a % b");
        assert_eq!(code_chars("count %= 2"), "count %= 2");
        assert_eq!(code_chars("a%(b)"), "a%(b)");
    }

    #[test]
    fn test_skips_regex_literals() {
        assert_eq!(code_chars("x.gsub(/'/, '')"), "x.gsub(, )");
        assert_eq!(code_chars("gsub /[/]'/i, y"), "gsub , y");
        assert_eq!(code_chars("a / b"), "a / b");
        assert_eq!(code_chars("total/2"), "total/2");
    }

    #[test]
    fn test_non_ascii_percent_delimiter() {
        assert_eq!(code_chars("%€x€ y"), " y");
        assert_eq!(code_chars("%q€"), "");
    }

    #[test]
    fn test_bracket_depth_ignores_literals() {
        assert_eq!(bracket_depth("add_index :a, [:b_id,"), 1);
        assert_eq!(bracket_depth("say %q(don't"), 0);
        assert_eq!(bracket_depth("x.gsub(/'/, '')"), 0);
    }

    #[test]
    fn test_split_outside() {
        assert_eq!(
            split_outside("add_column :a, :b_id, :bigint; add_index :a, :b_id", ';'),
            vec!["add_column :a, :b_id, :bigint", "add_index :a, :b_id"]
        );
        assert_eq!(split_outside("execute 'a; b'", ';'), vec!["execute 'a; b'"]);
        assert_eq!(split_outside("a, [b, c], %w(d, e)", ','), vec!["a", "[b, c]", "%w(d, e)"]);
    }
}
