//! Call syntax
//!
//! Migration DSL statements are method calls: an optional receiver, a
//! method name, positional arguments, keyword options and maybe a trailing
//! `do |t|`. Only literal arguments are understood; anything else is kept as
//! raw text so a statement is never rejected for carrying an expression.

use once_cell::sync::Lazy;
use regex::Regex;

use super::lexer::{split_outside, walk_code, Flow};

static BLOCK_OPENER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\s)do\s*(?:\|([^|]*)\|)?\s*$").unwrap());

static CALL_HEAD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:([A-Za-z_][A-Za-z0-9_]*)\.)?([a-z_][A-Za-z0-9_]*[!?]?)").unwrap()
});

static IDENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*[!?]?$").unwrap());

/// Literal argument value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// `:albums`
    Symbol(String),
    /// `"albums"` or `'albums'`
    Str(String),
    /// `[:a, :b]`, `%i[a b]`, `%w[a b]`
    List(Vec<Value>),
    /// `{ unique: true }`
    Hash(Vec<(String, Value)>),
    Bool(bool),
    Nil,
    /// Anything else, trimmed
    Raw(String),
}

impl Value {
    /// Symbol or string content
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Self::Symbol(s) | Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// A single name or a list of names, in order
    pub fn as_names(&self) -> Option<Vec<&str>> {
        match self {
            Self::Symbol(_) | Self::Str(_) => self.as_name().map(|n| vec![n]),
            Self::List(items) => items.iter().map(Value::as_name).collect(),
            _ => None,
        }
    }

    /// Ruby truthiness of a literal; raw expressions count as truthy
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Self::Bool(false) | Self::Nil)
    }

    /// Look up a key in a hash literal
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Hash(pairs) => pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }
}

/// One argument of a call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    Positional(Value),
    Keyword(String, Value),
}

/// Trailing `do |params|`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BlockOpener {
    pub params: Vec<String>,
}

/// A parsed statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub receiver: Option<String>,
    pub method: String,
    pub args: Vec<Arg>,
    pub block: Option<BlockOpener>,
}

impl Call {
    pub fn positional(&self) -> impl Iterator<Item = &Value> {
        self.args.iter().filter_map(|arg| match arg {
            Arg::Positional(v) => Some(v),
            Arg::Keyword(..) => None,
        })
    }

    pub fn positional_at(&self, index: usize) -> Option<&Value> {
        self.positional().nth(index)
    }

    /// Name (symbol or string) at a positional index
    pub fn name_at(&self, index: usize) -> Option<&str> {
        self.positional_at(index).and_then(Value::as_name)
    }

    /// All positional names starting at `index`, stopping at the first non-name
    pub fn names_from(&self, index: usize) -> Vec<&str> {
        self.positional()
            .skip(index)
            .map_while(Value::as_name)
            .collect()
    }

    pub fn option(&self, key: &str) -> Option<&Value> {
        self.args.iter().find_map(|arg| match arg {
            Arg::Keyword(k, v) if k == key => Some(v),
            _ => None,
        })
    }

    pub fn has_receiver(&self, name: &str) -> bool {
        self.receiver.as_deref() == Some(name)
    }
}

/// Parse a logical line as a method call.
///
/// Returns `None` when the line does not start with a call (assignments to
/// constants, chained calls, literals...).
pub fn parse_call(text: &str) -> Option<Call> {
    let text = text.trim().trim_end_matches(';').trim_end();

    let (text, block) = match BLOCK_OPENER.captures(text) {
        Some(caps) => {
            let whole = caps.get(0)?;
            let params = caps
                .get(1)
                .map(|m| {
                    m.as_str()
                        .split(',')
                        .map(|p| p.trim().to_string())
                        .filter(|p| !p.is_empty())
                        .collect()
                })
                .unwrap_or_default();
            (text[..whole.start()].trim_end(), Some(BlockOpener { params }))
        }
        None => (text, None),
    };

    let text = strip_modifier(text);

    let caps = CALL_HEAD.captures(text)?;
    let head = caps.get(0)?;
    let receiver = caps.get(1).map(|m| m.as_str().to_string());
    let method = caps.get(2)?.as_str().to_string();
    let rest = &text[head.end()..];

    let args_text = if rest.starts_with('(') {
        let close = matching_close(rest)?;
        if !rest[close + 1..].trim().is_empty() {
            return None;
        }
        &rest[1..close]
    } else if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        rest
    } else {
        return None;
    };

    let args = split_top_level(args_text)
        .into_iter()
        .map(|raw| parse_arg(&raw))
        .collect();

    Some(Call {
        receiver,
        method,
        args,
        block,
    })
}

/// Whether the statement ends in a `do` block opener, parseable or not
pub fn opens_block(text: &str) -> bool {
    BLOCK_OPENER.is_match(text.trim().trim_end_matches(';').trim_end())
}

/// Drop a trailing `if ...` / `unless ...` statement modifier
fn strip_modifier(text: &str) -> &str {
    let mut depth = 0i32;
    let mut cut = None;

    walk_code(text, |i, c| {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            ' ' if depth == 0 => {
                let rest = &text[i + 1..];
                if rest.starts_with("if ") || rest.starts_with("unless ") {
                    cut = Some(i);
                    return Flow::Stop;
                }
            }
            _ => {}
        }
        Flow::Continue
    });

    match cut {
        Some(i) => text[..i].trim_end(),
        None => text,
    }
}

/// Split on commas that are not nested in brackets or literals
pub fn split_top_level(text: &str) -> Vec<String> {
    split_outside(text, ',')
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn parse_arg(raw: &str) -> Arg {
    match split_keyword(raw) {
        Some((key, value)) => Arg::Keyword(key, parse_value(value)),
        None => Arg::Positional(parse_value(raw)),
    }
}

/// Recognize `key: value`, `:key => value` and `"key" => value`
fn split_keyword(raw: &str) -> Option<(String, &str)> {
    if let Some((left, right)) = split_hash_rocket(raw) {
        let key = parse_value(left);
        return key.as_name().map(|k| (k.to_string(), right));
    }

    let colon = raw.find(':')?;
    let key = &raw[..colon];
    let after = &raw[colon + 1..];
    if key.is_empty() || after.starts_with(':') || !IDENT.is_match(key) {
        return None;
    }
    Some((key.to_string(), after.trim()))
}

fn split_hash_rocket(raw: &str) -> Option<(&str, &str)> {
    let pos = raw.find("=>")?;
    let left = raw[..pos].trim();
    if left.starts_with(':') || left.starts_with('"') || left.starts_with('\'') {
        Some((left, raw[pos + 2..].trim()))
    } else {
        None
    }
}

/// Parse a literal value
pub fn parse_value(raw: &str) -> Value {
    let raw = raw.trim();

    if let Some(sym) = raw.strip_prefix(':') {
        if let Some(inner) = unquote(sym) {
            return Value::Symbol(inner.to_string());
        }
        if IDENT.is_match(sym) {
            return Value::Symbol(sym.to_string());
        }
        return Value::Raw(raw.to_string());
    }

    if let Some(inner) = unquote(raw) {
        return Value::Str(inner.to_string());
    }

    if raw.starts_with('[') && raw.ends_with(']') {
        let items = split_top_level(&raw[1..raw.len() - 1])
            .iter()
            .map(|item| parse_value(item))
            .collect();
        return Value::List(items);
    }

    if let Some(list) = percent_list(raw) {
        return list;
    }

    if raw.starts_with('{') && raw.ends_with('}') {
        let pairs = split_top_level(&raw[1..raw.len() - 1])
            .iter()
            .filter_map(|item| split_keyword(item).map(|(k, v)| (k, parse_value(v))))
            .collect();
        return Value::Hash(pairs);
    }

    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "nil" => Value::Nil,
        _ => Value::Raw(raw.to_string()),
    }
}

/// `%i[a b]`, `%w(a b)` and friends
fn percent_list(raw: &str) -> Option<Value> {
    let rest = raw.strip_prefix('%')?;
    let mut chars = rest.char_indices();
    let (_, flavor) = chars.next()?;
    let (at, open) = chars.next()?;
    let close = match open {
        '[' => ']',
        '(' => ')',
        '{' => '}',
        '<' => '>',
        _ => return None,
    };
    let body = rest[at + open.len_utf8()..].strip_suffix(close)?;
    let items = body.split_whitespace().map(|w| match flavor {
        'i' | 'I' => Some(Value::Symbol(w.to_string())),
        'w' | 'W' => Some(Value::Str(w.to_string())),
        _ => None,
    });
    items.collect::<Option<Vec<_>>>().map(Value::List)
}

fn unquote(raw: &str) -> Option<&str> {
    let first = raw.chars().next()?;
    if (first == '"' || first == '\'') && raw.len() >= 2 && raw.ends_with(first) {
        let inner = &raw[1..raw.len() - 1];
        // `"a", "b"` must not read as one string
        if !inner.contains(first) {
            return Some(inner);
        }
    }
    None
}

/// Byte index of the `)` closing the `(` at the start of `text`
fn matching_close(text: &str) -> Option<usize> {
    let mut depth = 0i32;
    let mut found = None;

    walk_code(text, |i, c| {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => {
                depth -= 1;
                if depth == 0 {
                    found = (c == ')').then_some(i);
                    return Flow::Stop;
                }
            }
            _ => {}
        }
        Flow::Continue
    });
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_create_table_with_block() {
        let call = parse_call(r#"create_table "albums", force: :cascade do |t|"#).unwrap();
        assert_eq!(call.receiver, None);
        assert_eq!(call.method, "create_table");
        assert_eq!(call.name_at(0), Some("albums"));
        assert_eq!(call.option("force"), Some(&Value::Symbol("cascade".into())));
        assert_eq!(call.block.unwrap().params, vec!["t".to_string()]);
    }

    #[test]
    fn test_parse_receiver_and_options() {
        let call = parse_call("t.references :comment, null: false, index: { unique: true }").unwrap();
        assert!(call.has_receiver("t"));
        assert_eq!(call.method, "references");
        assert_eq!(call.names_from(0), vec!["comment"]);
        let index = call.option("index").unwrap();
        assert!(index.is_truthy());
        assert_eq!(index.get("unique"), Some(&Value::Bool(true)));
        assert_eq!(call.option("null"), Some(&Value::Bool(false)));
    }

    #[test]
    fn test_parse_parenthesized_call() {
        let call = parse_call("add_index(:albums, [:company_id, :department_id])").unwrap();
        assert_eq!(call.method, "add_index");
        assert_eq!(
            call.positional_at(1).and_then(Value::as_names),
            Some(vec!["company_id", "department_id"])
        );
    }

    #[test]
    fn test_parse_hash_rocket_and_percent_lists() {
        let call = parse_call("add_index :albums, %i[a_id b_id], :unique => true").unwrap();
        assert_eq!(
            call.positional_at(1).and_then(Value::as_names),
            Some(vec!["a_id", "b_id"])
        );
        assert_eq!(call.option("unique"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_string_names_and_expressions() {
        let call = parse_call(r#"add_index "users", "lower(email)""#).unwrap();
        assert_eq!(call.name_at(1), Some("lower(email)"));

        let call = parse_call(r#"t.index ["comment_id"], name: "index_albums_on_comment_id""#).unwrap();
        assert_eq!(
            call.positional_at(0).and_then(Value::as_names),
            Some(vec!["comment_id"])
        );
    }

    #[test]
    fn test_statement_modifier_is_dropped() {
        let call = parse_call("add_index :albums, :comment_id unless index_exists?(:albums, :comment_id)").unwrap();
        assert_eq!(call.args.len(), 2);
        assert_eq!(call.name_at(1), Some("comment_id"));
    }

    #[test]
    fn test_opens_block() {
        assert!(opens_block("ActiveRecord::Schema[7.1].define(version: 2024) do"));
        assert!(opens_block("items.each do |item|"));
        assert!(!opens_block("add_index :albums, :comment_id"));
        assert!(!opens_block("t.string :undo"));
    }

    #[test]
    fn test_non_calls() {
        assert!(parse_call("ActiveRecord::Schema[7.1].define(version: 2024) do").is_none());
        assert!(parse_call("foo.bar.baz").is_none());
        assert!(parse_call("42").is_none());
    }

    #[test]
    fn test_literal_arguments_split_cleanly() {
        let call = parse_call("add_index :albums, %w(o'neil_id b_id), where: %q(name != 'x, y')").unwrap();
        assert_eq!(call.args.len(), 3);
        assert_eq!(
            call.positional_at(1).and_then(Value::as_names),
            Some(vec!["o'neil_id", "b_id"])
        );

        let call = parse_call("validate :slug, with: /[a-z']+/").unwrap();
        assert_eq!(call.args.len(), 2);
    }

    #[test]
    fn test_multibyte_percent_flavor() {
        assert_eq!(parse_value("%€[x]"), Value::Raw("%€[x]".to_string()));
        assert_eq!(
            parse_value("%i<a_id>"),
            Value::List(vec![Value::Symbol("a_id".to_string())])
        );
    }

    #[test]
    fn test_reversible_block_without_params() {
        let call = parse_call("dir.down do").unwrap();
        assert!(call.has_receiver("dir"));
        assert_eq!(call.method, "down");
        assert_eq!(call.block, Some(BlockOpener::default()));

        let call = parse_call("reversible do |dir|").unwrap();
        assert_eq!(call.method, "reversible");
        assert!(call.args.is_empty());
    }
}
