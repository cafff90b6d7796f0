//! CQL serialization and parsing of filter trees.

use crate::error::GifwError;
use crate::filter::{
    Condition, FilterGroup, FilterNode, FilterProperty, GroupOperator, Operator, PropertyType,
};

/// Combines a default filter `D` and a user filter `U` into `(D) AND (U)`.
pub fn combine_filters(default: Option<&str>, user: Option<&str>) -> Option<String> {
    let default = default.filter(|f| !f.trim().is_empty());
    let user = user.filter(|f| !f.trim().is_empty());
    match (default, user) {
        (Some(default), Some(user)) => Some(format!("({default}) AND ({user})")),
        (Some(filter), None) | (None, Some(filter)) => Some(filter.to_string()),
        (None, None) => None,
    }
}

/// Extracts the user part `U` from a filter combined with [`combine_filters`].
///
/// If the filter equals the default filter there is no user part. Filters that do not contain
/// the default part are returned as is.
pub fn strip_default_filter(combined: &str, default: Option<&str>) -> Option<String> {
    let combined = combined.trim();
    if combined.is_empty() {
        return None;
    }

    let Some(default) = default.map(str::trim).filter(|d| !d.is_empty()) else {
        return Some(combined.to_string());
    };

    if combined == default {
        return None;
    }

    let prefix = format!("({default}) AND (");
    match combined
        .strip_prefix(prefix.as_str())
        .and_then(|rest| rest.strip_suffix(')'))
    {
        Some(user) => Some(user.to_string()),
        None => Some(combined.to_string()),
    }
}

pub(crate) fn serialize_group(group: &FilterGroup, is_root: bool) -> Option<String> {
    let parts: Vec<String> = group
        .children
        .iter()
        .filter_map(|child| match child {
            FilterNode::Condition(condition) => Some(serialize_condition(condition)),
            FilterNode::Group(inner) => serialize_group(inner, false),
        })
        .collect();

    if parts.is_empty() {
        return None;
    }

    match group.operator {
        GroupOperator::Not => Some(format!("NOT ({})", parts.join(" AND "))),
        GroupOperator::And | GroupOperator::Or => {
            let separator = if group.operator == GroupOperator::And {
                " AND "
            } else {
                " OR "
            };
            let joined = parts.join(separator);
            if is_root || parts.len() == 1 {
                Some(joined)
            } else {
                Some(format!("({joined})"))
            }
        }
    }
}

fn serialize_condition(condition: &Condition) -> String {
    let property = quote_identifier(&condition.property);
    let literal = |value: &Option<String>| {
        let value = value.as_deref().unwrap_or_default();
        if condition.property_type.is_numeric() {
            value.trim().to_string()
        } else {
            quote_string(value)
        }
    };

    match condition.operator {
        Operator::IsNull => format!("{property} IS NULL"),
        Operator::Like => format!("{property} LIKE {}", quote_string(condition.value.as_deref().unwrap_or_default())),
        Operator::Between => format!(
            "{property} BETWEEN {} AND {}",
            literal(&condition.value),
            literal(&condition.upper)
        ),
        simple => format!(
            "{property} {} {}",
            simple.symbol().unwrap_or("="),
            literal(&condition.value)
        ),
    }
}

fn quote_string(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn quote_identifier(name: &str) -> String {
    let is_plain = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == ':');
    if is_plain && !is_keyword(name) {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

fn is_keyword(word: &str) -> bool {
    matches!(
        word.to_ascii_uppercase().as_str(),
        "AND" | "OR" | "NOT" | "BETWEEN" | "LIKE" | "IS" | "NULL"
    )
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Identifier(String),
    Keyword(String),
    Str(String),
    Number(String),
    Compare(&'static str),
    Open,
    Close,
}

fn tokenize(input: &str) -> Result<Vec<Token>, GifwError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = vec![];
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::Open);
                i += 1;
            }
            ')' => {
                tokens.push(Token::Close);
                i += 1;
            }
            '\'' | '"' => {
                let quote = c;
                let mut value = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => {
                            return Err(GifwError::Decoding(format!(
                                "unterminated literal in filter `{input}`"
                            )))
                        }
                        Some(&ch) if ch == quote && chars.get(i + 1) == Some(&quote) => {
                            value.push(quote);
                            i += 2;
                        }
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(&ch) => {
                            value.push(ch);
                            i += 1;
                        }
                    }
                }

                tokens.push(if quote == '\'' {
                    Token::Str(value)
                } else {
                    Token::Identifier(value)
                });
            }
            '=' => {
                tokens.push(Token::Compare("="));
                i += 1;
            }
            '<' | '>' => {
                let next = chars.get(i + 1).copied();
                let (symbol, len) = match (c, next) {
                    ('<', Some('>')) => ("<>", 2),
                    ('<', Some('=')) => ("<=", 2),
                    ('>', Some('=')) => (">=", 2),
                    ('<', _) => ("<", 1),
                    _ => (">", 1),
                };
                tokens.push(Token::Compare(symbol));
                i += len;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Compare("<>"));
                i += 2;
            }
            c if c.is_ascii_digit() || c == '-' || c == '.' => {
                let start = i;
                i += 1;
                while i < chars.len()
                    && (chars[i].is_ascii_digit() || matches!(chars[i], '.' | 'e' | 'E'))
                {
                    i += 1;
                }
                tokens.push(Token::Number(chars[start..i].iter().collect()));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || matches!(chars[i], '_' | '.' | ':'))
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                if is_keyword(&word) {
                    tokens.push(Token::Keyword(word.to_ascii_uppercase()));
                } else {
                    tokens.push(Token::Identifier(word));
                }
            }
            other => {
                return Err(GifwError::Decoding(format!(
                    "unexpected character `{other}` in filter `{input}`"
                )))
            }
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    position: usize,
    properties: &'a [FilterProperty],
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Result<Token, GifwError> {
        let token = self
            .tokens
            .get(self.position)
            .cloned()
            .ok_or_else(|| GifwError::Decoding("unexpected end of filter".into()))?;
        self.position += 1;
        Ok(token)
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Keyword(k)) if k == keyword)
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), GifwError> {
        match self.next()? {
            Token::Keyword(k) if k == keyword => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    fn parse_or(&mut self) -> Result<FilterNode, GifwError> {
        let mut children = vec![self.parse_and()?];
        while self.is_keyword("OR") {
            self.position += 1;
            children.push(self.parse_and()?);
        }

        Ok(collapse(GroupOperator::Or, children))
    }

    fn parse_and(&mut self) -> Result<FilterNode, GifwError> {
        let mut children = vec![self.parse_unary()?];
        while self.is_keyword("AND") {
            self.position += 1;
            children.push(self.parse_unary()?);
        }

        Ok(collapse(GroupOperator::And, children))
    }

    fn parse_unary(&mut self) -> Result<FilterNode, GifwError> {
        if self.is_keyword("NOT") {
            self.position += 1;
            let inner = self.parse_unary()?;
            let children = match inner {
                FilterNode::Group(FilterGroup {
                    operator: GroupOperator::And,
                    children,
                }) => children,
                other => vec![other],
            };
            return Ok(FilterNode::Group(FilterGroup {
                operator: GroupOperator::Not,
                children,
            }));
        }

        if self.peek() == Some(&Token::Open) {
            self.position += 1;
            let inner = self.parse_or()?;
            return match self.next()? {
                Token::Close => Ok(inner),
                other => Err(unexpected(&other)),
            };
        }

        self.parse_condition()
    }

    fn parse_condition(&mut self) -> Result<FilterNode, GifwError> {
        let property = match self.next()? {
            Token::Identifier(name) => name,
            other => return Err(unexpected(&other)),
        };

        let (operator, value, upper) = match self.next()? {
            Token::Compare(symbol) => {
                let operator = match symbol {
                    "=" => Operator::Equals,
                    "<>" => Operator::NotEquals,
                    ">" => Operator::GreaterThan,
                    ">=" => Operator::GreaterOrEqual,
                    "<" => Operator::LessThan,
                    _ => Operator::LessOrEqual,
                };
                (operator, Some(self.literal()?), None)
            }
            Token::Keyword(k) if k == "BETWEEN" => {
                let lower = self.literal()?;
                self.expect_keyword("AND")?;
                (Operator::Between, Some(lower), Some(self.literal()?))
            }
            Token::Keyword(k) if k == "LIKE" => (Operator::Like, Some(self.literal()?), None),
            Token::Keyword(k) if k == "IS" => {
                self.expect_keyword("NULL")?;
                (Operator::IsNull, None, None)
            }
            other => return Err(unexpected(&other)),
        };

        let property_type = self
            .properties
            .iter()
            .find(|p| p.name == property)
            .map(|p| p.property_type)
            .unwrap_or_else(|| match &value {
                Some(Literal::Number(_)) => PropertyType::Number,
                _ => PropertyType::String,
            });

        Ok(FilterNode::Condition(Condition {
            property,
            property_type,
            operator,
            value: value.map(Literal::into_string),
            upper: upper.map(Literal::into_string),
        }))
    }

    fn literal(&mut self) -> Result<Literal, GifwError> {
        match self.next()? {
            Token::Str(value) => Ok(Literal::Str(value)),
            Token::Number(value) => Ok(Literal::Number(value)),
            other => Err(unexpected(&other)),
        }
    }
}

enum Literal {
    Str(String),
    Number(String),
}

impl Literal {
    fn into_string(self) -> String {
        match self {
            Literal::Str(v) | Literal::Number(v) => v,
        }
    }
}

fn unexpected(token: &Token) -> GifwError {
    GifwError::Decoding(format!("unexpected token {token:?} in filter"))
}

fn collapse(operator: GroupOperator, mut children: Vec<FilterNode>) -> FilterNode {
    if children.len() == 1 {
        return children.remove(0);
    }

    let mut flattened = Vec::with_capacity(children.len());
    for child in children {
        match child {
            FilterNode::Group(group) if group.operator == operator => {
                flattened.extend(group.children)
            }
            other => flattened.push(other),
        }
    }

    FilterNode::Group(FilterGroup {
        operator,
        children: flattened,
    })
}

/// Parses a CQL string into a filter tree.
///
/// Property types are taken from `properties`; unknown properties are typed by their literal.
/// The returned root is an `AND` or `OR` group.
pub fn parse_cql(input: &str, properties: &[FilterProperty]) -> Result<FilterGroup, GifwError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Ok(FilterGroup::default());
    }

    let mut parser = Parser {
        tokens,
        position: 0,
        properties,
    };
    let node = parser.parse_or()?;
    if let Some(token) = parser.peek() {
        return Err(unexpected(token));
    }

    Ok(match node {
        FilterNode::Group(group) if group.operator != GroupOperator::Not => group,
        other => FilterGroup::default().with_child(other),
    })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn properties() -> Vec<FilterProperty> {
        vec![
            FilterProperty::new("name", PropertyType::String),
            FilterProperty::new("lanes", PropertyType::Int),
            FilterProperty::new("opened", PropertyType::Date),
        ]
    }

    fn sample_tree() -> FilterGroup {
        let [name, lanes, opened] = <[FilterProperty; 3]>::try_from(properties()).unwrap();
        FilterGroup::default()
            .with_child(FilterNode::Condition(
                Condition::new(&name, Operator::Like).with_value("A%"),
            ))
            .with_child(FilterNode::Group(
                FilterGroup::new(GroupOperator::Or)
                    .with_child(FilterNode::Condition(
                        Condition::new(&lanes, Operator::GreaterOrEqual).with_value("2"),
                    ))
                    .with_child(FilterNode::Condition(
                        Condition::new(&opened, Operator::Between)
                            .with_value("2020-01-01")
                            .with_upper("2021-01-01"),
                    )),
            ))
            .with_child(FilterNode::Group(
                FilterGroup::new(GroupOperator::Not).with_child(FilterNode::Condition(
                    Condition::new(&name, Operator::IsNull),
                )),
            ))
    }

    #[test]
    fn serialization() {
        insta::assert_snapshot!(sample_tree().to_cql().unwrap(), @"name LIKE 'A%' AND (lanes >= 2 OR opened BETWEEN '2020-01-01' AND '2021-01-01') AND NOT (name IS NULL)");
    }

    #[test]
    fn parse_serialized_tree() {
        let cql = sample_tree().to_cql().unwrap();
        let parsed = parse_cql(&cql, &properties()).unwrap();
        assert_eq!(parsed, sample_tree());
    }

    #[test]
    fn quotes_are_escaped() {
        let name = FilterProperty::new("street name", PropertyType::String);
        let tree = FilterGroup::default().with_child(FilterNode::Condition(
            Condition::new(&name, Operator::Equals).with_value("St John's"),
        ));
        let cql = tree.to_cql().unwrap();
        assert_eq!(cql, r#""street name" = 'St John''s'"#);
        assert_eq!(parse_cql(&cql, &[name]).unwrap(), tree);
    }

    #[test]
    fn unknown_properties_are_typed_by_literal() {
        let parsed = parse_cql("width < 3.5", &[]).unwrap();
        assert_matches!(
            &parsed.children[0],
            FilterNode::Condition(Condition {
                property_type: PropertyType::Number,
                operator: Operator::LessThan,
                ..
            })
        );
    }

    #[test]
    fn invalid_filters_are_rejected() {
        assert_matches!(parse_cql("name = ", &[]), Err(GifwError::Decoding(_)));
        assert_matches!(parse_cql("name = 'a", &[]), Err(GifwError::Decoding(_)));
        assert_matches!(parse_cql("(a = 1", &[]), Err(GifwError::Decoding(_)));
        assert_matches!(parse_cql("a = 1 b", &[]), Err(GifwError::Decoding(_)));
    }

    #[test]
    fn default_filter_wrapping() {
        let combined = combine_filters(Some("owner = 'x'"), Some("a = 1 OR b = 2")).unwrap();
        assert_eq!(combined, "(owner = 'x') AND (a = 1 OR b = 2)");
        assert_eq!(
            strip_default_filter(&combined, Some("owner = 'x'")).as_deref(),
            Some("a = 1 OR b = 2")
        );
        assert_eq!(strip_default_filter("owner = 'x'", Some("owner = 'x'")), None);
        assert_eq!(
            strip_default_filter("c = 3", Some("owner = 'x'")).as_deref(),
            Some("c = 3")
        );
        assert_eq!(combine_filters(None, Some(" ")), None);
    }
}
