// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Wire type descriptors.
//!
//! Every column header names the column's type with a textual expression such
//! as `Array(Nullable(LowCardinality(FixedString(10))))`, `Map(String,
//! UInt64)`, `Decimal(18, 4)`, `DateTime64(3, 'UTC')` or `Enum8('a' = 1, 'b' =
//! 2)`. The grammar is small:
//!
//! ```text
//! type   := ident [ '(' [ param { ',' param } ] ')' ]
//! param  := number | quoted [ '=' number ] | ident type | type
//! ```
//!
//! where the `ident type` form names the elements of `Tuple` and `Nested`.
//! This module lexes and parses it by recursive descent into a [`TypeDesc`].

use std::fmt;

use itertools::Itertools;
use thiserror::Error;

/// A parsed wire type descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypeDesc {
    name: String,
    params: Vec<TypeParam>,
}

/// A parameter of a [`TypeDesc`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeParam {
    /// A nested type, e.g. the `Int32` in `Array(Int32)`.
    Type(TypeDesc),
    /// An integer, e.g. the `10` in `FixedString(10)`.
    Number(i64),
    /// A quoted string, e.g. the `'UTC'` in `DateTime('UTC')`.
    String(String),
    /// An enum item, e.g. `'a' = 1`.
    EnumItem {
        /// The item's name.
        name: String,
        /// The item's value.
        value: i64,
    },
    /// A named element, e.g. `a UInt8` in `Tuple(a UInt8)`.
    Named {
        /// The element's name.
        name: String,
        /// The element's type.
        typ: TypeDesc,
    },
}

impl TypeDesc {
    /// Constructs a descriptor without parameters.
    pub fn simple(name: impl Into<String>) -> TypeDesc {
        TypeDesc {
            name: name.into(),
            params: vec![],
        }
    }

    /// Constructs a descriptor from its parts.
    pub fn new(name: impl Into<String>, params: Vec<TypeParam>) -> TypeDesc {
        TypeDesc {
            name: name.into(),
            params,
        }
    }

    /// Parses a type descriptor.
    pub fn parse(s: &str) -> Result<TypeDesc, TypeParseError> {
        let tokens = lex(s)?;
        let mut parser = Parser {
            tokens,
            index: 0,
            end: s.len(),
        };
        let typ = parser.parse_type()?;
        match parser.next() {
            None => Ok(typ),
            Some((token, pos)) => Err(TypeParseError::new(
                pos,
                format!("unexpected {} after type", token.name()),
            )),
        }
    }

    /// The type's name, e.g. `Array`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The type's parameters.
    pub fn params(&self) -> &[TypeParam] {
        &self.params
    }

    /// Returns the nested type at parameter `i`, looking through element
    /// names.
    pub fn type_param(&self, i: usize) -> Option<&TypeDesc> {
        match self.params.get(i)? {
            TypeParam::Type(typ) | TypeParam::Named { typ, .. } => Some(typ),
            _ => None,
        }
    }

    /// Returns the integer at parameter `i`.
    pub fn number_param(&self, i: usize) -> Option<i64> {
        match self.params.get(i)? {
            TypeParam::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the quoted string at parameter `i`.
    pub fn string_param(&self, i: usize) -> Option<&str> {
        match self.params.get(i)? {
            TypeParam::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the items of an `Enum8`/`Enum16` descriptor.
    pub fn enum_items(&self) -> Vec<(&str, i64)> {
        self.params
            .iter()
            .filter_map(|p| match p {
                TypeParam::EnumItem { name, value } => Some((name.as_str(), *value)),
                _ => None,
            })
            .collect()
    }

    /// Reports whether this is `<name>(<one type>)`.
    pub fn is_wrapper(&self, name: &str) -> bool {
        self.name == name && self.params.len() == 1 && self.type_param(0).is_some()
    }

    /// Returns the inner type of `SimpleAggregateFunction(f, T)`, which is
    /// transmitted exactly like `T`, or `self` for any other type.
    pub fn unwrap_simple_aggregate(&self) -> &TypeDesc {
        if self.name == "SimpleAggregateFunction" && self.params.len() == 2 {
            if let Some(inner) = self.type_param(1) {
                return inner;
            }
        }
        self
    }

    /// Returns the number of bytes a value of this type occupies on the wire,
    /// or `None` if the type is not fixed-width.
    pub fn fixed_width(&self) -> Option<usize> {
        let width = match self.name.as_str() {
            "Int8" | "UInt8" | "Enum8" | "Bool" => 1,
            "Int16" | "UInt16" | "Enum16" | "Date" => 2,
            "Int32" | "UInt32" | "Float32" | "Date32" | "DateTime" | "Decimal32" | "IPv4" => 4,
            "Int64" | "UInt64" | "Float64" | "DateTime64" | "Decimal64" => 8,
            "Int128" | "UInt128" | "Decimal128" | "IPv6" | "UUID" => 16,
            "Int256" | "UInt256" | "Decimal256" => 32,
            "Decimal" => match self.number_param(0)? {
                1..=9 => 4,
                10..=18 => 8,
                19..=38 => 16,
                39..=76 => 32,
                _ => return None,
            },
            "FixedString" => usize::try_from(self.number_param(0)?).ok()?,
            _ => return None,
        };
        Some(width)
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if !self.params.is_empty() {
            write!(f, "({})", self.params.iter().format(", "))?;
        }
        Ok(())
    }
}

impl fmt::Display for TypeParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeParam::Type(typ) => typ.fmt(f),
            TypeParam::Number(n) => write!(f, "{n}"),
            TypeParam::String(s) => write_quoted(f, s),
            TypeParam::EnumItem { name, value } => {
                write_quoted(f, name)?;
                write!(f, " = {value}")
            }
            TypeParam::Named { name, typ } => write!(f, "{name} {typ}"),
        }
    }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_str("'")?;
    for ch in s.chars() {
        match ch {
            '\'' => f.write_str("\\'")?,
            '\\' => f.write_str("\\\\")?,
            _ => write!(f, "{ch}")?,
        }
    }
    f.write_str("'")
}

/// An error encountered while parsing a type descriptor.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[error("invalid type descriptor: {message} at position {pos}")]
pub struct TypeParseError {
    /// The byte offset of the error.
    pub pos: usize,
    /// What went wrong.
    pub message: String,
}

impl TypeParseError {
    fn new(pos: usize, message: impl Into<String>) -> TypeParseError {
        TypeParseError {
            pos,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(i64),
    String(String),
    LParen,
    RParen,
    Comma,
    Eq,
}

impl Token {
    fn name(&self) -> &'static str {
        match self {
            Token::Ident(_) => "identifier",
            Token::Number(_) => "number",
            Token::String(_) => "string literal",
            Token::LParen => "left parenthesis",
            Token::RParen => "right parenthesis",
            Token::Comma => "comma",
            Token::Eq => "equals sign",
        }
    }
}

macro_rules! bail {
    ($pos:expr, $($fmt:expr),*) => {
        return Err(TypeParseError::new($pos, format!($($fmt),*)))
    }
}

fn lex(s: &str) -> Result<Vec<(Token, usize)>, TypeParseError> {
    let mut tokens = vec![];
    let mut chars = s.char_indices().peekable();
    while let Some((pos, ch)) = chars.next() {
        let token = match ch {
            _ if ch.is_ascii_whitespace() => continue,
            '(' => Token::LParen,
            ')' => Token::RParen,
            ',' => Token::Comma,
            '=' => Token::Eq,
            'A'..='Z' | 'a'..='z' | '_' => {
                let mut ident = String::from(ch);
                let is_ident = |(_, c): &(usize, char)| c.is_ascii_alphanumeric() || *c == '_';
                while let Some((_, ch)) = chars.next_if(is_ident) {
                    ident.push(ch);
                }
                Token::Ident(ident)
            }
            '`' => {
                let mut ident = String::new();
                loop {
                    match chars.next() {
                        Some((_, '`')) => break,
                        Some((_, c)) => ident.push(c),
                        None => bail!(pos, "unterminated quoted identifier"),
                    }
                }
                Token::Ident(ident)
            }
            '-' | '0'..='9' => {
                let mut digits = String::from(ch);
                while let Some((_, ch)) = chars.next_if(|(_, c)| c.is_ascii_digit()) {
                    digits.push(ch);
                }
                match digits.parse() {
                    Ok(n) => Token::Number(n),
                    Err(_) => bail!(pos, "invalid number {}", digits),
                }
            }
            '\'' => {
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some((_, '\'')) if chars.next_if(|(_, c)| *c == '\'').is_some() => {
                            value.push('\'')
                        }
                        Some((_, '\'')) => break,
                        Some((_, '\\')) => match chars.next() {
                            Some((_, c)) => value.push(c),
                            None => bail!(pos, "unterminated quoted string"),
                        },
                        Some((_, c)) => value.push(c),
                        None => bail!(pos, "unterminated quoted string"),
                    }
                }
                Token::String(value)
            }
            _ => bail!(pos, "unexpected character {:?}", ch),
        };
        tokens.push((token, pos));
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    index: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.index).map(|(t, _)| t)
    }

    fn peek_nth(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.index + n).map(|(t, _)| t)
    }

    fn pos(&self) -> usize {
        self.tokens
            .get(self.index)
            .map(|(_, pos)| *pos)
            .unwrap_or(self.end)
    }

    fn next(&mut self) -> Option<(Token, usize)> {
        let token = self.tokens.get(self.index).cloned();
        if token.is_some() {
            self.index += 1;
        }
        token
    }

    fn consume(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.index += 1;
            true
        } else {
            false
        }
    }

    fn expected<T>(&self, what: &str) -> Result<T, TypeParseError> {
        let found = match self.peek() {
            Some(token) => token.name(),
            None => "end of input",
        };
        Err(TypeParseError::new(
            self.pos(),
            format!("expected {what}, found {found}"),
        ))
    }

    fn parse_type(&mut self) -> Result<TypeDesc, TypeParseError> {
        let name = match self.peek() {
            Some(Token::Ident(name)) => name.clone(),
            _ => return self.expected("type name"),
        };
        self.index += 1;
        let mut params = vec![];
        if self.consume(&Token::LParen) {
            if !self.consume(&Token::RParen) {
                loop {
                    params.push(self.parse_param()?);
                    if self.consume(&Token::RParen) {
                        break;
                    }
                    if !self.consume(&Token::Comma) {
                        return self.expected("comma or right parenthesis");
                    }
                }
            }
        }
        Ok(TypeDesc { name, params })
    }

    fn parse_param(&mut self) -> Result<TypeParam, TypeParseError> {
        match self.peek() {
            Some(Token::Number(n)) => {
                let n = *n;
                self.index += 1;
                Ok(TypeParam::Number(n))
            }
            Some(Token::String(s)) => {
                let s = s.clone();
                self.index += 1;
                if self.consume(&Token::Eq) {
                    match self.peek() {
                        Some(Token::Number(value)) => {
                            let value = *value;
                            self.index += 1;
                            Ok(TypeParam::EnumItem { name: s, value })
                        }
                        _ => self.expected("enum value"),
                    }
                } else {
                    Ok(TypeParam::String(s))
                }
            }
            Some(Token::Ident(name)) => {
                if let Some(Token::Ident(_)) = self.peek_nth(1) {
                    let name = name.clone();
                    self.index += 1;
                    let typ = self.parse_type()?;
                    Ok(TypeParam::Named { name, typ })
                } else {
                    Ok(TypeParam::Type(self.parse_type()?))
                }
            }
            _ => self.expected("type parameter"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_display_roundtrip() {
        for s in [
            "Int32",
            "Array(Nullable(LowCardinality(FixedString(10))))",
            "Map(String, UInt64)",
            "Decimal(18, 4)",
            "DateTime64(3, 'UTC')",
            "Enum8('a' = 1, 'b' = -2)",
            "Tuple(a UInt8, b Array(String))",
            "SimpleAggregateFunction(sum, UInt64)",
            "DateTime('Asia/Tehran')",
            "Enum8('it\\'s' = 1)",
        ] {
            let desc = TypeDesc::parse(s).unwrap();
            assert_eq!(desc.to_string(), s);
        }
    }

    #[test]
    fn test_parse_whitespace_and_quotes() {
        let desc = TypeDesc::parse(" Map( String ,Array( Int8 ) ) ").unwrap();
        assert_eq!(desc.to_string(), "Map(String, Array(Int8))");
        let desc = TypeDesc::parse("Enum8('it''s' = 1)").unwrap();
        assert_eq!(desc.enum_items(), vec![("it's", 1)]);
    }

    #[test]
    fn test_parse_structure() {
        let desc = TypeDesc::parse("DateTime64(3, 'UTC')").unwrap();
        assert_eq!(desc.name(), "DateTime64");
        assert_eq!(desc.number_param(0), Some(3));
        assert_eq!(desc.string_param(1), Some("UTC"));

        let desc = TypeDesc::parse("Tuple(a UInt8, b String)").unwrap();
        assert_eq!(desc.type_param(1), Some(&TypeDesc::simple("String")));
        assert!(matches!(&desc.params()[0], TypeParam::Named { name, .. } if name == "a"));

        let desc = TypeDesc::parse("SimpleAggregateFunction(anyLast, Nullable(Int8))").unwrap();
        assert_eq!(desc.unwrap_simple_aggregate().to_string(), "Nullable(Int8)");
        assert!(desc.unwrap_simple_aggregate().is_wrapper("Nullable"));
    }

    #[test]
    fn test_fixed_width() {
        for (s, width) in [
            ("Int8", Some(1)),
            ("Enum16('a' = 1)", Some(2)),
            ("Date32", Some(4)),
            ("DateTime('UTC')", Some(4)),
            ("DateTime64(3)", Some(8)),
            ("Decimal(9, 2)", Some(4)),
            ("Decimal(38, 2)", Some(16)),
            ("Decimal(76, 2)", Some(32)),
            ("Decimal(77, 2)", None),
            ("FixedString(3)", Some(3)),
            ("UUID", Some(16)),
            ("String", None),
            ("Array(Int8)", None),
        ] {
            assert_eq!(TypeDesc::parse(s).unwrap().fixed_width(), width, "{s}");
        }
    }

    #[test]
    fn test_parse_errors() {
        for (s, pos, message) in [
            ("", 0, "expected type name, found end of input"),
            ("Array(", 6, "expected type parameter, found end of input"),
            ("Array(Int8", 10, "expected comma or right parenthesis, found end of input"),
            ("Array(Int8))", 11, "unexpected right parenthesis after type"),
            ("Enum8('a' = )", 12, "expected enum value, found right parenthesis"),
            ("DateTime('UTC)", 9, "unterminated quoted string"),
            ("Int8;", 4, "unexpected character ';'"),
        ] {
            let err = TypeDesc::parse(s).unwrap_err();
            assert_eq!(err, TypeParseError::new(pos, message), "{s}");
        }
    }
}
