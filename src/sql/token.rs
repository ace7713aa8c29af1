//! SQL Tokens - the atomic units of SQL output.
//!
//! Tokens are dialect-agnostic representations that serialize
//! to dialect-specific strings. Bound arguments travel inside the stream as
//! [`Token::Param`], so placeholder numbering and argument order come from a
//! single left-to-right walk.

use super::dialect::SqlDialect;
use crate::model::Value;

/// SQL Token - every element the emitter and translator produce.
///
/// Adding a new variant here will cause compile errors everywhere
/// it needs to be handled (exhaustive matching).
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // === Keywords ===
    Select,
    From,
    Where,
    And,
    Or,
    Not,
    As,
    On,
    Join,
    Left,
    Right,
    Full,
    Outer,
    Cross,
    GroupBy,
    Having,
    OrderBy,
    Desc,
    NullsLast,
    Limit,
    Offset,
    Fetch,
    Next,
    Rows,
    Only,
    In,
    Like,
    ILike,
    IsNull,
    IsNotNull,
    IsNotDistinctFrom,
    Distinct,
    Null,

    // === Punctuation ===
    Comma,
    Dot,
    LParen,
    RParen,

    // === Operators ===
    Eq,
    Ne,
    Lt,
    Gt,
    Lte,
    Gte,
    Minus,
    Mul,
    Div,

    // === Whitespace ===
    Space,

    // === Dynamic Content ===
    /// Simple identifier (column, alias)
    Ident(String),
    /// Qualified identifier: schema.table or just table
    QualifiedIdent {
        schema: Option<String>,
        name: String,
    },
    /// Integer literal, inlined (row counts, ordinals)
    LitInt(i64),

    /// A bound argument; serialized as the dialect's placeholder.
    Param(Value),

    /// Function name, rendered upper-cased.
    FunctionName(String),

    // === Escape Hatch ===
    /// Raw SQL passed directly to output without escaping.
    ///
    /// # Security Warning
    ///
    /// **Never pass user input to this variant.** Raw SQL is not sanitized.
    /// Only metrics-view expressions (trusted schema text) and dialect
    /// generator output land here. User values go through [`Token::Param`].
    Raw(String),
}

impl Token {
    /// Serialize a non-parameter token for the given dialect.
    ///
    /// Parameters are numbered by [`TokenStream::to_sql`]; serializing one
    /// here renders the placeholder for index 1.
    pub fn serialize(&self, dialect: &dyn SqlDialect) -> String {
        match self {
            // Keywords
            Token::Select => "SELECT".into(),
            Token::From => "FROM".into(),
            Token::Where => "WHERE".into(),
            Token::And => "AND".into(),
            Token::Or => "OR".into(),
            Token::Not => "NOT".into(),
            Token::As => "AS".into(),
            Token::On => "ON".into(),
            Token::Join => "JOIN".into(),
            Token::Left => "LEFT".into(),
            Token::Right => "RIGHT".into(),
            Token::Full => "FULL".into(),
            Token::Outer => "OUTER".into(),
            Token::Cross => "CROSS".into(),
            Token::GroupBy => "GROUP BY".into(),
            Token::Having => "HAVING".into(),
            Token::OrderBy => "ORDER BY".into(),
            Token::Desc => "DESC".into(),
            Token::NullsLast => "NULLS LAST".into(),
            Token::Limit => "LIMIT".into(),
            Token::Offset => "OFFSET".into(),
            Token::Fetch => "FETCH".into(),
            Token::Next => "NEXT".into(),
            Token::Rows => "ROWS".into(),
            Token::Only => "ONLY".into(),
            Token::In => "IN".into(),
            Token::Like => "LIKE".into(),
            Token::ILike => "ILIKE".into(),
            Token::IsNull => "IS NULL".into(),
            Token::IsNotNull => "IS NOT NULL".into(),
            Token::IsNotDistinctFrom => "IS NOT DISTINCT FROM".into(),
            Token::Distinct => "DISTINCT".into(),
            Token::Null => "NULL".into(),

            // Punctuation
            Token::Comma => ",".into(),
            Token::Dot => ".".into(),
            Token::LParen => "(".into(),
            Token::RParen => ")".into(),

            // Operators
            Token::Eq => "=".into(),
            Token::Ne => "<>".into(),
            Token::Lt => "<".into(),
            Token::Gt => ">".into(),
            Token::Lte => "<=".into(),
            Token::Gte => ">=".into(),
            Token::Minus => "-".into(),
            Token::Mul => "*".into(),
            Token::Div => "/".into(),

            Token::Space => " ".into(),

            // Dynamic - dialect-specific formatting
            Token::Ident(name) => dialect.quote_identifier(name),
            Token::QualifiedIdent { schema, name } => match schema {
                Some(s) => format!(
                    "{}.{}",
                    dialect.quote_identifier(s),
                    dialect.quote_identifier(name)
                ),
                None => dialect.quote_identifier(name),
            },
            Token::LitInt(n) => n.to_string(),
            Token::Param(_) => dialect.placeholder(1),
            Token::FunctionName(name) => name.to_uppercase(),

            Token::Raw(s) => s.clone(),
        }
    }
}

/// A stream of tokens that can be serialized to SQL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenStream {
    tokens: Vec<Token>,
}

impl TokenStream {
    /// Create an empty token stream.
    pub fn new() -> Self {
        Self { tokens: vec![] }
    }

    /// A stream holding one raw SQL fragment.
    pub fn raw(sql: impl Into<String>) -> Self {
        let mut ts = Self::new();
        ts.push(Token::Raw(sql.into()));
        ts
    }

    /// A stream holding one quoted identifier.
    pub fn ident(name: impl Into<String>) -> Self {
        let mut ts = Self::new();
        ts.push(Token::Ident(name.into()));
        ts
    }

    /// `"table"."column"`
    pub fn qualified(table: &str, column: &str) -> Self {
        let mut ts = Self::new();
        ts.push(Token::Ident(table.into()))
            .push(Token::Dot)
            .push(Token::Ident(column.into()));
        ts
    }

    /// Push a single token.
    pub fn push(&mut self, token: Token) -> &mut Self {
        self.tokens.push(token);
        self
    }

    /// Append another token stream.
    pub fn append(&mut self, other: &TokenStream) -> &mut Self {
        self.tokens.extend(other.tokens.iter().cloned());
        self
    }

    /// Append another stream wrapped in parentheses.
    pub fn append_parens(&mut self, other: &TokenStream) -> &mut Self {
        self.lparen();
        self.append(other);
        self.rparen()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Serialize to SQL text plus the positional argument list.
    ///
    /// Placeholders are numbered from 1 in the order they appear, and the
    /// returned arguments are in that same order.
    pub fn to_sql(&self, dialect: &dyn SqlDialect) -> (String, Vec<Value>) {
        let mut sql = String::new();
        let mut args = Vec::new();
        for token in &self.tokens {
            match token {
                Token::Param(value) => {
                    args.push(value.clone());
                    sql.push_str(&dialect.placeholder(args.len()));
                }
                other => sql.push_str(&other.serialize(dialect)),
            }
        }
        (sql, args)
    }

    /// Serialize to SQL text, discarding arguments.
    pub fn serialize(&self, dialect: &dyn SqlDialect) -> String {
        self.to_sql(dialect).0
    }

    /// Join streams with a separator token surrounded by spaces.
    pub fn join(parts: &[TokenStream], separator: Token) -> TokenStream {
        let mut ts = TokenStream::new();
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                ts.space().push(separator.clone()).space();
            }
            ts.append(part);
        }
        ts
    }

    /// Join streams with `, `.
    pub fn comma_separated(parts: &[TokenStream]) -> TokenStream {
        let mut ts = TokenStream::new();
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                ts.comma().space();
            }
            ts.append(part);
        }
        ts
    }

    // Convenience methods for common tokens
    pub fn space(&mut self) -> &mut Self {
        self.push(Token::Space)
    }
    pub fn comma(&mut self) -> &mut Self {
        self.push(Token::Comma)
    }
    pub fn lparen(&mut self) -> &mut Self {
        self.push(Token::LParen)
    }
    pub fn rparen(&mut self) -> &mut Self {
        self.push(Token::RParen)
    }
    /// Push ` <keyword> ` with surrounding spaces.
    pub fn keyword(&mut self, token: Token) -> &mut Self {
        self.space().push(token).space()
    }
}
