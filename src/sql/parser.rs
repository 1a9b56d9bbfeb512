//! SQL parser for keystone
//!
//! A hand-written recursive descent parser over the lexer's token stream.
//! Statements are separated by semicolons and parsed one at a time, because
//! INSERT binds its values to the target table's columns and SELECT
//! validates column references: both consult the catalog, which earlier
//! statements in the same input may have changed.

use super::ast::*;
use super::lexer::Lexer;
use super::token::Token;
use crate::catalog::{Catalog, ColumnType, TableSchema};
use crate::error::{Error, Result};
use crate::storage::field::pad_char;
use crate::storage::value::{FieldValue, Record};

/// SQL parser
pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    /// Create a new parser from query text
    pub fn new(sql: &str) -> Result<Self> {
        let tokens = Lexer::new(sql).tokenize()?;
        Ok(Self {
            tokens,
            position: 0,
        })
    }

    /// Parse the next statement, or `None` when the input is exhausted.
    ///
    /// `catalog` is the live catalog of the current database; INSERT and
    /// SELECT resolve schemas against it.
    pub fn parse_statement(&mut self, catalog: &Catalog) -> Result<Option<Statement>> {
        while self.check(&Token::Semicolon) {
            self.advance();
        }
        if self.check(&Token::Eof) {
            return Ok(None);
        }

        let statement = match self.current() {
            Token::Create => self.parse_create(),
            Token::Drop => self.parse_drop(),
            Token::Use => self.parse_use(),
            Token::Show => self.parse_show(),
            Token::Insert => self.parse_insert(catalog),
            Token::Select => self.parse_select(catalog),
            Token::Update => self.parse_update(),
            Token::Delete => self.parse_delete(),
            other => Err(Error::UnexpectedToken {
                expected: "a statement keyword".to_string(),
                found: other.to_string(),
            }),
        }?;

        // a statement ends at a semicolon or the end of input
        if !self.check(&Token::Semicolon) && !self.check(&Token::Eof) {
            return Err(Error::UnexpectedToken {
                expected: "';'".to_string(),
                found: self.current().to_string(),
            });
        }
        Ok(Some(statement))
    }

    // ========== DDL ==========

    fn parse_create(&mut self) -> Result<Statement> {
        self.expect(&Token::Create)?;
        match self.current() {
            Token::Database => {
                self.advance();
                let name = self.expect_identifier()?;
                Ok(Statement::CreateDatabase { name })
            }
            Token::Table => {
                self.advance();
                self.parse_create_table().map(Statement::CreateTable)
            }
            other => Err(Error::UnexpectedToken {
                expected: "DATABASE or TABLE".to_string(),
                found: other.to_string(),
            }),
        }
    }

    fn parse_drop(&mut self) -> Result<Statement> {
        self.expect(&Token::Drop)?;
        match self.current() {
            Token::Database => {
                self.advance();
                let name = self.expect_identifier()?;
                Ok(Statement::DropDatabase { name })
            }
            Token::Table => {
                self.advance();
                let name = self.expect_identifier()?;
                Ok(Statement::DropTable { name })
            }
            other => Err(Error::UnexpectedToken {
                expected: "DATABASE or TABLE".to_string(),
                found: other.to_string(),
            }),
        }
    }

    fn parse_use(&mut self) -> Result<Statement> {
        self.expect(&Token::Use)?;
        let name = self.expect_identifier()?;
        Ok(Statement::UseDatabase { name })
    }

    fn parse_show(&mut self) -> Result<Statement> {
        self.expect(&Token::Show)?;
        match self.current() {
            Token::Databases => {
                self.advance();
                Ok(Statement::ShowDatabases)
            }
            Token::Tables => {
                self.advance();
                Ok(Statement::ShowTables)
            }
            other => Err(Error::UnexpectedToken {
                expected: "DATABASES or TABLES".to_string(),
                found: other.to_string(),
            }),
        }
    }

    fn parse_create_table(&mut self) -> Result<CreateTableStatement> {
        let table_name = self.expect_identifier()?;
        self.expect(&Token::LParen)?;

        let mut columns = Vec::new();
        let mut primary_key = None;
        let mut foreign_keys = Vec::new();

        loop {
            match self.current() {
                // trailing PRIMARY KEY (col)
                Token::Primary => {
                    self.advance();
                    self.expect(&Token::Key)?;
                    self.expect(&Token::LParen)?;
                    primary_key = Some(self.expect_identifier()?);
                    self.expect(&Token::RParen)?;
                }
                // FOREIGN KEY (col) REFERENCES table [(col)]
                Token::Foreign => {
                    self.advance();
                    self.expect(&Token::Key)?;
                    self.expect(&Token::LParen)?;
                    let column = self.expect_identifier()?;
                    self.expect(&Token::RParen)?;
                    self.expect(&Token::References)?;
                    let references_table = self.expect_identifier()?;
                    let references_column = if self.check(&Token::LParen) {
                        self.advance();
                        let name = self.expect_identifier()?;
                        self.expect(&Token::RParen)?;
                        name
                    } else {
                        column.clone()
                    };
                    foreign_keys.push(ForeignKeyDef {
                        column,
                        references_table,
                        references_column,
                    });
                }
                // plain column definition
                _ => {
                    let name = self.expect_identifier()?;
                    let (column_type, length) = self.parse_type_spec()?;
                    // inline PRIMARY KEY
                    if self.check(&Token::Primary) {
                        self.advance();
                        self.expect(&Token::Key)?;
                        primary_key = Some(name.clone());
                    }
                    columns.push(ColumnDef {
                        name,
                        column_type,
                        length,
                    });
                }
            }

            if self.check(&Token::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(&Token::RParen)?;

        if columns.is_empty() {
            return Err(Error::Syntax(format!(
                "no columns defined for table '{}'",
                table_name
            )));
        }

        Ok(CreateTableStatement {
            table_name,
            columns,
            primary_key,
            foreign_keys,
        })
    }

    fn parse_type_spec(&mut self) -> Result<(ColumnType, usize)> {
        let column_type = match self.current() {
            Token::Int => ColumnType::Int,
            Token::Float => ColumnType::Float,
            Token::Bool => ColumnType::Bool,
            Token::StringType => ColumnType::Str,
            Token::CharType => ColumnType::Char,
            other => {
                return Err(Error::UnexpectedToken {
                    expected: "a column type".to_string(),
                    found: other.to_string(),
                })
            }
        };
        self.advance();

        // STRING and CHAR carry a mandatory length
        let length = match column_type {
            ColumnType::Str | ColumnType::Char => {
                self.expect(&Token::LParen)?;
                let n = match self.current() {
                    Token::IntegerLiteral(n) if *n > 0 => *n as usize,
                    other => {
                        return Err(Error::UnexpectedToken {
                            expected: format!("a positive length for {}", column_type),
                            found: other.to_string(),
                        })
                    }
                };
                self.advance();
                self.expect(&Token::RParen)?;
                n
            }
            _ => 0,
        };
        Ok((column_type, length))
    }

    // ========== DML ==========

    fn parse_insert(&mut self, catalog: &Catalog) -> Result<Statement> {
        self.expect(&Token::Insert)?;
        self.expect(&Token::Into)?;
        let table_name = self.expect_identifier()?;
        let schema = catalog.get_table_schema(&table_name)?;
        self.expect(&Token::Values)?;
        self.expect(&Token::LParen)?;

        let mut record = Record::new();
        let mut index = 0usize;
        loop {
            if index >= schema.columns.len() {
                return Err(Error::Syntax(format!(
                    "too many values for table '{}'",
                    table_name
                )));
            }
            let column = &schema.columns[index];
            let value = self.parse_coerced_value(column.column_type, column.length, &column.name)?;
            record.insert(column.name.clone(), value);
            index += 1;

            if self.check(&Token::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(&Token::RParen)?;

        if index != schema.columns.len() {
            return Err(Error::Syntax(format!(
                "incorrect number of values for table '{}': expected {}, got {}",
                table_name,
                schema.columns.len(),
                index
            )));
        }

        Ok(Statement::Insert(InsertStatement { table_name, record }))
    }

    /// Parse one INSERT literal and coerce it to the target column type
    fn parse_coerced_value(
        &mut self,
        column_type: ColumnType,
        length: usize,
        column_name: &str,
    ) -> Result<FieldValue> {
        let token = self.current().clone();
        let mismatch = |token: &Token| Error::TypeMismatch {
            value: token.to_string(),
            column: column_name.to_string(),
        };

        let value = match column_type {
            ColumnType::Int => match &token {
                Token::IntegerLiteral(n) => FieldValue::Int(*n),
                other => return Err(mismatch(other)),
            },
            ColumnType::Float => match &token {
                Token::FloatLiteral(f) => FieldValue::Float(*f),
                Token::IntegerLiteral(n) => FieldValue::Float(*n as f32),
                other => return Err(mismatch(other)),
            },
            ColumnType::Str => FieldValue::Str(Self::literal_text(&token).ok_or_else(|| mismatch(&token))?),
            ColumnType::Char => {
                let text = Self::literal_text(&token).ok_or_else(|| mismatch(&token))?;
                FieldValue::Char(pad_char(&text, length))
            }
            ColumnType::Bool => match &token {
                Token::True => FieldValue::Bool(true),
                Token::False => FieldValue::Bool(false),
                Token::IntegerLiteral(n) => FieldValue::Bool(*n == 1),
                Token::StringLiteral(s) | Token::Identifier(s) => {
                    FieldValue::Bool(s.eq_ignore_ascii_case("true") || s == "1")
                }
                other => return Err(mismatch(other)),
            },
        };
        self.advance();
        Ok(value)
    }

    /// The textual form of a literal token, for string-typed columns
    fn literal_text(token: &Token) -> Option<String> {
        match token {
            Token::StringLiteral(s) | Token::Identifier(s) => Some(s.clone()),
            Token::IntegerLiteral(n) => Some(n.to_string()),
            Token::FloatLiteral(f) => Some(f.to_string()),
            Token::True => Some("true".to_string()),
            Token::False => Some("false".to_string()),
            _ => None,
        }
    }

    fn parse_select(&mut self, catalog: &Catalog) -> Result<Statement> {
        self.expect(&Token::Select)?;

        let projection = if self.check(&Token::Asterisk) {
            self.advance();
            Projection::All
        } else {
            let mut columns = Vec::new();
            loop {
                columns.push(self.parse_column_ref().map_err(|_| {
                    Error::UnexpectedToken {
                        expected: "a projection list or '*'".to_string(),
                        found: self.current().to_string(),
                    }
                })?);
                if self.check(&Token::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
            Projection::Columns(columns)
        };

        self.expect(&Token::From)?;
        let table_name = self.expect_identifier()?;

        let join = if self.check(&Token::Join) {
            self.advance();
            let join_table = self.expect_identifier()?;
            self.expect(&Token::On)?;
            let left_column = self.parse_column_ref()?;
            self.expect(&Token::Eq)?;
            let right_column = self.parse_column_ref()?;
            if !left_column.contains('.') || !right_column.contains('.') {
                return Err(Error::Syntax(
                    "ON condition must specify table.column".to_string(),
                ));
            }
            Some(JoinClause {
                table_name: join_table,
                left_column,
                right_column,
            })
        } else {
            None
        };

        let (conditions, connectives) = self.parse_where_clause()?;

        // validate the tables and the projected columns up front
        let schema = catalog.get_table_schema(&table_name)?;
        let join_schema = match &join {
            Some(join) => Some(catalog.get_table_schema(&join.table_name)?),
            None => None,
        };
        if let Projection::Columns(columns) = &projection {
            for column in columns {
                let in_from = column_in_table(column, schema);
                let in_join = join_schema
                    .map(|schema| column_in_table(column, schema))
                    .unwrap_or(false);
                if !in_from && !in_join {
                    return Err(Error::ColumnNotFound(
                        column.clone(),
                        table_name.clone(),
                    ));
                }
            }
        }

        Ok(Statement::Select(SelectStatement {
            table_name,
            projection,
            join,
            conditions,
            connectives,
        }))
    }

    fn parse_update(&mut self) -> Result<Statement> {
        self.expect(&Token::Update)?;
        let table_name = self.expect_identifier()?;
        self.expect(&Token::Set)?;

        let mut assignments = Vec::new();
        loop {
            let column = self.expect_identifier()?;
            self.expect(&Token::Eq)?;
            let value = self.parse_literal_value()?;
            assignments.push((column, value));

            if self.check(&Token::Comma) {
                self.advance();
            } else {
                break;
            }
        }

        let (conditions, connectives) = self.parse_where_clause()?;
        Ok(Statement::Update(UpdateStatement {
            table_name,
            assignments,
            conditions,
            connectives,
        }))
    }

    fn parse_delete(&mut self) -> Result<Statement> {
        self.expect(&Token::Delete)?;
        self.expect(&Token::From)?;
        let table_name = self.expect_identifier()?;
        let (conditions, connectives) = self.parse_where_clause()?;
        Ok(Statement::Delete(DeleteStatement {
            table_name,
            conditions,
            connectives,
        }))
    }

    // ========== WHERE ==========

    /// Parse an optional WHERE clause into its comparison and connective
    /// lists.
    ///
    /// Connectives join comparisons left-to-right with no precedence, so the
    /// clause is collected as two flat lists. The streams must satisfy
    /// `conds - 1 <= connectives <= conds - 1 + count(NOT)`.
    fn parse_where_clause(&mut self) -> Result<(Vec<Condition>, Vec<Connective>)> {
        let mut conditions = Vec::new();
        let mut connectives = Vec::new();
        if !self.check(&Token::Where) {
            return Ok((conditions, connectives));
        }
        self.advance();

        loop {
            match self.current() {
                Token::And => {
                    connectives.push(Connective::And);
                    self.advance();
                }
                Token::Or => {
                    connectives.push(Connective::Or);
                    self.advance();
                }
                Token::Not => {
                    connectives.push(Connective::Not);
                    self.advance();
                }
                Token::Semicolon | Token::Eof => break,
                _ => {
                    let column = self.parse_column_ref()?;
                    let op = self.parse_compare_op()?;
                    let value = self.parse_literal_value()?;
                    conditions.push(Condition { column, op, value });
                }
            }
        }

        if conditions.is_empty() {
            return Err(Error::Syntax("empty WHERE clause".to_string()));
        }
        let expected = conditions.len() - 1;
        let nots = connectives
            .iter()
            .filter(|c| **c == Connective::Not)
            .count();
        if connectives.len() < expected || connectives.len() > expected + nots {
            return Err(Error::MismatchedOperators {
                operators: connectives.len(),
                conditions: conditions.len(),
            });
        }

        Ok((conditions, connectives))
    }

    fn parse_compare_op(&mut self) -> Result<CompareOp> {
        let op = match self.current() {
            Token::Eq => CompareOp::Eq,
            Token::Neq => CompareOp::NotEq,
            Token::Gt => CompareOp::Gt,
            Token::Lt => CompareOp::Lt,
            Token::Gte => CompareOp::GtEq,
            Token::Lte => CompareOp::LtEq,
            Token::Like => CompareOp::Like,
            other => {
                return Err(Error::UnexpectedToken {
                    expected: "a comparison operator".to_string(),
                    found: other.to_string(),
                })
            }
        };
        self.advance();
        Ok(op)
    }

    /// Parse a literal, greedily: int, then float, then bool, then string.
    /// A bare word is taken as a string, so `WHERE name = Ann` behaves like
    /// `WHERE name = 'Ann'`.
    fn parse_literal_value(&mut self) -> Result<FieldValue> {
        let value = match self.current().clone() {
            Token::IntegerLiteral(n) => FieldValue::Int(n),
            Token::FloatLiteral(f) => FieldValue::Float(f),
            Token::True => FieldValue::Bool(true),
            Token::False => FieldValue::Bool(false),
            Token::StringLiteral(s) => FieldValue::Str(s),
            Token::Identifier(word) => {
                // a qualified name used as a value stays one string
                if self.peek() == Some(&Token::Dot) {
                    self.advance(); // identifier
                    self.advance(); // dot
                    let rest = self.expect_identifier()?;
                    return Ok(FieldValue::Str(format!("{}.{}", word, rest)));
                }
                FieldValue::Str(word)
            }
            other => {
                return Err(Error::UnexpectedToken {
                    expected: "a literal value".to_string(),
                    found: other.to_string(),
                })
            }
        };
        self.advance();
        Ok(value)
    }

    /// Parse `ident` or `ident.ident`
    fn parse_column_ref(&mut self) -> Result<String> {
        let first = self.expect_identifier()?;
        if self.check(&Token::Dot) {
            self.advance();
            let second = self.expect_identifier()?;
            Ok(format!("{}.{}", first, second))
        } else {
            Ok(first)
        }
    }

    // ========== Helpers ==========

    fn current(&self) -> &Token {
        self.tokens.get(self.position).unwrap_or(&Token::Eof)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position + 1)
    }

    fn check(&self, token: &Token) -> bool {
        self.current() == token
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() {
            self.position += 1;
        }
    }

    fn expect(&mut self, token: &Token) -> Result<()> {
        if self.check(token) {
            self.advance();
            Ok(())
        } else if self.check(&Token::Eof) {
            Err(Error::UnexpectedEof(format!("'{}'", token)))
        } else {
            Err(Error::UnexpectedToken {
                expected: format!("'{}'", token),
                found: self.current().to_string(),
            })
        }
    }

    fn expect_identifier(&mut self) -> Result<String> {
        match self.current().clone() {
            Token::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            Token::Eof => Err(Error::UnexpectedEof("an identifier".to_string())),
            other => Err(Error::UnexpectedToken {
                expected: "an identifier".to_string(),
                found: other.to_string(),
            }),
        }
    }
}

/// Does `column` (qualified or not) name a column of `schema`?
fn column_in_table(column: &str, schema: &TableSchema) -> bool {
    if schema.has_column(column) {
        return true;
    }
    match column.split_once('.') {
        Some((table, base)) => table == schema.name && schema.has_column(base),
        None => false,
    }
}
