//! Just enough SQL understanding to track which tables exist
//!
//! Recognises DROP TABLE, CREATE TABLE, COPY and INSERT INTO, and for
//! inserts the tables read by top-level FROM / JOIN clauses. The grammar
//! lives in `sql.pest`.

use crate::error::EmulatorError;
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

/// A statement reduced to its effect on the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlCommand {
    DropTable { table: String, if_exists: bool },
    CreateTable { table: String, if_not_exists: bool },
    Copy { table: String, source: String },
    Insert { table: String, sources: Vec<String> },
}

impl SqlCommand {
    pub fn target(&self) -> &str {
        match self {
            SqlCommand::DropTable { table, .. }
            | SqlCommand::CreateTable { table, .. }
            | SqlCommand::Copy { table, .. }
            | SqlCommand::Insert { table, .. } => table,
        }
    }
}

/// Unqualified names resolve to this schema
const DEFAULT_SCHEMA: &str = "public";

#[derive(Parser)]
#[grammar = "sql.pest"]
struct WarehouseSqlParser;

/// Reduce a SQL statement to a [`SqlCommand`]
pub fn classify(sql: &str) -> Result<SqlCommand, EmulatorError> {
    let pairs = WarehouseSqlParser::parse(Rule::program, sql)
        .map_err(|e| EmulatorError::Syntax(e.to_string()))?;

    for pair in pairs {
        if pair.as_rule() != Rule::program {
            continue;
        }
        for inner_pair in pair.into_inner() {
            return match inner_pair.as_rule() {
                Rule::drop_table => parse_drop_table(inner_pair),
                Rule::create_table => parse_create_table(inner_pair),
                Rule::copy => parse_copy(inner_pair),
                Rule::insert => parse_insert(inner_pair),
                _ => continue,
            };
        }
    }

    Err(EmulatorError::Syntax(format!(
        "unsupported statement: {}",
        sql.trim()
    )))
}

fn parse_drop_table(pair: Pair<Rule>) -> Result<SqlCommand, EmulatorError> {
    let mut table = None;
    let mut if_exists = false;

    for inner_pair in pair.into_inner() {
        match inner_pair.as_rule() {
            Rule::if_exists => if_exists = true,
            Rule::table_name => table = Some(parse_table_name(inner_pair)),
            _ => {}
        }
    }

    Ok(SqlCommand::DropTable {
        table: table.ok_or_else(|| missing("table name in DROP TABLE"))?,
        if_exists,
    })
}

fn parse_create_table(pair: Pair<Rule>) -> Result<SqlCommand, EmulatorError> {
    let mut table = None;
    let mut if_not_exists = false;

    for inner_pair in pair.into_inner() {
        match inner_pair.as_rule() {
            Rule::if_not_exists => if_not_exists = true,
            Rule::table_name => table = Some(parse_table_name(inner_pair)),
            _ => {}
        }
    }

    Ok(SqlCommand::CreateTable {
        table: table.ok_or_else(|| missing("table name in CREATE TABLE"))?,
        if_not_exists,
    })
}

fn parse_copy(pair: Pair<Rule>) -> Result<SqlCommand, EmulatorError> {
    let mut table = None;
    let mut source = None;

    for inner_pair in pair.into_inner() {
        match inner_pair.as_rule() {
            Rule::table_name => table = Some(parse_table_name(inner_pair)),
            Rule::string => source = Some(parse_string(inner_pair)),
            _ => {}
        }
    }

    Ok(SqlCommand::Copy {
        table: table.ok_or_else(|| missing("table name in COPY"))?,
        source: source.ok_or_else(|| missing("source in COPY"))?,
    })
}

fn parse_insert(pair: Pair<Rule>) -> Result<SqlCommand, EmulatorError> {
    let mut table = None;
    let mut sources = Vec::new();

    for inner_pair in pair.into_inner() {
        match inner_pair.as_rule() {
            Rule::table_name => table = Some(parse_table_name(inner_pair)),
            Rule::tail => {
                for source in inner_pair
                    .into_inner()
                    .filter(|p| p.as_rule() == Rule::source)
                    .flat_map(|p| p.into_inner())
                    .filter(|p| p.as_rule() == Rule::table_name)
                    .map(parse_table_name)
                {
                    if !sources.contains(&source) {
                        sources.push(source);
                    }
                }
            }
            _ => {}
        }
    }

    Ok(SqlCommand::Insert {
        table: table.ok_or_else(|| missing("table name in INSERT"))?,
        sources,
    })
}

/// Catalog key of a possibly schema-qualified name
fn parse_table_name(pair: Pair<Rule>) -> String {
    let parts: Vec<String> = pair.into_inner().map(parse_identifier).collect();
    match parts.as_slice() {
        [schema, table] if schema == DEFAULT_SCHEMA => table.clone(),
        [schema, table] => format!("{}.{}", schema, table),
        _ => parts.concat(),
    }
}

/// Unquoted names fold to lower case; quoted names keep their case
fn parse_identifier(pair: Pair<Rule>) -> String {
    match pair.as_rule() {
        Rule::quoted_name => pair
            .into_inner()
            .map(|p| p.as_str().replace("\"\"", "\""))
            .collect(),
        _ => pair.as_str().to_ascii_lowercase(),
    }
}

fn parse_string(pair: Pair<Rule>) -> String {
    pair.into_inner()
        .map(|p| p.as_str().replace("''", "'"))
        .collect()
}

fn missing(what: &str) -> EmulatorError {
    EmulatorError::Syntax(format!("missing {}", what))
}
