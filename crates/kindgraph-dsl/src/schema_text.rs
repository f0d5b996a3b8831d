//! Statement AST, line parser and formatter for `.kgs` schema text.
//!
//! Grammar (one statement per line; `#` starts a comment outside quotes):
//!
//! ```text
//! class <Kind>
//! inherits <Kind> <Parent>
//! property <Kind>.<name>: <Family> <backend-type>
//! relation <Kind>.<name>: <Family> -> <TargetKind>
//! label <Kind> "<text>"
//! label <Kind>.<slot> "<text>"
//! ```
//!
//! Formatting is canonical: `parse_statement(&statement.to_string())` yields
//! the same statement.

use crate::vocab::{PropertyType, TypeFamily};
use nom::{
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char as pchar, multispace0, multispace1},
    combinator::{all_consuming, recognize},
    error::{Error as NomError, ErrorKind},
    sequence::{preceded, tuple},
    IResult,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub type Name = String;

// ============================================================================
// AST
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "tag", rename_all = "snake_case")]
pub enum Statement {
    Class {
        kind: Name,
    },
    Inherits {
        kind: Name,
        parent: Name,
    },
    Property {
        kind: Name,
        name: Name,
        family: TypeFamily,
        ty: PropertyType,
    },
    Relation {
        kind: Name,
        name: Name,
        family: TypeFamily,
        target: Name,
    },
    /// Documentation for a kind (`slot: None`) or one of its slots.
    Label {
        kind: Name,
        slot: Option<Name>,
        text: String,
    },
}

/// Identity of a statement for merge purposes.
///
/// Two statements with the same key describe the same thing. On merge a
/// property or label with an existing key replaces the old one; for the other
/// statements a differing duplicate is a conflicting definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StatementKey {
    Class(Name),
    Inherits(Name),
    Property(Name, Name),
    Relation(Name, Name, Name),
    Label(Name, Option<Name>),
}

impl Statement {
    /// The kind this statement is scoped to.
    pub fn owner(&self) -> &str {
        match self {
            Statement::Class { kind }
            | Statement::Inherits { kind, .. }
            | Statement::Property { kind, .. }
            | Statement::Relation { kind, .. }
            | Statement::Label { kind, .. } => kind,
        }
    }

    /// Property or relationship slot name, if the statement addresses one.
    pub fn slot(&self) -> Option<&str> {
        match self {
            Statement::Property { name, .. } | Statement::Relation { name, .. } => Some(name),
            Statement::Label { slot, .. } => slot.as_deref(),
            Statement::Class { .. } | Statement::Inherits { .. } => None,
        }
    }

    /// Target kind of a relationship slot.
    pub fn target(&self) -> Option<&str> {
        match self {
            Statement::Relation { target, .. } => Some(target),
            _ => None,
        }
    }

    pub fn key(&self) -> StatementKey {
        match self {
            Statement::Class { kind } => StatementKey::Class(kind.clone()),
            Statement::Inherits { kind, .. } => StatementKey::Inherits(kind.clone()),
            Statement::Property { kind, name, .. } => {
                StatementKey::Property(kind.clone(), name.clone())
            }
            Statement::Relation {
                kind, name, target, ..
            } => StatementKey::Relation(kind.clone(), name.clone(), target.clone()),
            Statement::Label { kind, slot, .. } => StatementKey::Label(kind.clone(), slot.clone()),
        }
    }

    /// Every kind name this statement refers to, owner first.
    pub fn referenced_kinds(&self) -> Vec<&str> {
        match self {
            Statement::Inherits { kind, parent } => vec![kind, parent],
            Statement::Relation { kind, target, .. } => vec![kind, target],
            other => vec![other.owner()],
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Class { kind } => write!(f, "class {kind}"),
            Statement::Inherits { kind, parent } => write!(f, "inherits {kind} {parent}"),
            Statement::Property {
                kind,
                name,
                family,
                ty,
            } => write!(f, "property {kind}.{name}: {family} {}", ty.backend_tag()),
            Statement::Relation {
                kind,
                name,
                family,
                target,
            } => write!(f, "relation {kind}.{name}: {family} -> {target}"),
            Statement::Label { kind, slot, text } => {
                match slot {
                    Some(slot) => write!(f, "label {kind}.{slot} ")?,
                    None => write!(f, "label {kind} ")?,
                }
                write_quoted(f, text)
            }
        }
    }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, text: &str) -> fmt::Result {
    f.write_str("\"")?;
    for c in text.chars() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            c => write!(f, "{c}")?,
        }
    }
    f.write_str("\"")
}

// ============================================================================
// Parser
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaParseError {
    #[error("parse error on line {line}: {message}")]
    Line { line: usize, message: String },
}

/// Parse a whole schema text into its statements, in document order.
pub fn parse_schema_text(text: &str) -> Result<Vec<Statement>, SchemaParseError> {
    let mut statements = Vec::new();
    for (i, raw) in text.lines().enumerate() {
        let line = strip_comment(raw).trim();
        if line.is_empty() {
            continue;
        }
        let statement =
            parse_statement(line).map_err(|message| SchemaParseError::Line {
                line: i + 1,
                message,
            })?;
        statements.push(statement);
    }
    Ok(statements)
}

/// Parse a single statement line (no comment, no surrounding whitespace needed).
pub fn parse_statement(line: &str) -> Result<Statement, String> {
    let line = line.trim();
    let keyword = line.split_whitespace().next().unwrap_or_default();
    let parsed = match keyword {
        "class" => all_consuming(class_stmt)(line),
        "inherits" => all_consuming(inherits_stmt)(line),
        "property" => all_consuming(property_stmt)(line),
        "relation" => all_consuming(relation_stmt)(line),
        "label" => all_consuming(label_stmt)(line),
        _ => return Err(format!("unrecognized statement: {line}")),
    };
    parsed.map(|(_, statement)| statement).map_err(|_| {
        match keyword {
            "class" => "class expects: `class <Kind>`",
            "inherits" => "inherits expects: `inherits <Kind> <Parent>`",
            "property" => "property expects: `property <Kind>.<name>: <Family> xsd:<type>`",
            "relation" => "relation expects: `relation <Kind>.<name>: <Family> -> <Target>`",
            _ => "label expects: `label <Kind>[.<slot>] \"<text>\"`",
        }
        .to_string()
    })
}

/// Whether `name` can appear as a kind or slot name in schema text.
pub fn is_identifier(name: &str) -> bool {
    all_consuming(parse_ident)(name).is_ok()
}

fn strip_comment(line: &str) -> &str {
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            '#' if !in_quotes => return &line[..i],
            _ => {}
        }
    }
    line
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn parse_ident(input: &str) -> IResult<&str, &str> {
    recognize(tuple((
        take_while1(is_ident_start),
        take_while(is_ident_continue),
    )))(input)
}

fn slot_ref(input: &str) -> IResult<&str, (&str, &str)> {
    let (input, kind) = parse_ident(input)?;
    let (input, _) = pchar('.')(input)?;
    let (input, slot) = parse_ident(input)?;
    Ok((input, (kind, slot)))
}

fn family(input: &str) -> IResult<&str, TypeFamily> {
    let (rest, word) = parse_ident(input)?;
    word.parse::<TypeFamily>()
        .map(|family| (rest, family))
        .map_err(|_| nom::Err::Error(NomError::new(input, ErrorKind::Tag)))
}

fn backend_type(input: &str) -> IResult<&str, PropertyType> {
    let (rest, word) = recognize(tuple((tag("xsd:"), parse_ident)))(input)?;
    PropertyType::from_backend_tag(word)
        .map(|ty| (rest, ty))
        .ok_or(nom::Err::Error(NomError::new(input, ErrorKind::Tag)))
}

fn quoted(input: &str) -> IResult<&str, String> {
    let (rest, _) = pchar('"')(input)?;
    let fail = || nom::Err::Error(NomError::new(input, ErrorKind::Char));
    let mut out = String::new();
    let mut chars = rest.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Ok((&rest[i + 1..], out)),
            '\\' => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, c @ ('"' | '\\'))) => out.push(c),
                _ => return Err(fail()),
            },
            c => out.push(c),
        }
    }
    Err(fail())
}

fn class_stmt(input: &str) -> IResult<&str, Statement> {
    let (input, _) = tag("class")(input)?;
    let (input, kind) = preceded(multispace1, parse_ident)(input)?;
    Ok((
        input,
        Statement::Class {
            kind: kind.to_string(),
        },
    ))
}

fn inherits_stmt(input: &str) -> IResult<&str, Statement> {
    let (input, _) = tag("inherits")(input)?;
    let (input, kind) = preceded(multispace1, parse_ident)(input)?;
    let (input, parent) = preceded(multispace1, parse_ident)(input)?;
    Ok((
        input,
        Statement::Inherits {
            kind: kind.to_string(),
            parent: parent.to_string(),
        },
    ))
}

fn property_stmt(input: &str) -> IResult<&str, Statement> {
    let (input, _) = tag("property")(input)?;
    let (input, (kind, name)) = preceded(multispace1, slot_ref)(input)?;
    let (input, _) = preceded(multispace0, pchar(':'))(input)?;
    let (input, family) = preceded(multispace0, family)(input)?;
    let (input, ty) = preceded(multispace1, backend_type)(input)?;
    Ok((
        input,
        Statement::Property {
            kind: kind.to_string(),
            name: name.to_string(),
            family,
            ty,
        },
    ))
}

fn relation_stmt(input: &str) -> IResult<&str, Statement> {
    let (input, _) = tag("relation")(input)?;
    let (input, (kind, name)) = preceded(multispace1, slot_ref)(input)?;
    let (input, _) = preceded(multispace0, pchar(':'))(input)?;
    let (input, family) = preceded(multispace0, family)(input)?;
    let (input, _) = preceded(multispace0, tag("->"))(input)?;
    let (input, target) = preceded(multispace0, parse_ident)(input)?;
    Ok((
        input,
        Statement::Relation {
            kind: kind.to_string(),
            name: name.to_string(),
            family,
            target: target.to_string(),
        },
    ))
}

fn label_target(input: &str) -> IResult<&str, (&str, Option<&str>)> {
    if let Ok((rest, (kind, slot))) = slot_ref(input) {
        return Ok((rest, (kind, Some(slot))));
    }
    let (rest, kind) = parse_ident(input)?;
    Ok((rest, (kind, None)))
}

fn label_stmt(input: &str) -> IResult<&str, Statement> {
    let (input, _) = tag("label")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, (kind, slot)) = label_target(input)?;
    let (input, text) = preceded(multispace1, quoted)(input)?;
    let (input, _) = multispace0(input)?;
    Ok((
        input,
        Statement::Label {
            kind: kind.to_string(),
            slot: slot.map(str::to_string),
            text,
        },
    ))
}
