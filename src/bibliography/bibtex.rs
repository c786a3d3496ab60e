//! BibTeX grammar.
//!
//! Records are `@type{key, name = value, ...}` (parentheses work as outer
//! delimiters too). Values are brace groups, quoted strings, numbers, or bare
//! `@string` abbreviations, optionally concatenated with `#`. Text between
//! records is ignored, as BibTeX itself does.

use std::collections::HashMap;
use std::path::Path;

use itertools::Itertools;
use nom::{
    bytes::complete::{take_while, take_while1},
    character::complete::{char, multispace0, one_of},
    error::{Error as NomError, ErrorKind},
    IResult,
};
use ropey::Rope;
use tower_lsp::lsp_types::Position;

use super::{select_fields, strip_braces, BibEntry};
use crate::error::{CiterError, Result};

/// A field value as written: one part, or several joined by `#`.
#[derive(Debug, PartialEq)]
enum FieldValue {
    Single(String),
    Concat(Vec<String>),
}

impl FieldValue {
    fn render(&self) -> String {
        let raw = match self {
            FieldValue::Single(value) => strip_braces(value),
            FieldValue::Concat(parts) => parts.iter().map(|part| strip_braces(part)).join(" "),
        };
        raw.split_whitespace().join(" ")
    }
}

#[derive(Debug)]
struct Record<'a> {
    key: Option<&'a str>,
    /// Byte offset of the `@`.
    offset: usize,
    /// Lower-cased names, in source order, duplicates kept.
    fields: Vec<(String, FieldValue)>,
}

enum Block<'a> {
    Entry {
        key: Option<&'a str>,
        fields: Vec<(String, FieldValue)>,
    },
    Abbreviation(String, String),
    Ignored,
}

pub(super) fn parse(path: &Path, content: &str, allow_list: &[String]) -> Result<Vec<BibEntry>> {
    let rope = Rope::from_str(content);

    let records = parse_records(content).map_err(|offset| CiterError::ParseMalformed {
        path: path.to_path_buf(),
        message: format!(
            "invalid record at line {}",
            position_at(&rope, offset).line + 1
        ),
    })?;

    let entries = records
        .into_iter()
        .filter_map(|record| {
            let key = record.key?;
            let fields = select_fields(allow_list, |name| {
                record
                    .fields
                    .iter()
                    .find(|(field, _)| field == name)
                    .map(|(_, value)| value.render())
            });

            Some(BibEntry::new(
                key.to_string(),
                path.to_path_buf(),
                position_at(&rope, record.offset),
                fields,
            ))
        })
        .collect();

    Ok(entries)
}

fn position_at(rope: &Rope, offset: usize) -> Position {
    let char_idx = rope.byte_to_char(offset);
    let line = rope.char_to_line(char_idx);
    Position {
        line: line as u32,
        character: (char_idx - rope.line_to_char(line)) as u32,
    }
}

/// Returns the byte offset of the first record that fails to parse.
fn parse_records(input: &str) -> std::result::Result<Vec<Record<'_>>, usize> {
    let mut records = vec![];
    let mut strings: HashMap<String, String> = HashMap::new();
    let mut remaining = input;

    while !remaining.is_empty() {
        remaining = skip_whitespace_and_comments(remaining);

        if !remaining.starts_with('@') {
            // Free text between records; resume at the next line or `@`.
            remaining = match remaining.find(['@', '\n']) {
                Some(pos) if remaining[pos..].starts_with('\n') => &remaining[pos + 1..],
                Some(pos) => &remaining[pos..],
                None => "",
            };
            continue;
        }

        let offset = input.len() - remaining.len();

        if !starts_record(remaining) {
            remaining = &remaining[1..];
            continue;
        }

        let (rest, block) = at_block(remaining, &strings).map_err(|_| offset)?;
        match block {
            Block::Entry { key, fields } => records.push(Record {
                key,
                offset,
                fields,
            }),
            Block::Abbreviation(name, value) => {
                strings.insert(name.to_lowercase(), value);
            }
            Block::Ignored => {}
        }
        remaining = rest;
    }

    Ok(records)
}

fn skip_whitespace_and_comments(mut input: &str) -> &str {
    loop {
        input = input.trim_start();
        match input.strip_prefix('%') {
            Some(comment) => {
                input = comment.find('\n').map(|pos| &comment[pos..]).unwrap_or("");
            }
            None => return input,
        }
    }
}

/// An `@`, an identifier, then an opening delimiter; a stray `@` in free text is not a record.
fn starts_record(input: &str) -> bool {
    let rest = input[1..].trim_start();
    let ident_len = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
        .unwrap_or(rest.len());

    rest.starts_with(|c: char| c.is_ascii_alphabetic())
        && rest[ident_len..].trim_start().starts_with(['{', '('])
}

fn at_block<'a>(input: &'a str, strings: &HashMap<String, String>) -> IResult<&'a str, Block<'a>> {
    let (rest, _) = char('@')(input)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, kind) = take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-')(rest)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, open) = one_of("{(")(rest)?;
    let close = if open == '{' { '}' } else { ')' };

    match kind.to_lowercase().as_str() {
        "comment" => {
            let (rest, _) = balanced(rest, open, close)?;
            Ok((rest, Block::Ignored))
        }
        "preamble" => {
            let (rest, _) = field_value(rest, strings)?;
            let (rest, _) = multispace0(rest)?;
            let (rest, _) = char(close)(rest)?;
            Ok((rest, Block::Ignored))
        }
        "string" => {
            let (rest, _) = multispace0(rest)?;
            let (rest, (name, value)) = field(rest, strings)?;
            let (rest, _) = multispace0(rest)?;
            let (rest, _) = char(close)(rest)?;
            Ok((rest, Block::Abbreviation(name, value.render())))
        }
        _ => entry_body(rest, close, strings),
    }
}

fn entry_body<'a>(
    input: &'a str,
    close: char,
    strings: &HashMap<String, String>,
) -> IResult<&'a str, Block<'a>> {
    let (rest, _) = multispace0(input)?;
    let (rest, key) = take_while(|c: char| !c.is_whitespace() && c != ',' && c != close)(rest)?;
    let key = Some(key).filter(|key| !key.is_empty());
    let (mut rest, _) = multispace0(rest)?;

    let mut fields = vec![];
    if let Some(after_comma) = rest.strip_prefix(',') {
        rest = after_comma;
        loop {
            let (after_ws, _) = multispace0(rest)?;
            if after_ws.starts_with(close) {
                rest = after_ws;
                break;
            }

            let (after_field, (name, value)) = field(after_ws, strings)?;
            fields.push((name, value));

            let (after_ws, _) = multispace0(after_field)?;
            rest = after_ws.strip_prefix(',').unwrap_or(after_ws);
        }
    }

    let (rest, _) = char(close)(rest)?;
    Ok((rest, Block::Entry { key, fields }))
}

fn field<'a>(
    input: &'a str,
    strings: &HashMap<String, String>,
) -> IResult<&'a str, (String, FieldValue)> {
    let (rest, name) =
        take_while1(|c: char| c.is_ascii_alphanumeric() || "_-:.+".contains(c))(input)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, _) = char('=')(rest)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, value) = field_value(rest, strings)?;

    Ok((rest, (name.to_lowercase(), value)))
}

fn field_value<'a>(
    input: &'a str,
    strings: &HashMap<String, String>,
) -> IResult<&'a str, FieldValue> {
    let mut parts = vec![];
    let mut remaining = input;

    loop {
        let (rest, _) = multispace0(remaining)?;
        let (rest, part) = value_part(rest, strings)?;
        parts.push(part);

        let (rest, _) = multispace0(rest)?;
        match rest.strip_prefix('#') {
            Some(next) => remaining = next,
            None => {
                remaining = rest;
                break;
            }
        }
    }

    let value = if parts.len() == 1 {
        FieldValue::Single(parts.remove(0))
    } else {
        FieldValue::Concat(parts)
    };
    Ok((remaining, value))
}

fn value_part<'a>(input: &'a str, strings: &HashMap<String, String>) -> IResult<&'a str, String> {
    if let Some(rest) = input.strip_prefix('{') {
        let (rest, inner) = balanced(rest, '{', '}')?;
        return Ok((rest, inner.to_string()));
    }
    if input.starts_with('"') {
        return quoted(input);
    }

    let (rest, word) =
        take_while1(|c: char| c.is_ascii_alphanumeric() || "_-:.+".contains(c))(input)?;
    let value = strings
        .get(&word.to_lowercase())
        .cloned()
        .unwrap_or_else(|| word.to_string());
    Ok((rest, value))
}

/// Consume up to the `close` matching an already consumed `open`; returns the inner text.
fn balanced(input: &str, open: char, close: char) -> IResult<&str, &str> {
    let mut depth = 1usize;
    let mut chars = input.char_indices();

    while let Some((pos, c)) = chars.next() {
        if c == '\\' {
            chars.next();
        } else if c == open {
            depth += 1;
        } else if c == close {
            depth -= 1;
            if depth == 0 {
                return Ok((&input[pos + c.len_utf8()..], &input[..pos]));
            }
        }
    }

    Err(nom::Err::Error(NomError::new(input, ErrorKind::Char)))
}

fn quoted(input: &str) -> IResult<&str, String> {
    let mut depth = 0usize;
    let mut chars = input.char_indices().skip(1);

    while let Some((pos, c)) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            '"' if depth == 0 => return Ok((&input[pos + 1..], input[1..pos].to_string())),
            _ => {}
        }
    }

    Err(nom::Err::Error(NomError::new(input, ErrorKind::Char)))
}
