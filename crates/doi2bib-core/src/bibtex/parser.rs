//! BibTeX parser built on nom.
//!
//! Handles regular entries with `{...}` or `(...)` bodies, `@string` macro
//! definitions (expanded in later field values), `@preamble` and `@comment`
//! blocks, braced/quoted/bare values and `#` concatenation. A block that does
//! not parse becomes a [`FailedBlock`] and parsing resumes at the next `@`
//! that starts a line.

use std::collections::HashMap;
use std::path::Path;

use nom::branch::alt;
use nom::bytes::complete::take_while1;
use nom::character::complete::{char, multispace0, space0};
use nom::combinator::map;
use nom::error::{VerboseError, VerboseErrorKind, context};
use nom::sequence::{preceded, terminated};
use nom::{Err as NomErr, IResult};
use tracing::debug;

use crate::error::{CoreError, Result};
use crate::models::{Delimiter, Entry, FailedBlock, Field, Library, RawBlock};

type Res<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

/// `@string` macros defined so far, keyed by lowercased name.
type Macros = HashMap<String, String>;

/// Parse a BibTeX document. Never fails: malformed blocks end up in
/// `Library::failed_blocks` and parsing resumes at the next block.
pub fn parse_str(input: &str) -> Library {
    let mut library = Library::new();
    let mut macros = Macros::new();
    let mut pos = 0;

    while let Some(start) = find_block_start(input, pos) {
        match parse_block(&input[start..], &macros) {
            Ok((rest, block)) => {
                let end = input.len() - rest.len();
                let raw = &input[start..end];
                match block {
                    Block::Entry(entry) => {
                        let key = entry.key.clone();
                        if let Err(CoreError::DuplicateKey(_)) = library.add(entry) {
                            library.failed_blocks.push(FailedBlock {
                                key_hint: Some(key.clone()),
                                raw: raw.to_string(),
                                error: format!("duplicate citation key '{key}'"),
                            });
                        }
                    }
                    Block::Macro(name, value) => {
                        macros.insert(name.to_lowercase(), value);
                        library.blocks.push(RawBlock {
                            kind: "string".to_string(),
                            text: raw.to_string(),
                        });
                    }
                    Block::Raw(kind) => library.blocks.push(RawBlock {
                        kind,
                        text: raw.to_string(),
                    }),
                }
                pos = end;
            }
            Err(failure) => {
                let end = find_block_start(input, start + 1).unwrap_or(input.len());
                debug!(offset = start + failure.offset, error = %failure.message, "skipping malformed block");
                library.failed_blocks.push(FailedBlock {
                    key_hint: failure.key_hint,
                    raw: input[start..end].trim_end().to_string(),
                    error: failure.message,
                });
                pos = end;
            }
        }
    }

    library
}

pub fn parse_file(path: &Path) -> Result<Library> {
    let text = std::fs::read_to_string(path)?;
    Ok(parse_str(&text))
}

/// Parse a string that must hold exactly one entry (e.g. a doi.org response).
pub fn parse_single(input: &str) -> Result<Entry> {
    let library = parse_str(input);
    if let Some(failed) = library.failed_blocks.first() {
        return Err(CoreError::Syntax {
            offset: 0,
            message: failed.error.clone(),
        });
    }
    library
        .entries()
        .first()
        .cloned()
        .ok_or_else(|| CoreError::Syntax {
            offset: 0,
            message: "no entry found".to_string(),
        })
}

enum Block {
    Entry(Entry),
    Macro(String, String),
    Raw(String),
}

struct Failure {
    /// Byte offset into the block.
    offset: usize,
    key_hint: Option<String>,
    message: String,
}

impl Failure {
    fn from_nom(block: &str, key_hint: Option<&str>, err: NomErr<VerboseError<&str>>) -> Self {
        let (offset, message) = match err {
            NomErr::Error(e) | NomErr::Failure(e) => describe(block, &e),
            NomErr::Incomplete(_) => (block.len(), "unexpected end of input".to_string()),
        };
        Self {
            offset,
            key_hint: key_hint.map(str::to_string),
            message,
        }
    }
}

/// Innermost context wins; bare nom errors fall back to what was expected.
fn describe(block: &str, err: &VerboseError<&str>) -> (usize, String) {
    let offset = err
        .errors
        .first()
        .map(|(rest, _)| block.len().saturating_sub(rest.len()))
        .unwrap_or(0);
    let message = err
        .errors
        .iter()
        .find_map(|(_, kind)| match kind {
            VerboseErrorKind::Context(ctx) => Some(ctx.to_string()),
            _ => None,
        })
        .or_else(|| {
            err.errors.first().map(|(rest, kind)| match kind {
                VerboseErrorKind::Char(c) if rest.is_empty() => {
                    format!("expected '{c}', found end of input")
                }
                VerboseErrorKind::Char(c) => format!("expected '{c}'"),
                other => format!("{other:?}"),
            })
        })
        .unwrap_or_else(|| "malformed block".to_string());
    (offset, message)
}

fn failure<'a>(input: &'a str, message: &'static str) -> NomErr<VerboseError<&'a str>> {
    NomErr::Failure(VerboseError {
        errors: vec![(input, VerboseErrorKind::Context(message))],
    })
}

fn parse_block<'a>(
    block: &'a str,
    macros: &Macros,
) -> std::result::Result<(&'a str, Block), Failure> {
    let (rest, kind) = block_kind(block).map_err(|e| Failure::from_nom(block, None, e))?;
    let kind = kind.to_ascii_lowercase();

    let parsed = match kind.as_str() {
        "comment" => comment_body(rest).map(|(rest, ())| (rest, Block::Raw(kind))),
        "preamble" => context("malformed @preamble", preceded(multispace0, group))(rest)
            .map(|(rest, ())| (rest, Block::Raw(kind))),
        "string" => {
            macro_body(rest, macros).map(|(rest, (name, value))| (rest, Block::Macro(name, value)))
        }
        _ => {
            let (rest, (close, key)) =
                entry_head(rest).map_err(|e| Failure::from_nom(block, None, e))?;
            return entry_fields(rest, close, Entry::new(kind, key), macros)
                .map(|(rest, entry)| (rest, Block::Entry(entry)))
                .map_err(|e| Failure::from_nom(block, Some(key), e));
        }
    };
    parsed.map_err(|e| Failure::from_nom(block, None, e))
}

fn block_kind(i: &str) -> Res<'_, &str> {
    context(
        "missing or invalid entry type",
        preceded(
            terminated(char('@'), multispace0),
            take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_'),
        ),
    )(i)
}

/// Opening `{` or `(`, returned as the matching closing character.
fn open_delimiter(i: &str) -> Res<'_, char> {
    context(
        "expected '{' or '(' after entry type",
        preceded(
            multispace0,
            alt((map(char('{'), |_| '}'), map(char('('), |_| ')'))),
        ),
    )(i)
}

fn entry_head(i: &str) -> Res<'_, (char, &str)> {
    let (i, close) = open_delimiter(i)?;
    let (i, key) = context(
        "missing citation key",
        preceded(
            multispace0,
            take_while1(move |c: char| !c.is_whitespace() && c != ',' && c != close),
        ),
    )(i)?;
    Ok((i, (close, key)))
}

fn entry_fields<'a>(
    i: &'a str,
    close: char,
    mut entry: Entry,
    macros: &Macros,
) -> Res<'a, Entry> {
    let (mut i, _) = multispace0(i)?;
    if let Some(rest) = i.strip_prefix(close) {
        return Ok((rest, entry));
    }
    (i, _) = context("expected ',' after citation key", char(','))(i)?;

    loop {
        let (rest, _) = multispace0(i)?;
        if let Some(rest) = rest.strip_prefix(close) {
            return Ok((rest, entry));
        }
        if rest.is_empty() {
            return Err(failure(rest, "unexpected end of input inside entry"));
        }

        let (rest, field) = field(rest, close, macros)?;
        entry.fields.push(field);

        let (rest, _) = multispace0(rest)?;
        i = match rest.chars().next() {
            Some(',') => &rest[1..],
            Some(c) if c == close => rest,
            Some(_) => {
                return Err(failure(
                    rest,
                    "expected ',' or closing delimiter after field value",
                ));
            }
            None => return Err(failure(rest, "unexpected end of input inside entry")),
        };
    }
}

fn field<'a>(i: &'a str, close: char, macros: &Macros) -> Res<'a, Field> {
    let (i, name) = context(
        "missing field name",
        take_while1(|c: char| !c.is_whitespace() && !"=,{}()\"#".contains(c)),
    )(i)?;
    let (i, _) = context("expected '=' after field name", preceded(multispace0, char('=')))(i)?;
    let (i, _) = multispace0(i)?;
    let (i, (value, delimiter)) = field_value(i, close, macros)?;
    Ok((
        i,
        Field {
            name: name.to_string(),
            value,
            delimiter,
        },
    ))
}

/// One operand of a field value.
enum Part {
    Text(String, Delimiter),
    /// A bare name with no `@string` definition in scope.
    Unresolved(String),
}

fn field_value<'a>(i: &'a str, close: char, macros: &Macros) -> Res<'a, (String, Delimiter)> {
    let start = i;
    let (mut i, first) = value_part(i, close, macros)?;
    let mut parts = vec![first];

    while let Ok((rest, _)) = preceded(multispace0, char::<_, VerboseError<&str>>('#'))(i) {
        let (rest, part) = preceded(multispace0, |i| value_part(i, close, macros))(rest)?;
        parts.push(part);
        i = rest;
    }

    let verbatim = &start[..start.len() - i.len()];
    Ok((i, join_parts(parts, verbatim)))
}

fn value_part<'a>(i: &'a str, close: char, macros: &Macros) -> Res<'a, Part> {
    context(
        "missing field value",
        alt((
            map(braced, |text| Part::Text(text.to_string(), Delimiter::Braces)),
            map(quoted, |text| Part::Text(text.to_string(), Delimiter::Quotes)),
            map(
                take_while1(move |c: char| {
                    !c.is_whitespace() && c != close && !",#{}\"".contains(c)
                }),
                |word| expand(word, macros),
            ),
        )),
    )(i)
}

fn expand(word: &str, macros: &Macros) -> Part {
    if word.bytes().all(|b| b.is_ascii_digit()) {
        return Part::Text(word.to_string(), Delimiter::Bare);
    }
    match macros.get(&word.to_lowercase()) {
        Some(value) => Part::Text(value.clone(), Delimiter::Braces),
        None => Part::Unresolved(word.to_string()),
    }
}

/// A concatenation is flattened only when every operand is known; otherwise
/// it is kept verbatim so writing it back loses nothing.
fn join_parts(mut parts: Vec<Part>, verbatim: &str) -> (String, Delimiter) {
    if parts.len() == 1 {
        return match parts.remove(0) {
            Part::Text(text, delimiter) => (text, delimiter),
            Part::Unresolved(word) => (word, Delimiter::Bare),
        };
    }
    if parts.iter().any(|part| matches!(part, Part::Unresolved(_))) {
        return (verbatim.trim().to_string(), Delimiter::Bare);
    }
    let text = parts
        .into_iter()
        .map(|part| match part {
            Part::Text(text, _) | Part::Unresolved(text) => text,
        })
        .collect();
    (text, Delimiter::Braces)
}

/// `{...}` with nesting, returning the inner text. `\{` and `\}` do not count.
fn braced(input: &str) -> Res<'_, &str> {
    let (body, _) = char('{')(input)?;
    let mut depth = 1usize;
    let mut prev = '\0';
    for (idx, c) in body.char_indices() {
        match c {
            '{' if prev != '\\' => depth += 1,
            '}' if prev != '\\' => {
                depth -= 1;
                if depth == 0 {
                    return Ok((&body[idx + 1..], &body[..idx]));
                }
            }
            _ => {}
        }
        prev = c;
    }
    Err(failure(input, "unbalanced braces"))
}

/// `"..."`. Quotes inside nested braces do not terminate it.
fn quoted(input: &str) -> Res<'_, &str> {
    let (body, _) = char('"')(input)?;
    let mut depth = 0usize;
    for (idx, c) in body.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            '"' if depth == 0 => return Ok((&body[idx + 1..], &body[..idx])),
            _ => {}
        }
    }
    Err(failure(input, "unterminated quoted value"))
}

fn parenthesized(input: &str) -> Res<'_, ()> {
    let (body, _) = char('(')(input)?;
    let mut depth = 1usize;
    for (idx, c) in body.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Ok((&body[idx + 1..], ()));
                }
            }
            _ => {}
        }
    }
    Err(failure(input, "unbalanced parentheses"))
}

fn group(i: &str) -> Res<'_, ()> {
    alt((map(braced, |_| ()), parenthesized))(i)
}

/// `@comment{...}`, `@comment(...)` or `@comment` up to the end of the line.
fn comment_body(i: &str) -> Res<'_, ()> {
    let (i, _) = space0(i)?;
    if i.starts_with(['{', '(']) {
        return group(i);
    }
    let end = i.find('\n').unwrap_or(i.len());
    Ok((&i[end..], ()))
}

fn macro_body<'a>(i: &'a str, macros: &Macros) -> Res<'a, (String, String)> {
    let (i, close) = open_delimiter(i)?;
    let (i, name) = context(
        "missing @string name",
        preceded(
            multispace0,
            take_while1(|c: char| c.is_ascii_alphanumeric() || "_-:.".contains(c)),
        ),
    )(i)?;
    let (i, _) = context("expected '=' after @string name", preceded(multispace0, char('=')))(i)?;
    let (i, _) = multispace0(i)?;
    let (i, (value, _)) = field_value(i, close, macros)?;
    let (i, _) = context("unclosed @string", preceded(multispace0, char(close)))(i)?;
    Ok((i, (name.to_string(), value)))
}

/// Next `@` that is preceded only by whitespace on its line (or since `from`).
/// An `@` in the middle of free text is not a block start.
fn find_block_start(input: &str, from: usize) -> Option<usize> {
    let mut offset = from;
    for line in input[from..].split_inclusive('\n') {
        let trimmed = line.trim_start();
        if trimmed.starts_with('@') {
            return Some(offset + (line.len() - trimmed.len()));
        }
        offset += line.len();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
@string{nat = "Nature"}

@Article{smith20,
  Title = {Deep {RNA} folding},
  author = "Smith, J. and Doe, A.",
  journal = nat,
  volume = 12,
  pages = {100--110},
  doi = {10.1/x},
}

@article(jones19, title = {Other}, year = "2019")
"#;

    #[test]
    fn parses_entries_fields_and_delimiters() {
        let lib = parse_str(SAMPLE);
        assert!(lib.failed_blocks.is_empty());
        assert_eq!(lib.blocks.len(), 1);
        assert_eq!(lib.blocks[0].kind, "string");
        assert_eq!(lib.len(), 2);

        let smith = lib.get("smith20").unwrap();
        assert_eq!(smith.entry_type, "article");
        assert_eq!(smith.value("title"), Some("Deep {RNA} folding"));
        assert_eq!(smith.get("author").unwrap().delimiter, Delimiter::Quotes);
        assert_eq!(smith.get("volume").unwrap().delimiter, Delimiter::Bare);
        assert_eq!(smith.value("volume"), Some("12"));
        assert_eq!(smith.value("DOI"), Some("10.1/x"));

        let jones = lib.get("jones19").unwrap();
        assert_eq!(jones.value("year"), Some("2019"));
    }

    #[test]
    fn string_macros_are_expanded() {
        let lib = parse_str(SAMPLE);
        let journal = lib.get("smith20").unwrap().get("journal").unwrap();
        assert_eq!(journal.value, "Nature");
        assert_eq!(journal.delimiter, Delimiter::Braces);
    }

    #[test]
    fn macro_names_are_case_insensitive_and_may_nest() {
        let text = "@STRING(pr = {Phys. Rev.})\n@string{prb = PR # \" B\"}\n@article{k, journal = Prb}\n";
        let lib = parse_str(text);
        assert_eq!(lib.blocks.len(), 2);
        assert_eq!(lib.get("k").unwrap().value("journal"), Some("Phys. Rev. B"));
    }

    #[test]
    fn malformed_block_is_reported_and_parsing_resumes() {
        let text = "@article{broken, title = {never closed\n\n@article{ok, title = {Fine}}\n";
        let lib = parse_str(text);
        assert_eq!(lib.len(), 1);
        assert!(lib.contains("ok"));
        assert_eq!(lib.failed_blocks.len(), 1);
        assert_eq!(lib.failed_blocks[0].key_hint.as_deref(), Some("broken"));
        assert!(lib.failed_blocks[0].error.contains("unbalanced"));
    }

    #[test]
    fn missing_separator_names_the_problem() {
        let lib = parse_str("@article{k, title = {A} year = {2020}}\n");
        assert!(lib.is_empty());
        assert_eq!(lib.failed_blocks[0].key_hint.as_deref(), Some("k"));
        assert!(lib.failed_blocks[0].error.contains("after field value"));
    }

    #[test]
    fn duplicate_key_in_file_becomes_failed_block() {
        let text = "@article{a, title={One}}\n@article{a, title={Two}}\n";
        let lib = parse_str(text);
        assert_eq!(lib.len(), 1);
        assert_eq!(lib.get("a").unwrap().value("title"), Some("One"));
        assert_eq!(lib.failed_blocks.len(), 1);
    }

    #[test]
    fn keys_differing_only_in_case_collide() {
        let lib = parse_str("@article{Smith20, title={One}}\n@article{smith20, title={Two}}\n");
        assert_eq!(lib.len(), 1);
        assert_eq!(lib.failed_blocks.len(), 1);
        assert_eq!(lib.failed_blocks[0].key_hint.as_deref(), Some("smith20"));
    }

    #[test]
    fn concatenation_with_unknown_macro_is_kept_verbatim() {
        let lib = parse_str("@misc{k, note = \"a\" # nat # {b}}");
        let field = lib.get("k").unwrap().get("note").unwrap();
        assert_eq!(field.delimiter, Delimiter::Bare);
        assert_eq!(field.value, "\"a\" # nat # {b}");
    }

    #[test]
    fn comment_without_group_ends_at_line_end() {
        let lib = parse_str("@comment jabref meta\n@article{k, title={T}}\n");
        assert_eq!(lib.blocks.len(), 1);
        assert_eq!(lib.blocks[0].kind, "comment");
        assert!(lib.contains("k"));
    }

    #[test]
    fn at_sign_inside_free_text_is_ignored() {
        let lib = parse_str("Contact me at someone@example.org\n@article{k, title={T}}\n");
        assert!(lib.failed_blocks.is_empty());
        assert_eq!(lib.len(), 1);
    }

    #[test]
    fn parse_single_rejects_garbage() {
        assert!(parse_single("<html>not bibtex</html>").is_err());
        let entry = parse_single(" @article{k, doi={10.1/x}}").unwrap();
        assert_eq!(entry.key, "k");
    }
}
