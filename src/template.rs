// Template scanner
// Splits page text into literals and `{{ ... }}` placeholders, and each
// placeholder into its `|`-separated pipeline stages. The scan is
// quote-aware throughout: a `select('{{ it }}\n')` argument carries a whole
// nested sub-template inside a string literal, so `}}` and `|` only count
// when they appear outside quotes.

use crate::ast::{Placeholder, PipelineStage, TemplateNode};
use crate::parser::{self, ParseError};

/// Parse page text into template nodes.
///
/// Placeholders are parsed per occurrence; a malformed stage is a
/// [`ParseError`], never silently skipped.
pub fn parse_template(input: &str) -> Result<Vec<TemplateNode>, ParseError> {
    let bytes = input.as_bytes();
    let mut nodes = Vec::new();
    let mut cursor = 0;

    while cursor < bytes.len() {
        match find_subslice(bytes, b"{{", cursor) {
            Some(start) => {
                if start > cursor {
                    nodes.push(TemplateNode::Text(input[cursor..start].to_string()));
                }
                let inner_start = start + 2;
                let inner_end = find_placeholder_end(bytes, inner_start)
                    .ok_or(ParseError::UnclosedPlaceholder { position: start })?;
                let placeholder = parse_placeholder(&input[inner_start..inner_end], start)?;
                nodes.push(TemplateNode::Placeholder(placeholder));
                cursor = inner_end + 2;
            }
            None => {
                nodes.push(TemplateNode::Text(input[cursor..].to_string()));
                break;
            }
        }
    }

    Ok(nodes)
}

/// Parse the inside of one `{{ ... }}`: a source expression followed by
/// pipeline stages.
fn parse_placeholder(inner: &str, offset: usize) -> Result<Placeholder, ParseError> {
    let segments = split_stages(inner);
    let mut iter = segments.into_iter();

    let (_, source_text) = iter.next().unwrap_or((0, ""));
    let source = parser::parse_expr(source_text.trim())?;

    let mut stages = Vec::new();
    for (seg_offset, segment) in iter {
        stages.push(parse_stage(segment, seg_offset)?);
    }

    Ok(Placeholder {
        source,
        stages,
        offset,
    })
}

/// Parse one stage segment: `name`, `name(args...)`, or `name: raw-text`.
fn parse_stage(segment: &str, offset: usize) -> Result<PipelineStage, ParseError> {
    let trimmed = segment.trim();
    let lead = offset + (segment.len() - segment.trim_start().len());

    let mut name_end = 0;
    for (i, c) in trimmed.char_indices() {
        let valid = if i == 0 {
            c.is_alphabetic() || c == '_'
        } else {
            c.is_alphanumeric() || c == '_'
        };
        if !valid {
            break;
        }
        name_end = i + c.len_utf8();
    }
    if name_end == 0 {
        return Err(ParseError::Expected {
            expected: "filter name".to_string(),
            found: trimmed.chars().next().map_or_else(
                || "end of stage".to_string(),
                |c| c.to_string(),
            ),
            position: lead,
        });
    }
    let name = trimmed[..name_end].to_string();
    let rest = trimmed[name_end..].trim_start();

    if rest.is_empty() {
        return Ok(PipelineStage {
            name,
            arg: None,
            binding: None,
            offset: lead,
        });
    }

    // Colon form: the rest of the segment, verbatim, is the one argument.
    if let Some(raw) = rest.strip_prefix(':') {
        let raw = raw.trim();
        return Ok(PipelineStage {
            name,
            arg: (!raw.is_empty()).then(|| raw.to_string()),
            binding: None,
            offset: lead,
        });
    }

    // Fluent form: `name(args)` with nothing after the closing paren.
    if let Some(args_and_tail) = rest.strip_prefix('(') {
        let bytes = args_and_tail.as_bytes();
        let close = find_matching_paren(bytes).ok_or_else(|| ParseError::Expected {
            expected: "')'".to_string(),
            found: "end of stage".to_string(),
            position: lead,
        })?;
        let tail = args_and_tail[close + 1..].trim();
        if !tail.is_empty() {
            return Err(ParseError::Expected {
                expected: "end of stage".to_string(),
                found: tail.to_string(),
                position: lead,
            });
        }
        let (arg, binding) = parser::parse_fluent_args(&args_and_tail[..close])?;
        return Ok(PipelineStage {
            name,
            arg,
            binding,
            offset: lead,
        });
    }

    Err(ParseError::Expected {
        expected: "'(', ':' or end of stage".to_string(),
        found: rest.chars().next().unwrap().to_string(),
        position: lead,
    })
}

// ── Quote-aware scanning helpers ─────────────────────────────────────────────

fn find_subslice(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if haystack.len() < needle.len() {
        return None;
    }
    (from..=haystack.len() - needle.len()).find(|&i| &haystack[i..i + needle.len()] == needle)
}

/// Byte index of the `}}` closing the placeholder whose body starts at
/// `from`, skipping quoted regions.
fn find_placeholder_end(bytes: &[u8], from: usize) -> Option<usize> {
    let mut i = from;
    let mut quote: Option<u8> = None;

    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    i += 1; // skip the escaped byte
                } else if b == q {
                    quote = None;
                }
            }
            None => {
                if b == b'\'' || b == b'"' {
                    quote = Some(b);
                } else if b == b'}' && bytes.get(i + 1) == Some(&b'}') {
                    return Some(i);
                }
            }
        }
        i += 1;
    }
    None
}

/// Index of the `)` matching an already-consumed `(`, skipping quoted
/// regions and nested parens.
fn find_matching_paren(bytes: &[u8]) -> Option<usize> {
    let mut i = 0;
    let mut quote: Option<u8> = None;
    let mut depth = 0usize;

    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    i += 1;
                } else if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'\'' | b'"' => quote = Some(b),
                b'(' => depth += 1,
                b')' => {
                    if depth == 0 {
                        return Some(i);
                    }
                    depth -= 1;
                }
                _ => {}
            },
        }
        i += 1;
    }
    None
}

/// Split placeholder text on top-level `|`, returning each segment with its
/// byte offset inside the placeholder.
fn split_stages(inner: &str) -> Vec<(usize, &str)> {
    let bytes = inner.as_bytes();
    let mut segments = Vec::new();
    let mut start = 0;
    let mut i = 0;
    let mut quote: Option<u8> = None;
    let mut depth = 0usize;

    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    i += 1;
                } else if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'\'' | b'"' => quote = Some(b),
                b'(' | b'{' => depth += 1,
                b')' | b'}' => depth = depth.saturating_sub(1),
                b'|' if depth == 0 => {
                    segments.push((start, &inner[start..i]));
                    start = i + 1;
                }
                _ => {}
            },
        }
        i += 1;
    }
    segments.push((start, &inner[start..]));
    segments
}
