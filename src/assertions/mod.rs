// src/assertions/mod.rs

//! Assertion model and wire-format parser
//!
//! An assertion is a signed text document: header lines, a blank line, an
//! optional binary body (announced by a `body-length` header), another
//! blank line, then the signature block. Headers are scalars, nested maps,
//! or lists; nesting is expressed with two-space indentation and list
//! items with a leading dash.

pub mod fetch;
pub mod writer;

use crate::error::{Error, Result};

/// A header value: scalar, list, or nested map.
///
/// Maps preserve the order the wire format delivered; the writer decides
/// top-level ordering itself but emits nested structures as parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValue {
    Scalar(String),
    List(Vec<HeaderValue>),
    Map(Vec<(String, HeaderValue)>),
}

impl HeaderValue {
    pub fn scalar(value: impl Into<String>) -> Self {
        HeaderValue::Scalar(value.into())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HeaderValue::Scalar(s) => Some(s),
            _ => None,
        }
    }
}

/// A parsed assertion: ordered headers, optional body, signature bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assertion {
    headers: Vec<(String, HeaderValue)>,
    body: Vec<u8>,
    signature: Vec<u8>,
}

impl Assertion {
    pub fn new(
        headers: Vec<(String, HeaderValue)>,
        body: Vec<u8>,
        signature: Vec<u8>,
    ) -> Self {
        Self {
            headers,
            body,
            signature,
        }
    }

    pub fn header(&self, key: &str) -> Option<&HeaderValue> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn header_str(&self, key: &str) -> Option<&str> {
        self.header(key).and_then(HeaderValue::as_str)
    }

    pub fn headers(&self) -> &[(String, HeaderValue)] {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }
}

/// Parse one assertion from its wire form.
pub fn parse(data: &[u8]) -> Result<Assertion> {
    let header_end = find_blank_line(data)
        .ok_or_else(|| Error::AssertionParse("missing blank line after headers".to_string()))?;
    let header_text = std::str::from_utf8(&data[..header_end])
        .map_err(|_| Error::AssertionParse("headers are not valid UTF-8".to_string()))?;
    let rest = &data[header_end + 2..];

    let headers = parse_headers(header_text)?;

    let body_length = headers
        .iter()
        .find(|(k, _)| k == "body-length")
        .and_then(|(_, v)| v.as_str())
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(0);

    let (body, signature) = if body_length > 0 {
        if rest.len() < body_length + 2 || &rest[body_length..body_length + 2] != b"\n\n" {
            return Err(Error::AssertionParse(
                "body does not match body-length".to_string(),
            ));
        }
        (
            rest[..body_length].to_vec(),
            rest[body_length + 2..].to_vec(),
        )
    } else {
        (Vec::new(), rest.to_vec())
    };

    Ok(Assertion::new(headers, body, signature))
}

fn find_blank_line(data: &[u8]) -> Option<usize> {
    data.windows(2).position(|w| w == b"\n\n")
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start_matches(' ').len()
}

fn parse_headers(text: &str) -> Result<Vec<(String, HeaderValue)>> {
    let lines: Vec<&str> = text.lines().collect();
    let mut idx = 0;
    let entries = parse_entries(&lines, &mut idx, 0)?;
    if idx != lines.len() {
        return Err(Error::AssertionParse(format!(
            "unexpected header line: {:?}",
            lines[idx]
        )));
    }
    Ok(entries)
}

fn parse_entries(
    lines: &[&str],
    idx: &mut usize,
    indent: usize,
) -> Result<Vec<(String, HeaderValue)>> {
    let mut entries = Vec::new();

    while *idx < lines.len() {
        let line = lines[*idx];
        let line_indent = indent_of(line);
        if line_indent < indent {
            break;
        }
        if line_indent > indent {
            return Err(Error::AssertionParse(format!(
                "unexpected indentation: {line:?}"
            )));
        }

        let content = &line[indent..];
        let (key, rest) = content
            .split_once(':')
            .ok_or_else(|| Error::AssertionParse(format!("malformed header line: {line:?}")))?;

        if let Some(value) = rest.strip_prefix(' ') {
            entries.push((key.to_string(), HeaderValue::scalar(value)));
            *idx += 1;
        } else if rest.is_empty() {
            *idx += 1;
            if *idx < lines.len() && indent_of(lines[*idx]) > indent {
                let value = parse_value(lines, idx, indent + 2)?;
                entries.push((key.to_string(), value));
            } else {
                entries.push((key.to_string(), HeaderValue::scalar("")));
            }
        } else {
            return Err(Error::AssertionParse(format!(
                "malformed header line: {line:?}"
            )));
        }
    }

    Ok(entries)
}

fn parse_value(lines: &[&str], idx: &mut usize, indent: usize) -> Result<HeaderValue> {
    let content = &lines[*idx][indent..];
    if content == "-" || content.starts_with("- ") {
        parse_list(lines, idx, indent)
    } else {
        Ok(HeaderValue::Map(parse_entries(lines, idx, indent)?))
    }
}

fn parse_list(lines: &[&str], idx: &mut usize, indent: usize) -> Result<HeaderValue> {
    let mut items = Vec::new();

    while *idx < lines.len() {
        let line = lines[*idx];
        if indent_of(line) != indent {
            break;
        }
        let content = &line[indent..];

        if content == "-" {
            *idx += 1;
            if *idx < lines.len() && indent_of(lines[*idx]) > indent {
                items.push(parse_value(lines, idx, indent + 2)?);
            } else {
                items.push(HeaderValue::scalar(""));
            }
        } else if let Some(rest) = content.strip_prefix("- ") {
            if let Some((key, value)) = rest.split_once(": ") {
                // Inline mapping item; continuation entries sit two deeper
                let mut entries = vec![(key.to_string(), HeaderValue::scalar(value))];
                *idx += 1;
                entries.extend(parse_entries(lines, idx, indent + 2)?);
                items.push(HeaderValue::Map(entries));
            } else {
                items.push(HeaderValue::scalar(rest));
                *idx += 1;
            }
        } else {
            break;
        }
    }

    Ok(HeaderValue::List(items))
}
