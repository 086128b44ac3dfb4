// src/assertions/writer.rs

//! Bit-exact assertion serialization
//!
//! Seed validation parses these files with the store's own parser, so the
//! output must reproduce the expected byte stream exactly: a fixed header
//! order per assertion type, computed `body-length`, two-space nested
//! blocks, and a terminating newline on every type except `snap-revision`.
//!
//! The per-type header order is data, not control flow: one table per
//! assertion kind.

use crate::assertions::{Assertion, HeaderValue};
use crate::error::{Error, Result};
use crate::store::AssertionKind;
use chrono::{DateTime, Utc};
use std::io::Write;

const ACCOUNT_KEY_ORDER: &[&str] = &[
    "type",
    "authority-id",
    "revision",
    "public-key-sha3-384",
    "account-id",
    "name",
    "since",
    "body-length",
    "sign-key-sha3-384",
];

const ACCOUNT_ORDER: &[&str] = &[
    "type",
    "authority-id",
    "revision",
    "account-id",
    "display-name",
    "timestamp",
    "username",
    "validation",
    "sign-key-sha3-384",
];

const SNAP_DECLARATION_ORDER: &[&str] = &[
    "type",
    "format",
    "authority-id",
    "revision",
    "series",
    "snap-id",
    "aliases",
    "auto-aliases",
    "plugs",
    "publisher-id",
    "slots",
    "snap-name",
    "timestamp",
    "sign-key-sha3-384",
];

const SNAP_REVISION_ORDER: &[&str] = &[
    "type",
    "authority-id",
    "snap-sha3-384",
    "developer-id",
    "provenance",
    "snap-id",
    "snap-revision",
    "snap-size",
    "timestamp",
    "sign-key-sha3-384",
];

/// Headers whose values are nested blocks rather than scalars
const COMPLEX_HEADERS: &[&str] = &[
    "aliases",
    "auto-aliases",
    "plugs",
    "slots",
    "allow-installation",
    "allow-connection",
];

/// `snap-revision` assertions at or before this instant predate the
/// `provenance` header; emitting it would break older seed parsers.
const PROVENANCE_CUTOFF: &str = "2023-12-09T00:00:00Z";

fn field_order(kind: AssertionKind) -> &'static [&'static str] {
    match kind {
        AssertionKind::AccountKey => ACCOUNT_KEY_ORDER,
        AssertionKind::Account => ACCOUNT_ORDER,
        AssertionKind::SnapDeclaration => SNAP_DECLARATION_ORDER,
        AssertionKind::SnapRevision => SNAP_REVISION_ORDER,
    }
}

/// Serialize one assertion in the on-disk seed form.
///
/// The `account` assertion for the `canonical` publisher is implied by the
/// model assertions and is skipped entirely.
pub fn write_assertion(
    kind: AssertionKind,
    assertion: &Assertion,
    out: &mut impl Write,
) -> Result<()> {
    if kind == AssertionKind::Account && assertion.header_str("username") == Some("canonical") {
        return Ok(());
    }

    let strip_provenance =
        kind == AssertionKind::SnapRevision && provenance_predates_cutoff(assertion);

    let body = assertion.body();
    let mut text = String::new();

    for &key in field_order(kind) {
        if key == "type" {
            text.push_str(&format!("type: {}\n", kind.as_str()));
            continue;
        }
        if key == "body-length" {
            if !body.is_empty() {
                text.push_str(&format!("body-length: {}\n", body.len()));
            }
            continue;
        }
        if key == "provenance" && strip_provenance {
            continue;
        }

        let value = match assertion.header(key) {
            Some(value) => value,
            None => continue,
        };
        if matches!(value, HeaderValue::Scalar(s) if s.is_empty()) {
            continue;
        }

        if COMPLEX_HEADERS.contains(&key) {
            text.push_str(&format!("{key}:\n"));
            emit_nested(value, 2, &mut text);
        } else if let Some(scalar) = value.as_str() {
            text.push_str(&format!("{key}: {scalar}\n"));
        } else {
            emit_nested_header(key, value, &mut text);
        }
    }
    text.push('\n');

    out.write_all(text.as_bytes())
        .map_err(|e| Error::IoError(format!("failed to write assertion: {e}")))?;

    if !body.is_empty() {
        out.write_all(body)
            .map_err(|e| Error::IoError(format!("failed to write assertion body: {e}")))?;
        out.write_all(b"\n\n")
            .map_err(|e| Error::IoError(format!("failed to write assertion body: {e}")))?;
    }

    out.write_all(assertion.signature())
        .map_err(|e| Error::IoError(format!("failed to write assertion signature: {e}")))?;

    if kind != AssertionKind::SnapRevision {
        out.write_all(b"\n")
            .map_err(|e| Error::IoError(format!("failed to write assertion: {e}")))?;
    }

    Ok(())
}

fn provenance_predates_cutoff(assertion: &Assertion) -> bool {
    let Some(timestamp) = assertion.header_str("timestamp") else {
        // No timestamp, nothing to compare against; keep the header
        return false;
    };
    let cutoff = DateTime::parse_from_rfc3339(PROVENANCE_CUTOFF)
        .expect("cutoff constant parses")
        .with_timezone(&Utc);
    match DateTime::parse_from_rfc3339(timestamp) {
        Ok(parsed) => parsed.with_timezone(&Utc) <= cutoff,
        // An unparseable timestamp cannot prove the snap is new enough
        Err(_) => true,
    }
}

/// A structured value under a key outside the known complex set still gets
/// the nested form rather than a lossy scalar rendering.
fn emit_nested_header(key: &str, value: &HeaderValue, out: &mut String) {
    out.push_str(&format!("{key}:\n"));
    emit_nested(value, 2, out);
}

/// Emit a nested header block with two-space indentation.
///
/// Map entries with structured values put the key alone on its line; list
/// items with structured values put the dash alone on its line, contents
/// two spaces deeper. `true`, `false`, and `*` stay unquoted.
fn emit_nested(value: &HeaderValue, indent: usize, out: &mut String) {
    let pad = " ".repeat(indent);
    match value {
        HeaderValue::Scalar(s) => {
            out.push_str(&format!("{pad}{s}\n"));
        }
        HeaderValue::Map(entries) => {
            for (key, value) in entries {
                match value {
                    HeaderValue::Scalar(s) => {
                        out.push_str(&format!("{pad}{key}: {s}\n"));
                    }
                    _ => {
                        out.push_str(&format!("{pad}{key}:\n"));
                        emit_nested(value, indent + 2, out);
                    }
                }
            }
        }
        HeaderValue::List(items) => {
            for item in items {
                match item {
                    HeaderValue::Scalar(s) => {
                        out.push_str(&format!("{pad}- {s}\n"));
                    }
                    _ => {
                        out.push_str(&format!("{pad}-\n"));
                        emit_nested(item, indent + 2, out);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assertions::HeaderValue as V;

    fn entry(key: &str, value: &str) -> (String, V) {
        (key.to_string(), V::scalar(value))
    }

    fn render(kind: AssertionKind, assertion: &Assertion) -> String {
        let mut out = Vec::new();
        write_assertion(kind, assertion, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_account_key_golden() {
        let assertion = Assertion::new(
            vec![
                // Deliberately out of order; the writer imposes its own
                entry("account-id", "canonical"),
                entry("type", "account-key"),
                entry("authority-id", "canonical"),
                entry("revision", "2"),
                entry("public-key-sha3-384", "BWDEoaqyr25nF5SNCvEv2v7QnM9Qsf"),
                entry("name", "store"),
                entry("since", "2016-04-01T00:00:00.0Z"),
                entry("body-length", "717"),
                entry("sign-key-sha3-384", "-CvQKAwRQ5h3Ffn10FILJoEZUXOv6km"),
            ],
            b"AcbBTQRWhcGAAR".to_vec(),
            b"AcLBXAQAAQoABgUCV7UgKQ==\n".to_vec(),
        );

        let expected = "\
type: account-key
authority-id: canonical
revision: 2
public-key-sha3-384: BWDEoaqyr25nF5SNCvEv2v7QnM9Qsf
account-id: canonical
name: store
since: 2016-04-01T00:00:00.0Z
body-length: 14
sign-key-sha3-384: -CvQKAwRQ5h3Ffn10FILJoEZUXOv6km

AcbBTQRWhcGAAR

AcLBXAQAAQoABgUCV7UgKQ==
\n";
        assert_eq!(render(AssertionKind::AccountKey, &assertion), expected);
    }

    #[test]
    fn test_account_golden() {
        let assertion = Assertion::new(
            vec![
                entry("type", "account"),
                entry("authority-id", "canonical"),
                entry("revision", "4"),
                entry("account-id", "kyrofa-id"),
                entry("display-name", "Kyle Fazzari"),
                entry("timestamp", "2016-06-13T20:49:33.036862Z"),
                entry("username", "kyrofa"),
                entry("validation", "unproven"),
                entry("sign-key-sha3-384", "BWDEoaqy"),
            ],
            Vec::new(),
            b"AcLBXAQAAQoABgUCV7UgKQ==\n".to_vec(),
        );

        let expected = "\
type: account
authority-id: canonical
revision: 4
account-id: kyrofa-id
display-name: Kyle Fazzari
timestamp: 2016-06-13T20:49:33.036862Z
username: kyrofa
validation: unproven
sign-key-sha3-384: BWDEoaqy

AcLBXAQAAQoABgUCV7UgKQ==
\n";
        assert_eq!(render(AssertionKind::Account, &assertion), expected);
    }

    #[test]
    fn test_canonical_account_is_skipped() {
        let assertion = Assertion::new(
            vec![
                entry("type", "account"),
                entry("username", "canonical"),
                entry("validation", "certified"),
            ],
            Vec::new(),
            b"SIG".to_vec(),
        );
        assert_eq!(render(AssertionKind::Account, &assertion), "");
    }

    #[test]
    fn test_snap_declaration_nested_golden() {
        let assertion = Assertion::new(
            vec![
                entry("type", "snap-declaration"),
                entry("authority-id", "canonical"),
                entry("revision", "8"),
                entry("series", "16"),
                entry("snap-id", "mVyGrEwiqSi5"),
                (
                    "aliases".to_string(),
                    V::List(vec![V::Map(vec![
                        ("name".to_string(), V::scalar("hw")),
                        ("target".to_string(), V::scalar("hw")),
                    ])]),
                ),
                (
                    "plugs".to_string(),
                    V::Map(vec![(
                        "desktop".to_string(),
                        V::Map(vec![
                            ("allow-installation".to_string(), V::scalar("true")),
                            ("allow-auto-connection".to_string(), V::scalar("*")),
                        ]),
                    )]),
                ),
                entry("publisher-id", "canonical"),
                entry("snap-name", "hw-probe"),
                entry("timestamp", "2021-03-09T16:00:30.697857Z"),
                entry("sign-key-sha3-384", "BWDEoaqy"),
            ],
            Vec::new(),
            b"AcLBswFW\n".to_vec(),
        );

        let expected = "\
type: snap-declaration
authority-id: canonical
revision: 8
series: 16
snap-id: mVyGrEwiqSi5
aliases:
  -
    name: hw
    target: hw
plugs:
  desktop:
    allow-installation: true
    allow-auto-connection: *
publisher-id: canonical
snap-name: hw-probe
timestamp: 2021-03-09T16:00:30.697857Z
sign-key-sha3-384: BWDEoaqy

AcLBswFW
\n";
        assert_eq!(render(AssertionKind::SnapDeclaration, &assertion), expected);
    }

    #[test]
    fn test_snap_revision_recent_keeps_provenance_and_terminator() {
        let assertion = Assertion::new(
            vec![
                entry("type", "snap-revision"),
                entry("authority-id", "canonical"),
                entry("snap-sha3-384", "ZXlK"),
                entry("developer-id", "canonical"),
                entry("provenance", "global-upload"),
                entry("snap-id", "mVyGrEwiqSi5"),
                entry("snap-revision", "42"),
                entry("snap-size", "12345"),
                entry("timestamp", "2024-02-01T00:00:00Z"),
                entry("sign-key-sha3-384", "BWDEoaqy"),
            ],
            Vec::new(),
            b"AcLBUgQA\n".to_vec(),
        );

        let rendered = render(AssertionKind::SnapRevision, &assertion);
        assert!(rendered.contains("provenance: global-upload\n"));
        // snap-revision is the final block of the chain: no extra newline
        assert!(rendered.ends_with("AcLBUgQA\n"));
        assert!(!rendered.ends_with("AcLBUgQA\n\n"));
    }

    #[test]
    fn test_snap_revision_old_timestamp_drops_provenance() {
        let assertion = Assertion::new(
            vec![
                entry("type", "snap-revision"),
                entry("authority-id", "canonical"),
                entry("snap-sha3-384", "ZXlK"),
                entry("provenance", "global-upload"),
                entry("snap-id", "mVyGrEwiqSi5"),
                entry("snap-revision", "42"),
                entry("timestamp", "2022-07-15T10:00:00Z"),
                entry("sign-key-sha3-384", "BWDEoaqy"),
            ],
            Vec::new(),
            b"AcLBUgQA\n".to_vec(),
        );

        let rendered = render(AssertionKind::SnapRevision, &assertion);
        assert!(!rendered.contains("provenance"));
    }

    #[test]
    fn test_empty_values_are_skipped() {
        let assertion = Assertion::new(
            vec![
                entry("type", "account"),
                entry("authority-id", "canonical"),
                entry("account-id", "some-id"),
                entry("username", ""),
                entry("sign-key-sha3-384", "BWDEoaqy"),
            ],
            Vec::new(),
            b"SIG\n".to_vec(),
        );
        let rendered = render(AssertionKind::Account, &assertion);
        assert!(!rendered.contains("username"));
    }
}
