//! RFC 5322 header blocks: reading with unfolding, encoded-words (RFC 2047),
//! and date parsing.

use std::io::{BufRead, Read};

use base64::Engine;
use chrono::{DateTime, Utc};
use tracing::warn;

use crate::error::{NewsError, Result};
use crate::model::Headers;

/// Read a header block up to and including the first blank line.
///
/// Accepts LF or CRLF line endings. Continuation lines (leading space or
/// tab) are joined to the previous value with the line break removed and
/// the leading whitespace kept. End of input also ends the block.
///
/// `limit` bounds the raw size of the block in bytes; 0 means unlimited.
pub fn read_headers(r: &mut dyn BufRead, limit: usize) -> Result<Headers> {
    let mut headers = Headers::new();
    let mut current: Option<(String, String)> = None;
    let mut consumed = 0usize;
    let mut line = Vec::new();

    loop {
        line.clear();
        let budget = if limit == 0 {
            u64::MAX
        } else {
            (limit - consumed) as u64 + 1
        };
        let n = (&mut *r).take(budget).read_until(b'\n', &mut line)?;
        consumed += n;
        if limit != 0 && consumed > limit {
            return Err(NewsError::HeaderTooLarge(limit));
        }
        if n == 0 {
            break;
        }

        let content = trim_line_ending(&line);
        if content.is_empty() {
            break;
        }

        let text = decode_header_bytes(content);
        if text.starts_with(' ') || text.starts_with('\t') {
            let (_, value) = current.as_mut().ok_or_else(|| {
                NewsError::InvalidHeader("continuation without a header".into())
            })?;
            value.push_str(text.trim_end());
            continue;
        }

        if let Some((name, value)) = current.take() {
            headers.append(&name, value);
        }

        let colon = text
            .find(':')
            .ok_or_else(|| NewsError::InvalidHeader(format!("missing colon in {text:?}")))?;
        let name = text[..colon].trim_end();
        if name.is_empty() {
            return Err(NewsError::InvalidHeader("empty header name".into()));
        }
        if !name.bytes().all(|b| (0x21..=0x7e).contains(&b)) {
            return Err(NewsError::InvalidHeader(format!("bad header name {name:?}")));
        }
        let value = text[colon + 1..].trim();
        current = Some((name.to_string(), value.to_string()));
    }

    if let Some((name, value)) = current {
        headers.append(&name, value);
    }
    Ok(headers)
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Header bytes as text: UTF-8 when valid, otherwise Windows-1252, which
/// maps every byte.
fn decode_header_bytes(bytes: &[u8]) -> String {
    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_owned();
    }
    encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned()
}

/// One `=?charset?enc?text?=` token.
struct EncodedWord<'a> {
    charset: &'a str,
    bytes: Vec<u8>,
    /// Length of the token in the source, delimiters included.
    len: usize,
}

/// Parse an encoded-word at the start of `s`.
fn parse_encoded_word(s: &str) -> Option<EncodedWord<'_>> {
    let body = s.strip_prefix("=?")?;
    let mut fields = body.splitn(3, '?');
    let charset = fields.next()?;
    let encoding = fields.next()?;
    let rest = fields.next()?;
    let text_len = rest.find("?=")?;
    let text = &rest[..text_len];
    if charset.is_empty() || text.contains(char::is_whitespace) {
        return None;
    }

    let bytes = if encoding.eq_ignore_ascii_case("B") {
        crate::parser::transfer::LENIENT_BASE64.decode(text).ok()?
    } else if encoding.eq_ignore_ascii_case("Q") {
        decode_q(text.as_bytes())
    } else {
        return None;
    };
    let len = 2 + charset.len() + 1 + encoding.len() + 1 + text_len + 2;
    // RFC 2231 allows a language tag after '*'.
    let charset = charset.split_once('*').map_or(charset, |(c, _)| c);
    Some(EncodedWord { charset, bytes, len })
}

/// RFC 2047 "Q": `_` is a space, `=XX` a byte; a stray `=` stays literal.
fn decode_q(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut rest = input;
    while let Some((&b, tail)) = rest.split_first() {
        rest = tail;
        match b {
            b'_' => out.push(b' '),
            b'=' => match crate::parser::transfer::hex_pair(tail.first(), tail.get(1)) {
                Some(v) => {
                    out.push(v);
                    rest = &tail[2..];
                }
                None => out.push(b'='),
            },
            _ => out.push(b),
        }
    }
    out
}

fn decode_charset(charset: &str, bytes: &[u8]) -> String {
    match encoding_rs::Encoding::for_label(charset.as_bytes()) {
        Some(enc) => enc.decode(bytes).0.into_owned(),
        None => {
            warn!(charset, "Unknown charset in encoded-word, assuming UTF-8");
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

/// Decode RFC 2047 encoded-words in a header value.
///
/// Adjacent words separated only by whitespace are joined, and words in
/// the same charset are decoded together so a character split across
/// two words survives. Malformed tokens are left as they are.
pub fn decode_encoded_words(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    // Pending run of encoded bytes and their charset.
    let mut run: Option<(&str, Vec<u8>)> = None;
    let mut rest = input;

    while let Some(at) = rest.find("=?") {
        let (gap, token) = rest.split_at(at);
        let Some(word) = parse_encoded_word(token) else {
            flush_run(&mut out, &mut run);
            out.push_str(gap);
            out.push_str("=?");
            rest = &token[2..];
            continue;
        };
        let joins = run.is_some() && gap.trim().is_empty();
        if !joins {
            flush_run(&mut out, &mut run);
            out.push_str(gap);
        }
        let same_charset = matches!(&run, Some((c, _)) if c.eq_ignore_ascii_case(word.charset));
        match run.as_mut() {
            Some((_, bytes)) if same_charset => bytes.extend_from_slice(&word.bytes),
            _ => {
                flush_run(&mut out, &mut run);
                run = Some((word.charset, word.bytes));
            }
        }
        rest = &token[word.len..];
    }
    flush_run(&mut out, &mut run);
    out.push_str(rest);
    out
}

fn flush_run(out: &mut String, run: &mut Option<(&str, Vec<u8>)>) {
    if let Some((charset, bytes)) = run.take() {
        out.push_str(&decode_charset(charset, &bytes));
    }
}

/// Encode a header value as a single UTF-8 `B` encoded-word when it is
/// not plain printable ASCII.
pub fn encode_word(value: &str) -> String {
    if value.bytes().all(|b| (0x20..0x7f).contains(&b)) {
        return value.to_string();
    }
    let encoded = base64::engine::general_purpose::STANDARD.encode(value.as_bytes());
    format!("=?UTF-8?B?{encoded}?=")
}

/// Zone abbreviations seen in the wild, with their offsets.
const NAMED_ZONES: &[(&str, &str)] = &[
    ("UT", "+0000"),
    ("GMT", "+0000"),
    ("UTC", "+0000"),
    ("EST", "-0500"),
    ("EDT", "-0400"),
    ("CST", "-0600"),
    ("CDT", "-0500"),
    ("MST", "-0700"),
    ("MDT", "-0600"),
    ("PST", "-0800"),
    ("PDT", "-0700"),
    ("CET", "+0100"),
    ("CEST", "+0200"),
    ("MSK", "+0300"),
    ("JST", "+0900"),
];

/// Parse an article `Date` header.
///
/// RFC 2822 first, then the same with a named zone turned numeric, then
/// RFC 3339, then whatever `mail-parser` makes of it.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let numeric_zone = raw.rsplit_once(' ').and_then(|(head, zone)| {
        NAMED_ZONES
            .iter()
            .find(|(name, _)| zone.eq_ignore_ascii_case(name))
            .map(|(_, offset)| format!("{head} {offset}"))
    });
    let parsed = DateTime::parse_from_rfc2822(raw)
        .ok()
        .or_else(|| numeric_zone.and_then(|s| DateTime::parse_from_rfc2822(&s).ok()))
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| date_via_mail_parser(raw));
    if parsed.is_none() {
        warn!(date = raw, "Unparseable Date header");
    }
    parsed
}

fn date_via_mail_parser(raw: &str) -> Option<DateTime<Utc>> {
    let header = format!("Date: {raw}\n\n");
    let message = mail_parser::MessageParser::default().parse(header.as_bytes())?;
    let ts = message.date()?.to_timestamp();
    DateTime::from_timestamp(ts, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn read(input: &[u8], limit: usize) -> Result<Headers> {
        read_headers(&mut Cursor::new(input), limit)
    }

    #[test]
    fn test_read_simple_block() {
        let h = read(b"A: b\n\nbody", 0).unwrap();
        assert_eq!(h.get_first("A"), Some("b"));
        let h = read(b"A:b\r\n\r\n", 0).unwrap();
        assert_eq!(h.get_first("a"), Some("b"));
        let h = read(b"A   :b\n\n", 0).unwrap();
        assert_eq!(h.get_first("A"), Some("b"));
    }

    #[test]
    fn test_empty_block() {
        assert!(read(b"\n", 0).unwrap().is_empty());
        assert!(read(b"\nsomething", 0).unwrap().is_empty());
        assert!(read(b"", 0).unwrap().is_empty());
    }

    #[test]
    fn test_unfolding_keeps_whitespace() {
        let h = read(b"A: b\n c\n d\n\n", 0).unwrap();
        assert_eq!(h.get_first("A"), Some("b c d"));
        let h = read(b"A: b\n\tc\n\td\n\n", 0).unwrap();
        assert_eq!(h.get_first("A"), Some("b\tc\td"));
    }

    #[test]
    fn test_stops_at_blank_line() {
        let mut cur = Cursor::new(&b"Subject: x\n\nNot: a header\n"[..]);
        let h = read_headers(&mut cur, 0).unwrap();
        assert_eq!(h.len(), 1);
        let mut rest = String::new();
        cur.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "Not: a header\n");
    }

    #[test]
    fn test_limit_enforced() {
        let long = format!("A: {}\n\n", "x".repeat(100));
        assert!(matches!(
            read(long.as_bytes(), 50),
            Err(NewsError::HeaderTooLarge(50))
        ));
        assert!(read(long.as_bytes(), 200).is_ok());
    }

    #[test]
    fn test_malformed_lines() {
        assert!(read(b" leading\n\n", 0).is_err());
        assert!(read(b"no colon here\n\n", 0).is_err());
        assert!(read(b": empty\n\n", 0).is_err());
    }

    #[test]
    fn test_long_header() {
        let mut value = String::new();
        for i in 0..16000 {
            value.push_str(&format!("a-{i}-b"));
        }
        let msg = format!("A: {value}\n\n");
        let h = read(msg.as_bytes(), 0).unwrap();
        assert_eq!(h.get_first("A"), Some(value.as_str()));
    }

    #[test]
    fn test_decode_base64_encoded_word() {
        assert_eq!(decode_encoded_words("=?UTF-8?B?SG9sYSBtdW5kbw==?="), "Hola mundo");
    }

    #[test]
    fn test_decode_q_encoded_word() {
        assert_eq!(decode_encoded_words("=?ISO-8859-1?Q?caf=E9?="), "café");
    }

    #[test]
    fn test_decode_multiple_encoded_words() {
        let input = "=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?=";
        assert_eq!(decode_encoded_words(input), "Hola mundo");
    }

    #[test]
    fn test_decode_mixed_plain_and_encoded() {
        let input = "Re: =?UTF-8?B?SG9sYQ==?= there";
        assert_eq!(decode_encoded_words(input), "Re: Hola there");
    }

    #[test]
    fn test_encode_word_roundtrip() {
        assert_eq!(encode_word("plain"), "plain");
        let encoded = encode_word("Привет");
        assert!(encoded.starts_with("=?UTF-8?B?"));
        assert_eq!(decode_encoded_words(&encoded), "Привет");
    }

    #[test]
    fn test_decode_koi8_encoded_word() {
        // "мир" in KOI8-R
        let input = "=?KOI8-R?Q?=CD=C9=D2?=";
        assert_eq!(decode_encoded_words(input), "мир");
    }

    #[test]
    fn test_parse_date_rfc2822() {
        let dt = parse_date("Thu, 04 Jan 2024 10:00:00 +0000").unwrap();
        assert_eq!(dt.format("%Y-%m-%d").to_string(), "2024-01-04");
    }

    #[test]
    fn test_parse_date_named_tz() {
        assert!(parse_date("Thu, 04 Jan 2024 10:00:00 EST").is_some());
    }

    #[test]
    fn test_parse_date_iso8601() {
        assert!(parse_date("2024-01-04T10:00:00Z").is_some());
    }

    #[test]
    fn test_parse_date_garbage() {
        assert!(parse_date("").is_none());
    }
}
