//! Media type values (`Content-Type`, `Content-Disposition`): parsing with
//! RFC 2231 parameter extensions, and formatting.

use std::collections::BTreeMap;

use crate::parser::transfer::hex_pair;

/// Parameter map with lowercase names.
pub type Params = BTreeMap<String, String>;

/// Parse `type/subtype; a=b; c="d"` into a lowercase media type and its
/// parameters.
///
/// An empty value yields an empty type. A value whose type part is not
/// a valid token yields `"invalid"`. Malformed trailing parameters are
/// dropped.
pub fn parse_media_type(value: &str) -> (String, Params) {
    let value = value.trim();
    if value.is_empty() {
        return (String::new(), Params::new());
    }

    let (head, mut rest) = match value.find(';') {
        Some(i) => (&value[..i], &value[i..]),
        None => (value, ""),
    };
    let media = head.trim().to_ascii_lowercase();
    if !valid_media(&media) {
        return ("invalid".to_string(), Params::new());
    }

    let mut params = Params::new();
    // name -> segment index -> (value, percent-encoded)
    let mut continued: BTreeMap<String, BTreeMap<u32, (String, bool)>> = BTreeMap::new();

    while let Some(r) = rest.trim_start().strip_prefix(';') {
        let r = r.trim_start();
        let Some(eq) = r.find('=') else {
            break;
        };
        let key = r[..eq].trim().to_ascii_lowercase();
        let Some((val, after)) = parse_value(&r[eq + 1..]) else {
            break;
        };
        rest = after;

        let (name, encoded) = match key.strip_suffix('*') {
            Some(base) => (base, true),
            None => (key.as_str(), false),
        };
        match name.split_once('*') {
            Some((base, idx)) => {
                let Ok(idx) = idx.parse::<u32>() else {
                    continue;
                };
                if is_token(base) {
                    continued
                        .entry(base.to_string())
                        .or_default()
                        .insert(idx, (val, encoded));
                }
            }
            None if is_token(name) => {
                let val = if encoded { decode_extended(&val) } else { val };
                params.insert(name.to_string(), val);
            }
            None => {}
        }
    }

    for (name, segments) in continued {
        let mut raw = Vec::new();
        let mut charset = String::new();
        for (i, (val, encoded)) in segments.into_values().enumerate() {
            if !encoded {
                raw.extend_from_slice(val.as_bytes());
                continue;
            }
            let data = if i == 0 {
                match split_extended(&val) {
                    Some((cs, data)) => {
                        charset = cs.to_string();
                        data
                    }
                    None => val.as_str(),
                }
            } else {
                val.as_str()
            };
            raw.extend(percent_decode(data));
        }
        params.insert(name, decode_bytes(&charset, &raw));
    }

    (media, params)
}

/// Serialize a media type and parameters, quoting or RFC 2231-encoding
/// values as needed. Type and parameter names are lowercased.
///
/// Returns `None` if the type or a parameter name is not a valid token.
pub fn format_media_type(media: &str, params: &Params) -> Option<String> {
    let mut out = String::new();
    match media.split_once('/') {
        None => {
            if !is_token(media) {
                return None;
            }
            out.push_str(&media.to_ascii_lowercase());
        }
        Some((major, sub)) => {
            if !is_token(major) || !is_token(sub) {
                return None;
            }
            out.push_str(&major.to_ascii_lowercase());
            out.push('/');
            out.push_str(&sub.to_ascii_lowercase());
        }
    }

    for (name, value) in params {
        if !is_token(name) {
            return None;
        }
        out.push_str("; ");
        out.push_str(&name.to_ascii_lowercase());

        let needs_escaping = value.bytes().any(|b| b >= 0x7f || (b < 0x20 && b != b'\t'));
        if needs_escaping {
            out.push_str("*=utf-8''");
            for b in value.bytes() {
                if b <= 0x20 || b >= 0x7f || b"*'%".contains(&b) || is_tspecial(b) {
                    out.push_str(&format!("%{b:02X}"));
                } else {
                    out.push(b as char);
                }
            }
            continue;
        }

        out.push('=');
        if !value.is_empty() && value.bytes().all(is_token_char) {
            out.push_str(value);
            continue;
        }
        out.push('"');
        for c in value.chars() {
            if c == '"' || c == '\\' {
                out.push('\\');
            }
            out.push(c);
        }
        out.push('"');
    }
    Some(out)
}

fn parse_value(s: &str) -> Option<(String, &str)> {
    let s = s.trim_start();
    if let Some(quoted) = s.strip_prefix('"') {
        let mut val = String::new();
        let mut chars = quoted.char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '\\' => {
                    if let Some((_, escaped)) = chars.next() {
                        val.push(escaped);
                    }
                }
                '"' => return Some((val, &quoted[i + 1..])),
                _ => val.push(c),
            }
        }
        // unterminated: take what we have
        return Some((val, ""));
    }
    let end = s.find(';').unwrap_or(s.len());
    let val = s[..end].trim();
    if val.is_empty() {
        return None;
    }
    Some((val.to_string(), &s[end..]))
}

fn split_extended(val: &str) -> Option<(&str, &str)> {
    let (charset, rest) = val.split_once('\'')?;
    let (_lang, data) = rest.split_once('\'')?;
    Some((charset, data))
}

fn decode_extended(val: &str) -> String {
    match split_extended(val) {
        Some((charset, data)) => decode_bytes(charset, &percent_decode(data)),
        None => val.to_string(),
    }
}

fn percent_decode(s: &str) -> Vec<u8> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if let Some(b) = hex_pair(bytes.get(i + 1), bytes.get(i + 2)) {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    out
}

fn decode_bytes(charset: &str, raw: &[u8]) -> String {
    if charset.is_empty() || charset.eq_ignore_ascii_case("utf-8") {
        return String::from_utf8_lossy(raw).into_owned();
    }
    match encoding_rs::Encoding::for_label(charset.as_bytes()) {
        Some(enc) => enc.decode(raw).0.into_owned(),
        None => String::from_utf8_lossy(raw).into_owned(),
    }
}

fn valid_media(media: &str) -> bool {
    match media.split_once('/') {
        Some((major, sub)) => is_token(major) && is_token(sub),
        None => is_token(media),
    }
}

fn is_tspecial(b: u8) -> bool {
    b"()<>@,;:\\\"/[]?=".contains(&b)
}

fn is_token_char(b: u8) -> bool {
    b > 0x20 && b < 0x7f && !is_tspecial(b)
}

pub(crate) fn is_token(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(is_token_char)
}
