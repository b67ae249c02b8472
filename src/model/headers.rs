//! Header map keyed by canonical header name.

use std::collections::btree_map::{self, BTreeMap};

use serde::{Deserialize, Serialize};

/// Names whose canonical spelling differs from plain Title-Case.
const CANONICAL_OVERRIDES: &[(&str, &str)] = &[
    ("Message-Id", "Message-ID"),
    ("Content-Id", "Content-ID"),
    ("List-Id", "List-ID"),
    ("Mime-Version", "MIME-Version"),
    ("Nntp-Posting-Date", "NNTP-Posting-Date"),
    ("Nntp-Posting-Host", "NNTP-Posting-Host"),
    ("X-Encrypted-Ip", "X-Encrypted-IP"),
    ("X-Pubkey-Ed25519", "X-PubKey-Ed25519"),
    ("X-Frontend-Pubkey", "X-Frontend-PubKey"),
];

/// Canonicalize a header name: `content-TYPE` → `Content-Type`,
/// `message-id` → `Message-ID`.
pub fn canonical_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = true;
    for c in name.chars() {
        if upper {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c.to_ascii_lowercase());
        }
        upper = c == '-';
    }
    CANONICAL_OVERRIDES
        .iter()
        .find(|(plain, _)| *plain == out)
        .map(|(_, canon)| (*canon).to_string())
        .unwrap_or(out)
}

/// Ordered multi-valued header map.
///
/// Names are stored canonicalized, so every lookup is case-insensitive.
/// Values keep their arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(BTreeMap<String, Vec<String>>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value, keeping earlier values for the same name.
    pub fn append(&mut self, name: &str, value: impl Into<String>) {
        self.0
            .entry(canonical_name(name))
            .or_default()
            .push(value.into());
    }

    /// Replace all values for `name` with a single one.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.0.insert(canonical_name(name), vec![value.into()]);
    }

    pub fn get_first(&self, name: &str) -> Option<&str> {
        self.0
            .get(&canonical_name(name))
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    pub fn get_all(&self, name: &str) -> &[String] {
        self.0
            .get(&canonical_name(name))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(&canonical_name(name))
    }

    /// Remove every value for `name`, returning them.
    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        self.0.remove(&canonical_name(name))
    }

    /// Remove `name` and return its first value, trimmed; empty values count as absent.
    pub fn take_first(&mut self, name: &str) -> Option<String> {
        self.remove(name)
            .and_then(|v| v.into_iter().next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate names in alphabetical order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, Vec<String>> {
        self.0.iter()
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = (&'a String, &'a Vec<String>);
    type IntoIter = btree_map::Iter<'a, String, Vec<String>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
