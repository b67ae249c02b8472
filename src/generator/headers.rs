//! Header block writer.

use std::io::{self, Write};

use crate::model::Headers;

/// Written first, in this order.
const LEADING: &[&str] = &[
    "Path",
    "Message-ID",
    "From",
    "Sender",
    "Reply-To",
    "Date",
    "Subject",
    "Newsgroups",
    "Followup-To",
    "References",
    "In-Reply-To",
];

/// Written last, in this order.
const TRAILING: &[&str] = &["MIME-Version", "Content-Type", "Content-Transfer-Encoding"];

/// Write `headers` as `Name: value` lines (LF endings), well-known
/// headers first, MIME headers last, everything else alphabetically in
/// between. Line breaks inside values are re-folded with a tab.
///
/// The terminating blank line is not written.
pub fn write_headers(w: &mut dyn Write, headers: &Headers) -> io::Result<()> {
    for name in LEADING {
        write_field(w, name, headers.get_all(name))?;
    }
    for (name, values) in headers {
        if !LEADING.contains(&name.as_str()) && !TRAILING.contains(&name.as_str()) {
            write_field(w, name, values)?;
        }
    }
    for name in TRAILING {
        write_field(w, name, headers.get_all(name))?;
    }
    Ok(())
}

fn write_field(w: &mut dyn Write, name: &str, values: &[String]) -> io::Result<()> {
    for value in values {
        w.write_all(name.as_bytes())?;
        w.write_all(b": ")?;
        let mut first = true;
        for line in value.split('\n') {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            if !first {
                w.write_all(b"\n\t")?;
            }
            w.write_all(line.trim_start().as_bytes())?;
            first = false;
        }
        w.write_all(b"\n")?;
    }
    Ok(())
}
