//! Attachment naming: original filenames, file extensions and store ids.

use crate::parser::header::decode_encoded_words;
use crate::parser::mediatype::Params;

/// Canonical extensions per MIME type, preferred first.
const MIME_EXTENSIONS: &[(&str, &[&str])] = &[
    ("text/plain", &["txt", "text", "log", "asc"]),
    ("text/html", &["html", "htm"]),
    ("text/css", &["css"]),
    ("text/csv", &["csv"]),
    ("text/markdown", &["md", "markdown"]),
    ("text/xml", &["xml"]),
    ("text/x-diff", &["diff", "patch"]),
    ("image/jpeg", &["jpg", "jpeg", "jpe"]),
    ("image/png", &["png"]),
    ("image/gif", &["gif"]),
    ("image/webp", &["webp"]),
    ("image/avif", &["avif"]),
    ("image/jxl", &["jxl"]),
    ("image/bmp", &["bmp"]),
    ("image/tiff", &["tiff", "tif"]),
    ("image/svg+xml", &["svg"]),
    ("image/x-icon", &["ico"]),
    ("audio/mpeg", &["mp3", "mpga"]),
    ("audio/ogg", &["ogg", "oga", "opus"]),
    ("audio/flac", &["flac"]),
    ("audio/wav", &["wav"]),
    ("audio/aac", &["aac"]),
    ("audio/mp4", &["m4a"]),
    ("video/mp4", &["mp4", "m4v"]),
    ("video/webm", &["webm"]),
    ("video/ogg", &["ogv"]),
    ("video/x-matroska", &["mkv"]),
    ("video/quicktime", &["mov"]),
    ("application/pdf", &["pdf"]),
    ("application/zip", &["zip"]),
    ("application/gzip", &["gz"]),
    ("application/x-tar", &["tar"]),
    ("application/x-7z-compressed", &["7z"]),
    ("application/vnd.rar", &["rar"]),
    ("application/json", &["json"]),
    ("application/xml", &["xml"]),
    ("application/epub+zip", &["epub"]),
    ("application/x-bittorrent", &["torrent"]),
    ("application/pgp-signature", &["sig", "asc"]),
    ("application/octet-stream", &["bin"]),
    ("message/rfc822", &["eml"]),
];

/// Extension spellings replaced by their preferred form.
const PREFERRED_EXTENSIONS: &[(&str, &str)] = &[
    ("jpeg", "jpg"),
    ("jpe", "jpg"),
    ("htm", "html"),
    ("tif", "tiff"),
    ("mpga", "mp3"),
    ("oga", "ogg"),
    ("text", "txt"),
    ("markdown", "md"),
];

/// Known extensions for a MIME type, preferred first.
pub fn extensions_by_type(content_type: &str) -> &'static [&'static str] {
    MIME_EXTENSIONS
        .iter()
        .find(|(t, _)| t.eq_ignore_ascii_case(content_type))
        .map(|(_, exts)| *exts)
        .unwrap_or(&[])
}

/// Whether `ext` is a known extension for `content_type`.
pub fn is_canonical(ext: &str, content_type: &str) -> bool {
    extensions_by_type(content_type)
        .iter()
        .any(|e| e.eq_ignore_ascii_case(ext))
}

/// Lowercase and map alternate spellings (`jpeg` → `jpg`, `htm` → `html`).
pub fn preferred_extension(ext: &str) -> String {
    let lower = ext.to_ascii_lowercase();
    PREFERRED_EXTENSIONS
        .iter()
        .find(|(alt, _)| *alt == lower)
        .map(|(_, pref)| (*pref).to_string())
        .unwrap_or(lower)
}

/// Naming decided for one attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentName {
    /// Extension for the stored file, possibly empty.
    pub ext: String,
    /// Original filename as sent, possibly empty.
    pub original: String,
    /// Content type, `text/plain` when none was declared.
    pub content_type: String,
}

/// Work out the original filename, the extension and the effective
/// content type of an attachment part.
///
/// The filename comes from the disposition `filename` parameter, else the
/// content-type `name` parameter, with encoded-words decoded and any path
/// stripped. Its extension is used only when it is plausible for the
/// declared type; otherwise the canonical extension for the type is used,
/// with `txt` for text and multipart and `eml` for messages as fallbacks.
pub fn attachment_info(content_type: &str, ct_params: &Params, disp_params: &Params) -> AttachmentName {
    let mut original = disp_params
        .get("filename")
        .filter(|s| !s.is_empty())
        .or_else(|| ct_params.get("name").filter(|s| !s.is_empty()))
        .map(|s| decode_encoded_words(s))
        .unwrap_or_default();
    if let Some(i) = original.rfind('/') {
        original = original[i + 1..].to_string();
    }

    let mut ext = String::new();
    if let Some(i) = original.rfind('.') {
        let candidate = &original[i + 1..];
        if !candidate.is_empty()
            && !candidate.contains(['\\', ':', '*', '"', '?', '<', '>', '|'])
            && !candidate.chars().any(char::is_control)
        {
            ext = candidate.to_string();
        }
    }

    let content_type = if content_type.is_empty() {
        "text/plain".to_string()
    } else {
        content_type.to_string()
    };

    if ext.is_empty() || !is_canonical(&ext, &content_type) {
        if let Some(first) = extensions_by_type(&content_type).first() {
            ext = (*first).to_string();
        }
    }
    if ext.is_empty() && content_type.starts_with("text/") {
        ext = "txt".to_string();
    }
    if ext.is_empty() {
        if content_type.starts_with("multipart/") {
            ext = "txt".to_string();
        } else if content_type.starts_with("message/") {
            ext = "eml".to_string();
        }
    }
    if !ext.is_empty() {
        ext = preferred_extension(&ext);
    }

    AttachmentName {
        ext,
        original,
        content_type,
    }
}

/// Content-store id: `<hash>.<ext>`, or just the hash without an extension.
pub fn store_id(hash_hex: &str, ext: &str) -> String {
    if ext.is_empty() {
        hash_hex.to_string()
    } else {
        format!("{hash_hex}.{ext}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_filename_from_disposition() {
        let info = attachment_info(
            "image/png",
            &params(&[("name", "other.png")]),
            &params(&[("filename", "dir/pic.PNG")]),
        );
        assert_eq!(info.original, "pic.PNG");
        assert_eq!(info.ext, "png");
    }

    #[test]
    fn test_non_canonical_extension_replaced() {
        let info = attachment_info("image/jpeg", &params(&[("name", "photo.exe")]), &Params::new());
        assert_eq!(info.ext, "jpg");
        assert_eq!(info.original, "photo.exe");
    }

    #[test]
    fn test_unknown_type_keeps_filename_extension() {
        let info = attachment_info(
            "application/x-weird",
            &Params::new(),
            &params(&[("filename", "data.xyz")]),
        );
        assert_eq!(info.ext, "xyz");
    }

    #[test]
    fn test_suspicious_extension_dropped() {
        let info = attachment_info(
            "application/x-weird",
            &Params::new(),
            &params(&[("filename", "data.x?z")]),
        );
        assert_eq!(info.ext, "");
    }

    #[test]
    fn test_fallbacks() {
        assert_eq!(attachment_info("", &Params::new(), &Params::new()).ext, "txt");
        assert_eq!(
            attachment_info("", &Params::new(), &Params::new()).content_type,
            "text/plain"
        );
        assert_eq!(attachment_info("text/x-rust", &Params::new(), &Params::new()).ext, "txt");
        assert_eq!(attachment_info("message/news", &Params::new(), &Params::new()).ext, "eml");
        assert_eq!(attachment_info("multipart/x", &Params::new(), &Params::new()).ext, "txt");
    }

    #[test]
    fn test_encoded_filename() {
        let info = attachment_info(
            "text/plain",
            &Params::new(),
            &params(&[("filename", "=?UTF-8?B?0YTQsNC50LsudHh0?=")]),
        );
        assert_eq!(info.original, "файл.txt");
        assert_eq!(info.ext, "txt");
    }

    #[test]
    fn test_preferred_extension() {
        assert_eq!(preferred_extension("JPEG"), "jpg");
        assert_eq!(preferred_extension("htm"), "html");
        assert_eq!(preferred_extension("png"), "png");
    }

    #[test]
    fn test_store_id() {
        assert_eq!(store_id("ab12", "png"), "ab12.png");
        assert_eq!(store_id("ab12", ""), "ab12");
    }
}
