//! Lookup key normalization
//!
//! Extensions and MIME types are matched case-insensitively. Every key is
//! normalized the same way on bind and on resolve, so hash lookups stay
//! exact.

/// `".PY"` → `"py"`, `"tar.gz"` stays `"tar.gz"`
///
/// Returns `None` when nothing usable remains.
pub fn normalize_extension(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_start_matches('.');
    if trimmed.is_empty() || trimmed.contains(['/', '\\']) || trimmed.contains(char::is_whitespace)
    {
        return None;
    }
    Some(trimmed.to_lowercase())
}

/// `"Text/X-Python; charset=utf-8"` → `"text/x-python"`
pub fn normalize_mime_type(raw: &str) -> Option<String> {
    let essence = raw.split(';').next().unwrap_or_default().trim();
    let (kind, subtype) = essence.split_once('/')?;
    let (kind, subtype) = (kind.trim(), subtype.trim());
    if kind.is_empty()
        || subtype.is_empty()
        || subtype.contains('/')
        || essence.contains(char::is_whitespace)
    {
        return None;
    }
    Some(format!("{}/{}", kind.to_lowercase(), subtype.to_lowercase()))
}

/// Extension of the last path component: `"src/Main.RS"` → `"rs"`
///
/// Dotfiles without a further dot (`".bashrc"`) have no extension.
pub fn extension_of(file_name: &str) -> Option<String> {
    let name = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    let (stem, extension) = name.rsplit_once('.')?;
    if stem.is_empty() {
        return None;
    }
    normalize_extension(extension)
}
