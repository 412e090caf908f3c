use std::path::Path;

use reqwest::Url;

static RESERVED_WINDOWS_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Longest file name most filesystems accept, in bytes
const MAX_FILENAME_BYTES: usize = 255;

/// Turns a title or part name into something usable as a file name on
/// Windows, Linux and Mac OS.
///
/// Characters forbidden on any of them (`\ / : * ? " < > |`) and control
/// characters become `_`. Leading and trailing whitespace and dots are
/// trimmed, reserved device names (`CON`, `aux.mp3`, ...) get a trailing `_`
/// on their stem, and the result is cut to 255 bytes on a char boundary.
pub fn cleanup_filename(input: &str) -> String {
    let replaced: String = input
        .chars()
        .map(|c| match c {
            '/' | '\\' | '?' | '*' | ':' | '|' | '"' | '<' | '>' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let mut result = replaced
        .trim_matches(|c: char| c.is_whitespace() || c == '.')
        .to_string();

    let stem_len = result.find('.').unwrap_or(result.len());
    if RESERVED_WINDOWS_NAMES
        .iter()
        .any(|name| name.eq_ignore_ascii_case(&result[..stem_len]))
    {
        result.insert(stem_len, '_');
    }

    truncate_on_char_boundary(&mut result, MAX_FILENAME_BYTES);
    result
}

/// `stem` followed by `extension`, shortening the stem so the whole name fits
/// the file name length limit.
pub fn capped_filename(stem: &str, extension: &str) -> String {
    let mut stem = stem.to_string();
    truncate_on_char_boundary(&mut stem, MAX_FILENAME_BYTES.saturating_sub(extension.len()));
    let stem = stem.trim_end_matches(|c: char| c.is_whitespace() || c == '.');
    format!("{stem}{extension}")
}

fn truncate_on_char_boundary(s: &mut String, max_bytes: usize) {
    if s.len() > max_bytes {
        let mut end = max_bytes;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s.truncate(end);
    }
}

/// Extension of the last path segment of `url`, with its leading dot, or
/// an empty string. Query and fragment are ignored.
pub fn extension_from_url(url: &str) -> String {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or_default().to_string(),
    };
    Path::new(&path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default()
}
