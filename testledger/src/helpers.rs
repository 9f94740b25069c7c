// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! General support code for testledger.

use xxhash_rust::xxh3::xxh3_128;

/// Hashes a string into 32 lowercase hex characters.
///
/// This is used for every derived identifier (history IDs, test case IDs and
/// attachment IDs), so it must stay fixed for history files to remain
/// comparable across versions.
pub(crate) fn hash_str(input: &str) -> String {
    format!("{:032x}", xxh3_128(input.as_bytes()))
}

/// MIME type detection for attachments.
pub(crate) mod content_type {
    use camino::Utf8Path;

    /// The number of leading bytes inspected by [`sniff`].
    pub(crate) const SNIFF_LEN: usize = 512;

    // Extensions without the leading dot. The first entry for a MIME type is
    // the one used when deriving an extension from a MIME type.
    static EXTENSIONS: &[(&str, &str)] = &[
        ("png", "image/png"),
        ("jpg", "image/jpeg"),
        ("jpeg", "image/jpeg"),
        ("gif", "image/gif"),
        ("webp", "image/webp"),
        ("bmp", "image/bmp"),
        ("svg", "image/svg+xml"),
        ("tiff", "image/tiff"),
        ("pdf", "application/pdf"),
        ("zip", "application/zip"),
        ("gz", "application/gzip"),
        ("json", "application/json"),
        ("xml", "application/xml"),
        ("yaml", "application/yaml"),
        ("yml", "application/yaml"),
        ("js", "text/javascript"),
        ("html", "text/html"),
        ("htm", "text/html"),
        ("css", "text/css"),
        ("csv", "text/csv"),
        ("tsv", "text/tab-separated-values"),
        ("txt", "text/plain"),
        ("log", "text/plain"),
        ("uri", "text/uri-list"),
        ("mp4", "video/mp4"),
        ("webm", "video/webm"),
        ("ogg", "video/ogg"),
    ];

    /// Returns the extension of `file_name` with its leading dot, e.g. `.png`.
    pub(crate) fn extension_of(file_name: &str) -> Option<String> {
        Utf8Path::new(file_name)
            .extension()
            .filter(|ext| !ext.is_empty())
            .map(|ext| format!(".{ext}"))
    }

    /// Looks up the MIME type for an extension, with or without the leading dot.
    pub(crate) fn for_extension(ext: &str) -> Option<&'static str> {
        let ext = ext.strip_prefix('.').unwrap_or(ext);
        EXTENSIONS
            .iter()
            .find(|(known, _)| known.eq_ignore_ascii_case(ext))
            .map(|(_, content_type)| *content_type)
    }

    /// Returns the conventional extension for a MIME type, with the leading dot.
    pub(crate) fn extension_for(content_type: &str) -> Option<String> {
        // Ignore parameters like `; charset=utf-8`.
        let essence = content_type.split(';').next().unwrap_or_default().trim();
        EXTENSIONS
            .iter()
            .find(|(_, known)| known.eq_ignore_ascii_case(essence))
            .map(|(ext, _)| format!(".{ext}"))
    }

    /// Guesses the MIME type from the first bytes of a file.
    pub(crate) fn sniff(head: &[u8]) -> Option<&'static str> {
        const SIGNATURES: &[(&[u8], &str)] = &[
            (b"\x89PNG\r\n\x1a\n", "image/png"),
            (b"\xff\xd8\xff", "image/jpeg"),
            (b"GIF87a", "image/gif"),
            (b"GIF89a", "image/gif"),
            (b"%PDF-", "application/pdf"),
            (b"PK\x03\x04", "application/zip"),
            (b"\x1f\x8b", "application/gzip"),
            (b"BM", "image/bmp"),
        ];

        if let Some((_, content_type)) = SIGNATURES
            .iter()
            .find(|(signature, _)| head.starts_with(signature))
        {
            return Some(content_type);
        }
        if head.len() >= 12 && &head[..4] == b"RIFF" && &head[8..12] == b"WEBP" {
            return Some("image/webp");
        }

        let text = utf8_prefix(head)?;
        if text.contains('\0') {
            return None;
        }
        let text = text.trim_start_matches('\u{feff}').trim_start();
        let lower = text
            .get(..text.len().min(256))
            .unwrap_or(text)
            .to_ascii_lowercase();
        if lower.starts_with("<svg") || (lower.starts_with("<?xml") && lower.contains("<svg")) {
            Some("image/svg+xml")
        } else if lower.starts_with("<?xml") {
            Some("application/xml")
        } else if lower.starts_with("<!doctype html") || lower.starts_with("<html") {
            Some("text/html")
        } else if lower.starts_with('{') || lower.starts_with('[') {
            Some("application/json")
        } else {
            Some("text/plain")
        }
    }

    /// Returns `head` as a string if it is valid UTF-8, tolerating a code
    /// point cut off at the end of the sample.
    fn utf8_prefix(head: &[u8]) -> Option<&str> {
        match std::str::from_utf8(head) {
            Ok(text) => Some(text),
            Err(error) if error.error_len().is_none() => {
                std::str::from_utf8(&head[..error.valid_up_to()]).ok()
            }
            Err(_) => None,
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use test_case::test_case;

        #[test_case(b"\x89PNG\r\n\x1a\n\0\0", Some("image/png"); "png")]
        #[test_case(b"RIFF\0\0\0\0WEBPVP8 ", Some("image/webp"); "webp")]
        #[test_case(b"%PDF-1.7", Some("application/pdf"); "pdf")]
        #[test_case(b"  <svg xmlns=\"http://www.w3.org/2000/svg\"/>", Some("image/svg+xml"); "svg")]
        #[test_case(b"<?xml version=\"1.0\"?><testsuite/>", Some("application/xml"); "xml")]
        #[test_case(b"<!DOCTYPE html><html></html>", Some("text/html"); "html")]
        #[test_case(b"{\"a\": 1}", Some("application/json"); "json")]
        #[test_case(b"hello world\n", Some("text/plain"); "text")]
        #[test_case(b"caf\xc3", Some("text/plain"); "truncated code point")]
        #[test_case(b"\xff\xfe\xfd\x00", None; "binary")]
        fn sniffing(head: &[u8], expected: Option<&str>) {
            assert_eq!(sniff(head), expected);
        }

        #[test]
        fn extension_tables() {
            assert_eq!(for_extension(".PNG"), Some("image/png"));
            assert_eq!(for_extension("txt"), Some("text/plain"));
            assert_eq!(for_extension(".unknown"), None);
            assert_eq!(
                extension_for("text/plain; charset=utf-8").as_deref(),
                Some(".txt")
            );
            assert_eq!(extension_for("image/jpeg").as_deref(), Some(".jpg"));
            assert_eq!(extension_of("shot.final.png").as_deref(), Some(".png"));
            assert_eq!(extension_of("README"), None);
        }
    }
}
