//! MIME type <-> file extension mapping.

/// MIME type of directories in document rows.
pub const MIME_TYPE_DIR: &str = "vnd.android.document/directory";

/// Fallback for files whose type cannot be guessed.
pub const MIME_TYPE_BINARY: &str = "application/octet-stream";

// mime_guess lists extensions alphabetically, which picks odd ones for common
// types (`jfif` for JPEG). These win when present.
const PREFERRED_EXTENSIONS: &[(&str, &str)] = &[
    ("application/json", "json"),
    ("application/pdf", "pdf"),
    ("application/zip", "zip"),
    ("audio/mpeg", "mp3"),
    ("audio/ogg", "ogg"),
    ("image/gif", "gif"),
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/webp", "webp"),
    ("text/csv", "csv"),
    ("text/html", "html"),
    ("text/markdown", "md"),
    ("text/plain", "txt"),
    ("video/mp4", "mp4"),
];

/// Preferred extension for a MIME type, if it is known.
pub fn extension_for(mime_type: &str) -> Option<String> {
    let mime_type = mime_type.trim().to_ascii_lowercase();
    if let Some((_, ext)) = PREFERRED_EXTENSIONS.iter().find(|(m, _)| *m == mime_type) {
        return Some((*ext).to_string());
    }
    mime_guess::get_mime_extensions_str(&mime_type)
        .and_then(|exts| exts.first())
        .map(|ext| (*ext).to_string())
}

/// MIME type guessed from a file name's extension.
pub fn mime_for_name(name: &str) -> String {
    match name.rfind('.') {
        Some(dot) => mime_guess::from_ext(&name[dot + 1..])
            .first_raw()
            .unwrap_or(MIME_TYPE_BINARY)
            .to_string(),
        None => MIME_TYPE_BINARY.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_for_common_types() {
        assert_eq!(extension_for("text/plain").as_deref(), Some("txt"));
        assert_eq!(extension_for("image/jpeg").as_deref(), Some("jpg"));
        assert_eq!(extension_for("IMAGE/PNG").as_deref(), Some("png"));
    }

    #[test]
    fn test_extension_for_unknown() {
        assert_eq!(extension_for("application/x-made-up-thing"), None);
        assert_eq!(extension_for(MIME_TYPE_DIR), None);
    }

    #[test]
    fn test_mime_for_name() {
        assert_eq!(mime_for_name("photo.png"), "image/png");
        assert_eq!(mime_for_name("notes.txt"), "text/plain");
        assert_eq!(mime_for_name("README"), MIME_TYPE_BINARY);
        assert_eq!(mime_for_name("blob.zzzunknown"), MIME_TYPE_BINARY);
    }
}
