use std::collections::HashMap;
use std::path::Path;

use mime_guess::{mime, Mime};

/// Maps file extensions to the `Content-Type` sent with them.
///
/// Extensions are matched case-insensitively, without the leading dot.
/// Lookups fall back to [`mime_guess`] and finally to
/// `application/octet-stream`, so every response carries a content type.
#[derive(Debug, Clone)]
pub struct ContentTypes {
    table: HashMap<String, Mime>,
}

impl ContentTypes {
    /// A table with no entries; every lookup goes to the fallbacks.
    pub fn empty() -> Self {
        ContentTypes { table: HashMap::new() }
    }

    /// Add or replace the content type for `extension`.
    pub fn insert(&mut self, extension: &str, content_type: Mime) -> &mut Self {
        let extension = extension.trim_start_matches('.').to_ascii_lowercase();
        self.table.insert(extension, content_type);
        self
    }

    pub fn lookup(&self, path: &Path) -> Mime {
        let Some(extension) = path.extension().and_then(|ext| ext.to_str()) else {
            return mime::APPLICATION_OCTET_STREAM;
        };

        if let Some(content_type) = self.table.get(&extension.to_ascii_lowercase()) {
            return content_type.clone();
        }

        mime_guess::from_ext(extension)
            .first()
            .unwrap_or(mime::APPLICATION_OCTET_STREAM)
    }
}

impl Default for ContentTypes {
    fn default() -> Self {
        let mut types = ContentTypes::empty();
        let builtin = [
            ("mp4", "video/mp4"),
            ("m4v", "video/mp4"),
            ("webm", "video/webm"),
            ("mkv", "video/x-matroska"),
            ("mp3", "audio/mpeg"),
            ("m4a", "audio/mp4"),
            ("ogg", "audio/ogg"),
            ("wav", "audio/wav"),
            ("html", "text/html"),
        ];
        for (extension, content_type) in builtin {
            if let Ok(content_type) = content_type.parse() {
                types.insert(extension, content_type);
            }
        }
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(types: &ContentTypes, path: &str) -> String {
        types.lookup(Path::new(path)).to_string()
    }

    #[test]
    fn test_builtin_media_types() {
        let types = ContentTypes::default();
        assert_eq!("video/mp4", lookup(&types, "client/party.mp4"));
        assert_eq!("audio/mpeg", lookup(&types, "client/bling.mp3"));
        assert_eq!("text/html", lookup(&types, "client/index.html"));
        assert_eq!("video/x-matroska", lookup(&types, "film.MKV"));
    }

    #[test]
    fn test_unknown_extension_defaults_to_octet_stream() {
        let types = ContentTypes::default();
        assert_eq!("application/octet-stream", lookup(&types, "data.zzzunknown"));
        assert_eq!("application/octet-stream", lookup(&types, "README"));
    }

    #[test]
    fn test_falls_back_to_mime_guess() {
        let types = ContentTypes::empty();
        assert_eq!("image/png", lookup(&types, "cover.png"));
    }

    #[test]
    fn test_insert_overrides() {
        let mut types = ContentTypes::default();
        types.insert(".MP4", "application/mp4".parse().unwrap());
        assert_eq!("application/mp4", lookup(&types, "party.mp4"));
    }
}
