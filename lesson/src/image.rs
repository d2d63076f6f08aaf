use base64::{engine::general_purpose, Engine};

const FALLBACK_MIME: &str = "image/jpeg";

/// Image currently shown to the learner, along with its base64 form.
#[derive(Clone)]
pub struct LessonImage {
    name: String,
    mime: String,
    bytes: Vec<u8>,
    encoded: String,
}

impl LessonImage {
    /// Wrap uploaded bytes. When `mime` is missing or not an image type it is
    /// sniffed from the leading bytes.
    pub fn new(name: impl Into<String>, mime: Option<&str>, bytes: Vec<u8>) -> Self {
        let mime = match mime {
            Some(m) if m.starts_with("image/") => m.to_string(),
            _ => sniff_mime(&bytes).to_string(),
        };
        let encoded = general_purpose::STANDARD.encode(&bytes);
        Self {
            name: name.into(),
            mime,
            bytes,
            encoded,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Base64 payload without any prefix.
    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    /// Inline `data:` URL accepted by vision chat endpoints.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, self.encoded)
    }
}

impl std::fmt::Debug for LessonImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LessonImage")
            .field("name", &self.name)
            .field("mime", &self.mime)
            .field("len", &self.bytes.len())
            .finish()
    }
}

fn sniff_mime(bytes: &[u8]) -> &'static str {
    match bytes {
        [0x89, b'P', b'N', b'G', ..] => "image/png",
        [0xFF, 0xD8, 0xFF, ..] => "image/jpeg",
        [b'G', b'I', b'F', b'8', ..] => "image/gif",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "image/webp",
        _ => FALLBACK_MIME,
    }
}
