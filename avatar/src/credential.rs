use base64::{engine::general_purpose, Engine};

use crate::error::AvatarError;

/// How the configured avatar credential is written.
///
/// This is always stated by configuration; the credential text itself is never
/// inspected to guess it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CredentialEncoding {
    /// Plain `identifier:secret`, encoded when the header is built.
    #[default]
    Raw,
    /// Already base64 encoded, used verbatim.
    Encoded,
}

/// Credential for the avatar vendor's basic-auth scheme.
#[derive(Clone)]
pub struct AvatarCredential {
    value: String,
    encoding: CredentialEncoding,
}

impl AvatarCredential {
    pub fn new(value: impl Into<String>, encoding: CredentialEncoding) -> Result<Self, AvatarError> {
        let value = value.into().trim().to_string();
        if value.is_empty() {
            return Err(AvatarError::Credential("empty"));
        }
        Ok(Self { value, encoding })
    }

    /// Value for the `Authorization` header.
    pub fn authorization(&self) -> String {
        match self.encoding {
            CredentialEncoding::Raw => {
                format!("Basic {}", general_purpose::STANDARD.encode(&self.value))
            }
            CredentialEncoding::Encoded => format!("Basic {}", self.value),
        }
    }
}

impl std::fmt::Debug for AvatarCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvatarCredential")
            .field("encoding", &self.encoding)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_credential_is_encoded() {
        let c = AvatarCredential::new("user:secret", CredentialEncoding::Raw).unwrap();
        assert_eq!(c.authorization(), "Basic dXNlcjpzZWNyZXQ=");
    }

    #[test]
    fn encoded_credential_is_used_verbatim() {
        let c = AvatarCredential::new("dXNlcjpzZWNyZXQ=", CredentialEncoding::Encoded).unwrap();
        assert_eq!(c.authorization(), "Basic dXNlcjpzZWNyZXQ=");
    }

    #[test]
    fn colon_does_not_change_encoding() {
        // An already-encoded key is never re-encoded, whatever it contains.
        let c = AvatarCredential::new("a:b", CredentialEncoding::Encoded).unwrap();
        assert_eq!(c.authorization(), "Basic a:b");
        let c = AvatarCredential::new("nocolon", CredentialEncoding::Raw).unwrap();
        assert_eq!(c.authorization(), "Basic bm9jb2xvbg==");
    }

    #[test]
    fn rejects_blank() {
        assert!(AvatarCredential::new("  ", CredentialEncoding::Raw).is_err());
    }

    #[test]
    fn debug_hides_secret() {
        let c = AvatarCredential::new("user:secret", CredentialEncoding::Raw).unwrap();
        assert!(!format!("{c:?}").contains("secret"));
    }
}
