//! Security collaborator interface
//!
//! Cryptography lives outside this crate. The object store asks a
//! [`SecurityProvider`] for a handler once, from the trailer's `Encrypt`
//! dictionary and first file identifier, and then calls the handler per object:
//! strings and stream bodies are decrypted on load and re-encrypted on save.

use crate::objects::{Dictionary, ObjectId};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum SecurityError {
    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Unsupported security handler: {0}")]
    Unsupported(String),

    #[error("Security handler failure: {0}")]
    Failed(String),
}

/// Per-object decryption and encryption for one document.
pub trait SecurityHandler: Send + Sync {
    fn decrypt(&self, id: ObjectId, data: &[u8]) -> Result<Vec<u8>, SecurityError>;

    fn encrypt(&self, id: ObjectId, data: &[u8]) -> Result<Vec<u8>, SecurityError>;

    /// Whether string values are encrypted (crypt filter `StrF` is not Identity).
    fn encrypts_strings(&self) -> bool {
        true
    }

    /// Whether stream bodies are encrypted (crypt filter `StmF` is not Identity).
    fn encrypts_streams(&self) -> bool {
        true
    }
}

/// Builds a [`SecurityHandler`] from the document's key material.
pub trait SecurityProvider: Send + Sync {
    fn handler_for(
        &self,
        encrypt: &Dictionary,
        file_id: Option<&[u8]>,
    ) -> Result<Arc<dyn SecurityHandler>, SecurityError>;
}

impl<F> SecurityProvider for F
where
    F: Fn(&Dictionary, Option<&[u8]>) -> Result<Arc<dyn SecurityHandler>, SecurityError>
        + Send
        + Sync,
{
    fn handler_for(
        &self,
        encrypt: &Dictionary,
        file_id: Option<&[u8]>,
    ) -> Result<Arc<dyn SecurityHandler>, SecurityError> {
        self(encrypt, file_id)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::objects::Object;

    /// Toy handler: XOR with a key derived from the object number.
    pub(crate) struct XorHandler;

    impl XorHandler {
        fn apply(id: ObjectId, data: &[u8]) -> Vec<u8> {
            let key = (id.number() as u8) ^ 0x5A;
            data.iter().map(|b| b ^ key).collect()
        }
    }

    impl SecurityHandler for XorHandler {
        fn decrypt(&self, id: ObjectId, data: &[u8]) -> Result<Vec<u8>, SecurityError> {
            Ok(Self::apply(id, data))
        }

        fn encrypt(&self, id: ObjectId, data: &[u8]) -> Result<Vec<u8>, SecurityError> {
            Ok(Self::apply(id, data))
        }
    }

    pub(crate) fn xor_provider(
        encrypt: &Dictionary,
        _file_id: Option<&[u8]>,
    ) -> Result<Arc<dyn SecurityHandler>, SecurityError> {
        match encrypt.get_name("Filter") {
            Some("Xor") => Ok(Arc::new(XorHandler)),
            Some(other) => Err(SecurityError::Unsupported(other.to_string())),
            None => Err(SecurityError::AuthenticationFailed),
        }
    }

    #[test]
    fn test_closure_provider() {
        let mut encrypt = Dictionary::new();
        encrypt.set("Filter", Object::Name("Xor".into()));
        let handler = xor_provider.handler_for(&encrypt, None).unwrap();

        let id = ObjectId::new(3, 0);
        let sealed = handler.encrypt(id, b"secret").unwrap();
        assert_ne!(sealed, b"secret");
        assert_eq!(handler.decrypt(id, &sealed).unwrap(), b"secret");
    }

    #[test]
    fn test_provider_rejects_unknown_filter() {
        let mut encrypt = Dictionary::new();
        encrypt.set("Filter", Object::Name("Standard".into()));
        assert!(matches!(
            xor_provider.handler_for(&encrypt, None),
            Err(SecurityError::Unsupported(_))
        ));
    }
}
