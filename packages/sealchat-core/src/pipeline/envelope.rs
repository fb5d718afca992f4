//! The sealed envelope and its JSON wire form.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::identity::validate_handle;

/// A sealed message
///
/// Serializes to exactly these seven keys:
///
/// ```text
/// {
///   "message":           original plaintext, for local display only
///   "encrypted_message": base64(IV ‖ AES-256-CBC ciphertext)
///   "message_hash":      hex SHA-256 of the plaintext
///   "signature":         hex RSA-PSS signature over message_hash
///   "certificate":       sender certificate, PEM
///   "timestamp":         RFC 3339
///   "sender":            sender handle
/// }
/// ```
///
/// Unsealing never reads `message`; it recovers the plaintext from
/// `encrypted_message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Original plaintext (local display only)
    pub message: String,
    /// Base64 IV + ciphertext
    pub encrypted_message: String,
    /// Hex digest of the plaintext
    pub message_hash: String,
    /// Hex signature over `message_hash`
    pub signature: String,
    /// Sender certificate (PEM)
    pub certificate: String,
    /// Creation time (RFC 3339)
    pub timestamp: String,
    /// Sender handle
    pub sender: String,
}

impl Envelope {
    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::SerializationError(e.to_string()))
    }

    /// Deserialize from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::InvalidEnvelope(e.to_string()))
    }

    /// File name used by [`save_to_dir`](Self::save_to_dir):
    /// `message_<YYYYmmdd_HHMMSS>_<sender>.json`
    ///
    /// Falls back to the current time for an unparseable timestamp and to
    /// `unknown` for a sender that is not a valid handle.
    pub fn file_name(&self) -> String {
        let at = crate::time::parse_rfc3339(&self.timestamp).unwrap_or_else(crate::time::now);
        let sender = if validate_handle(&self.sender).is_ok() {
            self.sender.as_str()
        } else {
            "unknown"
        };
        format!("message_{}_{}.json", crate::time::file_stamp(&at), sender)
    }

    /// Write the envelope as JSON into `dir`, returning the file path
    pub fn save_to_dir(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir).map_err(|e| Error::StorageWriteError(e.to_string()))?;
        let path = dir.join(self.file_name());
        fs::write(&path, self.to_json()?)
            .map_err(|e| Error::StorageWriteError(format!("{}: {}", path.display(), e)))?;
        tracing::debug!(path = %path.display(), "Saved envelope");
        Ok(path)
    }

    /// Read an envelope saved with [`save_to_dir`](Self::save_to_dir)
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .map_err(|e| Error::StorageReadError(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Envelope {
        Envelope {
            message: "hello".into(),
            encrypted_message: "AAAA".into(),
            message_hash: "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824".into(),
            signature: "00ff".into(),
            certificate: "-----BEGIN CERTIFICATE-----\n...\n-----END CERTIFICATE-----\n".into(),
            timestamp: "2024-05-17T14:03:09.000000Z".into(),
            sender: "carlos".into(),
        }
    }

    #[test]
    fn test_wire_shape() {
        let value: serde_json::Value = serde_json::from_str(&sample().to_json().unwrap()).unwrap();
        let obj = value.as_object().unwrap();

        let mut keys: Vec<&str> = obj.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec![
                "certificate",
                "encrypted_message",
                "message",
                "message_hash",
                "sender",
                "signature",
                "timestamp"
            ]
        );
        assert_eq!(obj["sender"], "carlos");
    }

    #[test]
    fn test_json_round_trip() {
        let env = sample();
        assert_eq!(Envelope::from_json(&env.to_json().unwrap()).unwrap(), env);
    }

    #[test]
    fn test_missing_field_is_invalid_envelope() {
        let result = Envelope::from_json(r#"{"message": "hi"}"#);
        assert!(matches!(result, Err(Error::InvalidEnvelope(_))));
    }

    #[test]
    fn test_file_name() {
        assert_eq!(sample().file_name(), "message_20240517_140309_carlos.json");

        let odd = Envelope {
            sender: "../../etc".into(),
            ..sample()
        };
        assert!(odd.file_name().ends_with("_unknown.json"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let env = sample();
        let path = env.save_to_dir(&dir.path().join("messages")).unwrap();
        assert!(path.ends_with("message_20240517_140309_carlos.json"));
        assert_eq!(Envelope::load_from_file(&path).unwrap(), env);
    }
}
