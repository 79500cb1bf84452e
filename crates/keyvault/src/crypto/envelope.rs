//! The [`Envelope`] triple and its base64 wire form.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use common::protocol::EnvelopeWire;

use super::cipher::CipherError;

/// Byte length of the GCM initialisation vector (16 bytes = 128 bits).
pub const IV_LEN: usize = 16;

/// Byte length of the GCM authentication tag (16 bytes = 128 bits).
pub const TAG_LEN: usize = 16;

/// Output of a single encryption: ciphertext, the IV it used, and its tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub ciphertext: Vec<u8>,
    pub iv: [u8; IV_LEN],
    pub tag: [u8; TAG_LEN],
}

impl Envelope {
    /// Encode to the JSON wire representation.
    pub fn to_wire(&self) -> EnvelopeWire {
        EnvelopeWire {
            ciphertext: STANDARD.encode(&self.ciphertext),
            iv: STANDARD.encode(self.iv),
            tag: STANDARD.encode(self.tag),
        }
    }

    /// Decode from the JSON wire representation.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::InvalidEnvelope`] if any field is not valid base64
    /// or if `iv` / `tag` do not decode to exactly 16 bytes.
    pub fn from_wire(wire: &EnvelopeWire) -> Result<Self, CipherError> {
        let ciphertext = decode_field("ciphertext", &wire.ciphertext)?;
        let iv = fixed::<IV_LEN>("iv", &wire.iv)?;
        let tag = fixed::<TAG_LEN>("tag", &wire.tag)?;
        Ok(Self {
            ciphertext,
            iv,
            tag,
        })
    }
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>, CipherError> {
    STANDARD
        .decode(value)
        .map_err(|_| CipherError::InvalidEnvelope(format!("{name} is not valid base64")))
}

fn fixed<const N: usize>(name: &str, value: &str) -> Result<[u8; N], CipherError> {
    let bytes = decode_field(name, value)?;
    bytes.try_into().map_err(|b: Vec<u8>| {
        CipherError::InvalidEnvelope(format!("{name} must be {N} bytes, got {}", b.len()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Envelope {
        Envelope {
            ciphertext: b"opaque".to_vec(),
            iv: [1u8; IV_LEN],
            tag: [2u8; TAG_LEN],
        }
    }

    #[test]
    fn wire_round_trip() {
        let e = sample();
        assert_eq!(Envelope::from_wire(&e.to_wire()).unwrap(), e);
    }

    #[test]
    fn rejects_short_iv() {
        let mut wire = sample().to_wire();
        wire.iv = STANDARD.encode([0u8; 12]);
        let err = Envelope::from_wire(&wire).unwrap_err();
        assert!(err.to_string().contains("iv must be 16 bytes, got 12"));
    }

    #[test]
    fn rejects_long_tag() {
        let mut wire = sample().to_wire();
        wire.tag = STANDARD.encode([0u8; 17]);
        assert!(Envelope::from_wire(&wire).is_err());
    }

    #[test]
    fn rejects_bad_base64() {
        let mut wire = sample().to_wire();
        wire.ciphertext = "!!!".into();
        assert!(matches!(
            Envelope::from_wire(&wire),
            Err(CipherError::InvalidEnvelope(_))
        ));
    }

    #[test]
    fn empty_ciphertext_is_accepted() {
        let mut e = sample();
        e.ciphertext.clear();
        assert_eq!(Envelope::from_wire(&e.to_wire()).unwrap().ciphertext, b"");
    }
}
