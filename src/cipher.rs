//! XOR codec for check-in payloads
//!
//! A place's QR code carries `"<place_id> <nonce>"` XOR-ed byte by byte with a
//! shared key. The key is reused for every payload, so this only hides the
//! payload from casual inspection; it is not a sound cipher.

use crate::error::TripError;

/// Symmetric XOR codec keyed by a fixed shared secret
#[derive(Clone)]
pub struct CipherCodec {
    key: Vec<u8>,
}

/// Decoded check-in payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckInPayload {
    pub place_id: i64,
    pub nonce: String,
}

impl CipherCodec {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into() }
    }

    pub fn key_len(&self) -> usize {
        self.key.len()
    }

    /// XOR `ciphertext` against the key prefix of the same length
    pub fn decode(&self, ciphertext: &[u8]) -> Result<Vec<u8>, TripError> {
        self.xor(ciphertext)
    }

    /// Inverse of [`decode`](Self::decode) (XOR is its own inverse)
    pub fn encode(&self, plaintext: &[u8]) -> Result<Vec<u8>, TripError> {
        self.xor(plaintext)
    }

    fn xor(&self, input: &[u8]) -> Result<Vec<u8>, TripError> {
        if input.len() > self.key.len() {
            return Err(TripError::BadInput(format!(
                "message must not be longer than the key ({} > {})",
                input.len(),
                self.key.len()
            )));
        }

        Ok(input.iter().zip(&self.key).map(|(b, k)| b ^ k).collect())
    }

    /// Decode a ciphertext and split it into place id and nonce
    pub fn decode_payload(&self, ciphertext: &[u8]) -> Result<CheckInPayload, TripError> {
        let plain = self.decode(ciphertext)?;
        parse_payload(&plain)
    }
}

impl std::fmt::Debug for CipherCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherCodec")
            .field("key_len", &self.key.len())
            .finish()
    }
}

/// Split a decoded payload into exactly two whitespace separated tokens
pub fn parse_payload(plain: &[u8]) -> Result<CheckInPayload, TripError> {
    let text = std::str::from_utf8(plain)
        .map_err(|_| TripError::BadInput("decoded payload is not valid UTF-8".to_string()))?;

    let tokens: Vec<&str> = text.split_whitespace().collect();
    let [place, nonce] = tokens.as_slice() else {
        return Err(TripError::BadInput(format!(
            "decoded payload must have 2 tokens, got {}",
            tokens.len()
        )));
    };

    let place_id = place.parse::<i64>().map_err(|_| {
        TripError::BadInput(format!("decoded payload has no valid place id: {:?}", place))
    })?;

    Ok(CheckInPayload {
        place_id,
        nonce: nonce.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> CipherCodec {
        CipherCodec::new("0123456789abcdefghijklmnopqrstuv")
    }

    #[test]
    fn test_decode_inverts_encode() {
        let codec = codec();
        for payload in ["", "1 a", "42 sdinasdiahsduia", "0123456789abcdefghijklmnopqrstuv"] {
            let cipher = codec.encode(payload.as_bytes()).unwrap();
            assert_eq!(codec.decode(&cipher).unwrap(), payload.as_bytes());
        }
    }

    #[test]
    fn test_rejects_message_longer_than_key() {
        let codec = CipherCodec::new("abc");
        let err = codec.decode(b"abcd").unwrap_err();
        assert!(matches!(err, TripError::BadInput(_)));
    }

    #[test]
    fn test_payload_parsing() {
        let codec = codec();
        let cipher = codec.encode(b"17 nonce").unwrap();
        let payload = codec.decode_payload(&cipher).unwrap();
        assert_eq!(payload.place_id, 17);
        assert_eq!(payload.nonce, "nonce");
    }

    #[test]
    fn test_payload_token_count() {
        assert!(parse_payload(b"17").is_err());
        assert!(parse_payload(b"17 a b").is_err());
        assert!(parse_payload(b"").is_err());
    }

    #[test]
    fn test_payload_place_must_be_integer() {
        let err = parse_payload(b"seventeen nonce").unwrap_err();
        assert!(matches!(err, TripError::BadInput(_)));
    }
}
