use rand::rngs::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::{Pss, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use log::debug;

use crate::Result;

/// RSA modulus size for generated key pairs
pub const KEY_BITS: usize = 2048;

/// SHA-256 digest length in bytes
const DIGEST_LEN: usize = 32;

/// PSS over SHA-256 with the maximum salt the key can carry:
/// emLen - hLen - 2 per RFC 8017.
fn pss_max_salt(key_bytes: usize) -> Pss {
    Pss::new_with_salt::<Sha256>(key_bytes - DIGEST_LEN - 2)
}

/// RSA key pair for signing transaction digests
///
/// Signatures use PSS padding over SHA-256 with the maximum salt length. The
/// signing input is always a 32-byte content digest, never the raw message.
#[derive(Debug, Clone)]
pub struct KeyPair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl KeyPair {
    /// Generate a new random key pair
    ///
    /// # Example
    /// ```
    /// use qfc::crypto::KeyPair;
    ///
    /// let keypair = KeyPair::generate().unwrap();
    /// let digest = [7u8; 32];
    /// let signature = keypair.sign(&digest).unwrap();
    /// assert!(qfc::crypto::verify(keypair.public_key(), &digest, &signature));
    /// ```
    pub fn generate() -> Result<Self> {
        let mut rng = OsRng;
        let private = RsaPrivateKey::new(&mut rng, KEY_BITS)?;
        let public = RsaPublicKey::from(&private);

        debug!("Generated {}-bit RSA key pair", KEY_BITS);
        Ok(KeyPair { private, public })
    }

    /// Build a key pair from an existing private key
    pub fn from_private_key(private: RsaPrivateKey) -> Self {
        let public = RsaPublicKey::from(&private);
        KeyPair { private, public }
    }

    /// Sign a 32-byte content digest
    ///
    /// # Returns
    /// * `Result<Vec<u8>>` - The PSS signature bytes or an error
    pub fn sign(&self, digest: &[u8]) -> Result<Vec<u8>> {
        let mut rng = OsRng;
        let signature =
            self.private
                .sign_with_rng(&mut rng, pss_max_salt(self.private.size()), digest)?;

        debug!("Signed {}-byte digest", digest.len());
        Ok(signature)
    }

    /// The verifying half of the pair
    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }
}

/// Verify a PSS signature over a content digest
///
/// Verification failure is an expected outcome, not an error: a tampered or
/// foreign signature yields `false`.
pub fn verify(public_key: &RsaPublicKey, digest: &[u8], signature: &[u8]) -> bool {
    public_key
        .verify(pss_max_salt(public_key.size()), digest, signature)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let keypair = KeyPair::generate().unwrap();
        let digest = [0xabu8; 32];

        let signature = keypair.sign(&digest).unwrap();
        assert!(verify(keypair.public_key(), &digest, &signature));
    }

    #[test]
    fn test_salt_fills_the_encoded_message() {
        // For a 2048-bit key the maximal salt is 256 - 32 - 2 bytes; signing
        // and verification must agree on it.
        let keypair = KeyPair::generate().unwrap();
        assert_eq!(keypair.public_key().size(), KEY_BITS / 8);

        let digest = [0x5au8; 32];
        let signature = keypair.sign(&digest).unwrap();
        assert_eq!(signature.len(), KEY_BITS / 8);
        assert!(verify(keypair.public_key(), &digest, &signature));
    }

    #[test]
    fn test_signature_tampering() {
        let keypair = KeyPair::generate().unwrap();
        let digest = [0x11u8; 32];

        let mut signature = keypair.sign(&digest).unwrap();
        signature[0] ^= 1;
        assert!(!verify(keypair.public_key(), &digest, &signature));
    }

    #[test]
    fn test_wrong_digest() {
        let keypair = KeyPair::generate().unwrap();
        let signature = keypair.sign(&[0x22u8; 32]).unwrap();
        assert!(!verify(keypair.public_key(), &[0x23u8; 32], &signature));
    }

    #[test]
    fn test_foreign_key_rejected() {
        let signer = KeyPair::generate().unwrap();
        let other = KeyPair::generate().unwrap();
        let digest = [0x44u8; 32];

        let signature = signer.sign(&digest).unwrap();
        assert!(!verify(other.public_key(), &digest, &signature));
    }
}
