//! Self-signed Ed25519 public key certificates.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

use crate::{Error, Id, Result};

/// Size of an Ed25519 signature.
pub const SIGNATURE_SIZE: usize = 64;
/// Size of an Ed25519 public key.
pub const PUBLIC_KEY_SIZE: usize = 32;
/// Size of an encoded [Certificate]: the signature followed by the public key it covers.
pub const CERTIFICATE_SIZE: usize = SIGNATURE_SIZE + PUBLIC_KEY_SIZE;

#[derive(Clone, Debug, PartialEq)]
/// An Ed25519 public key signed by its own secret key.
///
/// A node's [Id] is the SHA-1 digest of its encoded certificate, so nodes can't
/// pick their own position in the key space.
pub struct Certificate {
    public_key: VerifyingKey,
    signature: Signature,
}

impl Certificate {
    /// Create a certificate by signing the signer's own public key.
    pub fn new(signer: &SigningKey) -> Self {
        let public_key = signer.verifying_key();
        let signature = signer.sign(public_key.as_bytes());

        Self {
            public_key,
            signature,
        }
    }

    /// Parse an encoded certificate, without checking its self-signature.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != CERTIFICATE_SIZE {
            return Err(Error::InvalidCertificate);
        }

        let signature = Signature::from_slice(&bytes[..SIGNATURE_SIZE])
            .map_err(|_| Error::InvalidCertificate)?;

        let key: [u8; PUBLIC_KEY_SIZE] = bytes[SIGNATURE_SIZE..]
            .try_into()
            .map_err(|_| Error::InvalidCertificate)?;
        let public_key = VerifyingKey::from_bytes(&key).map_err(|_| Error::InvalidCertificate)?;

        Ok(Self {
            public_key,
            signature,
        })
    }

    // === Getters ===

    pub fn public_key(&self) -> &VerifyingKey {
        &self.public_key
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// The node [Id] derived from this certificate.
    pub fn id(&self) -> Id {
        Id::digest(self.to_bytes())
    }

    // === Public Methods ===

    pub fn to_bytes(&self) -> [u8; CERTIFICATE_SIZE] {
        let mut bytes = [0; CERTIFICATE_SIZE];

        bytes[..SIGNATURE_SIZE].copy_from_slice(&self.signature.to_bytes());
        bytes[SIGNATURE_SIZE..].copy_from_slice(self.public_key.as_bytes());

        bytes
    }

    /// Returns `true` if the certificate is signed by the key it carries.
    pub fn verify(&self) -> bool {
        self.public_key
            .verify(self.public_key.as_bytes(), &self.signature)
            .is_ok()
    }

    /// Returns `true` if `signature` is a valid signature over `message` by this
    /// certificate's public key.
    ///
    /// Malformed signatures are simply invalid.
    pub fn verify_signature(&self, message: &[u8], signature: &[u8]) -> bool {
        match Signature::from_slice(signature) {
            Ok(signature) => self.public_key.verify(message, &signature).is_ok(),
            Err(_) => false,
        }
    }
}
