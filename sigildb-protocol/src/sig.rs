//! Signer recovery and the signing side of the header digest.

use crate::error::ProtocolError;
use crate::hash::HASH_LEN;
use ethers_core::k256::ecdsa::SigningKey;
use ethers_core::types::{Address, RecoveryMessage, Signature, H256};
use ethers_core::utils::secret_key_to_address;

/// Wire length of a signature: r (32) || s (32) || v (1).
pub const SIGNATURE_LEN: usize = 65;

/// Wire length of a signer address.
pub const ADDRESS_LEN: usize = 20;

/// Recovers the signer address from a header digest and a 65-byte
/// signature.
pub fn recover_signer(digest: &[u8], signature: &[u8]) -> Result<Address, ProtocolError> {
    if digest.len() != HASH_LEN {
        return Err(ProtocolError::SignatureInvalid(format!(
            "digest is {} bytes, expected {HASH_LEN}",
            digest.len()
        )));
    }
    if signature.len() != SIGNATURE_LEN {
        return Err(ProtocolError::SignatureInvalid(format!(
            "signature is {} bytes, expected {SIGNATURE_LEN}",
            signature.len()
        )));
    }
    let signature = Signature::try_from(signature)
        .map_err(|e| ProtocolError::SignatureInvalid(format!("malformed signature: {e}")))?;
    signature
        .recover(RecoveryMessage::Hash(H256::from_slice(digest)))
        .map_err(|e| ProtocolError::SignatureInvalid(format!("recovery failed: {e}")))
}

/// Verifies that `signature` over `digest` was produced by the claimed
/// signer. Recovery failure and address mismatch are both
/// `SignatureInvalid`; there is no silent pass.
pub fn verify_signer(
    digest: &[u8],
    signature: &[u8],
    claimed: &[u8],
) -> Result<(), ProtocolError> {
    let recovered = recover_signer(digest, signature)?;
    if recovered.as_bytes() != claimed {
        return Err(ProtocolError::SignatureInvalid(format!(
            "recovered 0x{}, claimed 0x{}",
            hex::encode(recovered.as_bytes()),
            hex::encode(claimed)
        )));
    }
    Ok(())
}

/// Signing counterpart used by the writer controllers (and tests) to
/// produce entries the read side accepts.
pub struct EntrySigner {
    key: SigningKey,
    address: Address,
}

impl EntrySigner {
    /// Builds a signer from a 32-byte secp256k1 secret.
    pub fn from_secret(secret: &[u8; 32]) -> Result<Self, ProtocolError> {
        let key = SigningKey::from_slice(secret)
            .map_err(|e| ProtocolError::SignatureInvalid(format!("bad secret key: {e}")))?;
        let address = secret_key_to_address(&key);
        Ok(Self { key, address })
    }

    /// Generates a fresh random signer.
    pub fn random() -> Self {
        let key = SigningKey::random(&mut ethers_core::rand::thread_rng());
        let address = secret_key_to_address(&key);
        Self { key, address }
    }

    /// The 20-byte address this signer writes into SIGNER payloads.
    pub fn address(&self) -> [u8; ADDRESS_LEN] {
        self.address.0
    }

    /// Signs a finalized header digest, producing the 65-byte wire form.
    pub fn sign_digest(&self, digest: &[u8; HASH_LEN]) -> Result<[u8; SIGNATURE_LEN], ProtocolError> {
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(digest)
            .map_err(|e| ProtocolError::SignatureInvalid(format!("signing failed: {e}")))?;
        let mut out = [0u8; SIGNATURE_LEN];
        out[..64].copy_from_slice(&signature.to_bytes());
        out[64] = recovery_id.to_byte() + 27;
        Ok(out)
    }
}

impl std::fmt::Debug for EntrySigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntrySigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::HashKind;

    fn digest_of(data: &[u8]) -> [u8; HASH_LEN] {
        HashKind::Keccak256.digest(data).try_into().unwrap()
    }

    #[test]
    fn test_sign_and_verify() {
        let signer = EntrySigner::random();
        let digest = digest_of(b"header bytes");
        let sig = signer.sign_digest(&digest).unwrap();
        verify_signer(&digest, &sig, &signer.address()).unwrap();
    }

    #[test]
    fn test_wrong_digest_rejected() {
        let signer = EntrySigner::random();
        let sig = signer.sign_digest(&digest_of(b"original")).unwrap();
        let err = verify_signer(&digest_of(b"tampered"), &sig, &signer.address()).unwrap_err();
        assert!(err.is_security());
    }

    #[test]
    fn test_wrong_claimed_address_rejected() {
        let signer = EntrySigner::random();
        let other = EntrySigner::random();
        let digest = digest_of(b"header bytes");
        let sig = signer.sign_digest(&digest).unwrap();
        let err = verify_signer(&digest, &sig, &other.address()).unwrap_err();
        assert!(matches!(err, ProtocolError::SignatureInvalid(_)));
    }

    #[test]
    fn test_corrupted_signature_rejected() {
        let signer = EntrySigner::random();
        let digest = digest_of(b"header bytes");
        let mut sig = signer.sign_digest(&digest).unwrap();
        sig[10] ^= 0xFF;
        assert!(verify_signer(&digest, &sig, &signer.address()).is_err());
    }

    #[test]
    fn test_malformed_lengths_rejected() {
        let signer = EntrySigner::random();
        let digest = digest_of(b"x");
        let sig = signer.sign_digest(&digest).unwrap();
        assert!(verify_signer(&digest[..31], &sig, &signer.address()).is_err());
        assert!(verify_signer(&digest, &sig[..64], &signer.address()).is_err());
    }

    #[test]
    fn test_deterministic_signer_address() {
        let secret = [0x11u8; 32];
        let a = EntrySigner::from_secret(&secret).unwrap();
        let b = EntrySigner::from_secret(&secret).unwrap();
        assert_eq!(a.address(), b.address());
    }
}
