use std::collections::HashMap;

use alloy::primitives::{Address, Bytes};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::{Signature, Signer};
use async_trait::async_trait;

use super::{TransactionError, TxHashToSign};

/// Produces signatures for the hashes handed out by the transaction manager.
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    fn address(&self) -> Address;

    /// identity key -> signature
    async fn sign_hashes(&self, hashes: &[TxHashToSign]) -> Result<HashMap<String, Signature>, TransactionError>;
}

/// 로컬 private key 서명자 (CLI / dry-run 용)
pub struct LocalKeySigner {
    inner: PrivateKeySigner,
}

impl LocalKeySigner {
    pub fn from_private_key(key: &str) -> Result<Self, TransactionError> {
        let inner: PrivateKeySigner = key
            .trim_start_matches("0x")
            .parse()
            .map_err(|e| TransactionError::Signer(format!("invalid private key: {}", e)))?;
        Ok(Self { inner })
    }

    pub fn random() -> Self {
        Self { inner: PrivateKeySigner::random() }
    }
}

#[async_trait]
impl TransactionSigner for LocalKeySigner {
    fn address(&self) -> Address {
        self.inner.address()
    }

    async fn sign_hashes(&self, hashes: &[TxHashToSign]) -> Result<HashMap<String, Signature>, TransactionError> {
        let mut out = HashMap::with_capacity(hashes.len());
        for entry in hashes {
            let signature = self
                .inner
                .sign_hash(&entry.hash)
                .await
                .map_err(|e| TransactionError::Signer(e.to_string()))?;
            out.insert(entry.identity_key.clone(), signature);
        }
        Ok(out)
    }
}

/// 65 byte r || s || v, v in {0, 1, 27, 28}
pub fn parse_signature(raw: &Bytes) -> Result<Signature, TransactionError> {
    if raw.len() != 65 {
        return Err(TransactionError::InvalidSignature(format!("expected 65 bytes, got {}", raw.len())));
    }
    Signature::from_raw(raw).map_err(|e| TransactionError::InvalidSignature(e.to_string()))
}
