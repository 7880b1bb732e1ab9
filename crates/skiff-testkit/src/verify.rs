//! Chain-checking verifier over a small JSON test format
//!
//! Test messages are JSON objects `{"author": "<ref>", "sequence": n,
//! "content": …}`. The verifier enforces the same discipline a real one
//! does: per-feed sequences must arrive dense and in order. The message
//! key is the sha256 of the raw bytes.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use skiff_core::{FeedRef, MessageRef, VerifiedMessage, Verifier, VerifyError};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Build a raw test message for `author` at `seq`.
pub fn test_message(author: &FeedRef, seq: i64) -> Vec<u8> {
    let value = serde_json::json!({
        "author": author.to_string(),
        "sequence": seq,
        "content": { "type": "post", "text": format!("message {seq}") },
    });
    serde_json::to_vec(&value).expect("test message encodes")
}

/// Stateful per-feed verifier for the test format.
#[derive(Default)]
pub struct ChainVerifier {
    last_seen: Mutex<HashMap<FeedRef, i64>>,
}

impl ChainVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-position the chain state, as if `seq` messages of `feed` had
    /// already been verified.
    pub async fn assume(&self, feed: &FeedRef, seq: i64) {
        self.last_seen.lock().await.insert(*feed, seq);
    }
}

#[async_trait]
impl Verifier for ChainVerifier {
    async fn verify(&self, raw: &[u8]) -> Result<VerifiedMessage, VerifyError> {
        let value: serde_json::Value = serde_json::from_slice(raw)
            .map_err(|err| VerifyError::malformed(err.to_string()))?;

        let author: FeedRef = value
            .get("author")
            .and_then(|v| v.as_str())
            .ok_or_else(|| VerifyError::malformed("missing author"))?
            .parse()
            .map_err(|_| VerifyError::malformed("bad author ref"))?;
        let sequence = value
            .get("sequence")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| VerifyError::malformed("missing sequence"))?;

        let mut last_seen = self.last_seen.lock().await;
        let expected = last_seen.get(&author).copied().unwrap_or(0) + 1;
        if sequence != expected {
            return Err(VerifyError::chain(
                author,
                sequence,
                format!("expected seq {expected}"),
            ));
        }
        last_seen.insert(author, sequence);

        let digest: [u8; 32] = Sha256::digest(raw).into();
        Ok(VerifiedMessage {
            author,
            sequence,
            key: MessageRef::from_bytes(digest),
        })
    }
}
