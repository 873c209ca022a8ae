use std::time::Duration;

use async_trait::async_trait;
use cbc::cipher::{BlockDecryptMut, KeyIvInit, block_padding::NoPadding};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::common::errors::{Error, Result};
use crate::hls::types::Segment;

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// Fetches the raw (still encrypted) bytes of one url.
///
/// The pool and the retry loop only see this trait, so tests can inject
/// counting or failing fetchers.
#[async_trait]
pub trait SegmentFetcher: Send + Sync {
    async fn fetch_raw(&self, url: &str) -> Result<Vec<u8>>;
}

/// Production fetcher backed by the shared HTTP client.
pub struct HttpSegmentFetcher {
    client: reqwest::Client,
}

impl HttpSegmentFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SegmentFetcher for HttpSegmentFetcher {
    async fn fetch_raw(&self, url: &str) -> Result<Vec<u8>> {
        let res = self.client.get(url).header("Accept", "*/*").send().await?;
        if !res.status().is_success() {
            return Err(Error::Network(format!(
                "segment fetch failed {}: {}",
                res.status(),
                url
            )));
        }
        Ok(res.bytes().await?.to_vec())
    }
}

/// AES-128-CBC state of one variant.
///
/// The key and IV are derived once and shared immutably between workers;
/// every decryption instantiates its own CBC state from them, CBC chaining
/// must never leak between segments.
pub struct SegmentCipher {
    key: [u8; 16],
    iv: [u8; 16],
}

impl SegmentCipher {
    /// When the playlist carries no explicit IV the key bytes double as the IV.
    pub fn new(key: [u8; 16], iv: Option<[u8; 16]>) -> Self {
        Self {
            key,
            iv: iv.unwrap_or(key),
        }
    }

    pub fn from_key_bytes(raw: &[u8], iv: Option<[u8; 16]>) -> Result<Self> {
        let key: [u8; 16] = raw
            .try_into()
            .map_err(|_| Error::Decrypt(format!("aes key is {} bytes, expected 16", raw.len())))?;
        Ok(Self::new(key, iv))
    }

    /// Decrypts one whole segment and strips its PKCS#5 padding.
    pub fn decrypt(&self, mut data: Vec<u8>) -> Result<Vec<u8>> {
        if data.is_empty() || data.len() % 16 != 0 {
            return Err(Error::Decrypt(format!(
                "ciphertext length {} is not a positive multiple of the block size",
                data.len()
            )));
        }

        let decryptor = Aes128CbcDec::new(&self.key.into(), &self.iv.into());
        decryptor
            .decrypt_padded_mut::<NoPadding>(&mut data)
            .map_err(|e| Error::Decrypt(e.to_string()))?;

        pkcs5_unpad(&mut data)?;
        Ok(data)
    }
}

/// Removes PKCS#5 padding in place. The final byte is the pad length; a pad
/// of zero, a pad longer than one block, or mismatching filler bytes are all
/// malformed.
pub fn pkcs5_unpad(data: &mut Vec<u8>) -> Result<()> {
    let Some(&pad) = data.last() else {
        return Err(Error::Decrypt("cannot unpad empty plaintext".into()));
    };
    let pad_len = pad as usize;
    if pad_len == 0 || pad_len > 16 || pad_len > data.len() {
        return Err(Error::Decrypt(format!("invalid padding length {}", pad_len)));
    }
    if data[data.len() - pad_len..].iter().any(|&b| b != pad) {
        return Err(Error::Decrypt("inconsistent padding bytes".into()));
    }
    data.truncate(data.len() - pad_len);
    Ok(())
}

/// Retry behavior of a single segment fetch.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay_unit: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Wait after the `attempt`-th (1-based) failure: 5s, 10s, 15s with the
    /// default unit.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.delay_unit * attempt
    }
}

/// Fetches and decrypts one segment.
///
/// Network failures are retried with a growing pause between attempts; a
/// cancellation during the pause aborts immediately. Decryption failures are
/// fatal and never retried.
pub async fn fetch_segment(
    fetcher: &dyn SegmentFetcher,
    segment: &Segment,
    cipher: Option<&SegmentCipher>,
    retry: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<Vec<u8>> {
    let mut last_err = None;

    for attempt in 1..=retry.attempts {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        match fetcher.fetch_raw(&segment.url).await {
            Ok(raw) => {
                return match cipher {
                    Some(cipher) => cipher.decrypt(raw),
                    None => Ok(raw),
                };
            }
            Err(err) => {
                warn!(
                    "segment {} attempt {}/{} failed: {}",
                    segment.index, attempt, retry.attempts, err
                );
                last_err = Some(err);
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            _ = tokio::time::sleep(retry.delay_after(attempt)) => {}
        }
    }

    Err(Error::Network(format!(
        "segment {} failed after {} attempts: {}",
        segment.index,
        retry.attempts,
        last_err.map(|e| e.to_string()).unwrap_or_default()
    )))
}
