use anyhow::Result;
use async_trait::async_trait;

use crate::OutgoingFile;

/// Where a store-and-forward upload ended up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FallbackReceipt {
    /// Location the receiver can fetch the file from.
    pub location: String,
    pub size: u64,
}

/// Store-and-forward path used when the direct channel cannot be
/// established or breaks mid-transfer.
#[async_trait]
pub trait FallbackUploader: Send + Sync {
    async fn upload(&self, file: &OutgoingFile) -> Result<FallbackReceipt>;
}
