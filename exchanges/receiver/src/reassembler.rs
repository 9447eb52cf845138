use peerdropx_common::ControlMessage;
use thiserror::Error;
use tracing::{debug, info};

use crate::ReceiverConfig;

/// A fully received file.
#[derive(Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for ReceivedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceivedFile")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("size", &self.size)
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceivingEvent {
    pub name: String,
    pub received: u64,
    pub remaining: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReassemblyError {
    #[error("received data before the file metadata")]
    ChunkBeforeMeta,
    #[error("received 'done' before the file metadata")]
    DoneBeforeMeta,
    #[error("file metadata was announced twice")]
    DuplicateMeta,
    #[error("file of {size} bytes exceeds the {max} byte limit")]
    TooLarge { size: u64, max: u64 },
    #[error("received {received} bytes but only {declared} were announced")]
    Overflow { declared: u64, received: u64 },
    #[error("received {received} bytes, expected {declared}")]
    SizeMismatch { declared: u64, received: u64 },
    #[error("the transfer is already finished")]
    Finished,
}

/// What a control message did to the reassembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveStep {
    Started { name: String, size: u64 },
    Finished(ReceivedFile),
    Cancelled { reason: Option<String> },
}

#[derive(Debug)]
struct Announced {
    name: String,
    mime_type: String,
    size: u64,
}

#[derive(Debug, Default)]
pub struct Reassembler {
    config: ReceiverConfig,
    announced: Option<Announced>,
    buffer: Vec<u8>,
    finished: bool,
}

impl Reassembler {
    pub fn new(config: ReceiverConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn received(&self) -> u64 {
        self.buffer.len() as u64
    }

    pub fn on_control(
        &mut self,
        message: ControlMessage,
    ) -> Result<ReceiveStep, ReassemblyError> {
        match message {
            ControlMessage::Meta {
                name,
                mime_type,
                size,
            } => {
                self.on_meta(name.clone(), mime_type, size)?;
                Ok(ReceiveStep::Started { name, size })
            }
            ControlMessage::Done => self.finish().map(ReceiveStep::Finished),
            ControlMessage::Cancel { reason } => {
                info!(
                    "Sender cancelled the transfer: {}",
                    reason.as_deref().unwrap_or("no reason given")
                );
                self.buffer = Vec::new();
                self.finished = true;
                Ok(ReceiveStep::Cancelled { reason })
            }
        }
    }

    pub fn on_meta(
        &mut self,
        name: String,
        mime_type: String,
        size: u64,
    ) -> Result<(), ReassemblyError> {
        if self.finished {
            return Err(ReassemblyError::Finished);
        }
        if self.announced.is_some() {
            return Err(ReassemblyError::DuplicateMeta);
        }
        if size > self.config.max_file_size {
            return Err(ReassemblyError::TooLarge {
                size,
                max: self.config.max_file_size,
            });
        }
        info!("Receiving {} ({} bytes, {})", name, size, mime_type);
        let reserve = size.min(self.config.preallocate_limit);
        self.buffer = Vec::with_capacity(usize::try_from(reserve).unwrap_or(0));
        self.announced = Some(Announced {
            name,
            mime_type,
            size,
        });
        Ok(())
    }

    pub fn on_chunk(
        &mut self,
        chunk: &[u8],
    ) -> Result<ReceivingEvent, ReassemblyError> {
        if self.finished {
            return Err(ReassemblyError::Finished);
        }
        let announced = self
            .announced
            .as_ref()
            .ok_or(ReassemblyError::ChunkBeforeMeta)?;
        let received = self.buffer.len() as u64 + chunk.len() as u64;
        if received > announced.size {
            return Err(ReassemblyError::Overflow {
                declared: announced.size,
                received,
            });
        }
        self.buffer.extend_from_slice(chunk);
        debug!("Received {}/{} bytes", received, announced.size);
        Ok(ReceivingEvent {
            name: announced.name.clone(),
            received,
            remaining: announced.size - received,
        })
    }

    /// Completes the file on `done`.
    pub fn finish(&mut self) -> Result<ReceivedFile, ReassemblyError> {
        if self.finished {
            return Err(ReassemblyError::Finished);
        }
        let announced = self
            .announced
            .take()
            .ok_or(ReassemblyError::DoneBeforeMeta)?;
        self.finished = true;
        let received = self.buffer.len() as u64;
        if received != announced.size {
            return Err(ReassemblyError::SizeMismatch {
                declared: announced.size,
                received,
            });
        }
        info!("Received {} ({} bytes)", announced.name, received);
        Ok(ReceivedFile {
            name: announced.name,
            mime_type: announced.mime_type,
            size: received,
            bytes: std::mem::take(&mut self.buffer),
        })
    }
}
