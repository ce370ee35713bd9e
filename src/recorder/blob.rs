use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::capture::EncodedChunk;
use crate::codec::MimeType;

/// One encoder slice kept for the current session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position in emission order, starting at 0
    pub index: usize,
    pub timecode_ms: u64,
    pub data: Vec<u8>,
}

/// Ordered, append-only chunk sequence
#[derive(Debug, Default)]
pub(crate) struct ChunkBuffer {
    chunks: Vec<Chunk>,
}

impl ChunkBuffer {
    /// Append a slice; empty slices are dropped
    pub(crate) fn push(&mut self, encoded: EncodedChunk) -> bool {
        if encoded.data.is_empty() {
            return false;
        }
        let index = self.chunks.len();
        debug!(
            "Collected chunk {} ({} bytes @ {} ms)",
            index,
            encoded.data.len(),
            encoded.timecode_ms
        );
        self.chunks.push(Chunk {
            index,
            timecode_ms: encoded.timecode_ms,
            data: encoded.data,
        });
        true
    }

    pub(crate) fn len(&self) -> usize {
        self.chunks.len()
    }

    pub(crate) fn clear(&mut self) {
        self.chunks.clear();
    }

    /// Concatenate in emission order, leaving the buffer empty
    pub(crate) fn drain_concat(&mut self) -> (Vec<u8>, usize) {
        let count = self.chunks.len();
        let total = self.chunks.iter().map(|c| c.data.len()).sum();
        let mut data = Vec::with_capacity(total);
        for chunk in self.chunks.drain(..) {
            data.extend_from_slice(&chunk.data);
        }
        (data, count)
    }
}

/// Finished recording: every chunk of one session, concatenated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingBlob {
    pub session_id: Uuid,
    /// Container/codec identifier the data is tagged with
    pub mime_type: String,
    pub data: Vec<u8>,
    /// Active recording time (paused intervals excluded)
    pub duration: Duration,
    pub chunk_count: usize,
}

impl RecordingBlob {
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration.as_millis() as u64
    }

    /// `recording-<session>.<ext>`, extension taken from the mime type
    pub fn suggested_file_name(&self) -> String {
        let extension = MimeType::parse(&self.mime_type)
            .map(|m| m.extension())
            .unwrap_or("webm");
        format!("recording-{}.{}", self.session_id, extension)
    }

    /// Write the blob into `dir` under its suggested name
    pub fn save_to(&self, dir: &Path) -> std::io::Result<PathBuf> {
        let path = dir.join(self.suggested_file_name());
        std::fs::write(&path, &self.data)?;
        info!("Saved recording ({} bytes) to {:?}", self.size(), path);
        Ok(path)
    }
}
