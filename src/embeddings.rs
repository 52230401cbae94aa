//! Embedding storage backends behind one lookup capability.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

use ndarray::Array1;

use crate::model::InferenceError;
use crate::types::TID;

/// Magic bytes at the start of an on-disk embedding store.
const MAGIC: &[u8; 4] = b"RNNE";
const HEADER_LEN: u64 = 12;

/// Capability to resolve a token id to its embedding vector. The model
/// composes against this, not against a concrete storage backend.
pub trait EmbeddingLookup: Send + Sync {
    /// The embedding vector for `id`.
    fn lookup(&self, id: TID) -> Result<Array1<f32>, InferenceError>;

    /// Embedding dimensionality.
    fn dim(&self) -> usize;

    /// Number of stored embeddings.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Embedding table held fully in memory as one flat row-major buffer.
pub struct InMemoryEmbeddings {
    data: Vec<f32>,
    dim: usize,
}

impl InMemoryEmbeddings {
    /// `data` is row-major, one row of `dim` values per token id.
    pub fn new(data: Vec<f32>, dim: usize) -> Result<Self, InferenceError> {
        if dim == 0 || data.len() % dim != 0 {
            return Err(InferenceError::Internal(format!(
                "embedding buffer of {} values is not a multiple of dim {}",
                data.len(),
                dim
            )));
        }
        Ok(Self { data, dim })
    }
}

impl EmbeddingLookup for InMemoryEmbeddings {
    fn lookup(&self, id: TID) -> Result<Array1<f32>, InferenceError> {
        let idx = id as usize;
        if idx >= self.len() {
            return Err(InferenceError::TokenOutOfRange {
                id,
                vocab_size: self.len(),
            });
        }
        let start = idx * self.dim;
        Ok(Array1::from_iter(
            self.data[start..start + self.dim].iter().copied(),
        ))
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn len(&self) -> usize {
        self.data.len() / self.dim
    }
}

/// Read-only disk-backed embedding store: a small header followed by
/// fixed-size little-endian f32 rows, one seek-and-read per lookup. Keeps
/// large embedding tables out of resident memory.
pub struct DiskEmbeddings {
    file: Mutex<File>,
    count: usize,
    dim: usize,
}

impl DiskEmbeddings {
    /// Opens an existing store created by [write_embedding_store].
    pub fn open(path: &Path) -> Result<Self, InferenceError> {
        let mut file = File::open(path)?;
        let mut header = [0u8; HEADER_LEN as usize];
        file.read_exact(&mut header)?;
        if &header[0..4] != MAGIC {
            return Err(InferenceError::Internal(format!(
                "{} is not an embedding store",
                path.display()
            )));
        }
        let count = u32::from_le_bytes(header[4..8].try_into().unwrap()) as usize;
        let dim = u32::from_le_bytes(header[8..12].try_into().unwrap()) as usize;
        if dim == 0 {
            return Err(InferenceError::Internal(
                "embedding store with zero dimension".to_string(),
            ));
        }
        Ok(Self {
            file: Mutex::new(file),
            count,
            dim,
        })
    }
}

impl EmbeddingLookup for DiskEmbeddings {
    fn lookup(&self, id: TID) -> Result<Array1<f32>, InferenceError> {
        let idx = id as usize;
        if idx >= self.count {
            return Err(InferenceError::TokenOutOfRange {
                id,
                vocab_size: self.count,
            });
        }
        let mut buf = vec![0u8; self.dim * 4];
        {
            let mut file = self
                .file
                .lock()
                .map_err(|e| InferenceError::Internal(format!("embedding store lock: {e}")))?;
            file.seek(SeekFrom::Start(HEADER_LEN + (idx * self.dim * 4) as u64))?;
            file.read_exact(&mut buf)?;
        }
        Ok(buf
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes(b.try_into().unwrap()))
            .collect())
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn len(&self) -> usize {
        self.count
    }
}

/// Writes a row-major embedding table as an on-disk store readable by
/// [DiskEmbeddings::open].
pub fn write_embedding_store(
    path: &Path,
    count: usize,
    dim: usize,
    data: &[f32],
) -> std::io::Result<()> {
    assert_eq!(data.len(), count * dim, "embedding table shape mismatch");
    let mut file = File::create(path)?;
    file.write_all(MAGIC)?;
    file.write_all(&(count as u32).to_le_bytes())?;
    file.write_all(&(dim as u32).to_le_bytes())?;
    let mut bytes = Vec::with_capacity(data.len() * 4);
    for v in data {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    file.write_all(&bytes)?;
    Ok(())
}
