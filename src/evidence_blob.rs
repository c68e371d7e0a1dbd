//! Evidence attachments as readable blobs.
//!
//! The store never sees file handles directly. Anything that can report a
//! name, a MIME type and a size, and can hand over its full content, is an
//! [`EvidenceBlob`]. Content is stored as a base64 `data:` URI.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// MIME type written into the data URI when the blob has none.
pub const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

pub trait EvidenceBlob {
    fn name(&self) -> &str;

    /// Declared MIME type, possibly empty.
    fn mime_type(&self) -> &str;

    /// Declared size in bytes.
    fn size(&self) -> u64;

    /// Full content. May be large.
    fn read_all(&mut self) -> io::Result<Vec<u8>>;
}

/// A file on disk.
///
/// Name, size and MIME type are captured when the blob is opened; the
/// content is only read by [`EvidenceBlob::read_all`].
#[derive(Debug, Clone)]
pub struct PathBlob {
    path: PathBuf,
    name: String,
    mime_type: String,
    size: u64,
}

impl PathBlob {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let metadata = fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mime_type = mime_guess::from_path(path).first_raw().unwrap_or("").to_string();

        Ok(Self {
            path: path.to_path_buf(),
            name,
            mime_type,
            size: metadata.len(),
        })
    }

    /// Overrides the guessed MIME type.
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EvidenceBlob for PathBlob {
    fn name(&self) -> &str {
        &self.name
    }

    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn read_all(&mut self) -> io::Result<Vec<u8>> {
        fs::read(&self.path)
    }
}

/// Content already held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryBlob {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl MemoryBlob {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes: bytes.into(),
        }
    }
}

impl EvidenceBlob for MemoryBlob {
    fn name(&self) -> &str {
        &self.name
    }

    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn read_all(&mut self) -> io::Result<Vec<u8>> {
        Ok(self.bytes.clone())
    }
}

pub fn encode_data_uri(mime_type: &str, bytes: &[u8]) -> String {
    let mime_type = if mime_type.is_empty() { FALLBACK_MIME_TYPE } else { mime_type };
    format!("data:{mime_type};base64,{}", STANDARD.encode(bytes))
}

/// Splits a base64 data URI back into MIME type and content.
pub fn decode_data_uri(uri: &str) -> Option<(String, Vec<u8>)> {
    let rest = uri.strip_prefix("data:")?;
    let (mime_type, payload) = rest.split_once(";base64,")?;
    let bytes = STANDARD.decode(payload).ok()?;
    Some((mime_type.to_string(), bytes))
}
