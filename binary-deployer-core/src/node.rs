//! Read-only view over the artifact tree handed to us by the build.
//!
//! [`FileNode`] is the only thing the flattener and the repositories know
//! about the source tree. Two adapters ship with the crate: [`LocalFileNode`]
//! for a directory on disk and [`MemoryNode`] for trees assembled in memory.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{self, Stream};
use tokio_util::io::ReaderStream;
use tracing::debug;

/// Byte stream of a leaf's content.
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send + Sync>>;

/// One node of the artifact tree: either a directory or a leaf, never both.
pub trait FileNode: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn is_directory(&self) -> bool;

    /// Content length in bytes. Always known before the stream is opened.
    fn size(&self) -> u64;

    /// Children in the order the host lists them. Fails on leaves.
    fn children(&self) -> io::Result<Vec<Arc<dyn FileNode>>>;

    /// Opens the content of a leaf. Fails on directories.
    fn open_stream(&self) -> io::Result<ByteStream>;
}

fn not_a_directory(name: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("{name} is not a directory"),
    )
}

fn not_a_file(name: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, format!("{name} is a directory"))
}

/// A file or directory on the local filesystem.
///
/// Children are listed in byte-wise name order so that two runs over the same
/// directory produce the same upload order.
#[derive(Debug, Clone)]
pub struct LocalFileNode {
    path: PathBuf,
    name: String,
    is_dir: bool,
    size: u64,
}

impl LocalFileNode {
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let metadata = std::fs::metadata(&path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self {
            name,
            is_dir: metadata.is_dir(),
            size: if metadata.is_dir() { 0 } else { metadata.len() },
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FileNode for LocalFileNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_directory(&self) -> bool {
        self.is_dir
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn children(&self) -> io::Result<Vec<Arc<dyn FileNode>>> {
        if !self.is_dir {
            return Err(not_a_directory(&self.name));
        }
        let mut entries = std::fs::read_dir(&self.path)?.collect::<io::Result<Vec<_>>>()?;
        entries.sort_by_key(|entry| entry.file_name());
        debug!(path = %self.path.display(), count = entries.len(), "Listed directory");
        entries
            .into_iter()
            .map(|entry| LocalFileNode::open(entry.path()).map(|n| Arc::new(n) as Arc<dyn FileNode>))
            .collect()
    }

    fn open_stream(&self) -> io::Result<ByteStream> {
        if self.is_dir {
            return Err(not_a_file(&self.name));
        }
        let file = std::fs::File::open(&self.path)?;
        Ok(Box::pin(ReaderStream::new(tokio::fs::File::from_std(file))))
    }
}

/// In-memory tree node.
#[derive(Debug)]
pub struct MemoryNode {
    name: String,
    content: MemoryContent,
}

#[derive(Debug)]
enum MemoryContent {
    File(Bytes),
    Directory(Vec<Arc<dyn FileNode>>),
}

impl MemoryNode {
    pub fn file(name: impl Into<String>, content: impl Into<Bytes>) -> Arc<dyn FileNode> {
        Arc::new(MemoryNode {
            name: name.into(),
            content: MemoryContent::File(content.into()),
        })
    }

    pub fn dir(name: impl Into<String>, children: Vec<Arc<dyn FileNode>>) -> Arc<dyn FileNode> {
        Arc::new(MemoryNode {
            name: name.into(),
            content: MemoryContent::Directory(children),
        })
    }
}

impl FileNode for MemoryNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_directory(&self) -> bool {
        matches!(self.content, MemoryContent::Directory(_))
    }

    fn size(&self) -> u64 {
        match &self.content {
            MemoryContent::File(bytes) => bytes.len() as u64,
            MemoryContent::Directory(_) => 0,
        }
    }

    fn children(&self) -> io::Result<Vec<Arc<dyn FileNode>>> {
        match &self.content {
            MemoryContent::Directory(children) => Ok(children.clone()),
            MemoryContent::File(_) => Err(not_a_directory(&self.name)),
        }
    }

    fn open_stream(&self) -> io::Result<ByteStream> {
        match &self.content {
            MemoryContent::File(bytes) => Ok(Box::pin(stream::iter(vec![Ok::<_, io::Error>(bytes.clone())]))),
            MemoryContent::Directory(_) => Err(not_a_file(&self.name)),
        }
    }
}

/// Drains a byte stream into one contiguous buffer.
pub async fn read_all(mut stream: ByteStream) -> io::Result<Bytes> {
    use futures::TryStreamExt;

    let mut buf = bytes::BytesMut::new();
    while let Some(chunk) = stream.try_next().await? {
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}
