//! The file-access stack. Three orthogonal axes compose here: transport
//! (on-disk path or in-memory buffer), encoding (line-oriented text or
//! endian-aware binary), and transparent compression (gzip, bzip2, xz).

use std::path::PathBuf;

use crate::error::{Error, Result};

pub(crate) mod binary;
pub(crate) mod memory;
pub(crate) mod text;

pub use text::TextFile;

/// How a file is opened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// The file must already exist.
    Read,
    /// Truncates any existing file.
    Write,
    /// Creates the file if missing, positions at the end.
    Append,
}

/// Compression applied outside the format itself.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Compression {
    #[default]
    None,
    Gzip,
    Bzip2,
    Lzma,
}

impl Compression {
    /// Detect compression from the outermost extension of `path`, returning
    /// the compression and the path with that extension stripped (so the
    /// remaining extension can drive format dispatch).
    pub fn from_path(path: &str) -> (Compression, &str) {
        for (suffix, compression) in [
            (".gz", Compression::Gzip),
            (".bz2", Compression::Bzip2),
            (".xz", Compression::Lzma),
        ] {
            if let Some(stripped) = path.strip_suffix(suffix) {
                return (compression, stripped);
            }
        }
        (Compression::None, path)
    }

    /// Parse the compression half of a `"NAME/COMPRESSION"` format string.
    pub(crate) fn from_tag(tag: &str) -> Result<Compression> {
        match tag.trim().to_ascii_uppercase().as_str() {
            "GZ" => Ok(Compression::Gzip),
            "BZ2" => Ok(Compression::Bzip2),
            "XZ" => Ok(Compression::Lzma),
            other => Err(Error::File(format!(
                "unknown compression method '{other}' (expected GZ, BZ2 or XZ)"
            ))),
        }
    }
}

/// Where the bytes for a format come from or go to.
#[derive(Debug)]
pub enum Source {
    /// A file on disk.
    Path(PathBuf),
    /// Read from a caller-provided buffer.
    MemoryRead(Vec<u8>),
    /// Write into a shared buffer observable through
    /// [`Trajectory::memory_buffer`](crate::Trajectory::memory_buffer).
    MemoryWrite(memory::SharedBuffer),
}

impl Source {
    /// The name to use in diagnostics.
    pub fn display(&self) -> String {
        match self {
            Source::Path(path) => path.display().to_string(),
            Source::MemoryRead(_) | Source::MemoryWrite(_) => "<memory>".to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compression_from_path() {
        assert_eq!(
            Compression::from_path("traj.xyz.gz"),
            (Compression::Gzip, "traj.xyz")
        );
        assert_eq!(
            Compression::from_path("traj.pdb.bz2"),
            (Compression::Bzip2, "traj.pdb")
        );
        assert_eq!(
            Compression::from_path("traj.gro.xz"),
            (Compression::Lzma, "traj.gro")
        );
        assert_eq!(
            Compression::from_path("traj.xyz"),
            (Compression::None, "traj.xyz")
        );
    }

    #[test]
    fn compression_tags() {
        assert_eq!(Compression::from_tag(" gz ").unwrap(), Compression::Gzip);
        assert_eq!(Compression::from_tag("BZ2").unwrap(), Compression::Bzip2);
        assert_eq!(Compression::from_tag("xz").unwrap(), Compression::Lzma);
        assert!(Compression::from_tag("zip").is_err());
    }
}
