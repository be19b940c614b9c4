//! Content fingerprints: streaming SHA-256 over whole files.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::digest::Output;
use sha2::{Digest, Sha256};

use crate::error::{HarvestError, Result};

/// Default read chunk size (1 MiB). Memory use stays flat regardless of input size.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Number of hex characters of the fingerprint used as a bundle name prefix.
pub const SHORT_LEN: usize = 12;

/// SHA-256 digest of a file's complete byte content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(Output<Sha256>);

impl Fingerprint {
    /// Full lower-case hex encoding (64 characters).
    pub fn to_hex(&self) -> String {
        format!("{:x}", self.0)
    }

    /// First [`SHORT_LEN`] hex characters.
    pub fn short(&self) -> String {
        let mut hex = self.to_hex();
        hex.truncate(SHORT_LEN);
        hex
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Fingerprint everything a reader yields, `chunk_size` bytes at a time.
pub fn fingerprint_reader(
    reader: &mut dyn Read,
    chunk_size: usize,
) -> std::io::Result<Fingerprint> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; chunk_size.max(1)];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }
    Ok(Fingerprint(hasher.finalize()))
}

/// Fingerprint a file on disk.
pub fn fingerprint_file(path: &Path, chunk_size: usize) -> Result<Fingerprint> {
    let wrap = |source| HarvestError::Fingerprint {
        path: path.to_path_buf(),
        source,
    };
    let mut file = File::open(path).map_err(wrap)?;
    fingerprint_reader(&mut file, chunk_size).map_err(wrap)
}
