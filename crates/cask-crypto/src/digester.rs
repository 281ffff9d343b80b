use std::io::{self, Read, Write};

use cask_types::{ContentAddress, HashAlgorithm, SizedContentAddress};
use sha1::Digest as _;

/// Read buffer used by [`digest_reader`].
const READ_CHUNK: usize = 64 * 1024;

#[derive(Clone)]
enum Inner {
    Sha1(sha1::Sha1),
    Sha256(sha2::Sha256),
    Blake3(Box<blake3::Hasher>),
}

/// Incremental content hasher.
///
/// `Digester` implements [`Write`], so it can sit beside a file as the second
/// sink of a tee while a blob streams in. It also counts the bytes it has seen.
#[derive(Clone)]
pub struct Digester {
    algorithm: HashAlgorithm,
    inner: Inner,
    bytes: u64,
}

impl Digester {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        let inner = match algorithm {
            HashAlgorithm::Sha1 => Inner::Sha1(sha1::Sha1::new()),
            HashAlgorithm::Sha256 => Inner::Sha256(sha2::Sha256::new()),
            HashAlgorithm::Blake3 => Inner::Blake3(Box::new(blake3::Hasher::new())),
        };
        Self {
            algorithm,
            inner,
            bytes: 0,
        }
    }

    /// Hasher matching the algorithm of a claimed address.
    pub fn for_address(claimed: &ContentAddress) -> Self {
        Self::new(claimed.algorithm())
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn update(&mut self, data: &[u8]) {
        match &mut self.inner {
            Inner::Sha1(h) => h.update(data),
            Inner::Sha256(h) => h.update(data),
            Inner::Blake3(h) => {
                h.update(data);
            }
        }
        self.bytes += data.len() as u64;
    }

    /// Total number of bytes hashed so far.
    pub fn bytes_hashed(&self) -> u64 {
        self.bytes
    }

    /// Address of the bytes hashed so far, without consuming the hasher.
    pub fn current(&self) -> ContentAddress {
        self.clone().finish()
    }

    /// Returns `true` if the bytes hashed so far produce `claimed`.
    ///
    /// A claim made with a different algorithm never matches.
    pub fn matches(&self, claimed: &ContentAddress) -> bool {
        claimed.algorithm() == self.algorithm && self.current() == *claimed
    }

    pub fn finish(self) -> ContentAddress {
        match self.inner {
            Inner::Sha1(h) => ContentAddress::sha1(h.finalize().into()),
            Inner::Sha256(h) => ContentAddress::sha256(h.finalize().into()),
            Inner::Blake3(h) => ContentAddress::blake3(*h.finalize().as_bytes()),
        }
    }
}

impl Write for Digester {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl std::fmt::Debug for Digester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Digester")
            .field("algorithm", &self.algorithm)
            .field("bytes", &self.bytes)
            .finish()
    }
}

/// Address of an in-memory byte slice.
pub fn digest(algorithm: HashAlgorithm, data: &[u8]) -> ContentAddress {
    let mut digester = Digester::new(algorithm);
    digester.update(data);
    digester.finish()
}

/// Hash everything a reader yields, returning the address and byte count.
pub fn digest_reader<R: Read>(
    algorithm: HashAlgorithm,
    mut reader: R,
) -> io::Result<SizedContentAddress> {
    let mut digester = Digester::new(algorithm);
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        digester.update(&buf[..n]);
    }
    let size = digester.bytes_hashed();
    Ok(SizedContentAddress::new(digester.finish(), size))
}
