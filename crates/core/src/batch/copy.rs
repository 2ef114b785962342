//! Byte copy of passthrough sources with optional sha256 verification.

use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};

use super::error::CopyError;

const BUFFER_SIZE: usize = 64 * 1024;

/// Copies `source` to `destination`, replacing it if present.
///
/// With `verify` set the destination is read back and its sha256 compared
/// against the hash of the bytes read from the source. Returns bytes copied.
pub async fn copy_file(source: &Path, destination: &Path, verify: bool) -> Result<u64, CopyError> {
    let source_file = File::open(source).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            CopyError::SourceNotFound {
                path: source.to_path_buf(),
            }
        } else {
            CopyError::failed(source, destination, e)
        }
    })?;

    let dest_file = File::create(destination)
        .await
        .map_err(|e| CopyError::failed(source, destination, e))?;

    let mut reader = BufReader::with_capacity(BUFFER_SIZE, source_file);
    let mut writer = BufWriter::with_capacity(BUFFER_SIZE, dest_file);
    let mut hasher = verify.then(Sha256::new);

    let mut total_bytes = 0u64;
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let bytes_read = reader
            .read(&mut buffer)
            .await
            .map_err(|e| CopyError::failed(source, destination, e))?;

        if bytes_read == 0 {
            break;
        }

        if let Some(ref mut h) = hasher {
            h.update(&buffer[..bytes_read]);
        }

        writer
            .write_all(&buffer[..bytes_read])
            .await
            .map_err(|e| CopyError::failed(source, destination, e))?;

        total_bytes += bytes_read as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| CopyError::failed(source, destination, e))?;

    if let Some(hasher) = hasher {
        let expected = format!("{:x}", hasher.finalize());
        let actual = sha256_file(destination)
            .await
            .map_err(|e| CopyError::failed(source, destination, e))?;
        if expected != actual {
            return Err(CopyError::ChecksumMismatch {
                path: destination.to_path_buf(),
                expected,
                actual,
            });
        }
    }

    Ok(total_bytes)
}

/// Hex sha256 of a file's contents.
pub async fn sha256_file(path: &Path) -> Result<String, std::io::Error> {
    let file = File::open(path).await?;
    let mut reader = BufReader::with_capacity(BUFFER_SIZE, file);
    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut hasher = Sha256::new();

    loop {
        let bytes_read = reader.read(&mut buffer).await?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_copy_is_byte_identical() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("track.mp3");
        let destination = dir.path().join("out.mp3");
        let contents: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&source, &contents).unwrap();

        let copied = copy_file(&source, &destination, true).await.unwrap();

        assert_eq!(copied, contents.len() as u64);
        assert_eq!(std::fs::read(&destination).unwrap(), contents);
    }

    #[tokio::test]
    async fn test_copy_replaces_existing_destination() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("track.mp3");
        let destination = dir.path().join("out.mp3");
        std::fs::write(&source, b"new").unwrap();
        std::fs::write(&destination, b"old contents").unwrap();

        copy_file(&source, &destination, false).await.unwrap();
        assert_eq!(std::fs::read(&destination).unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_missing_source() {
        let dir = TempDir::new().unwrap();
        let err = copy_file(&dir.path().join("missing.mp3"), &dir.path().join("o.mp3"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, CopyError::SourceNotFound { .. }));
    }

    #[tokio::test]
    async fn test_sha256_of_known_input() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("abc");
        std::fs::write(&path, b"abc").unwrap();
        assert_eq!(
            sha256_file(&path).await.unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
