use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

const HASH_CHUNK_BYTES: usize = 8 * 1024;

pub fn now_epoch_secs() -> Result<u64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}

/// Truncate `input` to at most `max_chars` characters, dropping control
/// characters and appending `...` when cut.
pub fn truncate_with_ellipsis(input: &str, max_chars: usize) -> String {
    let clean: String = input.chars().filter(|c| !c.is_control()).collect();
    if clean.chars().count() > max_chars {
        let mut s: String = clean.chars().take(max_chars).collect();
        s.push_str("...");
        s
    } else {
        clean
    }
}

/// Lowercase hex SHA-256 of the file contents, streamed.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; HASH_CHUNK_BYTES];
    loop {
        let read = file
            .read(&mut buf)
            .with_context(|| format!("failed to read {}", path.display()))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_file_matches_known_digest() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("abc.txt");
        std::fs::write(&path, "abc").expect("write");
        assert_eq!(
            sha256_file(&path).expect("hash"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn sha256_file_streams_multi_chunk_input() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("big.bin");
        let body = vec![7u8; HASH_CHUNK_BYTES * 3 + 11];
        std::fs::write(&path, &body).expect("write");
        let expected = format!("{:x}", Sha256::digest(&body));
        assert_eq!(sha256_file(&path).expect("hash"), expected);
    }

    #[test]
    fn truncate_with_ellipsis_cuts_long_text() {
        assert_eq!(truncate_with_ellipsis("abcdef", 3), "abc...");
        assert_eq!(truncate_with_ellipsis("a\tb", 5), "ab");
    }
}
