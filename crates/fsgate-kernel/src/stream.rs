//! Bounded-memory partial file readers.
//!
//! `head_lines` and `tail_lines` read fixed-size chunks and keep only the
//! bytes they will return, so memory stays proportional to the chunk size
//! plus the requested lines regardless of file size. Returned lines keep
//! their `\n` terminators; a final line without one is still returned.

use std::io::{self, SeekFrom};
use std::path::Path;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Read granularity in bytes.
pub const CHUNK_SIZE: usize = 1024;

/// First `n` lines of the file at `path`.
pub async fn head_lines(path: &Path, n: usize) -> io::Result<String> {
    if n == 0 {
        return Ok(String::new());
    }

    let mut file = File::open(path).await?;
    let mut chunk = vec![0u8; CHUNK_SIZE];
    let mut out = Vec::new();
    let mut lines = 0;

    loop {
        let read = file.read(&mut chunk).await?;
        if read == 0 {
            break;
        }
        let buf = &chunk[..read];
        for (offset, _) in buf.iter().enumerate().filter(|(_, b)| **b == b'\n') {
            lines += 1;
            if lines == n {
                out.extend_from_slice(&buf[..=offset]);
                return Ok(into_text(out));
            }
        }
        out.extend_from_slice(buf);
    }

    Ok(into_text(out))
}

/// Last `n` lines of the file at `path`.
///
/// Chunks are read backwards from end-of-file. A chunk usually starts in the
/// middle of a line; that partial line is completed by the earlier chunk read
/// next, so nothing is counted until its newline has been seen.
pub async fn tail_lines(path: &Path, n: usize) -> io::Result<String> {
    if n == 0 {
        return Ok(String::new());
    }

    let mut file = File::open(path).await?;
    let size = file.metadata().await?.len();
    if size == 0 {
        return Ok(String::new());
    }

    let mut chunk = vec![0u8; CHUNK_SIZE];
    // Chunks collected from the end, in reverse file order.
    let mut held: Vec<Vec<u8>> = Vec::new();
    let mut newlines = 0;
    let mut pos = size;

    'read: while pos > 0 {
        let len = CHUNK_SIZE.min(pos as usize);
        pos -= len as u64;
        file.seek(SeekFrom::Start(pos)).await?;
        file.read_exact(&mut chunk[..len]).await?;
        let buf = &chunk[..len];

        for (offset, _) in buf.iter().enumerate().rev().filter(|(_, b)| **b == b'\n') {
            // A newline as the file's final byte ends the last line.
            if pos + offset as u64 == size - 1 {
                continue;
            }
            newlines += 1;
            if newlines == n {
                held.push(buf[offset + 1..].to_vec());
                break 'read;
            }
        }
        held.push(buf.to_vec());
    }

    let total = held.iter().map(Vec::len).sum();
    let mut out = Vec::with_capacity(total);
    for part in held.iter().rev() {
        out.extend_from_slice(part);
    }
    Ok(into_text(out))
}

fn into_text(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}
