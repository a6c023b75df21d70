use std::io::Read;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;

use crate::core::error::{ProvisionError, ProvisionResult};

/// Combined stdout/stderr of a child process, filled either by blocking
/// reader tasks on its pipes or by re-reading the file it writes to.
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        // a panicking reader must not hide the output collected so far
        self.bytes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn append(&self, chunk: &[u8]) {
        self.lock().extend_from_slice(chunk);
    }

    /// Replace the content with the current bytes of `path`.
    pub fn reload(&self, path: &Path) -> ProvisionResult<()> {
        let bytes = std::fs::read(path).map_err(|source| ProvisionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        *self.lock() = bytes;
        Ok(())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.lock()).into_owned()
    }

    pub fn contains(&self, marker: &str) -> bool {
        self.text().contains(marker)
    }

    pub fn lines(&self) -> Vec<String> {
        self.text().lines().map(str::to_string).collect()
    }

    /// Copy everything `reader` produces into the buffer on the blocking
    /// pool. The task ends when the pipe closes.
    pub fn capture<R>(&self, mut reader: R) -> JoinHandle<()>
    where
        R: Read + Send + 'static,
    {
        let buffer = self.clone();
        tokio::task::spawn_blocking(move || {
            let mut chunk = [0_u8; 4096];
            loop {
                match reader.read(&mut chunk) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => buffer.append(&chunk[..n]),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_lines_across_chunks() {
        let buffer = OutputBuffer::new();
        buffer.append(b"[19648,10,12:47:52.297] HTTP ser");
        buffer.append(b"ver is up and listening\nsecond line\n");

        assert!(buffer.contains("HTTP server is up and listening"));
        assert_eq!(
            buffer.lines(),
            ["[19648,10,12:47:52.297] HTTP server is up and listening", "second line"]
        );
    }

    #[tokio::test]
    async fn capture_reads_until_eof() {
        let buffer = OutputBuffer::new();
        let handle = buffer.capture(std::io::Cursor::new(b"one\ntwo\n".to_vec()));
        handle.await.unwrap();
        assert_eq!(buffer.lines(), ["one", "two"]);
    }

    #[test]
    fn reload_replaces_content() {
        let tmp = tempfile::tempdir().unwrap();
        let log = tmp.path().join("event-store.log");
        let buffer = OutputBuffer::new();
        buffer.append(b"stale\n");

        std::fs::write(&log, "booting\n").unwrap();
        buffer.reload(&log).unwrap();
        assert_eq!(buffer.lines(), ["booting"]);

        std::fs::write(&log, "booting\nHTTP server is up and listening\n").unwrap();
        buffer.reload(&log).unwrap();
        assert!(buffer.contains("HTTP server is up and listening"));
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let buffer = OutputBuffer::new();
        buffer.append(&[b'o', b'k', 0xFF, b'\n']);
        assert_eq!(buffer.lines(), ["ok\u{FFFD}"]);
    }
}
