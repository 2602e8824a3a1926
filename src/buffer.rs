//! Growable read buffer shared by the handshake and the frame decoder.

use std::io;
use std::io::Read;

use memchr::memchr;

use crate::util::NoBlock;

const DEFAULT_INITIAL_CAPACITY: usize = 4096;

/// Bytes read from a socket but not yet consumed. Data is appended at `tail` in chunks of at most
/// `CHUNK_SIZE` bytes and consumed from `head`. Leftovers are moved to the front before the next
/// read so the buffer only grows when a single frame does not fit.
#[derive(Debug)]
pub struct ReadBuffer<const CHUNK_SIZE: usize, const INITIAL_CAPACITY: usize = DEFAULT_INITIAL_CAPACITY> {
    inner: Vec<u8>,
    head: usize,
    tail: usize,
}

impl<const CHUNK_SIZE: usize, const INITIAL_CAPACITY: usize> Default for ReadBuffer<CHUNK_SIZE, INITIAL_CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const CHUNK_SIZE: usize, const INITIAL_CAPACITY: usize> ReadBuffer<CHUNK_SIZE, INITIAL_CAPACITY> {
    pub fn new() -> ReadBuffer<CHUNK_SIZE, INITIAL_CAPACITY> {
        assert!(CHUNK_SIZE > 0, "CHUNK_SIZE must be greater than zero");
        Self {
            inner: vec![0u8; INITIAL_CAPACITY.max(CHUNK_SIZE)],
            head: 0,
            tail: 0,
        }
    }

    #[inline]
    pub const fn available(&self) -> usize {
        self.tail - self.head
    }

    /// Reads at most one chunk from the `stream`. Returns the number of bytes read, `0` if the
    /// stream would block. End of stream is reported as [`io::ErrorKind::UnexpectedEof`].
    pub fn read_from<S: Read>(&mut self, stream: &mut S) -> io::Result<usize> {
        #[cold]
        fn grow(buf: &mut Vec<u8>, min_len: usize) {
            let mut len = buf.len().max(1);
            while len < min_len {
                len *= 2;
            }
            buf.resize(len, 0u8);
        }

        if self.head > 0 {
            if self.available() > 0 {
                self.inner.copy_within(self.head..self.tail, 0);
            }
            self.tail -= self.head;
            self.head = 0;
        }

        if self.tail + CHUNK_SIZE > self.inner.len() {
            grow(&mut self.inner, self.tail + CHUNK_SIZE);
        }

        let read = stream
            .read(&mut self.inner[self.tail..self.tail + CHUNK_SIZE])
            .no_block()?;

        self.tail += read;
        Ok(read)
    }

    /// Consumes `len` bytes and returns them.
    #[inline]
    pub fn consume_next(&mut self, len: usize) -> &[u8] {
        let start = self.head;
        self.consume(len);
        &self.inner[start..start + len]
    }

    /// Consumes the next line if a complete one (terminated by `\n`) is buffered. The returned
    /// line has its `\r\n` (or bare `\n`) terminator stripped.
    pub fn consume_line(&mut self) -> Option<&[u8]> {
        let pos = memchr(b'\n', self.view())?;
        let line = self.consume_next(pos + 1);
        let line = &line[..pos];
        Some(line.strip_suffix(b"\r").unwrap_or(line))
    }

    #[inline]
    pub fn view(&self) -> &[u8] {
        &self.inner[self.head..self.tail]
    }

    #[inline]
    pub fn consume(&mut self, len: usize) {
        #[cold]
        fn bounds_violation(head: usize, tail: usize) -> ! {
            panic!("bounds violation:  head[{}] > tail[{}]", head, tail)
        }

        self.head += len;

        if self.head > self.tail {
            bounds_violation(self.head, self.tail);
        }
    }
}
