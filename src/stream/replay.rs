//! In-memory socket that serves scripted (or previously recorded) inbound bytes and captures
//! everything written to it.

use std::collections::VecDeque;
use std::fs;
use std::io;
use std::io::ErrorKind::{BrokenPipe, NotConnected, WouldBlock};
use std::io::{Read, Write};
use std::path::Path;

use crate::stream::Socket;

#[derive(Debug)]
pub struct ReplayStream {
    inbound: VecDeque<u8>,
    outbound: Vec<u8>,
    open: bool,
    end_of_stream: bool,
    fail_writes: bool,
    block_writes: bool,
    read_chunk: usize,
}

impl Default for ReplayStream {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplayStream {
    pub fn new() -> ReplayStream {
        Self {
            inbound: VecDeque::new(),
            outbound: Vec::new(),
            open: true,
            end_of_stream: false,
            fail_writes: false,
            block_writes: false,
            read_chunk: usize::MAX,
        }
    }

    pub fn from_bytes(bytes: impl AsRef<[u8]>) -> ReplayStream {
        let mut stream = Self::new();
        stream.feed(bytes);
        stream
    }

    /// Replays an inbound recording. The stream reports end of stream once the whole file has
    /// been read.
    pub fn from_file(path: impl AsRef<Path>) -> io::Result<ReplayStream> {
        let mut stream = Self::from_bytes(fs::read(path)?);
        stream.end_of_stream();
        Ok(stream)
    }

    /// Hands out at most `read_chunk` bytes per read.
    pub fn with_read_chunk(self, read_chunk: usize) -> ReplayStream {
        Self {
            read_chunk: read_chunk.max(1),
            ..self
        }
    }

    /// Queues bytes to be read.
    pub fn feed(&mut self, bytes: impl AsRef<[u8]>) {
        self.inbound.extend(bytes.as_ref());
    }

    /// Once the queued bytes are drained reads return `0` (peer closed) instead of blocking.
    pub fn end_of_stream(&mut self) {
        self.end_of_stream = true;
    }

    /// Makes every following write fail with [`io::ErrorKind::BrokenPipe`].
    pub fn fail_writes(&mut self) {
        self.fail_writes = true;
    }

    /// Makes every following write report [`io::ErrorKind::WouldBlock`], like a peer that stopped
    /// reading.
    pub fn block_writes(&mut self) {
        self.block_writes = true;
    }

    pub fn written(&self) -> &[u8] {
        &self.outbound
    }

    pub fn take_written(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.outbound)
    }
}

impl Read for ReplayStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.open {
            return Err(io::Error::from(NotConnected));
        }
        if self.inbound.is_empty() {
            return match self.end_of_stream {
                true => Ok(0),
                false => Err(io::Error::from(WouldBlock)),
            };
        }
        let len = buf.len().min(self.read_chunk).min(self.inbound.len());
        for (dst, src) in buf.iter_mut().zip(self.inbound.drain(..len)) {
            *dst = src;
        }
        Ok(len)
    }
}

impl Write for ReplayStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.open {
            return Err(io::Error::from(NotConnected));
        }
        if self.fail_writes {
            return Err(io::Error::new(BrokenPipe, "write failed"));
        }
        if self.block_writes {
            return Err(io::Error::from(WouldBlock));
        }
        self.outbound.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Socket for ReplayStream {
    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) -> io::Result<()> {
        self.open = false;
        Ok(())
    }
}
