use std::io::{Read, Seek, SeekFrom, Write};

use crate::archive::{ArchiveReader, ArchiveWriter};
use crate::package::Title;

/// Wraps a stream with the title whose format conventions apply to it, so
/// codec functions can consult the registry without threading the title
/// through every call.
pub(crate) struct Context<S> {
    stream: S,
    title: Title,
}

impl<S> Context<S> {
    pub(crate) fn run<F, T>(stream: S, title: Title, f: F) -> T
    where
        F: FnOnce(&mut Context<S>) -> T,
    {
        let mut context = Context { stream, title };
        f(&mut context)
    }
}

impl<R: Read> Read for Context<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.stream.read(buf)
    }
}

impl<S: Seek> Seek for Context<S> {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.stream.seek(pos)
    }
}

impl<W: Write> Write for Context<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.stream.write(buf)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        self.stream.flush()
    }
}

impl<R: Read + Seek> ArchiveReader for Context<R> {
    fn title(&self) -> Title {
        self.title
    }
}

impl<W: Write + Seek> ArchiveWriter for Context<W> {
    fn title(&self) -> Title {
        self.title
    }
}
