use std::io::{Read, Seek, SeekFrom, Write};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};

use crate::error::Result;
use crate::package::Title;

/// Readable archive over a decrypted save package.
///
/// Strings on the wire are a little endian length word followed by that many
/// bytes, the last of which is a NUL. A length of zero (no bytes at all
/// follow) encodes the empty string, and a negative length is tolerated and
/// also read as empty.
pub trait ArchiveReader: Read + Seek {
    fn title(&self) -> Title;

    fn read_string(&mut self) -> Result<String> {
        let len = self.read_i32::<LE>()?;
        if len <= 0 {
            return Ok(String::new());
        }
        let mut chars = vec![0; len as usize];
        self.read_exact(&mut chars)?;
        while chars.last() == Some(&0) {
            chars.pop();
        }
        Ok(String::from_utf8_lossy(&chars).into_owned())
    }

    /// Reads a string and puts the stream back where it was.
    fn peek_string(&mut self) -> Result<String> {
        let pos = self.stream_position()?;
        let value = self.read_string()?;
        self.seek(SeekFrom::Start(pos))?;
        Ok(value)
    }

    /// Backs the stream up over a non-empty string that was just read.
    fn rewind_string(&mut self, value: &str) -> Result<()> {
        let span = 4 + value.len() as i64 + 1;
        self.seek(SeekFrom::Current(-span))?;
        Ok(())
    }
}

/// Writable archive producing the plaintext form of a save package.
pub trait ArchiveWriter: Write + Seek {
    fn title(&self) -> Title;

    fn write_string(&mut self, value: &str) -> Result<()> {
        if value.is_empty() {
            self.write_i32::<LE>(0)?;
            return Ok(());
        }
        self.write_i32::<LE>(value.len() as i32 + 1)?;
        self.write_all(value.as_bytes())?;
        self.write_u8(0)?;
        Ok(())
    }
}
