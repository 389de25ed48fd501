use std::io::{self, Read, Write};

use crate::error::{EmsError, Result};

/// Fixed width of a pipe-name field in the wire protocol, matching the
/// original's `PIPENAME_SIZE` constant.
pub const PIPENAME_SIZE: usize = 40;

/// Fixed width of the error-text field SHOW/LIST send back on failure.
pub const ERROR_TEXT_SIZE: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Connect = b'1',
    Quit = b'2',
    Create = b'3',
    Reserve = b'4',
    Show = b'5',
    List = b'6',
}

impl TryFrom<u8> for OpCode {
    type Error = EmsError;

    fn try_from(byte: u8) -> Result<Self> {
        match byte {
            b'1' => Ok(OpCode::Connect),
            b'2' => Ok(OpCode::Quit),
            b'3' => Ok(OpCode::Create),
            b'4' => Ok(OpCode::Reserve),
            b'5' => Ok(OpCode::Show),
            b'6' => Ok(OpCode::List),
            other => Err(EmsError::FifoProtocolError(format!("unknown opcode {other}"))),
        }
    }
}

/// Retries a blocking I/O operation on `ErrorKind::Interrupted`.
fn retry_eintr<T>(mut op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    loop {
        match op() {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

pub fn read_exact<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<()> {
    retry_eintr(|| r.read_exact(buf)).map_err(EmsError::from)
}

pub fn write_all<W: Write>(w: &mut W, buf: &[u8]) -> Result<()> {
    retry_eintr(|| w.write_all(buf)).map_err(EmsError::from)
}

pub fn read_u8<R: Read>(r: &mut R) -> Result<u8> {
    let mut buf = [0u8; 1];
    read_exact(r, &mut buf)?;
    Ok(buf[0])
}

pub fn write_u8<W: Write>(w: &mut W, value: u8) -> Result<()> {
    write_all(w, &[value])
}

pub fn read_u32<R: Read>(r: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    read_exact(r, &mut buf)?;
    Ok(u32::from_ne_bytes(buf))
}

pub fn write_u32<W: Write>(w: &mut W, value: u32) -> Result<()> {
    write_all(w, &value.to_ne_bytes())
}

pub fn read_usize<R: Read>(r: &mut R) -> Result<usize> {
    let mut buf = [0u8; std::mem::size_of::<usize>()];
    read_exact(r, &mut buf)?;
    Ok(usize::from_ne_bytes(buf))
}

pub fn write_usize<W: Write>(w: &mut W, value: usize) -> Result<()> {
    write_all(w, &value.to_ne_bytes())
}

pub fn read_pipe_name<R: Read>(r: &mut R) -> Result<String> {
    let mut buf = [0u8; PIPENAME_SIZE];
    read_exact(r, &mut buf)?;
    let end = buf.iter().position(|&b| b == 0).unwrap_or(PIPENAME_SIZE);
    Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
}

pub fn write_pipe_name<W: Write>(w: &mut W, name: &str) -> Result<()> {
    let mut buf = [0u8; PIPENAME_SIZE];
    let bytes = name.as_bytes();
    let len = bytes.len().min(PIPENAME_SIZE);
    buf[..len].copy_from_slice(&bytes[..len]);
    write_all(w, &buf)
}

pub fn write_error_text<W: Write>(w: &mut W, message: &str) -> Result<()> {
    let mut buf = [0u8; ERROR_TEXT_SIZE];
    let bytes = message.as_bytes();
    let len = bytes.len().min(ERROR_TEXT_SIZE - 1);
    buf[..len].copy_from_slice(&bytes[..len]);
    write_all(w, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn u32_round_trips() {
        let mut buf = Vec::new();
        write_u32(&mut buf, 424242).unwrap();
        let mut cur = Cursor::new(buf);
        assert_eq!(read_u32(&mut cur).unwrap(), 424242);
    }

    #[test]
    fn pipe_name_round_trips_with_null_padding() {
        let mut buf = Vec::new();
        write_pipe_name(&mut buf, "/tmp/req.fifo").unwrap();
        assert_eq!(buf.len(), PIPENAME_SIZE);
        let mut cur = Cursor::new(buf);
        assert_eq!(read_pipe_name(&mut cur).unwrap(), "/tmp/req.fifo");
    }

    #[test]
    fn opcode_roundtrip() {
        assert_eq!(OpCode::try_from(b'3').unwrap(), OpCode::Create);
        assert!(OpCode::try_from(b'9').is_err());
    }
}
