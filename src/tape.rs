//! Sequential access tape device emulator.
//!
//! A tape is a text file holding decimal values separated by a single whitespace character, for example
//! `2 9 4 1 7 6 3 5 8 10`. The device reaches the values only through its head, which moves one cell at a
//! time, and keeps read values in a bounded circular memory buffer. Every operation pauses for the latency
//! configured in [`TapeDeviceConfig`].

use std::fmt;
use std::fs;
use std::io::{self, prelude::*, SeekFrom};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use log;
use tempfile;

use crate::buffer::RingBuffer;
use crate::{TapeDeviceConfig, TapeError, Value};

/// Tape device operation mode.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TapeMode {
    /// Existing tape, read and shift only.
    Read,
    /// Tape is truncated or created, sequential writes only.
    Write,
    /// Existing tape, read, shift and in-place value substitution.
    ReadWrite,
    /// Tape is opened or created, sequential writes after the last cell only.
    Append,
}

impl TapeMode {
    fn is_readable(self) -> bool {
        matches!(self, TapeMode::Read | TapeMode::ReadWrite)
    }

    fn is_sequential(self) -> bool {
        matches!(self, TapeMode::Write | TapeMode::Append)
    }
}

impl fmt::Display for TapeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TapeMode::Read => "read",
            TapeMode::Write => "write",
            TapeMode::ReadWrite => "read-write",
            TapeMode::Append => "append",
        };
        f.write_str(name)
    }
}

/// Open backing store handle.
enum TapeHandle {
    Reader(io::BufReader<fs::File>),
    Writer(fs::File),
}

/// A value token located on the tape: `start..end` byte span and its text.
struct Token {
    start: u64,
    end: u64,
    text: String,
}

/// Tape device emulator.
///
/// The device is attached to exactly one tape at a time and may be moved to another tape with
/// [`TapeDevice::replace_tape`]. The head never moves as a side effect of [`TapeDevice::read`], only shifts,
/// rewinds and rebinding move it.
pub struct TapeDevice {
    config: TapeDeviceConfig,
    /// Attached tape path.
    path: PathBuf,
    mode: TapeMode,
    handle: TapeHandle,
    /// Index of the cell under the head.
    head: usize,
    /// Byte offset of the cell under the head.
    offset: u64,
    at_start: bool,
    at_end: bool,
    /// Tape holds data in Write or Append mode, so the next value gets a separator.
    first_write_done: bool,
    buffer: RingBuffer<Value>,
}

impl TapeDevice {
    /// Creates a device attached to the tape at `path`.
    pub fn new(path: &Path, mode: TapeMode, config: TapeDeviceConfig) -> Result<Self, TapeError> {
        let (handle, first_write_done) = open_tape(path, mode)?;
        log::debug!("tape device attached to {} ({})", path.display(), mode);

        return Ok(TapeDevice {
            buffer: RingBuffer::new(config.buffer_capacity()),
            config,
            path: path.to_path_buf(),
            mode,
            handle,
            head: 0,
            offset: 0,
            at_start: mode != TapeMode::Append,
            at_end: mode == TapeMode::Append,
            first_write_done,
        });
    }

    /// Reads the value under the head into the next memory buffer slot and returns it.
    ///
    /// The head doesn't move. If the cell is the last one on the tape, the end of tape flag is set.
    pub fn read(&mut self) -> Result<Value, TapeError> {
        if !self.mode.is_readable() {
            return Err(TapeError::InvalidOperation(format!("read is not supported in {} mode", self.mode)));
        }
        if self.at_end {
            return Err(TapeError::EndOfTape);
        }

        let offset = self.offset;
        let (token, is_last) = {
            let reader = self.reader()?;
            match scan_token(reader, offset)? {
                Some(token) => {
                    let is_last = find_token(reader, token.end)?.is_none();
                    (Some(token), is_last)
                }
                None => (None, false),
            }
        };
        let token = token.ok_or_else(|| {
            TapeError::BadTape(format!("no value found on {} at cell {}", self.path.display(), self.head))
        })?;
        let value = parse_cell(&token)?;

        self.at_end = is_last;
        self.buffer.push(value);

        log::trace!("read {} at cell {}", value, self.head);
        emulate(self.config.read_delay());

        return Ok(value);
    }

    /// Writes a value to the tape.
    ///
    /// In Write and Append modes the value is added after the last cell. In ReadWrite mode the value under
    /// the head is substituted, the rest of the tape is kept as is.
    pub fn write(&mut self, value: Value) -> Result<(), TapeError> {
        match self.mode {
            TapeMode::Read => {
                return Err(TapeError::InvalidOperation(format!("write is not supported in {} mode", self.mode)));
            }
            TapeMode::Write | TapeMode::Append => self.append_cell(value)?,
            TapeMode::ReadWrite => self.substitute_cell(value)?,
        }

        log::trace!("wrote {} ({})", value, self.mode);
        emulate(self.config.write_delay());

        return Ok(());
    }

    /// Moves the head one cell towards the start of the tape. Does nothing if the head is at the start.
    pub fn shift_left(&mut self) -> Result<(), TapeError> {
        self.check_positioning("shift left")?;
        if self.at_start {
            return Ok(());
        }

        self.at_end = false;
        let offset = self.offset;
        self.offset = previous_token(self.reader()?, offset)?;
        self.head = self.head.saturating_sub(1);
        if self.head == 0 {
            self.offset = 0;
            self.at_start = true;
        }

        log::trace!("shifted left to cell {}", self.head);
        emulate(self.config.shift_delay());

        return Ok(());
    }

    /// Moves the head one cell towards the end of the tape. Does nothing if the head is at the end.
    ///
    /// Moving past the last cell sets the end of tape flag, the head counter stays at the last cell.
    pub fn shift_right(&mut self) -> Result<(), TapeError> {
        self.check_positioning("shift right")?;
        if self.at_end {
            return Ok(());
        }

        let offset = self.offset;
        let reader = self.reader()?;
        let next = match scan_token(reader, offset)? {
            Some(token) => find_token(reader, token.end)?,
            None => None,
        };

        match next {
            Some(next) => {
                self.offset = next;
                self.head += 1;
                self.at_start = false;
            }
            None => self.at_end = true,
        }

        log::trace!("shifted right to cell {} (end: {})", self.head, self.at_end);
        emulate(self.config.shift_delay());

        return Ok(());
    }

    /// Moves the head to the first cell.
    pub fn rewind(&mut self) -> Result<(), TapeError> {
        self.check_positioning("rewind")?;

        self.head = 0;
        self.offset = 0;
        self.at_start = true;
        self.at_end = false;

        log::trace!("rewound {}", self.path.display());
        emulate(self.config.rewind_delay());

        return Ok(());
    }

    /// Attaches the device to another tape.
    ///
    /// The new tape is opened before the current one is released, so on failure the device stays attached
    /// to the current tape. The head is placed at the first cell, or after the last one in Append mode.
    pub fn replace_tape(&mut self, path: &Path, mode: TapeMode) -> Result<(), TapeError> {
        let (handle, first_write_done) = open_tape(path, mode)?;

        self.handle = handle;
        self.path = path.to_path_buf();
        self.mode = mode;
        self.first_write_done = first_write_done;
        self.head = 0;
        self.offset = 0;
        self.at_start = mode != TapeMode::Append;
        self.at_end = mode == TapeMode::Append;

        log::trace!("tape replaced with {} ({})", path.display(), mode);

        return Ok(());
    }

    /// Returns the memory buffer value at the buffer cursor.
    pub fn buffer_current(&self) -> Value {
        self.buffer.current()
    }

    /// Returns the memory buffer value at `index`.
    pub fn buffer_value_at(&self, index: usize) -> Result<Value, TapeError> {
        self.buffer.get(index).ok_or(TapeError::OutOfRange {
            index,
            capacity: self.buffer.capacity(),
        })
    }

    /// Returns a copy of the memory buffer and the buffer cursor.
    pub fn buffer_snapshot(&self) -> (Vec<Value>, usize) {
        self.buffer.snapshot()
    }

    /// Loads up to buffer capacity values into the memory buffer, zero-fills the rest and resets the cursor.
    pub fn load_buffer(&mut self, values: &[Value]) {
        self.buffer.load(values);
    }

    pub fn reset_buffer_cursor(&mut self) {
        self.buffer.reset_cursor();
    }

    pub fn buffer_capacity(&self) -> usize {
        self.buffer.capacity()
    }

    pub fn head_position(&self) -> usize {
        self.head
    }

    pub fn at_start(&self) -> bool {
        self.at_start
    }

    pub fn at_end(&self) -> bool {
        self.at_end
    }

    pub fn mode(&self) -> TapeMode {
        self.mode
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &TapeDeviceConfig {
        &self.config
    }

    fn check_positioning(&self, operation: &str) -> Result<(), TapeError> {
        if self.mode.is_sequential() {
            return Err(TapeError::InvalidOperation(format!(
                "{} is not supported in {} mode",
                operation, self.mode
            )));
        }
        Ok(())
    }

    fn reader(&mut self) -> Result<&mut io::BufReader<fs::File>, TapeError> {
        match &mut self.handle {
            TapeHandle::Reader(reader) => Ok(reader),
            TapeHandle::Writer(_) => Err(TapeError::InvalidOperation(format!(
                "tape is not readable in {} mode",
                self.mode
            ))),
        }
    }

    fn append_cell(&mut self, value: Value) -> Result<(), TapeError> {
        let writer = match &mut self.handle {
            TapeHandle::Writer(writer) => writer,
            TapeHandle::Reader(_) => {
                return Err(TapeError::InvalidOperation(format!("tape is not writable in {} mode", self.mode)));
            }
        };

        if self.first_write_done {
            writer.write_all(b" ")?;
        }
        writer.write_all(value.to_string().as_bytes())?;
        writer.flush()?;
        self.first_write_done = true;

        Ok(())
    }

    /// Substitutes the value under the head by rewriting the tape through a swap file placed next to it.
    /// Byte offsets before the head are unaffected, so the head state remains valid. The swap file takes
    /// over the tape permissions.
    fn substitute_cell(&mut self, value: Value) -> Result<(), TapeError> {
        let tape_dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut swap = io::BufWriter::new(tempfile::NamedTempFile::new_in(&tape_dir)?);

        let offset = self.offset;
        let reader = self.reader()?;
        let (start, end) = match scan_token(reader, offset)? {
            Some(token) => (token.start, token.end),
            None => (offset, offset),
        };

        reader.seek(SeekFrom::Start(0))?;
        io::copy(&mut reader.by_ref().take(start), &mut swap)?;
        swap.write_all(value.to_string().as_bytes())?;
        reader.seek(SeekFrom::Start(end))?;
        io::copy(reader, &mut swap)?;

        let swap = swap.into_inner().map_err(|err| TapeError::IO(err.into_error()))?;
        fs::set_permissions(swap.path(), fs::metadata(&self.path)?.permissions())?;
        swap.persist(&self.path).map_err(|err| TapeError::IO(err.error))?;

        let (handle, _) = open_tape(&self.path, TapeMode::ReadWrite)?;
        self.handle = handle;

        Ok(())
    }
}

impl fmt::Debug for TapeDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TapeDevice")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("head", &self.head)
            .field("at_start", &self.at_start)
            .field("at_end", &self.at_end)
            .field("buffer_cursor", &self.buffer.cursor())
            .finish()
    }
}

/// Opens a tape according to the mode.
/// Returns the handle and whether the tape already holds data that the next sequential write must follow.
fn open_tape(path: &Path, mode: TapeMode) -> Result<(TapeHandle, bool), TapeError> {
    let mut options = fs::OpenOptions::new();
    match mode {
        TapeMode::Read => options.read(true),
        TapeMode::Write => options.write(true).create(true).truncate(true),
        TapeMode::ReadWrite => options.read(true).write(true),
        TapeMode::Append => options.append(true).create(true),
    };

    let file = options
        .open(path)
        .map_err(|err| TapeError::BadTape(format!("unable to open tape {}: {}", path.display(), err)))?;

    return Ok(match mode {
        TapeMode::Read | TapeMode::ReadWrite => (TapeHandle::Reader(io::BufReader::new(file)), false),
        TapeMode::Write => (TapeHandle::Writer(file), false),
        TapeMode::Append => {
            let has_data = file.metadata()?.len() > 0;
            (TapeHandle::Writer(file), has_data)
        }
    });
}

fn emulate(delay: Duration) {
    if !delay.is_zero() {
        thread::sleep(delay);
    }
}

fn is_separator(byte: u8) -> bool {
    // \x0b is not covered by `is_ascii_whitespace`
    byte.is_ascii_whitespace() || byte == 0x0b
}

fn bad_char(byte: u8, pos: u64) -> TapeError {
    TapeError::BadTape(format!("invalid character {:?} at byte {}", byte as char, pos))
}

fn read_byte<R: Read>(reader: &mut R) -> io::Result<Option<u8>> {
    let mut byte = [0u8; 1];
    loop {
        match reader.read(&mut byte) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(byte[0])),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
}

/// Scans the first token at or after `from`. Returns [`None`] if only separators remain.
fn scan_token<R: Read + Seek>(reader: &mut R, from: u64) -> Result<Option<Token>, TapeError> {
    reader.seek(SeekFrom::Start(from))?;

    let mut pos = from;
    let mut start = None;
    let mut text = String::new();

    while let Some(byte) = read_byte(reader)? {
        if is_separator(byte) {
            if start.is_some() {
                break;
            }
        } else if byte.is_ascii_digit() {
            start.get_or_insert(pos);
            text.push(byte as char);
        } else {
            return Err(bad_char(byte, pos));
        }
        pos += 1;
    }

    Ok(start.map(|start| Token { start, end: pos, text }))
}

/// Returns the offset of the first token at or after `from`.
fn find_token<R: Read + Seek>(reader: &mut R, from: u64) -> Result<Option<u64>, TapeError> {
    reader.seek(SeekFrom::Start(from))?;

    let mut pos = from;
    while let Some(byte) = read_byte(reader)? {
        if byte.is_ascii_digit() {
            return Ok(Some(pos));
        }
        if !is_separator(byte) {
            return Err(bad_char(byte, pos));
        }
        pos += 1;
    }

    Ok(None)
}

/// Returns the offset of the token preceding the one starting at `offset`, scanning the tape backwards.
fn previous_token<R: Read + Seek>(reader: &mut R, offset: u64) -> Result<u64, TapeError> {
    let mut pos = offset;
    let mut in_token = false;

    while pos > 0 {
        reader.seek(SeekFrom::Start(pos - 1))?;
        let byte = read_byte(reader)?
            .ok_or_else(|| TapeError::BadTape(format!("tape truncated at byte {}", pos - 1)))?;

        if is_separator(byte) {
            if in_token {
                return Ok(pos);
            }
        } else if byte.is_ascii_digit() {
            in_token = true;
        } else {
            return Err(bad_char(byte, pos - 1));
        }
        pos -= 1;
    }

    Ok(0)
}

fn parse_cell(token: &Token) -> Result<Value, TapeError> {
    token
        .text
        .parse()
        .map_err(|err| TapeError::BadTape(format!("invalid value '{}' at byte {}: {}", token.text, token.start, err)))
}
