//! Tape device configuration.
//!
//! The configuration file is line oriented, one `Key: value` pair per line. Blank lines and lines starting
//! with `#` are skipped. Delays are given in milliseconds.
//!
//! ```text
//! # device parameters
//! MemoryBufferSize: 5
//! TapeReadDelay: 2
//! TapeWriteDelay: 2
//! TapeShiftDelay: 1
//! TapeRewindDelay: 10
//! ```

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::TapeError;

const MEMORY_BUFFER_SIZE_KEY: &str = "MemoryBufferSize";
const READ_DELAY_KEY: &str = "TapeReadDelay";
const WRITE_DELAY_KEY: &str = "TapeWriteDelay";
const SHIFT_DELAY_KEY: &str = "TapeShiftDelay";
const REWIND_DELAY_KEY: &str = "TapeRewindDelay";

/// Immutable tape device parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapeDeviceConfig {
    /// Number of values the device memory buffer holds.
    buffer_capacity: usize,
    /// Emulated cell read latency.
    read_delay: Duration,
    /// Emulated cell write latency.
    write_delay: Duration,
    /// Emulated one cell shift latency.
    shift_delay: Duration,
    /// Emulated rewind latency.
    rewind_delay: Duration,
}

impl TapeDeviceConfig {
    /// Creates a configuration with the given buffer capacity and no delays.
    pub fn new(buffer_capacity: usize) -> Result<Self, TapeError> {
        TapeDeviceConfigBuilder::new().with_buffer_capacity(buffer_capacity).build()
    }

    /// Loads a configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self, TapeError> {
        let content = fs::read_to_string(path)
            .map_err(|err| TapeError::Config(format!("unable to read '{}': {}", path.display(), err)))?;

        return content.parse();
    }

    pub fn buffer_capacity(&self) -> usize {
        self.buffer_capacity
    }

    pub fn read_delay(&self) -> Duration {
        self.read_delay
    }

    pub fn write_delay(&self) -> Duration {
        self.write_delay
    }

    pub fn shift_delay(&self) -> Duration {
        self.shift_delay
    }

    pub fn rewind_delay(&self) -> Duration {
        self.rewind_delay
    }
}

impl FromStr for TapeDeviceConfig {
    type Err = TapeError;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        let mut builder = TapeDeviceConfigBuilder::new();
        let mut capacity_set = false;

        for (idx, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let line_no = idx + 1;
            let (key, value) = line
                .split_once(':')
                .ok_or_else(|| TapeError::Config(format!("line {}: expected 'Key: value', got '{}'", line_no, line)))?;
            let (key, value) = (key.trim(), value.trim());

            builder = match key {
                MEMORY_BUFFER_SIZE_KEY => {
                    capacity_set = true;
                    builder.with_buffer_capacity(parse_value(line_no, key, value)?)
                }
                READ_DELAY_KEY => builder.with_read_delay(parse_delay(line_no, key, value)?),
                WRITE_DELAY_KEY => builder.with_write_delay(parse_delay(line_no, key, value)?),
                SHIFT_DELAY_KEY => builder.with_shift_delay(parse_delay(line_no, key, value)?),
                REWIND_DELAY_KEY => builder.with_rewind_delay(parse_delay(line_no, key, value)?),
                unknown => {
                    return Err(TapeError::Config(format!("line {}: unknown option '{}'", line_no, unknown)));
                }
            };
        }

        if !capacity_set {
            return Err(TapeError::Config(format!("'{}' is required", MEMORY_BUFFER_SIZE_KEY)));
        }

        return builder.build();
    }
}

fn parse_value<T: FromStr>(line_no: usize, key: &str, value: &str) -> Result<T, TapeError>
where
    T::Err: fmt::Display,
{
    value
        .parse()
        .map_err(|err| TapeError::Config(format!("line {}: invalid '{}' value '{}': {}", line_no, key, value, err)))
}

fn parse_delay(line_no: usize, key: &str, value: &str) -> Result<Duration, TapeError> {
    parse_value(line_no, key, value).map(Duration::from_millis)
}

impl fmt::Display for TapeDeviceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}: {}", MEMORY_BUFFER_SIZE_KEY, self.buffer_capacity)?;
        writeln!(f, "{}: {}", READ_DELAY_KEY, self.read_delay.as_millis())?;
        writeln!(f, "{}: {}", WRITE_DELAY_KEY, self.write_delay.as_millis())?;
        writeln!(f, "{}: {}", SHIFT_DELAY_KEY, self.shift_delay.as_millis())?;
        write!(f, "{}: {}", REWIND_DELAY_KEY, self.rewind_delay.as_millis())
    }
}

/// Tape device configuration builder. Provides methods for [`TapeDeviceConfig`] initialization.
#[derive(Debug, Clone)]
pub struct TapeDeviceConfigBuilder {
    buffer_capacity: usize,
    read_delay: Duration,
    write_delay: Duration,
    shift_delay: Duration,
    rewind_delay: Duration,
}

impl TapeDeviceConfigBuilder {
    /// Creates an instance of a builder with default parameters.
    pub fn new() -> Self {
        TapeDeviceConfigBuilder::default()
    }

    /// Builds a [`TapeDeviceConfig`] instance. Fails if the buffer capacity is not greater than 1.
    pub fn build(self) -> Result<TapeDeviceConfig, TapeError> {
        if self.buffer_capacity <= 1 {
            return Err(TapeError::Config(format!(
                "'{}' must be greater than 1, got {}",
                MEMORY_BUFFER_SIZE_KEY, self.buffer_capacity
            )));
        }

        return Ok(TapeDeviceConfig {
            buffer_capacity: self.buffer_capacity,
            read_delay: self.read_delay,
            write_delay: self.write_delay,
            shift_delay: self.shift_delay,
            rewind_delay: self.rewind_delay,
        });
    }

    /// Sets device memory buffer capacity.
    pub fn with_buffer_capacity(mut self, buffer_capacity: usize) -> TapeDeviceConfigBuilder {
        self.buffer_capacity = buffer_capacity;
        return self;
    }

    pub fn with_read_delay(mut self, delay: Duration) -> TapeDeviceConfigBuilder {
        self.read_delay = delay;
        return self;
    }

    pub fn with_write_delay(mut self, delay: Duration) -> TapeDeviceConfigBuilder {
        self.write_delay = delay;
        return self;
    }

    pub fn with_shift_delay(mut self, delay: Duration) -> TapeDeviceConfigBuilder {
        self.shift_delay = delay;
        return self;
    }

    pub fn with_rewind_delay(mut self, delay: Duration) -> TapeDeviceConfigBuilder {
        self.rewind_delay = delay;
        return self;
    }
}

impl Default for TapeDeviceConfigBuilder {
    fn default() -> Self {
        TapeDeviceConfigBuilder {
            buffer_capacity: 0,
            read_delay: Duration::ZERO,
            write_delay: Duration::ZERO,
            shift_delay: Duration::ZERO,
            rewind_delay: Duration::ZERO,
        }
    }
}
