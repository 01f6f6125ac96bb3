//! `tape-sort` is a sequential access tape device emulator and an external sort algorithm running on it.
//!
//! A tape can't be accessed randomly: the device head moves one cell at a time in either direction, values
//! are kept in a bounded memory buffer, and every operation takes time. External sorting is a class of
//! sorting algorithms that can handle data not fitting into that memory. The sorter splits the input tape
//! into runs that fit in the device memory, sorts every run and merges them together into the output tape.
//! For more information see [External Sorting](https://en.wikipedia.org/wiki/External_sorting).
//!
//! # Overview
//!
//! * **Tape device:**
//!   [`TapeDevice`] reads, writes, shifts and rewinds a text file tape holding decimal values separated by a
//!   single whitespace character. It can be rebound to another tape in any [`TapeMode`].
//! * **Bounded memory:**
//!   the device memory buffer is circular and never grows beyond the configured capacity.
//! * **Latency emulation:**
//!   read, write, shift and rewind delays are taken from [`TapeDeviceConfig`].
//! * **External sorting:**
//!   [`ExternalSorter`] sorts a tape of any length using only the device operations and temporary tapes.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use tape_sort::{ExternalSorterBuilder, TapeDevice, TapeDeviceConfig, TapeMode};
//!
//! fn main() {
//!     let input = Path::new("input.txt");
//!     let config = TapeDeviceConfig::from_file(Path::new("config/device_config.txt")).unwrap();
//!     let mut device = TapeDevice::new(input, TapeMode::ReadWrite, config).unwrap();
//!
//!     let mut sorter = ExternalSorterBuilder::new()
//!         .with_input(input)
//!         .with_output(Path::new("output.txt"))
//!         .with_tmp_dir(Path::new("./"))
//!         .build()
//!         .unwrap();
//!
//!     sorter.sort(&mut device).unwrap();
//! }
//! ```

pub mod buffer;
pub mod config;
pub mod error;
pub mod merger;
pub mod run;
pub mod sort;
pub mod tape;

pub use buffer::RingBuffer;
pub use config::{TapeDeviceConfig, TapeDeviceConfigBuilder};
pub use error::TapeError;
pub use merger::TapeMerger;
pub use run::TapeRun;
pub use sort::{ExternalSorter, ExternalSorterBuilder, SortError};
pub use tape::{TapeDevice, TapeMode};

/// Tape cell value.
pub type Value = u32;
