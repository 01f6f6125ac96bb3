//! K-way tape merger.

use crate::run::TapeRun;
use crate::{TapeDevice, TapeError, TapeMode, Value};

/// Merges sorted run tapes into a single ascending sequence through a tape device.
///
/// Every step visits each unexhausted run, seeks to its read cursor from the start of the tape and reads the
/// value there. The smallest value wins, ties go to the run that comes first. This takes
/// *m* \* *n* device reads in total where *m* is the number of values and *n* is the number of runs.
pub struct TapeMerger<'a> {
    runs: &'a [TapeRun],
    cursors: Vec<usize>,
}

impl<'a> TapeMerger<'a> {
    /// Creates a merger over `runs`. Run values should be sorted in ascending order otherwise the result is
    /// undefined.
    pub fn new(runs: &'a [TapeRun]) -> Self {
        TapeMerger {
            runs,
            cursors: vec![0; runs.len()],
        }
    }

    /// Number of values not yet merged.
    pub fn remaining(&self) -> usize {
        self.runs
            .iter()
            .zip(&self.cursors)
            .map(|(run, cursor)| run.len() - cursor)
            .sum()
    }

    /// Returns the next value in ascending order or [`None`] once every run is exhausted.
    /// The device is left attached to the last visited run.
    pub fn next_min(&mut self, device: &mut TapeDevice) -> Result<Option<Value>, TapeError> {
        let mut min: Option<(Value, usize)> = None;

        for (idx, run) in self.runs.iter().enumerate() {
            let cursor = self.cursors[idx];
            if cursor >= run.len() {
                continue;
            }

            device.replace_tape(run.path(), TapeMode::Read)?;
            for _ in 0..cursor {
                device.shift_right()?;
            }
            let value = device.read()?;

            if min.map_or(true, |(min_value, _)| value < min_value) {
                min = Some((value, idx));
            }
        }

        return Ok(min.map(|(value, idx)| {
            self.cursors[idx] += 1;
            value
        }));
    }
}
