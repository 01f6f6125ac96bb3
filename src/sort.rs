//! External tape sorter.

use log;
use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::io;
use std::path::{Path, PathBuf};

use crate::merger::TapeMerger;
use crate::run::TapeRun;
use crate::{TapeDevice, TapeError, TapeMode, Value};

/// Sorting error.
#[derive(Debug)]
pub enum SortError {
    /// Sorter parameter is missing.
    MissingParameter(&'static str),
    /// Temporary directory or run tape creation error.
    TempDir(io::Error),
    /// Run generation failed.
    Setup(TapeError),
    /// Run sorting failed.
    ForwardPass(TapeError),
    /// Runs merging failed.
    BackwardPass(TapeError),
    /// Output tape writing failed.
    Output(TapeError),
}

impl Error for SortError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self {
            SortError::MissingParameter(_) => None,
            SortError::TempDir(err) => Some(err),
            SortError::Setup(err) => Some(err),
            SortError::ForwardPass(err) => Some(err),
            SortError::BackwardPass(err) => Some(err),
            SortError::Output(err) => Some(err),
        }
    }
}

impl Display for SortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            SortError::MissingParameter(name) => write!(f, "sorter parameter '{}' is not set", name),
            SortError::TempDir(err) => write!(f, "temporary directory or file not created: {}", err),
            SortError::Setup(err) => write!(f, "run generation failed: {}", err),
            SortError::ForwardPass(err) => write!(f, "run sorting failed: {}", err),
            SortError::BackwardPass(err) => write!(f, "runs merging failed: {}", err),
            SortError::Output(err) => write!(f, "output tape writing failed: {}", err),
        }
    }
}

/// External sorter builder. Provides methods for [`ExternalSorter`] initialization.
#[derive(Clone, Default)]
pub struct ExternalSorterBuilder {
    /// Tape to be sorted.
    input: Option<Box<Path>>,
    /// Tape to write sorted values to.
    output: Option<Box<Path>>,
    /// Directory to be used to store temporary tapes.
    tmp_dir: Option<Box<Path>>,
}

impl ExternalSorterBuilder {
    /// Creates an instance of a builder with default parameters.
    pub fn new() -> Self {
        ExternalSorterBuilder::default()
    }

    /// Builds an [`ExternalSorter`] instance using provided configuration.
    pub fn build(self) -> Result<ExternalSorter, SortError> {
        let input = self.input.ok_or(SortError::MissingParameter("input"))?;
        let output = self.output.ok_or(SortError::MissingParameter("output"))?;

        ExternalSorter::new(&input, &output, self.tmp_dir.as_deref())
    }

    /// Sets the tape to be sorted.
    pub fn with_input(mut self, path: &Path) -> ExternalSorterBuilder {
        self.input = Some(path.into());
        return self;
    }

    /// Sets the tape sorted values are written to. The tape is created or truncated.
    pub fn with_output(mut self, path: &Path) -> ExternalSorterBuilder {
        self.output = Some(path.into());
        return self;
    }

    /// Sets directory to be used to store temporary tapes.
    pub fn with_tmp_dir(mut self, path: &Path) -> ExternalSorterBuilder {
        self.tmp_dir = Some(path.into());
        return self;
    }
}

/// External sorter.
///
/// Sorts a tape holding more values than the device memory buffer fits. Sorting is done in the following
/// phases, every one of them goes through the device operations only:
///
/// * **setup:** the input is split into runs of buffer capacity values, each run is stored on its own
///   temporary tape;
/// * **forward pass:** every run is loaded into the device memory, sorted and written back;
/// * **backward pass:** the runs are merged into the output tape.
///
/// If the whole input fits in the device memory, it is sorted in memory and written to the output directly.
#[derive(Debug)]
pub struct ExternalSorter {
    input: PathBuf,
    output: PathBuf,
    /// Directory to be used to store temporary tapes.
    tmp_dir: PathBuf,
    /// Run tapes of the last sort.
    runs: Vec<TapeRun>,
    /// Index the next run tape name is tried from.
    next_run_index: usize,
    /// Number of values read from the input.
    total_values: usize,
    /// Whole input fit in the device memory.
    shortcut: bool,
}

impl ExternalSorter {
    /// Creates a new external sorter instance.
    ///
    /// # Arguments
    /// * `input` - Tape to be sorted
    /// * `output` - Tape to write sorted values to
    /// * `tmp_path` - Directory to be used to store temporary tapes. If parameter is [`None`] the output tape
    ///   directory will be used.
    pub fn new(input: &Path, output: &Path, tmp_path: Option<&Path>) -> Result<Self, SortError> {
        return Ok(ExternalSorter {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            tmp_dir: Self::init_tmp_directory(output, tmp_path)?,
            runs: Vec::new(),
            next_run_index: 0,
            total_values: 0,
            shortcut: false,
        });
    }

    fn init_tmp_directory(output: &Path, tmp_path: Option<&Path>) -> Result<PathBuf, SortError> {
        let tmp_dir = match tmp_path {
            Some(tmp_path) => tmp_path.to_path_buf(),
            None => match output.parent() {
                Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
                _ => PathBuf::from("."),
            },
        };

        if !tmp_dir.is_dir() {
            return Err(SortError::TempDir(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} is not a directory", tmp_dir.display()),
            )));
        }

        log::info!("using {} as a temporary directory", tmp_dir.display());

        return Ok(tmp_dir);
    }

    /// Sorts the input tape into the output tape in ascending order.
    ///
    /// The device is rebound to the input, the temporary tapes and the output in turn and is left attached
    /// to the output. Temporary tapes are removed whether sorting succeeds or not.
    pub fn sort(&mut self, device: &mut TapeDevice) -> Result<(), SortError> {
        log::info!(
            "sorting {} into {} (buffer capacity: {})",
            self.input.display(),
            self.output.display(),
            device.buffer_capacity()
        );

        self.runs.clear();
        self.next_run_index = 0;
        self.total_values = 0;
        self.shortcut = false;

        let result = self.sort_phases(device);
        self.remove_runs();

        if result.is_ok() {
            log::info!(
                "sorting done ({} values, {} runs{})",
                self.total_values,
                self.runs.len(),
                if self.shortcut { ", sorted in memory" } else { "" }
            );
        }

        return result;
    }

    /// Whether the last sort fit in the device memory and skipped the runs.
    pub fn used_shortcut(&self) -> bool {
        self.shortcut
    }

    /// Number of values sorted by the last sort.
    pub fn total_values(&self) -> usize {
        self.total_values
    }

    /// Value counts of the runs the last sort produced.
    pub fn run_lengths(&self) -> Vec<usize> {
        self.runs.iter().map(TapeRun::len).collect()
    }

    fn sort_phases(&mut self, device: &mut TapeDevice) -> Result<(), SortError> {
        self.setup(device)?;

        if self.shortcut {
            return self.write_in_memory(device);
        }

        self.forward_pass(device)?;
        self.backward_pass(device)
    }

    fn setup(&mut self, device: &mut TapeDevice) -> Result<(), SortError> {
        device.replace_tape(&self.input, TapeMode::Read).map_err(SortError::Setup)?;

        let (mut count, mut exhausted) = load_batch(device).map_err(SortError::Setup)?;
        if exhausted {
            log::debug!("input fits in the device memory ({} values)", count);
            self.total_values = count;
            self.shortcut = true;
            return Ok(());
        }

        loop {
            // rebinding loses the head position, so it's replayed on the next batch
            let head = device.head_position();
            self.spill_run(device, count)?;

            if exhausted {
                break;
            }

            device.replace_tape(&self.input, TapeMode::Read).map_err(SortError::Setup)?;
            for _ in 0..head {
                device.shift_right().map_err(SortError::Setup)?;
            }

            let batch = load_batch(device).map_err(SortError::Setup)?;
            count = batch.0;
            exhausted = batch.1;
        }

        log::debug!("setup done ({} values, {} runs)", self.total_values, self.runs.len());

        return Ok(());
    }

    fn spill_run(&mut self, device: &mut TapeDevice, count: usize) -> Result<(), SortError> {
        let reserved = [self.input.as_path(), self.output.as_path()];
        let run = TapeRun::create_next(&self.tmp_dir, &mut self.next_run_index, count, &reserved)
            .map_err(SortError::TempDir)?;
        let path = run.path().to_path_buf();
        self.runs.push(run);
        self.total_values += count;

        log::debug!("saving run {} ({} values)", path.display(), count);
        drain_buffer(device, &path, count).map_err(SortError::Setup)
    }

    fn forward_pass(&mut self, device: &mut TapeDevice) -> Result<(), SortError> {
        for run in &self.runs {
            log::debug!("sorting run {}", run.path().display());
            sort_run(device, run).map_err(SortError::ForwardPass)?;
        }

        return Ok(());
    }

    fn backward_pass(&mut self, device: &mut TapeDevice) -> Result<(), SortError> {
        device.replace_tape(&self.output, TapeMode::Write).map_err(SortError::Output)?;

        let mut merger = TapeMerger::new(&self.runs);
        log::debug!("merging {} runs ({} values)", self.runs.len(), merger.remaining());

        while let Some(value) = merger.next_min(device).map_err(SortError::BackwardPass)? {
            device.replace_tape(&self.output, TapeMode::Append).map_err(SortError::Output)?;
            device.write(value).map_err(SortError::Output)?;
        }

        return Ok(());
    }

    fn write_in_memory(&mut self, device: &mut TapeDevice) -> Result<(), SortError> {
        let (mut values, _) = device.buffer_snapshot();
        values.truncate(self.total_values);
        values.sort_unstable();
        device.load_buffer(&values);

        drain_buffer(device, &self.output, values.len()).map_err(SortError::Output)
    }

    fn remove_runs(&self) {
        for run in &self.runs {
            if let Err(err) = run.remove() {
                log::warn!("temporary tape {} not removed: {}", run.path().display(), err);
            }
        }
    }
}

/// Reads values from the attached tape into the device memory until the memory is full or the tape ends.
/// Returns the number of values read and whether the tape end is reached.
fn load_batch(device: &mut TapeDevice) -> Result<(usize, bool), TapeError> {
    device.reset_buffer_cursor();

    let mut count = 0;
    while count < device.buffer_capacity() {
        device.read()?;
        count += 1;
        device.shift_right()?;

        if device.at_end() {
            return Ok((count, true));
        }
    }

    return Ok((count, false));
}

/// Writes the first `count` memory buffer values to the tape at `path`, replacing its content.
fn drain_buffer(device: &mut TapeDevice, path: &Path, count: usize) -> Result<(), TapeError> {
    device.replace_tape(path, TapeMode::Write)?;

    for idx in 0..count {
        let value = device.buffer_value_at(idx)?;
        device.write(value)?;
    }

    return Ok(());
}

fn sort_run(device: &mut TapeDevice, run: &TapeRun) -> Result<(), TapeError> {
    device.replace_tape(run.path(), TapeMode::Read)?;

    let (count, _) = load_batch(device)?;
    if count != run.len() {
        return Err(TapeError::BadTape(format!(
            "run {} holds {} values, {} expected",
            run.path().display(),
            count,
            run.len()
        )));
    }

    let (mut values, _): (Vec<Value>, _) = device.buffer_snapshot();
    values.truncate(run.len());
    values.sort_unstable();
    device.load_buffer(&values);

    drain_buffer(device, run.path(), values.len())
}

#[cfg(test)]
mod test {
    use std::fs;
    use std::path::{Path, PathBuf};

    use rand::seq::SliceRandom;
    use rand::Rng;
    use rstest::*;

    use super::{ExternalSorter, ExternalSorterBuilder, SortError};
    use crate::{TapeDevice, TapeDeviceConfig, TapeError, TapeMode, Value};

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    fn write_tape(path: &Path, values: &[Value]) {
        let content = values.iter().map(Value::to_string).collect::<Vec<_>>().join(" ");
        fs::write(path, content).unwrap();
    }

    fn read_tape(path: &Path) -> Vec<Value> {
        fs::read_to_string(path)
            .unwrap()
            .split_whitespace()
            .map(|token| token.parse().unwrap())
            .collect()
    }

    fn temp_tapes(dir: &Path) -> Vec<PathBuf> {
        fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| path.file_name().unwrap().to_string_lossy().starts_with("temp_tape_"))
            .collect()
    }

    fn run_sort(dir: &Path, content: &str, capacity: usize) -> (Result<(), SortError>, ExternalSorter, PathBuf) {
        let input = dir.join("input_tape.txt");
        let output = dir.join("output_tape.txt");
        fs::write(&input, content).unwrap();

        let config = TapeDeviceConfig::new(capacity).unwrap();
        let mut device = TapeDevice::new(&input, TapeMode::ReadWrite, config).unwrap();
        let mut sorter = ExternalSorterBuilder::new()
            .with_input(&input)
            .with_output(&output)
            .with_tmp_dir(dir)
            .build()
            .unwrap();

        let result = sorter.sort(&mut device);
        (result, sorter, output)
    }

    #[rstest]
    fn test_sort_simple_tape(tmp_dir: tempfile::TempDir) {
        let (result, sorter, output) = run_sort(tmp_dir.path(), "2 9 4 1 7 6 3 5 8 10", 5);

        result.unwrap();
        assert_eq!(fs::read_to_string(&output).unwrap(), "1 2 3 4 5 6 7 8 9 10");
        assert!(!sorter.used_shortcut());
        assert_eq!(sorter.run_lengths(), vec![5, 5]);
        assert_eq!(sorter.total_values(), 10);
        assert!(temp_tapes(tmp_dir.path()).is_empty());
    }

    #[rstest]
    fn test_sort_shortcut(tmp_dir: tempfile::TempDir) {
        let (result, sorter, output) = run_sort(tmp_dir.path(), "5 3 1 4 2", 5);

        result.unwrap();
        assert_eq!(fs::read_to_string(&output).unwrap(), "1 2 3 4 5");
        assert!(sorter.used_shortcut());
        assert!(sorter.run_lengths().is_empty());
    }

    #[rstest]
    fn test_sort_shortcut_partial_buffer(tmp_dir: tempfile::TempDir) {
        let (result, sorter, output) = run_sort(tmp_dir.path(), "30 10 20", 5);

        result.unwrap();
        assert_eq!(fs::read_to_string(&output).unwrap(), "10 20 30");
        assert!(sorter.used_shortcut());
        assert_eq!(sorter.total_values(), 3);
    }

    #[rstest]
    #[case("")]
    #[case(" \n")]
    fn test_sort_empty_tape(tmp_dir: tempfile::TempDir, #[case] content: &str) {
        let (result, _, output) = run_sort(tmp_dir.path(), content, 5);

        assert!(matches!(result, Err(SortError::Setup(TapeError::BadTape(_)))));
        assert!(!output.exists());
    }

    #[rstest]
    fn test_sort_single_value(tmp_dir: tempfile::TempDir) {
        let (result, _, output) = run_sort(tmp_dir.path(), "42", 3);

        result.unwrap();
        assert_eq!(fs::read_to_string(&output).unwrap(), "42");
    }

    #[rstest]
    #[case(2, 1)]
    #[case(2, 3)]
    #[case(5, 4)]
    #[case(5, 5)]
    #[case(5, 6)]
    #[case(5, 11)]
    #[case(8, 100)]
    #[case(13, 57)]
    fn test_sort_random_tape(tmp_dir: tempfile::TempDir, #[case] capacity: usize, #[case] len: usize) {
        let mut rng = rand::thread_rng();
        let input: Vec<Value> = (0..len).map(|_| rng.gen_range(0..1000)).collect();
        let content = input.iter().map(Value::to_string).collect::<Vec<_>>().join(" ");

        let (result, sorter, output) = run_sort(tmp_dir.path(), &content, capacity);
        result.unwrap();

        let mut expected = input.clone();
        expected.sort();
        assert_eq!(read_tape(&output), expected);
        assert_eq!(sorter.total_values(), len);
        assert_eq!(sorter.used_shortcut(), len <= capacity);
        assert!(sorter.run_lengths().iter().all(|len| *len <= capacity));
        assert!(temp_tapes(tmp_dir.path()).is_empty());
    }

    #[rstest]
    fn test_shortcut_and_runs_agree(tmp_dir: tempfile::TempDir) {
        let mut values = Vec::from_iter(0..40u32);
        values.extend(0..10u32);
        values.shuffle(&mut rand::thread_rng());
        let content = values.iter().map(Value::to_string).collect::<Vec<_>>().join(" ");

        let in_memory_dir = tmp_dir.path().join("in_memory");
        let runs_dir = tmp_dir.path().join("runs");
        fs::create_dir(&in_memory_dir).unwrap();
        fs::create_dir(&runs_dir).unwrap();

        let (in_memory_result, in_memory_sorter, in_memory_output) = run_sort(&in_memory_dir, &content, 64);
        let (runs_result, runs_sorter, runs_output) = run_sort(&runs_dir, &content, 6);
        in_memory_result.unwrap();
        runs_result.unwrap();

        assert!(in_memory_sorter.used_shortcut());
        assert!(!runs_sorter.used_shortcut());
        assert_eq!(runs_sorter.run_lengths(), vec![6, 6, 6, 6, 6, 6, 6, 6, 2]);
        assert_eq!(
            fs::read_to_string(&in_memory_output).unwrap(),
            fs::read_to_string(&runs_output).unwrap()
        );
    }

    #[rstest]
    fn test_sort_truncates_output(tmp_dir: tempfile::TempDir) {
        let output = tmp_dir.path().join("output_tape.txt");
        write_tape(&output, &[100, 200, 300]);

        let (result, _, output) = run_sort(tmp_dir.path(), "3 2 1 6 5 4", 2);

        result.unwrap();
        assert_eq!(fs::read_to_string(&output).unwrap(), "1 2 3 4 5 6");
    }

    #[rstest]
    fn test_sort_bad_tape_removes_runs(tmp_dir: tempfile::TempDir) {
        let (result, sorter, _) = run_sort(tmp_dir.path(), "1 2 3 4 5 6 x", 5);

        assert!(matches!(result, Err(SortError::Setup(TapeError::BadTape(_)))));
        assert_eq!(sorter.run_lengths(), vec![5]);
        assert!(temp_tapes(tmp_dir.path()).is_empty());
    }

    #[rstest]
    #[case("temp_tape_0.txt")]
    #[case("temp_tape_1.txt")]
    fn test_sort_input_named_like_run(tmp_dir: tempfile::TempDir, #[case] name: &str) {
        let input = tmp_dir.path().join(name);
        let output = tmp_dir.path().join("output_tape.txt");
        write_tape(&input, &[5, 4, 3, 2, 1]);

        let config = TapeDeviceConfig::new(2).unwrap();
        let mut device = TapeDevice::new(&input, TapeMode::ReadWrite, config).unwrap();
        let mut sorter = ExternalSorter::new(&input, &output, None).unwrap();

        sorter.sort(&mut device).unwrap();
        assert_eq!(read_tape(&output), vec![1, 2, 3, 4, 5]);
        assert_eq!(read_tape(&input), vec![5, 4, 3, 2, 1]);
        assert_eq!(sorter.run_lengths(), vec![2, 2, 1]);
        assert_eq!(temp_tapes(tmp_dir.path()), vec![input]);
    }

    #[rstest]
    fn test_sort_output_named_like_run(tmp_dir: tempfile::TempDir) {
        let input = tmp_dir.path().join("input_tape.txt");
        let output = tmp_dir.path().join("temp_tape_0.txt");
        write_tape(&input, &[5, 4, 3, 2, 1]);

        let config = TapeDeviceConfig::new(2).unwrap();
        let mut device = TapeDevice::new(&input, TapeMode::ReadWrite, config).unwrap();
        let mut sorter = ExternalSorter::new(&input, &output, None).unwrap();

        sorter.sort(&mut device).unwrap();
        assert_eq!(read_tape(&output), vec![1, 2, 3, 4, 5]);
        assert_eq!(temp_tapes(tmp_dir.path()), vec![output]);
    }

    #[rstest]
    fn test_sorter_reuse(tmp_dir: tempfile::TempDir) {
        let input = tmp_dir.path().join("input_tape.txt");
        let output = tmp_dir.path().join("output_tape.txt");
        let config = TapeDeviceConfig::new(3).unwrap();
        let mut device = TapeDevice::new(&input, TapeMode::Write, config).unwrap();
        let mut sorter = ExternalSorter::new(&input, &output, None).unwrap();

        write_tape(&input, &[9, 8, 7, 6, 5, 4, 3]);
        sorter.sort(&mut device).unwrap();
        assert_eq!(read_tape(&output), vec![3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(sorter.run_lengths(), vec![3, 3, 1]);

        write_tape(&input, &[2, 1]);
        sorter.sort(&mut device).unwrap();
        assert_eq!(read_tape(&output), vec![1, 2]);
        assert!(sorter.used_shortcut());
        assert!(sorter.run_lengths().is_empty());
    }

    #[rstest]
    fn test_builder_errors(tmp_dir: tempfile::TempDir) {
        let input = tmp_dir.path().join("input_tape.txt");
        let output = tmp_dir.path().join("output_tape.txt");

        let result = ExternalSorterBuilder::new().with_output(&output).build();
        assert!(matches!(result, Err(SortError::MissingParameter("input"))));

        let result = ExternalSorterBuilder::new().with_input(&input).build();
        assert!(matches!(result, Err(SortError::MissingParameter("output"))));

        let result = ExternalSorterBuilder::new()
            .with_input(&input)
            .with_output(&output)
            .with_tmp_dir(&tmp_dir.path().join("missing"))
            .build();
        assert!(matches!(result, Err(SortError::TempDir(_))));
    }
}
