#[cfg(feature = "logger")]
use chrono::Utc;
#[cfg(feature = "logger")]
use once_cell::sync::OnceCell;
#[cfg(feature = "logger")]
use std::{
    fs::File,
    io::{self, BufWriter, Write},
    sync::Mutex,
    time::Instant,
};

/// `LogKind` selects where log lines end up: the console or a log file.
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum LogKind {
    /// Logs to the console, the default choice.
    STDOUT,

    /// Logs to a file in /tmp/hydra-<timestamp>.log
    FILE,
}

#[cfg(feature = "logger")]
struct Sink {
    out: Box<dyn Write + Send>,
    started: Instant,
}

#[cfg(feature = "logger")]
impl Sink {
    fn new(kind: LogKind) -> Self {
        let started = Instant::now();
        match kind {
            LogKind::STDOUT => Self {
                out: Box::new(io::stdout()),
                started,
            },
            LogKind::FILE => {
                let filename = format!("hydra-{}.log", Utc::now().timestamp());
                let path = std::env::temp_dir().join(filename);
                println!("Logging to file: {path:?}");
                let file = File::create(path).unwrap();
                // BufWriter batches the per-cycle lines, a single raw
                // file write per log call is far too slow.
                Self {
                    out: Box::new(BufWriter::new(file)),
                    started,
                }
            }
        }
    }

    fn write_line<T>(&mut self, data: T)
    where
        T: std::fmt::Display,
    {
        let elapsed = self.started.elapsed();
        let seconds = elapsed.as_secs();
        let hours = seconds / 3600;
        let minutes = (seconds / 60) % 60;
        let seconds = seconds % 60;
        let millis = elapsed.subsec_millis();

        writeln!(
            self.out,
            "[{hours:02}:{minutes:02}:{seconds:02}.{millis:03}] {data}"
        )
        .unwrap();
    }
}

#[cfg(feature = "logger")]
static SINK: OnceCell<Mutex<Sink>> = OnceCell::new();

/// Installs the global sink. Calling it twice keeps the first one.
#[cfg(feature = "logger")]
pub fn init_logger(kind: LogKind) {
    SINK.set(Mutex::new(Sink::new(kind))).ok();
}

pub fn log<T>(data: T)
where
    T: std::fmt::Display,
{
    let _ = &data;
    #[cfg(feature = "logger")]
    if let Some(sink) = SINK.get() {
        if let Ok(ref mut sink) = sink.lock() {
            sink.write_line(data);
        }
    }
}

/// Forces buffered lines out to the sink.
/// Useful before a crash dump or at the end of a run, the FILE sink
/// otherwise holds lines in its `BufWriter` until the buffer fills.
pub fn flush() {
    #[cfg(feature = "logger")]
    if let Some(sink) = SINK.get() {
        if let Ok(ref mut sink) = sink.lock() {
            sink.out.flush().ok();
        }
    }
}
