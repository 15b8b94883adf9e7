use std::{
    panic::{self, AssertUnwindSafe},
    path::{Path, PathBuf},
    sync::{mpsc, LazyLock, Mutex, PoisonError},
    thread,
};

use anyhow::Result;
use file_rotate::{
    compression::Compression,
    suffix::{AppendTimestamp, FileLimit},
    {ContentLimit, FileRotate},
};
use log::Log;
use simplelog::{ConfigBuilder, LevelFilter, WriteLogger};

pub type LogListener = Box<dyn Fn(String) + Send>;

/// Callback registered by the host app to show/collect log lines.
static LOG_LISTENER: LazyLock<Mutex<Option<LogListener>>> = LazyLock::new(|| Mutex::new(None));

/// Sender side of the channel drained by the dispatcher thread.
static LOG_SENDER: LazyLock<Mutex<Option<mpsc::Sender<String>>>> =
    LazyLock::new(|| Mutex::new(None));

pub struct MainLogger {
    write_logger: Box<WriteLogger<FileRotate<AppendTimestamp>>>,
}

impl MainLogger {
    fn new(write_logger: Box<WriteLogger<FileRotate<AppendTimestamp>>>) -> Self {
        Self { write_logger }
    }
}

impl Log for MainLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.write_logger.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        self.write_logger.log(record);

        let message = format!(
            "{}:{} -- {}",
            record.level(),
            record.target(),
            record.args()
        );
        if let Ok(sender) = LOG_SENDER.lock() {
            if let Some(tx) = sender.as_ref() {
                // the dispatcher is gone only if the process is shutting down
                let _ = tx.send(message);
            }
        }
    }

    fn flush(&self) {
        self.write_logger.flush();
    }
}

pub fn log_file_path(cache_dir: &str) -> PathBuf {
    Path::new(cache_dir).join("logs/main.log")
}

pub fn init(cache_dir: &str) -> Result<()> {
    let log = FileRotate::new(
        log_file_path(cache_dir),
        AppendTimestamp::default(FileLimit::MaxFiles(3)),
        ContentLimit::Lines(1000),
        Compression::None,
        #[cfg(unix)]
        None,
    );
    let config = ConfigBuilder::new().set_time_format_rfc3339().build();
    let write_logger = WriteLogger::new(LevelFilter::Info, config, log);
    let main_logger = MainLogger::new(write_logger);
    log::set_boxed_logger(Box::new(main_logger))?;
    log::set_max_level(LevelFilter::Info);

    init_dispatcher();
    Ok(())
}

// Listener callbacks run on their own thread so a slow host never blocks the
// thread that is logging.
fn init_dispatcher() {
    let mut guard = LOG_SENDER.lock().unwrap_or_else(PoisonError::into_inner);
    if guard.is_some() {
        return;
    }

    let (tx, rx) = mpsc::channel::<String>();
    *guard = Some(tx);

    thread::spawn(move || {
        while let Ok(message) = rx.recv() {
            let listener = LOG_LISTENER.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(listener) = listener.as_ref() {
                // a panicking host callback must not take the dispatcher down
                if panic::catch_unwind(AssertUnwindSafe(|| listener(message))).is_err() {
                    eprintln!("log listener panicked");
                }
            }
        }
    });
}

pub fn set_listener(listener: LogListener) {
    *LOG_LISTENER.lock().unwrap_or_else(PoisonError::into_inner) = Some(listener);
}

pub fn clear_listener() {
    *LOG_LISTENER.lock().unwrap_or_else(PoisonError::into_inner) = None;
}
