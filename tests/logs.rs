use std::sync::mpsc;
use std::time::Duration;

use carpool_nav_core::logs;
use tempdir::TempDir;

// The global logger can only be installed once per process, so everything
// lives in a single test.
#[test]
fn file_and_listener() {
    let cache_dir = TempDir::new("logs-file_and_listener").unwrap();
    let cache_dir = cache_dir.path().to_str().unwrap();
    logs::init(cache_dir).unwrap();
    assert!(logs::init(cache_dir).is_err());

    let (tx, rx) = mpsc::channel();
    logs::set_listener(Box::new(move |line: String| {
        let _ = tx.send(line);
    }));

    log::info!("[test] rerouting from 22.5,114.0");
    log::debug!("[test] below the configured level");
    let line = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(line.starts_with("INFO:"));
    assert!(line.ends_with("[test] rerouting from 22.5,114.0"));
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

    logs::clear_listener();
    log::warn!("[test] nobody is listening");
    log::logger().flush();

    let content = std::fs::read_to_string(logs::log_file_path(cache_dir)).unwrap();
    assert!(content.contains("[test] rerouting from 22.5,114.0"));
    assert!(content.contains("[test] nobody is listening"));
    assert!(!content.contains("below the configured level"));

    // a listener that panics neither stops delivery nor breaks replacing it
    logs::set_listener(Box::new(|_: String| panic!("host callback failed")));
    log::info!("[test] delivered to a broken listener");
    std::thread::sleep(Duration::from_millis(100));
    let (tx, rx) = mpsc::channel();
    logs::set_listener(Box::new(move |line: String| {
        let _ = tx.send(line);
    }));
    log::info!("[test] after the panic");
    let line = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(line.ends_with("[test] after the panic"));
    logs::clear_listener();
}
