use log::warn;
use std::{
    fs::OpenOptions,
    io::{self, Write},
    path::Path,
    sync::mpsc::{Sender, channel},
    thread::JoinHandle,
};

/// Owns the writer thread; dropping the last handle and calling
/// [`SweepLog::finish`] flushes everything.
pub struct SweepLog {
    sender: Sender<String>,
    writer: JoinHandle<io::Result<()>>,
}

/// Cloneable sending side given to workers
#[derive(Clone)]
pub struct SweepLogHandle {
    sender: Sender<String>,
}

impl SweepLog {
    pub fn create<P: AsRef<Path>>(path: P, title: &str) -> io::Result<SweepLog> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        writeln!(
            file,
            "==== {} started at {} ====",
            title,
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        )?;

        let (sender, receiver) = channel::<String>();
        let writer = std::thread::Builder::new()
            .name("sweep-log".to_string())
            .spawn(move || {
                // each entry is one write so blocks never interleave
                for entry in receiver {
                    file.write_all(entry.as_bytes())?;
                    file.flush()?;
                }
                Ok(())
            })?;
        Ok(SweepLog { sender, writer })
    }

    pub fn handle(&self) -> SweepLogHandle {
        SweepLogHandle {
            sender: self.sender.clone(),
        }
    }

    /// Wait for every queued entry to reach the file
    pub fn finish(self) -> io::Result<()> {
        drop(self.sender);
        match self.writer.join() {
            Ok(result) => result,
            Err(_) => Err(io::Error::other("sweep log writer panicked")),
        }
    }
}

impl SweepLogHandle {
    pub fn append(&self, mut entry: String) {
        if !entry.ends_with('\n') {
            entry.push('\n');
        }
        if self.sender.send(entry).is_err() {
            warn!("Sweep log writer has stopped, dropping log entry");
        }
    }
}
