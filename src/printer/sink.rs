//! Where rendered tickets go.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::briefing::escpos_bytes;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A destination for rendered text.
pub trait Sink {
    /// Human-readable target, for logs and `status`.
    fn describe(&self) -> String;

    fn write_ticket(&mut self, text: &str) -> io::Result<()>;
}

/// A thermal printer reached through a device node or a raw TCP port.
#[derive(Debug, Clone)]
pub enum DeviceSink {
    /// `/dev/rfcomm0`, `/dev/usb/lp0`, `/dev/ttyUSB0` and the like.
    Device(PathBuf),

    /// `host:port`, usually port 9100.
    Network(String),
}

impl Sink for DeviceSink {
    fn describe(&self) -> String {
        match self {
            Self::Device(path) => path.display().to_string(),
            Self::Network(addr) => format!("tcp://{addr}"),
        }
    }

    fn write_ticket(&mut self, text: &str) -> io::Result<()> {
        let bytes = escpos_bytes(text);
        match self {
            Self::Device(path) => {
                let mut device = OpenOptions::new().write(true).open(path)?;
                device.write_all(&bytes)?;
                device.flush()
            }
            Self::Network(addr) => {
                let target = addr.to_socket_addrs()?.next().ok_or_else(|| {
                    io::Error::new(io::ErrorKind::NotFound, format!("no address for {addr}"))
                })?;
                let mut stream = TcpStream::connect_timeout(&target, CONNECT_TIMEOUT)?;
                stream.set_write_timeout(Some(CONNECT_TIMEOUT))?;
                stream.write_all(&bytes)?;
                stream.flush()
            }
        }
    }
}

/// Appends plain text to a log file, one ticket per block.
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Sink for FileSink {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn write_ticket(&mut self, text: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{text}")?;
        writeln!(file)?;
        file.flush()
    }
}

#[cfg(test)]
pub(crate) mod memory {
    use std::cell::RefCell;
    use std::io;
    use std::rc::Rc;

    use super::Sink;

    /// Records tickets in memory. Clones share the same record.
    #[derive(Debug, Clone, Default)]
    pub struct MemorySink {
        pub tickets: Rc<RefCell<Vec<String>>>,

        /// Errors returned by the next writes, in order, before succeeding.
        pub failures: Rc<RefCell<Vec<io::ErrorKind>>>,
    }

    impl MemorySink {
        pub fn failing(kinds: &[io::ErrorKind]) -> Self {
            let sink = Self::default();
            sink.failures.borrow_mut().extend(kinds.iter().rev());
            sink
        }

        pub fn printed(&self) -> Vec<String> {
            self.tickets.borrow().clone()
        }
    }

    impl Sink for MemorySink {
        fn describe(&self) -> String {
            "memory".to_string()
        }

        fn write_ticket(&mut self, text: &str) -> io::Result<()> {
            if let Some(kind) = self.failures.borrow_mut().pop() {
                return Err(io::Error::from(kind));
            }
            self.tickets.borrow_mut().push(text.to_string());
            Ok(())
        }
    }
}
