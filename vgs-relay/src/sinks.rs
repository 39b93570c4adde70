//! Where the relay's two outputs come from.
//!
//! The relay loop only needs a writable file and a bidirectional peer
//! stream; opening them goes through [`Sinks`] so tests can hand in
//! in-memory pipes.

use std::io;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWrite, BufWriter};
use tokio::net::TcpStream;
use tracing::debug;

use crate::config::RelayConfig;

#[async_trait]
pub trait Sinks: Send {
    type File: AsyncWrite + Send + Unpin;
    type Peer: AsyncRead + AsyncWrite + Send + Unpin;

    async fn open_file(&mut self, name: &str) -> io::Result<Self::File>;

    async fn connect_peer(&mut self, display: &str) -> io::Result<Self::Peer>;
}

/// Files under the configured output directory, peers over TCP.
#[derive(Debug, Clone)]
pub struct TcpSinks {
    directory: PathBuf,
    default_file: String,
    default_peer: String,
}

impl TcpSinks {
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            directory: config.output.directory.clone(),
            default_file: config.output.default_file.clone(),
            default_peer: config.peer.address.clone(),
        }
    }

    /// Path of metafile `name`. Names may not leave the output directory.
    pub fn resolve(&self, name: &str) -> io::Result<PathBuf> {
        let name = if name.is_empty() { self.default_file.as_str() } else { name };
        let escapes = Path::new(name)
            .components()
            .any(|c| matches!(c, Component::RootDir | Component::Prefix(_) | Component::ParentDir));
        if escapes {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("metafile name {name:?} leaves the output directory"),
            ));
        }
        Ok(self.directory.join(name))
    }
}

#[async_trait]
impl Sinks for TcpSinks {
    type File = BufWriter<File>;
    type Peer = TcpStream;

    async fn open_file(&mut self, name: &str) -> io::Result<Self::File> {
        let path = self.resolve(name)?;
        debug!("creating metafile {}", path.display());
        Ok(BufWriter::new(File::create(path).await?))
    }

    async fn connect_peer(&mut self, display: &str) -> io::Result<Self::Peer> {
        let addr = if display.is_empty() { self.default_peer.as_str() } else { display };
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sinks(directory: &Path) -> TcpSinks {
        let mut config = RelayConfig::default();
        config.output.directory = directory.to_path_buf();
        config.output.default_file = "default.vgs".to_string();
        TcpSinks::new(&config)
    }

    #[test]
    fn test_names_stay_in_the_directory() {
        let sinks = sinks(Path::new("/var/vgs"));
        assert_eq!(sinks.resolve("run.vgs").unwrap(), Path::new("/var/vgs/run.vgs"));
        assert_eq!(sinks.resolve("runs/a.vgs").unwrap(), Path::new("/var/vgs/runs/a.vgs"));
        assert_eq!(sinks.resolve("").unwrap(), Path::new("/var/vgs/default.vgs"));
    }

    #[test]
    fn test_escaping_names_are_rejected() {
        let sinks = sinks(Path::new("/var/vgs"));
        for name in ["/etc/passwd", "../up.vgs", "runs/../../up.vgs"] {
            let err = sinks.resolve(name).unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::InvalidInput, "{name}");
        }
    }

    #[tokio::test]
    async fn test_rejected_name_creates_nothing() {
        let dir = std::env::temp_dir().join(format!("vgs-sinks-test-{}", std::process::id()));
        let inner = dir.join("out");
        std::fs::create_dir_all(&inner).unwrap();
        let mut sinks = sinks(&inner);

        assert!(sinks.open_file("../escaped.vgs").await.is_err());
        assert!(!dir.join("escaped.vgs").exists());
        assert!(sinks.open_file("kept.vgs").await.is_ok());
        assert!(inner.join("kept.vgs").exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
