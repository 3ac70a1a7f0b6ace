use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};
use spidev::{SpiModeFlags, Spidev, SpidevOptions};
use thiserror::Error;

const SPI_BITS_PER_WORD: u8 = 8;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("SPI device {} not found", path.display())]
    Unavailable { path: PathBuf, source: io::Error },

    #[error("permission denied opening {}", path.display())]
    PermissionDenied { path: PathBuf, source: io::Error },

    #[error("failed to open {}: {source}", path.display())]
    Open { path: PathBuf, source: io::Error },

    #[error("failed to configure {}: {source}", path.display())]
    Configure { path: PathBuf, source: io::Error },

    #[error("SPI write failed: {0}")]
    Write(#[source] io::Error),

    #[error("partial SPI write: {written} of {expected} bytes")]
    PartialWrite { written: usize, expected: usize },

    #[error("SPI transport is closed")]
    Closed,
}

impl TransportError {
    /// Remediation text for failures that need the host reconfigured
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            TransportError::Unavailable { .. } => Some(
                "Enable SPI (raspi-config, or dtparam=spi=on in /boot/config.txt) and reboot",
            ),
            TransportError::PermissionDenied { .. } => {
                Some("Run as root or add the user to the 'spi' group")
            }
            _ => None,
        }
    }
}

/// Raw sink for already-encoded waveforms
pub trait Transport: Send {
    fn write(&mut self, waveform: &[u8]) -> Result<(), TransportError>;

    fn close(&mut self) -> Result<(), TransportError>;
}

/// Classify a failed open of the device node
fn open_error(path: &Path, source: io::Error) -> TransportError {
    let path = path.to_path_buf();
    match source.kind() {
        io::ErrorKind::NotFound => TransportError::Unavailable { path, source },
        io::ErrorKind::PermissionDenied => TransportError::PermissionDenied { path, source },
        _ => TransportError::Open { path, source },
    }
}

/// Linux `spidev` character device
pub struct SpiTransport<W = Spidev> {
    path: PathBuf,
    device: Option<W>,
}

impl SpiTransport {
    pub fn device_path(bus: u8, device: u8) -> PathBuf {
        PathBuf::from(format!("/dev/spidev{}.{}", bus, device))
    }

    /// Open `/dev/spidev<bus>.<device>` in mode 0, 8 bits per word, at `clock_hz`
    pub fn open(bus: u8, device: u8, clock_hz: u32) -> Result<Self, TransportError> {
        let path = Self::device_path(bus, device);

        let mut spi = Spidev::open(&path).map_err(|source| open_error(&path, source))?;
        let options = SpidevOptions::new()
            .bits_per_word(SPI_BITS_PER_WORD)
            .max_speed_hz(clock_hz)
            .mode(SpiModeFlags::SPI_MODE_0)
            .build();
        spi.configure(&options)
            .map_err(|source| TransportError::Configure {
                path: path.clone(),
                source,
            })?;

        info!("✓ Opened {} at {} Hz", path.display(), clock_hz);

        Ok(SpiTransport {
            path,
            device: Some(spi),
        })
    }
}

impl<W: Write + Send> Transport for SpiTransport<W> {
    fn write(&mut self, waveform: &[u8]) -> Result<(), TransportError> {
        let device = self.device.as_mut().ok_or(TransportError::Closed)?;

        // spidev turns one write() into one transfer; splitting it would stretch
        // the line low mid-frame and latch a partial update.
        let written = device.write(waveform).map_err(TransportError::Write)?;
        if written != waveform.len() {
            return Err(TransportError::PartialWrite {
                written,
                expected: waveform.len(),
            });
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if self.device.take().is_some() {
            debug!("Closed {}", self.path.display());
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_path() {
        assert_eq!(SpiTransport::device_path(0, 1), PathBuf::from("/dev/spidev0.1"));
    }

    #[test]
    fn test_missing_device_is_unavailable() {
        // Bus numbers this high are never populated
        let err = SpiTransport::open(250, 250, 2_400_000).err().unwrap();
        assert!(matches!(err, TransportError::Unavailable { .. }));
        assert!(err.hint().unwrap().contains("SPI"));
    }

    #[test]
    fn test_open_errors_are_classified() {
        let path = Path::new("/dev/spidev0.0");

        let err = open_error(path, io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(err, TransportError::Unavailable { .. }));
        assert!(err.hint().unwrap().contains("dtparam=spi=on"));

        let err = open_error(path, io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, TransportError::PermissionDenied { ref path, .. } if path == Path::new("/dev/spidev0.0")));
        assert!(err.hint().unwrap().contains("'spi' group"));
        assert!(err.to_string().contains("/dev/spidev0.0"));

        let err = open_error(path, io::Error::from(io::ErrorKind::InvalidInput));
        assert!(matches!(err, TransportError::Open { .. }));
        assert!(err.hint().is_none());
    }

    #[test]
    fn test_write_after_close_fails() {
        let mut transport = SpiTransport {
            path: PathBuf::from("/dev/null"),
            device: Some(Vec::new()),
        };
        transport.write(&[0, 1, 2]).unwrap();
        transport.close().unwrap();
        assert!(matches!(transport.write(&[0]), Err(TransportError::Closed)));
    }

    #[test]
    fn test_write_errors_have_no_hint() {
        assert!(TransportError::Closed.hint().is_none());
    }
}
