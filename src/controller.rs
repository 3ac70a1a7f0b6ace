use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant, SystemTime};

use log::{debug, info, log_enabled, trace, warn, Level};
use thiserror::Error;

use crate::config::{SpiConfig, StripConfig};
use crate::pixel_format::Rgb;
use crate::protocol::{reset_len, Ws2812Encoder};
use crate::transport::{SpiTransport, Transport, TransportError};

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("invalid pixel data: {0}")]
    InvalidPixelData(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("device controller is shut down")]
    Closed,
}

/// Consistent copy of the device state taken under the controller lock
#[derive(Debug, Clone)]
pub struct DeviceState {
    pub pixels: Vec<Rgb>,
    pub brightness: u8,
    pub updates: u64,
    pub led_count: usize,
    pub started_at: SystemTime,
    pub uptime: Duration,
    pub last_error: Option<String>,
}

impl DeviceState {
    /// Color of the first pixel, which is the strip color after a uniform update
    pub fn current_color(&self) -> Rgb {
        self.pixels.first().copied().unwrap_or(Rgb::OFF)
    }
}

struct Device {
    transport: Box<dyn Transport>,
    pixels: Vec<Rgb>,
    brightness: u8,
    updates: u64,
    last_error: Option<String>,
    closed: bool,
}

/// Owns the strip: the SPI transport, the logical pixel buffer and its statistics.
///
/// Every operation runs under one mutex that spans encode, write and bookkeeping,
/// so callers on any thread see either the previous frame or the new one.
/// State is committed only after the transport accepted the frame.
pub struct DeviceController {
    device: Mutex<Device>,
    encoder: Ws2812Encoder,
    led_count: usize,
    started: Instant,
    started_at: SystemTime,
}

impl DeviceController {
    /// Open the SPI bus and build a controller for the configured strip
    pub fn initialize(spi: &SpiConfig, strip: &StripConfig) -> Result<Self, TransportError> {
        let transport = SpiTransport::open(spi.bus, spi.device, spi.clock_hz)?;
        let encoder = Ws2812Encoder::new(
            strip.channel_order,
            reset_len(spi.clock_hz, strip.reset_us),
        );
        Ok(Self::new(
            Box::new(transport),
            encoder,
            strip.led_count,
            strip.brightness,
        ))
    }

    pub fn new(
        transport: Box<dyn Transport>,
        encoder: Ws2812Encoder,
        led_count: usize,
        brightness: u8,
    ) -> Self {
        DeviceController {
            device: Mutex::new(Device {
                transport,
                pixels: vec![Rgb::OFF; led_count],
                brightness,
                updates: 0,
                last_error: None,
                closed: false,
            }),
            encoder,
            led_count,
            started: Instant::now(),
            started_at: SystemTime::now(),
        }
    }

    pub fn led_count(&self) -> usize {
        self.led_count
    }

    fn lock(&self) -> MutexGuard<'_, Device> {
        // State is only committed after a successful write, so a panic while
        // holding the lock cannot leave a torn frame behind.
        self.device.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the whole frame. Either every pixel is applied or none is.
    pub fn set_pixels(&self, pixels: &[Rgb]) -> Result<(), ControllerError> {
        if pixels.len() != self.led_count {
            return Err(ControllerError::InvalidPixelData(format!(
                "expected {} pixels, got {}",
                self.led_count,
                pixels.len()
            )));
        }

        let mut device = self.lock();
        let brightness = device.brightness;
        self.transmit(&mut device, pixels, brightness)
    }

    /// Set every pixel to the same color
    pub fn set_uniform_color(&self, color: Rgb) -> Result<(), ControllerError> {
        self.set_pixels(&vec![color; self.led_count])
    }

    /// Turn every pixel off
    pub fn clear(&self) -> Result<(), ControllerError> {
        self.set_uniform_color(Rgb::OFF)
    }

    /// Change the strip brightness and re-send the current frame with it
    pub fn set_brightness(&self, brightness: u8) -> Result<(), ControllerError> {
        let mut device = self.lock();
        let pixels = device.pixels.clone();
        self.transmit(&mut device, &pixels, brightness)
    }

    pub fn snapshot(&self) -> DeviceState {
        let device = self.lock();
        DeviceState {
            pixels: device.pixels.clone(),
            brightness: device.brightness,
            updates: device.updates,
            led_count: self.led_count,
            started_at: self.started_at,
            uptime: self.started.elapsed(),
            last_error: device.last_error.clone(),
        }
    }

    /// Blank the strip and release the bus. Safe to call more than once.
    pub fn shutdown(&self) -> Result<(), ControllerError> {
        let mut device = self.lock();
        if device.closed {
            return Ok(());
        }
        device.closed = true;

        let blank = self.encoder.encode(&vec![Rgb::OFF; self.led_count], 0);
        let written = device.transport.write(&blank);
        let closed = device.transport.close();

        written?;
        closed?;
        info!("✓ LEDs cleared and SPI released");
        Ok(())
    }

    fn transmit(
        &self,
        device: &mut Device,
        pixels: &[Rgb],
        brightness: u8,
    ) -> Result<(), ControllerError> {
        if device.closed {
            return Err(ControllerError::Closed);
        }

        let waveform = self.encoder.encode(pixels, brightness);
        if log_enabled!(Level::Trace) {
            let hex: String = waveform
                .iter()
                .take(27)
                .map(|b| format!("{:02x}", b))
                .collect::<Vec<_>>()
                .join(" ");
            trace!("Sending {} bytes, first 3 pixels: {}", waveform.len(), hex);
        }

        match device.transport.write(&waveform) {
            Ok(()) => {
                device.pixels.clear();
                device.pixels.extend_from_slice(pixels);
                device.brightness = brightness;
                device.updates += 1;
                device.last_error = None;
                debug!("Frame #{} written ({} bytes)", device.updates, waveform.len());
                Ok(())
            }
            Err(e) => {
                warn!("✗ Failed to update LEDs: {}", e);
                device.last_error = Some(e.to_string());
                Err(e.into())
            }
        }
    }
}

impl Drop for DeviceController {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("✗ Error releasing SPI: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::pixel_format::ChannelOrder;
    use crate::transport::mock::RecordingTransport;

    fn controller(led_count: usize) -> (DeviceController, RecordingTransport) {
        let transport = RecordingTransport::new();
        let encoder = Ws2812Encoder::new(ChannelOrder::Grb, 15);
        let controller =
            DeviceController::new(Box::new(transport.clone()), encoder, led_count, 255);
        (controller, transport)
    }

    #[test]
    fn test_uniform_color_end_to_end() {
        let (controller, transport) = controller(16);
        controller.set_uniform_color(Rgb::new(255, 0, 0)).unwrap();

        let state = controller.snapshot();
        assert_eq!(state.pixels, vec![Rgb::new(255, 0, 0); 16]);
        assert_eq!(state.updates, 1);
        assert_eq!(state.led_count, 16);
        assert_eq!(transport.frame_count(), 1);
        assert_eq!(transport.frames()[0].len(), 16 * 9 + 15);
    }

    #[test]
    fn test_clear_after_color() {
        let (controller, _transport) = controller(8);
        controller.set_uniform_color(Rgb::new(1, 2, 3)).unwrap();
        controller.clear().unwrap();

        let state = controller.snapshot();
        assert!(state.pixels.iter().all(|p| *p == Rgb::OFF));
        assert_eq!(state.updates, 2);
    }

    #[test]
    fn test_wrong_length_is_rejected_without_side_effects() {
        let (controller, transport) = controller(4);
        controller.set_uniform_color(Rgb::new(9, 9, 9)).unwrap();

        let before = controller.snapshot();
        for len in [0, 3, 5] {
            let result = controller.set_pixels(&vec![Rgb::new(1, 1, 1); len]);
            assert!(matches!(result, Err(ControllerError::InvalidPixelData(_))));
        }
        let after = controller.snapshot();

        assert_eq!(before.pixels, after.pixels);
        assert_eq!(before.updates, after.updates);
        assert_eq!(transport.frame_count(), 1);
    }

    #[test_log::test]
    fn test_failed_write_keeps_last_good_frame() {
        let (controller, transport) = controller(4);
        controller.set_uniform_color(Rgb::new(10, 10, 10)).unwrap();

        transport.set_failing(true);
        let result = controller.set_uniform_color(Rgb::new(50, 50, 50));
        assert!(matches!(result, Err(ControllerError::Transport(_))));

        let state = controller.snapshot();
        assert_eq!(state.current_color(), Rgb::new(10, 10, 10));
        assert_eq!(state.updates, 1);
        assert!(state.last_error.is_some());

        // The controller keeps serving once the bus recovers
        transport.set_failing(false);
        controller.set_uniform_color(Rgb::new(50, 50, 50)).unwrap();
        let state = controller.snapshot();
        assert_eq!(state.current_color(), Rgb::new(50, 50, 50));
        assert_eq!(state.updates, 2);
        assert!(state.last_error.is_none());
    }

    #[test]
    fn test_concurrent_updates_never_mix() {
        let (controller, transport) = controller(32);
        let controller = Arc::new(controller);
        let colors: Vec<Rgb> = (0..8u8).map(|i| Rgb::new(i * 30, 255 - i * 30, i)).collect();

        let handles: Vec<_> = colors
            .iter()
            .map(|&color| {
                let controller = Arc::clone(&controller);
                thread::spawn(move || {
                    for _ in 0..25 {
                        controller.set_uniform_color(color).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let state = controller.snapshot();
        let first = state.current_color();
        assert!(colors.contains(&first));
        assert!(state.pixels.iter().all(|p| *p == first));
        assert_eq!(state.updates, 200);

        // Every frame on the wire is one complete uniform frame
        let encoder = Ws2812Encoder::new(ChannelOrder::Grb, 15);
        let valid: Vec<Vec<u8>> = colors
            .iter()
            .map(|&c| encoder.encode(&vec![c; 32], 255))
            .collect();
        assert!(transport.frames().iter().all(|f| valid.contains(f)));
    }

    #[test]
    fn test_brightness_change_resends_frame() {
        let (controller, transport) = controller(2);
        controller.set_uniform_color(Rgb::new(255, 255, 255)).unwrap();
        controller.set_brightness(0).unwrap();

        let state = controller.snapshot();
        assert_eq!(state.brightness, 0);
        assert_eq!(state.current_color(), Rgb::new(255, 255, 255));
        assert_eq!(state.updates, 2);

        let encoder = Ws2812Encoder::new(ChannelOrder::Grb, 15);
        assert_eq!(transport.frames()[1], encoder.encode(&[Rgb::OFF; 2], 255));
    }

    #[test]
    fn test_failed_brightness_change_is_not_committed() {
        let (controller, transport) = controller(2);
        transport.set_failing(true);
        assert!(controller.set_brightness(10).is_err());
        assert_eq!(controller.snapshot().brightness, 255);
    }

    #[test]
    fn test_shutdown_blanks_and_closes_once() {
        let (controller, transport) = controller(3);
        controller.set_uniform_color(Rgb::new(7, 7, 7)).unwrap();
        controller.shutdown().unwrap();
        controller.shutdown().unwrap();

        assert!(transport.is_closed());
        let frames = transport.frames();
        assert_eq!(frames.len(), 2);
        let encoder = Ws2812Encoder::new(ChannelOrder::Grb, 15);
        assert_eq!(frames[1], encoder.encode(&[Rgb::OFF; 3], 255));

        assert!(matches!(
            controller.set_uniform_color(Rgb::new(1, 1, 1)),
            Err(ControllerError::Closed)
        ));
    }

    #[test]
    fn test_drop_releases_transport() {
        let (controller, transport) = controller(3);
        drop(controller);
        assert!(transport.is_closed());
        assert_eq!(transport.frame_count(), 1);
    }

    #[test]
    fn test_empty_strip() {
        let (controller, transport) = controller(0);
        controller.clear().unwrap();
        assert_eq!(controller.snapshot().current_color(), Rgb::OFF);
        assert_eq!(transport.frames()[0], vec![0u8; 15]);
    }
}
