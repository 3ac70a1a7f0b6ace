use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, warn};

use crate::config::{AnimationConfig, StartupConfig};
use crate::controller::{ControllerError, DeviceController};
use crate::pixel_format::Rgb;
use crate::presets::RAINBOW;

/// Target color scaled to `floor(channel * step / steps)`
pub fn breathing_level(color: Rgb, step: u32, steps: u32) -> Rgb {
    let level = |c: u8| (c as u32 * step / steps) as u8;
    Rgb::new(level(color.r), level(color.g), level(color.b))
}

/// One breath: steps 0..=steps up, then steps..=0 down
pub fn breathing_cycle(steps: u32) -> impl Iterator<Item = u32> + Clone {
    (0..=steps).chain((0..=steps).rev())
}

struct Running {
    name: &'static str,
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

/// Runs timed sequences of controller updates.
///
/// The startup ring runs on the caller's thread. Breathing and rainbow run on a
/// background thread until cancelled; only one of them is active at a time.
pub struct AnimationDriver {
    controller: Arc<DeviceController>,
    settings: AnimationConfig,
    startup: StartupConfig,
    current: Mutex<Option<Running>>,
}

impl AnimationDriver {
    pub fn new(
        controller: Arc<DeviceController>,
        settings: AnimationConfig,
        startup: StartupConfig,
    ) -> Self {
        AnimationDriver {
            controller,
            settings,
            startup,
            current: Mutex::new(None),
        }
    }

    /// Light each LED in turn once, to confirm wiring and LED count.
    /// Stops early once `running` is cleared.
    pub fn run_startup_ring(&self, running: &AtomicBool) -> Result<(), ControllerError> {
        let led_count = self.controller.led_count();
        let delay = self.startup.step_delay();
        info!("Running startup animation over {} LEDs...", led_count);

        for i in 0..led_count {
            if !running.load(Ordering::Relaxed) {
                info!("Startup animation interrupted");
                break;
            }
            let mut frame = vec![Rgb::OFF; led_count];
            frame[i] = self.startup.color;
            self.controller.set_pixels(&frame)?;
            thread::sleep(delay);
        }
        Ok(())
    }

    pub fn start_breathing(&self, color: Rgb) {
        let steps = self.settings.breathing_steps.max(1);
        let frames = breathing_cycle(steps)
            .map(move |step| breathing_level(color, step, steps))
            .cycle();
        self.start("breathing", frames, self.settings.breathing_delay());
    }

    pub fn start_rainbow(&self) {
        let frames = RAINBOW.into_iter().cycle();
        self.start("rainbow", frames, self.settings.rainbow_delay());
    }

    /// Stop the running animation, leaving its last color on the strip.
    /// Returns whether an animation thread was still running.
    pub fn cancel(&self) -> bool {
        let running = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match running {
            Some(running) => {
                let was_running = !running.handle.is_finished();
                Self::stop(running);
                was_running
            }
            None => false,
        }
    }

    /// Name of the animation currently driving the strip
    pub fn active(&self) -> Option<&'static str> {
        let current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        current
            .as_ref()
            .filter(|running| !running.handle.is_finished())
            .map(|running| running.name)
    }

    fn start<I>(&self, name: &'static str, frames: I, delay: Duration)
    where
        I: Iterator<Item = Rgb> + Send + 'static,
    {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = current.take() {
            Self::stop(previous);
        }

        let (stop, stop_rx) = mpsc::channel();
        let controller = Arc::clone(&self.controller);
        let handle = thread::spawn(move || {
            animation_thread(name, controller, frames, delay, stop_rx);
        });

        info!("Started {} animation", name);
        *current = Some(Running { name, stop, handle });
    }

    fn stop(running: Running) {
        // A closed channel wakes the thread as well; the send result does not matter
        let _ = running.stop.send(());
        if running.handle.join().is_err() {
            warn!("{} animation thread panicked", running.name);
        }
        info!("Stopped {} animation", running.name);
    }
}

impl Drop for AnimationDriver {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Apply one color per step, waiting `delay` between steps until told to stop
fn animation_thread<I>(
    name: &'static str,
    controller: Arc<DeviceController>,
    frames: I,
    delay: Duration,
    stop: Receiver<()>,
) where
    I: Iterator<Item = Rgb>,
{
    for color in frames {
        match controller.set_uniform_color(color) {
            Ok(()) => {}
            Err(ControllerError::Closed) => {
                debug!("{} animation: controller closed, exiting", name);
                return;
            }
            Err(e) => warn!("{} animation step failed: {}", name, e),
        }

        match stop.recv_timeout(delay) {
            Err(RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}
