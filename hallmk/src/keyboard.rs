//! Tick driver glue.
//!
//! Binds a matrix and a layout engine together and paces them: every tick is
//! one `matrix.scan()` followed by one `layout.task()`, in that order, on a
//! single cooperative task. Nothing in the tick path suspends; the async
//! boundary is only the pacing timer and the channels toward the transport
//! and storage tasks.

use core::cell::RefCell;

use embassy_time::{Duration, Ticker};

use crate::analog::AnalogReader;
use crate::boot::BootHook;
use crate::clock::{Clock, Uptime};
use crate::eeconfig::Eeconfig;
use crate::gamepad::GamepadMapper;
use crate::hid::HidReporter;
use crate::layout::Layout;
use crate::matrix::{Matrix, MatrixConfig};

/// A complete input core: analog matrix plus layout engine.
pub struct Keyboard<'a, A, H, G, B, const NUM_KEYS: usize, const NUM_LAYERS: usize, const NUM_PROFILES: usize>
where
    A: AnalogReader,
    H: HidReporter,
    G: GamepadMapper,
    B: BootHook,
{
    pub matrix: Matrix<'a, A, NUM_KEYS, NUM_LAYERS, NUM_PROFILES>,
    pub layout: Layout<'a, H, G, B, NUM_KEYS, NUM_LAYERS, NUM_PROFILES>,
    eeconfig: &'a RefCell<Eeconfig<NUM_KEYS, NUM_LAYERS, NUM_PROFILES>>,
}

impl<'a, A, H, G, B, const NUM_KEYS: usize, const NUM_LAYERS: usize, const NUM_PROFILES: usize>
    Keyboard<'a, A, H, G, B, NUM_KEYS, NUM_LAYERS, NUM_PROFILES>
where
    A: AnalogReader,
    H: HidReporter,
    G: GamepadMapper,
    B: BootHook,
{
    pub fn new(
        eeconfig: &'a RefCell<Eeconfig<NUM_KEYS, NUM_LAYERS, NUM_PROFILES>>,
        adc: A,
        hid: H,
        gamepad: G,
        boot: B,
        matrix_config: MatrixConfig,
    ) -> Self {
        Self {
            matrix: Matrix::new(adc, eeconfig, matrix_config),
            layout: Layout::new(eeconfig, hid, gamepad, boot),
            eeconfig,
        }
    }

    /// Start the first calibration window.
    pub fn init(&mut self, now: u32) {
        self.matrix.init(now);
    }

    /// One scan-and-process cycle.
    pub fn tick(&mut self, now: u32) {
        self.matrix.scan(now);
        self.layout.task(&mut self.matrix, now);
    }

    /// Run the tick loop forever, paced by the configured tick rate (matrix
    /// scans per millisecond).
    pub async fn run(&mut self) -> ! {
        let mut clock = Uptime;
        self.init(clock.now_ms());

        let tick_rate = self.eeconfig.borrow().tick_rate.max(1) as u64;
        let mut ticker = Ticker::every(Duration::from_micros(1000 / tick_rate));
        info!("Keyboard running");
        loop {
            self.tick(clock.now_ms());
            ticker.next().await;
        }
    }
}
