//! Shared test rig: a keyboard wired to a scripted analog source, a
//! recording HID reporter and a manually advanced millisecond clock.

use core::cell::RefCell;
use std::rc::Rc;

use hallmk::analog::AnalogReader;
use hallmk::boot::NoBoot;
use hallmk::eeconfig::Eeconfig;
use hallmk::gamepad::NoGamepad;
use hallmk::hid::{HidReporter, KeyboardReportState};
use hallmk::keyboard::Keyboard;
use hallmk::matrix::MatrixConfig;
use hallmk_types::config::{Actuation, AdvancedBehavior, AdvancedKey};
use hallmk_types::keycode::KeyCode;

// Init logger for tests
#[ctor::ctor]
fn init_log() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

pub const NUM_KEYS: usize = 8;
pub const NUM_LAYERS: usize = 4;
pub const NUM_PROFILES: usize = 2;

pub type TestEeconfig = Eeconfig<NUM_KEYS, NUM_LAYERS, NUM_PROFILES>;
pub type TestKeyboard = Keyboard<'static, SharedAnalog, SharedHid, NoGamepad, NoBoot, NUM_KEYS, NUM_LAYERS, NUM_PROFILES>;

/// Travel value used for a full press in tests.
pub const PRESS_DEPTH: u16 = 200;

/// Analog source whose per-key values are set by the test script. The test
/// eeconfig maps ADC counts 1:1 onto travel distance.
#[derive(Clone, Default)]
pub struct SharedAnalog(pub Rc<RefCell<[u16; NUM_KEYS]>>);

impl AnalogReader for SharedAnalog {
    const MAX_VALUE: u16 = 4095;

    fn read(&mut self, key: usize) -> u16 {
        self.0.borrow()[key]
    }
}

/// Reporter that records one `(modifier, sorted keycodes)` snapshot per
/// `send_reports` call.
#[derive(Clone, Default)]
pub struct SharedHid(pub Rc<RefCell<HidLog>>);

#[derive(Default)]
pub struct HidLog {
    pub state: KeyboardReportState,
    pub reports: Vec<(u8, Vec<u8>)>,
}

impl HidReporter for SharedHid {
    fn keycode_add(&mut self, keycode: KeyCode) {
        self.0.borrow_mut().state.add(keycode);
    }

    fn keycode_remove(&mut self, keycode: KeyCode) {
        self.0.borrow_mut().state.remove(keycode);
    }

    fn send_reports(&mut self) {
        let mut log = self.0.borrow_mut();
        let report = log.state.as_report();
        let mut keys: Vec<u8> = report.keycodes.iter().copied().filter(|&k| k != 0).collect();
        keys.sort_unstable();
        log.reports.push((report.modifier, keys));
    }
}

pub struct TestBed {
    pub keyboard: TestKeyboard,
    pub adc: SharedAnalog,
    pub hid: SharedHid,
    pub eeconfig: &'static RefCell<TestEeconfig>,
    pub now: u32,
}

impl TestBed {
    /// Build a keyboard over a test image: ADC counts equal travel distance,
    /// no filtering, no calibration window, threshold persistence off.
    pub fn new(configure: impl FnOnce(&mut TestEeconfig)) -> Self {
        let mut eeconfig = TestEeconfig::const_default();
        eeconfig.calibration.initial_rest_value = 0;
        eeconfig.calibration.initial_bottom_out_threshold = 255;
        eeconfig.options = eeconfig.options.with_save_bottom_out_threshold(false);
        configure(&mut eeconfig);

        // Box::leak is acceptable in tests
        let eeconfig: &'static RefCell<TestEeconfig> = Box::leak(Box::new(RefCell::new(eeconfig)));
        let adc = SharedAnalog::default();
        let hid = SharedHid::default();
        let config = MatrixConfig {
            ema_alpha_exponent: 0,
            calibration_duration: 0,
            calibration_epsilon: 16,
            inactivity_timeout: 30_000,
        };
        let mut keyboard = Keyboard::new(eeconfig, adc.clone(), hid.clone(), NoGamepad, NoBoot, config);
        keyboard.init(0);

        Self {
            keyboard,
            adc,
            hid,
            eeconfig,
            now: 0,
        }
    }

    /// Advance one millisecond and run one scan-and-process cycle.
    pub fn tick(&mut self) {
        self.now += 1;
        self.keyboard.tick(self.now);
    }

    /// Tick until the given absolute time.
    pub fn run_until(&mut self, time: u32) {
        while self.now < time {
            self.tick();
        }
    }

    pub fn set_travel(&self, key: usize, distance: u16) {
        self.adc.0.borrow_mut()[key] = distance;
    }

    /// Full press on the next tick.
    pub fn press(&self, key: usize) {
        self.set_travel(key, PRESS_DEPTH);
    }

    /// Full release on the next tick.
    pub fn release(&self, key: usize) {
        self.set_travel(key, 0);
    }

    /// All reports recorded so far, as `(modifier, sorted nonzero keycodes)`.
    pub fn reports(&self) -> Vec<(u8, Vec<u8>)> {
        self.hid.0.borrow().reports.clone()
    }

    pub fn clear_reports(&self) {
        self.hid.0.borrow_mut().reports.clear();
    }

    /// Current report state, regardless of what was sent.
    pub fn held(&self) -> (u8, Vec<u8>) {
        let report = self.hid.0.borrow().state.as_report();
        let mut keys: Vec<u8> = report.keycodes.iter().copied().filter(|&k| k != 0).collect();
        keys.sort_unstable();
        (report.modifier, keys)
    }
}

/// Compare recorded reports against the expected sequence.
pub fn assert_reports(bed: &TestBed, expected: &[(u8, &[KeyCode])]) {
    let reports = bed.reports();
    let expected: Vec<(u8, Vec<u8>)> = expected
        .iter()
        .map(|(modifier, keys)| {
            let mut keys: Vec<u8> = keys.iter().map(|&k| k as u8).collect();
            keys.sort_unstable();
            (*modifier, keys)
        })
        .collect();
    assert_eq!(reports, expected, "unexpected report sequence");
}

pub fn set_keycode(eeconfig: &mut TestEeconfig, layer: usize, key: usize, keycode: KeyCode) {
    eeconfig.profiles[0].keymap[layer][key] = keycode;
}

pub fn set_actuation(eeconfig: &mut TestEeconfig, key: usize, actuation: Actuation) {
    eeconfig.profiles[0].actuation_map[key] = actuation;
}

pub fn set_advanced_key(eeconfig: &mut TestEeconfig, slot: usize, layer: u8, key: u8, behavior: AdvancedBehavior) {
    eeconfig.profiles[0].advanced_keys[slot] = AdvancedKey { layer, key, behavior };
}
