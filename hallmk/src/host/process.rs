//! Host protocol command dispatch.

use core::cell::RefCell;

use byteorder::{ByteOrder, LittleEndian};
use num_enum::FromPrimitive;

use hallmk_types::config::{AdvancedKey, ADVANCED_KEY_BYTES};
use hallmk_types::gamepad::{GamepadButton, GamepadFlags};
use hallmk_types::keyboard_macro::MacroSequence;
use hallmk_types::keycode::KeyCode;
use hallmk_types::profile::Profile;
use hallmk_types::{ADVANCED_KEY_MAX_NUM, FIRMWARE_VERSION, NUM_MACROS};

use crate::analog::AnalogReader;
use crate::boot::BootHook;
use crate::eeconfig::{CalibrationConfig, DeviceOptions, Eeconfig};
use crate::gamepad::GamepadMapper;
use crate::hid::HidReporter;
use crate::layout::Layout;
use crate::matrix::Matrix;
use crate::storage::{FlashOperationMessage, FLASH_CHANNEL};

use super::protocol::{
    HostCommand, ANALOG_INFO_KEYS_PER_PACKET, PACKET_SIZE, PAGE_DATA_SIZE, RESPONSE_FAILURE,
};

/// Stateless-per-packet service implementing the host configuration
/// protocol against the shared configuration image, the matrix and the
/// layout engine.
pub struct HostService<'a, const NUM_KEYS: usize, const NUM_LAYERS: usize, const NUM_PROFILES: usize> {
    eeconfig: &'a RefCell<Eeconfig<NUM_KEYS, NUM_LAYERS, NUM_PROFILES>>,
    /// Chunked out over the Metadata command, conventionally JSON
    metadata: &'static [u8],
    serial: &'static str,
}

impl<'a, const NUM_KEYS: usize, const NUM_LAYERS: usize, const NUM_PROFILES: usize>
    HostService<'a, NUM_KEYS, NUM_LAYERS, NUM_PROFILES>
{
    pub fn new(
        eeconfig: &'a RefCell<Eeconfig<NUM_KEYS, NUM_LAYERS, NUM_PROFILES>>,
        metadata: &'static [u8],
        serial: &'static str,
    ) -> Self {
        Self {
            eeconfig,
            metadata,
            serial,
        }
    }

    /// Handle one request packet and fill in the response packet. The
    /// response echoes the command id, or [`RESPONSE_FAILURE`] when the
    /// request was malformed or could not be applied.
    pub fn process<A, H, G, B>(
        &mut self,
        matrix: &mut Matrix<'a, A, NUM_KEYS, NUM_LAYERS, NUM_PROFILES>,
        layout: &mut Layout<'a, H, G, B, NUM_KEYS, NUM_LAYERS, NUM_PROFILES>,
        now: u32,
        request: &[u8; PACKET_SIZE],
        response: &mut [u8; PACKET_SIZE],
    ) where
        A: AnalogReader,
        H: HidReporter,
        G: GamepadMapper,
        B: BootHook,
    {
        *response = [0; PACKET_SIZE];
        response[0] = request[0];

        let command = HostCommand::from_primitive(request[0]);
        debug!("Host command: {}", request[0]);
        if !self.dispatch(command, matrix, layout, now, request, response) {
            response[0] = RESPONSE_FAILURE;
        }
    }

    fn dispatch<A, H, G, B>(
        &mut self,
        command: HostCommand,
        matrix: &mut Matrix<'a, A, NUM_KEYS, NUM_LAYERS, NUM_PROFILES>,
        layout: &mut Layout<'a, H, G, B, NUM_KEYS, NUM_LAYERS, NUM_PROFILES>,
        now: u32,
        request: &[u8; PACKET_SIZE],
        response: &mut [u8; PACKET_SIZE],
    ) -> bool
    where
        A: AnalogReader,
        H: HidReporter,
        G: GamepadMapper,
        B: BootHook,
    {
        match command {
            HostCommand::FirmwareVersion => {
                LittleEndian::write_u16(&mut response[1..3], FIRMWARE_VERSION);
                true
            }
            HostCommand::Reboot => {
                layout.boot_mut().reboot();
                true
            }
            HostCommand::Bootloader => {
                layout.boot_mut().enter_bootloader();
                true
            }
            HostCommand::FactoryReset => {
                layout.advanced_key_clear();
                {
                    let mut eeconfig = self.eeconfig.borrow_mut();
                    eeconfig.calibration = CalibrationConfig::const_default();
                    eeconfig.options = DeviceOptions::new().with_save_bottom_out_threshold(true);
                    eeconfig.bottom_out_threshold = [0; NUM_KEYS];
                    eeconfig.current_profile = 0;
                    eeconfig.last_non_default_profile = 0;
                    for profile in eeconfig.profiles.iter_mut() {
                        *profile = Profile::const_default();
                    }
                    for sequence in eeconfig.macros.iter_mut() {
                        *sequence = MacroSequence::const_default();
                    }
                    eeconfig.tick_rate = crate::eeconfig::DEFAULT_TICK_RATE;
                }
                layout.load_advanced_keys();
                matrix.recalibrate(now, false);
                FLASH_CHANNEL.try_send(FlashOperationMessage::Reset).is_ok()
            }
            HostCommand::Recalibrate => {
                matrix.recalibrate(now, request[1] != 0);
                true
            }
            HostCommand::AnalogInfo => {
                let offset = request[1] as usize;
                if offset >= NUM_KEYS {
                    return false;
                }
                let count = ANALOG_INFO_KEYS_PER_PACKET.min(NUM_KEYS - offset);
                response[1] = request[1];
                response[2] = count as u8;
                for i in 0..count {
                    let state = matrix.key(offset + i);
                    let at = 3 + 3 * i;
                    LittleEndian::write_u16(&mut response[at..at + 2], state.adc_filtered);
                    response[at + 2] = state.distance;
                }
                true
            }
            HostCommand::GetCalibration => {
                let calibration = self.eeconfig.borrow().calibration;
                LittleEndian::write_u16(&mut response[1..3], calibration.initial_rest_value);
                LittleEndian::write_u16(&mut response[3..5], calibration.initial_bottom_out_threshold);
                true
            }
            HostCommand::SetCalibration => {
                {
                    let mut eeconfig = self.eeconfig.borrow_mut();
                    eeconfig.calibration = CalibrationConfig {
                        initial_rest_value: LittleEndian::read_u16(&request[1..3]),
                        initial_bottom_out_threshold: LittleEndian::read_u16(&request[3..5]),
                    };
                }
                FLASH_CHANNEL.try_send(FlashOperationMessage::Calibration).is_ok()
            }
            HostCommand::GetProfile => {
                response[1] = self.eeconfig.borrow().current_profile;
                true
            }
            HostCommand::GetOptions => {
                response[1] = self.eeconfig.borrow().options.into_bits();
                true
            }
            HostCommand::SetOptions => {
                self.eeconfig.borrow_mut().options = DeviceOptions::from_bits(request[1]);
                FLASH_CHANNEL.try_send(FlashOperationMessage::Options).is_ok()
            }
            HostCommand::ResetProfile => {
                let index = request[1] as usize;
                if index >= NUM_PROFILES {
                    return false;
                }
                layout.advanced_key_clear();
                self.eeconfig.borrow_mut().profiles[index] = Profile::const_default();
                layout.load_advanced_keys();
                FLASH_CHANNEL
                    .try_send(FlashOperationMessage::Profile(index as u8))
                    .is_ok()
            }
            HostCommand::DuplicateProfile => {
                let src = request[1] as usize;
                let dst = request[2] as usize;
                if src >= NUM_PROFILES || dst >= NUM_PROFILES || src == dst {
                    return false;
                }
                layout.advanced_key_clear();
                {
                    let mut eeconfig = self.eeconfig.borrow_mut();
                    eeconfig.profiles[dst] = eeconfig.profiles[src];
                }
                layout.load_advanced_keys();
                FLASH_CHANNEL
                    .try_send(FlashOperationMessage::Profile(dst as u8))
                    .is_ok()
            }
            HostCommand::Metadata => {
                let offset = LittleEndian::read_u16(&request[1..3]) as usize;
                if offset > self.metadata.len() {
                    return false;
                }
                let len = (self.metadata.len() - offset).min(PACKET_SIZE - 2);
                response[1] = len as u8;
                response[2..2 + len].copy_from_slice(&self.metadata[offset..offset + len]);
                true
            }
            HostCommand::Serial => {
                let bytes = self.serial.as_bytes();
                let len = bytes.len().min(PACKET_SIZE - 2);
                response[1] = len as u8;
                response[2..2 + len].copy_from_slice(&bytes[..len]);
                true
            }

            HostCommand::GetKeymap => self.paged_read(request, response, NUM_LAYERS * NUM_KEYS, |cfg, pos| {
                cfg.current_profile().keymap[pos / NUM_KEYS][pos % NUM_KEYS].into()
            }),
            HostCommand::SetKeymap => {
                // Keymap writes can move advanced keys between layers
                layout.advanced_key_clear();
                let ok = self.paged_write(request, NUM_LAYERS * NUM_KEYS, |cfg, pos, byte| {
                    cfg.current_profile_mut().keymap[pos / NUM_KEYS][pos % NUM_KEYS] = KeyCode::from_primitive(byte);
                });
                layout.load_advanced_keys();
                ok && self.persist_current_profile()
            }
            HostCommand::GetActuationMap => self.paged_read(request, response, 4 * NUM_KEYS, |cfg, pos| {
                let actuation = &cfg.current_profile().actuation_map[pos / 4];
                match pos % 4 {
                    0 => actuation.actuation_point,
                    1 => actuation.rt_down,
                    2 => actuation.rt_up,
                    _ => actuation.continuous as u8,
                }
            }),
            HostCommand::SetActuationMap => {
                let ok = self.paged_write(request, 4 * NUM_KEYS, |cfg, pos, byte| {
                    let actuation = &mut cfg.current_profile_mut().actuation_map[pos / 4];
                    match pos % 4 {
                        0 => actuation.actuation_point = byte,
                        1 => actuation.rt_down = byte,
                        2 => actuation.rt_up = byte,
                        _ => actuation.continuous = byte != 0,
                    }
                });
                ok && self.persist_current_profile()
            }
            HostCommand::GetAdvancedKeys => {
                self.paged_read(request, response, ADVANCED_KEY_MAX_NUM * ADVANCED_KEY_BYTES, |cfg, pos| {
                    let mut entry = [0u8; ADVANCED_KEY_BYTES];
                    cfg.current_profile().advanced_keys[pos / ADVANCED_KEY_BYTES].pack_into(&mut entry);
                    entry[pos % ADVANCED_KEY_BYTES]
                })
            }
            HostCommand::SetAdvancedKeys => {
                layout.advanced_key_clear();
                let ok = self.paged_write(request, ADVANCED_KEY_MAX_NUM * ADVANCED_KEY_BYTES, |cfg, pos, byte| {
                    let slot = &mut cfg.current_profile_mut().advanced_keys[pos / ADVANCED_KEY_BYTES];
                    let mut entry = [0u8; ADVANCED_KEY_BYTES];
                    slot.pack_into(&mut entry);
                    entry[pos % ADVANCED_KEY_BYTES] = byte;
                    *slot = AdvancedKey::unpack_from(&entry);
                });
                layout.load_advanced_keys();
                ok && self.persist_current_profile()
            }
            HostCommand::GetTickRate => self.paged_read(request, response, 1, |cfg, _| cfg.tick_rate),
            HostCommand::SetTickRate => {
                let ok = self.paged_write(request, 1, |cfg, _, byte| {
                    cfg.tick_rate = byte.max(1);
                });
                ok && FLASH_CHANNEL.try_send(FlashOperationMessage::TickRate).is_ok()
            }
            HostCommand::GetGamepadButtons => self.paged_read(request, response, NUM_KEYS, |cfg, pos| {
                cfg.current_profile().gamepad_buttons[pos].into()
            }),
            HostCommand::SetGamepadButtons => {
                let ok = self.paged_write(request, NUM_KEYS, |cfg, pos, byte| {
                    cfg.current_profile_mut().gamepad_buttons[pos] = GamepadButton::from_primitive(byte);
                });
                ok && self.persist_current_profile()
            }
            HostCommand::GetGamepadOptions => self.paged_read(request, response, 9, |cfg, pos| {
                let options = &cfg.current_profile().gamepad_options;
                if pos < 8 {
                    options.analog_curve[pos / 2][pos % 2]
                } else {
                    options.flags.into_bits()
                }
            }),
            HostCommand::SetGamepadOptions => {
                let ok = self.paged_write(request, 9, |cfg, pos, byte| {
                    let options = &mut cfg.current_profile_mut().gamepad_options;
                    if pos < 8 {
                        options.analog_curve[pos / 2][pos % 2] = byte;
                    } else {
                        options.flags = GamepadFlags::from_bits(byte);
                    }
                });
                ok && self.persist_current_profile()
            }
            HostCommand::GetMacros => {
                self.paged_read(request, response, NUM_MACROS * MacroSequence::PACKED_BYTES, |cfg, pos| {
                    let mut entry = [0u8; MacroSequence::PACKED_BYTES];
                    cfg.macros[pos / MacroSequence::PACKED_BYTES].pack_into(&mut entry);
                    entry[pos % MacroSequence::PACKED_BYTES]
                })
            }
            HostCommand::SetMacros => {
                let ok = self.paged_write(request, NUM_MACROS * MacroSequence::PACKED_BYTES, |cfg, pos, byte| {
                    let sequence = &mut cfg.macros[pos / MacroSequence::PACKED_BYTES];
                    let mut entry = [0u8; MacroSequence::PACKED_BYTES];
                    sequence.pack_into(&mut entry);
                    entry[pos % MacroSequence::PACKED_BYTES] = byte;
                    *sequence = MacroSequence::unpack_from(&entry);
                });
                ok && FLASH_CHANNEL.try_send(FlashOperationMessage::Macros).is_ok()
            }

            HostCommand::Unknown => false,
        }
    }

    /// Paged read: request `[cmd, off_lo, off_hi, len]`, response
    /// `[cmd, off_lo, off_hi, len, data...]`. `len` is clamped to the packet
    /// and the remaining bytes of the addressed region.
    fn paged_read(
        &self,
        request: &[u8; PACKET_SIZE],
        response: &mut [u8; PACKET_SIZE],
        total: usize,
        byte_at: impl Fn(&Eeconfig<NUM_KEYS, NUM_LAYERS, NUM_PROFILES>, usize) -> u8,
    ) -> bool {
        let offset = LittleEndian::read_u16(&request[1..3]) as usize;
        if offset >= total {
            return false;
        }
        let len = (request[3] as usize).min(PAGE_DATA_SIZE).min(total - offset);

        response[1] = request[1];
        response[2] = request[2];
        response[3] = len as u8;
        let eeconfig = self.eeconfig.borrow();
        for i in 0..len {
            response[4 + i] = byte_at(&eeconfig, offset + i);
        }
        true
    }

    /// Paged write: request `[cmd, off_lo, off_hi, len, data...]`.
    fn paged_write(
        &self,
        request: &[u8; PACKET_SIZE],
        total: usize,
        mut write_byte: impl FnMut(&mut Eeconfig<NUM_KEYS, NUM_LAYERS, NUM_PROFILES>, usize, u8),
    ) -> bool {
        let offset = LittleEndian::read_u16(&request[1..3]) as usize;
        let len = request[3] as usize;
        if len > PAGE_DATA_SIZE || offset + len > total {
            return false;
        }

        let mut eeconfig = self.eeconfig.borrow_mut();
        for i in 0..len {
            write_byte(&mut eeconfig, offset + i, request[4 + i]);
        }
        true
    }

    fn persist_current_profile(&self) -> bool {
        let current = self.eeconfig.borrow().current_profile;
        FLASH_CHANNEL
            .try_send(FlashOperationMessage::Profile(current))
            .is_ok()
    }
}
