//! Command ids and packet framing of the host configuration protocol.

use num_enum::FromPrimitive;

/// Raw HID packet size in both directions.
pub const PACKET_SIZE: usize = 64;

/// First byte of a response to a failed or malformed request.
pub const RESPONSE_FAILURE: u8 = 0xFF;

/// Payload bytes available to paged reads after the echoed header.
pub const PAGE_DATA_SIZE: usize = PACKET_SIZE - 4;

/// Keys per analog-info response packet.
pub const ANALOG_INFO_KEYS_PER_PACKET: usize = 20;

/// Host protocol commands. 0-14 are device-level, 128-141 are paged
/// configuration accessors.
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum HostCommand {
    FirmwareVersion = 0,
    Reboot = 1,
    Bootloader = 2,
    FactoryReset = 3,
    Recalibrate = 4,
    AnalogInfo = 5,
    GetCalibration = 6,
    SetCalibration = 7,
    GetProfile = 8,
    GetOptions = 9,
    SetOptions = 10,
    ResetProfile = 11,
    DuplicateProfile = 12,
    Metadata = 13,
    Serial = 14,

    GetKeymap = 128,
    SetKeymap = 129,
    GetActuationMap = 130,
    SetActuationMap = 131,
    GetAdvancedKeys = 132,
    SetAdvancedKeys = 133,
    GetTickRate = 134,
    SetTickRate = 135,
    GetGamepadButtons = 136,
    SetGamepadButtons = 137,
    GetGamepadOptions = 138,
    SetGamepadOptions = 139,
    GetMacros = 140,
    SetMacros = 141,

    #[num_enum(default)]
    Unknown = 0xFF,
}
