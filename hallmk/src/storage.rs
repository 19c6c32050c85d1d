//! Wear-levelled persistence of the configuration image.
//!
//! The core never blocks on flash: mutation paths update the in-memory
//! [`Eeconfig`] and post a [`FlashOperationMessage`] naming what changed.
//! The storage task drains the channel and writes the named slice of the
//! image as a `sequential-storage` map item, which provides the wear
//! levelling. At boot, [`Storage::new`] restores the image from flash.

use core::cell::RefCell;
use core::ops::Range;

use byteorder::{ByteOrder, LittleEndian};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embedded_storage_async::nor_flash::NorFlash;
use sequential_storage::cache::NoCache;
use sequential_storage::map::{fetch_item, store_item, SerializationError, Value};

use hallmk_types::keyboard_macro::MacroSequence;
use hallmk_types::profile::Profile;
use hallmk_types::NUM_MACROS;

use crate::eeconfig::{CalibrationConfig, DeviceOptions, Eeconfig};

/// Layout version of the stored image. Bump when the packed layouts change;
/// a mismatch discards the stored image.
const STORAGE_MAGIC: u32 = 0x484D_4B01;

/// Large enough for the biggest item (a packed profile) plus item overhead.
pub const STORAGE_BUFFER_SIZE: usize = 4096;

pub(crate) const FLASH_CHANNEL_SIZE: usize = 8;

/// Channel from the core to the storage task.
pub static FLASH_CHANNEL: Channel<CriticalSectionRawMutex, FlashOperationMessage, FLASH_CHANNEL_SIZE> = Channel::new();

/// What part of the image changed. The storage task reads the current data
/// from the shared image when it handles the message, so messages stay small
/// and the channel never carries key material twice.
#[derive(Debug, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashOperationMessage {
    Calibration,
    Options,
    /// `current_profile` and `last_non_default_profile`
    ProfileSelection,
    TickRate,
    BottomOutThresholds,
    /// One whole profile
    Profile(u8),
    /// The macro pool
    Macros,
    /// Factory reset: erase the storage area and rewrite the whole image
    Reset,
}

#[repr(u32)]
enum StorageKeys {
    Magic = 0,
    Calibration = 1,
    Options = 2,
    ProfileSelection = 3,
    TickRate = 4,
    BottomOutThresholds = 5,
    Macros = 6,
    /// Profiles occupy `ProfileBase + index`
    ProfileBase = 0x100,
}

/// Raw byte payload stored as a map value. The map key already identifies the
/// item, so no tag byte is needed.
struct RawValue<'a>(&'a [u8]);

impl<'a> Value<'a> for RawValue<'a> {
    fn serialize_into(&self, buffer: &mut [u8]) -> Result<usize, SerializationError> {
        if buffer.len() < self.0.len() {
            return Err(SerializationError::BufferTooSmall);
        }
        buffer[..self.0.len()].copy_from_slice(self.0);
        Ok(self.0.len())
    }

    fn deserialize_from(buffer: &'a [u8]) -> Result<Self, SerializationError> {
        Ok(RawValue(buffer))
    }
}

/// The storage task. Owns the flash peripheral and a reference to the shared
/// configuration image.
pub struct Storage<'a, F: NorFlash, const NUM_KEYS: usize, const NUM_LAYERS: usize, const NUM_PROFILES: usize> {
    pub flash: F,
    pub storage_range: Range<u32>,
    eeconfig: &'a RefCell<Eeconfig<NUM_KEYS, NUM_LAYERS, NUM_PROFILES>>,
}

impl<'a, F: NorFlash, const NUM_KEYS: usize, const NUM_LAYERS: usize, const NUM_PROFILES: usize>
    Storage<'a, F, NUM_KEYS, NUM_LAYERS, NUM_PROFILES>
{
    /// Open the storage area and restore the image. A missing or mismatched
    /// magic value reinitializes the area from the current image instead.
    pub async fn new(
        flash: F,
        storage_range: Range<u32>,
        eeconfig: &'a RefCell<Eeconfig<NUM_KEYS, NUM_LAYERS, NUM_PROFILES>>,
    ) -> Self {
        let mut storage = Self {
            flash,
            storage_range,
            eeconfig,
        };

        if storage.read_magic().await == Some(STORAGE_MAGIC) {
            if storage.restore().await.is_err() {
                error!("Restoring configuration failed");
            }
        } else {
            info!("Storage is uninitialized or outdated, rewriting");
            if storage.initialize().await.is_err() {
                error!("Initializing storage failed");
            }
        }

        storage
    }

    /// Drain flash operation messages forever.
    pub async fn run(&mut self) -> ! {
        loop {
            let message = FLASH_CHANNEL.receive().await;
            if self.handle(message).await.is_err() {
                error!("Flash operation failed");
            }
        }
    }

    async fn handle(&mut self, message: FlashOperationMessage) -> Result<(), SerializationError> {
        debug!("Handling flash operation: {:?}", message);
        match message {
            FlashOperationMessage::Calibration => {
                let calibration = self.eeconfig.borrow().calibration;
                let mut buf = [0u8; 4];
                encode_calibration(&calibration, &mut buf);
                self.store(StorageKeys::Calibration as u32, &buf).await
            }
            FlashOperationMessage::Options => {
                let options = self.eeconfig.borrow().options;
                self.store(StorageKeys::Options as u32, &[options.into_bits()]).await
            }
            FlashOperationMessage::ProfileSelection => {
                let (current, last) = {
                    let eeconfig = self.eeconfig.borrow();
                    (eeconfig.current_profile, eeconfig.last_non_default_profile)
                };
                self.store(StorageKeys::ProfileSelection as u32, &[current, last]).await
            }
            FlashOperationMessage::TickRate => {
                let tick_rate = self.eeconfig.borrow().tick_rate;
                self.store(StorageKeys::TickRate as u32, &[tick_rate]).await
            }
            FlashOperationMessage::BottomOutThresholds => {
                let mut buf = [0u8; STORAGE_BUFFER_SIZE];
                let len = {
                    let eeconfig = self.eeconfig.borrow();
                    for (i, threshold) in eeconfig.bottom_out_threshold.iter().enumerate() {
                        LittleEndian::write_u16(&mut buf[2 * i..2 * i + 2], *threshold);
                    }
                    2 * NUM_KEYS
                };
                self.store(StorageKeys::BottomOutThresholds as u32, &buf[..len]).await
            }
            FlashOperationMessage::Profile(index) => self.store_profile(index).await,
            FlashOperationMessage::Macros => {
                let mut buf = [0u8; NUM_MACROS * MacroSequence::PACKED_BYTES];
                {
                    let eeconfig = self.eeconfig.borrow();
                    for (i, sequence) in eeconfig.macros.iter().enumerate() {
                        sequence.pack_into(&mut buf[i * MacroSequence::PACKED_BYTES..]);
                    }
                }
                self.store(StorageKeys::Macros as u32, &buf).await
            }
            FlashOperationMessage::Reset => self.initialize().await,
        }
    }

    async fn store_profile(&mut self, index: u8) -> Result<(), SerializationError> {
        if index as usize >= NUM_PROFILES {
            return Ok(());
        }
        let mut buf = [0u8; STORAGE_BUFFER_SIZE];
        let len = {
            let eeconfig = self.eeconfig.borrow();
            eeconfig.profiles[index as usize].pack_into(&mut buf)
        };
        self.store(StorageKeys::ProfileBase as u32 + index as u32, &buf[..len]).await
    }

    /// Erase the storage area and rewrite every item from the current image.
    async fn initialize(&mut self) -> Result<(), SerializationError> {
        if sequential_storage::erase_all(&mut self.flash, self.storage_range.clone())
            .await
            .is_err()
        {
            error!("Erasing the storage area failed");
            return Err(SerializationError::InvalidData);
        }

        let mut magic = [0u8; 4];
        LittleEndian::write_u32(&mut magic, STORAGE_MAGIC);
        self.store(StorageKeys::Magic as u32, &magic).await?;

        self.handle(FlashOperationMessage::Calibration).await?;
        self.handle(FlashOperationMessage::Options).await?;
        self.handle(FlashOperationMessage::ProfileSelection).await?;
        self.handle(FlashOperationMessage::TickRate).await?;
        self.handle(FlashOperationMessage::BottomOutThresholds).await?;
        self.handle(FlashOperationMessage::Macros).await?;
        for profile in 0..NUM_PROFILES as u8 {
            self.store_profile(profile).await?;
        }
        Ok(())
    }

    async fn restore(&mut self) -> Result<(), SerializationError> {
        let mut buf = [0u8; STORAGE_BUFFER_SIZE];

        if let Some(bytes) = self.fetch(StorageKeys::Calibration as u32, &mut buf).await {
            if bytes.len() >= 4 {
                self.eeconfig.borrow_mut().calibration = decode_calibration(bytes);
            }
        }
        if let Some(bytes) = self.fetch(StorageKeys::Options as u32, &mut buf).await {
            if let Some(&options) = bytes.first() {
                self.eeconfig.borrow_mut().options = DeviceOptions::from_bits(options);
            }
        }
        if let Some(bytes) = self.fetch(StorageKeys::ProfileSelection as u32, &mut buf).await {
            if bytes.len() >= 2 {
                let mut eeconfig = self.eeconfig.borrow_mut();
                eeconfig.current_profile = bytes[0] % NUM_PROFILES as u8;
                eeconfig.last_non_default_profile = bytes[1] % NUM_PROFILES as u8;
            }
        }
        if let Some(bytes) = self.fetch(StorageKeys::TickRate as u32, &mut buf).await {
            if let Some(&tick_rate) = bytes.first() {
                self.eeconfig.borrow_mut().tick_rate = tick_rate.max(1);
            }
        }
        if let Some(bytes) = self.fetch(StorageKeys::BottomOutThresholds as u32, &mut buf).await {
            if bytes.len() >= 2 * NUM_KEYS {
                let mut eeconfig = self.eeconfig.borrow_mut();
                for i in 0..NUM_KEYS {
                    eeconfig.bottom_out_threshold[i] = LittleEndian::read_u16(&bytes[2 * i..2 * i + 2]);
                }
            }
        }
        if let Some(bytes) = self.fetch(StorageKeys::Macros as u32, &mut buf).await {
            if bytes.len() >= NUM_MACROS * MacroSequence::PACKED_BYTES {
                let mut eeconfig = self.eeconfig.borrow_mut();
                for i in 0..NUM_MACROS {
                    eeconfig.macros[i] = MacroSequence::unpack_from(&bytes[i * MacroSequence::PACKED_BYTES..]);
                }
            }
        }
        for index in 0..NUM_PROFILES {
            let key = StorageKeys::ProfileBase as u32 + index as u32;
            if let Some(bytes) = self.fetch(key, &mut buf).await {
                if bytes.len() >= Profile::<NUM_KEYS, NUM_LAYERS>::PACKED_BYTES {
                    self.eeconfig.borrow_mut().profiles[index] = Profile::unpack_from(bytes);
                }
            }
        }

        info!("Configuration restored from flash");
        Ok(())
    }

    async fn read_magic(&mut self) -> Option<u32> {
        let mut buf = [0u8; 64];
        let bytes = self.fetch(StorageKeys::Magic as u32, &mut buf).await?;
        if bytes.len() >= 4 {
            Some(LittleEndian::read_u32(bytes))
        } else {
            None
        }
    }

    async fn store(&mut self, key: u32, data: &[u8]) -> Result<(), SerializationError> {
        let mut data_buffer = [0u8; STORAGE_BUFFER_SIZE];
        store_item(
            &mut self.flash,
            self.storage_range.clone(),
            &mut NoCache::new(),
            &mut data_buffer,
            key,
            &RawValue(data),
        )
        .await
        .map_err(|_| SerializationError::InvalidData)
    }

    async fn fetch<'b>(&mut self, key: u32, data_buffer: &'b mut [u8]) -> Option<&'b [u8]> {
        match fetch_item::<u32, RawValue<'b>, _>(
            &mut self.flash,
            self.storage_range.clone(),
            &mut NoCache::new(),
            data_buffer,
            key,
        )
        .await
        {
            Ok(Some(value)) => Some(value.0),
            Ok(None) => None,
            Err(_) => {
                error!("Fetching storage item failed");
                None
            }
        }
    }
}

fn encode_calibration(calibration: &CalibrationConfig, out: &mut [u8; 4]) {
    LittleEndian::write_u16(&mut out[0..2], calibration.initial_rest_value);
    LittleEndian::write_u16(&mut out[2..4], calibration.initial_bottom_out_threshold);
}

fn decode_calibration(bytes: &[u8]) -> CalibrationConfig {
    CalibrationConfig {
        initial_rest_value: LittleEndian::read_u16(&bytes[0..2]),
        initial_bottom_out_threshold: LittleEndian::read_u16(&bytes[2..4]),
    }
}
