//! Bootloader / reset seam. Entering the bootloader is board-specific, so the
//! core only signals the intent through this trait.

/// Board reset hooks.
pub trait BootHook {
    /// Reboot into the firmware-update bootloader.
    fn enter_bootloader(&mut self);

    /// Plain reboot.
    fn reboot(&mut self);
}

/// Placeholder for boards without bootloader support.
#[derive(Default)]
pub struct NoBoot;

impl BootHook for NoBoot {
    fn enter_bootloader(&mut self) {
        warn!("Jump-to-bootloader is unsupported for this board");
    }

    fn reboot(&mut self) {
        warn!("Reboot is unsupported for this board");
    }
}
