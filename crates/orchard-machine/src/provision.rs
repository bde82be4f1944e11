use std::collections::HashMap;

use orchard_bus::{LayerError, MapError};
use orchard_mem::SliceError;
use orchard_platform::{SlotCardHandle, SlotError};
use orchard_types::Addr;

use crate::aux_memory::AuxSetupError;
use crate::constants::MAIN_RAM_SIZE;

/// Everything needed to stand a machine up. Plain value with a builder; no
/// file format is implied — loaders fill it however they like.
pub struct ProvisioningBundle {
    pub ram_size: usize,
    pub rom_images: HashMap<String, Vec<u8>>,
    pub devices: Vec<(usize, SlotCardHandle)>,
    pub layout_overrides: HashMap<String, Addr>,
    pub enable_debug_features: bool,
}

impl Default for ProvisioningBundle {
    fn default() -> Self {
        ProvisioningBundle {
            ram_size: MAIN_RAM_SIZE,
            rom_images: HashMap::new(),
            devices: Vec::new(),
            layout_overrides: HashMap::new(),
            enable_debug_features: false,
        }
    }
}

impl ProvisioningBundle {
    pub fn builder() -> ProvisioningBundleBuilder {
        ProvisioningBundleBuilder {
            bundle: ProvisioningBundle::default(),
        }
    }
}

pub struct ProvisioningBundleBuilder {
    bundle: ProvisioningBundle,
}

impl ProvisioningBundleBuilder {
    pub fn ram_size(mut self, bytes: usize) -> Self {
        self.bundle.ram_size = bytes;
        self
    }

    pub fn rom_image(mut self, name: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.bundle.rom_images.insert(name.into(), bytes);
        self
    }

    pub fn device(mut self, slot: usize, card: SlotCardHandle) -> Self {
        self.bundle.devices.push((slot, card));
        self
    }

    pub fn layout_override(mut self, name: impl Into<String>, addr: Addr) -> Self {
        self.bundle.layout_overrides.insert(name.into(), addr);
        self
    }

    pub fn enable_debug_features(mut self, on: bool) -> Self {
        self.bundle.enable_debug_features = on;
        self
    }

    pub fn build(self) -> ProvisioningBundle {
        self.bundle
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("main RAM must be at least {min:#X} bytes and page-aligned; got {got:#X}")]
    RamSize { got: usize, min: usize },
    #[error("ROM image {name:?} is {got:#X} bytes; at most {max:#X} fit")]
    RomImageTooLarge {
        name: String,
        got: usize,
        max: usize,
    },
    #[error("unknown layout override {0:?}")]
    UnknownLayoutOverride(String),
    #[error(transparent)]
    Map(#[from] MapError),
    #[error(transparent)]
    Layer(#[from] LayerError),
    #[error(transparent)]
    Slice(#[from] SliceError),
    #[error(transparent)]
    Slot(#[from] SlotError),
    #[error(transparent)]
    Aux(#[from] AuxSetupError),
}
