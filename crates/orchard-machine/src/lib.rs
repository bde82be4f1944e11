//! Canonical 64 KiB machine assembly: main RAM, the `$C000` I/O and slot
//! page, motherboard ROM behind a language card, auxiliary memory layers,
//! a signal bus, and a scheduler bound to the machine's event context.

use std::rc::Rc;

use orchard_bus::MainBus;
use orchard_interrupts::SignalBus;
use orchard_mem::{Composite, PhysAccessToken, PhysicalMemory, RamTarget};
use orchard_platform::{IoPageDispatcher, IoRegionTarget, MotherboardDevice, SlotCard, SlotManager};
use orchard_sched::{EventContext, Scheduler, SchedulerError};
use orchard_types::{Cycle, PagePerms, RegionTag, TargetCaps, PAGE_SHIFT};

pub mod constants;

mod aux_memory;
mod language_card;
mod provision;

pub use aux_memory::{AuxMemoryCard, AuxSetupError, AUX_MEM_LAYER, AUX_ZP_LAYER};
pub use language_card::LanguageCard;
pub use provision::{ProvisionError, ProvisioningBundle, ProvisioningBundleBuilder};

use constants::{
    HIGH_ROM_BASE, HIGH_ROM_SIZE, IO_PAGE_BASE, MAIN_RAM_SIZE, MOTHERBOARD_ID, SYSTEM_ROM_IMAGE,
};

pub struct Machine {
    bus: MainBus,
    signals: SignalBus,
    scheduler: Scheduler,
    ctx: EventContext,
    dispatcher: IoPageDispatcher,
    slots: SlotManager,
    main_ram: PhysicalMemory,
    rom: PhysicalMemory,
    language_card: LanguageCard,
    aux: AuxMemoryCard,
    debug_features: bool,
}

impl core::fmt::Debug for Machine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Machine")
            .field("cycle", &self.bus.cycle_count())
            .field("now", &self.scheduler.now())
            .field("debug_features", &self.debug_features)
            .finish_non_exhaustive()
    }
}

impl Machine {
    pub fn new(bundle: ProvisioningBundle) -> Result<Self, ProvisionError> {
        if bundle.ram_size < MAIN_RAM_SIZE || bundle.ram_size & ((1 << PAGE_SHIFT) - 1) != 0 {
            return Err(ProvisionError::RamSize {
                got: bundle.ram_size,
                min: MAIN_RAM_SIZE,
            });
        }
        for name in bundle.layout_overrides.keys() {
            if name != "io-page" {
                return Err(ProvisionError::UnknownLayoutOverride(name.clone()));
            }
        }
        let io_base = bundle
            .layout_overrides
            .get("io-page")
            .copied()
            .unwrap_or(IO_PAGE_BASE);

        let bus = MainBus::new(16)?;

        // Main RAM under the I/O page.
        let main_ram = PhysicalMemory::new(bundle.ram_size, "main");
        let ram_target = Rc::new(RamTarget::new(main_ram.slice(0, MAIN_RAM_SIZE)?));
        bus.map_region(
            0,
            MAIN_RAM_SIZE as u32,
            MOTHERBOARD_ID,
            RegionTag::Ram,
            PagePerms::ALL,
            TargetCaps::SUPPORTS_PEEK | TargetCaps::SUPPORTS_POKE | TargetCaps::SUPPORTS_WIDE,
            ram_target,
            0,
        )?;

        // Motherboard ROM image; unprovided bytes float high like an
        // unprogrammed EPROM.
        let rom = PhysicalMemory::new(HIGH_ROM_SIZE, "rom");
        rom.fill(0xFF);
        if let Some(image) = bundle.rom_images.get(SYSTEM_ROM_IMAGE) {
            if image.len() > HIGH_ROM_SIZE {
                return Err(ProvisionError::RomImageTooLarge {
                    name: SYSTEM_ROM_IMAGE.to_string(),
                    got: image.len(),
                    max: HIGH_ROM_SIZE,
                });
            }
            rom.write_physical(&PhysAccessToken::for_loader(), 0, image)?;
        }

        // I/O + slot page.
        let dispatcher = IoPageDispatcher::new();
        let slots = SlotManager::new(dispatcher.clone());
        let io_target = Rc::new(Composite::new(IoRegionTarget::new(
            io_base,
            dispatcher.clone(),
            slots.clone(),
        )));
        bus.map_page_at(
            io_base,
            orchard_bus::PageEntry::new(
                MOTHERBOARD_ID,
                RegionTag::Io,
                PagePerms::ALL,
                TargetCaps::SUPPORTS_PEEK | TargetCaps::SUPPORTS_POKE | TargetCaps::HAS_SIDE_EFFECTS,
                io_target,
                0,
            ),
        )?;

        // Language card over $D000..$FFFF.
        let language_card = LanguageCard::new(rom.read_only_slice(0, HIGH_ROM_SIZE)?);
        language_card.register_handlers(&dispatcher);
        bus.map_region(
            HIGH_ROM_BASE,
            HIGH_ROM_SIZE as u32,
            MOTHERBOARD_ID,
            RegionTag::Rom,
            PagePerms::ALL,
            TargetCaps::SUPPORTS_PEEK | TargetCaps::SUPPORTS_POKE,
            language_card.region_target()?,
            0,
        )?;

        // Auxiliary memory layers (snapshots the base RAM mappings).
        let aux = AuxMemoryCard::new(bus.clone())?;
        aux.register_handlers(&dispatcher);

        let signals = SignalBus::new();
        let ctx = EventContext::new(bus.clone(), signals.clone());
        let mut scheduler = Scheduler::new();
        scheduler.set_context(ctx.clone());

        for (slot, card) in &bundle.devices {
            slots.install(*slot, card.clone())?;
            card.borrow_mut().initialize(&ctx);
        }

        tracing::debug!(
            ram = bundle.ram_size,
            io_base,
            cards = bundle.devices.len(),
            "machine provisioned"
        );

        Ok(Machine {
            bus,
            signals,
            scheduler,
            ctx,
            dispatcher,
            slots,
            main_ram,
            rom,
            language_card,
            aux,
            debug_features: bundle.enable_debug_features,
        })
    }

    pub fn bus(&self) -> &MainBus {
        &self.bus
    }

    pub fn signals(&self) -> &SignalBus {
        &self.signals
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    pub fn event_context(&self) -> &EventContext {
        &self.ctx
    }

    pub fn dispatcher(&self) -> &IoPageDispatcher {
        &self.dispatcher
    }

    pub fn slots(&self) -> &SlotManager {
        &self.slots
    }

    pub fn main_ram(&self) -> &PhysicalMemory {
        &self.main_ram
    }

    pub fn rom(&self) -> &PhysicalMemory {
        &self.rom
    }

    pub fn language_card(&self) -> &LanguageCard {
        &self.language_card
    }

    pub fn aux_memory(&self) -> &AuxMemoryCard {
        &self.aux
    }

    pub fn debug_features_enabled(&self) -> bool {
        self.debug_features
    }

    /// Advances the scheduler by `cycles` from its current stamp.
    pub fn run_for(&mut self, cycles: Cycle) -> Result<(), SchedulerError> {
        let target = self.scheduler.now() + cycles;
        self.scheduler.advance(target)
    }

    /// Cold reset: cards, soft switches, signal lines, scheduler queue, and
    /// cycle accounting. Mappings and RAM contents survive, as they do on
    /// real hardware.
    pub fn reset(&mut self) {
        tracing::debug!("machine reset");
        self.slots.reset();
        self.language_card.reset();
        self.aux.reset();
        self.signals.reset();
        self.scheduler.reset();
        self.scheduler.set_context(self.ctx.clone());
        self.bus.reset_cycle_count();
    }
}
