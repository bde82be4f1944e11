use orchard_types::Addr;

use crate::SwapGroupId;

/// Page-table construction and mapping errors. The `param` fields name the
/// offending argument the way the public API spells it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MapError {
    #[error("address space bits {0} outside the supported range 12..=32")]
    AddressSpaceBits(u32),
    #[error("page index {index} out of range (page count {count})")]
    PageIndexOutOfRange { index: usize, count: usize },
    #[error("{param}: {value:#X} is not page-aligned")]
    Unaligned { param: &'static str, value: Addr },
    #[error("{param}: region {base:#X}+{size:#X} extends past the address space")]
    RegionOutOfRange {
        param: &'static str,
        base: Addr,
        size: Addr,
    },
    #[error("page {0} is sealed and rejects remapping")]
    SealedPage(usize),
    #[error("page {0} is not mapped")]
    PageNotMapped(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayerError {
    #[error("a layer named {0:?} already exists")]
    DuplicateLayer(String),
    #[error("no layer named {0:?}")]
    UnknownLayer(String),
    #[error("{param}: {value:#X} is not page-aligned")]
    Unaligned { param: &'static str, value: Addr },
    #[error("{param}: region {base:#X}+{size:#X} extends past the address space")]
    RegionOutOfRange {
        param: &'static str,
        base: Addr,
        size: Addr,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SwapError {
    #[error("no swap group with id {0:?}")]
    UnknownGroup(SwapGroupId),
    #[error("swap group {group:?} has no variant named {name:?}")]
    UnknownVariant { group: SwapGroupId, name: String },
    #[error("swap group {group:?} already has a variant named {name:?}")]
    DuplicateVariant { group: SwapGroupId, name: String },
    #[error("{param}: {value:#X} is not page-aligned")]
    Unaligned { param: &'static str, value: Addr },
    #[error("{param}: region {base:#X}+{size:#X} extends past the address space")]
    RegionOutOfRange {
        param: &'static str,
        base: Addr,
        size: Addr,
    },
}
