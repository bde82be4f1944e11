use crate::{AccessIntent, Addr, DeviceId, RegionTag};

/// Fault taxonomy for bus accesses. `None` exists so a fault kind can be
/// stored in places that also represent "no fault"; it never appears inside
/// an `Err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FaultKind {
    #[default]
    None,
    Unmapped,
    Permission,
    Nx,
    Misaligned,
    DeviceFault,
}

impl core::fmt::Display for FaultKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            FaultKind::None => "none",
            FaultKind::Unmapped => "unmapped",
            FaultKind::Permission => "permission",
            FaultKind::Nx => "nx",
            FaultKind::Misaligned => "misaligned",
            FaultKind::DeviceFault => "device-fault",
        };
        f.write_str(s)
    }
}

/// A failed bus access. Returned by the fallible bus entry points; the
/// infallible ones panic with its `Display` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{kind} fault at ${address:04X} (region {region}, intent {intent}, device {device_id})")]
pub struct BusFault {
    pub kind: FaultKind,
    pub address: Addr,
    pub device_id: DeviceId,
    pub region: RegionTag,
    pub intent: AccessIntent,
}

impl BusFault {
    pub fn unmapped(address: Addr, intent: AccessIntent) -> Self {
        BusFault {
            kind: FaultKind::Unmapped,
            address,
            device_id: 0,
            region: RegionTag::Unknown,
            intent,
        }
    }
}

pub type BusResult<T> = Result<T, BusFault>;
