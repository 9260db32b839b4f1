use crate::error::DynarecError;

/// Access width in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    Byte,
    Half,
    Word,
    Double,
}

impl Width {
    pub const fn bytes(self) -> u32 {
        match self {
            Width::Byte => 1,
            Width::Half => 2,
            Width::Word => 4,
            Width::Double => 8,
        }
    }

    /// Mask selecting the low `bytes()` bytes of a value.
    pub const fn mask(self) -> u64 {
        match self {
            Width::Byte => 0xFF,
            Width::Half => 0xFFFF,
            Width::Word => 0xFFFF_FFFF,
            Width::Double => u64::MAX,
        }
    }
}

/// Memory operations generated code hands to the dispatcher.
///
/// The discriminants are the wire values passed through the memory
/// callback.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Lw = 0,
    Lwu = 1,
    Lh = 2,
    Lhu = 3,
    Lb = 4,
    Lbu = 5,
    Ld = 6,
    Lwc1 = 7,
    Ldc1 = 8,
    Sw = 9,
    Sh = 10,
    Sb = 11,
    Sd = 12,
    Swc1 = 13,
    Sdc1 = 14,
}

impl AccessKind {
    pub const ALL: [AccessKind; 15] = [
        AccessKind::Lw,
        AccessKind::Lwu,
        AccessKind::Lh,
        AccessKind::Lhu,
        AccessKind::Lb,
        AccessKind::Lbu,
        AccessKind::Ld,
        AccessKind::Lwc1,
        AccessKind::Ldc1,
        AccessKind::Sw,
        AccessKind::Sh,
        AccessKind::Sb,
        AccessKind::Sd,
        AccessKind::Swc1,
        AccessKind::Sdc1,
    ];

    pub const fn width(self) -> Width {
        match self {
            AccessKind::Lb | AccessKind::Lbu | AccessKind::Sb => Width::Byte,
            AccessKind::Lh | AccessKind::Lhu | AccessKind::Sh => Width::Half,
            AccessKind::Lw
            | AccessKind::Lwu
            | AccessKind::Lwc1
            | AccessKind::Sw
            | AccessKind::Swc1 => Width::Word,
            AccessKind::Ld | AccessKind::Ldc1 | AccessKind::Sd | AccessKind::Sdc1 => {
                Width::Double
            }
        }
    }

    pub const fn is_store(self) -> bool {
        matches!(
            self,
            AccessKind::Sw
                | AccessKind::Sh
                | AccessKind::Sb
                | AccessKind::Sd
                | AccessKind::Swc1
                | AccessKind::Sdc1
        )
    }

    /// Loads whose destination is an FPR.
    pub const fn is_fpu(self) -> bool {
        matches!(
            self,
            AccessKind::Lwc1 | AccessKind::Ldc1 | AccessKind::Swc1 | AccessKind::Sdc1
        )
    }

    /// Extend a raw loaded value to the 64-bit register image.
    ///
    /// Signed loads sign-extend, the `u` forms zero-extend, doubleword
    /// and FPU loads pass the bits through.
    pub const fn extend(self, raw: u64) -> u64 {
        match self {
            AccessKind::Lw => raw as u32 as i32 as i64 as u64,
            AccessKind::Lwu => raw as u32 as u64,
            AccessKind::Lh => raw as u16 as i16 as i64 as u64,
            AccessKind::Lhu => raw as u16 as u64,
            AccessKind::Lb => raw as u8 as i8 as i64 as u64,
            AccessKind::Lbu => raw as u8 as u64,
            AccessKind::Lwc1 | AccessKind::Swc1 | AccessKind::Sw => raw & 0xFFFF_FFFF,
            AccessKind::Sh => raw & 0xFFFF,
            AccessKind::Sb => raw & 0xFF,
            AccessKind::Ld | AccessKind::Ldc1 | AccessKind::Sd | AccessKind::Sdc1 => raw,
        }
    }
}

impl TryFrom<u32> for AccessKind {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, u32> {
        AccessKind::ALL
            .get(value as usize)
            .copied()
            .ok_or(value)
    }
}

/// One memory request from generated code.
///
/// For loads, `value` carries the destination register index and the
/// dispatcher writes the extended result into that register. For
/// stores, `value` carries the data to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemAccess {
    pub kind: AccessKind,
    pub addr: u32,
    pub value: u64,
    pub pc: u32,
    pub delay_slot: bool,
}

impl MemAccess {
    /// Decode the raw callback arguments.
    pub fn from_raw(
        value: u64,
        addr: u32,
        kind: u32,
        pc: u32,
        delay_slot: bool,
    ) -> Result<Self, DynarecError> {
        let kind = AccessKind::try_from(kind)
            .map_err(|kind| DynarecError::UnsupportedAccess { kind, pc })?;
        Ok(Self {
            kind,
            addr,
            value,
            pc,
            delay_slot,
        })
    }

    /// Destination register of a load.
    #[inline]
    pub fn dest_reg(&self) -> usize {
        (self.value & 31) as usize
    }
}
