//! BIU presence flags and controller mode bits

use std::fmt;

use serde::{Deserialize, Serialize};

const BIU_MASKS: [u64; 4] = [
    0xFFFF_0000_0000_0000,
    0x0000_FFFF_0000_0000,
    0x0000_0000_FFFF_0000,
    0x0000_0000_0000_FFFF,
];

/// 64-bit BIU mask, one 16-bit quadrant per BIU
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BiuMask(pub u64);

/// BIU presence flags as reported by static status (bits 0..=3)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BiuFlags(pub u8);

impl BiuFlags {
    /// True when BIU number `biu` (0-based) is present
    pub fn is_set(self, biu: usize) -> bool {
        biu < 8 && self.0 & (1 << biu) != 0
    }

    /// Expand each of the four flag bits into its 16-bit quadrant.
    ///
    /// Bit 0 maps to the most significant quadrant.
    pub fn to_biu_mask(self) -> BiuMask {
        let mask = BIU_MASKS
            .iter()
            .enumerate()
            .filter(|(biu, _)| self.is_set(*biu))
            .fold(0u64, |acc, (_, quadrant)| acc | quadrant);
        BiuMask(mask)
    }
}

impl fmt::Display for BiuFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for biu in 0..4 {
            let group = if self.is_set(biu) {
                "1111111111111111"
            } else {
                "0000000000000000"
            };
            f.write_str(group)?;
        }
        Ok(())
    }
}

/// Controller mode byte
///
/// - bit 0: clear = TS2, set = ATC
/// - bit 1: clear = Safe, set = Normal
/// - bit 7: watchdog active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StaticStatusMode(pub u8);

impl StaticStatusMode {
    /// ATC controller
    pub fn is_atc(self) -> bool {
        self.0 & 0x01 == 0x01
    }

    /// TS2 controller
    pub fn is_ts2(self) -> bool {
        !self.is_atc()
    }

    /// Normal operation
    pub fn is_normal(self) -> bool {
        self.0 & 0x02 == 0x02
    }

    /// Safe (fallback) operation
    pub fn is_safe(self) -> bool {
        !self.is_normal()
    }

    /// Watchdog timer active
    pub fn is_wdt(self) -> bool {
        self.0 & 0x80 != 0
    }
}

impl fmt::Display for StaticStatusMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08b}, {}", self.0, self.0)?;
        f.write_str(if self.is_atc() { ",ATC" } else { ",TS2" })?;
        f.write_str(if self.is_normal() { ",Normal" } else { ",Safe" })?;
        if self.is_wdt() {
            f.write_str(",WDT")?;
        }
        Ok(())
    }
}
