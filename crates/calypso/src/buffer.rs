//! PO modification buffer accounting
//!
//! A PO accepts a bounded amount of modifications in one secure session. From
//! revision 3 on the bound is in bytes and each modifying command costs its data
//! length plus 6. Revision 2.4 POs count modifying commands instead.

use std::ops::Range;

use crate::commands::CalypsoApdu;
use crate::{Error, Result};

/// Per-command overhead of the modification buffer in bytes
pub const COMMAND_OVERHEAD: usize = 6;

/// Number of modifications a revision 2.4 PO accepts per session
pub const REV2_4_MODIFICATIONS: usize = 6;

/// Buffer size in bytes indexed by the startup information buffer size indicator
const BUFFER_SIZES: [usize; 56] = [
    0, 0, 0, 0, 0, 0, 215, 256, 304, 362, 430, 512, 608, 724, 861, 1024, 1217, 1448, 1722, 2048,
    2435, 2896, 3444, 4096, 4870, 5792, 6888, 8192, 9741, 11585, 13777, 16384, 19483, 23170, 27554,
    32768, 38967, 46340, 55108, 65536, 77935, 92681, 110217, 131072, 155871, 185363, 220435,
    262144, 311743, 370727, 440871, 524288, 623487, 741455, 881743, 1048576,
];

/// Capacity of the modification buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferCapacity {
    /// Capacity in bytes
    Bytes(usize),
    /// Capacity in modifying commands
    Operations(usize),
}

impl BufferCapacity {
    /// Capacity in bytes from the buffer size indicator
    pub fn from_indicator(indicator: u8) -> Result<Self> {
        match BUFFER_SIZES.get(usize::from(indicator)) {
            Some(&size) if size > 0 => Ok(Self::Bytes(size)),
            _ => Err(Error::Parse("unsupported buffer size indicator")),
        }
    }

    /// Capacity in units
    pub const fn units(self) -> usize {
        match self {
            Self::Bytes(units) | Self::Operations(units) => units,
        }
    }

    /// Units consumed by a command
    pub fn cost(self, apdu: &CalypsoApdu) -> usize {
        use keyple_core::ApduCommand;

        if !apdu.kind().is_modifying() {
            return 0;
        }
        match self {
            Self::Bytes(_) => usize::from(apdu.command().lc().unwrap_or(0)) + COMMAND_OVERHEAD,
            Self::Operations(_) => 1,
        }
    }
}

/// Modification buffer usage of the current session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModificationBuffer {
    capacity: BufferCapacity,
    used: usize,
}

impl ModificationBuffer {
    /// Empty buffer of the given capacity
    pub const fn new(capacity: BufferCapacity) -> Self {
        Self { capacity, used: 0 }
    }

    /// Buffer capacity
    pub const fn capacity(&self) -> BufferCapacity {
        self.capacity
    }

    /// Units used in the current session
    pub const fn used(&self) -> usize {
        self.used
    }

    /// Units still available in the current session
    pub const fn remaining(&self) -> usize {
        self.capacity.units().saturating_sub(self.used)
    }

    /// Returns true if a command of this cost fits in the current session
    pub const fn fits(&self, cost: usize) -> bool {
        cost <= self.remaining()
    }

    /// Record a command cost
    pub const fn consume(&mut self, cost: usize) {
        self.used += cost;
    }

    /// Start a new session
    pub const fn reset(&mut self) {
        self.used = 0;
    }

    /// Split a sequence of command costs into consecutive sessions
    ///
    /// The first range continues the current session. A new session starts right
    /// before the first command that does not fit. The split is greedy and only
    /// depends on the cumulative costs.
    pub fn plan(&self, costs: &[usize]) -> Result<Vec<Range<usize>>> {
        let capacity = self.capacity.units();
        if let Some(&cost) = costs.iter().find(|&&cost| cost > capacity) {
            return Err(Error::CommandExceedsBuffer { cost, capacity });
        }

        let mut ranges = Vec::new();
        let mut start = 0;
        let mut used = self.used;
        for (index, &cost) in costs.iter().enumerate() {
            if used + cost > capacity {
                ranges.push(start..index);
                start = index;
                used = 0;
            }
            used += cost;
        }
        ranges.push(start..costs.len());
        Ok(ranges)
    }
}
