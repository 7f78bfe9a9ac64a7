//! Save state system for the nes8-engine emulator.
//!
//! This module provides instant save/load functionality for complete emulator state,
//! enabling features like rewind, TAS recording, and quick save/load.
//!
//! # Format
//!
//! Save states use a custom binary format with the following structure:
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │ Header (72 bytes)                   │
//! │  - Magic: "RNES" (4 bytes)          │
//! │  - Version: u32                     │
//! │  - Checksum: CRC32 of payload       │
//! │  - Flags: u32 (reserved)            │
//! │  - ROM Hash: SHA-256 (32 bytes)     │
//! │  - Timestamp: u64                   │
//! │  - Frame Count: u64                 │
//! │  - Reserved: 8 bytes                │
//! ├─────────────────────────────────────┤
//! │ State Data (bincode, variable)      │
//! └─────────────────────────────────────┘
//! ```
//!
//! The state data is the CPU, system bus (RAM, PPU, APU, mapper,
//! controllers), and frame/cycle counters, encoded with `bincode`. The
//! mapper goes through [`nes8_mappers::MapperState`] since a boxed trait
//! object can't derive `Serialize` directly.
//!
//! # Usage
//!
//! ```no_run
//! use nes8_engine::Console;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let rom = std::fs::read("game.nes")?;
//! let mut console = Console::from_rom_bytes(&rom)?;
//!
//! for _ in 0..1000 {
//!     console.step_frame();
//! }
//!
//! # #[cfg(feature = "serde")]
//! # {
//! let save = console.save_state()?;
//!
//! for _ in 0..500 {
//!     console.step_frame();
//! }
//!
//! console.load_state(&save)?;
//! # }
//! # Ok(())
//! # }
//! ```
//!
//! # Performance
//!
//! - Uncompressed save: ~50KB, <0.1ms
//! - Load: <0.5ms
//!
//! Save states are not compressed; `bincode`'s fixed-size encoding of the
//! component structs is already compact and decoding it is the dominant
//! cost for rewind-style use cases, where speed matters more than size.

pub mod error;

pub use error::SaveStateError;

#[cfg(feature = "serde")]
use crate::bus::BusState;
#[cfg(feature = "serde")]
use nes8_cpu::Cpu;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[cfg(all(feature = "serde", not(feature = "std")))]
use alloc::{string::ToString, vec::Vec};

/// Save state format version
pub const SAVE_STATE_VERSION: u32 = 1;

/// Magic bytes for save state files
pub const SAVE_STATE_MAGIC: &[u8; 4] = b"RNES";

/// Size of the fixed-length header in bytes.
const HEADER_SIZE: usize = 72;

/// Full emulator state captured by [`crate::Console::save_state`].
#[cfg(feature = "serde")]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ConsoleState {
    pub(crate) cpu: Cpu,
    pub(crate) bus: BusState,
    pub(crate) total_cycles: u64,
    pub(crate) frame_count: u64,
}

/// Encode a captured console state into the "RNES" binary format.
#[cfg(feature = "serde")]
pub(crate) fn encode(state: &ConsoleState, rom_hash: [u8; 32]) -> Result<Vec<u8>, SaveStateError> {
    let payload =
        bincode::serialize(state).map_err(|e| SaveStateError::Compression(e.to_string()))?;
    let checksum = crc32fast::hash(&payload);

    #[cfg(feature = "std")]
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    #[cfg(not(feature = "std"))]
    let timestamp: u64 = 0;

    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.extend_from_slice(SAVE_STATE_MAGIC);
    out.extend_from_slice(&SAVE_STATE_VERSION.to_le_bytes());
    out.extend_from_slice(&checksum.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes()); // flags, reserved for future use
    out.extend_from_slice(&rom_hash);
    out.extend_from_slice(&timestamp.to_le_bytes());
    out.extend_from_slice(&state.frame_count.to_le_bytes());
    out.extend_from_slice(&[0u8; 8]); // reserved
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Decode and validate a save state blob produced by [`encode`].
///
/// `expected_rom_hash`, when `Some`, is checked against the hash embedded in
/// the header; `None` skips the check (used when the console wasn't built
/// from raw ROM bytes and so has no hash of its own to compare against).
#[cfg(feature = "serde")]
pub(crate) fn decode(
    data: &[u8],
    expected_rom_hash: Option<[u8; 32]>,
) -> Result<ConsoleState, SaveStateError> {
    if data.len() < HEADER_SIZE {
        return Err(SaveStateError::InsufficientData {
            needed: HEADER_SIZE,
            available: data.len(),
        });
    }

    if &data[0..4] != SAVE_STATE_MAGIC.as_slice() {
        return Err(SaveStateError::InvalidMagic);
    }

    let version = u32::from_le_bytes(data[4..8].try_into().unwrap());
    if version != SAVE_STATE_VERSION {
        return Err(SaveStateError::UnsupportedVersion(version));
    }

    let checksum = u32::from_le_bytes(data[8..12].try_into().unwrap());
    // data[12..16] is the reserved flags field.
    let rom_hash: [u8; 32] = data[16..48].try_into().unwrap();
    // data[48..56] is the timestamp, informational only.
    // data[56..64] mirrors the frame count for quick inspection without a
    // full bincode decode; the payload's copy is authoritative.
    // data[64..72] is reserved.

    let payload = &data[HEADER_SIZE..];
    let actual_checksum = crc32fast::hash(payload);
    if actual_checksum != checksum {
        return Err(SaveStateError::ChecksumMismatch {
            expected: checksum,
            actual: actual_checksum,
        });
    }

    if let Some(expected) = expected_rom_hash {
        if expected != rom_hash {
            return Err(SaveStateError::RomMismatch {
                expected,
                actual: rom_hash,
            });
        }
    }

    bincode::deserialize(payload).map_err(|e| SaveStateError::Decompression(e.to_string()))
}
