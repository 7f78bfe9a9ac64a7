//! NES Cartridge Mapper Implementations.
//!
//! This crate provides mapper implementations for NES cartridge emulation.
//! Mappers handle memory banking for PRG-ROM, CHR-ROM/RAM, and provide
//! various hardware features like IRQ generation.
//!
//! # Supported Mappers
//!
//! | Mapper | Name | Description |
//! |--------|------|-------------|
//! | 0 | NROM | No banking, simplest mapper |
//! | 1 | MMC1 | Nintendo's first bank-switching mapper |
//! | 2 | UxROM | PRG-ROM banking only |
//! | 3 | CNROM | CHR-ROM banking only |
//! | 4 | MMC3 | Most popular, fine-grained banking + IRQ |
//! | 7 | AxROM | 32KB PRG banking, single-screen mirroring control |
//! | 34 | BNROM | 32KB PRG banking, no CHR banking |
//! | 66 | GxROM | 32KB PRG + 8KB CHR banking |
//! | 71 | Camerica/Codemasters | 16KB PRG banking with fixed last bank |
//!
//! # Example
//!
//! ```no_run
//! use nes8_mappers::{Rom, create_mapper};
//!
//! // Load ROM from file
//! let rom_data = std::fs::read("game.nes").expect("Failed to read ROM");
//! let rom = Rom::load(&rom_data).expect("Failed to parse ROM");
//!
//! // Create appropriate mapper
//! let mut mapper = create_mapper(&rom).expect("Unsupported mapper");
//!
//! // Use mapper for memory access
//! let opcode = mapper.read_prg(0x8000);
//! let tile = mapper.read_chr(0x0000);
//! ```
//!
//! # no_std Support
//!
//! This crate supports `no_std` environments with the `alloc` feature.
//! Disable the default `std` feature for embedded use.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

#[cfg(not(feature = "std"))]
use alloc::boxed::Box;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub mod mapper;
pub mod rom;

mod axrom;
mod bnrom;
mod camerica;
mod cnrom;
mod gxrom;
mod mmc1;
mod mmc3;
mod nrom;
mod uxrom;

pub use axrom::Axrom;
pub use bnrom::Bnrom;
pub use camerica::Camerica;
pub use cnrom::Cnrom;
pub use gxrom::Gxrom;
pub use mapper::{Mapper, Mirroring};
pub use mmc1::Mmc1;
pub use mmc3::Mmc3;
pub use nrom::Nrom;
pub use rom::{Rom, RomError, RomHeader};
pub use uxrom::Uxrom;

/// Create a mapper instance from ROM data.
///
/// Returns the appropriate mapper implementation based on the ROM header's
/// mapper number. Returns an error if the mapper is not supported.
///
/// # Errors
///
/// Returns `RomError::UnsupportedMapper` if the mapper number is not
/// implemented in this crate.
///
/// # Example
///
/// ```no_run
/// use nes8_mappers::{Rom, create_mapper};
///
/// let rom_data = std::fs::read("game.nes").expect("Failed to read ROM");
/// let rom = Rom::load(&rom_data).expect("Failed to parse ROM");
/// let mapper = create_mapper(&rom).expect("Unsupported mapper");
///
/// println!("Mapper: {} ({})", mapper.mapper_name(), mapper.mapper_number());
/// ```
pub fn create_mapper(rom: &Rom) -> Result<Box<dyn Mapper>, RomError> {
    match rom.header.mapper_number {
        0 => Ok(Box::new(Nrom::new(rom))),
        1 => Ok(Box::new(Mmc1::new(rom))),
        2 => Ok(Box::new(Uxrom::new(rom))),
        3 => Ok(Box::new(Cnrom::new(rom))),
        4 => Ok(Box::new(Mmc3::new(rom))),
        7 => Ok(Box::new(Axrom::new(rom))),
        34 => Ok(Box::new(Bnrom::new(rom))),
        66 => Ok(Box::new(Gxrom::new(rom))),
        71 => Ok(Box::new(Camerica::new(rom))),
        n => Err(RomError::UnsupportedMapper(n)),
    }
}

/// Get a list of supported mapper numbers.
#[must_use]
pub fn supported_mappers() -> &'static [u16] {
    &[0, 1, 2, 3, 4, 7, 34, 66, 71]
}

/// Check if a mapper number is supported.
#[must_use]
pub fn is_mapper_supported(mapper: u16) -> bool {
    supported_mappers().contains(&mapper)
}

/// Captured state of a concrete mapper, tagged by mapper number.
///
/// `dyn Mapper` can't derive `Serialize`/`Deserialize` directly, so save
/// states go through this enum: [`MapperState::capture`] downcasts a
/// trait object to its concrete struct (which does derive serde) and
/// [`MapperState::restore`] boxes it back up.
#[cfg(feature = "serde")]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MapperState {
    /// Mapper 0 (NROM) state.
    Nrom(Nrom),
    /// Mapper 1 (MMC1) state.
    Mmc1(Mmc1),
    /// Mapper 2 (UxROM) state.
    Uxrom(Uxrom),
    /// Mapper 3 (CNROM) state.
    Cnrom(Cnrom),
    /// Mapper 4 (MMC3) state.
    Mmc3(Mmc3),
    /// Mapper 7 (AxROM) state.
    Axrom(Axrom),
    /// Mapper 34 (BNROM) state.
    Bnrom(Bnrom),
    /// Mapper 66 (GxROM) state.
    Gxrom(Gxrom),
    /// Mapper 71 (Camerica/Codemasters) state.
    Camerica(Camerica),
}

#[cfg(feature = "serde")]
impl MapperState {
    /// Capture a boxed mapper's full state, keyed by its mapper number.
    ///
    /// Returns `None` if the mapper number doesn't match any variant known
    /// to this crate (shouldn't happen for mappers produced by
    /// [`create_mapper`]).
    #[must_use]
    pub fn capture(mapper: &dyn Mapper) -> Option<Self> {
        let any = mapper.as_any();
        match mapper.mapper_number() {
            0 => any.downcast_ref::<Nrom>().cloned().map(MapperState::Nrom),
            1 => any.downcast_ref::<Mmc1>().cloned().map(MapperState::Mmc1),
            2 => any.downcast_ref::<Uxrom>().cloned().map(MapperState::Uxrom),
            3 => any.downcast_ref::<Cnrom>().cloned().map(MapperState::Cnrom),
            4 => any.downcast_ref::<Mmc3>().cloned().map(MapperState::Mmc3),
            7 => any.downcast_ref::<Axrom>().cloned().map(MapperState::Axrom),
            34 => any.downcast_ref::<Bnrom>().cloned().map(MapperState::Bnrom),
            66 => any.downcast_ref::<Gxrom>().cloned().map(MapperState::Gxrom),
            71 => any
                .downcast_ref::<Camerica>()
                .cloned()
                .map(MapperState::Camerica),
            _ => None,
        }
    }

    /// Rebuild a boxed mapper from a previously captured state.
    #[must_use]
    pub fn restore(self) -> Box<dyn Mapper> {
        match self {
            MapperState::Nrom(m) => Box::new(m),
            MapperState::Mmc1(m) => Box::new(m),
            MapperState::Uxrom(m) => Box::new(m),
            MapperState::Cnrom(m) => Box::new(m),
            MapperState::Mmc3(m) => Box::new(m),
            MapperState::Axrom(m) => Box::new(m),
            MapperState::Bnrom(m) => Box::new(m),
            MapperState::Gxrom(m) => Box::new(m),
            MapperState::Camerica(m) => Box::new(m),
        }
    }
}

/// Get the name of a mapper by number.
#[must_use]
pub fn mapper_name(mapper: u16) -> Option<&'static str> {
    match mapper {
        0 => Some("NROM"),
        1 => Some("MMC1"),
        2 => Some("UxROM"),
        3 => Some("CNROM"),
        4 => Some("MMC3"),
        7 => Some("AxROM"),
        34 => Some("BNROM"),
        66 => Some("GxROM"),
        71 => Some("Camerica"),
        _ => None,
    }
}
