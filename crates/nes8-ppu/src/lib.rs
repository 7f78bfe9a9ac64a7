//! NES 2C02 PPU (Picture Processing Unit) emulation.
//!
//! This crate provides a cycle-accurate implementation of the NES PPU,
//! responsible for all graphics rendering.
//!
//! # Overview
//!
//! The PPU operates at 3x the CPU clock rate and generates a 256x240 pixel
//! image. It consists of several subsystems:
//!
//! - **Registers**: Control, Mask, Status, OAM Address, Scroll, Address, Data
//! - **Background rendering**: Nametables, pattern tables, attribute tables
//! - **Sprite rendering**: OAM, sprite evaluation, sprite 0 hit detection
//! - **Palette**: 32-byte palette RAM with mirroring
//!
//! # Timing
//!
//! NTSC timing (the primary target):
//! - Master clock: 21.477272 MHz
//! - PPU clock: 5.369318 MHz (master / 4)
//! - 341 dots per scanline
//! - 262 scanlines per frame
//! - 89,341-89,342 dots per frame (odd frame skip)
//!
//! # Usage
//!
//! ```no_run
//! use nes8_ppu::{Ppu, PpuBus, vram::Mirroring};
//!
//! // Implement PpuBus for your memory system
//! struct MyBus;
//!
//! impl PpuBus for MyBus {
//!     fn read(&mut self, addr: u16) -> u8 {
//!         // Read from CHR ROM/RAM via the mapper
//!         0
//!     }
//!
//!     fn write(&mut self, addr: u16, value: u8) {
//!         // Write to CHR RAM via the mapper
//!     }
//! }
//!
//! let mut ppu = Ppu::new(Mirroring::Horizontal);
//! let mut bus = MyBus;
//!
//! // Step the PPU (call 3 times per CPU cycle for NTSC)
//! let (_frame_complete, nmi) = ppu.step_with_chr(&mut bus);
//! if nmi {
//!     // Trigger NMI in CPU
//! }
//!
//! // Access registers from CPU
//! ppu.write_register(0x2000, 0x80, &mut bus); // Enable NMI
//! let status = ppu.read_register(0x2002, &mut bus);
//! ```
//!
//! # Features
//!
//! - `serde`: Enable serialization support for save states

#![warn(missing_docs)]

pub mod background;
pub mod oam;
pub mod registers;
pub mod scroll;
pub mod sprites;
pub mod timing;
pub mod vram;

mod ppu;

pub use oam::{Sprite, SpriteAttributes};
pub use ppu::{
    DOTS_PER_SCANLINE, FRAME_HEIGHT, FRAME_WIDTH, PRE_RENDER_SCANLINE, Ppu, PpuBus,
    SCANLINES_PER_FRAME, VBLANK_START_SCANLINE,
};
pub use registers::{PpuCtrl, PpuMask, PpuStatus};
pub use scroll::Scroll;
pub use vram::Mirroring;
