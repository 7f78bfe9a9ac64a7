//! Top-level PPU state machine and register interface.
//!
//! Ties together timing, scroll/address registers, background and sprite
//! pipelines, VRAM, and OAM into a single per-dot `step` function.

use crate::background::Background;
use crate::oam::{Oam, SecondaryOam};
use crate::registers::{PpuCtrl, PpuMask, PpuStatus};
use crate::scroll::Scroll;
use crate::sprites::{SpriteEvaluator, SpriteRenderer};
use crate::timing::Timing;
use crate::vram::{Mirroring, Vram};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Dots per scanline (NTSC).
pub const DOTS_PER_SCANLINE: u16 = 341;
/// Scanlines per frame (NTSC).
pub const SCANLINES_PER_FRAME: u16 = 262;
/// First VBlank scanline.
pub const VBLANK_START_SCANLINE: u16 = 241;
/// Pre-render scanline.
pub const PRE_RENDER_SCANLINE: u16 = 261;
/// Visible frame width in pixels.
pub const FRAME_WIDTH: usize = 256;
/// Visible frame height in pixels.
pub const FRAME_HEIGHT: usize = 240;

/// Bus trait for PPU access to CHR memory (pattern tables via the mapper).
///
/// Implementors route pattern-table reads/writes to the cartridge; the PPU
/// itself owns nametable and palette RAM directly.
pub trait PpuBus {
    /// Read a byte from the CHR address space ($0000-$1FFF).
    fn read(&mut self, addr: u16) -> u8;
    /// Write a byte to the CHR address space ($0000-$1FFF, CHR-RAM only).
    fn write(&mut self, addr: u16, value: u8);
}

/// The NES 2C02 Picture Processing Unit.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Ppu {
    ctrl: PpuCtrl,
    mask: PpuMask,
    status: PpuStatus,
    scroll: Scroll,
    vram: Vram,
    oam: Oam,
    secondary_oam: SecondaryOam,
    background: Background,
    sprite_renderer: SpriteRenderer,
    sprite_evaluator: SpriteEvaluator,
    timing: Timing,
    frame_buffer: Vec<u8>,
    vram_read_buffer: u8,
    open_bus_latch: u8,
    open_bus_decay: u32,
    nmi_pending: bool,
    nmi_output: bool,
    sprite_zero_in_range: bool,
    sprite_fetch_low: u8,
    sprite_fetch_high: u8,
}

/// Roughly one second of PPU dots (NTSC), used for open-bus decay.
const OPEN_BUS_DECAY_DOTS: u32 = 5_369_318 / 2;

impl Ppu {
    /// Create a new PPU with the given nametable mirroring mode.
    #[must_use]
    pub fn new(mirroring: Mirroring) -> Self {
        Self {
            ctrl: PpuCtrl::empty(),
            mask: PpuMask::empty(),
            status: PpuStatus::empty(),
            scroll: Scroll::new(),
            vram: Vram::new(mirroring),
            oam: Oam::new(),
            secondary_oam: SecondaryOam::new(),
            background: Background::new(),
            sprite_renderer: SpriteRenderer::new(),
            sprite_evaluator: SpriteEvaluator::new(),
            timing: Timing::new(),
            frame_buffer: vec![0; FRAME_WIDTH * FRAME_HEIGHT],
            vram_read_buffer: 0,
            open_bus_latch: 0,
            open_bus_decay: 0,
            nmi_pending: false,
            nmi_output: false,
            sprite_zero_in_range: false,
            sprite_fetch_low: 0,
            sprite_fetch_high: 0,
        }
    }

    fn refresh_open_bus(&mut self, value: u8) {
        self.open_bus_latch = value;
        self.open_bus_decay = OPEN_BUS_DECAY_DOTS;
    }

    fn decay_open_bus(&mut self) {
        if self.open_bus_decay > 0 {
            self.open_bus_decay -= 1;
        } else {
            self.open_bus_latch = 0;
        }
    }

    /// Read a CPU-visible PPU register at `$2000-$2007` (mirrored every 8 bytes).
    pub fn read_register(&mut self, addr: u16, bus: &mut impl PpuBus) -> u8 {
        match addr & 0x0007 {
            0x0002 => {
                let result = (self.status.bits() & 0xE0) | (self.open_bus_latch & 0x1F);
                // Reading $2002 within a couple of dots of the VBlank-set dot
                // races the flag: at the exact set dot the read still sees it
                // set but suppresses the NMI that would otherwise fire.
                if self.timing.scanline() == VBLANK_START_SCANLINE
                    && (self.timing.dot() == 0 || self.timing.dot() == 1)
                {
                    self.nmi_pending = false;
                }
                self.status.clear_vblank();
                self.scroll.reset_latch();
                self.refresh_open_bus(result);
                result
            }
            0x0004 => {
                let value = self.oam.read();
                self.refresh_open_bus(value);
                value
            }
            0x0007 => {
                let addr = self.scroll.vram_addr();
                let value = if addr < 0x3F00 {
                    let buffered = self.vram_read_buffer;
                    self.vram_read_buffer = if addr < 0x2000 {
                        bus.read(addr)
                    } else {
                        self.vram.read(addr)
                    };
                    buffered
                } else {
                    // Palette reads are immediate but still refill the
                    // buffer from the underlying (mirrored) nametable byte.
                    self.vram_read_buffer = self.vram.read(addr - 0x1000);
                    self.vram.read(addr)
                };
                self.scroll.increment_vram(self.ctrl.vram_increment());
                self.refresh_open_bus(value);
                value
            }
            _ => self.open_bus_latch,
        }
    }

    /// Write a CPU-visible PPU register at `$2000-$2007`.
    pub fn write_register(&mut self, addr: u16, value: u8, bus: &mut impl PpuBus) {
        self.refresh_open_bus(value);
        match addr & 0x0007 {
            0x0000 => {
                let was_enabled = self.ctrl.nmi_enabled();
                self.ctrl = PpuCtrl::from_bits_truncate(value);
                self.scroll.write_ctrl(value);
                if !was_enabled && self.ctrl.nmi_enabled() && self.status.in_vblank() {
                    self.nmi_pending = true;
                }
            }
            0x0001 => self.mask = PpuMask::from_bits_truncate(value),
            0x0003 => self.oam.set_addr(value),
            0x0004 => self.oam.write(value),
            0x0005 => self.scroll.write_scroll(value),
            0x0006 => self.scroll.write_addr(value),
            0x0007 => {
                let addr = self.scroll.vram_addr();
                if addr < 0x2000 {
                    bus.write(addr, value);
                } else {
                    self.vram.write(addr, value);
                }
                self.scroll.increment_vram(self.ctrl.vram_increment());
            }
            _ => {}
        }
    }

    /// Perform an OAM DMA transfer (256 bytes from CPU memory).
    pub fn oam_dma(&mut self, data: &[u8; 256]) {
        self.oam.dma_write(data);
    }

    /// Advance the PPU by one dot, without CHR access (for tests/tools).
    pub fn step(&mut self) -> (bool, bool) {
        struct NullBus;
        impl PpuBus for NullBus {
            fn read(&mut self, _addr: u16) -> u8 {
                0
            }
            fn write(&mut self, _addr: u16, _value: u8) {}
        }
        self.step_with_chr(&mut NullBus)
    }

    /// Advance the PPU by one dot, routing pattern-table access through `bus`.
    ///
    /// Returns `(frame_complete, nmi)`.
    pub fn step_with_chr(&mut self, bus: &mut impl PpuBus) -> (bool, bool) {
        self.decay_open_bus();

        let rendering_enabled = self.mask.rendering_enabled();
        let frame_complete = self.timing.tick(rendering_enabled);

        let scanline = self.timing.scanline();
        let dot = self.timing.dot();

        if self.timing.is_vblank_set_dot() {
            self.status.set_vblank();
            if self.ctrl.nmi_enabled() {
                self.nmi_pending = true;
            }
        } else if self.timing.is_vblank_clear_dot() {
            self.status.clear_vblank();
            self.status.clear_sprite_flags();
            self.nmi_pending = false;
        }

        if rendering_enabled && self.timing.is_rendering_scanline() {
            self.run_rendering_pipeline(scanline, dot, bus);
        }

        if self.timing.is_visible_scanline() && self.timing.is_visible_dot() {
            let x = (dot - 1) as usize;
            let y = scanline as usize;
            self.render_pixel(x, y);
        }

        let nmi = self.nmi_output;
        self.nmi_output = self.nmi_pending;
        self.nmi_pending = false;

        (frame_complete, nmi)
    }

    fn run_rendering_pipeline(&mut self, scanline: u16, dot: u16, bus: &mut impl PpuBus) {
        if self.timing.is_visible_dot() || self.timing.is_prefetch_dot() || dot == 0 {
            self.tick_background_fetch(dot, bus);
        }

        if dot == 256 {
            self.scroll.increment_y();
        }

        self.sprite_renderer.tick();

        if self.timing.is_hori_copy_dot() {
            self.scroll.copy_horizontal();
        }

        if self.timing.is_vert_copy_range() {
            self.scroll.copy_vertical();
        }

        if dot == 1 {
            self.secondary_oam.clear();
            self.sprite_evaluator.start_evaluation();
        }

        if self.timing.is_sprite_eval_range() {
            let next_scanline = scanline.wrapping_add(1);
            self.sprite_evaluator.evaluate_step(
                self.oam.data(),
                next_scanline,
                self.ctrl.sprite_height(),
                &mut self.secondary_oam,
            );
        }

        if self.timing.is_sprite_fetch_start() {
            self.sprite_zero_in_range = self.sprite_evaluator.sprite_zero_in_range();
            self.sprite_renderer
                .load_sprites(&self.secondary_oam, self.sprite_zero_in_range);
        }

        if self.timing.is_sprite_fetch_range() {
            self.tick_sprite_fetch(dot, bus);
        }
    }

    fn tick_background_fetch(&mut self, dot: u16, bus: &mut impl PpuBus) {
        self.background.shift_registers();

        match dot % 8 {
            1 => {
                let addr = self.scroll.nametable_addr();
                let byte = self.vram.read(addr);
                self.background.set_nametable_byte(byte);
            }
            3 => {
                let addr = self.scroll.attribute_addr();
                let byte = self.vram.read(addr);
                self.background
                    .set_attribute_byte(byte, self.scroll.coarse_x(), self.scroll.coarse_y());
            }
            5 => {
                let tile = self.vram.read(self.scroll.nametable_addr());
                let addr = self.scroll.pattern_addr(tile, self.ctrl.bg_table_addr());
                self.background.set_pattern_low(bus.read(addr));
            }
            7 => {
                let tile = self.vram.read(self.scroll.nametable_addr());
                let addr = self.scroll.pattern_addr(tile, self.ctrl.bg_table_addr()) + 8;
                self.background.set_pattern_high(bus.read(addr));
            }
            0 => {
                self.background.load_shift_registers();
                self.scroll.increment_x();
            }
            _ => {}
        }
    }

    fn tick_sprite_fetch(&mut self, dot: u16, bus: &mut impl PpuBus) {
        let slot = ((dot - 257) / 8) as u8;
        let step = (dot - 257) % 8;
        if slot >= 8 {
            return;
        }

        if let Some(sprite) = self.secondary_oam.get_sprite(slot) {
            let height = self.ctrl.sprite_height();
            let next_scanline = self.timing.scanline().wrapping_add(1);
            let mut row = next_scanline.wrapping_sub(u16::from(sprite.y).wrapping_add(1));
            if sprite.attributes.flip_vertical() {
                row = u16::from(height).wrapping_sub(1).wrapping_sub(row);
            }

            let table = if height == 16 {
                let base = if sprite.tile_index & 0x01 != 0 {
                    0x1000
                } else {
                    0x0000
                };
                let tile = sprite.tile_index & 0xFE;
                let tile = tile + u8::from(row >= 8);
                let row = row % 8;
                base + (u16::from(tile) << 4) + row
            } else {
                self.ctrl.sprite_table_addr() + (u16::from(sprite.tile_index) << 4) + row
            };

            match step {
                5 => self.sprite_fetch_low = bus.read(table),
                7 => {
                    self.sprite_fetch_high = bus.read(table + 8);
                    let (mut low, mut high) = (self.sprite_fetch_low, self.sprite_fetch_high);
                    if sprite.attributes.flip_horizontal() {
                        low = low.reverse_bits();
                        high = high.reverse_bits();
                    }
                    self.sprite_renderer.load_sprite_pattern(slot, low, high);
                }
                _ => {}
            }
        } else if step == 7 {
            self.sprite_renderer.load_sprite_pattern(slot, 0, 0);
        }
    }

    fn render_pixel(&mut self, x: usize, y: usize) {
        let (bg_pixel, bg_palette) = if self.mask.show_background() {
            self.background.get_pixel(self.scroll.fine_x())
        } else {
            (0, 0)
        };

        let sprite = if self.mask.show_sprites() {
            self.sprite_renderer.get_pixel()
        } else {
            None
        };

        let palette_addr = match (bg_pixel, sprite) {
            (0, None) => 0,
            (0, Some((pixel, palette, _, _))) => (palette << 2) | pixel,
            (_, None) => (bg_palette << 2) | bg_pixel,
            (_, Some((pixel, palette, behind_bg, is_sprite_zero))) => {
                if is_sprite_zero && x != 255 {
                    self.status.set_sprite_zero_hit();
                }
                if behind_bg {
                    (bg_palette << 2) | bg_pixel
                } else {
                    (palette << 2) | pixel
                }
            }
        };

        self.frame_buffer[y * FRAME_WIDTH + x] = self.vram.read_palette(palette_addr);
    }

    /// Borrow the rendered frame buffer (palette indices, row-major).
    #[must_use]
    pub fn frame_buffer(&self) -> &[u8] {
        &self.frame_buffer
    }

    /// Change nametable mirroring (e.g. after a mapper bank-switch).
    pub fn set_mirroring(&mut self, mirroring: Mirroring) {
        self.vram.set_mirroring(mirroring);
    }

    /// Reset to power-up state.
    pub fn reset(&mut self) {
        self.ctrl = PpuCtrl::empty();
        self.mask = PpuMask::empty();
        self.status = PpuStatus::empty();
        self.scroll = Scroll::new();
        self.oam.reset();
        self.secondary_oam.clear();
        self.background.reset();
        self.sprite_renderer.reset();
        self.timing.reset();
        self.frame_buffer.fill(0);
        self.vram_read_buffer = 0;
        self.nmi_pending = false;
        self.nmi_output = false;
    }

    /// Current scanline (debug/save-state use).
    #[must_use]
    pub fn scanline(&self) -> u16 {
        self.timing.scanline()
    }

    /// Current dot (debug/save-state use).
    #[must_use]
    pub fn dot(&self) -> u16 {
        self.timing.dot()
    }

    /// Current frame counter.
    #[must_use]
    pub fn frame(&self) -> u64 {
        self.timing.frame()
    }

    /// Current internal VRAM address (`v`).
    #[must_use]
    pub fn vram_addr(&self) -> u16 {
        self.scroll.vram_addr()
    }

    /// Control register value.
    #[must_use]
    pub fn ctrl(&self) -> PpuCtrl {
        self.ctrl
    }

    /// Mask register value.
    #[must_use]
    pub fn mask(&self) -> PpuMask {
        self.mask
    }

    /// Status register value.
    #[must_use]
    pub fn status(&self) -> PpuStatus {
        self.status
    }
}
