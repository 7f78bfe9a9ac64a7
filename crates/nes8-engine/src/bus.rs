//! NES System Bus Implementation.
//!
//! The bus connects the CPU to all other components:
//! - PPU registers ($2000-$2007, mirrored every 8 bytes to $3FFF)
//! - APU/IO registers ($4000-$4017)
//! - Cartridge space ($4020-$FFFF)
//! - Internal RAM ($0000-$07FF, mirrored to $1FFF)

use nes8_apu::Apu;
use nes8_cpu::Bus;
use nes8_mappers::{Mapper, Mirroring};
use nes8_ppu::Ppu;

#[cfg(not(feature = "std"))]
use alloc::boxed::Box;

#[cfg(feature = "serde")]
use nes8_mappers::MapperState;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Controller input state.
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ControllerState {
    /// Button states: A, B, Select, Start, Up, Down, Left, Right
    pub buttons: u8,
}

impl ControllerState {
    /// A button mask.
    pub const A: u8 = 0x01;
    /// B button mask.
    pub const B: u8 = 0x02;
    /// Select button mask.
    pub const SELECT: u8 = 0x04;
    /// Start button mask.
    pub const START: u8 = 0x08;
    /// Up button mask.
    pub const UP: u8 = 0x10;
    /// Down button mask.
    pub const DOWN: u8 = 0x20;
    /// Left button mask.
    pub const LEFT: u8 = 0x40;
    /// Right button mask.
    pub const RIGHT: u8 = 0x80;
}

/// PPU pattern-table bus adapter.
///
/// The PPU owns its own nametable and palette RAM internally (see
/// [`nes8_ppu::vram::Vram`]); the only address range it needs routed
/// externally is CHR ($0000-$1FFF), which lives on the cartridge.
pub struct PpuMemory<'a> {
    mapper: &'a mut dyn Mapper,
    /// CHR address bit 12 ("A12") as of the last CHR access, used to detect
    /// rising edges for mappers (MMC3) that clock a scanline IRQ counter off
    /// this line rather than off flat CPU cycles.
    last_a12: &'a mut bool,
}

impl PpuMemory<'_> {
    fn track_a12(&mut self, addr: u16) {
        let a12 = addr & 0x1000 != 0;
        if a12 && !*self.last_a12 {
            self.mapper.ppu_a12_rising();
        }
        *self.last_a12 = a12;
    }
}

impl nes8_ppu::PpuBus for PpuMemory<'_> {
    fn read(&mut self, addr: u16) -> u8 {
        self.track_a12(addr);
        self.mapper.read_chr(addr)
    }

    fn write(&mut self, addr: u16, value: u8) {
        self.track_a12(addr);
        self.mapper.write_chr(addr, value);
    }
}

/// Convert a cartridge mirroring mode into the PPU's own mirroring type.
///
/// `nes8-mappers` and `nes8-ppu` each define their own `Mirroring` enum
/// since a mapper crate has no reason to depend on the PPU crate; the bus
/// is the natural seam to translate between them.
fn to_ppu_mirroring(mirroring: Mirroring) -> nes8_ppu::vram::Mirroring {
    match mirroring {
        Mirroring::Horizontal => nes8_ppu::vram::Mirroring::Horizontal,
        Mirroring::Vertical => nes8_ppu::vram::Mirroring::Vertical,
        Mirroring::SingleScreenLower => nes8_ppu::vram::Mirroring::SingleScreenLower,
        Mirroring::SingleScreenUpper => nes8_ppu::vram::Mirroring::SingleScreenUpper,
        Mirroring::FourScreen => nes8_ppu::vram::Mirroring::FourScreen,
    }
}

/// NES system bus connecting all components.
pub struct NesBus {
    /// Internal RAM (2KB, mirrored 4 times).
    pub ram: [u8; 2048],
    /// PPU (Picture Processing Unit).
    pub ppu: Ppu,
    /// APU (Audio Processing Unit).
    pub apu: Apu,
    /// Cartridge mapper.
    pub mapper: Box<dyn Mapper>,
    /// Controller 1 state.
    pub controller1: ControllerState,
    /// Controller 2 state.
    pub controller2: ControllerState,
    /// Controller 1 shift register.
    controller1_shift: u8,
    /// Controller 2 shift register.
    controller2_shift: u8,
    /// Controller strobe latch.
    controller_strobe: bool,
    /// OAM DMA page.
    oam_dma_page: Option<u8>,
    /// CPU cycle counter for DMA timing.
    cpu_cycles: u64,
    /// DMC DMA stall cycles.
    dmc_stall_cycles: u8,
    /// Last value on the data bus (for open bus behavior).
    last_bus_value: u8,
    /// NMI pending from PPU.
    nmi_pending: bool,
    /// IRQ pending from mapper/APU.
    irq_pending: bool,
    /// CHR address bit 12 as of the last PPU pattern-table access, tracked
    /// across calls so [`PpuMemory`] can detect rising edges.
    last_chr_a12: bool,
}

/// Serializable snapshot of [`NesBus`]'s state.
///
/// Mirrors `NesBus` field-for-field except the mapper, which goes through
/// [`MapperState`] since `Box<dyn Mapper>` can't derive `Serialize` itself.
#[cfg(feature = "serde")]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct BusState {
    ram: [u8; 2048],
    ppu: Ppu,
    apu: Apu,
    mapper: MapperState,
    controller1: ControllerState,
    controller2: ControllerState,
    controller1_shift: u8,
    controller2_shift: u8,
    controller_strobe: bool,
    oam_dma_page: Option<u8>,
    cpu_cycles: u64,
    dmc_stall_cycles: u8,
    last_bus_value: u8,
    nmi_pending: bool,
    irq_pending: bool,
    last_chr_a12: bool,
}

impl NesBus {
    /// Create a new NES bus with the given mapper.
    pub fn new(mapper: Box<dyn Mapper>) -> Self {
        let mirroring = to_ppu_mirroring(mapper.mirroring());
        Self {
            ram: [0; 2048],
            ppu: Ppu::new(mirroring),
            apu: Apu::new(),
            mapper,
            controller1: ControllerState::default(),
            controller2: ControllerState::default(),
            controller1_shift: 0,
            controller2_shift: 0,
            controller_strobe: false,
            oam_dma_page: None,
            cpu_cycles: 0,
            dmc_stall_cycles: 0,
            last_bus_value: 0,
            nmi_pending: false,
            irq_pending: false,
            last_chr_a12: false,
        }
    }

    /// Reset the bus and all components.
    pub fn reset(&mut self) {
        self.ram.fill(0);
        self.ppu.reset();
        self.apu.reset();
        self.mapper.reset();
        self.controller1_shift = 0;
        self.controller2_shift = 0;
        self.controller_strobe = false;
        self.oam_dma_page = None;
        self.cpu_cycles = 0;
        self.dmc_stall_cycles = 0;
        self.last_bus_value = 0;
        self.nmi_pending = false;
        self.irq_pending = false;
        self.last_chr_a12 = false;
    }

    /// Snapshot the bus's state for save states.
    #[cfg(feature = "serde")]
    pub(crate) fn capture_state(&self) -> Option<BusState> {
        Some(BusState {
            ram: self.ram,
            ppu: self.ppu.clone(),
            apu: self.apu.clone(),
            mapper: MapperState::capture(self.mapper.as_ref())?,
            controller1: self.controller1,
            controller2: self.controller2,
            controller1_shift: self.controller1_shift,
            controller2_shift: self.controller2_shift,
            controller_strobe: self.controller_strobe,
            oam_dma_page: self.oam_dma_page,
            cpu_cycles: self.cpu_cycles,
            dmc_stall_cycles: self.dmc_stall_cycles,
            last_bus_value: self.last_bus_value,
            nmi_pending: self.nmi_pending,
            irq_pending: self.irq_pending,
            last_chr_a12: self.last_chr_a12,
        })
    }

    /// Restore the bus's state from a save state snapshot.
    ///
    /// The mapper is rebuilt from `state.mapper` and replaces the current
    /// one entirely, so this should only be called against a bus whose
    /// mapper matches the save state's ROM (checked by the caller via the
    /// ROM identity hash before this is reached).
    #[cfg(feature = "serde")]
    pub(crate) fn restore_state(&mut self, state: BusState) {
        self.ram = state.ram;
        self.ppu = state.ppu;
        self.apu = state.apu;
        self.mapper = state.mapper.restore();
        self.controller1 = state.controller1;
        self.controller2 = state.controller2;
        self.controller1_shift = state.controller1_shift;
        self.controller2_shift = state.controller2_shift;
        self.controller_strobe = state.controller_strobe;
        self.oam_dma_page = state.oam_dma_page;
        self.cpu_cycles = state.cpu_cycles;
        self.dmc_stall_cycles = state.dmc_stall_cycles;
        self.last_bus_value = state.last_bus_value;
        self.nmi_pending = state.nmi_pending;
        self.irq_pending = state.irq_pending;
        self.last_chr_a12 = state.last_chr_a12;
    }

    /// Check if OAM DMA is pending.
    #[must_use]
    pub fn oam_dma_pending(&self) -> bool {
        self.oam_dma_page.is_some()
    }

    /// Execute OAM DMA transfer.
    ///
    /// Returns the number of CPU cycles consumed. The caller is responsible
    /// for advancing the bus's cycle counters (via [`NesBus::add_cpu_cycles`])
    /// and the PPU/APU for each of those cycles, one at a time - this only
    /// performs the (instantaneous, not per-cycle-accurate) 256-byte copy.
    pub fn execute_oam_dma(&mut self) -> u16 {
        if let Some(page) = self.oam_dma_page.take() {
            let base = u16::from(page) << 8;

            // Copy 256 bytes to OAM
            for i in 0..256u16 {
                let addr = base.wrapping_add(i);
                let data = self.cpu_read(addr);
                self.ppu.write_oam(data);
            }

            // DMA takes 513 or 514 cycles depending on CPU cycle parity
            if self.cpu_cycles % 2 == 1 { 514 } else { 513 }
        } else {
            0
        }
    }

    /// Internal CPU read without updating bus state (for DMA).
    fn cpu_read(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x1FFF => self.ram[(addr & 0x07FF) as usize],
            0x8000..=0xFFFF => self.mapper.read_prg(addr),
            _ => 0,
        }
    }

    /// Step the PPU by 3 dots (one CPU cycle worth).
    ///
    /// Returns `(frame_complete, nmi)`. `frame_complete` is true on the dot
    /// that wraps the PPU back to the start of a new frame, which is the
    /// only correct signal for "one frame has elapsed" - CPU cycle counts
    /// vary slightly from frame to frame because 29,780.5 CPU cycles make
    /// up one NTSC frame.
    pub fn step_ppu(&mut self) -> (bool, bool) {
        self.ppu.set_mirroring(to_ppu_mirroring(self.mapper.mirroring()));

        let mut frame_complete = false;
        let mut nmi = false;

        for _ in 0..3 {
            let mut ppu_mem = PpuMemory {
                mapper: &mut *self.mapper,
                last_a12: &mut self.last_chr_a12,
            };
            let (frame, dot_nmi) = self.ppu.step_with_chr(&mut ppu_mem);
            frame_complete |= frame;
            nmi |= dot_nmi;
        }

        if nmi {
            self.nmi_pending = true;
        }

        (frame_complete, nmi)
    }

    /// Step the APU by one CPU cycle.
    ///
    /// Returns the raw, native-rate (~1.79 MHz) audio sample. Downsampling
    /// to an output rate is the caller's responsibility.
    pub fn step_apu(&mut self) -> Option<f32> {
        self.apu.clock();

        // Handle DMC sample fetch
        if self.apu.dmc_needs_sample() {
            let addr = self.apu.dmc_sample_addr();
            let sample = self.mapper.read_prg(addr);
            self.apu.dmc_fill_sample(sample);
            self.dmc_stall_cycles = self.dmc_stall_length();
        }

        Some(self.apu.output())
    }

    /// Length of the CPU stall caused by a DMC sample fetch.
    ///
    /// Real hardware halts the CPU for 4 cycles normally, 3 if the fetch
    /// lands on a CPU write cycle (the write must complete first), and only
    /// 2 if an OAM DMA is already underway and can share the halt. We don't
    /// track per-cycle CPU read/write phase in this instruction-granular
    /// core, so cycle parity stands in for phase alignment.
    fn dmc_stall_length(&self) -> u8 {
        if self.oam_dma_pending() {
            2
        } else if self.cpu_cycles % 2 == 1 {
            3
        } else {
            4
        }
    }

    /// Check if NMI is pending.
    #[must_use]
    pub fn nmi_pending(&self) -> bool {
        self.nmi_pending
    }

    /// Acknowledge NMI.
    pub fn acknowledge_nmi(&mut self) {
        self.nmi_pending = false;
    }

    /// Check if IRQ is pending.
    #[must_use]
    pub fn irq_pending(&self) -> bool {
        self.irq_pending || self.mapper.irq_pending() || self.apu.irq_pending()
    }

    /// Acknowledge mapper IRQ.
    pub fn acknowledge_mapper_irq(&mut self) {
        self.mapper.irq_acknowledge();
    }

    /// Get the current CPU cycle count.
    #[must_use]
    pub fn cpu_cycles(&self) -> u64 {
        self.cpu_cycles
    }

    /// Increment CPU cycle count.
    pub fn add_cpu_cycles(&mut self, cycles: u8) {
        self.cpu_cycles += u64::from(cycles);
    }

    /// Read controller register.
    fn read_controller(&mut self, port: u8) -> u8 {
        let shift = if port == 0 {
            &mut self.controller1_shift
        } else {
            &mut self.controller2_shift
        };

        // Open bus behavior: bits 5-7 come from last bus value
        let open_bus = self.last_bus_value & 0xE0;

        // Read bit 0 from shift register
        let data = (*shift & 1) | open_bus;
        *shift >>= 1;
        *shift |= 0x80; // Shift in 1s after all buttons read

        data
    }

    /// Write controller strobe.
    fn write_controller_strobe(&mut self, val: u8) {
        let new_strobe = val & 1 != 0;

        // On falling edge (strobe 1->0), latch controller state
        if self.controller_strobe && !new_strobe {
            self.controller1_shift = self.controller1.buttons;
            self.controller2_shift = self.controller2.buttons;
        }

        self.controller_strobe = new_strobe;

        // While strobe is high, continuously reload
        if self.controller_strobe {
            self.controller1_shift = self.controller1.buttons;
            self.controller2_shift = self.controller2.buttons;
        }
    }

    /// Check if DMC stall is active.
    #[must_use]
    pub fn dmc_stall_active(&self) -> bool {
        self.dmc_stall_cycles > 0
    }

    /// Decrement DMC stall counter.
    pub fn decrement_dmc_stall(&mut self) {
        if self.dmc_stall_cycles > 0 {
            self.dmc_stall_cycles -= 1;
        }
    }

    /// Peek at memory without side effects.
    ///
    /// This is useful for debugging/display purposes where we don't want
    /// to trigger PPU register side effects or mapper state changes.
    #[must_use]
    pub fn peek(&self, addr: u16) -> u8 {
        match addr {
            // Internal RAM (mirrored every 2KB)
            0x0000..=0x1FFF => self.ram[(addr & 0x07FF) as usize],

            // PPU registers - return last bus value to avoid side effects
            0x2000..=0x3FFF => self.last_bus_value,

            // APU and I/O registers
            0x4000..=0x4017 => match addr {
                0x4015 => self.apu.peek_status(),
                0x4016 | 0x4017 => self.last_bus_value,
                _ => self.last_bus_value,
            },

            // APU test mode
            0x4018..=0x401F => self.last_bus_value,

            // Cartridge space
            0x4020..=0xFFFF => self.mapper.read_prg(addr),
        }
    }
}

/// CPU bus implementation.
impl Bus for NesBus {
    fn read(&mut self, addr: u16) -> u8 {
        let value = match addr {
            // Internal RAM (mirrored every 2KB)
            0x0000..=0x1FFF => self.ram[(addr & 0x07FF) as usize],

            // PPU registers (mirrored every 8 bytes)
            0x2000..=0x3FFF => {
                let mut ppu_mem = PpuMemory {
                    mapper: &mut *self.mapper,
                    last_a12: &mut self.last_chr_a12,
                };
                self.ppu.read_register(addr, &mut ppu_mem)
            }

            // APU and I/O registers
            0x4000..=0x4017 => match addr {
                0x4015 => self.apu.read_status(),
                0x4016 => self.read_controller(0),
                0x4017 => self.read_controller(1),
                _ => self.last_bus_value, // Write-only registers
            },

            // APU test mode (normally disabled)
            0x4018..=0x401F => self.last_bus_value,

            // Cartridge space
            0x4020..=0xFFFF => self.mapper.read_prg(addr),
        };

        self.last_bus_value = value;
        value
    }

    fn write(&mut self, addr: u16, val: u8) {
        self.last_bus_value = val;

        match addr {
            // Internal RAM (mirrored every 2KB)
            0x0000..=0x1FFF => {
                self.ram[(addr & 0x07FF) as usize] = val;
            }

            // PPU registers (mirrored every 8 bytes)
            0x2000..=0x3FFF => {
                let mut ppu_mem = PpuMemory {
                    mapper: &mut *self.mapper,
                    last_a12: &mut self.last_chr_a12,
                };
                self.ppu.write_register(addr, val, &mut ppu_mem);
            }

            // APU and I/O registers
            0x4000..=0x4017 => match addr {
                0x4000..=0x4013 | 0x4015 | 0x4017 => {
                    self.apu.write(addr, val);
                }
                0x4014 => {
                    // OAM DMA
                    self.oam_dma_page = Some(val);
                }
                0x4016 => {
                    self.write_controller_strobe(val);
                }
                _ => {}
            },

            // APU test mode (normally disabled)
            0x4018..=0x401F => {}

            // Cartridge space
            0x4020..=0xFFFF => {
                self.mapper.write_prg(addr, val);
            }
        }
    }
}
