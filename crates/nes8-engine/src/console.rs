//! NES Console Implementation.
//!
//! The Console struct provides the high-level emulation API, managing the
//! CPU, PPU, APU, and mapper integration with proper timing.

use crate::bus::{ControllerState, NesBus};
use nes8_apu::HighQualityResampler;
use nes8_cpu::Cpu;
use nes8_mappers::{Mapper, Rom, RomError, create_mapper};
use sha2::Digest as _;

#[cfg(feature = "serde")]
use crate::save_state::{self, SaveStateError};

#[cfg(not(feature = "std"))]
use alloc::{boxed::Box, vec::Vec};

/// NES emulation timing constants.
pub mod timing {
    /// Master clock frequency (NTSC).
    pub const MASTER_CLOCK_NTSC: u32 = 21_477_272;
    /// CPU clock frequency (NTSC).
    pub const CPU_CLOCK_NTSC: u32 = MASTER_CLOCK_NTSC / 12;
    /// PPU clock frequency (NTSC).
    pub const PPU_CLOCK_NTSC: u32 = MASTER_CLOCK_NTSC / 4;
    /// CPU cycles per frame (NTSC).
    pub const CPU_CYCLES_PER_FRAME: u32 = 29_780;
    /// PPU dots per scanline.
    pub const PPU_DOTS_PER_SCANLINE: u16 = 341;
    /// Total scanlines (including vblank).
    pub const PPU_SCANLINES: u16 = 262;
    /// Target frame rate (NTSC).
    pub const FRAME_RATE_NTSC: f64 = 60.0988;
}

/// Console error type.
#[derive(Debug, Clone)]
pub enum ConsoleError {
    /// ROM loading error.
    RomError(RomError),
    /// Invalid state.
    InvalidState(String),
}

impl From<RomError> for ConsoleError {
    fn from(err: RomError) -> Self {
        Self::RomError(err)
    }
}

impl core::fmt::Display for ConsoleError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::RomError(e) => write!(f, "ROM error: {e}"),
            Self::InvalidState(msg) => write!(f, "Invalid state: {msg}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ConsoleError {}

/// Default audio output rate (CD quality) used when the caller does not
/// request a specific rate.
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// NES console emulator.
pub struct Console {
    /// 6502 CPU.
    cpu: Cpu,
    /// System bus (PPU, APU, mapper, RAM).
    bus: NesBus,
    /// Frame buffer (256x240 RGBA).
    framebuffer: Vec<u8>,
    /// Resamples the APU's native ~1.79 MHz sample stream down to the
    /// configured output rate, applying the NES analog filter chain.
    resampler: HighQualityResampler,
    /// Total CPU cycles executed.
    total_cycles: u64,
    /// Frame counter.
    frame_count: u64,
    /// Is emulation running?
    running: bool,
    /// SHA-256 hash of the ROM this console was loaded from, used to check
    /// that a save state is being loaded against the same game. `None` when
    /// the console was built directly from a mapper ([`Console::with_mapper`])
    /// rather than raw ROM bytes, in which case loads skip the check.
    rom_hash: Option<[u8; 32]>,
}

impl Console {
    /// Create a new console with the given ROM.
    ///
    /// # Errors
    ///
    /// Returns an error if the ROM cannot be loaded or uses an unsupported mapper.
    pub fn new(rom_data: &[u8]) -> Result<Self, ConsoleError> {
        let rom = Rom::load(rom_data)?;
        let mapper = create_mapper(&rom)?;
        let mut console = Self::with_mapper(mapper)?;
        console.rom_hash = Some(sha2::Sha256::digest(rom_data).into());
        Ok(console)
    }

    /// Create a new console from ROM bytes (alias for `new`).
    ///
    /// # Errors
    ///
    /// Returns an error if the ROM cannot be loaded or uses an unsupported mapper.
    pub fn from_rom_bytes(rom_data: &[u8]) -> Result<Self, ConsoleError> {
        Self::new(rom_data)
    }

    /// Create a new console from ROM bytes, resampling audio to `sample_rate`.
    ///
    /// # Errors
    ///
    /// Returns an error if the ROM cannot be loaded or uses an unsupported mapper.
    pub fn from_rom_bytes_with_sample_rate(
        rom_data: &[u8],
        sample_rate: u32,
    ) -> Result<Self, ConsoleError> {
        let rom = Rom::load(rom_data)?;
        let mapper = create_mapper(&rom)?;
        let mut console = Self::with_mapper_and_sample_rate(mapper, sample_rate)?;
        console.rom_hash = Some(sha2::Sha256::digest(rom_data).into());
        Ok(console)
    }

    /// Create a console with a pre-created mapper, at the default sample rate.
    ///
    /// # Errors
    ///
    /// Returns an error if the console cannot be initialized.
    pub fn with_mapper(mapper: Box<dyn Mapper>) -> Result<Self, ConsoleError> {
        Self::with_mapper_and_sample_rate(mapper, DEFAULT_SAMPLE_RATE)
    }

    /// Create a console with a pre-created mapper and a specific audio
    /// output sample rate.
    ///
    /// # Errors
    ///
    /// Returns an error if the console cannot be initialized.
    pub fn with_mapper_and_sample_rate(
        mapper: Box<dyn Mapper>,
        sample_rate: u32,
    ) -> Result<Self, ConsoleError> {
        let bus = NesBus::new(mapper);
        let cpu = Cpu::new();

        Ok(Self {
            cpu,
            bus,
            framebuffer: vec![0; 256 * 240 * 4],
            resampler: HighQualityResampler::new(sample_rate),
            total_cycles: 0,
            frame_count: 0,
            running: true,
            rom_hash: None,
        })
    }

    /// Reset the console to initial state.
    pub fn reset(&mut self) {
        self.cpu.reset(&mut self.bus);
        self.bus.reset();
        self.resampler.reset();
        self.total_cycles = 0;
        self.running = true;
    }

    /// Power on the console (cold boot).
    pub fn power_on(&mut self) {
        self.reset();
    }

    /// Serialize the full emulation state (CPU, PPU, APU, mapper, RAM,
    /// controllers) into a save state blob.
    ///
    /// The audio resampler's pending output buffer is intentionally not
    /// captured; it's a few milliseconds of transient playback state, not
    /// part of the game's state.
    ///
    /// # Errors
    ///
    /// Returns an error if the mapper's concrete type isn't recognized by
    /// [`nes8_mappers::MapperState`] (shouldn't happen for mappers produced
    /// by [`create_mapper`]).
    #[cfg(feature = "serde")]
    pub fn save_state(&self) -> Result<Vec<u8>, SaveStateError> {
        let bus = self
            .bus
            .capture_state()
            .ok_or_else(|| SaveStateError::Compression("unrecognized mapper type".into()))?;

        let state = save_state::ConsoleState {
            cpu: self.cpu.clone(),
            bus,
            total_cycles: self.total_cycles,
            frame_count: self.frame_count,
        };

        save_state::encode(&state, self.rom_hash.unwrap_or([0u8; 32]))
    }

    /// Restore emulation state previously produced by [`Console::save_state`].
    ///
    /// # Errors
    ///
    /// Returns [`SaveStateError::RomMismatch`] if this console was loaded
    /// from a different ROM than the save state was taken against (skipped
    /// if this console has no known ROM hash, e.g. built via
    /// [`Console::with_mapper`]), or other `SaveStateError` variants on a
    /// malformed or corrupted blob.
    #[cfg(feature = "serde")]
    pub fn load_state(&mut self, data: &[u8]) -> Result<(), SaveStateError> {
        let expected_hash = self.rom_hash.unwrap_or([0u8; 32]);
        let state = save_state::decode(data, self.rom_hash.is_some().then_some(expected_hash))?;

        self.cpu = state.cpu;
        self.bus.restore_state(state.bus);
        self.total_cycles = state.total_cycles;
        self.frame_count = state.frame_count;
        self.resampler.reset();
        self.running = true;

        Ok(())
    }

    /// Run emulation for one CPU instruction (or one DMA/stall cycle).
    ///
    /// Returns the number of CPU cycles executed.
    pub fn step(&mut self) -> u8 {
        self.step_inner().0
    }

    /// Execute one CPU step (possibly a DMA/stall cycle).
    ///
    /// Returns `(cpu_cycles, frame_complete)`, where `frame_complete` is
    /// true if the PPU wrapped around to a new frame while the CPU cycles
    /// were being advanced alongside it.
    fn step_inner(&mut self) -> (u8, bool) {
        if !self.running {
            return (0, false);
        }

        if self.bus.dmc_stall_active() {
            self.bus.decrement_dmc_stall();
            let frame_complete = self.advance_stalled_cycle();
            return (1, frame_complete);
        }

        if self.bus.oam_dma_pending() {
            let dma_cycles = self.bus.execute_oam_dma();
            let mut frame_complete = false;
            for _ in 0..dma_cycles {
                frame_complete |= self.advance_stalled_cycle();
            }
            return (dma_cycles as u8, frame_complete);
        }

        // Drive the loop one CPU cycle at a time: every bus access an
        // instruction makes, on any of its cycles, must see PPU/APU state as
        // of that exact cycle, not state frozen at the previous instruction's
        // end. Interrupts are polled into the CPU's latches every cycle too,
        // since IRQ is level-triggered and NMI must be seen on the cycle it
        // actually fires.
        let mut cycles: u8 = 0;
        let mut frame_complete = false;
        loop {
            let (boundary, frame) = self.run_one_cpu_cycle();
            frame_complete |= frame;
            cycles += 1;
            if boundary {
                break;
            }
        }

        (cycles, frame_complete)
    }

    /// Poll interrupts into the CPU's latches, advance the CPU by exactly
    /// one cycle, then fan the PPU (3 dots) and APU (one half-cycle) for
    /// that same cycle.
    ///
    /// Returns `(instruction_boundary, frame_complete)`.
    fn run_one_cpu_cycle(&mut self) -> (bool, bool) {
        if self.bus.nmi_pending() {
            self.bus.acknowledge_nmi();
            self.cpu.trigger_nmi();
        }
        // IRQ is level-triggered: latch the bus's current level every cycle.
        // The CPU itself applies the I-flag mask (sampled from the *previous*
        // instruction, per the one-instruction CLI/PLP/RTI delay) when it
        // polls this latch at its next opcode fetch.
        self.cpu.set_irq(self.bus.irq_pending());

        let boundary = self.cpu.tick(&mut self.bus);
        let frame_complete = self.advance_components();

        self.bus.add_cpu_cycles(1);
        self.total_cycles += 1;

        (boundary, frame_complete)
    }

    /// Advance the PPU (3 dots) and APU (one half-cycle) for one CPU cycle
    /// during which the CPU itself does not advance (OAM/DMC DMA stall).
    fn advance_stalled_cycle(&mut self) -> bool {
        let frame_complete = self.advance_components();
        self.bus.add_cpu_cycles(1);
        self.total_cycles += 1;
        frame_complete
    }

    /// Step the PPU and APU for one CPU cycle and feed any produced audio
    /// sample to the resampler.
    ///
    /// Returns true if this cycle crossed a frame boundary (PPU wraparound
    /// to dot 0 of scanline 0).
    fn advance_components(&mut self) -> bool {
        let (frame_complete, _nmi) = self.bus.step_ppu();

        if let Some(sample) = self.bus.step_apu() {
            self.resampler.add_sample(sample);
        }

        frame_complete
    }

    /// Run emulation until the PPU completes one full frame.
    ///
    /// Unlike a fixed CPU-cycle budget, this tracks the PPU's own
    /// scanline/dot wraparound: an NTSC frame is 89,342 or 89,341.5 master
    /// clocks depending on whether the pre-render line's odd-frame dot skip
    /// applies, which is not an exact multiple of CPU cycles.
    ///
    /// Returns the actual number of CPU cycles executed.
    pub fn step_frame(&mut self) -> u64 {
        let start_cycles = self.total_cycles;

        while self.running {
            let (_, frame_complete) = self.step_inner();
            if frame_complete {
                break;
            }
        }

        // Copy PPU framebuffer
        self.update_framebuffer();
        self.frame_count += 1;

        self.total_cycles - start_cycles
    }

    /// Run emulation for one frame with cycle-accurate timing.
    ///
    /// This is an alias for `step_frame()` for API compatibility.
    /// Returns the actual number of CPU cycles executed.
    pub fn step_frame_accurate(&mut self) -> u64 {
        self.step_frame()
    }

    /// Update the framebuffer from PPU output.
    fn update_framebuffer(&mut self) {
        let ppu_buffer = self.bus.ppu.frame_buffer();

        // Convert PPU palette indices to RGBA
        for (i, &palette_idx) in ppu_buffer.iter().enumerate() {
            let rgb = crate::palette::NES_PALETTE[palette_idx as usize & 0x3F];
            let offset = i * 4;
            self.framebuffer[offset] = rgb.0; // R
            self.framebuffer[offset + 1] = rgb.1; // G
            self.framebuffer[offset + 2] = rgb.2; // B
            self.framebuffer[offset + 3] = 255; // A
        }
    }

    /// Get the current framebuffer (256x240 RGBA).
    #[must_use]
    pub fn framebuffer(&self) -> &[u8] {
        &self.framebuffer
    }

    /// Take the resampled audio buffer (drains accumulated samples).
    pub fn take_audio(&mut self) -> Vec<f32> {
        let mut samples = vec![0.0; self.resampler.len()];
        let count = self.resampler.drain_into(&mut samples);
        samples.truncate(count);
        samples
    }

    /// Get the resampled audio buffer without draining.
    #[must_use]
    pub fn audio_buffer(&self) -> &[f32] {
        self.resampler.samples()
    }

    /// Get audio samples (alias for `audio_buffer`).
    #[must_use]
    pub fn audio_samples(&self) -> &[f32] {
        self.resampler.samples()
    }

    /// Clear the audio sample buffer.
    pub fn clear_audio_samples(&mut self) {
        self.resampler.clear();
    }

    /// Copy resampled audio into `out`, draining up to `out.len()` samples.
    ///
    /// Returns the number of samples written. Any samples beyond the
    /// capacity of `out` remain buffered for the next call.
    pub fn drain_audio(&mut self, out: &mut [f32]) -> usize {
        self.resampler.drain_into(out)
    }

    /// Set controller 1 state from button byte.
    pub fn set_controller_1(&mut self, buttons: u8) {
        self.bus.controller1 = ControllerState { buttons };
    }

    /// Set controller 2 state from button byte.
    pub fn set_controller_2(&mut self, buttons: u8) {
        self.bus.controller2 = ControllerState { buttons };
    }

    /// Set controller 1 state.
    pub fn set_controller1(&mut self, state: ControllerState) {
        self.bus.controller1 = state;
    }

    /// Set controller 2 state.
    pub fn set_controller2(&mut self, state: ControllerState) {
        self.bus.controller2 = state;
    }

    /// Get controller 1 state.
    #[must_use]
    pub fn controller1(&self) -> ControllerState {
        self.bus.controller1
    }

    /// Get controller 2 state.
    #[must_use]
    pub fn controller2(&self) -> ControllerState {
        self.bus.controller2
    }

    /// Get the total CPU cycles executed.
    #[must_use]
    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    /// Get the frame count.
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Check if emulation is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Pause emulation.
    pub fn pause(&mut self) {
        self.running = false;
    }

    /// Resume emulation.
    pub fn resume(&mut self) {
        self.running = true;
    }

    /// Get a reference to the CPU for debugging.
    #[must_use]
    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    /// Get a reference to the PPU for debugging.
    #[must_use]
    pub fn ppu(&self) -> &nes8_ppu::Ppu {
        &self.bus.ppu
    }

    /// Get a reference to the APU for debugging.
    #[must_use]
    pub fn apu(&self) -> &nes8_apu::Apu {
        &self.bus.apu
    }

    /// Get the total CPU cycles (alias for `total_cycles`).
    #[must_use]
    pub fn cycles(&self) -> u64 {
        self.total_cycles
    }

    /// Peek at memory without side effects.
    ///
    /// This is useful for debugging/display purposes where we don't want
    /// to trigger PPU register side effects or mapper state changes.
    #[must_use]
    pub fn peek_memory(&self, addr: u16) -> u8 {
        self.bus.peek(addr)
    }

    /// Get a reference to the bus for debugging.
    #[must_use]
    pub fn bus(&self) -> &NesBus {
        &self.bus
    }

    /// Get a mutable reference to the bus.
    pub fn bus_mut(&mut self) -> &mut NesBus {
        &mut self.bus
    }

    /// Get the mapper number.
    #[must_use]
    pub fn mapper_number(&self) -> u16 {
        self.bus.mapper.mapper_number()
    }

    /// Get the mapper name.
    #[must_use]
    pub fn mapper_name(&self) -> &'static str {
        self.bus.mapper.mapper_name()
    }

    /// Check if the ROM has battery-backed RAM.
    #[must_use]
    pub fn has_battery(&self) -> bool {
        self.bus.mapper.has_battery()
    }

    /// Get battery-backed RAM for saving.
    #[must_use]
    pub fn battery_ram(&self) -> Option<&[u8]> {
        self.bus.mapper.battery_ram()
    }

    /// Load battery-backed RAM.
    pub fn load_battery_ram(&mut self, data: &[u8]) {
        self.bus.mapper.set_battery_ram(data);
    }
}
