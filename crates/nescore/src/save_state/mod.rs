//! Save state system for `nescore` emulator.
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
//! │  - Magic: "RNES"                    │
//! │  - Version: u32                     │
//! │  - Checksum: CRC32                  │
//! │  - Flags: u32                       │
//! │  - ROM Hash: SHA-256 (32 bytes)     │
//! │  - Timestamp: u64                   │
//! │  - Frame Count: u64                 │
//! │  - Reserved: 8 bytes                │
//! ├─────────────────────────────────────┤
//! │ Body (length-prefixed sections)     │
//! │  - WRAM (2048 bytes)                 │
//! │  - CPU state (hand-packed)           │
//! │  - Bus state (hand-packed)           │
//! │  - Mirroring (1 byte)                │
//! │  - Mapper register state             │
//! │  - Battery RAM (optional)            │
//! │  - PPU state (postcard)              │
//! │  - APU state (postcard)              │
//! └─────────────────────────────────────┘
//! ```
//!
//! Each body section is framed as a little-endian `u32` length followed by
//! that many bytes, so the body can be read back without knowing any
//! section's size in advance.
//!
//! The checksum covers the body only; the header fields up to and including
//! the checksum itself are excluded from the CRC32 computation.
//!
//! # Usage
//!
//! ```no_run
//! use nescore::Console;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let rom = std::fs::read("game.nes")?;
//! let mut console = Console::from_rom_bytes(&rom)?;
//!
//! for _ in 0..1000 {
//!     console.step_frame();
//! }
//!
//! let snapshot = console.save_state(0)?;
//!
//! for _ in 0..500 {
//!     console.step_frame();
//! }
//!
//! console.load_state(&snapshot)?;
//! # Ok(())
//! # }
//! ```

pub mod error;

pub use error::SaveStateError;

use crate::console::Console;
use nescore_mappers::Mirroring;

#[cfg(not(feature = "std"))]
use alloc::{string::ToString, vec, vec::Vec};

/// Save state format version
pub const SAVE_STATE_VERSION: u32 = 1;

/// Magic bytes for save state files
pub const SAVE_STATE_MAGIC: &[u8; 4] = b"RNES";

/// Size of the fixed header in bytes.
const HEADER_SIZE: usize = 72;

fn mirroring_to_byte(m: Mirroring) -> u8 {
    match m {
        Mirroring::Horizontal => 0,
        Mirroring::Vertical => 1,
        Mirroring::SingleScreenLower => 2,
        Mirroring::SingleScreenUpper => 3,
        Mirroring::FourScreen => 4,
    }
}

fn mirroring_from_byte(b: u8) -> Mirroring {
    match b {
        1 => Mirroring::Vertical,
        2 => Mirroring::SingleScreenLower,
        3 => Mirroring::SingleScreenUpper,
        4 => Mirroring::FourScreen,
        _ => Mirroring::Horizontal,
    }
}

fn push_section(out: &mut Vec<u8>, section: &[u8]) {
    out.extend_from_slice(&(section.len() as u32).to_le_bytes());
    out.extend_from_slice(section);
}

fn read_section<'a>(data: &'a [u8], cursor: &mut usize) -> Result<&'a [u8], SaveStateError> {
    if data.len() < *cursor + 4 {
        return Err(SaveStateError::InsufficientData {
            needed: *cursor + 4,
            available: data.len(),
        });
    }
    let len = u32::from_le_bytes([
        data[*cursor],
        data[*cursor + 1],
        data[*cursor + 2],
        data[*cursor + 3],
    ]) as usize;
    *cursor += 4;

    if data.len() < *cursor + len {
        return Err(SaveStateError::InsufficientData {
            needed: *cursor + len,
            available: data.len(),
        });
    }
    let section = &data[*cursor..*cursor + len];
    *cursor += len;
    Ok(section)
}

/// A captured, framed snapshot of a console's full architectural state.
///
/// Constructed via [`SaveState::capture`] and applied via
/// [`SaveState::restore`]; [`SaveState::encode`]/[`SaveState::decode`]
/// convert to and from the on-disk binary format.
#[derive(Debug, Clone)]
pub struct SaveState {
    rom_hash: [u8; 32],
    timestamp: u64,
    frame_count: u64,
    wram: [u8; 2048],
    cpu_state: Vec<u8>,
    bus_state: Vec<u8>,
    mirroring: Mirroring,
    mapper_state: Vec<u8>,
    battery_ram: Option<Vec<u8>>,
    ppu_blob: Vec<u8>,
    apu_blob: Vec<u8>,
}

impl SaveState {
    /// Capture the full state of a running console.
    ///
    /// # Errors
    ///
    /// Returns an error if the PPU or APU state fails to serialize.
    pub fn capture(console: &Console, timestamp: u64) -> Result<Self, SaveStateError> {
        let ppu_blob = postcard::to_allocvec(&console.bus.ppu)
            .map_err(|e| SaveStateError::Serialization(e.to_string()))?;
        let apu_blob = postcard::to_allocvec(&console.bus.apu)
            .map_err(|e| SaveStateError::Serialization(e.to_string()))?;

        Ok(Self {
            rom_hash: console.rom_hash(),
            timestamp,
            frame_count: console.frame_count,
            wram: console.bus.ram,
            cpu_state: console.cpu.save_state(),
            bus_state: console.bus.save_state(),
            mirroring: console.bus.mapper.mirroring(),
            mapper_state: console.bus.mapper.save_state(),
            battery_ram: console.bus.mapper.battery_ram().map(<[u8]>::to_vec),
            ppu_blob,
            apu_blob,
        })
    }

    /// Apply this snapshot to a console, overwriting its current state.
    ///
    /// The caller is responsible for ensuring `console` was loaded from the
    /// same ROM this snapshot was captured from; [`SaveState::decode`]
    /// already checks the ROM hash when decoding from bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the PPU or APU state fails to deserialize, or if
    /// the hand-packed bus state is truncated.
    pub fn restore(&self, console: &mut Console) -> Result<(), SaveStateError> {
        console.bus.ram = self.wram;
        console.cpu.load_state(&self.cpu_state);
        console.bus.load_state(&self.bus_state)?;
        // Mapper-controlled mirroring (e.g. AxROM) is restored as part of
        // `mapper_state`; the PPU's own nametable mirroring lives in its
        // postcard blob below. `self.mirroring` is kept for header parity
        // only.
        console.bus.mapper.load_state(&self.mapper_state);
        if let Some(sram) = &self.battery_ram {
            console.bus.mapper.set_battery_ram(sram);
        }
        console.bus.ppu = postcard::from_bytes(&self.ppu_blob)
            .map_err(|e| SaveStateError::Serialization(e.to_string()))?;
        console.bus.apu = postcard::from_bytes(&self.apu_blob)
            .map_err(|e| SaveStateError::Serialization(e.to_string()))?;
        console.frame_count = self.frame_count;
        Ok(())
    }

    /// Encode this snapshot into the framed binary save state format.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::new();
        push_section(&mut body, &self.wram);
        push_section(&mut body, &self.cpu_state);
        push_section(&mut body, &self.bus_state);
        push_section(&mut body, &[mirroring_to_byte(self.mirroring)]);
        push_section(&mut body, &self.mapper_state);
        push_section(&mut body, self.battery_ram.as_deref().unwrap_or(&[]));
        push_section(&mut body, &self.ppu_blob);
        push_section(&mut body, &self.apu_blob);

        let checksum = crc32fast::hash(&body);

        let mut out = Vec::with_capacity(HEADER_SIZE + body.len());
        out.extend_from_slice(SAVE_STATE_MAGIC);
        out.extend_from_slice(&SAVE_STATE_VERSION.to_le_bytes());
        out.extend_from_slice(&checksum.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes()); // flags, reserved for future use
        out.extend_from_slice(&self.rom_hash);
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        out.extend_from_slice(&self.frame_count.to_le_bytes());
        out.extend_from_slice(&[0u8; 8]); // reserved
        debug_assert_eq!(out.len(), HEADER_SIZE);
        out.extend_from_slice(&body);
        out
    }

    /// Decode and validate a save state buffer produced by
    /// [`SaveState::encode`].
    ///
    /// `expected_rom_hash` is compared against the hash stored in the
    /// header; mismatches are reported rather than silently accepted, since
    /// loading one game's save state into another produces garbage at best.
    ///
    /// # Errors
    ///
    /// Returns an error if the magic bytes, version, checksum, or ROM hash
    /// don't match, or if the buffer is truncated.
    pub fn decode(data: &[u8], expected_rom_hash: &[u8; 32]) -> Result<Self, SaveStateError> {
        if data.len() < HEADER_SIZE {
            return Err(SaveStateError::InsufficientData {
                needed: HEADER_SIZE,
                available: data.len(),
            });
        }

        if &data[0..4] != SAVE_STATE_MAGIC {
            return Err(SaveStateError::InvalidMagic);
        }

        let version = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        if version != SAVE_STATE_VERSION {
            return Err(SaveStateError::UnsupportedVersion(version));
        }

        let expected_checksum = u32::from_le_bytes([data[8], data[9], data[10], data[11]]);
        let body = &data[HEADER_SIZE..];
        let actual_checksum = crc32fast::hash(body);
        if actual_checksum != expected_checksum {
            return Err(SaveStateError::ChecksumMismatch {
                expected: expected_checksum,
                actual: actual_checksum,
            });
        }

        let mut rom_hash = [0u8; 32];
        rom_hash.copy_from_slice(&data[16..48]);
        if &rom_hash != expected_rom_hash {
            return Err(SaveStateError::RomMismatch {
                expected: *expected_rom_hash,
                actual: rom_hash,
            });
        }

        let timestamp = u64::from_le_bytes(data[48..56].try_into().unwrap());
        let frame_count = u64::from_le_bytes(data[56..64].try_into().unwrap());

        let mut cursor = 0;
        let wram_section = read_section(body, &mut cursor)?;
        let mut wram = [0u8; 2048];
        if wram_section.len() != wram.len() {
            return Err(SaveStateError::InsufficientData {
                needed: wram.len(),
                available: wram_section.len(),
            });
        }
        wram.copy_from_slice(wram_section);

        let cpu_state = read_section(body, &mut cursor)?.to_vec();
        let bus_state = read_section(body, &mut cursor)?.to_vec();

        let mirroring_section = read_section(body, &mut cursor)?;
        let mirroring = mirroring_from_byte(*mirroring_section.first().unwrap_or(&0));

        let mapper_state = read_section(body, &mut cursor)?.to_vec();

        let battery_section = read_section(body, &mut cursor)?;
        let battery_ram = if battery_section.is_empty() {
            None
        } else {
            Some(battery_section.to_vec())
        };

        let ppu_blob = read_section(body, &mut cursor)?.to_vec();
        let apu_blob = read_section(body, &mut cursor)?.to_vec();

        Ok(Self {
            rom_hash,
            timestamp,
            frame_count,
            wram,
            cpu_state,
            bus_state,
            mirroring,
            mapper_state,
            battery_ram,
            ppu_blob,
            apu_blob,
        })
    }

    /// Frame number this snapshot was captured at.
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Caller-supplied timestamp this snapshot was captured with.
    #[must_use]
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }
}
