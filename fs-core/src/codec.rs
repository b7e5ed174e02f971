//! Little-endian codec for the fixed-width integer fields of UZIX images
//!
//! Every on-disk integer is little-endian regardless of host order. A short
//! read or write surfaces as an I/O error, never as partial success.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::blockdev::{Block, BLOCK_SIZE};

/// Number of 16-bit block numbers held by an index block
pub const INDEX_ENTRIES: usize = BLOCK_SIZE / 2;

/// Read `buf.len()` bytes
pub fn read_u8s<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<()> {
    reader.read_exact(buf)
}

/// Write every byte of `buf`
pub fn write_u8s<W: Write>(writer: &mut W, buf: &[u8]) -> io::Result<()> {
    writer.write_all(buf)
}

/// Fill `buf` with little-endian u16 values
pub fn read_u16s<R: Read>(reader: &mut R, buf: &mut [u16]) -> io::Result<()> {
    reader.read_u16_into::<LittleEndian>(buf)
}

/// Write `buf` as little-endian u16 values
pub fn write_u16s<W: Write>(writer: &mut W, buf: &[u16]) -> io::Result<()> {
    for &value in buf {
        writer.write_u16::<LittleEndian>(value)?;
    }
    Ok(())
}

/// Fill `buf` with little-endian i32 values
pub fn read_i32s<R: Read>(reader: &mut R, buf: &mut [i32]) -> io::Result<()> {
    reader.read_i32_into::<LittleEndian>(buf)
}

/// Write `buf` as little-endian i32 values
pub fn write_i32s<W: Write>(writer: &mut W, buf: &[i32]) -> io::Result<()> {
    for &value in buf {
        writer.write_i32::<LittleEndian>(value)?;
    }
    Ok(())
}

/// Decode an index block into its 256 block numbers
pub fn decode_index(block: &Block) -> [u16; INDEX_ENTRIES] {
    let mut entries = [0u16; INDEX_ENTRIES];
    for (entry, bytes) in entries.iter_mut().zip(block.chunks_exact(2)) {
        *entry = u16::from_le_bytes([bytes[0], bytes[1]]);
    }
    entries
}

/// Encode 256 block numbers as an index block
pub fn encode_index(entries: &[u16; INDEX_ENTRIES]) -> Block {
    let mut block = [0u8; BLOCK_SIZE];
    for (bytes, entry) in block.chunks_exact_mut(2).zip(entries.iter()) {
        bytes.copy_from_slice(&entry.to_le_bytes());
    }
    block
}

/// Read the u16 at entry `idx` of an index block
pub fn index_entry(block: &Block, idx: usize) -> u16 {
    u16::from_le_bytes([block[idx * 2], block[idx * 2 + 1]])
}

/// Overwrite the u16 at entry `idx` of an index block
pub fn set_index_entry(block: &mut Block, idx: usize, value: u16) {
    block[idx * 2..idx * 2 + 2].copy_from_slice(&value.to_le_bytes());
}
