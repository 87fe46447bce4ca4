use byteorder::{ByteOrder, LittleEndian};
use core::{
    fmt::{Display, Formatter, Result as FmtResult},
    ops::Deref,
    str::FromStr,
};

/// The 64 bit identity a slave answers with: family code, 48 bit serial and
/// the CRC8 of the first seven bytes.
///
/// The CRC byte is always derived, so a `Rom` can not carry a wrong one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(transparent)]
pub struct Rom {
    raw: [u8; Self::BYTES as usize],
}

impl Default for Rom {
    fn default() -> Self {
        Self::new(0, [0; 6])
    }
}

impl From<Rom> for [u8; Rom::BYTES as usize] {
    fn from(rom: Rom) -> [u8; Rom::BYTES as usize] {
        rom.raw
    }
}

impl Deref for Rom {
    type Target = [u8; Self::BYTES as usize];

    fn deref(&self) -> &Self::Target {
        &self.raw
    }
}

impl AsRef<[u8]> for Rom {
    fn as_ref(&self) -> &[u8] {
        self.deref() as _
    }
}

impl Rom {
    /// The length of the identity in bytes
    pub const BYTES: u8 = 8;

    /// The length of the identity in bits
    pub const BITS: u8 = Self::BYTES * 8;

    pub fn new(family_code: u8, serial: [u8; 6]) -> Self {
        let mut raw = [0; Self::BYTES as usize];
        raw[0] = family_code;
        raw[1..7].copy_from_slice(&serial);
        Self::sealed(raw)
    }

    /// Builds the identity from 7 raw bytes, or 8 where the last one is
    /// ignored and recomputed.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, RomError> {
        match bytes.len() {
            7 | 8 => {
                let mut raw = [0; Self::BYTES as usize];
                raw[..7].copy_from_slice(&bytes[..7]);
                Ok(Self::sealed(raw))
            }
            len => Err(RomError::BadLength(len)),
        }
    }

    /// Builds the identity from the low 48 bits of `serial`.
    pub fn from_serial(family_code: u8, serial: u64) -> Self {
        let mut bytes = [0; 6];
        LittleEndian::write_u48(&mut bytes, serial & 0xFFFF_FFFF_FFFF);
        Self::new(family_code, bytes)
    }

    fn sealed(mut raw: [u8; Self::BYTES as usize]) -> Self {
        raw[7] = crate::crc8(&raw[..7]);
        Rom { raw }
    }

    pub fn family_code(&self) -> u8 {
        self[0]
    }

    pub fn serial(&self) -> &[u8] {
        &self[1..7]
    }

    pub fn serial_number(&self) -> u64 {
        LittleEndian::read_u48(self.serial())
    }

    pub fn crc(&self) -> u8 {
        self[7]
    }

    /// Checks bit `index` (0..64) in wire order: byte by byte, LSB first.
    pub fn bit(&self, index: u8) -> bool {
        let byte = index / 8;
        let offset = index % 8;
        self[byte as usize] & (0x01 << offset) != 0x00
    }
}

/// Error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RomError {
    NotEnough,
    Invalid,
    BadLength(usize),
    CrcMismatch { computed: u8, stored: u8 },
}

fn hex_to_u8(c: char) -> Option<u8> {
    c.to_digit(16).map(|d| d as u8)
}

impl FromStr for Rom {
    type Err = RomError;

    /// Accepts 14 hex digits (CRC derived) or 16 hex digits (CRC checked),
    /// optionally separated by whitespace or `:`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut raw = [0u8; Self::BYTES as usize];
        let mut chars = s.chars().filter(|c| !c.is_whitespace() && *c != ':');
        let mut len = 0;

        while let Some(h) = chars.next() {
            if len == raw.len() {
                return Err(RomError::Invalid);
            }
            match (hex_to_u8(h), chars.next().map(hex_to_u8)) {
                (Some(h), Some(Some(l))) => raw[len] = (h << 4) | l,
                (Some(_), None) => return Err(RomError::NotEnough),
                _ => return Err(RomError::Invalid),
            }
            len += 1;
        }

        match len {
            7 => Ok(Self::sealed(raw)),
            8 => {
                let rom = Self::sealed(raw);
                if rom.crc() == raw[7] {
                    Ok(rom)
                } else {
                    Err(RomError::CrcMismatch {
                        computed: rom.crc(),
                        stored: raw[7],
                    })
                }
            }
            _ => Err(RomError::NotEnough),
        }
    }
}

impl Display for Rom {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self[0], self[1], self[2], self[3], self[4], self[5], self[6], self[7],
        )
    }
}
