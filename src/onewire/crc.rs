//! Dallas/Maxim CRC-8 (polynomial x^8 + x^5 + x^4 + 1), as used by ROM codes and scratchpads.

use super::{Error, Result};

/// Computes the CRC-8 of `data`.
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc = 0u8;
    for byte in data {
        let mut byte = *byte;
        for _ in 0..8 {
            let mix = (crc ^ byte) & 0x01;
            crc >>= 1;
            if mix != 0 {
                crc ^= 0x8C;
            }
            byte >>= 1;
        }
    }
    crc
}

/// Checks a block whose last byte is the CRC of the bytes before it.
///
/// Running the CRC over such a block, CRC byte included, leaves a remainder of zero.
pub fn check_crc8<E>(data: &[u8]) -> Result<(), E> {
    if crc8(data) == 0 {
        Ok(())
    } else {
        Err(Error::CrcMismatch)
    }
}

#[cfg(test)]
mod tests {
    use core::convert::Infallible;

    use super::*;

    // Example ROM from Maxim application note 27
    const ROM: [u8; 8] = [0x02, 0x1C, 0xB8, 0x01, 0x00, 0x00, 0x00, 0xA2];

    #[test]
    fn crc_of_application_note_rom() {
        assert_eq!(crc8(&ROM[..7]), 0xA2);
        assert!(check_crc8::<Infallible>(&ROM).is_ok());
    }

    #[test]
    fn corrupted_block_is_rejected() {
        let mut rom = ROM;
        rom[3] ^= 0x10;
        assert_eq!(check_crc8::<Infallible>(&rom), Err(Error::CrcMismatch));
    }

    #[test]
    fn empty_block_passes() {
        assert_eq!(crc8(&[]), 0);
    }
}
