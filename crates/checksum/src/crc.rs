/// Cyclic redundancy checks: CRC-32 (IEEE, via `crc32fast`) and CRC-64 with
/// the ISO polynomial, table-driven.
use crc32fast::Hasher as Crc32;

use crate::Sum;

/// Reversed ISO 3309 polynomial.
const CRC64_ISO_POLY: u64 = 0xD800_0000_0000_0000;

static CRC64_ISO_TABLE: [u64; 256] = crc64_table(CRC64_ISO_POLY);

const fn crc64_table(poly: u64) -> [u64; 256] {
    let mut table = [0u64; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u64;
        let mut bit = 0;
        while bit < 8 {
            if crc & 1 == 1 {
                crc = (crc >> 1) ^ poly;
            } else {
                crc >>= 1;
            }
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

struct Crc32Sum(Crc32);

impl Sum for Crc32Sum {
    fn update(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    fn marshal(&self) -> Vec<u8> {
        self.0.clone().finalize().to_be_bytes().to_vec()
    }
}

struct Crc64Sum {
    crc: u64,
}

impl Sum for Crc64Sum {
    fn update(&mut self, bytes: &[u8]) {
        let mut crc = !self.crc;
        for &byte in bytes {
            crc = CRC64_ISO_TABLE[((crc as u8) ^ byte) as usize] ^ (crc >> 8);
        }
        self.crc = !crc;
    }

    fn marshal(&self) -> Vec<u8> {
        self.crc.to_be_bytes().to_vec()
    }
}

pub(crate) fn new_crc32() -> Box<dyn Sum> {
    Box::new(Crc32Sum(Crc32::new()))
}

pub(crate) fn new_crc64() -> Box<dyn Sum> {
    Box::new(Crc64Sum { crc: 0 })
}
