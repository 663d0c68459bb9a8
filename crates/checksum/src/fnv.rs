/// Fowler-Noll-Vo hashes in 32, 64 and 128 bit widths.
///
/// All widths share one `u128` accumulator: multiplication modulo 2^128
/// followed by a mask is the same as multiplication modulo the narrower
/// width, so a single loop serves every variant.
use crate::Sum;

const OFFSET_32: u128 = 0x811c_9dc5;
const PRIME_32: u128 = 0x0100_0193;

const OFFSET_64: u128 = 0xcbf2_9ce4_8422_2325;
const PRIME_64: u128 = 0x0000_0100_0000_01b3;

const OFFSET_128: u128 = 0x6c62_272e_07bb_0142_62b8_2175_6295_c58d;
const PRIME_128: u128 = 0x0000_0000_0100_0000_0000_0000_0000_013b;

#[derive(Clone, Copy)]
enum Variant {
    /// multiply, then xor
    Fnv1,
    /// xor, then multiply
    Fnv1a,
}

struct FnvSum {
    hash: u128,
    prime: u128,
    mask: u128,
    /// digest width in bytes
    width: usize,
    variant: Variant,
}

impl FnvSum {
    fn new(bits: u32, variant: Variant) -> Self {
        let (offset, prime) = match bits {
            32 => (OFFSET_32, PRIME_32),
            64 => (OFFSET_64, PRIME_64),
            _ => (OFFSET_128, PRIME_128),
        };
        let mask = if bits >= 128 {
            u128::MAX
        } else {
            (1u128 << bits) - 1
        };
        Self {
            hash: offset,
            prime,
            mask,
            width: (bits / 8) as usize,
            variant,
        }
    }
}

impl Sum for FnvSum {
    fn update(&mut self, bytes: &[u8]) {
        let mut hash = self.hash;
        for &byte in bytes {
            match self.variant {
                Variant::Fnv1 => {
                    hash = hash.wrapping_mul(self.prime) & self.mask;
                    hash ^= byte as u128;
                }
                Variant::Fnv1a => {
                    hash ^= byte as u128;
                    hash = hash.wrapping_mul(self.prime) & self.mask;
                }
            }
        }
        self.hash = hash;
    }

    fn marshal(&self) -> Vec<u8> {
        self.hash.to_be_bytes()[16 - self.width..].to_vec()
    }
}

pub(crate) fn new_fnv32() -> Box<dyn Sum> {
    Box::new(FnvSum::new(32, Variant::Fnv1))
}

pub(crate) fn new_fnv32a() -> Box<dyn Sum> {
    Box::new(FnvSum::new(32, Variant::Fnv1a))
}

pub(crate) fn new_fnv64() -> Box<dyn Sum> {
    Box::new(FnvSum::new(64, Variant::Fnv1))
}

pub(crate) fn new_fnv64a() -> Box<dyn Sum> {
    Box::new(FnvSum::new(64, Variant::Fnv1a))
}

pub(crate) fn new_fnv128() -> Box<dyn Sum> {
    Box::new(FnvSum::new(128, Variant::Fnv1))
}

pub(crate) fn new_fnv128a() -> Box<dyn Sum> {
    Box::new(FnvSum::new(128, Variant::Fnv1a))
}
