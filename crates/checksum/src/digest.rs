/// MD5, SHA-2 and XXH3 accumulators backed by `md-5`, `sha2` and `xxhash-rust`.
use md5::Md5;
use sha2::{Digest, Sha256, Sha512};
use xxhash_rust::xxh3::Xxh3;

use crate::Sum;

struct ShaSum<D>(D);

impl<D> Sum for ShaSum<D>
where
    D: Digest + Clone + Send,
{
    fn update(&mut self, bytes: &[u8]) {
        Digest::update(&mut self.0, bytes);
    }

    fn marshal(&self) -> Vec<u8> {
        self.0.clone().finalize().to_vec()
    }
}

struct Xxh3Sum(Box<Xxh3>);

impl Sum for Xxh3Sum {
    fn update(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    fn marshal(&self) -> Vec<u8> {
        self.0.digest().to_be_bytes().to_vec()
    }
}

pub(crate) fn new_md5() -> Box<dyn Sum> {
    Box::new(ShaSum(Md5::new()))
}

pub(crate) fn new_sha256() -> Box<dyn Sum> {
    Box::new(ShaSum(Sha256::new()))
}

pub(crate) fn new_sha512() -> Box<dyn Sum> {
    Box::new(ShaSum(Sha512::new()))
}

pub(crate) fn new_xxh3() -> Box<dyn Sum> {
    Box::new(Xxh3Sum(Box::new(Xxh3::new())))
}
