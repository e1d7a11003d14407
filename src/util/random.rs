//! Random data generators for tests and local seeding

use rand::Rng;
use rand::seq::SliceRandom;

use crate::ledger::Currency;

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz";

/// Random integer in `min..=max`
pub fn random_int(min: i64, max: i64) -> i64 {
    rand::thread_rng().gen_range(min..=max)
}

/// Random lowercase ASCII string of length `n`
pub fn random_string(n: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..n)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Random account owner name
pub fn random_owner() -> String {
    random_string(6)
}

/// Random balance in minor units, `0..=1000`
pub fn random_money() -> i64 {
    random_int(0, 1000)
}

/// Random supported currency
pub fn random_currency() -> Currency {
    *Currency::ALL
        .choose(&mut rand::thread_rng())
        .unwrap_or(&Currency::USD)
}

/// Random address under `example.com`
pub fn random_email() -> String {
    format!("{}@example.com", random_string(8))
}
