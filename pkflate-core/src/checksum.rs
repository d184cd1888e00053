//! CRC-32 and Adler-32 checksums.
//!
//! Both checksums are exposed two ways:
//!
//! - As accumulator structs ([`Crc32`], [`Adler32`]) with `update`/`finalize`.
//! - As pure fold functions ([`crc32`], [`adler32`]) taking the previous
//!   finalized value and returning the next one. Starting from
//!   [`CRC32_INIT`] / [`ADLER32_INIT`] and folding over any split of the
//!   input gives the same result as folding over the whole input.
//!
//! CRC-32 uses slicing-by-8 for inputs of 16 bytes or more and a single table
//! below that.

/// Initial value for the [`crc32`] fold function.
pub const CRC32_INIT: u32 = 0;

/// Initial value for the [`adler32`] fold function.
pub const ADLER32_INIT: u32 = 1;

/// Largest prime smaller than 65536.
const ADLER_MOD: u32 = 65521;

/// Number of bytes that can be summed before `b` may overflow a u32.
const NMAX: usize = 5552;

/// CRC-32 slicing-by-8 lookup tables (polynomial 0xEDB88320, reflected).
/// Table 0 is the classic byte-at-a-time table.
const CRC32_TABLES: [[u32; 256]; 8] = {
    let mut tables = [[0u32; 256]; 8];

    let mut i = 0usize;
    while i < 256 {
        let mut crc = i as u32;
        let mut j = 0;
        while j < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xEDB88320;
            } else {
                crc >>= 1;
            }
            j += 1;
        }
        tables[0][i] = crc;
        i += 1;
    }

    let mut t = 1;
    while t < 8 {
        let mut i = 0usize;
        while i < 256 {
            let prev = tables[t - 1][i];
            tables[t][i] = tables[0][(prev & 0xFF) as usize] ^ (prev >> 8);
            i += 1;
        }
        t += 1;
    }

    tables
};

/// CRC-32 calculator (ISO 3309), as used by ZIP.
///
/// # Example
///
/// ```
/// use pkflate_core::checksum::Crc32;
///
/// let mut crc = Crc32::new();
/// crc.update(b"Hello, ");
/// crc.update(b"World!");
/// assert_eq!(crc.finalize(), 0xEC4AC3D0);
/// ```
#[derive(Debug, Clone)]
pub struct Crc32 {
    crc: u32,
}

impl Crc32 {
    /// Create a new CRC-32 calculator.
    pub fn new() -> Self {
        Self { crc: 0xFFFFFFFF }
    }

    /// Resume from a previously finalized CRC value.
    pub fn from_value(value: u32) -> Self {
        Self { crc: !value }
    }

    /// Reset the CRC to its initial state.
    pub fn reset(&mut self) {
        self.crc = 0xFFFFFFFF;
    }

    /// Update the CRC with more data.
    #[inline]
    pub fn update(&mut self, data: &[u8]) {
        if data.len() >= 16 {
            crc32_slice8(&mut self.crc, data);
        } else {
            crc32_bytewise(&mut self.crc, data);
        }
    }

    /// Get the current CRC value without consuming the calculator.
    #[inline(always)]
    pub fn value(&self) -> u32 {
        !self.crc
    }

    /// Finalize and return the CRC value.
    #[inline(always)]
    pub fn finalize(self) -> u32 {
        !self.crc
    }

    /// Compute CRC-32 for a slice in one call.
    #[inline]
    pub fn compute(data: &[u8]) -> u32 {
        let mut crc = Self::new();
        crc.update(data);
        crc.finalize()
    }
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn crc32_bytewise(crc: &mut u32, data: &[u8]) {
    let table = &CRC32_TABLES[0];
    for &byte in data {
        *crc = table[((*crc ^ byte as u32) & 0xFF) as usize] ^ (*crc >> 8);
    }
}

#[inline]
fn crc32_slice8(crc: &mut u32, data: &[u8]) {
    let mut c = *crc;
    let mut chunks = data.chunks_exact(8);

    for chunk in &mut chunks {
        let lo = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) ^ c;
        let hi = u32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]);

        c = CRC32_TABLES[7][(lo & 0xFF) as usize]
            ^ CRC32_TABLES[6][((lo >> 8) & 0xFF) as usize]
            ^ CRC32_TABLES[5][((lo >> 16) & 0xFF) as usize]
            ^ CRC32_TABLES[4][(lo >> 24) as usize]
            ^ CRC32_TABLES[3][(hi & 0xFF) as usize]
            ^ CRC32_TABLES[2][((hi >> 8) & 0xFF) as usize]
            ^ CRC32_TABLES[1][((hi >> 16) & 0xFF) as usize]
            ^ CRC32_TABLES[0][(hi >> 24) as usize];
    }

    crc32_bytewise(&mut c, chunks.remainder());
    *crc = c;
}

/// Fold `data` into a finalized CRC-32 value.
///
/// `crc32(crc32(CRC32_INIT, a), b) == crc32(CRC32_INIT, a ++ b)`.
#[inline]
pub fn crc32(acc: u32, data: &[u8]) -> u32 {
    let mut crc = Crc32::from_value(acc);
    crc.update(data);
    crc.finalize()
}

/// Adler-32 checksum calculator (RFC 1950).
#[derive(Debug, Clone)]
pub struct Adler32 {
    a: u32,
    b: u32,
}

impl Adler32 {
    /// Create a new Adler-32 calculator.
    pub fn new() -> Self {
        Self { a: 1, b: 0 }
    }

    /// Resume from a previously finalized Adler-32 value.
    pub fn from_value(value: u32) -> Self {
        Self {
            a: value & 0xFFFF,
            b: value >> 16,
        }
    }

    /// Update the checksum with more data.
    pub fn update(&mut self, data: &[u8]) {
        let mut a = self.a;
        let mut b = self.b;

        for chunk in data.chunks(NMAX) {
            for &byte in chunk {
                a += byte as u32;
                b += a;
            }
            a %= ADLER_MOD;
            b %= ADLER_MOD;
        }

        self.a = a;
        self.b = b;
    }

    /// Current checksum value.
    pub fn finish(&self) -> u32 {
        (self.b << 16) | self.a
    }

    /// Compute Adler-32 of data in one shot.
    pub fn checksum(data: &[u8]) -> u32 {
        let mut adler = Self::new();
        adler.update(data);
        adler.finish()
    }
}

impl Default for Adler32 {
    fn default() -> Self {
        Self::new()
    }
}

/// Fold `data` into an Adler-32 value. Start from [`ADLER32_INIT`].
#[inline]
pub fn adler32(acc: u32, data: &[u8]) -> u32 {
    let mut adler = Adler32::from_value(acc);
    adler.update(data);
    adler.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lcg_bytes(len: usize, mut seed: u64) -> Vec<u8> {
        (0..len)
            .map(|_| {
                seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
                (seed >> 33) as u8
            })
            .collect()
    }

    #[test]
    fn test_crc32_known_values() {
        assert_eq!(Crc32::compute(b""), 0);
        assert_eq!(Crc32::compute(b"123456789"), 0xCBF43926);
        assert_eq!(Crc32::compute(b"Hello, World!"), 0xEC4AC3D0);
        assert_eq!(
            Crc32::compute(b"The quick brown fox jumps over the lazy dog"),
            0x414FA339
        );
    }

    #[test]
    fn test_crc32_slice8_matches_bytewise() {
        let data = lcg_bytes(1031, 7);
        let mut fast = 0xFFFFFFFF;
        crc32_slice8(&mut fast, &data);
        let mut slow = 0xFFFFFFFF;
        crc32_bytewise(&mut slow, &data);
        assert_eq!(fast, slow);
    }

    #[test]
    fn test_crc32_split_associativity() {
        let data = lcg_bytes(300, 42);
        let whole = crc32(CRC32_INIT, &data);
        for k in 0..=data.len() {
            let split = crc32(crc32(CRC32_INIT, &data[..k]), &data[k..]);
            assert_eq!(split, whole, "split at {k}");
        }
    }

    #[test]
    fn test_adler32_known_values() {
        assert_eq!(Adler32::checksum(b""), 1);
        assert_eq!(Adler32::checksum(b"Wikipedia"), 0x11E60398);
        assert_eq!(adler32(ADLER32_INIT, b"abc"), 0x024D0127);
    }

    #[test]
    fn test_adler32_split_associativity() {
        let data = lcg_bytes(12000, 9);
        let whole = adler32(ADLER32_INIT, &data);
        for k in (0..=data.len()).step_by(397) {
            let split = adler32(adler32(ADLER32_INIT, &data[..k]), &data[k..]);
            assert_eq!(split, whole, "split at {k}");
        }
    }

    #[test]
    fn test_adler32_large_run_does_not_overflow() {
        let data = vec![0xFFu8; 100_000];
        let mut incremental = Adler32::new();
        for chunk in data.chunks(777) {
            incremental.update(chunk);
        }
        assert_eq!(incremental.finish(), Adler32::checksum(&data));
    }

    #[test]
    fn test_crc32_reset() {
        let mut crc = Crc32::new();
        crc.update(b"garbage");
        crc.reset();
        crc.update(b"123456789");
        assert_eq!(crc.value(), 0xCBF43926);
    }
}
