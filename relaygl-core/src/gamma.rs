//! Software gamma correction through precomputed lookup tables.

/// Byte and half-word lookup tables for one correction factor.
///
/// The half-word table maps two adjacent bytes at once, so a buffer is
/// corrected one `u16` at a time with a single trailing-byte fixup
/// when its length is odd.
pub struct GammaTable {
    factor: f64,
    lut: [u8; 256],
    lut16: Vec<u16>,
}

impl GammaTable {
    /// Build tables for `factor`. The sign is ignored; the exponent
    /// applied is `1 / |factor|`.
    pub fn new(factor: f64) -> Self {
        let g = factor.abs();
        let mut lut = [0u8; 256];
        for (i, v) in lut.iter_mut().enumerate() {
            let corrected = if g == 0.0 {
                i as f64
            } else {
                255.0 * (i as f64 / 255.0).powf(1.0 / g)
            };
            *v = corrected.round().clamp(0.0, 255.0) as u8;
        }

        let mut lut16 = vec![0u16; 65536];
        for (i, v) in lut16.iter_mut().enumerate() {
            let [b0, b1] = (i as u16).to_ne_bytes();
            *v = u16::from_ne_bytes([lut[b0 as usize], lut[b1 as usize]]);
        }

        Self { factor, lut, lut16 }
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }

    pub fn lookup(&self, sample: u8) -> u8 {
        self.lut[sample as usize]
    }

    /// Rewrite every byte of `bits` in place.
    pub fn apply(&self, bits: &mut [u8]) {
        let mut words = bits.chunks_exact_mut(2);
        for pair in &mut words {
            let w = u16::from_ne_bytes([pair[0], pair[1]]);
            pair.copy_from_slice(&self.lut16[w as usize].to_ne_bytes());
        }
        if let [last] = words.into_remainder() {
            *last = self.lut[*last as usize];
        }
    }
}

/// Whether `factor` leaves samples untouched.
pub fn is_identity(factor: f64) -> bool {
    factor == 0.0 || factor == 1.0 || factor == -1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_are_fixed() {
        let t = GammaTable::new(2.2);
        assert_eq!(t.lookup(0), 0);
        assert_eq!(t.lookup(255), 255);
        assert!(t.lookup(128) > 128);
    }

    #[test]
    fn word_path_matches_byte_path() {
        let t = GammaTable::new(1.8);
        let mut odd: Vec<u8> = (0..=254u8).collect();
        let expected: Vec<u8> = odd.iter().map(|&b| t.lookup(b)).collect();
        t.apply(&mut odd);
        assert_eq!(odd, expected);
    }

    #[test]
    fn negative_factor_uses_magnitude() {
        let a = GammaTable::new(2.0);
        let b = GammaTable::new(-2.0);
        assert_eq!(a.lookup(77), b.lookup(77));
    }

    #[test]
    fn identity_factors() {
        assert!(is_identity(1.0));
        assert!(is_identity(-1.0));
        assert!(is_identity(0.0));
        assert!(!is_identity(2.2));
    }
}
