//! PDG identity codes used by the extraction pipeline.

/// J/psi(1S).
pub const JPSI: i32 = 443;

/// Muon (the negative one; mu+ is -13).
pub const MUON: i32 = 13;

/// Electron.
pub const ELECTRON: i32 = 11;

/// Proton.
pub const PROTON: i32 = 2212;

/// B mesons whose decays feed non-prompt J/psi production.
///
/// Ground states plus their excited and orbitally excited partners for the
/// B0, B+, Bs and Bc families. Compared by absolute value.
pub const B_HADRON_CODES: [i32; 24] = [
    511, 521, 10511, 10521, 513, 523, 10513, 10523, 20513, 20523, 515, 525, // B0, B+
    531, 10531, 533, 10533, 20533, 535, // Bs
    541, 10541, 543, 10543, 20543, 545, // Bc
];

/// True if `code` (either sign) is in [`B_HADRON_CODES`].
pub fn is_b_hadron(code: i32) -> bool {
    let magnitude = code.unsigned_abs();
    B_HADRON_CODES.iter().any(|b| b.unsigned_abs() == magnitude)
}

#[cfg(test)]
mod tests {
    use super::*;
    
    #[test]
    fn test_b_hadron_lookup_ignores_sign() {
        assert!(is_b_hadron(511));
        assert!(is_b_hadron(-521));
        assert!(is_b_hadron(20543));
    }
    
    #[test]
    fn test_non_b_codes_rejected() {
        for code in [0, JPSI, MUON, PROTON, 21, 211, 411, 5122] {
            assert!(!is_b_hadron(code), "{code} should not be a B hadron");
        }
    }
    
    #[test]
    fn test_extreme_codes_do_not_overflow() {
        assert!(!is_b_hadron(i32::MIN));
        assert!(!is_b_hadron(i32::MAX));
    }
    
    #[test]
    fn test_table_has_no_duplicates() {
        let mut codes = B_HADRON_CODES.to_vec();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), B_HADRON_CODES.len());
    }
}
