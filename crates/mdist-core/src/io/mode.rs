//! Permission normalization.

/// Mode for directories and anything executable.
pub const EXECUTABLE_MODE: u32 = 0o755;
/// Mode for every other file.
pub const REGULAR_MODE: u32 = 0o644;

const ANY_EXECUTE: u32 = 0o111;
const PRIVILEGED_BITS: u32 = 0o7000;

/// Collapse `mode` onto one of two canonical values: 0o755 when `force_exec`
/// is set or any execute bit is present, 0o644 otherwise.
pub fn standardise_mode(mode: u32, force_exec: bool) -> u32 {
    if force_exec || mode & ANY_EXECUTE != 0 {
        EXECUTABLE_MODE
    } else {
        REGULAR_MODE
    }
}

/// Whether `mode` carries setuid, setgid or sticky bits.
pub fn has_privileged_bits(mode: u32) -> bool {
    mode & PRIVILEGED_BITS != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standardise_mode() {
        assert_eq!(standardise_mode(0o600, false), 0o644);
        assert_eq!(standardise_mode(0o666, false), 0o644);
        assert_eq!(standardise_mode(0o700, false), 0o755);
        assert_eq!(standardise_mode(0o001, false), 0o755);
        assert_eq!(standardise_mode(0o600, true), 0o755);
        assert_eq!(standardise_mode(0o100_644, false), 0o644);
    }

    #[test]
    fn test_privileged_bits() {
        assert!(has_privileged_bits(0o4755));
        assert!(has_privileged_bits(0o2755));
        assert!(has_privileged_bits(0o1777));
        assert!(!has_privileged_bits(0o100_755));
    }
}
