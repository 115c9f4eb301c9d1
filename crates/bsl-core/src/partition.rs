//! Partition names FDL2 knows and size arguments for partition reads.

use crate::error::ParamError;

/// Partition names in flash layout order.
pub const PARTITIONS: &[&str] = &[
    "prodnv",
    "miscdata",
    "l_fixnv1",
    "l_fixnv2",
    "l_runtimenv1",
    "l_runtimenv2",
    "l_modem",
    "l_ldsp",
    "l_gdsp",
    "l_warm",
    "pm_sys",
    "sml",
    "logo",
    "fbootlogo",
    "wcnfdl",
    "wcnmodem",
    "boot",
    "system",
    "cache",
    "recovery",
    "misc",
    "userdata",
    "ubootlogo",
    "security",
    "dt",
    "cboot",
    "syberfs",
    "data",
    "internalsd",
];

/// Resolve a partition name against [`PARTITIONS`].
pub fn lookup(name: &str) -> Result<&'static str, ParamError> {
    PARTITIONS
        .iter()
        .copied()
        .find(|p| *p == name)
        .ok_or_else(|| ParamError::UnknownPartition(name.to_string()))
}

/// Parse `<n>`, `<n>k`/`<n>K` (KiB) or `<n>m`/`<n>M` (MiB).
///
/// Zero and sizes that do not fit the 32-bit size field are rejected.
pub fn parse_size(arg: &str) -> Result<u32, ParamError> {
    let invalid = || ParamError::InvalidSize(arg.to_string());

    let (digits, multiplier) = match arg.char_indices().last() {
        Some((i, 'k' | 'K')) => (&arg[..i], 1024u64),
        Some((i, 'm' | 'M')) => (&arg[..i], 1024 * 1024),
        Some(_) => (arg, 1),
        None => return Err(invalid()),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    let value: u64 = digits.parse().map_err(|_| invalid())?;
    let bytes = value.checked_mul(multiplier).ok_or_else(invalid)?;
    match u32::try_from(bytes) {
        Ok(0) | Err(_) => Err(invalid()),
        Ok(size) => Ok(size),
    }
}
