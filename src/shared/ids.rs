use getrandom::getrandom;
use std::fmt::Write as _;

/// 32 hex characters of OS randomness, used to make temporary artifact names
/// unpredictable and collision-free.
pub fn random_hex() -> Result<String, std::io::Error> {
    let mut bytes = [0_u8; 16];
    getrandom(&mut bytes).map_err(std::io::Error::other)?;
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    Ok(out)
}
