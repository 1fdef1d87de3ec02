use crate::error::Error;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Device identity derived from the 8-byte IMEI field of a login frame.
///
/// The wire encoding is 8 raw bytes holding the IMEI digits as packed
/// nibbles with leading zero padding. The canonical string form is the
/// lowercase hex rendering with leading zeros trimmed, which is also the
/// form operators use to address a device on the control surface.
///
/// # Examples
///
/// ```
/// use tracklock_core::Imei;
///
/// let imei = Imei::from_wire(&[0x00, 0x00, 0x00, 0x00, 0x12, 0x34, 0x56, 0x78]);
/// assert_eq!(imei.as_str(), "12345678");
/// assert_eq!(imei.to_wire(), [0x00, 0x00, 0x00, 0x00, 0x12, 0x34, 0x56, 0x78]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Imei(String);

impl Imei {
    /// Number of bytes the identity occupies on the wire.
    pub const WIRE_LEN: usize = 8;

    /// Create an identity from its operator-facing string form.
    ///
    /// The input is normalized (trimmed, lowercased, leading zeros
    /// stripped) so that lookups match identities decoded from the wire.
    ///
    /// # Errors
    /// Returns `Error::InvalidIdentity` if the string is empty, longer
    /// than 16 digits, or contains non-hex characters.
    pub fn new(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase();
        if normalized.is_empty() || normalized.len() > 2 * Self::WIRE_LEN {
            return Err(Error::InvalidIdentity(format!(
                "identity must be 1-{} hex digits, got {:?}",
                2 * Self::WIRE_LEN,
                s
            )));
        }
        if !normalized.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::InvalidIdentity(format!(
                "identity must be hex digits, got {s:?}"
            )));
        }
        Ok(Imei(Self::canonical(&normalized)))
    }

    /// Decode an identity from the raw wire bytes of a login frame.
    pub fn from_wire(bytes: &[u8; Self::WIRE_LEN]) -> Self {
        Imei(Self::canonical(&hex::encode(bytes)))
    }

    /// Encode the identity back to its 8-byte wire form.
    pub fn to_wire(&self) -> [u8; Self::WIRE_LEN] {
        let padded = format!("{:0>width$}", self.0, width = 2 * Self::WIRE_LEN);
        let mut out = [0u8; Self::WIRE_LEN];
        // The canonical form is validated hex of at most 16 digits.
        if let Ok(decoded) = hex::decode(padded) {
            out.copy_from_slice(&decoded);
        }
        out
    }

    /// Get the canonical string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn canonical(hex_digits: &str) -> String {
        let trimmed = hex_digits.trim_start_matches('0');
        if trimmed.is_empty() {
            "0".to_string()
        } else {
            trimmed.to_string()
        }
    }
}

impl fmt::Display for Imei {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Imei {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Imei::new(s)
    }
}
