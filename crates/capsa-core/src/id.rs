//! Strongly-typed identifiers and the public short-id codec.
//!
//! Internal row identifiers are monotonically increasing integers assigned
//! by the stores. They are never exposed directly: each entity type has its
//! own short-id namespace, a bijection between the integer id and a compact
//! URL-safe string.
//!
//! The two namespaces are deliberately incompatible. A Run short-id fails to
//! decode under the Upload codec (and vice versa), so a decoded id can only
//! ever be routed to the table its codec was built for. The typed
//! [`UploadId`] and [`RunId`] wrappers enforce this at compile time.
//!
//! # Example
//!
//! ```rust
//! use capsa_core::id::{RunId, UploadId};
//!
//! let run = RunId::new(42);
//! let public = run.short_id();
//! assert_eq!(RunId::from_short_id(&public).unwrap(), run);
//!
//! // Namespaces are disjoint - this fails:
//! assert!(UploadId::from_short_id(&public).is_err());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Crockford-style base32 alphabet: lowercase, no `i`, `l`, `o`, `u`.
///
/// URL-safe and unambiguous when read back by humans.
const ALPHABET: &[u8; 32] = b"0123456789abcdefghjkmnpqrstvwxyz";

/// Short-id namespace, one per publicly addressable entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    /// Upload short-ids (`u...`).
    Upload,
    /// Run short-ids (`r...`).
    Run,
}

impl Namespace {
    /// Returns the single-character prefix for this namespace.
    #[must_use]
    pub const fn prefix(self) -> char {
        match self {
            Self::Upload => 'u',
            Self::Run => 'r',
        }
    }

    /// Returns the obfuscation mask for this namespace.
    ///
    /// The mask keeps sequential row ids from reading as sequential public
    /// ids. XOR is its own inverse, so the mapping stays bijective.
    const fn mask(self) -> u64 {
        match self {
            Self::Upload => 0x9e3b_52c1,
            Self::Run => 0x47ac_d9e5,
        }
    }
}

/// Bijective codec between integer row ids and public short-id strings.
///
/// Construct one per namespace; the instances are `const` and cheap to copy.
#[derive(Debug, Clone, Copy)]
pub struct ShortIdCodec {
    namespace: Namespace,
}

/// Codec instance for the Upload namespace.
pub const UPLOAD_IDS: ShortIdCodec = ShortIdCodec::new(Namespace::Upload);

/// Codec instance for the Run namespace.
pub const RUN_IDS: ShortIdCodec = ShortIdCodec::new(Namespace::Run);

impl ShortIdCodec {
    /// Creates a codec for the given namespace.
    #[must_use]
    pub const fn new(namespace: Namespace) -> Self {
        Self { namespace }
    }

    /// Encodes a row id as a public short-id string.
    ///
    /// Total over every id the stores produce (non-negative integers).
    #[must_use]
    pub fn encode(&self, id: i64) -> String {
        #[allow(clippy::cast_sign_loss)]
        let mut value = (id as u64) ^ self.namespace.mask();

        let mut digits = [0u8; 13];
        let mut len = 0;
        loop {
            digits[len] = ALPHABET[(value % 32) as usize];
            len += 1;
            value /= 32;
            if value == 0 {
                break;
            }
        }

        let mut out = String::with_capacity(len + 1);
        out.push(self.namespace.prefix());
        for &digit in digits[..len].iter().rev() {
            out.push(digit as char);
        }
        out
    }

    /// Decodes a public short-id string back to a row id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidId`] for a wrong or missing namespace prefix,
    /// an empty or non-canonical payload, characters outside the alphabet,
    /// or a value outside the id range. Whether a decoded id actually exists
    /// is the caller's lookup to make; that failure is `NotFound`, not
    /// `InvalidId`.
    pub fn decode(&self, s: &str) -> Result<i64> {
        let payload = s.strip_prefix(self.namespace.prefix()).ok_or_else(|| {
            Error::InvalidId {
                message: format!(
                    "short id {s:?} does not carry the {:?} namespace prefix",
                    self.namespace
                ),
            }
        })?;

        if payload.is_empty() {
            return Err(Error::InvalidId {
                message: format!("short id {s:?} has an empty payload"),
            });
        }
        if payload.len() > 1 && payload.starts_with('0') {
            return Err(Error::InvalidId {
                message: format!("short id {s:?} is not in canonical form"),
            });
        }

        let mut value: u64 = 0;
        for c in payload.bytes() {
            let digit = decode_digit(c).ok_or_else(|| Error::InvalidId {
                message: format!("short id {s:?} contains invalid character {:?}", c as char),
            })?;
            value = value
                .checked_mul(32)
                .and_then(|v| v.checked_add(digit))
                .ok_or_else(|| Error::InvalidId {
                    message: format!("short id {s:?} overflows the id range"),
                })?;
        }

        let unmasked = value ^ self.namespace.mask();
        i64::try_from(unmasked).map_err(|_| Error::InvalidId {
            message: format!("short id {s:?} is outside the id range"),
        })
    }
}

fn decode_digit(c: u8) -> Option<u64> {
    ALPHABET
        .iter()
        .position(|&a| a == c)
        .map(|position| position as u64)
}

/// A unique identifier for an upload (one submission event).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UploadId(i64);

impl UploadId {
    /// Wraps a store-assigned row id.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the underlying row id.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self.0
    }

    /// Encodes this id in the Upload short-id namespace.
    #[must_use]
    pub fn short_id(self) -> String {
        UPLOAD_IDS.encode(self.0)
    }

    /// Decodes an Upload short-id string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidId`] if the string is not a well-formed
    /// Upload short-id.
    pub fn from_short_id(s: &str) -> Result<Self> {
        UPLOAD_IDS.decode(s).map(Self)
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unique identifier for a run (one execution attempt).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RunId(i64);

impl RunId {
    /// Wraps a store-assigned row id.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the underlying row id.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self.0
    }

    /// Encodes this id in the Run short-id namespace.
    #[must_use]
    pub fn short_id(self) -> String {
        RUN_IDS.encode(self.0)
    }

    /// Decodes a Run short-id string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidId`] if the string is not a well-formed Run
    /// short-id.
    pub fn from_short_id(s: &str) -> Result<Self> {
        RUN_IDS.decode(s).map(Self)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
