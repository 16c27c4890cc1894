//! Identifier types for netlist entities.
//!
//! [`BlockId`] is a tagged identifier whose textual form is a 1-char kind
//! prefix followed by a numeric suffix (`p12`, `m3`, `x0`). The `x` tag marks
//! a cluster pseudo-block: a stand-in for an entire cluster, placed at its
//! centroid during the coarser placement phases. [`NetId`] uses the `e` prefix
//! (`e7`). Both serialize as their textual form so they can key JSON maps.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// The functional kind of a block, encoded as the prefix of its textual id.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub enum BlockKind {
    /// An I/O pad block (`i`).
    Io,
    /// A memory block (`m`).
    Mem,
    /// A processing-element block (`p`).
    Pe,
    /// A register block (`r`).
    Reg,
    /// An unused/generic block (`u`).
    Gen,
    /// A cluster pseudo-block (`x`), internal to the placer.
    Cluster,
}

impl BlockKind {
    /// Returns the 1-char tag used in the textual id form.
    pub fn tag(self) -> char {
        match self {
            BlockKind::Io => 'i',
            BlockKind::Mem => 'm',
            BlockKind::Pe => 'p',
            BlockKind::Reg => 'r',
            BlockKind::Gen => 'u',
            BlockKind::Cluster => 'x',
        }
    }

    /// Parses a 1-char tag back into a kind.
    pub fn from_tag(tag: char) -> Option<Self> {
        match tag {
            'i' => Some(BlockKind::Io),
            'm' => Some(BlockKind::Mem),
            'p' => Some(BlockKind::Pe),
            'r' => Some(BlockKind::Reg),
            'u' => Some(BlockKind::Gen),
            'x' => Some(BlockKind::Cluster),
            _ => None,
        }
    }

    /// Returns whether blocks of this kind occupy CLB-type cells.
    ///
    /// PEs, registers, and generic blocks all compete for the device's CLB
    /// fabric; I/O and memory blocks have dedicated cell types.
    pub fn is_clb(self) -> bool {
        matches!(self, BlockKind::Pe | BlockKind::Reg | BlockKind::Gen)
    }
}

/// An identifier for a block in the packed netlist.
///
/// Ordered by `(kind, index)`, which gives a deterministic iteration order
/// for maps and sorted lists.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct BlockId {
    /// The block's functional kind.
    pub kind: BlockKind,
    /// The unique numeric suffix within the kind.
    pub index: u32,
}

impl BlockId {
    /// Creates a block id from a kind and numeric suffix.
    pub fn new(kind: BlockKind, index: u32) -> Self {
        Self { kind, index }
    }

    /// Creates the pseudo-block id standing in for cluster `k`.
    pub fn cluster(k: ClusterId) -> Self {
        Self {
            kind: BlockKind::Cluster,
            index: k.0,
        }
    }

    /// Returns whether this id denotes a cluster pseudo-block.
    pub fn is_pseudo(self) -> bool {
        self.kind == BlockKind::Cluster
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.tag(), self.index)
    }
}

/// Error returned when parsing a textual block or net id fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid id '{0}'")]
pub struct ParseIdError(pub String);

impl FromStr for BlockId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let tag = chars.next().ok_or_else(|| ParseIdError(s.to_string()))?;
        let kind = BlockKind::from_tag(tag).ok_or_else(|| ParseIdError(s.to_string()))?;
        let index = chars
            .as_str()
            .parse::<u32>()
            .map_err(|_| ParseIdError(s.to_string()))?;
        Ok(BlockId { kind, index })
    }
}

impl Serialize for BlockId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BlockId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// An identifier for a net, textual form `e<index>`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct NetId(pub u32);

impl NetId {
    /// Creates a net id from a raw index.
    pub fn from_raw(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw index.
    pub fn as_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for NetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

impl FromStr for NetId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix('e')
            .ok_or_else(|| ParseIdError(s.to_string()))?;
        let index = rest
            .parse::<u32>()
            .map_err(|_| ParseIdError(s.to_string()))?;
        Ok(NetId(index))
    }
}

impl Serialize for NetId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NetId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// An identifier for a cluster produced by the embedding clusterer.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct ClusterId(pub u32);

impl ClusterId {
    /// Creates a cluster id from a raw index.
    pub fn from_raw(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw index.
    pub fn as_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
