use std::fmt;

use inetnum::addr::Prefix;

use crate::types::af::{bit, depth_mask, truncate_to_len, IPv6};
use crate::types::errors::FibError;

//------------ PrefixId ------------------------------------------------------

/// The key of a route: an IPv6 prefix as `(address, length)`.
///
/// The address is stored in network byte order so the in-memory image of a
/// `PrefixId` equals its wire representation. Constructors truncate the
/// address to the prefix length, so two `PrefixId`s are equal iff their
/// lengths match and their top `len` bits agree.
#[derive(
    Hash,
    Eq,
    PartialEq,
    Debug,
    Copy,
    Clone,
    zerocopy::FromBytes,
    zerocopy::IntoBytes,
    zerocopy::KnownLayout,
    zerocopy::Immutable,
    zerocopy::Unaligned,
)]
#[repr(C)]
pub struct PrefixId {
    len: u8,
    net: IPv6,
}

impl PrefixId {
    /// Creates the id for `net/len`, truncating `net` to `len` bits.
    ///
    /// # Panics
    ///
    /// Panics when `len > 128`.
    pub fn new(net: u128, len: u8) -> Self {
        assert!(len <= 128, "prefix length {} out of range", len);
        PrefixId {
            len,
            net: truncate_to_len(net, len).into(),
        }
    }

    pub fn get_net(&self) -> u128 {
        self.net.into()
    }

    pub fn get_len(&self) -> u8 {
        self.len
    }

    /// The address as 16 network-order bytes.
    pub fn octets(&self) -> [u8; 16] {
        self.get_net().to_be_bytes()
    }

    /// Whether this prefix covers the given address.
    pub fn covers_addr(&self, addr: u128) -> bool {
        (self.get_net() ^ addr) & depth_mask(self.len) == 0
    }

    /// Whether this prefix covers the other, i.e. the other is equal to or
    /// more specific than self.
    pub fn covers(&self, other: PrefixId) -> bool {
        self.len <= other.len && self.covers_addr(other.get_net())
    }

    /// Whether the other prefix is strictly more specific than self.
    pub fn covers_strictly(&self, other: PrefixId) -> bool {
        self.len < other.len && self.covers_addr(other.get_net())
    }

    /// The branch direction an address takes below this prefix in a binary
    /// trie: the address bit just past the prefix length.
    pub(crate) fn dir(&self, addr: u128) -> bool {
        bit(addr, self.len)
    }

    /// The last address covered by this prefix.
    pub(crate) fn range_end(&self) -> u128 {
        self.get_net() | !depth_mask(self.len)
    }

    /// Orders prefixes by address, shorter prefix first on a tie. This is
    /// the in-order position of a prefix in a binary trie.
    pub(crate) fn sort_key(&self) -> (u128, u8) {
        (self.get_net(), self.len)
    }
}

impl fmt::Display for PrefixId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}",
            std::net::Ipv6Addr::from(self.get_net()),
            self.len
        )
    }
}

impl TryFrom<Prefix> for PrefixId {
    type Error = FibError;

    fn try_from(value: Prefix) -> Result<Self, Self::Error> {
        match value.addr() {
            std::net::IpAddr::V6(addr) => {
                Ok(PrefixId::new(addr.into(), value.len()))
            }
            std::net::IpAddr::V4(_) => Err(FibError::Invalid),
        }
    }
}

impl From<PrefixId> for Prefix {
    fn from(value: PrefixId) -> Self {
        Prefix::new(
            std::net::Ipv6Addr::from(value.get_net()).into(),
            value.get_len(),
        )
        .expect("a PrefixId is always a valid prefix")
    }
}
