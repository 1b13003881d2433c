use std::fmt;

//------------ Types for Statistics -----------------------------------------

/// A snapshot of the dataplane's TBL8 group accounting.
///
/// `in_use_tbl8s` counts the groups currently taken from the pool;
/// `rsvd_tbl8s` is the admission-control reservation, an over-approximation
/// of the groups the installed prefixes may need. Both are bounded by
/// `number_tbl8s`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TrieStats {
    pub number_tbl8s: u32,
    pub in_use_tbl8s: u32,
    pub rsvd_tbl8s: u32,
}

impl fmt::Display for TrieStats {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "tbl8s: {} in use, {} reserved, {} total",
            self.in_use_tbl8s, self.rsvd_tbl8s, self.number_tbl8s
        )
    }
}
