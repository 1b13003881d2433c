pub mod config;

use std::net::Ipv6Addr;

use log::{debug, trace};

use crate::fib::config::{Config, NhSize};
use crate::rib::{GetNxtMode, Rib6};
use crate::trie::{TrieEntry, TrieTbl};
use crate::types::errors::FibError;
use crate::types::prefix_id::PrefixId;
use crate::types::stats::TrieStats;

//------------ Fib6 ----------------------------------------------------------

// The facade over the two coupled halves of the store: the RIB is the
// authoritative route set, the dataplane trie its flattened
// longest-prefix-match image. Every update goes RIB first, then rewrites
// the address ranges the change owns in the dataplane, so that after each
// returned call the two agree for every address.
//
// All mutation goes through `&mut self`: one writer at a time is a
// compile-time property, not a locking discipline. Callers that need
// readers concurrent with a writer should build a fresh FIB and swap
// handles instead.

/// Prefix lengths run from 0 up to and including 128 bits.
pub const MAX_DEPTH: u8 = 128;

// address bits consumed by the dataplane root table
const TBL24_DEPTH: u8 = 24;

/// The update operations [Fib6::modify] accepts.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FibOp {
    Add,
    Del,
}

/// Selects a lookup kernel in [Fib6::lookup_fn].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LookupType {
    /// The portable scalar kernel.
    Scalar,
    /// A vectorized kernel, if one exists for the host.
    Vector,
    /// The best kernel available: vector if present, scalar otherwise.
    Default,
}

// One variant per configured entry width, so the tables hold exactly the
// width that was asked for and the kernels compile per width.
#[derive(Debug)]
enum SizedTrie {
    B2(TrieTbl<u16>),
    B4(TrieTbl<u32>),
    B8(TrieTbl<u64>),
}

// Runs an expression against the dataplane of whatever width this FIB was
// created with.
macro_rules! match_dp {
    ($dp:expr, $t:ident => $e:expr) => {
        match $dp {
            SizedTrie::B2($t) => $e,
            SizedTrie::B4($t) => $e,
            SizedTrie::B8($t) => $e,
        }
    };
}

impl SizedTrie {
    fn max_nh(&self) -> u64 {
        match self {
            SizedTrie::B2(_) => <u16 as TrieEntry>::MAX_NH,
            SizedTrie::B4(_) => <u32 as TrieEntry>::MAX_NH,
            SizedTrie::B8(_) => <u64 as TrieEntry>::MAX_NH,
        }
    }
}

/// An IPv6 FIB: a RIB coupled to a DIR-24-8 dataplane trie.
#[derive(Debug)]
pub struct Fib6 {
    name: String,
    rib: Rib6,
    dp: SizedTrie,
}

impl Fib6 {
    /// Creates a FIB.
    ///
    /// Fails with [FibError::Invalid] when `num_tbl8` is zero or does not
    /// fit the entry width, or when `default_nh` does not fit it; with
    /// [FibError::AllocFailed] when the tables cannot be allocated.
    pub fn new(name: &str, conf: Config) -> Result<Self, FibError> {
        if conf.num_tbl8 == 0
            || conf.num_tbl8 as u64 > conf.nh_sz.max_nh()
            || conf.default_nh > conf.nh_sz.max_nh()
        {
            return Err(FibError::Invalid);
        }
        let dp = match conf.nh_sz {
            NhSize::B2 => {
                SizedTrie::B2(TrieTbl::new(conf.default_nh, conf.num_tbl8)?)
            }
            NhSize::B4 => {
                SizedTrie::B4(TrieTbl::new(conf.default_nh, conf.num_tbl8)?)
            }
            NhSize::B8 => {
                SizedTrie::B8(TrieTbl::new(conf.default_nh, conf.num_tbl8)?)
            }
        };
        debug!("created fib {} ({:?})", name, conf);
        Ok(Fib6 {
            name: name.into(),
            rib: Rib6::new(),
            dp,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// A read-only view of the authoritative route set.
    pub fn rib(&self) -> &Rib6 {
        &self.rib
    }

    /// The next-hop for addresses no route covers.
    pub fn default_nh(&self) -> u64 {
        match_dp!(&self.dp, dp => dp.default_nh())
    }

    /// The largest next-hop value the configured entry width can hold.
    pub fn max_nh(&self) -> u64 {
        self.dp.max_nh()
    }

    /// Dataplane TBL8 accounting.
    pub fn stats(&self) -> TrieStats {
        match_dp!(&self.dp, dp => dp.stats())
    }

    /// Applies a route update.
    pub fn modify(
        &mut self,
        addr: Ipv6Addr,
        depth: u8,
        next_hop: u64,
        op: FibOp,
    ) -> Result<(), FibError> {
        match op {
            FibOp::Add => self.add(addr, depth, next_hop),
            FibOp::Del => self.del(addr, depth),
        }
    }

    /// Adds the route `addr/depth -> next_hop`, or changes the next-hop
    /// of the present route for that prefix.
    ///
    /// Re-adding a route with its present next-hop is a no-op. An add
    /// that returns [FibError::NoSpace] has not changed anything.
    pub fn add(
        &mut self,
        addr: Ipv6Addr,
        depth: u8,
        next_hop: u64,
    ) -> Result<(), FibError> {
        if depth > MAX_DEPTH || next_hop > self.dp.max_nh() {
            return Err(FibError::Invalid);
        }
        let ip = u128::from(addr);
        let id = PrefixId::new(ip, depth);
        trace!("fib {}: add {} -> {}", self.name, id, next_hop);

        if let Some(node) = self.rib.lookup_exact(id) {
            if node.next_hop() == next_hop {
                return Ok(());
            }
            match_dp!(&mut self.dp, dp => {
                dp.modify(&self.rib, id.get_net(), depth, next_hop)
            })?;
            self.rib.set_nh(id, next_hop);
            return Ok(());
        }

        // Admission control: reserve the TBL8 groups this depth class
        // may need up front, so an add can not run out of groups halfway
        // through its writes.
        let depth_diff = if depth > TBL24_DEPTH {
            let diff = self.add_depth_diff(id, ip);
            let (rsvd, total) = match_dp!(&self.dp, dp => {
                (dp.rsvd_tbl8s(), dp.number_tbl8s())
            });
            // one group stays spare for the transient allocations an
            // install makes before it recycles
            if rsvd as u64 + diff as u64 >= total as u64 {
                return Err(FibError::NoSpace);
            }
            diff
        } else {
            0
        };

        self.rib.insert(id, next_hop);
        // when the parent resolves to the same next-hop, every entry the
        // new route owns already holds the right value
        let par_nh = self.rib.lookup_parent(id).map(|p| p.next_hop());
        if par_nh != Some(next_hop) {
            let ret = match_dp!(&mut self.dp, dp => {
                dp.modify(&self.rib, id.get_net(), depth, next_hop)
            });
            if let Err(err) = ret {
                self.rib.remove(id)?;
                return Err(err);
            }
        }
        match_dp!(&mut self.dp, dp => dp.add_rsvd(depth_diff));
        Ok(())
    }

    /// Deletes the route for `addr/depth`.
    pub fn del(&mut self, addr: Ipv6Addr, depth: u8) -> Result<(), FibError> {
        if depth > MAX_DEPTH {
            return Err(FibError::Invalid);
        }
        let id = PrefixId::new(u128::from(addr), depth);
        trace!("fib {}: del {}", self.name, id);

        let Some(node) = self.rib.lookup_exact(id) else {
            return Err(FibError::NotFound);
        };
        let node_nh = node.next_hop();
        let par = self.rib.lookup_parent(id);
        let par_nh = par.map(|p| p.next_hop());
        let par_depth = par.map(|p| p.prefix().get_len());
        let depth_diff = self.del_depth_diff(id, par_depth);

        // everything the route owned falls back to its parent, or to the
        // default when there is none
        let ret = match par_nh {
            Some(nh) if nh == node_nh => Ok(()),
            Some(nh) => match_dp!(&mut self.dp, dp => {
                dp.modify(&self.rib, id.get_net(), depth, nh)
            }),
            None => {
                let def_nh = self.default_nh();
                match_dp!(&mut self.dp, dp => {
                    dp.modify(&self.rib, id.get_net(), depth, def_nh)
                })
            }
        };
        ret?;
        self.rib.remove(id)?;
        match_dp!(&mut self.dp, dp => dp.sub_rsvd(depth_diff));
        Ok(())
    }

    /// Longest-prefix-match for one address.
    pub fn lookup(&self, addr: Ipv6Addr) -> u64 {
        match_dp!(&self.dp, dp => dp.lookup_one(&addr.octets()))
    }

    /// Resolves a batch of addresses to their next-hops.
    ///
    /// # Panics
    ///
    /// Panics when the two slices differ in length.
    pub fn lookup_bulk(&self, addrs: &[Ipv6Addr], next_hops: &mut [u64]) {
        assert_eq!(addrs.len(), next_hops.len());
        match_dp!(&self.dp, dp => dp.lookup_bulk(addrs, next_hops));
    }

    /// Returns a handle to the requested lookup kernel, or `None` when
    /// the requested variant does not exist for this host.
    pub fn lookup_fn(&self, lookup_type: LookupType) -> Option<LookupFn<'_>> {
        match lookup_type {
            LookupType::Scalar => Some(LookupFn { dp: &self.dp }),
            // no vectorized kernel exists for any host yet
            LookupType::Vector => None,
            LookupType::Default => Some(LookupFn { dp: &self.dp }),
        }
    }

    // The number of TBL8 levels an add of this prefix needs beyond what
    // its surroundings already provide: zero when some more specific
    // route already grew a chain for this depth class, otherwise the
    // level distance to the closest ancestor. An over-approximation, used
    // for admission control only.
    fn add_depth_diff(&self, id: PrefixId, addr: u128) -> u32 {
        let floor_base =
            PrefixId::new(id.get_net(), id.get_len() & !7);
        if self
            .rib
            .get_nxt(floor_base, None, GetNxtMode::Cover)
            .is_some()
        {
            return 0;
        }
        let parent_depth = self
            .rib
            .lookup(addr)
            .map(|n| n.prefix().get_len().max(TBL24_DEPTH))
            .unwrap_or(TBL24_DEPTH);
        tbl8_levels(id.get_len()) - tbl8_levels(parent_depth)
    }

    // The counterpart for deletes: zero while other more specifics of the
    // prefix's depth class keep its chain alive, otherwise the level
    // distance to the parent that remains.
    fn del_depth_diff(&self, id: PrefixId, par_depth: Option<u8>) -> u32 {
        if id.get_len() <= TBL24_DEPTH {
            return 0;
        }
        let floor_base =
            PrefixId::new(id.get_net(), id.get_len() & !7);
        let mut cursor = None;
        while let Some(n) =
            self.rib.get_nxt(floor_base, cursor, GetNxtMode::All)
        {
            if n.prefix() != id {
                return 0;
            }
            cursor = Some(n.prefix());
        }
        let parent_depth =
            par_depth.map_or(TBL24_DEPTH, |d| d.max(TBL24_DEPTH));
        tbl8_levels(id.get_len()) - tbl8_levels(parent_depth)
    }
}

// The number of 8-bit trie levels needed to express a prefix length,
// counting the three the TBL24 covers.
fn tbl8_levels(depth: u8) -> u32 {
    (depth as u32 + 7) / 8
}

//------------ LookupFn ------------------------------------------------------

/// A lookup kernel bound to a FIB, returned by [Fib6::lookup_fn]. The
/// handle borrows the FIB, so the dataplane cannot change under it.
#[derive(Clone, Copy)]
pub struct LookupFn<'a> {
    dp: &'a SizedTrie,
}

impl LookupFn<'_> {
    /// Resolves a batch of addresses to their next-hops.
    pub fn lookup_bulk(&self, addrs: &[Ipv6Addr], next_hops: &mut [u64]) {
        assert_eq!(addrs.len(), next_hops.len());
        match_dp!(self.dp, dp => dp.lookup_bulk(addrs, next_hops));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tbl8_level_math() {
        assert_eq!(tbl8_levels(24), 3);
        assert_eq!(tbl8_levels(25), 4);
        assert_eq!(tbl8_levels(32), 4);
        assert_eq!(tbl8_levels(48), 6);
        assert_eq!(tbl8_levels(128), 16);
    }

    #[test]
    fn create_validation() {
        let conf = Config {
            num_tbl8: 0,
            ..Default::default()
        };
        assert!(matches!(Fib6::new("t", conf), Err(FibError::Invalid)));

        let conf = Config {
            nh_sz: NhSize::B2,
            num_tbl8: 0x8000,
            ..Default::default()
        };
        assert!(matches!(Fib6::new("t", conf), Err(FibError::Invalid)));

        let conf = Config {
            nh_sz: NhSize::B2,
            default_nh: 0x8000,
            num_tbl8: 16,
        };
        assert!(matches!(Fib6::new("t", conf), Err(FibError::Invalid)));
    }
}
