pub(crate) mod lookup;
pub(crate) mod mutator;

use log::debug;

use crate::types::errors::FibError;
use crate::types::stats::TrieStats;

//------------ Entry encoding ------------------------------------------------

/// Number of entries in the TBL24 root table, indexed by the top 24 bits
/// of an address.
pub(crate) const TBL24_NUM_ENT: usize = 1 << 24;

/// Number of entries in one TBL8 group, indexed by one address byte.
pub(crate) const TBL8_GRP_NUM_ENT: usize = 256;

/// Number of address bytes consumed by the TBL24 root table.
pub(crate) const TBL24_BYTES: usize = 3;

/// The low bit of every entry: set on a continuation into a TBL8 group,
/// clear on a terminal next-hop.
pub(crate) const TRIE_EXT_ENT: u64 = 1;

/// A type usable as one dataplane table entry.
///
/// Each configurable next-hop size gets its own unsigned integer type, so
/// the TBL24 and TBL8 arrays take exactly the amount of memory that was
/// configured. All trie logic works on the widened `u64` view; an entry is
/// only narrowed when it is stored.
pub(crate) trait TrieEntry: Copy + Eq + std::fmt::Debug {
    /// The largest next-hop value that fits next to the EXT bit.
    const MAX_NH: u64;

    fn from_entry(entry: u64) -> Self;
    fn into_entry(self) -> u64;
}

impl TrieEntry for u16 {
    const MAX_NH: u64 = (u16::MAX >> 1) as u64;

    fn from_entry(entry: u64) -> Self {
        entry as u16
    }

    fn into_entry(self) -> u64 {
        self as u64
    }
}

impl TrieEntry for u32 {
    const MAX_NH: u64 = (u32::MAX >> 1) as u64;

    fn from_entry(entry: u64) -> Self {
        entry as u32
    }

    fn into_entry(self) -> u64 {
        self as u64
    }
}

impl TrieEntry for u64 {
    const MAX_NH: u64 = u64::MAX >> 1;

    fn from_entry(entry: u64) -> Self {
        entry
    }

    fn into_entry(self) -> u64 {
        self
    }
}

//------------ Slot ----------------------------------------------------------

/// The position of one entry: either in the TBL24 root table or at an
/// offset inside a TBL8 group. Entries are always addressed through table
/// indices, never through references, so the tables can be grown, moved
/// and recycled without dangling anything.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Slot {
    Tbl24(usize),
    Tbl8(u32, usize),
}

//------------ TrieTbl -------------------------------------------------------

/// The dataplane half of the store: a DIR-24-8 trie with entries of width
/// `E`.
///
/// The TBL24 root table is always fully allocated. TBL8 groups live in one
/// arena; group 0 is a reserved sentinel and the usable indices run
/// `1..=number_tbl8s`, handed out through a LIFO pool. A recycled index
/// must be treated as dead the moment the last continuation pointing at it
/// is gone.
#[derive(Debug)]
pub(crate) struct TrieTbl<E: TrieEntry> {
    tbl24: Vec<E>,
    tbl8: Vec<E>,
    tbl8_pool: Vec<u32>,
    tbl8_pool_pos: usize,
    number_tbl8s: u32,
    rsvd_tbl8s: u32,
    def_nh: u64,
}

impl<E: TrieEntry> TrieTbl<E> {
    pub(crate) fn new(
        default_nh: u64,
        number_tbl8s: u32,
    ) -> Result<Self, FibError> {
        let mut tbl24 = Vec::new();
        tbl24
            .try_reserve_exact(TBL24_NUM_ENT)
            .map_err(|_| FibError::AllocFailed)?;
        tbl24.resize(TBL24_NUM_ENT, E::from_entry(default_nh << 1));

        // one spare group for the reserved index 0
        let tbl8_len = TBL8_GRP_NUM_ENT * (number_tbl8s as usize + 1);
        let mut tbl8 = Vec::new();
        tbl8.try_reserve_exact(tbl8_len)
            .map_err(|_| FibError::AllocFailed)?;
        tbl8.resize(tbl8_len, E::from_entry(0));

        let mut tbl8_pool = Vec::new();
        tbl8_pool
            .try_reserve_exact(number_tbl8s as usize)
            .map_err(|_| FibError::AllocFailed)?;
        tbl8_pool.extend(1..=number_tbl8s);

        debug!(
            "created dataplane trie: {} tbl8 groups, default next-hop {}",
            number_tbl8s, default_nh
        );
        Ok(TrieTbl {
            tbl24,
            tbl8,
            tbl8_pool,
            tbl8_pool_pos: 0,
            number_tbl8s,
            rsvd_tbl8s: 0,
            def_nh: default_nh,
        })
    }

    pub(crate) fn default_nh(&self) -> u64 {
        self.def_nh
    }

    pub(crate) fn number_tbl8s(&self) -> u32 {
        self.number_tbl8s
    }

    pub(crate) fn rsvd_tbl8s(&self) -> u32 {
        self.rsvd_tbl8s
    }

    pub(crate) fn add_rsvd(&mut self, n: u32) {
        debug_assert!(self.rsvd_tbl8s + n <= self.number_tbl8s);
        self.rsvd_tbl8s += n;
    }

    pub(crate) fn sub_rsvd(&mut self, n: u32) {
        debug_assert!(n <= self.rsvd_tbl8s);
        self.rsvd_tbl8s -= n;
    }

    pub(crate) fn stats(&self) -> TrieStats {
        TrieStats {
            number_tbl8s: self.number_tbl8s,
            in_use_tbl8s: self.tbl8_pool_pos as u32,
            rsvd_tbl8s: self.rsvd_tbl8s,
        }
    }

    //--- Entry access

    pub(crate) fn read(&self, slot: Slot) -> u64 {
        match slot {
            Slot::Tbl24(idx) => self.tbl24[idx].into_entry(),
            Slot::Tbl8(grp, ent) => {
                self.tbl8[grp as usize * TBL8_GRP_NUM_ENT + ent].into_entry()
            }
        }
    }

    pub(crate) fn write(&mut self, slot: Slot, val: u64) {
        self.write_n(slot, val, 1);
    }

    /// Writes `val` into `n` consecutive entries starting at `slot`.
    pub(crate) fn write_n(&mut self, slot: Slot, val: u64, n: usize) {
        let entry = E::from_entry(val);
        match slot {
            Slot::Tbl24(idx) => self.tbl24[idx..idx + n].fill(entry),
            Slot::Tbl8(grp, ent) => {
                let start = grp as usize * TBL8_GRP_NUM_ENT + ent;
                self.tbl8[start..start + n].fill(entry)
            }
        }
    }

    //--- TBL8 pool

    /// Takes a free group index from the pool.
    fn tbl8_get(&mut self) -> Result<u32, FibError> {
        if self.tbl8_pool_pos == self.number_tbl8s as usize {
            // no more free tbl8
            return Err(FibError::NoSpace);
        }
        let idx = self.tbl8_pool[self.tbl8_pool_pos];
        self.tbl8_pool_pos += 1;
        Ok(idx)
    }

    /// Puts a group index back into the pool.
    fn tbl8_put(&mut self, idx: u32) {
        self.tbl8_pool_pos -= 1;
        self.tbl8_pool[self.tbl8_pool_pos] = idx;
    }

    /// Allocates a group with all entries set to `fill`, the value of the
    /// entry the new group is about to replace, so lookups through it keep
    /// resolving as before.
    pub(crate) fn tbl8_alloc(&mut self, fill: u64) -> Result<u32, FibError> {
        let idx = self.tbl8_get()?;
        self.write_n(Slot::Tbl8(idx, 0), fill, TBL8_GRP_NUM_ENT);
        Ok(idx)
    }

    /// Collapses the group behind the continuation `val` if all of its
    /// entries hold one identical terminal: the group goes back to the
    /// pool and the terminal is returned for the parent entry to hold.
    /// Otherwise returns `val` unchanged. A group whose first entry is a
    /// continuation is never collapsible.
    pub(crate) fn tbl8_recycle(&mut self, val: u64) -> u64 {
        if val & TRIE_EXT_ENT == 0 {
            return val;
        }
        let grp = (val >> 1) as u32;
        let first = self.read(Slot::Tbl8(grp, 0));
        if first & TRIE_EXT_ENT != 0 {
            return val;
        }
        for ent in 1..TBL8_GRP_NUM_ENT {
            if self.read(Slot::Tbl8(grp, ent)) != first {
                return val;
            }
        }
        self.write_n(Slot::Tbl8(grp, 0), 0, TBL8_GRP_NUM_ENT);
        self.tbl8_put(grp);
        first
    }
}
