use log::trace;

use crate::rib::{GetNxtMode, Rib6};
use crate::trie::{
    Slot, TrieEntry, TrieTbl, TBL24_BYTES, TRIE_EXT_ENT,
};
#[cfg(test)]
use crate::trie::TBL8_GRP_NUM_ENT;
use crate::types::errors::FibError;
use crate::types::prefix_id::PrefixId;

//------------ Range expansion -----------------------------------------------

// Translates a single `(prefix, next_hop)` change into entry writes.
//
// The prefix owns every address it covers except the holes punched by
// strictly more specific routes still in the RIB. Walking the cover set in
// ascending address order turns the owned set into a list of contiguous
// sub-ranges `[ledge, redge]`; each sub-range is installed independently:
// build a chain of continuations down to the last address byte the two
// edges share, write the left edge, fill the middle, write the right edge,
// then collapse any group on the shared chain that ended up uniform.
//
// A failed allocation aborts the sub-range without unwinding what was
// already written; the facade's admission control keeps that state
// unreachable for adds.

const IPV6_MAX_IDX: usize = 15;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Edge {
    Ledge,
    Redge,
}

/// Where a sub-range's common root lives: the TBL24 itself, or one TBL8
/// group on the continuation chain below it.
#[derive(Clone, Copy, Debug)]
enum Root {
    Tbl24,
    Tbl8(u32),
}

impl Root {
    fn slot(self, idx: usize) -> Slot {
        match self {
            Root::Tbl24 => Slot::Tbl24(idx),
            Root::Tbl8(grp) => Slot::Tbl8(grp, idx),
        }
    }
}

fn tbl24_idx(octets: &[u8; 16]) -> usize {
    (octets[0] as usize) << 16
        | (octets[1] as usize) << 8
        | octets[2] as usize
}

impl<E: TrieEntry> TrieTbl<E> {
    /// Rewrites every entry that the prefix `ip/depth` owns under
    /// longest-prefix-match to resolve to `next_hop`.
    pub(crate) fn modify(
        &mut self,
        rib: &Rib6,
        ip: u128,
        depth: u8,
        next_hop: u64,
    ) -> Result<(), FibError> {
        debug_assert!(next_hop <= E::MAX_NH);
        let base = PrefixId::new(ip, depth);
        debug_assert!(base.get_net() == ip, "address not masked to depth");
        let end = base.range_end();

        let mut ledge = ip;
        let mut exhausted = false;
        let mut last: Option<PrefixId> = None;
        while let Some(hole) = rib.get_nxt(base, last, GetNxtMode::Cover) {
            let hole_id = hole.prefix();
            last = Some(hole_id);
            let hole_start = hole_id.get_net();
            if hole_start != ledge {
                self.install(ledge, hole_start - 1, next_hop)?;
            }
            match hole_id.range_end().checked_add(1) {
                Some(next) => ledge = next,
                None => {
                    // the hole runs to the end of the address space
                    exhausted = true;
                    break;
                }
            }
        }
        if !exhausted && ledge <= end {
            self.install(ledge, end, next_hop)?;
        }
        Ok(())
    }

    /// Installs one contiguous sub-range `[ledge, redge]` (both inclusive).
    fn install(
        &mut self,
        ledge: u128,
        redge: u128,
        next_hop: u64,
    ) -> Result<(), FibError> {
        debug_assert!(ledge <= redge);
        trace!(
            "install [{}, {}] -> {}",
            std::net::Ipv6Addr::from(ledge),
            std::net::Ipv6Addr::from(redge),
            next_hop
        );
        let lb = ledge.to_be_bytes();
        let rb = redge.to_be_bytes();

        // Whole bytes the two edges share, capped at 15: the last byte is
        // always resolved by the edge writes inside the deepest group.
        let mut common_bytes = 0;
        while common_bytes < IPV6_MAX_IDX && lb[common_bytes] == rb[common_bytes]
        {
            common_bytes += 1;
        }

        let root = self.build_common_root(&lb, common_bytes)?;

        // first address byte not covered by the common root
        let first_tbl8_byte = common_bytes.max(TBL24_BYTES);

        // levels each edge descends below the common root
        let mut i = IPV6_MAX_IDX;
        while i > first_tbl8_byte && lb[i] == 0 {
            i -= 1;
        }
        let llen = i - first_tbl8_byte + usize::from(common_bytes < TBL24_BYTES);
        let mut i = IPV6_MAX_IDX;
        while i > first_tbl8_byte && rb[i] == u8::MAX {
            i -= 1;
        }
        let rlen = i - first_tbl8_byte + usize::from(common_bytes < TBL24_BYTES);

        // the edges' entries in the common root
        let (left_idx, right_idx) = if common_bytes < TBL24_BYTES {
            (tbl24_idx(&lb), tbl24_idx(&rb))
        } else {
            (lb[common_bytes] as usize, rb[common_bytes] as usize)
        };
        let part_start =
            first_tbl8_byte + usize::from(common_bytes >= TBL24_BYTES);

        self.write_edge(
            &lb[part_start..],
            next_hop,
            llen,
            Edge::Ledge,
            root.slot(left_idx),
        )?;
        if right_idx > left_idx + 1 {
            self.write_n(
                root.slot(left_idx + 1),
                next_hop << 1,
                right_idx - (left_idx + 1),
            );
        }
        self.write_edge(
            &rb[part_start..],
            next_hop,
            rlen,
            Edge::Redge,
            root.slot(right_idx),
        )?;

        // collapse whatever became uniform along the shared chain
        let common_tbl8 = if common_bytes < TBL24_BYTES {
            0
        } else {
            common_bytes - (TBL24_BYTES - 1)
        };
        self.recycle_root_path(
            &lb[TBL24_BYTES..],
            common_tbl8,
            Slot::Tbl24(tbl24_idx(&lb)),
        );
        Ok(())
    }

    /// Makes sure a continuation chain exists for the first `common_bytes`
    /// address bytes and returns the table it ends in. A terminal on the
    /// way down is expanded into a fresh group filled with that terminal.
    fn build_common_root(
        &mut self,
        octets: &[u8; 16],
        common_bytes: usize,
    ) -> Result<Root, FibError> {
        if common_bytes < TBL24_BYTES {
            return Ok(Root::Tbl24);
        }
        let mut grp = self.ensure_ext(Slot::Tbl24(tbl24_idx(octets)))?;
        for byte in &octets[TBL24_BYTES..common_bytes] {
            grp = self.ensure_ext(Slot::Tbl8(grp, *byte as usize))?;
        }
        Ok(Root::Tbl8(grp))
    }

    // Turns a terminal entry into a continuation, allocating the group it
    // points to. An entry that already is a continuation is left alone.
    fn ensure_ext(&mut self, slot: Slot) -> Result<u32, FibError> {
        let val = self.read(slot);
        if val & TRIE_EXT_ENT == TRIE_EXT_ENT {
            return Ok((val >> 1) as u32);
        }
        let idx = self.tbl8_alloc(val)?;
        self.write(slot, ((idx as u64) << 1) | TRIE_EXT_ENT);
        Ok(idx)
    }

    /// Writes one edge of a sub-range: descends `len` levels along the
    /// edge's address bytes and, on the way back up, fills everything on
    /// the range side of the edge byte with the next-hop. The deepest
    /// level writes the terminal for the edge byte itself. Each level's
    /// group is recycled before its parent entry is finalized, so an edge
    /// that ends up uniform collapses into a plain terminal.
    fn write_edge(
        &mut self,
        ip_part: &[u8],
        next_hop: u64,
        len: usize,
        edge: Edge,
        ent: Slot,
    ) -> Result<(), FibError> {
        let mut val = next_hop << 1;
        if len != 0 {
            val = self.read(ent);
            let tbl8_idx = if val & TRIE_EXT_ENT == TRIE_EXT_ENT {
                (val >> 1) as u32
            } else {
                let idx = self.tbl8_alloc(val)?;
                val = ((idx as u64) << 1) | TRIE_EXT_ENT;
                idx
            };
            let byte = ip_part[0] as usize;
            self.write_edge(
                &ip_part[1..],
                next_hop,
                len - 1,
                edge,
                Slot::Tbl8(tbl8_idx, byte),
            )?;
            match edge {
                Edge::Ledge => self.write_n(
                    Slot::Tbl8(tbl8_idx, byte + 1),
                    next_hop << 1,
                    u8::MAX as usize - byte,
                ),
                Edge::Redge => self.write_n(
                    Slot::Tbl8(tbl8_idx, 0),
                    next_hop << 1,
                    byte,
                ),
            }
            val = self.tbl8_recycle(val);
        }
        self.write(ent, val);
        Ok(())
    }

    // Recycles the groups on the common-root chain, deepest first. `prev`
    // is the entry pointing at the current level; entries that are not
    // continuations end the descent.
    fn recycle_root_path(
        &mut self,
        ip_part: &[u8],
        levels: usize,
        prev: Slot,
    ) {
        let val = self.read(prev);
        if val & TRIE_EXT_ENT != TRIE_EXT_ENT {
            return;
        }
        if levels != 0 {
            let grp = (val >> 1) as u32;
            self.recycle_root_path(
                &ip_part[1..],
                levels - 1,
                Slot::Tbl8(grp, ip_part[0] as usize),
            );
        }
        let collapsed = self.tbl8_recycle(val);
        if collapsed != val {
            self.write(prev, collapsed);
        }
    }
}
