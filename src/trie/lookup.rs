use std::net::Ipv6Addr;

use crate::trie::{TrieEntry, TrieTbl, TBL8_GRP_NUM_ENT, TRIE_EXT_ENT};

//------------ Scalar lookup kernel ------------------------------------------

// The hot path. One TBL24 load on the top 24 address bits, then at most 13
// byte-indexed loads while the entry keeps its EXT bit. No allocation, and
// the only data-dependent branch is the EXT test itself; the loop bound is
// structural (there are no address bytes left to consume), so a lookup
// cannot run off the address even on a corrupted table.

impl<E: TrieEntry> TrieTbl<E> {
    /// Longest-prefix-match for a single address in network byte order.
    #[inline(always)]
    pub(crate) fn lookup_one(&self, octets: &[u8; 16]) -> u64 {
        let idx = (octets[0] as usize) << 16
            | (octets[1] as usize) << 8
            | octets[2] as usize;
        let mut entry = self.tbl24[idx].into_entry();
        for byte in &octets[3..] {
            if entry & TRIE_EXT_ENT != TRIE_EXT_ENT {
                break;
            }
            let grp = (entry >> 1) as usize;
            entry = self.tbl8[grp * TBL8_GRP_NUM_ENT + *byte as usize]
                .into_entry();
        }
        debug_assert!(entry & TRIE_EXT_ENT == 0);
        entry >> 1
    }

    /// Resolves a batch of addresses to their next-hops.
    pub(crate) fn lookup_bulk(
        &self,
        addrs: &[Ipv6Addr],
        next_hops: &mut [u64],
    ) {
        for (addr, next_hop) in addrs.iter().zip(next_hops.iter_mut()) {
            *next_hop = self.lookup_one(&addr.octets());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trie::Slot;

    #[test]
    fn terminal_and_continuation() {
        let mut dp = TrieTbl::<u32>::new(5, 4).unwrap();
        let addr: Ipv6Addr = "2001:db8::1".parse().unwrap();

        // freshly created: everything resolves to the default
        assert_eq!(dp.lookup_one(&addr.octets()), 5);

        // hang a group off the address' TBL24 entry and give the
        // address' byte-3 slot its own next-hop
        let grp = dp.tbl8_alloc(5 << 1).unwrap();
        let idx = (0x20usize) << 16 | 0x01 << 8 | 0x0d;
        dp.write(Slot::Tbl24(idx), ((grp as u64) << 1) | TRIE_EXT_ENT);
        dp.write(Slot::Tbl8(grp, 0xb8), 42 << 1);

        assert_eq!(dp.lookup_one(&addr.octets()), 42);
        let other: Ipv6Addr = "2001:d00::1".parse().unwrap();
        assert_eq!(dp.lookup_one(&other.octets()), 5);
    }

    #[test]
    fn bulk_matches_single() {
        let mut dp = TrieTbl::<u16>::new(1, 4).unwrap();
        let grp = dp.tbl8_alloc(1 << 1).unwrap();
        dp.write(Slot::Tbl24(0), ((grp as u64) << 1) | TRIE_EXT_ENT);
        dp.write(Slot::Tbl8(grp, 1), 9 << 1);

        let addrs: Vec<Ipv6Addr> = ["::", "0:1::", "ff::1", "::1:0:0:0"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        let mut out = vec![0; addrs.len()];
        dp.lookup_bulk(&addrs, &mut out);
        for (addr, got) in addrs.iter().zip(&out) {
            assert_eq!(*got, dp.lookup_one(&addr.octets()));
        }
        assert_eq!(out[1], 9);
    }
}
