use log::trace;

use crate::types::errors::FibError;
use crate::types::prefix_id::PrefixId;

//------------ Rib6 ----------------------------------------------------------

// The routing information base: a path-compressed binary radix tree keyed
// by IPv6 prefixes. This is the authoritative side of the store; the
// dataplane trie is derived from it. Branch nodes that do not carry a route
// of their own exist only while they have two children, so the tree stays
// proportional to the number of routes.
//
// Nodes are owned through `Option<Box<..>>` child slots and all traversals
// restart from the root, with a `PrefixId` as the resumption cursor where
// the dataplane needs one. That keeps the tree free of parent pointers and
// interior mutability.

/// A node in the RIB, carrying a prefix and its next-hop.
#[derive(Debug)]
pub struct RibNode {
    id: PrefixId,
    next_hop: u64,
    valid: bool,
    left: Option<Box<RibNode>>,
    right: Option<Box<RibNode>>,
}

impl RibNode {
    fn new_route(id: PrefixId, next_hop: u64) -> Self {
        RibNode {
            id,
            next_hop,
            valid: true,
            left: None,
            right: None,
        }
    }

    fn new_branch(id: PrefixId) -> Self {
        RibNode {
            id,
            next_hop: 0,
            valid: false,
            left: None,
            right: None,
        }
    }

    pub fn prefix(&self) -> PrefixId {
        self.id
    }

    pub fn next_hop(&self) -> u64 {
        self.next_hop
    }

    fn child(&self, dir: bool) -> Option<&RibNode> {
        if dir {
            self.right.as_deref()
        } else {
            self.left.as_deref()
        }
    }

    fn child_slot_mut(&mut self, dir: bool) -> &mut Option<Box<RibNode>> {
        if dir {
            &mut self.right
        } else {
            &mut self.left
        }
    }
}

/// Selects which more-specific prefixes `get_nxt` walks.
///
/// `All` yields every more-specific route. `Cover` yields only the topmost
/// ones: routes without a more-specific ancestor of their own below the
/// base prefix. In both modes siblings come out in ascending address
/// order, which is what the dataplane mutator's range construction relies
/// on.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum GetNxtMode {
    All,
    Cover,
}

/// A routing information base over IPv6 prefixes.
#[derive(Debug, Default)]
pub struct Rib6 {
    root: Option<Box<RibNode>>,
    count: usize,
}

impl Rib6 {
    pub fn new() -> Self {
        Rib6 {
            root: None,
            count: 0,
        }
    }

    /// The number of routes in the RIB.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Inserts a route. Returns whether the route was newly created; an
    /// insert of an already present prefix leaves its next-hop untouched.
    pub fn insert(&mut self, id: PrefixId, next_hop: u64) -> bool {
        trace!("rib insert {} -> {}", id, next_hop);
        let created = Self::insert_rec(&mut self.root, id, next_hop);
        if created {
            self.count += 1;
        }
        created
    }

    fn insert_rec(
        slot: &mut Option<Box<RibNode>>,
        id: PrefixId,
        next_hop: u64,
    ) -> bool {
        let Some(node) = slot else {
            *slot = Some(Box::new(RibNode::new_route(id, next_hop)));
            return true;
        };
        if node.id == id {
            if node.valid {
                return false;
            }
            // a branch node at exactly this prefix becomes the route
            node.valid = true;
            node.next_hop = next_hop;
            return true;
        }
        if node.id.covers_strictly(id) {
            let dir = node.id.dir(id.get_net());
            return Self::insert_rec(node.child_slot_mut(dir), id, next_hop);
        }

        // The present node does not cover the new prefix: restructure.
        let old = slot.take().unwrap();
        if id.covers_strictly(old.id) {
            // the new route becomes the parent of the present subtree
            let mut new = Box::new(RibNode::new_route(id, next_hop));
            let dir = id.dir(old.id.get_net());
            *new.child_slot_mut(dir) = Some(old);
            *slot = Some(new);
        } else {
            // diverging prefixes: split at the longest common prefix
            let common = Self::common_len(id, old.id);
            let mut branch = Box::new(RibNode::new_branch(PrefixId::new(
                id.get_net(),
                common,
            )));
            let dir = branch.id.dir(old.id.get_net());
            *branch.child_slot_mut(dir) = Some(old);
            *branch.child_slot_mut(!dir) =
                Some(Box::new(RibNode::new_route(id, next_hop)));
            *slot = Some(branch);
        }
        true
    }

    // The length of the longest common prefix of two diverging prefixes.
    // Only called when neither covers the other, so the first differing
    // bit sits above both prefix lengths.
    fn common_len(a: PrefixId, b: PrefixId) -> u8 {
        let diff = a.get_net() ^ b.get_net();
        debug_assert!(diff != 0);
        diff.leading_zeros() as u8
    }

    /// Removes a route, restructuring the tree so exact-match keeps
    /// working for every remaining prefix.
    pub fn remove(&mut self, id: PrefixId) -> Result<(), FibError> {
        trace!("rib remove {}", id);
        if Self::remove_rec(&mut self.root, id) {
            self.count -= 1;
            Ok(())
        } else {
            Err(FibError::NotFound)
        }
    }

    fn remove_rec(slot: &mut Option<Box<RibNode>>, id: PrefixId) -> bool {
        let Some(node) = slot else {
            return false;
        };
        if node.id == id {
            if !node.valid {
                return false;
            }
            if node.left.is_some() && node.right.is_some() {
                // both subtrees stay reachable through a branch node
                node.valid = false;
                node.next_hop = 0;
            } else {
                let mut old = slot.take().unwrap();
                *slot = old.left.take().or_else(|| old.right.take());
            }
            return true;
        }
        if !node.id.covers_strictly(id) {
            return false;
        }
        let dir = node.id.dir(id.get_net());
        let removed = Self::remove_rec(node.child_slot_mut(dir), id);
        let splice = removed
            && !node.valid
            && (node.left.is_none() || node.right.is_none());
        if splice {
            // a branch node with a single child left is redundant
            let mut old = slot.take().unwrap();
            *slot = old.left.take().or_else(|| old.right.take());
        }
        removed
    }

    /// Changes the next-hop of a present route. Returns whether the route
    /// was found.
    pub fn set_nh(&mut self, id: PrefixId, next_hop: u64) -> bool {
        let mut cur = self.root.as_deref_mut();
        while let Some(node) = cur {
            if node.id == id {
                if node.valid {
                    node.next_hop = next_hop;
                    return true;
                }
                return false;
            }
            if !node.id.covers_strictly(id) {
                return false;
            }
            let dir = node.id.dir(id.get_net());
            cur = if dir {
                node.right.as_deref_mut()
            } else {
                node.left.as_deref_mut()
            };
        }
        false
    }

    /// Longest-prefix match for a single address.
    pub fn lookup(&self, addr: u128) -> Option<&RibNode> {
        let mut best = None;
        let mut cur = self.root.as_deref();
        while let Some(node) = cur {
            if !node.id.covers_addr(addr) {
                break;
            }
            if node.valid {
                best = Some(node);
            }
            if node.id.get_len() == 128 {
                break;
            }
            cur = node.child(node.id.dir(addr));
        }
        best
    }

    /// Exact-match lookup.
    pub fn lookup_exact(&self, id: PrefixId) -> Option<&RibNode> {
        let mut cur = self.root.as_deref();
        while let Some(node) = cur {
            if node.id == id {
                return if node.valid { Some(node) } else { None };
            }
            if !node.id.covers_strictly(id) {
                return None;
            }
            cur = node.child(node.id.dir(id.get_net()));
        }
        None
    }

    /// The nearest strict ancestor route of the given prefix, if any.
    pub fn lookup_parent(&self, id: PrefixId) -> Option<&RibNode> {
        let mut best = None;
        let mut cur = self.root.as_deref();
        while let Some(node) = cur {
            if !node.id.covers_strictly(id) {
                break;
            }
            if node.valid {
                best = Some(node);
            }
            cur = node.child(node.id.dir(id.get_net()));
        }
        best
    }

    /// The next route strictly more specific than `base`, after the route
    /// in `last`, or the first one when `last` is `None`.
    ///
    /// The iteration is stateless: the cursor is the previously returned
    /// prefix, so the caller may interleave calls freely as long as the
    /// tree is not mutated in between.
    pub fn get_nxt(
        &self,
        base: PrefixId,
        last: Option<PrefixId>,
        mode: GetNxtMode,
    ) -> Option<&RibNode> {
        // descend to the subtree holding everything below `base`
        let mut cur = self.root.as_deref();
        let sub = loop {
            let node = cur?;
            if base.covers(node.id) {
                break node;
            }
            if node.id.covers_strictly(base) {
                cur = node.child(node.id.dir(base.get_net()));
                continue;
            }
            return None;
        };
        Self::next_below(sub, base, last, mode)
    }

    fn next_below<'a>(
        node: &'a RibNode,
        base: PrefixId,
        last: Option<PrefixId>,
        mode: GetNxtMode,
    ) -> Option<&'a RibNode> {
        if let Some(l) = last {
            // nothing under this node sorts after the cursor
            if node.id.range_end() < l.get_net() {
                return None;
            }
            // in cover mode everything below the cursor's prefix is done
            if mode == GetNxtMode::Cover && l.covers(node.id) {
                return None;
            }
        }
        if node.valid && node.id.get_len() > base.get_len() {
            let after = last
                .map_or(true, |l| node.id.sort_key() > l.sort_key());
            if after {
                return Some(node);
            }
            if mode == GetNxtMode::Cover {
                // an earlier-yielded route; its subtree is covered by it
                return None;
            }
        }
        node.left
            .as_deref()
            .and_then(|n| Self::next_below(n, base, last, mode))
            .or_else(|| {
                node.right
                    .as_deref()
                    .and_then(|n| Self::next_below(n, base, last, mode))
            })
    }

    /// Iterates over the more specifics of `base` by repeated `get_nxt`
    /// calls.
    pub fn more_specifics(
        &self,
        base: PrefixId,
        mode: GetNxtMode,
    ) -> MoreSpecificsIter<'_> {
        MoreSpecificsIter {
            rib: self,
            base,
            mode,
            cursor: None,
            done: false,
        }
    }

    /// Iterates over all routes in ascending address order.
    pub fn prefixes_iter(&self) -> PrefixesIter<'_> {
        PrefixesIter {
            stack: self.root.as_deref().into_iter().collect(),
        }
    }
}

//------------ Iterators -----------------------------------------------------

/// Iterator over the more-specific routes of a base prefix. Returned by
/// [Rib6::more_specifics].
pub struct MoreSpecificsIter<'a> {
    rib: &'a Rib6,
    base: PrefixId,
    mode: GetNxtMode,
    cursor: Option<PrefixId>,
    done: bool,
}

impl<'a> Iterator for MoreSpecificsIter<'a> {
    type Item = &'a RibNode;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.rib.get_nxt(self.base, self.cursor, self.mode) {
            Some(node) => {
                self.cursor = Some(node.prefix());
                Some(node)
            }
            None => {
                self.done = true;
                None
            }
        }
    }
}

/// Iterator over all routes in a RIB. Returned by [Rib6::prefixes_iter].
pub struct PrefixesIter<'a> {
    stack: Vec<&'a RibNode>,
}

impl<'a> Iterator for PrefixesIter<'a> {
    type Item = &'a RibNode;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(node) = self.stack.pop() {
            if let Some(right) = node.right.as_deref() {
                self.stack.push(right);
            }
            if let Some(left) = node.left.as_deref() {
                self.stack.push(left);
            }
            if node.valid {
                return Some(node);
            }
        }
        None
    }
}
