//! An IPv6 longest-prefix-match store.
//!
//! The store pairs a RIB, the authoritative set of routes kept in a
//! binary radix tree, with a DIR-24-8 dataplane trie that resolves any
//! address to its next-hop in a handful of loads. Updates go through the
//! [Fib6] facade, which keeps the two sides in agreement; lookups read
//! the dataplane only.

pub mod fib;
pub mod rib;
pub(crate) mod trie;
pub mod types;

pub use crate::fib::config::{Config, NhSize};
pub use crate::fib::{Fib6, FibOp, LookupFn, LookupType, MAX_DEPTH};
pub use crate::rib::{GetNxtMode, Rib6, RibNode};
pub use crate::types::errors::FibError;
pub use crate::types::prefix_id::PrefixId;
pub use crate::types::stats::TrieStats;
