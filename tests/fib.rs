use std::error::Error;
use std::net::Ipv6Addr;

use fib6_store::{Config, Fib6, FibError, FibOp, LookupType, NhSize};

fn addr(s: &str) -> Ipv6Addr {
    s.parse().unwrap()
}

fn small_fib(name: &str, num_tbl8: u32) -> Result<Fib6, FibError> {
    Fib6::new(
        name,
        Config {
            default_nh: 0,
            nh_sz: NhSize::B4,
            num_tbl8,
        },
    )
}

#[test]
fn end_to_end() -> Result<(), Box<dyn Error>> {
    let mut fib = small_fib("e2e", 256)?;

    fib.add(addr("::"), 0, 7)?;
    assert_eq!(fib.lookup(addr("2001::1")), 7);
    assert_eq!(fib.lookup(addr("::")), 7);
    assert_eq!(fib.stats().rsvd_tbl8s, 0);

    fib.add(addr("2001:db8::"), 32, 11)?;
    assert_eq!(fib.lookup(addr("2001:db8::1")), 11);
    assert_eq!(fib.lookup(addr("2001:db9::1")), 7);
    assert_eq!(fib.stats().rsvd_tbl8s, 1);

    fib.add(addr("2001:db8:1::"), 48, 22)?;
    assert_eq!(fib.lookup(addr("2001:db8:1::5")), 22);
    assert_eq!(fib.lookup(addr("2001:db8:2::5")), 11);
    assert_eq!(fib.stats().rsvd_tbl8s, 3);
    // the reservation matches what is actually allocated here
    assert_eq!(fib.stats().in_use_tbl8s, 3);

    fib.del(addr("2001:db8:1::"), 48)?;
    assert_eq!(fib.lookup(addr("2001:db8:1::5")), 11);
    assert_eq!(fib.lookup(addr("2001:db8::1")), 11);
    assert_eq!(fib.stats().rsvd_tbl8s, 1);

    // re-adding a route with its present next-hop changes nothing
    let stats = fib.stats();
    fib.add(addr("2001:db8::"), 32, 11)?;
    assert_eq!(fib.stats(), stats);

    fib.add(addr("::"), 128, 5)?;
    assert_eq!(fib.lookup(addr("::")), 5);
    assert_eq!(fib.lookup(addr("::1")), 7);
    assert_eq!(fib.stats().rsvd_tbl8s, 14);
    assert_eq!(fib.stats().in_use_tbl8s, 14);

    Ok(())
}

#[test]
fn default_route_add_covers_whole_table() -> Result<(), Box<dyn Error>> {
    let mut fib = small_fib("b1", 16)?;
    fib.add(addr("::"), 0, 3)?;
    for probe in
        ["::", "::1", "8000::", "abcd:ef::12", "ffff:ffff:ffff:ffff::ffff"]
    {
        assert_eq!(fib.lookup(addr(probe)), 3);
    }
    // a /0 needs no groups, not even transiently held ones
    assert_eq!(fib.stats().in_use_tbl8s, 0);
    assert_eq!(fib.stats().rsvd_tbl8s, 0);
    Ok(())
}

#[test]
fn default_route_update_respects_more_specifics(
) -> Result<(), Box<dyn Error>> {
    let mut fib = small_fib("b1b", 16)?;
    fib.add(addr("2001:db8::"), 32, 11)?;
    fib.add(addr("::"), 0, 7)?;
    assert_eq!(fib.lookup(addr("2001:db8::1")), 11);
    assert_eq!(fib.lookup(addr("2001:db7::1")), 7);
    assert_eq!(fib.lookup(addr("2001:db9::1")), 7);
    assert_eq!(fib.lookup(addr("::")), 7);
    Ok(())
}

#[test]
fn host_route() -> Result<(), Box<dyn Error>> {
    let mut fib = small_fib("b2", 32)?;
    fib.add(addr("::"), 0, 9)?;
    fib.add(addr("2001:db8::dead:beef"), 128, 1)?;
    assert_eq!(fib.lookup(addr("2001:db8::dead:beef")), 1);
    // the neighbors still resolve to the cover
    assert_eq!(fib.lookup(addr("2001:db8::dead:bee0")), 9);
    assert_eq!(fib.lookup(addr("2001:db8::dead:bef0")), 9);

    fib.del(addr("2001:db8::dead:beef"), 128)?;
    assert_eq!(fib.lookup(addr("2001:db8::dead:beef")), 9);
    assert_eq!(fib.stats().in_use_tbl8s, 0);
    Ok(())
}

#[test]
fn add_beyond_capacity_changes_nothing() -> Result<(), Box<dyn Error>> {
    let mut fib = small_fib("b3", 2)?;
    fib.add(addr("::"), 0, 7)?;
    let stats = fib.stats();

    // a /64 needs five groups, the pool has two
    assert_eq!(
        fib.add(addr("2001:db8::"), 64, 3),
        Err(FibError::NoSpace)
    );
    assert_eq!(fib.stats(), stats);
    assert_eq!(fib.rib().len(), 1);
    assert_eq!(fib.lookup(addr("2001:db8::")), 7);
    Ok(())
}

#[test]
fn narrow_entries_reject_wide_next_hops() -> Result<(), Box<dyn Error>> {
    let mut fib = Fib6::new(
        "b4",
        Config {
            default_nh: 0,
            nh_sz: NhSize::B2,
            num_tbl8: 16,
        },
    )?;
    assert_eq!(
        fib.add(addr("2001:db8::"), 32, 0x8000),
        Err(FibError::Invalid)
    );
    fib.add(addr("2001:db8::"), 32, 0x7fff)?;
    assert_eq!(fib.lookup(addr("2001:db8::1")), 0x7fff);
    Ok(())
}

#[test]
fn invalid_arguments() -> Result<(), Box<dyn Error>> {
    let mut fib = small_fib("inval", 16)?;
    assert_eq!(
        fib.add(addr("2001:db8::"), 129, 1),
        Err(FibError::Invalid)
    );
    assert_eq!(fib.del(addr("2001:db8::"), 129), Err(FibError::Invalid));
    assert_eq!(
        fib.modify(addr("2001:db8::"), 129, 1, FibOp::Add),
        Err(FibError::Invalid)
    );
    Ok(())
}

#[test]
fn del_absent_prefix() -> Result<(), Box<dyn Error>> {
    let mut fib = small_fib("p4", 16)?;
    fib.add(addr("2001:db8::"), 32, 11)?;
    let stats = fib.stats();

    assert_eq!(fib.del(addr("2001:db8::"), 33), Err(FibError::NotFound));
    assert_eq!(
        fib.del(addr("2001:db9::"), 32),
        Err(FibError::NotFound)
    );
    assert_eq!(fib.stats(), stats);
    assert_eq!(fib.lookup(addr("2001:db8::1")), 11);
    Ok(())
}

#[test]
fn add_del_restores_previous_state() -> Result<(), Box<dyn Error>> {
    let mut fib = small_fib("p2", 64)?;
    fib.add(addr("::"), 0, 7)?;
    fib.add(addr("2001:db8::"), 32, 11)?;
    fib.add(addr("2001:db8:80::"), 48, 13)?;

    let probes = [
        "::",
        "2001:db8::",
        "2001:db8:7fff::9",
        "2001:db8:80::9",
        "2001:db8:80:ffff::",
        "2001:db8:81::",
        "2001:db8:ffff::ffff",
        "ffff::",
    ];
    let before: Vec<u64> =
        probes.iter().map(|p| fib.lookup(addr(p))).collect();
    let stats = fib.stats();

    fib.add(addr("2001:db8:80:8000::"), 50, 99)?;
    fib.del(addr("2001:db8:80:8000::"), 50)?;

    let after: Vec<u64> =
        probes.iter().map(|p| fib.lookup(addr(p))).collect();
    assert_eq!(before, after);
    assert_eq!(fib.stats(), stats);
    Ok(())
}

#[test]
fn masks_the_address_to_the_depth() -> Result<(), Box<dyn Error>> {
    let mut fib = small_fib("mask", 16)?;
    // host bits below the depth are ignored on add and del
    fib.add(addr("2001:db8::ffff"), 32, 11)?;
    assert_eq!(fib.lookup(addr("2001:db8:ffff::")), 11);
    fib.del(addr("2001:db8::1"), 32)?;
    assert_eq!(fib.lookup(addr("2001:db8:ffff::")), 0);
    Ok(())
}

#[test]
fn modify_dispatches_ops() -> Result<(), Box<dyn Error>> {
    let mut fib = small_fib("ops", 16)?;
    fib.modify(addr("2001:db8::"), 32, 4, FibOp::Add)?;
    assert_eq!(fib.lookup(addr("2001:db8::1")), 4);
    // changing the next-hop of a present route rewrites in place
    fib.modify(addr("2001:db8::"), 32, 5, FibOp::Add)?;
    assert_eq!(fib.lookup(addr("2001:db8::1")), 5);
    assert_eq!(fib.rib().len(), 1);
    fib.modify(addr("2001:db8::"), 32, 0, FibOp::Del)?;
    assert_eq!(fib.lookup(addr("2001:db8::1")), 0);
    assert_eq!(fib.rib().len(), 0);
    Ok(())
}

#[test]
fn entry_widths_cover_all_sizes() -> Result<(), Box<dyn Error>> {
    for nh_sz in [NhSize::B2, NhSize::B4, NhSize::B8] {
        let mut fib = Fib6::new(
            "widths",
            Config {
                default_nh: 1,
                nh_sz,
                num_tbl8: 32,
            },
        )?;
        let nh = fib.max_nh();
        fib.add(addr("2001:db8::"), 48, nh)?;
        assert_eq!(fib.lookup(addr("2001:db8::42")), nh);
        assert_eq!(fib.lookup(addr("2001:db9::42")), 1);
    }
    Ok(())
}

#[test]
fn lookup_fn_selection() -> Result<(), Box<dyn Error>> {
    let mut fib = small_fib("kern", 16)?;
    fib.add(addr("2001:db8::"), 32, 11)?;
    fib.add(addr("::"), 0, 7)?;

    // no vectorized kernel exists on this host
    assert!(fib.lookup_fn(LookupType::Vector).is_none());

    let addrs: Vec<Ipv6Addr> = ["2001:db8::1", "2001:db9::1", "::"]
        .iter()
        .map(|s| addr(s))
        .collect();
    let mut scalar = vec![0; addrs.len()];
    fib.lookup_fn(LookupType::Scalar)
        .unwrap()
        .lookup_bulk(&addrs, &mut scalar);
    let mut default = vec![0; addrs.len()];
    fib.lookup_fn(LookupType::Default)
        .unwrap()
        .lookup_bulk(&addrs, &mut default);

    assert_eq!(scalar, vec![11, 7, 7]);
    assert_eq!(scalar, default);
    Ok(())
}
