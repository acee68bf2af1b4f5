#![cfg(test)]

use crate::pending::{PendingPacket, WaitQueue};
use std::net::Ipv4Addr;

fn packet(tag: u8, hop: Ipv4Addr) -> PendingPacket {
    PendingPacket {
        frame: vec![tag],
        iface: 1,
        hop,
    }
}

#[test]
fn drains_matching_packets_in_fifo_order() {
    let h1 = Ipv4Addr::new(10, 0, 0, 1);
    let mut queue = WaitQueue::new();
    queue.push(packet(1, h1));
    queue.push(packet(2, h1));
    queue.push(packet(3, h1));

    let ready = queue.take_for(h1);
    let tags: Vec<u8> = ready.iter().map(|p| p.frame[0]).collect();
    assert_eq!(tags, [1, 2, 3]);
    assert!(queue.is_empty());
}

#[test]
fn leaves_other_hops_queued_in_order() {
    let h1 = Ipv4Addr::new(10, 0, 0, 1);
    let h2 = Ipv4Addr::new(20, 0, 0, 1);
    let mut queue = WaitQueue::new();
    queue.push(packet(1, h1));
    queue.push(packet(2, h2));
    queue.push(packet(3, h1));
    queue.push(packet(4, h2));

    let ready = queue.take_for(h1);
    let tags: Vec<u8> = ready.iter().map(|p| p.frame[0]).collect();
    assert_eq!(tags, [1, 3]);
    assert_eq!(queue.len(), 2);

    let ready = queue.take_for(h2);
    let tags: Vec<u8> = ready.iter().map(|p| p.frame[0]).collect();
    assert_eq!(tags, [2, 4]);
    assert!(queue.is_empty());
}

#[test]
fn no_match_keeps_everything() {
    let h1 = Ipv4Addr::new(10, 0, 0, 1);
    let other = Ipv4Addr::new(9, 9, 9, 9);
    let mut queue = WaitQueue::new();
    queue.push(packet(1, h1));
    queue.push(packet(2, h1));

    assert!(queue.take_for(other).is_empty());
    assert_eq!(queue.len(), 2);

    let tags: Vec<u8> = queue.take_for(h1).iter().map(|p| p.frame[0]).collect();
    assert_eq!(tags, [1, 2]);
}

#[test]
fn pushes_after_a_drain_land_in_the_live_queue() {
    let h1 = Ipv4Addr::new(10, 0, 0, 1);
    let h2 = Ipv4Addr::new(20, 0, 0, 1);
    let mut queue = WaitQueue::new();
    queue.push(packet(1, h2));
    assert!(queue.take_for(h1).is_empty());

    queue.push(packet(2, h2));
    let tags: Vec<u8> = queue.take_for(h2).iter().map(|p| p.frame[0]).collect();
    assert_eq!(tags, [1, 2]);
}
