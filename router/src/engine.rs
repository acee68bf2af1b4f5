//
// engine.rs - IPv4 Forwarding Engine
//
// Purpose:
//   This module is the per-packet state machine of the router. It classifies received
//   frames, forwards IPv4 datagrams toward their next hop, answers packets addressed to
//   the router itself, and parks traffic whose next-hop MAC is still unresolved.
//
// How it works:
//   - A single receive loop pulls one frame at a time from the link layer into a scratch
//     buffer local to the iteration and dispatches on the EtherType.
//   - The IPv4 path validates the header checksum, tries local delivery, runs a
//     longest-prefix-match route lookup, enforces the TTL, rewrites TTL and checksum
//     incrementally, and either transmits (MAC cached) or enqueues the frame and
//     broadcasts an ARP request for the next hop.
//   - The ARP path answers requests for the router's addresses and, on replies, caches
//     the sender's MAC and releases every waiting packet for that hop in FIFO order.
//   - ICMP echo replies, destination-unreachable and time-exceeded errors are built in
//     place by rewriting the scratch buffer.
//
// Main components:
//   - Router: route table, neighbor cache, wait queue and link layer behind one value.
//   - Disposition: the terminal state of one handled frame, for logging and tests.
//

use crate::arp::ArpCache;
use crate::link::LinkLayer;
use crate::packet::{
    ARP_HLEN, ARP_HTYPE_ETHERNET, ARP_OP_REPLY, ARP_OP_REQUEST, ArpHdr, BROADCAST_MAC, ETH_HLEN,
    ETHERTYPE_ARP, ETHERTYPE_IPV4, EthHdr, ICMP_DEST_UNREACH, ICMP_ECHO_REPLY, ICMP_HLEN,
    ICMP_TIME_EXCEEDED, IPPROTO_ICMP, IPV4_HLEN, IcmpHdr, Ipv4Hdr, MAC_LEN, MAX_FRAME_LEN,
    ttl_decrement_check,
};
use crate::pending::{PendingPacket, WaitQueue};
use crate::route::RouteTable;
use std::io;
use std::net::Ipv4Addr;

/// Terminal state of one received frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// Rewritten and emitted toward its next hop.
    Forwarded,
    /// Parked until an ARP reply resolves the next hop; a broadcast ARP
    /// request went out in its place.
    AwaitingArp,
    /// Answered locally: ICMP echo reply or ARP reply.
    Replied,
    /// No route matched; ICMP destination-unreachable went back.
    NoRoute,
    /// TTL exhausted; ICMP time-exceeded went back.
    TtlExpired,
    /// An ARP reply folded into the neighbor cache.
    Absorbed,
    /// Nothing was emitted.
    Dropped,
}

/// Per-iteration scratch: the frame being processed and where it arrived.
/// Rebuilt at the top of every loop iteration.
struct Scratch {
    buf: [u8; MAX_FRAME_LEN],
    len: usize,
    iface: usize,
}

impl Scratch {
    fn empty() -> Self {
        Scratch {
            buf: [0; MAX_FRAME_LEN],
            len: 0,
            iface: 0,
        }
    }

    fn frame(&mut self) -> &mut [u8] {
        &mut self.buf[..self.len]
    }

    fn bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

/// The router: static routes, learned neighbors, packets awaiting
/// resolution, and the link layer carrying its frames.
pub struct Router<L> {
    link: L,
    routes: RouteTable,
    neighbors: ArpCache,
    waiting: WaitQueue,
}

impl<L: LinkLayer> Router<L> {
    pub fn new(link: L, routes: RouteTable) -> Self {
        Router {
            link,
            routes,
            neighbors: ArpCache::new(),
            waiting: WaitQueue::new(),
        }
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn neighbors(&self) -> &ArpCache {
        &self.neighbors
    }

    pub fn neighbors_mut(&mut self) -> &mut ArpCache {
        &mut self.neighbors
    }

    pub fn waiting(&self) -> &WaitQueue {
        &self.waiting
    }

    /// Runs the receive loop until the link layer fails, then returns the
    /// failure. Everything else is handled within one iteration.
    pub fn run(&mut self) -> io::Error {
        loop {
            if let Err(e) = self.step() {
                return e;
            }
        }
    }

    /// One receive-dispatch iteration.
    pub fn step(&mut self) -> io::Result<Disposition> {
        let mut pkt = Scratch::empty();
        let (iface, len) = self.link.recv_frame(&mut pkt.buf)?;
        pkt.iface = iface;
        pkt.len = len;
        Ok(self.dispatch(&mut pkt))
    }

    /// Feeds one frame through the engine as if it had been received on
    /// `iface`.
    pub fn handle_frame(&mut self, iface: usize, frame: &[u8]) -> Disposition {
        if frame.len() > MAX_FRAME_LEN {
            log::debug!("iface {iface}: frame of {} bytes is oversized, dropping", frame.len());
            return Disposition::Dropped;
        }
        let mut pkt = Scratch::empty();
        pkt.buf[..frame.len()].copy_from_slice(frame);
        pkt.len = frame.len();
        pkt.iface = iface;
        self.dispatch(&mut pkt)
    }

    fn dispatch(&mut self, pkt: &mut Scratch) -> Disposition {
        if pkt.len < ETH_HLEN {
            log::debug!("iface {}: runt frame of {} bytes, dropping", pkt.iface, pkt.len);
            return Disposition::Dropped;
        }
        let ethertype = EthHdr::of(pkt.frame()).ethertype();
        match ethertype {
            ETHERTYPE_IPV4 => self.handle_ipv4(pkt),
            ETHERTYPE_ARP => self.handle_arp(pkt),
            other => {
                log::debug!("iface {}: unhandled ethertype {other:#06x}, dropping", pkt.iface);
                Disposition::Dropped
            }
        }
    }

    fn handle_ipv4(&mut self, pkt: &mut Scratch) -> Disposition {
        if pkt.len < ETH_HLEN + IPV4_HLEN {
            log::debug!("iface {}: truncated ipv4 frame, dropping", pkt.iface);
            return Disposition::Dropped;
        }
        let (Some(local_mac), Some(local_ip)) =
            (self.link.mac_of(pkt.iface), self.link.ipv4_of(pkt.iface))
        else {
            log::debug!("iface {} has no addresses, dropping", pkt.iface);
            return Disposition::Dropped;
        };

        let (dst, ttl) = {
            let mut ip = Ipv4Hdr::of(pkt.frame());
            if !ip.valid_check() {
                log::debug!("iface {}: bad ipv4 header checksum, dropping", pkt.iface);
                return Disposition::Dropped;
            }
            (ip.dst(), ip.ttl())
        };

        if dst == local_ip {
            Self::icmp_reply(pkt, ICMP_ECHO_REPLY, local_mac, local_ip);
            self.transmit(pkt.iface, pkt.bytes());
            return Disposition::Replied;
        }

        let Some(route) = self.routes.lookup(dst) else {
            Self::icmp_reply(pkt, ICMP_DEST_UNREACH, local_mac, local_ip);
            self.transmit(pkt.iface, pkt.bytes());
            return Disposition::NoRoute;
        };

        if ttl <= 1 {
            Self::icmp_reply(pkt, ICMP_TIME_EXCEEDED, local_mac, local_ip);
            self.transmit(pkt.iface, pkt.bytes());
            return Disposition::TtlExpired;
        }

        let (Some(out_mac), Some(out_ip)) =
            (self.link.mac_of(route.iface), self.link.ipv4_of(route.iface))
        else {
            log::debug!("route to {dst} leaves on unknown interface {}, dropping", route.iface);
            return Disposition::Dropped;
        };

        {
            let mut ip = Ipv4Hdr::of(pkt.frame());
            let old_check = ip.check();
            ip.set_check(ttl_decrement_check(old_check, ttl));
            ip.set_ttl(ttl - 1);
        }

        match self.neighbors.lookup(route.gateway) {
            Some(mac) => {
                let mut eth = EthHdr::of(pkt.frame());
                eth.set_dst(&mac);
                eth.set_src(&out_mac);
                self.transmit(route.iface, pkt.bytes());
                Disposition::Forwarded
            }
            None => {
                self.waiting.push(PendingPacket {
                    frame: pkt.bytes().to_vec(),
                    iface: route.iface,
                    hop: route.gateway,
                });
                Self::arp_request(pkt, out_mac, out_ip, route.gateway);
                self.transmit(route.iface, pkt.bytes());
                log::debug!("next hop {} unresolved, packet parked", route.gateway);
                Disposition::AwaitingArp
            }
        }
    }

    fn handle_arp(&mut self, pkt: &mut Scratch) -> Disposition {
        if pkt.len < ETH_HLEN + ARP_HLEN {
            log::debug!("iface {}: truncated arp frame, dropping", pkt.iface);
            return Disposition::Dropped;
        }
        let (Some(local_mac), Some(local_ip)) =
            (self.link.mac_of(pkt.iface), self.link.ipv4_of(pkt.iface))
        else {
            log::debug!("iface {} has no addresses, dropping", pkt.iface);
            return Disposition::Dropped;
        };

        let (op, sender_mac, sender_ip) = {
            let arp = ArpHdr::of(pkt.frame());
            (arp.op(), arp.sha(), arp.spa())
        };

        match op {
            ARP_OP_REQUEST => {
                {
                    let mut arp = ArpHdr::of(pkt.frame());
                    arp.set_op(ARP_OP_REPLY);
                    arp.set_tha(&sender_mac);
                    arp.set_tpa(sender_ip);
                    arp.set_sha(&local_mac);
                    arp.set_spa(local_ip);
                }
                {
                    let mut eth = EthHdr::of(pkt.frame());
                    let requester = eth.src();
                    eth.set_dst(&requester);
                    eth.set_src(&local_mac);
                }
                self.transmit(pkt.iface, pkt.bytes());
                Disposition::Replied
            }
            ARP_OP_REPLY => {
                self.neighbors.insert(sender_ip, sender_mac);
                let ready = self.waiting.take_for(sender_ip);
                if !ready.is_empty() {
                    log::debug!(
                        "arp reply from {sender_ip} releases {} waiting packet(s)",
                        ready.len()
                    );
                }
                for mut packet in ready {
                    {
                        let mut eth = EthHdr::of(&mut packet.frame);
                        eth.set_ethertype(ETHERTYPE_IPV4);
                        eth.set_dst(&sender_mac);
                        if let Some(mac) = self.link.mac_of(packet.iface) {
                            eth.set_src(&mac);
                        }
                    }
                    self.transmit(packet.iface, &packet.frame);
                }
                Disposition::Absorbed
            }
            other => {
                log::debug!("iface {}: arp op {other} is neither request nor reply, dropping", pkt.iface);
                Disposition::Dropped
            }
        }
    }

    /// Rewrites the scratch frame into an ICMP reply to its original
    /// source. Error types quote the offending IPv4 header and the 8 bytes
    /// following it, per RFC 792; the echo reply keeps the request's
    /// identifier and sequence words in place.
    fn icmp_reply(pkt: &mut Scratch, kind: u8, src_mac: [u8; MAC_LEN], src_ip: Ipv4Addr) {
        let mut len = ETH_HLEN + IPV4_HLEN + ICMP_HLEN;
        let is_error = kind == ICMP_DEST_UNREACH || kind == ICMP_TIME_EXCEEDED;

        if is_error {
            pkt.buf.copy_within(ETH_HLEN..ETH_HLEN + IPV4_HLEN + 8, len);
            len += IPV4_HLEN + 8;
        }

        {
            let mut icmp = IcmpHdr::of(&mut pkt.buf);
            icmp.set_icmp_type(kind);
            icmp.set_code(0);
            icmp.fill_check();
        }
        {
            let mut ip = Ipv4Hdr::of(&mut pkt.buf);
            let orig_src = ip.src();
            ip.set_version_ihl(0x45);
            ip.set_tos(0);
            let mut total = (IPV4_HLEN + ICMP_HLEN) as u16;
            if is_error {
                total += (IPV4_HLEN + 8) as u16;
            }
            ip.set_total_len(total);
            ip.set_id(1);
            ip.set_frag(0);
            ip.set_ttl(64);
            ip.set_protocol(IPPROTO_ICMP);
            ip.set_dst(orig_src);
            ip.set_src(src_ip);
            ip.fill_check();
        }
        {
            let mut eth = EthHdr::of(&mut pkt.buf);
            let requester = eth.src();
            eth.set_dst(&requester);
            eth.set_src(&src_mac);
        }
        pkt.len = len;
    }

    /// Overwrites the scratch frame with a broadcast ARP request for `hop`,
    /// sourced from the outbound interface's addresses.
    fn arp_request(pkt: &mut Scratch, src_mac: [u8; MAC_LEN], src_ip: Ipv4Addr, hop: Ipv4Addr) {
        {
            let mut eth = EthHdr::of(&mut pkt.buf);
            eth.set_dst(&BROADCAST_MAC);
            eth.set_src(&src_mac);
            eth.set_ethertype(ETHERTYPE_ARP);
        }
        {
            let mut arp = ArpHdr::of(&mut pkt.buf);
            arp.set_htype(ARP_HTYPE_ETHERNET);
            arp.set_ptype(ETHERTYPE_IPV4);
            arp.set_hlen(MAC_LEN as u8);
            arp.set_plen(4);
            arp.set_op(ARP_OP_REQUEST);
            arp.set_sha(&src_mac);
            arp.set_spa(src_ip);
            arp.set_tha(&[0; MAC_LEN]);
            arp.set_tpa(hop);
        }
        pkt.len = ETH_HLEN + ARP_HLEN;
    }

    fn transmit(&mut self, iface: usize, frame: &[u8]) {
        if let Err(e) = self.link.send_frame(iface, frame) {
            log::warn!("send on interface {iface} failed: {e}");
        }
    }
}
