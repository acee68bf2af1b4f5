//! In-memory network used by the test suite.

use crate::link::LinkLayer;
use crate::packet::MAC_LEN;
use std::collections::VecDeque;
use std::io;
use std::net::Ipv4Addr;

/// Addresses of one simulated port.
#[derive(Clone, Copy, Debug)]
pub struct SimIface {
    pub mac: [u8; MAC_LEN],
    pub ip: Ipv4Addr,
}

/// A simulated multi-interface link layer: frames are injected into an
/// inbox ahead of time and everything the router emits is recorded, so
/// tests can assert on the exact bytes that left each interface.
pub struct SimNet {
    ifaces: Vec<SimIface>,
    inbox: VecDeque<(usize, Vec<u8>)>,
    sent: Vec<(usize, Vec<u8>)>,
}

impl SimNet {
    pub fn new(ifaces: Vec<SimIface>) -> Self {
        SimNet {
            ifaces,
            inbox: VecDeque::new(),
            sent: Vec::new(),
        }
    }

    /// Queues a frame for delivery on `iface`.
    pub fn inject(&mut self, iface: usize, frame: &[u8]) {
        self.inbox.push_back((iface, frame.to_vec()));
    }

    /// Everything sent so far, as (interface, frame) pairs.
    pub fn sent(&self) -> &[(usize, Vec<u8>)] {
        &self.sent
    }

    /// Drains the sent-frame transcript.
    pub fn take_sent(&mut self) -> Vec<(usize, Vec<u8>)> {
        std::mem::take(&mut self.sent)
    }
}

impl LinkLayer for SimNet {
    fn recv_frame(&mut self, buf: &mut [u8]) -> io::Result<(usize, usize)> {
        let (iface, frame) = self
            .inbox
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "no more frames"))?;
        let len = frame.len().min(buf.len());
        buf[..len].copy_from_slice(&frame[..len]);
        Ok((iface, len))
    }

    fn send_frame(&mut self, iface: usize, frame: &[u8]) -> io::Result<()> {
        self.sent.push((iface, frame.to_vec()));
        Ok(())
    }

    fn mac_of(&self, iface: usize) -> Option<[u8; MAC_LEN]> {
        self.ifaces.get(iface).map(|i| i.mac)
    }

    fn ipv4_of(&self, iface: usize) -> Option<Ipv4Addr> {
        self.ifaces.get(iface).map(|i| i.ip)
    }
}
