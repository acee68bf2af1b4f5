//
// uds.rs - Unix-Datagram Link Layer
//
// Purpose:
//   Carries the router's frames over unix datagram sockets so the simulation can be
//   driven by external processes: one socket per interface, one datagram per frame.
//
// How it works:
//   - Each interface binds the socket path from its descriptor; frames the router
//     emits are sent to `<path>.peer`, which the driving harness binds.
//   - One reader thread per socket forwards incoming datagrams into a single mpsc
//     channel, which keeps the engine's receive path one blocking call.
//   - A socket error stops its reader; once every reader is gone the channel closes
//     and the receive call reports the fatal link failure.
//
// Main components:
//   - UdsLink: the LinkLayer implementation over the socket set.
//

use crate::iface::IfaceSpec;
use router::LinkLayer;
use router::packet::MAX_FRAME_LEN;
use std::io;
use std::net::Ipv4Addr;
use std::os::unix::net::UnixDatagram;
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;

struct Port {
    sock: UnixDatagram,
    peer: PathBuf,
    mac: [u8; 6],
    ip: Ipv4Addr,
}

pub struct UdsLink {
    ports: Vec<Port>,
    rx: mpsc::Receiver<(usize, Vec<u8>)>,
}

impl UdsLink {
    /// Binds one datagram socket per descriptor and starts the reader
    /// threads feeding the receive channel.
    pub fn open(specs: &[IfaceSpec]) -> io::Result<UdsLink> {
        let (tx, rx) = mpsc::channel();
        let mut ports = Vec::with_capacity(specs.len());
        for (idx, spec) in specs.iter().enumerate() {
            let _ = std::fs::remove_file(&spec.path);
            let sock = UnixDatagram::bind(&spec.path)?;
            let reader = sock.try_clone()?;
            let tx = tx.clone();
            thread::Builder::new()
                .name(format!("link-rx-{idx}"))
                .spawn(move || {
                    let mut buf = [0u8; MAX_FRAME_LEN];
                    loop {
                        match reader.recv(&mut buf) {
                            Ok(n) => {
                                if tx.send((idx, buf[..n].to_vec())).is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                log::error!("receive on interface {idx} failed: {e}");
                                break;
                            }
                        }
                    }
                })?;
            let mut peer = spec.path.clone().into_os_string();
            peer.push(".peer");
            log::info!(
                "interface {idx}: {} ({}, {:02x?})",
                spec.path.display(),
                spec.ip,
                spec.mac
            );
            ports.push(Port {
                sock,
                peer: PathBuf::from(peer),
                mac: spec.mac,
                ip: spec.ip,
            });
        }
        Ok(UdsLink { ports, rx })
    }
}

impl LinkLayer for UdsLink {
    fn recv_frame(&mut self, buf: &mut [u8]) -> io::Result<(usize, usize)> {
        let (iface, frame) = self.rx.recv().map_err(|_| {
            io::Error::new(io::ErrorKind::BrokenPipe, "all link readers stopped")
        })?;
        let len = frame.len().min(buf.len());
        buf[..len].copy_from_slice(&frame[..len]);
        Ok((iface, len))
    }

    fn send_frame(&mut self, iface: usize, frame: &[u8]) -> io::Result<()> {
        let port = self
            .ports
            .get(iface)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such interface"))?;
        port.sock.send_to(frame, &port.peer).map(|_| ())
    }

    fn mac_of(&self, iface: usize) -> Option<[u8; 6]> {
        self.ports.get(iface).map(|p| p.mac)
    }

    fn ipv4_of(&self, iface: usize) -> Option<Ipv4Addr> {
        self.ports.get(iface).map(|p| p.ip)
    }
}
