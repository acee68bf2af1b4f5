//! Software IPv4 router over a simulated multi-interface link layer:
//! longest-prefix-match forwarding, ARP resolution with deferred
//! transmission, and locally generated ICMP replies.

pub mod arp;
pub mod engine;
pub mod link;
pub mod packet;
pub mod pending;
pub mod route;
pub mod sim;

pub use arp::{ArpCache, Neighbor};
pub use engine::{Disposition, Router};
pub use link::LinkLayer;
pub use pending::{PendingPacket, WaitQueue};
pub use route::{NextHop, RouteTable, load_rtable, read_rtable};
pub use sim::{SimIface, SimNet};

mod tests;
