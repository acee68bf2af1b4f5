//! Runnable harness for the router: interface descriptors and a unix
//! datagram link layer an external process can exchange frames with.

pub mod iface;
pub mod uds;

pub use iface::IfaceSpec;
pub use uds::UdsLink;
