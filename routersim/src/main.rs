//
// main.rs - Router Entry Point
//
// Purpose:
//   Boots the router: parses the command line, loads the static routing table,
//   brings up the unix datagram link layer, and runs the receive loop until the
//   link layer fails.
//

use anyhow::Context as _;
use clap::Parser as _;
use router::{Router, load_rtable};
use routersim::{IfaceSpec, UdsLink};
use std::path::PathBuf;

/// Software IPv4 router over simulated links.
#[derive(Debug, clap::Parser)]
#[command(name = "routersim")]
struct Args {
    /// Static routing table, one route per line:
    /// `<prefix> <next-hop> <mask> <interface>`
    rtable: PathBuf,

    /// Interface descriptors, `SOCKET_PATH,MAC,IPV4`; the position defines
    /// the interface index
    #[arg(required = true)]
    ifaces: Vec<IfaceSpec>,
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    if let Err(e) = run(args) {
        log::error!("{e:#}");
        std::process::exit(-1);
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let routes = load_rtable(&args.rtable)
        .with_context(|| format!("loading routing table {}", args.rtable.display()))?;
    log::info!(
        "loaded {} route(s) from {}",
        routes.len(),
        args.rtable.display()
    );

    let link = UdsLink::open(&args.ifaces).context("bringing up interfaces")?;
    log::info!("router up with {} interface(s)", args.ifaces.len());

    let mut router = Router::new(link, routes);
    let err = router.run();
    Err(err).context("link layer receive failed")
}
