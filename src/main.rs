use std::sync::Arc;

use clap::Clap;

use estuary::config::Opts;
use estuary::server;
use estuary::util;

fn main() -> anyhow::Result<()> {
    util::init_logger();

    let opts = Arc::new(Opts::parse());
    log::info!("{:?}", &opts);

    let registry = Arc::new(server::build_registry(&opts));
    smol::block_on(server::accept_loop(opts, registry))
}
