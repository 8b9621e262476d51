mod shared;

use anyhow::Error;
use clap::Parser;
use hearth_http::HttpServer;

use crate::shared::{add_routes, ServerArgs};

/// Plain HTTP demo server.
#[derive(Parser, Debug)]
struct Cli {
    #[command(flatten)]
    server: ServerArgs,
}

fn main() -> Result<(), Error> {
    devutils::init_logging("info")?;
    let cli = Cli::parse();

    let mut server = HttpServer::bind(&cli.server.config())?;
    add_routes(&mut server)?;

    server.start()
}
