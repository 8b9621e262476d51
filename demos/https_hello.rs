mod shared;

use std::path::PathBuf;

use anyhow::Error;
use clap::Parser;
use hearth_http::HttpsServer;
use hearth_mio::net::tls;
use rustls::{Certificate, PrivateKey};
use tracing::{event, Level};

use crate::shared::{add_routes, ServerArgs};

/// HTTPS demo server.
///
/// Without a certificate and key, a self-signed certificate for localhost is generated.
#[derive(Parser, Debug)]
struct Cli {
    #[command(flatten)]
    server: ServerArgs,

    /// PEM file with the certificate chain.
    #[arg(long, requires = "key")]
    cert: Option<PathBuf>,

    /// PEM file with the private key.
    #[arg(long, requires = "cert")]
    key: Option<PathBuf>,
}

fn main() -> Result<(), Error> {
    devutils::init_logging("info")?;
    let cli = Cli::parse();

    let tls_config = match (&cli.cert, &cli.key) {
        (Some(cert), Some(key)) => tls::load_server_config(cert, key)?,
        _ => {
            event!(Level::WARN, "no certificate given, generating a self-signed one");
            let generated = rcgen::generate_simple_self_signed(vec!["localhost".into()])?;
            let certificate = Certificate(generated.serialize_der()?);
            let key = PrivateKey(generated.serialize_private_key_der());
            tls::server_config(vec![certificate], key)?
        }
    };

    let mut server = HttpsServer::bind_tls(&cli.server.config(), tls_config)?;
    add_routes(&mut server)?;

    server.start()
}
