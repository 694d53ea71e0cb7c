mod protocol;
mod server;

pub use protocol::{encode, read_message, DapMessage, DapMessageContent};
pub use server::{DapServer, DapWriter};

use std::io;
use tracing::info;

pub fn run_dap_mode() -> io::Result<()> {
    info!("DAP server starting");
    let mut server = DapServer::new(io::stdout());
    server.serve(io::stdin().lock())?;
    info!("DAP server exiting");
    Ok(())
}
