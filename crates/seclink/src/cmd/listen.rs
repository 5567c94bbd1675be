use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use seclink_peer::{Handshake, Instruction, Link, LinkHandler, Receiver};
use seclink_transport::{NetStream, TcpEndpoint};
use tracing::{info, warn};

use crate::cmd::ListenArgs;
use crate::exit::{transport_error, CliError, CliResult, INTERNAL, SUCCESS};

pub fn run(args: ListenArgs) -> CliResult<i32> {
    let endpoint = TcpEndpoint::bind(&args.addr).map_err(|err| transport_error("bind failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    while running.load(Ordering::SeqCst) {
        let stream = match endpoint.accept() {
            Ok(stream) => stream,
            Err(err) => return Err(transport_error("accept failed", err)),
        };
        thread::spawn(move || serve(stream));
    }

    Ok(SUCCESS)
}

/// One thread per link: negotiate on demand, echo application traffic.
fn serve(stream: NetStream) {
    let peer = stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "<unknown>".into());
    info!(%peer, "link opened");

    match Link::over(stream) {
        Ok((link, reader)) => {
            let handler = Echo { peer: peer.clone() };
            let mut receiver = Receiver::new(reader, link, Handshake::new(), handler);
            if let Err(err) = receiver.run() {
                warn!(%peer, %err, "link ended with error");
            }
        }
        Err(err) => warn!(%peer, %err, "link setup failed"),
    }
}

struct Echo {
    peer: String,
}

impl LinkHandler<NetStream> for Echo {
    fn handle(&mut self, instruction: Instruction, link: &Arc<Link<NetStream>>) {
        let reply = match instruction {
            Instruction::Message(text) => {
                println!("{}: {text}", self.peer);
                Instruction::Message(text)
            }
            Instruction::Blob(bytes) => {
                println!("{}: <{} binary bytes>", self.peer, bytes.len());
                Instruction::Blob(bytes)
            }
            other => {
                warn!(peer = %self.peer, ?other, "unhandled instruction");
                return;
            }
        };
        if let Err(err) = link.transmit(&reply) {
            warn!(peer = %self.peer, %err, "echo failed");
        }
    }

    fn connection_lost(&mut self, _link: &Arc<Link<NetStream>>) {
        info!(peer = %self.peer, "link closed");
    }
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
