use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use seclink_peer::{Handshake, Instruction, Link, Receiver};
use seclink_transport::{NetStream, TcpEndpoint};

use crate::cmd::SendArgs;
use crate::exit::{link_error, transport_error, CliError, CliResult, SUCCESS, TIMEOUT, USAGE};

pub fn run(args: SendArgs) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;

    let stream =
        TcpEndpoint::connect(&args.addr).map_err(|err| transport_error("connect failed", err))?;
    let (link, reader) =
        Link::over(stream).map_err(|err| link_error("socket setup failed", err))?;
    let control = reader
        .try_clone()
        .map_err(|err| transport_error("socket setup failed", err))?;

    let mut handshake = Handshake::new();
    handshake
        .initiate(&link)
        .map_err(|err| link_error("key exchange failed", err))?;

    let (tx, rx) = mpsc::channel();
    let receiver_link = Arc::clone(&link);
    let worker = thread::spawn(move || {
        let mut receiver = Receiver::new(reader, receiver_link, handshake, Forward(tx));
        // Shutdown from the main thread surfaces as an error here.
        let _ = receiver.run();
    });

    let result = exchange(&args, &link, &rx, timeout);

    let _ = control.shutdown();
    let _ = worker.join();
    result
}

fn exchange(
    args: &SendArgs,
    link: &Arc<Link<NetStream>>,
    rx: &mpsc::Receiver<Instruction>,
    timeout: Duration,
) -> CliResult<i32> {
    if !link.wait_until_encrypted(timeout) {
        return Err(CliError::new(TIMEOUT, "key exchange timed out"));
    }

    link.transmit(&Instruction::Message(args.message.clone()))
        .map_err(|err| link_error("send failed", err))?;

    if args.wait {
        match rx.recv_timeout(timeout) {
            Ok(Instruction::Message(text)) => println!("{text}"),
            Ok(other) => println!("{other:?}"),
            Err(_) => return Err(CliError::new(TIMEOUT, "no reply before timeout")),
        }
    }

    Ok(SUCCESS)
}

struct Forward(mpsc::Sender<Instruction>);

impl seclink_peer::LinkHandler<NetStream> for Forward {
    fn handle(&mut self, instruction: Instruction, _link: &Arc<Link<NetStream>>) {
        // The main thread may already have what it wanted and hung up.
        let _ = self.0.send(instruction);
    }
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }
}
