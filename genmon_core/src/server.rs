//! TCP command server.
//!
//! One accept loop plus one thread per connection. A client gets a one-line
//! greeting, then every chunk it sends is run as a command and answered with
//! a reply ending in `EndOfMessage`. The server holds the [`Monitor`], not a
//! device, so it keeps serving across reloads.

use crate::orchestrator::Monitor;
use crate::worker::{Worker, stopped};
use eyre::WrapErr;
use std::io::{self, ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

const CLIENT_TIMEOUT: Duration = Duration::from_secs(2);
const ACCEPT_POLL: Duration = Duration::from_millis(100);
const CHUNK: usize = 1024;

pub struct CommandServer {
    addr: SocketAddr,
    _accept: Worker,
}

impl CommandServer {
    pub fn bind(monitor: Arc<Monitor>, host: &str, port: u16) -> eyre::Result<Self> {
        let listener = TcpListener::bind((host, port))
            .wrap_err_with(|| format!("bind command server on {host}:{port}"))?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;
        let accept = Worker::spawn("server", move |stop| accept_loop(&listener, &monitor, &stop))?;
        tracing::info!(%addr, "command server listening");
        Ok(Self {
            addr,
            _accept: accept,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }
}

fn accept_loop(listener: &TcpListener, monitor: &Arc<Monitor>, stop: &AtomicBool) {
    let mut clients: Vec<Worker> = Vec::new();
    while !stopped(stop) {
        match listener.accept() {
            Ok((stream, peer)) => {
                clients.retain(Worker::is_alive);
                tracing::debug!(%peer, "client connected");
                let m = monitor.clone();
                match Worker::spawn("client", move |stop| serve_client(stream, peer, &m, &stop)) {
                    Ok(w) => clients.push(w),
                    Err(e) => tracing::error!(%peer, error = %e, "spawn client thread"),
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => std::thread::sleep(ACCEPT_POLL),
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
                std::thread::sleep(ACCEPT_POLL);
            }
        }
    }
    tracing::debug!(clients = clients.len(), "command server stopping");
}

fn serve_client(mut stream: TcpStream, peer: SocketAddr, monitor: &Monitor, stop: &AtomicBool) {
    match session(&mut stream, monitor, stop) {
        Ok(()) => tracing::debug!(%peer, "client disconnected"),
        Err(e) => tracing::debug!(%peer, error = %e, "client session ended"),
    }
}

fn session(stream: &mut TcpStream, monitor: &Monitor, stop: &AtomicBool) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(CLIENT_TIMEOUT))?;
    stream.write_all(monitor.greeting().as_bytes())?;

    let mut buf = [0u8; CHUNK];
    while !stopped(stop) {
        let n = match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => continue,
            Err(e) => return Err(e),
        };
        let command = String::from_utf8_lossy(&buf[..n]);
        let reply = monitor.process_command(command.trim(), true);
        stream.write_all(reply.as_bytes())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::NullNotifier;
    use genmon_config::Config;
    use genmon_hardware::SimulatedController;
    use genmon_traits::{MonotonicClock, Transport};

    fn read_reply(stream: &mut TcpStream) -> String {
        let mut out = String::new();
        let mut buf = [0u8; CHUNK];
        while !out.ends_with("EndOfMessage") {
            let n = stream.read(&mut buf).unwrap();
            assert!(n > 0, "connection closed mid-reply: {out}");
            out.push_str(&String::from_utf8_lossy(&buf[..n]));
        }
        out
    }

    #[test]
    fn greeting_then_sentinel_replies() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = Config::default();
        cfg.site.name = "Shed".to_string();
        cfg.paths.feedback_file = dir.path().join("feedback.json");
        cfg.paths.outage_log = None;
        let monitor = Monitor::start(
            cfg.clone(),
            Box::new(|_: &Config| -> eyre::Result<Box<dyn Transport>> {
                Ok(Box::new(SimulatedController::preset(0x0c)))
            }),
            Box::new(move || -> eyre::Result<Config> { Ok(cfg.clone()) }),
            Arc::new(NullNotifier),
            Arc::new(MonotonicClock::new()),
        )
        .unwrap();
        let server = CommandServer::bind(monitor.clone(), "127.0.0.1", 0).unwrap();

        let mut stream = TcpStream::connect(server.local_addr()).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let mut buf = [0u8; CHUNK];
        let n = stream.read(&mut buf).unwrap();
        let greeting = String::from_utf8_lossy(&buf[..n]).to_string();
        assert!(
            greeting.starts_with("OK ") || greeting.starts_with("WARNING: "),
            "{greeting}"
        );

        stream.write_all(b"generator: getsitename").unwrap();
        assert_eq!(read_reply(&mut stream), "ShedEndOfMessage");

        stream.write_all(b"status").unwrap();
        assert!(read_reply(&mut stream).starts_with("Invalid GENERATOR command: all commands"));

        drop(stream);
        drop(server);
        monitor.shutdown();
    }
}
