//! Line-oriented client for the command socket.

use eyre::WrapErr;
use genmon_core::commands::END_OF_MESSAGE;
use std::io::{self, BufRead, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

const REPLY_TIMEOUT: Duration = Duration::from_secs(30);

/// Read until the end-of-message sentinel and return the reply without it.
pub fn read_reply(stream: &mut impl Read) -> io::Result<String> {
    let mut out = String::new();
    let mut buf = [0u8; 1024];
    while !out.ends_with(END_OF_MESSAGE) {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "monitor closed the connection"));
        }
        out.push_str(&String::from_utf8_lossy(&buf[..n]));
    }
    out.truncate(out.len() - END_OF_MESSAGE.len());
    Ok(out)
}

pub struct Client {
    stream: TcpStream,
    greeting: String,
}

impl Client {
    pub fn connect(host: &str, port: u16) -> eyre::Result<Self> {
        let mut stream = TcpStream::connect((host, port))
            .wrap_err_with(|| format!("connect to monitor at {host}:{port}"))?;
        stream.set_read_timeout(Some(REPLY_TIMEOUT))?;
        let mut buf = [0u8; 1024];
        let n = stream.read(&mut buf)?;
        let greeting = String::from_utf8_lossy(&buf[..n]).into_owned();
        Ok(Self { stream, greeting })
    }

    pub fn greeting(&self) -> &str {
        &self.greeting
    }

    /// Send one command line; the `generator:` prefix is added when missing.
    pub fn send(&mut self, line: &str) -> eyre::Result<String> {
        let line = line.trim();
        let cmd = if line.to_lowercase().starts_with("generator:") {
            line.to_string()
        } else {
            format!("generator: {line}")
        };
        self.stream.write_all(cmd.as_bytes())?;
        Ok(read_reply(&mut self.stream)?)
    }
}

/// Send `commands`, or every stdin line when there are none.
pub fn run_client(host: &str, port: u16, commands: &[String]) -> eyre::Result<()> {
    let mut client = Client::connect(host, port)?;
    let mut out = io::stdout().lock();
    writeln!(out, "{}", client.greeting())?;

    if !commands.is_empty() {
        for c in commands {
            writeln!(out, "{}", client.send(c)?)?;
        }
        return Ok(());
    }

    for line in io::stdin().lock().lines() {
        let line = line?;
        match line.trim() {
            "" => continue,
            "exit" | "quit" => break,
            cmd => writeln!(out, "{}", client.send(cmd)?)?,
        }
        out.flush()?;
    }
    Ok(())
}
