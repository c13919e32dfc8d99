// mirrormediad/src/daemon.rs

//! The control loop: an abstract local socket on which each connection
//! delivers one descriptor via ancillary data, one newline-terminated command
//! line, and optionally receives a textual acknowledgement. Requests are
//! served strictly one at a time.

use std::fs::File;
use std::io::{ErrorKind, IoSliceMut, Read, Write};
use std::mem::MaybeUninit;
use std::os::fd::OwnedFd;
use std::os::unix::net::{UnixListener, UnixStream};
use std::process;

use anyhow::{Context, Result, bail};
use rustix::net::{
    AddressFamily, RecvAncillaryBuffer, RecvAncillaryMessage, RecvFlags, SocketAddrUnix,
    SocketFlags, SocketType, bind, listen, recvmsg, socket_with,
};

use crate::config::Config;
use crate::defs;
use crate::raw;
use crate::smsdb;
use crate::zip;

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Zip { src: String },
    Unzip { dst: String, uid: u32 },
    Dump { src: String },
    PutRaw { dst: String, uid: u32 },
    BackupSmsDb,
    RestoreSmsDb,
}

impl Command {
    pub fn parse(line: &str) -> Result<Self> {
        let mut tokens = line.split_whitespace();
        let verb = tokens.next().context("empty command line")?;
        match verb {
            "ZIP" => Ok(Self::Zip {
                src: tokens.next().context("ZIP: missing source path")?.to_string(),
            }),
            "DUMP" => Ok(Self::Dump {
                src: tokens.next().context("DUMP: missing source path")?.to_string(),
            }),
            "UNZIP" => {
                let dst = tokens.next().context("UNZIP: missing destination")?.to_string();
                let uid = parse_uid(tokens)?;
                Ok(Self::Unzip { dst, uid })
            }
            "PUTRAW" => {
                let dst = tokens.next().context("PUTRAW: missing destination")?.to_string();
                let uid = parse_uid(tokens)?;
                Ok(Self::PutRaw { dst, uid })
            }
            "BACKUP_SMS_DB" => Ok(Self::BackupSmsDb),
            "RESTORE_SMS_DB" => Ok(Self::RestoreSmsDb),
            other => bail!("unknown verb {other:?}"),
        }
    }

    /// ZIP and BACKUP_SMS_DB clients read the stream to completion instead of
    /// waiting for a status line.
    fn needs_ack(&self) -> bool {
        !matches!(self, Self::Zip { .. } | Self::BackupSmsDb)
    }
}

fn parse_uid<'a>(mut tokens: impl Iterator<Item = &'a str>) -> Result<u32> {
    while let Some(token) = tokens.next() {
        if token == "UID" {
            return tokens
                .next()
                .context("UID: missing value")?
                .parse()
                .context("UID: not a number");
        }
    }
    bail!("missing UID argument")
}

/// Binds the control socket and serves forever. Startup failures use the
/// fixed exit codes the host init system distinguishes.
pub fn run(config: &Config) -> ! {
    let sock = match socket_with(
        AddressFamily::UNIX,
        SocketType::STREAM,
        SocketFlags::CLOEXEC,
        None,
    ) {
        Ok(sock) => sock,
        Err(e) => {
            log::error!("socket failed: {e}");
            process::exit(1);
        }
    };

    let addr = match SocketAddrUnix::new_abstract_name(config.socket_name.as_bytes()) {
        Ok(addr) => addr,
        Err(e) => {
            log::error!("abstract name {:?} rejected: {e}", config.socket_name);
            process::exit(2);
        }
    };
    if let Err(e) = bind(&sock, &addr) {
        log::error!("bind failed: {e}");
        process::exit(2);
    }
    if let Err(e) = listen(&sock, defs::SOCKET_BACKLOG) {
        log::error!("listen failed: {e}");
        process::exit(3);
    }

    let listener = UnixListener::from(sock);
    log::info!("listening on @{}", config.socket_name);

    loop {
        let control = match listener.accept() {
            Ok((stream, _)) => stream,
            Err(e) => {
                log::warn!("accept failed: {e}");
                continue;
            }
        };
        handle_connection(control, config);
    }
}

fn handle_connection(mut control: UnixStream, config: &Config) {
    let io_fd = match recv_fd(&control) {
        Ok(fd) => fd,
        Err(e) => {
            log::warn!("{e:#}");
            return;
        }
    };

    let line = match recv_line(&mut control) {
        Ok(line) => line,
        Err(e) => {
            log::warn!("reading command line failed: {e:#}");
            return;
        }
    };
    log::info!("received cmd: {line:?}");

    let command = match Command::parse(&line) {
        Ok(command) => command,
        Err(e) => {
            log::warn!("{e:#}");
            return;
        }
    };

    let mut io = File::from(io_fd);
    let result = dispatch(&command, &mut io, config);
    // Release the data descriptor before acknowledging, so the peer sees EOF
    // no later than the status line.
    drop(io);

    if let Err(e) = &result {
        log::warn!("{line}: {e:#}");
    }
    if command.needs_ack() {
        let ack: &[u8] = if result.is_ok() { b"OK\n" } else { b"ERR\n" };
        if let Err(e) = control.write_all(ack) {
            log::warn!("writing acknowledgement failed: {e}");
        }
    }
}

fn dispatch(command: &Command, io: &mut File, config: &Config) -> Result<()> {
    match command {
        Command::Zip { src } => zip::dump(src, &config.staging_dir, io),
        Command::Unzip { dst, uid } => zip::restore(io, dst, *uid, &config.staging_dir),
        Command::Dump { src } => raw::dump(src, io),
        Command::PutRaw { dst, uid } => raw::restore(io, dst, *uid),
        Command::BackupSmsDb => smsdb::backup(io),
        Command::RestoreSmsDb => smsdb::restore(io),
    }
}

/// Receives the single descriptor accompanying the dummy payload byte on a
/// fresh control connection. Its absence is a protocol error.
fn recv_fd(control: &UnixStream) -> Result<OwnedFd> {
    let mut dummy = [0u8; 1];
    let mut space = [MaybeUninit::uninit(); rustix::cmsg_space!(ScmRights(1))];
    let mut ancillary = RecvAncillaryBuffer::new(&mut space);

    recvmsg(
        control,
        &mut [IoSliceMut::new(&mut dummy)],
        &mut ancillary,
        RecvFlags::CMSG_CLOEXEC,
    )
    .context("recvmsg on control connection failed")?;

    for message in ancillary.drain() {
        if let RecvAncillaryMessage::ScmRights(fds) = message
            && let Some(fd) = fds.into_iter().next()
        {
            return Ok(fd);
        }
    }
    bail!("no descriptor received on control connection")
}

/// Reads one command line: bytes up to a newline, NUL bytes dropped, EOF
/// ends the line early.
fn recv_line(control: &mut UnixStream) -> Result<String> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = match control.read(&mut byte) {
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        if n == 0 || byte[0] == b'\n' {
            break;
        }
        if byte[0] != 0 {
            line.push(byte[0]);
        }
    }
    Ok(String::from_utf8_lossy(&line).into_owned())
}
