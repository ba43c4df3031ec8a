//! Remote sessions: the provider/session/channel seams and the SSH backend.
//!
//! The engine only sees the three traits. Channels are polled: reads return
//! `Ok(0)` when nothing is available yet instead of blocking.

use std::io::{ErrorKind, Read};
use std::net::TcpStream;

use anyhow::{Context, Result};
use ssh2::{Channel, Session};
use tracing::{debug, instrument, warn};

use crate::io::config::{SessionAuth, SessionConfig};

/// One command running on the remote host.
pub trait ExecChannel {
    /// Read available stdout into `buf`; `Ok(0)` when nothing is buffered.
    fn read_stdout(&mut self, buf: &mut [u8]) -> Result<usize>;
    /// Read available stderr into `buf`; `Ok(0)` when nothing is buffered.
    fn read_stderr(&mut self, buf: &mut [u8]) -> Result<usize>;
    /// The remote side has finished and will send no more output.
    fn exit_status_ready(&mut self) -> Result<bool>;
    /// Exit status once ready; `None` when the remote reported none.
    fn exit_status(&mut self) -> Result<Option<i32>>;
    /// Stop waiting on the command and release the channel.
    fn abort(&mut self) -> Result<()>;
}

pub trait RemoteSession {
    type Channel: ExecChannel;

    /// Start `command` under a PTY.
    fn exec(&mut self, command: &str) -> Result<Self::Channel>;
    /// Release the session. Calling it again is a no-op.
    fn close(&mut self) -> Result<()>;
}

pub trait SessionProvider {
    type Session: RemoteSession;

    fn connect(&self, cfg: &SessionConfig) -> Result<Self::Session>;
}

/// Opens SSH sessions.
#[derive(Debug, Default, Clone, Copy)]
pub struct SshProvider;

impl SessionProvider for SshProvider {
    type Session = SshSession;

    #[instrument(skip_all, fields(host = %cfg.host, port = cfg.port, user = %cfg.user))]
    fn connect(&self, cfg: &SessionConfig) -> Result<SshSession> {
        let auth = cfg.auth()?;
        let tcp = TcpStream::connect((cfg.host.as_str(), cfg.port))
            .with_context(|| format!("connect to {}:{}", cfg.host, cfg.port))?;
        let mut session = Session::new().context("create ssh session")?;
        session.set_tcp_stream(tcp);
        session.handshake().context("ssh handshake")?;
        match &auth {
            SessionAuth::Password(secret) => session
                .userauth_password(&cfg.user, secret)
                .context("ssh password authentication")?,
            SessionAuth::KeyFile(path) => session
                .userauth_pubkey_file(&cfg.user, None, path, None)
                .with_context(|| format!("ssh key authentication with {}", path.display()))?,
        }
        if !session.authenticated() {
            anyhow::bail!("ssh authentication rejected for {}", cfg.user);
        }
        debug!("ssh session established");
        Ok(SshSession {
            session,
            closed: false,
        })
    }
}

pub struct SshSession {
    session: Session,
    closed: bool,
}

impl RemoteSession for SshSession {
    type Channel = SshChannel;

    fn exec(&mut self, command: &str) -> Result<SshChannel> {
        if self.closed {
            anyhow::bail!("ssh session already closed");
        }
        self.session.set_blocking(true);
        let mut channel = self.session.channel_session().context("open ssh channel")?;
        channel
            .request_pty("xterm", None, None)
            .context("request pty")?;
        channel
            .exec(command)
            .with_context(|| format!("exec `{command}`"))?;
        self.session.set_blocking(false);
        Ok(SshChannel {
            session: self.session.clone(),
            channel,
        })
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.session.set_blocking(true);
        self.session
            .disconnect(None, "campaign finished", None)
            .context("ssh disconnect")?;
        debug!("ssh session closed");
        Ok(())
    }
}

pub struct SshChannel {
    session: Session,
    channel: Channel,
}

impl ExecChannel for SshChannel {
    fn read_stdout(&mut self, buf: &mut [u8]) -> Result<usize> {
        poll_read(&mut self.channel, buf).context("read stdout")
    }

    fn read_stderr(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut stderr = self.channel.stderr();
        poll_read(&mut stderr, buf).context("read stderr")
    }

    fn exit_status_ready(&mut self) -> Result<bool> {
        Ok(self.channel.eof())
    }

    fn exit_status(&mut self) -> Result<Option<i32>> {
        self.session.set_blocking(true);
        let result = self.channel.wait_close();
        self.session.set_blocking(false);
        result.context("wait for channel close")?;

        let signal = self.channel.exit_signal().context("read exit signal")?;
        if let Some(name) = signal.exit_signal {
            warn!(signal = %name, "remote command terminated by signal");
            return Ok(None);
        }
        let status = self.channel.exit_status().context("read exit status")?;
        Ok(Some(status))
    }

    fn abort(&mut self) -> Result<()> {
        self.session.set_blocking(true);
        let result = self.channel.close();
        self.session.set_blocking(false);
        result.context("close ssh channel")
    }
}

fn poll_read<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    match reader.read(buf) {
        Ok(n) => Ok(n),
        Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(0),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Flaky(Vec<std::io::Result<usize>>);

    impl Read for Flaky {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            self.0.remove(0)
        }
    }

    #[test]
    fn poll_read_maps_would_block_to_zero() {
        let mut reader = Flaky(vec![
            Err(ErrorKind::WouldBlock.into()),
            Ok(3),
            Err(ErrorKind::BrokenPipe.into()),
        ]);
        let mut buf = [0u8; 8];
        assert_eq!(poll_read(&mut reader, &mut buf).expect("would block"), 0);
        assert_eq!(poll_read(&mut reader, &mut buf).expect("data"), 3);
        assert!(poll_read(&mut reader, &mut buf).is_err());
    }

    #[test]
    fn connect_without_credentials_fails_before_dialing() {
        let cfg = SessionConfig {
            secret_env: None,
            ..SessionConfig::default()
        };
        assert!(SshProvider.connect(&cfg).is_err());
    }
}
