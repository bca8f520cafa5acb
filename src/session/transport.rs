//! IMAP over TCP, optionally wrapped in TLS.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::debug;

use super::{Connector, MailboxSession, ProtocolResult};
use crate::error::{MailError, ProtocolError, Result};

/// Connection parameters for one IMAP account.
#[derive(Clone)]
pub struct ImapConnector {
    pub host: String,
    pub port: u16,
    pub secure: bool,
    pub verify_cert: bool,
    pub user: String,
    pub password: String,
    /// Applied to connect, read and write on the socket. Bounds how long an
    /// in-flight command can delay a stop request.
    pub timeout: Duration,
}

impl std::fmt::Debug for ImapConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapConnector")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("secure", &self.secure)
            .field("verify_cert", &self.verify_cert)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

impl ImapConnector {
    /// Resolve the server address once at startup.
    ///
    /// An unresolvable host is a configuration problem rather than a
    /// transient failure, so it is reported as [`MailError::Config`].
    pub fn preflight(&self) -> Result<SocketAddr> {
        self.resolve().map_err(|e| {
            MailError::Config(format!("cannot resolve {}: {e}", self.endpoint()))
        })
    }

    fn resolve(&self) -> ProtocolResult<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| ProtocolError::new("host resolved to no addresses"))
    }

    fn open_tcp(&self) -> ProtocolResult<TcpStream> {
        let addr = self.resolve()?;
        let tcp = TcpStream::connect_timeout(&addr, self.timeout)?;
        tcp.set_read_timeout(Some(self.timeout))?;
        tcp.set_write_timeout(Some(self.timeout))?;
        Ok(tcp)
    }

    fn login<T: Read + Write>(&self, stream: T) -> ProtocolResult<::imap::Session<T>> {
        let mut client = ::imap::Client::new(stream);
        client.read_greeting()?;
        client
            .login(&self.user, &self.password)
            .map_err(|(e, _client)| ProtocolError::new(format!("login failed: {e}")))
    }
}

impl Connector for ImapConnector {
    type Session = Box<dyn MailboxSession + Send>;

    fn connect(&self) -> ProtocolResult<Self::Session> {
        let tcp = self.open_tcp()?;

        if self.secure {
            let tls = native_tls::TlsConnector::builder()
                .danger_accept_invalid_certs(!self.verify_cert)
                .danger_accept_invalid_hostnames(!self.verify_cert)
                .build()?;
            let stream = tls
                .connect(&self.host, tcp)
                .map_err(|e| ProtocolError::new(format!("TLS handshake failed: {e}")))?;
            let session = self.login(stream)?;
            debug!(endpoint = %self.endpoint(), "Logged in over TLS");
            Ok(Box::new(session))
        } else {
            let session = self.login(tcp)?;
            debug!(endpoint = %self.endpoint(), "Logged in without TLS");
            Ok(Box::new(session))
        }
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl<T: Read + Write> MailboxSession for ::imap::Session<T> {
    fn select_mailbox(&mut self, mailbox: &str) -> ProtocolResult<()> {
        self.select(mailbox)?;
        Ok(())
    }

    fn search_unseen(&mut self) -> ProtocolResult<Vec<u32>> {
        Ok(self.uid_search("UNSEEN")?.into_iter().collect())
    }

    fn fetch_raw(&mut self, uid: u32) -> ProtocolResult<Option<Vec<u8>>> {
        let fetches = self.uid_fetch(uid.to_string(), "(UID BODY.PEEK[])")?;
        let body = fetches
            .iter()
            .find(|f| f.uid == Some(uid))
            .or_else(|| fetches.iter().next())
            .and_then(|f| f.body())
            .map(<[u8]>::to_vec);
        Ok(body)
    }

    fn add_flags(&mut self, uid_set: &str, flags: &str) -> ProtocolResult<()> {
        self.uid_store(uid_set, format!("+FLAGS.SILENT ({flags})"))?;
        Ok(())
    }

    fn expunge(&mut self) -> ProtocolResult<()> {
        ::imap::Session::expunge(self)?;
        Ok(())
    }

    fn noop(&mut self) -> ProtocolResult<()> {
        ::imap::Session::noop(self)?;
        Ok(())
    }

    fn logout(&mut self) -> ProtocolResult<()> {
        ::imap::Session::logout(self)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connector(host: &str) -> ImapConnector {
        ImapConnector {
            host: host.to_string(),
            port: 993,
            secure: true,
            verify_cert: true,
            user: "logstash".into(),
            password: "secret".into(),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_endpoint() {
        assert_eq!(connector("imap.example.com").endpoint(), "imap.example.com:993");
    }

    #[test]
    fn test_debug_hides_password() {
        let rendered = format!("{:?}", connector("localhost"));
        assert!(rendered.contains("localhost"));
        assert!(!rendered.contains("secret"));
    }

    #[test]
    fn test_preflight_resolves_literal_address() {
        let addr = connector("127.0.0.1").preflight().unwrap();
        assert_eq!(addr.port(), 993);
    }

    #[test]
    fn test_preflight_rejects_unresolvable_host() {
        let result = connector("no such host.invalid").preflight();
        assert!(matches!(result, Err(MailError::Config(_))));
    }
}
