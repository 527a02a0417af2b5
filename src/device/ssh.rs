//! SSH device client built on libssh2
//!
//! Each visit opens its own session: TCP connect with a timeout, SSH
//! handshake, password authentication. Commands run on exec channels so
//! no terminal paging setup is needed.

use crate::device::{DeviceClient, DeviceSession, PendingVisit};
use crate::error::{DeviceError, DeviceResult};
use ssh2::{DisconnectCode, ErrorCode, Session};
use std::io::{self, Read};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, trace};

/// libssh2 error code for a timed out blocking call
const LIBSSH2_ERROR_TIMEOUT: i32 = -9;

/// Opens password-authenticated SSH sessions to devices
#[derive(Debug, Clone)]
pub struct SshDeviceClient {
    /// Extra connect attempts for transient TCP failures
    retries: u32,
}

impl SshDeviceClient {
    /// Create a client without connect retries
    pub fn new() -> Self {
        Self { retries: 0 }
    }

    /// Set retry count for transient connect failures
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    fn connect_once(&self, visit: &PendingVisit, timeout: Duration) -> DeviceResult<SshSession> {
        let address = visit.address.as_str();
        let creds = &visit.credentials;
        let socket = resolve(address, creds.port)?;

        let tcp = TcpStream::connect_timeout(&socket, timeout).map_err(|e| {
            if e.kind() == io::ErrorKind::TimedOut {
                DeviceError::Timeout {
                    address: address.to_string(),
                    secs: timeout.as_secs(),
                }
            } else {
                DeviceError::ConnectionFailed {
                    address: address.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;
        tcp.set_read_timeout(Some(timeout))
            .and_then(|_| tcp.set_write_timeout(Some(timeout)))
            .map_err(|e| DeviceError::ConnectionFailed {
                address: address.to_string(),
                reason: e.to_string(),
            })?;

        let mut session = Session::new().map_err(|e| connection_error(address, &e, timeout))?;
        session.set_tcp_stream(tcp);
        session.set_timeout(timeout.as_millis().min(u32::MAX as u128) as u32);
        session
            .handshake()
            .map_err(|e| connection_error(address, &e, timeout))?;

        let auth_failed = || DeviceError::AuthFailed {
            address: address.to_string(),
            username: creds.username.clone(),
        };
        session
            .userauth_password(&creds.username, &creds.password)
            .map_err(|_| auth_failed())?;
        if !session.authenticated() {
            return Err(auth_failed());
        }

        Ok(SshSession {
            address: address.to_string(),
            session,
            timeout,
        })
    }
}

impl Default for SshDeviceClient {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceClient for SshDeviceClient {
    fn connect(&self, visit: &PendingVisit, timeout: Duration) -> DeviceResult<Box<dyn DeviceSession>> {
        let mut last_error = None;

        for attempt in 0..=self.retries {
            if attempt > 0 {
                // Exponential backoff: 200ms, 400ms, 800ms, ...
                let delay = Duration::from_millis(200 * (1 << (attempt - 1).min(5)));
                std::thread::sleep(delay);
            }

            match self.connect_once(visit, timeout) {
                Ok(session) => {
                    debug!(address = %visit.address, attempt, "SSH session established");
                    return Ok(Box::new(session));
                }
                Err(e) if e.is_auth_failure() => return Err(e),
                Err(e) => {
                    trace!(address = %visit.address, attempt, error = %e, "Connect attempt failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| DeviceError::ConnectionFailed {
            address: visit.address.clone(),
            reason: "no connection attempt made".into(),
        }))
    }
}

/// One authenticated SSH session
struct SshSession {
    address: String,
    session: Session,
    timeout: Duration,
}

impl SshSession {
    fn command_error(&self, command: &str, reason: impl ToString) -> DeviceError {
        DeviceError::CommandFailed {
            address: self.address.clone(),
            command: command.to_string(),
            reason: reason.to_string(),
        }
    }

    fn ssh_error(&self, command: &str, err: ssh2::Error) -> DeviceError {
        if err.code() == ErrorCode::Session(LIBSSH2_ERROR_TIMEOUT) {
            self.timeout_error()
        } else {
            self.command_error(command, err)
        }
    }

    fn timeout_error(&self) -> DeviceError {
        DeviceError::Timeout {
            address: self.address.clone(),
            secs: self.timeout.as_secs(),
        }
    }
}

impl DeviceSession for SshSession {
    fn execute(&mut self, command: &str) -> DeviceResult<String> {
        let mut channel = self
            .session
            .channel_session()
            .map_err(|e| self.ssh_error(command, e))?;
        channel.exec(command).map_err(|e| self.ssh_error(command, e))?;

        let mut output = String::new();
        channel.read_to_string(&mut output).map_err(|e| match e.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => self.timeout_error(),
            _ => self.command_error(command, e),
        })?;
        channel.wait_close().map_err(|e| self.ssh_error(command, e))?;

        let status = channel.exit_status().unwrap_or(0);
        if status != 0 && output.trim().is_empty() {
            return Err(self.command_error(command, format!("exit status {}", status)));
        }

        trace!(address = %self.address, command, bytes = output.len(), "Command completed");
        Ok(output)
    }

    fn close(self: Box<Self>) {
        if let Err(e) = self
            .session
            .disconnect(Some(DisconnectCode::ByApplication), "crawl complete", None)
        {
            debug!(address = %self.address, error = %e, "Error closing SSH session");
        }
    }
}

/// Resolve an address (IP or hostname) to a socket address
pub fn resolve(address: &str, port: u16) -> DeviceResult<SocketAddr> {
    let host = address.trim();
    if host.is_empty() {
        return Err(DeviceError::Resolve {
            address: address.to_string(),
            reason: "empty address".into(),
        });
    }

    (host, port)
        .to_socket_addrs()
        .map_err(|e| DeviceError::Resolve {
            address: address.to_string(),
            reason: e.to_string(),
        })?
        .next()
        .ok_or_else(|| DeviceError::Resolve {
            address: address.to_string(),
            reason: "no addresses returned".into(),
        })
}

fn connection_error(address: &str, err: &ssh2::Error, timeout: Duration) -> DeviceError {
    if err.code() == ErrorCode::Session(LIBSSH2_ERROR_TIMEOUT) {
        DeviceError::Timeout {
            address: address.to_string(),
            secs: timeout.as_secs(),
        }
    } else {
        DeviceError::ConnectionFailed {
            address: address.to_string(),
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Credentials;
    use std::net::TcpListener;

    #[test]
    fn test_resolve_ip_literal() {
        let addr = resolve("127.0.0.1", 2222).unwrap();
        assert_eq!(addr.port(), 2222);
        assert!(addr.ip().is_loopback());
    }

    #[test]
    fn test_resolve_empty_address() {
        let err = resolve("  ", 22).unwrap_err();
        assert!(matches!(err, DeviceError::Resolve { .. }));
    }

    #[test]
    fn test_connect_refused_is_connection_failure() {
        // Grab a free port, then release it so nothing is listening
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let visit = PendingVisit::seed(
            "127.0.0.1",
            Credentials::new("admin", "admin").with_port(port),
            "cisco_ios",
        );
        let client = SshDeviceClient::new();
        let err = client
            .connect(&visit, Duration::from_secs(2))
            .err()
            .expect("connect should fail");

        assert!(!err.is_auth_failure());
        assert_eq!(err.address(), "127.0.0.1");
    }
}
