use derive_more::Display;
use nalda_types::report::UploadOutcome;
use nalda_types::settings::{FtpCredentials, Protocol};
use serde::Serialize;
use std::io::Write;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;
use suppaftp::native_tls::TlsConnector;
use suppaftp::types::FileType;
use suppaftp::{Mode, NativeTlsConnector, NativeTlsFtpStream};

/// Name the marketplace expects on its side, independent of the local path.
pub const REMOTE_FILE_NAME: &str = "nalda-products.csv";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Display)]
pub enum UploadError {
    #[display("Server, username, and password are required")]
    MissingCredentials,
    #[display("Could not connect to {protocol} server: {host}:{port}")]
    Connect {
        protocol: &'static str,
        host: String,
        port: u16,
    },
    #[display("Could not initialize TLS for the FTPS connection")]
    Tls,
    #[display("{protocol} authentication failed. Please check your username and password")]
    Auth { protocol: &'static str },
    #[display(
        "Connection successful, but remote path \"{path}\" is not accessible or does not exist"
    )]
    Path { path: String },
    #[display("Could not initialize SFTP subsystem")]
    Subsystem,
    #[display("Unable to read the export file: {_0}")]
    LocalFile(std::io::Error),
    #[display("Transfer failed: {_0}")]
    Transfer(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct TestOutcome {
    pub success: bool,
    pub message: String,
}

/// Pushes the finished CSV to the configured endpoint. Never fails the
/// caller; the outcome is attached to the export report.
pub async fn upload(path: PathBuf, credentials: &FtpCredentials) -> UploadOutcome {
    if !credentials.enabled {
        return UploadOutcome::skipped();
    }
    let credentials = credentials.clone();
    let result = tokio::task::spawn_blocking(move || transfer(&path, &credentials)).await;
    match result {
        Ok(Ok(())) => UploadOutcome {
            attempted: true,
            success: true,
            error: None,
        },
        Ok(Err(err)) => UploadOutcome {
            attempted: true,
            success: false,
            error: Some(err.to_string()),
        },
        Err(err) => UploadOutcome {
            attempted: true,
            success: false,
            error: Some(format!("Upload task failed: {err}")),
        },
    }
}

/// Connect + authenticate + path check without transferring anything, for
/// interactive credential validation.
pub async fn test_connection(credentials: FtpCredentials) -> TestOutcome {
    let result = tokio::task::spawn_blocking(move || probe(&credentials)).await;
    match result {
        Ok(Ok(message)) => TestOutcome {
            success: true,
            message,
        },
        Ok(Err(err)) => TestOutcome {
            success: false,
            message: err.to_string(),
        },
        Err(err) => TestOutcome {
            success: false,
            message: format!("Connection test failed: {err}"),
        },
    }
}

fn transfer(path: &Path, credentials: &FtpCredentials) -> Result<(), UploadError> {
    validate(credentials)?;
    match credentials.protocol {
        Protocol::Ftp => ftp_session(credentials, |ftp| {
            let remote_dir = credentials.normalized_path();
            if !remote_dir.is_empty() {
                ftp.cwd(&remote_dir).map_err(|_| UploadError::Path {
                    path: remote_dir.clone(),
                })?;
            }
            ftp.transfer_type(FileType::Binary)
                .map_err(|err| UploadError::Transfer(err.to_string()))?;
            let mut file = std::fs::File::open(path).map_err(UploadError::LocalFile)?;
            ftp.put_file(REMOTE_FILE_NAME, &mut file)
                .map_err(|err| UploadError::Transfer(err.to_string()))?;
            Ok(())
        }),
        Protocol::Sftp => {
            let session = sftp_session(credentials)?;
            let sftp = session.sftp().map_err(|_| UploadError::Subsystem)?;
            let remote_dir = credentials.normalized_path();
            if !remote_dir.is_empty() {
                sftp.stat(Path::new(&remote_dir))
                    .map_err(|_| UploadError::Path {
                        path: remote_dir.clone(),
                    })?;
            }
            let remote_file = if remote_dir.is_empty() {
                PathBuf::from(REMOTE_FILE_NAME)
            } else {
                Path::new(&remote_dir).join(REMOTE_FILE_NAME)
            };
            let data = std::fs::read(path).map_err(UploadError::LocalFile)?;
            let mut remote = sftp
                .create(&remote_file)
                .map_err(|err| UploadError::Transfer(err.to_string()))?;
            remote
                .write_all(&data)
                .map_err(|err| UploadError::Transfer(err.to_string()))?;
            Ok(())
        }
    }
}

fn probe(credentials: &FtpCredentials) -> Result<String, UploadError> {
    validate(credentials)?;
    match credentials.protocol {
        Protocol::Ftp => {
            let protocol = ftp_protocol_name(credentials);
            ftp_session(credentials, |ftp| {
                let remote_dir = credentials.normalized_path();
                if !remote_dir.is_empty() {
                    ftp.cwd(&remote_dir).map_err(|_| UploadError::Path {
                        path: remote_dir.clone(),
                    })?;
                }
                Ok(())
            })?;
            Ok(format!(
                "{protocol} connection successful! The server and credentials are working correctly."
            ))
        }
        Protocol::Sftp => {
            let session = sftp_session(credentials)?;
            let sftp = session.sftp().map_err(|_| UploadError::Subsystem)?;
            let remote_dir = credentials.normalized_path();
            let check = if remote_dir.is_empty() {
                "/".to_string()
            } else {
                remote_dir
            };
            sftp.stat(Path::new(&check))
                .map_err(|_| UploadError::Path { path: check.clone() })?;
            Ok(
                "SFTP connection successful! The server and credentials are working correctly."
                    .to_string(),
            )
        }
    }
}

fn validate(credentials: &FtpCredentials) -> Result<(), UploadError> {
    if credentials.host.is_empty()
        || credentials.username.is_empty()
        || credentials.password.is_empty()
    {
        return Err(UploadError::MissingCredentials);
    }
    Ok(())
}

fn ftp_protocol_name(credentials: &FtpCredentials) -> &'static str {
    if credentials.tls {
        "FTPS"
    } else {
        "FTP"
    }
}

/// Runs one operation over a logged-in FTP stream; the connection is closed
/// on every path, including failures.
fn ftp_session<T>(
    credentials: &FtpCredentials,
    op: impl FnOnce(&mut NativeTlsFtpStream) -> Result<T, UploadError>,
) -> Result<T, UploadError> {
    let protocol = ftp_protocol_name(credentials);
    let addr = resolve_addr(credentials, protocol)?;
    let connect_err = || UploadError::Connect {
        protocol,
        host: credentials.host.clone(),
        port: credentials.port(),
    };
    let mut ftp =
        NativeTlsFtpStream::connect_timeout(addr, CONNECT_TIMEOUT).map_err(|_| connect_err())?;
    if credentials.tls {
        let tls = TlsConnector::new().map_err(|_| UploadError::Tls)?;
        ftp = ftp
            .into_secure(NativeTlsConnector::from(tls), &credentials.host)
            .map_err(|_| UploadError::Tls)?;
    }
    ftp.set_mode(Mode::Passive);
    if ftp
        .login(&credentials.username, &credentials.password)
        .is_err()
    {
        let _ = ftp.quit();
        return Err(UploadError::Auth { protocol });
    }
    let result = op(&mut ftp);
    let _ = ftp.quit();
    result
}

fn sftp_session(credentials: &FtpCredentials) -> Result<ssh2::Session, UploadError> {
    let addr = resolve_addr(credentials, "SFTP")?;
    let connect_err = || UploadError::Connect {
        protocol: "SFTP",
        host: credentials.host.clone(),
        port: credentials.port(),
    };
    let tcp = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT).map_err(|_| connect_err())?;
    let mut session = ssh2::Session::new().map_err(|err| UploadError::Transfer(err.to_string()))?;
    session.set_tcp_stream(tcp);
    session.handshake().map_err(|_| connect_err())?;
    session
        .userauth_password(&credentials.username, &credentials.password)
        .map_err(|_| UploadError::Auth { protocol: "SFTP" })?;
    Ok(session)
}

fn resolve_addr(
    credentials: &FtpCredentials,
    protocol: &'static str,
) -> Result<SocketAddr, UploadError> {
    (credentials.host.as_str(), credentials.port())
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or(UploadError::Connect {
            protocol,
            host: credentials.host.clone(),
            port: credentials.port(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> FtpCredentials {
        FtpCredentials {
            enabled: true,
            protocol: Protocol::Ftp,
            host: "ftp.nalda.ch".to_string(),
            port: None,
            username: "seller".to_string(),
            password: "secret".to_string(),
            remote_path: "/feeds/".to_string(),
            tls: false,
        }
    }

    #[test]
    fn validation_rejects_missing_fields_before_any_io() {
        let mut creds = credentials();
        creds.password.clear();
        assert!(matches!(
            probe(&creds),
            Err(UploadError::MissingCredentials)
        ));
    }

    #[test]
    fn ports_default_by_protocol() {
        let mut creds = credentials();
        assert_eq!(21, creds.port());
        creds.protocol = Protocol::Sftp;
        assert_eq!(22, creds.port());
        creds.port = Some(2222);
        assert_eq!(2222, creds.port());
    }

    #[test]
    fn remote_path_is_normalized() {
        let mut creds = credentials();
        assert_eq!("/feeds", creds.normalized_path());
        creds.remote_path = "/".to_string();
        assert_eq!("", creds.normalized_path());
        creds.remote_path = "a/b/".to_string();
        assert_eq!("/a/b", creds.normalized_path());
    }

    #[actix_rt::test]
    async fn disabled_upload_is_a_noop() {
        let mut creds = credentials();
        creds.enabled = false;
        let outcome = upload(PathBuf::from("export/nalda-products.csv"), &creds).await;
        assert!(!outcome.attempted);
        assert!(outcome.error.is_none());
    }
}
