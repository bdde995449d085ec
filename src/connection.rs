//! Transport to the mail store: plain TCP or TLS, directly or through SOCKS5.
//!
//! Both variants are handed to the IMAP client as one boxed stream so the
//! session type does not depend on the account's `secure` flag.

use crate::error::{Error, Result};
use crate::proxy::Socks5Proxy;
use rustls::ClientConfig;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_socks::tcp::Socks5Stream;
use tracing::{debug, instrument};
use webpki_roots::TLS_SERVER_ROOTS;

/// Byte stream the IMAP client runs over.
pub(crate) trait MailStream: AsyncRead + AsyncWrite + Unpin + Send + Debug {}

impl<T> MailStream for T where T: AsyncRead + AsyncWrite + Unpin + Send + Debug {}

pub(crate) type BoxedStream = Box<dyn MailStream>;

/// Opens a stream to `target_addr`, wrapped in TLS when `secure` is set.
///
/// `host` is the name presented for SNI and certificate validation.
#[instrument(
    name = "connection::establish",
    skip_all,
    fields(
        host = %host,
        target_addr = %target_addr,
        secure,
        proxy_enabled = proxy.is_some()
    )
)]
pub(crate) async fn establish_connection(
    host: &str,
    target_addr: &str,
    secure: bool,
    proxy: Option<&Socks5Proxy>,
) -> Result<BoxedStream> {
    if !secure {
        let tcp_stream = connect_tcp(target_addr, proxy).await?;
        debug!("Using plaintext connection");
        return Ok(Box::new(tcp_stream));
    }

    // Resolve the SNI name before dialing so a bad host fails without network I/O.
    let server_name = parse_server_name(host)?;
    let tcp_stream = connect_tcp(target_addr, proxy).await?;

    debug!("Performing TLS handshake");

    let tls_stream = create_tls_connector()
        .connect(server_name, tcp_stream)
        .await
        .map_err(|source| Error::TlsConnect {
            target: target_addr.to_string(),
            source,
        })?;

    Ok(Box::new(tls_stream))
}

fn create_tls_connector() -> TlsConnector {
    let mut roots = rustls::RootCertStore::empty();
    roots.add_trust_anchors(TLS_SERVER_ROOTS.iter().map(|ta| {
        rustls::OwnedTrustAnchor::from_subject_spki_name_constraints(
            ta.subject,
            ta.spki,
            ta.name_constraints,
        )
    }));

    let tls_config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth();

    TlsConnector::from(Arc::new(tls_config))
}

fn parse_server_name(host: &str) -> Result<rustls::ServerName> {
    rustls::ServerName::try_from(host).map_err(|source| Error::InvalidDnsName {
        host: host.to_string(),
        source,
    })
}

async fn connect_tcp(target_addr: &str, proxy: Option<&Socks5Proxy>) -> Result<TcpStream> {
    match proxy {
        Some(proxy) => connect_via_socks5(target_addr, proxy).await,
        None => {
            debug!("Establishing direct TCP connection");
            TcpStream::connect(target_addr)
                .await
                .map_err(|source| Error::TcpConnect {
                    target: target_addr.to_string(),
                    source,
                })
        }
    }
}

#[instrument(
    name = "connection::socks5",
    skip_all,
    fields(proxy_host = %proxy.host, has_auth = proxy.requires_auth())
)]
async fn connect_via_socks5(target_addr: &str, proxy: &Socks5Proxy) -> Result<TcpStream> {
    debug!(proxy = %proxy, "Connecting via SOCKS5 proxy");

    let proxy_addr = (proxy.host.as_str(), proxy.port);

    let stream = match &proxy.auth {
        Some(auth) => {
            Socks5Stream::connect_with_password(
                proxy_addr,
                target_addr,
                &auth.username,
                auth.password(),
            )
            .await
        }
        None => Socks5Stream::connect(proxy_addr, target_addr).await,
    };

    stream
        .map(Socks5Stream::into_inner)
        .map_err(|source| Error::Socks5Connect {
            proxy_host: proxy.host.clone(),
            target: target_addr.to_string(),
            source,
        })
}
