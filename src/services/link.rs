//! Share Links
//!
//! After a share, the sharer gets a URL other devices on the network can open
//! and a QR code encoding it. The URL needs an address those devices can
//! reach, so it is either configured explicitly or discovered by asking the
//! OS which local interface routes to the outside world (no packet is sent:
//! connecting a UDP socket only selects a route).
//!
//! Loopback and unspecified addresses are refused: a QR code pointing at
//! 127.0.0.1 is useless to the phone scanning it.

use crate::services::{Result, ShareError};
use crate::storage::Pin;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{DynamicImage, ImageFormat, Luma};
use qrcode::QrCode;
use std::fmt;
use std::io::Cursor;
use std::net::{IpAddr, SocketAddr};
use tokio::net::UdpSocket;
use tracing::debug;

/// Address used only to pick a route; nothing is sent to it.
const ROUTE_PROBE: &str = "8.8.8.8:80";

/// Pixel size of one QR module.
const QR_MODULE_PX: u32 = 5;

/// The two kinds of content, each with its own URL namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Text,
    File,
}

impl ContentKind {
    pub fn path_segment(self) -> &'static str {
        match self {
            ContentKind::Text => "text",
            ContentKind::File => "file",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path_segment())
    }
}

/// Builds retrieval URLs and QR codes for shares.
#[derive(Debug, Clone)]
pub struct LinkBuilder {
    port: u16,
    public_host: Option<IpAddr>,
}

impl LinkBuilder {
    /// `public_host` overrides address discovery when set.
    pub fn new(port: u16, public_host: Option<IpAddr>) -> Self {
        Self { port, public_host }
    }

    /// Resolves the address share links should point at.
    pub async fn host(&self) -> Result<IpAddr> {
        match self.public_host {
            Some(ip) => Ok(ip),
            None => discover_lan_address().await,
        }
    }

    /// The retrieval URL for `pin` on `host`.
    pub fn url(&self, host: IpAddr, kind: ContentKind, pin: &Pin) -> String {
        let authority = SocketAddr::new(host, self.port);
        format!("http://{}/api/{}/{}", authority, kind, pin)
    }

    /// Renders `url` as a PNG QR code, base64 encoded.
    ///
    /// CPU bound; run it on the blocking pool.
    pub fn render_qr(url: &str) -> Result<String> {
        let code = QrCode::new(url.as_bytes()).map_err(|e| ShareError::QrEncoding(e.to_string()))?;
        let image = code
            .render::<Luma<u8>>()
            .module_dimensions(QR_MODULE_PX, QR_MODULE_PX)
            .build();

        let mut png = Cursor::new(Vec::new());
        DynamicImage::ImageLuma8(image)
            .write_to(&mut png, ImageFormat::Png)
            .map_err(|e| ShareError::QrEncoding(e.to_string()))?;

        Ok(STANDARD.encode(png.into_inner()))
    }

    /// Builds the URL for a share and renders its QR code off the runtime
    /// threads.
    pub async fn qr_for(&self, host: IpAddr, kind: ContentKind, pin: &Pin) -> Result<String> {
        let url = self.url(host, kind, pin);
        debug!(url = %url, "Rendering share QR code");
        tokio::task::spawn_blocking(move || Self::render_qr(&url)).await?
    }
}

/// Finds the local address of the interface that routes outwards.
async fn discover_lan_address() -> Result<IpAddr> {
    let unresolvable = |e: std::io::Error| ShareError::NetworkAddressUnresolvable(e.to_string());

    let socket = UdpSocket::bind("0.0.0.0:0").await.map_err(unresolvable)?;
    socket.connect(ROUTE_PROBE).await.map_err(unresolvable)?;
    let ip = socket.local_addr().map_err(unresolvable)?.ip();

    if ip.is_loopback() || ip.is_unspecified() {
        return Err(ShareError::NetworkAddressUnresolvable(format!(
            "only {} is available",
            ip
        )));
    }

    Ok(ip)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_url_format() {
        let links = LinkBuilder::new(8000, None);
        let pin = Pin::parse("004217").unwrap();
        let host = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20));

        assert_eq!(
            links.url(host, ContentKind::Text, &pin),
            "http://192.168.1.20:8000/api/text/004217"
        );
        assert_eq!(
            links.url(host, ContentKind::File, &pin),
            "http://192.168.1.20:8000/api/file/004217"
        );
    }

    #[test]
    fn test_url_ipv6() {
        let links = LinkBuilder::new(8000, None);
        let pin = Pin::parse("000001").unwrap();
        let host: IpAddr = "fe80::1".parse().unwrap();

        assert_eq!(
            links.url(host, ContentKind::Text, &pin),
            "http://[fe80::1]:8000/api/text/000001"
        );
    }

    #[tokio::test]
    async fn test_configured_host_wins() {
        let host = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7));
        let links = LinkBuilder::new(8000, Some(host));
        assert_eq!(links.host().await.unwrap(), host);
    }

    #[test]
    fn test_render_qr_is_png() {
        let encoded = LinkBuilder::render_qr("http://192.168.1.20:8000/api/text/004217").unwrap();
        let png = STANDARD.decode(encoded).unwrap();

        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }
}
