use anyhow::{anyhow, Context, Result};
use multiaddr::{Multiaddr, Protocol};
use url::Url;

/// scheme, host & port of a remote service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub scheme: String,
    pub host: String,
    pub port: Option<u16>,
}

impl Endpoint {
    /// parses either a multiaddr or an url
    pub fn parse(raw: &str) -> Result<Self> {
        let multiaddr_err = match raw
            .parse()
            .context("try to parse multiaddr")
            .and_then(from_multiaddr)
        {
            Ok(ep) => return Ok(ep),
            Err(e) => e,
        };

        let url_err = match Url::parse(raw)
            .context("try to parse url")
            .and_then(|url| from_url(&url))
        {
            Ok(ep) => return Ok(ep),
            Err(e) => e,
        };

        Err(anyhow!(
            "parse endpoint: `{}`\n1. {:?}\n\n2. {:?}",
            raw,
            multiaddr_err,
            url_err
        ))
    }

    /// `scheme://host[:port]`
    pub fn base_url(&self) -> String {
        match self.port {
            Some(p) => format!("{}://{}:{}", self.scheme, self.host, p),
            None => format!("{}://{}", self.scheme, self.host),
        }
    }

    /// jsonrpc url of the given api version
    pub fn rpc_url(&self, ver: u32) -> String {
        format!("{}/rpc/v{}", self.base_url(), ver)
    }
}

/// jsonrpc url of the given api version from a multiaddr or url
pub fn rpc_addr(raw: &str, ver: u32) -> Result<String> {
    Endpoint::parse(raw).map(|ep| ep.rpc_url(ver))
}

fn from_url(url: &Url) -> Result<Endpoint> {
    Ok(Endpoint {
        scheme: url.scheme().to_owned(),
        host: url.host_str().context("url host is required")?.to_owned(),
        port: url.port(),
    })
}

fn from_multiaddr(ma: Multiaddr) -> Result<Endpoint> {
    let mut scheme = None;
    let mut host = None;
    let mut port = None;

    for protocol in ma.into_iter() {
        match protocol {
            Protocol::Ip4(h) => {
                host.replace(h.to_string());
            }

            Protocol::Ip6(h) => {
                host.replace(h.to_string());
            }

            Protocol::Dns(h) | Protocol::Dns4(h) | Protocol::Dns6(h) => {
                host.replace(h.to_string());
            }

            Protocol::Tcp(p) => {
                port.replace(p);
            }

            Protocol::Http => {
                scheme.replace("http");
            }

            Protocol::Https => {
                scheme.replace("https");
            }

            _ => {}
        }
    }

    Ok(Endpoint {
        scheme: scheme.unwrap_or("http").to_owned(),
        host: host.context("try to parse multiaddr: host is required")?,
        port,
    })
}
