//! Connection URI resolution.
//!
//! `driver[+transport]://[user@]host[:port]/path[?query][#fragment]`
//!
//! A URI without a scheme, or without both a transport suffix and a host,
//! is not ours and is declined so another backend can take it. A URI with a
//! scheme that fails to parse is a configuration error.

use percent_encoding::percent_decode_str;
use tracing::debug;
use url::{Host, ParseError, Url};

use super::query::QueryFields;
use super::{ConnectParams, Transport};
use crate::constants::DEFAULT_HOST;
use crate::error::{Error, Result};

/// Resolve a connection URI.
///
/// Returns `Ok(None)` when the URI is absent or not applicable.
pub fn resolve(uri: Option<&str>) -> Result<Option<ConnectParams>> {
    let Some(uri) = uri else {
        return Ok(None);
    };
    let url = match Url::parse(uri) {
        Ok(url) => url,
        Err(ParseError::RelativeUrlWithoutBase) => {
            debug!(uri, "No scheme, declining");
            return Ok(None);
        }
        Err(e) => {
            return Err(Error::Config {
                message: format!("unable to parse URI '{}': {}", uri, e),
            });
        }
    };

    let (base_scheme, suffix) = match url.scheme().split_once('+') {
        Some((base, suffix)) => (base, Some(suffix)),
        None => (url.scheme(), None),
    };

    let host = host_of(&url);
    if host.is_none() && suffix.is_none() {
        debug!(uri, "No transport and no host, declining");
        return Ok(None);
    }

    let transport = match suffix {
        Some(token) => token.parse::<Transport>()?,
        None => Transport::Tls,
    };

    let port = match url.port() {
        Some(port) => port,
        None => transport.default_port().unwrap_or(0),
    };

    let username = match transport {
        Transport::Ssh if !url.username().is_empty() => Some(unescape(url.username())),
        _ => None,
    };

    let mut fields = QueryFields::parse(url.query().unwrap_or(""));
    let name = fields.take("name");
    let command = fields.take("command");
    let socket = fields.take("socket");
    let netcat = fields.take("netcat");
    let no_verify = fields.take("no_verify").map(|v| atoi(&v) != 0).unwrap_or(false);
    for field in fields.iter().filter(|f| !f.ignore) {
        debug!(variable = %field.name, "Passing through variable to remote end");
    }

    if transport == Transport::Ext && command.is_none() {
        return Err(Error::Config {
            message: "for 'ext' transport, command is required".to_string(),
        });
    }

    let name = match name {
        Some(name) => name,
        None => {
            let mut name = format!("{}://{}", base_scheme, url.path());
            if let Some(query) = fields.rebuild() {
                name.push('?');
                name.push_str(&query);
            }
            if let Some(fragment) = url.fragment() {
                name.push('#');
                name.push_str(fragment);
            }
            name
        }
    };

    let params = ConnectParams {
        transport,
        host: host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
        port,
        username,
        name,
        socket,
        command,
        netcat,
        no_verify,
    };
    debug!(
        transport = %params.transport,
        host = %params.host,
        port = params.port,
        name = %params.name,
        "Resolved connection URI"
    );
    Ok(Some(params))
}

fn host_of(url: &Url) -> Option<String> {
    match url.host()? {
        Host::Domain("") => None,
        Host::Domain(domain) => Some(unescape(domain)),
        Host::Ipv4(addr) => Some(addr.to_string()),
        Host::Ipv6(addr) => Some(addr.to_string()),
    }
}

fn unescape(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

/// C `atoi`: optional whitespace and sign, then leading digits; anything
/// unparsable is zero.
fn atoi(value: &str) -> i64 {
    let s = value.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let n = digits
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0i64, |acc, d| acc.saturating_mul(10).saturating_add(i64::from(d - b'0')));
    if negative { -n } else { n }
}
