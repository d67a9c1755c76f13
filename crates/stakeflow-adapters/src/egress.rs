//! RPC endpoint validation.
//!
//! The provider endpoint receives every transaction the user signs off on, so it must be
//! reached over TLS unless it is a node on this machine.

use stakeflow_core::{Result, StakeflowError};
use std::net::IpAddr;

fn strip_ipv6_brackets(host: &str) -> &str {
    host.strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host)
}

fn is_loopback_host(host: &str) -> bool {
    let host = strip_ipv6_brackets(host);
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }

    host.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
}

fn is_unroutable_ip(host: &str) -> bool {
    match strip_ipv6_brackets(host).parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => ip.is_unspecified() || ip.is_multicast() || ip.is_broadcast(),
        Ok(IpAddr::V6(ip)) => ip.is_unspecified() || ip.is_multicast(),
        Err(_) => false,
    }
}

/// Accept https anywhere, or http only for localhost/loopback; no userinfo or fragment.
pub fn validate_rpc_url(raw: &str) -> Result<url::Url> {
    let url = url::Url::parse(raw.trim())
        .map_err(|e| StakeflowError::ConfigError(format!("Invalid RPC URL: {e}")))?;

    if url.username() != "" || url.password().is_some() {
        return Err(StakeflowError::ConfigError(
            "RPC URL must not contain userinfo".into(),
        ));
    }

    if url.fragment().is_some() {
        return Err(StakeflowError::ConfigError(
            "RPC URL must not contain a fragment".into(),
        ));
    }

    let host = url
        .host_str()
        .ok_or_else(|| StakeflowError::ConfigError("RPC URL must have a host".into()))?;

    if is_unroutable_ip(host) {
        return Err(StakeflowError::ConfigError(
            "RPC URL host is an unspecified, multicast or broadcast address".into(),
        ));
    }

    match url.scheme() {
        "https" => Ok(url),
        "http" if is_loopback_host(host) => Ok(url),
        _ => Err(StakeflowError::ConfigError(
            "RPC URL must be https, or http only for localhost/loopback".into(),
        )),
    }
}
