//! IP Guard — CIDR/exact whitelist match, grounded on
//! `ando-plugins/src/traffic/ip_restriction.rs`'s use of `ipnet` for the
//! CIDR branch. IPv6 entries stay literal-only in this version (§9(c)).

use std::net::Ipv4Addr;
use std::str::FromStr;

use async_trait::async_trait;
use ipnet::Ipv4Net;

use apigw_core::{Action, Filter, GatewayError, RequestContext};

pub struct IpGuard {
    whitelist: Vec<String>,
}

impl IpGuard {
    pub fn new(whitelist: Vec<String>) -> Self {
        Self { whitelist }
    }

    /// Exact string match wins first; otherwise parse as an IPv4 CIDR
    /// (`A.B.C.D/prefix`) and test containment. IPv6 entries only match
    /// by literal equality.
    pub fn matches(&self, client_ip: &str) -> bool {
        if self.whitelist.is_empty() {
            return false;
        }
        let client_v4 = Ipv4Addr::from_str(client_ip).ok();
        for entry in &self.whitelist {
            if entry == client_ip {
                return true;
            }
            if let Some(client) = client_v4
                && let Ok(net) = Ipv4Net::from_str(entry)
                && net.contains(&client)
            {
                return true;
            }
        }
        false
    }
}

#[async_trait]
impl Filter for IpGuard {
    fn name(&self) -> &'static str {
        "ip_guard"
    }

    async fn run(&self, ctx: &mut RequestContext) -> Result<Action, GatewayError> {
        if self.matches(&ctx.client_ip) {
            Ok(Action::Continue)
        } else {
            Ok(RequestContext::reject_forbidden())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_whitelist_rejects_all() {
        let guard = IpGuard::new(vec![]);
        assert!(!guard.matches("1.2.3.4"));
    }

    #[test]
    fn exact_match_wins() {
        let guard = IpGuard::new(vec!["10.0.0.5".into()]);
        assert!(guard.matches("10.0.0.5"));
        assert!(!guard.matches("10.0.0.6"));
    }

    #[test]
    fn prefix_zero_matches_everything() {
        let guard = IpGuard::new(vec!["0.0.0.0/0".into()]);
        assert!(guard.matches("8.8.8.8"));
        assert!(guard.matches("255.255.255.255"));
    }

    #[test]
    fn prefix_32_matches_only_exact_address() {
        let guard = IpGuard::new(vec!["10.1.2.3/32".into()]);
        assert!(guard.matches("10.1.2.3"));
        assert!(!guard.matches("10.1.2.4"));
    }

    #[test]
    fn cidr_matches_masked_network() {
        let guard = IpGuard::new(vec!["192.168.1.0/24".into()]);
        assert!(guard.matches("192.168.1.200"));
        assert!(!guard.matches("192.168.2.1"));
    }

    #[test]
    fn ipv6_only_matches_literally() {
        let guard = IpGuard::new(vec!["::1".into()]);
        assert!(guard.matches("::1"));
        assert!(!guard.matches("::2"));
    }
}
