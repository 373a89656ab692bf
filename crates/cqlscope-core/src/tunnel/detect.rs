//! Database listen-address discovery on the hop host.

use std::net::Ipv4Addr;

/// Command run on the hop host to list IPv4 TCP listeners.
pub const LISTENERS_COMMAND: &str = "ss -4ntl";

/// Picks the address listening on `port` from `ss -4ntl` output.
///
/// Wildcard listeners map to the loopback address, which is reachable from
/// the hop host itself.
pub fn detect_listen_address(ss_output: &str, port: u16) -> Option<String> {
    let suffix = format!(":{port}");
    ss_output
        .lines()
        .skip_while(|line| line.trim_start().starts_with("State"))
        .flat_map(str::split_whitespace)
        .filter(|token| token.ends_with(&suffix))
        .find_map(|token| {
            let host = &token[..token.len() - suffix.len()];
            match host {
                "*" | "0.0.0.0" => Some(Ipv4Addr::LOCALHOST.to_string()),
                _ => host.parse::<Ipv4Addr>().ok().map(|ip| ip.to_string()),
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SS_OUTPUT: &str = "\
State    Recv-Q   Send-Q     Local Address:Port      Peer Address:Port  Process
LISTEN   0        128        127.0.0.53%lo:53             0.0.0.0:*
LISTEN   0        128              0.0.0.0:22             0.0.0.0:*
LISTEN   0        50          172.118.23.20:7199           0.0.0.0:*
LISTEN   0        128         172.118.23.20:9042           0.0.0.0:*
";

    #[test]
    fn test_detects_bound_address() {
        assert_eq!(detect_listen_address(SS_OUTPUT, 9042), Some("172.118.23.20".to_string()));
        assert_eq!(detect_listen_address(SS_OUTPUT, 7199), Some("172.118.23.20".to_string()));
    }

    #[test]
    fn test_wildcard_maps_to_loopback() {
        assert_eq!(detect_listen_address(SS_OUTPUT, 22), Some("127.0.0.1".to_string()));
        let star = "LISTEN 0 128 *:9042 *:*";
        assert_eq!(detect_listen_address(star, 9042), Some("127.0.0.1".to_string()));
    }

    #[test]
    fn test_no_listener() {
        assert_eq!(detect_listen_address(SS_OUTPUT, 9160), None);
        assert_eq!(detect_listen_address("", 9042), None);
    }

    #[test]
    fn test_port_suffix_must_match_exactly() {
        let output = "LISTEN 0 128 10.0.0.5:19042 0.0.0.0:*";
        assert_eq!(detect_listen_address(output, 9042), None);
    }
}
