//! Protocol and configuration constants for vremote.

use std::time::Duration;

// =============================================================================
// Protocol Constants
// =============================================================================

/// Program identifier carried in every message header.
pub const REMOTE_PROGRAM: u32 = 0x2000_8086;

/// Protocol version carried in every message header.
pub const REMOTE_PROTOCOL_VERSION: u32 = 1;

/// Maximum size of a message body (header + payload), excluding the length word.
pub const REMOTE_MESSAGE_MAX: usize = 262_144;

/// Length of the frame length word (4 bytes, big-endian, counts itself).
pub const LENGTH_WORD_LEN: usize = 4;

/// Maximum length of a string on the wire.
pub const REMOTE_STRING_MAX: usize = 65_536;

/// Maximum number of domain ids in a list reply.
pub const REMOTE_DOMAIN_ID_LIST_MAX: usize = 16_384;

/// Maximum number of domain names in a list reply.
pub const REMOTE_DOMAIN_NAME_LIST_MAX: usize = 1_024;

/// Maximum number of network names in a list reply.
pub const REMOTE_NETWORK_NAME_LIST_MAX: usize = 256;

/// Length of a domain or network UUID in bytes.
pub const UUID_BUFLEN: usize = 16;

/// Length of the fixed CPU model field in node info.
pub const NODE_MODEL_LEN: usize = 32;

/// Sentinel byte the server sends once it has accepted the client certificate.
pub const TLS_LIVENESS_BYTE: u8 = 0x01;

// =============================================================================
// Transport Defaults
// =============================================================================

/// Default host when the URI names none.
pub const DEFAULT_HOST: &str = "localhost";

/// Default port for the `tls` transport.
pub const DEFAULT_TLS_PORT: u16 = 16514;

/// Default port for the `tcp` transport.
pub const DEFAULT_TCP_PORT: u16 = 16509;

/// Default port for the `ssh` transport.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Read-write daemon socket.
pub const DEFAULT_UNIX_SOCKET: &str = "/var/run/libvirt/libvirt-sock";

/// Read-only daemon socket.
pub const DEFAULT_UNIX_SOCKET_RO: &str = "/var/run/libvirt/libvirt-sock-ro";

/// SSH client used by the `ssh` transport unless `command` overrides it.
pub const DEFAULT_SSH_COMMAND: &str = "ssh";

/// Relay command run on the remote host by the `ssh` transport.
pub const DEFAULT_NETCAT: &str = "nc";

/// How long a relay helper may take to exit after its stdin closes before
/// it is killed.
pub const RELAY_EXIT_GRACE: Duration = Duration::from_millis(500);

// =============================================================================
// TLS Credential Locations
// =============================================================================

/// Trusted CA certificate(s).
pub const DEFAULT_CA_CERT: &str = "/etc/pki/CA/cacert.pem";

/// Client certificate presented to the daemon.
pub const DEFAULT_CLIENT_CERT: &str = "/etc/pki/libvirt/clientcert.pem";

/// Private key for the client certificate.
pub const DEFAULT_CLIENT_KEY: &str = "/etc/pki/libvirt/private/clientkey.pem";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ports_are_distinct() {
        assert_ne!(DEFAULT_TLS_PORT, DEFAULT_TCP_PORT);
        assert_ne!(DEFAULT_TLS_PORT, DEFAULT_SSH_PORT);
    }

    #[test]
    fn read_only_socket_differs() {
        assert_ne!(DEFAULT_UNIX_SOCKET, DEFAULT_UNIX_SOCKET_RO);
        assert!(DEFAULT_UNIX_SOCKET_RO.starts_with(DEFAULT_UNIX_SOCKET));
    }

    #[test]
    fn message_max_fits_length_word() {
        assert!(REMOTE_MESSAGE_MAX + LENGTH_WORD_LEN < u32::MAX as usize);
        assert!(REMOTE_STRING_MAX < REMOTE_MESSAGE_MAX);
    }
}
