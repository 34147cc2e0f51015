use std::fmt;
use std::net::SocketAddr;

use crate::route::ConnectionId;

/// Point-in-time view of the server, as printed by the `status` command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Status {
    pub connections: Vec<ConnectionStatus>,
    pub domains: Vec<DomainStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub id: ConnectionId,
    pub peer: SocketAddr,
    pub domains: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainStatus {
    pub domain: String,
    pub peers: Vec<SocketAddr>,
}

impl Status {
    pub fn domain(&self, domain: &str) -> Option<&DomainStatus> {
        self.domains.iter().find(|d| d.domain == domain)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "connections: {}", self.connections.len())?;
        for connection in &self.connections {
            write!(f, "  {} {}", connection.id, connection.peer)?;
            if !connection.domains.is_empty() {
                write!(f, " [{}]", connection.domains.join(", "))?;
            }
            writeln!(f)?;
        }
        write!(f, "domains: {}", self.domains.len())?;
        for domain in &self.domains {
            write!(f, "\n  {} -> ", domain.domain)?;
            let peers: Vec<String> = domain.peers.iter().map(ToString::to_string).collect();
            write!(f, "{}", peers.join(", "))?;
        }
        Ok(())
    }
}
