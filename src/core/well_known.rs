//! Reference table of common service ports shown next to open ports in the UI
//!
//! Redis-Sentinel is listed at its registered port 26379, not 56379.

use std::collections::BTreeMap;

const WELL_KNOWN_PORTS: &[(u16, &str)] = &[
    (20, "FTP-Data"),
    (21, "FTP"),
    (22, "SSH"),
    (23, "Telnet"),
    (25, "SMTP"),
    (53, "DNS"),
    (67, "DHCP-Server"),
    (68, "DHCP-Client"),
    (69, "TFTP"),
    (80, "HTTP"),
    (110, "POP3"),
    (123, "NTP"),
    (137, "NetBIOS-NS"),
    (138, "NetBIOS-DGM"),
    (139, "NetBIOS-SSN"),
    (143, "IMAP"),
    (161, "SNMP"),
    (389, "LDAP"),
    (443, "HTTPS"),
    (465, "SMTPS"),
    (587, "SMTP-Submission"),
    (993, "IMAPS"),
    (995, "POP3S"),
    (1433, "MSSQL"),
    (1521, "Oracle DB"),
    (2049, "NFS"),
    (2181, "Zookeeper"),
    (2379, "etcd"),
    (2380, "etcd-peer"),
    (3000, "Node Dev (Dont off)"),
    (3306, "MySQL"),
    (3389, "RDP"),
    (5432, "PostgreSQL"),
    (5672, "RabbitMQ"),
    (5900, "VNC"),
    (6379, "Redis"),
    (8000, "HTTP-Alt"),
    (8080, "HTTP-Alt"),
    (9000, "App"),
    (9200, "Elasticsearch"),
    (9300, "ES-Transport"),
    (26379, "Redis-Sentinel"),
    (27017, "MongoDB"),
];

/// Port number → service name, serialized as a JSON object keyed by port.
pub fn well_known_ports() -> BTreeMap<u16, &'static str> {
    WELL_KNOWN_PORTS.iter().copied().collect()
}

pub fn service_name(port: u16) -> Option<&'static str> {
    WELL_KNOWN_PORTS
        .iter()
        .find(|(p, _)| *p == port)
        .map(|(_, name)| *name)
}
