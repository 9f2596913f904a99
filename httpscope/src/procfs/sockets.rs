//! Local TCP listeners and the processes that own them, from
//! `/proc/net/tcp{,6}` and `/proc/<pid>/fd`.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::Path;

use tracing::{debug, trace};

/// `st` column value of a listening socket
pub const TCP_LISTEN: u8 = 0x0A;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenSocket {
    pub addr: SocketAddr,
    pub inode: u64,
}

/// Parse the listening sockets out of a `/proc/net/tcp` or `/proc/net/tcp6`
/// table. The header and malformed rows are skipped.
pub fn parse_net_tcp(table: &str) -> Vec<ListenSocket> {
    table.lines().filter_map(parse_row).collect()
}

fn parse_row(row: &str) -> Option<ListenSocket> {
    let fields: Vec<&str> = row.split_whitespace().collect();
    if fields.len() < 10 {
        return None;
    }
    let state = u8::from_str_radix(fields[3], 16).ok()?;
    if state != TCP_LISTEN {
        return None;
    }
    Some(ListenSocket {
        addr: parse_hex_socket_addr(fields[1])?,
        inode: fields[9].parse().ok()?,
    })
}

/// `ADDR:PORT` where the address is printed as native-endian 32-bit words
/// and the port in host order.
fn parse_hex_socket_addr(field: &str) -> Option<SocketAddr> {
    let (addr, port) = field.split_once(':')?;
    let port = u16::from_str_radix(port, 16).ok()?;
    let ip = match addr.len() {
        8 => IpAddr::V4(Ipv4Addr::from(hex_word(addr)?.to_ne_bytes())),
        32 => {
            let mut octets = [0u8; 16];
            for (i, chunk) in octets.chunks_exact_mut(4).enumerate() {
                chunk.copy_from_slice(&hex_word(addr.get(i * 8..i * 8 + 8)?)?.to_ne_bytes());
            }
            IpAddr::V6(Ipv6Addr::from(octets))
        }
        _ => return None,
    };
    Some(SocketAddr::new(ip, port))
}

fn hex_word(hex: &str) -> Option<u32> {
    u32::from_str_radix(hex, 16).ok()
}

/// Socket inode to owning PID over every process under `proc_root`. When a
/// socket is shared the smallest PID wins.
pub fn socket_owners(proc_root: &Path) -> HashMap<u64, u32> {
    let mut owners = HashMap::new();
    let Ok(entries) = std::fs::read_dir(proc_root) else {
        return owners;
    };

    for entry in entries.flatten() {
        let Some(pid) = entry.file_name().to_str().and_then(|n| n.parse::<u32>().ok()) else {
            continue;
        };
        // Processes come and go, and most fd tables need privileges
        let Ok(fds) = std::fs::read_dir(entry.path().join("fd")) else {
            continue;
        };
        for fd in fds.flatten() {
            let Some(inode) = std::fs::read_link(fd.path())
                .ok()
                .and_then(|target| socket_inode(&target.to_string_lossy()))
            else {
                continue;
            };
            owners
                .entry(inode)
                .and_modify(|owner: &mut u32| *owner = (*owner).min(pid))
                .or_insert(pid);
        }
    }
    owners
}

/// Inode of a `socket:[N]` fd link target.
fn socket_inode(link: &str) -> Option<u64> {
    link.strip_prefix("socket:[")?.strip_suffix(']')?.parse().ok()
}

/// Listening addresses with the PID that owns each.
#[derive(Debug, Clone, Default)]
pub struct ListenerTable {
    listeners: Vec<(SocketAddr, u32)>,
}

impl ListenerTable {
    /// Snapshot the listeners visible under `proc_root` (normally `/proc`).
    pub fn scan(proc_root: &Path) -> Self {
        let mut sockets = Vec::new();
        for table in ["net/tcp", "net/tcp6"] {
            match std::fs::read_to_string(proc_root.join(table)) {
                Ok(content) => sockets.extend(parse_net_tcp(&content)),
                Err(e) => debug!("Cannot read {}: {}", proc_root.join(table).display(), e),
            }
        }
        let table = Self::from_parts(&sockets, &socket_owners(proc_root));
        debug!(
            "Found {} listening sockets, {} with a known owner",
            sockets.len(),
            table.listeners.len()
        );
        table
    }

    pub fn from_parts(sockets: &[ListenSocket], owners: &HashMap<u64, u32>) -> Self {
        let listeners = sockets
            .iter()
            .filter_map(|sock| {
                let owner = owners.get(&sock.inode).copied();
                if owner.is_none() {
                    trace!("No owner for listener {} (inode {})", sock.addr, sock.inode);
                }
                Some((canonical(sock.addr), owner?))
            })
            .collect();
        Self { listeners }
    }

    /// PID of the process accepting connections to `addr`. An exact address
    /// match is preferred over a wildcard listener on the same port.
    pub fn owner_of(&self, addr: SocketAddr) -> Option<u32> {
        let addr = canonical(addr);
        let on_port = || {
            self.listeners
                .iter()
                .filter(move |(listen, _)| listen.port() == addr.port())
        };

        on_port()
            .filter(|(listen, _)| listen.ip() == addr.ip())
            .map(|&(_, pid)| pid)
            .min()
            .or_else(|| {
                on_port()
                    .filter(|(listen, _)| accepts_any(listen.ip(), addr.ip()))
                    .map(|&(_, pid)| pid)
                    .min()
            })
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

/// Whether a wildcard listener on `listen` accepts connections to `dest`.
/// An IPv6 wildcard also accepts IPv4 unless the socket is v6-only, which
/// the table does not tell us.
fn accepts_any(listen: IpAddr, dest: IpAddr) -> bool {
    match listen {
        IpAddr::V4(ip) => ip.is_unspecified() && dest.is_ipv4(),
        IpAddr::V6(ip) => ip.is_unspecified(),
    }
}

/// IPv4-mapped IPv6 addresses as plain IPv4.
fn canonical(addr: SocketAddr) -> SocketAddr {
    match addr.ip() {
        IpAddr::V6(ip) => match ip.to_ipv4_mapped() {
            Some(v4) => SocketAddr::new(IpAddr::V4(v4), addr.port()),
            None => addr,
        },
        IpAddr::V4(_) => addr,
    }
}
