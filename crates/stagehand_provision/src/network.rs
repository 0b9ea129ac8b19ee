//! Per-job network allocation.
//!
//! The backend picks the address space by default. When its pools are exhausted the
//! allocator scans a fixed private range block by block, in ascending order, and claims
//! the first block that overlaps no existing network.

use crate::store::JobRecorder;

use stagehand_core::prelude::*;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// How often a freshly found block may be lost to a concurrent claim before giving up.
const MAX_CLAIM_RACES: usize = 3;

/// An IPv4 CIDR block. The address is always the network address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Ipv4Block {
    network: Ipv4Addr,
    prefix: u8,
}

impl Ipv4Block {
    /// Masks `addr` down to its network address. [`None`] if `prefix > 32`.
    pub fn new(addr: Ipv4Addr, prefix: u8) -> Option<Self> {
        if prefix > 32 {
            return None;
        }
        let network = Ipv4Addr::from(u32::from(addr) & mask(prefix));
        Some(Self { network, prefix })
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    fn first(&self) -> u32 {
        u32::from(self.network)
    }

    fn last(&self) -> u32 {
        self.first() | !mask(self.prefix)
    }

    pub fn overlaps(&self, other: &Ipv4Block) -> bool {
        self.first() <= other.last() && other.first() <= self.last()
    }

    /// First host address, conventionally the gateway.
    pub fn gateway(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.first().saturating_add(1))
    }
}

fn mask(prefix: u8) -> u32 {
    match prefix {
        0 => 0,
        p => u32::MAX << (32 - u32::from(p)),
    }
}

impl fmt::Display for Ipv4Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseBlockError(String);

impl fmt::Display for ParseBlockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid IPv4 CIDR block '{}'", self.0)
    }
}

impl std::error::Error for ParseBlockError {}

impl FromStr for Ipv4Block {
    type Err = ParseBlockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseBlockError(s.to_string());
        let (addr, prefix) = s.trim().split_once('/').ok_or_else(err)?;
        let addr: Ipv4Addr = addr.parse().map_err(|_| err())?;
        let prefix: u8 = prefix.parse().map_err(|_| err())?;
        Ipv4Block::new(addr, prefix).ok_or_else(err)
    }
}

/// The range scanned when the backend's default pools are exhausted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubnetSearch {
    pub start: Ipv4Addr,
    /// Inclusive upper bound; a candidate must end at or before it.
    pub end: Ipv4Addr,
    /// Size of each candidate block.
    pub prefix: u8,
}

impl Default for SubnetSearch {
    /// `172.17.0.0` through `172.31.255.255` in `/24` blocks.
    fn default() -> Self {
        Self {
            start: Ipv4Addr::new(172, 17, 0, 0),
            end: Ipv4Addr::new(172, 31, 255, 255),
            prefix: 24,
        }
    }
}

impl SubnetSearch {
    /// Candidate blocks in ascending order.
    pub fn candidates(&self) -> impl Iterator<Item = Ipv4Block> + use<> {
        let prefix = self.prefix.min(32);
        let size = 1u64 << (32 - u32::from(prefix));
        let first = (u64::from(u32::from(self.start)) + size - 1) / size * size;
        let end = u64::from(u32::from(self.end));

        (0..)
            .map(move |i| first + i * size)
            .take_while(move |base| base + size - 1 <= end)
            .filter_map(move |base| Ipv4Block::new(Ipv4Addr::from(base as u32), prefix))
    }

    /// The first candidate overlapping none of `claimed`.
    pub fn find_free(&self, claimed: &[Ipv4Block]) -> Option<Ipv4Block> {
        self.candidates()
            .find(|candidate| !claimed.iter().any(|c| candidate.overlaps(c)))
    }
}

/// Parses the IPv4 blocks out of backend-reported subnets. Other entries (IPv6,
/// garbage) can't collide with an IPv4 candidate and are skipped.
pub fn claimed_blocks(networks: &[NetworkInfo]) -> Vec<Ipv4Block> {
    networks
        .iter()
        .flat_map(|n| n.subnets.iter())
        .filter_map(|s| s.parse().ok())
        .collect()
}

/// Creates the job's network, falling back to an explicit subnet on exhaustion.
pub async fn allocate_network<B: ResourceBackend>(
    backend: &B,
    recorder: &JobRecorder,
    spec: NetworkSpec,
    search: &SubnetSearch,
) -> Result<NetworkInfo, JobError> {
    recorder.note(format!("Creating network: {}", spec.name));

    let reason = match backend.create_network(&spec).await {
        Ok(network) => {
            recorder.info(LogCode::NetworkCreated, format!("Network '{}' created.", network.name));
            return Ok(network);
        }
        Err(BackendError::AddressSpaceExhausted(reason)) => reason,
        Err(e) => return Err(e.into()),
    };

    tracing::warn!(network = %spec.name, %reason, "Default address pools exhausted");
    recorder.warn(
        LogCode::SubnetFallback,
        "Default network pool exhausted. Searching for a free subnet...",
    );

    let exhausted = || JobError::SubnetSearchExhausted {
        start: search.start.to_string(),
        end: search.end.to_string(),
        prefix: search.prefix,
    };

    // Another job may claim the same block between listing and creating; the backend
    // rejects the overlap and the next free block is tried.
    let mut lost: Vec<Ipv4Block> = Vec::new();
    loop {
        let existing = backend.list_networks(None).await?;
        let mut claimed = claimed_blocks(&existing);
        claimed.extend_from_slice(&lost);
        let block = search.find_free(&claimed).ok_or_else(exhausted)?;
        recorder.info(LogCode::SubnetFound, format!("Found non-overlapping subnet: {block}"));

        let explicit = NetworkSpec {
            subnet: Some(block.to_string()),
            gateway: Some(block.gateway().to_string()),
            ..spec.clone()
        };
        match backend.create_network(&explicit).await {
            Ok(network) => {
                recorder.info(
                    LogCode::NetworkCreated,
                    format!("Network '{}' created with custom subnet {block}.", network.name),
                );
                return Ok(network);
            }
            Err(BackendError::InvalidRequest(reason)) if lost.len() < MAX_CLAIM_RACES => {
                tracing::warn!(network = %spec.name, %block, %reason, "Subnet claimed concurrently, retrying");
                lost.push(block);
            }
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(s: &str) -> Ipv4Block {
        s.parse().unwrap()
    }

    #[test]
    fn parsing_masks_host_bits() {
        assert_eq!(block("10.1.2.3/16").to_string(), "10.1.0.0/16");
        assert!("10.0.0.0/33".parse::<Ipv4Block>().is_err());
        assert!("fd00::/64".parse::<Ipv4Block>().is_err());
        assert!("10.0.0.0".parse::<Ipv4Block>().is_err());
    }

    #[test]
    fn overlap_covers_nesting_and_adjacency() {
        assert!(block("172.17.0.0/16").overlaps(&block("172.17.3.0/24")));
        assert!(block("172.17.3.0/24").overlaps(&block("172.17.0.0/16")));
        assert!(!block("172.17.0.0/24").overlaps(&block("172.17.1.0/24")));
        assert!(block("0.0.0.0/0").overlaps(&block("8.8.8.0/24")));
    }

    #[test]
    fn gateway_is_first_host() {
        assert_eq!(block("172.17.2.0/24").gateway(), Ipv4Addr::new(172, 17, 2, 1));
    }

    #[test]
    fn candidates_ascend_through_the_range() {
        let search = SubnetSearch::default();
        let mut candidates = search.candidates();
        assert_eq!(candidates.next(), Some(block("172.17.0.0/24")));
        assert_eq!(candidates.next(), Some(block("172.17.1.0/24")));
        assert_eq!(search.candidates().count(), 15 * 256);
        assert_eq!(search.candidates().last(), Some(block("172.31.255.0/24")));
    }

    #[test]
    fn unaligned_start_rounds_up() {
        let search = SubnetSearch {
            start: Ipv4Addr::new(10, 0, 0, 7),
            end: Ipv4Addr::new(10, 0, 3, 255),
            prefix: 24,
        };
        assert_eq!(search.candidates().next(), Some(block("10.0.1.0/24")));
        assert_eq!(search.candidates().count(), 3);
    }

    #[test]
    fn first_free_block_wins() {
        let claimed = [
            block("172.17.0.0/24"),
            block("172.17.1.0/24"),
            block("172.18.5.0/24"),
        ];
        assert_eq!(
            SubnetSearch::default().find_free(&claimed),
            Some(block("172.17.2.0/24"))
        );
    }

    #[test]
    fn wide_claims_push_the_search_forward() {
        let claimed = [block("172.16.0.0/12")];
        assert_eq!(SubnetSearch::default().find_free(&claimed), None);

        let claimed = [block("172.17.0.0/16"), block("172.18.0.0/24")];
        assert_eq!(
            SubnetSearch::default().find_free(&claimed),
            Some(block("172.18.1.0/24"))
        );
    }

    #[test]
    fn result_never_overlaps_claims() {
        let claimed: Vec<Ipv4Block> = (0..200)
            .map(|i| block(&format!("172.{}.{}.0/24", 17 + i % 3, i)))
            .collect();
        let found = SubnetSearch::default().find_free(&claimed).unwrap();
        assert!(claimed.iter().all(|c| !c.overlaps(&found)));
    }

    #[test]
    fn non_ipv4_subnets_are_ignored() {
        let networks = vec![NetworkInfo {
            id: "1".into(),
            name: "bridge".into(),
            subnets: vec!["172.17.0.0/16".into(), "fd00:dead::/64".into()],
        }];
        assert_eq!(claimed_blocks(&networks), vec![block("172.17.0.0/16")]);
    }
}
