//! Snapshot Loader - CHUNKED Edition
//!
//! Step 1.1: The Surveyor
//!
//! Turns trust and balance records into the parallel edge lists the capacity
//! network is built from. Trust records are processed in fixed-size chunks so
//! peak memory stays bounded on networks with millions of rows. Chunks are
//! expanded in parallel; merging into the global edge set is single-writer.

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, info, warn};

use super::graph::{AccountId, Capacity, Vertex};
use super::records::{BalanceRecord, TrustRecord};
use crate::error::IngestionError;

// ============================================
// CONSTANTS
// ============================================

/// Trust rows per chunk
pub const DEFAULT_CHUNK_SIZE: usize = 100_000;

/// Raw balances carry 18 decimals; capacities keep 3
pub const BALANCE_SCALE: u128 = 1_000_000_000_000_000;

/// Upper bound for a single edge capacity. Keeps solver sums far from overflow.
pub const MAX_EDGE_CAPACITY: Capacity = 1 << 48;

/// Convert a raw fixed-point amount into a capacity.
///
/// Empty amounts are zero. Anything that is not a non-negative integer is
/// logged and treated as zero.
pub fn convert_balance(raw: Option<&str>) -> Capacity {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return 0;
    };

    match raw.parse::<u128>() {
        Ok(value) => {
            let scaled = value / BALANCE_SCALE;
            if scaled > MAX_EDGE_CAPACITY as u128 {
                warn!("Balance {} exceeds max edge capacity, clamping", raw);
                MAX_EDGE_CAPACITY
            } else {
                scaled as Capacity
            }
        }
        Err(_) => {
            warn!("Unable to convert balance: {}", raw);
            0
        }
    }
}

// ============================================
// TYPES
// ============================================

/// Ingestion knobs
#[derive(Debug, Clone, Copy)]
pub struct LoaderOptions {
    pub chunk_size: usize,
    pub show_progress: bool,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            show_progress: false,
        }
    }
}

/// One candidate edge produced while expanding a chunk
#[derive(Debug, Clone, Copy)]
struct CandidateEdge {
    from: Vertex,
    to: Vertex,
    capacity: Capacity,
    token: AccountId,
}

/// Edge collection deduplicated by `(from, to)`, keeping max capacity.
/// Insertion order of first occurrences is preserved.
#[derive(Debug, Default)]
struct EdgeSet {
    index: HashMap<(Vertex, Vertex), usize>,
    edges: Vec<CandidateEdge>,
}

impl EdgeSet {
    fn insert(&mut self, edge: CandidateEdge) {
        match self.index.get(&(edge.from, edge.to)) {
            Some(&i) => {
                let kept = &mut self.edges[i];
                kept.capacity = kept.capacity.max(edge.capacity);
            }
            None => {
                self.index.insert((edge.from, edge.to), self.edges.len());
                self.edges.push(edge);
            }
        }
    }

    fn len(&self) -> usize {
        self.edges.len()
    }
}

/// Result of one ingestion pass: a stable address/id mapping plus parallel
/// edge, capacity and token lists with unique `(from, to)` pairs.
#[derive(Debug, Clone)]
pub struct GraphLoader {
    address_to_id: HashMap<String, AccountId>,
    id_to_address: Vec<String>,
    pub edges: Vec<(Vertex, Vertex)>,
    pub capacities: Vec<Capacity>,
    pub tokens: Vec<AccountId>,
}

impl GraphLoader {
    pub fn new(trusts: &[TrustRecord], balances: &[BalanceRecord]) -> Result<Self, IngestionError> {
        Self::with_options(trusts, balances, LoaderOptions::default())
    }

    pub fn with_options(
        trusts: &[TrustRecord],
        balances: &[BalanceRecord],
        options: LoaderOptions,
    ) -> Result<Self, IngestionError> {
        check_required_fields(trusts, balances)?;

        let chunk_size = options.chunk_size.max(1);
        let (address_to_id, id_to_address) = assign_ids(trusts, balances);

        let mut loader = Self {
            address_to_id,
            id_to_address,
            edges: Vec::new(),
            capacities: Vec::new(),
            tokens: Vec::new(),
        };

        let balance_index = loader.build_balance_index(balances);

        // Holders that never trust anyone still get a self-trust row
        let trusters: HashSet<AccountId> = trusts
            .iter()
            .filter_map(|t| loader.get_id_for_address(&t.truster))
            .collect();
        let holder_rows: Vec<(AccountId, AccountId)> = balance_index
            .values()
            .flatten()
            .map(|&(holder, _)| holder)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .filter(|holder| !trusters.contains(holder))
            .map(|holder| (holder, holder))
            .collect();

        let total_chunks = trusts.len().div_ceil(chunk_size) + holder_rows.len().div_ceil(chunk_size);
        let progress = if options.show_progress {
            let bar = ProgressBar::new(total_chunks as u64);
            if let Ok(style) = ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} chunks") {
                bar.set_style(style);
            }
            bar
        } else {
            ProgressBar::hidden()
        };

        let trust_chunks: Vec<Vec<CandidateEdge>> = trusts
            .par_chunks(chunk_size)
            .map(|chunk| {
                let rows = loader.normalize_chunk(chunk);
                let edges = expand_chunk(&rows, &balance_index);
                progress.inc(1);
                edges
            })
            .collect();

        let holder_chunks: Vec<Vec<CandidateEdge>> = holder_rows
            .par_chunks(chunk_size)
            .map(|rows| {
                let edges = expand_chunk(rows, &balance_index);
                progress.inc(1);
                edges
            })
            .collect();

        progress.finish_and_clear();

        // Single writer from here on
        let mut edge_set = EdgeSet::default();
        let mut candidates = 0usize;
        for chunk in trust_chunks.into_iter().chain(holder_chunks) {
            candidates += chunk.len();
            for edge in chunk {
                edge_set.insert(edge);
            }
        }

        debug!(
            "Deduplicated {} candidate edges into {}",
            candidates,
            edge_set.len()
        );

        for edge in edge_set.edges {
            loader.edges.push((edge.from, edge.to));
            loader.capacities.push(edge.capacity);
            loader.tokens.push(edge.token);
        }

        info!(
            "Ingested {} trust records and {} balances: {} accounts, {} edges ({} chunks)",
            trusts.len(),
            balances.len(),
            loader.num_accounts(),
            loader.edges.len(),
            total_chunks
        );

        Ok(loader)
    }

    /// token -> [(holder, capacity)], zero balances dropped
    fn build_balance_index(&self, balances: &[BalanceRecord]) -> HashMap<AccountId, Vec<(AccountId, Capacity)>> {
        let mut index: HashMap<AccountId, Vec<(AccountId, Capacity)>> = HashMap::new();
        let mut skipped_zero = 0usize;

        for record in balances {
            let capacity = convert_balance(record.demurraged_total_balance.as_deref());
            if capacity == 0 {
                skipped_zero += 1;
                continue;
            }

            let (Some(holder), Some(token)) = (
                self.get_id_for_address(&record.account),
                self.get_id_for_address(&record.token_address),
            ) else {
                warn!("Balance row {} / {} has no id, skipping", record.account, record.token_address);
                continue;
            };

            index.entry(token).or_default().push((holder, capacity));
        }

        if skipped_zero > 0 {
            debug!("Skipped {} zero balances", skipped_zero);
        }

        index
    }

    /// Case-fold a chunk of trust rows and map them to ids
    fn normalize_chunk(&self, chunk: &[TrustRecord]) -> Vec<(AccountId, AccountId)> {
        chunk
            .iter()
            .filter_map(|record| {
                Some((
                    self.get_id_for_address(&record.truster)?,
                    self.get_id_for_address(&record.trustee)?,
                ))
            })
            .collect()
    }

    /// Lookup is case-insensitive and ignores surrounding whitespace
    pub fn get_id_for_address(&self, address: &str) -> Option<AccountId> {
        self.address_to_id.get(&normalize_address(address)).copied()
    }

    pub fn get_address_for_id(&self, id: AccountId) -> Option<&str> {
        self.id_to_address.get(id as usize).map(String::as_str)
    }

    pub fn num_accounts(&self) -> usize {
        self.id_to_address.len()
    }
}

fn check_required_fields(trusts: &[TrustRecord], balances: &[BalanceRecord]) -> Result<(), IngestionError> {
    for (row, record) in trusts.iter().enumerate() {
        for (field, value) in [("truster", &record.truster), ("trustee", &record.trustee)] {
            if value.trim().is_empty() {
                return Err(IngestionError::MissingField { kind: "trust", row, field });
            }
        }
    }

    for (row, record) in balances.iter().enumerate() {
        for (field, value) in [("account", &record.account), ("tokenAddress", &record.token_address)] {
            if value.trim().is_empty() {
                return Err(IngestionError::MissingField { kind: "balance", row, field });
            }
        }
    }

    Ok(())
}

/// Canonical map key for an address
fn normalize_address(address: &str) -> String {
    address.trim().to_lowercase()
}

/// First-seen ids over trustees, trusters, balance accounts, then tokens
fn assign_ids(trusts: &[TrustRecord], balances: &[BalanceRecord]) -> (HashMap<String, AccountId>, Vec<String>) {
    let mut address_to_id = HashMap::new();
    let mut id_to_address = Vec::new();

    let columns = trusts
        .iter()
        .map(|t| t.trustee.as_str())
        .chain(trusts.iter().map(|t| t.truster.as_str()))
        .chain(balances.iter().map(|b| b.account.as_str()))
        .chain(balances.iter().map(|b| b.token_address.as_str()));

    for address in columns {
        let address = normalize_address(address);
        if !address_to_id.contains_key(&address) {
            address_to_id.insert(address.clone(), id_to_address.len() as AccountId);
            id_to_address.push(address);
        }
    }

    (address_to_id, id_to_address)
}

/// Expand `(truster, trustee)` rows into candidate edges.
///
/// Adds a self-trust row for every truster in the chunk, then emits
/// holder -> holding edges for every trusted token and holding -> truster
/// edges for every trust relation. Deduplicated within the chunk.
fn expand_chunk(
    rows: &[(AccountId, AccountId)],
    balance_index: &HashMap<AccountId, Vec<(AccountId, Capacity)>>,
) -> Vec<CandidateEdge> {
    let trusters: BTreeSet<AccountId> = rows.iter().map(|&(truster, _)| truster).collect();
    let self_trust: Vec<(AccountId, AccountId)> = trusters.iter().map(|&t| (t, t)).collect();
    let all_rows = rows.iter().chain(self_trust.iter());

    let relevant_tokens: BTreeSet<AccountId> = rows
        .iter()
        .map(|&(_, trustee)| trustee)
        .chain(trusters.iter().copied())
        .collect();

    let mut edge_set = EdgeSet::default();

    for &token in &relevant_tokens {
        for &(holder, capacity) in balance_index.get(&token).into_iter().flatten() {
            edge_set.insert(CandidateEdge {
                from: Vertex::Account(holder),
                to: Vertex::holding(holder, token),
                capacity,
                token,
            });
        }
    }

    for &(truster, trustee) in all_rows {
        for &(holder, capacity) in balance_index.get(&trustee).into_iter().flatten() {
            if holder == truster {
                continue;
            }
            edge_set.insert(CandidateEdge {
                from: Vertex::holding(holder, trustee),
                to: Vertex::Account(truster),
                capacity,
                token: trustee,
            });
        }
    }

    edge_set.edges
}
