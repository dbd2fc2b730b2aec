use serde_derive::Deserialize;

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusAlgo {
    Benchmark,
}

#[derive(Clone, Debug, Deserialize)]
pub struct FederationNode {
    /// Hex node address.
    pub address: String,
    /// Hex raw public key.
    pub pubkey:  String,
}

/// The core-relevant configuration surface. Field names are the config keys.
#[derive(Clone, Debug, Deserialize)]
pub struct NodeConfig {
    // identity and federation
    pub federation_nodes:          Vec<FederationNode>,
    /// Hex public key of the fixed benchmark-consensus leader.
    pub constant_consensus_leader: String,
    pub active_consensus_algo:     ConsensusAlgo,
    pub virtual_chain_id:          u32,
    pub protocol_version_min:      u32,
    pub protocol_version_max:      u32,

    // consensus rounds
    #[serde(default = "default_benchmark_round_retry_interval_ms")]
    pub benchmark_round_retry_interval_ms: u64,
    #[serde(default)]
    pub consensus_context_triggers_enabled: bool,
    #[serde(default = "default_allowed_timestamp_jitter_ms")]
    pub allowed_timestamp_jitter_ms: u64,

    // block sync
    #[serde(default = "default_block_sync_no_commit_interval_ms")]
    pub block_sync_no_commit_interval_ms: u64,
    #[serde(default = "default_block_sync_commit_timeout_ms")]
    pub block_sync_commit_timeout_ms: u64,
    #[serde(default = "default_block_sync_batch_size")]
    pub block_sync_batch_size: usize,

    // state storage
    #[serde(default = "default_state_history_retention_block_heights")]
    pub state_history_retention_block_heights: u64,
    #[serde(default = "default_query_sync_grace_block_dist")]
    pub query_sync_grace_block_dist: u64,
    #[serde(default = "default_query_grace_timeout_ms")]
    pub query_grace_timeout_ms: u64,

    // transaction pool
    #[serde(default = "default_below_minimal_block_delay_ms")]
    pub below_minimal_block_delay_ms: u64,
    #[serde(default = "default_minimum_transactions_in_block")]
    pub minimum_transactions_in_block: usize,
    #[serde(default = "default_empty_block_delay_ms")]
    pub empty_block_delay_ms: u64,
    #[serde(default = "default_tx_expiration_window_ms")]
    pub tx_expiration_window_ms: u64,
    #[serde(default = "default_committed_retention_ms")]
    pub committed_retention_ms: u64,
    #[serde(default = "default_pending_pool_size")]
    pub pending_pool_size: usize,
    #[serde(default = "default_forward_batch_size")]
    pub forward_batch_size: usize,
    #[serde(default = "default_forward_interval_ms")]
    pub forward_interval_ms: u64,

    // persistence
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_blocks_filename")]
    pub blocks_filename: String,
}

fn default_benchmark_round_retry_interval_ms() -> u64 {
    2_000
}

fn default_allowed_timestamp_jitter_ms() -> u64 {
    60_000
}

fn default_block_sync_no_commit_interval_ms() -> u64 {
    8_000
}

fn default_block_sync_commit_timeout_ms() -> u64 {
    30_000
}

fn default_block_sync_batch_size() -> usize {
    10
}

fn default_state_history_retention_block_heights() -> u64 {
    5
}

fn default_query_sync_grace_block_dist() -> u64 {
    3
}

fn default_query_grace_timeout_ms() -> u64 {
    5_000
}

fn default_below_minimal_block_delay_ms() -> u64 {
    300
}

fn default_minimum_transactions_in_block() -> usize {
    1
}

fn default_empty_block_delay_ms() -> u64 {
    1_000
}

fn default_tx_expiration_window_ms() -> u64 {
    1_800_000
}

fn default_committed_retention_ms() -> u64 {
    1_800_000
}

fn default_pending_pool_size() -> usize {
    100_000
}

fn default_forward_batch_size() -> usize {
    100
}

fn default_forward_interval_ms() -> u64 {
    200
}

fn default_data_dir() -> String {
    "./data".to_owned()
}

fn default_blocks_filename() -> String {
    "blocks".to_owned()
}
