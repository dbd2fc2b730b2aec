use protocol::traits::Context;

const TXS_ORIGIN_KEY: &str = "txs_origin";
const NETWORK_TXS: usize = 1;

/// Marks transactions that arrived over gossip so they are not forwarded
/// again.
pub trait TxContext {
    fn mark_network_origin_txs(&self) -> Self;

    fn is_network_origin_txs(&self) -> bool;
}

impl TxContext for Context {
    fn mark_network_origin_txs(&self) -> Self {
        self.with_value::<usize>(TXS_ORIGIN_KEY, NETWORK_TXS)
    }

    fn is_network_origin_txs(&self) -> bool {
        self.get::<usize>(TXS_ORIGIN_KEY) == Some(&NETWORK_TXS)
    }
}
