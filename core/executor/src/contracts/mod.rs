mod global_pre_order;
mod token;
mod triggers;

use bytes::Bytes;

use crate::sdk::{ContractResponse, SdkHandler};

pub use global_pre_order::{
    GlobalPreOrderContract, GLOBAL_PRE_ORDER_CONTRACT, GLOBAL_PRE_ORDER_METHOD,
    SUBSCRIPTION_ACTIVE_KEY,
};
pub use token::{BenchmarkTokenContract, BENCHMARK_TOKEN_CONTRACT};
pub use triggers::TriggersContract;

/// A pre-bundled native contract. Everything it touches goes through the
/// sdk handler it is given.
pub trait NativeContract: Send + Sync {
    fn name(&self) -> &str;

    fn call(&self, sdk: &mut dyn SdkHandler, method: &str, args: &[Bytes]) -> ContractResponse;
}

/// The default contract set a node ships with.
pub fn builtin_contracts() -> Vec<std::sync::Arc<dyn NativeContract>> {
    vec![
        std::sync::Arc::new(GlobalPreOrderContract),
        std::sync::Arc::new(TriggersContract),
        std::sync::Arc::new(BenchmarkTokenContract),
    ]
}
