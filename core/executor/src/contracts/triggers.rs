use bytes::Bytes;

use protocol::types::{ExecutionResult, TRIGGER_CONTRACT, TRIGGER_METHOD};

use crate::contracts::NativeContract;
use crate::sdk::{ContractResponse, SdkHandler};

/// Target of the synthetic trigger transaction that closes a block when
/// triggers are enabled. Committing the block is the side effect; the call
/// itself does nothing.
pub struct TriggersContract;

impl NativeContract for TriggersContract {
    fn name(&self) -> &str {
        TRIGGER_CONTRACT
    }

    fn call(&self, _sdk: &mut dyn SdkHandler, method: &str, _args: &[Bytes]) -> ContractResponse {
        if method != TRIGGER_METHOD {
            return ContractResponse::error(ExecutionResult::ErrorInput);
        }

        ContractResponse::success(vec![])
    }
}
