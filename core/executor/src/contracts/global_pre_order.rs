use bytes::Bytes;

use protocol::types::ExecutionResult;

use crate::contracts::NativeContract;
use crate::sdk::{ContractResponse, SdkHandler};

pub const GLOBAL_PRE_ORDER_CONTRACT: &str = "_GlobalPreOrder";
pub const GLOBAL_PRE_ORDER_METHOD: &str = "approve";

/// Subscription flag; any value other than `b"0"` (or absence) approves.
pub const SUBSCRIPTION_ACTIVE_KEY: &[u8] = b"subscription/active";

/// Validates block-scoped conditions once per block before ordering. A
/// failure here rejects every transaction of the block.
pub struct GlobalPreOrderContract;

impl NativeContract for GlobalPreOrderContract {
    fn name(&self) -> &str {
        GLOBAL_PRE_ORDER_CONTRACT
    }

    fn call(&self, sdk: &mut dyn SdkHandler, method: &str, _args: &[Bytes]) -> ContractResponse {
        if method != GLOBAL_PRE_ORDER_METHOD {
            return ContractResponse::error(ExecutionResult::ErrorInput);
        }

        let key = Bytes::copy_from_slice(SUBSCRIPTION_ACTIVE_KEY);
        match sdk.state_read(GLOBAL_PRE_ORDER_CONTRACT, &key) {
            Ok(Some(value)) if value.as_ref() == b"0" => {
                ContractResponse::error(ExecutionResult::ErrorSmartContract)
            }
            Ok(_) => ContractResponse::success(vec![]),
            Err(_) => ContractResponse::error(ExecutionResult::ErrorUnexpected),
        }
    }
}
