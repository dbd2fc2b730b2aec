use byteorder::{BigEndian, ByteOrder};
use bytes::Bytes;

use protocol::types::ExecutionResult;

use crate::contracts::NativeContract;
use crate::sdk::{ContractResponse, SdkHandler};

pub const BENCHMARK_TOKEN_CONTRACT: &str = "BenchmarkToken";

/// Minimal transferable token used by tests and demos. Balances are keyed by
/// the holder's raw public key bytes, values are big-endian u64.
pub struct BenchmarkTokenContract;

impl BenchmarkTokenContract {
    fn balance_of(sdk: &mut dyn SdkHandler, holder: &Bytes) -> u64 {
        match sdk.state_read(BENCHMARK_TOKEN_CONTRACT, holder) {
            Ok(Some(value)) if value.len() == 8 => BigEndian::read_u64(&value),
            _ => 0,
        }
    }

    fn write_balance(sdk: &mut dyn SdkHandler, holder: Bytes, amount: u64) -> bool {
        let mut value = [0u8; 8];
        BigEndian::write_u64(&mut value, amount);
        sdk.state_write(
            BENCHMARK_TOKEN_CONTRACT,
            holder,
            Bytes::copy_from_slice(&value),
        )
        .is_ok()
    }

    fn transfer(&self, sdk: &mut dyn SdkHandler, args: &[Bytes]) -> ContractResponse {
        if args.len() != 2 || args[1].len() != 8 {
            return ContractResponse::error(ExecutionResult::ErrorInput);
        }
        let receiver = args[0].clone();
        let amount = BigEndian::read_u64(&args[1]);
        let sender = sdk.env().caller.clone();

        let sender_balance = Self::balance_of(sdk, &sender);
        if sender_balance < amount {
            return ContractResponse::error(ExecutionResult::ErrorSmartContract);
        }

        let receiver_balance = Self::balance_of(sdk, &receiver);
        if !Self::write_balance(sdk, sender, sender_balance - amount)
            || !Self::write_balance(sdk, receiver.clone(), receiver_balance + amount)
        {
            return ContractResponse::error(ExecutionResult::ErrorUnexpected);
        }

        let _ = sdk.emit_event(BENCHMARK_TOKEN_CONTRACT, "Transferred", receiver);
        ContractResponse::success(vec![])
    }

    fn mint(&self, sdk: &mut dyn SdkHandler, args: &[Bytes]) -> ContractResponse {
        if args.len() != 2 || args[1].len() != 8 {
            return ContractResponse::error(ExecutionResult::ErrorInput);
        }
        let receiver = args[0].clone();
        let amount = BigEndian::read_u64(&args[1]);

        let balance = Self::balance_of(sdk, &receiver);
        if !Self::write_balance(sdk, receiver, balance + amount) {
            return ContractResponse::error(ExecutionResult::ErrorUnexpected);
        }

        ContractResponse::success(vec![])
    }

    fn get_balance(&self, sdk: &mut dyn SdkHandler, args: &[Bytes]) -> ContractResponse {
        if args.len() != 1 {
            return ContractResponse::error(ExecutionResult::ErrorInput);
        }

        let balance = Self::balance_of(sdk, &args[0]);
        let mut value = [0u8; 8];
        BigEndian::write_u64(&mut value, balance);

        ContractResponse::success(vec![Bytes::copy_from_slice(&value)])
    }
}

impl NativeContract for BenchmarkTokenContract {
    fn name(&self) -> &str {
        BENCHMARK_TOKEN_CONTRACT
    }

    fn call(&self, sdk: &mut dyn SdkHandler, method: &str, args: &[Bytes]) -> ContractResponse {
        match method {
            "transfer" => self.transfer(sdk, args),
            "mint" => self.mint(sdk, args),
            "get_balance" => self.get_balance(sdk, args),
            _ => ContractResponse::error(ExecutionResult::ErrorInput),
        }
    }
}
