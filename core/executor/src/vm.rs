use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use log::info;

use common_crypto::Crypto;
use protocol::traits::{
    Context, ExecutionInput, ExecutionOutput, PreOrderInput, PreOrderOutput, ProcessorType,
    QueryInput, QueryOutput, VirtualMachine,
};
use protocol::types::{ExecutionResult, Receipt, SignedTransaction, TransactionStatus};
use protocol::ProtocolResult;

use crate::contracts::{NativeContract, GLOBAL_PRE_ORDER_CONTRACT, GLOBAL_PRE_ORDER_METHOD};
use crate::sdk::{
    CallEnv, ContractResponse, ExecutionContext, PermissionScope, Processor, SdkHandler,
    StateReader,
};

/// Runs the trusted pre-bundled contracts in-process.
pub struct NativeProcessor {
    contracts: HashMap<String, Arc<dyn NativeContract>>,
}

impl NativeProcessor {
    pub fn new(contracts: Vec<Arc<dyn NativeContract>>) -> Self {
        let contracts = contracts
            .into_iter()
            .map(|contract| (contract.name().to_owned(), contract))
            .collect();

        NativeProcessor { contracts }
    }
}

impl Processor for NativeProcessor {
    fn contracts(&self) -> Vec<String> {
        self.contracts.keys().cloned().collect()
    }

    fn process_call(
        &self,
        sdk: &mut dyn SdkHandler,
        contract: &str,
        method: &str,
        args: &[Bytes],
    ) -> ContractResponse {
        match self.contracts.get(contract) {
            Some(contract) => contract.call(sdk, method, args),
            None => ContractResponse::error(ExecutionResult::ErrorInput),
        }
    }
}

pub struct ImplVirtualMachine<C> {
    reader:     Arc<dyn StateReader>,
    processors: HashMap<ProcessorType, Arc<dyn Processor>>,
    routing:    HashMap<String, ProcessorType>,

    pin_c: PhantomData<C>,
}

impl<C: Crypto> ImplVirtualMachine<C> {
    pub fn new(
        reader: Arc<dyn StateReader>,
        processors: HashMap<ProcessorType, Arc<dyn Processor>>,
    ) -> Self {
        let mut routing = HashMap::new();
        for (processor_type, processor) in processors.iter() {
            for contract in processor.contracts() {
                routing.insert(contract, *processor_type);
            }
        }

        ImplVirtualMachine {
            reader,
            processors,
            routing,
            pin_c: PhantomData,
        }
    }

    fn route_call(
        &self,
        exec_ctx: &mut ExecutionContext<'_>,
        stx: &SignedTransaction,
    ) -> ContractResponse {
        match self.routing.get(&stx.raw.contract) {
            Some(processor_type) => {
                let processor = Arc::clone(&self.processors[processor_type]);
                processor.process_call(
                    exec_ctx,
                    &stx.raw.contract,
                    &stx.raw.method,
                    &stx.raw.input_args,
                )
            }
            None => ContractResponse::error(ExecutionResult::ErrorInput),
        }
    }

    fn verify_transaction_signature(&self, stx: &SignedTransaction) -> bool {
        C::verify_signature(
            stx.tx_hash.as_bytes().as_ref(),
            stx.signature.as_ref(),
            stx.raw.signer.as_ref(),
        )
        .is_ok()
    }

    /// The global pre-order system contract is consulted once per block.
    fn global_pre_order_approves(&self, block_height: u64, block_timestamp: u64) -> bool {
        let read_height = self.reader.last_height();
        let mut exec_ctx = ExecutionContext::new(
            self.reader.as_ref(),
            &self.processors,
            &self.routing,
            read_height,
            PermissionScope::ReadOnly,
            CallEnv {
                block_height,
                block_timestamp,
                caller: Bytes::new(),
            },
        );

        let resp = exec_ctx.call_service(GLOBAL_PRE_ORDER_CONTRACT, GLOBAL_PRE_ORDER_METHOD, &[]);
        match resp {
            Ok(resp) => resp.execution_result == ExecutionResult::Success,
            Err(_) => false,
        }
    }
}

#[async_trait]
impl<C: Crypto + Send + Sync + 'static> VirtualMachine for ImplVirtualMachine<C> {
    async fn process_transaction_set(
        &self,
        _ctx: Context,
        input: ExecutionInput,
    ) -> ProtocolResult<ExecutionOutput> {
        // execution reads against the state as of the previous block
        let read_height = input.block_height.saturating_sub(1);

        let mut exec_ctx = ExecutionContext::new(
            self.reader.as_ref(),
            &self.processors,
            &self.routing,
            read_height,
            PermissionScope::ReadWrite,
            CallEnv {
                block_height:    input.block_height,
                block_timestamp: input.block_timestamp,
                caller:          Bytes::new(),
            },
        );

        let mut receipts = Vec::with_capacity(input.transactions.len());
        for stx in input.transactions.iter() {
            exec_ctx.set_caller(stx.raw.signer.clone());
            let resp = self.route_call(&mut exec_ctx, stx);

            receipts.push(Receipt {
                tx_hash:          stx.tx_hash,
                execution_result: resp.execution_result,
                output_args:      resp.output_args,
                events:           exec_ctx.take_events(),
            });
        }

        info!(
            "[executor]: processed transaction set, height {} txs {}",
            input.block_height,
            receipts.len()
        );

        Ok(ExecutionOutput {
            receipts,
            state_diffs: exec_ctx.into_state_diffs(),
        })
    }

    async fn pre_order_check(
        &self,
        _ctx: Context,
        input: PreOrderInput,
    ) -> ProtocolResult<PreOrderOutput> {
        let count = input.transactions.len();

        if !self.global_pre_order_approves(input.block_height, input.block_timestamp) {
            info!(
                "[executor]: global pre order rejected the block, height {} txs {}",
                input.block_height, count
            );
            return Ok(PreOrderOutput {
                statuses: vec![TransactionStatus::RejectedGlobalPreOrder; count],
            });
        }

        let statuses = input
            .transactions
            .iter()
            .map(|stx| {
                if stx.is_trigger() || self.verify_transaction_signature(stx) {
                    TransactionStatus::Pending
                } else {
                    TransactionStatus::RejectedSignatureMismatch
                }
            })
            .collect();

        Ok(PreOrderOutput { statuses })
    }

    async fn process_query(&self, _ctx: Context, input: QueryInput) -> ProtocolResult<QueryOutput> {
        let reference_height = self.reader.last_height();

        let mut exec_ctx = ExecutionContext::new(
            self.reader.as_ref(),
            &self.processors,
            &self.routing,
            reference_height,
            PermissionScope::ReadOnly,
            CallEnv {
                block_height:    reference_height,
                block_timestamp: 0,
                caller:          Bytes::new(),
            },
        );

        let resp = exec_ctx.call_service(&input.contract, &input.method, &input.input_args)?;

        Ok(QueryOutput {
            execution_result: resp.execution_result,
            output_args: resp.output_args,
            reference_height,
        })
    }
}
