use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use bytes::Bytes;

use protocol::traits::ProcessorType;
use protocol::types::{ContractStateDiff, Event, ExecutionResult, StateRecord};
use protocol::ProtocolResult;

use crate::ExecutorError;

/// Synchronous view over committed state used during execution. Execution
/// always reads at an already-committed height, so no grace wait is needed
/// here.
pub trait StateReader: Send + Sync {
    fn read(&self, contract: &str, key: &Bytes, height: u64) -> Option<Bytes>;

    fn last_height(&self) -> u64;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PermissionScope {
    ReadOnly,
    ReadWrite,
}

#[derive(Clone, Debug)]
pub struct CallEnv {
    pub block_height:    u64,
    pub block_timestamp: u64,
    /// Raw public key of the transaction signer, empty for queries.
    pub caller:          Bytes,
}

#[derive(Clone, Debug)]
pub struct ContractResponse {
    pub execution_result: ExecutionResult,
    pub output_args:      Vec<Bytes>,
}

impl ContractResponse {
    pub fn success(output_args: Vec<Bytes>) -> Self {
        ContractResponse {
            execution_result: ExecutionResult::Success,
            output_args,
        }
    }

    pub fn error(result: ExecutionResult) -> Self {
        ContractResponse {
            execution_result: result,
            output_args:      vec![],
        }
    }
}

/// Single dispatch point for every contract SDK call. All state access,
/// nested service invocation, event emission and environment queries route
/// through here so the caller's permission scope is enforced in one place.
pub trait SdkHandler {
    fn state_read(&mut self, contract: &str, key: &Bytes) -> ProtocolResult<Option<Bytes>>;

    fn state_write(&mut self, contract: &str, key: Bytes, value: Bytes) -> ProtocolResult<()>;

    fn emit_event(&mut self, contract: &str, name: &str, data: Bytes) -> ProtocolResult<()>;

    fn call_service(
        &mut self,
        contract: &str,
        method: &str,
        args: &[Bytes],
    ) -> ProtocolResult<ContractResponse>;

    fn env(&self) -> &CallEnv;
}

/// A contract runtime. Every contract is trusted and pre-bundled.
pub trait Processor: Send + Sync {
    fn contracts(&self) -> Vec<String>;

    fn process_call(
        &self,
        sdk: &mut dyn SdkHandler,
        contract: &str,
        method: &str,
        args: &[Bytes],
    ) -> ContractResponse;
}

/// Execution context bound to one block. Writes are buffered so later
/// transactions in the block observe earlier ones, then drained into the
/// block's state diffs.
pub struct ExecutionContext<'a> {
    reader:      &'a dyn StateReader,
    processors:  &'a HashMap<ProcessorType, Arc<dyn Processor>>,
    routing:     &'a HashMap<String, ProcessorType>,
    read_height: u64,
    scope:       PermissionScope,
    env:         CallEnv,

    writes: BTreeMap<String, BTreeMap<Bytes, Bytes>>,
    events: Vec<Event>,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(
        reader: &'a dyn StateReader,
        processors: &'a HashMap<ProcessorType, Arc<dyn Processor>>,
        routing: &'a HashMap<String, ProcessorType>,
        read_height: u64,
        scope: PermissionScope,
        env: CallEnv,
    ) -> Self {
        ExecutionContext {
            reader,
            processors,
            routing,
            read_height,
            scope,
            env,
            writes: BTreeMap::new(),
            events: Vec::new(),
        }
    }

    pub fn set_caller(&mut self, caller: Bytes) {
        self.env.caller = caller;
    }

    /// Events emitted since the last take, i.e. by the current transaction.
    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::replace(&mut self.events, Vec::new())
    }

    /// Drains the buffered writes into per-contract diffs, ordered by
    /// contract and key for determinism.
    pub fn into_state_diffs(self) -> Vec<ContractStateDiff> {
        self.writes
            .into_iter()
            .filter(|(_, records)| !records.is_empty())
            .map(|(contract, records)| ContractStateDiff {
                contract,
                records: records
                    .into_iter()
                    .map(|(key, value)| StateRecord { key, value })
                    .collect(),
            })
            .collect()
    }
}

impl<'a> SdkHandler for ExecutionContext<'a> {
    fn state_read(&mut self, contract: &str, key: &Bytes) -> ProtocolResult<Option<Bytes>> {
        if let Some(records) = self.writes.get(contract) {
            if let Some(value) = records.get(key) {
                return Ok(Some(value.clone()));
            }
        }

        Ok(self.reader.read(contract, key, self.read_height))
    }

    fn state_write(&mut self, contract: &str, key: Bytes, value: Bytes) -> ProtocolResult<()> {
        if self.scope == PermissionScope::ReadOnly {
            return Err(ExecutorError::PermissionDenied("state_write".to_owned()).into());
        }

        self.writes
            .entry(contract.to_owned())
            .or_insert_with(BTreeMap::new)
            .insert(key, value);
        Ok(())
    }

    fn emit_event(&mut self, contract: &str, name: &str, data: Bytes) -> ProtocolResult<()> {
        if self.scope == PermissionScope::ReadOnly {
            return Err(ExecutorError::PermissionDenied("emit_event".to_owned()).into());
        }

        self.events.push(Event {
            contract: contract.to_owned(),
            name: name.to_owned(),
            data,
        });
        Ok(())
    }

    fn call_service(
        &mut self,
        contract: &str,
        method: &str,
        args: &[Bytes],
    ) -> ProtocolResult<ContractResponse> {
        let processor_type = self
            .routing
            .get(contract)
            .ok_or_else(|| ExecutorError::UnknownContract(contract.to_owned()))?;
        let processor = Arc::clone(&self.processors[processor_type]);

        Ok(processor.process_call(self, contract, method, args))
    }

    fn env(&self) -> &CallEnv {
        &self.env
    }
}
