use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use byteorder::{BigEndian, ByteOrder};
use bytes::Bytes;
use rand::random;
use rand::rngs::OsRng;

use common_crypto::{
    Crypto, PrivateKey, PublicKey, Secp256k1, Secp256k1PrivateKey, Signature, ToPublicKey,
};
use protocol::fixed_codec::FixedCodec;
use protocol::traits::{
    Context, ExecutionInput, PreOrderInput, ProcessorType, QueryInput, StateStorage,
    VirtualMachine,
};
use protocol::types::{
    ContractStateDiff, ExecutionResult, Hash, RawTransaction, SignedTransaction, StateRecord,
    TransactionStatus, TRIGGER_CONTRACT, TRIGGER_METHOD,
};

use crate::contracts::{
    builtin_contracts, BENCHMARK_TOKEN_CONTRACT, GLOBAL_PRE_ORDER_CONTRACT,
    SUBSCRIPTION_ACTIVE_KEY,
};
use crate::{ImplVirtualMachine, NativeProcessor, Processor, VersionedStateStorage};

macro_rules! exec {
    ($func: expr) => {
        futures::executor::block_on(async { $func.await.unwrap() })
    };
}

fn mock_state() -> Arc<VersionedStateStorage> {
    Arc::new(VersionedStateStorage::new(
        5,
        3,
        Duration::from_millis(50),
    ))
}

fn mock_vm(state: Arc<VersionedStateStorage>) -> ImplVirtualMachine<Secp256k1> {
    let mut processors: HashMap<ProcessorType, Arc<dyn Processor>> = HashMap::new();
    processors.insert(
        ProcessorType::Native,
        Arc::new(NativeProcessor::new(builtin_contracts())),
    );

    ImplVirtualMachine::new(state, processors)
}

fn u64_arg(value: u64) -> Bytes {
    let mut buf = [0u8; 8];
    BigEndian::write_u64(&mut buf, value);
    Bytes::copy_from_slice(&buf)
}

fn sign_tx(priv_key: &Secp256k1PrivateKey, raw: RawTransaction) -> SignedTransaction {
    let tx_hash = Hash::digest(raw.encode_fixed().unwrap());
    let signature = Secp256k1::sign_message(&tx_hash.as_bytes(), &priv_key.to_bytes())
        .unwrap()
        .to_bytes();

    SignedTransaction {
        raw,
        tx_hash,
        signature,
    }
}

fn mock_transfer(priv_key: &Secp256k1PrivateKey, receiver: Bytes, amount: u64) -> SignedTransaction {
    sign_tx(priv_key, RawTransaction {
        protocol_version: 1,
        virtual_chain_id: 42,
        timestamp:        random::<u32>() as u64,
        signer:           priv_key.pub_key().to_bytes(),
        contract:         BENCHMARK_TOKEN_CONTRACT.to_owned(),
        method:           "transfer".to_owned(),
        input_args:       vec![receiver, u64_arg(amount)],
    })
}

fn mock_mint(priv_key: &Secp256k1PrivateKey, receiver: Bytes, amount: u64) -> SignedTransaction {
    sign_tx(priv_key, RawTransaction {
        protocol_version: 1,
        virtual_chain_id: 42,
        timestamp:        random::<u32>() as u64,
        signer:           priv_key.pub_key().to_bytes(),
        contract:         BENCHMARK_TOKEN_CONTRACT.to_owned(),
        method:           "mint".to_owned(),
        input_args:       vec![receiver, u64_arg(amount)],
    })
}

#[test]
fn test_execute_transfer_and_query_balance() {
    let state = mock_state();
    let vm = mock_vm(Arc::clone(&state));

    let sender = Secp256k1PrivateKey::generate(&mut OsRng);
    let receiver = Secp256k1PrivateKey::generate(&mut OsRng).pub_key().to_bytes();

    let txs = vec![
        mock_mint(&sender, sender.pub_key().to_bytes(), 100),
        mock_transfer(&sender, receiver.clone(), 30),
    ];

    let output = exec!(vm.process_transaction_set(Context::new(), ExecutionInput {
        block_height:    1,
        block_timestamp: 1_000,
        transactions:    txs,
    }));

    assert_eq!(output.receipts.len(), 2);
    assert!(output
        .receipts
        .iter()
        .all(|r| r.execution_result == ExecutionResult::Success));
    assert_eq!(output.receipts[1].events.len(), 1);

    exec!(state.commit_state_diffs(Context::new(), 1, output.state_diffs));

    let query = exec!(vm.process_query(Context::new(), QueryInput {
        contract:   BENCHMARK_TOKEN_CONTRACT.to_owned(),
        method:     "get_balance".to_owned(),
        input_args: vec![receiver],
    }));

    assert_eq!(query.execution_result, ExecutionResult::Success);
    assert_eq!(query.reference_height, 1);
    assert_eq!(BigEndian::read_u64(&query.output_args[0]), 30);
}

#[test]
fn test_execute_insufficient_balance_fails() {
    let state = mock_state();
    let vm = mock_vm(state);

    let sender = Secp256k1PrivateKey::generate(&mut OsRng);
    let receiver = Bytes::from(vec![1u8; 33]);

    let output = exec!(vm.process_transaction_set(Context::new(), ExecutionInput {
        block_height:    1,
        block_timestamp: 1_000,
        transactions:    vec![mock_transfer(&sender, receiver, 10)],
    }));

    assert_eq!(
        output.receipts[0].execution_result,
        ExecutionResult::ErrorSmartContract
    );
    assert!(output.state_diffs.is_empty());
}

#[test]
fn test_execution_is_deterministic() {
    let sender = Secp256k1PrivateKey::generate(&mut OsRng);
    let receiver = Bytes::from(vec![2u8; 33]);
    let txs = vec![
        mock_mint(&sender, sender.pub_key().to_bytes(), 50),
        mock_transfer(&sender, receiver, 20),
    ];

    let run = |txs: Vec<SignedTransaction>| {
        let vm = mock_vm(mock_state());
        exec!(vm.process_transaction_set(Context::new(), ExecutionInput {
            block_height:    1,
            block_timestamp: 1_000,
            transactions:    txs,
        }))
    };

    let (a, b) = (run(txs.clone()), run(txs));
    assert_eq!(a.receipts, b.receipts);
    assert_eq!(a.state_diffs, b.state_diffs);
}

#[test]
fn test_pre_order_rejects_bad_signature() {
    let state = mock_state();
    let vm = mock_vm(state);

    let sender = Secp256k1PrivateKey::generate(&mut OsRng);
    let mut stx = mock_transfer(&sender, Bytes::from(vec![3u8; 33]), 1);
    stx.signature = Bytes::from(vec![0u8; 64]);

    let trigger = SignedTransaction {
        raw:       RawTransaction {
            protocol_version: 1,
            virtual_chain_id: 42,
            timestamp:        1_000,
            signer:           Bytes::new(),
            contract:         TRIGGER_CONTRACT.to_owned(),
            method:           TRIGGER_METHOD.to_owned(),
            input_args:       vec![],
        },
        tx_hash:   Hash::from_empty(),
        signature: Bytes::new(),
    };

    let output = exec!(vm.pre_order_check(Context::new(), PreOrderInput {
        block_height:    1,
        block_timestamp: 1_000,
        transactions:    vec![stx, trigger],
    }));

    assert_eq!(output.statuses, vec![
        TransactionStatus::RejectedSignatureMismatch,
        TransactionStatus::Pending,
    ]);
}

#[test]
fn test_pre_order_global_rejection_marks_every_tx() {
    let state = mock_state();

    // deactivate the subscription flag
    exec!(state.commit_state_diffs(Context::new(), 1, vec![ContractStateDiff {
        contract: GLOBAL_PRE_ORDER_CONTRACT.to_owned(),
        records:  vec![StateRecord {
            key:   Bytes::copy_from_slice(SUBSCRIPTION_ACTIVE_KEY),
            value: Bytes::from_static(b"0"),
        }],
    }]));

    let vm = mock_vm(state);
    let sender = Secp256k1PrivateKey::generate(&mut OsRng);

    let output = exec!(vm.pre_order_check(Context::new(), PreOrderInput {
        block_height:    2,
        block_timestamp: 2_000,
        transactions:    vec![
            mock_transfer(&sender, Bytes::from(vec![4u8; 33]), 1),
            mock_transfer(&sender, Bytes::from(vec![5u8; 33]), 2),
        ],
    }));

    assert_eq!(output.statuses, vec![
        TransactionStatus::RejectedGlobalPreOrder;
        2
    ]);
}

#[test]
fn test_state_versioned_reads_and_retention() {
    let state = mock_state();
    let key = Bytes::from_static(b"counter");

    for height in 1..=8u64 {
        exec!(state.commit_state_diffs(Context::new(), height, vec![
            ContractStateDiff {
                contract: "Counter".to_owned(),
                records:  vec![StateRecord {
                    key:   key.clone(),
                    value: u64_arg(height),
                }],
            }
        ]));
    }

    // reads inside the retention window see their exact version
    let value = exec!(state.read_key(Context::new(), "Counter", key.clone(), 6));
    assert_eq!(BigEndian::read_u64(&value.unwrap()), 6);

    let (latest, height) = exec!(state.read_key_latest(Context::new(), "Counter", key.clone()));
    assert_eq!(BigEndian::read_u64(&latest.unwrap()), 8);
    assert_eq!(height, 8);

    // a read at the window edge still resolves to the newest retained version
    let value = exec!(state.read_key(Context::new(), "Counter", key, 3));
    assert_eq!(BigEndian::read_u64(&value.unwrap()), 3);
}

#[test]
fn test_state_commit_out_of_order_is_rejected() {
    let state = mock_state();

    let result = futures::executor::block_on(state.commit_state_diffs(Context::new(), 5, vec![]));
    assert!(result.is_err());
}

#[test]
fn test_query_grace_rejects_uncommitted_heights() {
    let state = mock_state();

    // within grace distance but never committed
    let result = futures::executor::block_on(state.read_key(
        Context::new(),
        "Counter",
        Bytes::from_static(b"x"),
        2,
    ));
    assert!(result.is_err());

    // beyond grace distance fails immediately
    let result = futures::executor::block_on(state.read_key(
        Context::new(),
        "Counter",
        Bytes::from_static(b"x"),
        9,
    ));
    assert!(result.is_err());
}
