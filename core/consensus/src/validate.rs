use bytes::Bytes;

use common_merkle::Merkle;
use protocol::types::{BlockPair, Hash, TransactionsBlock};
use protocol::ProtocolResult;

use crate::{ConsensusError, EngineConfig};

/// Everything the block validators look at.
pub struct BlockValidationContext<'a> {
    pub config:    &'a EngineConfig,
    pub height:    u64,
    pub prev:      Option<&'a BlockPair>,
    pub pair:      &'a BlockPair,
    pub now_nanos: u64,
    pub now_secs:  u64,
}

type BlockValidator = fn(&BlockValidationContext<'_>) -> ProtocolResult<()>;

/// The ordered validation table; any failure rejects the block. The trigger
/// validator must run before the ordering re-validation, which the engine
/// appends last.
pub fn block_validators() -> Vec<BlockValidator> {
    vec![
        validate_protocol_version,
        validate_virtual_chain_id,
        validate_block_height,
        validate_prev_hash_pointers,
        validate_block_proposer,
        validate_timestamp,
        validate_reference_time,
        validate_transactions_root,
        validate_metadata_hash,
        validate_receipts_sequence,
        validate_trigger_compliance,
    ]
}

/// Merkle root over the ordered tx hashes; the zero hash for an empty block.
pub fn transactions_merkle_root(block: &TransactionsBlock) -> Hash {
    let hashes = block
        .signed_transactions
        .iter()
        .map(|stx| stx.tx_hash)
        .collect::<Vec<_>>();

    Merkle::from_hashes(hashes)
        .get_root_hash()
        .unwrap_or_else(Hash::from_empty)
}

/// The metadata section is empty in this protocol version; its hash is the
/// digest of no bytes.
pub fn metadata_hash() -> Hash {
    Hash::digest(Bytes::new())
}

fn validate_protocol_version(vctx: &BlockValidationContext<'_>) -> ProtocolResult<()> {
    let version = vctx.pair.transactions.header.protocol_version;
    if version < vctx.config.protocol_version_min || version > vctx.config.protocol_version_max {
        return Err(ConsensusError::MismatchedProtocolVersion {
            min: vctx.config.protocol_version_min,
            max: vctx.config.protocol_version_max,
            actual: version,
        }
        .into());
    }
    Ok(())
}

fn validate_virtual_chain_id(vctx: &BlockValidationContext<'_>) -> ProtocolResult<()> {
    let actual = vctx.pair.transactions.header.virtual_chain_id;
    if actual != vctx.config.virtual_chain_id {
        return Err(ConsensusError::MismatchedVirtualChain {
            expected: vctx.config.virtual_chain_id,
            actual,
        }
        .into());
    }
    Ok(())
}

fn validate_block_height(vctx: &BlockValidationContext<'_>) -> ProtocolResult<()> {
    let tx_height = vctx.pair.transactions.header.height;
    let rx_height = vctx.pair.results.header.height;

    if tx_height != vctx.height || rx_height != vctx.height {
        return Err(ConsensusError::MismatchedHeight {
            expected: vctx.height,
            actual:   if tx_height != vctx.height {
                tx_height
            } else {
                rx_height
            },
        }
        .into());
    }
    Ok(())
}

fn validate_prev_hash_pointers(vctx: &BlockValidationContext<'_>) -> ProtocolResult<()> {
    let (expected_tx, expected_rx) = match vctx.prev {
        Some(prev) => (prev.transactions_block_hash()?, prev.results_block_hash()?),
        None => (Hash::from_empty(), Hash::from_empty()),
    };

    if vctx.pair.transactions.header.prev_block_hash != expected_tx
        || vctx.pair.results.header.prev_block_hash != expected_rx
    {
        return Err(ConsensusError::MismatchedPrevHash.into());
    }

    // the results block must point at its own paired transactions block
    if vctx.pair.results.header.transactions_block_hash != vctx.pair.transactions_block_hash()? {
        return Err(ConsensusError::MismatchedPrevHash.into());
    }
    Ok(())
}

fn validate_block_proposer(vctx: &BlockValidationContext<'_>) -> ProtocolResult<()> {
    let proposer = vctx.pair.transactions.header.block_proposer;
    // an empty proposer is an older header version, the check is skipped
    if !proposer.is_empty() && proposer != vctx.config.leader_address {
        return Err(ConsensusError::MismatchedProposer { actual: proposer }.into());
    }
    Ok(())
}

fn validate_timestamp(vctx: &BlockValidationContext<'_>) -> ProtocolResult<()> {
    let current = vctx.pair.transactions.header.timestamp;
    let prev = vctx.prev.map(BlockPair::timestamp).unwrap_or(0);
    let jitter = vctx.config.allowed_timestamp_jitter.as_nanos() as u64;

    if current <= prev {
        return Err(ConsensusError::InvalidTimestamp(format!(
            "not after previous block, prev {} current {}",
            prev, current
        ))
        .into());
    }
    if current > vctx.now_nanos + jitter {
        return Err(ConsensusError::InvalidTimestamp(format!(
            "past the upper jitter limit, now {} current {}",
            vctx.now_nanos, current
        ))
        .into());
    }
    if current + jitter < vctx.now_nanos {
        return Err(ConsensusError::InvalidTimestamp(format!(
            "before the lower jitter limit, now {} current {}",
            vctx.now_nanos, current
        ))
        .into());
    }
    Ok(())
}

fn validate_reference_time(vctx: &BlockValidationContext<'_>) -> ProtocolResult<()> {
    let proposed = vctx.pair.transactions.header.reference_time;
    let prev = vctx
        .prev
        .map(|pair| pair.transactions.header.reference_time)
        .unwrap_or(0);

    if proposed < prev {
        return Err(ConsensusError::InvalidReferenceTime(format!(
            "smaller than previous block, prev {} proposed {}",
            prev, proposed
        ))
        .into());
    }
    if proposed > vctx.now_secs {
        return Err(ConsensusError::InvalidReferenceTime(format!(
            "ahead of this validator's reference {}, proposed {}",
            vctx.now_secs, proposed
        ))
        .into());
    }
    Ok(())
}

fn validate_transactions_root(vctx: &BlockValidationContext<'_>) -> ProtocolResult<()> {
    if transactions_merkle_root(&vctx.pair.transactions)
        != vctx.pair.transactions.header.transactions_root
    {
        return Err(ConsensusError::MismatchedTransactionsRoot.into());
    }
    Ok(())
}

fn validate_metadata_hash(vctx: &BlockValidationContext<'_>) -> ProtocolResult<()> {
    if vctx.pair.transactions.header.metadata_hash != metadata_hash() {
        return Err(ConsensusError::MismatchedMetadataHash.into());
    }
    Ok(())
}

fn validate_receipts_sequence(vctx: &BlockValidationContext<'_>) -> ProtocolResult<()> {
    let txs = &vctx.pair.transactions.signed_transactions;
    let receipts = &vctx.pair.results.receipts;

    if txs.len() != receipts.len()
        || vctx.pair.results.header.num_receipts as usize != receipts.len()
    {
        return Err(ConsensusError::MismatchedReceipts.into());
    }

    // receipts appear in the exact order of their input transactions
    for (stx, receipt) in txs.iter().zip(receipts.iter()) {
        if stx.tx_hash != receipt.tx_hash {
            return Err(ConsensusError::MismatchedReceipts.into());
        }
    }
    Ok(())
}

fn validate_trigger_compliance(vctx: &BlockValidationContext<'_>) -> ProtocolResult<()> {
    let txs = &vctx.pair.transactions.signed_transactions;
    let header = &vctx.pair.transactions.header;

    if !vctx.config.triggers_enabled {
        if txs.iter().any(|stx| stx.is_trigger()) {
            return Err(ConsensusError::TriggerDisabled.into());
        }
        return Ok(());
    }

    let trigger = match txs.last() {
        Some(stx) if stx.is_trigger() => stx,
        _ => return Err(ConsensusError::TriggerMissing.into()),
    };

    if trigger.raw.timestamp != header.timestamp {
        return Err(ConsensusError::TriggerInvalid.into());
    }
    if !trigger.signature.is_empty()
        || !trigger.raw.signer.is_empty()
        || !trigger.raw.input_args.is_empty()
        || trigger.raw.protocol_version != header.protocol_version
        || trigger.raw.virtual_chain_id != header.virtual_chain_id
    {
        return Err(ConsensusError::TriggerInvalid.into());
    }

    if txs[..txs.len() - 1].iter().any(|stx| stx.is_trigger()) {
        return Err(ConsensusError::TriggerNotLast.into());
    }
    Ok(())
}
