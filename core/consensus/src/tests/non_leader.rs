use std::sync::Arc;

use futures::executor::block_on;

use common_crypto::Secp256k1;
use core_storage::adapter::MemoryBlockPersistence;
use core_storage::ImplBlockStorage;
use protocol::traits::{
    BlockStorage, Consensus, ConsensusContext, Context, ProposalInput,
};
use protocol::types::{BlockPair, BlockProof};
use protocol::Bytes;

use crate::message::{CommittedMessage, END_GOSSIP_BENCHMARK_COMMITTED};
use crate::tests::{
    consensus_config, engine_config, mock_federation, MockGossip, MockTxPool, MockVm, TestMember,
};
use crate::{BenchmarkConsensus, ConsensusEngine};

type TestEngine = ConsensusEngine<MockTxPool, MockVm>;
type TestStorage = ImplBlockStorage<MemoryBlockPersistence>;
type TestService = BenchmarkConsensus<TestEngine, TestStorage, MockGossip, Secp256k1>;

struct NonLeaderHarness {
    federation: Vec<TestMember>,
    service:    Arc<TestService>,
    storage:    Arc<TestStorage>,
    gossip:     Arc<MockGossip>,
    engine:     Arc<TestEngine>,
}

impl NonLeaderHarness {
    async fn new() -> Self {
        let federation = mock_federation();
        // node 1 is a replica, node 0 stays the leader
        let config = consensus_config(&federation, 1);

        let engine = Arc::new(ConsensusEngine::new(
            engine_config(&federation, 1, false),
            Arc::new(MockTxPool::with_batch(vec![])),
            Arc::new(MockVm::default()),
        ));
        let storage = Arc::new(
            ImplBlockStorage::new(Arc::new(MemoryBlockPersistence::new()))
                .await
                .unwrap(),
        );
        let gossip = Arc::new(MockGossip::default());

        let (service, leader) = BenchmarkConsensus::new(
            config,
            Arc::clone(&engine),
            Arc::clone(&storage),
            Arc::clone(&gossip),
        )
        .await
        .unwrap();
        assert!(leader.is_none(), "node 1 must not run the round loop");

        NonLeaderHarness {
            federation,
            service,
            storage,
            gossip,
            engine,
        }
    }

    /// A pair at `height` proposed and signed exactly like the real leader
    /// would.
    async fn leader_pair(&self, height: u64, prev: Option<BlockPair>) -> BlockPair {
        use common_crypto::{Crypto, PrivateKey, Signature};
        use protocol::types::Hash;

        let mut pair = self
            .engine
            .request_new_block_proposal(Context::new(), ProposalInput {
                current_block_height: height,
                prev_block:           prev,
            })
            .await
            .unwrap();
        // the engine stamps the proposing node, the leader stamps itself
        pair.transactions.header.block_proposer = self.federation[0].address;
        pair.results.header.transactions_block_hash =
            pair.transactions_block_hash().unwrap();

        let leader = &self.federation[0];
        let payload = Hash::digest(pair.proof_payload().unwrap());
        let signature = Bytes::from(
            Secp256k1::sign_message(&payload.as_bytes(), &leader.privkey.to_bytes())
                .unwrap()
                .to_bytes()
                .to_vec(),
        );

        pair.results.proof = BlockProof {
            sender: leader.address,
            signature,
        };
        pair
    }

    async fn last_reply_height(&self) -> Option<u64> {
        self.gossip
            .decode_last_on::<CommittedMessage>(END_GOSSIP_BENCHMARK_COMMITTED)
            .await
            .map(|msg| msg.last_committed_height)
    }
}

#[test]
fn test_non_leader_commits_next_height_and_replies() {
    block_on(async {
        let h = NonLeaderHarness::new().await;
        let pair = h.leader_pair(1, None).await;

        h.service.handle_commit(Context::new(), pair).await.unwrap();

        assert_eq!(
            h.storage.get_last_block_height(Context::new()).await.unwrap(),
            1
        );
        assert_eq!(h.last_reply_height().await, Some(1));

        // the reply is addressed to the sender of the commit
        let sent = h.gossip.sent.lock();
        let reply = sent
            .iter()
            .find(|msg| msg.end == END_GOSSIP_BENCHMARK_COMMITTED)
            .unwrap();
        assert_eq!(
            reply.peers.as_ref().unwrap()[0],
            h.federation[0].address.as_bytes()
        );
    });
}

#[test]
fn test_non_leader_drops_future_heights_silently() {
    block_on(async {
        let h = NonLeaderHarness::new().await;
        let pair = h.leader_pair(1, None).await;
        let future_pair = h.leader_pair(2, Some(pair)).await;

        h.service
            .handle_commit(Context::new(), future_pair)
            .await
            .unwrap();

        // no storage write, no reply
        assert_eq!(
            h.storage.get_last_block_height(Context::new()).await.unwrap(),
            0
        );
        assert_eq!(h.gossip.count_on(END_GOSSIP_BENCHMARK_COMMITTED), 0);
    });
}

#[test]
fn test_non_leader_re_acks_old_heights_idempotently() {
    block_on(async {
        let h = NonLeaderHarness::new().await;
        let pair = h.leader_pair(1, None).await;

        h.service
            .handle_commit(Context::new(), pair.clone())
            .await
            .unwrap();
        h.service.handle_commit(Context::new(), pair).await.unwrap();

        // one write, two replies with the same height
        assert_eq!(
            h.storage.get_last_block_height(Context::new()).await.unwrap(),
            1
        );
        assert_eq!(h.gossip.count_on(END_GOSSIP_BENCHMARK_COMMITTED), 2);
        assert_eq!(h.last_reply_height().await, Some(1));
    });
}

#[test]
fn test_non_leader_acks_genesis_without_writing() {
    block_on(async {
        let h = NonLeaderHarness::new().await;
        let genesis = {
            let config = consensus_config(&h.federation, 0);
            let mut pair = crate::leader::genesis_pair(&config);

            use common_crypto::{Crypto, PrivateKey, Signature};
            use protocol::types::Hash;
            let payload = Hash::digest(pair.proof_payload().unwrap());
            pair.results.proof.signature = Bytes::from(
                Secp256k1::sign_message(
                    &payload.as_bytes(),
                    &h.federation[0].privkey.to_bytes(),
                )
                .unwrap()
                .to_bytes()
                .to_vec(),
            );
            pair
        };

        h.service.handle_commit(Context::new(), genesis).await.unwrap();

        assert_eq!(
            h.storage.get_last_block_height(Context::new()).await.unwrap(),
            0
        );
        assert_eq!(h.last_reply_height().await, Some(0));
    });
}

#[test]
fn test_non_leader_drops_forged_proofs() {
    block_on(async {
        let h = NonLeaderHarness::new().await;

        // signed by a federation member that is not the leader
        let mut pair = h.leader_pair(1, None).await;
        use common_crypto::{Crypto, PrivateKey, Signature};
        use protocol::types::Hash;
        let payload = Hash::digest(pair.proof_payload().unwrap());
        pair.results.proof = BlockProof {
            sender:    h.federation[2].address,
            signature: Bytes::from(
                Secp256k1::sign_message(
                    &payload.as_bytes(),
                    &h.federation[2].privkey.to_bytes(),
                )
                .unwrap()
                .to_bytes()
                .to_vec(),
            ),
        };

        h.service.handle_commit(Context::new(), pair).await.unwrap();
        assert_eq!(
            h.storage.get_last_block_height(Context::new()).await.unwrap(),
            0
        );
        assert_eq!(h.gossip.count_on(END_GOSSIP_BENCHMARK_COMMITTED), 0);

        // a garbage signature under the right sender is dropped too
        let mut pair = h.leader_pair(1, None).await;
        pair.results.proof.signature = Bytes::from(vec![0u8; 64]);
        h.service.handle_commit(Context::new(), pair).await.unwrap();
        assert_eq!(h.gossip.count_on(END_GOSSIP_BENCHMARK_COMMITTED), 0);
    });
}

#[test]
fn test_non_leader_rejects_invalid_blocks_without_reply() {
    block_on(async {
        let h = NonLeaderHarness::new().await;

        // smuggle a transaction into the body; the headers and the proof are
        // untouched but the merkle root no longer matches
        let mut pair = h.leader_pair(1, None).await;
        pair.transactions
            .signed_transactions
            .push(crate::tests::mock_client_tx());

        h.service.handle_commit(Context::new(), pair).await.unwrap();

        assert_eq!(
            h.storage.get_last_block_height(Context::new()).await.unwrap(),
            0
        );
        assert_eq!(h.gossip.count_on(END_GOSSIP_BENCHMARK_COMMITTED), 0);
    });
}
