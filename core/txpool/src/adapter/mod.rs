pub mod message;

use std::marker::PhantomData;
use std::time::Duration;
use std::{future::Future, pin::Pin, sync::Arc, task::Context as TaskContext, task::Poll};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{
    channel::mpsc::{unbounded, TrySendError, UnboundedReceiver, UnboundedSender},
    lock::Mutex,
    pin_mut, ready,
    stream::Stream,
    task::AtomicWaker,
};
use futures_timer::Delay;
use log::error;

use common_crypto::{Crypto, Signature};
use protocol::fixed_codec::FixedCodec;
use protocol::traits::{Context, Gossip, Priority, TxPoolAdapter};
use protocol::types::{Address, Hash, SignedTransaction};
use protocol::{ProtocolError, ProtocolErrorKind, ProtocolResult};

use crate::adapter::message::{ForwardedTransactions, END_GOSSIP_FORWARDED_TXS};
use crate::PoolError;

pub const DEFAULT_FORWARD_BATCH_SIZE: usize = 100;
pub const DEFAULT_FORWARD_INTERVAL: u64 = 200; // milliseconds

/// Canonical bytes a forwarded batch signs: the concatenated tx hashes.
pub fn batch_payload(batch: &[SignedTransaction]) -> Bytes {
    let mut payload = Vec::with_capacity(batch.len() * 32);
    for stx in batch {
        payload.extend_from_slice(&stx.tx_hash.as_bytes());
    }
    Bytes::from(payload)
}

/// Collects admitted transactions and forwards them to peers in signed
/// batches, flushing on the batch size cap or the interval tick, whichever
/// comes first.
struct IntervalTxsForwarder<C, G> {
    waker: AtomicWaker,

    delay:    Delay,
    interval: Duration,

    txs_cache:  Vec<SignedTransaction>,
    cache_size: usize,

    stx_rx: UnboundedReceiver<SignedTransaction>,
    gossip: Arc<G>,

    node_address: Address,
    pubkey:       Bytes,
    privkey:      Bytes,

    err_tx: UnboundedSender<ProtocolError>,
    pin_c:  PhantomData<C>,
}

impl<C, G> IntervalTxsForwarder<C, G>
where
    C: Crypto + Send + Sync + 'static,
    G: Gossip + Send + Sync + 'static,
{
    #[allow(clippy::too_many_arguments)]
    fn new(
        interval: Duration,
        cache_size: usize,
        stx_rx: UnboundedReceiver<SignedTransaction>,
        gossip: Arc<G>,
        node_address: Address,
        pubkey: Bytes,
        privkey: Bytes,
        err_tx: UnboundedSender<ProtocolError>,
    ) -> Self {
        IntervalTxsForwarder {
            waker: AtomicWaker::new(),

            delay: Delay::new(interval),
            interval,

            txs_cache: Vec::with_capacity(cache_size),
            cache_size,

            stx_rx,
            gossip,

            node_address,
            pubkey,
            privkey,

            err_tx,
            pin_c: PhantomData,
        }
    }

    fn do_forward(&mut self) {
        let batch = self.txs_cache.drain(..).collect::<Vec<_>>();

        let payload = batch_payload(&batch);
        let signature = match C::sign_message(&Hash::digest(payload).as_bytes(), &self.privkey) {
            Ok(sig) => Bytes::from(sig.to_bytes().to_vec()),
            Err(_) => {
                error!("[txpool]: signing forwarded batch failed");
                return;
            }
        };

        let msg = ForwardedTransactions {
            sender: self.node_address,
            signer_pubkey: self.pubkey.clone(),
            signature,
            batch,
        };

        let gossip = Arc::clone(&self.gossip);
        let err_tx = self.err_tx.clone();

        tokio::spawn(async move {
            let ret = gossip
                .broadcast(
                    Context::new(),
                    END_GOSSIP_FORWARDED_TXS,
                    msg,
                    Priority::Normal,
                )
                .await;

            if let Err(err) = ret {
                if err_tx.unbounded_send(err).is_err() {
                    error!("[txpool]: default txpool adapter dropped");
                }
            }
        });
    }
}

impl<C, G> Future for IntervalTxsForwarder<C, G>
where
    C: Crypto + Send + Sync + Unpin + 'static,
    G: Gossip + Send + Sync + 'static,
{
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, ctx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        self.waker.register(ctx.waker());

        macro_rules! loop_break {
            ($poll:expr) => {
                match $poll {
                    Poll::Pending => break,
                    Poll::Ready(Some(v)) => v,
                    Poll::Ready(None) => return Poll::Ready(()),
                }
            };
        }

        // Collect admitted transactions; a full cache flushes right away.
        loop {
            let stx_rx = &mut self.as_mut().stx_rx;
            pin_mut!(stx_rx);

            let stx = loop_break!(stx_rx.poll_next(ctx));
            self.txs_cache.push(stx);

            if self.txs_cache.len() == self.cache_size {
                self.do_forward();
            }
        }

        // Interval tick flushes whatever is cached.
        loop {
            let delay = &mut self.as_mut().delay;
            pin_mut!(delay);

            ready!(delay.poll(ctx));

            if !self.txs_cache.is_empty() {
                self.do_forward();
            }

            let interval = self.interval;
            self.delay.reset(interval);
            self.waker.wake();
        }
    }
}

pub struct DefaultTxPoolAdapter<C, G> {
    stx_tx: UnboundedSender<SignedTransaction>,
    err_rx: Mutex<UnboundedReceiver<ProtocolError>>,

    pin_c: PhantomData<C>,
    pin_g: PhantomData<G>,
}

impl<C, G> DefaultTxPoolAdapter<C, G>
where
    C: Crypto + Send + Sync + Unpin + 'static,
    G: Gossip + Send + Sync + 'static,
{
    pub fn new(
        gossip: Arc<G>,
        privkey: Bytes,
        pubkey: Bytes,
        forward_batch_size: usize,
        forward_interval: u64,
    ) -> Self {
        let (stx_tx, stx_rx) = unbounded();
        let (err_tx, err_rx) = unbounded();

        let forwarder = IntervalTxsForwarder::<C, G>::new(
            Duration::from_millis(forward_interval),
            forward_batch_size,
            stx_rx,
            gossip,
            Address::from_pubkey_bytes(pubkey.clone()),
            pubkey.clone(),
            privkey,
            err_tx,
        );

        tokio::spawn(forwarder);

        DefaultTxPoolAdapter {
            stx_tx,
            err_rx: Mutex::new(err_rx),
            pin_c: PhantomData,
            pin_g: PhantomData,
        }
    }
}

#[async_trait]
impl<C, G> TxPoolAdapter for DefaultTxPoolAdapter<C, G>
where
    C: Crypto + Send + Sync + Unpin + 'static,
    G: Gossip + Send + Sync + 'static,
{
    async fn forward_transactions(
        &self,
        _ctx: Context,
        stxs: Vec<SignedTransaction>,
    ) -> ProtocolResult<()> {
        for stx in stxs {
            self.stx_tx.unbounded_send(stx).map_err(AdapterError::from)?;
        }

        if let Some(mut err_rx) = self.err_rx.try_lock() {
            match err_rx.try_next() {
                Ok(Some(err)) => return Err(err),
                Ok(None) => return Err(AdapterError::ForwarderDropped.into()),
                Err(_) => return Ok(()),
            }
        }

        Ok(())
    }

    fn verify_batch_signature(
        &self,
        sender: Address,
        signer_pubkey: Bytes,
        payload: Bytes,
        signature: Bytes,
    ) -> ProtocolResult<()> {
        if Address::from_pubkey_bytes(signer_pubkey.clone()) != sender {
            return Err(PoolError::BatchSignature { sender }.into());
        }

        let digest = Hash::digest(payload);
        C::verify_signature(
            digest.as_bytes().as_ref(),
            signature.as_ref(),
            signer_pubkey.as_ref(),
        )
        .map_err(|_| PoolError::BatchSignature { sender }.into())
    }

    fn verify_transaction_signature(&self, stx: &SignedTransaction) -> ProtocolResult<()> {
        let fixed_bytes = stx.raw.encode_fixed()?;
        let tx_hash = Hash::digest(fixed_bytes);
        if tx_hash != stx.tx_hash {
            return Err(PoolError::CheckSig {
                tx_hash: stx.tx_hash,
            }
            .into());
        }

        C::verify_signature(
            tx_hash.as_bytes().as_ref(),
            stx.signature.as_ref(),
            stx.raw.signer.as_ref(),
        )
        .map_err(|_| {
            PoolError::CheckSig {
                tx_hash: stx.tx_hash,
            }
            .into()
        })
    }
}

#[derive(Debug, derive_more::Display)]
pub enum AdapterError {
    #[display(fmt = "adapter: interval forwarder dropped")]
    ForwarderDropped,
}

impl std::error::Error for AdapterError {}

impl<T> From<TrySendError<T>> for AdapterError {
    fn from(_error: TrySendError<T>) -> AdapterError {
        AdapterError::ForwarderDropped
    }
}

impl From<AdapterError> for ProtocolError {
    fn from(error: AdapterError) -> ProtocolError {
        ProtocolError::new(ProtocolErrorKind::TxPool, Box::new(error))
    }
}
