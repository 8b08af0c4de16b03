//! Datagram endpoint shared by the server and internet clients
//!
//! An [`Endpoint`] owns a UDP socket, the outbox of unconfirmed reliable
//! sends, and two background tasks:
//!
//! - the **receive loop** decodes every datagram, removes confirmed sends
//!   from the outbox, confirms reliable messages back to their sender and
//!   hands payloads to an [`Inbound`] handler;
//! - the **resend loop** wakes every `resend_check_interval` and puts every
//!   send that has waited longer than `resend_delay` on the wire again.
//!
//! What happens to a delivered payload (dedup scope, peer bookkeeping, which
//! inbox it lands in) is decided by the handler, which is how the server and
//! the client specialise the same endpoint.

use log::{debug, error, info, trace, warn};
use std::marker::PhantomData;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, Weak};
use tokio::net::UdpSocket;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};

use crate::config::TransportConfig;
use crate::error::TransportError;
use crate::ids::{IdGenerator, MessageId};
use crate::lifecycle::{Lifecycle, RunState, StopMode};
use crate::outbox::{Outbox, PendingSendInfo};
use crate::payload::Payload;
use crate::utils::lock;
use crate::wire::{WireCodec, WireMessage};

/// Receives payloads decoded by an endpoint's receive loop
pub trait Inbound<In>: Send + Sync + 'static {
    /// Records a reliable message id for the sender of `payload`
    ///
    /// Returns false if the id was already recorded, in which case the
    /// payload is dropped. The confirmation has been sent either way.
    fn is_first_delivery(&self, message_id: MessageId, payload: &In, source: SocketAddr) -> bool;

    fn handle_message(&self, payload: In, source: SocketAddr);
}

struct Shared {
    socket: UdpSocket,
    send_lock: AsyncMutex<()>,
    outbox: Outbox,
    codec: WireCodec,
    config: TransportConfig,
    ids: IdGenerator,
    lifecycle: Lifecycle,
    /// Error of the loop that stopped the endpoint, cleared on restart
    failure: Mutex<Option<String>>,
}

impl Shared {
    async fn transmit(&self, datagram: &[u8], dest: SocketAddr) -> Result<(), TransportError> {
        let _guard = self.send_lock.lock().await;
        self.socket
            .send_to(datagram, dest)
            .await
            .map_err(|source| TransportError::Send { dest, source })?;
        Ok(())
    }

    fn fail(&self, error: &TransportError) {
        *lock(&self.failure) = Some(error.to_string());
        self.lifecycle.request_stop();
    }
}

/// UDP endpoint receiving `In` payloads and sending `Out` payloads
pub struct Endpoint<In, Out> {
    shared: Arc<Shared>,
    tasks: Mutex<Vec<JoinHandle<Result<(), TransportError>>>>,
    _payloads: PhantomData<fn(In) -> Out>,
}

impl<In: Payload, Out: Payload> Endpoint<In, Out> {
    pub async fn bind(addr: &str, config: TransportConfig, ids: IdGenerator) -> Result<Self, TransportError> {
        config.validate()?;

        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        info!("Endpoint bound to {}", addr);

        Ok(Endpoint {
            shared: Arc::new(Shared {
                socket,
                send_lock: AsyncMutex::new(()),
                outbox: Outbox::new(),
                codec: WireCodec::new(config.max_datagram_size),
                config,
                ids,
                lifecycle: Lifecycle::new(),
                failure: Mutex::new(None),
            }),
            tasks: Mutex::new(Vec::new()),
            _payloads: PhantomData,
        })
    }

    /// Spawns the receive and resend loops
    ///
    /// The receive loop only holds a weak reference to `handler` and exits
    /// once the handler is gone. Must be called from within a tokio runtime.
    pub fn start<H: Inbound<In>>(&self, handler: Weak<H>) -> Result<(), TransportError> {
        let mut tasks = lock(&self.tasks);
        if tasks.iter().any(|task| !task.is_finished()) || !self.shared.lifecycle.begin() {
            return Err(TransportError::AlreadyRunning);
        }
        tasks.clear();
        *lock(&self.shared.failure) = None;

        tasks.push(tokio::spawn(receive_loop::<In, Out, H>(
            Arc::clone(&self.shared),
            handler,
        )));
        tasks.push(tokio::spawn(resend_loop(Arc::clone(&self.shared))));

        info!("Endpoint on {} started", self.describe_addr());
        Ok(())
    }

    /// Asks both loops to exit, optionally waiting for them
    ///
    /// A synchronous stop returns the error of a loop that ended because of
    /// a socket failure, if there was one.
    pub async fn stop(&self, mode: StopMode) -> Result<(), TransportError> {
        let requested = self.shared.lifecycle.request_stop();
        if !requested && self.shared.lifecycle.state() == RunState::Stopped {
            return Err(TransportError::NotRunning);
        }
        info!("Stopping endpoint on {} ({:?})", self.describe_addr(), mode);

        match mode {
            StopMode::Asynchronous => Ok(()),
            StopMode::Synchronous => self.join().await,
        }
    }

    async fn join(&self) -> Result<(), TransportError> {
        let tasks = std::mem::take(&mut *lock(&self.tasks));
        let mut outcome = Ok(());

        for task in tasks {
            let result = match task.await {
                Ok(result) => result,
                Err(join_error) => Err(TransportError::from(join_error)),
            };
            if let Err(error) = result {
                if outcome.is_ok() {
                    outcome = Err(error);
                }
            }
        }

        self.shared.lifecycle.finish();
        outcome
    }

    pub fn state(&self) -> RunState {
        self.shared.lifecycle.state()
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.shared.socket.local_addr().map_err(TransportError::Receive)
    }

    pub fn config(&self) -> &TransportConfig {
        &self.shared.config
    }

    pub fn ids(&self) -> &IdGenerator {
        &self.shared.ids
    }

    /// Sends `payload` once, without confirmation
    pub async fn send(&self, payload: &Out, dest: SocketAddr) -> Result<(), TransportError> {
        let datagram = self.encode_unreliable(payload)?;
        self.send_datagram(&datagram, dest).await
    }

    /// Encodes `payload` for [`Endpoint::send_datagram`], so a broadcast encodes once
    pub fn encode_unreliable(&self, payload: &Out) -> Result<Vec<u8>, TransportError> {
        Ok(self.shared.codec.encode(&WireMessage::Unreliable(payload))?)
    }

    pub async fn send_datagram(&self, datagram: &[u8], dest: SocketAddr) -> Result<(), TransportError> {
        self.ensure_running()?;
        self.shared.transmit(datagram, dest).await
    }

    /// Sends `payload` until `dest` confirms it
    ///
    /// The message enters the outbox before its first transmission and is
    /// then sent `initial_send_count` times back to back. The resend loop
    /// takes over from there.
    pub async fn send_reliable(&self, payload: &Out, dest: SocketAddr) -> Result<MessageId, TransportError> {
        self.ensure_running()?;

        let message_id = self.shared.ids.message_id();
        let datagram: Arc<[u8]> = self
            .shared
            .codec
            .encode(&WireMessage::Reliable {
                message_id,
                payload,
            })?
            .into();

        let outbox = &self.shared.outbox;
        outbox.insert(message_id, dest, Arc::clone(&datagram), Instant::now());

        for _ in 0..self.shared.config.initial_send_count {
            if let Err(error) = self.shared.transmit(&datagram, dest).await {
                outbox.confirm(message_id);
                return Err(error);
            }
            outbox.record_transmission(message_id, Instant::now());
        }

        trace!("Queued reliable {} for {}", message_id, dest);
        Ok(message_id)
    }

    pub fn pending_sends(&self) -> Vec<PendingSendInfo> {
        self.shared.outbox.snapshot(Instant::now())
    }

    pub fn transmissions(&self, message_id: MessageId) -> Option<u32> {
        self.shared.outbox.transmissions(message_id)
    }

    fn ensure_running(&self) -> Result<(), TransportError> {
        if let Some(failure) = lock(&self.shared.failure).clone() {
            return Err(TransportError::Failed(failure));
        }
        match self.shared.lifecycle.state() {
            RunState::Running => Ok(()),
            _ => Err(TransportError::NotRunning),
        }
    }

    fn describe_addr(&self) -> String {
        match self.shared.socket.local_addr() {
            Ok(addr) => addr.to_string(),
            Err(_) => "<unbound>".to_string(),
        }
    }
}

impl<In, Out> Drop for Endpoint<In, Out> {
    fn drop(&mut self) {
        self.shared.lifecycle.request_stop();
    }
}

async fn receive_loop<In: Payload, Out: Payload, H: Inbound<In>>(
    shared: Arc<Shared>,
    handler: Weak<H>,
) -> Result<(), TransportError> {
    let mut stop = shared.lifecycle.subscribe();
    let mut buffer = vec![0u8; shared.codec.max_datagram_size()];

    loop {
        let (len, source) = tokio::select! {
            _ = stop.requested() => break,
            received = shared.socket.recv_from(&mut buffer) => match received {
                Ok(received) => received,
                Err(source) => {
                    let error = TransportError::Receive(source);
                    if error.is_transient() {
                        debug!("Ignoring transient receive error: {}", error);
                        continue;
                    }
                    error!("Receive loop failed: {}", error);
                    shared.fail(&error);
                    return Err(error);
                }
            },
        };

        let Some(handler) = handler.upgrade() else {
            debug!("Receive handler dropped, leaving receive loop");
            break;
        };

        dispatch::<In, Out, H>(&shared, &buffer[..len], source, &handler).await;
    }

    Ok(())
}

async fn dispatch<In: Payload, Out: Payload, H: Inbound<In>>(
    shared: &Shared,
    datagram: &[u8],
    source: SocketAddr,
    handler: &H,
) {
    let message = match shared.codec.decode::<In>(datagram) {
        Ok(message) => message,
        Err(error) => {
            warn!("Discarding packet from {}: {}", source, error);
            return;
        }
    };

    match message {
        WireMessage::Confirmation { message_id } => {
            if shared.outbox.confirm(message_id) {
                trace!("{} confirmed by {}", message_id, source);
            }
        }
        WireMessage::Reliable {
            message_id,
            payload,
        } => {
            // Confirm duplicates too: the sender cannot know we already have it.
            // A reply that cannot go out is lost like any datagram; the sender resends.
            match confirm::<Out>(shared, message_id, source).await {
                Ok(()) => {}
                Err(error) if error.is_transient() => {
                    debug!("Could not confirm {} to {}: {}", message_id, source, error)
                }
                Err(error) => warn!("Could not confirm {} to {}: {}", message_id, source, error),
            }

            if handler.is_first_delivery(message_id, &payload, source) {
                handler.handle_message(payload, source);
            } else {
                debug!("Suppressed duplicate {} from {}", message_id, source);
            }
        }
        WireMessage::Unreliable(payload) => handler.handle_message(payload, source),
    }
}

async fn confirm<Out: Payload>(
    shared: &Shared,
    message_id: MessageId,
    dest: SocketAddr,
) -> Result<(), TransportError> {
    let confirmation = shared
        .codec
        .encode(&WireMessage::<Out>::Confirmation { message_id })?;
    shared.transmit(&confirmation, dest).await
}

async fn resend_loop(shared: Arc<Shared>) -> Result<(), TransportError> {
    let mut stop = shared.lifecycle.subscribe();
    let mut ticker = interval(shared.config.resend_check_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = stop.requested() => break,
            _ = ticker.tick() => {}
        }

        let due = shared.outbox.due(
            Instant::now(),
            shared.config.resend_delay,
            shared.config.max_retransmissions,
        );

        for abandoned in &due.abandoned {
            warn!(
                "Giving up on {} to {} after {} transmissions",
                abandoned.message_id, abandoned.destination, abandoned.transmissions
            );
        }

        for resend in due.resend {
            trace!("Resending {} to {}", resend.message_id, resend.destination);
            if let Err(error) = shared.transmit(&resend.datagram, resend.destination).await {
                if error.is_transient() {
                    debug!("Resend of {} failed: {}", resend.message_id, error);
                    continue;
                }
                error!("Resend loop failed: {}", error);
                shared.fail(&error);
                return Err(error);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{Channel, GameMessage, Vec2};
    use crate::payload::Addressed;
    use crate::PeerId;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    type ClientSide = Endpoint<GameMessage, Addressed<GameMessage>>;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<MessageId>>,
        delivered: Mutex<Vec<(GameMessage, SocketAddr)>>,
    }

    impl Inbound<GameMessage> for Recorder {
        fn is_first_delivery(&self, message_id: MessageId, _: &GameMessage, _: SocketAddr) -> bool {
            let mut seen = lock(&self.seen);
            if seen.contains(&message_id) {
                return false;
            }
            seen.push(message_id);
            true
        }

        fn handle_message(&self, payload: GameMessage, source: SocketAddr) {
            lock(&self.delivered).push((payload, source));
        }
    }

    async fn bind() -> ClientSide {
        Endpoint::bind("127.0.0.1:0", TransportConfig::default(), IdGenerator::from_seed(3))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_bind_rejects_invalid_config() {
        let config = TransportConfig {
            initial_send_count: 0,
            ..Default::default()
        };
        let result = ClientSide::bind("127.0.0.1:0", config, IdGenerator::new()).await;
        assert!(matches!(result, Err(TransportError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_bind_reports_bad_address() {
        let result = ClientSide::bind("not an address", TransportConfig::default(), IdGenerator::new()).await;
        assert!(matches!(result, Err(TransportError::Bind { .. })));
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let endpoint = bind().await;
        let recorder = Arc::new(Recorder::default());
        assert_eq!(endpoint.state(), RunState::Stopped);

        assert_ok!(endpoint.start(Arc::downgrade(&recorder)));
        assert_eq!(endpoint.state(), RunState::Running);
        assert!(matches!(
            endpoint.start(Arc::downgrade(&recorder)),
            Err(TransportError::AlreadyRunning)
        ));

        assert_ok!(endpoint.stop(StopMode::Synchronous).await);
        assert_eq!(endpoint.state(), RunState::Stopped);
        assert!(matches!(
            endpoint.stop(StopMode::Synchronous).await,
            Err(TransportError::NotRunning)
        ));

        // Restart after a full stop
        assert_ok!(endpoint.start(Arc::downgrade(&recorder)));
        assert_ok!(endpoint.stop(StopMode::Synchronous).await);
    }

    #[tokio::test]
    async fn test_asynchronous_stop_returns_immediately() {
        let endpoint = bind().await;
        let recorder = Arc::new(Recorder::default());
        endpoint.start(Arc::downgrade(&recorder)).unwrap();

        assert_ok!(endpoint.stop(StopMode::Asynchronous).await);
        assert_eq!(endpoint.state(), RunState::StopRequested);

        // Loops drain on their own; a later synchronous stop just joins them
        assert_ok!(endpoint.stop(StopMode::Synchronous).await);
        assert_eq!(endpoint.state(), RunState::Stopped);
    }

    #[tokio::test]
    async fn test_send_requires_running() {
        let endpoint = bind().await;
        let dest: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let payload = Addressed::new(PeerId(1), GameMessage::StartGame);

        assert_err!(endpoint.send(&payload, dest).await);
        assert!(matches!(
            endpoint.send_reliable(&payload, dest).await,
            Err(TransportError::NotRunning)
        ));
        assert!(endpoint.pending_sends().is_empty());
    }

    #[tokio::test]
    async fn test_reliable_send_is_delivered_and_confirmed() {
        let sender = bind().await;
        let receiver: Endpoint<Addressed<GameMessage>, GameMessage> =
            Endpoint::bind("127.0.0.1:0", TransportConfig::default(), IdGenerator::new())
                .await
                .unwrap();

        let sender_handler = Arc::new(Recorder::default());
        let receiver_handler = Arc::new(ReceiverSide::default());
        sender.start(Arc::downgrade(&sender_handler)).unwrap();
        receiver.start(Arc::downgrade(&receiver_handler)).unwrap();

        let payload = Addressed::new(
            PeerId(5),
            GameMessage::MousePosition {
                aim: Vec2::new(1.0, 2.0),
            },
        );
        let message_id = sender
            .send_reliable(&payload, receiver.local_addr().unwrap())
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            while sender.transmissions(message_id).is_some() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("confirmation never arrived");

        let delivered = lock(&receiver_handler.delivered).clone();
        assert_eq!(delivered, vec![payload]);
        assert_eq!(delivered[0].channel(), Channel::Game);

        sender.stop(StopMode::Synchronous).await.unwrap();
        receiver.stop(StopMode::Synchronous).await.unwrap();
    }

    #[derive(Default)]
    struct ReceiverSide {
        seen: Mutex<Vec<MessageId>>,
        delivered: Mutex<Vec<Addressed<GameMessage>>>,
    }

    impl Inbound<Addressed<GameMessage>> for ReceiverSide {
        fn is_first_delivery(&self, message_id: MessageId, _: &Addressed<GameMessage>, _: SocketAddr) -> bool {
            let mut seen = lock(&self.seen);
            let first = !seen.contains(&message_id);
            seen.push(message_id);
            first
        }

        fn handle_message(&self, payload: Addressed<GameMessage>, _: SocketAddr) {
            lock(&self.delivered).push(payload);
        }
    }

    #[tokio::test]
    async fn test_failed_confirmation_keeps_receive_loop_running() {
        let receiver: Endpoint<Addressed<GameMessage>, GameMessage> =
            Endpoint::bind("127.0.0.1:0", TransportConfig::default(), IdGenerator::new())
                .await
                .unwrap();
        let handler = Arc::new(ReceiverSide::default());
        receiver.start(Arc::downgrade(&handler)).unwrap();

        let payload = Addressed::new(PeerId(9), GameMessage::StartGame);
        let datagram = receiver
            .shared
            .codec
            .encode(&WireMessage::Reliable {
                message_id: MessageId(7),
                payload: payload.clone(),
            })
            .unwrap();

        // Nothing can be sent to port 0, so both confirmations fail
        let unroutable: SocketAddr = "127.0.0.1:0".parse().unwrap();
        for _ in 0..2 {
            dispatch::<Addressed<GameMessage>, GameMessage, ReceiverSide>(
                &receiver.shared,
                &datagram,
                unroutable,
                &handler,
            )
            .await;
        }
        assert_eq!(lock(&handler.delivered).clone(), vec![payload]);
        assert_eq!(receiver.state(), RunState::Running);

        // The loop still confirms traffic from a reachable peer
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let next = receiver
            .shared
            .codec
            .encode(&WireMessage::Reliable {
                message_id: MessageId(8),
                payload: Addressed::new(
                    PeerId(9),
                    GameMessage::MousePosition {
                        aim: Vec2::new(0.5, 0.5),
                    },
                ),
            })
            .unwrap();
        peer.send_to(&next, receiver.local_addr().unwrap()).await.unwrap();

        let mut buffer = [0u8; 64];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), peer.recv_from(&mut buffer))
            .await
            .expect("no confirmation after a failed one")
            .unwrap();
        let reply: WireMessage<GameMessage> = receiver.shared.codec.decode(&buffer[..len]).unwrap();
        assert_eq!(reply, WireMessage::Confirmation { message_id: MessageId(8) });

        assert_ok!(receiver.stop(StopMode::Synchronous).await);
    }

    #[tokio::test]
    async fn test_socket_failure_stops_endpoint_and_is_reported() {
        let endpoint = bind().await;
        let recorder = Arc::new(Recorder::default());
        endpoint.start(Arc::downgrade(&recorder)).unwrap();

        let unroutable: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let datagram: Arc<[u8]> = Arc::from(vec![0u8; 8]);
        endpoint
            .shared
            .outbox
            .insert(MessageId(1), unroutable, datagram, Instant::now());

        tokio::time::timeout(Duration::from_secs(2), async {
            while endpoint.state() == RunState::Running {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("resend failure did not stop the endpoint");
        assert_eq!(endpoint.state(), RunState::StopRequested);

        let dest: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let payload = Addressed::new(PeerId(1), GameMessage::StartGame);
        let result = endpoint.send(&payload, dest).await;
        assert!(matches!(result, Err(TransportError::Failed(_))), "{:?}", result);

        let result = endpoint.stop(StopMode::Synchronous).await;
        assert!(matches!(result, Err(TransportError::Send { .. })), "{:?}", result);
        assert_eq!(endpoint.state(), RunState::Stopped);

        // Restarting clears the failure
        endpoint.shared.outbox.confirm(MessageId(1));
        endpoint.start(Arc::downgrade(&recorder)).unwrap();
        assert_ok!(endpoint.send(&payload, dest).await);
        assert_ok!(endpoint.stop(StopMode::Synchronous).await);
    }

    #[tokio::test]
    async fn test_receive_loop_exits_when_handler_dropped() {
        let endpoint = bind().await;
        let recorder = Arc::new(Recorder::default());
        endpoint.start(Arc::downgrade(&recorder)).unwrap();
        drop(recorder);

        // Wake the receive loop so it notices the handler is gone
        let poke = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        poke.send_to(b"wake", endpoint.local_addr().unwrap()).await.unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let finished = lock(&endpoint.tasks)[0].is_finished();
                if finished {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("receive loop kept running");

        endpoint.stop(StopMode::Synchronous).await.unwrap();
    }
}
