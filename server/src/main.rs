use clap::Parser;
use log::{error, info, warn};
use server::game::{GameSession, TICK_RATE};
use server::network::Server;
use shared::messages::GameMessage;
use shared::{RunState, StopMode, TransportConfig, DEFAULT_SERVER_PORT};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Address to bind to
    #[clap(short = 'H', long, default_value = "0.0.0.0")]
    host: String,
    /// Port to listen on
    #[clap(short, long, default_value_t = DEFAULT_SERVER_PORT)]
    port: u16,
    /// Milliseconds before an unconfirmed reliable message is sent again
    #[clap(long, default_value = "30")]
    resend_delay_ms: u64,
    /// Copies of a reliable message sent immediately
    #[clap(long, default_value = "2")]
    initial_send_count: u32,
    /// Reliable message ids remembered per peer
    #[clap(long, default_value = "1024")]
    dedup_capacity: usize,
    /// Give up on a reliable message after this many retransmissions
    #[clap(long)]
    max_retransmissions: Option<u32>,
    /// Forget peers that stay silent this many seconds
    #[clap(long)]
    idle_timeout_secs: Option<u64>,
}

impl Args {
    fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            dedup_capacity: self.dedup_capacity,
            initial_send_count: self.initial_send_count,
            resend_delay: Duration::from_millis(self.resend_delay_ms),
            max_retransmissions: self.max_retransmissions,
            ..TransportConfig::default()
        }
    }
}

/// Runs a dedicated server: no player in this process, every client remote
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let address = format!("{}:{}", args.host, args.port);
    let server: Server<GameMessage> = Server::bind(&address, args.transport_config()).await?;
    server.start()?;

    let idle_timeout = args.idle_timeout_secs.map(Duration::from_secs);
    let mut session = GameSession::new();
    let mut ticker = interval(Duration::from_secs(1) / TICK_RATE);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!("Dedicated server running at {} ticks per second", TICK_RATE);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = session.tick(&server).await {
                    error!("Session tick failed: {}", e);
                }
                if server.state() != RunState::Running {
                    warn!("Transport stopped, shutting down");
                    break;
                }
                if let Some(max_idle) = idle_timeout {
                    for peer in server.evict_idle_peers(max_idle) {
                        session.remove_player(peer);
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down gracefully...");
                break;
            }
        }
    }

    server.stop(StopMode::Synchronous).await?;
    Ok(())
}
