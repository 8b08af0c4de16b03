use clap::{Parser, Subcommand};
use client::game::{ClientGameState, ClientPhase};
use client::network::InternetClient;
use log::{error, info};
use server::game::{GameSession, TICK_RATE};
use server::network::Server;
use shared::messages::{GameMessage, Vec2};
use shared::{
    CommunicationClient, StopMode, TransportConfig, TransportError, DEFAULT_CLIENT_PORT,
    DEFAULT_SERVER_PORT,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Name shown in the lobby
    #[arg(short = 'n', long, default_value = "player")]
    name: String,

    /// Milliseconds before an unconfirmed reliable message is sent again
    #[arg(long, default_value = "30")]
    resend_delay_ms: u64,

    /// Copies of a reliable message sent immediately
    #[arg(long, default_value = "2")]
    initial_send_count: u32,

    /// Reliable message ids remembered per sender
    #[arg(long, default_value = "1024")]
    dedup_capacity: usize,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Run the server in this process and play on it
    Host {
        /// Port remote players connect to
        #[arg(short, long, default_value_t = DEFAULT_SERVER_PORT)]
        port: u16,
        /// Seconds to wait in the lobby before starting the game
        #[arg(long, default_value = "10")]
        start_after: u64,
    },
    /// Join a game hosted elsewhere
    Guest {
        /// Server address to connect to
        #[arg(short = 's', long)]
        server: SocketAddr,
        /// Local port to bind
        #[arg(short, long, default_value_t = DEFAULT_CLIENT_PORT)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let config = TransportConfig {
        dedup_capacity: args.dedup_capacity,
        initial_send_count: args.initial_send_count,
        resend_delay: Duration::from_millis(args.resend_delay_ms),
        ..TransportConfig::default()
    };

    match args.mode {
        Mode::Host { port, start_after } => {
            run_host(&args.name, port, Duration::from_secs(start_after), config).await
        }
        Mode::Guest { server, port } => run_guest(&args.name, server, port, config).await,
    }
}

async fn run_host(
    name: &str,
    port: u16,
    start_after: Duration,
    config: TransportConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let server: Server<GameMessage> = Server::bind(&format!("0.0.0.0:{}", port), config).await?;
    server.start()?;
    let host = server.attach_hosting_client();
    info!("Hosting on port {} as {}", port, host.id());

    host.send_reliable(GameMessage::JoinLobby {
        name: name.to_string(),
    })
    .await?;

    let mut session = GameSession::new();
    let mut state = ClientGameState::new();
    let start_at = tokio::time::Instant::now() + start_after;
    let mut ticker = tick_interval();
    let mut tick: u64 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if state.phase() == ClientPhase::Lobby && tokio::time::Instant::now() >= start_at {
                    host.send_reliable(GameMessage::StartGame).await?;
                }
                if let Err(e) = session.tick(&server).await {
                    error!("Session tick failed: {}", e);
                }
                play(&host, &mut state, tick).await?;
                tick += 1;
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

async fn run_guest(
    name: &str,
    server: SocketAddr,
    port: u16,
    config: TransportConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let client: InternetClient<GameMessage> =
        InternetClient::connect(&format!("0.0.0.0:{}", port), server, config).await?;
    info!("Joining {} as {}", server, client.id());

    client
        .send_reliable(GameMessage::JoinLobby {
            name: name.to_string(),
        })
        .await?;

    let mut state = ClientGameState::new();
    let mut ticker = tick_interval();
    let mut tick: u64 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                play(&client, &mut state, tick).await?;
                tick += 1;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down gracefully...");
                break;
            }
        }
    }

    client.stop(StopMode::Synchronous).await?;
    Ok(())
}

fn tick_interval() -> tokio::time::Interval {
    let mut ticker = interval(Duration::from_secs(1) / TICK_RATE);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

/// One client frame: apply what the server sent, then act
///
/// Without input devices the player sweeps its aim in a circle and fires
/// once per second.
async fn play<C: CommunicationClient<GameMessage>>(
    client: &C,
    state: &mut ClientGameState,
    tick: u64,
) -> Result<(), TransportError> {
    let before = state.lobby().len();
    state.update(client);
    if state.lobby().len() != before {
        info!("Lobby: {:?}", state.lobby());
    }

    if state.phase() != ClientPhase::Game {
        return Ok(());
    }

    for shot in state.take_shots() {
        info!("{} fired at ({:.2}, {:.2})", shot.shooter, shot.aim.x, shot.aim.y);
    }

    let angle = tick as f32 / TICK_RATE as f32;
    let aim = Vec2::new(angle.cos(), angle.sin());
    client.send(GameMessage::MousePosition { aim }).await?;

    if tick % u64::from(TICK_RATE) == 0 {
        client
            .send_reliable(GameMessage::Shoot {
                aim,
                relative_size: 1.0,
            })
            .await?;
    }
    Ok(())
}
