//! The raid server acceptor: parses configuration, builds the TLS listener,
//! spawns one thread per connection, and runs the boss-respawn scheduler.

mod handler;
mod tls;

use std::io;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{Arg, Command};
use slog::{error, info, o, warn};
use socket2::{Domain, Protocol, Socket, Type};

use raidcore::config::ConfigOverlay;
use raidcore::{SecureStream, ServerConfig, SharedGameState};

use crate::handler::ConnectionHandler;

/// Binds and listens on `cfg.listen_port` with `cfg.backlog` as the `listen(2)`
/// backlog. `std::net::TcpListener::bind` hardcodes its own backlog and gives
/// no way to raise it, so the socket is built and configured through
/// `socket2` instead and only handed to std once it's listening.
fn bind_listener(cfg: &ServerConfig) -> io::Result<TcpListener> {
    let addr = SocketAddr::new(std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED), cfg.listen_port);
    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(cfg.backlog as i32)?;
    Ok(socket.into())
}

fn build_cli() -> Command {
    Command::new("raidserver")
        .version("1.0")
        .author("World Boss Raid Team")
        .about("Runs the world boss raid server")
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .help("Path to a TOML config file"),
        )
        .arg(
            Arg::new("port")
                .long("port")
                .value_name("PORT")
                .help("Overrides the listen port"),
        )
        .arg(Arg::new("cert").long("cert").value_name("FILE"))
        .arg(Arg::new("key").long("key").value_name("FILE"))
        .arg(Arg::new("ca").long("ca").value_name("FILE"))
}

/// Loads the layered configuration: defaults, then an optional `--config`
/// TOML file, then any CLI flags given directly. Flags always win.
fn load_config() -> ServerConfig {
    let matches = build_cli().get_matches();

    let cfg = match matches.get_one::<String>("config") {
        Some(path) => ServerConfig::from_toml_file(path).expect("failed to load config file"),
        None => ServerConfig::default(),
    };

    let flag_overlay = ConfigOverlay {
        listen_port: matches
            .get_one::<String>("port")
            .and_then(|v| v.parse().ok()),
        cert_path: matches.get_one::<String>("cert").cloned(),
        key_path: matches.get_one::<String>("key").cloned(),
        ca_path: matches.get_one::<String>("ca").cloned(),
        ..ConfigOverlay::default()
    };

    cfg.apply_overlay(flag_overlay)
}

/// Polls the shared state for a boss stuck in its respawn window and
/// advances it to the next stage once `respawn_delay_s` has passed.
fn run_respawn_scheduler(
    state: Arc<SharedGameState>,
    respawn_delay_s: u64,
    shutdown: Arc<AtomicBool>,
    logger: slog::Logger,
) {
    let mut respawning_since: Option<std::time::Instant> = None;
    while !shutdown.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(250));
        let snapshot = state.snapshot();
        if !snapshot.is_respawning {
            respawning_since = None;
            continue;
        }
        let since = *respawning_since.get_or_insert_with(std::time::Instant::now);
        if since.elapsed() >= Duration::from_secs(respawn_delay_s) {
            state.spawn_next_boss();
            respawning_since = None;
            info!(logger, "boss respawned");
        }
    }
}

fn main() {
    let logger = raidutil::init();
    let cfg = Arc::new(load_config());

    let (tls_config, mutual_tls) =
        tls::build_tls_config(&cfg).expect("failed to build TLS configuration");

    let listener = bind_listener(&cfg).expect("failed to bind listen socket");
    info!(logger, "listening"; "port" => cfg.listen_port, "backlog" => cfg.backlog, "mutual_tls" => mutual_tls);

    let state = Arc::new(SharedGameState::new());
    let shutdown = Arc::new(AtomicBool::new(false));

    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || shutdown.store(true, Ordering::Relaxed))
            .expect("failed to install signal handler");
    }

    {
        let state = state.clone();
        let shutdown = shutdown.clone();
        let scheduler_logger = logger.new(o!("component" => "respawn_scheduler"));
        let respawn_delay_s = cfg.respawn_delay_s;
        thread::spawn(move || {
            run_respawn_scheduler(state, respawn_delay_s, shutdown, scheduler_logger)
        });
    }

    listener
        .set_nonblocking(true)
        .expect("failed to set listener nonblocking");

    while !shutdown.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((tcp, addr)) => {
                let state = state.clone();
                let cfg = cfg.clone();
                let tls_config = tls_config.clone();
                let conn_logger = logger.new(o!("peer" => addr.to_string()));
                thread::spawn(move || {
                    let mut stream = match tls::TlsStream::accept(tcp, tls_config, mutual_tls) {
                        Ok(s) => s,
                        Err(e) => {
                            warn!(conn_logger, "tls handshake failed"; "error" => %e);
                            return;
                        }
                    };
                    if !stream.verify_peer() {
                        warn!(conn_logger, "client certificate rejected");
                        let _ = stream.shutdown();
                        return;
                    }
                    let handler = ConnectionHandler::new(stream, state, cfg, conn_logger);
                    handler.run();
                });
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                error!(logger, "accept failed"; "error" => %e);
            }
        }
    }

    info!(logger, "shutting down");
}
