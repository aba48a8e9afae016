//! Server configuration and lifecycle: command-line validation, role
//! selection, and the listener/accept loop that wires each connection
//! to the shared store, waiter registry, and replica manager.

use std::sync::Arc;

use rand::distr::{Alphanumeric, SampleString};
use regex::Regex;
use thiserror::Error;
use tokio::{
    net::{TcpListener, TcpStream},
    sync::{Mutex, RwLock},
};

use crate::{
    connection::{handle_client_connection, handle_master_connection},
    handshake::perform_handshake,
    key_value_store::KeyValueStore,
    replication::ReplicaManager,
    state::State,
};

/// Errors from command-line argument parsing and server setup.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum CliError {
    #[error("Invalid command line flag")]
    InvalidCommandLineFlag,
    #[error("Invalid port flag value")]
    InvalidPortFlagValue,
    #[error("Invalid master address")]
    InvalidMasterAddress,
    #[error("Invalid master port")]
    InvalidMasterPort,
}

/// Role of a server instance: a master accepts writes and feeds
/// replicas; a replica applies its master's command stream and serves
/// reads.
#[derive(Debug, PartialEq, Clone)]
pub enum RedisRole {
    Master,
    Replica((String, u16)),
}

impl RedisRole {
    /// Redis terminology for INFO output: replicas report as "slave".
    pub fn as_string(&self) -> &str {
        match self {
            RedisRole::Master => "master",
            RedisRole::Replica(_) => "slave",
        }
    }
}

/// Static configuration of one server instance.
#[derive(Debug, Clone)]
pub struct RedisServer {
    pub port: u16,
    pub role: RedisRole,
    /// 40-character replication id generated at startup.
    pub repl_id: String,
}

impl RedisServer {
    /// Builds a server from command-line arguments.
    ///
    /// Supported flags: `--port <port>` (default 6379) and
    /// `--replicaof "<host> <port>"`.
    pub fn new<I: IntoIterator<Item = String>>(command_line_args: I) -> Result<Self, CliError> {
        let mut iter = command_line_args.into_iter().skip(1);
        let mut port: Option<u16> = None;
        let mut role: Option<RedisRole> = None;

        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--port" => {
                    let Some(port_str) = iter.next() else {
                        return Err(CliError::InvalidCommandLineFlag);
                    };

                    port = Some(validate_port_flag(&port_str)?);
                }
                "--replicaof" => {
                    let Some(master_address) = iter.next() else {
                        return Err(CliError::InvalidCommandLineFlag);
                    };

                    let (host, master_port) = validate_master_address(&master_address)?;

                    role = Some(RedisRole::Replica((host, master_port)));
                }
                _ => return Err(CliError::InvalidCommandLineFlag),
            }
        }

        Ok(RedisServer {
            port: port.unwrap_or(6379),
            role: role.unwrap_or(RedisRole::Master),
            repl_id: Alphanumeric.sample_string(&mut rand::rng(), 40),
        })
    }

    /// Binds the configured port and serves forever. Returns an error
    /// only when the bind fails.
    pub async fn run(self) -> Result<(), std::io::Error> {
        let listener = TcpListener::bind(format!("127.0.0.1:{}", self.port)).await?;

        self.serve(listener).await;

        Ok(())
    }

    /// Serves connections on an already-bound listener. Split out from
    /// [`RedisServer::run`] so tests can bind an ephemeral port.
    pub async fn serve(self, listener: TcpListener) {
        let store = Arc::new(Mutex::new(KeyValueStore::new()));
        let state = Arc::new(Mutex::new(State::new()));
        let replicas = Arc::new(ReplicaManager::new());
        let server = Arc::new(RwLock::new(self));

        start_replication_if_replica(&server, &store, &state, &replicas).await;

        loop {
            match listener.accept().await {
                Ok((stream, client_address)) => {
                    let server = Arc::clone(&server);
                    let store = Arc::clone(&store);
                    let state = Arc::clone(&state);
                    let replicas = Arc::clone(&replicas);

                    tokio::spawn(async move {
                        handle_client_connection(
                            stream,
                            server,
                            replicas,
                            client_address.to_string(),
                            store,
                            state,
                        )
                        .await;
                    });
                }
                Err(error) => {
                    eprintln!("Failed to accept connection: {}", error);
                    break;
                }
            }
        }
    }
}

/// On a replica, connects out to the master, runs the handshake, and
/// spawns the task that applies the propagated command stream.
async fn start_replication_if_replica(
    server: &Arc<RwLock<RedisServer>>,
    store: &Arc<Mutex<KeyValueStore>>,
    state: &Arc<Mutex<State>>,
    replicas: &Arc<ReplicaManager>,
) {
    let (master_host, master_port, own_port) = {
        let server_guard = server.read().await;

        match &server_guard.role {
            RedisRole::Replica((host, port)) => (host.clone(), *port, server_guard.port),
            RedisRole::Master => return,
        }
    };

    let master_address = format!("{}:{}", master_host, master_port);

    let stream = match TcpStream::connect(&master_address).await {
        Ok(stream) => stream,
        Err(error) => {
            eprintln!("Failed to connect to master {}: {}", master_address, error);
            return;
        }
    };

    let server = Arc::clone(server);
    let store = Arc::clone(store);
    let state = Arc::clone(state);
    let replicas = Arc::clone(replicas);

    tokio::spawn(async move {
        let (stream, leftover) = match perform_handshake(stream, own_port).await {
            Ok(outcome) => outcome,
            Err(error) => {
                eprintln!("Replication handshake failed: {}", error);
                return;
            }
        };

        handle_master_connection(
            &master_address,
            stream,
            leftover,
            server,
            replicas,
            store,
            state,
        )
        .await;
    });
}

fn validate_port_flag(port: &str) -> Result<u16, CliError> {
    validate_port_with_error(port, CliError::InvalidPortFlagValue)
}

fn validate_master_port(port: &str) -> Result<u16, CliError> {
    validate_port_with_error(port, CliError::InvalidMasterPort)
}

fn validate_port_with_error(port: &str, error: CliError) -> Result<u16, CliError> {
    let port_number = port.parse::<u16>().map_err(|_| error.clone())?;

    if port_number == 0 {
        return Err(error);
    }

    Ok(port_number)
}

/// Parses a `"host port"` master address; the host may be an IPv4
/// address or a hostname.
fn validate_master_address(master_address: &str) -> Result<(String, u16), CliError> {
    let ipv4_regex = Regex::new(r"^(\d{1,3})\.(\d{1,3})\.(\d{1,3})\.(\d{1,3})$")
        .map_err(|_| CliError::InvalidMasterAddress)?;
    let hostname_regex =
        Regex::new(r"^[a-zA-Z0-9\-\.]+$").map_err(|_| CliError::InvalidMasterAddress)?;

    let split_address = master_address.split_whitespace().collect::<Vec<&str>>();

    if split_address.len() != 2 {
        return Err(CliError::InvalidMasterAddress);
    }

    let address = split_address[0];

    let valid_address = if let Some(caps) = ipv4_regex.captures(address) {
        caps.iter().skip(1).all(|octet| {
            octet
                .map(|m| m.as_str().parse::<u16>().map(|v| v <= 255).unwrap_or(false))
                .unwrap_or(false)
        })
    } else {
        hostname_regex.is_match(address)
    };

    if !valid_address {
        return Err(CliError::InvalidMasterAddress);
    }

    let port_number = validate_master_port(split_address[1])?;

    Ok((address.to_string(), port_number))
}
