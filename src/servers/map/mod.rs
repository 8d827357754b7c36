//! Game server: accept loop, per-connection tasks and the shared state
//! handlers and tick systems work against.
//!
//! Each connection runs three tasks. The reader decodes frames into a
//! bounded ingress queue (backpressure blocks the reader, packets are never
//! dropped). The dispatcher, running in the connection task itself, pops
//! them in order and awaits the handler. The writer drains the session's
//! outbox, enciphers and frames.

pub mod dispatch;
pub mod handlers;
pub mod packets;
pub mod systems;
pub mod view;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};

use crate::config::ServerConfig;
use crate::core::ServerState;
use crate::database::StaticData;
use crate::game::clan::{Clan, ClanMember};
use crate::game::{Scripting, World};
use crate::network::cipher::{build_init_packet, random_seed};
use crate::network::{read_frame, write_frame, Cipher};
use crate::repo::{with_timeout, RepoResult, Repos, SAVE_TIMEOUT, SHORT_TIMEOUT};
use crate::session::{next_session_id, wait_closed, OutboxReceiver, Session, SessionState};

pub struct GameServer {
    /// Never held across an `.await` on repository I/O.
    pub world: Mutex<World>,
    pub data: Arc<StaticData>,
    pub repos: Repos,
    pub scripting: Arc<dyn Scripting>,
    pub config: ServerConfig,
    pub state: ServerState,
    started: Instant,
    start_unix: i64,
}

impl GameServer {
    /// Builds the world from static data and spawns its NPCs and doors.
    pub fn new(config: ServerConfig, data: Arc<StaticData>, repos: Repos, scripting: Arc<dyn Scripting>) -> Arc<Self> {
        let mut world = World::new(config.aoi_radius);
        world.populate(&data);
        Arc::new(Self {
            world: Mutex::new(world),
            data,
            repos,
            scripting,
            config,
            state: ServerState::new(),
            started: Instant::now(),
            start_unix: chrono::Utc::now().timestamp(),
        })
    }

    /// Fills the clan registry from the repository. Run once before serving.
    pub async fn load_clans(&self) -> RepoResult<usize> {
        let clans = with_timeout("load_clans", SAVE_TIMEOUT, self.repos.clans.load_clans()).await?;
        let members = with_timeout("load_clan_members", SAVE_TIMEOUT, self.repos.clans.load_members()).await?;
        let mut by_clan: HashMap<i32, HashMap<i32, ClanMember>> = HashMap::new();
        for m in members {
            by_clan
                .entry(m.clan_id)
                .or_default()
                .insert(m.char_id, ClanMember { char_id: m.char_id, name: m.char_name, rank: m.rank });
        }
        let mut w = self.world.lock().await;
        for row in clans {
            w.clans.insert(Clan {
                clan_id: row.clan_id,
                name: row.clan_name,
                leader_id: row.leader_id,
                leader_name: row.leader_name,
                found_date: row.found_date,
                has_castle: row.has_castle,
                has_house: row.has_house,
                members: by_clan.remove(&row.clan_id).unwrap_or_default(),
            });
        }
        tracing::info!("[game] [clans_loaded] count={}", w.clans.count());
        Ok(w.clans.count())
    }

    pub fn uptime_secs(&self) -> i32 {
        self.started.elapsed().as_secs() as i32
    }

    pub fn start_unix(&self) -> i64 {
        self.start_unix
    }

    /// Wall clock seconds as the client's game-time field expects.
    pub fn now_secs(&self) -> i32 {
        chrono::Utc::now().timestamp() as i32
    }

    pub async fn run(self: Arc<Self>, bind_addr: &str) -> Result<()> {
        let listener = TcpListener::bind(bind_addr).await.with_context(|| format!("bind {}", bind_addr))?;
        tracing::info!("[game] [ready] addr={}", bind_addr);
        self.serve(listener).await
    }

    /// Accepts until shutdown is requested.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        let mut shutdown = self.state.subscribe();
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(v) => v,
                        Err(e) => {
                            tracing::warn!("[game] [accept_failed] error={}", e);
                            continue;
                        }
                    };
                    let srv = Arc::clone(&self);
                    tokio::spawn(async move {
                        handle_connection(srv, stream, peer.to_string()).await;
                    });
                }
                _ = shutdown.changed() => {
                    tracing::info!("[game] [accept_stopped]");
                    return Ok(());
                }
            }
        }
    }
}

async fn handle_connection(srv: Arc<GameServer>, stream: TcpStream, peer: String) {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!("[game] [nodelay_failed] peer={} error={}", peer, e);
    }
    let seed = random_seed();
    let (mut rd, mut wr) = stream.into_split();

    // The init packet goes out raw; both directions key off its seed.
    if let Err(e) = wr.write_all(&build_init_packet(seed)).await {
        tracing::debug!("[game] [init_failed] peer={} error={}", peer, e);
        return;
    }

    let (sess, out_rx) = Session::new(next_session_id(), peer, srv.config.out_queue_size);
    tracing::info!("[game] [connect] session={} peer={}", sess.id, sess.peer);

    let (in_tx, mut in_rx) = mpsc::channel::<Vec<u8>>(srv.config.in_queue_size.max(1));

    let reader = {
        let sess = Arc::clone(&sess);
        let mut cipher = Cipher::new(seed);
        tokio::spawn(async move {
            loop {
                let mut frame = match read_frame(&mut rd).await {
                    Ok(f) => f,
                    Err(e) => {
                        tracing::debug!("[game] [read_end] session={} reason={}", sess.id, e);
                        break;
                    }
                };
                cipher.decrypt(&mut frame);
                if in_tx.send(frame).await.is_err() {
                    break;
                }
            }
            sess.close();
        })
    };

    let writer = tokio::spawn(write_loop(Arc::clone(&sess), out_rx, wr, Cipher::new(seed)));

    let mut closed = sess.closed_watch();
    let mut shutdown = srv.state.subscribe();
    loop {
        tokio::select! {
            biased;
            pkt = in_rx.recv() => {
                let Some(pkt) = pkt else { break };
                dispatch::dispatch(&srv, &sess, &pkt).await;
                if sess.is_closed() {
                    break;
                }
            }
            _ = wait_closed(&mut closed) => break,
            _ = shutdown.changed() => break,
        }
    }

    sess.close();
    // whatever is still queued is discarded with the receiver
    drop(in_rx);
    handlers::auth::leave_world(&srv, &sess).await;
    if let Some(account) = sess.account() {
        if let Err(e) = with_timeout("set_online", SHORT_TIMEOUT, srv.repos.accounts.set_online(account.clone(), false)).await {
            tracing::error!("[game] [offline_failed] account={} error={}", account, e);
        }
    }
    reader.abort();
    let _ = writer.await;
    tracing::info!("[game] [disconnect] session={}", sess.id);
}

async fn write_loop(sess: Arc<Session>, mut out_rx: OutboxReceiver, mut wr: tokio::net::tcp::OwnedWriteHalf, mut cipher: Cipher) {
    let mut closed = sess.closed_watch();
    loop {
        tokio::select! {
            pkt = out_rx.recv() => {
                let Some(mut pkt) = pkt else { break };
                cipher.encrypt(&mut pkt);
                if let Err(e) = write_frame(&mut wr, &pkt).await {
                    tracing::debug!("[game] [write_end] session={} reason={}", sess.id, e);
                    sess.close();
                    return;
                }
            }
            _ = wait_closed(&mut closed) => break,
        }
    }
    // flush what was queued before the close, then hang up
    for mut pkt in out_rx.drain() {
        cipher.encrypt(&mut pkt);
        if write_frame(&mut wr, &pkt).await.is_err() {
            break;
        }
    }
    let _ = wr.shutdown().await;
}

/// True in every state where a live client may talk to us.
pub(crate) fn is_live(state: SessionState) -> bool {
    state != SessionState::Disconnecting
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnecting_is_not_live() {
        assert!(is_live(SessionState::Handshake));
        assert!(is_live(SessionState::InWorld));
        assert!(!is_live(SessionState::Disconnecting));
    }
}
