//! WebSocket server and connection handling.

use crate::protocol::{ClientMessage, MatchInfo, ServerMessage};
use crate::session::{MatchSession, SessionError};
use crate::store::SharedSaves;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use kavatar_core::{GameEvent, RuleSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Server state shared across all connections.
pub struct ServerState {
    /// All hosted matches
    pub matches: DashMap<Uuid, MatchSession>,
    /// Mapping from client ID to their match ID
    pub client_matches: DashMap<Uuid, Uuid>,
    /// Mapping from client ID to their message sender
    pub client_senders: DashMap<Uuid, mpsc::UnboundedSender<ServerMessage>>,
    pub saves: SharedSaves,
    /// Rules override applied to every new match
    pub rules: Option<RuleSet>,
}

impl ServerState {
    pub fn new(rules: Option<RuleSet>) -> Self {
        Self {
            matches: DashMap::new(),
            client_matches: DashMap::new(),
            client_senders: DashMap::new(),
            saves: SharedSaves::new(),
            rules,
        }
    }

    /// Send a message to a specific client.
    pub fn send_to_client(&self, client_id: Uuid, msg: ServerMessage) {
        if let Some(sender) = self.client_senders.get(&client_id) {
            let _ = sender.send(msg);
        }
    }

    /// Broadcast a message to every client at a match.
    pub fn broadcast_to_match(&self, match_id: Uuid, msg: ServerMessage) {
        let clients = match self.matches.get(&match_id) {
            Some(session) => session.clients.clone(),
            None => return,
        };
        for client_id in clients {
            self.send_to_client(client_id, msg.clone());
        }
    }

    pub fn match_list(&self) -> Vec<MatchInfo> {
        self.matches.iter().map(|m| m.to_info()).collect()
    }

    fn send_error(&self, client_id: Uuid, err: SessionError) {
        let msg = match err {
            SessionError::Rejected(error) => ServerMessage::ActionRejected {
                message: error.to_string(),
                error,
            },
            other => ServerMessage::Error {
                message: other.to_string(),
            },
        };
        self.send_to_client(client_id, msg);
    }

    /// Broadcast events, and the full state when the turn moved on
    fn publish(&self, match_id: Uuid, events: Vec<GameEvent>) {
        if events.is_empty() {
            return;
        }
        let state_changed = events.iter().any(|e| {
            !matches!(
                e,
                GameEvent::TimerTick { .. } | GameEvent::Notice { .. } | GameEvent::PauseChanged { .. }
            )
        });
        self.broadcast_to_match(match_id, ServerMessage::Events { events });

        if state_changed {
            let state = self.matches.get(&match_id).map(|m| m.state());
            if let Some(state) = state {
                self.broadcast_to_match(match_id, ServerMessage::State { state });
            }
        }
    }
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Run the WebSocket server.
pub async fn run_server(addr: SocketAddr, state: Arc<ServerState>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Kavatar server listening on {}", addr);

    tokio::spawn(run_clock(Arc::clone(&state)));

    while let Ok((stream, peer_addr)) = listener.accept().await {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer_addr, state).await {
                error!("Connection error from {}: {}", peer_addr, e);
            }
        });
    }

    Ok(())
}

/// Tick every match's turn clock once per second.
async fn run_clock(state: Arc<ServerState>) {
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    loop {
        interval.tick().await;
        for (match_id, events) in tick_matches(&state) {
            state.publish(match_id, events);
        }
    }
}

/// Tick every match, collecting events before anything is broadcast
fn tick_matches(state: &ServerState) -> Vec<(Uuid, Vec<GameEvent>)> {
    let mut ticked = Vec::new();
    for mut session in state.matches.iter_mut() {
        let events = session.tick();
        if !events.is_empty() {
            ticked.push((session.id, events));
        }
    }
    ticked
}

/// Handle a single WebSocket connection.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    state: Arc<ServerState>,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream).await?;
    info!("New WebSocket connection from {}", addr);

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // Assign a client ID
    let client_id = Uuid::new_v4();

    // Create channel for outgoing messages
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    state.client_senders.insert(client_id, tx);

    let welcome = ServerMessage::Welcome { client_id };
    let msg_text = serde_json::to_string(&welcome)?;
    ws_sender.send(Message::Text(msg_text.into())).await?;

    // Spawn task to forward messages from channel to WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Ok(text) = serde_json::to_string(&msg) {
                if ws_sender.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
        }
    });

    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => handle_message(client_id, client_msg, &state),
                Err(e) => {
                    warn!("Invalid message from {}: {}", client_id, e);
                    state.send_to_client(
                        client_id,
                        ServerMessage::Error {
                            message: format!("Invalid message: {}", e),
                        },
                    );
                }
            },
            Ok(Message::Close(_)) => {
                info!("Client {} closing connection", client_id);
                break;
            }
            Err(e) => {
                error!("WebSocket error from {}: {}", client_id, e);
                break;
            }
            _ => {}
        }
    }

    handle_disconnect(client_id, &state);
    state.client_senders.remove(&client_id);
    send_task.abort();

    info!("Connection closed for {}", client_id);
    Ok(())
}

/// Run an operation against the client's match, then report its outcome.
fn with_session<F>(client_id: Uuid, state: &ServerState, op: F)
where
    F: FnOnce(&mut MatchSession, &SharedSaves) -> Result<Vec<GameEvent>, SessionError>,
{
    let Some(match_id) = state.client_matches.get(&client_id).map(|m| *m) else {
        state.send_to_client(
            client_id,
            ServerMessage::Error {
                message: "Not in a match".to_string(),
            },
        );
        return;
    };

    let result = match state.matches.get_mut(&match_id) {
        Some(mut session) => op(&mut session, &state.saves),
        None => Err(SessionError::NotInMatch),
    };

    match result {
        Ok(events) => state.publish(match_id, events),
        Err(e) => {
            debug!(%client_id, %match_id, "operation refused: {}", e);
            state.send_error(client_id, e);
        }
    }
}

/// Handle a client message.
fn handle_message(client_id: Uuid, msg: ClientMessage, state: &Arc<ServerState>) {
    match msg {
        ClientMessage::CreateMatch { map_id, seed } => {
            leave_match(client_id, state);

            let match_id = Uuid::new_v4();
            let session = MatchSession::new(match_id, client_id, map_id, seed, state.rules.as_ref());
            let info = session.to_info();
            let game_state = session.state();

            state.matches.insert(match_id, session);
            state.client_matches.insert(client_id, match_id);
            info!(%match_id, map = ?map_id, "match created");

            state.send_to_client(client_id, ServerMessage::MatchCreated { match_id });
            state.send_to_client(client_id, ServerMessage::Joined { info });
            state.send_to_client(client_id, ServerMessage::State { state: game_state });
        }

        ClientMessage::JoinMatch { match_id } => {
            if state.client_matches.get(&client_id).map(|m| *m) != Some(match_id) {
                leave_match(client_id, state);
            }
            let joined = match state.matches.get_mut(&match_id) {
                Some(mut session) => session
                    .add_client(client_id)
                    .map(|()| (session.to_info(), session.state())),
                None => {
                    state.send_to_client(
                        client_id,
                        ServerMessage::Error {
                            message: "Match not found".to_string(),
                        },
                    );
                    return;
                }
            };

            match joined {
                Ok((info, game_state)) => {
                    state.client_matches.insert(client_id, match_id);
                    state.send_to_client(client_id, ServerMessage::Joined { info });
                    state.send_to_client(client_id, ServerMessage::State { state: game_state });
                }
                Err(e) => state.send_error(client_id, e),
            }
        }

        ClientMessage::LeaveMatch => leave_match(client_id, state),

        ClientMessage::Action { action } => {
            with_session(client_id, state, |session, _| session.apply_action(client_id, action));
        }

        ClientMessage::Undo => {
            with_session(client_id, state, |session, _| session.undo(client_id));
        }

        ClientMessage::AdjustAp { faction, delta } => {
            with_session(client_id, state, |session, _| {
                session.adjust_ap(client_id, faction, delta)
            });
        }

        ClientMessage::GrantSkill { faction, skill } => {
            with_session(client_id, state, |session, _| {
                session.grant_skill(client_id, faction, skill)
            });
        }

        ClientMessage::SetPaused { paused } => {
            with_session(client_id, state, |session, _| session.set_paused(client_id, paused));
        }

        ClientMessage::Save { key } => {
            let mut saved = false;
            with_session(client_id, state, |session, saves| {
                let mut store = saves;
                session.save(client_id, &mut store, &key)?;
                saved = true;
                Ok(Vec::new())
            });
            if saved {
                info!(%key, stored = state.saves.len(), "match saved");
                state.send_to_client(client_id, ServerMessage::Saved { key });
            }
        }

        ClientMessage::Load { key } => {
            let mut loaded = false;
            with_session(client_id, state, |session, saves| {
                let events = session.load(client_id, &saves, &key)?;
                loaded = true;
                Ok(events)
            });
            if loaded {
                state.send_to_client(client_id, ServerMessage::Loaded { key });
            }
        }

        ClientMessage::ListMatches => {
            let matches = state.match_list();
            state.send_to_client(client_id, ServerMessage::MatchList { matches });
        }

        ClientMessage::Ping => {
            state.send_to_client(client_id, ServerMessage::Pong);
        }
    }
}

/// Take a client away from its match, dropping the match once nobody is left.
fn leave_match(client_id: Uuid, state: &ServerState) {
    let Some((_, match_id)) = state.client_matches.remove(&client_id) else {
        return;
    };

    let is_empty = match state.matches.get_mut(&match_id) {
        Some(mut session) => session.remove_client(client_id).unwrap_or(false),
        None => false,
    };
    if is_empty {
        state.matches.remove(&match_id);
        info!(%match_id, "match closed");
    }
}

/// Handle client disconnect.
fn handle_disconnect(client_id: Uuid, state: &Arc<ServerState>) {
    leave_match(client_id, state);
}

#[cfg(test)]
mod tests {
    use super::*;
    use kavatar_core::{MapId, TurnHolder};

    fn connect(state: &ServerState) -> (Uuid, mpsc::UnboundedReceiver<ServerMessage>) {
        let client_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        state.client_senders.insert(client_id, tx);
        (client_id, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            messages.push(msg);
        }
        messages
    }

    fn create_match(state: &Arc<ServerState>, client_id: Uuid) -> Uuid {
        handle_message(
            client_id,
            ClientMessage::CreateMatch {
                map_id: MapId::Campus,
                seed: Some(1),
            },
            state,
        );
        *state.client_matches.get(&client_id).unwrap()
    }

    #[test]
    fn test_state_can_move_into_tasks() {
        fn assert_send_sync<T: Send + Sync + 'static>() {}
        assert_send_sync::<ServerState>();
        assert_send_sync::<Arc<ServerState>>();
    }

    #[test]
    fn test_create_and_join_match() {
        let state = Arc::new(ServerState::default());
        let (host, mut host_rx) = connect(&state);
        let (guest, mut guest_rx) = connect(&state);

        let match_id = create_match(&state, host);
        let sent = drain(&mut host_rx);
        assert!(matches!(sent[0], ServerMessage::MatchCreated { match_id: id } if id == match_id));
        assert!(matches!(sent[1], ServerMessage::Joined { .. }));
        assert!(matches!(sent[2], ServerMessage::State { .. }));

        handle_message(guest, ClientMessage::JoinMatch { match_id }, &state);
        let sent = drain(&mut guest_rx);
        assert!(matches!(&sent[0], ServerMessage::Joined { info } if info.clients == 2));
    }

    #[test]
    fn test_actions_broadcast_to_the_table() {
        let state = Arc::new(ServerState::default());
        let (host, mut host_rx) = connect(&state);
        let (guest, mut guest_rx) = connect(&state);
        let match_id = create_match(&state, host);
        handle_message(guest, ClientMessage::JoinMatch { match_id }, &state);
        drain(&mut host_rx);
        drain(&mut guest_rx);

        handle_message(
            guest,
            ClientMessage::Action {
                action: serde_json::json!("EndTurn"),
            },
            &state,
        );

        for rx in [&mut host_rx, &mut guest_rx] {
            let sent = drain(rx);
            assert!(matches!(&sent[0], ServerMessage::Events { events } if !events.is_empty()));
            assert!(matches!(
                &sent[1],
                ServerMessage::State { state } if state.current_turn == TurnHolder::Faction(2)
            ));
        }
    }

    #[test]
    fn test_rejections_go_to_the_sender_only() {
        let state = Arc::new(ServerState::default());
        let (host, mut host_rx) = connect(&state);
        let (guest, mut guest_rx) = connect(&state);
        let match_id = create_match(&state, host);
        handle_message(guest, ClientMessage::JoinMatch { match_id }, &state);
        drain(&mut host_rx);
        drain(&mut guest_rx);

        handle_message(
            host,
            ClientMessage::Action {
                action: serde_json::json!({"Recruit": {"q": 0, "r": 0}}),
            },
            &state,
        );

        let sent = drain(&mut host_rx);
        assert_eq!(sent.len(), 1);
        assert!(matches!(sent[0], ServerMessage::ActionRejected { .. }));
        assert!(drain(&mut guest_rx).is_empty());
    }

    #[test]
    fn test_clock_ticks_every_match() {
        let state = Arc::new(ServerState::default());
        let (host, mut host_rx) = connect(&state);
        let match_id = create_match(&state, host);
        drain(&mut host_rx);

        let ticked = tick_matches(&state);
        assert_eq!(ticked.len(), 1);
        assert_eq!(ticked[0].0, match_id);
        assert_eq!(ticked[0].1, vec![GameEvent::TimerTick { remaining: 59 }]);
    }

    #[test]
    fn test_save_then_load() {
        let state = Arc::new(ServerState::default());
        let (host, mut host_rx) = connect(&state);
        create_match(&state, host);

        handle_message(host, ClientMessage::Save { key: "campus".to_string() }, &state);
        handle_message(host, ClientMessage::Load { key: "campus".to_string() }, &state);
        let sent = drain(&mut host_rx);
        assert!(sent
            .iter()
            .any(|m| matches!(m, ServerMessage::Saved { key } if key == "campus")));
        assert!(sent
            .iter()
            .any(|m| matches!(m, ServerMessage::Loaded { key } if key == "campus")));
        assert_eq!(state.saves.len(), 1);
    }

    #[test]
    fn test_last_client_leaving_closes_match() {
        let state = Arc::new(ServerState::default());
        let (host, _rx) = connect(&state);
        let match_id = create_match(&state, host);

        handle_message(host, ClientMessage::LeaveMatch, &state);
        assert!(state.matches.get(&match_id).is_none());
        assert!(state.client_matches.get(&host).is_none());
    }
}
