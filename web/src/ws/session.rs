use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use futures::{Sink, SinkExt, Stream, StreamExt};
use live::connection::Outbox;
use live::message::ServerFrame;
use live::{Scope, Session};
use log::*;
use serde_json::Value;
use service::AppState;
use std::fmt::Display;
use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior};

/// What one read from the socket produced.
#[derive(Debug)]
pub(crate) enum Inbound {
    Message(Value),
    Malformed(serde_json::Error),
    /// Ping or pong. Answered by the transport, but still counts as activity.
    Control,
    Closed,
    Error(axum::Error),
    Idle,
}

/// Why the read loop stopped.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum SessionEnd {
    Closed,
    Error,
    Idle,
    WriteFailed,
}

/// Drives one accepted WebSocket from registration to cleanup.
pub(crate) async fn run_session(socket: WebSocket, scope: Scope, app_state: AppState) {
    let live_manager = app_state.live_manager.clone();
    let (session, outbox) = live_manager.open_session();
    let (sink, mut stream) = socket.split();

    let keepalive = app_state.config.ws_keepalive_interval();
    let mut writer = tokio::spawn(write_outbox(sink, outbox, keepalive));
    let connection_id = live_manager.register_connection(scope.clone(), session.clone());

    queue_frame(&session, &ServerFrame::connection(greeting(&scope)));

    let idle_timeout = app_state.config.ws_idle_timeout();
    let writer_finished = tokio::select! {
        end = read_loop(&mut stream, &session, &scope, idle_timeout) => {
            debug!("Read loop for {connection_id} ended: {end:?}");
            false
        }
        _ = &mut writer => {
            debug!("Writer for {connection_id} stopped");
            true
        }
    };

    live_manager.unregister_connection(&connection_id);
    session.close();

    if !writer_finished {
        if let Err(e) = writer.await {
            warn!("WebSocket writer for {connection_id} failed: {e}");
        }
    }
}

fn greeting(scope: &Scope) -> String {
    match scope {
        Scope::Task(task_id) => format!("Connected to live updates for task {task_id}"),
        Scope::Unkeyed => "Connected to Forex Companion".to_string(),
    }
}

/// Serialize and enqueue a frame on the session's own queue.
fn queue_frame(session: &Session, frame: &ServerFrame) -> bool {
    let result = serde_json::to_string(frame)
        .map_err(live::error::Error::from)
        .and_then(|json| session.deliver(json));

    match result {
        Ok(()) => true,
        Err(e) => {
            warn!("Failed to queue frame for {}: {e}", session.id());
            false
        }
    }
}

/// Sole writer of the socket. Ends when the session is closed or the
/// socket rejects a write. With a keepalive period it also pings the client,
/// whose pong resets the read side's idle timer.
async fn write_outbox<S>(mut sink: S, mut outbox: Outbox, keepalive: Option<Duration>)
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let mut ticker = keepalive.map(|period| {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });

    loop {
        let message = tokio::select! {
            frame = outbox.next() => match frame {
                Some(frame) => Message::Text(frame.into()),
                None => break,
            },
            _ = next_tick(&mut ticker) => Message::Ping(Bytes::new()),
        };

        if let Err(e) = sink.send(message).await {
            debug!("WebSocket write failed: {e}");
            return;
        }
    }

    if let Err(e) = sink.send(Message::Close(None)).await {
        trace!("Close frame not sent: {e}");
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn read_loop<S>(
    stream: &mut S,
    session: &Session,
    scope: &Scope,
    idle_timeout: Option<Duration>,
) -> SessionEnd
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    loop {
        match next_inbound(stream, idle_timeout).await {
            Inbound::Message(value) => match scope {
                Scope::Unkeyed => {
                    if !queue_frame(session, &ServerFrame::echo(value)) {
                        return SessionEnd::WriteFailed;
                    }
                }
                Scope::Task(task_id) => {
                    debug!("Ignoring inbound frame from task {task_id} subscriber: {value}");
                }
            },
            Inbound::Malformed(e) => warn!("Discarding malformed frame: {e}"),
            Inbound::Control => {}
            Inbound::Closed => {
                info!("Client disconnected normally");
                return SessionEnd::Closed;
            }
            Inbound::Error(e) => {
                error!("WebSocket error: {e}");
                return SessionEnd::Error;
            }
            Inbound::Idle => {
                info!("Closing connection idle for {idle_timeout:?}");
                return SessionEnd::Idle;
            }
        }
    }
}

pub(crate) async fn next_inbound<S>(stream: &mut S, idle_timeout: Option<Duration>) -> Inbound
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let next = match idle_timeout {
        Some(limit) => match tokio::time::timeout(limit, stream.next()).await {
            Ok(next) => next,
            Err(_) => return Inbound::Idle,
        },
        None => stream.next().await,
    };

    classify(next)
}

fn classify(next: Option<Result<Message, axum::Error>>) -> Inbound {
    let parsed = match next {
        None | Some(Ok(Message::Close(_))) => return Inbound::Closed,
        Some(Err(e)) => return Inbound::Error(e),
        Some(Ok(Message::Ping(_) | Message::Pong(_))) => return Inbound::Control,
        Some(Ok(Message::Text(text))) => serde_json::from_str::<Value>(text.as_str()),
        Some(Ok(Message::Binary(bytes))) => serde_json::from_slice::<Value>(&bytes),
    };

    match parsed {
        Ok(value) => Inbound::Message(value),
        Err(e) => Inbound::Malformed(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use serde_json::json;

    fn text(body: &str) -> Result<Message, axum::Error> {
        Ok(Message::Text(body.to_string().into()))
    }

    #[test]
    fn text_json_is_a_message() {
        match classify(Some(text(r#"{"action":"ping"}"#))) {
            Inbound::Message(value) => assert_eq!(value, json!({"action": "ping"})),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn invalid_json_is_malformed_not_fatal() {
        assert!(matches!(
            classify(Some(text("not json"))),
            Inbound::Malformed(_)
        ));
    }

    #[test]
    fn close_and_end_of_stream_are_closed() {
        assert!(matches!(classify(None), Inbound::Closed));
        assert!(matches!(
            classify(Some(Ok(Message::Close(None)))),
            Inbound::Closed
        ));
    }

    #[test]
    fn transport_error_is_an_error() {
        let error = axum::Error::new(std::io::Error::other("connection reset"));
        assert!(matches!(classify(Some(Err(error))), Inbound::Error(_)));
    }

    #[test]
    fn ping_is_control() {
        assert!(matches!(
            classify(Some(Ok(Message::Ping(Default::default())))),
            Inbound::Control
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_stream_times_out_as_idle() {
        let mut silent = stream::pending::<Result<Message, axum::Error>>();
        let inbound = next_inbound(&mut silent, Some(Duration::from_secs(30))).await;
        assert!(matches!(inbound, Inbound::Idle));
    }

    #[tokio::test]
    async fn unkeyed_read_loop_echoes_and_survives_malformed_frames() {
        let (session, mut outbox) = Session::channel(8);
        let mut inbound = stream::iter(vec![
            text("{oops"),
            text(r#"{"pair":"EUR/USD"}"#),
            Ok(Message::Close(None)),
        ]);

        let end = read_loop(&mut inbound, &session, &Scope::Unkeyed, None).await;
        assert_eq!(end, SessionEnd::Closed);

        session.close();
        let echo: Value = serde_json::from_str(&outbox.next().await.unwrap()).unwrap();
        assert_eq!(echo["type"], "echo");
        assert_eq!(echo["received"], json!({"pair": "EUR/USD"}));
        assert_eq!(outbox.next().await, None);
    }

    #[tokio::test]
    async fn task_read_loop_does_not_echo() {
        let (session, mut outbox) = Session::channel(8);
        let mut inbound = stream::iter(vec![text(r#"{"pair":"EUR/USD"}"#)]);

        let end = read_loop(&mut inbound, &session, &Scope::Task("task-1".into()), None).await;
        assert_eq!(end, SessionEnd::Closed);

        session.close();
        assert_eq!(outbox.next().await, None);
    }

    #[tokio::test]
    async fn echo_into_a_dead_session_ends_the_loop() {
        let (session, outbox) = Session::channel(8);
        drop(outbox);
        let mut inbound = stream::iter(vec![text("{}")]);

        let end = read_loop(&mut inbound, &session, &Scope::Unkeyed, None).await;
        assert_eq!(end, SessionEnd::WriteFailed);
    }

    #[tokio::test(start_paused = true)]
    async fn writer_pings_between_frames_when_keepalive_is_set() {
        let (session, outbox) = Session::channel(8);
        let (sink, mut written) = futures::channel::mpsc::unbounded::<Message>();
        let writer = tokio::spawn(write_outbox(sink, outbox, Some(Duration::from_secs(10))));

        session.deliver("{}".to_string()).unwrap();
        assert!(matches!(written.next().await, Some(Message::Text(_))));

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert!(matches!(written.next().await, Some(Message::Ping(_))));
        assert!(matches!(written.next().await, Some(Message::Ping(_))));

        session.close();
        writer.await.unwrap();
        assert!(matches!(written.next().await, Some(Message::Close(None))));
        assert!(written.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn writer_without_keepalive_never_pings() {
        let (session, outbox) = Session::channel(8);
        let (sink, mut written) = futures::channel::mpsc::unbounded::<Message>();
        let writer = tokio::spawn(write_outbox(sink, outbox, None));

        tokio::time::sleep(Duration::from_secs(3600)).await;
        session.deliver("{}".to_string()).unwrap();
        session.close();
        writer.await.unwrap();

        assert!(matches!(written.next().await, Some(Message::Text(_))));
        assert!(matches!(written.next().await, Some(Message::Close(None))));
        assert!(written.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn pongs_keep_a_silent_subscriber_alive() {
        let (session, _outbox) = Session::channel(8);
        let idle = Duration::from_secs(10);
        // A listen-only client only ever answers pings, every half timeout.
        let mut inbound = stream::unfold(0, |sent| async move {
            if sent == 6 {
                return None;
            }
            tokio::time::sleep(Duration::from_secs(5)).await;
            Some((Ok::<_, axum::Error>(Message::Pong(Default::default())), sent + 1))
        })
        .boxed();

        let started = Instant::now();
        let end = read_loop(&mut inbound, &session, &Scope::Task("task-1".into()), Some(idle)).await;

        assert_eq!(end, SessionEnd::Closed);
        assert!(started.elapsed() >= Duration::from_secs(30));
    }

    #[test]
    fn greeting_names_the_task() {
        assert_eq!(
            greeting(&Scope::Task("task-1".into())),
            "Connected to live updates for task task-1"
        );
        assert_eq!(greeting(&Scope::Unkeyed), "Connected to Forex Companion");
    }
}
