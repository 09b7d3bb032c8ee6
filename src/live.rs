use async_broadcast::Sender;
use rocket::fairing::AdHoc;
use rocket::futures::StreamExt;
use rocket::response::stream::{Event, EventStream};
use rocket::serde::Serialize;
use rocket::tokio;
use rocket::tokio::time::{Duration, sleep};
use rocket::{Build, Rocket, State};
use tokio_tungstenite::connect_async;
use crate::rtdatetime::RtDateTime;
use crate::{AppConfig, SharedRtState};

/// A "something changed" tick from the race API. The WebSocket payload is
/// never examined, only its arrival matters.
#[derive(Serialize, Clone, Debug)]
pub struct ChangeNotice {
    pub received: RtDateTime,
}

async fn watch_remote_changes(ws_url: String, sender: Sender<ChangeNotice>) {
    loop {
        match connect_async(ws_url.as_str()).await {
            Ok((mut socket, _response)) => {
                info!("Connected to race API change feed: {ws_url}");
                while let Some(message) = socket.next().await {
                    match message {
                        Ok(message) if message.is_text() || message.is_binary() => {
                            let notice = ChangeNotice { received: RtDateTime::now() };
                            if let Err(e) = sender.broadcast(notice).await {
                                error!("Failed to broadcast change notice: {e}");
                                return;
                            }
                        }
                        // control frames carry no change information
                        Ok(_) => {}
                        Err(e) => {
                            warn!("Race API change feed read error: {e}");
                            break;
                        }
                    }
                }
                warn!("Race API change feed closed, reconnecting");
            }
            Err(e) => {
                warn!("Cannot connect to race API change feed {ws_url}: {e}");
            }
        }
        sleep(Duration::from_secs(1)).await;
    }
}

pub fn watcher_fairing() -> AdHoc {
    AdHoc::on_liftoff("Race API change watcher", |rocket| Box::pin(async move {
        let Some(cfg) = rocket.state::<AppConfig>() else {
            return;
        };
        let Some(ws_url) = cfg.ws_url.clone() else {
            warn!("rt_ws_url not configured, live updates disabled");
            return;
        };
        let Some(state) = rocket.state::<SharedRtState>() else {
            return;
        };
        let sender = state.read().await.changes_sender.clone();
        tokio::spawn(watch_remote_changes(ws_url, sender));
    }))
}

#[get("/api/changes/sse")]
async fn changes_sse(state: &State<SharedRtState>) -> EventStream![] {
    let mut chng_receiver = state.read().await.changes_receiver.clone();
    EventStream! {
        loop {
            let notice = match chng_receiver.recv().await {
                Ok(notice) => notice,
                // a missed tick is still a tick
                Err(async_broadcast::RecvError::Overflowed(_)) => ChangeNotice { received: RtDateTime::now() },
                Err(e) => {
                    error!("Read change notice error: {e}");
                    break;
                }
            };
            match serde_json::to_string(&notice) {
                Ok(json) => {
                    yield Event::data(json);
                }
                Err(e) => {
                    error!("Serde error: {e}");
                    break;
                }
            }
        }
    }
}

pub fn extend(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket.mount("/", routes![
            changes_sse,
        ])
}
