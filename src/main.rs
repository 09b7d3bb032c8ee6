#[macro_use] extern crate rocket;

use std::collections::HashMap;
use rocket::fs::FileServer;
use rocket::http::{CookieJar, Status};
use rocket::request;
use rocket::tokio::sync::RwLock;
use rocket_dyn_templates::handlebars::{Handlebars, Helper};
use rocket_dyn_templates::{Template, context, handlebars};
use crate::api::RaceApiClient;
use crate::auth::{AdminUser, RT_SESSION_ID, generate_random_string};
use crate::live::ChangeNotice;
use crate::rtdatetime::{RtDateTime, dtstr};

#[cfg(test)]
mod tests;
mod api;
mod auth;
mod live;
mod race;
mod registration;
mod rtdatetime;
mod util;

pub struct AppConfig {
    pub api_url: String,
    pub ws_url: Option<String>,
    pub admin_password: String,
}

pub struct RtSession {
    pub created: RtDateTime,
}
impl RtSession {
    pub fn new() -> Self {
        Self { created: RtDateTime::now() }
    }
}

#[derive(Eq, Hash, PartialEq)]
pub struct RtSessionId(pub String);

#[rocket::async_trait]
impl<'r> request::FromRequest<'r> for RtSessionId {
    type Error = ();
    async fn from_request(request: &'r request::Request<'_>) -> request::Outcome<RtSessionId, ()> {
        let cookies = request
            .guard::<&CookieJar<'_>>()
            .await
            .expect("request cookies");
        if let Some(cookie) = cookies.get_private(RT_SESSION_ID) {
            return request::Outcome::Success(RtSessionId(cookie.value().to_string()));
        }
        request::Outcome::Forward(Status::Unauthorized)
    }
}

pub struct RtState {
    sessions: HashMap<RtSessionId, RtSession>,
    changes_sender: async_broadcast::Sender<ChangeNotice>,
    changes_receiver: async_broadcast::Receiver<ChangeNotice>,
}
impl RtState {
    fn new() -> Self {
        let (mut sender, receiver) = async_broadcast::broadcast(16);
        // ticks are redundant, dropping old ones on a slow consumer is fine
        sender.set_overflow(true);
        Self {
            sessions: Default::default(),
            changes_sender: sender,
            changes_receiver: receiver,
        }
    }
}
pub type SharedRtState = RwLock<RtState>;

#[get("/")]
async fn index(user: Option<AdminUser>) -> Template {
    Template::render("index", context! {
        is_admin: user.is_some(),
    })
}

#[launch]
fn rocket() -> _ {
    let rocket = rocket::build()
        .attach(Template::custom(|engines| {
            let handlebars = &mut engines.handlebars;

            handlebars.register_helper("dtstr",
                                       Box::new(|h: &Helper, _r: &Handlebars, _: &handlebars::Context, _rc: &mut handlebars::RenderContext, out: &mut dyn handlebars::Output| -> handlebars::HelperResult {
                                           let val = h.param(0).ok_or(handlebars::RenderErrorReason::ParamNotFoundForIndex("dtstr", 0))?.value();
                                           let s = dtstr(val.as_str());
                                           out.write(&s)?;
                                           Ok(())
                                       }));
        }))
        .mount("/", FileServer::from("./static"))
        .mount("/", routes![
            index,
        ]);
    let rocket = auth::extend(rocket);
    let rocket = race::extend(rocket);
    let rocket = registration::extend(rocket);
    let rocket = live::extend(rocket);

    let figment = rocket.figment();
    let api_url = figment.extract_inner::<String>("rt_api_url")
        .unwrap_or_else(|_| "http://localhost:80".to_string());
    let ws_url = figment.extract_inner::<String>("rt_ws_url").ok();
    let admin_password = figment.extract_inner::<String>("rt_admin_password")
        .unwrap_or_else(|_| {
            let password = generate_random_string(10);
            warn!("rt_admin_password not set, using one-off password: {password}");
            password
        });
    let client = RaceApiClient::new(&api_url).expect("race API client");
    let cfg = AppConfig { api_url, ws_url, admin_password };
    info!("Race API: {}", cfg.api_url);

    rocket
        .manage(cfg)
        .manage(client)
        .manage(SharedRtState::new(RtState::new()))
        .attach(live::watcher_fairing())
}
