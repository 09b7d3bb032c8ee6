use rand::Rng;
use rocket::form::Form;
use rocket::http::{Cookie, CookieJar, SameSite, Status};
use rocket::outcome::Outcome;
use rocket::request::{self, FromRequest};
use rocket::response::Redirect;
use rocket::response::status::Custom;
use rocket::{Build, Request, Rocket, State};
use rocket_dyn_templates::{Template, context};
use crate::{AppConfig, RtSession, RtSessionId, SharedRtState};

pub const RT_SESSION_ID: &str = "rt_session_id";

pub fn generate_random_string(len: usize) -> String {
    const WOWELS: &str = "aeiouy";
    const CONSONANTS: &str = "bcdfghjklmnopqrstvwxz";
    let mut rng = rand::rng();
    (0..len)
        .map(|n| {
            let charset = if n % 2 == 0 { CONSONANTS } else { WOWELS };
            let idx = rng.random_range(0..charset.len());
            charset.chars().nth(idx).unwrap()
        })
        .collect()
}

/// Request guard for the admin surface. Forwards when there is no live
/// session so a rank-2 route can redirect to the login page.
pub struct AdminUser;

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminUser {
    type Error = ();
    async fn from_request(request: &'r Request<'_>) -> request::Outcome<AdminUser, ()> {
        let Outcome::Success(session_id) = request.guard::<RtSessionId>().await else {
            return Outcome::Forward(Status::Unauthorized);
        };
        let Outcome::Success(state) = request.guard::<&State<SharedRtState>>().await else {
            return Outcome::Error((Status::InternalServerError, ()));
        };
        if state.read().await.sessions.contains_key(&session_id) {
            Outcome::Success(AdminUser)
        } else {
            Outcome::Forward(Status::Unauthorized)
        }
    }
}

#[get("/login")]
fn get_login() -> Template {
    Template::render("login", context! {})
}

#[derive(Debug, FromForm)]
struct LoginFormValues<'v> {
    password: &'v str,
}

#[post("/login", data = "<form>")]
async fn post_login(form: Form<LoginFormValues<'_>>, cfg: &State<AppConfig>, cookies: &CookieJar<'_>, state: &State<SharedRtState>) -> Result<Redirect, Custom<String>> {
    if form.password != cfg.admin_password {
        return Err(Custom(Status::Unauthorized, "Wrong password".to_string()));
    }
    let session_id = generate_random_string(32);
    let session = RtSession::new();
    info!("Admin logged in at {}", session.created.to_display_string());
    state.write().await.sessions.insert(RtSessionId(session_id.clone()), session);
    cookies.add_private(
        Cookie::build((RT_SESSION_ID, session_id))
            .same_site(SameSite::Lax)
            .build()
    );
    Ok(Redirect::to("/"))
}

#[get("/logout")]
async fn get_logout(session_id: Option<RtSessionId>, cookies: &CookieJar<'_>, state: &State<SharedRtState>) -> Redirect {
    if let Some(session_id) = session_id {
        state.write().await.sessions.remove(&session_id);
    }
    cookies.remove_private(RT_SESSION_ID);
    Redirect::to("/")
}

pub fn extend(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket.mount("/", routes![
            get_login,
            post_login,
            get_logout,
        ])
}
