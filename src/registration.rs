use rocket::form::{Contextual, Form};
use rocket::futures::future::try_join_all;
use rocket::http::Status;
use rocket::response::Redirect;
use rocket::response::status::Custom;
use rocket::{Build, Rocket, State, tokio};
use rocket_dyn_templates::{Template, context};
use crate::api::{PostedCheckpoint, PostedRace, PostedRunner, PostedTag, RaceApiClient};
use crate::auth::AdminUser;
use crate::rtdatetime::RtDateTime;
use crate::util::anyhow_to_custom_error;

fn is_hhmm(s: &str) -> bool {
    chrono::NaiveTime::parse_from_str(s, "%H:%M").is_ok()
}

fn invalid_form() -> Custom<String> {
    Custom(Status::BadRequest, "Form data invalid".to_string())
}

// remote rejections come back to the submitter with the API's detail text
fn api_error(err: anyhow::Error) -> Custom<String> {
    Custom(Status::BadRequest, err.to_string())
}

#[get("/register-user")]
fn get_register_user() -> Template {
    Template::render("runner-edit", context! {})
}

#[derive(Debug, FromForm)]
struct RunnerFormValues<'v> {
    #[field(validate = len(1..))]
    name: &'v str,
}

#[post("/register-user", data = "<form>")]
async fn post_register_user(form: Form<Contextual<'_, RunnerFormValues<'_>>>, client: &State<RaceApiClient>) -> Result<Redirect, Custom<String>> {
    let vals = form.value.as_ref().ok_or_else(invalid_form)?;
    let runner = PostedRunner { name: vals.name.to_string() };
    client.create_runner(&runner).await.map_err(api_error)?;
    Ok(Redirect::to("/"))
}

#[get("/register-tag")]
async fn get_register_tag(client: &State<RaceApiClient>) -> Result<Template, Custom<String>> {
    let (races, runners) = tokio::try_join!(client.races(), client.runners())
        .map_err(anyhow_to_custom_error)?;
    Ok(Template::render("tag-edit", context! {
        races,
        runners,
    }))
}

#[derive(Debug, FromForm)]
struct TagFormValues<'v> {
    runner_id: i64,
    race_id: i64,
    #[field(validate = len(1..))]
    tag_id: &'v str,
}

#[post("/register-tag", data = "<form>")]
async fn post_register_tag(form: Form<Contextual<'_, TagFormValues<'_>>>, client: &State<RaceApiClient>) -> Result<Redirect, Custom<String>> {
    let vals = form.value.as_ref().ok_or_else(invalid_form)?;
    let tag = PostedTag {
        runner_id: vals.runner_id,
        race_id: vals.race_id,
        tag_id: vals.tag_id.to_string(),
    };
    client.register_tag(&tag).await.map_err(api_error)?;
    Ok(Redirect::to(format!("/race/{}", vals.race_id)))
}

#[get("/race/create")]
fn get_race_create(_admin: AdminUser) -> Template {
    Template::render("race-edit", context! {
        now: RtDateTime::now().to_iso_string(),
    })
}
#[get("/race/create", rank = 2)]
fn get_race_create_anonymous() -> Redirect {
    Redirect::to("/login")
}

#[derive(Debug, FromForm)]
struct RaceFormValues<'v> {
    #[field(validate = len(1..))]
    name: &'v str,
    start_time: &'v str,
}

#[post("/race", data = "<form>")]
async fn post_race(form: Form<Contextual<'_, RaceFormValues<'_>>>, _admin: AdminUser, client: &State<RaceApiClient>) -> Result<Redirect, Custom<String>> {
    let vals = form.value.as_ref().ok_or_else(invalid_form)?;
    let start_time = RtDateTime::parse_from_string(vals.start_time)
        .map_err(|e| Custom(Status::BadRequest, format!("Unrecognized date-time string: {}, error: {e}", vals.start_time)))?;
    let race = PostedRace {
        name: vals.name.to_string(),
        start_time,
    };
    client.create_race(&race).await.map_err(api_error)?;
    Ok(Redirect::to("/races"))
}
#[post("/race", rank = 2, data = "<_form>")]
fn post_race_anonymous(_form: Form<Contextual<'_, RaceFormValues<'_>>>) -> Custom<String> {
    Custom(Status::Unauthorized, "Login required".to_string())
}

#[get("/checkpoint/create")]
fn get_checkpoint_create(_admin: AdminUser) -> Template {
    Template::render("checkpoint-edit", context! {})
}
#[get("/checkpoint/create", rank = 2)]
fn get_checkpoint_create_anonymous() -> Redirect {
    Redirect::to("/login")
}

#[derive(Debug, FromForm)]
struct CheckpointFormValues<'v> {
    device_id: i64,
    #[field(validate = len(1..))]
    location: &'v str,
}

#[post("/checkpoint", data = "<form>")]
async fn post_checkpoint(form: Form<Contextual<'_, CheckpointFormValues<'_>>>, _admin: AdminUser, client: &State<RaceApiClient>) -> Result<Redirect, Custom<String>> {
    let vals = form.value.as_ref().ok_or_else(invalid_form)?;
    let checkpoint = PostedCheckpoint {
        device_id: vals.device_id,
        location: vals.location.to_string(),
    };
    client.create_checkpoint(&checkpoint).await.map_err(api_error)?;
    Ok(Redirect::to("/admin"))
}
#[post("/checkpoint", rank = 2, data = "<_form>")]
fn post_checkpoint_anonymous(_form: Form<Contextual<'_, CheckpointFormValues<'_>>>) -> Custom<String> {
    Custom(Status::Unauthorized, "Login required".to_string())
}

#[get("/admin")]
async fn get_admin(_admin: AdminUser, client: &State<RaceApiClient>) -> Result<Template, Custom<String>> {
    let (races, checkpoints) = tokio::try_join!(client.races(), client.checkpoints())
        .map_err(anyhow_to_custom_error)?;
    Ok(Template::render("route-edit", context! {
        races,
        checkpoints,
    }))
}
#[get("/admin", rank = 2)]
fn get_admin_anonymous() -> Redirect {
    Redirect::to("/login")
}

#[derive(Debug, FromForm)]
struct RouteFormValues<'v> {
    race_id: i64,
    checkpoint_ids: Vec<i64>,
    time_limits: Vec<&'v str>,
}

/// Attaches the submitted checkpoints to a race as its course. Positions are
/// assigned 1..n in row order; an empty time limit means no cutoff.
#[post("/admin/route", data = "<form>")]
async fn post_admin_route(form: Form<Contextual<'_, RouteFormValues<'_>>>, _admin: AdminUser, client: &State<RaceApiClient>) -> Result<Redirect, Custom<String>> {
    let vals = form.value.as_ref().ok_or_else(invalid_form)?;
    if vals.checkpoint_ids.is_empty() || vals.checkpoint_ids.len() != vals.time_limits.len() {
        return Err(invalid_form());
    }
    for time_limit in &vals.time_limits {
        if !time_limit.is_empty() && !is_hhmm(time_limit) {
            return Err(Custom(Status::BadRequest, format!("Time limit must be HH:MM, got: {time_limit}")));
        }
    }
    try_join_all(vals.checkpoint_ids.iter().zip(&vals.time_limits).enumerate()
        .map(|(n, (checkpoint_id, time_limit))| {
            let position = n as i64 + 1;
            let time_limit = (!time_limit.is_empty()).then_some(*time_limit);
            client.add_checkpoint_to_race(vals.race_id, *checkpoint_id, position, time_limit)
        }))
        .await.map_err(api_error)?;
    Ok(Redirect::to(format!("/race/{}", vals.race_id)))
}
#[post("/admin/route", rank = 2, data = "<_form>")]
fn post_admin_route_anonymous(_form: Form<Contextual<'_, RouteFormValues<'_>>>) -> Custom<String> {
    Custom(Status::Unauthorized, "Login required".to_string())
}

pub fn extend(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket.mount("/", routes![
            get_register_user,
            post_register_user,
            get_register_tag,
            post_register_tag,
            get_race_create,
            get_race_create_anonymous,
            post_race,
            post_race_anonymous,
            get_checkpoint_create,
            get_checkpoint_create_anonymous,
            post_checkpoint,
            post_checkpoint_anonymous,
            get_admin,
            get_admin_anonymous,
            post_admin_route,
            post_admin_route_anonymous,
        ])
}

#[cfg(test)]
mod tests {
    use super::is_hhmm;

    #[test]
    fn test_is_hhmm() {
        assert!(is_hhmm("13:00"));
        assert!(is_hhmm("00:00"));
        assert!(is_hhmm("23:59"));
        assert!(!is_hhmm(""));
        assert!(!is_hhmm("24:00"));
        assert!(!is_hhmm("13:60"));
        assert!(!is_hhmm("13:00:00"));
        assert!(!is_hhmm("soon"));
    }
}
