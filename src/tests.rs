use rocket::http::{ContentType, Status};
use rocket::local::blocking::Client;

// must match rt_admin_password in Rocket.toml
const ADMIN_PASSWORD: &str = "rukasolety";

fn create_test_server() -> Client {
    Client::tracked(super::rocket()).unwrap()
}

fn login(client: &Client) {
    let resp = client.post("/login")
        .header(ContentType::Form)
        .body(format!("password={ADMIN_PASSWORD}"))
        .dispatch();
    assert_eq!(resp.status(), Status::SeeOther);
    assert_eq!(resp.headers().get_one("Location"), Some("/"));
}

#[test]
fn home_page_renders() {
    let client = create_test_server();
    let resp = client.get("/").dispatch();
    assert_eq!(resp.status(), Status::Ok);
}

#[test]
fn login_page_renders() {
    let client = create_test_server();
    let resp = client.get("/login").dispatch();
    assert_eq!(resp.status(), Status::Ok);
}

#[test]
fn wrong_password_is_rejected() {
    let client = create_test_server();
    let resp = client.post("/login")
        .header(ContentType::Form)
        .body("password=letmein")
        .dispatch();
    assert_eq!(resp.status(), Status::Unauthorized);
}

#[test]
fn admin_page_redirects_anonymous_to_login() {
    let client = create_test_server();
    for path in ["/admin", "/race/create", "/checkpoint/create"] {
        let resp = client.get(path).dispatch();
        assert_eq!(resp.status(), Status::SeeOther);
        assert_eq!(resp.headers().get_one("Location"), Some("/login"));
    }
}

#[test]
fn admin_posts_require_session() {
    let client = create_test_server();
    let resp = client.post("/race")
        .header(ContentType::Form)
        .body("name=Krukes+Challenge&start_time=2024-06-01T12:00")
        .dispatch();
    assert_eq!(resp.status(), Status::Unauthorized);
}

#[test]
fn session_unlocks_admin_forms() {
    let client = create_test_server();
    login(&client);

    let resp = client.get("/race/create").dispatch();
    assert_eq!(resp.status(), Status::Ok);
    let resp = client.get("/checkpoint/create").dispatch();
    assert_eq!(resp.status(), Status::Ok);

    // logout drops the session again
    let resp = client.get("/logout").dispatch();
    assert_eq!(resp.status(), Status::SeeOther);
    let resp = client.get("/race/create").dispatch();
    assert_eq!(resp.status(), Status::SeeOther);
    assert_eq!(resp.headers().get_one("Location"), Some("/login"));
}

#[test]
fn invalid_race_form_is_rejected_before_any_api_call() {
    let client = create_test_server();
    login(&client);

    // empty name fails the form validation
    let resp = client.post("/race")
        .header(ContentType::Form)
        .body("name=&start_time=2024-06-01T12:00")
        .dispatch();
    assert_eq!(resp.status(), Status::BadRequest);

    // start time must be a date-time, not a bare time of day
    let resp = client.post("/race")
        .header(ContentType::Form)
        .body("name=Krukes+Challenge&start_time=12:00")
        .dispatch();
    assert_eq!(resp.status(), Status::BadRequest);
    assert!(resp.into_string().unwrap().contains("Unrecognized date-time string"));
}

#[test]
fn invalid_time_limit_is_rejected_before_any_api_call() {
    let client = create_test_server();
    login(&client);

    let resp = client.post("/admin/route")
        .header(ContentType::Form)
        .body("race_id=1&checkpoint_ids=4&time_limits=25:99")
        .dispatch();
    assert_eq!(resp.status(), Status::BadRequest);
    assert!(resp.into_string().unwrap().contains("Time limit must be HH:MM"));

    // rows must stay aligned
    let resp = client.post("/admin/route")
        .header(ContentType::Form)
        .body("race_id=1&checkpoint_ids=4&checkpoint_ids=5&time_limits=13:00")
        .dispatch();
    assert_eq!(resp.status(), Status::BadRequest);
}
