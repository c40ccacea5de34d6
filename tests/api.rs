mod common;

use abstract_portal::{configure, models::AbstractStatus, service::auth::AuthMiddleware};
use actix_web::{cookie::Cookie, http::StatusCode, test, App};
use serde_json::{json, Value};

use common::{TestEnv, JWT_SECRET};

macro_rules! app {
    ($env:expr) => {
        test::init_service(
            App::new()
                .app_data($env.state.clone())
                .configure(configure)
                .wrap(AuthMiddleware {
                    store: $env.dyn_store(),
                    secret: JWT_SECRET.to_string(),
                }),
        )
        .await
    };
}

macro_rules! send {
    ($app:expr, $req:expr) => {{
        let resp = test::call_service(&$app, $req.to_request()).await;
        let status = resp.status();
        let body: Value = test::read_body_json(resp).await;
        (status, body)
    }};
}

macro_rules! login {
    ($app:expr, $email:expr, $password:expr) => {{
        let (status, body) = send!(
            $app,
            test::TestRequest::post()
                .uri("/api/login")
                .set_json(json!({ "email": $email, "password": $password }))
        );
        assert_eq!(status, StatusCode::OK, "{}", body);
        body["token"].as_str().unwrap().to_string()
    }};
}

fn bearer(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {}", token))
}

fn registration(email: &str) -> Value {
    json!({
        "fullname": "Ann Phiri",
        "email": email,
        "country": "Malawi",
        "password": "password123",
        "confirm_password": "password123",
    })
}

#[actix_rt::test]
async fn submit_then_approve_scenario() {
    let env = TestEnv::new();
    env.user("admin@portal.test", "adminpass1", abstract_portal::models::Role::Admin)
        .await;
    let app = app!(env);

    let (status, body) = send!(
        app,
        test::TestRequest::post().uri("/api/register").set_json(registration("ann@uni.test"))
    );
    assert_eq!(status, StatusCode::CREATED);
    let author_id = body["user"]["id"].as_i64().unwrap();
    assert_eq!(body["user"]["role"], "student");
    assert!(body["user"].get("password_hash").is_none());

    let token = login!(app, "ann@uni.test", "password123");
    let (status, body) = send!(
        app,
        test::TestRequest::post()
            .uri("/api/submit")
            .insert_header(bearer(&token))
            .set_json(json!({
                "title": "X", "content": "Y", "field": "AI", "institution": "Z",
                "country": "MW", "year": 2024, "author_id": author_id,
            }))
    );
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["abstract"]["status"], AbstractStatus::Pending.as_str());
    let abstract_id = body["abstract"]["id"].as_i64().unwrap();

    let admin_token = login!(app, "admin@portal.test", "adminpass1");
    let (_, me) = send!(
        app,
        test::TestRequest::get().uri("/api/me").insert_header(bearer(&admin_token))
    );
    let admin_id = me["id"].as_i64().unwrap();

    let (status, body) = send!(
        app,
        test::TestRequest::post()
            .uri(&format!("/api/admin/review/{}", abstract_id))
            .insert_header(bearer(&admin_token))
            .set_json(json!({ "action": "approve", "admin_id": admin_id }))
    );
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["abstract"]["status"], "approved");

    // the author reviewing is refused
    let (status, _) = send!(
        app,
        test::TestRequest::post()
            .uri(&format!("/api/admin/review/{}", abstract_id))
            .insert_header(bearer(&token))
            .set_json(json!({ "action": "reject" }))
    );
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[actix_rt::test]
async fn duplicate_registration_is_a_conflict() {
    let env = TestEnv::new();
    let app = app!(env);

    let (status, _) = send!(
        app,
        test::TestRequest::post().uri("/api/register").set_json(registration("ann@uni.test"))
    );
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = send!(
        app,
        test::TestRequest::post().uri("/api/register").set_json(registration("ANN@uni.test"))
    );
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "email is already registered");
}

#[actix_rt::test]
async fn bad_bodies_are_validation_errors() {
    let env = TestEnv::new();
    env.student("ann@uni.test").await;
    let app = app!(env);
    let token = login!(app, "ann@uni.test", "password123");

    let (status, body) = send!(
        app,
        test::TestRequest::post()
            .uri("/api/submit")
            .insert_header(bearer(&token))
            .set_json(json!({
                "title": "X", "content": "Y", "field": "Astrology", "institution": "Z",
                "country": "MW", "year": 2024,
            }))
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("field must be one of"));

    let (status, body) = send!(
        app,
        test::TestRequest::post()
            .uri("/api/payments/initiate")
            .insert_header(bearer(&token))
            .set_json(json!({ "abstract_id": "seven" }))
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[actix_rt::test]
async fn protected_routes_need_a_valid_session() {
    let env = TestEnv::new();
    env.student("ann@uni.test").await;
    let app = app!(env);

    let (status, _) = send!(
        app,
        test::TestRequest::post().uri("/api/submit").set_json(json!({}))
    );
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send!(
        app,
        test::TestRequest::get()
            .uri("/api/user/dashboard")
            .insert_header(bearer("not-a-token"))
    );
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid token");

    let (status, _) = send!(
        app,
        test::TestRequest::post()
            .uri("/api/login")
            .set_json(json!({ "email": "ann@uni.test", "password": "wrong-password" }))
    );
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // public reads ignore a bad token
    let (status, _) = send!(
        app,
        test::TestRequest::get().uri("/api/abstracts").insert_header(bearer("stale"))
    );
    assert_eq!(status, StatusCode::OK);
}

#[actix_rt::test]
async fn session_cookie_works_and_logout_ends_the_session() {
    let env = TestEnv::new();
    env.student("ann@uni.test").await;
    let app = app!(env);
    let token = login!(app, "ann@uni.test", "password123");

    let (status, body) = send!(
        app,
        test::TestRequest::get()
            .uri("/api/me")
            .cookie(Cookie::new("session", token.clone()))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "ann@uni.test");

    let (status, _) = send!(
        app,
        test::TestRequest::post().uri("/api/logout").insert_header(bearer(&token))
    );
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send!(
        app,
        test::TestRequest::get().uri("/api/me").insert_header(bearer(&token))
    );
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "session expired");
}

#[actix_rt::test]
async fn ratings_accept_one_to_five() {
    let env = TestEnv::new();
    let app = app!(env);

    for rating in [0, 6] {
        let (status, _) = send!(
            app,
            test::TestRequest::post()
                .uri("/api/reviews")
                .set_json(json!({ "rating": rating }))
        );
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    let (status, _) = send!(
        app,
        test::TestRequest::post().uri("/api/reviews").set_json(json!({ "rating": 3 }))
    );
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send!(app, test::TestRequest::get().uri("/api/reviews"));
    assert_eq!(status, StatusCode::OK);
    let reviews = body["reviews"].as_array().unwrap();
    assert_eq!(reviews.len(), 1);
    assert_eq!(reviews[0]["rating"], 3);
    assert!(reviews[0]["comment"].is_null());

    let (_, stats) = send!(app, test::TestRequest::get().uri("/api/reviews/stats"));
    assert_eq!(stats["count"], 1);
    assert_eq!(stats["average"], 3.0);
    assert_eq!(stats["distribution"], json!([0, 0, 1, 0, 0]));
}

#[actix_rt::test]
async fn password_reset_token_is_single_use() {
    let mut env = TestEnv::new();
    env.student("ann@uni.test").await;
    let app = app!(env);
    let old_token = login!(app, "ann@uni.test", "password123");

    let (status, unknown) = send!(
        app,
        test::TestRequest::post()
            .uri("/api/forgot-password")
            .set_json(json!({ "email": "nobody@uni.test" }))
    );
    assert_eq!(status, StatusCode::OK);
    let (status, known) = send!(
        app,
        test::TestRequest::post()
            .uri("/api/forgot-password")
            .set_json(json!({ "email": "Ann@uni.test" }))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(unknown, known);

    let mail = env.drain_mail();
    assert_eq!(mail.len(), 1);
    let link_start = mail[0].text.find("token=").unwrap() + "token=".len();
    let reset_token: String = mail[0].text[link_start..]
        .chars()
        .take_while(|c| !c.is_whitespace())
        .collect();

    let reset = json!({ "token": reset_token, "password": "new-password-1" });
    let (status, body) = send!(
        app,
        test::TestRequest::post().uri("/api/reset-password").set_json(reset.clone())
    );
    assert_eq!(status, StatusCode::OK, "{}", body);
    let (status, _) = send!(
        app,
        test::TestRequest::post().uri("/api/reset-password").set_json(reset)
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send!(
        app,
        test::TestRequest::get().uri("/api/me").insert_header(bearer(&old_token))
    );
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    login!(app, "ann@uni.test", "new-password-1");
}

#[actix_rt::test]
async fn admin_dashboard_counts_and_guards() {
    let env = TestEnv::new();
    env.user("admin@portal.test", "adminpass1", abstract_portal::models::Role::Admin)
        .await;
    let author = env.student("ann@uni.test").await;
    env.abstract_for(&author, "Soil").await;
    env.abstract_for(&author, "Water").await;
    let app = app!(env);

    let student_token = login!(app, "ann@uni.test", "password123");
    let (status, _) = send!(
        app,
        test::TestRequest::get().uri("/api/admin").insert_header(bearer(&student_token))
    );
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin_token = login!(app, "admin@portal.test", "adminpass1");
    let (status, body) = send!(
        app,
        test::TestRequest::get().uri("/api/admin").insert_header(bearer(&admin_token))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["abstracts"]["pending"], 2);
    assert_eq!(body["abstracts"]["total"], 2);
    assert_eq!(body["users"], 2);
    assert_eq!(body["recent_pending"].as_array().unwrap().len(), 2);
}

#[actix_rt::test]
async fn dashboard_lists_own_work_and_marks_notifications() {
    let env = TestEnv::new();
    let admin = env.admin().await;
    let author = env.student("ann@uni.test").await;
    let target = env.abstract_for(&author, "Soil").await;
    abstract_portal::service::abstracts::review(
        env.app_state(),
        &admin,
        target.id,
        abstract_portal::dto::ReviewAbstractDto {
            action: "reject".into(),
            feedback: Some("add methods".into()),
            admin_id: None,
        },
    )
    .await
    .unwrap();
    let app = app!(env);
    let token = login!(app, "ann@uni.test", "password123");

    let (status, body) = send!(
        app,
        test::TestRequest::get().uri("/api/user/dashboard").insert_header(bearer(&token))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["abstracts"][0]["status"], "rejected");
    assert_eq!(body["abstracts"][0]["feedback"][0]["comment"], "add methods");
    assert_eq!(body["unread_notifications"], 1);
    let notification_id = body["notifications"][0]["id"].as_i64().unwrap();

    let (status, _) = send!(
        app,
        test::TestRequest::post()
            .uri(&format!("/api/notifications/{}/read", notification_id))
            .insert_header(bearer(&token))
    );
    assert_eq!(status, StatusCode::OK);
    let (_, body) = send!(
        app,
        test::TestRequest::get().uri("/api/user/dashboard").insert_header(bearer(&token))
    );
    assert_eq!(body["unread_notifications"], 0);

    let missing = send!(
        app,
        test::TestRequest::post()
            .uri(&format!("/api/notifications/{}/read", notification_id + 50))
            .insert_header(bearer(&token))
    );
    assert_eq!(missing.0, StatusCode::NOT_FOUND);
}

#[actix_rt::test]
async fn search_route_is_not_taken_for_an_id() {
    let env = TestEnv::new();
    let app = app!(env);

    let (status, body) = send!(app, test::TestRequest::get().uri("/api/abstracts/search?q=maize"));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 0);

    let (status, _) = send!(app, test::TestRequest::get().uri("/api/abstracts/12345"));
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_rt::test]
async fn contact_form_is_stored_and_acknowledged() {
    let mut env = TestEnv::new();
    let app = app!(env);

    let (status, body) = send!(
        app,
        test::TestRequest::post().uri("/api/contact").set_json(json!({
            "name": "Chikondi", "email": "chikondi@mail.test", "message": "When is the deadline?",
        }))
    );
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["id"].as_i64().is_some());
    let recipients: Vec<String> = env.drain_mail().into_iter().map(|m| m.to).collect();
    assert_eq!(recipients.len(), 2);
    assert!(recipients.contains(&"chikondi@mail.test".to_string()));
    assert!(recipients.contains(&common::ADMIN_INBOX.to_string()));

    let (status, _) = send!(
        app,
        test::TestRequest::post()
            .uri("/api/contact")
            .set_json(json!({ "name": "", "email": "x@y.test", "message": "hi" }))
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_rt::test]
async fn registration_rejects_malformed_addresses_and_blank_names() {
    let env = TestEnv::new();
    let app = app!(env);

    for email in ["a@@b.c", "ann at uni.test", "ann@uni test"] {
        let (status, body) = send!(
            app,
            test::TestRequest::post().uri("/api/register").set_json(registration(email))
        );
        assert_eq!(status, StatusCode::BAD_REQUEST, "{email}");
        assert!(body["error"].as_str().unwrap().contains("valid email"));
    }

    let mut blank = registration("ann@uni.test");
    blank["fullname"] = json!("   ");
    let (status, body) = send!(
        app,
        test::TestRequest::post().uri("/api/register").set_json(blank)
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("fullname must be 1 to 128"));
}

#[actix_rt::test]
async fn confirm_route_settles_without_a_session_but_callback_verifies() {
    let env = TestEnv::new();
    let author = env.student("ann@uni.test").await;
    let target = env.abstract_for(&author, "Soil").await;
    let opened = abstract_portal::service::payment::initiate(
        env.app_state(),
        &author,
        abstract_portal::dto::InitiatePaymentDto { abstract_id: target.id },
    )
    .await
    .unwrap();
    let app = app!(env);

    let (status, body) = send!(
        app,
        test::TestRequest::get().uri(&format!(
            "/api/payments/callback?tx_ref={}&status=success",
            opened.tx_ref
        ))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["confirmed"], false);

    let (status, body) = send!(
        app,
        test::TestRequest::post()
            .uri("/api/payments/confirm")
            .set_json(json!({ "payment_id": opened.payment_id }))
    );
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["already_confirmed"], false);
    assert_eq!(body["abstract"]["status"], "published");
}
