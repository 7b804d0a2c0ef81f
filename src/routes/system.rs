use rocket::serde::json::Json;
use rocket::{catch, get, Request};

#[get("/health")]
pub fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "time": chrono::Utc::now().to_rfc3339(),
    }))
}

#[catch(404)]
pub fn not_found() -> Json<serde_json::Value> {
    Json(serde_json::json!({"error": "not found"}))
}

#[catch(429)]
pub fn too_many_requests(req: &Request) -> Json<serde_json::Value> {
    let _ = req;
    Json(serde_json::json!({"error": "rate limited"}))
}
