#[rocket::main]
async fn main() {
    if let Err(e) = wa_gateway::rocket().launch().await {
        eprintln!("server error: {e}");
        std::process::exit(1);
    }
}
