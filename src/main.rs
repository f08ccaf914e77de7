use chat_relay::{api, AppState, TokenSigner};

/// Environment variable holding the `keyName:keySecret` signing credential.
const SIGNING_KEY_VAR: &str = "CHAT_SIGNING_KEY";

#[tokio::main]
async fn main() {
    pretty_env_logger::init();

    let signer = TokenSigner::from_env(SIGNING_KEY_VAR);
    if signer.is_none() {
        // /auth will answer 500 until the credential is configured.
        log::warn!("{} not set, token issuance disabled", SIGNING_KEY_VAR);
    }

    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3030u16);

    let state = AppState::new(signer);
    let routes = api::build_filters(state);

    log::info!("listening on 127.0.0.1:{}", port);
    warp::serve(routes).run(([127, 0, 0, 1], port)).await;
}
