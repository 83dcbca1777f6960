mod common;

use assert_matches::assert_matches;
use common::*;
use meme_studio::{
    client::{ClientError, Composer, FileSessionStore, MemeClient, SessionStore, TEMPLATES, TEXT_STYLES},
    editor::{EditPatch, Layer},
    ledger::VoteType,
    routes, startup,
};
use std::sync::Arc;

/// Serves a fresh in-memory instance on an ephemeral port.
async fn serve() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let base_url = format!("http://{addr}");
    let config = test_config(&[("PUBLIC_BASE_URL", base_url.as_str())]);
    let app = routes::create_router(Arc::new(startup::memory_state(config).unwrap()));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    base_url
}

#[tokio::test]
async fn compose_post_vote_and_comment() {
    let base_url = serve().await;
    let dir = tempfile::tempdir().unwrap();
    let session_path = dir.path().join("session.json");

    let mut client = MemeClient::new(&base_url, FileSessionStore::new(&session_path)).unwrap();
    assert!(!client.is_signed_in());

    let mut composer = Composer::new();
    composer.apply(&EditPatch { title: Some("Client made".into()), ..EditPatch::default() });
    composer.set_text(Layer::Top, "when the tests");
    composer.set_text(Layer::Bottom, "actually pass");
    composer.apply_style(&TEXT_STYLES[2]);
    composer.choose_upload("base.png", png_bytes(50, 40));
    let submission = composer.submission().unwrap();

    // Publishing needs a session, checked before any request goes out.
    assert_matches!(client.create_meme(&submission).await, Err(ClientError::NotSignedIn));

    client.register("clientuser", "client@example.com", "hunter22").await.unwrap();
    assert!(FileSessionStore::new(&session_path).load().unwrap().is_some());

    let meme = client.create_meme(&submission).await.unwrap();
    assert_eq!(meme.design.title, "Client made");
    assert_eq!(meme.design.top_text_color.to_string(), "#00ff00");
    let image_url = meme.image_url.clone().unwrap();
    assert!(image_url.starts_with(&base_url));
    assert_eq!(client.fetch_image(&image_url).await.unwrap(), png_bytes(50, 40));

    let voted = client.vote(meme.id, VoteType::Up).await.unwrap();
    assert_eq!(voted.upvotes, 1);
    assert_eq!(voted.user_vote, Some(VoteType::Up));

    let commented = client.comment(meme.id, "nice one").await.unwrap();
    let comment_id = commented.comments[0].id;
    client.delete_comment(meme.id, comment_id).await.unwrap();
    assert!(client.get_meme(meme.id).await.unwrap().comments.is_empty());

    client.report(meme.id, "testing reports").await.unwrap();
    let page = client.list_memes(1, 10).await.unwrap();
    assert_eq!(page.total_memes, 1);
    assert!(page.memes[0].is_reported);
    assert!(client.trending(1, 10).await.unwrap().memes.is_empty());
}

#[tokio::test]
async fn session_survives_restart_and_logout_clears_it() {
    let base_url = serve().await;
    let dir = tempfile::tempdir().unwrap();
    let session_path = dir.path().join("session.json");

    {
        let mut client = MemeClient::new(&base_url, FileSessionStore::new(&session_path)).unwrap();
        client.register("persisted", "persisted@example.com", "hunter22").await.unwrap();
    }

    let mut client = MemeClient::new(&base_url, FileSessionStore::new(&session_path)).unwrap();
    assert_eq!(client.session().map(|s| s.user.username.as_str()), Some("persisted"));

    let mut composer = Composer::new();
    composer.apply(&EditPatch { title: Some("Template".into()), ..EditPatch::default() });
    composer.choose_template(&TEMPLATES[3]);
    let meme = client.create_meme(&composer.submission().unwrap()).await.unwrap();
    assert_eq!(meme.image_url.as_deref(), Some(TEMPLATES[3].url));

    client.logout().unwrap();
    assert!(!client.is_signed_in());
    assert!(!session_path.exists());
    assert_matches!(client.vote(meme.id, VoteType::Down).await, Err(ClientError::NotSignedIn));
}

#[tokio::test]
async fn server_errors_carry_status_and_message() {
    let base_url = serve().await;
    let dir = tempfile::tempdir().unwrap();
    let mut client = MemeClient::new(&base_url, FileSessionStore::new(dir.path().join("s.json"))).unwrap();

    let err = client.login("nobody@example.com", "hunter22").await.unwrap_err();
    assert_eq!(err.status(), Some(401));
    assert_matches!(err, ClientError::Api { message, .. } if message == "Invalid credentials");

    let err = client.register("ab", "ab@example.com", "hunter22").await.unwrap_err();
    assert_eq!(err.status(), Some(400));
    assert!(!client.is_signed_in());
}
