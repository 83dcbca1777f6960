//! HTTP client for the meme REST API.
//!
//! Wraps the JSON endpoints with [`reqwest`] and keeps the signed-in
//! [`Session`] in a [`SessionStore`]. The stored session is read once, when
//! the client is built.

use super::{
    composer::{ImageChoice, MemeSubmission},
    session::{Session, SessionStore},
    ClientError,
};
use crate::{
    ledger::VoteType,
    views::{AuthResponse, MemePage, MemeView, MessageResponse},
};
use reqwest::{multipart, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use uuid::Uuid;

/// Shape of every error body the server sends.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

pub struct MemeClient<S: SessionStore> {
    client: reqwest::Client,
    base_url: String,
    store: S,
    session: Option<Session>,
}

impl<S: SessionStore> MemeClient<S> {
    /// Create a client for `base_url` (e.g. `http://localhost:3000`),
    /// restoring any session the store holds.
    pub fn new(base_url: impl Into<String>, store: S) -> Result<Self, ClientError> {
        Self::with_client(reqwest::Client::new(), base_url, store)
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>, store: S) -> Result<Self, ClientError> {
        let session = store.load()?;
        if let Some(session) = &session {
            tracing::debug!(user_id = %session.user.id, "Restored session");
        }
        Ok(MemeClient {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            store,
            session,
        })
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn is_signed_in(&self) -> bool {
        self.session.is_some()
    }

    pub async fn register(&mut self, username: &str, email: &str, password: &str) -> Result<&Session, ClientError> {
        let body = json!({ "username": username, "email": email, "password": password });
        let request = self.client.post(self.url("/users/register")).json(&body);
        let auth: AuthResponse = Self::parse_response(request.send().await?).await?;
        self.start_session(auth)
    }

    pub async fn login(&mut self, email: &str, password: &str) -> Result<&Session, ClientError> {
        let body = json!({ "email": email, "password": password });
        let request = self.client.post(self.url("/users/login")).json(&body);
        let auth: AuthResponse = Self::parse_response(request.send().await?).await?;
        self.start_session(auth)
    }

    /// Forgets the session locally; tokens are stateless on the server.
    pub fn logout(&mut self) -> Result<(), ClientError> {
        self.store.clear()?;
        self.session = None;
        Ok(())
    }

    pub async fn list_memes(&self, page: usize, limit: usize) -> Result<MemePage, ClientError> {
        let request = self.client.get(self.url("/memes")).query(&[("page", page), ("limit", limit)]);
        Self::parse_response(self.authorized(request).send().await?).await
    }

    pub async fn trending(&self, page: usize, limit: usize) -> Result<MemePage, ClientError> {
        let request = self
            .client
            .get(self.url("/memes/trending"))
            .query(&[("page", page), ("limit", limit)]);
        Self::parse_response(self.authorized(request).send().await?).await
    }

    pub async fn get_meme(&self, meme_id: Uuid) -> Result<MemeView, ClientError> {
        let request = self.client.get(self.url(&format!("/memes/{meme_id}")));
        Self::parse_response(self.authorized(request).send().await?).await
    }

    /// Posts a composed meme as a multipart form. Publishing requires a
    /// session; drafts may be posted anonymously.
    pub async fn create_meme(&self, submission: &MemeSubmission) -> Result<MemeView, ClientError> {
        if !submission.is_draft && self.session.is_none() {
            return Err(ClientError::NotSignedIn);
        }
        let mut form = multipart::Form::new();
        for (name, value) in submission.form_fields() {
            form = form.text(name, value);
        }
        if let ImageChoice::Upload { file_name, bytes } = &submission.image {
            let mime = mime_guess::from_path(file_name).first_or_octet_stream();
            let part = multipart::Part::bytes(bytes.clone())
                .file_name(file_name.clone())
                .mime_str(mime.essence_str())?;
            form = form.part("image", part);
        }

        let request = self.client.post(self.url("/memes")).multipart(form);
        let meme: MemeView = Self::parse_response(self.authorized(request).send().await?).await?;
        tracing::info!(meme_id = %meme.id, is_draft = meme.is_draft, "Meme posted");
        Ok(meme)
    }

    pub async fn vote(&self, meme_id: Uuid, vote: VoteType) -> Result<MemeView, ClientError> {
        let request = self
            .client
            .post(self.url(&format!("/memes/{meme_id}/vote")))
            .json(&json!({ "voteType": vote.as_str() }));
        Self::parse_response(self.signed_in(request)?.send().await?).await
    }

    pub async fn comment(&self, meme_id: Uuid, text: &str) -> Result<MemeView, ClientError> {
        let request = self
            .client
            .post(self.url(&format!("/memes/{meme_id}/comments")))
            .json(&json!({ "text": text }));
        Self::parse_response(self.signed_in(request)?.send().await?).await
    }

    pub async fn delete_comment(&self, meme_id: Uuid, comment_id: Uuid) -> Result<(), ClientError> {
        let request = self.client.delete(self.url(&format!("/memes/{meme_id}/comments/{comment_id}")));
        let _: MessageResponse = Self::parse_response(self.signed_in(request)?.send().await?).await?;
        Ok(())
    }

    pub async fn report(&self, meme_id: Uuid, reason: &str) -> Result<(), ClientError> {
        let request = self
            .client
            .post(self.url(&format!("/memes/{meme_id}/report")))
            .json(&json!({ "reason": reason }));
        let _: MessageResponse = Self::parse_response(self.signed_in(request)?.send().await?).await?;
        Ok(())
    }

    /// Downloads an image, e.g. a template, for a local preview.
    pub async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, ClientError> {
        let response = Self::ensure_success(self.client.get(url).send().await?).await?;
        Ok(response.bytes().await?.to_vec())
    }

    // ---- private helpers ----

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn start_session(&mut self, auth: AuthResponse) -> Result<&Session, ClientError> {
        let session = Session { token: auth.token, user: auth.user };
        self.store.save(&session)?;
        tracing::info!(user_id = %session.user.id, "Signed in");
        Ok(self.session.insert(session))
    }

    /// Attaches the bearer token when there is a session.
    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.session {
            Some(session) => request.bearer_auth(&session.token),
            None => request,
        }
    }

    fn signed_in(&self, request: RequestBuilder) -> Result<RequestBuilder, ClientError> {
        let session = self.session.as_ref().ok_or(ClientError::NotSignedIn)?;
        Ok(request.bearer_auth(&session.token))
    }

    /// Returns the response unchanged on success, or the server's
    /// `message` as a [`ClientError::Api`].
    async fn ensure_success(response: Response) -> Result<Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.message)
            .unwrap_or(text);
        Err(ClientError::Api { status: status.as_u16(), message })
    }

    async fn parse_response<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}
