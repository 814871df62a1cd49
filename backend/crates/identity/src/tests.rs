//! Scenario tests for the identity crate
//!
//! Component tests live beside their modules; these drive several
//! components together through the same seams production uses.

#[cfg(test)]
mod support {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use kernel::id::UserId;
    use platform::rate_limit::{AttemptPolicy, MemoryAttemptLimiter};
    use tokio::sync::mpsc;

    use crate::application::oauth::{OAuthProvider, ProviderToken};
    use crate::application::{BackgroundDispatcher, BackgroundJob, IdentityConfig};
    use crate::domain::entity::user::{ProviderProfile, User};
    use crate::domain::repository::CredentialStore;
    use crate::domain::value_object::{
        auth_provider::AuthProvider, email::Email, lookup_id::LookupId, totp_secret::TotpSecret,
    };
    use crate::error::{AuthError, AuthResult};
    use crate::infra::{MemoryCredentialStore, MemoryStateStore};
    use crate::presentation::state::{Backend, IdentityState};

    /// Memory store that counts lookups by id
    #[derive(Default)]
    pub struct CountingStore {
        pub inner: MemoryCredentialStore,
        lookups: AtomicUsize,
        /// Yield to the scheduler inside every lookup by id
        yield_on_lookup: bool,
    }

    impl CountingStore {
        pub fn yielding() -> Self {
            Self {
                yield_on_lookup: true,
                ..Self::default()
            }
        }

        pub fn lookups(&self) -> usize {
            self.lookups.load(Ordering::SeqCst)
        }
    }

    impl CredentialStore for CountingStore {
        async fn get_by_email(&self, email: &Email) -> AuthResult<Option<User>> {
            self.inner.get_by_email(email).await
        }

        async fn get_by_lookup_id(&self, lookup_id: &LookupId) -> AuthResult<Option<User>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if self.yield_on_lookup {
                tokio::task::yield_now().await;
            }
            self.inner.get_by_lookup_id(lookup_id).await
        }

        async fn create(&self, user: &User) -> AuthResult<User> {
            self.inner.create(user).await
        }

        async fn update_totp_secret(&self, id: &UserId, secret: &TotpSecret) -> AuthResult<bool> {
            self.inner.update_totp_secret(id, secret).await
        }
    }

    /// Provider returning a fixed profile
    pub struct ScriptedProvider {
        pub kind: AuthProvider,
        pub profile: ProviderProfile,
        pub fail_exchange: bool,
        pub fail_profile: bool,
        /// Delay before the profile is returned
        pub profile_delay: Duration,
    }

    impl ScriptedProvider {
        pub fn google(email: &str, verified: bool) -> Self {
            Self {
                profile: ProviderProfile {
                    provider: AuthProvider::Google,
                    provider_id: format!("google-{email}"),
                    email: email.to_string(),
                    email_verified: verified,
                    display_name: Some("Test User".to_string()),
                    avatar_url: None,
                },
                kind: AuthProvider::Google,
                fail_exchange: false,
                fail_profile: false,
                profile_delay: Duration::ZERO,
            }
        }
    }

    impl OAuthProvider for ScriptedProvider {
        fn kind(&self) -> AuthProvider {
            self.kind
        }

        fn authorize_url(&self, state: &str) -> String {
            format!("https://provider.test/auth?state={state}")
        }

        async fn exchange_code(&self, code: &str) -> AuthResult<ProviderToken> {
            if self.fail_exchange {
                return Err(AuthError::ExchangeFailed("scripted failure".to_string()));
            }
            Ok(ProviderToken {
                access_token: format!("token-for-{code}"),
            })
        }

        async fn fetch_profile(&self, _token: &ProviderToken) -> AuthResult<ProviderProfile> {
            if !self.profile_delay.is_zero() {
                tokio::time::sleep(self.profile_delay).await;
            }
            if self.fail_profile {
                return Err(AuthError::ProfileFetchFailed("scripted failure".to_string()));
            }
            Ok(self.profile.clone())
        }
    }

    pub struct TestBackend;

    impl Backend for TestBackend {
        type Store = CountingStore;
        type Provider = ScriptedProvider;
        type States = MemoryStateStore;
        type Limiter = MemoryAttemptLimiter;
    }

    pub struct Harness {
        pub state: IdentityState<TestBackend>,
        pub inbox: mpsc::Receiver<BackgroundJob>,
    }

    pub fn harness_with(config: IdentityConfig, provider: ScriptedProvider) -> Harness {
        let (dispatcher, inbox) = BackgroundDispatcher::channel(16);
        let state = IdentityState::new(
            config,
            Arc::new(CountingStore::default()),
            Arc::new(provider),
            Arc::new(MemoryStateStore::new()),
            Arc::new(MemoryAttemptLimiter::new(AttemptPolicy::default())),
            dispatcher,
        );
        Harness { state, inbox }
    }

    pub fn harness() -> Harness {
        harness_with(
            IdentityConfig::for_tests(),
            ScriptedProvider::google("g@b.com", true),
        )
    }
}

#[cfg(test)]
mod scenario_tests {
    use super::support::*;
    use crate::application::{SignInInput, SignUpInput};
    use crate::error::AuthError;

    #[tokio::test]
    async fn test_register_login_resolve() {
        let h = harness();

        let signed_up = h
            .state
            .sign_up()
            .execute(SignUpInput {
                email: "a@b.com".to_string(),
                password: "longenough1".to_string(),
            })
            .await
            .unwrap();

        let signed_in = h
            .state
            .sign_in()
            .execute(SignInInput {
                email: "a@b.com".to_string(),
                password: "longenough1".to_string(),
            })
            .await
            .unwrap();

        let resolved = h.state.resolver().resolve(&signed_in.token).await.unwrap();
        assert_eq!(resolved.claims.lookup_id, signed_up.lookup_id);
        assert_eq!(resolved.user.lookup_id, signed_up.lookup_id);
        assert_eq!(resolved.user.email.as_str(), "a@b.com");
    }

    #[tokio::test]
    async fn test_wrong_password_hides_account_existence() {
        let h = harness();
        h.state
            .sign_up()
            .execute(SignUpInput {
                email: "a@b.com".to_string(),
                password: "longenough1".to_string(),
            })
            .await
            .unwrap();

        let err = h
            .state
            .sign_in()
            .execute(SignInInput {
                email: "a@b.com".to_string(),
                password: "not-the-password".to_string(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::WrongPassword));
        assert_eq!(err.to_app_error().message(), "Invalid email or password");
    }

    #[tokio::test]
    async fn test_token_for_deleted_account_is_user_not_found() {
        let h = harness();
        let ghost = crate::domain::value_object::lookup_id::LookupId::generate();
        let token = h.state.tokens.issue(&ghost, None).unwrap();

        let err = h.state.resolver().resolve(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::UserNotFound));
    }
}

#[cfg(test)]
mod cache_tests {
    use super::support::*;
    use crate::domain::value_object::user_role::UserRole;

    #[tokio::test]
    async fn test_second_resolve_served_from_cache() {
        let h = harness();
        let provider = ScriptedProvider::google("c@b.com", true);
        let email = crate::domain::value_object::email::Email::parse("c@b.com").unwrap();
        let user = h.state.store.inner.insert(
            crate::domain::entity::user::User::from_provider(email, &provider.profile),
        );

        let first_token = h.state.tokens.issue(&user.lookup_id, Some(UserRole::User)).unwrap();
        let second_token = h.state.tokens.issue(&user.lookup_id, None).unwrap();

        let first = h.state.resolver().resolve(&first_token).await.unwrap();
        assert_eq!(h.state.store.lookups(), 1);

        let second = h.state.resolver().resolve(&second_token).await.unwrap();
        assert_eq!(h.state.store.lookups(), 1);
        assert_eq!(first.user, second.user);
    }

    #[tokio::test]
    async fn test_eviction_only_costs_a_round_trip() {
        let mut config = crate::application::IdentityConfig::for_tests();
        config.cache_capacity = 1;
        let h = harness_with(config, ScriptedProvider::google("x@b.com", true));

        let mut tokens = Vec::new();
        for email in ["d@b.com", "e@b.com"] {
            let provider = ScriptedProvider::google(email, true);
            let parsed = crate::domain::value_object::email::Email::parse(email).unwrap();
            let user = h.state.store.inner.insert(
                crate::domain::entity::user::User::from_provider(parsed, &provider.profile),
            );
            tokens.push(h.state.tokens.issue(&user.lookup_id, None).unwrap());
        }

        h.state.resolver().resolve(&tokens[0]).await.unwrap();
        h.state.resolver().resolve(&tokens[1]).await.unwrap();
        // The first entry was evicted; resolution still succeeds
        let again = h.state.resolver().resolve(&tokens[0]).await.unwrap();

        assert_eq!(again.user.email.as_str(), "d@b.com");
        assert_eq!(h.state.store.lookups(), 3);
    }
}

#[cfg(test)]
mod oauth_tests {
    use super::support::*;
    use crate::application::{CallbackParams, IdentityConfig, SignUpInput};
    use crate::domain::value_object::auth_provider::AuthProvider;
    use crate::error::AuthError;

    fn callback(state: &str) -> CallbackParams {
        CallbackParams {
            state: Some(state.to_string()),
            code: Some("code-1".to_string()),
            error: None,
        }
    }

    #[tokio::test]
    async fn test_first_login_creates_then_reuses() {
        let h = harness();
        let reconciler = h.state.reconciler();

        let (url, state) = reconciler.begin_login().await.unwrap();
        assert!(url.ends_with(&format!("state={state}")));
        let first = reconciler.complete_login(callback(&state)).await.unwrap();
        assert!(first.created);
        assert_eq!(first.user.provider, AuthProvider::Google);
        assert!(first.user.email_verified);
        assert!(first.user.password.is_none());

        let (_, state) = reconciler.begin_login().await.unwrap();
        let second = reconciler.complete_login(callback(&state)).await.unwrap();
        assert!(!second.created);
        assert_eq!(second.user.lookup_id, first.user.lookup_id);

        let claims = h.state.tokens.verify(&second.token).unwrap();
        assert_eq!(claims.lookup_id, first.user.lookup_id);
    }

    #[tokio::test]
    async fn test_provider_mismatch_rejected_without_mutation() {
        let h = harness_with(
            IdentityConfig::for_tests(),
            ScriptedProvider::google("a@b.com", true),
        );
        let registered = h
            .state
            .sign_up()
            .execute(SignUpInput {
                email: "a@b.com".to_string(),
                password: "longenough1".to_string(),
            })
            .await
            .unwrap();

        let reconciler = h.state.reconciler();
        let (_, state) = reconciler.begin_login().await.unwrap();
        let err = reconciler.complete_login(callback(&state)).await.unwrap_err();
        assert!(matches!(err, AuthError::IncorrectAuthType));

        let stored = h.state.store.inner.snapshot(&registered.lookup_id).unwrap();
        assert_eq!(stored, registered.user);
        assert_eq!(h.state.store.inner.len(), 1);
    }

    #[tokio::test]
    async fn test_state_is_single_use() {
        let h = harness();
        let reconciler = h.state.reconciler();

        let (_, state) = reconciler.begin_login().await.unwrap();
        reconciler.complete_login(callback(&state)).await.unwrap();

        let err = reconciler.complete_login(callback(&state)).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidState));
    }

    #[tokio::test]
    async fn test_unknown_or_missing_state() {
        let h = harness();
        let reconciler = h.state.reconciler();

        let err = reconciler.complete_login(callback("forged")).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidState));

        let err = reconciler
            .complete_login(CallbackParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidState));
    }

    #[tokio::test]
    async fn test_provider_error_consumes_state() {
        let h = harness();
        let reconciler = h.state.reconciler();
        let (_, state) = reconciler.begin_login().await.unwrap();

        let err = reconciler
            .complete_login(CallbackParams {
                state: Some(state.clone()),
                code: None,
                error: Some("access_denied".to_string()),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::ExchangeFailed(_)));

        let err = reconciler.complete_login(callback(&state)).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidState));
    }

    #[tokio::test]
    async fn test_missing_code_is_exchange_failure() {
        let h = harness();
        let reconciler = h.state.reconciler();
        let (_, state) = reconciler.begin_login().await.unwrap();

        let err = reconciler
            .complete_login(CallbackParams {
                state: Some(state),
                code: None,
                error: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::ExchangeFailed(_)));
    }

    #[tokio::test]
    async fn test_exchange_failure_creates_nothing() {
        let mut provider = ScriptedProvider::google("g@b.com", true);
        provider.fail_exchange = true;
        let h = harness_with(IdentityConfig::for_tests(), provider);
        let reconciler = h.state.reconciler();
        let (_, state) = reconciler.begin_login().await.unwrap();

        let err = reconciler.complete_login(callback(&state)).await.unwrap_err();
        assert!(matches!(err, AuthError::ExchangeFailed(_)));
        assert!(h.state.store.inner.is_empty());
    }

    #[tokio::test]
    async fn test_unverified_email_rejected() {
        let h = harness_with(
            IdentityConfig::for_tests(),
            ScriptedProvider::google("u@b.com", false),
        );
        let reconciler = h.state.reconciler();
        let (_, state) = reconciler.begin_login().await.unwrap();

        let err = reconciler.complete_login(callback(&state)).await.unwrap_err();
        assert!(matches!(err, AuthError::EmailNotVerified));
        assert!(h.state.store.inner.is_empty());
    }

    async fn failing_login(
        provider: ScriptedProvider,
        config: IdentityConfig,
    ) -> (Harness, AuthError) {
        let h = harness_with(config, provider);
        let reconciler = h.state.reconciler();
        let (_, state) = reconciler.begin_login().await.unwrap();
        let err = reconciler.complete_login(callback(&state)).await.unwrap_err();
        (h, err)
    }

    #[tokio::test]
    async fn test_slow_profile_endpoint_is_profile_failure() {
        let mut provider = ScriptedProvider::google("slow@b.com", true);
        provider.profile_delay = std::time::Duration::from_millis(500);
        let mut config = IdentityConfig::for_tests();
        config.profile_timeout = std::time::Duration::from_millis(10);

        let (h, err) = failing_login(provider, config).await;
        assert!(matches!(err, AuthError::ProfileFetchFailed(_)));
        assert!(h.state.store.inner.is_empty());
    }

    #[tokio::test]
    async fn test_profile_endpoint_error_creates_nothing() {
        let mut provider = ScriptedProvider::google("g@b.com", true);
        provider.fail_profile = true;

        let (h, err) = failing_login(provider, IdentityConfig::for_tests()).await;
        assert!(matches!(err, AuthError::ProfileFetchFailed(_)));
        assert!(h.state.store.inner.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_profile_email_is_profile_failure() {
        let provider = ScriptedProvider::google("not-an-email", true);

        let (h, err) = failing_login(provider, IdentityConfig::for_tests()).await;
        assert!(matches!(err, AuthError::ProfileFetchFailed(_)));
        assert!(h.state.store.inner.is_empty());
    }

    #[tokio::test]
    async fn test_mislabeled_profile_cannot_reach_password_account() {
        let mut provider = ScriptedProvider::google("a@b.com", true);
        provider.profile.provider = AuthProvider::Email;
        let h = harness_with(IdentityConfig::for_tests(), provider);
        let registered = h
            .state
            .sign_up()
            .execute(SignUpInput {
                email: "a@b.com".to_string(),
                password: "longenough1".to_string(),
            })
            .await
            .unwrap();

        let reconciler = h.state.reconciler();
        let (_, state) = reconciler.begin_login().await.unwrap();
        let err = reconciler.complete_login(callback(&state)).await.unwrap_err();

        assert!(matches!(err, AuthError::IncorrectAuthType));
        let stored = h.state.store.inner.snapshot(&registered.lookup_id).unwrap();
        assert_eq!(stored, registered.user);
    }

    #[tokio::test]
    async fn test_created_account_takes_flow_provider() {
        let mut provider = ScriptedProvider::google("new@b.com", true);
        provider.profile.provider = AuthProvider::Discord;
        let h = harness_with(IdentityConfig::for_tests(), provider);
        let reconciler = h.state.reconciler();
        let (_, state) = reconciler.begin_login().await.unwrap();

        let login = reconciler.complete_login(callback(&state)).await.unwrap();
        assert!(login.created);
        assert_eq!(login.user.provider, AuthProvider::Google);
    }
}

#[cfg(test)]
mod enrollment_tests {
    use std::sync::Arc;

    use platform::rate_limit::{AttemptPolicy, MemoryAttemptLimiter};

    use super::support::*;
    use crate::application::{IdentityCache, IdentityConfig, SecondFactor};
    use crate::domain::entity::user::User;
    use crate::domain::value_object::email::Email;

    #[tokio::test]
    async fn test_concurrent_enrollment_returns_stored_secret() {
        let store = Arc::new(CountingStore::yielding());
        let provider = ScriptedProvider::google("tf@b.com", true);
        let user = store.inner.insert(User::from_provider(
            Email::parse("tf@b.com").unwrap(),
            &provider.profile,
        ));
        let second_factor = SecondFactor::new(
            store.clone(),
            Arc::new(IdentityCache::new(8)),
            Arc::new(MemoryAttemptLimiter::new(AttemptPolicy::default())),
            Arc::new(IdentityConfig::for_tests()),
        );

        let (a, b) = tokio::join!(second_factor.enroll(&user), second_factor.enroll(&user));
        let (a, b) = (a.unwrap(), b.unwrap());

        let stored = store.inner.snapshot(&user.lookup_id).unwrap().totp_secret;
        assert_eq!(stored.as_ref(), Some(&a));
        assert_eq!(stored.as_ref(), Some(&b));
    }
}

#[cfg(test)]
mod timeout_tests {
    use std::time::Duration;

    use crate::application::store_call;
    use crate::error::AuthError;

    #[tokio::test]
    async fn test_slow_store_call_times_out() {
        let result: Result<(), AuthError> = store_call(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(AuthError::StoreTimeout)));
    }

    #[tokio::test]
    async fn test_fast_store_call_passes_through() {
        let result = store_call(Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}

#[cfg(test)]
mod router_tests {
    use axum::Router;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use axum::response::Response;
    use serde_json::{Value, json};
    use totp_rs::{Algorithm, TOTP};
    use tower::ServiceExt;

    use super::support::*;
    use crate::application::{BackgroundJob, IdentityConfig};
    use crate::domain::entity::user::User;
    use crate::domain::value_object::{email::Email, user_role::UserRole};
    use crate::presentation::router::identity_router;

    async fn send(app: &Router, req: Request<Body>) -> Response {
        app.clone().oneshot(req).await.unwrap()
    }

    async fn body_json(resp: Response) -> Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_with(uri: &str, name: header::HeaderName, value: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(name, value)
            .body(Body::empty())
            .unwrap()
    }

    /// `name=value` part of the first matching `Set-Cookie`
    fn cookie_pair(resp: &Response, name: &str) -> String {
        resp.headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find(|v| v.starts_with(&format!("{name}=")))
            .and_then(|v| v.split(';').next())
            .unwrap()
            .to_string()
    }

    fn seed_user(h: &Harness, email: &str, role: UserRole) -> (User, String) {
        let provider = ScriptedProvider::google(email, true);
        let mut user = User::from_provider(Email::parse(email).unwrap(), &provider.profile);
        user.role = role;
        let user = h.state.store.inner.insert(user);
        let token = h.state.tokens.issue(&user.lookup_id, Some(role)).unwrap();
        (user, token)
    }

    #[tokio::test]
    async fn test_register_login_profile_flow() {
        let h = harness();
        let app = identity_router(h.state.clone());

        let resp = send(
            &app,
            post_json(
                "/api/users/register",
                json!({"email": "a@b.com", "password": "longenough1"}),
            ),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body = body_json(resp).await;
        let user_id = body["userID"].as_str().unwrap().to_string();

        let resp = send(
            &app,
            post_json(
                "/api/users/login",
                json!({"email": "a@b.com", "password": "longenough1"}),
            ),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let set_cookie = resp.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
        assert!(set_cookie.contains("HttpOnly"));
        assert!(set_cookie.contains("SameSite=Lax"));
        assert!(set_cookie.contains("Max-Age=604800"));
        let cookie = cookie_pair(&resp, "jwt");
        let body = body_json(resp).await;
        assert_eq!(body["secondFactor"], "enrollmentRequired");
        assert!(body["user"].get("password").is_none());

        let resp = send(&app, get_with("/api/users/profile", header::COOKIE, &cookie)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["lookupID"], user_id.as_str());
        assert_eq!(body["email"], "a@b.com");

        // Bearer works for non-cookie clients
        let token = body_json(
            send(
                &app,
                post_json(
                    "/api/users/login",
                    json!({"email": "a@b.com", "password": "longenough1"}),
                ),
            )
            .await,
        )
        .await["token"]
            .as_str()
            .unwrap()
            .to_string();
        let resp = send(
            &app,
            get_with(
                "/api/users/profile",
                header::AUTHORIZATION,
                &format!("Bearer {token}"),
            ),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_profile_requires_session() {
        let h = harness();
        let app = identity_router(h.state.clone());

        let resp = send(
            &app,
            Request::builder()
                .uri("/api/users/profile")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = send(&app, get_with("/api/users/profile", header::COOKIE, "jwt=garbage")).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_wrong_password_status_matches_unknown_email() {
        let h = harness();
        let app = identity_router(h.state.clone());
        send(
            &app,
            post_json(
                "/api/users/register",
                json!({"email": "a@b.com", "password": "longenough1"}),
            ),
        )
        .await;

        let wrong = send(
            &app,
            post_json(
                "/api/users/login",
                json!({"email": "a@b.com", "password": "wrongpass1"}),
            ),
        )
        .await;
        let unknown = send(
            &app,
            post_json(
                "/api/users/login",
                json!({"email": "z@b.com", "password": "wrongpass1"}),
            ),
        )
        .await;

        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(wrong).await["detail"], body_json(unknown).await["detail"]);
    }

    #[tokio::test]
    async fn test_admin_routes_gate_and_audit() {
        let mut h = harness();
        let app = identity_router(h.state.clone());
        let (_, user_token) = seed_user(&h, "user@b.com", UserRole::User);
        let (admin, admin_token) = seed_user(&h, "admin@b.com", UserRole::Admin);
        let (target, _) = seed_user(&h, "target@b.com", UserRole::User);
        let uri = format!("/api/admin/users/{}", target.lookup_id);

        let resp = send(
            &app,
            get_with(&uri, header::AUTHORIZATION, &format!("Bearer {user_token}")),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert!(h.inbox.try_recv().is_err());

        let resp = send(
            &app,
            get_with(&uri, header::AUTHORIZATION, &format!("Bearer {admin_token}")),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["email"], "target@b.com");

        let Ok(BackgroundJob::Audit(event)) = h.inbox.try_recv() else {
            panic!("expected an audit event");
        };
        assert_eq!(event.action, "VIEW");
        assert_eq!(event.resource, "users");
        assert_eq!(event.target_user, target.lookup_id.as_str());
        assert_eq!(event.admin_lookup_id, admin.lookup_id.as_str());
        assert_eq!(event.admin_email, "admin@b.com");
        assert_eq!(event.status, 200);
        assert!(event.request_id.starts_with("req_"));
    }

    #[tokio::test]
    async fn test_admin_search_and_miss() {
        let mut h = harness();
        let app = identity_router(h.state.clone());
        let (_, admin_token) = seed_user(&h, "admin@b.com", UserRole::Admin);
        seed_user(&h, "someone@b.com", UserRole::User);

        let mut req = post_json("/api/admin/search", json!({"email": "SOMEONE@b.com"}));
        req.headers_mut().insert(
            header::AUTHORIZATION,
            format!("Bearer {admin_token}").parse().unwrap(),
        );
        let resp = send(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["email"], "someone@b.com");

        let Ok(BackgroundJob::Audit(event)) = h.inbox.try_recv() else {
            panic!("expected an audit event");
        };
        assert_eq!(event.action, "CREATE");
        assert_eq!(event.resource, "search");

        let mut req = post_json("/api/admin/search", json!({"email": "nobody@b.com"}));
        req.headers_mut().insert(
            header::AUTHORIZATION,
            format!("Bearer {admin_token}").parse().unwrap(),
        );
        let resp = send(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_admin_profile_sends_notice() {
        let mut config = IdentityConfig::for_tests();
        config.admin_notify_email = Some("ops@b.com".to_string());
        let mut h = harness_with(config, ScriptedProvider::google("g@b.com", true));
        let app = identity_router(h.state.clone());
        let (_, admin_token) = seed_user(&h, "admin@b.com", UserRole::Admin);

        let resp = send(
            &app,
            get_with(
                "/api/admin/profile",
                header::AUTHORIZATION,
                &format!("Bearer {admin_token}"),
            ),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let Ok(BackgroundJob::Mail(mail)) = h.inbox.try_recv() else {
            panic!("expected a notice mail");
        };
        assert_eq!(mail.to, "ops@b.com");
        assert!(matches!(h.inbox.try_recv(), Ok(BackgroundJob::Audit(_))));
    }

    #[tokio::test]
    async fn test_oauth_login_redirects_without_cache() {
        let h = harness();
        let app = identity_router(h.state.clone());

        let resp = send(
            &app,
            Request::builder()
                .uri("/api/oauth/google/login")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert_eq!(resp.status(), StatusCode::TEMPORARY_REDIRECT);
        let location = resp.headers()[header::LOCATION].to_str().unwrap();
        assert!(location.starts_with("https://provider.test/auth?state="));
        assert_eq!(
            resp.headers()[header::CACHE_CONTROL],
            "no-cache, no-store, must-revalidate"
        );
        assert_eq!(h.state.states.len(), 1);
    }

    #[tokio::test]
    async fn test_oauth_callback_sets_session_cookie() {
        let h = harness();
        let app = identity_router(h.state.clone());

        let resp = send(
            &app,
            Request::builder()
                .uri("/api/oauth/google/login")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        let location = resp.headers()[header::LOCATION].to_str().unwrap().to_string();
        let state = location.rsplit_once("state=").unwrap().1.to_string();

        let resp = send(
            &app,
            Request::builder()
                .uri(format!("/api/oauth/google/callback?state={state}&code=abc"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let cookie = cookie_pair(&resp, "jwt");
        assert_eq!(body_json(resp).await["user"]["provider"], "google");

        let resp = send(&app, get_with("/api/users/profile", header::COOKIE, &cookie)).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let replay = send(
            &app,
            Request::builder()
                .uri(format!("/api/oauth/google/callback?state={state}&code=abc"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(replay.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_second_factor_flow() {
        let h = harness();
        let app = identity_router(h.state.clone());
        let (_, token) = seed_user(&h, "tf@b.com", UserRole::User);
        let session = format!("jwt={token}");

        let mut enroll = Request::builder()
            .method("POST")
            .uri("/api/two/enroll")
            .body(Body::empty())
            .unwrap();
        enroll
            .headers_mut()
            .insert(header::COOKIE, session.parse().unwrap());
        let resp = send(&app, enroll).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        let secret = body["secret"].as_str().unwrap().to_string();
        assert!(body["otpauthUrl"].as_str().unwrap().contains(&secret));
        assert!(body["qrCode"].as_str().unwrap().starts_with("data:image/png;base64,"));

        let resp = send(&app, get_with("/api/two/status", header::COOKIE, &session)).await;
        let body = body_json(resp).await;
        assert_eq!(body["enrolled"], true);
        assert_eq!(body["satisfied"], false);

        let code = TOTP::new(
            Algorithm::SHA1,
            6,
            1,
            30,
            totp_rs::Secret::Encoded(secret).to_bytes().unwrap(),
            None,
            String::new(),
        )
        .unwrap()
        .generate_current()
        .unwrap();

        let mut validate = post_json("/api/two/validate", json!({ "code": code }));
        validate
            .headers_mut()
            .insert(header::COOKIE, session.parse().unwrap());
        let resp = send(&app, validate).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let marker = cookie_pair(&resp, "second_factor");

        let resp = send(
            &app,
            get_with("/api/two/status", header::COOKIE, &format!("{session}; {marker}")),
        )
        .await;
        assert_eq!(body_json(resp).await["satisfied"], true);

        let mut wrong = post_json("/api/two/validate", json!({ "code": "abcdef" }));
        wrong
            .headers_mut()
            .insert(header::COOKIE, session.parse().unwrap());
        assert_eq!(send(&app, wrong).await.status(), StatusCode::UNAUTHORIZED);
    }
}
