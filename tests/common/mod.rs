#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use abstract_portal::{
    config::Config,
    db::{MemoryStore, NewAbstract, NewUser, Store},
    errors::AppError,
    models::{Abstract, Field, Role},
    service::{
        auth::UserAuthData,
        crypto,
        gateway::{CheckoutRequest, CheckoutSession, PaymentGateway},
        mail::{Dispatcher, Email},
    },
    AppState,
};
use actix_web::web;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

pub const JWT_SECRET: &str = "test-secret";
pub const ADMIN_INBOX: &str = "editor@portal.test";

#[derive(Default)]
pub struct StubGateway {
    pub refuse_checkout: AtomicBool,
    pub verified: AtomicBool,
    pub checkouts: Mutex<Vec<CheckoutRequest>>,
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn create_checkout(&self, request: CheckoutRequest) -> Result<CheckoutSession, AppError> {
        if self.refuse_checkout.load(Ordering::SeqCst) {
            return Err(AppError::gateway("checkout refused: stub"));
        }
        let session = CheckoutSession {
            checkout_url: format!("https://checkout.test/{}", request.tx_ref),
            tx_ref: request.tx_ref.clone(),
        };
        self.checkouts.lock().unwrap().push(request);
        Ok(session)
    }

    async fn verify(&self, _tx_ref: &str) -> Result<bool, AppError> {
        Ok(self.verified.load(Ordering::SeqCst))
    }
}

pub fn test_config() -> Config {
    let vars: HashMap<&str, &str> = HashMap::from([
        ("DATABASE_URL", "memory://"),
        ("JWT_SECRET", JWT_SECRET),
        ("ADMIN_EMAIL", ADMIN_INBOX),
        ("API_BASE_URL", "http://api.test"),
        ("FRONTEND_URL", "http://portal.test"),
    ]);
    Config::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap()
}

pub struct TestEnv {
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<StubGateway>,
    pub state: web::Data<AppState>,
    mail_rx: UnboundedReceiver<Email>,
}

impl TestEnv {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(StubGateway::default());
        let (mail, mail_rx) = Dispatcher::channel();
        let state = web::Data::new(AppState {
            store: store.clone(),
            gateway: gateway.clone(),
            mail,
            config: Arc::new(test_config()),
        });
        Self {
            store,
            gateway,
            state,
            mail_rx,
        }
    }

    pub fn dyn_store(&self) -> Arc<dyn Store> {
        self.store.clone()
    }

    pub fn app_state(&self) -> &AppState {
        self.state.get_ref()
    }

    /// Everything enqueued for sending since the last call.
    pub fn drain_mail(&mut self) -> Vec<Email> {
        let mut sent = Vec::new();
        while let Ok(email) = self.mail_rx.try_recv() {
            sent.push(email);
        }
        sent
    }

    pub async fn user(&self, email: &str, password: &str, role: Role) -> UserAuthData {
        let user = self
            .store
            .create_user(NewUser {
                fullname: format!("User {}", email),
                email: email.to_string(),
                country: "MW".to_string(),
                password_hash: crypto::hash_password(password),
                role,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        UserAuthData {
            user_id: user.id,
            fullname: user.fullname,
            email: user.email,
            role: user.role,
            session_id: Uuid::new_v4(),
        }
    }

    pub async fn student(&self, email: &str) -> UserAuthData {
        self.user(email, "password123", Role::Student).await
    }

    pub async fn admin(&self) -> UserAuthData {
        self.user("admin@portal.test", "adminpass1", Role::Admin).await
    }

    pub async fn abstract_for(&self, author: &UserAuthData, title: &str) -> Abstract {
        self.store
            .create_abstract(NewAbstract {
                title: title.to_string(),
                content: "Findings".to_string(),
                field: Field::Ai,
                institution: "UNIMA".to_string(),
                country: "MW".to_string(),
                year: 2024,
                keywords: Some("maize, yield".to_string()),
                author_id: author.user_id,
                date_submitted: Utc::now(),
            })
            .await
            .unwrap()
    }
}
