//! Command handling for the VICA CLI.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::debug;
use vica_core::auth::{
    AuthResponse, FileTokenStore, Launcher, LoopbackProvider, Navigator,
};
use vica_core::config::TokenBackend;
use vica_core::{AuthError, AuthService, Config};

use crate::Command;

const USERS_PATH: &str = "/vica/users/getUser";

/// Tells the user to sign in again; a terminal has no page to navigate to
struct TerminalNavigator;

impl Navigator for TerminalNavigator {
    fn redirect(&self, path: &str) {
        eprintln!("Your session has expired. Run `vica signin` to sign in again ({}).", path);
    }
}

pub struct App {
    config: Config,
    service: AuthService,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let store = config.open_token_store()?;
        let launcher: Launcher = Arc::new(|url: &str| {
            eprintln!("Opening {} in your browser...", url);
            webbrowser::open(url)
        });
        let provider = Arc::new(LoopbackProvider::new(&config.provider, launcher));

        let service = AuthService::connect(
            config.api_base()?,
            config.request_timeout(),
            store,
            provider,
            Arc::new(TerminalNavigator),
        )?;
        debug!(base_url = %service.api().base_url(), "Client ready");

        Ok(Self { config, service })
    }

    pub async fn run(&self, command: Command) -> Result<()> {
        match command {
            Command::Signin { email, password } => {
                let password = Self::password_or_prompt(password)?;
                let response = self.service.sign_in(&email, &password).await?;
                Self::report_signed_in(&response);
            }
            Command::Signup {
                name,
                email,
                password,
                avatar,
            } => {
                let password = Self::password_or_prompt(password)?;
                let response = self
                    .service
                    .sign_up(&name, &email, &password, avatar.as_deref())
                    .await?;
                Self::report_signed_in(&response);
            }
            Command::Google => {
                println!("Waiting for Google sign-in to complete in the browser...");
                let response = self.service.sign_in_federated().await?;
                Self::report_signed_in(&response);
            }
            Command::Logout => {
                self.service.logout()?;
                println!("Signed out.");
            }
            Command::Status => self.status()?,
            Command::Users => {
                let users: Vec<Value> = self
                    .service
                    .api()
                    .get_json(USERS_PATH)
                    .await
                    .map_err(AuthError::from)?;
                println!("{}", serde_json::to_string_pretty(&users)?);
            }
            Command::User { id } => {
                let user: Value = self
                    .service
                    .api()
                    .get_json(&format!("{}/{}", USERS_PATH, id))
                    .await
                    .map_err(AuthError::from)?;
                println!("{}", serde_json::to_string_pretty(&user)?);
            }
            Command::Config { save } => {
                println!("{}", serde_json::to_string_pretty(&self.config)?);
                if save {
                    self.config.save().context("Failed to save config")?;
                    println!("Saved.");
                }
            }
        }
        Ok(())
    }

    fn password_or_prompt(password: Option<String>) -> Result<String> {
        match password {
            Some(password) => Ok(password),
            None => rpassword::prompt_password("Password: ").context("Failed to read password"),
        }
    }

    fn report_signed_in(response: &AuthResponse) {
        let who = response
            .name
            .as_deref()
            .or(response.email.as_deref())
            .unwrap_or("unknown user");
        if response.token.as_deref().is_some_and(|t| !t.is_empty()) {
            println!("Signed in as {}.", who);
        } else {
            println!("Request accepted for {}, but no session token was issued.", who);
        }
    }

    fn status(&self) -> Result<()> {
        println!("Backend:   {}", self.service.api().base_url());
        println!("Storage:   {:?}", self.config.token_backend);

        if !self.service.is_authenticated() {
            println!("Session:   none");
            return Ok(());
        }

        if self.config.token_backend == TokenBackend::File {
            let saved_at = FileTokenStore::new(self.config.cache_dir()?).saved_at()?;
            if let Some(saved_at) = saved_at {
                println!("Session:   stored {}", saved_at.format("%Y-%m-%d %H:%M UTC"));
                return Ok(());
            }
        }
        println!("Session:   stored");
        Ok(())
    }
}
