use std::sync::Arc;
use std::time::Duration;

use serde::{
  Deserialize,
  Serialize
};
use tracing::{
  error,
  info,
  instrument,
  warn
};
use uuid::Uuid;

use crate::datastore::{
  SlotStorage,
  USER_SLOT,
  load_slot,
  save_slot
};
use crate::notify::{
  Notification,
  Notifier
};

pub const DEMO_EMAIL: &str =
  "user@example.com";
pub const DEMO_PASSWORD: &str =
  "password";
pub const DEMO_USER_ID: &str = "1";
pub const DEMO_USER_NAME: &str =
  "Demo User";

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct User {
  pub id:    String,
  pub name:  String,
  pub email: String
}

impl User {
  /// Up to two leading characters of
  /// the name, upper-cased.
  pub fn initials(&self) -> String {
    self
      .name
      .chars()
      .take(2)
      .collect::<String>()
      .to_uppercase()
  }
}

/// Holds the signed-in user. Login and
/// register take `&mut self`, so one
/// store never has two attempts in
/// flight; share it behind a
/// `tokio::sync::Mutex` to serialise
/// attempts across tasks.
pub struct IdentityStore {
  storage:  Arc<dyn SlotStorage>,
  notifier: Arc<dyn Notifier>,
  latency:  Duration,
  current:  Option<User>
}

impl IdentityStore {
  #[instrument(skip_all)]
  pub fn load(
    storage: Arc<dyn SlotStorage>,
    notifier: Arc<dyn Notifier>,
    latency: Duration
  ) -> Self {
    let current =
      load_slot::<User>(
        storage.as_ref(),
        USER_SLOT
      )
      .into_option();
    info!(
      authenticated = current.is_some(),
      "identity store loaded"
    );

    Self {
      storage,
      notifier,
      latency,
      current
    }
  }

  pub fn current_user(
    &self
  ) -> Option<&User> {
    self.current.as_ref()
  }

  pub fn is_authenticated(
    &self
  ) -> bool {
    self.current.is_some()
  }

  /// Only the demo credential pair
  /// authenticates. A mismatch is a
  /// reported outcome, not an error.
  #[instrument(skip(self, password))]
  pub async fn login(
    &mut self,
    email: &str,
    password: &str
  ) -> bool {
    tokio::time::sleep(self.latency)
      .await;

    if email != DEMO_EMAIL
      || password != DEMO_PASSWORD
    {
      warn!("rejected credentials");
      self.notifier.notify(
        Notification::error(
          "Login failed",
          "Invalid email or password"
        )
      );
      return false;
    }

    let user = User {
      id:    DEMO_USER_ID.to_string(),
      name:  DEMO_USER_NAME.to_string(),
      email: email.to_string()
    };

    if let Err(err) = save_slot(
      self.storage.as_ref(),
      USER_SLOT,
      &user
    ) {
      error!(error = %err, "login error");
      self.notifier.notify(
        Notification::error(
          "Login failed",
          "An error occurred during login"
        )
      );
      return false;
    }

    info!(user_id = %user.id, "logged in");
    self.current = Some(user);
    self.notifier.notify(
      Notification::info(
        "Login successful",
        "Welcome back!"
      )
    );
    true
  }

  /// Always accepts; no uniqueness or
  /// validation is enforced.
  #[instrument(skip(self, _password))]
  pub async fn register(
    &mut self,
    name: &str,
    email: &str,
    _password: &str
  ) -> bool {
    tokio::time::sleep(self.latency)
      .await;

    let user = User {
      id:    Uuid::new_v4().to_string(),
      name:  name.to_string(),
      email: email.to_string()
    };

    if let Err(err) = save_slot(
      self.storage.as_ref(),
      USER_SLOT,
      &user
    ) {
      error!(error = %err, "registration error");
      self.notifier.notify(
        Notification::error(
          "Registration failed",
          "An error occurred during registration"
        )
      );
      return false;
    }

    info!(user_id = %user.id, "registered");
    self.current = Some(user);
    self.notifier.notify(
      Notification::info(
        "Registration successful",
        "Your account has been created"
      )
    );
    true
  }

  #[instrument(skip(self))]
  pub fn logout(
    &mut self
  ) -> anyhow::Result<()> {
    self.storage.remove(USER_SLOT)?;
    self.current = None;
    info!("logged out");
    self.notifier.notify(
      Notification::info(
        "Logged out",
        "You have been logged out successfully"
      )
    );
    Ok(())
  }
}
