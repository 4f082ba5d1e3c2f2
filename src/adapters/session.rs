use tokio::sync::watch;

use crate::ports::{IdentityProvider, User};

/// In-process identity provider backed by a `watch` channel.
///
/// The sign-in UI itself lives outside this crate; callers push session transitions
/// through `sign_in`/`sign_out`.
pub struct SessionHandle {
    sender: watch::Sender<Option<User>>,
}

impl SessionHandle {
    pub fn new(initial: Option<User>) -> Self {
        let (sender, _receiver) = watch::channel(initial);
        Self { sender }
    }

    pub fn signed_in(uid: &str) -> Self {
        Self::new(Some(User {
            uid: uid.to_string(),
            email: None,
        }))
    }

    pub fn sign_in(&self, user: User) {
        tracing::info!(uid = %user.uid, "session established");
        self.sender.send_replace(Some(user));
    }

    pub fn sign_out(&self) {
        tracing::info!("session ended");
        self.sender.send_replace(None);
    }
}

impl IdentityProvider for SessionHandle {
    fn current_user(&self) -> Option<User> {
        self.sender.borrow().clone()
    }

    fn on_auth_change(&self) -> watch::Receiver<Option<User>> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sign_out_notifies_subscribers() {
        let session = SessionHandle::signed_in("buyer-1");
        let mut rx = session.on_auth_change();
        assert_eq!(session.current_user().map(|u| u.uid), Some("buyer-1".to_string()));

        session.sign_out();
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_none());
        assert!(session.current_user().is_none());
    }
}
