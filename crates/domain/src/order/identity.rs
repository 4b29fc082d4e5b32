//! Resolves which customer owns an order.

use common::{Email, EmailError, UserId};
use order_store::OrderStore;

use crate::error::DomainError;

/// The owner recorded on an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub user_id: Option<UserId>,
    pub email: Email,
}

/// Resolves the order owner from profiles.
///
/// - A user id must name an existing profile; its stored email is used.
/// - Otherwise a profile matching the request email claims the order.
/// - Otherwise the request email is used for a guest checkout.
///
/// An empty, malformed or placeholder email with nothing better to fall
/// back on is an error.
#[tracing::instrument(skip(store))]
pub async fn resolve_identity<S: OrderStore + ?Sized>(
    store: &S,
    user_id: Option<UserId>,
    email: Option<&str>,
) -> Result<ResolvedIdentity, DomainError> {
    let request_email = email.map(Email::parse);

    if let Some(user_id) = user_id {
        let profile = store.find_profile(user_id).await?.ok_or_else(|| {
            DomainError::IdentityResolution(format!(
                "user {user_id} not found; the user must exist before ordering"
            ))
        })?;

        let email = match Email::parse(&profile.email) {
            Ok(email) => email,
            Err(profile_err) => {
                tracing::warn!(%user_id, error = %profile_err, "profile email unusable, trying request email");
                request_email
                    .and_then(Result::ok)
                    .ok_or_else(|| {
                        DomainError::IdentityResolution(format!(
                            "user {user_id} has no usable email address"
                        ))
                    })?
            }
        };

        return Ok(ResolvedIdentity {
            user_id: Some(user_id),
            email,
        });
    }

    let email = match request_email {
        Some(Ok(email)) => email,
        Some(Err(e)) => return Err(identity_error(e)),
        None => return Err(identity_error(EmailError::Empty)),
    };

    if let Some(profile) = store.find_profile_by_email(email.as_str()).await? {
        let stored = Email::parse(&profile.email).unwrap_or_else(|_| email.clone());
        return Ok(ResolvedIdentity {
            user_id: Some(profile.id),
            email: stored,
        });
    }

    Ok(ResolvedIdentity {
        user_id: None,
        email,
    })
}

fn identity_error(e: EmailError) -> DomainError {
    DomainError::IdentityResolution(format!("no usable customer email: {e}"))
}

#[cfg(test)]
mod tests {
    use order_store::{InMemoryOrderStore, Profile};

    use super::*;

    async fn store_with(profile: &Profile) -> InMemoryOrderStore {
        let store = InMemoryOrderStore::new();
        store.insert_profile(profile.clone()).await;
        store
    }

    fn profile(email: &str) -> Profile {
        Profile {
            id: UserId::new(),
            email: email.to_string(),
            username: None,
        }
    }

    #[tokio::test]
    async fn user_id_uses_stored_email() {
        let p = profile("stored@banners.test");
        let store = store_with(&p).await;

        let identity = resolve_identity(&store, Some(p.id), Some("typed@banners.test"))
            .await
            .unwrap();
        assert_eq!(identity.user_id, Some(p.id));
        assert_eq!(identity.email.as_str(), "stored@banners.test");
    }

    #[tokio::test]
    async fn unknown_user_id_fails() {
        let store = InMemoryOrderStore::new();
        let result = resolve_identity(&store, Some(UserId::new()), Some("a@b.co")).await;
        assert!(matches!(result, Err(DomainError::IdentityResolution(msg)) if msg.contains("must exist")));
    }

    #[tokio::test]
    async fn email_matching_profile_claims_order() {
        let p = profile("Known@Banners.test");
        let store = store_with(&p).await;

        let identity = resolve_identity(&store, None, Some("known@banners.test"))
            .await
            .unwrap();
        assert_eq!(identity.user_id, Some(p.id));
        assert_eq!(identity.email.as_str(), "Known@Banners.test");
    }

    #[tokio::test]
    async fn guest_checkout_with_real_email() {
        let store = InMemoryOrderStore::new();
        let identity = resolve_identity(&store, None, Some("guest.buyer@banners.test"))
            .await
            .unwrap();
        assert_eq!(identity.user_id, None);
        assert_eq!(identity.email.as_str(), "guest.buyer@banners.test");
    }

    #[tokio::test]
    async fn placeholder_missing_or_malformed_email_fails() {
        let store = InMemoryOrderStore::new();
        for email in [Some("guest@example.com"), Some(""), Some("not-an-email"), None] {
            let result = resolve_identity(&store, None, email).await;
            assert!(
                matches!(result, Err(DomainError::IdentityResolution(_))),
                "{email:?} should not resolve"
            );
        }
    }

    #[tokio::test]
    async fn unusable_profile_email_falls_back_to_request() {
        let p = profile("");
        let store = store_with(&p).await;

        let identity = resolve_identity(&store, Some(p.id), Some("typed@banners.test"))
            .await
            .unwrap();
        assert_eq!(identity.email.as_str(), "typed@banners.test");

        let result = resolve_identity(&store, Some(p.id), None).await;
        assert!(matches!(result, Err(DomainError::IdentityResolution(_))));
    }
}
