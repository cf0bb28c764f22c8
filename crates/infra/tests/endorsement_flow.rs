use std::sync::{Arc, Once};
use std::time::Duration;

use neighbourly_domain::communities::{CommunityCreate, PrivacyLevel};
use neighbourly_domain::contacts::ContactCreate;
use neighbourly_domain::endorsements::{EndorsementCreate, EndorsementUpdate};
use neighbourly_domain::error::DomainError;
use neighbourly_domain::identity::ActorIdentity;
use neighbourly_domain::membership::{MemberRole, MembershipAction, MembershipCommand};
use neighbourly_domain::notifications::NotificationEvent;
use neighbourly_domain::ports::BoxFuture;
use neighbourly_domain::ports::notifications::{NotificationPort, NotifyError};
use neighbourly_domain::ports::tx::UnitOfWork;
use neighbourly_domain::users::UserCreate;
use neighbourly_infra::config::AppConfig;
use neighbourly_infra::logging::init_tracing;
use neighbourly_infra::notify::LoggingNotifier;
use neighbourly_infra::state::AppServices;
use neighbourly_infra::store::InMemoryStore;

static TRACING: Once = Once::new();

struct Ctx {
    services: AppServices,
    store: Arc<InMemoryStore>,
    owner: ActorIdentity,
    member_1: ActorIdentity,
    member_2: ActorIdentity,
    community_id: String,
    contact_id: String,
}

fn test_config() -> AppConfig {
    AppConfig {
        app_env: "test".to_string(),
        log_level: "info".to_string(),
        rating_max_age_days: 365.0,
        rating_recency_floor: 0.5,
        rating_unverified_factor: 0.7,
    }
}

async fn setup_with_notifier(notifier: Arc<dyn NotificationPort>) -> Ctx {
    TRACING.call_once(|| init_tracing(&test_config()).unwrap());
    let store = Arc::new(InMemoryStore::new());
    let services = AppServices::with_backend(&test_config(), store.clone(), notifier);

    let mut actors = Vec::new();
    for name in ["owner", "member-1", "member-2"] {
        let user = services
            .users
            .register(UserCreate {
                username: name.to_string(),
                email: format!("{name}@example.test"),
            })
            .await
            .unwrap();
        actors.push(ActorIdentity {
            user_id: user.user_id,
            username: user.username,
        });
    }
    let owner = actors.remove(0);
    let member_1 = actors.remove(0);
    let member_2 = actors.remove(0);

    let community = services
        .memberships
        .create_community(
            owner.clone(),
            CommunityCreate {
                name: "Maple Street".to_string(),
                privacy_level: PrivacyLevel::Public,
            },
        )
        .await
        .unwrap();

    for member in [&member_1, &member_2] {
        services
            .memberships
            .manage_membership(
                owner.clone(),
                MembershipCommand {
                    community_id: community.community_id.clone(),
                    user_id: member.user_id.clone(),
                    action: MembershipAction::Invite,
                    role: MemberRole::Member,
                },
            )
            .await
            .unwrap();
        services
            .memberships
            .manage_membership(
                member.clone(),
                MembershipCommand {
                    community_id: community.community_id.clone(),
                    user_id: member.user_id.clone(),
                    action: MembershipAction::Accept,
                    role: MemberRole::Member,
                },
            )
            .await
            .unwrap();
    }

    let contact = services
        .contacts
        .create(
            owner.clone(),
            ContactCreate {
                contact_name: "Plumber Pat".to_string(),
                community_ids: vec![community.community_id.clone()],
            },
        )
        .await
        .unwrap();

    Ctx {
        services,
        store,
        owner,
        member_1,
        member_2,
        community_id: community.community_id,
        contact_id: contact.contact_id,
    }
}

async fn setup() -> Ctx {
    setup_with_notifier(Arc::new(LoggingNotifier::new())).await
}

fn create_input(ctx: &Ctx, rating: u8) -> EndorsementCreate {
    EndorsementCreate {
        contact_id: ctx.contact_id.clone(),
        community_id: ctx.community_id.clone(),
        rating,
        comment: None,
    }
}

struct FailingNotifier;

impl NotificationPort for FailingNotifier {
    fn notify(&self, _event: NotificationEvent) -> BoxFuture<'_, Result<(), NotifyError>> {
        Box::pin(async { Err(NotifyError::Dispatch("channel down".to_string())) })
    }
}

#[tokio::test]
async fn creating_an_endorsement_updates_the_contact_metrics() {
    let ctx = setup().await;

    let endorsement = ctx
        .services
        .endorsements
        .create(ctx.member_1.clone(), create_input(&ctx, 5))
        .await
        .unwrap();
    assert!(!endorsement.is_verified);

    let contact = ctx.services.contacts.get(&ctx.contact_id).await.unwrap();
    assert_eq!(contact.endorsements_count, 1);
    assert_eq!(contact.verified_endorsements_count, 0);
    assert_eq!(contact.average_rating, Some(5.0));
}

#[tokio::test]
async fn non_members_cannot_endorse_and_leave_no_trace() {
    let ctx = setup().await;
    let outsider = ActorIdentity::with_user_id("outsider-1");

    let err = ctx
        .services
        .endorsements
        .create(outsider, create_input(&ctx, 4))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));

    let contact = ctx.services.contacts.get(&ctx.contact_id).await.unwrap();
    assert_eq!(contact.endorsements_count, 0);
    assert_eq!(contact.average_rating, None);
}

#[tokio::test]
async fn a_second_endorsement_of_the_same_triple_is_a_duplicate() {
    let ctx = setup().await;

    ctx.services
        .endorsements
        .create(ctx.member_1.clone(), create_input(&ctx, 5))
        .await
        .unwrap();
    let err = ctx
        .services
        .endorsements
        .create(ctx.member_1.clone(), create_input(&ctx, 3))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Duplicate(_)));

    let contact = ctx.services.contacts.get(&ctx.contact_id).await.unwrap();
    assert_eq!(contact.endorsements_count, 1);
}

#[tokio::test]
async fn concurrent_creation_of_the_same_triple_yields_exactly_one_success() {
    let ctx = setup().await;

    let mut handles = Vec::new();
    for _ in 0..2 {
        let service = ctx.services.endorsements.clone();
        let actor = ctx.member_1.clone();
        let input = create_input(&ctx, 4);
        handles.push(tokio::spawn(
            async move { service.create(actor, input).await },
        ));
    }

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(err) => assert!(matches!(err, DomainError::Duplicate(_))),
        }
    }
    assert_eq!(successes, 1);

    let contact = ctx.services.contacts.get(&ctx.contact_id).await.unwrap();
    assert_eq!(contact.endorsements_count, 1);
}

#[tokio::test]
async fn verification_flow_updates_flags_and_metrics() {
    let ctx = setup().await;

    let endorsement = ctx
        .services
        .endorsements
        .create(ctx.member_1.clone(), create_input(&ctx, 4))
        .await
        .unwrap();

    let verified = ctx
        .services
        .endorsements
        .verify(&endorsement.endorsement_id, &ctx.owner.user_id)
        .await
        .unwrap();
    assert!(verified.is_verified);
    assert_eq!(verified.verified_by.as_deref(), Some(ctx.owner.user_id.as_str()));
    assert!(verified.verified_at_ms.is_some());

    let contact = ctx.services.contacts.get(&ctx.contact_id).await.unwrap();
    assert_eq!(contact.verified_endorsements_count, 1);

    // Verifying again is a no-op that keeps the original verifier.
    let again = ctx
        .services
        .endorsements
        .verify(&endorsement.endorsement_id, &ctx.member_2.user_id)
        .await
        .unwrap();
    assert_eq!(again.verified_by, verified.verified_by);
    assert_eq!(again.verified_at_ms, verified.verified_at_ms);
}

#[tokio::test]
async fn concurrent_verifies_keep_the_first_verifier() {
    let ctx = setup().await;

    let endorsement = ctx
        .services
        .endorsements
        .create(ctx.member_1.clone(), create_input(&ctx, 4))
        .await
        .unwrap();

    // Hold the store's transaction gate so both verifies read the endorsement
    // before either can commit; the loser must then take the no-op path on
    // its in-transaction re-read rather than overwrite the winner.
    let gate_hold = {
        let store = ctx.store.clone();
        tokio::spawn(async move {
            store
                .transaction(Box::new(|_| {
                    Box::pin(async {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(())
                    })
                }))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    let mut handles = Vec::new();
    for verifier in [ctx.owner.clone(), ctx.member_2.clone()] {
        let service = ctx.services.endorsements.clone();
        let id = endorsement.endorsement_id.clone();
        handles.push(tokio::spawn(async move {
            service.verify(&id, &verifier.user_id).await
        }));
    }

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap().unwrap());
    }
    gate_hold.await.unwrap().unwrap();

    // Both calls succeed and agree on a single verifier; the stored row
    // matches and the metrics count the verification once.
    assert!(results[0].verified_by.is_some());
    assert_eq!(results[0].verified_by, results[1].verified_by);
    assert_eq!(results[0].verified_at_ms, results[1].verified_at_ms);

    let stored = ctx
        .services
        .endorsements
        .get(&endorsement.endorsement_id)
        .await
        .unwrap();
    assert_eq!(stored.verified_by, results[0].verified_by);
    assert_eq!(stored.verified_at_ms, results[0].verified_at_ms);

    let contact = ctx.services.contacts.get(&ctx.contact_id).await.unwrap();
    assert_eq!(contact.verified_endorsements_count, 1);
}

#[tokio::test]
async fn an_author_cannot_verify_their_own_endorsement() {
    let ctx = setup().await;

    let endorsement = ctx
        .services
        .endorsements
        .create(ctx.member_1.clone(), create_input(&ctx, 4))
        .await
        .unwrap();
    let err = ctx
        .services
        .endorsements
        .verify(&endorsement.endorsement_id, &ctx.member_1.user_id)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::BusinessRule(_)));
}

#[tokio::test]
async fn retracting_removes_the_contribution_from_every_metric() {
    let ctx = setup().await;

    ctx.services
        .endorsements
        .create(ctx.member_1.clone(), create_input(&ctx, 5))
        .await
        .unwrap();
    let second = ctx
        .services
        .endorsements
        .create(ctx.member_2.clone(), create_input(&ctx, 1))
        .await
        .unwrap();

    ctx.services
        .endorsements
        .retract(ctx.member_2.clone(), &second.endorsement_id)
        .await
        .unwrap();

    let contact = ctx.services.contacts.get(&ctx.contact_id).await.unwrap();
    assert_eq!(contact.endorsements_count, 1);
    assert_eq!(contact.average_rating, Some(5.0));

    let listed = ctx
        .services
        .endorsements
        .list_by_contact(&ctx.contact_id)
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn only_the_author_may_update_and_the_metrics_follow() {
    let ctx = setup().await;

    let endorsement = ctx
        .services
        .endorsements
        .create(ctx.member_1.clone(), create_input(&ctx, 2))
        .await
        .unwrap();

    let err = ctx
        .services
        .endorsements
        .update(
            ctx.member_2.clone(),
            &endorsement.endorsement_id,
            EndorsementUpdate {
                rating: Some(5),
                comment: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::BusinessRule(_)));

    let updated = ctx
        .services
        .endorsements
        .update(
            ctx.member_1.clone(),
            &endorsement.endorsement_id,
            EndorsementUpdate {
                rating: Some(5),
                comment: Some("showed up on time and fixed the leak".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.rating, 5);

    let contact = ctx.services.contacts.get(&ctx.contact_id).await.unwrap();
    assert_eq!(contact.average_rating, Some(5.0));
}

#[tokio::test]
async fn a_failing_notifier_does_not_fail_or_roll_back_creation() {
    let ctx = setup_with_notifier(Arc::new(FailingNotifier)).await;

    let endorsement = ctx
        .services
        .endorsements
        .create(ctx.member_1.clone(), create_input(&ctx, 4))
        .await
        .unwrap();

    let stored = ctx
        .services
        .endorsements
        .get(&endorsement.endorsement_id)
        .await
        .unwrap();
    assert_eq!(stored.rating, 4);

    let contact = ctx.services.contacts.get(&ctx.contact_id).await.unwrap();
    assert_eq!(contact.endorsements_count, 1);
}

#[tokio::test]
async fn a_retracted_endorsement_cannot_be_verified_or_updated() {
    let ctx = setup().await;

    let endorsement = ctx
        .services
        .endorsements
        .create(ctx.member_1.clone(), create_input(&ctx, 3))
        .await
        .unwrap();
    ctx.services
        .endorsements
        .retract(ctx.member_1.clone(), &endorsement.endorsement_id)
        .await
        .unwrap();

    let err = ctx
        .services
        .endorsements
        .verify(&endorsement.endorsement_id, &ctx.owner.user_id)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::BusinessRule(_)));

    let err = ctx
        .services
        .endorsements
        .update(
            ctx.member_1.clone(),
            &endorsement.endorsement_id,
            EndorsementUpdate {
                rating: Some(5),
                comment: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::BusinessRule(_)));
}
